use std::sync::Arc;

use application::ChatRelay;

use crate::JwtService;

#[derive(Clone)]
pub struct AppState {
    pub relay: Arc<ChatRelay>,
    pub jwt_service: Arc<JwtService>,
}

impl AppState {
    pub fn new(relay: Arc<ChatRelay>, jwt_service: Arc<JwtService>) -> Self {
        Self { relay, jwt_service }
    }
}
