//! Web API 层。
//!
//! 提供 Axum 路由：健康检查和经 JWT 认证的 WebSocket 入口，
//! 每条 socket 都交给应用层的 [`application::ChatRelay`] 处理。

mod auth;
mod error;
mod routes;
mod state;
mod ws_connection;

pub use auth::{Claims, JwtService};
pub use config::JwtConfig;
pub use error::ApiError;
pub use routes::router;
pub use state::AppState;
