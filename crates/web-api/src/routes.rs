use axum::{
    extract::{Query, State, WebSocketUpgrade},
    http::{HeaderMap, StatusCode},
    response::Response,
    routing::get,
    Router,
};
use serde::Deserialize;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{error::ApiError, state::AppState, ws_connection::WebSocketConnection};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .nest("/api/v1", api_routes())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn api_routes() -> Router<AppState> {
    Router::new().route("/ws", get(websocket_upgrade))
}

async fn health() -> StatusCode {
    StatusCode::OK
}

#[derive(Debug, Deserialize)]
struct WsQuery {
    token: Option<String>,
}

/// 身份验证失败时在升级前直接拒绝，不创建任何连接状态
async fn websocket_upgrade(
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Result<Response, ApiError> {
    let user_id = state
        .jwt_service
        .authenticate(query.token.as_deref(), &headers)
        .inspect_err(|err| tracing::warn!(error = ?err, "WebSocket 认证失败"))?;

    let user = state
        .relay
        .load_profile(user_id)
        .await?
        .ok_or_else(|| {
            tracing::warn!(user_id = %user_id, "WebSocket 认证失败：用户不存在");
            ApiError::unauthorized("Unknown user")
        })?;

    let relay = state.relay.clone();
    Ok(ws.on_upgrade(move |socket| async move {
        WebSocketConnection::accept(socket, relay, user)
            .await
            .run()
            .await
    }))
}
