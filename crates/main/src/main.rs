//! 主应用程序入口
//!
//! 加载配置、装配存储与中继，启动 Axum Web 服务。

use std::sync::Arc;

use application::ChatRelay;
use config::AppConfig;
use infrastructure::{InMemoryChatStore, Infrastructure};
use tracing_subscriber::EnvFilter;
use web_api::{router, AppState, JwtService};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = AppConfig::load()?;
    tracing::info!(config = %config.sanitize(), "配置已加载");

    let infrastructure = Infrastructure::connect(&config).await?;
    let relay = Arc::new(ChatRelay::new(infrastructure.relay_dependencies()));
    let jwt_service = Arc::new(JwtService::new(config.jwt.clone()));

    if let Some(store) = &infrastructure.memory {
        seed_demo(store, &jwt_service).await?;
    }

    let app = router(AppState::new(relay, jwt_service));
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("聊天中继启动在 http://{}", addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

/// 内存存储模式下预置演示用户，并打印可直接使用的 token
async fn seed_demo(store: &InMemoryChatStore, jwt: &JwtService) -> anyhow::Result<()> {
    let seed = store.seed_demo().await;
    tracing::info!(room = %format!("chatroom:{}", seed.lobby), "演示聊天室");
    tracing::info!(room = %format!("conversation:{}", seed.conversation), "演示私信会话");
    for user in &seed.users {
        let token = jwt
            .generate_token(user.id)
            .map_err(|err| anyhow::anyhow!("{err:?}"))?;
        tracing::info!(username = %user.username, user_id = %user.id, token = %token, "演示用户");
    }
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %err, "无法监听退出信号");
        std::future::pending::<()>().await;
    }
    tracing::info!("收到退出信号，正在关闭");
}
