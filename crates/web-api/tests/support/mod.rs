use std::{net::SocketAddr, sync::Arc, time::Duration};

use application::{ChatRelay, ChatRelayDependencies};
use async_trait::async_trait;
use config::{JwtConfig, ModerationConfig};
use domain::{
    MessageId, MessagePatch, MessageRepository, NewMessage, ReplyContext, RepositoryResult,
    StoredMessage, UpdateGuard, UserId, UserProfile,
};
use futures_util::StreamExt;
use infrastructure::{InMemoryChatStore, Infrastructure};
use serde_json::Value;
use tokio::{net::TcpListener, sync::oneshot};
use tokio_tungstenite::{
    connect_async, tungstenite::Message as TungsteniteMessage, MaybeTlsStream, WebSocketStream,
};
use web_api::{router, AppState, JwtService};

pub type ClientSocket = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

pub struct TestServer {
    pub addr: SocketAddr,
    pub store: Arc<InMemoryChatStore>,
    pub jwt: Arc<JwtService>,
    shutdown: Option<oneshot::Sender<()>>,
}

impl TestServer {
    pub async fn start() -> Self {
        Self::start_with(|deps| deps).await
    }

    /// 消息写入存储前先等待 `delay`，用于覆盖处理过程中连接断开的情况
    pub async fn start_with_insert_delay(delay: Duration) -> Self {
        Self::start_with(move |mut deps| {
            deps.messages = Arc::new(DelayedInserts {
                inner: deps.messages,
                delay,
            });
            deps
        })
        .await
    }

    async fn start_with(
        customize: impl FnOnce(ChatRelayDependencies) -> ChatRelayDependencies,
    ) -> Self {
        let infrastructure = Infrastructure::in_memory(&ModerationConfig::default());
        let store = infrastructure.memory.clone().expect("memory store");
        let relay = Arc::new(ChatRelay::new(customize(
            infrastructure.relay_dependencies(),
        )));
        let jwt = Arc::new(JwtService::new(JwtConfig {
            secret: "integration-test-secret-with-32-plus-chars".into(),
            expiration_hours: 1,
        }));
        let app = router(AppState::new(relay, jwt.clone()));

        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        tokio::spawn(async move {
            axum::serve(listener, app.into_make_service())
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
                .ok();
        });

        Self {
            addr,
            store,
            jwt,
            shutdown: Some(shutdown_tx),
        }
    }

    pub async fn user(&self, name: &str) -> UserProfile {
        let profile = UserProfile::new(UserId::generate(), name, None);
        self.store.add_user(profile.clone()).await;
        profile
    }

    pub fn ws_url(&self, token: &str) -> String {
        format!("ws://{}/api/v1/ws?token={}", self.addr, token)
    }

    pub async fn connect(&self, user: &UserProfile) -> ClientSocket {
        let token = self.jwt.generate_token(user.id).expect("token");
        let (socket, _) = connect_async(self.ws_url(&token))
            .await
            .expect("ws connect");
        socket
    }
}

struct DelayedInserts {
    inner: Arc<dyn MessageRepository>,
    delay: Duration,
}

#[async_trait]
impl MessageRepository for DelayedInserts {
    async fn insert(&self, message: NewMessage) -> RepositoryResult<StoredMessage> {
        tokio::time::sleep(self.delay).await;
        self.inner.insert(message).await
    }

    async fn update(
        &self,
        id: MessageId,
        patch: MessagePatch,
        owner: UserId,
        guard: UpdateGuard,
    ) -> RepositoryResult<Option<StoredMessage>> {
        self.inner.update(id, patch, owner, guard).await
    }

    async fn reply_context(&self, id: MessageId) -> RepositoryResult<Option<ReplyContext>> {
        self.inner.reply_context(id).await
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

/// 读取下一条 JSON 事件，忽略协议层心跳帧
pub async fn next_event(ws: &mut ClientSocket) -> Value {
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(2), ws.next())
            .await
            .expect("timed out waiting for frame")
            .expect("socket closed")
            .expect("frame error");
        match frame {
            TungsteniteMessage::Text(payload) => {
                return serde_json::from_str(&payload).expect("json event")
            }
            TungsteniteMessage::Ping(_) | TungsteniteMessage::Pong(_) => continue,
            other => panic!("unexpected frame {other:?}"),
        }
    }
}

/// 跳过其他事件直到出现指定名称的事件
pub async fn wait_for(ws: &mut ClientSocket, name: &str) -> Value {
    loop {
        let event = next_event(ws).await;
        if event["event"] == name {
            return event;
        }
    }
}
