//! 中继入口
//!
//! 所有客户端事件都经由 [`ChatRelay::handle`] 处理。单个事件的错误在这里被捕获，
//! 转换成发给发起连接的 `pipeline.error`，不会终止连接也不会影响其他连接。

use std::sync::Arc;

use domain::{
    ChatroomRepository, ClientEvent, ConnectionId, ConversationRepository, MessageRepository,
    ServerEvent, TrollLogRepository, UserId, UserProfile, UserRepository,
};

use crate::{
    access::RoomAccess,
    context::ConnectionContext,
    error::ApplicationError,
    moderation::{ContentAnalyzer, SoothingReplies},
    pipeline::{MessagePipeline, MessagePipelineDependencies},
    presence::PresenceTracker,
    registry::{ConnectionRegistry, Outbox},
    router::RoomRouter,
    session::SessionService,
    signals::RoomSignals,
};

pub struct ChatRelayDependencies {
    pub messages: Arc<dyn MessageRepository>,
    pub chatrooms: Arc<dyn ChatroomRepository>,
    pub conversations: Arc<dyn ConversationRepository>,
    pub users: Arc<dyn UserRepository>,
    pub troll_logs: Arc<dyn TrollLogRepository>,
    pub analyzer: ContentAnalyzer,
    pub replies: Arc<SoothingReplies>,
}

pub struct ChatRelay {
    registry: Arc<ConnectionRegistry>,
    router: RoomRouter,
    sessions: SessionService,
    pipeline: MessagePipeline,
    signals: RoomSignals,
    users: Arc<dyn UserRepository>,
}

impl ChatRelay {
    pub fn new(deps: ChatRelayDependencies) -> Self {
        let registry = Arc::new(ConnectionRegistry::new());
        let router = RoomRouter::new(registry.clone());
        let access = RoomAccess::new(deps.chatrooms, deps.conversations);

        let sessions = SessionService::new(
            PresenceTracker::new(router.clone(), deps.users.clone()),
            access.clone(),
            router.clone(),
        );
        let pipeline = MessagePipeline::new(MessagePipelineDependencies {
            messages: deps.messages,
            troll_logs: deps.troll_logs,
            access,
            analyzer: deps.analyzer,
            replies: deps.replies,
            router: router.clone(),
        });

        Self {
            registry,
            signals: RoomSignals::new(router.clone()),
            router,
            sessions,
            pipeline,
            users: deps.users,
        }
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// 读取接纳连接时附加的用户快照
    pub async fn load_profile(
        &self,
        user_id: UserId,
    ) -> Result<Option<UserProfile>, ApplicationError> {
        Ok(self.users.find_profile(user_id).await?)
    }

    pub async fn connect(&self, user: UserProfile, outbox: Outbox) -> ConnectionContext {
        let (ctx, _) = self
            .sessions
            .connect(ConnectionId::generate(), user, outbox)
            .await;
        ctx
    }

    pub async fn disconnect(&self, ctx: &ConnectionContext) {
        self.sessions.disconnect(ctx).await;
    }

    pub async fn handle(&self, ctx: &ConnectionContext, event: ClientEvent) {
        let name = event.name();
        if let Err(err) = self.dispatch(ctx, event).await {
            if err.is_storage_failure() {
                tracing::error!(
                    connection_id = %ctx.connection_id,
                    event = name,
                    error = %err,
                    "事件处理失败"
                );
            } else {
                tracing::debug!(
                    connection_id = %ctx.connection_id,
                    event = name,
                    error = %err,
                    "事件被拒绝"
                );
            }
            self.router
                .unicast(ctx.connection_id, ServerEvent::error(err.client_message()))
                .await;
        }
    }

    async fn dispatch(&self, ctx: &ConnectionContext, event: ClientEvent) -> Result<(), ApplicationError> {
        match event {
            ClientEvent::JoinRoom { room_id } => self.sessions.join(ctx, room_id).await,
            ClientEvent::LeaveRoom { room_id } => {
                self.sessions.leave(ctx, room_id).await;
                Ok(())
            }
            ClientEvent::SendMessage(payload) => self.pipeline.send(ctx, payload).await.map(drop),
            ClientEvent::ConfirmSend { pending_id } => {
                self.pipeline.confirm(ctx, pending_id).await.map(drop)
            }
            ClientEvent::CancelSend => {
                self.pipeline.cancel(ctx).await;
                Ok(())
            }
            ClientEvent::EditMessage {
                message_id,
                content,
                ..
            } => self.pipeline.edit(ctx, message_id, &content).await.map(drop),
            ClientEvent::DeleteMessage { message_id, .. } => {
                self.pipeline.delete(ctx, message_id).await.map(drop)
            }
            ClientEvent::React {
                message_id,
                emoji,
                destination,
            } => self.signals.react(ctx, message_id, &emoji, destination).await,
            ClientEvent::TypingStart { destination } => {
                self.signals.typing(ctx, destination, true).await
            }
            ClientEvent::TypingStop { destination } => {
                self.signals.typing(ctx, destination, false).await
            }
            ClientEvent::Ping => {
                self.router.unicast(ctx.connection_id, ServerEvent::Pong).await;
                Ok(())
            }
        }
    }
}
