//! 表情回应与输入状态：不持久化，只做扇出

use std::sync::Arc;

use domain::{DomainError, MessageId, RoomKey, ServerEvent};

use crate::{
    context::ConnectionContext, error::ApplicationError, registry::ConnectionRegistry,
    router::RoomRouter,
};

#[derive(Clone)]
pub struct RoomSignals {
    registry: Arc<ConnectionRegistry>,
    router: RoomRouter,
}

impl RoomSignals {
    pub fn new(router: RoomRouter) -> Self {
        Self {
            registry: router.registry().clone(),
            router,
        }
    }

    /// 广播给房间内所有连接，包括发送者自己
    pub async fn react(
        &self,
        ctx: &ConnectionContext,
        message_id: MessageId,
        emoji: &str,
        destination: RoomKey,
    ) -> Result<(), ApplicationError> {
        let emoji = emoji.trim();
        if emoji.is_empty() {
            return Err(DomainError::invalid_argument("emoji", "cannot be empty").into());
        }
        self.ensure_joined(ctx, destination).await?;

        self.router
            .broadcast(
                destination,
                ServerEvent::Reaction {
                    message_id,
                    emoji: emoji.to_string(),
                    user_id: ctx.user.id,
                    username: ctx.user.username.clone(),
                },
                None,
            )
            .await;
        Ok(())
    }

    /// 广播给房间内除发送连接外的所有连接
    pub async fn typing(
        &self,
        ctx: &ConnectionContext,
        destination: RoomKey,
        started: bool,
    ) -> Result<(), ApplicationError> {
        self.ensure_joined(ctx, destination).await?;

        let event = if started {
            ServerEvent::TypingStart {
                user_id: ctx.user.id,
                username: ctx.user.username.clone(),
                room_id: destination,
            }
        } else {
            ServerEvent::TypingStop {
                user_id: ctx.user.id,
                room_id: destination,
            }
        };
        self.router
            .broadcast(destination, event, Some(ctx.connection_id))
            .await;
        Ok(())
    }

    async fn ensure_joined(
        &self,
        ctx: &ConnectionContext,
        destination: RoomKey,
    ) -> Result<(), ApplicationError> {
        if self.registry.is_joined(ctx.connection_id, destination).await {
            Ok(())
        } else {
            Err(DomainError::AccessDenied.into())
        }
    }
}
