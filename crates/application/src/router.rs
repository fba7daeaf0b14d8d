//! 房间路由
//!
//! 从注册表取出收件人快照后在锁外投递。每个连接的出站队列是 FIFO，
//! 同一发送连接上先处理的事件总是先到达所有收件人。

use std::sync::Arc;

use domain::{ConnectionId, RoomKey, ServerEvent, UserId};

use crate::registry::{ConnectionRegistry, Outbox};

#[derive(Clone)]
pub struct RoomRouter {
    registry: Arc<ConnectionRegistry>,
}

impl RoomRouter {
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// 投递给加入了 `room` 的每条连接，返回实际投递数
    pub async fn broadcast(
        &self,
        room: RoomKey,
        event: ServerEvent,
        exclude: Option<ConnectionId>,
    ) -> usize {
        let recipients = self.registry.room_outboxes(room, exclude).await;
        let delivered = deliver(&recipients, &event);
        tracing::debug!(room = %room, delivered, "房间广播");
        delivered
    }

    /// 直接投递给一条连接。连接已关闭时返回 `false`。
    pub async fn unicast(&self, connection_id: ConnectionId, event: ServerEvent) -> bool {
        match self.registry.outbox(connection_id).await {
            Some(outbox) => outbox.send(event).is_ok(),
            None => {
                tracing::debug!(connection_id = %connection_id, "连接已关闭，跳过单播");
                false
            }
        }
    }

    /// 投递给除 `user_id` 自己以外的所有连接
    pub async fn broadcast_except_user(&self, user_id: UserId, event: ServerEvent) -> usize {
        let recipients = self.registry.outboxes_except_user(user_id).await;
        deliver(&recipients, &event)
    }

    /// 投递给用户当前没有查看 `room` 的连接
    pub async fn notify_outside_room(
        &self,
        user_id: UserId,
        room: RoomKey,
        event: ServerEvent,
    ) -> usize {
        let recipients = self.registry.user_outboxes_outside_room(user_id, room).await;
        deliver(&recipients, &event)
    }
}

fn deliver(recipients: &[Outbox], event: &ServerEvent) -> usize {
    recipients
        .iter()
        .filter(|outbox| outbox.send(event.clone()).is_ok())
        .count()
}
