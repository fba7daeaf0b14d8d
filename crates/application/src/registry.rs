//! 连接注册表
//!
//! 记录每条实时连接属于哪个用户、加入了哪些房间，以及连接私有的待确认消息。
//! 所有读写都经过同一把锁，广播时读取到的房间成员总是一致的快照。

use std::collections::{HashMap, HashSet};

use domain::{ConnectionId, PendingId, PendingMessage, RoomKey, ServerEvent, UserId, UserProfile};
use tokio::sync::{mpsc, Mutex};

/// 连接的出站事件队列，由 WebSocket 写任务消费
pub type Outbox = mpsc::UnboundedSender<ServerEvent>;

/// 注册/注销引起的在线状态变化
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresenceTransition {
    /// 用户的第一条连接（0 -> 1）
    CameOnline,
    /// 用户的最后一条连接关闭（1 -> 0）
    WentOffline,
    Unchanged,
}

struct ConnectionEntry {
    user: UserProfile,
    rooms: HashSet<RoomKey>,
    outbox: Outbox,
    pending: Option<PendingMessage>,
}

#[derive(Default)]
struct RegistryState {
    connections: HashMap<ConnectionId, ConnectionEntry>,
    user_connections: HashMap<UserId, HashSet<ConnectionId>>,
}

#[derive(Default)]
pub struct ConnectionRegistry {
    state: Mutex<RegistryState>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(
        &self,
        connection_id: ConnectionId,
        user: UserProfile,
        outbox: Outbox,
    ) -> PresenceTransition {
        let mut state = self.state.lock().await;
        let user_id = user.id;
        state.connections.insert(
            connection_id,
            ConnectionEntry {
                user,
                rooms: HashSet::new(),
                outbox,
                pending: None,
            },
        );

        let owned = state.user_connections.entry(user_id).or_default();
        owned.insert(connection_id);
        if owned.len() == 1 {
            PresenceTransition::CameOnline
        } else {
            PresenceTransition::Unchanged
        }
    }

    /// 移除连接及其房间集合和待确认消息。未知连接返回 `None`。
    pub async fn unregister(
        &self,
        connection_id: ConnectionId,
    ) -> Option<(UserProfile, PresenceTransition)> {
        let mut state = self.state.lock().await;
        let entry = state.connections.remove(&connection_id)?;
        let user_id = entry.user.id;

        let transition = match state.user_connections.get_mut(&user_id) {
            Some(owned) => {
                owned.remove(&connection_id);
                if owned.is_empty() {
                    state.user_connections.remove(&user_id);
                    PresenceTransition::WentOffline
                } else {
                    PresenceTransition::Unchanged
                }
            }
            None => PresenceTransition::Unchanged,
        };

        Some((entry.user, transition))
    }

    /// 幂等：已加入时返回 `false`
    pub async fn join_room(&self, connection_id: ConnectionId, room: RoomKey) -> bool {
        let mut state = self.state.lock().await;
        state
            .connections
            .get_mut(&connection_id)
            .map(|entry| entry.rooms.insert(room))
            .unwrap_or(false)
    }

    /// 幂等：未加入时返回 `false`
    pub async fn leave_room(&self, connection_id: ConnectionId, room: RoomKey) -> bool {
        let mut state = self.state.lock().await;
        state
            .connections
            .get_mut(&connection_id)
            .map(|entry| entry.rooms.remove(&room))
            .unwrap_or(false)
    }

    pub async fn is_joined(&self, connection_id: ConnectionId, room: RoomKey) -> bool {
        let state = self.state.lock().await;
        state
            .connections
            .get(&connection_id)
            .is_some_and(|entry| entry.rooms.contains(&room))
    }

    pub async fn connections_of(&self, user_id: UserId) -> HashSet<ConnectionId> {
        let state = self.state.lock().await;
        state
            .user_connections
            .get(&user_id)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn is_online(&self, user_id: UserId) -> bool {
        let state = self.state.lock().await;
        state.user_connections.contains_key(&user_id)
    }

    /// 给定用户中当前在线的子集
    pub async fn online_among(&self, user_ids: &[UserId]) -> HashSet<UserId> {
        let state = self.state.lock().await;
        user_ids
            .iter()
            .filter(|id| state.user_connections.contains_key(id))
            .copied()
            .collect()
    }

    pub async fn connection_count(&self) -> usize {
        self.state.lock().await.connections.len()
    }

    // ---- 广播快照 ----

    /// 加入了 `room` 的所有连接的出站队列，可排除一条连接
    pub async fn room_outboxes(&self, room: RoomKey, exclude: Option<ConnectionId>) -> Vec<Outbox> {
        let state = self.state.lock().await;
        state
            .connections
            .iter()
            .filter(|(id, entry)| Some(**id) != exclude && entry.rooms.contains(&room))
            .map(|(_, entry)| entry.outbox.clone())
            .collect()
    }

    pub async fn outbox(&self, connection_id: ConnectionId) -> Option<Outbox> {
        let state = self.state.lock().await;
        state
            .connections
            .get(&connection_id)
            .map(|entry| entry.outbox.clone())
    }

    /// 不属于 `user_id` 的所有连接
    pub async fn outboxes_except_user(&self, user_id: UserId) -> Vec<Outbox> {
        let state = self.state.lock().await;
        state
            .connections
            .values()
            .filter(|entry| entry.user.id != user_id)
            .map(|entry| entry.outbox.clone())
            .collect()
    }

    /// 用户当前没有加入 `room` 的连接
    pub async fn user_outboxes_outside_room(&self, user_id: UserId, room: RoomKey) -> Vec<Outbox> {
        let state = self.state.lock().await;
        let Some(owned) = state.user_connections.get(&user_id) else {
            return Vec::new();
        };
        owned
            .iter()
            .filter_map(|id| state.connections.get(id))
            .filter(|entry| !entry.rooms.contains(&room))
            .map(|entry| entry.outbox.clone())
            .collect()
    }

    // ---- 待确认消息 ----

    /// 暂存待确认消息，替换并返回之前的那条
    pub async fn stash_pending(
        &self,
        connection_id: ConnectionId,
        pending: PendingMessage,
    ) -> Option<PendingMessage> {
        let mut state = self.state.lock().await;
        state
            .connections
            .get_mut(&connection_id)
            .and_then(|entry| entry.pending.replace(pending))
    }

    pub async fn pending(&self, connection_id: ConnectionId) -> Option<PendingMessage> {
        let state = self.state.lock().await;
        state
            .connections
            .get(&connection_id)
            .and_then(|entry| entry.pending.clone())
    }

    /// 丢弃当前待确认消息并返回它
    pub async fn discard_pending(&self, connection_id: ConnectionId) -> Option<PendingMessage> {
        let mut state = self.state.lock().await;
        state
            .connections
            .get_mut(&connection_id)
            .and_then(|entry| entry.pending.take())
    }

    /// 仅当当前暂存的消息仍是 `pending_id` 时清除
    pub async fn clear_pending_if(&self, connection_id: ConnectionId, pending_id: PendingId) -> bool {
        let mut state = self.state.lock().await;
        match state.connections.get_mut(&connection_id) {
            Some(entry)
                if entry
                    .pending
                    .as_ref()
                    .is_some_and(|p| p.pending_id == pending_id) =>
            {
                entry.pending = None;
                true
            }
            _ => false,
        }
    }
}
