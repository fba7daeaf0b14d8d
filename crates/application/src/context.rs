use domain::{ConnectionId, UserProfile};

/// 每次事件处理都显式传入的连接上下文
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionContext {
    pub connection_id: ConnectionId,
    pub user: UserProfile,
}

impl ConnectionContext {
    pub fn new(connection_id: ConnectionId, user: UserProfile) -> Self {
        Self {
            connection_id,
            user,
        }
    }
}
