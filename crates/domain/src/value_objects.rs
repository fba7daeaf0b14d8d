use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::DomainError;

/// 统一的时间戳类型。
pub type Timestamp = DateTime<Utc>;

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new(id: Uuid) -> Self {
                Self(id)
            }

            pub fn generate() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<Uuid> for $name {
            fn from(value: Uuid) -> Self {
                Self(value)
            }
        }

        impl From<$name> for Uuid {
            fn from(value: $name) -> Self {
                value.0
            }
        }
    };
}

uuid_id!(
    /// 用户唯一标识。
    UserId
);
uuid_id!(
    /// 开放聊天室唯一标识。
    ChatroomId
);
uuid_id!(
    /// 双人私信会话唯一标识。
    ConversationId
);
uuid_id!(
    /// 消息唯一标识。
    MessageId
);
uuid_id!(
    /// 单条实时连接的唯一标识，由中继在接纳连接时分配。
    ConnectionId
);
uuid_id!(
    /// 待确认消息的标识，确认时必须与当前暂存的消息一致。
    PendingId
);

/// 房间标识：带标签的聊天室或私信会话 ID。
///
/// 线上格式为 `chatroom:<uuid>` 或 `conversation:<uuid>`。两种标签永远不会混用，
/// `chatroom:5` 和 `conversation:5` 是两个完全不同的广播受众。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum RoomKey {
    Chatroom(ChatroomId),
    Conversation(ConversationId),
}

impl RoomKey {
    const CHATROOM_TAG: &'static str = "chatroom";
    const CONVERSATION_TAG: &'static str = "conversation";

    pub fn chatroom(id: impl Into<ChatroomId>) -> Self {
        Self::Chatroom(id.into())
    }

    pub fn conversation(id: impl Into<ConversationId>) -> Self {
        Self::Conversation(id.into())
    }

    pub fn is_conversation(&self) -> bool {
        matches!(self, Self::Conversation(_))
    }
}

impl fmt::Display for RoomKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Chatroom(id) => write!(f, "{}:{}", Self::CHATROOM_TAG, id),
            Self::Conversation(id) => write!(f, "{}:{}", Self::CONVERSATION_TAG, id),
        }
    }
}

impl FromStr for RoomKey {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let (tag, raw_id) = value
            .split_once(':')
            .ok_or_else(|| DomainError::invalid_argument("room_id", "missing room tag"))?;
        let id = Uuid::parse_str(raw_id)
            .map_err(|_| DomainError::invalid_argument("room_id", "invalid identifier"))?;

        match tag {
            Self::CHATROOM_TAG => Ok(Self::Chatroom(ChatroomId::from(id))),
            Self::CONVERSATION_TAG => Ok(Self::Conversation(ConversationId::from(id))),
            _ => Err(DomainError::invalid_argument("room_id", "unknown room tag")),
        }
    }
}

impl TryFrom<String> for RoomKey {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<RoomKey> for String {
    fn from(value: RoomKey) -> Self {
        value.to_string()
    }
}
