//! 聊天中继核心领域模型
//!
//! 包含带标签的房间标识、用户快照、消息与待确认消息、审核结论、
//! 线上事件以及持久化协作方接口。

pub mod errors;
pub mod events;
pub mod message;
pub mod moderation;
pub mod repositories;
pub mod user;
pub mod value_objects;

// 重新导出常用类型
pub use errors::{DomainError, DomainResult, RepositoryError};
pub use events::{ClientEvent, MessageView, SendMessagePayload, ServerEvent};
pub use message::{
    FileRef, MessageKind, MessagePatch, NewMessage, OutgoingMessage, PendingMessage, ReplyContext,
    StoredMessage, UpdateGuard, DELETED_PLACEHOLDER,
};
pub use moderation::{TrollLogEntry, Verdict};
pub use repositories::{
    ChatroomRepository, ConversationRepository, MessageRepository, RepositoryResult,
    TrollLogRepository, UserRepository,
};
pub use user::{MemberSummary, UserProfile};
pub use value_objects::{
    ChatroomId, ConnectionId, ConversationId, MessageId, PendingId, RoomKey, Timestamp, UserId,
};
