//! Repository接口定义
//!
//! 中继依赖的持久化协作方抽象。内层定义接口，外层（PostgreSQL、内存）实现接口。
//! 所有操作都是请求/响应式的，失败统一表现为 [`RepositoryError`]。

use crate::errors::RepositoryError;

pub mod chatroom_repository;
pub mod conversation_repository;
pub mod message_repository;
pub mod troll_log_repository;
pub mod user_repository;

pub use chatroom_repository::ChatroomRepository;
pub use conversation_repository::ConversationRepository;
pub use message_repository::MessageRepository;
pub use troll_log_repository::TrollLogRepository;
pub use user_repository::UserRepository;

#[cfg(feature = "testing")]
pub use chatroom_repository::MockChatroomRepository;
#[cfg(feature = "testing")]
pub use conversation_repository::MockConversationRepository;
#[cfg(feature = "testing")]
pub use message_repository::MockMessageRepository;
#[cfg(feature = "testing")]
pub use troll_log_repository::MockTrollLogRepository;
#[cfg(feature = "testing")]
pub use user_repository::MockUserRepository;

/// Repository 操作结果
pub type RepositoryResult<T> = Result<T, RepositoryError>;
