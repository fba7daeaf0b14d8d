//! 基础设施层实现。
//!
//! 提供 PostgreSQL 与内存两种存储、Gemini 生成式回复客户端，实现应用/领域层定义的接口。

pub mod builder;
pub mod gemini;
pub mod memory;
pub mod migrations;
pub mod repository;

pub use builder::{ChatStorage, Infrastructure, InfrastructureError};
pub use gemini::GeminiReplyGenerator;
pub use memory::{DemoSeed, InMemoryChatStore};
pub use migrations::MIGRATOR;
pub use repository::{
    create_pg_pool, PgChatroomRepository, PgConversationRepository, PgMessageRepository,
    PgStorage, PgTrollLogRepository, PgUserRepository,
};
