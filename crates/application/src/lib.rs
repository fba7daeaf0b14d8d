//! 应用层实现。
//!
//! 连接注册表、在线状态、房间路由、内容审核以及消息管道，
//! 通过 [`ChatRelay`] 对外提供单一的事件处理入口。存储与生成式回复通过
//! 领域层定义的接口注入。

pub mod access;
pub mod clock;
pub mod context;
pub mod error;
pub mod moderation;
pub mod pipeline;
pub mod presence;
pub mod registry;
pub mod relay;
pub mod router;
pub mod session;
pub mod signals;

pub use access::RoomAccess;
pub use clock::{Clock, SystemClock};
pub use context::ConnectionContext;
pub use error::ApplicationError;
pub use moderation::{AnalyzerError, ContentAnalyzer, ReplyError, ReplyGenerator, SoothingReplies};
pub use pipeline::{MessagePipeline, MessagePipelineDependencies, SendOutcome, SENSITIVE_WARNING};
pub use presence::PresenceTracker;
pub use registry::{ConnectionRegistry, Outbox, PresenceTransition};
pub use relay::{ChatRelay, ChatRelayDependencies};
pub use router::RoomRouter;
pub use session::SessionService;
pub use signals::RoomSignals;
