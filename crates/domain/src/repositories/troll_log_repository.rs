use async_trait::async_trait;

use crate::{moderation::TrollLogEntry, repositories::RepositoryResult};

/// 只写的不良言论日志
#[cfg_attr(feature = "testing", mockall::automock)]
#[async_trait]
pub trait TrollLogRepository: Send + Sync {
    async fn append(&self, entry: TrollLogEntry) -> RepositoryResult<()>;
}
