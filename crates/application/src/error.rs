use domain::{DomainError, RepositoryError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApplicationError {
    #[error("domain error: {0}")]
    Domain(#[from] DomainError),
    #[error("repository error: {0}")]
    Repository(#[from] RepositoryError),
}

impl ApplicationError {
    /// 发给发起连接的 `pipeline.error` 文本。存储细节不会透出给客户端。
    pub fn client_message(&self) -> String {
        match self {
            Self::Domain(DomainError::AccessDenied) => "Access denied".to_string(),
            Self::Domain(DomainError::InvalidArgument { field, reason }) => {
                format!("Invalid {field}: {reason}")
            }
            Self::Domain(DomainError::NoPendingMessage) => {
                "No message is awaiting confirmation".to_string()
            }
            Self::Domain(DomainError::StalePendingMessage) => {
                "Invalid pendingId: message is no longer awaiting confirmation".to_string()
            }
            Self::Repository(RepositoryError::NotFound) => "Room not found".to_string(),
            Self::Repository(_) => "Failed to process request".to_string(),
        }
    }

    /// 是否属于存储失败，用于选择日志级别
    pub fn is_storage_failure(&self) -> bool {
        matches!(
            self,
            Self::Repository(RepositoryError::Storage { .. } | RepositoryError::Conflict)
        )
    }
}
