use async_trait::async_trait;

use crate::{
    repositories::RepositoryResult,
    user::UserProfile,
    value_objects::{ConversationId, UserId},
};

/// 固定双人私信会话的参与者
#[cfg_attr(feature = "testing", mockall::automock)]
#[async_trait]
pub trait ConversationRepository: Send + Sync {
    async fn is_participant(
        &self,
        conversation_id: ConversationId,
        user_id: UserId,
    ) -> RepositoryResult<bool>;

    async fn participants(
        &self,
        conversation_id: ConversationId,
    ) -> RepositoryResult<Vec<UserProfile>>;

    /// 会话中除 `excluding` 之外的另一方
    async fn partner_of(
        &self,
        conversation_id: ConversationId,
        excluding: UserId,
    ) -> RepositoryResult<Option<UserId>>;
}
