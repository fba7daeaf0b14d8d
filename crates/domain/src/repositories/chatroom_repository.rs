//! 聊天室成员Repository接口定义

use async_trait::async_trait;

use crate::{
    repositories::RepositoryResult,
    user::UserProfile,
    value_objects::{ChatroomId, UserId},
};

/// 开放聊天室的持久成员关系
#[cfg_attr(feature = "testing", mockall::automock)]
#[async_trait]
pub trait ChatroomRepository: Send + Sync {
    async fn is_member(&self, chatroom_id: ChatroomId, user_id: UserId) -> RepositoryResult<bool>;

    /// 加入聊天室，已是成员时不做任何事。聊天室不存在时返回 `NotFound`。
    async fn add_member(&self, chatroom_id: ChatroomId, user_id: UserId) -> RepositoryResult<()>;

    async fn members(&self, chatroom_id: ChatroomId) -> RepositoryResult<Vec<UserProfile>>;
}
