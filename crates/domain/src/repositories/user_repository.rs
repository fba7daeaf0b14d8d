//! 用户Repository接口定义

use async_trait::async_trait;

use crate::{repositories::RepositoryResult, user::UserProfile, value_objects::UserId};

#[cfg_attr(feature = "testing", mockall::automock)]
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// 接纳连接时读取用户快照
    async fn find_profile(&self, user_id: UserId) -> RepositoryResult<Option<UserProfile>>;

    /// 更新持久化的在线标记和最后在线时间
    async fn set_online(&self, user_id: UserId, online: bool) -> RepositoryResult<()>;
}
