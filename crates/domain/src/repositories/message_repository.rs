//! 消息Repository接口定义

use async_trait::async_trait;

use crate::{
    message::{MessagePatch, NewMessage, ReplyContext, StoredMessage, UpdateGuard},
    repositories::RepositoryResult,
    value_objects::{MessageId, UserId},
};

#[cfg_attr(feature = "testing", mockall::automock)]
#[async_trait]
pub trait MessageRepository: Send + Sync {
    /// 插入消息，返回带有 ID 和时间戳的存储记录
    async fn insert(&self, message: NewMessage) -> RepositoryResult<StoredMessage>;

    /// 条件更新：仅当 `owner` 是发送者且满足 `guard` 时生效。
    ///
    /// 条件不满足时返回 `Ok(None)`，调用方据此视为无操作。
    async fn update(
        &self,
        id: MessageId,
        patch: MessagePatch,
        owner: UserId,
        guard: UpdateGuard,
    ) -> RepositoryResult<Option<StoredMessage>>;

    /// 查询被回复消息的发送者用户名和内容
    async fn reply_context(&self, id: MessageId) -> RepositoryResult<Option<ReplyContext>>;
}
