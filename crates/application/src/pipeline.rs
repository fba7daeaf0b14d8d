//! 消息管道
//!
//! 发送：目的地校验 -> 成员检查 -> （文本）内容分析 -> 暂存 / 警告后投递 / 直接投递。
//! 暂存的敏感消息需要发送者再次确认，确认时不再重新分析。

use std::sync::Arc;

use domain::{
    ConversationId, DomainError, MessageId, MessagePatch, MessageRepository, MessageView,
    NewMessage, OutgoingMessage, PendingId, PendingMessage, ReplyContext, RoomKey,
    SendMessagePayload, ServerEvent, StoredMessage, TrollLogEntry, TrollLogRepository, Verdict,
};

use crate::{
    access::RoomAccess,
    context::ConnectionContext,
    error::ApplicationError,
    moderation::{ContentAnalyzer, SoothingReplies},
    registry::ConnectionRegistry,
    router::RoomRouter,
};

pub const SENSITIVE_WARNING: &str = "⚠️ Your message might contain sensitive information (OTP, password, card number, etc.). Are you sure you want to send this to the group?";

/// 一次发送请求的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// 命中敏感信息，等待确认
    Held { pending_id: PendingId },
    /// 命中不良言论，已投递并会私下发送安抚回复
    Warned { message_id: MessageId },
    Delivered { message_id: MessageId },
}

pub struct MessagePipelineDependencies {
    pub messages: Arc<dyn MessageRepository>,
    pub troll_logs: Arc<dyn TrollLogRepository>,
    pub access: RoomAccess,
    pub analyzer: ContentAnalyzer,
    pub replies: Arc<SoothingReplies>,
    pub router: RoomRouter,
}

pub struct MessagePipeline {
    deps: MessagePipelineDependencies,
    registry: Arc<ConnectionRegistry>,
}

impl MessagePipeline {
    pub fn new(deps: MessagePipelineDependencies) -> Self {
        let registry = deps.router.registry().clone();
        Self { deps, registry }
    }

    pub async fn send(
        &self,
        ctx: &ConnectionContext,
        payload: SendMessagePayload,
    ) -> Result<SendOutcome, ApplicationError> {
        let message = payload.into_outgoing()?;
        self.deps
            .access
            .ensure_can_post(message.destination, ctx.user.id)
            .await?;

        let verdict = self.verdict_for(ctx, &message);
        if verdict.is_sensitive {
            return Ok(self.hold(ctx, message).await);
        }

        // 新消息落库后才取代待确认消息，失败时暂存的消息保持不变
        let (stored, reply) = self.persist(ctx, message, false).await?;
        self.supersede_pending(ctx).await;
        self.publish(ctx, &stored, reply).await;

        if verdict.is_troll {
            self.spawn_soothing_notice(ctx, &stored, verdict);
            return Ok(SendOutcome::Warned {
                message_id: stored.id,
            });
        }

        Ok(SendOutcome::Delivered {
            message_id: stored.id,
        })
    }

    /// 投递暂存的消息并标记为敏感。存储失败时暂存的消息保持不变。
    pub async fn confirm(
        &self,
        ctx: &ConnectionContext,
        pending_id: PendingId,
    ) -> Result<StoredMessage, ApplicationError> {
        let pending = self
            .registry
            .pending(ctx.connection_id)
            .await
            .ok_or(DomainError::NoPendingMessage)?;
        if pending.pending_id != pending_id {
            return Err(DomainError::StalePendingMessage.into());
        }

        let (stored, reply) = self.persist(ctx, pending.message, true).await?;
        self.registry
            .clear_pending_if(ctx.connection_id, pending_id)
            .await;
        self.publish(ctx, &stored, reply).await;

        tracing::info!(
            connection_id = %ctx.connection_id,
            message_id = %stored.id,
            "确认发送敏感消息"
        );
        Ok(stored)
    }

    /// 丢弃暂存的消息。没有暂存消息时不做任何事。
    pub async fn cancel(&self, ctx: &ConnectionContext) -> Option<PendingId> {
        let pending = self.registry.discard_pending(ctx.connection_id).await?;
        self.deps
            .router
            .unicast(
                ctx.connection_id,
                ServerEvent::PendingCancelled {
                    pending_id: pending.pending_id,
                },
            )
            .await;
        Some(pending.pending_id)
    }

    /// 编辑自己未删除的文本消息。条件不满足时为无操作。
    pub async fn edit(
        &self,
        ctx: &ConnectionContext,
        message_id: MessageId,
        content: &str,
    ) -> Result<Option<StoredMessage>, ApplicationError> {
        let content = content.trim();
        if content.is_empty() {
            return Err(DomainError::invalid_argument("content", "cannot be empty").into());
        }

        let patch = MessagePatch::Edit {
            content: content.to_string(),
        };
        let guard = patch.guard();
        let Some(updated) = self
            .deps
            .messages
            .update(message_id, patch, ctx.user.id, guard)
            .await?
        else {
            tracing::debug!(message_id = %message_id, user_id = %ctx.user.id, "编辑被忽略");
            return Ok(None);
        };

        self.deps
            .router
            .broadcast(
                updated.destination,
                ServerEvent::MessageEdited {
                    message_id,
                    content: updated.content.clone().unwrap_or_default(),
                    room_id: updated.destination,
                    updated_at: updated.updated_at,
                },
                None,
            )
            .await;
        Ok(Some(updated))
    }

    /// 删除自己的消息，保留占位内容。重复删除为无操作。
    pub async fn delete(
        &self,
        ctx: &ConnectionContext,
        message_id: MessageId,
    ) -> Result<Option<StoredMessage>, ApplicationError> {
        let patch = MessagePatch::Tombstone;
        let guard = patch.guard();
        let Some(deleted) = self
            .deps
            .messages
            .update(message_id, patch, ctx.user.id, guard)
            .await?
        else {
            tracing::debug!(message_id = %message_id, user_id = %ctx.user.id, "删除被忽略");
            return Ok(None);
        };

        self.deps
            .router
            .broadcast(
                deleted.destination,
                ServerEvent::MessageDeleted {
                    message_id,
                    room_id: deleted.destination,
                },
                None,
            )
            .await;
        Ok(Some(deleted))
    }

    async fn supersede_pending(&self, ctx: &ConnectionContext) {
        if let Some(previous) = self.registry.discard_pending(ctx.connection_id).await {
            self.announce_superseded(ctx, previous.pending_id).await;
        }
    }

    async fn announce_superseded(&self, ctx: &ConnectionContext, pending_id: PendingId) {
        tracing::debug!(
            connection_id = %ctx.connection_id,
            pending_id = %pending_id,
            "新的发送请求取代了待确认消息"
        );
        self.deps
            .router
            .unicast(ctx.connection_id, ServerEvent::PendingCancelled { pending_id })
            .await;
    }

    fn verdict_for(&self, ctx: &ConnectionContext, message: &OutgoingMessage) -> Verdict {
        let Some(text) = message.analyzable_text() else {
            return Verdict::clean();
        };

        match self.deps.analyzer.analyze(text) {
            Ok(verdict) => {
                tracing::debug!(
                    connection_id = %ctx.connection_id,
                    sensitive = verdict.is_sensitive,
                    troll = verdict.is_troll,
                    "内容分析完成"
                );
                verdict
            }
            Err(err) => {
                tracing::warn!(error = %err, "内容分析失败，按干净消息处理");
                Verdict::clean()
            }
        }
    }

    async fn hold(&self, ctx: &ConnectionContext, message: OutgoingMessage) -> SendOutcome {
        let pending = PendingMessage::new(message);
        let pending_id = pending.pending_id;
        if let Some(previous) = self
            .registry
            .stash_pending(ctx.connection_id, pending.clone())
            .await
        {
            self.announce_superseded(ctx, previous.pending_id).await;
        }
        self.deps
            .router
            .unicast(
                ctx.connection_id,
                ServerEvent::PendingConfirmation {
                    reason: SENSITIVE_WARNING.to_string(),
                    pending_message: pending,
                },
            )
            .await;

        tracing::info!(
            connection_id = %ctx.connection_id,
            pending_id = %pending_id,
            "敏感消息已暂存，等待确认"
        );
        SendOutcome::Held { pending_id }
    }

    /// 写入存储。回复目标不存在时去掉引用，回复上下文为空。
    async fn persist(
        &self,
        ctx: &ConnectionContext,
        mut message: OutgoingMessage,
        flagged_sensitive: bool,
    ) -> Result<(StoredMessage, Option<ReplyContext>), ApplicationError> {
        let reply = match message.reply_to_id {
            Some(reply_id) => match self.deps.messages.reply_context(reply_id).await {
                Ok(Some(context)) => Some(context),
                Ok(None) => {
                    tracing::debug!(reply_to = %reply_id, "回复的消息不存在，忽略引用");
                    message.reply_to_id = None;
                    None
                }
                Err(err) => {
                    tracing::warn!(reply_to = %reply_id, error = %err, "读取回复上下文失败");
                    None
                }
            },
            None => None,
        };

        let stored = self
            .deps
            .messages
            .insert(NewMessage {
                sender_id: ctx.user.id,
                message,
                flagged_sensitive,
            })
            .await?;
        Ok((stored, reply))
    }

    async fn publish(
        &self,
        ctx: &ConnectionContext,
        stored: &StoredMessage,
        reply: Option<ReplyContext>,
    ) {
        let destination = stored.destination;
        self.deps
            .router
            .broadcast(
                destination,
                ServerEvent::NewMessage(MessageView::new(stored.clone(), &ctx.user, reply)),
                None,
            )
            .await;

        if let RoomKey::Conversation(conversation_id) = destination {
            self.notify_partner(ctx, conversation_id, stored.preview())
                .await;
        }
    }

    /// 私信对方没有打开该会话的连接会收到提醒
    async fn notify_partner(
        &self,
        ctx: &ConnectionContext,
        conversation_id: ConversationId,
        preview: String,
    ) {
        let partner = match self
            .deps
            .access
            .conversations()
            .partner_of(conversation_id, ctx.user.id)
            .await
        {
            Ok(Some(partner)) => partner,
            Ok(None) => return,
            Err(err) => {
                tracing::warn!(conversation_id = %conversation_id, error = %err, "查询会话对方失败");
                return;
            }
        };

        let room = RoomKey::Conversation(conversation_id);
        self.deps
            .router
            .notify_outside_room(
                partner,
                room,
                ServerEvent::ConversationNotification {
                    room_id: room,
                    sender_id: ctx.user.id,
                    sender_username: ctx.user.username.clone(),
                    preview,
                },
            )
            .await;
    }

    /// 消息已经投递后再生成安抚回复，关键路径不等待它
    fn spawn_soothing_notice(
        &self,
        ctx: &ConnectionContext,
        stored: &StoredMessage,
        mut verdict: Verdict,
    ) {
        let replies = self.deps.replies.clone();
        let router = self.deps.router.clone();
        let troll_logs = self.deps.troll_logs.clone();
        let connection_id = ctx.connection_id;
        let user = ctx.user.clone();
        let content = stored.content.clone().unwrap_or_default();
        let room = stored.destination;

        tokio::spawn(async move {
            let reply = replies.reply_for(&content, &user.username).await;
            verdict.soothing_message = Some(reply.clone());
            router
                .unicast(connection_id, ServerEvent::ModerationNotice { text: reply })
                .await;

            let entry = TrollLogEntry::from_verdict(user.id, room, &verdict);
            if let Err(err) = troll_logs.append(entry).await {
                tracing::warn!(user_id = %user.id, error = %err, "写入不良言论日志失败");
            }
        });
    }
}
