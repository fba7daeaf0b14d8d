use serde::{Deserialize, Serialize};

use crate::{
    message::{PendingMessage, ReplyContext, StoredMessage},
    user::{MemberSummary, UserProfile},
    value_objects::{MessageId, PendingId, RoomKey, Timestamp, UserId},
};

/// 中继发给连接的事件（按房间广播或按连接单播）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all_fields = "camelCase")]
pub enum ServerEvent {
    #[serde(rename = "presence.online")]
    PresenceOnline { user_id: UserId, username: String },
    #[serde(rename = "presence.offline")]
    PresenceOffline { user_id: UserId },
    #[serde(rename = "room.memberJoined")]
    MemberJoined { room_id: RoomKey, user: UserProfile },
    #[serde(rename = "room.memberLeft")]
    MemberLeft { room_id: RoomKey, user_id: UserId },
    #[serde(rename = "room.members")]
    Members {
        room_id: RoomKey,
        members: Vec<MemberSummary>,
    },
    #[serde(rename = "message.new")]
    NewMessage(MessageView),
    #[serde(rename = "message.pendingConfirmation")]
    PendingConfirmation {
        reason: String,
        pending_message: PendingMessage,
    },
    #[serde(rename = "message.pendingCancelled")]
    PendingCancelled { pending_id: PendingId },
    #[serde(rename = "message.moderationNotice")]
    ModerationNotice { text: String },
    #[serde(rename = "message.deleted")]
    MessageDeleted {
        message_id: MessageId,
        room_id: RoomKey,
    },
    #[serde(rename = "message.edited")]
    MessageEdited {
        message_id: MessageId,
        content: String,
        room_id: RoomKey,
        updated_at: Timestamp,
    },
    #[serde(rename = "message.reaction")]
    Reaction {
        message_id: MessageId,
        emoji: String,
        user_id: UserId,
        username: String,
    },
    #[serde(rename = "conversation.notification")]
    ConversationNotification {
        room_id: RoomKey,
        sender_id: UserId,
        sender_username: String,
        preview: String,
    },
    #[serde(rename = "typing.start")]
    TypingStart {
        user_id: UserId,
        username: String,
        room_id: RoomKey,
    },
    #[serde(rename = "typing.stop")]
    TypingStop { user_id: UserId, room_id: RoomKey },
    #[serde(rename = "pipeline.error")]
    Error { message: String },
    #[serde(rename = "pong")]
    Pong,
}

impl ServerEvent {
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }
}

/// `message.new` 的数据：持久化后的消息加上发送者与回复上下文
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageView {
    #[serde(flatten)]
    pub message: StoredMessage,
    pub sender_username: String,
    pub sender_avatar: Option<String>,
    pub reply_content: Option<String>,
    pub reply_sender: Option<String>,
}

impl MessageView {
    pub fn new(message: StoredMessage, sender: &UserProfile, reply: Option<ReplyContext>) -> Self {
        let (reply_content, reply_sender) = reply
            .map(|ctx| (ctx.content, ctx.sender_username))
            .unwrap_or((None, None));

        Self {
            message,
            sender_username: sender.username.clone(),
            sender_avatar: sender.avatar_url.clone(),
            reply_content,
            reply_sender,
        }
    }
}
