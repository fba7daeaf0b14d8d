use serde::{Deserialize, Serialize};

use crate::{
    errors::{DomainError, DomainResult},
    message::{FileRef, MessageKind, OutgoingMessage},
    value_objects::{MessageId, PendingId, RoomKey},
};

/// 客户端发给中继的事件
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all_fields = "camelCase")]
pub enum ClientEvent {
    #[serde(rename = "room.join")]
    JoinRoom { room_id: RoomKey },
    #[serde(rename = "room.leave")]
    LeaveRoom { room_id: RoomKey },
    #[serde(rename = "message.send")]
    SendMessage(SendMessagePayload),
    #[serde(rename = "message.confirmSend")]
    ConfirmSend { pending_id: PendingId },
    #[serde(rename = "message.cancelSend")]
    CancelSend,
    #[serde(rename = "message.edit")]
    EditMessage {
        message_id: MessageId,
        content: String,
        #[serde(default)]
        destination: Option<RoomKey>,
    },
    #[serde(rename = "message.delete")]
    DeleteMessage {
        message_id: MessageId,
        #[serde(default)]
        destination: Option<RoomKey>,
    },
    #[serde(rename = "message.react")]
    React {
        message_id: MessageId,
        emoji: String,
        destination: RoomKey,
    },
    #[serde(rename = "typing.start")]
    TypingStart { destination: RoomKey },
    #[serde(rename = "typing.stop")]
    TypingStop { destination: RoomKey },
    #[serde(rename = "ping")]
    Ping,
}

impl ClientEvent {
    /// 日志中使用的事件名
    pub fn name(&self) -> &'static str {
        match self {
            Self::JoinRoom { .. } => "room.join",
            Self::LeaveRoom { .. } => "room.leave",
            Self::SendMessage(_) => "message.send",
            Self::ConfirmSend { .. } => "message.confirmSend",
            Self::CancelSend => "message.cancelSend",
            Self::EditMessage { .. } => "message.edit",
            Self::DeleteMessage { .. } => "message.delete",
            Self::React { .. } => "message.react",
            Self::TypingStart { .. } => "typing.start",
            Self::TypingStop { .. } => "typing.stop",
            Self::Ping => "ping",
        }
    }
}

/// `message.send` 的数据部分
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessagePayload {
    pub destination: Option<RoomKey>,
    pub content: Option<String>,
    #[serde(rename = "type", default)]
    pub kind: MessageKind,
    pub file_ref: Option<FileRef>,
    pub reply_to_id: Option<MessageId>,
}

impl SendMessagePayload {
    pub fn into_outgoing(self) -> DomainResult<OutgoingMessage> {
        let destination = self
            .destination
            .ok_or_else(|| DomainError::invalid_argument("destination", "is required"))?;
        let message = OutgoingMessage {
            destination,
            content: self.content,
            kind: self.kind,
            file: self.file_ref,
            reply_to_id: self.reply_to_id,
        };
        message.validate()?;
        Ok(message)
    }
}
