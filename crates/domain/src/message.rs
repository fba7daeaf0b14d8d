//! 消息实体定义
//!
//! 包含在途消息、已持久化消息、待确认消息以及编辑/删除补丁。

use serde::{Deserialize, Serialize};

use crate::{
    errors::{DomainError, DomainResult},
    value_objects::{MessageId, PendingId, RoomKey, Timestamp, UserId},
};

/// 删除后保留在历史中的占位内容
pub const DELETED_PLACEHOLDER: &str = "[Message deleted]";

/// 回复上下文中引用消息内容的最大字符数
pub const REPLY_SNIPPET_CHARS: usize = 100;

/// 消息类型枚举
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    #[default]
    Text,
    Image,
    Video,
    File,
    System,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Image => "image",
            Self::Video => "video",
            Self::File => "file",
            Self::System => "system",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "text" => Some(Self::Text),
            "image" => Some(Self::Image),
            "video" => Some(Self::Video),
            "file" => Some(Self::File),
            "system" => Some(Self::System),
            _ => None,
        }
    }

    /// 图片、视频、文件消息必须携带上传服务返回的文件引用
    pub fn requires_file(&self) -> bool {
        matches!(self, Self::Image | Self::Video | Self::File)
    }
}

/// 文件上传服务返回的引用
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileRef {
    pub url: String,
    pub name: Option<String>,
    pub size: Option<i64>,
}

/// 客户端提交、尚未持久化的在途消息。目的地只有一个：聊天室或私信会话。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutgoingMessage {
    pub destination: RoomKey,
    pub content: Option<String>,
    #[serde(rename = "type", default)]
    pub kind: MessageKind,
    pub file: Option<FileRef>,
    pub reply_to_id: Option<MessageId>,
}

impl OutgoingMessage {
    pub fn text(destination: RoomKey, content: impl Into<String>) -> Self {
        Self {
            destination,
            content: Some(content.into()),
            kind: MessageKind::Text,
            file: None,
            reply_to_id: None,
        }
    }

    /// 校验客户端可提交的消息形态
    pub fn validate(&self) -> DomainResult<()> {
        match self.kind {
            MessageKind::System => Err(DomainError::invalid_argument(
                "type",
                "system messages cannot be sent by clients",
            )),
            MessageKind::Text => match self.content.as_deref() {
                Some(content) if !content.trim().is_empty() => Ok(()),
                _ => Err(DomainError::invalid_argument("content", "cannot be empty")),
            },
            kind if kind.requires_file() && self.file.is_none() => Err(
                DomainError::invalid_argument("file", "attachment messages require a file"),
            ),
            _ => Ok(()),
        }
    }

    /// 需要经过内容分析的文本
    pub fn analyzable_text(&self) -> Option<&str> {
        match self.kind {
            MessageKind::Text => self.content.as_deref(),
            _ => None,
        }
    }

    /// 私信推送的预览文本
    pub fn preview(&self) -> String {
        preview_of(self.content.as_deref())
    }
}

fn preview_of(content: Option<&str>) -> String {
    match content {
        Some(content) if !content.is_empty() => truncate_chars(content, 50),
        _ => "📎 File".to_string(),
    }
}

/// 提交给存储协作方的插入请求
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMessage {
    pub sender_id: UserId,
    pub message: OutgoingMessage,
    pub flagged_sensitive: bool,
}

/// 已持久化的消息
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredMessage {
    pub id: MessageId,
    #[serde(rename = "roomId")]
    pub destination: RoomKey,
    pub sender_id: UserId,
    pub content: Option<String>,
    #[serde(rename = "type")]
    pub kind: MessageKind,
    pub file: Option<FileRef>,
    pub reply_to_id: Option<MessageId>,
    pub flagged_sensitive: bool,
    pub is_edited: bool,
    pub is_deleted: bool,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl StoredMessage {
    /// 从插入请求构造存储记录，供存储实现使用
    pub fn from_new(id: MessageId, new: NewMessage, now: Timestamp) -> Self {
        Self {
            id,
            destination: new.message.destination,
            sender_id: new.sender_id,
            content: new.message.content,
            kind: new.message.kind,
            file: new.message.file,
            reply_to_id: new.message.reply_to_id,
            flagged_sensitive: new.flagged_sensitive,
            is_edited: false,
            is_deleted: false,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn preview(&self) -> String {
        preview_of(self.content.as_deref())
    }

    /// 判断补丁在当前状态下是否允许执行
    pub fn admits(&self, owner: UserId, guard: UpdateGuard) -> bool {
        if self.sender_id != owner || self.is_deleted {
            return false;
        }
        match guard {
            UpdateGuard::NotDeleted => true,
            UpdateGuard::TextNotDeleted => self.kind == MessageKind::Text,
        }
    }

    /// 就地应用补丁
    pub fn apply(&mut self, patch: &MessagePatch, now: Timestamp) {
        match patch {
            MessagePatch::Edit { content } => {
                self.content = Some(content.clone());
                self.is_edited = true;
            }
            MessagePatch::Tombstone => {
                self.content = Some(DELETED_PLACEHOLDER.to_string());
                self.is_deleted = true;
            }
        }
        self.updated_at = now;
    }
}

/// 消息更新补丁
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessagePatch {
    /// 修改内容并标记为已编辑
    Edit { content: String },
    /// 标记删除并替换为占位内容
    Tombstone,
}

impl MessagePatch {
    pub fn guard(&self) -> UpdateGuard {
        match self {
            Self::Edit { .. } => UpdateGuard::TextNotDeleted,
            Self::Tombstone => UpdateGuard::NotDeleted,
        }
    }
}

/// 条件更新的守卫。所有者条件总是附加的。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateGuard {
    NotDeleted,
    TextNotDeleted,
}

/// 被回复消息的上下文
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplyContext {
    pub sender_username: Option<String>,
    pub content: Option<String>,
}

impl ReplyContext {
    pub fn new(sender_username: Option<String>, content: Option<String>) -> Self {
        Self {
            sender_username,
            content: content.map(|c| truncate_chars(&c, REPLY_SNIPPET_CHARS)),
        }
    }
}

/// 敏感判定后暂存在连接上的消息，确认前不会持久化或广播
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingMessage {
    pub pending_id: PendingId,
    pub message: OutgoingMessage,
}

impl PendingMessage {
    pub fn new(message: OutgoingMessage) -> Self {
        Self {
            pending_id: PendingId::generate(),
            message,
        }
    }
}

fn truncate_chars(value: &str, max: usize) -> String {
    value.chars().take(max).collect()
}
