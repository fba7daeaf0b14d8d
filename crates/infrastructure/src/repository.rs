use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::{
    ChatroomId, ChatroomRepository, ConversationId, ConversationRepository, FileRef, MessageId,
    MessageKind, MessagePatch, MessageRepository, NewMessage, ReplyContext, RepositoryError,
    RepositoryResult, RoomKey, StoredMessage, TrollLogEntry, TrollLogRepository, UpdateGuard,
    UserId, UserProfile, UserRepository, DELETED_PLACEHOLDER,
};
use sqlx::{postgres::PgPoolOptions, FromRow, PgPool};
use uuid::Uuid;

const REPLY_TO_FKEY: &str = "messages_reply_to_id_fkey";

fn map_sqlx_err(err: sqlx::Error) -> RepositoryError {
    match &err {
        sqlx::Error::RowNotFound => RepositoryError::NotFound,
        // 被回复的消息不存在不代表目的地不存在
        sqlx::Error::Database(db)
            if db.is_foreign_key_violation() && db.constraint() == Some(REPLY_TO_FKEY) =>
        {
            RepositoryError::storage(err.to_string())
        }
        // 其余外键缺失说明引用的聊天室/用户不存在
        sqlx::Error::Database(db) if db.is_foreign_key_violation() => RepositoryError::NotFound,
        sqlx::Error::Database(db) if db.is_unique_violation() => RepositoryError::Conflict,
        _ => RepositoryError::storage(err.to_string()),
    }
}

fn invalid_data(message: impl Into<String>) -> RepositoryError {
    RepositoryError::storage(message)
}

fn split_destination(room: RoomKey) -> (Option<Uuid>, Option<Uuid>) {
    match room {
        RoomKey::Chatroom(id) => (Some(id.into()), None),
        RoomKey::Conversation(id) => (None, Some(id.into())),
    }
}

const MESSAGE_COLUMNS: &str = "id, content, message_type, file_url, file_name, file_size, \
     sender_id, chatroom_id, conversation_id, reply_to_id, flagged_sensitive, is_edited, \
     is_deleted, created_at, updated_at";

#[derive(Debug, FromRow)]
struct UserRecord {
    id: Uuid,
    username: String,
    avatar_url: Option<String>,
}

impl From<UserRecord> for UserProfile {
    fn from(value: UserRecord) -> Self {
        UserProfile::new(UserId::from(value.id), value.username, value.avatar_url)
    }
}

#[derive(Debug, FromRow)]
struct MessageRecord {
    id: Uuid,
    content: Option<String>,
    message_type: String,
    file_url: Option<String>,
    file_name: Option<String>,
    file_size: Option<i64>,
    sender_id: Uuid,
    chatroom_id: Option<Uuid>,
    conversation_id: Option<Uuid>,
    reply_to_id: Option<Uuid>,
    flagged_sensitive: bool,
    is_edited: bool,
    is_deleted: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<MessageRecord> for StoredMessage {
    type Error = RepositoryError;

    fn try_from(value: MessageRecord) -> Result<Self, Self::Error> {
        let destination = match (value.chatroom_id, value.conversation_id) {
            (Some(id), None) => RoomKey::chatroom(id),
            (None, Some(id)) => RoomKey::conversation(id),
            _ => {
                return Err(invalid_data(format!(
                    "message {} must have exactly one destination",
                    value.id
                )))
            }
        };
        let kind = MessageKind::parse(&value.message_type).ok_or_else(|| {
            invalid_data(format!("unknown message type: {}", value.message_type))
        })?;
        let file = value.file_url.map(|url| FileRef {
            url,
            name: value.file_name,
            size: value.file_size,
        });

        Ok(StoredMessage {
            id: MessageId::from(value.id),
            destination,
            sender_id: UserId::from(value.sender_id),
            content: value.content,
            kind,
            file,
            reply_to_id: value.reply_to_id.map(MessageId::from),
            flagged_sensitive: value.flagged_sensitive,
            is_edited: value.is_edited,
            is_deleted: value.is_deleted,
            created_at: value.created_at,
            updated_at: value.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct ReplyRecord {
    content: Option<String>,
    sender_username: Option<String>,
}

#[derive(Clone)]
pub struct PgUserRepository {
    pool: PgPool,
}

impl PgUserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserRepository for PgUserRepository {
    async fn find_profile(&self, user_id: UserId) -> RepositoryResult<Option<UserProfile>> {
        let record = sqlx::query_as::<_, UserRecord>(
            "SELECT id, username, avatar_url FROM users WHERE id = $1",
        )
        .bind(Uuid::from(user_id))
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok(record.map(UserProfile::from))
    }

    async fn set_online(&self, user_id: UserId, online: bool) -> RepositoryResult<()> {
        sqlx::query("UPDATE users SET is_online = $2, last_seen = NOW() WHERE id = $1")
            .bind(Uuid::from(user_id))
            .bind(online)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_err)?;
        Ok(())
    }
}

#[derive(Clone)]
pub struct PgChatroomRepository {
    pool: PgPool,
}

impl PgChatroomRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ChatroomRepository for PgChatroomRepository {
    async fn is_member(&self, chatroom_id: ChatroomId, user_id: UserId) -> RepositoryResult<bool> {
        sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM chatroom_members WHERE chatroom_id = $1 AND user_id = $2)",
        )
        .bind(Uuid::from(chatroom_id))
        .bind(Uuid::from(user_id))
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_err)
    }

    async fn add_member(&self, chatroom_id: ChatroomId, user_id: UserId) -> RepositoryResult<()> {
        sqlx::query(
            "INSERT INTO chatroom_members (chatroom_id, user_id) VALUES ($1, $2) \
             ON CONFLICT (chatroom_id, user_id) DO NOTHING",
        )
        .bind(Uuid::from(chatroom_id))
        .bind(Uuid::from(user_id))
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        Ok(())
    }

    async fn members(&self, chatroom_id: ChatroomId) -> RepositoryResult<Vec<UserProfile>> {
        let records = sqlx::query_as::<_, UserRecord>(
            "SELECT u.id, u.username, u.avatar_url FROM chatroom_members cm \
             JOIN users u ON u.id = cm.user_id \
             WHERE cm.chatroom_id = $1 ORDER BY cm.joined_at",
        )
        .bind(Uuid::from(chatroom_id))
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok(records.into_iter().map(UserProfile::from).collect())
    }
}

#[derive(Clone)]
pub struct PgConversationRepository {
    pool: PgPool,
}

impl PgConversationRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ConversationRepository for PgConversationRepository {
    async fn is_participant(
        &self,
        conversation_id: ConversationId,
        user_id: UserId,
    ) -> RepositoryResult<bool> {
        sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM conversation_participants \
             WHERE conversation_id = $1 AND user_id = $2)",
        )
        .bind(Uuid::from(conversation_id))
        .bind(Uuid::from(user_id))
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_err)
    }

    async fn participants(
        &self,
        conversation_id: ConversationId,
    ) -> RepositoryResult<Vec<UserProfile>> {
        let records = sqlx::query_as::<_, UserRecord>(
            "SELECT u.id, u.username, u.avatar_url FROM conversation_participants cp \
             JOIN users u ON u.id = cp.user_id \
             WHERE cp.conversation_id = $1 ORDER BY u.username",
        )
        .bind(Uuid::from(conversation_id))
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok(records.into_iter().map(UserProfile::from).collect())
    }

    async fn partner_of(
        &self,
        conversation_id: ConversationId,
        excluding: UserId,
    ) -> RepositoryResult<Option<UserId>> {
        let partner = sqlx::query_scalar::<_, Uuid>(
            "SELECT user_id FROM conversation_participants \
             WHERE conversation_id = $1 AND user_id <> $2 LIMIT 1",
        )
        .bind(Uuid::from(conversation_id))
        .bind(Uuid::from(excluding))
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok(partner.map(UserId::from))
    }
}

#[derive(Clone)]
pub struct PgMessageRepository {
    pool: PgPool,
}

impl PgMessageRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MessageRepository for PgMessageRepository {
    async fn insert(&self, message: NewMessage) -> RepositoryResult<StoredMessage> {
        let (chatroom_id, conversation_id) = split_destination(message.message.destination);
        let file = message.message.file.as_ref();
        let sql = format!(
            "INSERT INTO messages (id, content, message_type, file_url, file_name, file_size, \
             sender_id, chatroom_id, conversation_id, reply_to_id, flagged_sensitive) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) RETURNING {MESSAGE_COLUMNS}"
        );

        let record = sqlx::query_as::<_, MessageRecord>(&sql)
            .bind(Uuid::new_v4())
            .bind(message.message.content.as_deref())
            .bind(message.message.kind.as_str())
            .bind(file.map(|f| f.url.as_str()))
            .bind(file.and_then(|f| f.name.as_deref()))
            .bind(file.and_then(|f| f.size))
            .bind(Uuid::from(message.sender_id))
            .bind(chatroom_id)
            .bind(conversation_id)
            .bind(message.message.reply_to_id.map(Uuid::from))
            .bind(message.flagged_sensitive)
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_err)?;

        StoredMessage::try_from(record)
    }

    async fn update(
        &self,
        id: MessageId,
        patch: MessagePatch,
        owner: UserId,
        guard: UpdateGuard,
    ) -> RepositoryResult<Option<StoredMessage>> {
        let (assignments, content) = match patch {
            MessagePatch::Edit { content } => ("content = $1, is_edited = TRUE", content),
            MessagePatch::Tombstone => (
                "content = $1, is_deleted = TRUE",
                DELETED_PLACEHOLDER.to_string(),
            ),
        };
        let kind_filter = match guard {
            UpdateGuard::NotDeleted => "",
            UpdateGuard::TextNotDeleted => " AND message_type = 'text'",
        };
        // 所有权与状态检查放在同一条 UPDATE 里，不存在先查后改的窗口
        let sql = format!(
            "UPDATE messages SET {assignments}, updated_at = NOW() \
             WHERE id = $2 AND sender_id = $3 AND is_deleted = FALSE{kind_filter} \
             RETURNING {MESSAGE_COLUMNS}"
        );

        let record = sqlx::query_as::<_, MessageRecord>(&sql)
            .bind(content)
            .bind(Uuid::from(id))
            .bind(Uuid::from(owner))
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_err)?;

        record.map(StoredMessage::try_from).transpose()
    }

    async fn reply_context(&self, id: MessageId) -> RepositoryResult<Option<ReplyContext>> {
        let record = sqlx::query_as::<_, ReplyRecord>(
            "SELECT m.content, u.username AS sender_username FROM messages m \
             LEFT JOIN users u ON u.id = m.sender_id WHERE m.id = $1",
        )
        .bind(Uuid::from(id))
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok(record.map(|r| ReplyContext::new(r.sender_username, r.content)))
    }
}

#[derive(Clone)]
pub struct PgTrollLogRepository {
    pool: PgPool,
}

impl PgTrollLogRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TrollLogRepository for PgTrollLogRepository {
    async fn append(&self, entry: TrollLogEntry) -> RepositoryResult<()> {
        let (chatroom_id, conversation_id) = split_destination(entry.room);
        sqlx::query(
            "INSERT INTO troll_logs (user_id, chatroom_id, conversation_id, detection_reason, ai_response) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(Uuid::from(entry.user_id))
        .bind(chatroom_id)
        .bind(conversation_id)
        .bind(entry.reason)
        .bind(entry.reply)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        Ok(())
    }
}

#[derive(Clone)]
pub struct PgStorage {
    pub pool: PgPool,
    pub user_repository: Arc<PgUserRepository>,
    pub chatroom_repository: Arc<PgChatroomRepository>,
    pub conversation_repository: Arc<PgConversationRepository>,
    pub message_repository: Arc<PgMessageRepository>,
    pub troll_log_repository: Arc<PgTrollLogRepository>,
}

impl PgStorage {
    pub fn new(pool: PgPool) -> Self {
        Self {
            user_repository: Arc::new(PgUserRepository::new(pool.clone())),
            chatroom_repository: Arc::new(PgChatroomRepository::new(pool.clone())),
            conversation_repository: Arc::new(PgConversationRepository::new(pool.clone())),
            message_repository: Arc::new(PgMessageRepository::new(pool.clone())),
            troll_log_repository: Arc::new(PgTrollLogRepository::new(pool.clone())),
            pool,
        }
    }
}

pub async fn create_pg_pool(database_url: &str, max_connections: u32) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await
}
