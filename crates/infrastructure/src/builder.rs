use std::{sync::Arc, time::Duration};

use application::{ChatRelayDependencies, ContentAnalyzer, ReplyGenerator, SoothingReplies};
use config::{AppConfig, ModerationConfig};
use domain::{
    ChatroomRepository, ConversationRepository, MessageRepository, TrollLogRepository,
    UserRepository,
};
use thiserror::Error;

use crate::{
    gemini::GeminiReplyGenerator,
    memory::InMemoryChatStore,
    migrations::MIGRATOR,
    repository::{create_pg_pool, PgStorage},
};

#[derive(Debug, Error)]
pub enum InfrastructureError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// 中继使用的全部存储协作方
#[derive(Clone)]
pub struct ChatStorage {
    pub messages: Arc<dyn MessageRepository>,
    pub chatrooms: Arc<dyn ChatroomRepository>,
    pub conversations: Arc<dyn ConversationRepository>,
    pub users: Arc<dyn UserRepository>,
    pub troll_logs: Arc<dyn TrollLogRepository>,
}

impl ChatStorage {
    pub fn postgres(storage: &PgStorage) -> Self {
        Self {
            messages: storage.message_repository.clone(),
            chatrooms: storage.chatroom_repository.clone(),
            conversations: storage.conversation_repository.clone(),
            users: storage.user_repository.clone(),
            troll_logs: storage.troll_log_repository.clone(),
        }
    }

    pub fn memory(store: Arc<InMemoryChatStore>) -> Self {
        Self {
            messages: store.clone(),
            chatrooms: store.clone(),
            conversations: store.clone(),
            users: store.clone(),
            troll_logs: store,
        }
    }
}

#[derive(Clone)]
pub struct Infrastructure {
    pub storage: ChatStorage,
    /// 仅在未配置数据库时存在
    pub memory: Option<Arc<InMemoryChatStore>>,
    pub analyzer: ContentAnalyzer,
    pub replies: Arc<SoothingReplies>,
}

impl Infrastructure {
    /// 配置了数据库 URL 时连接 PostgreSQL 并执行迁移，否则使用内存存储
    pub async fn connect(config: &AppConfig) -> Result<Self, InfrastructureError> {
        match config.database.url.as_deref() {
            Some(url) => {
                let pool = create_pg_pool(url, config.database.max_connections).await?;
                MIGRATOR.run(&pool).await?;
                tracing::info!(
                    max_connections = config.database.max_connections,
                    "PostgreSQL 存储已就绪"
                );

                let storage = PgStorage::new(pool);
                Ok(Self::assemble(
                    ChatStorage::postgres(&storage),
                    None,
                    &config.moderation,
                ))
            }
            None => {
                tracing::warn!("未配置数据库，使用内存存储");
                Ok(Self::in_memory(&config.moderation))
            }
        }
    }

    pub fn in_memory(moderation: &ModerationConfig) -> Self {
        let store = Arc::new(InMemoryChatStore::new());
        Self::assemble(ChatStorage::memory(store.clone()), Some(store), moderation)
    }

    fn assemble(
        storage: ChatStorage,
        memory: Option<Arc<InMemoryChatStore>>,
        moderation: &ModerationConfig,
    ) -> Self {
        let generator = GeminiReplyGenerator::from_config(moderation)
            .map(|generator| Arc::new(generator) as Arc<dyn ReplyGenerator>);
        if generator.is_none() {
            tracing::info!("未配置 Gemini API key，安抚回复只使用本地模板");
        }

        Self {
            storage,
            memory,
            analyzer: ContentAnalyzer::from_config(moderation),
            replies: Arc::new(SoothingReplies::new(
                generator,
                Duration::from_millis(moderation.reply_timeout_ms),
            )),
        }
    }

    pub fn relay_dependencies(&self) -> ChatRelayDependencies {
        ChatRelayDependencies {
            messages: self.storage.messages.clone(),
            chatrooms: self.storage.chatrooms.clone(),
            conversations: self.storage.conversations.clone(),
            users: self.storage.users.clone(),
            troll_logs: self.storage.troll_logs.clone(),
            analyzer: self.analyzer.clone(),
            replies: self.replies.clone(),
        }
    }
}
