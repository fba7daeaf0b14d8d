use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use rand::seq::IndexedRandom;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReplyError {
    #[error("reply generator is not configured")]
    NotConfigured,
    #[error("reply request failed: {0}")]
    Request(String),
    #[error("malformed reply: {0}")]
    Malformed(String),
    #[error("reply generation timed out")]
    Timeout,
}

/// 外部生成式回复服务
#[async_trait]
pub trait ReplyGenerator: Send + Sync {
    async fn generate(&self, content: &str, username: &str) -> Result<String, ReplyError>;
}

const FALLBACK_TEMPLATES: &[&str] = &[
    "Hey {username} 🌟 Looks like things might be getting a bit heated! Remember, everyone here is human and having their own day. Maybe take a breather and come back with good vibes?",
    "{username}, we all have rough days sometimes 💙 This is a safe space for everyone. Let's keep the conversation kind and constructive!",
    "Hey there {username}, I noticed the energy in your message felt a bit tense. We're all here to connect and have a good time. What's on your mind? Maybe we can talk it through!",
    "{username}, I see you're feeling strongly about something 🤗 That passion is great, let's channel it into a constructive conversation. Everyone here values your thoughts!",
    "Just a gentle nudge, {username} 😊 let's keep this space welcoming for everyone. Sometimes rewording things can help us be heard better. You've got this!",
];

/// 安抚回复：先尝试外部生成（有超时），失败则随机选一条本地模板。总会返回文本。
pub struct SoothingReplies {
    generator: Option<Arc<dyn ReplyGenerator>>,
    timeout: Duration,
}

impl SoothingReplies {
    pub fn new(generator: Option<Arc<dyn ReplyGenerator>>, timeout: Duration) -> Self {
        Self { generator, timeout }
    }

    /// 只使用本地模板
    pub fn fallback_only() -> Self {
        Self::new(None, Duration::from_millis(0))
    }

    pub async fn reply_for(&self, content: &str, username: &str) -> String {
        match self.try_generate(content, username).await {
            Ok(text) => text,
            Err(ReplyError::NotConfigured) => fallback_reply(username),
            Err(err) => {
                tracing::warn!(error = %err, "生成安抚回复失败，使用本地模板");
                fallback_reply(username)
            }
        }
    }

    async fn try_generate(&self, content: &str, username: &str) -> Result<String, ReplyError> {
        let generator = self.generator.as_ref().ok_or(ReplyError::NotConfigured)?;
        let text = tokio::time::timeout(self.timeout, generator.generate(content, username))
            .await
            .map_err(|_| ReplyError::Timeout)??;

        let text = text.trim();
        if text.is_empty() {
            return Err(ReplyError::Malformed("empty reply".into()));
        }
        Ok(text.to_string())
    }
}

pub fn fallback_reply(username: &str) -> String {
    let template = FALLBACK_TEMPLATES
        .choose(&mut rand::rng())
        .copied()
        .unwrap_or(FALLBACK_TEMPLATES[0]);
    template.replace("{username}", username)
}
