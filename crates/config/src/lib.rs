//! 统一配置中心
//!
//! 提供中继的全局配置管理，包括：
//! - 监听地址
//! - 数据库连接（缺省时使用内存存储）
//! - JWT认证
//! - 内容审核与安抚回复
//!
//! 加载顺序：内置默认值 -> `APP_CONFIG_FILE` 指定的 TOML 文件 -> `APP_` 前缀环境变量
//! （使用 `__` 分隔层级，例如 `APP_SERVER__PORT=9000`）。

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// 全局应用配置
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct AppConfig {
    #[validate(nested)]
    pub server: ServerConfig,
    #[serde(default)]
    #[validate(nested)]
    pub database: DatabaseConfig,
    #[validate(nested)]
    pub jwt: JwtConfig,
    #[serde(default)]
    #[validate(nested)]
    pub moderation: ModerationConfig,
}

/// 服务器配置
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ServerConfig {
    #[validate(length(min = 1))]
    pub host: String,
    #[validate(range(min = 1))]
    pub port: u16,
}

/// 数据库配置
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct DatabaseConfig {
    /// 为空时使用内存存储，只适合本地开发和测试
    #[validate(url)]
    pub url: Option<String>,
    #[serde(default = "default_max_connections")]
    #[validate(range(min = 1))]
    pub max_connections: u32,
}

/// JWT配置
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct JwtConfig {
    #[validate(length(min = 32, message = "JWT secret must be at least 32 characters long"))]
    pub secret: String,
    pub expiration_hours: i64,
}

/// 内容审核配置
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ModerationConfig {
    /// Gemini API key，未设置时直接使用本地安抚模板
    pub gemini_api_key: Option<String>,
    #[validate(length(min = 1))]
    pub gemini_model: String,
    #[validate(url)]
    pub gemini_endpoint: String,
    /// 外部生成调用的超时时间
    #[validate(range(min = 100, max = 30000))]
    pub reply_timeout_ms: u64,
    /// 不良短语计数达到该值即判定为 troll
    #[validate(range(min = 1))]
    pub troll_threshold: usize,
}

impl Default for ModerationConfig {
    fn default() -> Self {
        Self {
            gemini_api_key: None,
            gemini_model: "gemini-pro".to_string(),
            gemini_endpoint: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            reply_timeout_ms: 3000,
            troll_threshold: 1,
        }
    }
}

fn default_max_connections() -> u32 {
    5
}

impl Default for AppConfig {
    /// 默认配置使用开发环境版本
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8080,
            },
            database: DatabaseConfig {
                url: None,
                max_connections: default_max_connections(),
            },
            jwt: JwtConfig {
                secret: "dev-secret-key-not-for-production-use-minimum-32-chars".to_string(),
                expiration_hours: 24,
            },
            moderation: ModerationConfig::default(),
        }
    }
}

impl AppConfig {
    /// 按默认值 -> 文件 -> 环境变量的顺序加载并校验
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::new().merge(Serialized::defaults(AppConfig::default()));
        if let Ok(path) = std::env::var("APP_CONFIG_FILE") {
            figment = figment.merge(Toml::file(path));
        }
        Self::from_figment(figment.merge(Env::prefixed("APP_").split("__")))
    }

    /// 从任意 figment 提取配置，便于测试组合不同来源
    pub fn from_figment(figment: Figment) -> Result<Self, ConfigError> {
        let config: AppConfig = figment.extract().map_err(Box::new)?;
        config.validate()?;
        Ok(config)
    }

    /// 日志中使用的脱敏表示
    pub fn sanitize(&self) -> String {
        format!(
            "server={}:{} database={} moderation.gemini={} reply_timeout_ms={}",
            self.server.host,
            self.server.port,
            if self.database.url.is_some() {
                "postgres://[REDACTED]"
            } else {
                "memory"
            },
            if self.moderation.gemini_api_key.is_some() {
                "enabled"
            } else {
                "fallback-only"
            },
            self.moderation.reply_timeout_ms,
        )
    }
}

/// 配置错误类型
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read configuration: {0}")]
    Load(#[from] Box<figment::Error>),
    #[error("invalid configuration: {0}")]
    Invalid(#[from] validator::ValidationErrors),
}
