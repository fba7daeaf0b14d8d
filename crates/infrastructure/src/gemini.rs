//! Gemini 生成式回复客户端
//!
//! 调用 `generateContent` 为被标记的用户生成简短的安抚回复。超时与兜底模板由
//! 应用层的 `SoothingReplies` 负责，这里只把失败报告为 [`ReplyError`]。

use application::{ReplyError, ReplyGenerator};
use async_trait::async_trait;
use config::ModerationConfig;
use serde::{Deserialize, Serialize};

const MAX_OUTPUT_TOKENS: u32 = 150;
const TEMPERATURE: f32 = 0.7;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    max_output_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Content,
}

fn soothing_prompt(content: &str, username: &str) -> String {
    format!(
        "A user named \"{username}\" sent this message in a group chat that was flagged for \
         potentially harsh language: \"{content}\". Please write a SHORT, warm, and empathetic \
         message (2-3 sentences max) from a chat bot to this user. The goal is to gently remind \
         them to keep the conversation friendly, without lecturing them or being preachy. Be \
         understanding and human. Don't repeat \"I understand\" too much. Keep it light and caring."
    )
}

pub struct GeminiReplyGenerator {
    endpoint: String,
    model: String,
    api_key: String,
    http_client: reqwest::Client,
}

impl GeminiReplyGenerator {
    pub fn new(
        endpoint: impl Into<String>,
        model: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            model: model.into(),
            api_key: api_key.into(),
            http_client: reqwest::Client::new(),
        }
    }

    /// 未配置 API key 时返回 `None`，调用方只使用本地模板
    pub fn from_config(config: &ModerationConfig) -> Option<Self> {
        let api_key = config.gemini_api_key.as_deref()?.trim();
        if api_key.is_empty() {
            return None;
        }
        Some(Self::new(
            config.gemini_endpoint.clone(),
            config.gemini_model.clone(),
            api_key,
        ))
    }

    fn url(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.endpoint.trim_end_matches('/'),
            self.model
        )
    }
}

#[async_trait]
impl ReplyGenerator for GeminiReplyGenerator {
    async fn generate(&self, content: &str, username: &str) -> Result<String, ReplyError> {
        let request = GenerateRequest {
            contents: vec![Content {
                parts: vec![Part {
                    text: soothing_prompt(content, username),
                }],
            }],
            generation_config: GenerationConfig {
                max_output_tokens: MAX_OUTPUT_TOKENS,
                temperature: TEMPERATURE,
            },
        };

        let response = self
            .http_client
            .post(self.url())
            .query(&[("key", self.api_key.as_str())])
            .json(&request)
            .send()
            .await
            .map_err(|err| ReplyError::Request(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ReplyError::Request(format!("Gemini API error: {status} - {body}")));
        }

        let body: GenerateResponse = response
            .json()
            .await
            .map_err(|err| ReplyError::Malformed(err.to_string()))?;

        body.candidates
            .into_iter()
            .next()
            .and_then(|candidate| candidate.content.parts.into_iter().next())
            .map(|part| part.text)
            .ok_or_else(|| ReplyError::Malformed("response has no candidate text".to_string()))
    }
}
