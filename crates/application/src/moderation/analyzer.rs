use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

use domain::Verdict;

/// 敏感信息模式，匹配对象是小写化后的内容。
/// 数字和单词边界只按 ASCII 解释，`\s` 仍包含 Unicode 空白。
const SENSITIVE_PATTERNS: &[&str] = &[
    r"(?-u:\b)[0-9]{6}(?-u:\b)",
    r"one[.\s-]?time[.\s-]?password",
    r"(?-u:\b)password[\s:]+\S+",
    r"(?-u:\b)4[0-9]{15}(?-u:\b)",
    r"(?-u:\b)5[1-5][0-9]{14}(?-u:\b)",
    r"(?-u:\b)[0-9]{4}[\s-][0-9]{4}[\s-][0-9]{4}[\s-][0-9]{4}(?-u:\b)",
    r"(?-u:\b)[0-9]{3}-[0-9]{2}-[0-9]{4}(?-u:\b)",
    r"cvv[\s:]+[0-9]{3,4}",
    r"(?-u:\b)iban[\s:]+[a-z]{2}[0-9]{2}",
];

/// `otp` 标签后的字母数字验证码，字母和数字都必须出现
const LABELED_OTP_PATTERN: &str = r"(?-u:\b)otp[\s:]+([a-z0-9]{4,8})(?-u:\b)";

const TOXIC_PHRASES: &[&str] = &[
    "idiot",
    "stupid",
    "dumb",
    "moron",
    "loser",
    "trash",
    "worthless",
    "shut up",
    "go to hell",
    "drop dead",
    "get lost",
    "hate you",
    "kill yourself",
    "end yourself",
    "kys",
];

struct CompiledPatterns {
    sensitive: Vec<Regex>,
    labeled_otp: Regex,
}

// `Regex::is_match` 不保留任何匹配位置，每次调用都从头开始
static PATTERNS: Lazy<Result<CompiledPatterns, regex::Error>> = Lazy::new(|| {
    Ok(CompiledPatterns {
        sensitive: SENSITIVE_PATTERNS
            .iter()
            .map(|pattern| Regex::new(pattern))
            .collect::<Result<_, _>>()?,
        labeled_otp: Regex::new(LABELED_OTP_PATTERN)?,
    })
});

#[derive(Debug, Error)]
pub enum AnalyzerError {
    #[error("pattern compilation failed: {0}")]
    Pattern(String),
}

/// 内容分析器：敏感信息检查优先，命中后不再评估不良言论
#[derive(Debug, Clone)]
pub struct ContentAnalyzer {
    troll_threshold: usize,
}

impl Default for ContentAnalyzer {
    fn default() -> Self {
        Self::new(1)
    }
}

impl ContentAnalyzer {
    pub fn new(troll_threshold: usize) -> Self {
        Self {
            troll_threshold: troll_threshold.max(1),
        }
    }

    pub fn from_config(config: &config::ModerationConfig) -> Self {
        Self::new(config.troll_threshold)
    }

    pub fn analyze(&self, content: &str) -> Result<Verdict, AnalyzerError> {
        let lower = content.to_lowercase();

        if is_sensitive(&lower)? {
            return Ok(Verdict {
                is_sensitive: true,
                ..Verdict::clean()
            });
        }

        let matched = toxic_phrases(&lower);
        if !matched.is_empty() && matched.len() >= self.troll_threshold {
            return Ok(Verdict {
                is_troll: true,
                matched_phrases: matched.into_iter().map(str::to_string).collect(),
                ..Verdict::clean()
            });
        }

        Ok(Verdict::clean())
    }
}

/// 任意一个模式命中即视为敏感。`lower` 必须已经小写化。
pub fn is_sensitive(lower: &str) -> Result<bool, AnalyzerError> {
    let patterns = PATTERNS
        .as_ref()
        .map_err(|err| AnalyzerError::Pattern(err.to_string()))?;

    if patterns.sensitive.iter().any(|pattern| pattern.is_match(lower)) {
        return Ok(true);
    }

    Ok(patterns.labeled_otp.captures_iter(lower).any(|captures| {
        let Some(token) = captures.get(1) else {
            return false;
        };
        let rest = &lower[token.start()..];
        rest.chars().any(|c| c.is_ascii_lowercase()) && rest.chars().any(|c| c.is_ascii_digit())
    }))
}

/// 命中的不同短语（按出现与否计数，而不是出现次数）
pub fn toxic_phrases(lower: &str) -> Vec<&'static str> {
    TOXIC_PHRASES
        .iter()
        .copied()
        .filter(|phrase| lower.contains(phrase))
        .collect()
}

pub fn toxicity_score(lower: &str) -> usize {
    toxic_phrases(lower).len()
}
