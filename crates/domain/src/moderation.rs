//! 内容审核相关的值对象

use serde::{Deserialize, Serialize};

use crate::value_objects::{RoomKey, UserId};

/// 内容分析器的审核结论
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Verdict {
    pub is_sensitive: bool,
    pub is_troll: bool,
    /// 命中的不良短语（去重），只在 `is_troll` 时非空
    #[serde(skip)]
    pub matched_phrases: Vec<String>,
    /// 安抚回复，投递后在后台生成并填充
    pub soothing_message: Option<String>,
}

impl Verdict {
    /// 分析失败时使用的干净结论，审核缺陷不能阻塞消息投递
    pub fn clean() -> Self {
        Self::default()
    }

    pub fn is_clean(&self) -> bool {
        !self.is_sensitive && !self.is_troll
    }
}

/// 只追加的不良言论日志，核心流程从不回读
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrollLogEntry {
    pub user_id: UserId,
    pub room: RoomKey,
    pub reason: String,
    pub reply: String,
}

impl TrollLogEntry {
    /// 由已填充安抚回复的审核结论生成日志条目
    pub fn from_verdict(user_id: UserId, room: RoomKey, verdict: &Verdict) -> Self {
        Self {
            user_id,
            room,
            reason: format!("Pattern match: {}", verdict.matched_phrases.join(", ")),
            reply: verdict.soothing_message.clone().unwrap_or_default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn troll_log_entry_names_matched_phrases() {
        let verdict = Verdict {
            is_troll: true,
            matched_phrases: vec!["stupid".into(), "idiot".into()],
            soothing_message: Some("Let's keep it kind".into()),
            ..Verdict::clean()
        };
        let room = RoomKey::chatroom(Uuid::new_v4());
        let entry = TrollLogEntry::from_verdict(UserId::generate(), room, &verdict);
        assert_eq!(entry.reason, "Pattern match: stupid, idiot");
        assert_eq!(entry.reply, "Let's keep it kind");
        assert_eq!(entry.room, room);
    }
}
