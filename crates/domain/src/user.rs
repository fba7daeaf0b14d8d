//! 用户运行时视图

use serde::{Deserialize, Serialize};

use crate::value_objects::UserId;

/// 接纳连接时附加的不可变用户快照，事件处理过程中不会重新查询。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: UserId,
    pub username: String,
    pub avatar_url: Option<String>,
}

impl UserProfile {
    pub fn new(id: UserId, username: impl Into<String>, avatar_url: Option<String>) -> Self {
        Self {
            id,
            username: username.into(),
            avatar_url,
        }
    }
}

/// 房间成员列表中的一项。`is_online` 由连接注册表推导，而不是读取数据库字段。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberSummary {
    pub id: UserId,
    pub username: String,
    pub avatar_url: Option<String>,
    pub is_online: bool,
}

impl From<UserProfile> for MemberSummary {
    fn from(profile: UserProfile) -> Self {
        Self {
            id: profile.id,
            username: profile.username,
            avatar_url: profile.avatar_url,
            is_online: false,
        }
    }
}
