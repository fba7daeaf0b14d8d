use std::sync::Arc;

use domain::{ChatroomRepository, ConversationRepository, DomainError, RoomKey, UserId};

use crate::error::ApplicationError;

/// 房间访问检查：聊天室看持久成员关系，私信会话看两名固定参与者。
/// 总是查询存储而不是连接注册表。
#[derive(Clone)]
pub struct RoomAccess {
    chatrooms: Arc<dyn ChatroomRepository>,
    conversations: Arc<dyn ConversationRepository>,
}

impl RoomAccess {
    pub fn new(
        chatrooms: Arc<dyn ChatroomRepository>,
        conversations: Arc<dyn ConversationRepository>,
    ) -> Self {
        Self {
            chatrooms,
            conversations,
        }
    }

    pub fn chatrooms(&self) -> &Arc<dyn ChatroomRepository> {
        &self.chatrooms
    }

    pub fn conversations(&self) -> &Arc<dyn ConversationRepository> {
        &self.conversations
    }

    pub async fn ensure_can_post(&self, room: RoomKey, user_id: UserId) -> Result<(), ApplicationError> {
        let allowed = match room {
            RoomKey::Chatroom(id) => self.chatrooms.is_member(id, user_id).await?,
            RoomKey::Conversation(id) => self.conversations.is_participant(id, user_id).await?,
        };

        if allowed {
            Ok(())
        } else {
            Err(DomainError::AccessDenied.into())
        }
    }
}
