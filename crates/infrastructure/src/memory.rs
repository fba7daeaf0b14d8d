//! 内存存储
//!
//! 实现全部存储协作方接口，用于本地运行和端到端测试。进程退出即丢失。

use std::{collections::HashMap, sync::Arc};

use application::{Clock, SystemClock};
use async_trait::async_trait;
use domain::{
    ChatroomId, ChatroomRepository, ConversationId, ConversationRepository, MessageId,
    MessagePatch, MessageRepository, NewMessage, ReplyContext, RepositoryError, RepositoryResult,
    RoomKey, StoredMessage, Timestamp, TrollLogEntry, TrollLogRepository, UpdateGuard, UserId,
    UserProfile, UserRepository,
};
use tokio::sync::RwLock;

#[derive(Debug, Clone)]
struct UserRow {
    profile: UserProfile,
    is_online: bool,
    last_seen: Option<Timestamp>,
}

#[derive(Default)]
struct MemoryState {
    users: HashMap<UserId, UserRow>,
    /// 按加入顺序保存的成员
    chatrooms: HashMap<ChatroomId, Vec<UserId>>,
    conversations: HashMap<ConversationId, [UserId; 2]>,
    messages: HashMap<MessageId, StoredMessage>,
    troll_logs: Vec<TrollLogEntry>,
}

impl MemoryState {
    fn profiles(&self, ids: &[UserId]) -> Vec<UserProfile> {
        ids.iter()
            .filter_map(|id| self.users.get(id))
            .map(|row| row.profile.clone())
            .collect()
    }
}

pub struct InMemoryChatStore {
    state: RwLock<MemoryState>,
    clock: Arc<dyn Clock>,
}

impl Default for InMemoryChatStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryChatStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: RwLock::new(MemoryState::default()),
            clock,
        }
    }

    pub async fn add_user(&self, profile: UserProfile) {
        let mut state = self.state.write().await;
        state.users.insert(
            profile.id,
            UserRow {
                profile,
                is_online: false,
                last_seen: None,
            },
        );
    }

    pub async fn create_chatroom(&self) -> ChatroomId {
        let id = ChatroomId::generate();
        self.state.write().await.chatrooms.insert(id, Vec::new());
        id
    }

    pub async fn create_conversation(&self, first: UserId, second: UserId) -> ConversationId {
        let id = ConversationId::generate();
        self.state
            .write()
            .await
            .conversations
            .insert(id, [first, second]);
        id
    }

    pub async fn message(&self, id: MessageId) -> Option<StoredMessage> {
        self.state.read().await.messages.get(&id).cloned()
    }

    /// 某个房间的全部消息，按创建时间排序
    pub async fn messages_in(&self, room: RoomKey) -> Vec<StoredMessage> {
        let state = self.state.read().await;
        let mut messages: Vec<_> = state
            .messages
            .values()
            .filter(|m| m.destination == room)
            .cloned()
            .collect();
        messages.sort_by_key(|m| m.created_at);
        messages
    }

    pub async fn troll_logs(&self) -> Vec<TrollLogEntry> {
        self.state.read().await.troll_logs.clone()
    }

    /// 持久化的在线标记与最后在线时间
    pub async fn presence_flag(&self, user_id: UserId) -> Option<(bool, Option<Timestamp>)> {
        self.state
            .read()
            .await
            .users
            .get(&user_id)
            .map(|row| (row.is_online, row.last_seen))
    }
}

#[async_trait]
impl UserRepository for InMemoryChatStore {
    async fn find_profile(&self, user_id: UserId) -> RepositoryResult<Option<UserProfile>> {
        Ok(self
            .state
            .read()
            .await
            .users
            .get(&user_id)
            .map(|row| row.profile.clone()))
    }

    async fn set_online(&self, user_id: UserId, online: bool) -> RepositoryResult<()> {
        let now = self.clock.now();
        let mut state = self.state.write().await;
        let row = state
            .users
            .get_mut(&user_id)
            .ok_or(RepositoryError::NotFound)?;
        row.is_online = online;
        row.last_seen = Some(now);
        Ok(())
    }
}

#[async_trait]
impl ChatroomRepository for InMemoryChatStore {
    async fn is_member(&self, chatroom_id: ChatroomId, user_id: UserId) -> RepositoryResult<bool> {
        Ok(self
            .state
            .read()
            .await
            .chatrooms
            .get(&chatroom_id)
            .is_some_and(|members| members.contains(&user_id)))
    }

    async fn add_member(&self, chatroom_id: ChatroomId, user_id: UserId) -> RepositoryResult<()> {
        let mut state = self.state.write().await;
        if !state.users.contains_key(&user_id) {
            return Err(RepositoryError::NotFound);
        }
        let members = state
            .chatrooms
            .get_mut(&chatroom_id)
            .ok_or(RepositoryError::NotFound)?;
        if !members.contains(&user_id) {
            members.push(user_id);
        }
        Ok(())
    }

    async fn members(&self, chatroom_id: ChatroomId) -> RepositoryResult<Vec<UserProfile>> {
        let state = self.state.read().await;
        let members = state
            .chatrooms
            .get(&chatroom_id)
            .ok_or(RepositoryError::NotFound)?;
        Ok(state.profiles(members))
    }
}

#[async_trait]
impl ConversationRepository for InMemoryChatStore {
    async fn is_participant(
        &self,
        conversation_id: ConversationId,
        user_id: UserId,
    ) -> RepositoryResult<bool> {
        Ok(self
            .state
            .read()
            .await
            .conversations
            .get(&conversation_id)
            .is_some_and(|pair| pair.contains(&user_id)))
    }

    async fn participants(
        &self,
        conversation_id: ConversationId,
    ) -> RepositoryResult<Vec<UserProfile>> {
        let state = self.state.read().await;
        let pair = state
            .conversations
            .get(&conversation_id)
            .ok_or(RepositoryError::NotFound)?;
        Ok(state.profiles(pair))
    }

    async fn partner_of(
        &self,
        conversation_id: ConversationId,
        excluding: UserId,
    ) -> RepositoryResult<Option<UserId>> {
        Ok(self
            .state
            .read()
            .await
            .conversations
            .get(&conversation_id)
            .and_then(|pair| pair.iter().copied().find(|id| *id != excluding)))
    }
}

#[async_trait]
impl MessageRepository for InMemoryChatStore {
    async fn insert(&self, message: NewMessage) -> RepositoryResult<StoredMessage> {
        let now = self.clock.now();
        let mut state = self.state.write().await;

        if !state.users.contains_key(&message.sender_id) {
            return Err(RepositoryError::NotFound);
        }
        let destination_exists = match message.message.destination {
            RoomKey::Chatroom(id) => state.chatrooms.contains_key(&id),
            RoomKey::Conversation(id) => state.conversations.contains_key(&id),
        };
        if !destination_exists {
            return Err(RepositoryError::NotFound);
        }

        let stored = StoredMessage::from_new(MessageId::generate(), message, now);
        state.messages.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn update(
        &self,
        id: MessageId,
        patch: MessagePatch,
        owner: UserId,
        guard: UpdateGuard,
    ) -> RepositoryResult<Option<StoredMessage>> {
        let now = self.clock.now();
        let mut state = self.state.write().await;
        match state.messages.get_mut(&id) {
            Some(message) if message.admits(owner, guard) => {
                message.apply(&patch, now);
                Ok(Some(message.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn reply_context(&self, id: MessageId) -> RepositoryResult<Option<ReplyContext>> {
        let state = self.state.read().await;
        Ok(state.messages.get(&id).map(|message| {
            let sender = state
                .users
                .get(&message.sender_id)
                .map(|row| row.profile.username.clone());
            ReplyContext::new(sender, message.content.clone())
        }))
    }
}

#[async_trait]
impl TrollLogRepository for InMemoryChatStore {
    async fn append(&self, entry: TrollLogEntry) -> RepositoryResult<()> {
        self.state.write().await.troll_logs.push(entry);
        Ok(())
    }
}

/// 本地运行时预置的演示数据
pub struct DemoSeed {
    pub users: Vec<UserProfile>,
    pub lobby: ChatroomId,
    pub conversation: ConversationId,
}

impl InMemoryChatStore {
    /// 预置两个用户、一个公共聊天室和他们之间的私信会话
    pub async fn seed_demo(&self) -> DemoSeed {
        let alice = UserProfile::new(UserId::generate(), "alice", None);
        let bob = UserProfile::new(UserId::generate(), "bob", None);
        self.add_user(alice.clone()).await;
        self.add_user(bob.clone()).await;
        let lobby = self.create_chatroom().await;
        let conversation = self.create_conversation(alice.id, bob.id).await;

        DemoSeed {
            users: vec![alice, bob],
            lobby,
            conversation,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use domain::{MessageKind, OutgoingMessage, DELETED_PLACEHOLDER};
    use std::sync::Mutex;

    struct StepClock(Mutex<Timestamp>);

    impl Clock for StepClock {
        fn now(&self) -> Timestamp {
            let mut now = self.0.lock().unwrap();
            *now += Duration::seconds(1);
            *now
        }
    }

    fn store() -> InMemoryChatStore {
        InMemoryChatStore::with_clock(Arc::new(StepClock(Mutex::new(
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        ))))
    }

    async fn user(store: &InMemoryChatStore, name: &str) -> UserProfile {
        let profile = UserProfile::new(UserId::generate(), name, None);
        store.add_user(profile.clone()).await;
        profile
    }

    #[tokio::test]
    async fn add_member_is_idempotent_and_rejects_unknown_rooms() {
        let store = store();
        let alice = user(&store, "alice").await;
        let room = store.create_chatroom().await;

        store.add_member(room, alice.id).await.unwrap();
        store.add_member(room, alice.id).await.unwrap();
        assert_eq!(store.members(room).await.unwrap(), vec![alice.clone()]);
        assert!(store.is_member(room, alice.id).await.unwrap());

        assert_eq!(
            store.add_member(ChatroomId::generate(), alice.id).await,
            Err(RepositoryError::NotFound)
        );
    }

    #[tokio::test]
    async fn conditional_update_honours_owner_and_guard() {
        let store = store();
        let alice = user(&store, "alice").await;
        let bob = user(&store, "bob").await;
        let room = store.create_chatroom().await;

        let mut attachment = OutgoingMessage::text(RoomKey::chatroom(room), "caption");
        attachment.kind = MessageKind::Image;
        let image = store
            .insert(NewMessage {
                sender_id: alice.id,
                message: attachment,
                flagged_sensitive: false,
            })
            .await
            .unwrap();
        let text = store
            .insert(NewMessage {
                sender_id: alice.id,
                message: OutgoingMessage::text(RoomKey::chatroom(room), "hello"),
                flagged_sensitive: false,
            })
            .await
            .unwrap();

        let edit = MessagePatch::Edit {
            content: "changed".into(),
        };
        // 非发送者
        assert_eq!(
            store.update(text.id, edit.clone(), bob.id, edit.guard()).await,
            Ok(None)
        );
        // 非文本消息不能编辑
        assert_eq!(
            store.update(image.id, edit.clone(), alice.id, edit.guard()).await,
            Ok(None)
        );

        let edited = store
            .update(text.id, edit.clone(), alice.id, edit.guard())
            .await
            .unwrap()
            .unwrap();
        assert!(edited.is_edited);
        assert!(edited.updated_at > text.updated_at);

        let deleted = store
            .update(text.id, MessagePatch::Tombstone, alice.id, UpdateGuard::NotDeleted)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(deleted.content.as_deref(), Some(DELETED_PLACEHOLDER));
        // 已删除的消息不再接受任何补丁
        assert_eq!(
            store
                .update(text.id, MessagePatch::Tombstone, alice.id, UpdateGuard::NotDeleted)
                .await,
            Ok(None)
        );
        assert_eq!(store.messages_in(RoomKey::chatroom(room)).await.len(), 2);
    }

    #[tokio::test]
    async fn reply_context_and_partner_lookup() {
        let store = store();
        let alice = user(&store, "alice").await;
        let bob = user(&store, "bob").await;
        let conversation = store.create_conversation(alice.id, bob.id).await;

        let original = store
            .insert(NewMessage {
                sender_id: bob.id,
                message: OutgoingMessage::text(RoomKey::conversation(conversation), "y".repeat(150)),
                flagged_sensitive: false,
            })
            .await
            .unwrap();

        let context = store.reply_context(original.id).await.unwrap().unwrap();
        assert_eq!(context.sender_username.as_deref(), Some("bob"));
        assert_eq!(context.content.unwrap().chars().count(), 100);

        assert_eq!(
            store.partner_of(conversation, alice.id).await.unwrap(),
            Some(bob.id)
        );
        assert!(!store
            .is_participant(conversation, UserId::generate())
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn set_online_records_last_seen() {
        let store = store();
        let alice = user(&store, "alice").await;

        store.set_online(alice.id, true).await.unwrap();
        let (online, seen) = store.presence_flag(alice.id).await.unwrap();
        assert!(online);
        assert!(seen.is_some());

        assert_eq!(
            store.set_online(UserId::generate(), true).await,
            Err(RepositoryError::NotFound)
        );
    }
}
