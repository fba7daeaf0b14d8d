use std::{collections::HashMap, sync::Arc};

use domain::{ConnectionId, ServerEvent, UserId, UserProfile, UserRepository};
use tokio::sync::Mutex;

use crate::{
    registry::{ConnectionRegistry, Outbox, PresenceTransition},
    router::RoomRouter,
};

/// 在线状态跟踪器
///
/// 在线状态完全由连接注册表推导：用户至少拥有一条连接即在线。
/// 只在 0 -> 1 和 1 -> 0 两个转换点广播，并尽力更新持久化的在线标记。
///
/// 注册表变更、事件入队和持久化序号分配在同一把锁内完成，
/// 观察者看到的上线/离线事件顺序与转换顺序一致。
pub struct PresenceTracker {
    registry: Arc<ConnectionRegistry>,
    router: RoomRouter,
    users: Arc<dyn UserRepository>,
    /// 转换序号，持有期间完成注册表变更与事件入队
    transitions: Mutex<u64>,
    /// 每个用户已尝试写入存储的最新转换序号
    flag_writes: Arc<Mutex<HashMap<UserId, u64>>>,
}

impl PresenceTracker {
    pub fn new(router: RoomRouter, users: Arc<dyn UserRepository>) -> Self {
        Self {
            registry: router.registry().clone(),
            router,
            users,
            transitions: Mutex::new(0),
            flag_writes: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub async fn connect(
        &self,
        connection_id: ConnectionId,
        user: UserProfile,
        outbox: Outbox,
    ) -> PresenceTransition {
        let user_id = user.id;
        let username = user.username.clone();

        let mut seq = self.transitions.lock().await;
        let transition = self.registry.register(connection_id, user, outbox).await;
        if transition == PresenceTransition::CameOnline {
            self.router
                .broadcast_except_user(user_id, ServerEvent::PresenceOnline { user_id, username })
                .await;
            *seq += 1;
            self.persist_flag(user_id, true, *seq);
            tracing::info!(user_id = %user_id, "用户上线");
        }
        transition
    }

    /// 注销连接。连接未注册时返回 `None`。
    pub async fn disconnect(
        &self,
        connection_id: ConnectionId,
    ) -> Option<(UserProfile, PresenceTransition)> {
        let mut seq = self.transitions.lock().await;
        let (user, transition) = self.registry.unregister(connection_id).await?;
        if transition == PresenceTransition::WentOffline {
            self.router
                .broadcast_except_user(user.id, ServerEvent::PresenceOffline { user_id: user.id })
                .await;
            *seq += 1;
            self.persist_flag(user.id, false, *seq);
            tracing::info!(user_id = %user.id, "用户离线");
        }
        Some((user, transition))
    }

    /// 后台尽力而为的更新，失败只记录日志。落后于已尝试序号的更新被丢弃。
    fn persist_flag(&self, user_id: UserId, online: bool, seq: u64) {
        let users = self.users.clone();
        let flag_writes = self.flag_writes.clone();
        tokio::spawn(async move {
            let mut applied = flag_writes.lock().await;
            if applied.get(&user_id).is_some_and(|latest| *latest > seq) {
                tracing::debug!(user_id = %user_id, online, "跳过过期的在线状态更新");
                return;
            }
            if let Err(err) = users.set_online(user_id, online).await {
                tracing::warn!(user_id = %user_id, online, error = %err, "更新在线状态失败");
            }
            applied.insert(user_id, seq);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::{repositories::MockUserRepository, RepositoryError};
    use tokio::sync::mpsc;

    fn tracker(users: MockUserRepository) -> (PresenceTracker, Arc<ConnectionRegistry>) {
        let registry = Arc::new(ConnectionRegistry::new());
        let router = RoomRouter::new(registry.clone());
        (PresenceTracker::new(router, Arc::new(users)), registry)
    }

    #[tokio::test]
    async fn online_event_goes_to_others_once() {
        let mut users = MockUserRepository::new();
        users.expect_set_online().returning(|_, _| Ok(()));
        let (tracker, _) = tracker(users);

        let (observer_tx, mut observer_rx) = mpsc::unbounded_channel();
        let observer = UserProfile::new(UserId::generate(), "observer", None);
        tracker
            .connect(ConnectionId::generate(), observer, observer_tx)
            .await;

        let alice = UserProfile::new(UserId::generate(), "alice", None);
        let (alice_tx, mut alice_rx) = mpsc::unbounded_channel();
        let first = ConnectionId::generate();
        let second = ConnectionId::generate();
        tracker.connect(first, alice.clone(), alice_tx.clone()).await;
        tracker.connect(second, alice.clone(), alice_tx).await;

        assert_eq!(
            observer_rx.try_recv().unwrap(),
            ServerEvent::PresenceOnline {
                user_id: alice.id,
                username: "alice".into()
            }
        );
        assert!(observer_rx.try_recv().is_err());
        assert!(alice_rx.try_recv().is_err());

        tracker.disconnect(first).await;
        assert!(observer_rx.try_recv().is_err());

        tracker.disconnect(second).await;
        assert_eq!(
            observer_rx.try_recv().unwrap(),
            ServerEvent::PresenceOffline { user_id: alice.id }
        );
    }

    #[tokio::test]
    async fn storage_failure_does_not_block_presence() {
        let mut users = MockUserRepository::new();
        users
            .expect_set_online()
            .returning(|_, _| Err(RepositoryError::storage("down")));
        let (tracker, registry) = tracker(users);

        let user = UserProfile::new(UserId::generate(), "zoe", None);
        let (tx, _rx) = mpsc::unbounded_channel();
        let transition = tracker.connect(ConnectionId::generate(), user.clone(), tx).await;

        assert_eq!(transition, PresenceTransition::CameOnline);
        assert!(registry.is_online(user.id).await);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_handover_keeps_presence_order() {
        let writes = Arc::new(std::sync::Mutex::new(Vec::new()));
        let mut users = MockUserRepository::new();
        let recorded = writes.clone();
        users.expect_set_online().returning(move |_, online| {
            recorded.lock().unwrap().push(online);
            Ok(())
        });
        let (tracker, registry) = tracker(users);
        let tracker = Arc::new(tracker);

        let (observer_tx, mut observer_rx) = mpsc::unbounded_channel();
        let observer = UserProfile::new(UserId::generate(), "observer", None);
        tracker
            .connect(ConnectionId::generate(), observer, observer_tx)
            .await;

        let alice = UserProfile::new(UserId::generate(), "alice", None);
        let mut current = ConnectionId::generate();
        let (tx, _alice_rx) = mpsc::unbounded_channel();
        tracker.connect(current, alice.clone(), tx.clone()).await;

        // 旧连接断开与新连接建立并发进行
        for _ in 0..200 {
            let next = ConnectionId::generate();
            let leaving = tokio::spawn({
                let tracker = tracker.clone();
                async move { tracker.disconnect(current).await }
            });
            let arriving = tokio::spawn({
                let tracker = tracker.clone();
                let alice = alice.clone();
                let tx = tx.clone();
                async move { tracker.connect(next, alice, tx).await }
            });
            leaving.await.unwrap();
            arriving.await.unwrap();
            current = next;
        }

        let mut expect_online = true;
        while let Ok(event) = observer_rx.try_recv() {
            match event {
                ServerEvent::PresenceOnline { .. } => assert!(expect_online),
                ServerEvent::PresenceOffline { .. } => assert!(!expect_online),
                other => panic!("unexpected {other:?}"),
            }
            expect_online = !expect_online;
        }
        // 最后一条事件必须是上线
        assert!(!expect_online);
        assert!(registry.is_online(alice.id).await);

        tokio::time::sleep(std::time::Duration::from_millis(200)).await;
        assert_eq!(writes.lock().unwrap().last().copied(), Some(true));
    }
}
