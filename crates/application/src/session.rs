//! 连接生命周期与房间加入/离开

use std::sync::Arc;

use domain::{ConnectionId, MemberSummary, RoomKey, ServerEvent, UserProfile};

use crate::{
    access::RoomAccess,
    context::ConnectionContext,
    error::ApplicationError,
    presence::PresenceTracker,
    registry::{ConnectionRegistry, Outbox, PresenceTransition},
    router::RoomRouter,
};

pub struct SessionService {
    presence: PresenceTracker,
    access: RoomAccess,
    router: RoomRouter,
    registry: Arc<ConnectionRegistry>,
}

impl SessionService {
    pub fn new(presence: PresenceTracker, access: RoomAccess, router: RoomRouter) -> Self {
        Self {
            presence,
            access,
            registry: router.registry().clone(),
            router,
        }
    }

    /// 接纳一条已认证的连接
    pub async fn connect(
        &self,
        connection_id: ConnectionId,
        user: UserProfile,
        outbox: Outbox,
    ) -> (ConnectionContext, PresenceTransition) {
        let ctx = ConnectionContext::new(connection_id, user.clone());
        let transition = self.presence.connect(connection_id, user, outbox).await;
        tracing::info!(
            connection_id = %connection_id,
            user_id = %ctx.user.id,
            username = %ctx.user.username,
            "连接已接纳"
        );
        (ctx, transition)
    }

    pub async fn disconnect(&self, ctx: &ConnectionContext) -> PresenceTransition {
        let transition = self
            .presence
            .disconnect(ctx.connection_id)
            .await
            .map(|(_, transition)| transition)
            .unwrap_or(PresenceTransition::Unchanged);
        tracing::info!(
            connection_id = %ctx.connection_id,
            user_id = %ctx.user.id,
            "连接已关闭"
        );
        transition
    }

    /// 加入聊天室会自动成为成员；加入私信会话必须是参与者
    pub async fn join(&self, ctx: &ConnectionContext, room: RoomKey) -> Result<(), ApplicationError> {
        let members = match room {
            RoomKey::Chatroom(id) => {
                self.access.chatrooms().add_member(id, ctx.user.id).await?;
                self.access.chatrooms().members(id).await?
            }
            RoomKey::Conversation(id) => {
                self.access.ensure_can_post(room, ctx.user.id).await?;
                self.access.conversations().participants(id).await?
            }
        };

        let newly_joined = self.registry.join_room(ctx.connection_id, room).await;
        tracing::info!(
            connection_id = %ctx.connection_id,
            user_id = %ctx.user.id,
            room = %room,
            newly_joined,
            "加入房间"
        );

        let snapshot = self.member_summaries(members).await;
        self.router
            .unicast(
                ctx.connection_id,
                ServerEvent::Members {
                    room_id: room,
                    members: snapshot,
                },
            )
            .await;

        if newly_joined && !room.is_conversation() {
            self.router
                .broadcast(
                    room,
                    ServerEvent::MemberJoined {
                        room_id: room,
                        user: ctx.user.clone(),
                    },
                    Some(ctx.connection_id),
                )
                .await;
        }
        Ok(())
    }

    pub async fn leave(&self, ctx: &ConnectionContext, room: RoomKey) {
        if !self.registry.leave_room(ctx.connection_id, room).await {
            return;
        }
        tracing::info!(connection_id = %ctx.connection_id, room = %room, "离开房间");

        if !room.is_conversation() {
            self.router
                .broadcast(
                    room,
                    ServerEvent::MemberLeft {
                        room_id: room,
                        user_id: ctx.user.id,
                    },
                    None,
                )
                .await;
        }
    }

    /// 成员的在线标记来自连接注册表
    async fn member_summaries(&self, members: Vec<UserProfile>) -> Vec<MemberSummary> {
        let ids: Vec<_> = members.iter().map(|member| member.id).collect();
        let online = self.registry.online_among(&ids).await;
        members
            .into_iter()
            .map(|member| {
                let is_online = online.contains(&member.id);
                MemberSummary {
                    is_online,
                    ..MemberSummary::from(member)
                }
            })
            .collect()
    }
}
