use std::sync::Arc;

use application::{ChatRelay, ConnectionContext, Outbox};
use axum::extract::ws::{Message as WsMessage, WebSocket};
use domain::{ClientEvent, ServerEvent, UserProfile};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, oneshot};

/// WebSocket 连接管理器
///
/// 一条 socket 对应一条中继连接：
/// - 出站：中继投递到出站队列的事件按顺序序列化为 JSON 文本帧
/// - 入站：文本帧解析为客户端事件，逐条交给中继处理
/// - 协议层 ping 直接回 pong
/// - socket 关闭时注销连接
pub struct WebSocketConnection {
    socket: WebSocket,
    relay: Arc<ChatRelay>,
    ctx: ConnectionContext,
    outbox: Outbox,
    outbound: mpsc::UnboundedReceiver<ServerEvent>,
}

impl WebSocketConnection {
    /// 向中继注册连接。调用前用户身份必须已经验证。
    pub async fn accept(socket: WebSocket, relay: Arc<ChatRelay>, user: UserProfile) -> Self {
        let (outbox, outbound) = mpsc::unbounded_channel();
        let ctx = relay.connect(user, outbox.clone()).await;

        tracing::info!(
            connection_id = %ctx.connection_id,
            user_id = %ctx.user.id,
            "WebSocket 连接已建立"
        );

        Self {
            socket,
            relay,
            ctx,
            outbox,
            outbound,
        }
    }

    /// 运行连接主循环，直到任意一端断开
    pub async fn run(self) {
        let Self {
            socket,
            relay,
            ctx,
            outbox,
            mut outbound,
        } = self;
        let (mut sender, mut incoming) = socket.split();

        // 创建 mpsc channel 来解耦对 sender 的访问
        let (cmd_tx, mut cmd_rx) = mpsc::channel::<WsCommand>(32);

        // 发送任务：统一处理所有对 WebSocket sender 的写操作
        let mut send_task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    Some(cmd) = cmd_rx.recv() => {
                        match cmd {
                            WsCommand::SendPong(data) => {
                                if sender.send(WsMessage::Pong(data.into())).await.is_err() {
                                    tracing::warn!("Failed to send pong message");
                                    break;
                                }
                            }
                        }
                    }
                    Some(event) = outbound.recv() => {
                        let payload = match serde_json::to_string(&event) {
                            Ok(json) => json,
                            Err(err) => {
                                tracing::warn!(error = %err, "failed to serialize websocket payload");
                                continue;
                            }
                        };
                        if sender.send(WsMessage::Text(payload.into())).await.is_err() {
                            tracing::warn!("Failed to send text message");
                            break;
                        }
                    }
                    else => break,
                }
            }
        });

        // 接收任务：同一连接的事件严格按到达顺序处理。
        // 停止信号只在两帧之间生效，正在处理的事件总会执行完毕。
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
        let mut recv_task = tokio::spawn({
            let relay = relay.clone();
            let ctx = ctx.clone();
            async move {
                loop {
                    let message = tokio::select! {
                        biased;
                        _ = &mut stop_rx => break,
                        frame = incoming.next() => match frame {
                            Some(Ok(message)) => message,
                            _ => break,
                        },
                    };
                    if Self::handle_incoming(message, &relay, &ctx, &outbox, &cmd_tx)
                        .await
                        .is_err()
                    {
                        break;
                    }
                }
            }
        });

        let send_finished = tokio::select! {
            _ = &mut send_task => true,
            _ = &mut recv_task => false,
        };
        if send_finished {
            tracing::debug!(connection_id = %ctx.connection_id, "WebSocket发送任务完成");
            let _ = stop_tx.send(());
            if let Err(err) = recv_task.await {
                tracing::warn!(connection_id = %ctx.connection_id, error = %err, "WebSocket接收任务异常结束");
            }
        } else {
            tracing::debug!(connection_id = %ctx.connection_id, "WebSocket接收任务完成");
            send_task.abort();
        }

        relay.disconnect(&ctx).await;
        tracing::info!(
            connection_id = %ctx.connection_id,
            user_id = %ctx.user.id,
            "WebSocket连接已断开"
        );
    }

    /// 处理来自客户端的帧，返回 `Err` 表示应当结束连接
    async fn handle_incoming(
        message: WsMessage,
        relay: &ChatRelay,
        ctx: &ConnectionContext,
        outbox: &Outbox,
        cmd_tx: &mpsc::Sender<WsCommand>,
    ) -> Result<(), ()> {
        match message {
            WsMessage::Text(text) => match serde_json::from_str::<ClientEvent>(text.as_str()) {
                Ok(event) => relay.handle(ctx, event).await,
                Err(err) => {
                    tracing::debug!(
                        connection_id = %ctx.connection_id,
                        error = %err,
                        "无法解析客户端事件"
                    );
                    let _ = outbox.send(ServerEvent::error("Invalid event payload"));
                }
            },
            WsMessage::Binary(_) => {
                let _ = outbox.send(ServerEvent::error("Binary frames are not supported"));
            }
            WsMessage::Ping(data) => {
                if cmd_tx
                    .send(WsCommand::SendPong(data.to_vec()))
                    .await
                    .is_err()
                {
                    tracing::warn!("Failed to send pong command");
                    return Err(());
                }
            }
            WsMessage::Pong(_) => {
                tracing::debug!("收到pong消息");
            }
            WsMessage::Close(_) => {
                tracing::debug!(connection_id = %ctx.connection_id, "WebSocket收到关闭消息");
                return Err(());
            }
        }
        Ok(())
    }
}

/// WebSocket 写操作命令
#[derive(Debug)]
enum WsCommand {
    SendPong(Vec<u8>),
}
