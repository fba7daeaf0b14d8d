mod support;

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use reqwest::Client;
use serde_json::json;
use tokio_tungstenite::{connect_async, tungstenite::Message as TungsteniteMessage};

use support::{next_event, wait_for, TestServer};

fn send_event(value: serde_json::Value) -> TungsteniteMessage {
    TungsteniteMessage::text(value.to_string())
}

#[tokio::test]
async fn health_endpoint_responds() {
    let server = TestServer::start().await;
    let status = Client::new()
        .get(format!("http://{}/health", server.addr))
        .send()
        .await
        .expect("health")
        .status();
    assert_eq!(status.as_u16(), 200);
}

#[tokio::test]
async fn upgrade_without_valid_identity_is_rejected() {
    let server = TestServer::start().await;

    let err = connect_async(server.ws_url("not-a-jwt"))
        .await
        .expect_err("bad token must be rejected");
    match err {
        tokio_tungstenite::tungstenite::Error::Http(response) => {
            assert_eq!(response.status().as_u16(), 401)
        }
        other => panic!("unexpected error {other:?}"),
    }

    // 合法 token 但用户不存在
    let token = server
        .jwt
        .generate_token(domain::UserId::generate())
        .expect("token");
    let err = connect_async(server.ws_url(&token))
        .await
        .expect_err("unknown user must be rejected");
    assert!(matches!(
        err,
        tokio_tungstenite::tungstenite::Error::Http(ref response) if response.status().as_u16() == 401
    ));
}

#[tokio::test]
async fn chatroom_message_flow_over_websocket() {
    let server = TestServer::start().await;
    let lobby = format!("chatroom:{}", server.store.create_chatroom().await);
    let alice = server.user("alice").await;
    let bob = server.user("bob").await;

    let mut alice_ws = server.connect(&alice).await;
    let mut bob_ws = server.connect(&bob).await;

    let online = wait_for(&mut alice_ws, "presence.online").await;
    assert_eq!(online["data"]["username"], "bob");

    alice_ws
        .send(send_event(json!({"event": "room.join", "data": {"roomId": lobby}})))
        .await
        .unwrap();
    let members = wait_for(&mut alice_ws, "room.members").await;
    assert_eq!(members["data"]["roomId"], lobby.as_str());

    bob_ws
        .send(send_event(json!({"event": "room.join", "data": {"roomId": lobby}})))
        .await
        .unwrap();
    let members = wait_for(&mut bob_ws, "room.members").await;
    let online_flags: Vec<bool> = members["data"]["members"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["isOnline"].as_bool().unwrap())
        .collect();
    assert_eq!(online_flags, vec![true, true]);
    let joined = wait_for(&mut alice_ws, "room.memberJoined").await;
    assert_eq!(joined["data"]["user"]["username"], "bob");

    alice_ws
        .send(send_event(json!({
            "event": "message.send",
            "data": {"destination": lobby, "content": "hello over the wire", "type": "text"}
        })))
        .await
        .unwrap();

    for ws in [&mut alice_ws, &mut bob_ws] {
        let event = wait_for(ws, "message.new").await;
        assert_eq!(event["data"]["content"], "hello over the wire");
        assert_eq!(event["data"]["senderUsername"], "alice");
        assert_eq!(event["data"]["roomId"], lobby.as_str());
    }

    bob_ws
        .send(send_event(json!({"event": "typing.start", "data": {"destination": lobby}})))
        .await
        .unwrap();
    let typing = wait_for(&mut alice_ws, "typing.start").await;
    assert_eq!(typing["data"]["username"], "bob");

    bob_ws.close(None).await.unwrap();
    let offline = wait_for(&mut alice_ws, "presence.offline").await;
    assert_eq!(offline["data"]["userId"], bob.id.to_string());
}

#[tokio::test]
async fn message_in_flight_is_delivered_after_sender_drops() {
    let server = TestServer::start_with_insert_delay(Duration::from_millis(300)).await;
    let lobby = format!("chatroom:{}", server.store.create_chatroom().await);
    let alice = server.user("alice").await;
    let bob = server.user("bob").await;

    let mut alice_ws = server.connect(&alice).await;
    let mut bob_ws = server.connect(&bob).await;
    for ws in [&mut alice_ws, &mut bob_ws] {
        ws.send(send_event(json!({"event": "room.join", "data": {"roomId": lobby}})))
            .await
            .unwrap();
        wait_for(ws, "room.members").await;
    }

    alice_ws
        .send(send_event(json!({
            "event": "message.send",
            "data": {"destination": lobby, "content": "sent while leaving", "type": "text"}
        })))
        .await
        .unwrap();
    // 不发送关闭帧直接断开，随后的输出写入会失败
    drop(alice_ws);

    for _ in 0..5 {
        bob_ws
            .send(send_event(json!({"event": "typing.start", "data": {"destination": lobby}})))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    let event = wait_for(&mut bob_ws, "message.new").await;
    assert_eq!(event["data"]["content"], "sent while leaving");
    let offline = wait_for(&mut bob_ws, "presence.offline").await;
    assert_eq!(offline["data"]["userId"], alice.id.to_string());

    let room = lobby.parse::<domain::RoomKey>().unwrap();
    assert_eq!(server.store.messages_in(room).await.len(), 1);
}

#[tokio::test]
async fn sensitive_message_requires_confirmation_over_websocket() {
    let server = TestServer::start().await;
    let lobby = format!("chatroom:{}", server.store.create_chatroom().await);
    let alice = server.user("alice").await;
    let mut ws = server.connect(&alice).await;

    ws.send(send_event(json!({"event": "room.join", "data": {"roomId": lobby}})))
        .await
        .unwrap();
    wait_for(&mut ws, "room.members").await;

    ws.send(send_event(json!({
        "event": "message.send",
        "data": {"destination": lobby, "content": "card 4111111111111111"}
    })))
    .await
    .unwrap();
    let pending = next_event(&mut ws).await;
    assert_eq!(pending["event"], "message.pendingConfirmation");
    let pending_id = pending["data"]["pendingMessage"]["pendingId"].clone();

    ws.send(send_event(json!({
        "event": "message.confirmSend",
        "data": {"pendingId": pending_id}
    })))
    .await
    .unwrap();
    let delivered = next_event(&mut ws).await;
    assert_eq!(delivered["event"], "message.new");
    assert_eq!(delivered["data"]["flaggedSensitive"], true);
}

#[tokio::test]
async fn malformed_frames_do_not_close_the_connection() {
    let server = TestServer::start().await;
    let alice = server.user("alice").await;
    let mut ws = server.connect(&alice).await;

    ws.send(TungsteniteMessage::text("{not json")).await.unwrap();
    let error = next_event(&mut ws).await;
    assert_eq!(error["event"], "pipeline.error");
    assert_eq!(error["data"]["message"], "Invalid event payload");

    ws.send(send_event(json!({"event": "message.send", "data": {"content": "lost"}})))
        .await
        .unwrap();
    let error = next_event(&mut ws).await;
    assert_eq!(error["data"]["message"], "Invalid destination: is required");

    ws.send(send_event(json!({"event": "ping"}))).await.unwrap();
    assert_eq!(next_event(&mut ws).await["event"], "pong");
}

#[tokio::test]
async fn protocol_ping_is_answered_with_pong() {
    let server = TestServer::start().await;
    let alice = server.user("alice").await;
    let mut ws = server.connect(&alice).await;

    ws.send(TungsteniteMessage::Ping(vec![1, 2, 3].into()))
        .await
        .unwrap();

    let frame = tokio::time::timeout(Duration::from_secs(2), ws.next())
        .await
        .expect("timed out")
        .expect("socket closed")
        .expect("frame error");
    match frame {
        TungsteniteMessage::Pong(data) => assert_eq!(data.as_ref(), &[1, 2, 3]),
        other => panic!("unexpected frame {other:?}"),
    }
}
