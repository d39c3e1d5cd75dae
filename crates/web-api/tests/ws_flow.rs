mod support;

use std::time::Duration;

use domain::{UserId, UserProfile};
use futures_util::SinkExt;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use tokio_tungstenite::tungstenite::{client::IntoClientRequest, Message as TungsteniteMessage};
use uuid::Uuid;

use support::{assert_silent, eventually, next_event, send_json, TestServer};

#[tokio::test]
async fn health_check_reports_running() {
    let server = TestServer::start().await;

    for path in ["/", "/health"] {
        let response = Client::new().get(server.http(path)).send().await.unwrap();
        assert_eq!(response.status(), StatusCode::OK, "{path}");
        assert_eq!(response.text().await.unwrap(), "Backend server is running!");
    }
}

#[tokio::test]
async fn online_receiver_gets_message_and_sender_gets_ack() {
    let server = TestServer::start().await;
    let (alice, bob) = (Uuid::new_v4(), Uuid::new_v4());
    let mut alice_ws = server.join(alice).await;
    let mut bob_ws = server.join(bob).await;

    let message_id = Uuid::new_v4();
    send_json(
        &mut alice_ws,
        json!({
            "type": "sendMessage",
            "senderId": alice,
            "receiverId": bob,
            "message": "  hello bob  ",
            "messageId": message_id
        }),
    )
    .await;

    let received = next_event(&mut bob_ws).await;
    assert_eq!(received["type"], "receiveMessage");
    assert_eq!(received["id"], json!(message_id));
    assert_eq!(received["senderId"], json!(alice));
    assert_eq!(received["message"], "hello bob");
    assert!(received["timestamp"].is_string());

    let ack = next_event(&mut alice_ws).await;
    assert_eq!(ack["type"], "messageAccepted");
    assert_eq!(ack["messageId"], json!(message_id));
    assert_eq!(ack["receiverId"], json!(bob));

    // 发送方自己不会收到 receiveMessage
    assert_silent(&mut alice_ws, Duration::from_millis(100)).await;
    assert_silent(&mut bob_ws, Duration::from_millis(100)).await;

    let history: Vec<Value> = Client::new()
        .get(server.http(&format!("/api/v1/conversations/{bob}/{alice}/messages")))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0]["id"], json!(message_id));
    assert_eq!(history[0]["receiverId"], json!(bob));
}

#[tokio::test]
async fn offline_message_is_only_visible_through_history() {
    let server = TestServer::start().await;
    let (alice, bob) = (Uuid::new_v4(), Uuid::new_v4());
    let mut alice_ws = server.join(alice).await;

    send_json(
        &mut alice_ws,
        json!({"type": "sendMessage", "senderId": alice, "receiverId": bob, "message": "hi"}),
    )
    .await;
    assert_eq!(next_event(&mut alice_ws).await["type"], "messageAccepted");

    // bob 之后才上线：没有实时事件，历史里有这条消息
    let mut bob_ws = server.join(bob).await;
    assert_silent(&mut bob_ws, Duration::from_millis(150)).await;

    let history: Vec<Value> = Client::new()
        .get(server.http(&format!("/api/v1/conversations/{alice}/{bob}/messages")))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0]["message"], "hi");
    assert_eq!(history[0]["senderId"], json!(alice));
}

#[tokio::test]
async fn history_is_ordered_and_covers_both_directions() {
    let server = TestServer::start().await;
    let (alice, bob) = (Uuid::new_v4(), Uuid::new_v4());
    let mut alice_ws = server.join(alice).await;
    let mut bob_ws = server.join(bob).await;

    for (ws, from, to, text) in [
        (&mut alice_ws, alice, bob, "one"),
        (&mut bob_ws, bob, alice, "two"),
    ] {
        send_json(
            ws,
            json!({"type": "sendMessage", "senderId": from, "receiverId": to, "message": text}),
        )
        .await;
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    let store = server.store.clone();
    eventually(|| {
        let store = store.clone();
        async move { store.len().await == 2 }
    })
    .await;

    let history: Vec<Value> = Client::new()
        .get(server.http(&format!("/api/v1/conversations/{alice}/{bob}/messages")))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let texts: Vec<&str> = history.iter().map(|m| m["message"].as_str().unwrap()).collect();
    assert_eq!(texts, vec!["one", "two"]);
}

#[tokio::test]
async fn typing_is_forwarded_only_to_the_receiver() {
    let server = TestServer::start().await;
    let (alice, bob) = (Uuid::new_v4(), Uuid::new_v4());
    let mut alice_ws = server.join(alice).await;
    let mut bob_ws = server.join(bob).await;

    send_json(
        &mut alice_ws,
        json!({"type": "typing", "senderId": alice, "receiverId": bob}),
    )
    .await;

    let typing = next_event(&mut bob_ws).await;
    assert_eq!(typing, json!({"type": "typing", "senderId": alice}));
    assert_silent(&mut alice_ws, Duration::from_millis(100)).await;
    assert!(server.store.is_empty().await);
}

#[tokio::test]
async fn events_without_join_or_with_foreign_sender_are_rejected() {
    let server = TestServer::start().await;
    let (alice, bob, mallory) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
    let mut bob_ws = server.join(bob).await;

    let mut anonymous = server.connect_ws().await;
    send_json(
        &mut anonymous,
        json!({"type": "sendMessage", "senderId": alice, "receiverId": bob, "message": "hi"}),
    )
    .await;
    assert_eq!(next_event(&mut anonymous).await["type"], "error");

    let mut mallory_ws = server.join(mallory).await;
    send_json(
        &mut mallory_ws,
        json!({"type": "sendMessage", "senderId": alice, "receiverId": bob, "message": "spoof"}),
    )
    .await;
    let error = next_event(&mut mallory_ws).await;
    assert_eq!(error["type"], "error");
    assert_eq!(error["code"], "OPERATION_NOT_ALLOWED");

    assert_silent(&mut bob_ws, Duration::from_millis(100)).await;
    assert!(server.store.is_empty().await);
}

#[tokio::test]
async fn whitespace_message_is_rejected() {
    let server = TestServer::start().await;
    let (alice, bob) = (Uuid::new_v4(), Uuid::new_v4());
    let mut alice_ws = server.join(alice).await;

    send_json(
        &mut alice_ws,
        json!({"type": "sendMessage", "senderId": alice, "receiverId": bob, "message": "   "}),
    )
    .await;
    let error = next_event(&mut alice_ws).await;
    assert_eq!(error["code"], "INVALID_ARGUMENT");
    assert!(server.store.is_empty().await);
}

#[tokio::test]
async fn last_registration_wins_for_multiple_tabs() {
    let server = TestServer::start().await;
    let (alice, bob) = (Uuid::new_v4(), Uuid::new_v4());
    let mut first_tab = server.join(bob).await;
    let mut second_tab = server.join(bob).await;
    let mut alice_ws = server.join(alice).await;

    send_json(
        &mut alice_ws,
        json!({"type": "sendMessage", "senderId": alice, "receiverId": bob, "message": "which tab"}),
    )
    .await;

    assert_eq!(next_event(&mut second_tab).await["message"], "which tab");
    assert_silent(&mut first_tab, Duration::from_millis(100)).await;

    // 旧标签页断开不会影响新映射
    first_tab.close(None).await.ok();
    tokio::time::sleep(Duration::from_millis(50)).await;
    let presence = server.state.relay.presence().clone();
    assert!(presence.lookup(UserId::from(bob)).await.is_some());
}

#[tokio::test]
async fn disconnect_removes_presence() {
    let server = TestServer::start().await;
    let bob = Uuid::new_v4();
    let mut bob_ws = server.join(bob).await;
    let presence = server.state.relay.presence().clone();
    assert!(presence.lookup(UserId::from(bob)).await.is_some());

    bob_ws.send(TungsteniteMessage::Close(None)).await.ok();
    eventually(|| {
        let presence = presence.clone();
        async move { presence.lookup(UserId::from(bob)).await.is_none() }
    })
    .await;
}

#[tokio::test]
async fn persistence_failure_still_delivers_and_reports_rejection() {
    let server = TestServer::start().await;
    server.store.set_unavailable(true);
    let (alice, bob) = (Uuid::new_v4(), Uuid::new_v4());
    let mut alice_ws = server.join(alice).await;
    let mut bob_ws = server.join(bob).await;

    send_json(
        &mut alice_ws,
        json!({"type": "sendMessage", "senderId": alice, "receiverId": bob, "message": "lost"}),
    )
    .await;

    assert_eq!(next_event(&mut bob_ws).await["message"], "lost");
    assert_eq!(next_event(&mut alice_ws).await["type"], "messageRejected");
}

#[tokio::test]
async fn profile_lookup_returns_profile_or_not_found() {
    let server = TestServer::start().await;
    let known = Uuid::new_v4();
    server
        .profiles
        .upsert(UserProfile::new(UserId::from(known), "Grace Hopper", "grace"))
        .await;
    let client = Client::new();

    let found: Value = client
        .get(server.http(&format!("/api/v1/users/{known}/profile")))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(found["username"], "grace");

    let missing = client
        .get(server.http(&format!("/api/v1/users/{}/profile", Uuid::new_v4())))
        .send()
        .await
        .unwrap();
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    let body: Value = missing.json().await.unwrap();
    assert_eq!(body["code"], "USER_NOT_FOUND");
}

#[tokio::test]
async fn cors_allows_only_configured_origin() {
    let server = TestServer::start().await;
    let allowed = server.state.relay_config.allowed_origin.clone();
    let client = Client::new();

    let preflight = client
        .request(reqwest::Method::OPTIONS, server.http("/health"))
        .header("origin", &allowed)
        .header("access-control-request-method", "GET")
        .send()
        .await
        .unwrap();
    assert_eq!(
        preflight.headers()["access-control-allow-origin"],
        allowed.as_str()
    );
    assert_eq!(preflight.headers()["access-control-allow-credentials"], "true");

    let mut request = format!("ws://{}/api/v1/ws", server.addr)
        .into_client_request()
        .unwrap();
    request
        .headers_mut()
        .insert("origin", "https://evil.example".parse().unwrap());
    assert!(tokio_tungstenite::connect_async(request).await.is_err());
}
