mod support;

use client::{ChatClient, EntryStatus, ProfileState, TypingState};
use config::Transport;
use domain::{UserId, UserProfile};
use support::{eventually, TestServer};
use uuid::Uuid;

fn user() -> UserId {
    UserId::from(Uuid::new_v4())
}

async fn connect(server: &TestServer, user_id: UserId, transports: Vec<Transport>) -> ChatClient {
    ChatClient::connect(&server.client_config(transports), user_id)
        .await
        .expect("client connect")
}

#[tokio::test]
async fn offline_message_appears_in_history_when_receiver_connects() {
    let server = TestServer::start().await;
    let (alice_id, bob_id) = (user(), user());

    let alice = connect(&server, alice_id, vec![Transport::WebSocket]).await;
    let to_bob = alice.open_conversation(bob_id).await;
    to_bob.send("hi").await.unwrap();

    let store = server.store.clone();
    eventually(|| {
        let store = store.clone();
        async move { store.len().await == 1 }
    })
    .await;

    let bob = connect(&server, bob_id, vec![Transport::WebSocket]).await;
    let to_alice = bob.open_conversation(alice_id).await;
    let snapshot = to_alice
        .subscribe()
        .wait_for(|s| s.live)
        .await
        .unwrap()
        .clone();

    assert!(snapshot.history_error.is_none());
    assert_eq!(snapshot.entries.len(), 1);
    assert_eq!(snapshot.entries[0].message.content.as_str(), "hi");
    assert_eq!(snapshot.entries[0].message.sender_id, alice_id);
    assert_eq!(snapshot.entries[0].status, EntryStatus::Confirmed);
}

#[tokio::test]
async fn live_exchange_is_delivered_and_acknowledged() {
    let server = TestServer::start().await;
    let (alice_id, bob_id) = (user(), user());

    let alice = connect(&server, alice_id, vec![Transport::WebSocket]).await;
    let bob = connect(&server, bob_id, vec![Transport::WebSocket]).await;
    let alice_view = alice.open_conversation(bob_id).await;
    let bob_view = bob.open_conversation(alice_id).await;
    bob_view.subscribe().wait_for(|s| s.live).await.unwrap();

    let sent = alice_view.send("ping").await.unwrap();
    let received = bob_view
        .subscribe()
        .wait_for(|s| !s.entries.is_empty())
        .await
        .unwrap()
        .clone();
    assert_eq!(received.entries[0].message.id, sent);
    assert_eq!(received.entries[0].message.content.as_str(), "ping");

    alice_view
        .subscribe()
        .wait_for(|s| {
            s.entries
                .iter()
                .any(|e| e.message.id == sent && e.status == EntryStatus::Persisted)
        })
        .await
        .unwrap();

    let reply = bob_view.send("pong").await.unwrap();
    let thread = alice_view
        .subscribe()
        .wait_for(|s| s.entries.len() == 2)
        .await
        .unwrap()
        .clone();
    let ids: Vec<_> = thread.entries.iter().map(|e| e.message.id).collect();
    assert_eq!(ids, vec![sent, reply]);
}

#[tokio::test]
async fn typing_indicator_reaches_partner() {
    let server = TestServer::start().await;
    let (alice_id, bob_id) = (user(), user());

    let alice = connect(&server, alice_id, vec![Transport::WebSocket]).await;
    let bob = connect(&server, bob_id, vec![Transport::WebSocket]).await;
    let alice_view = alice.open_conversation(bob_id).await;
    let bob_view = bob.open_conversation(alice_id).await;

    let mut typing = bob_view.typing_state();
    alice_view.notify_typing().await.unwrap();
    typing
        .wait_for(|s| *s == TypingState::Typing)
        .await
        .unwrap();

    // 对方发出消息后提示立即消失
    alice_view.send("done").await.unwrap();
    typing.wait_for(|s| *s == TypingState::Idle).await.unwrap();
}

#[tokio::test]
async fn long_polling_client_talks_to_websocket_client() {
    let server = TestServer::start().await;
    let (alice_id, bob_id) = (user(), user());

    let alice = connect(&server, alice_id, vec![Transport::WebSocket]).await;
    let bob = connect(&server, bob_id, vec![Transport::LongPolling]).await;
    assert_eq!(bob.transport(), Transport::LongPolling);

    let alice_view = alice.open_conversation(bob_id).await;
    let bob_view = bob.open_conversation(alice_id).await;
    bob_view.subscribe().wait_for(|s| s.live).await.unwrap();

    let sent = alice_view.send("over websocket").await.unwrap();
    bob_view
        .subscribe()
        .wait_for(|s| s.entries.iter().any(|e| e.message.id == sent))
        .await
        .unwrap();

    let reply = bob_view.send("over polling").await.unwrap();
    alice_view
        .subscribe()
        .wait_for(|s| s.entries.iter().any(|e| e.message.id == reply))
        .await
        .unwrap();

    bob.close().await;
}

#[tokio::test]
async fn partner_profile_falls_back_to_missing() {
    let server = TestServer::start().await;
    let (alice_id, bob_id) = (user(), user());
    server
        .profiles
        .upsert(UserProfile::new(alice_id, "Alice", "alice"))
        .await;

    let bob = connect(&server, bob_id, vec![Transport::WebSocket]).await;
    match bob.partner_profile(alice_id).await.unwrap() {
        ProfileState::Loaded(profile) => assert_eq!(profile.username, "alice"),
        ProfileState::Missing => panic!("profile should exist"),
    }
    assert_eq!(
        bob.partner_profile(user()).await.unwrap(),
        ProfileState::Missing
    );
}

#[tokio::test]
async fn falls_back_to_long_polling_when_websocket_is_disabled() {
    let server = TestServer::start_with(vec![Transport::LongPolling]).await;
    let config = server.client_config(vec![Transport::WebSocket, Transport::LongPolling]);

    let client = ChatClient::connect(&config, user()).await.unwrap();
    assert_eq!(client.transport(), Transport::LongPolling);
    client.close().await;
}
