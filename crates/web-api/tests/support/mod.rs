#![allow(dead_code)]

use std::{net::SocketAddr, sync::Arc, time::Duration};

use application::{
    ConversationService, ConversationServiceDependencies, InMemoryPresenceDirectory,
    RelayDependencies, RelayEngine, SystemClock,
};
use config::RelayConfig;
use futures_util::{SinkExt, StreamExt};
use infrastructure::{InMemoryMessageStore, InMemoryProfileRepository};
use serde_json::{json, Value};
use tokio::{
    net::{TcpListener, TcpStream},
    sync::oneshot,
};
use tokio_tungstenite::{
    connect_async, tungstenite::Message as TungsteniteMessage, MaybeTlsStream, WebSocketStream,
};
use uuid::Uuid;
use web_api::{router, AppState};

pub type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub struct TestServer {
    pub addr: SocketAddr,
    pub store: Arc<InMemoryMessageStore>,
    pub profiles: Arc<InMemoryProfileRepository>,
    pub state: AppState,
    shutdown: Option<oneshot::Sender<()>>,
}

impl TestServer {
    pub async fn start() -> Self {
        Self::start_with(RelayConfig::default()).await
    }

    /// 使用内存存储启动服务器，监听随机端口
    pub async fn start_with(relay_config: RelayConfig) -> Self {
        let (state, store, profiles) = in_memory_state(relay_config);
        let app = router(state.clone()).expect("router");

        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        tokio::spawn(async move {
            axum::serve(listener, app.into_make_service())
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
                .ok();
        });

        Self {
            addr,
            store,
            profiles,
            state,
            shutdown: Some(shutdown_tx),
        }
    }

    pub fn http(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub async fn connect_ws(&self) -> WsClient {
        let (ws, _) = connect_async(format!("ws://{}/api/v1/ws", self.addr))
            .await
            .expect("websocket connect");
        ws
    }

    /// 建立连接并 join，等待 joined 确认
    pub async fn join(&self, user_id: Uuid) -> WsClient {
        let mut ws = self.connect_ws().await;
        send_json(&mut ws, json!({"type": "join", "userId": user_id})).await;
        let joined = next_event(&mut ws).await;
        assert_eq!(joined["type"], "joined");
        assert_eq!(joined["userId"], json!(user_id));
        ws
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

/// 内存存储装配的应用状态
pub fn in_memory_state(
    relay_config: RelayConfig,
) -> (
    AppState,
    Arc<InMemoryMessageStore>,
    Arc<InMemoryProfileRepository>,
) {
    let store = Arc::new(InMemoryMessageStore::new());
    let profiles = Arc::new(InMemoryProfileRepository::new());

    let relay = Arc::new(RelayEngine::new(RelayDependencies {
        presence: Arc::new(InMemoryPresenceDirectory::new()),
        message_store: store.clone(),
        clock: Arc::new(SystemClock),
    }));
    let conversations = Arc::new(ConversationService::new(ConversationServiceDependencies {
        message_store: store.clone(),
        profile_repository: profiles.clone(),
    }));

    (
        AppState::new(relay, conversations, relay_config),
        store,
        profiles,
    )
}

pub async fn send_json(ws: &mut WsClient, value: Value) {
    ws.send(TungsteniteMessage::Text(value.to_string().into()))
        .await
        .expect("send frame");
}

/// 读取下一条文本事件，超时视为失败
pub async fn next_event(ws: &mut WsClient) -> Value {
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(2), ws.next())
            .await
            .expect("timed out waiting for event")
            .expect("stream ended")
            .expect("frame error");
        if let TungsteniteMessage::Text(text) = frame {
            return serde_json::from_str(text.as_str()).expect("event json");
        }
    }
}

/// 在给定时间内没有收到任何文本事件
pub async fn assert_silent(ws: &mut WsClient, window: Duration) {
    if let Ok(Some(Ok(TungsteniteMessage::Text(text)))) =
        tokio::time::timeout(window, ws.next()).await
    {
        panic!("unexpected event: {text}");
    }
}

/// 等待条件成立（用于观察后台持久化）
pub async fn eventually<F, Fut>(mut check: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..50 {
        if check().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("condition not met in time");
}
