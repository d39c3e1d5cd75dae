#![allow(dead_code)]

use std::{net::SocketAddr, sync::Arc, time::Duration};

use application::{
    ConversationService, ConversationServiceDependencies, InMemoryPresenceDirectory,
    RelayDependencies, RelayEngine, SystemClock,
};
use config::{ClientConfig, RelayConfig, Transport};
use infrastructure::{InMemoryMessageStore, InMemoryProfileRepository};
use tokio::{net::TcpListener, sync::oneshot};
use web_api::{router, AppState};

/// 进程内服务器，使用内存存储，监听随机端口
pub struct TestServer {
    pub addr: SocketAddr,
    pub store: Arc<InMemoryMessageStore>,
    pub profiles: Arc<InMemoryProfileRepository>,
    shutdown: Option<oneshot::Sender<()>>,
}

impl TestServer {
    pub async fn start() -> Self {
        Self::start_with(vec![Transport::WebSocket, Transport::LongPolling]).await
    }

    /// 只开放给定的传输方式
    pub async fn start_with(transports: Vec<Transport>) -> Self {
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
        let relay_config = RelayConfig {
            long_poll_timeout_secs: 1,
            transports,
            ..RelayConfig::default()
        };

        let app = router(AppState::new(relay, conversations, relay_config)).expect("router");
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
            shutdown: Some(shutdown_tx),
        }
    }

    pub fn client_config(&self, transports: Vec<Transport>) -> ClientConfig {
        ClientConfig {
            server_url: format!("http://{}", self.addr),
            transports,
            ..ClientConfig::default()
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

/// 等待条件成立
pub async fn eventually<F, Fut>(mut check: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..100 {
        if check().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("condition not met in time");
}
