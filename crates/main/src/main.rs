//! 主应用程序入口
//!
//! 读取配置，装配存储、在线目录与消息转发引擎，启动 Axum 实时服务。

use std::sync::Arc;

use application::{
    ConversationService, ConversationServiceDependencies, InMemoryPresenceDirectory,
    PresenceDirectory, RelayDependencies, RelayEngine, SystemClock,
};
use config::{AppConfig, StorageBackend};
use domain::{MessageStore, ProfileRepository};
use infrastructure::{
    create_pg_pool, InMemoryMessageStore, InMemoryProfileRepository, PgMessageStore,
    PgProfileRepository, MIGRATOR,
};
use tracing_subscriber::EnvFilter;
use web_api::{router, spawn_poll_reaper, AppState};

type Stores = (Arc<dyn MessageStore>, Arc<dyn ProfileRepository>);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = AppConfig::load()?;
    let (message_store, profile_repository) = build_stores(&config).await?;

    let presence = Arc::new(InMemoryPresenceDirectory::new());
    let relay = Arc::new(RelayEngine::new(RelayDependencies {
        presence: presence.clone(),
        message_store: message_store.clone(),
        clock: Arc::new(SystemClock),
    }));
    let conversations = Arc::new(ConversationService::new(ConversationServiceDependencies {
        message_store,
        profile_repository,
    }));

    let state = AppState::new(relay, conversations, config.relay.clone());
    let reaper = spawn_poll_reaper(state.clone());
    let app = router(state)?;

    let address = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&address).await?;
    tracing::info!(
        address = %address,
        transports = ?config.relay.transports,
        "实时服务启动在 http://{}",
        address
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    reaper.abort();
    presence.clear().await;
    tracing::info!("服务已停止，在线目录已清空");

    Ok(())
}

async fn build_stores(config: &AppConfig) -> anyhow::Result<Stores> {
    match config.storage.backend {
        StorageBackend::Memory => {
            tracing::warn!("使用内存存储，进程退出后消息将丢失");
            Ok((
                Arc::new(InMemoryMessageStore::new()),
                Arc::new(InMemoryProfileRepository::new()),
            ))
        }
        StorageBackend::Postgres => {
            let database_url = config
                .storage
                .database_url
                .as_deref()
                .ok_or_else(|| anyhow::anyhow!("storage.database_url is required for postgres"))?;

            tracing::info!(
                "连接数据库: {}",
                database_url.rsplit('@').next().unwrap_or("unknown")
            );
            let pool = create_pg_pool(database_url, config.storage.max_connections).await?;

            // 运行迁移
            MIGRATOR.run(&pool).await?;

            Ok((
                Arc::new(PgMessageStore::new(pool.clone())),
                Arc::new(PgProfileRepository::new(pool)),
            ))
        }
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "无法监听退出信号");
        std::future::pending::<()>().await;
    }
    tracing::info!("收到退出信号，开始关闭");
}
