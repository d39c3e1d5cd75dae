//! 长轮询传输
//!
//! WebSocket 不可用时的后备方案：每个会话有自己的发送队列，客户端反复 GET
//! 取走排队的事件，POST 提交客户端事件。长时间没有被轮询的会话视为断开。

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use application::{ConnectionHandle, RelayEngine};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use domain::{ClientEvent, ConnectionId, ServerEvent};
use serde::{Deserialize, Serialize};
use tokio::{
    sync::{mpsc, Mutex, RwLock},
    task::JoinHandle,
    time::Instant,
};

use crate::{error::ApiError, gateway::ClientSession, state::AppState};

/// 单次轮询最多返回的事件数
const MAX_BATCH: usize = 64;

pub struct PollSession {
    session: Mutex<ClientSession>,
    outbound: Mutex<mpsc::Receiver<ServerEvent>>,
    last_seen: Mutex<Instant>,
}

impl PollSession {
    async fn touch(&self) {
        *self.last_seen.lock().await = Instant::now();
    }

    /// 等待至多 `wait`，返回排队中的事件（可能为空）。
    async fn collect(&self, wait: Duration) -> Vec<ServerEvent> {
        let mut outbound = self.outbound.lock().await;
        let mut events = Vec::new();

        if let Ok(Some(first)) = tokio::time::timeout(wait, outbound.recv()).await {
            events.push(first);
            while events.len() < MAX_BATCH {
                match outbound.try_recv() {
                    Ok(event) => events.push(event),
                    Err(_) => break,
                }
            }
        }
        events
    }

    async fn is_idle(&self, max_idle: Duration) -> bool {
        // 有请求正在等待时不算空闲
        if self.outbound.try_lock().is_err() {
            return false;
        }
        self.last_seen.lock().await.elapsed() > max_idle
    }
}

#[derive(Default)]
pub struct PollSessions {
    sessions: RwLock<HashMap<ConnectionId, Arc<PollSession>>>,
}

impl PollSessions {
    pub async fn open(&self, relay: Arc<RelayEngine>, buffer: usize) -> ConnectionId {
        let (handle, outbound) = ConnectionHandle::channel(buffer);
        let connection_id = handle.id();
        let session = Arc::new(PollSession {
            session: Mutex::new(ClientSession::new(relay, handle)),
            outbound: Mutex::new(outbound),
            last_seen: Mutex::new(Instant::now()),
        });

        self.sessions.write().await.insert(connection_id, session);
        tracing::info!(connection_id = %connection_id, "长轮询会话已建立");
        connection_id
    }

    pub async fn get(&self, connection_id: ConnectionId) -> Option<Arc<PollSession>> {
        self.sessions.read().await.get(&connection_id).cloned()
    }

    /// 关闭会话并清理在线状态；会话不存在时返回 `false`。
    pub async fn close(&self, connection_id: ConnectionId) -> bool {
        let removed = self.sessions.write().await.remove(&connection_id);
        match removed {
            Some(poll) => {
                poll.session.lock().await.disconnect().await;
                tracing::info!(connection_id = %connection_id, "长轮询会话已关闭");
                true
            }
            None => false,
        }
    }

    /// 回收超过 `max_idle` 未被轮询的会话，按断开处理。
    pub async fn reap_idle(&self, max_idle: Duration) -> Vec<ConnectionId> {
        let candidates: Vec<(ConnectionId, Arc<PollSession>)> = self
            .sessions
            .read()
            .await
            .iter()
            .map(|(id, poll)| (*id, poll.clone()))
            .collect();

        let mut reaped = Vec::new();
        for (connection_id, poll) in candidates {
            if poll.is_idle(max_idle).await && self.close(connection_id).await {
                tracing::info!(connection_id = %connection_id, "长轮询会话超时回收");
                reaped.push(connection_id);
            }
        }
        reaped
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

/// 启动后台回收任务：会话超过两个等待周期未被轮询即回收。
pub fn spawn_poll_reaper(state: AppState) -> JoinHandle<()> {
    let wait = Duration::from_secs(state.relay_config.long_poll_timeout_secs);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(wait);
        loop {
            ticker.tick().await;
            let reaped = state.poll_sessions.reap_idle(wait * 2).await;
            if !reaped.is_empty() {
                tracing::debug!(count = reaped.len(), "回收空闲长轮询会话");
            }
        }
    })
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollOpened {
    pub connection_id: ConnectionId,
}

pub(crate) async fn open_session(
    State(state): State<AppState>,
) -> (StatusCode, Json<PollOpened>) {
    let connection_id = state
        .poll_sessions
        .open(state.relay.clone(), state.relay_config.outbound_buffer)
        .await;
    (StatusCode::CREATED, Json(PollOpened { connection_id }))
}

pub(crate) async fn poll_events(
    State(state): State<AppState>,
    Path(connection_id): Path<ConnectionId>,
) -> Result<Json<Vec<ServerEvent>>, ApiError> {
    let poll = state
        .poll_sessions
        .get(connection_id)
        .await
        .ok_or_else(ApiError::session_not_found)?;

    poll.touch().await;
    let wait = Duration::from_secs(state.relay_config.long_poll_timeout_secs);
    let events = poll.collect(wait).await;
    poll.touch().await;

    Ok(Json(events))
}

pub(crate) async fn submit_event(
    State(state): State<AppState>,
    Path(connection_id): Path<ConnectionId>,
    Json(event): Json<ClientEvent>,
) -> Result<StatusCode, ApiError> {
    let poll = state
        .poll_sessions
        .get(connection_id)
        .await
        .ok_or_else(ApiError::session_not_found)?;

    poll.touch().await;
    poll.session.lock().await.handle(event).await;
    Ok(StatusCode::ACCEPTED)
}

pub(crate) async fn close_session(
    State(state): State<AppState>,
    Path(connection_id): Path<ConnectionId>,
) -> Result<StatusCode, ApiError> {
    if state.poll_sessions.close(connection_id).await {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::session_not_found())
    }
}
