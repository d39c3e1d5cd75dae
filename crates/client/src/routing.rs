//! 把传输上收到的服务器事件分发给对应的会话
//!
//! 消息与输入提示按发送者路由，确认回执按接收者路由；没有打开会话的对象的事件直接丢弃，
//! 需要时由历史查询补齐。投递不等待：某个会话的队列满了只丢弃发给它的事件，
//! 不影响其他会话。

use std::collections::HashMap;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use domain::{ServerEvent, UserId};
use tokio::sync::{
    mpsc::{self, error::TrySendError},
    RwLock,
};

use crate::session::SessionEvent;

pub(crate) type RouteId = u64;

struct Route {
    id: RouteId,
    tx: mpsc::Sender<SessionEvent>,
}

/// 会话对象 → 会话事件队列
#[derive(Clone, Default)]
pub(crate) struct Routes {
    inner: Arc<RwLock<HashMap<UserId, Route>>>,
    counter: Arc<AtomicU64>,
}

impl Routes {
    /// 同一对象重复打开会话时新路由覆盖旧路由
    pub(crate) async fn register(&self, partner: UserId, tx: mpsc::Sender<SessionEvent>) -> RouteId {
        let id = self.counter.fetch_add(1, Ordering::Relaxed);
        self.inner.write().await.insert(partner, Route { id, tx });
        id
    }

    pub(crate) async fn unregister(&self, partner: UserId, id: RouteId) {
        let mut routes = self.inner.write().await;
        if routes.get(&partner).is_some_and(|route| route.id == id) {
            routes.remove(&partner);
        }
    }

    async fn deliver(&self, partner: UserId, event: SessionEvent) {
        let (id, tx) = match self.inner.read().await.get(&partner) {
            Some(route) => (route.id, route.tx.clone()),
            None => {
                tracing::trace!(partner = %partner, "没有打开的会话，丢弃事件");
                return;
            }
        };

        match tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                tracing::warn!(partner = %partner, event = ?event, "会话事件队列已满，丢弃事件");
            }
            Err(TrySendError::Closed(_)) => self.unregister(partner, id).await,
        }
    }

    /// 处理一个服务器事件
    pub(crate) async fn dispatch(&self, local: UserId, event: ServerEvent) {
        match event {
            ServerEvent::ReceiveMessage { sender_id, .. } => {
                if let Some(message) = event.into_message(local) {
                    self.deliver(sender_id, SessionEvent::Message(message)).await;
                }
            }
            ServerEvent::Typing { sender_id } => {
                if sender_id != local {
                    self.deliver(sender_id, SessionEvent::Typing).await;
                }
            }
            ServerEvent::MessageAccepted {
                message_id,
                receiver_id,
            } => {
                self.deliver(receiver_id, SessionEvent::Accepted { message_id })
                    .await;
            }
            ServerEvent::MessageRejected {
                message_id,
                receiver_id,
                reason,
            } => {
                self.deliver(
                    receiver_id,
                    SessionEvent::Rejected { message_id, reason },
                )
                .await;
            }
            ServerEvent::Joined { connection_id, .. } => {
                tracing::info!(connection_id = %connection_id, "已重新注册在线状态");
            }
            ServerEvent::Error { code, message } => {
                tracing::warn!(code = %code, message = %message, "服务器拒绝了请求");
            }
        }
    }
}

/// 持续读取服务器事件并分发，传输关闭时结束
pub(crate) async fn run_dispatcher(
    local: UserId,
    routes: Routes,
    mut incoming: mpsc::Receiver<ServerEvent>,
) {
    while let Some(event) = incoming.recv().await {
        routes.dispatch(local, event).await;
    }
    tracing::info!(user_id = %local, "实时传输已断开");
}
