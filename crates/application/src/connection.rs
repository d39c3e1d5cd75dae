use std::fmt;

use domain::{ConnectionId, ServerEvent};
use thiserror::Error;
use tokio::sync::mpsc;

/// 传输层错误，只影响出错的那一个连接。
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectionError {
    #[error("connection closed")]
    Closed,
    #[error("outbound queue full")]
    Backpressure,
}

/// 一个实时传输会话的句柄。
///
/// 句柄只持有发送队列，写 socket 的工作由连接自己的任务完成，
/// 因此推送事件从不等待网络 I/O。同一连接的事件按推送顺序送达。
#[derive(Clone)]
pub struct ConnectionHandle {
    id: ConnectionId,
    outbound: mpsc::Sender<ServerEvent>,
}

impl ConnectionHandle {
    pub fn new(id: ConnectionId, outbound: mpsc::Sender<ServerEvent>) -> Self {
        Self { id, outbound }
    }

    /// 创建一个新连接句柄及其发送队列的接收端。
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<ServerEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self::new(ConnectionId::generate(), tx), rx)
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// 非阻塞推送；队列满或连接已关闭时返回错误。
    pub fn push(&self, event: ServerEvent) -> Result<(), ConnectionError> {
        self.outbound.try_send(event).map_err(|err| match err {
            mpsc::error::TrySendError::Full(_) => ConnectionError::Backpressure,
            mpsc::error::TrySendError::Closed(_) => ConnectionError::Closed,
        })
    }

    pub fn is_closed(&self) -> bool {
        self.outbound.is_closed()
    }
}

impl PartialEq for ConnectionHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ConnectionHandle {}

impl fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("id", &self.id)
            .field("closed", &self.is_closed())
            .finish()
    }
}
