use std::sync::Arc;

use application::{ConnectionHandle, RelayEngine};
use axum::{
    extract::{
        ws::{Message as WsMessage, WebSocket, WebSocketUpgrade},
        State,
    },
    http::{header::ORIGIN, HeaderMap},
    response::Response,
};
use domain::{ConnectionId, ServerEvent};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use crate::{error::ApiError, gateway::ClientSession, state::AppState};

pub(crate) async fn websocket_upgrade(
    State(state): State<AppState>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Result<Response, ApiError> {
    // 浏览器发起的升级请求必须来自允许的来源；非浏览器客户端不带 Origin
    if let Some(origin) = headers.get(ORIGIN) {
        if origin.as_bytes() != state.relay_config.allowed_origin.as_bytes() {
            return Err(ApiError::forbidden("origin not allowed"));
        }
    }

    Ok(ws.on_upgrade(move |socket| async move {
        WebSocketConnection::new(socket, &state).run().await;
    }))
}

/// WebSocket 连接管理器
///
/// 发送队列由 [`ConnectionHandle`] 持有，转发引擎只往队列里推事件；
/// 真正写 socket 的是本连接的发送任务。
pub struct WebSocketConnection {
    socket: WebSocket,
    relay: Arc<RelayEngine>,
    connection: ConnectionHandle,
    outbound: mpsc::Receiver<ServerEvent>,
}

impl WebSocketConnection {
    pub fn new(socket: WebSocket, state: &AppState) -> Self {
        let (connection, outbound) = ConnectionHandle::channel(state.relay_config.outbound_buffer);
        tracing::info!(connection_id = %connection.id(), "WebSocket 连接已建立");

        Self {
            socket,
            relay: state.relay.clone(),
            connection,
            outbound,
        }
    }

    /// 运行连接主循环，直到任意一侧结束，然后清理在线状态。
    pub async fn run(self) {
        let Self {
            socket,
            relay,
            connection,
            mut outbound,
        } = self;
        let connection_id: ConnectionId = connection.id();
        let (mut sender, mut incoming) = socket.split();

        // 心跳回应与事件推送共用同一个写端
        let (cmd_tx, mut cmd_rx) = mpsc::channel::<WsCommand>(8);

        let mut send_task = tokio::spawn(async move {
            loop {
                let frame = tokio::select! {
                    Some(cmd) = cmd_rx.recv() => match cmd {
                        WsCommand::SendPong(data) => WsMessage::Pong(data.into()),
                    },
                    Some(event) = outbound.recv() => match serde_json::to_string(&event) {
                        Ok(json) => WsMessage::Text(json.into()),
                        Err(err) => {
                            tracing::warn!(error = %err, "failed to serialize websocket payload");
                            continue;
                        }
                    },
                    else => break,
                };

                if sender.send(frame).await.is_err() {
                    tracing::debug!("WebSocket 写入失败");
                    break;
                }
            }
        });

        let mut session = ClientSession::new(relay.clone(), connection);
        let mut recv_task = tokio::spawn(async move {
            while let Some(Ok(message)) = incoming.next().await {
                match message {
                    WsMessage::Text(text) => session.handle_text(text.as_str()).await,
                    WsMessage::Ping(data) => {
                        if cmd_tx.send(WsCommand::SendPong(data.to_vec())).await.is_err() {
                            break;
                        }
                    }
                    WsMessage::Close(_) => {
                        tracing::debug!("WebSocket收到关闭消息");
                        break;
                    }
                    WsMessage::Pong(_) | WsMessage::Binary(_) => {}
                }
            }
        });

        tokio::select! {
            _ = &mut send_task => recv_task.abort(),
            _ = &mut recv_task => send_task.abort(),
        }

        relay.on_disconnect(connection_id).await;
        tracing::info!(connection_id = %connection_id, "WebSocket连接已断开，在线状态已清理");
    }
}

/// WebSocket 写操作命令
#[derive(Debug)]
enum WsCommand {
    SendPong(Vec<u8>),
}
