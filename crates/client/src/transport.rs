//! 实时传输：WebSocket 优先，长轮询作为后备，按配置顺序尝试。
//!
//! 两种传输对上层暴露同样的接口：一个发送客户端事件的队列和一个接收服务器事件的队列。

use std::time::Duration;

use config::Transport;
use domain::{ClientEvent, ConnectionId, ServerEvent};
use futures_util::{SinkExt, StreamExt};
use reqwest::StatusCode;
use serde::Deserialize;
use tokio::{sync::mpsc, task::JoinHandle};
use tokio_tungstenite::{connect_async, tungstenite::Message as WsMessage};

use crate::error::ClientError;

const CHANNEL_CAPACITY: usize = 256;
/// 长轮询连续失败多少次后放弃
const MAX_POLL_FAILURES: u32 = 3;
const POLL_RETRY_DELAY: Duration = Duration::from_millis(500);

/// 已建立的实时传输
pub struct TransportLink {
    kind: Transport,
    outgoing: mpsc::Sender<ClientEvent>,
    incoming: mpsc::Receiver<ServerEvent>,
    tasks: TransportTasks,
}

impl TransportLink {
    /// 用现成的队列构造传输，便于接入自定义实现
    pub fn from_channels(
        kind: Transport,
        outgoing: mpsc::Sender<ClientEvent>,
        incoming: mpsc::Receiver<ServerEvent>,
    ) -> Self {
        Self {
            kind,
            outgoing,
            incoming,
            tasks: TransportTasks::default(),
        }
    }

    pub fn kind(&self) -> Transport {
        self.kind
    }

    pub(crate) fn into_parts(
        self,
    ) -> (
        Transport,
        mpsc::Sender<ClientEvent>,
        mpsc::Receiver<ServerEvent>,
        TransportTasks,
    ) {
        (self.kind, self.outgoing, self.incoming, self.tasks)
    }
}

/// 传输后台任务；丢弃时中止
#[derive(Default)]
pub(crate) struct TransportTasks {
    handles: Vec<JoinHandle<()>>,
    /// 长轮询会话地址，关闭时通知服务器
    poll_session: Option<(reqwest::Client, String)>,
}

impl TransportTasks {
    pub(crate) async fn shutdown(mut self) {
        if let Some((http, url)) = self.poll_session.take() {
            if let Err(err) = http.delete(&url).send().await {
                tracing::debug!(error = %err, "关闭长轮询会话失败");
            }
        }
        self.abort();
    }

    fn abort(&mut self) {
        for handle in self.handles.drain(..) {
            handle.abort();
        }
    }
}

impl Drop for TransportTasks {
    fn drop(&mut self) {
        self.abort();
    }
}

/// 按顺序尝试配置的传输方式，返回第一个成功建立的。
pub async fn connect(
    server_url: &str,
    transports: &[Transport],
    http: &reqwest::Client,
) -> Result<TransportLink, ClientError> {
    let mut last_error = None;

    for transport in transports {
        let attempt = match transport {
            Transport::WebSocket => connect_websocket(server_url).await,
            Transport::LongPolling => connect_long_polling(server_url, http).await,
        };
        match attempt {
            Ok(link) => {
                tracing::info!(transport = ?transport, "实时传输已建立");
                return Ok(link);
            }
            Err(err) => {
                tracing::warn!(transport = ?transport, error = %err, "传输建立失败，尝试下一个");
                last_error = Some(err);
            }
        }
    }

    Err(ClientError::NoTransport(
        last_error.map_or_else(|| "no transport configured".to_string(), |err| err.to_string()),
    ))
}

pub(crate) fn websocket_url(server_url: &str) -> Result<String, ClientError> {
    let base = server_url.trim_end_matches('/');
    let ws_base = if let Some(rest) = base.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = base.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        return Err(ClientError::transport(
            "server_url must start with http:// or https://",
        ));
    };
    Ok(format!("{ws_base}/api/v1/ws"))
}

async fn connect_websocket(server_url: &str) -> Result<TransportLink, ClientError> {
    let url = websocket_url(server_url)?;
    let (stream, _) = connect_async(url.as_str())
        .await
        .map_err(|err| ClientError::transport(format!("websocket connect failed: {err}")))?;

    let (out_tx, mut out_rx) = mpsc::channel::<ClientEvent>(CHANNEL_CAPACITY);
    let (in_tx, in_rx) = mpsc::channel::<ServerEvent>(CHANNEL_CAPACITY);

    // 读写分开：上层消费变慢时只阻塞读端，发送不受影响
    let (mut sink, mut frames) = stream.split();

    let reader = tokio::spawn(async move {
        while let Some(frame) = frames.next().await {
            match frame {
                Ok(WsMessage::Text(text)) => {
                    match serde_json::from_str::<ServerEvent>(text.as_str()) {
                        Ok(event) => {
                            if in_tx.send(event).await.is_err() {
                                break;
                            }
                        }
                        Err(err) => tracing::warn!(error = %err, "无法解析服务器事件"),
                    }
                }
                Ok(WsMessage::Close(_)) => break,
                Ok(_) => {}
                Err(err) => {
                    tracing::warn!(error = %err, "WebSocket 接收失败");
                    break;
                }
            }
        }
        tracing::debug!("WebSocket 读端结束");
    });

    let writer = tokio::spawn(async move {
        while let Some(event) = out_rx.recv().await {
            let json = match serde_json::to_string(&event) {
                Ok(json) => json,
                Err(err) => {
                    tracing::warn!(error = %err, "序列化客户端事件失败");
                    continue;
                }
            };
            if sink.send(WsMessage::Text(json.into())).await.is_err() {
                tracing::warn!("WebSocket 发送失败");
                return;
            }
        }
        let _ = sink.send(WsMessage::Close(None)).await;
        tracing::debug!("WebSocket 写端结束");
    });

    Ok(TransportLink {
        kind: Transport::WebSocket,
        outgoing: out_tx,
        incoming: in_rx,
        tasks: TransportTasks {
            handles: vec![reader, writer],
            poll_session: None,
        },
    })
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PollOpened {
    connection_id: ConnectionId,
}

async fn connect_long_polling(
    server_url: &str,
    http: &reqwest::Client,
) -> Result<TransportLink, ClientError> {
    let base = server_url.trim_end_matches('/');
    let response = http.post(format!("{base}/api/v1/poll")).send().await?;
    if !response.status().is_success() {
        return Err(ClientError::Status(response.status().as_u16()));
    }
    let opened: PollOpened = response.json().await?;
    let session_url = format!("{base}/api/v1/poll/{}", opened.connection_id);

    let (out_tx, mut out_rx) = mpsc::channel::<ClientEvent>(CHANNEL_CAPACITY);
    let (in_tx, in_rx) = mpsc::channel::<ServerEvent>(CHANNEL_CAPACITY);
    let rejections = in_tx.clone();

    let reader = {
        let http = http.clone();
        let url = session_url.clone();
        tokio::spawn(async move {
            let mut failures = 0;
            loop {
                match poll_once(&http, &url).await {
                    Ok(events) => {
                        failures = 0;
                        for event in events {
                            if in_tx.send(event).await.is_err() {
                                return;
                            }
                        }
                    }
                    Err(ClientError::Status(404)) => {
                        tracing::info!("长轮询会话已失效");
                        return;
                    }
                    Err(err) => {
                        failures += 1;
                        tracing::warn!(error = %err, failures, "长轮询请求失败");
                        if failures >= MAX_POLL_FAILURES {
                            return;
                        }
                        tokio::time::sleep(POLL_RETRY_DELAY).await;
                    }
                }
            }
        })
    };

    let writer = {
        let http = http.clone();
        let url = session_url.clone();
        tokio::spawn(async move {
            while let Some(event) = out_rx.recv().await {
                let reason = match http.post(&url).json(&event).send().await {
                    Ok(response) if response.status().is_success() => continue,
                    Ok(response) => {
                        tracing::warn!(status = %response.status(), "长轮询提交事件被拒绝");
                        format!("submit rejected with status {}", response.status().as_u16())
                    }
                    Err(err) => {
                        tracing::warn!(error = %err, "长轮询提交事件失败");
                        format!("submit failed: {err}")
                    }
                };
                // 没送到服务器的消息在本地标记为失败
                if let Some(rejection) = undelivered(&event, reason) {
                    if rejections.send(rejection).await.is_err() {
                        return;
                    }
                }
            }
        })
    };

    Ok(TransportLink {
        kind: Transport::LongPolling,
        outgoing: out_tx,
        incoming: in_rx,
        tasks: TransportTasks {
            handles: vec![reader, writer],
            poll_session: Some((http.clone(), session_url)),
        },
    })
}

/// 提交失败的发送请求转换为拒绝事件；其他事件不需要回执
fn undelivered(event: &ClientEvent, reason: String) -> Option<ServerEvent> {
    match event {
        ClientEvent::SendMessage {
            receiver_id,
            message_id: Some(message_id),
            ..
        } => Some(ServerEvent::MessageRejected {
            message_id: *message_id,
            receiver_id: *receiver_id,
            reason,
        }),
        _ => None,
    }
}

async fn poll_once(http: &reqwest::Client, url: &str) -> Result<Vec<ServerEvent>, ClientError> {
    let response = http.get(url).send().await?;
    match response.status() {
        status if status.is_success() => Ok(response.json().await?),
        StatusCode::NOT_FOUND => Err(ClientError::Status(404)),
        status => Err(ClientError::Status(status.as_u16())),
    }
}
