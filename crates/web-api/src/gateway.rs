//! 单个实时连接上的事件处理，与具体传输方式（WebSocket / 长轮询）无关。

use std::sync::Arc;

use application::{ApplicationError, ConnectionHandle, RelayEngine, SendMessageRequest};
use domain::{ClientEvent, ConnectionId, DomainError, ServerEvent, UserId};

/// 连接会话：记录该连接 join 的身份，并校验后续事件的发送方。
pub struct ClientSession {
    relay: Arc<RelayEngine>,
    connection: ConnectionHandle,
    joined: Option<UserId>,
}

impl ClientSession {
    pub fn new(relay: Arc<RelayEngine>, connection: ConnectionHandle) -> Self {
        Self {
            relay,
            connection,
            joined: None,
        }
    }

    pub fn connection_id(&self) -> ConnectionId {
        self.connection.id()
    }

    pub fn joined_user(&self) -> Option<UserId> {
        self.joined
    }

    /// 处理一条原始文本帧；无法解析时回送 error 事件。
    pub async fn handle_text(&mut self, text: &str) {
        match serde_json::from_str::<ClientEvent>(text) {
            Ok(event) => self.handle(event).await,
            Err(err) => {
                tracing::debug!(error = %err, connection_id = %self.connection.id(), "无法解析客户端事件");
                self.reply(ServerEvent::error("BAD_EVENT", format!("invalid event: {err}")));
            }
        }
    }

    pub async fn handle(&mut self, event: ClientEvent) {
        match event {
            ClientEvent::Join { user_id } => {
                self.relay.on_join(user_id, self.connection.clone()).await;
                self.joined = Some(user_id);
                self.reply(ServerEvent::Joined {
                    user_id,
                    connection_id: self.connection.id(),
                });
            }
            ClientEvent::SendMessage {
                sender_id,
                receiver_id,
                message,
                message_id,
            } => {
                if let Err(err) = self.authorize(sender_id) {
                    self.reject(err);
                    return;
                }

                let request = SendMessageRequest {
                    sender_id,
                    receiver_id,
                    content: message,
                    message_id,
                };
                match self.relay.on_send(request).await {
                    Ok(receipt) => {
                        let connection = self.connection.clone();
                        let persistence = receipt.persistence;
                        let message_id = persistence.message_id();
                        tokio::spawn(async move {
                            let ack = match persistence.outcome().await {
                                Ok(()) => ServerEvent::MessageAccepted {
                                    message_id,
                                    receiver_id,
                                },
                                Err(err) => ServerEvent::MessageRejected {
                                    message_id,
                                    receiver_id,
                                    reason: err.to_string(),
                                },
                            };
                            if let Err(err) = connection.push(ack) {
                                tracing::debug!(error = %err, message_id = %message_id, "发送方已无法接收确认");
                            }
                        });
                    }
                    Err(err) => self.reject(err),
                }
            }
            ClientEvent::Typing {
                sender_id,
                receiver_id,
            } => {
                if let Err(err) = self.authorize(sender_id) {
                    self.reject(err);
                    return;
                }
                self.relay.on_typing(sender_id, receiver_id).await;
            }
        }
    }

    /// 连接结束时清理在线状态，幂等。
    pub async fn disconnect(&mut self) {
        self.relay.on_disconnect(self.connection.id()).await;
        self.joined = None;
    }

    fn authorize(&self, sender_id: UserId) -> Result<(), ApplicationError> {
        match self.joined {
            None => Err(DomainError::not_allowed("connection has not joined").into()),
            Some(joined) if joined != sender_id => {
                Err(DomainError::not_allowed("sender does not match joined user").into())
            }
            Some(_) => Ok(()),
        }
    }

    fn reject(&self, err: ApplicationError) {
        tracing::debug!(error = %err, connection_id = %self.connection.id(), "拒绝客户端事件");
        let code = match &err {
            ApplicationError::Domain(DomainError::InvalidArgument { .. }) => "INVALID_ARGUMENT",
            ApplicationError::Domain(DomainError::OperationNotAllowed { .. }) => {
                "OPERATION_NOT_ALLOWED"
            }
            _ => "INTERNAL_ERROR",
        };
        self.reply(ServerEvent::error(code, err.to_string()));
    }

    fn reply(&self, event: ServerEvent) {
        if let Err(err) = self.connection.push(event) {
            tracing::debug!(error = %err, connection_id = %self.connection.id(), "回复事件失败");
        }
    }
}
