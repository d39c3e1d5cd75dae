//! 消息转发引擎
//!
//! 处理 join / sendMessage / typing / disconnect 事件：查询在线目录，把事件推送到
//! 接收方连接，并把消息独立地交给消息存储。实时投递与持久化互不回滚，
//! 历史查询才是持久性的唯一依据。

use std::sync::Arc;

use domain::{
    ConnectionId, Message, MessageContent, MessageId, MessageStore, RepositoryError, ServerEvent,
    UserId,
};
use tokio::task::JoinHandle;

use crate::{
    clock::Clock,
    connection::{ConnectionError, ConnectionHandle},
    error::ApplicationError,
    presence::PresenceDirectory,
};

pub struct RelayDependencies {
    pub presence: Arc<dyn PresenceDirectory>,
    pub message_store: Arc<dyn MessageStore>,
    pub clock: Arc<dyn Clock>,
}

#[derive(Debug, Clone)]
pub struct SendMessageRequest {
    pub sender_id: UserId,
    pub receiver_id: UserId,
    pub content: String,
    /// 客户端在发送动作中生成的 ID；缺省时由引擎生成
    pub message_id: Option<MessageId>,
}

/// 实时投递结果。接收方离线是预期分支，不是错误。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LiveDelivery {
    Delivered,
    Offline,
    Failed(ConnectionError),
}

/// 后台持久化任务的句柄。
///
/// 丢弃句柄不会取消写入；失败只记录一次日志，不重试。
#[derive(Debug)]
pub struct PersistenceHandle {
    message_id: MessageId,
    task: JoinHandle<Result<(), RepositoryError>>,
}

impl PersistenceHandle {
    pub fn message_id(&self) -> MessageId {
        self.message_id
    }

    /// 等待写入完成并返回结果。
    pub async fn outcome(self) -> Result<(), ApplicationError> {
        match self.task.await {
            Ok(result) => result.map_err(ApplicationError::from),
            Err(err) => Err(ApplicationError::infrastructure(format!(
                "persistence task aborted: {err}"
            ))),
        }
    }
}

#[derive(Debug)]
pub struct SendReceipt {
    pub message: Message,
    pub delivery: LiveDelivery,
    pub persistence: PersistenceHandle,
}

pub struct RelayEngine {
    deps: RelayDependencies,
}

impl RelayEngine {
    pub fn new(deps: RelayDependencies) -> Self {
        Self { deps }
    }

    pub fn presence(&self) -> &Arc<dyn PresenceDirectory> {
        &self.deps.presence
    }

    /// 用户 join：登记在线状态，后注册者覆盖。
    pub async fn on_join(&self, user_id: UserId, connection: ConnectionHandle) {
        let connection_id = connection.id();
        self.deps.presence.register(user_id, connection).await;
        tracing::info!(user_id = %user_id, connection_id = %connection_id, "用户加入");
    }

    /// 发送消息：生成消息后分两路独立执行
    /// (a) 接收方在线则推送实时事件；(b) 无条件提交持久化。
    pub async fn on_send(&self, request: SendMessageRequest) -> Result<SendReceipt, ApplicationError> {
        let content = MessageContent::new(request.content)?;
        let message = Message::new(
            request.message_id.unwrap_or_else(MessageId::generate),
            request.sender_id,
            request.receiver_id,
            content,
            self.deps.clock.now(),
        );

        let delivery = self.deliver(&message).await;
        let persistence = self.persist(message.clone());

        Ok(SendReceipt {
            message,
            delivery,
            persistence,
        })
    }

    /// 输入中提示：接收方在线则转发，否则什么也不做。不做持久化。
    pub async fn on_typing(&self, sender_id: UserId, receiver_id: UserId) -> bool {
        let Some(connection) = self.deps.presence.lookup(receiver_id).await else {
            return false;
        };

        match connection.push(ServerEvent::Typing { sender_id }) {
            Ok(()) => {
                tracing::debug!(sender_id = %sender_id, receiver_id = %receiver_id, "转发输入状态");
                true
            }
            Err(err) => {
                tracing::warn!(error = %err, receiver_id = %receiver_id, "输入状态转发失败");
                false
            }
        }
    }

    /// 连接断开：从在线目录移除。
    pub async fn on_disconnect(&self, connection_id: ConnectionId) -> Option<UserId> {
        let user_id = self.deps.presence.remove(connection_id).await;
        match user_id {
            Some(user_id) => {
                tracing::info!(user_id = %user_id, connection_id = %connection_id, "用户已离线")
            }
            None => tracing::debug!(connection_id = %connection_id, "断开的连接未注册或已被覆盖"),
        }
        user_id
    }

    async fn deliver(&self, message: &Message) -> LiveDelivery {
        let Some(connection) = self.deps.presence.lookup(message.receiver_id).await else {
            tracing::debug!(
                message_id = %message.id,
                receiver_id = %message.receiver_id,
                "接收方离线，仅持久化"
            );
            return LiveDelivery::Offline;
        };

        match connection.push(ServerEvent::receive(message)) {
            Ok(()) => {
                tracing::debug!(
                    message_id = %message.id,
                    sender_id = %message.sender_id,
                    receiver_id = %message.receiver_id,
                    "实时投递消息"
                );
                LiveDelivery::Delivered
            }
            Err(err) => {
                tracing::warn!(
                    error = %err,
                    message_id = %message.id,
                    connection_id = %connection.id(),
                    "实时投递失败"
                );
                LiveDelivery::Failed(err)
            }
        }
    }

    fn persist(&self, message: Message) -> PersistenceHandle {
        let store = self.deps.message_store.clone();
        let message_id = message.id;

        let task = tokio::spawn(async move {
            let result = store.append(message).await;
            match &result {
                Ok(()) => tracing::debug!(message_id = %message_id, "消息已持久化"),
                Err(err) => tracing::error!(error = %err, message_id = %message_id, "消息持久化失败"),
            }
            result
        });

        PersistenceHandle { message_id, task }
    }
}
