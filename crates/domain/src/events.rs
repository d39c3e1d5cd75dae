//! 实时传输事件
//!
//! 客户端与服务器之间对称的事件定义，JSON 编码，按 `type` 字段区分。

use serde::{Deserialize, Serialize};

use crate::message::Message;
use crate::value_objects::{ConnectionId, MessageContent, MessageId, Timestamp, UserId};

/// 客户端发往服务器的事件
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ClientEvent {
    /// 注册在线状态
    Join { user_id: UserId },
    /// 发送消息；`message_id` 由客户端在发送动作时生成，缺省时由服务器生成
    SendMessage {
        sender_id: UserId,
        receiver_id: UserId,
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message_id: Option<MessageId>,
    },
    /// 输入中提示
    Typing {
        sender_id: UserId,
        receiver_id: UserId,
    },
}

/// 服务器发往客户端的事件
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ServerEvent {
    /// join 成功
    Joined {
        user_id: UserId,
        connection_id: ConnectionId,
    },
    /// 实时投递的新消息（只发给接收方）
    ReceiveMessage {
        id: MessageId,
        sender_id: UserId,
        message: MessageContent,
        #[serde(with = "time::serde::rfc3339")]
        timestamp: Timestamp,
    },
    /// 对方正在输入（只发给接收方）
    Typing { sender_id: UserId },
    /// 消息已持久化（发给发送方）
    MessageAccepted {
        message_id: MessageId,
        receiver_id: UserId,
    },
    /// 消息持久化失败，不会重试（发给发送方）
    MessageRejected {
        message_id: MessageId,
        receiver_id: UserId,
        reason: String,
    },
    /// 请求被拒绝
    Error { code: String, message: String },
}

impl ServerEvent {
    /// 构造实时投递事件
    pub fn receive(message: &Message) -> Self {
        Self::ReceiveMessage {
            id: message.id,
            sender_id: message.sender_id,
            message: message.content.clone(),
            timestamp: message.timestamp,
        }
    }

    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Error {
            code: code.into(),
            message: message.into(),
        }
    }

    /// 将实时投递事件还原为消息；`receiver_id` 是接收该事件的本地用户。
    pub fn into_message(self, receiver_id: UserId) -> Option<Message> {
        match self {
            Self::ReceiveMessage {
                id,
                sender_id,
                message,
                timestamp,
            } => Some(Message::new(id, sender_id, receiver_id, message, timestamp)),
            _ => None,
        }
    }
}
