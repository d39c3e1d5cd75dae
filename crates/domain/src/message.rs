use serde::{Deserialize, Serialize};

use crate::value_objects::{MessageContent, MessageId, Timestamp, UserId};

/// 一条私聊消息。创建后不可变，本子系统从不删除消息。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: MessageId,
    pub sender_id: UserId,
    pub receiver_id: UserId,
    pub content: MessageContent,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: Timestamp,
}

impl Message {
    pub fn new(
        id: MessageId,
        sender_id: UserId,
        receiver_id: UserId,
        content: MessageContent,
        timestamp: Timestamp,
    ) -> Self {
        Self {
            id,
            sender_id,
            receiver_id,
            content,
            timestamp,
        }
    }

    /// 消息所属的会话（无序用户对）。
    pub fn conversation(&self) -> Conversation {
        Conversation::new(self.sender_id, self.receiver_id)
    }

    /// 时间线排序键：时间戳升序，时间戳相同按 ID 决胜。
    pub fn ordering_key(&self) -> (Timestamp, MessageId) {
        (self.timestamp, self.id)
    }
}

/// 隐式会话：无序的用户对 {a, b}，不单独存储，查询时推导。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Conversation {
    low: UserId,
    high: UserId,
}

impl Conversation {
    pub fn new(a: UserId, b: UserId) -> Self {
        if a <= b {
            Self { low: a, high: b }
        } else {
            Self { low: b, high: a }
        }
    }

    /// 判断消息的 {sender, receiver} 是否为本会话用户对的一个排列。
    pub fn contains(&self, message: &Message) -> bool {
        message.conversation() == *self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;
    use uuid::Uuid;

    fn user() -> UserId {
        UserId::from(Uuid::new_v4())
    }

    #[test]
    fn conversation_is_unordered() {
        let (a, b) = (user(), user());
        assert_eq!(Conversation::new(a, b), Conversation::new(b, a));
    }

    #[test]
    fn conversation_matches_both_directions() {
        let (a, b, c) = (user(), user(), user());
        let content = MessageContent::new("hi").unwrap();
        let at = datetime!(2024-05-01 10:00 UTC);
        let forward = Message::new(MessageId::generate(), a, b, content.clone(), at);
        let backward = Message::new(MessageId::generate(), b, a, content.clone(), at);
        let elsewhere = Message::new(MessageId::generate(), a, c, content, at);

        let pair = Conversation::new(a, b);
        assert!(pair.contains(&forward));
        assert!(pair.contains(&backward));
        assert!(!pair.contains(&elsewhere));
    }

    #[test]
    fn message_serializes_with_rfc3339_timestamp() {
        let message = Message::new(
            MessageId::generate(),
            user(),
            user(),
            MessageContent::new("hello").unwrap(),
            datetime!(2024-05-01 10:00 UTC),
        );
        let json = serde_json::to_value(&message).unwrap();
        assert_eq!(json["timestamp"], "2024-05-01T10:00:00Z");
        assert_eq!(json["content"], "hello");

        let back: Message = serde_json::from_value(json).unwrap();
        assert_eq!(back, message);
    }
}
