use std::time::Duration;

use tokio::time::Instant;

use crate::value_objects::UserId;

/// 默认的输入状态过期窗口（毫秒）。
pub const DEFAULT_TYPING_EXPIRY_MS: u64 = 3000;

/// 输入中信号。只存在于接收方内存中：收到 typing 事件时创建，
/// 重复事件刷新过期时间，过期或收到该对用户的新消息时销毁。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypingSignal {
    pub sender_id: UserId,
    pub receiver_id: UserId,
    pub expires_at: Instant,
}

impl TypingSignal {
    pub fn new(sender_id: UserId, receiver_id: UserId, now: Instant, window: Duration) -> Self {
        Self {
            sender_id,
            receiver_id,
            expires_at: now + window,
        }
    }

    /// 新的 typing 事件到来，重置过期时间。
    pub fn refresh(&mut self, now: Instant, window: Duration) {
        self.expires_at = now + window;
    }

    pub fn is_active(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}
