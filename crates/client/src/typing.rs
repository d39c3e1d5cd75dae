//! 接收方的"对方正在输入"状态机：Idle → Typing → Idle。
//!
//! 每个 typing 事件取消并重置过期计时器；过期、收到对方消息或会话关闭时回到 Idle。

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use domain::{TypingSignal, UserId};
use serde::Serialize;
use tokio::{sync::watch, task::JoinHandle, time::Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum TypingState {
    Idle,
    Typing,
}

pub struct TypingTracker {
    partner: UserId,
    local: UserId,
    window: Duration,
    signal: Option<TypingSignal>,
    state: Arc<watch::Sender<TypingState>>,
    /// 每次状态变更递增；过期任务只在代数未变时才回到 Idle
    generation: Arc<AtomicU64>,
    timer: Option<JoinHandle<()>>,
}

impl TypingTracker {
    pub fn new(partner: UserId, local: UserId, window: Duration) -> Self {
        let (state, _) = watch::channel(TypingState::Idle);
        Self {
            partner,
            local,
            window,
            signal: None,
            state: Arc::new(state),
            generation: Arc::new(AtomicU64::new(0)),
            timer: None,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<TypingState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> TypingState {
        *self.state.borrow()
    }

    pub fn signal(&self) -> Option<&TypingSignal> {
        self.signal.as_ref()
    }

    /// 收到对方的 typing 事件
    pub fn on_typing(&mut self) {
        let now = Instant::now();
        // 已过期的信号不再刷新，按新一轮输入重新创建
        let signal = match self.signal.as_mut().filter(|signal| signal.is_active(now)) {
            Some(signal) => {
                signal.refresh(now, self.window);
                *signal
            }
            None => *self
                .signal
                .insert(TypingSignal::new(self.partner, self.local, now, self.window)),
        };

        self.cancel_timer();
        let generation = self.generation.clone();
        let mut current = 0;
        // 与过期任务共用 watch 的写锁，保证代数与状态一起变化
        self.state.send_if_modified(|state| {
            current = generation.fetch_add(1, Ordering::SeqCst) + 1;
            let changed = *state != TypingState::Typing;
            *state = TypingState::Typing;
            changed
        });

        let state = self.state.clone();
        self.timer = Some(tokio::spawn(async move {
            tokio::time::sleep_until(signal.expires_at).await;
            state.send_if_modified(|state| {
                if generation.load(Ordering::SeqCst) == current && *state == TypingState::Typing {
                    *state = TypingState::Idle;
                    true
                } else {
                    false
                }
            });
        }));
    }

    /// 对方发来消息，说明已停止输入
    pub fn on_message(&mut self) {
        self.reset();
    }

    /// 会话关闭时清理计时器
    pub fn teardown(&mut self) {
        self.reset();
    }

    fn reset(&mut self) {
        self.cancel_timer();
        self.signal = None;
        let generation = self.generation.clone();
        self.state.send_if_modified(|state| {
            generation.fetch_add(1, Ordering::SeqCst);
            let changed = *state != TypingState::Idle;
            *state = TypingState::Idle;
            changed
        });
    }

    fn cancel_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}

impl Drop for TypingTracker {
    fn drop(&mut self) {
        self.cancel_timer();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    const WINDOW: Duration = Duration::from_millis(3000);

    fn tracker() -> TypingTracker {
        TypingTracker::new(
            UserId::from(Uuid::new_v4()),
            UserId::from(Uuid::new_v4()),
            WINDOW,
        )
    }

    /// 推进虚拟时间并让计时任务有机会运行
    async fn advance(ms: u64) {
        tokio::time::advance(Duration::from_millis(ms)).await;
        tokio::task::yield_now().await;
    }

    #[tokio::test(start_paused = true)]
    async fn typing_expires_after_window() {
        let mut tracker = tracker();
        assert_eq!(tracker.state(), TypingState::Idle);

        tracker.on_typing();
        assert_eq!(tracker.state(), TypingState::Typing);

        advance(2999).await;
        assert_eq!(tracker.state(), TypingState::Typing);

        advance(1).await;
        assert_eq!(tracker.state(), TypingState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_typing_resets_window_without_flicker() {
        let mut tracker = tracker();
        let mut states = tracker.subscribe();

        tracker.on_typing();
        states.borrow_and_update();
        advance(2000).await;
        tracker.on_typing();
        advance(2000).await;

        // 第一次事件后 4000ms，仍在输入；期间没有出现 Idle
        assert_eq!(tracker.state(), TypingState::Typing);
        assert!(!states.has_changed().unwrap());

        advance(1000).await;
        assert_eq!(tracker.state(), TypingState::Idle);
        assert!(states.has_changed().unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn message_clears_typing_immediately() {
        let mut tracker = tracker();
        tracker.on_typing();
        tracker.on_message();
        assert_eq!(tracker.state(), TypingState::Idle);
        assert!(tracker.signal().is_none());

        // 旧计时器已取消，之后的 typing 重新开始计时
        advance(1500).await;
        tracker.on_typing();
        advance(2000).await;
        assert_eq!(tracker.state(), TypingState::Typing);
    }

    #[tokio::test(start_paused = true)]
    async fn typing_after_expiry_starts_a_new_window() {
        let mut tracker = tracker();
        tracker.on_typing();
        advance(3000).await;
        assert_eq!(tracker.state(), TypingState::Idle);

        advance(500).await;
        tracker.on_typing();
        let now = Instant::now();
        assert_eq!(tracker.state(), TypingState::Typing);
        assert_eq!(tracker.signal().unwrap().expires_at, now + WINDOW);
        assert!(tracker.signal().unwrap().is_active(now));

        advance(2999).await;
        assert_eq!(tracker.state(), TypingState::Typing);
        advance(1).await;
        assert_eq!(tracker.state(), TypingState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn teardown_cancels_timer() {
        let mut tracker = tracker();
        tracker.on_typing();
        let timer = tracker.timer.as_ref().map(|t| t.abort_handle()).unwrap();

        tracker.teardown();
        tokio::task::yield_now().await;
        assert!(timer.is_finished());
        assert_eq!(tracker.state(), TypingState::Idle);
    }
}
