//! 会话 actor
//!
//! 每个打开的会话由一个任务独占 [`Reconciler`]，历史查询、实时事件和界面命令
//! 都在同一个 select 循环里串行处理，时间线只有一个写者。

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use domain::{ClientEvent, Message, MessageId, UserId};
use time::OffsetDateTime;
use tokio::{
    sync::{mpsc, oneshot, watch},
    task::JoinHandle,
};

use crate::{
    error::ClientError,
    reconciler::{ConversationSnapshot, Reconciler},
    routing::{RouteId, Routes},
    typing::{TypingState, TypingTracker},
};

/// 分发给会话的实时事件
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Message(Message),
    Typing,
    Accepted { message_id: MessageId },
    Rejected { message_id: MessageId, reason: String },
}

enum Command {
    Send {
        content: String,
        reply: oneshot::Sender<Result<MessageId, ClientError>>,
    },
    NotifyTyping,
    SetSearch(String),
    NextMatch(oneshot::Sender<Option<usize>>),
    PrevMatch(oneshot::Sender<Option<usize>>),
    Snapshot(oneshot::Sender<ConversationSnapshot>),
}

/// 打开的会话句柄。关闭或丢弃时注销实时路由、终止 actor，
/// 迟到的历史结果和输入提示计时器随之丢弃。
pub struct ConversationSession {
    partner: UserId,
    commands: mpsc::Sender<Command>,
    snapshots: watch::Receiver<ConversationSnapshot>,
    typing: watch::Receiver<TypingState>,
    task: JoinHandle<()>,
    route: Option<(Routes, RouteId)>,
}

impl ConversationSession {
    /// 启动会话 actor。调用方应在发起历史查询之前注册好 `live` 的发送端。
    pub fn spawn<F>(
        local: UserId,
        partner: UserId,
        history: F,
        live: mpsc::Receiver<SessionEvent>,
        outgoing: mpsc::Sender<ClientEvent>,
        typing_window: Duration,
    ) -> Self
    where
        F: Future<Output = Result<Vec<Message>, ClientError>> + Send + 'static,
    {
        let mut reconciler = Reconciler::new(local, partner);
        let tracker = TypingTracker::new(partner, local, typing_window);
        let typing = tracker.subscribe();
        let (snapshot_tx, snapshots) = watch::channel(reconciler.snapshot());
        let (commands, command_rx) = mpsc::channel(32);

        let actor = SessionActor {
            local,
            partner,
            reconciler,
            tracker,
            outgoing,
            snapshot_tx,
        };
        let task = tokio::spawn(actor.run(Box::pin(history), live, command_rx));

        Self {
            partner,
            commands,
            snapshots,
            typing,
            task,
            route: None,
        }
    }

    pub(crate) fn with_route(mut self, routes: Routes, route_id: RouteId) -> Self {
        self.route = Some((routes, route_id));
        self
    }

    pub fn partner(&self) -> UserId {
        self.partner
    }

    /// 发送消息：本地立即显示，返回客户端生成的消息 ID
    pub async fn send(&self, content: impl Into<String>) -> Result<MessageId, ClientError> {
        let (reply, rx) = oneshot::channel();
        self.command(Command::Send {
            content: content.into(),
            reply,
        })
        .await?;
        rx.await.map_err(|_| ClientError::SessionClosed)?
    }

    /// 通知对方本地用户正在输入
    pub async fn notify_typing(&self) -> Result<(), ClientError> {
        self.command(Command::NotifyTyping).await
    }

    pub async fn set_search(&self, query: impl Into<String>) -> Result<(), ClientError> {
        self.command(Command::SetSearch(query.into())).await
    }

    pub async fn next_match(&self) -> Result<Option<usize>, ClientError> {
        let (reply, rx) = oneshot::channel();
        self.command(Command::NextMatch(reply)).await?;
        rx.await.map_err(|_| ClientError::SessionClosed)
    }

    pub async fn prev_match(&self) -> Result<Option<usize>, ClientError> {
        let (reply, rx) = oneshot::channel();
        self.command(Command::PrevMatch(reply)).await?;
        rx.await.map_err(|_| ClientError::SessionClosed)
    }

    pub async fn snapshot(&self) -> Result<ConversationSnapshot, ClientError> {
        let (reply, rx) = oneshot::channel();
        self.command(Command::Snapshot(reply)).await?;
        rx.await.map_err(|_| ClientError::SessionClosed)
    }

    /// 每次时间线或搜索状态变化后发布的快照
    pub fn subscribe(&self) -> watch::Receiver<ConversationSnapshot> {
        self.snapshots.clone()
    }

    pub fn typing_state(&self) -> watch::Receiver<TypingState> {
        self.typing.clone()
    }

    pub async fn close(mut self) {
        if let Some((routes, route_id)) = self.route.take() {
            routes.unregister(self.partner, route_id).await;
        }
        self.task.abort();
        tracing::debug!(partner = %self.partner, "会话已关闭");
    }

    async fn command(&self, command: Command) -> Result<(), ClientError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| ClientError::SessionClosed)
    }
}

impl Drop for ConversationSession {
    fn drop(&mut self) {
        self.task.abort();
        // 没有运行时可用时，路由在分发器下一次投递失败时注销
        if let Some((routes, route_id)) = self.route.take() {
            if let Ok(handle) = tokio::runtime::Handle::try_current() {
                let partner = self.partner;
                handle.spawn(async move { routes.unregister(partner, route_id).await });
            }
        }
    }
}

struct SessionActor {
    local: UserId,
    partner: UserId,
    reconciler: Reconciler,
    tracker: TypingTracker,
    outgoing: mpsc::Sender<ClientEvent>,
    snapshot_tx: watch::Sender<ConversationSnapshot>,
}

impl SessionActor {
    async fn run(
        mut self,
        mut history: Pin<Box<dyn Future<Output = Result<Vec<Message>, ClientError>> + Send>>,
        mut live: mpsc::Receiver<SessionEvent>,
        mut commands: mpsc::Receiver<Command>,
    ) {
        let mut history_done = false;
        let mut live_open = true;

        loop {
            tokio::select! {
                result = &mut history, if !history_done => {
                    history_done = true;
                    self.reconciler.on_history(result.map_err(|err| err.to_string()));
                    self.publish();
                }
                event = live.recv(), if live_open => match event {
                    Some(event) => self.on_event(event),
                    None => live_open = false,
                },
                command = commands.recv() => match command {
                    Some(command) => self.on_command(command).await,
                    None => break,
                },
            }
        }

        self.tracker.teardown();
        tracing::debug!(partner = %self.partner, "会话 actor 结束");
    }

    fn on_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Message(message) => {
                if message.sender_id == self.partner {
                    self.tracker.on_message();
                }
                if self.reconciler.on_live_message(message) {
                    self.publish();
                }
            }
            SessionEvent::Typing => self.tracker.on_typing(),
            SessionEvent::Accepted { message_id } => {
                if self.reconciler.on_accepted(message_id) {
                    self.publish();
                }
            }
            SessionEvent::Rejected { message_id, reason } => {
                tracing::warn!(message_id = %message_id, reason = %reason, "消息未能持久化");
                if self.reconciler.on_rejected(message_id, &reason) {
                    self.publish();
                }
            }
        }
    }

    async fn on_command(&mut self, command: Command) {
        match command {
            Command::Send { content, reply } => {
                let result = self.send(&content).await;
                self.publish();
                let _ = reply.send(result);
            }
            Command::NotifyTyping => {
                let event = ClientEvent::Typing {
                    sender_id: self.local,
                    receiver_id: self.partner,
                };
                if self.outgoing.send(event).await.is_err() {
                    tracing::debug!("传输已关闭，无法发送输入状态");
                }
            }
            Command::SetSearch(query) => {
                self.reconciler.set_search(query);
                self.publish();
            }
            Command::NextMatch(reply) => {
                let _ = reply.send(self.reconciler.next_match());
                self.publish();
            }
            Command::PrevMatch(reply) => {
                let _ = reply.send(self.reconciler.prev_match());
                self.publish();
            }
            Command::Snapshot(reply) => {
                let _ = reply.send(self.reconciler.snapshot());
            }
        }
    }

    async fn send(&mut self, content: &str) -> Result<MessageId, ClientError> {
        let message = self
            .reconciler
            .send_local(content, OffsetDateTime::now_utc())?;
        let event = ClientEvent::SendMessage {
            sender_id: message.sender_id,
            receiver_id: message.receiver_id,
            message: message.content.to_string(),
            message_id: Some(message.id),
        };

        if self.outgoing.send(event).await.is_err() {
            self.reconciler.on_rejected(message.id, "transport closed");
            return Err(ClientError::transport("transport closed"));
        }
        Ok(message.id)
    }

    fn publish(&mut self) {
        self.snapshot_tx.send_replace(self.reconciler.snapshot());
    }
}
