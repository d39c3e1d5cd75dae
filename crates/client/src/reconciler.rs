//! 历史查询与实时事件的合并
//!
//! 打开会话时历史查询和实时订阅同时开始。历史结果返回之前到达的实时消息先缓存；
//! 历史返回后用它初始化时间线，再按去重规则回放缓存，之后切换为直接追加。

use domain::{Conversation, DomainError, Message, MessageContent, MessageId, Timestamp, UserId};
use serde::Serialize;

use crate::search::{SearchIndex, SearchView};
use crate::timeline::{Insertion, Timeline, TimelineEntry};

#[derive(Debug)]
enum Phase {
    AwaitingHistory { buffer: Vec<Message> },
    Live,
}

/// 会话状态快照，供界面渲染
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSnapshot {
    pub partner: UserId,
    pub entries: Vec<TimelineEntry>,
    /// 历史已返回（或已失败）并进入实时追加阶段
    pub live: bool,
    pub history_error: Option<String>,
    pub search: SearchView,
}

pub struct Reconciler {
    local: UserId,
    partner: UserId,
    conversation: Conversation,
    phase: Phase,
    timeline: Timeline,
    search: SearchIndex,
    history_error: Option<String>,
}

impl Reconciler {
    pub fn new(local: UserId, partner: UserId) -> Self {
        Self {
            local,
            partner,
            conversation: Conversation::new(local, partner),
            phase: Phase::AwaitingHistory { buffer: Vec::new() },
            timeline: Timeline::new(),
            search: SearchIndex::new(),
            history_error: None,
        }
    }

    pub fn partner(&self) -> UserId {
        self.partner
    }

    pub fn is_live(&self) -> bool {
        matches!(self.phase, Phase::Live)
    }

    pub fn timeline(&self) -> &Timeline {
        &self.timeline
    }

    pub fn history_error(&self) -> Option<&str> {
        self.history_error.as_deref()
    }

    /// 实时消息。不属于本会话的消息被忽略；历史未返回前先缓存。
    /// 返回消息是否进入了时间线。
    pub fn on_live_message(&mut self, message: Message) -> bool {
        if !self.conversation.contains(&message) {
            tracing::debug!(message_id = %message.id, "忽略不属于当前会话的消息");
            return false;
        }

        match &mut self.phase {
            Phase::AwaitingHistory { buffer } => {
                buffer.push(message);
                false
            }
            Phase::Live => matches!(self.timeline.insert(message), Insertion::Inserted(_)),
        }
    }

    /// 历史查询结果。只在第一次生效；进入实时阶段后到达的结果被丢弃。
    pub fn on_history(&mut self, result: Result<Vec<Message>, String>) {
        let buffer = match std::mem::replace(&mut self.phase, Phase::Live) {
            Phase::AwaitingHistory { buffer } => buffer,
            Phase::Live => {
                tracing::debug!(partner = %self.partner, "丢弃迟到的历史结果");
                return;
            }
        };

        match result {
            Ok(history) => {
                let count = history.len();
                for message in history
                    .into_iter()
                    .filter(|message| self.conversation.contains(message))
                {
                    self.timeline.insert(message);
                }
                tracing::debug!(partner = %self.partner, count, buffered = buffer.len(), "历史消息已合并");
            }
            Err(err) => {
                tracing::warn!(partner = %self.partner, error = %err, "历史消息加载失败，仅显示实时消息");
                self.history_error = Some(err);
            }
        }

        for message in buffer {
            self.timeline.insert(message);
        }
    }

    /// 本地发送：在发送动作中生成消息 ID，乐观地插入时间线。
    pub fn send_local(&mut self, content: &str, now: Timestamp) -> Result<Message, DomainError> {
        let message = Message::new(
            MessageId::generate(),
            self.local,
            self.partner,
            MessageContent::new(content)?,
            now,
        );
        self.timeline.insert_local(message.clone());
        Ok(message)
    }

    pub fn on_accepted(&mut self, message_id: MessageId) -> bool {
        self.timeline.mark_persisted(message_id)
    }

    pub fn on_rejected(&mut self, message_id: MessageId, reason: &str) -> bool {
        self.timeline.mark_failed(message_id, reason)
    }

    pub fn set_search(&mut self, query: impl Into<String>) {
        self.search.set_query(query);
        self.search.refresh(&self.timeline);
    }

    pub fn next_match(&mut self) -> Option<usize> {
        self.search.next_match(&self.timeline)
    }

    pub fn prev_match(&mut self) -> Option<usize> {
        self.search.prev_match(&self.timeline)
    }

    pub fn snapshot(&mut self) -> ConversationSnapshot {
        ConversationSnapshot {
            partner: self.partner,
            entries: self.timeline.entries().to_vec(),
            live: self.is_live(),
            history_error: self.history_error.clone(),
            search: self.search.view(&self.timeline),
        }
    }
}
