//! 单个会话的时间线：按 (时间戳, 消息 ID) 排序，按 ID 去重。

use std::collections::HashSet;

use domain::{Message, MessageId};
use serde::Serialize;

/// 时间线条目的确认状态
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "camelCase")]
pub enum EntryStatus {
    /// 来自历史查询或实时投递
    Confirmed,
    /// 本地乐观插入，等待服务器确认
    Pending,
    /// 服务器确认已持久化
    Persisted,
    /// 服务器持久化失败，不会重试
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TimelineEntry {
    pub message: Message,
    pub status: EntryStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Insertion {
    Inserted(usize),
    Duplicate,
}

#[derive(Debug, Default, Clone)]
pub struct Timeline {
    entries: Vec<TimelineEntry>,
    ids: HashSet<MessageId>,
    revision: u64,
}

impl Timeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// 由历史结果构建；输入无需有序，重复 ID 只保留第一条。
    pub fn from_history(messages: impl IntoIterator<Item = Message>) -> Self {
        let mut timeline = Self::new();
        for message in messages {
            timeline.insert(message);
        }
        timeline
    }

    /// 插入服务器来源的消息。已存在相同 ID 时保留先到的条目；
    /// 若先到的是本地待确认副本，服务器副本的出现说明它已被持久化。
    pub fn insert(&mut self, message: Message) -> Insertion {
        if self.ids.contains(&message.id) {
            if let Some(position) = self.position(message.id) {
                let entry = &mut self.entries[position];
                if entry.status == EntryStatus::Pending {
                    entry.status = EntryStatus::Persisted;
                    self.revision += 1;
                }
            }
            return Insertion::Duplicate;
        }
        self.insert_with(message, EntryStatus::Confirmed)
    }

    /// 插入本地乐观副本
    pub fn insert_local(&mut self, message: Message) -> Insertion {
        if self.ids.contains(&message.id) {
            return Insertion::Duplicate;
        }
        self.insert_with(message, EntryStatus::Pending)
    }

    fn insert_with(&mut self, message: Message, status: EntryStatus) -> Insertion {
        let key = message.ordering_key();
        let position = self
            .entries
            .partition_point(|entry| entry.message.ordering_key() <= key);

        self.ids.insert(message.id);
        self.entries.insert(position, TimelineEntry { message, status });
        self.revision += 1;
        Insertion::Inserted(position)
    }

    pub fn mark_persisted(&mut self, id: MessageId) -> bool {
        self.transition(id, EntryStatus::Persisted)
    }

    pub fn mark_failed(&mut self, id: MessageId, reason: impl Into<String>) -> bool {
        self.transition(id, EntryStatus::Failed(reason.into()))
    }

    /// 只有待确认的本地条目会改变状态
    fn transition(&mut self, id: MessageId, status: EntryStatus) -> bool {
        let Some(position) = self.position(id) else {
            return false;
        };
        let entry = &mut self.entries[position];
        if entry.status != EntryStatus::Pending {
            return false;
        }
        entry.status = status;
        self.revision += 1;
        true
    }

    pub fn position(&self, id: MessageId) -> Option<usize> {
        if !self.ids.contains(&id) {
            return None;
        }
        self.entries.iter().position(|entry| entry.message.id == id)
    }

    pub fn contains(&self, id: MessageId) -> bool {
        self.ids.contains(&id)
    }

    pub fn entries(&self) -> &[TimelineEntry] {
        &self.entries
    }

    pub fn get(&self, position: usize) -> Option<&TimelineEntry> {
        self.entries.get(position)
    }

    pub fn ids(&self) -> Vec<MessageId> {
        self.entries.iter().map(|entry| entry.message.id).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 每次内容或状态变化都会递增，用于判断派生索引是否过期
    pub fn revision(&self) -> u64 {
        self.revision
    }
}
