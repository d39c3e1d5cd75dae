//! 会话内搜索
//!
//! 搜索索引是时间线的派生数据：保存内容匹配查询词（不区分大小写的子串）的
//! 条目位置。查询词或时间线变化后，下一次访问时重建。

use serde::Serialize;

use domain::MessageId;

use crate::timeline::Timeline;

#[derive(Debug, Default, Clone)]
pub struct SearchIndex {
    query: String,
    matches: Vec<usize>,
    cursor: Option<usize>,
    /// 游标所指条目的 ID，时间线插入新条目后据此找回位置
    anchor: Option<MessageId>,
    built_revision: Option<u64>,
}

impl SearchIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    /// 设置查询词；游标回到第一个匹配。
    pub fn set_query(&mut self, query: impl Into<String>) {
        self.query = query.into();
        self.cursor = None;
        self.anchor = None;
        self.built_revision = None;
    }

    /// 时间线变化或查询词变化后重建索引。
    ///
    /// 重建后游标尽量停留在原来指向的条目上，否则回到第一个匹配。
    pub fn refresh(&mut self, timeline: &Timeline) {
        if self.built_revision == Some(timeline.revision()) {
            return;
        }

        // 只含空白的查询词视为未搜索
        self.matches = if self.query.trim().is_empty() {
            Vec::new()
        } else {
            timeline
                .entries()
                .iter()
                .enumerate()
                .filter(|(_, entry)| contains_ignore_case(entry.message.content.as_str(), &self.query))
                .map(|(position, _)| position)
                .collect()
        };
        self.built_revision = Some(timeline.revision());

        self.cursor = if self.matches.is_empty() {
            None
        } else {
            self.anchor
                .and_then(|id| timeline.position(id))
                .and_then(|position| self.matches.iter().position(|m| *m == position))
                .or(Some(0))
        };
        self.update_anchor(timeline);
    }

    fn update_anchor(&mut self, timeline: &Timeline) {
        self.anchor = self
            .current()
            .and_then(|position| timeline.get(position))
            .map(|entry| entry.message.id);
    }

    pub fn matches(&mut self, timeline: &Timeline) -> &[usize] {
        self.refresh(timeline);
        &self.matches
    }

    /// 当前匹配在时间线中的位置
    pub fn current(&self) -> Option<usize> {
        self.cursor.and_then(|cursor| self.matches.get(cursor).copied())
    }

    /// 移到下一个匹配，末尾回绕到开头
    pub fn next_match(&mut self, timeline: &Timeline) -> Option<usize> {
        self.refresh(timeline);
        let len = self.matches.len();
        if len == 0 {
            return None;
        }
        self.cursor = Some(self.cursor.map_or(0, |cursor| (cursor + 1) % len));
        self.update_anchor(timeline);
        self.current()
    }

    /// 移到上一个匹配，开头回绕到末尾
    pub fn prev_match(&mut self, timeline: &Timeline) -> Option<usize> {
        self.refresh(timeline);
        let len = self.matches.len();
        if len == 0 {
            return None;
        }
        self.cursor = Some(self.cursor.map_or(len - 1, |cursor| (cursor + len - 1) % len));
        self.update_anchor(timeline);
        self.current()
    }

    pub fn view(&mut self, timeline: &Timeline) -> SearchView {
        self.refresh(timeline);
        SearchView {
            query: self.query.clone(),
            matches: self.matches.clone(),
            current: self.current(),
        }
    }
}

/// 搜索状态快照
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchView {
    pub query: String,
    pub matches: Vec<usize>,
    pub current: Option<usize>,
}

/// 高亮片段
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Segment {
    pub text: String,
    pub matched: bool,
}

/// 把内容切分为匹配 / 不匹配的片段，大小写不敏感。
pub fn highlight(content: &str, query: &str) -> Vec<Segment> {
    let ranges = match_ranges(content, query);
    let mut segments = Vec::with_capacity(ranges.len() * 2 + 1);
    let mut last = 0;

    for (start, end) in ranges {
        if start > last {
            segments.push(Segment {
                text: content[last..start].to_string(),
                matched: false,
            });
        }
        segments.push(Segment {
            text: content[start..end].to_string(),
            matched: true,
        });
        last = end;
    }
    if last < content.len() || segments.is_empty() {
        segments.push(Segment {
            text: content[last..].to_string(),
            matched: false,
        });
    }
    segments
}

pub fn contains_ignore_case(content: &str, query: &str) -> bool {
    !query.trim().is_empty() && match_at_any(content, &lowered(query)).is_some()
}

fn lowered(text: &str) -> Vec<char> {
    text.chars().flat_map(char::to_lowercase).collect()
}

/// 从 `content` 的每个字符边界尝试匹配，返回所有不重叠匹配的字节区间。
fn match_ranges(content: &str, query: &str) -> Vec<(usize, usize)> {
    if query.trim().is_empty() {
        return Vec::new();
    }
    let needle = lowered(query);
    let mut ranges = Vec::new();
    let mut from = 0;

    while let Some((start, end)) = match_at_any(&content[from..], &needle) {
        ranges.push((from + start, from + end));
        from += end;
    }
    ranges
}

fn match_at_any(content: &str, needle: &[char]) -> Option<(usize, usize)> {
    content
        .char_indices()
        .find_map(|(start, _)| match_at(&content[start..], needle).map(|len| (start, start + len)))
}

/// 在 `haystack` 开头匹配小写后的 `needle`，成功时返回消耗的字节数
fn match_at(haystack: &str, needle: &[char]) -> Option<usize> {
    let mut pending = needle.iter();
    let mut expected = pending.next();

    for (offset, ch) in haystack.char_indices() {
        for lower in ch.to_lowercase() {
            match expected {
                Some(want) if *want == lower => expected = pending.next(),
                _ => return None,
            }
        }
        if expected.is_none() {
            return Some(offset + ch.len_utf8());
        }
    }
    None
}
