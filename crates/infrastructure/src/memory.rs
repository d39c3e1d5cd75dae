//! 内存实现的存储适配器，用于开发环境和测试。

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use domain::{
    Conversation, Message, MessageId, MessageStore, ProfileRepository, RepositoryError,
    RepositoryResult, UserId, UserProfile,
};
use tokio::sync::RwLock;

#[derive(Default)]
struct MessageTable {
    ids: HashSet<MessageId>,
    by_conversation: HashMap<Conversation, Vec<Message>>,
}

#[derive(Default)]
pub struct InMemoryMessageStore {
    table: RwLock<MessageTable>,
    unavailable: AtomicBool,
}

impl InMemoryMessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 模拟存储不可用：之后的写入和查询都返回存储错误。
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub async fn len(&self) -> usize {
        self.table.read().await.ids.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    fn check_available(&self) -> RepositoryResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(RepositoryError::storage("message store unavailable"));
        }
        Ok(())
    }
}

#[async_trait]
impl MessageStore for InMemoryMessageStore {
    async fn append(&self, message: Message) -> RepositoryResult<()> {
        self.check_available()?;

        let mut table = self.table.write().await;
        if !table.ids.insert(message.id) {
            return Err(RepositoryError::Conflict);
        }

        let messages = table
            .by_conversation
            .entry(message.conversation())
            .or_default();
        let key = message.ordering_key();
        let position = messages.partition_point(|existing| existing.ordering_key() <= key);
        messages.insert(position, message);
        Ok(())
    }

    async fn query_by_pair(&self, user_a: UserId, user_b: UserId) -> RepositoryResult<Vec<Message>> {
        self.check_available()?;

        let table = self.table.read().await;
        Ok(table
            .by_conversation
            .get(&Conversation::new(user_a, user_b))
            .cloned()
            .unwrap_or_default())
    }
}

#[derive(Default)]
pub struct InMemoryProfileRepository {
    profiles: RwLock<HashMap<UserId, UserProfile>>,
}

impl InMemoryProfileRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn upsert(&self, profile: UserProfile) {
        self.profiles.write().await.insert(profile.id, profile);
    }
}

#[async_trait]
impl ProfileRepository for InMemoryProfileRepository {
    async fn get_user_profile(&self, user_id: UserId) -> RepositoryResult<Option<UserProfile>> {
        Ok(self.profiles.read().await.get(&user_id).cloned())
    }
}
