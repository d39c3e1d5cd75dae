use async_trait::async_trait;

use crate::errors::RepositoryResult;
use crate::message::Message;
use crate::user::UserProfile;
use crate::value_objects::UserId;

/// 持久化适配器：消息的持久存储，按用户对查询，按时间排序。
///
/// 实现必须允许对不相关的消息并发调用 `append`。
#[cfg_attr(feature = "testing", mockall::automock)]
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// 持久化一条消息。
    async fn append(&self, message: Message) -> RepositoryResult<()>;

    /// 返回 {sender, receiver} 为 {user_a, user_b} 任一排列的全部消息，
    /// 按时间戳升序（相同时间戳按 ID）。
    async fn query_by_pair(&self, user_a: UserId, user_b: UserId) -> RepositoryResult<Vec<Message>>;
}

/// 用户资料查询，只用于解析聊天对象的展示信息。
#[cfg_attr(feature = "testing", mockall::automock)]
#[async_trait]
pub trait ProfileRepository: Send + Sync {
    /// 资料不存在时返回 `Ok(None)`。
    async fn get_user_profile(&self, user_id: UserId) -> RepositoryResult<Option<UserProfile>>;
}
