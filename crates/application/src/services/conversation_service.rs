use std::sync::Arc;

use domain::{DomainError, Message, MessageStore, ProfileRepository, UserId, UserProfile};

use crate::error::ApplicationError;

pub struct ConversationServiceDependencies {
    pub message_store: Arc<dyn MessageStore>,
    pub profile_repository: Arc<dyn ProfileRepository>,
}

/// 会话历史与聊天对象资料查询。
pub struct ConversationService {
    deps: ConversationServiceDependencies,
}

impl ConversationService {
    pub fn new(deps: ConversationServiceDependencies) -> Self {
        Self { deps }
    }

    /// 两人之间的全部历史消息，按时间升序。
    pub async fn history(&self, user_a: UserId, user_b: UserId) -> Result<Vec<Message>, ApplicationError> {
        let messages = self
            .deps
            .message_store
            .query_by_pair(user_a, user_b)
            .await
            .map_err(|err| {
                tracing::warn!(error = %err, user_a = %user_a, user_b = %user_b, "历史消息查询失败");
                ApplicationError::from(err)
            })?;

        tracing::debug!(user_a = %user_a, user_b = %user_b, count = messages.len(), "查询历史消息");
        Ok(messages)
    }

    /// 聊天对象资料；不存在时返回 `UserNotFound`，由界面显示占位状态。
    pub async fn partner_profile(&self, user_id: UserId) -> Result<UserProfile, ApplicationError> {
        self.deps
            .profile_repository
            .get_user_profile(user_id)
            .await?
            .ok_or(DomainError::UserNotFound.into())
    }
}
