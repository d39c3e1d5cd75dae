use async_trait::async_trait;
use domain::{Message, UserId, UserProfile};
use reqwest::StatusCode;

use crate::error::ClientError;

/// 历史消息来源
#[async_trait]
pub trait HistorySource: Send + Sync {
    async fn fetch_messages(&self, user_a: UserId, user_b: UserId)
        -> Result<Vec<Message>, ClientError>;
}

/// 聊天对象资料的加载结果；资料缺失时界面显示占位内容。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProfileState {
    Loaded(UserProfile),
    Missing,
}

/// 通过 HTTP 接口查询历史与资料
#[derive(Clone)]
pub struct HttpHistory {
    http: reqwest::Client,
    base_url: String,
}

impl HttpHistory {
    pub fn new(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub async fn partner_profile(&self, user_id: UserId) -> Result<ProfileState, ClientError> {
        let response = self
            .http
            .get(format!("{}/api/v1/users/{}/profile", self.base_url, user_id))
            .send()
            .await?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(ProfileState::Missing),
            status if status.is_success() => Ok(ProfileState::Loaded(response.json().await?)),
            status => Err(ClientError::Status(status.as_u16())),
        }
    }
}

#[async_trait]
impl HistorySource for HttpHistory {
    async fn fetch_messages(
        &self,
        user_a: UserId,
        user_b: UserId,
    ) -> Result<Vec<Message>, ClientError> {
        let response = self
            .http
            .get(format!(
                "{}/api/v1/conversations/{}/{}/messages",
                self.base_url, user_a, user_b
            ))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ClientError::Status(status.as_u16()));
        }
        Ok(response.json().await?)
    }
}
