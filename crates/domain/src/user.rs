use serde::{Deserialize, Serialize};

use crate::value_objects::UserId;

/// 聊天对象的展示资料。只用于界面展示，不参与消息转发的正确性路径。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: UserId,
    pub name: String,
    pub username: String,
    pub image_url: Option<String>,
}

impl UserProfile {
    pub fn new(id: UserId, name: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            username: username.into(),
            image_url: None,
        }
    }

    pub fn with_image(mut self, image_url: impl Into<String>) -> Self {
        self.image_url = Some(image_url.into());
        self
    }
}
