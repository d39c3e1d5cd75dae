//! 应用层实现。
//!
//! 围绕领域模型提供实时消息子系统的用例：在线目录、消息转发引擎、
//! 以及历史记录与聊天对象资料查询，并对外部适配器（消息存储、时钟）做抽象。

pub mod clock;
pub mod connection;
pub mod error;
pub mod presence;
pub mod relay;
pub mod services;

pub use clock::{Clock, SystemClock};
pub use connection::{ConnectionError, ConnectionHandle};
pub use error::ApplicationError;
pub use presence::{memory::InMemoryPresenceDirectory, PresenceDirectory};
pub use relay::{
    LiveDelivery, PersistenceHandle, RelayDependencies, RelayEngine, SendMessageRequest,
    SendReceipt,
};
pub use services::{ConversationService, ConversationServiceDependencies};
