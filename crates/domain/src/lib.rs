//! 实时私聊系统核心领域模型
//!
//! 包含用户标识、消息、会话、输入状态信号以及实时传输事件，
//! 并定义持久化适配器需要实现的存储接口。

pub mod errors;
pub mod events;
pub mod message;
pub mod repository;
pub mod typing;
pub mod user;
pub mod value_objects;

// 重新导出常用类型
pub use errors::*;
pub use events::*;
pub use message::*;
pub use repository::*;
pub use typing::*;
pub use user::*;
pub use value_objects::*;
