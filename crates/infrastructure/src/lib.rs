//! 基础设施层实现。
//!
//! 提供消息存储与用户资料的持久化适配器（PostgreSQL 与内存两种实现），
//! 实现领域层定义的存储接口。

pub mod memory;
pub mod migrations;
pub mod repository;

pub use memory::{InMemoryMessageStore, InMemoryProfileRepository};
pub use migrations::MIGRATOR;
pub use repository::{create_pg_pool, PgMessageStore, PgProfileRepository};
