//! Web API 层。
//!
//! 提供 Axum 路由：健康检查、历史消息与聊天对象资料的 HTTP 查询，
//! 以及 WebSocket / 长轮询两种实时传输，事件统一交给应用层的转发引擎。

mod error;
mod gateway;
mod polling;
mod routes;
mod state;
mod websocket;

pub use error::{ApiError, ErrorBody};
pub use gateway::ClientSession;
pub use polling::{spawn_poll_reaper, PollOpened, PollSessions};
pub use routes::{router, HEALTH_BODY};
pub use state::AppState;
