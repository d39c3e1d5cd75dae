//! 实时私聊客户端
//!
//! 负责建立实时传输、合并历史与实时消息、维护输入提示状态以及会话内搜索。

pub mod client;
pub mod error;
pub mod history;
pub mod reconciler;
mod routing;
pub mod search;
pub mod session;
pub mod timeline;
pub mod transport;
pub mod typing;

pub use client::ChatClient;
pub use error::ClientError;
pub use history::{HistorySource, HttpHistory, ProfileState};
pub use reconciler::{ConversationSnapshot, Reconciler};
pub use search::{highlight, SearchIndex, SearchView, Segment};
pub use session::{ConversationSession, SessionEvent};
pub use timeline::{EntryStatus, Insertion, Timeline, TimelineEntry};
pub use transport::{connect, TransportLink};
pub use typing::{TypingState, TypingTracker};
