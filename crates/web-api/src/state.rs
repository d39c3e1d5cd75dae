use std::sync::Arc;

use application::{ConversationService, RelayEngine};
use config::RelayConfig;

use crate::polling::PollSessions;

#[derive(Clone)]
pub struct AppState {
    pub relay: Arc<RelayEngine>,
    pub conversations: Arc<ConversationService>,
    pub relay_config: Arc<RelayConfig>,
    pub poll_sessions: Arc<PollSessions>,
}

impl AppState {
    pub fn new(
        relay: Arc<RelayEngine>,
        conversations: Arc<ConversationService>,
        relay_config: RelayConfig,
    ) -> Self {
        Self {
            relay,
            conversations,
            relay_config: Arc::new(relay_config),
            poll_sessions: Arc::new(PollSessions::default()),
        }
    }
}
