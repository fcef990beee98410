//! Server state shared by the handlers.

use std::sync::Arc;

use crate::{domain::Authenticator, realtime::RealtimeServer};

/// Shared application state
pub struct AppState {
    /// Real-time fan-out server
    pub realtime: Arc<RealtimeServer>,
    /// Authenticator（トークン検証の抽象化）
    pub authenticator: Arc<dyn Authenticator>,
}
