//! Shared handler state.

use std::sync::Arc;

use {sqlx::SqlitePool, tokio_util::sync::CancellationToken};

use {
    recado_dispatch::{CampaignCatalog, OutboundDispatcher},
    recado_inbound::{BlobStore, NotificationSlot},
    recado_session::SessionManager,
    recado_store::{ContactRegistry, MessageStore, QuickReplyStore, ReminderStore},
};

/// Everything a handler can reach. Cheap to clone; all members are
/// handles.
#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub registry: ContactRegistry,
    pub messages: MessageStore,
    pub reminders: ReminderStore,
    pub quick_replies: QuickReplyStore,
    pub dispatcher: Arc<OutboundDispatcher>,
    pub catalog: Arc<CampaignCatalog>,
    pub session: Arc<SessionManager>,
    pub notifications: Arc<NotificationSlot>,
    /// Media root shared with the inbound pipeline; direct sends store
    /// their copy here too.
    pub blobs: Arc<dyn BlobStore>,
    /// Prepended to bare phone numbers on import and dispatch.
    pub default_country_code: Option<String>,
    /// Cancels in-flight dispatch loops on shutdown.
    pub shutdown: CancellationToken,
}

impl AppState {
    #[must_use]
    pub fn default_cc(&self) -> Option<&str> {
        self.default_country_code.as_deref()
    }
}
