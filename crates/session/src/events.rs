//! Typed events crossing the session boundary.
//!
//! [`ClientEvent`] is what the protocol client emits; [`SessionEvent`] is
//! what the manager broadcasts to subscribers after running its state
//! machine. Keeping both explicit lets tests drive the manager with
//! synthetic client events.

use serde::{Deserialize, Serialize};

use crate::{client::DownloadRef, creds::Credentials};

/// Connection lifecycle state. Held in process memory only; credentials
/// are the only persisted session artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SessionState {
    Disconnected,
    Connecting,
    AwaitingPairing,
    Connected,
    /// Disconnected for a transient reason; a reconnect is scheduled.
    ClosedRetryable,
    /// The session was invalidated. No automatic recovery: the operator
    /// must clear persisted credentials and re-pair.
    ClosedFatal,
}

/// Raw event from the protocol client.
#[derive(Debug, Clone)]
pub enum ClientEvent {
    CredentialsChanged(Credentials),
    QrIssued(String),
    Opened,
    Closed { status_code: Option<u16> },
    MessageReceived(RawMessage),
}

/// Event broadcast by the session manager.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    PairingRequired { qr: String },
    Connected,
    Disconnected { reason: Option<u16> },
    MessageReceived(RawMessage),
}

/// An inbound protocol message before classification.
///
/// The payload mirrors the protocol's slot layout: exactly which slot is
/// populated decides the message kind, and classification happens in the
/// inbound pipeline rather than here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawMessage {
    /// Self-originated messages are discarded by the pipeline.
    #[serde(default)]
    pub from_me: bool,
    /// Raw sender/chat address; validated by the pipeline.
    pub address: String,
    /// Sender's advertised display name.
    #[serde(default)]
    pub push_name: Option<String>,
    #[serde(default)]
    pub payload: Option<MessagePayload>,
}

/// Protocol payload slots. At most one media slot is populated per
/// message.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MessagePayload {
    pub conversation: Option<String>,
    pub extended_text: Option<String>,
    pub audio: Option<MediaPayload>,
    pub image: Option<MediaPayload>,
    pub video: Option<MediaPayload>,
    pub document: Option<MediaPayload>,
}

/// One populated media slot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaPayload {
    #[serde(default)]
    pub mimetype: Option<String>,
    #[serde(default)]
    pub caption: Option<String>,
    /// Original file name, when the protocol carries one (documents).
    #[serde(default)]
    pub file_name: Option<String>,
    /// Opaque handle the client needs to stream the content.
    pub reference: DownloadRef,
}

impl MessagePayload {
    #[must_use]
    pub fn text(body: impl Into<String>) -> Self {
        Self {
            conversation: Some(body.into()),
            ..Self::default()
        }
    }
}
