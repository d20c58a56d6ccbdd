//! Chat-protocol session lifecycle.
//!
//! [`manager::SessionManager`] owns one connection to the bridged chat
//! protocol and drives the reconnect state machine. The protocol itself is
//! a black box behind [`client::ChatClient`]; the shipped implementation
//! ([`sidecar::SidecarClient`]) speaks JSON frames over a WebSocket to an
//! external protocol sidecar process.

pub mod client;
pub mod creds;
pub mod error;
pub mod events;
pub mod manager;
pub mod sidecar;

pub use {
    client::{ChatClient, ChatSummary, DownloadRef, MediaKind, SendPayload},
    creds::{CredentialStore, Credentials, FileCredentialStore},
    error::{Error, Result},
    events::{ClientEvent, MediaPayload, MessagePayload, RawMessage, SessionEvent, SessionState},
    manager::{MessageSender, SessionManager, Timing},
    sidecar::SidecarClient,
};
