//! Inbound message pipeline.
//!
//! Consumes the session manager's event broadcast and turns raw protocol
//! messages into persisted rows: classify, download media into the blob
//! store, append to the message log, reconcile the contact, and surface a
//! desktop-style notification.

pub mod blob;
pub mod notify;
pub mod pipeline;

pub use {
    blob::{BlobStore, FsBlobStore},
    notify::{Notification, NotificationSlot},
    pipeline::InboundPipeline,
};
