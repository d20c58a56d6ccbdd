//! The black-box protocol client contract.

use {
    async_trait::async_trait,
    base64::Engine as _,
    bytes::Bytes,
    futures::stream::BoxStream,
    serde::{Deserialize, Serialize},
    tokio::sync::mpsc,
};

use recado_common::types::Address;

use crate::{creds::Credentials, events::ClientEvent};

/// Opaque download handle, forwarded verbatim to the protocol client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadRef(pub serde_json::Value);

/// Media kind as the protocol names it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Audio,
    Image,
    Video,
    Document,
}

impl MediaKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Audio => "audio",
            Self::Image => "image",
            Self::Video => "video",
            Self::Document => "document",
        }
    }
}

/// Outbound payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SendPayload {
    Text {
        body: String,
    },
    /// Media content handed to the protocol layer as base64 so the frame
    /// stays plain JSON.
    Media {
        media: MediaKind,
        content_base64: String,
        mime: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        caption: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        file_name: Option<String>,
    },
}

impl SendPayload {
    #[must_use]
    pub fn text(body: impl Into<String>) -> Self {
        Self::Text { body: body.into() }
    }

    #[must_use]
    pub fn media(media: MediaKind, content: &[u8], mime: impl Into<String>) -> Self {
        Self::Media {
            media,
            content_base64: base64::engine::general_purpose::STANDARD.encode(content),
            mime: mime.into(),
            caption: None,
            file_name: None,
        }
    }

    #[must_use]
    pub fn with_caption(mut self, text: impl Into<String>) -> Self {
        if let Self::Media { caption, .. } = &mut self {
            *caption = Some(text.into());
        }
        self
    }

    #[must_use]
    pub fn with_file_name(mut self, name: impl Into<String>) -> Self {
        if let Self::Media { file_name, .. } = &mut self {
            *file_name = Some(name.into());
        }
        self
    }
}

/// A known chat reported by the protocol layer, used for the best-effort
/// contact-sync pass after connecting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatSummary {
    pub address: String,
    #[serde(default)]
    pub name: Option<String>,
}

/// External chat-protocol client.
///
/// The session manager treats this as a black box: it opens a connection,
/// consumes the resulting event stream, and forwards sends and downloads.
#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Open a connection, optionally resuming from persisted credentials.
    /// Events arrive on the returned channel until the connection closes.
    async fn connect(
        &self,
        credentials: Option<Credentials>,
    ) -> anyhow::Result<mpsc::Receiver<ClientEvent>>;

    /// Send one payload to `address`.
    async fn send(&self, address: &Address, payload: &SendPayload) -> anyhow::Result<()>;

    /// Stream the content behind a media reference.
    async fn download(
        &self,
        reference: &DownloadRef,
        kind: MediaKind,
    ) -> anyhow::Result<BoxStream<'static, anyhow::Result<Bytes>>>;

    /// Chats the protocol layer currently knows about.
    async fn list_chats(&self) -> anyhow::Result<Vec<ChatSummary>>;
}
