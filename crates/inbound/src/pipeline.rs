//! Classification and persistence of inbound messages.

use std::sync::Arc;

use {
    futures::StreamExt,
    tokio::sync::broadcast,
    tracing::{debug, warn},
};

use {
    recado_common::types::{Address, Direction, Label},
    recado_session::{
        ChatClient, MediaKind, MediaPayload, MessagePayload, RawMessage, SessionEvent,
    },
    recado_store::{Attachment, ContactRegistry, MessageStore, NewMessage},
};

use crate::{
    blob::{BlobStore, extension_for},
    notify::NotificationSlot,
};

/// Body recorded when a message carries no readable text.
const NO_TEXT_PLACEHOLDER: &str = "(no text)";

/// Display name used when the sender advertises none.
const UNKNOWN_SENDER: &str = "Unknown";

enum Classified {
    Media { kind: MediaKind, media: MediaPayload },
    Text(String),
}

/// First populated slot wins: audio, image, video, document, then text.
fn classify(payload: MessagePayload) -> Classified {
    if let Some(media) = payload.audio {
        return Classified::Media {
            kind: MediaKind::Audio,
            media,
        };
    }
    if let Some(media) = payload.image {
        return Classified::Media {
            kind: MediaKind::Image,
            media,
        };
    }
    if let Some(media) = payload.video {
        return Classified::Media {
            kind: MediaKind::Video,
            media,
        };
    }
    if let Some(media) = payload.document {
        return Classified::Media {
            kind: MediaKind::Document,
            media,
        };
    }
    // Each slot is checked for content on its own: a present-but-empty
    // conversation must not shadow a populated extended text.
    let text = payload
        .conversation
        .filter(|t| !t.is_empty())
        .or_else(|| payload.extended_text.filter(|t| !t.is_empty()))
        .unwrap_or_else(|| NO_TEXT_PLACEHOLDER.to_string());
    Classified::Text(text)
}

/// Caption recorded when the sender supplied none.
fn default_caption(kind: MediaKind, media: &MediaPayload) -> String {
    match kind {
        MediaKind::Audio => "Audio".to_string(),
        MediaKind::Image => "Image".to_string(),
        MediaKind::Video => "Video".to_string(),
        MediaKind::Document => media
            .file_name
            .clone()
            .unwrap_or_else(|| "Document".to_string()),
    }
}

/// Turns raw protocol messages into message rows, contact updates, media
/// blobs, and notifications.
pub struct InboundPipeline {
    client: Arc<dyn ChatClient>,
    registry: ContactRegistry,
    messages: MessageStore,
    blobs: Arc<dyn BlobStore>,
    notifications: Arc<NotificationSlot>,
}

impl InboundPipeline {
    pub fn new(
        client: Arc<dyn ChatClient>,
        registry: ContactRegistry,
        messages: MessageStore,
        blobs: Arc<dyn BlobStore>,
        notifications: Arc<NotificationSlot>,
    ) -> Self {
        Self {
            client,
            registry,
            messages,
            blobs,
            notifications,
        }
    }

    /// Consume session events until the sender side is dropped. One event
    /// at a time, in arrival order; a failed event is logged and skipped,
    /// never fatal.
    pub async fn run(&self, mut events: broadcast::Receiver<SessionEvent>) {
        loop {
            match events.recv().await {
                Ok(SessionEvent::MessageReceived(raw)) => {
                    if let Err(e) = self.process(raw).await {
                        warn!(error = %e, "inbound event dropped");
                    }
                },
                Ok(_) => {},
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "inbound pipeline lagged behind session events");
                },
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("session event channel closed, inbound pipeline stopping");
                    return;
                },
            }
        }
    }

    /// Process one raw message end to end.
    pub async fn process(&self, raw: RawMessage) -> anyhow::Result<()> {
        if raw.from_me {
            return Ok(());
        }
        let Some(payload) = raw.payload else {
            return Ok(());
        };
        let address = Address::parse(&raw.address)?;

        let (body, attachment) = match classify(payload) {
            Classified::Text(text) => (text, None),
            Classified::Media { kind, media } => {
                let caption = media
                    .caption
                    .clone()
                    .filter(|c| !c.is_empty())
                    .unwrap_or_else(|| default_caption(kind, &media));
                match self.fetch_media(kind, &media).await {
                    Ok(path) => {
                        let mime = media
                            .mimetype
                            .clone()
                            .unwrap_or_else(|| "application/octet-stream".to_string());
                        (caption, Some(Attachment { path, mime }))
                    },
                    Err(e) => {
                        // The message is still recorded, just without its
                        // attachment.
                        warn!(address = %address, kind = %kind.as_str(), error = %e,
                            "media download failed");
                        (caption, None)
                    },
                }
            },
        };

        let message = match attachment {
            Some(attachment) => NewMessage::with_attachment(
                address.clone(),
                Direction::Inbound,
                body.clone(),
                attachment,
            ),
            None => NewMessage::text(address.clone(), Direction::Inbound, body.clone()),
        };
        self.messages.append(message).await?;

        let display_name = raw.push_name.as_deref().unwrap_or(UNKNOWN_SENDER);
        self.registry
            .upsert_on_interaction(&address, display_name, Label::New)
            .await?;

        self.notifications.publish(&address, display_name, &body);
        Ok(())
    }

    /// Stream the media content fully, then hand it to the blob store.
    async fn fetch_media(&self, kind: MediaKind, media: &MediaPayload) -> anyhow::Result<String> {
        let mut stream = self.client.download(&media.reference, kind).await?;
        let mut bytes = Vec::new();
        while let Some(chunk) = stream.next().await {
            bytes.extend_from_slice(&chunk?);
        }
        let extension = extension_for(kind, media.mimetype.as_deref());
        self.blobs.write(kind, &bytes, &extension).await
    }
}
