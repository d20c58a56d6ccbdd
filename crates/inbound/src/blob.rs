//! Media blob storage.
//!
//! Downloads land under the media root in one subdirectory per kind, with
//! timestamp-derived names. Millisecond timestamps are best-effort unique;
//! two downloads of the same kind in the same millisecond would collide,
//! which is acceptable for this workload.

use std::path::{Path, PathBuf};

use {async_trait::async_trait, tracing::debug};

use recado_session::MediaKind;

/// Subdirectory under the media root for a kind.
fn kind_dir(kind: MediaKind) -> &'static str {
    match kind {
        MediaKind::Audio => "audios",
        MediaKind::Image => "imagenes",
        MediaKind::Video => "videos",
        MediaKind::Document => "archivos",
    }
}

/// File extension for a media payload: the MIME subtype when one is
/// carried, else a per-kind default.
#[must_use]
pub fn extension_for(kind: MediaKind, mimetype: Option<&str>) -> String {
    let subtype = mimetype
        .and_then(|m| m.split('/').nth(1))
        .and_then(|s| s.split(';').next())
        .map(str::trim)
        .filter(|s| !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '-'));
    if let Some(subtype) = subtype {
        return subtype.to_string();
    }
    match kind {
        MediaKind::Audio => "ogg",
        MediaKind::Image => "jpg",
        MediaKind::Video => "mp4",
        MediaKind::Document => "bin",
    }
    .to_string()
}

/// Sink for downloaded media content. Returns the stored path relative to
/// the media root.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn write(&self, kind: MediaKind, bytes: &[u8], extension: &str)
    -> anyhow::Result<String>;
}

/// Filesystem blob store rooted at the configured media directory.
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the media root and all kind subdirectories.
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        for kind in [
            MediaKind::Audio,
            MediaKind::Image,
            MediaKind::Video,
            MediaKind::Document,
        ] {
            std::fs::create_dir_all(self.root.join(kind_dir(kind)))?;
        }
        Ok(())
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn write(
        &self,
        kind: MediaKind,
        bytes: &[u8],
        extension: &str,
    ) -> anyhow::Result<String> {
        let relative = format!(
            "{}/{}_{}.{}",
            kind_dir(kind),
            kind.as_str(),
            chrono::Utc::now().timestamp_millis(),
            extension,
        );
        let absolute = self.root.join(&relative);
        if let Some(parent) = absolute.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&absolute, bytes).await?;
        debug!(path = %relative, size = bytes.len(), "media blob stored");
        Ok(relative)
    }
}
