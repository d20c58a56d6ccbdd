//! Credential persistence.
//!
//! A `credentials-changed` event is a must-not-be-lost write: the file
//! store writes to a temp file, flushes, and renames into place before the
//! event is acknowledged, so a crash mid-save never leaves a torn blob.

use std::{
    io::Write,
    path::{Path, PathBuf},
};

use {
    async_trait::async_trait,
    serde::{Deserialize, Serialize},
    tracing::debug,
};

use crate::error::{Context, Error, Result};

/// Opaque credential blob owned by the protocol layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credentials(pub serde_json::Value);

/// Persistence for session credentials.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn load(&self) -> Result<Option<Credentials>>;
    async fn save(&self, credentials: &Credentials) -> Result<()>;
    /// Operator recovery path after a fatal session close.
    async fn clear(&self) -> Result<()>;
}

/// JSON file-backed credential store with atomic saves.
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl CredentialStore for FileCredentialStore {
    async fn load(&self) -> Result<Option<Credentials>> {
        match std::fs::read_to_string(&self.path) {
            Ok(raw) => {
                let value = serde_json::from_str(&raw)
                    .map_err(|e| Error::Credentials(format!("corrupt credential file: {e}")))?;
                Ok(Some(Credentials(value)))
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::Credentials(e.to_string())),
        }
    }

    async fn save(&self, credentials: &Credentials) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).context("create credential directory")?;
        }
        let tmp = self.path.with_extension("json.tmp");
        let raw = serde_json::to_vec_pretty(&credentials.0).context("serialize credentials")?;
        {
            let mut file = std::fs::File::create(&tmp)
                .with_context(|| format!("create {}", tmp.display()))?;
            file.write_all(&raw).context("write credentials")?;
            file.sync_all().context("flush credentials")?;
        }
        std::fs::rename(&tmp, &self.path)
            .with_context(|| format!("replace {}", self.path.display()))?;
        debug!(path = %self.path.display(), "credentials saved");
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::Credentials(e.to_string())),
        }
    }
}
