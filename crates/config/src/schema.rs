//! Config schema types (gateway, storage, session, dispatch, import).

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Top-level config, loaded from `recado.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RecadoConfig {
    pub gateway: GatewayConfig,
    pub storage: StorageConfig,
    pub session: SessionConfig,
    pub dispatch: DispatchConfig,
    pub import: ImportConfig,
}

/// HTTP gateway bind settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub bind: String,
    pub port: u16,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".into(),
            port: 3000,
        }
    }
}

/// Where the database and downloaded media live.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Base data directory; relative paths below resolve against it.
    pub data_dir: PathBuf,
    /// SQLite URL. Defaults to `<data_dir>/recado.db`.
    pub database_url: Option<String>,
    /// Root directory for attachment blobs.
    pub media_dir: Option<PathBuf>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            database_url: None,
            media_dir: None,
        }
    }
}

impl StorageConfig {
    #[must_use]
    pub fn database_url(&self) -> String {
        self.database_url.clone().unwrap_or_else(|| {
            format!(
                "sqlite://{}?mode=rwc",
                self.data_dir.join("recado.db").display()
            )
        })
    }

    #[must_use]
    pub fn media_dir(&self) -> PathBuf {
        self.media_dir
            .clone()
            .unwrap_or_else(|| self.data_dir.join("media"))
    }
}

/// Chat-protocol session settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Persisted credential blob. Defaults to `<data_dir>/credentials.json`
    /// when unset.
    pub credentials_path: Option<PathBuf>,
    /// WebSocket URL of the protocol sidecar.
    pub sidecar_url: String,
    /// Upper bound on a single send, seconds.
    pub send_timeout_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            credentials_path: None,
            sidecar_url: "ws://127.0.0.1:3601".into(),
            send_timeout_secs: 60,
        }
    }
}

/// Outbound dispatch settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Fixed inter-item delay for list and segment sends, milliseconds.
    pub fixed_delay_ms: u64,
    /// Campaign catalog file. Defaults to `campaigns.toml` next to the
    /// config file.
    pub campaigns_path: Option<PathBuf>,
    /// Locale used when a request names an unknown one.
    pub default_locale: String,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            fixed_delay_ms: 200,
            campaigns_path: None,
            default_locale: "es".into(),
        }
    }
}

/// Bulk contact import normalization.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportConfig {
    /// Country code prepended to bare ten-digit numbers (e.g. `"52"`).
    pub default_country_code: Option<String>,
}

impl RecadoConfig {
    #[must_use]
    pub fn credentials_path(&self) -> PathBuf {
        self.session
            .credentials_path
            .clone()
            .unwrap_or_else(|| self.storage.data_dir.join("credentials.json"))
    }

    /// Create the data and media directories if they are missing.
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.storage.data_dir)?;
        std::fs::create_dir_all(self.storage.media_dir())?;
        Ok(())
    }
}
