use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::schema::RecadoConfig;

/// Config file name, checked project-local then user-global.
const CONFIG_FILENAME: &str = "recado.toml";

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
}

/// Load config from the given TOML path.
pub fn load_config(path: &Path) -> Result<RecadoConfig, LoadError> {
    let raw = std::fs::read_to_string(path).map_err(|source| LoadError::Read {
        path: path.display().to_string(),
        source,
    })?;
    toml::from_str(&raw).map_err(|source| LoadError::Parse {
        path: path.display().to_string(),
        source,
    })
}

/// Discover and load config from standard locations.
///
/// Search order:
/// 1. `./recado.toml` (project-local)
/// 2. `~/.config/recado/recado.toml` (user-global)
///
/// Returns `RecadoConfig::default()` if no config file is found or the
/// found file fails to parse.
#[must_use]
pub fn discover_and_load() -> RecadoConfig {
    if let Some(path) = find_config_file() {
        debug!(path = %path.display(), "loading config");
        match load_config(&path) {
            Ok(cfg) => return cfg,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to load config, using defaults");
            },
        }
    } else {
        debug!("no config file found, using defaults");
    }
    RecadoConfig::default()
}

/// Find the first config file in standard locations.
#[must_use]
pub fn find_config_file() -> Option<PathBuf> {
    let local = PathBuf::from(CONFIG_FILENAME);
    if local.exists() {
        return Some(local);
    }

    if let Some(dirs) = directories::ProjectDirs::from("", "", "recado") {
        let p = dirs.config_dir().join(CONFIG_FILENAME);
        if p.exists() {
            return Some(p);
        }
    }

    None
}
