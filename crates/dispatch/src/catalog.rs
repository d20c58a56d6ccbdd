//! Campaign variant catalog.
//!
//! Loaded once at startup from a TOML file shaped `locale.name = [texts]`
//! and immutable afterwards. Every variant may carry an `{agent}`
//! placeholder substituted at send time.

use std::{collections::BTreeMap, path::Path};

use {thiserror::Error, tracing::info};

/// Placeholder replaced with the sending agent's name.
const AGENT_PLACEHOLDER: &str = "{agent}";

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to read campaign catalog {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("failed to parse campaign catalog: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("campaign {locale}/{name} has no variants")]
    EmptyCampaign { locale: String, name: String },

    #[error("campaign {locale}/{name} has an empty variant")]
    EmptyVariant { locale: String, name: String },
}

type LocaleMap = BTreeMap<String, BTreeMap<String, Vec<String>>>;

/// Immutable set of campaign message variants, keyed by locale and name.
#[derive(Debug)]
pub struct CampaignCatalog {
    locales: LocaleMap,
    default_locale: String,
}

impl CampaignCatalog {
    /// Load and validate the catalog file.
    pub fn load(path: &Path, default_locale: &str) -> Result<Self, CatalogError> {
        let raw = std::fs::read_to_string(path).map_err(|source| CatalogError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let catalog = Self::parse(&raw, default_locale)?;
        info!(
            path = %path.display(),
            locales = catalog.locales.len(),
            "campaign catalog loaded"
        );
        Ok(catalog)
    }

    pub fn parse(raw: &str, default_locale: &str) -> Result<Self, CatalogError> {
        let locales: LocaleMap = toml::from_str(raw)?;
        for (locale, campaigns) in &locales {
            for (name, variants) in campaigns {
                if variants.is_empty() {
                    return Err(CatalogError::EmptyCampaign {
                        locale: locale.clone(),
                        name: name.clone(),
                    });
                }
                if variants.iter().any(|v| v.trim().is_empty()) {
                    return Err(CatalogError::EmptyVariant {
                        locale: locale.clone(),
                        name: name.clone(),
                    });
                }
            }
        }
        Ok(Self {
            locales,
            default_locale: default_locale.to_string(),
        })
    }

    /// An empty catalog; every campaign lookup misses.
    #[must_use]
    pub fn empty(default_locale: &str) -> Self {
        Self {
            locales: LocaleMap::new(),
            default_locale: default_locale.to_string(),
        }
    }

    /// Variant texts for `name`. An unknown locale falls back to the
    /// default locale; an unknown name is `None`.
    #[must_use]
    pub fn variants(&self, locale: Option<&str>, name: &str) -> Option<&[String]> {
        let campaigns = locale
            .and_then(|l| self.locales.get(l))
            .or_else(|| self.locales.get(&self.default_locale))?;
        campaigns.get(name).map(Vec::as_slice)
    }

    /// Campaign names available for `locale` (with default-locale
    /// fallback), for the listing endpoint.
    #[must_use]
    pub fn names(&self, locale: Option<&str>) -> Vec<String> {
        locale
            .and_then(|l| self.locales.get(l))
            .or_else(|| self.locales.get(&self.default_locale))
            .map(|campaigns| campaigns.keys().cloned().collect())
            .unwrap_or_default()
    }
}

/// Substitute the agent placeholder, when an agent name is supplied.
#[must_use]
pub fn render_variant(variant: &str, agent: Option<&str>) -> String {
    match agent {
        Some(agent) => variant.replace(AGENT_PLACEHOLDER, agent),
        None => variant.to_string(),
    }
}
