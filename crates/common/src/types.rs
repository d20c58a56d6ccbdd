//! Address and label value types shared by the store, pipeline, and
//! dispatcher.
//!
//! Addresses follow the wire format of the bridged chat protocol: a local
//! part followed by `@s.whatsapp.net` for individuals or `@g.us` for group
//! chats. Construction always goes through [`Address::parse`] so malformed
//! input is rejected at the boundary instead of leaking into the store.

use std::fmt;

use {
    chrono::{DateTime, Utc},
    serde::{Deserialize, Serialize},
};

use crate::error::{Error, Result};

/// Suffix of an individual chat address.
pub const INDIVIDUAL_SUFFIX: &str = "@s.whatsapp.net";
/// Suffix of a group chat address.
pub const GROUP_SUFFIX: &str = "@g.us";

/// Minimum number of digits for an imported phone number.
const MIN_PHONE_DIGITS: usize = 10;

/// A validated, normalized chat destination.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address(String);

impl Address {
    /// Parse a raw address, rejecting anything that is not
    /// `<local>@s.whatsapp.net` or `<local>@g.us` with a plausible local
    /// part.
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        let local = raw
            .strip_suffix(INDIVIDUAL_SUFFIX)
            .or_else(|| raw.strip_suffix(GROUP_SUFFIX))
            .ok_or_else(|| Error::InvalidAddress(format!("unknown suffix: {raw}")))?;

        if local.is_empty() {
            return Err(Error::InvalidAddress(format!("empty local part: {raw}")));
        }
        if !local
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.' || c == ':')
        {
            return Err(Error::InvalidAddress(format!(
                "invalid character in local part: {raw}"
            )));
        }

        Ok(Self(raw.to_string()))
    }

    /// Build an individual address from a raw phone number.
    ///
    /// Strips everything but digits, requires at least ten of them, and
    /// prepends `default_country_code` to bare ten-digit numbers — the
    /// normalization the bulk contact import applies.
    pub fn from_phone(raw: &str, default_country_code: Option<&str>) -> Result<Self> {
        let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
        if digits.len() < MIN_PHONE_DIGITS {
            return Err(Error::InvalidAddress(format!("number too short: {raw}")));
        }
        let digits = match default_country_code {
            Some(cc) if digits.len() == MIN_PHONE_DIGITS => format!("{cc}{digits}"),
            _ => digits,
        };
        Ok(Self(format!("{digits}{INDIVIDUAL_SUFFIX}")))
    }

    /// Whether this address denotes a group chat.
    #[must_use]
    pub fn is_group(&self) -> bool {
        self.0.ends_with(GROUP_SUFFIX)
    }

    /// The local part without the protocol suffix (the bare phone number
    /// for individual chats).
    #[must_use]
    pub fn local_part(&self) -> &str {
        self.0.split('@').next().unwrap_or(&self.0)
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Address {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<Address> for String {
    fn from(value: Address) -> Self {
        value.0
    }
}

/// Categorical tag on a contact driving segmentation.
///
/// The canonical string values (`nuevo`, `callback`, `analista`, `grupos`)
/// are kept from the legacy schema; anything else round-trips as a custom
/// label.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Label {
    New,
    Callback,
    Analyst,
    Groups,
    Custom(String),
}

impl Label {
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::New => "nuevo",
            Self::Callback => "callback",
            Self::Analyst => "analista",
            Self::Groups => "grupos",
            Self::Custom(s) => s,
        }
    }

    /// Default label for a freshly created contact at `address`.
    #[must_use]
    pub fn default_for(address: &Address) -> Self {
        if address.is_group() {
            Self::Groups
        } else {
            Self::New
        }
    }
}

impl From<String> for Label {
    fn from(value: String) -> Self {
        match value.as_str() {
            "nuevo" => Self::New,
            "callback" => Self::Callback,
            "analista" => Self::Analyst,
            "grupos" => Self::Groups,
            _ => Self::Custom(value),
        }
    }
}

impl From<&str> for Label {
    fn from(value: &str) -> Self {
        Self::from(value.to_string())
    }
}

impl From<Label> for String {
    fn from(value: Label) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Direction of a persisted message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Inbound,
    Outbound,
}

impl Direction {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Inbound => "inbound",
            Self::Outbound => "outbound",
        }
    }
}

impl From<String> for Direction {
    fn from(value: String) -> Self {
        if value == "outbound" {
            Self::Outbound
        } else {
            Self::Inbound
        }
    }
}

/// Truncate `text` to at most `max_chars` characters, respecting char
/// boundaries. Used for notification previews.
#[must_use]
pub fn preview(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

/// Current time, RFC 3339. The store keeps timestamps as text so SQLite
/// date functions keep working against rows written by the legacy schema.
#[must_use]
pub fn now_rfc3339() -> String {
    Utc::now().to_rfc3339()
}

/// Parse a stored RFC 3339 timestamp, tolerating junk by falling back to
/// the epoch.
#[must_use]
pub fn parse_rfc3339(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_default()
}
