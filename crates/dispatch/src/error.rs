use thiserror::Error;

/// Immediate dispatch rejections. Raised before any message is sent;
/// after validation passes, per-recipient failures land in the report
/// instead.
#[derive(Debug, Error)]
pub enum Error {
    #[error("target list is empty")]
    EmptyTargetList,

    #[error("message text is empty")]
    EmptyMessage,

    #[error("session is not connected")]
    NotConnected,

    #[error("no active contacts match the requested labels")]
    EmptySegment,

    #[error("unknown campaign: {0}")]
    CampaignNotFound(String),

    #[error(transparent)]
    Store(#[from] recado_store::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
