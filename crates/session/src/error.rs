/// Crate-wide result type for session operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Typed session errors.
///
/// Connection management never surfaces here: disconnects feed the
/// reconnect state machine and the event stream, not the caller of
/// [`crate::SessionManager::send`].
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A send was attempted while the session is not connected.
    #[error("session not connected")]
    NotConnected,

    /// The transport reported a per-message failure.
    #[error("send failed: {0}")]
    SendFailed(String),

    /// The send did not complete within the configured timeout.
    #[error("send timed out")]
    SendTimeout,

    /// Credential persistence failed.
    #[error("credential store: {0}")]
    Credentials(String),
}

impl recado_common::FromMessage for Error {
    fn from_message(message: String) -> Self {
        Self::Credentials(message)
    }
}

recado_common::impl_context!();
