/// Crate-wide result type for store operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Typed persistence errors.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The addressed contact does not exist.
    #[error("contact not found: {address}")]
    NotFound { address: String },

    /// The addressed reminder does not exist.
    #[error("reminder not found: {id}")]
    ReminderNotFound { id: i64 },

    /// The addressed quick reply does not exist.
    #[error("quick reply not found: {id}")]
    QuickReplyNotFound { id: i64 },

    #[error(transparent)]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Migrate(#[from] sqlx::migrate::MigrateError),
}

impl Error {
    #[must_use]
    pub fn not_found(address: impl std::fmt::Display) -> Self {
        Self::NotFound {
            address: address.to_string(),
        }
    }
}
