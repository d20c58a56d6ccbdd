//! SQLite persistence for contacts, messages, and reminders.
//!
//! The registry and stores share one [`sqlx::SqlitePool`]; conflicting
//! writes to the same contact serialize on the store's unique constraint
//! and atomic upsert, never on application-level locks.

pub mod contacts;
pub mod error;
pub mod messages;
pub mod quick_replies;
pub mod reminders;

pub use {
    contacts::{Contact, ContactRegistry, ImportSummary},
    error::{Error, Result},
    messages::{Attachment, MessageRecord, MessageStore, NewMessage},
    quick_replies::{QuickReply, QuickReplyStore},
    reminders::{Reminder, ReminderStore, UpcomingReminder},
};

use sqlx::{SqlitePool, sqlite::SqlitePoolOptions};

/// Open a connection pool against `database_url` and run migrations.
pub async fn open_pool(database_url: &str) -> Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await?;
    run_migrations(&pool).await?;
    Ok(pool)
}

/// Run database migrations. Called once at application startup.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .set_ignore_missing(true)
        .run(pool)
        .await?;
    Ok(())
}

#[cfg(test)]
pub(crate) async fn test_pool() -> SqlitePool {
    // A single connection keeps `sqlite::memory:` pointing at one database.
    #[allow(clippy::unwrap_used)]
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    #[allow(clippy::unwrap_used)]
    run_migrations(&pool).await.unwrap();
    pool
}
