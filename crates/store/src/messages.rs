//! Append-only log of inbound and outbound messages.

use {
    serde::Serialize,
    sqlx::{Row, SqlitePool, sqlite::SqliteRow},
};

use recado_common::types::{Address, Direction, now_rfc3339};

use crate::error::Result;

/// Attachment descriptor: path relative to the media root plus MIME type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Attachment {
    pub path: String,
    pub mime: String,
}

/// A message to append. The media flag is derived from the attachment so
/// the two can never disagree.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub address: Address,
    pub direction: Direction,
    pub body: String,
    pub attachment: Option<Attachment>,
}

impl NewMessage {
    #[must_use]
    pub fn text(address: Address, direction: Direction, body: impl Into<String>) -> Self {
        Self {
            address,
            direction,
            body: body.into(),
            attachment: None,
        }
    }

    #[must_use]
    pub fn with_attachment(
        address: Address,
        direction: Direction,
        body: impl Into<String>,
        attachment: Attachment,
    ) -> Self {
        Self {
            address,
            direction,
            body: body.into(),
            attachment: Some(attachment),
        }
    }
}

/// A persisted message row. Immutable once written.
#[derive(Debug, Clone, Serialize)]
pub struct MessageRecord {
    pub id: i64,
    pub address: String,
    pub direction: Direction,
    pub body: String,
    pub sent_at: String,
    pub attachment: Option<Attachment>,
    pub has_media: bool,
}

fn record_from_row(row: &SqliteRow) -> MessageRecord {
    let path: Option<String> = row.get("attachment_path");
    let mime: Option<String> = row.get("attachment_mime");
    let attachment = match (path, mime) {
        (Some(path), Some(mime)) => Some(Attachment { path, mime }),
        _ => None,
    };
    MessageRecord {
        id: row.get("id"),
        address: row.get("address"),
        direction: Direction::from(row.get::<String, _>("direction")),
        body: row.get("body"),
        sent_at: row.get("sent_at"),
        has_media: row.get::<i64, _>("has_media") != 0,
        attachment,
    }
}

/// Append/read access to the message log.
#[derive(Clone)]
pub struct MessageStore {
    pool: SqlitePool,
}

impl MessageStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Append one message. Returns the assigned row id.
    pub async fn append(&self, message: NewMessage) -> Result<i64> {
        let (path, mime) = match &message.attachment {
            Some(a) => (Some(a.path.as_str()), Some(a.mime.as_str())),
            None => (None, None),
        };
        let result = sqlx::query(
            "INSERT INTO messages
               (address, direction, body, sent_at, attachment_path, attachment_mime, has_media)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(message.address.as_str())
        .bind(message.direction.as_str())
        .bind(&message.body)
        .bind(now_rfc3339())
        .bind(path)
        .bind(mime)
        .bind(message.attachment.is_some() as i64)
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    /// Conversation history for one address, oldest first.
    pub async fn list_for(&self, address: &Address) -> Result<Vec<MessageRecord>> {
        let rows = sqlx::query("SELECT * FROM messages WHERE address = ? ORDER BY sent_at ASC, id ASC")
            .bind(address.as_str())
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(record_from_row).collect())
    }

    /// Most recent messages across all conversations, newest first.
    pub async fn recent(&self, limit: u32) -> Result<Vec<MessageRecord>> {
        let rows = sqlx::query("SELECT * FROM messages ORDER BY sent_at DESC, id DESC LIMIT ?")
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(record_from_row).collect())
    }
}
