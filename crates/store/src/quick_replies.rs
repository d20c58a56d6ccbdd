//! Canned reply texts, maintained by the operator.

use {
    serde::Serialize,
    sqlx::{Row, SqlitePool, sqlite::SqliteRow},
};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Serialize)]
pub struct QuickReply {
    pub id: i64,
    pub text: String,
}

fn reply_from_row(row: &SqliteRow) -> QuickReply {
    QuickReply {
        id: row.get("id"),
        text: row.get("text"),
    }
}

#[derive(Clone)]
pub struct QuickReplyStore {
    pool: SqlitePool,
}

impl QuickReplyStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// All replies, in creation order.
    pub async fn list(&self) -> Result<Vec<QuickReply>> {
        let rows = sqlx::query("SELECT * FROM quick_replies ORDER BY id ASC")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(reply_from_row).collect())
    }

    pub async fn create(&self, text: &str) -> Result<QuickReply> {
        let result = sqlx::query("INSERT INTO quick_replies (text) VALUES (?)")
            .bind(text)
            .execute(&self.pool)
            .await?;
        Ok(QuickReply {
            id: result.last_insert_rowid(),
            text: text.to_string(),
        })
    }

    pub async fn update(&self, id: i64, text: &str) -> Result<()> {
        let result = sqlx::query("UPDATE quick_replies SET text = ? WHERE id = ?")
            .bind(text)
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(Error::QuickReplyNotFound { id });
        }
        Ok(())
    }

    pub async fn delete(&self, id: i64) -> Result<()> {
        let result = sqlx::query("DELETE FROM quick_replies WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(Error::QuickReplyNotFound { id });
        }
        Ok(())
    }
}
