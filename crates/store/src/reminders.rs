//! Callback reminders. Pure data records consumed by the gateway; no
//! scheduler runs against them here.

use {
    chrono::{Duration, Utc},
    serde::Serialize,
    sqlx::{Row, SqlitePool, sqlite::SqliteRow},
};

use recado_common::types::Address;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Serialize)]
pub struct Reminder {
    pub id: i64,
    pub address: String,
    pub due_at: String,
    pub text: String,
    pub active: bool,
    pub created_at: String,
}

/// A reminder joined with its contact's display name, for the
/// upcoming-window query.
#[derive(Debug, Clone, Serialize)]
pub struct UpcomingReminder {
    #[serde(flatten)]
    pub reminder: Reminder,
    pub display_name: String,
}

fn reminder_from_row(row: &SqliteRow) -> Reminder {
    Reminder {
        id: row.get("id"),
        address: row.get("address"),
        due_at: row.get("due_at"),
        text: row.get("text"),
        active: row.get::<i64, _>("active") != 0,
        created_at: row.get("created_at"),
    }
}

#[derive(Clone)]
pub struct ReminderStore {
    pool: SqlitePool,
}

impl ReminderStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, address: &Address, due_at: &str, text: &str) -> Result<Reminder> {
        let result = sqlx::query(
            "INSERT INTO reminders (address, due_at, text) VALUES (?, ?, ?)",
        )
        .bind(address.as_str())
        .bind(due_at)
        .bind(text)
        .execute(&self.pool)
        .await?;
        let id = result.last_insert_rowid();
        let row = sqlx::query("SELECT * FROM reminders WHERE id = ?")
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
        Ok(reminder_from_row(&row))
    }

    /// Reminders for one contact, soonest first.
    pub async fn list_for(&self, address: &Address) -> Result<Vec<Reminder>> {
        let rows = sqlx::query("SELECT * FROM reminders WHERE address = ? ORDER BY due_at ASC")
            .bind(address.as_str())
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(reminder_from_row).collect())
    }

    pub async fn update(&self, id: i64, due_at: &str, text: &str) -> Result<()> {
        let result = sqlx::query("UPDATE reminders SET due_at = ?, text = ? WHERE id = ?")
            .bind(due_at)
            .bind(text)
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(Error::ReminderNotFound { id });
        }
        Ok(())
    }

    pub async fn complete(&self, id: i64) -> Result<()> {
        let result = sqlx::query("UPDATE reminders SET active = 0 WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(Error::ReminderNotFound { id });
        }
        Ok(())
    }

    pub async fn delete(&self, id: i64) -> Result<()> {
        let result = sqlx::query("DELETE FROM reminders WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(Error::ReminderNotFound { id });
        }
        Ok(())
    }

    /// Active reminders due within the next hour, joined with the contact
    /// name for display.
    pub async fn upcoming(&self) -> Result<Vec<UpcomingReminder>> {
        let now = Utc::now();
        let until = now + Duration::hours(1);
        let rows = sqlx::query(
            "SELECT r.*, c.display_name
             FROM reminders r
             JOIN contacts c ON r.address = c.address
             WHERE r.due_at BETWEEN ? AND ? AND r.active = 1
             ORDER BY r.due_at ASC",
        )
        .bind(now.to_rfc3339())
        .bind(until.to_rfc3339())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .iter()
            .map(|row| UpcomingReminder {
                reminder: reminder_from_row(row),
                display_name: row.get("display_name"),
            })
            .collect())
    }
}
