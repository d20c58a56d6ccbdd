//! Contact registry: get-or-create on interaction, label/note edits,
//! segment queries, and cascading deletion.

use {
    serde::Serialize,
    sqlx::{Row, SqlitePool, sqlite::SqliteRow},
    tracing::debug,
};

use recado_common::types::{Address, Label, now_rfc3339};

use crate::error::{Error, Result};

/// A contact row.
#[derive(Debug, Clone, Serialize)]
pub struct Contact {
    pub address: Address,
    pub display_name: String,
    pub label: Label,
    pub archived: bool,
    pub note: String,
    /// RFC 3339 timestamp of the last inbound interaction.
    pub last_interaction: String,
}

fn contact_from_row(row: &SqliteRow) -> sqlx::Result<Contact> {
    let raw: String = row.get("address");
    let address = Address::parse(&raw).map_err(|e| sqlx::Error::ColumnDecode {
        index: "address".into(),
        source: Box::new(e),
    })?;
    Ok(Contact {
        address,
        display_name: row.get("display_name"),
        label: Label::from(row.get::<String, _>("label")),
        archived: row.get::<i64, _>("archived") != 0,
        note: row.get("note"),
        last_interaction: row.get("last_interaction"),
    })
}

/// Outcome of a bulk contact import.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ImportSummary {
    pub total: usize,
    pub created: usize,
    pub existing: usize,
}

/// Upsert/read access to contact records, keyed by normalized address.
#[derive(Clone)]
pub struct ContactRegistry {
    pool: SqlitePool,
}

impl ContactRegistry {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Get-or-create on interaction.
    ///
    /// Creates the contact with `fallback_label` (or `grupos` for group
    /// addresses); if the row already exists, only the display name and
    /// last-interaction timestamp are refreshed. A single atomic upsert, so
    /// concurrent calls for one address never produce duplicate rows and
    /// never touch an existing label or note.
    pub async fn upsert_on_interaction(
        &self,
        address: &Address,
        display_name: &str,
        fallback_label: Label,
    ) -> Result<()> {
        let label = if address.is_group() {
            Label::Groups
        } else {
            fallback_label
        };
        sqlx::query(
            "INSERT INTO contacts (address, display_name, label, archived, note, last_interaction)
             VALUES (?, ?, ?, 0, '', ?)
             ON CONFLICT(address) DO UPDATE SET
               display_name = excluded.display_name,
               last_interaction = excluded.last_interaction",
        )
        .bind(address.as_str())
        .bind(display_name)
        .bind(label.as_str())
        .bind(now_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Create the contact with label `nuevo` if it is unknown; leave an
    /// existing row completely untouched. Used by the dispatcher's
    /// upsert-before-send guarantee.
    pub async fn ensure_exists(&self, address: &Address) -> Result<()> {
        sqlx::query(
            "INSERT INTO contacts (address, display_name, label, archived, note, last_interaction)
             VALUES (?, ?, ?, 0, '', ?)
             ON CONFLICT(address) DO NOTHING",
        )
        .bind(address.as_str())
        .bind(address.local_part())
        .bind(Label::default_for(address).as_str())
        .bind(now_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Insert a contact with the given display name only when absent.
    /// Returns whether a row was created. Used by the post-connect chat
    /// sync pass.
    pub async fn insert_if_absent(&self, address: &Address, display_name: &str) -> Result<bool> {
        let result = sqlx::query(
            "INSERT INTO contacts (address, display_name, label, archived, note, last_interaction)
             VALUES (?, ?, ?, 0, '', ?)
             ON CONFLICT(address) DO NOTHING",
        )
        .bind(address.as_str())
        .bind(display_name)
        .bind(Label::default_for(address).as_str())
        .bind(now_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Bulk-create contacts, skipping those already known.
    pub async fn import(&self, addresses: &[Address]) -> Result<ImportSummary> {
        let mut summary = ImportSummary {
            total: addresses.len(),
            ..ImportSummary::default()
        };
        for address in addresses {
            let result = sqlx::query(
                "INSERT INTO contacts
                   (address, display_name, label, archived, note, last_interaction)
                 VALUES (?, ?, 'nuevo', 0, '', ?)
                 ON CONFLICT(address) DO NOTHING",
            )
            .bind(address.as_str())
            .bind(address.local_part())
            .bind(now_rfc3339())
            .execute(&self.pool)
            .await?;
            if result.rows_affected() == 0 {
                summary.existing += 1;
            } else {
                summary.created += 1;
            }
        }
        debug!(
            total = summary.total,
            created = summary.created,
            "imported contacts"
        );
        Ok(summary)
    }

    pub async fn get(&self, address: &Address) -> Result<Option<Contact>> {
        let row = sqlx::query("SELECT * FROM contacts WHERE address = ?")
            .bind(address.as_str())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(contact_from_row).transpose().map_err(Into::into)
    }

    pub async fn set_label(&self, address: &Address, label: &Label, archived: bool) -> Result<()> {
        let result = sqlx::query("UPDATE contacts SET label = ?, archived = ? WHERE address = ?")
            .bind(label.as_str())
            .bind(archived as i64)
            .bind(address.as_str())
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(Error::not_found(address));
        }
        Ok(())
    }

    pub async fn set_note(&self, address: &Address, note: &str) -> Result<()> {
        let result = sqlx::query("UPDATE contacts SET note = ? WHERE address = ?")
            .bind(note)
            .bind(address.as_str())
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(Error::not_found(address));
        }
        Ok(())
    }

    pub async fn rename(&self, address: &Address, name: &str) -> Result<()> {
        let result = sqlx::query("UPDATE contacts SET display_name = ? WHERE address = ?")
            .bind(name)
            .bind(address.as_str())
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(Error::not_found(address));
        }
        Ok(())
    }

    /// All non-archived contacts, most recent interaction first.
    pub async fn list_active(&self) -> Result<Vec<Contact>> {
        let rows = sqlx::query(
            "SELECT * FROM contacts WHERE archived = 0 ORDER BY last_interaction DESC",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(contact_from_row).collect::<sqlx::Result<_>>().map_err(Into::into)
    }

    /// Non-archived contacts carrying any of `labels`.
    pub async fn list_by_labels(&self, labels: &[Label]) -> Result<Vec<Contact>> {
        if labels.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = vec!["?"; labels.len()].join(", ");
        let sql = format!(
            "SELECT * FROM contacts
             WHERE archived = 0 AND label IN ({placeholders})
             ORDER BY last_interaction DESC"
        );
        let mut query = sqlx::query(&sql);
        for label in labels {
            query = query.bind(label.as_str());
        }
        let rows = query.fetch_all(&self.pool).await?;
        rows.iter().map(contact_from_row).collect::<sqlx::Result<_>>().map_err(Into::into)
    }

    /// Every contact, archived included, for the CSV export.
    pub async fn list_all(&self) -> Result<Vec<Contact>> {
        let rows = sqlx::query("SELECT * FROM contacts ORDER BY last_interaction DESC")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(contact_from_row).collect::<sqlx::Result<_>>().map_err(Into::into)
    }

    /// Delete the contact and every message referencing it, atomically.
    pub async fn delete(&self, address: &Address) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM messages WHERE address = ?")
            .bind(address.as_str())
            .execute(&mut *tx)
            .await?;
        let result = sqlx::query("DELETE FROM contacts WHERE address = ?")
            .bind(address.as_str())
            .execute(&mut *tx)
            .await?;
        if result.rows_affected() == 0 {
            // Transaction rolls back on drop.
            return Err(Error::not_found(address));
        }
        tx.commit().await?;
        Ok(())
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_pool;

    fn person(n: u64) -> Address {
        Address::parse(&format!("521555000{n:04}@s.whatsapp.net")).unwrap()
    }

    #[tokio::test]
    async fn upsert_creates_then_refreshes() {
        let registry = ContactRegistry::new(test_pool().await);
        let addr = person(1);

        registry
            .upsert_on_interaction(&addr, "Ana", Label::New)
            .await
            .unwrap();
        let contact = registry.get(&addr).await.unwrap().unwrap();
        assert_eq!(contact.label, Label::New);
        assert_eq!(contact.display_name, "Ana");

        registry
            .set_label(&addr, &Label::Callback, false)
            .await
            .unwrap();
        registry
            .upsert_on_interaction(&addr, "Ana María", Label::New)
            .await
            .unwrap();

        // Name refreshed, label untouched by the later interaction.
        let contact = registry.get(&addr).await.unwrap().unwrap();
        assert_eq!(contact.display_name, "Ana María");
        assert_eq!(contact.label, Label::Callback);
    }

    #[tokio::test]
    async fn group_address_gets_group_label() {
        let registry = ContactRegistry::new(test_pool().await);
        let group = Address::parse("120363021-44@g.us").unwrap();
        registry
            .upsert_on_interaction(&group, "Equipo", Label::New)
            .await
            .unwrap();
        let contact = registry.get(&group).await.unwrap().unwrap();
        assert_eq!(contact.label, Label::Groups);
    }

    #[tokio::test]
    async fn concurrent_upserts_yield_one_row() {
        let registry = ContactRegistry::new(test_pool().await);
        let addr = person(2);

        let (a, b) = tokio::join!(
            registry.upsert_on_interaction(&addr, "First", Label::New),
            registry.upsert_on_interaction(&addr, "Second", Label::New),
        );
        a.unwrap();
        b.unwrap();

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM contacts")
            .fetch_one(&registry.pool)
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn ensure_exists_never_touches_existing_rows() {
        let registry = ContactRegistry::new(test_pool().await);
        let addr = person(3);

        registry.ensure_exists(&addr).await.unwrap();
        let created = registry.get(&addr).await.unwrap().unwrap();
        assert_eq!(created.label, Label::New);
        assert_eq!(created.display_name, addr.local_part());

        registry
            .set_label(&addr, &Label::Analyst, false)
            .await
            .unwrap();
        registry.ensure_exists(&addr).await.unwrap();
        let kept = registry.get(&addr).await.unwrap().unwrap();
        assert_eq!(kept.label, Label::Analyst);
    }

    #[tokio::test]
    async fn mutations_on_unknown_address_fail() {
        let registry = ContactRegistry::new(test_pool().await);
        let addr = person(4);
        assert!(matches!(
            registry.set_label(&addr, &Label::New, false).await,
            Err(Error::NotFound { .. })
        ));
        assert!(matches!(
            registry.set_note(&addr, "hi").await,
            Err(Error::NotFound { .. })
        ));
        assert!(matches!(
            registry.rename(&addr, "X").await,
            Err(Error::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn list_by_labels_filters_archived() {
        let registry = ContactRegistry::new(test_pool().await);
        for (i, label) in [Label::New, Label::Callback, Label::Analyst]
            .into_iter()
            .enumerate()
        {
            let addr = person(10 + i as u64);
            registry.ensure_exists(&addr).await.unwrap();
            registry.set_label(&addr, &label, false).await.unwrap();
        }
        // Archive the callback contact.
        registry
            .set_label(&person(11), &Label::Callback, true)
            .await
            .unwrap();

        let hits = registry
            .list_by_labels(&[Label::Callback, Label::Analyst])
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].label, Label::Analyst);

        assert!(registry.list_by_labels(&[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn delete_cascades_to_messages() {
        let pool = test_pool().await;
        let registry = ContactRegistry::new(pool.clone());
        let store = crate::messages::MessageStore::new(pool.clone());
        let addr = person(20);

        registry.ensure_exists(&addr).await.unwrap();
        store
            .append(crate::messages::NewMessage::text(
                addr.clone(),
                recado_common::types::Direction::Inbound,
                "hola",
            ))
            .await
            .unwrap();

        registry.delete(&addr).await.unwrap();
        assert!(registry.get(&addr).await.unwrap().is_none());
        assert!(store.list_for(&addr).await.unwrap().is_empty());

        assert!(matches!(
            registry.delete(&addr).await,
            Err(Error::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn import_tallies_new_and_existing() {
        let registry = ContactRegistry::new(test_pool().await);
        let first = vec![person(30), person(31)];
        let summary = registry.import(&first).await.unwrap();
        assert_eq!((summary.created, summary.existing), (2, 0));

        let second = vec![person(31), person(32)];
        let summary = registry.import(&second).await.unwrap();
        assert_eq!((summary.created, summary.existing), (1, 1));
        assert_eq!(summary.total, 2);
    }
}
