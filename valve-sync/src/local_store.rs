//! Encrypted on-device store
//!
//! One SQLite table per partition, each holding only `{id, encrypted_blob}`
//! envelopes. The store never sees plaintext and never talks to the
//! network; encryption happens in [`crate::encryption`].

use crate::config::SyncConfig;
use crate::error::SyncResult;
use crate::key_storage::SqliteKeyValueStorage;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions},
    Row,
};
use std::str::FromStr;

/// Named partition of the local store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Partition {
    Records,
    Jobs,
    Inspections,
    TestReports,
}

impl Partition {
    pub const ALL: [Partition; 4] = [
        Partition::Records,
        Partition::Jobs,
        Partition::Inspections,
        Partition::TestReports,
    ];

    pub fn table(&self) -> &'static str {
        match self {
            Partition::Records => "records",
            Partition::Jobs => "jobs",
            Partition::Inspections => "inspections",
            Partition::TestReports => "test_reports",
        }
    }
}

impl std::fmt::Display for Partition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.table())
    }
}

/// Stored form of one entity: plaintext id, ciphertext payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptedEnvelope {
    pub id: String,
    pub encrypted_blob: String,
}

/// Local store handle
#[derive(Clone)]
pub struct LocalStore {
    pool: SqlitePool,
}

impl LocalStore {
    /// Open (creating if needed) the store at `config.db_path`
    pub async fn open(config: &SyncConfig) -> SyncResult<Self> {
        let mut options = SqliteConnectOptions::from_str(&format!("sqlite:{}", config.db_path))?
            .create_if_missing(true);

        if config.enable_wal {
            options = options.journal_mode(SqliteJournalMode::Wal);
        }

        if config.enable_secure_delete {
            options = options.pragma("secure_delete", "ON");
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.initialize_schema().await?;

        tracing::debug!(db_path = %config.db_path, "Opened local store");

        Ok(store)
    }

    async fn initialize_schema(&self) -> SyncResult<()> {
        for partition in Partition::ALL {
            sqlx::query(&format!(
                r#"
                CREATE TABLE IF NOT EXISTS {} (
                    id TEXT PRIMARY KEY,
                    encrypted_blob TEXT NOT NULL,
                    stored_at TEXT NOT NULL
                )
                "#,
                partition.table()
            ))
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }

    /// Device key-value storage sharing this store's database file
    pub async fn device_storage(&self) -> SyncResult<SqliteKeyValueStorage> {
        SqliteKeyValueStorage::new(self.pool.clone()).await
    }

    /// Upsert one envelope by id
    pub async fn put(&self, envelope: &EncryptedEnvelope, partition: Partition) -> SyncResult<()> {
        sqlx::query(&Self::upsert_sql(partition))
            .bind(&envelope.id)
            .bind(&envelope.encrypted_blob)
            .bind(Utc::now().to_rfc3339())
            .execute(&self.pool)
            .await?;

        tracing::trace!(id = %envelope.id, partition = %partition, "Stored envelope");
        Ok(())
    }

    pub async fn get(&self, id: &str, partition: Partition) -> SyncResult<Option<EncryptedEnvelope>> {
        let row = sqlx::query(&format!(
            "SELECT id, encrypted_blob FROM {} WHERE id = ?",
            partition.table()
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(EncryptedEnvelope {
                id: row.try_get("id")?,
                encrypted_blob: row.try_get("encrypted_blob")?,
            })),
            None => Ok(None),
        }
    }

    /// All envelopes in a partition, in no particular order
    pub async fn get_all(&self, partition: Partition) -> SyncResult<Vec<EncryptedEnvelope>> {
        let rows = sqlx::query(&format!("SELECT id, encrypted_blob FROM {}", partition.table()))
            .fetch_all(&self.pool)
            .await?;

        let mut envelopes = Vec::with_capacity(rows.len());
        for row in rows {
            envelopes.push(EncryptedEnvelope {
                id: row.try_get("id")?,
                encrypted_blob: row.try_get("encrypted_blob")?,
            });
        }
        Ok(envelopes)
    }

    pub async fn delete(&self, id: &str, partition: Partition) -> SyncResult<()> {
        sqlx::query(&format!("DELETE FROM {} WHERE id = ?", partition.table()))
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn clear(&self, partition: Partition) -> SyncResult<()> {
        sqlx::query(&format!("DELETE FROM {}", partition.table()))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Upsert many envelopes in a single transaction
    ///
    /// Readers of the partition see either none or all of the batch.
    pub async fn bulk_put(&self, envelopes: &[EncryptedEnvelope], partition: Partition) -> SyncResult<()> {
        if envelopes.is_empty() {
            return Ok(());
        }

        let sql = Self::upsert_sql(partition);
        let stored_at = Utc::now().to_rfc3339();

        let mut tx = self.pool.begin().await?;
        for envelope in envelopes {
            sqlx::query(&sql)
                .bind(&envelope.id)
                .bind(&envelope.encrypted_blob)
                .bind(&stored_at)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;

        tracing::debug!(count = envelopes.len(), partition = %partition, "Bulk stored envelopes");
        Ok(())
    }

    pub async fn count(&self, partition: Partition) -> SyncResult<i64> {
        let row = sqlx::query(&format!("SELECT COUNT(*) AS n FROM {}", partition.table()))
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get("n")?)
    }

    /// Get database pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Close all connections; later calls fail with a database error
    pub async fn close(&self) {
        self.pool.close().await;
    }

    fn upsert_sql(partition: Partition) -> String {
        format!(
            r#"
            INSERT INTO {} (id, encrypted_blob, stored_at)
            VALUES (?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                encrypted_blob = excluded.encrypted_blob,
                stored_at = excluded.stored_at
            "#,
            partition.table()
        )
    }
}
