//! Generation record persistence using SQLite

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde_json::Value as JsonValue;
use tracing::debug;

use super::types::{GenerationRecord, RecordKind};
use crate::db::Database;
use crate::quota::parse_timestamp;
use crate::Result;

/// Metadata store for generation records
#[async_trait]
pub trait GenerationLedger: Send + Sync {
    /// Persist a new record
    async fn create(&self, record: &GenerationRecord) -> Result<()>;

    /// Load a record owned by `user_id`
    async fn get(&self, user_id: &str, id: &str) -> Result<Option<GenerationRecord>>;

    /// List a user's records, newest first
    async fn list(
        &self,
        user_id: &str,
        kind: Option<RecordKind>,
        limit: usize,
    ) -> Result<Vec<GenerationRecord>>;

    /// Toggle the favorite flag; returns the updated record
    async fn set_favorite(
        &self,
        user_id: &str,
        id: &str,
        favorite: bool,
    ) -> Result<Option<GenerationRecord>>;

    /// Delete a record; returns whether it existed
    async fn delete(&self, user_id: &str, id: &str) -> Result<bool>;
}

/// SQLite implementation of [`GenerationLedger`]
pub struct SqliteGenerationLedger {
    db: Database,
}

const COLUMNS: &str = "id, user_id, kind, provider, input, artifact_path, artifact_file_id, \
    content_type, duration_secs, language, favorite, metadata, created_at, updated_at";

impl SqliteGenerationLedger {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

/// Raw row values, parsed after the statement completes
struct RawRecord {
    id: String,
    user_id: String,
    kind: String,
    provider: Option<String>,
    input: String,
    artifact_path: String,
    artifact_file_id: Option<String>,
    content_type: String,
    duration_secs: Option<f64>,
    language: Option<String>,
    favorite: bool,
    metadata: String,
    created_at: String,
    updated_at: String,
}

impl RawRecord {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            user_id: row.get(1)?,
            kind: row.get(2)?,
            provider: row.get(3)?,
            input: row.get(4)?,
            artifact_path: row.get(5)?,
            artifact_file_id: row.get(6)?,
            content_type: row.get(7)?,
            duration_secs: row.get(8)?,
            language: row.get(9)?,
            favorite: row.get(10)?,
            metadata: row.get(11)?,
            created_at: row.get(12)?,
            updated_at: row.get(13)?,
        })
    }

    fn into_record(self) -> Result<GenerationRecord> {
        Ok(GenerationRecord {
            id: self.id,
            user_id: self.user_id,
            kind: self.kind.parse()?,
            provider: self.provider.map(|p| p.parse()).transpose()?,
            input: serde_json::from_str(&self.input).unwrap_or(JsonValue::Null),
            artifact_path: self.artifact_path,
            artifact_file_id: self.artifact_file_id,
            content_type: self.content_type,
            duration_secs: self.duration_secs,
            language: self.language,
            favorite: self.favorite,
            metadata: serde_json::from_str(&self.metadata).unwrap_or(JsonValue::Null),
            created_at: parse_timestamp(&self.created_at),
            updated_at: parse_timestamp(&self.updated_at),
        })
    }
}

fn load(conn: &Connection, user_id: &str, id: &str) -> Result<Option<GenerationRecord>> {
    let raw = conn
        .query_row(
            &format!("SELECT {COLUMNS} FROM generations WHERE id = ?1 AND user_id = ?2"),
            params![id, user_id],
            RawRecord::from_row,
        )
        .optional()?;
    raw.map(RawRecord::into_record).transpose()
}

#[async_trait]
impl GenerationLedger for SqliteGenerationLedger {
    async fn create(&self, record: &GenerationRecord) -> Result<()> {
        let input = serde_json::to_string(&record.input)?;
        let metadata = serde_json::to_string(&record.metadata)?;

        self.db.with_conn(|conn| {
            conn.execute(
                &format!(
                    "INSERT INTO generations ({COLUMNS})
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)"
                ),
                params![
                    record.id,
                    record.user_id,
                    record.kind.as_str(),
                    record.provider.map(|p| p.as_str()),
                    input,
                    record.artifact_path,
                    record.artifact_file_id,
                    record.content_type,
                    record.duration_secs,
                    record.language,
                    record.favorite,
                    metadata,
                    record.created_at.to_rfc3339(),
                    record.updated_at.to_rfc3339(),
                ],
            )?;
            Ok(())
        })?;

        debug!("Saved {} generation {}", record.kind, record.id);
        Ok(())
    }

    async fn get(&self, user_id: &str, id: &str) -> Result<Option<GenerationRecord>> {
        self.db.with_conn(|conn| load(conn, user_id, id))
    }

    async fn list(
        &self,
        user_id: &str,
        kind: Option<RecordKind>,
        limit: usize,
    ) -> Result<Vec<GenerationRecord>> {
        let raws = self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {COLUMNS} FROM generations
                 WHERE user_id = ?1 AND (?2 IS NULL OR kind = ?2)
                 ORDER BY created_at DESC
                 LIMIT ?3"
            ))?;
            let raws = stmt
                .query_map(
                    params![user_id, kind.map(|k| k.as_str()), limit as i64],
                    RawRecord::from_row,
                )?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(raws)
        })?;

        let records = raws
            .into_iter()
            .map(RawRecord::into_record)
            .collect::<Result<Vec<_>>>()?;
        debug!("Listed {} generations for user {}", records.len(), user_id);
        Ok(records)
    }

    async fn set_favorite(
        &self,
        user_id: &str,
        id: &str,
        favorite: bool,
    ) -> Result<Option<GenerationRecord>> {
        self.db.with_conn(|conn| {
            let updated = conn.execute(
                "UPDATE generations SET favorite = ?3, updated_at = ?4
                 WHERE id = ?1 AND user_id = ?2",
                params![id, user_id, favorite, Utc::now().to_rfc3339()],
            )?;
            if updated == 0 {
                return Ok(None);
            }
            load(conn, user_id, id)
        })
    }

    async fn delete(&self, user_id: &str, id: &str) -> Result<bool> {
        let deleted = self.db.with_conn(|conn| {
            let rows = conn.execute(
                "DELETE FROM generations WHERE id = ?1 AND user_id = ?2",
                params![id, user_id],
            )?;
            Ok(rows > 0)
        })?;

        if deleted {
            debug!("Deleted generation {}", id);
        }
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::ProviderKind;
    use chrono::Duration;
    use serde_json::json;

    fn record(id: &str, user_id: &str, kind: RecordKind) -> GenerationRecord {
        let now = Utc::now();
        GenerationRecord {
            id: id.to_string(),
            user_id: user_id.to_string(),
            kind,
            provider: Some(ProviderKind::ElevenLabs),
            input: json!({ "text": "hello", "voice_id": "v1" }),
            artifact_path: format!("{}/{}/2026/03/{}.mp3", kind.storage_prefix(), user_id, id),
            artifact_file_id: Some(format!("file-{}", id)),
            content_type: "audio/mpeg".to_string(),
            duration_secs: Some(1.5),
            language: None,
            favorite: false,
            metadata: json!({}),
            created_at: now,
            updated_at: now,
        }
    }

    fn ledger() -> SqliteGenerationLedger {
        SqliteGenerationLedger::new(Database::in_memory().unwrap())
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let ledger = ledger();
        let saved = record("g1", "u1", RecordKind::Speech);
        ledger.create(&saved).await.unwrap();

        let loaded = ledger.get("u1", "g1").await.unwrap().unwrap();
        assert_eq!(loaded.artifact_path, "audio/u1/2026/03/g1.mp3");
        assert_eq!(loaded.provider, Some(ProviderKind::ElevenLabs));
        assert_eq!(loaded.input["voice_id"], "v1");
        assert_eq!(loaded.duration_secs, Some(1.5));
    }

    #[tokio::test]
    async fn test_get_is_scoped_to_owner() {
        let ledger = ledger();
        ledger.create(&record("g1", "u1", RecordKind::Speech)).await.unwrap();

        assert!(ledger.get("u2", "g1").await.unwrap().is_none());
        assert!(!ledger.delete("u2", "g1").await.unwrap());
        assert!(ledger.set_favorite("u2", "g1", true).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_id_fails() {
        let ledger = ledger();
        ledger.create(&record("g1", "u1", RecordKind::Speech)).await.unwrap();
        assert!(ledger.create(&record("g1", "u1", RecordKind::Speech)).await.is_err());
    }

    #[tokio::test]
    async fn test_list_filters_by_kind_newest_first() {
        let ledger = ledger();
        let mut older = record("g1", "u1", RecordKind::Speech);
        older.created_at = Utc::now() - Duration::minutes(5);
        ledger.create(&older).await.unwrap();
        ledger.create(&record("g2", "u1", RecordKind::Speech)).await.unwrap();
        ledger.create(&record("g3", "u1", RecordKind::Music)).await.unwrap();
        ledger.create(&record("g4", "u2", RecordKind::Speech)).await.unwrap();

        let all = ledger.list("u1", None, 50).await.unwrap();
        assert_eq!(all.len(), 3);

        let speech = ledger.list("u1", Some(RecordKind::Speech), 50).await.unwrap();
        let ids: Vec<_> = speech.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["g2", "g1"]);

        let limited = ledger.list("u1", None, 1).await.unwrap();
        assert_eq!(limited.len(), 1);
    }

    #[tokio::test]
    async fn test_set_favorite_and_delete() {
        let ledger = ledger();
        ledger.create(&record("g1", "u1", RecordKind::Dialogue)).await.unwrap();

        let updated = ledger.set_favorite("u1", "g1", true).await.unwrap().unwrap();
        assert!(updated.favorite);

        assert!(ledger.delete("u1", "g1").await.unwrap());
        assert!(ledger.get("u1", "g1").await.unwrap().is_none());
        assert!(!ledger.delete("u1", "g1").await.unwrap());
    }
}
