//! libSQL embedded storage for Debrief.
//!
//! The [`Storage`] struct wraps a local libSQL database holding the
//! completion cache (so re-running a persona does not pay for identical
//! prompts twice) and the history of briefing runs.

mod migrations;

use std::path::Path;

use chrono::{DateTime, Utc};
use debrief_shared::{DebriefError, Result, RunRecord, RunStatus};
use libsql::{Connection, Database, Row, params};

/// Primary storage handle wrapping a libSQL database.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
}

/// Final counts recorded when a run finishes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunCounts {
    pub candidates: usize,
    pub relevant: usize,
    pub summarized: usize,
}

fn storage_err(e: impl std::fmt::Display) -> DebriefError {
    DebriefError::Storage(e.to_string())
}

impl Storage {
    /// Open or create a database at `path`.
    pub async fn open(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| DebriefError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(storage_err)?;
        Self::from_database(db).await
    }

    /// Open a throwaway in-memory database.
    pub async fn open_in_memory() -> Result<Self> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(storage_err)?;
        Self::from_database(db).await
    }

    async fn from_database(db: Database) -> Result<Self> {
        let conn = db.connect().map_err(storage_err)?;
        let storage = Self { db, conn };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn.execute_batch(migration.sql).await.map_err(|e| {
                    DebriefError::Storage(format!("migration v{} failed: {e}", migration.version))
                })?;
            }
        }
        Ok(())
    }

    /// Get the current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => {
                if let Ok(Some(row)) = rows.next().await {
                    row.get::<u32>(0).unwrap_or(0)
                } else {
                    0
                }
            }
            Err(_) => 0, // Table doesn't exist yet
        }
    }

    // -----------------------------------------------------------------------
    // Completion cache
    // -----------------------------------------------------------------------

    /// Look up a cached completion.
    pub async fn get_completion(&self, prompt_hash: &str, model_id: &str) -> Result<Option<String>> {
        let mut rows = self
            .conn
            .query(
                "SELECT result_text FROM completion_cache WHERE prompt_hash = ?1 AND model_id = ?2",
                params![prompt_hash, model_id],
            )
            .await
            .map_err(storage_err)?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row.get::<String>(0).map_err(storage_err)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(storage_err(e)),
        }
    }

    /// Store (or replace) a completion.
    pub async fn set_completion(
        &self,
        prompt_hash: &str,
        model_id: &str,
        stage: &str,
        text: &str,
    ) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO completion_cache (prompt_hash, model_id, stage, result_text, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(prompt_hash, model_id) DO UPDATE SET
                   stage = excluded.stage,
                   result_text = excluded.result_text,
                   created_at = excluded.created_at",
                params![prompt_hash, model_id, stage, text, now.as_str()],
            )
            .await
            .map_err(storage_err)?;
        Ok(())
    }

    /// Drop every cached completion. Returns the number of rows removed.
    pub async fn clear_completions(&self) -> Result<u64> {
        self.conn
            .execute("DELETE FROM completion_cache", params![])
            .await
            .map_err(storage_err)
    }

    // -----------------------------------------------------------------------
    // Run history
    // -----------------------------------------------------------------------

    /// Record the start of a run.
    pub async fn insert_run(&self, id: &str, persona: &str) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO runs (id, persona, status, started_at) VALUES (?1, ?2, ?3, ?4)",
                params![id, persona, RunStatus::Running.as_str(), now.as_str()],
            )
            .await
            .map_err(storage_err)?;
        Ok(())
    }

    /// Mark a run finished with its outcome.
    pub async fn finish_run(
        &self,
        id: &str,
        status: RunStatus,
        counts: RunCounts,
        briefing: Option<&str>,
    ) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        let affected = self
            .conn
            .execute(
                "UPDATE runs SET status = ?2, finished_at = ?3, candidate_count = ?4,
                   relevant_count = ?5, summarized_count = ?6, briefing = ?7
                 WHERE id = ?1",
                params![
                    id,
                    status.as_str(),
                    now.as_str(),
                    counts.candidates as i64,
                    counts.relevant as i64,
                    counts.summarized as i64,
                    briefing
                ],
            )
            .await
            .map_err(storage_err)?;

        if affected == 0 {
            return Err(DebriefError::Storage(format!("no run with id {id}")));
        }
        Ok(())
    }

    /// Get a single run by id.
    pub async fn get_run(&self, id: &str) -> Result<Option<RunRecord>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, persona, status, started_at, finished_at, candidate_count,
                        relevant_count, summarized_count, briefing
                 FROM runs WHERE id = ?1",
                params![id],
            )
            .await
            .map_err(storage_err)?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_run(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(storage_err(e)),
        }
    }

    /// List the most recent runs, newest first.
    pub async fn list_runs(&self, limit: usize) -> Result<Vec<RunRecord>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, persona, status, started_at, finished_at, candidate_count,
                        relevant_count, summarized_count, briefing
                 FROM runs ORDER BY started_at DESC, id DESC LIMIT ?1",
                params![limit as i64],
            )
            .await
            .map_err(storage_err)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            results.push(row_to_run(&row)?);
        }
        Ok(results)
    }
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| DebriefError::Storage(format!("bad timestamp {s}: {e}")))
}

fn row_to_run(row: &Row) -> Result<RunRecord> {
    let status: String = row.get(2).map_err(storage_err)?;
    let started_at: String = row.get(3).map_err(storage_err)?;
    let finished_at: Option<String> = row.get(4).map_err(storage_err)?;

    Ok(RunRecord {
        id: row.get(0).map_err(storage_err)?,
        persona: row.get(1).map_err(storage_err)?,
        status: status.parse().map_err(DebriefError::Storage)?,
        started_at: parse_timestamp(&started_at)?,
        finished_at: finished_at.as_deref().map(parse_timestamp).transpose()?,
        candidate_count: row.get::<i64>(5).map_err(storage_err)? as usize,
        relevant_count: row.get::<i64>(6).map_err(storage_err)? as usize,
        summarized_count: row.get::<i64>(7).map_err(storage_err)? as usize,
        briefing: row.get(8).map_err(storage_err)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    /// Create a temp file storage for testing.
    async fn test_storage() -> Storage {
        let tmp = std::env::temp_dir().join(format!("debrief_test_{}.db", Uuid::now_v7()));
        Storage::open(&tmp).await.expect("open test db")
    }

    #[tokio::test]
    async fn open_and_migrate() {
        let storage = test_storage().await;
        assert_eq!(storage.get_schema_version().await, 1);
    }

    #[tokio::test]
    async fn idempotent_migration() {
        let tmp = std::env::temp_dir().join(format!("debrief_test_{}.db", Uuid::now_v7()));
        let s1 = Storage::open(&tmp).await.expect("first open");
        drop(s1);
        let s2 = Storage::open(&tmp).await.expect("second open");
        assert_eq!(s2.get_schema_version().await, 1);
    }

    #[tokio::test]
    async fn completion_cache_roundtrip() {
        let storage = Storage::open_in_memory().await.expect("open memory db");

        let miss = storage.get_completion("hash1", "gpt-test").await.expect("get miss");
        assert!(miss.is_none());

        storage
            .set_completion("hash1", "gpt-test", "summarize", "A short summary.")
            .await
            .expect("set");

        let hit = storage.get_completion("hash1", "gpt-test").await.expect("get hit");
        assert_eq!(hit.as_deref(), Some("A short summary."));

        // Different model is a separate entry
        let other = storage.get_completion("hash1", "gpt-other").await.unwrap();
        assert!(other.is_none());

        // Upsert replaces
        storage
            .set_completion("hash1", "gpt-test", "summarize", "Replaced.")
            .await
            .unwrap();
        let hit = storage.get_completion("hash1", "gpt-test").await.unwrap();
        assert_eq!(hit.as_deref(), Some("Replaced."));

        let removed = storage.clear_completions().await.expect("clear");
        assert_eq!(removed, 1);
        assert!(storage.get_completion("hash1", "gpt-test").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn run_lifecycle() {
        let storage = test_storage().await;
        let id = Uuid::now_v7().to_string();

        storage.insert_run(&id, "likes rust and space").await.expect("insert");
        let run = storage.get_run(&id).await.unwrap().expect("run exists");
        assert_eq!(run.status, RunStatus::Running);
        assert!(run.finished_at.is_none());
        assert!(run.briefing.is_none());

        let counts = RunCounts {
            candidates: 40,
            relevant: 7,
            summarized: 5,
        };
        storage
            .finish_run(&id, RunStatus::Completed, counts, Some("Today in space..."))
            .await
            .expect("finish");

        let run = storage.get_run(&id).await.unwrap().unwrap();
        assert_eq!(run.status, RunStatus::Completed);
        assert_eq!(run.candidate_count, 40);
        assert_eq!(run.relevant_count, 7);
        assert_eq!(run.summarized_count, 5);
        assert_eq!(run.briefing.as_deref(), Some("Today in space..."));
        assert!(run.finished_at.is_some());
    }

    #[tokio::test]
    async fn finish_unknown_run_fails() {
        let storage = Storage::open_in_memory().await.unwrap();
        let err = storage
            .finish_run("nope", RunStatus::Failed, RunCounts::default(), None)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("no run"));
    }

    #[tokio::test]
    async fn list_runs_newest_first() {
        let storage = Storage::open_in_memory().await.unwrap();
        let first = Uuid::now_v7().to_string();
        storage.insert_run(&first, "first").await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let second = Uuid::now_v7().to_string();
        storage.insert_run(&second, "second").await.unwrap();

        let runs = storage.list_runs(10).await.unwrap();
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].persona, "second");
        assert_eq!(runs[1].persona, "first");

        let limited = storage.list_runs(1).await.unwrap();
        assert_eq!(limited.len(), 1);
    }
}
