//! SQL migration definitions for the Debrief database.
//!
//! Migrations are applied in order on database open. Each migration has a
//! version number and a batch of SQL statements.

/// A database migration with a version and SQL statements.
pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All migrations, in ascending version order.
pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![Migration {
        version: 1,
        description: "Initial schema: runs, completion_cache",
        sql: r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_migrations (
    version    INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Briefing runs
CREATE TABLE IF NOT EXISTS runs (
    id               TEXT PRIMARY KEY,
    persona          TEXT NOT NULL,
    status           TEXT NOT NULL,
    started_at       TEXT NOT NULL,
    finished_at      TEXT,
    candidate_count  INTEGER NOT NULL DEFAULT 0,
    relevant_count   INTEGER NOT NULL DEFAULT 0,
    summarized_count INTEGER NOT NULL DEFAULT 0,
    briefing         TEXT
);

CREATE INDEX IF NOT EXISTS idx_runs_started_at ON runs(started_at);

-- LLM completion cache
CREATE TABLE IF NOT EXISTS completion_cache (
    prompt_hash TEXT NOT NULL,
    model_id    TEXT NOT NULL,
    stage       TEXT NOT NULL,
    result_text TEXT NOT NULL,
    created_at  TEXT NOT NULL,
    PRIMARY KEY (prompt_hash, model_id)
);

CREATE INDEX IF NOT EXISTS idx_completion_stage ON completion_cache(stage);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
    }]
}
