// crates/counsel-server/src/graph/schema.rs
// Decision graph schema and migrations

use anyhow::Result;
use rusqlite::Connection;

/// Tables that must exist after initialization.
pub const REQUIRED_TABLES: [&str; 3] = [
    "decision_nodes",
    "participant_stances",
    "decision_similarities",
];

/// Decision graph schema SQL.
pub const SCHEMA: &str = r#"
-- =======================================
-- DECISIONS: one row per completed deliberation
-- =======================================
CREATE TABLE IF NOT EXISTS decision_nodes (
    id TEXT PRIMARY KEY,
    question TEXT NOT NULL,
    timestamp TEXT NOT NULL,
    consensus TEXT NOT NULL,
    winning_option TEXT,
    convergence_status TEXT NOT NULL,
    participants TEXT NOT NULL,       -- JSON array of participant identities
    transcript_path TEXT NOT NULL,
    metadata TEXT                     -- JSON object, nullable
);
CREATE INDEX IF NOT EXISTS idx_decision_timestamp ON decision_nodes(timestamp DESC);
CREATE INDEX IF NOT EXISTS idx_decision_question ON decision_nodes(question);

-- =======================================
-- STANCES: one row per (decision, participant)
-- =======================================
CREATE TABLE IF NOT EXISTS participant_stances (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    decision_id TEXT NOT NULL,
    participant TEXT NOT NULL,
    vote_option TEXT,
    confidence REAL,
    rationale TEXT,
    final_position TEXT NOT NULL,
    FOREIGN KEY (decision_id) REFERENCES decision_nodes(id)
);
CREATE INDEX IF NOT EXISTS idx_participant_decision ON participant_stances(decision_id);

-- =======================================
-- SIMILARITIES: directed edges, both directions materialized
-- =======================================
CREATE TABLE IF NOT EXISTS decision_similarities (
    source_id TEXT NOT NULL,
    target_id TEXT NOT NULL,
    similarity_score REAL NOT NULL,
    computed_at TEXT NOT NULL,
    PRIMARY KEY (source_id, target_id),
    FOREIGN KEY (source_id) REFERENCES decision_nodes(id),
    FOREIGN KEY (target_id) REFERENCES decision_nodes(id)
);
CREATE INDEX IF NOT EXISTS idx_similarity_source ON decision_similarities(source_id);
CREATE INDEX IF NOT EXISTS idx_similarity_score ON decision_similarities(similarity_score DESC);
"#;

/// Run schema setup inside a transaction. Idempotent.
pub fn run_migrations(conn: &mut Connection) -> Result<()> {
    let tx = conn.transaction()?;
    tx.execute_batch(SCHEMA)?;
    tx.commit()?;
    Ok(())
}

/// Check that every required table exists.
pub fn verify_tables(conn: &Connection) -> Result<bool> {
    let mut stmt =
        conn.prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")?;
    let tables: std::collections::HashSet<String> = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .filter_map(|r| r.ok())
        .collect();
    Ok(REQUIRED_TABLES.iter().all(|t| tables.contains(*t)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrations_create_all_tables() {
        let mut conn = Connection::open_in_memory().unwrap();
        run_migrations(&mut conn).unwrap();
        assert!(verify_tables(&conn).unwrap());
    }

    #[test]
    fn test_migrations_idempotent() {
        let mut conn = Connection::open_in_memory().unwrap();
        run_migrations(&mut conn).unwrap();
        run_migrations(&mut conn).unwrap();
        assert!(verify_tables(&conn).unwrap());
    }

    #[test]
    fn test_verify_tables_fails_on_empty_db() {
        let conn = Connection::open_in_memory().unwrap();
        assert!(!verify_tables(&conn).unwrap());
    }

    #[test]
    fn test_indexes_exist() {
        let mut conn = Connection::open_in_memory().unwrap();
        run_migrations(&mut conn).unwrap();
        let mut stmt = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='index' AND name LIKE 'idx_%'")
            .unwrap();
        let indexes: Vec<String> = stmt
            .query_map([], |row| row.get(0))
            .unwrap()
            .filter_map(|r| r.ok())
            .collect();
        for expected in [
            "idx_decision_timestamp",
            "idx_decision_question",
            "idx_participant_decision",
            "idx_similarity_source",
            "idx_similarity_score",
        ] {
            assert!(indexes.iter().any(|i| i == expected), "missing {expected}");
        }
    }
}
