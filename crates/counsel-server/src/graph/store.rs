// crates/counsel-server/src/graph/store.rs
// Durable single-file store for the decision graph
//
// Async connection pool over rusqlite. All writes go through a
// transaction that rolls back on error; foreign keys are enforced on
// every connection.

use super::schema;
use crate::error::{CounselError, Result};
use anyhow::Context;
use chrono::{DateTime, Utc};
use counsel_types::{DecisionNode, DecisionSimilarity, ParticipantStance};
use deadpool_sqlite::{Config, Hook, Pool, Runtime};
use rusqlite::{Connection, OptionalExtension, params};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Pooled decision graph store.
pub struct GraphStore {
    pool: Pool,
    path: Option<PathBuf>,
    /// URI for in-memory databases (shared cache keeps pool connections
    /// on the same database; used by tests).
    memory_uri: Option<String>,
}

impl GraphStore {
    /// Open (or create) the store at the given path.
    ///
    /// Initialization hardening:
    /// 1. Create the parent directory if needed.
    /// 2. Create the schema inside a transaction.
    /// 3. Verify all required tables exist and the file is non-empty.
    /// 4. On failure, close the pool and delete the file if it is zero
    ///    bytes so later launches don't trip over a corrupted artifact.
    pub async fn open(path: &Path) -> Result<Self> {
        match Self::open_internal(Some(path.to_path_buf())).await {
            Ok(store) => Ok(store),
            Err(e) => {
                cleanup_zero_byte_file(path);
                Err(CounselError::Store(format!(
                    "database initialization failed at {}: {e}",
                    path.display()
                )))
            }
        }
    }

    /// Open a pooled in-memory store (shared-cache URI) for tests.
    pub async fn open_in_memory() -> Result<Self> {
        Self::open_internal(None)
            .await
            .map_err(|e| CounselError::Store(format!("in-memory init failed: {e}")))
    }

    async fn open_internal(path: Option<PathBuf>) -> anyhow::Result<Self> {
        let (conn_str, memory_uri) = match &path {
            Some(p) => {
                ensure_parent_directory(p)?;
                (p.to_string_lossy().into_owned(), None)
            }
            None => {
                let uri = format!("file:counsel_memdb_{}?mode=memory&cache=shared", uuid::Uuid::new_v4());
                (uri.clone(), Some(uri))
            }
        };

        let cfg = Config::new(&conn_str);
        let pool = cfg
            .builder(Runtime::Tokio1)
            .context("failed to create pool builder")?
            .max_size(4)
            .post_create(make_post_create_hook())
            .build()
            .context("failed to build connection pool")?;

        let store = Self {
            pool,
            path,
            memory_uri,
        };

        store
            .interact(|conn| schema::run_migrations(conn))
            .await
            .map_err(|e| anyhow::anyhow!("{e}"))?;

        store.verify_initialization().await?;

        info!(
            path = %store
                .path
                .as_deref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| ":memory:".into()),
            "Decision graph store initialized"
        );
        Ok(store)
    }

    async fn verify_initialization(&self) -> anyhow::Result<()> {
        let ok = self
            .interact(|conn| schema::verify_tables(conn))
            .await
            .map_err(|e| anyhow::anyhow!("{e}"))?;
        if !ok {
            anyhow::bail!("schema verification failed: required tables are missing");
        }
        if let Some(path) = &self.path {
            let size = std::fs::metadata(path).map(|m| m.len()).unwrap_or(0);
            if size == 0 {
                anyhow::bail!("database file is empty (0 bytes): {}", path.display());
            }
            debug!(size, "Database file verified");
        }
        Ok(())
    }

    /// Shared-cache URI for in-memory stores (None for file-backed).
    pub fn memory_uri(&self) -> Option<&str> {
        self.memory_uri.as_deref()
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Run a closure on a pooled connection (blocking thread pool).
    pub async fn interact<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&mut Connection) -> anyhow::Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let conn = self
            .pool
            .get()
            .await
            .map_err(|e| CounselError::Store(format!("failed to get connection: {e}")))?;
        conn.interact(move |conn| f(conn))
            .await
            .map_err(|e| CounselError::Store(format!("interact failed: {e}")))?
            .map_err(|e| match e.downcast::<rusqlite::Error>() {
                Ok(db) => CounselError::Db(db),
                Err(other) => CounselError::Store(other.to_string()),
            })
    }

    // ------------------------------------------------------------------
    // Decisions
    // ------------------------------------------------------------------

    /// Insert a decision node. Fails if the id already exists.
    pub async fn save_decision(&self, node: DecisionNode) -> Result<String> {
        let id = node.id.clone();
        self.interact(move |conn| {
            let tx = conn.transaction()?;
            insert_decision(&tx, &node)?;
            tx.commit()?;
            Ok(())
        })
        .await?;
        info!(decision_id = %id, "Saved decision node");
        Ok(id)
    }

    /// Insert a decision node and all of its stances in one transaction.
    pub async fn save_decision_with_stances(
        &self,
        node: DecisionNode,
        stances: Vec<ParticipantStance>,
    ) -> Result<String> {
        let id = node.id.clone();
        self.interact(move |conn| {
            let tx = conn.transaction()?;
            insert_decision(&tx, &node)?;
            for stance in &stances {
                insert_stance(&tx, stance)?;
            }
            tx.commit()?;
            Ok(())
        })
        .await?;
        info!(decision_id = %id, "Saved decision with stances");
        Ok(id)
    }

    pub async fn get_decision(&self, id: &str) -> Result<Option<DecisionNode>> {
        let id = id.to_string();
        self.interact(move |conn| {
            conn.query_row(
                "SELECT id, question, timestamp, consensus, winning_option,
                        convergence_status, participants, transcript_path, metadata
                 FROM decision_nodes WHERE id = ?1",
                [&id],
                row_to_decision,
            )
            .optional()
            .map_err(Into::into)
        })
        .await
    }

    /// List decisions newest-first.
    pub async fn list_decisions(&self, limit: usize, offset: usize) -> Result<Vec<DecisionNode>> {
        self.interact(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, question, timestamp, consensus, winning_option,
                        convergence_status, participants, transcript_path, metadata
                 FROM decision_nodes
                 ORDER BY timestamp DESC
                 LIMIT ?1 OFFSET ?2",
            )?;
            let nodes = stmt
                .query_map(params![limit as i64, offset as i64], row_to_decision)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(nodes)
        })
        .await
    }

    pub async fn count_decisions(&self) -> Result<usize> {
        self.interact(|conn| {
            let count: i64 = conn.query_row("SELECT COUNT(*) FROM decision_nodes", [], |r| r.get(0))?;
            Ok(count as usize)
        })
        .await
    }

    // ------------------------------------------------------------------
    // Stances
    // ------------------------------------------------------------------

    /// Insert a stance; returns the row id. Rejects unknown decision ids
    /// (foreign keys are enforced).
    pub async fn save_stance(&self, stance: ParticipantStance) -> Result<i64> {
        self.interact(move |conn| {
            let tx = conn.transaction()?;
            let row_id = insert_stance(&tx, &stance)?;
            tx.commit()?;
            Ok(row_id)
        })
        .await
    }

    /// All stances for a decision, ordered by participant.
    pub async fn get_stances(&self, decision_id: &str) -> Result<Vec<ParticipantStance>> {
        let decision_id = decision_id.to_string();
        self.interact(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT decision_id, participant, vote_option, confidence, rationale, final_position
                 FROM participant_stances
                 WHERE decision_id = ?1
                 ORDER BY participant",
            )?;
            let stances = stmt
                .query_map([&decision_id], row_to_stance)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(stances)
        })
        .await
    }

    // ------------------------------------------------------------------
    // Similarities
    // ------------------------------------------------------------------

    /// Upsert a similarity edge on (source, target). The score is
    /// clamped to [0, 1] at this boundary regardless of caller.
    pub async fn save_similarity(&self, edge: DecisionSimilarity) -> Result<()> {
        self.interact(move |conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT OR REPLACE INTO decision_similarities
                     (source_id, target_id, similarity_score, computed_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    edge.source_id,
                    edge.target_id,
                    edge.similarity_score.clamp(0.0, 1.0),
                    edge.computed_at.to_rfc3339(),
                ],
            )?;
            tx.commit()?;
            Ok(())
        })
        .await
    }

    /// Decisions similar to the given one, above threshold, ordered by
    /// score descending.
    pub async fn get_similar(
        &self,
        decision_id: &str,
        threshold: f64,
        limit: usize,
    ) -> Result<Vec<(DecisionNode, f64)>> {
        let decision_id = decision_id.to_string();
        self.interact(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT dn.id, dn.question, dn.timestamp, dn.consensus, dn.winning_option,
                        dn.convergence_status, dn.participants, dn.transcript_path, dn.metadata,
                        ds.similarity_score
                 FROM decision_similarities ds
                 JOIN decision_nodes dn ON ds.target_id = dn.id
                 WHERE ds.source_id = ?1 AND ds.similarity_score >= ?2
                 ORDER BY ds.similarity_score DESC
                 LIMIT ?3",
            )?;
            let results = stmt
                .query_map(params![decision_id, threshold, limit as i64], |row| {
                    let node = row_to_decision(row)?;
                    let score: f64 = row.get(9)?;
                    Ok((node, score))
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(results)
        })
        .await
    }
}

fn insert_decision(conn: &Connection, node: &DecisionNode) -> anyhow::Result<()> {
    let metadata = if node.metadata.is_empty() {
        None
    } else {
        Some(serde_json::to_string(&node.metadata)?)
    };
    conn.execute(
        "INSERT INTO decision_nodes
             (id, question, timestamp, consensus, winning_option,
              convergence_status, participants, transcript_path, metadata)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            node.id,
            node.question,
            node.timestamp.to_rfc3339(),
            node.consensus,
            node.winning_option,
            node.convergence_status,
            serde_json::to_string(&node.participants)?,
            node.transcript_path,
            metadata,
        ],
    )?;
    Ok(())
}

fn insert_stance(conn: &Connection, stance: &ParticipantStance) -> anyhow::Result<i64> {
    conn.execute(
        "INSERT INTO participant_stances
             (decision_id, participant, vote_option, confidence, rationale, final_position)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            stance.decision_id,
            stance.participant,
            stance.vote_option,
            stance.confidence.map(|c| c.clamp(0.0, 1.0)),
            stance.rationale,
            stance.final_position,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

fn row_to_decision(row: &rusqlite::Row<'_>) -> rusqlite::Result<DecisionNode> {
    let timestamp: String = row.get(2)?;
    let participants: String = row.get(6)?;
    let metadata: Option<String> = row.get(8)?;
    Ok(DecisionNode {
        id: row.get(0)?,
        question: row.get(1)?,
        timestamp: DateTime::parse_from_rfc3339(&timestamp)
            .map(|t| t.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
        consensus: row.get(3)?,
        winning_option: row.get(4)?,
        convergence_status: row.get(5)?,
        participants: serde_json::from_str(&participants).unwrap_or_default(),
        transcript_path: row.get(7)?,
        metadata: metadata
            .and_then(|m| serde_json::from_str(&m).ok())
            .unwrap_or_default(),
    })
}

fn row_to_stance(row: &rusqlite::Row<'_>) -> rusqlite::Result<ParticipantStance> {
    Ok(ParticipantStance {
        decision_id: row.get(0)?,
        participant: row.get(1)?,
        vote_option: row.get(2)?,
        confidence: row.get(3)?,
        rationale: row.get(4)?,
        final_position: row.get(5)?,
    })
}

/// Configure every pooled connection: WAL (file-backed), foreign keys,
/// busy timeout.
fn make_post_create_hook() -> Hook {
    Hook::async_fn(|conn, _metrics| {
        Box::pin(async move {
            conn.interact(|conn| {
                conn.execute_batch(
                    "PRAGMA journal_mode=WAL; \
                     PRAGMA foreign_keys=ON; \
                     PRAGMA busy_timeout=5000; \
                     PRAGMA synchronous=NORMAL;",
                )?;
                Ok::<_, rusqlite::Error>(())
            })
            .await
            .map_err(|e| deadpool_sqlite::HookError::Message(format!("interact failed: {e}").into()))?
            .map_err(|e| {
                deadpool_sqlite::HookError::Message(format!("connection setup failed: {e}").into())
            })
        })
    })
}

fn ensure_parent_directory(path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
    }
    Ok(())
}

/// Remove a corrupted zero-byte database file. Non-empty files are left
/// alone.
fn cleanup_zero_byte_file(path: &Path) {
    if let Ok(metadata) = std::fs::metadata(path) {
        if metadata.len() == 0 {
            warn!(path = %path.display(), "Removing corrupted 0-byte database file");
            if let Err(e) = std::fs::remove_file(path) {
                warn!("Failed to remove corrupted file: {e}");
            }
        }
    }
}
