use std::str::FromStr;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::PlanError;
use crate::session::{PlanningSession, SessionStore};

pub type DbPool = SqlitePool;

/// Initialize the database connection pool and run migrations
///
/// `db_url` is any SQLite URL, e.g. `sqlite://peakform.db` or `sqlite::memory:`.
/// The database file is created if it does not exist.
pub async fn initialize_db(db_url: &str) -> Result<DbPool, PlanError> {
  let options = SqliteConnectOptions::from_str(db_url)?.create_if_missing(true);

  info!(db_url, "initialize_db: connecting");

  let pool = SqlitePoolOptions::new()
    .max_connections(5)
    .connect_with(options)
    .await?;

  sqlx::migrate!("./migrations")
    .run(&pool)
    .await
    .map_err(|e| PlanError::Storage(format!("migration failed: {}", e)))?;

  info!("initialize_db: database ready");

  Ok(pool)
}

/// ---------------------------------------------------------------------------
/// SQLite Session Store
/// ---------------------------------------------------------------------------

/// Sessions persisted as JSON snapshots, one row per session
pub struct SqliteSessionStore {
  pool: DbPool,
}

impl SqliteSessionStore {
  pub fn new(pool: DbPool) -> Self {
    Self { pool }
  }

  pub fn pool(&self) -> &DbPool {
    &self.pool
  }
}

#[async_trait]
impl SessionStore for SqliteSessionStore {
  async fn save(&self, session: &PlanningSession) -> Result<(), PlanError> {
    let snapshot = serde_json::to_string(session)?;

    sqlx::query(
      r#"
      INSERT INTO planning_sessions (id, phase, revision, snapshot_json, created_at, last_input_at, updated_at)
      VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
      ON CONFLICT(id) DO UPDATE SET
        phase = excluded.phase,
        revision = excluded.revision,
        snapshot_json = excluded.snapshot_json,
        last_input_at = excluded.last_input_at,
        updated_at = excluded.updated_at
      "#,
    )
    .bind(session.id.to_string())
    .bind(session.phase.as_str())
    .bind(session.revision as i64)
    .bind(&snapshot)
    .bind(session.created_at)
    .bind(session.last_input_at)
    .bind(session.updated_at)
    .execute(&self.pool)
    .await?;

    debug!(session_id = %session.id, phase = %session.phase, "save: snapshot written");
    Ok(())
  }

  async fn save_if_current(&self, session: &PlanningSession, expected_revision: u64) -> Result<(), PlanError> {
    let snapshot = serde_json::to_string(session)?;

    let result = sqlx::query(
      r#"
      UPDATE planning_sessions SET
        phase = ?2,
        revision = ?3,
        snapshot_json = ?4,
        last_input_at = ?5,
        updated_at = ?6
      WHERE id = ?1 AND revision = ?7
      "#,
    )
    .bind(session.id.to_string())
    .bind(session.phase.as_str())
    .bind(session.revision as i64)
    .bind(&snapshot)
    .bind(session.last_input_at)
    .bind(session.updated_at)
    .bind(expected_revision as i64)
    .execute(&self.pool)
    .await?;

    if result.rows_affected() == 0 {
      let stored = self.load(session.id).await?;
      debug!(
        session_id = %session.id,
        expected_revision,
        stored_revision = stored.revision,
        "save_if_current: stale commit rejected"
      );
      return Err(stored.stale_commit_error());
    }

    debug!(
      session_id = %session.id,
      phase = %session.phase,
      revision = session.revision,
      "save_if_current: snapshot written"
    );
    Ok(())
  }

  async fn load(&self, id: Uuid) -> Result<PlanningSession, PlanError> {
    let snapshot: Option<String> = sqlx::query_scalar("SELECT snapshot_json FROM planning_sessions WHERE id = ?1")
      .bind(id.to_string())
      .fetch_optional(&self.pool)
      .await?;

    let snapshot = snapshot.ok_or(PlanError::SessionNotFound(id))?;
    Ok(serde_json::from_str(&snapshot)?)
  }

  async fn list_open(&self) -> Result<Vec<PlanningSession>, PlanError> {
    let snapshots: Vec<String> = sqlx::query_scalar(
      r#"
      SELECT snapshot_json FROM planning_sessions
      WHERE phase NOT IN ('finalized', 'best_effort', 'abandoned')
      ORDER BY updated_at
      "#,
    )
    .fetch_all(&self.pool)
    .await?;

    snapshots
      .iter()
      .map(|s| serde_json::from_str(s).map_err(PlanError::from))
      .collect()
  }
}
