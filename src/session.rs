//! Planning session state and persistence interface
//!
//! A `PlanningSession` is plain serializable data. Phase changes happen only
//! through `planner::transition`; the engine saves the session to a
//! `SessionStore` after every committed transition so an interrupted interview
//! resumes from its last committed phase.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc, Weekday};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::analysis::WeeklySignal;
use crate::constraints::ConstraintSet;
use crate::error::PlanError;
use crate::models::{AthleteProfile, Biofeedback, DayPlan, DraftPlan};
use crate::planner::Phase;
use crate::verifier::VerificationReport;

/// ---------------------------------------------------------------------------
/// Session Types
/// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QaPair {
  pub question: String,
  pub answer: String,
}

/// Audit entry for one accepted event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionRecord {
  pub from: Phase,
  pub to: Phase,
  pub at: DateTime<Utc>,
  pub trigger: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanningSession {
  pub id: Uuid,
  pub phase: Phase,

  pub profile: Option<AthleteProfile>,
  pub biofeedback: Option<Biofeedback>,
  pub signal: Option<WeeklySignal>,

  /// Derived on entry to Analysis and re-derived whenever profile or signal change
  pub constraints: Option<ConstraintSet>,

  /// Latest strategy proposal; accepted once the session reaches Drafting
  pub strategy: Option<String>,

  /// Athlete answers, oldest first
  pub answers: Vec<QaPair>,

  pub draft: Option<DraftPlan>,
  pub report: Option<VerificationReport>,

  /// Failed verifications so far
  pub repair_cycles: u32,

  pub transitions: Vec<TransitionRecord>,

  /// Bumped by every committed transition; stores compare it before replacing
  #[serde(default)]
  pub revision: u64,

  pub created_at: DateTime<Utc>,
  pub last_input_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

impl PlanningSession {
  pub fn new(at: DateTime<Utc>) -> Self {
    Self {
      id: Uuid::new_v4(),
      phase: Phase::Intake,
      profile: None,
      biofeedback: None,
      signal: None,
      constraints: None,
      strategy: None,
      answers: Vec::new(),
      draft: None,
      report: None,
      repair_cycles: 0,
      transitions: Vec::new(),
      revision: 0,
      created_at: at,
      last_input_at: at,
      updated_at: at,
    }
  }

  pub fn is_terminal(&self) -> bool {
    self.phase.is_terminal()
  }

  /// Open and without athlete input for longer than `idle_timeout`
  pub fn is_idle(&self, now: DateTime<Utc>, idle_timeout: chrono::Duration) -> bool {
    !self.is_terminal() && now - self.last_input_at > idle_timeout
  }

  /// Error for a commit built on an older copy of this stored session
  pub fn stale_commit_error(&self) -> PlanError {
    if self.is_terminal() {
      PlanError::SessionClosed(self.phase)
    } else {
      PlanError::SessionConflict(self.id)
    }
  }

  /// Read-only artifact for a Finalized or BestEffort session
  pub fn final_plan(&self) -> Result<FinalPlan, PlanError> {
    let outcome = match self.phase {
      Phase::Finalized => PlanOutcome::Verified,
      Phase::BestEffort => PlanOutcome::BestEffort,
      other => return Err(PlanError::NoPlanAvailable(other)),
    };

    let (Some(draft), Some(report)) = (&self.draft, &self.report) else {
      return Err(PlanError::NoPlanAvailable(self.phase));
    };

    // Finalized always carries a passing report
    if outcome == PlanOutcome::Verified && !report.overall_pass {
      return Err(PlanError::NoPlanAvailable(self.phase));
    }

    Ok(FinalPlan {
      session_id: self.id,
      outcome,
      days: draft.days().to_vec(),
      flagged_days: report.failing_days(),
      report: report.clone(),
    })
  }
}

/// ---------------------------------------------------------------------------
/// Output Artifact
/// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanOutcome {
  Verified,
  /// Repair retries exhausted; failing days are flagged
  BestEffort,
}

/// Finalized or best-effort plan handed to the presentation layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalPlan {
  pub session_id: Uuid,
  pub outcome: PlanOutcome,
  pub days: Vec<DayPlan>,
  pub report: VerificationReport,
  /// Days outside tolerance; always empty for a verified plan
  pub flagged_days: Vec<Weekday>,
}

impl FinalPlan {
  pub fn is_verified(&self) -> bool {
    self.outcome == PlanOutcome::Verified
  }

  pub fn to_json(&self) -> Result<String, PlanError> {
    Ok(serde_json::to_string_pretty(self)?)
  }
}

/// ---------------------------------------------------------------------------
/// Session Store
/// ---------------------------------------------------------------------------

#[async_trait]
pub trait SessionStore: Send + Sync {
  /// Insert or replace the snapshot for `session.id`
  async fn save(&self, session: &PlanningSession) -> Result<(), PlanError>;

  /// Replace the snapshot only if the stored revision is still `expected_revision`
  ///
  /// Fails with `SessionClosed` when the stored session has reached a terminal
  /// phase in the meantime, `SessionConflict` when it has otherwise moved on.
  async fn save_if_current(&self, session: &PlanningSession, expected_revision: u64) -> Result<(), PlanError>;

  async fn load(&self, id: Uuid) -> Result<PlanningSession, PlanError>;

  /// Sessions not yet in a terminal phase
  async fn list_open(&self) -> Result<Vec<PlanningSession>, PlanError>;
}

/// In-process store for tests and embedding
#[derive(Default)]
pub struct MemorySessionStore {
  sessions: Mutex<HashMap<Uuid, PlanningSession>>,
}

impl MemorySessionStore {
  pub fn new() -> Self {
    Self::default()
  }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
  async fn save(&self, session: &PlanningSession) -> Result<(), PlanError> {
    self.sessions.lock().await.insert(session.id, session.clone());
    Ok(())
  }

  async fn save_if_current(&self, session: &PlanningSession, expected_revision: u64) -> Result<(), PlanError> {
    let mut sessions = self.sessions.lock().await;
    let stored = sessions.get(&session.id).ok_or(PlanError::SessionNotFound(session.id))?;
    if stored.revision != expected_revision {
      return Err(stored.stale_commit_error());
    }
    sessions.insert(session.id, session.clone());
    Ok(())
  }

  async fn load(&self, id: Uuid) -> Result<PlanningSession, PlanError> {
    self
      .sessions
      .lock()
      .await
      .get(&id)
      .cloned()
      .ok_or(PlanError::SessionNotFound(id))
  }

  async fn list_open(&self) -> Result<Vec<PlanningSession>, PlanError> {
    let mut open: Vec<PlanningSession> = self
      .sessions
      .lock()
      .await
      .values()
      .filter(|s| !s.is_terminal())
      .cloned()
      .collect();
    open.sort_by_key(|s| s.updated_at);
    Ok(open)
  }
}
