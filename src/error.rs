//! Error taxonomy for the planning engine
//!
//! Verification failures are not errors: an out-of-tolerance plan is a
//! `VerificationReport` with `overall_pass == false` and drives the repair cycle.

use chrono::NaiveDate;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

use crate::planner::Phase;

#[derive(Debug, Error)]
pub enum PlanError {
  /// Fewer than two distinct days of data inside the aggregation window
  #[error("Insufficient data: {distinct_days} distinct day(s) in window, need at least 2 (re-export more history)")]
  InsufficientData { distinct_days: usize },

  /// Profile targets contradict each other; never relaxed silently
  #[error("Infeasible profile: {0}")]
  InfeasibleProfile(String),

  /// Reasoning output could not be parsed into a 7-day plan
  #[error("Malformed plan: {0}")]
  MalformedPlan(String),

  #[error("Reasoning call timed out after {attempts} attempt(s) ({timeout:?} each)")]
  ReasoningTimeout { attempts: u32, timeout: Duration },

  #[error("Reasoning failed: {0}")]
  Reasoning(String),

  #[error("Unsupported format: {0}")]
  UnsupportedFormat(String),

  #[error("Invalid input: {0}")]
  InvalidInput(String),

  #[error("Weekly signal ending {window_end} is older than {max_age_days} days")]
  StaleSignal { window_end: NaiveDate, max_age_days: i64 },

  #[error("Event '{event}' is not valid in phase {phase}")]
  InvalidTransition { phase: Phase, event: &'static str },

  #[error("Session is closed ({0})")]
  SessionClosed(Phase),

  /// The stored session moved on while this caller was working from an older copy
  #[error("Session {0} was changed concurrently")]
  SessionConflict(Uuid),

  #[error("Session not found: {0}")]
  SessionNotFound(Uuid),

  #[error("No plan available in phase {0}")]
  NoPlanAvailable(Phase),

  #[error("Storage error: {0}")]
  Storage(String),

  #[error("Configuration error: {0}")]
  Config(String),
}

impl PlanError {
  /// Recoverable errors are retried locally before surfacing
  pub fn is_recoverable(&self) -> bool {
    matches!(
      self,
      PlanError::MalformedPlan(_) | PlanError::ReasoningTimeout { .. } | PlanError::Reasoning(_)
    )
  }
}

impl From<sqlx::Error> for PlanError {
  fn from(e: sqlx::Error) -> Self {
    PlanError::Storage(e.to_string())
  }
}

impl From<serde_json::Error> for PlanError {
  fn from(e: serde_json::Error) -> Self {
    PlanError::Storage(format!("snapshot encoding: {}", e))
  }
}

impl Serialize for PlanError {
  fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
  where
    S: serde::Serializer,
  {
    serializer.serialize_str(&self.to_string())
  }
}
