//! Reasoning capability used by the planning engine
//!
//! The engine never talks to a provider directly. It hands a `PromptContext`
//! to a `ReasoningPort` and parses whatever comes back defensively. Tests
//! substitute a scripted implementation; production wires in `llm::ClaudeReasoner`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::analysis::WeeklySignal;
use crate::constraints::ConstraintSet;
use crate::error::PlanError;
use crate::models::{AthleteProfile, Biofeedback};
use crate::planner::Phase;
use crate::session::{PlanningSession, QaPair};
use crate::verifier::VerificationReport;

/// ---------------------------------------------------------------------------
/// Port Types
/// ---------------------------------------------------------------------------

/// Free text (strategy proposals) or a structured candidate plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "body", rename_all = "snake_case")]
pub enum RawResponse {
  Text(String),
  Structured(serde_json::Value),
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ReasoningError {
  #[error("reasoning call timed out after {0:?}")]
  Timeout(Duration),

  /// Transport failure, rate limit or provider outage
  #[error("reasoning provider unavailable: {0}")]
  Unavailable(String),

  /// The provider refused the request (bad key, invalid request)
  #[error("reasoning provider rejected the request: {0}")]
  Rejected(String),
}

impl ReasoningError {
  pub fn is_retryable(&self) -> bool {
    matches!(self, ReasoningError::Timeout(_) | ReasoningError::Unavailable(_))
  }
}

/// Everything a provider needs to answer one planning step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptContext {
  pub session_id: Uuid,
  pub phase: Phase,
  pub profile: AthleteProfile,
  pub biofeedback: Biofeedback,
  pub signal: WeeklySignal,
  pub constraints: ConstraintSet,

  /// Prior Q&A, oldest first
  pub answers: Vec<QaPair>,

  /// Accepted strategy (Drafting only)
  pub strategy: Option<String>,

  /// Corrective context from the previous failed verification
  pub last_report: Option<VerificationReport>,

  /// Set when the previous response in this phase could not be parsed
  pub clarification: Option<String>,
}

impl PromptContext {
  /// Snapshot the parts of a session a prompt needs
  pub fn for_session(session: &PlanningSession, clarification: Option<String>) -> Result<Self, PlanError> {
    let missing = |what: &str| PlanError::InvalidInput(format!("session {} has no {} yet", session.id, what));

    Ok(Self {
      session_id: session.id,
      phase: session.phase,
      profile: session.profile.clone().ok_or_else(|| missing("profile"))?,
      biofeedback: session.biofeedback.clone().unwrap_or_default(),
      signal: session.signal.clone().ok_or_else(|| missing("weekly signal"))?,
      constraints: session.constraints.clone().ok_or_else(|| missing("constraint set"))?,
      answers: session.answers.clone(),
      strategy: session.strategy.clone(),
      last_report: session.report.clone().filter(|r| !r.overall_pass),
      clarification,
    })
  }
}

/// ---------------------------------------------------------------------------
/// Port
/// ---------------------------------------------------------------------------

#[async_trait]
pub trait ReasoningPort: Send + Sync {
  async fn propose(&self, ctx: &PromptContext) -> Result<RawResponse, ReasoningError>;
}

#[async_trait]
impl<T: ReasoningPort + ?Sized> ReasoningPort for Arc<T> {
  async fn propose(&self, ctx: &PromptContext) -> Result<RawResponse, ReasoningError> {
    (**self).propose(ctx).await
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::models::GoalType;
  use crate::test_utils::{mock_profile, mock_signal};
  use chrono::Utc;

  #[test]
  fn test_retryable_split() {
    assert!(ReasoningError::Timeout(Duration::from_secs(1)).is_retryable());
    assert!(ReasoningError::Unavailable("529".into()).is_retryable());
    assert!(!ReasoningError::Rejected("bad key".into()).is_retryable());
  }

  #[test]
  fn test_context_requires_derived_state() {
    let mut session = PlanningSession::new(Utc::now());
    session.profile = Some(mock_profile(70.0, GoalType::Build));
    session.signal = Some(mock_signal(300.0, 0.9));

    let err = PromptContext::for_session(&session, None).unwrap_err();
    assert!(err.to_string().contains("constraint set"));
  }

  #[test]
  fn test_raw_response_tagging() {
    let json = serde_json::to_string(&RawResponse::Text("Hold volume".into())).unwrap();
    assert_eq!(json, r#"{"kind":"text","body":"Hold volume"}"#);
  }
}
