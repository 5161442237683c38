//! Planning engine
//!
//! Drives one session at a time through the transition table. Every accepted
//! event is saved before the next step starts, and reasoning calls are the
//! only suspension points between saves. Dropping a future mid-call therefore
//! leaves the stored session at its last committed phase.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::parse::{parse_draft, parse_strategy};
use super::state::{transition, Effect, Event, StrategyReview, Transition};
use super::Phase;
use crate::analysis::WeeklySignal;
use crate::config::PlannerConfig;
use crate::error::PlanError;
use crate::models::{AthleteProfile, Biofeedback};
use crate::reasoning::{PromptContext, RawResponse, ReasoningError, ReasoningPort};
use crate::session::{FinalPlan, PlanningSession, QaPair, SessionStore};
use crate::verifier::verify;

pub struct PlanningEngine<R, S> {
  reasoner: R,
  store: S,
  config: PlannerConfig,
}

impl<R: ReasoningPort, S: SessionStore> PlanningEngine<R, S> {
  pub fn new(reasoner: R, store: S, config: PlannerConfig) -> Self {
    Self {
      reasoner,
      store,
      config,
    }
  }

  pub fn config(&self) -> &PlannerConfig {
    &self.config
  }

  pub fn reasoner(&self) -> &R {
    &self.reasoner
  }

  pub fn store(&self) -> &S {
    &self.store
  }

  // ---------------------------------------------------------------------------
  // Athlete-facing operations
  // ---------------------------------------------------------------------------

  /// Create and persist a new session in Intake
  pub async fn start(&self) -> Result<PlanningSession, PlanError> {
    let session = PlanningSession::new(Utc::now());
    self.store.save(&session).await?;
    info!(session_id = %session.id, "start: session created");
    Ok(session)
  }

  pub async fn session(&self, id: Uuid) -> Result<PlanningSession, PlanError> {
    self.store.load(id).await
  }

  pub async fn submit_intake(
    &self,
    id: Uuid,
    profile: AthleteProfile,
    biofeedback: Biofeedback,
  ) -> Result<PlanningSession, PlanError> {
    self
      .athlete_event(id, Event::IntakeSubmitted { profile, biofeedback })
      .await
  }

  /// Attach the weekly signal. Once the profile is also present this derives
  /// the constraint set and requests a strategy proposal.
  pub async fn attach_signal(&self, id: Uuid, signal: WeeklySignal) -> Result<PlanningSession, PlanError> {
    self.athlete_event(id, Event::SignalAttached(signal)).await
  }

  pub async fn record_answer(
    &self,
    id: Uuid,
    question: impl Into<String>,
    answer: impl Into<String>,
  ) -> Result<PlanningSession, PlanError> {
    let qa = QaPair {
      question: question.into(),
      answer: answer.into(),
    };
    self.athlete_event(id, Event::AnswerRecorded(qa)).await
  }

  /// Accept or amend the strategy, then draft, verify and repair until the
  /// session is Finalized or BestEffort
  pub async fn review_strategy(&self, id: Uuid, review: StrategyReview) -> Result<PlanningSession, PlanError> {
    self.athlete_event(id, Event::StrategyReviewed(review)).await
  }

  pub async fn cancel(&self, id: Uuid) -> Result<PlanningSession, PlanError> {
    let session = self.store.load(id).await?;
    let (session, _) = self.apply(&session, Event::Cancel, Utc::now()).await?;
    Ok(session)
  }

  /// Re-issue the pending step of the last committed phase
  ///
  /// Constraints derived under a different targets config are recomputed
  /// first, so the pending step works against this engine's targets.
  pub async fn resume(&self, id: Uuid) -> Result<PlanningSession, PlanError> {
    let mut session = self.open_session(id).await?;

    if self.constraints_outdated(&session) {
      info!(session_id = %id, "resume: constraints out of date, re-deriving");
      session = self.apply(&session, Event::ConstraintsRefreshed, Utc::now()).await?.0;
    }

    let effects = match session.phase {
      Phase::Analysis if session.strategy.is_none() => vec![Effect::RequestStrategy],
      Phase::Drafting => vec![Effect::RequestDraft],
      Phase::Verifying => vec![Effect::Verify],
      _ => vec![],
    };
    info!(session_id = %id, phase = %session.phase, pending = ?effects, "resume: session resumed");

    self.run_effects(session, effects).await
  }

  /// Abandon every open session idle for longer than the configured timeout
  pub async fn sweep_idle(&self, now: DateTime<Utc>) -> Result<Vec<Uuid>, PlanError> {
    let mut abandoned = Vec::new();
    for session in self.store.list_open().await? {
      if !session.is_idle(now, self.config.idle_timeout) {
        continue;
      }
      match self.apply(&session, Event::IdleTimeout, now).await {
        Ok(_) => abandoned.push(session.id),
        // Closed or touched since it was listed
        Err(PlanError::SessionClosed(_) | PlanError::SessionConflict(_)) => {
          debug!(session_id = %session.id, "sweep_idle: session changed, skipped");
        }
        Err(e) => return Err(e),
      }
    }
    debug!(count = abandoned.len(), "sweep_idle: done");
    Ok(abandoned)
  }

  /// The verified or best-effort plan of a closed session
  pub async fn final_plan(&self, id: Uuid) -> Result<FinalPlan, PlanError> {
    self.store.load(id).await?.final_plan()
  }

  // ---------------------------------------------------------------------------
  // Driving
  // ---------------------------------------------------------------------------

  async fn athlete_event(&self, id: Uuid, event: Event) -> Result<PlanningSession, PlanError> {
    let session = self.open_session(id).await?;
    let (session, effects) = self.apply(&session, event, Utc::now()).await?;
    self.run_effects(session, effects).await
  }

  /// Load a session that can still accept input, abandoning it if idle
  async fn open_session(&self, id: Uuid) -> Result<PlanningSession, PlanError> {
    let session = self.store.load(id).await?;
    if session.is_terminal() {
      return Err(PlanError::SessionClosed(session.phase));
    }

    let now = Utc::now();
    if session.is_idle(now, self.config.idle_timeout) {
      self.apply(&session, Event::IdleTimeout, now).await?;
      return Err(PlanError::SessionClosed(Phase::Abandoned));
    }
    Ok(session)
  }

  fn constraints_outdated(&self, session: &PlanningSession) -> bool {
    match (&session.constraints, &session.profile, &session.signal) {
      (Some(set), Some(profile), Some(signal)) => !set.is_consistent_with(profile, signal, &self.config.targets),
      _ => false,
    }
  }

  /// Run the transition table and commit the result
  ///
  /// The commit only lands if the stored session is still the one the event
  /// was applied to. An event committed by another caller in the meantime,
  /// such as a cancel during a reasoning call, wins.
  async fn apply(
    &self,
    session: &PlanningSession,
    event: Event,
    at: DateTime<Utc>,
  ) -> Result<(PlanningSession, Vec<Effect>), PlanError> {
    let Transition { session: next, effects } = transition(session, event, at, &self.config)?;
    self.store.save_if_current(&next, session.revision).await?;

    if let Some(record) = next.transitions.last() {
      info!(
        session_id = %next.id,
        from = %record.from,
        to = %record.to,
        trigger = %record.trigger,
        at = %record.at,
        "apply: transition committed"
      );
    }

    Ok((next, effects))
  }

  async fn run_effects(&self, mut session: PlanningSession, effects: Vec<Effect>) -> Result<PlanningSession, PlanError> {
    let mut pending: VecDeque<Effect> = effects.into();

    while let Some(effect) = pending.pop_front() {
      let event = match effect {
        Effect::RequestStrategy => match self.ask(&session, parse_strategy).await {
          Ok(text) => Event::StrategyProposed(text),
          Err(e) if e.is_recoverable() => Event::ReasoningExhausted(e),
          Err(e) => return Err(e),
        },
        Effect::RequestDraft => match self.ask(&session, parse_draft).await {
          Ok(plan) => Event::DraftProposed(plan),
          Err(e) if e.is_recoverable() => Event::ReasoningExhausted(e),
          Err(e) => return Err(e),
        },
        Effect::Verify => {
          let (Some(draft), Some(constraints)) = (&session.draft, &session.constraints) else {
            return Err(PlanError::NoPlanAvailable(session.phase));
          };
          Event::Verified(verify(draft, constraints))
        }
      };

      let (next, more) = self.apply(&session, event, Utc::now()).await?;
      session = next;
      pending.extend(more);
    }

    Ok(session)
  }

  /// One reasoning step with bounded retries
  ///
  /// Timeouts and provider outages are retried as-is; unparsable output is
  /// retried with a clarification appended to the prompt. A rejected request
  /// is not retried.
  async fn ask<T>(
    &self,
    session: &PlanningSession,
    parse: fn(&RawResponse) -> Result<T, PlanError>,
  ) -> Result<T, PlanError> {
    let attempts = self.config.max_reasoning_attempts.max(1);
    let timeout = self.config.reasoning_timeout;
    let mut clarification: Option<String> = None;
    let mut last_err = PlanError::Reasoning("no attempt made".to_string());

    for attempt in 1..=attempts {
      let ctx = PromptContext::for_session(session, clarification.clone())?;

      let err = match tokio::time::timeout(timeout, self.reasoner.propose(&ctx)).await {
        Ok(Ok(raw)) => match parse(&raw) {
          Ok(value) => {
            debug!(session_id = %session.id, phase = %session.phase, attempt, "ask: response accepted");
            return Ok(value);
          }
          Err(e) => {
            clarification = Some(format!(
              "Your previous reply could not be used: {}. Follow the required output format exactly.",
              e
            ));
            e
          }
        },
        Ok(Err(ReasoningError::Timeout(after))) => PlanError::ReasoningTimeout {
          attempts: attempt,
          timeout: after,
        },
        Ok(Err(e)) if e.is_retryable() => PlanError::Reasoning(e.to_string()),
        Ok(Err(e)) => return Err(PlanError::Reasoning(e.to_string())),
        Err(_) => PlanError::ReasoningTimeout {
          attempts: attempt,
          timeout,
        },
      };

      warn!(
        session_id = %session.id,
        phase = %session.phase,
        attempt,
        attempts,
        error = %err,
        "ask: reasoning attempt failed"
      );
      last_err = err;
    }

    Err(last_err)
  }
}

/// ---------------------------------------------------------------------------
/// Tests
/// ---------------------------------------------------------------------------
