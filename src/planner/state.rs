//! Transition table
//!
//! `transition` is a pure function of (session, event) returning the next
//! session value plus the side effects the engine must perform. The input
//! session is never touched, so a rejected event leaves nothing behind.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Phase;
use crate::analysis::WeeklySignal;
use crate::config::PlannerConfig;
use crate::constraints::derive_targets;
use crate::error::PlanError;
use crate::models::{AthleteProfile, Biofeedback, DraftPlan};
use crate::session::{PlanningSession, QaPair, TransitionRecord};
use crate::verifier::VerificationReport;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyReview {
  Accept,
  /// One round of free-text feedback, replayed into the draft prompt
  Amend(String),
}

#[derive(Debug)]
pub enum Event {
  IntakeSubmitted {
    profile: AthleteProfile,
    biofeedback: Biofeedback,
  },
  SignalAttached(WeeklySignal),
  AnswerRecorded(QaPair),
  StrategyProposed(String),
  StrategyReviewed(StrategyReview),
  DraftProposed(DraftPlan),
  Verified(VerificationReport),
  /// Reasoning retries used up; carries the last error
  ReasoningExhausted(PlanError),
  /// Stored constraints no longer match the current targets config
  ConstraintsRefreshed,
  IdleTimeout,
  Cancel,
}

impl Event {
  pub fn name(&self) -> &'static str {
    match self {
      Event::IntakeSubmitted { .. } => "intake_submitted",
      Event::SignalAttached(_) => "signal_attached",
      Event::AnswerRecorded(_) => "answer_recorded",
      Event::StrategyProposed(_) => "strategy_proposed",
      Event::StrategyReviewed(_) => "strategy_reviewed",
      Event::DraftProposed(_) => "draft_proposed",
      Event::Verified(_) => "verified",
      Event::ReasoningExhausted(_) => "reasoning_exhausted",
      Event::ConstraintsRefreshed => "constraints_refreshed",
      Event::IdleTimeout => "idle_timeout",
      Event::Cancel => "cancel",
    }
  }

  /// Events that count as athlete activity for the idle timeout
  pub fn is_athlete_input(&self) -> bool {
    matches!(
      self,
      Event::IntakeSubmitted { .. }
        | Event::SignalAttached(_)
        | Event::AnswerRecorded(_)
        | Event::StrategyReviewed(_)
        | Event::Cancel
    )
  }
}

/// Work the engine performs after committing a transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
  RequestStrategy,
  RequestDraft,
  Verify,
}

#[derive(Debug)]
pub struct Transition {
  pub session: PlanningSession,
  pub effects: Vec<Effect>,
}

/// Apply `event` to a copy of `session`
pub fn transition(
  session: &PlanningSession,
  event: Event,
  at: DateTime<Utc>,
  config: &PlannerConfig,
) -> Result<Transition, PlanError> {
  if session.is_terminal() {
    return Err(PlanError::SessionClosed(session.phase));
  }

  let from = session.phase;
  let trigger = event.name();
  let athlete_input = event.is_athlete_input();

  let mut next = session.clone();
  let effects = apply(&mut next, event, at, config)?;

  next.revision = session.revision + 1;
  next.updated_at = at;
  if athlete_input {
    next.last_input_at = at;
  }
  next.transitions.push(TransitionRecord {
    from,
    to: next.phase,
    at,
    trigger: trigger.to_string(),
  });

  Ok(Transition { session: next, effects })
}

fn apply(
  s: &mut PlanningSession,
  event: Event,
  at: DateTime<Utc>,
  config: &PlannerConfig,
) -> Result<Vec<Effect>, PlanError> {
  use Phase::*;

  match (s.phase, event) {
    (_, Event::Cancel) | (_, Event::IdleTimeout) => {
      s.phase = Abandoned;
      s.draft = None;
      s.report = None;
      Ok(vec![])
    }

    (Intake, Event::IntakeSubmitted { profile, biofeedback }) => {
      set_intake(s, profile, biofeedback)?;
      enter_analysis_if_ready(s, config)
    }
    (Intake, Event::SignalAttached(signal)) => {
      set_signal(s, signal, at, config)?;
      enter_analysis_if_ready(s, config)
    }

    // Profile or signal changed mid-analysis: re-derive and re-propose
    (Analysis, Event::IntakeSubmitted { profile, biofeedback }) => {
      set_intake(s, profile, biofeedback)?;
      s.strategy = None;
      enter_analysis_if_ready(s, config)
    }
    (Analysis, Event::SignalAttached(signal)) => {
      set_signal(s, signal, at, config)?;
      s.strategy = None;
      enter_analysis_if_ready(s, config)
    }

    (Intake | Analysis, Event::AnswerRecorded(qa)) => {
      s.answers.push(qa);
      Ok(vec![])
    }

    (Analysis, Event::StrategyProposed(text)) => {
      s.strategy = Some(text);
      Ok(vec![])
    }
    (Analysis, Event::StrategyReviewed(review)) => {
      let Some(strategy) = &s.strategy else {
        return Err(PlanError::InvalidTransition {
          phase: Analysis,
          event: "strategy_reviewed",
        });
      };
      if let StrategyReview::Amend(feedback) = review {
        s.answers.push(QaPair {
          question: format!("Proposed strategy: {}", strategy),
          answer: feedback,
        });
      }
      s.phase = Drafting;
      Ok(vec![Effect::RequestDraft])
    }

    (Drafting, Event::DraftProposed(plan)) => {
      s.draft = Some(plan);
      s.report = None;
      s.phase = Verifying;
      Ok(vec![Effect::Verify])
    }

    // A failed draft is on hand: degrade instead of surfacing the error
    (Drafting, Event::ReasoningExhausted(_)) if s.draft.is_some() && s.report.is_some() => {
      s.phase = BestEffort;
      Ok(vec![])
    }
    (Analysis | Drafting, Event::ReasoningExhausted(err)) => Err(err),

    // Recompute from the session's own profile and signal, never patch
    (Analysis | Drafting | Verifying, Event::ConstraintsRefreshed) => {
      let (Some(profile), Some(signal)) = (&s.profile, &s.signal) else {
        return Err(PlanError::InvalidTransition {
          phase: s.phase,
          event: "constraints_refreshed",
        });
      };
      s.constraints = Some(derive_targets(profile, signal, &config.targets)?);
      Ok(vec![])
    }

    (Verifying, Event::Verified(report)) => {
      let passed = report.overall_pass;
      s.report = Some(report);

      if passed {
        s.phase = Finalized;
        return Ok(vec![]);
      }

      s.repair_cycles += 1;
      if s.repair_cycles >= config.max_repair_cycles {
        s.phase = BestEffort;
        Ok(vec![])
      } else {
        s.phase = Drafting;
        Ok(vec![Effect::RequestDraft])
      }
    }

    (phase, event) => Err(PlanError::InvalidTransition {
      phase,
      event: event.name(),
    }),
  }
}

fn set_intake(s: &mut PlanningSession, profile: AthleteProfile, biofeedback: Biofeedback) -> Result<(), PlanError> {
  profile.validate()?;
  biofeedback.validate()?;
  s.profile = Some(profile);
  s.biofeedback = Some(biofeedback);
  Ok(())
}

fn set_signal(
  s: &mut PlanningSession,
  signal: WeeklySignal,
  at: DateTime<Utc>,
  config: &PlannerConfig,
) -> Result<(), PlanError> {
  if !signal.is_fresh(at.date_naive(), config.max_signal_age_days) {
    return Err(PlanError::StaleSignal {
      window_end: signal.window_end,
      max_age_days: config.max_signal_age_days,
    });
  }
  s.signal = Some(signal);
  Ok(())
}

/// Analysis starts once both profile and signal are present
fn enter_analysis_if_ready(s: &mut PlanningSession, config: &PlannerConfig) -> Result<Vec<Effect>, PlanError> {
  let (Some(profile), Some(signal)) = (&s.profile, &s.signal) else {
    return Ok(vec![]);
  };

  s.constraints = Some(derive_targets(profile, signal, &config.targets)?);
  s.phase = Phase::Analysis;
  Ok(vec![Effect::RequestStrategy])
}

/// ---------------------------------------------------------------------------
/// Tests
/// ---------------------------------------------------------------------------
