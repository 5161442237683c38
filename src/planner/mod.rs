//! Phase-sequenced planning interview
//!
//! `state` holds the pure transition table, `parse` turns reasoning output
//! into typed plans, and `engine` drives sessions against a `ReasoningPort`
//! and a `SessionStore`.

use serde::{Deserialize, Serialize};

pub mod engine;
pub mod parse;
pub mod state;

pub use engine::PlanningEngine;
pub use parse::{parse_draft, parse_strategy};
pub use state::{transition, Effect, Event, StrategyReview, Transition};

/// Interview phase. Drafting -> Verifying -> Drafting is the only cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
  Intake,
  Analysis,
  Drafting,
  Verifying,
  /// Terminal: verified plan
  Finalized,
  /// Terminal: repair retries exhausted, failing days flagged
  BestEffort,
  /// Terminal: idle timeout or explicit cancel, no plan surfaced
  Abandoned,
}

impl Phase {
  pub fn is_terminal(&self) -> bool {
    matches!(self, Phase::Finalized | Phase::BestEffort | Phase::Abandoned)
  }

  pub fn as_str(&self) -> &'static str {
    match self {
      Phase::Intake => "intake",
      Phase::Analysis => "analysis",
      Phase::Drafting => "drafting",
      Phase::Verifying => "verifying",
      Phase::Finalized => "finalized",
      Phase::BestEffort => "best_effort",
      Phase::Abandoned => "abandoned",
    }
  }
}

impl std::fmt::Display for Phase {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.as_str())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_phase_display_matches_serde() {
    for phase in [Phase::Intake, Phase::Verifying, Phase::BestEffort] {
      let json = serde_json::to_string(&phase).unwrap();
      assert_eq!(json, format!("\"{}\"", phase));
    }
    assert!(Phase::Abandoned.is_terminal());
    assert!(!Phase::Drafting.is_terminal());
  }
}
