//! PeakForm weekly planner
//!
//! Turns activity and nutrition history into a 7-day training and nutrition
//! plan. Numbers are computed here (`analysis`, `constraints`) and checked here
//! (`verifier`); the reasoning provider only proposes strategy and drafts,
//! driven through the phases in `planner`.

pub mod analysis;
pub mod config;
pub mod constraints;
pub mod db;
pub mod error;
pub mod ingest;
pub mod llm;
pub mod models;
pub mod planner;
pub mod reasoning;
pub mod session;
pub mod verifier;

#[cfg(test)]
pub(crate) mod test_utils;

pub use analysis::{aggregate, AggregateOptions, WeeklySignal};
pub use config::PlannerConfig;
pub use constraints::{derive_targets, ConstraintSet, Range};
pub use db::{initialize_db, SqliteSessionStore};
pub use error::PlanError;
pub use llm::ClaudeReasoner;
pub use planner::{Phase, PlanningEngine, StrategyReview};
pub use reasoning::{PromptContext, RawResponse, ReasoningError, ReasoningPort};
pub use session::{FinalPlan, MemorySessionStore, PlanOutcome, PlanningSession, SessionStore};
pub use verifier::{verify, VerificationReport};
