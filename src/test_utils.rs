//! Test utilities and helpers for unit testing
//!
//! This module provides common test infrastructure including:
//! - Database setup/teardown
//! - Mock data factories (records, profiles, signals, plans)
//! - A scripted reasoning provider
//! - Helper assertions

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, TimeZone, Utc, Weekday};
use sqlx::SqlitePool;

use crate::analysis::{NutritionAverages, WeeklySignal};
use crate::config::PlannerConfig;
use crate::constraints::ConstraintSet;
use crate::models::{
  ActivityRecord, AthleteProfile, DayPlan, DraftPlan, GoalType, Meal, NutritionRecord, TrainingBlock,
};
use crate::reasoning::{PromptContext, RawResponse, ReasoningError, ReasoningPort};

/// ---------------------------------------------------------------------------
/// Database Test Utilities
/// ---------------------------------------------------------------------------

/// Create an in-memory SQLite database for testing
/// Runs all migrations and returns a ready-to-use pool
///
/// Uses max_connections(1) to prevent multiple pool connections from creating
/// isolated in-memory databases, which would cause intermittent test failures
pub async fn setup_test_db() -> SqlitePool {
  let pool = sqlx::sqlite::SqlitePoolOptions::new()
    .max_connections(1)
    .connect("sqlite::memory:")
    .await
    .expect("Failed to create in-memory database");

  sqlx::migrate!("./migrations")
    .run(&pool)
    .await
    .expect("Failed to run migrations");

  pool
}

/// Close a test database pool
pub async fn teardown_test_db(pool: SqlitePool) {
  pool.close().await;
}

/// ---------------------------------------------------------------------------
/// Record Factories
/// ---------------------------------------------------------------------------

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
  NaiveDate::from_ymd_opt(y, m, d).expect("valid test date")
}

/// A run starting at 07:00 UTC on `day`
pub fn activity_on(day: NaiveDate, duration_seconds: i64, training_load: Option<f64>) -> ActivityRecord {
  let started_at = Utc.from_utc_datetime(&day.and_hms_opt(7, 0, 0).expect("valid time"));
  ActivityRecord {
    started_at,
    activity_type: "Run".to_string(),
    duration_seconds,
    distance_meters: Some(8_000.0),
    average_heartrate: None,
    training_load,
  }
}

/// A logged day with a 30/45/25 calorie split
pub fn nutrition_on(day: NaiveDate, calories: f64) -> NutritionRecord {
  NutritionRecord {
    date: day,
    calories,
    protein_g: calories * 0.30 / 4.0,
    carbs_g: calories * 0.45 / 4.0,
    fat_g: calories * 0.25 / 9.0,
    trend_weight_kg: None,
  }
}

/// ---------------------------------------------------------------------------
/// Mock Data Factories
/// ---------------------------------------------------------------------------

/// Athlete training five days a week, no dietary constraints
pub fn mock_profile(body_weight_kg: f64, goal: GoalType) -> AthleteProfile {
  AthleteProfile::new(body_weight_kg, goal, 5)
}

/// Signal whose window ends today
pub fn mock_signal(training_load: f64, adherence: f64) -> WeeklySignal {
  let window_end = Utc::now().date_naive();
  WeeklySignal {
    window_start: window_end - chrono::Duration::days(6),
    window_end,
    training_load,
    session_count: 5,
    adherence_raw: adherence,
    body_comp_delta_kg: None,
    nutrition: NutritionAverages::default(),
    coverage_warnings: Vec::new(),
  }
}

/// Planner defaults with a short reasoning timeout
pub fn fast_config() -> PlannerConfig {
  PlannerConfig {
    reasoning_timeout: Duration::from_millis(50),
    ..PlannerConfig::default()
  }
}

/// A day hitting exactly the given macro totals with a single meal
pub fn day_with_totals(day: Weekday, protein_g: f64, carbs_g: f64, fat_g: f64, load: f64) -> DayPlan {
  DayPlan {
    day,
    training: if load > 0.0 {
      TrainingBlock {
        kind: "easy run".to_string(),
        target_load: load,
      }
    } else {
      TrainingBlock::rest()
    },
    meals: vec![Meal::new("Chicken rice bowl", protein_g, carbs_g, fat_g)],
    notes: None,
  }
}

/// A day at the unrounded targets, split over two meals
pub fn balanced_day(day: Weekday, constraints: &ConstraintSet, load: f64) -> DayPlan {
  let t = constraints.targets;
  let mut plan = day_with_totals(day, t.protein_g * 0.6, t.carbs_g * 0.6, t.fat_g * 0.6, load);
  plan.meals.push(Meal::new(
    "Overnight oats",
    t.protein_g * 0.4,
    t.carbs_g * 0.4,
    t.fat_g * 0.4,
  ));
  plan
}

/// Five training days at weekly_bound / 7, weekend rest
pub fn balanced_plan(constraints: &ConstraintSet) -> DraftPlan {
  let load = (constraints.weekly_load_bound / 7) as f64;
  let days = WEEK
    .iter()
    .map(|&d| {
      let is_weekend = matches!(d, Weekday::Sat | Weekday::Sun);
      balanced_day(d, constraints, if is_weekend { 0.0 } else { load })
    })
    .collect();
  DraftPlan::new(days).expect("balanced plan has seven days")
}

/// Same as `balanced_plan` with one day replaced
pub fn plan_with_day(constraints: &ConstraintSet, replacement: DayPlan) -> DraftPlan {
  let days = balanced_plan(constraints)
    .into_days()
    .into_iter()
    .map(|d| if d.day == replacement.day { replacement.clone() } else { d })
    .collect();
  DraftPlan::new(days).expect("seven days")
}

/// Structured response carrying `plan` in the wire format
pub fn plan_response(plan: &DraftPlan) -> RawResponse {
  RawResponse::Structured(serde_json::json!({ "days": plan.days() }))
}

pub const WEEK: [Weekday; 7] = [
  Weekday::Mon,
  Weekday::Tue,
  Weekday::Wed,
  Weekday::Thu,
  Weekday::Fri,
  Weekday::Sat,
  Weekday::Sun,
];

/// ---------------------------------------------------------------------------
/// Scripted Reasoning Provider
/// ---------------------------------------------------------------------------

pub enum Scripted {
  Respond(RawResponse),
  Fail(ReasoningError),
  /// Sleep longer than any test timeout
  Stall(Duration),
  /// Respond after a delay
  Delay(Duration, RawResponse),
}

/// Replays a fixed script, one step per `propose` call
pub struct StubReasoner {
  script: Mutex<VecDeque<Scripted>>,
  seen: Mutex<Vec<PromptContext>>,
}

impl StubReasoner {
  pub fn new(script: Vec<Scripted>) -> Self {
    Self {
      script: Mutex::new(script.into()),
      seen: Mutex::new(Vec::new()),
    }
  }

  pub fn calls(&self) -> usize {
    self.seen.lock().unwrap().len()
  }

  pub fn contexts(&self) -> Vec<PromptContext> {
    self.seen.lock().unwrap().clone()
  }
}

#[async_trait]
impl ReasoningPort for StubReasoner {
  async fn propose(&self, ctx: &PromptContext) -> Result<RawResponse, ReasoningError> {
    self.seen.lock().unwrap().push(ctx.clone());
    let next = self.script.lock().unwrap().pop_front();

    match next {
      Some(Scripted::Respond(raw)) => Ok(raw),
      Some(Scripted::Fail(err)) => Err(err),
      Some(Scripted::Stall(d)) => {
        tokio::time::sleep(d).await;
        Err(ReasoningError::Unavailable("stalled".into()))
      }
      Some(Scripted::Delay(d, raw)) => {
        tokio::time::sleep(d).await;
        Ok(raw)
      }
      None => Err(ReasoningError::Unavailable("script exhausted".into())),
    }
  }
}

/// ---------------------------------------------------------------------------
/// Test Macros
/// ---------------------------------------------------------------------------

/// Assert two floats are approximately equal within a tolerance
#[macro_export]
macro_rules! assert_approx_eq {
  ($left:expr, $right:expr, $tolerance:expr) => {
    let diff = ($left - $right).abs();
    assert!(
      diff < $tolerance,
      "Values not approximately equal: {} vs {} (diff: {}, tolerance: {})",
      $left,
      $right,
      diff,
      $tolerance
    );
  };
}

/// ---------------------------------------------------------------------------
/// Tests for Test Utilities
/// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
  use super::*;
  use crate::constraints::derive_targets;

  #[tokio::test]
  async fn test_setup_db_creates_schema() {
    let pool = setup_test_db().await;

    let tables: Vec<(String,)> =
      sqlx::query_as("SELECT name FROM sqlite_master WHERE type='table' AND name = 'planning_sessions'")
        .fetch_all(&pool)
        .await
        .expect("Failed to query tables");

    assert_eq!(tables.len(), 1);

    teardown_test_db(pool).await;
  }

  #[test]
  fn test_balanced_plan_hits_targets() {
    let set = derive_targets(
      &mock_profile(70.0, GoalType::Build),
      &mock_signal(300.0, 0.9),
      &crate::config::TargetsConfig::default(),
    )
    .unwrap();
    let plan = balanced_plan(&set);

    assert_eq!(plan.days().len(), 7);
    let totals = plan.days()[0].totals();
    assert_approx_eq!(totals.protein_g, 147.0, 0.001);
    assert_approx_eq!(totals.calories, 2610.0, 0.001);
    assert!(plan.day(Weekday::Sun).unwrap().training.is_rest());
  }
}
