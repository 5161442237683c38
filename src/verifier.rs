//! Plan verification against a constraint set
//!
//! Daily totals are rounded to whole grams (kcal, load units) before they are
//! compared with the integer ranges of the `ConstraintSet`. Verification is a
//! pure function: it never mutates the draft and the same inputs always give
//! the same report.

use chrono::Weekday;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::constraints::{ConstraintSet, Range};
use crate::models::{DayPlan, DraftPlan};

/// ---------------------------------------------------------------------------
/// Report Types
/// ---------------------------------------------------------------------------

/// One rounded daily total and its signed distance to the allowed range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricCheck {
  pub actual: i64,
  pub range: Range,
  /// Negative below the range, positive above, zero inside
  pub delta: i64,
}

impl MetricCheck {
  fn new(actual: f64, range: Range) -> Self {
    let actual = actual.round() as i64;
    Self {
      actual,
      range,
      delta: range.delta(actual),
    }
  }

  pub fn passed(&self) -> bool {
    self.delta == 0
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadCheck {
  pub actual: i64,
  pub bound: i64,
  /// Load above the bound, zero when within it
  pub excess: i64,
}

impl LoadCheck {
  pub fn passed(&self) -> bool {
    self.excess == 0
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayVerification {
  pub day: Weekday,
  pub passed: bool,
  pub calories: MetricCheck,
  pub protein_g: MetricCheck,
  pub carbs_g: MetricCheck,
  pub fat_g: MetricCheck,
  pub load: LoadCheck,
}

impl DayVerification {
  /// Human-readable offending deltas, e.g. "protein -40 g (100 vs 140-154)"
  pub fn failures(&self) -> Vec<String> {
    let mut out = Vec::new();
    let metrics = [
      ("calories", "kcal", &self.calories),
      ("protein", "g", &self.protein_g),
      ("carbs", "g", &self.carbs_g),
      ("fat", "g", &self.fat_g),
    ];
    for (name, unit, check) in metrics {
      if !check.passed() {
        out.push(format!(
          "{} {:+} {} ({} vs {}-{})",
          name, check.delta, unit, check.actual, check.range.min, check.range.max
        ));
      }
    }
    if !self.load.passed() {
      out.push(format!(
        "load +{} ({} vs max {})",
        self.load.excess, self.load.actual, self.load.bound
      ));
    }
    out
  }
}

/// Per-day results for a whole draft
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationReport {
  pub days: Vec<DayVerification>,
  /// True iff every day passed and the week stays within its load bound
  pub overall_pass: bool,
  /// Sum of the rounded daily loads
  pub weekly_load: i64,
  pub weekly_load_bound: i64,
}

impl VerificationReport {
  pub fn day(&self, day: Weekday) -> Option<&DayVerification> {
    self.days.iter().find(|d| d.day == day)
  }

  pub fn failing_days(&self) -> Vec<Weekday> {
    self.days.iter().filter(|d| !d.passed).map(|d| d.day).collect()
  }

  pub fn weekly_load_within_bound(&self) -> bool {
    self.weekly_load <= self.weekly_load_bound
  }

  /// Corrective summary fed back to the reasoning provider
  pub fn summary(&self) -> String {
    if self.overall_pass {
      return "All 7 days are within tolerance.".to_string();
    }

    let mut lines: Vec<String> = self
      .days
      .iter()
      .filter(|d| !d.passed)
      .map(|d| format!("{}: {}", d.day, d.failures().join("; ")))
      .collect();
    if !self.weekly_load_within_bound() {
      lines.push(format!(
        "Week: total load {} exceeds {}",
        self.weekly_load, self.weekly_load_bound
      ));
    }
    lines.join("\n")
  }
}

/// ---------------------------------------------------------------------------
/// Verification
/// ---------------------------------------------------------------------------

fn verify_day(day: &DayPlan, constraints: &ConstraintSet) -> DayVerification {
  let totals = day.totals();

  let calories = MetricCheck::new(totals.calories, constraints.calories);
  let protein_g = MetricCheck::new(totals.protein_g, constraints.protein_g);
  let carbs_g = MetricCheck::new(totals.carbs_g, constraints.carbs_g);
  let fat_g = MetricCheck::new(totals.fat_g, constraints.fat_g);

  let actual_load = day.training.target_load.round() as i64;
  let load = LoadCheck {
    actual: actual_load,
    bound: constraints.daily_load_bound,
    excess: (actual_load - constraints.daily_load_bound).max(0),
  };

  let passed = [calories, protein_g, carbs_g, fat_g].iter().all(MetricCheck::passed) && load.passed();

  DayVerification {
    day: day.day,
    passed,
    calories,
    protein_g,
    carbs_g,
    fat_g,
    load,
  }
}

/// Check every day's macro totals and training load against `constraints`
pub fn verify(plan: &DraftPlan, constraints: &ConstraintSet) -> VerificationReport {
  let days: Vec<DayVerification> = plan.days().iter().map(|d| verify_day(d, constraints)).collect();
  let weekly_load: i64 = days.iter().map(|d| d.load.actual).sum();
  let overall_pass = days.iter().all(|d| d.passed) && weekly_load <= constraints.weekly_load_bound;

  debug!(
    overall_pass,
    failing = days.iter().filter(|d| !d.passed).count(),
    weekly_load,
    "verify: plan checked"
  );

  VerificationReport {
    days,
    overall_pass,
    weekly_load,
    weekly_load_bound: constraints.weekly_load_bound,
  }
}

/// ---------------------------------------------------------------------------
/// Tests
/// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::TargetsConfig;
  use crate::constraints::derive_targets;
  use crate::models::GoalType;
  use crate::test_utils::{balanced_plan, day_with_totals, mock_profile, mock_signal, plan_with_day};
  use proptest::prelude::*;

  fn build_constraints() -> ConstraintSet {
    derive_targets(
      &mock_profile(70.0, GoalType::Build),
      &mock_signal(300.0, 0.9),
      &TargetsConfig::default(),
    )
    .unwrap()
  }

  #[test]
  fn test_mid_range_plan_passes() {
    let set = build_constraints();
    let report = verify(&balanced_plan(&set), &set);

    assert!(report.overall_pass);
    assert_eq!(report.days.len(), 7);
    assert!(report.failing_days().is_empty());
    assert!(report.weekly_load <= 330);
  }

  #[test]
  fn test_low_protein_day_fails_with_negative_delta() {
    let set = build_constraints();
    // 100 g protein, carbs and fat unchanged
    let low = day_with_totals(Weekday::Wed, 100.0, 348.0, 70.0, 40.0);
    let report = verify(&plan_with_day(&set, low), &set);

    assert!(!report.overall_pass);
    assert_eq!(report.failing_days(), vec![Weekday::Wed]);

    let wed = report.day(Weekday::Wed).unwrap();
    assert_eq!(wed.protein_g.actual, 100);
    assert_eq!(wed.protein_g.delta, -40);
    assert!(wed.failures().iter().any(|f| f.starts_with("protein -40 g")));
    assert!(report.summary().starts_with("Wed:"));
  }

  #[test]
  fn test_range_edges_pass_and_one_gram_outside_fails() {
    let set = build_constraints();
    let min = set.protein_g.min as f64;

    // Keep calories in range by moving the difference into carbs
    let at_edge = day_with_totals(Weekday::Mon, min, 348.0 + (147.0 - min), 70.0, 40.0);
    let report = verify(&plan_with_day(&set, at_edge), &set);
    assert!(report.day(Weekday::Mon).unwrap().protein_g.passed());
    assert!(report.overall_pass);

    let outside = day_with_totals(Weekday::Mon, min - 1.0, 348.0 + (148.0 - min), 70.0, 40.0);
    let report = verify(&plan_with_day(&set, outside), &set);
    let mon = report.day(Weekday::Mon).unwrap();
    assert_eq!(mon.protein_g.delta, -1);
    assert!(!mon.passed);
    assert!(!report.overall_pass);
  }

  #[test]
  fn test_rounding_absorbs_float_noise() {
    let set = build_constraints();
    // 139.6 g rounds to 140, inside the range
    let noisy = day_with_totals(Weekday::Tue, 139.6, 355.4, 70.0, 40.0);
    let report = verify(&plan_with_day(&set, noisy), &set);
    assert!(report.day(Weekday::Tue).unwrap().protein_g.passed());
  }

  #[test]
  fn test_day_load_over_bound_fails() {
    let set = build_constraints();
    let heavy = day_with_totals(Weekday::Sat, 147.0, 348.0, 70.0, (set.daily_load_bound + 5) as f64);
    let report = verify(&plan_with_day(&set, heavy), &set);

    let sat = report.day(Weekday::Sat).unwrap();
    assert!(!sat.passed);
    assert_eq!(sat.load.excess, 5);
    assert!(sat.protein_g.passed());
    assert!(!report.overall_pass);
  }

  #[test]
  fn test_week_over_weekly_bound_fails() {
    let set = build_constraints();
    // Every day sits exactly at the per-day bound, so only the week total is off
    let days = crate::test_utils::WEEK
      .iter()
      .map(|&d| day_with_totals(d, 147.0, 348.0, 70.0, set.daily_load_bound as f64))
      .collect();
    let plan = DraftPlan::new(days).unwrap();
    let report = verify(&plan, &set);

    assert!(report.failing_days().is_empty());
    assert_eq!(report.weekly_load, 7 * set.daily_load_bound);
    assert!(!report.weekly_load_within_bound());
    assert!(!report.overall_pass);
    assert!(report.summary().starts_with("Week: total load"));
  }

  #[test]
  fn test_week_at_weekly_bound_passes() {
    let set = build_constraints();
    assert_eq!(set.weekly_load_bound, 330);

    // 3 x 110 = 330, each day under the per-day bound
    let days = crate::test_utils::WEEK
      .iter()
      .enumerate()
      .map(|(i, &d)| day_with_totals(d, 147.0, 348.0, 70.0, if i < 3 { 110.0 } else { 0.0 }))
      .collect();
    let report = verify(&DraftPlan::new(days).unwrap(), &set);

    assert_eq!(report.weekly_load, 330);
    assert!(report.overall_pass, "{}", report.summary());
  }

  #[test]
  fn test_single_day_spike_fails_within_weekly_bound() {
    let set = build_constraints();

    // 2 x 165 = 330 fits the week but each day exceeds the per-day cap
    let days = crate::test_utils::WEEK
      .iter()
      .enumerate()
      .map(|(i, &d)| day_with_totals(d, 147.0, 348.0, 70.0, if i < 2 { 165.0 } else { 0.0 }))
      .collect();
    let report = verify(&DraftPlan::new(days).unwrap(), &set);

    assert!(report.weekly_load_within_bound());
    assert_eq!(report.failing_days(), vec![Weekday::Mon, Weekday::Tue]);
    assert!(!report.overall_pass);
  }

  #[test]
  fn test_verify_is_idempotent() {
    let set = build_constraints();
    let plan = balanced_plan(&set);
    let before = plan.clone();

    let first = verify(&plan, &set);
    let second = verify(&plan, &set);
    assert_eq!(first, second);
    assert_eq!(plan, before);
  }

  proptest! {
    #[test]
    fn prop_mid_range_days_always_pass(
      weight in 50.0f64..110.0,
      load in 0.0f64..700.0,
      goal_idx in 0usize..4,
    ) {
      let goal = [GoalType::Cut, GoalType::Maintain, GoalType::Build, GoalType::Endurance][goal_idx];
      if let Ok(set) = derive_targets(&mock_profile(weight, goal), &mock_signal(load, 0.9), &TargetsConfig::default()) {
        let report = verify(&balanced_plan(&set), &set);
        prop_assert!(report.overall_pass, "{}", report.summary());
      }
    }
  }
}
