//! Numeric targets derived from the athlete profile and weekly signal
//!
//! Key principles:
//! - Protein and fat are per-kg floors; carbs fill the calorie remainder
//! - Every range is a fixed tolerance band around its target, rounded to whole
//!   grams (kcal for calories) so verification compares integers
//! - A conflict between floors and the calorie budget is an error, never clamped
//! - A `ConstraintSet` is replaced wholesale whenever its inputs change

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::analysis::WeeklySignal;
use crate::config::TargetsConfig;
use crate::error::PlanError;
use crate::models::plan::{KCAL_PER_G_CARB, KCAL_PER_G_FAT, KCAL_PER_G_PROTEIN};
use crate::models::AthleteProfile;

/// ---------------------------------------------------------------------------
/// Ranges
/// ---------------------------------------------------------------------------

/// Inclusive integer interval
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Range {
  pub min: i64,
  pub max: i64,
}

impl Range {
  /// `target` +/- `pct`, bounds rounded to the nearest unit
  pub fn around(target: f64, pct: f64) -> Self {
    Self {
      min: (target * (1.0 - pct)).round() as i64,
      max: (target * (1.0 + pct)).round() as i64,
    }
  }

  pub fn contains(&self, value: i64) -> bool {
    value >= self.min && value <= self.max
  }

  /// Signed distance to the nearest bound; zero inside the range
  pub fn delta(&self, value: i64) -> i64 {
    if value < self.min {
      value - self.min
    } else if value > self.max {
      value - self.max
    } else {
      0
    }
  }
}

/// ---------------------------------------------------------------------------
/// Constraint Set
/// ---------------------------------------------------------------------------

/// Unrounded daily targets the ranges were built around
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DailyTargets {
  pub calories: f64,
  pub protein_g: f64,
  pub carbs_g: f64,
  pub fat_g: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstraintSet {
  pub targets: DailyTargets,

  /// Per-day ranges
  pub calories: Range,
  pub protein_g: Range,
  pub carbs_g: Range,
  pub fat_g: Range,

  /// Upper bound on the planned week's total training load
  pub weekly_load_bound: i64,

  /// Upper bound on any single day's training load
  pub daily_load_bound: i64,

  /// Progression factor applied to the prior week's load
  pub load_progression: f64,
}

impl ConstraintSet {
  /// True when re-deriving from the same inputs gives this exact set
  pub fn is_consistent_with(
    &self,
    profile: &AthleteProfile,
    signal: &WeeklySignal,
    config: &TargetsConfig,
  ) -> bool {
    derive_targets(profile, signal, config).is_ok_and(|fresh| &fresh == self)
  }
}

/// ---------------------------------------------------------------------------
/// Derivation
/// ---------------------------------------------------------------------------

/// Derive per-day macro ranges and load bounds
pub fn derive_targets(
  profile: &AthleteProfile,
  signal: &WeeklySignal,
  config: &TargetsConfig,
) -> Result<ConstraintSet, PlanError> {
  profile.validate()?;

  let coefficients = config.for_goal(profile.goal);
  let weight = profile.body_weight_kg;

  let maintenance = profile
    .maintenance_kcal
    .unwrap_or(weight * config.maintenance_kcal_per_kg);
  let calories = maintenance + coefficients.calorie_offset;
  if calories <= 0.0 {
    return Err(PlanError::InfeasibleProfile(format!(
      "calorie target {:.0} kcal is not positive",
      calories
    )));
  }

  let protein_g = weight * coefficients.protein_g_per_kg;
  let calorie_grams = calories / KCAL_PER_G_PROTEIN;
  if protein_g > calorie_grams {
    return Err(PlanError::InfeasibleProfile(format!(
      "protein floor {:.0} g exceeds the whole {:.0} kcal budget ({:.0} g)",
      protein_g, calories, calorie_grams
    )));
  }

  let fat_g = weight * coefficients.fat_g_per_kg;
  let carb_kcal = calories - protein_g * KCAL_PER_G_PROTEIN - fat_g * KCAL_PER_G_FAT;
  if carb_kcal < 0.0 {
    return Err(PlanError::InfeasibleProfile(format!(
      "protein ({:.0} g) and fat ({:.0} g) floors exceed {:.0} kcal by {:.0} kcal",
      protein_g, fat_g, calories, -carb_kcal
    )));
  }
  let carbs_g = carb_kcal / KCAL_PER_G_CARB;

  let load_progression = progression_factor(profile, signal, config);
  let load_base = signal.training_load.max(config.min_weekly_load);
  let weekly_load = load_base * load_progression;

  let set = ConstraintSet {
    targets: DailyTargets {
      calories,
      protein_g,
      carbs_g,
      fat_g,
    },
    calories: Range::around(calories, config.calorie_tolerance_pct),
    protein_g: Range::around(protein_g, config.macro_tolerance_pct),
    carbs_g: Range::around(carbs_g, config.macro_tolerance_pct),
    fat_g: Range::around(fat_g, config.macro_tolerance_pct),
    weekly_load_bound: weekly_load.round() as i64,
    daily_load_bound: (weekly_load * config.daily_load_share).round() as i64,
    load_progression,
  };

  debug!(
    goal = %profile.goal,
    calories = set.targets.calories,
    protein_g = set.targets.protein_g,
    weekly_load_bound = set.weekly_load_bound,
    "derive_targets: constraint set derived"
  );

  Ok(set)
}

/// Goal progression, held at 1.0 on an unstable week, deloaded during a taper
fn progression_factor(profile: &AthleteProfile, signal: &WeeklySignal, config: &TargetsConfig) -> f64 {
  if profile.mesocycle.is_some_and(|m| m.is_deload()) {
    return config.deload_factor;
  }

  let factor = config.for_goal(profile.goal).load_progression;
  if signal.adherence_raw < config.unstable_adherence {
    factor.min(1.0)
  } else {
    factor
  }
}

/// ---------------------------------------------------------------------------
/// Tests
/// ---------------------------------------------------------------------------
