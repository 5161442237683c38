//! Deterministic aggregation layer for weekly signals
//!
//! This module reduces raw activity and nutrition records into a `WeeklySignal`.
//! The reasoning provider interprets these pre-computed numbers rather than doing
//! math itself. Everything here is a pure function of its inputs: the window is
//! anchored on the latest record, never on the wall clock.

use std::collections::BTreeSet;

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::PlannerConfig;
use crate::error::PlanError;
use crate::models::{ActivityRecord, AthleteProfile, NutritionRecord};

/// Logged days below this produce a coverage warning
const MIN_LOGGED_DAYS: usize = 5;
/// Gap (days) between activity days considered a sync issue or rest block
const MAX_ACTIVITY_GAP_DAYS: i64 = 2;
const CALORIE_SPIKE_KCAL: f64 = 3000.0;
/// 15 miles
const LONG_SESSION_METERS: f64 = 24_140.0;
/// Stress per minute when neither device load nor HR data is available
const UNSCORED_STRESS_PER_MIN: f64 = 1.0;

/// ---------------------------------------------------------------------------
/// Session Stress
/// ---------------------------------------------------------------------------

/// Training stress of a single session
///
/// Device load wins; otherwise HR-based rTSS
/// `(duration_min * (avg_hr / lthr)^2) / 60 * 100`; otherwise duration in minutes.
pub fn session_stress(record: &ActivityRecord, threshold_hr: Option<i64>) -> f64 {
  if let Some(load) = record.training_load {
    return load.max(0.0);
  }

  let duration_min = record.duration_seconds.max(0) as f64 / 60.0;

  match (record.average_heartrate, threshold_hr) {
    (Some(hr), Some(lthr)) if lthr > 0 && hr > 0 => {
      let intensity = hr as f64 / lthr as f64;
      (duration_min * intensity.powi(2)) / 60.0 * 100.0
    }
    _ => duration_min * UNSCORED_STRESS_PER_MIN,
  }
}

/// ---------------------------------------------------------------------------
/// Weekly Signal
/// ---------------------------------------------------------------------------

/// Average intake over logged days in the window
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NutritionAverages {
  pub logged_days: usize,
  pub calories: f64,
  pub protein_g: f64,
  pub carbs_g: f64,
  pub fat_g: f64,
}

/// Normalized weekly summary consumed by a planning session
///
/// Created once per aggregation run and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeeklySignal {
  pub window_start: NaiveDate,
  pub window_end: NaiveDate,

  /// Exponentially time-decayed sum of session stress
  pub training_load: f64,

  pub session_count: usize,

  /// Logged nutrition days / window days, uncapped
  pub adherence_raw: f64,

  /// Trend-weight change across the window (kg), if at least two weigh-ins
  pub body_comp_delta_kg: Option<f64>,

  pub nutrition: NutritionAverages,

  /// Data-quality notes surfaced to the athlete and the reasoning provider
  pub coverage_warnings: Vec<String>,
}

impl WeeklySignal {
  /// Adherence for reporting, capped at 1.0
  pub fn adherence(&self) -> f64 {
    self.adherence_raw.min(1.0)
  }

  /// Whether the window ended recently enough to plan from
  pub fn is_fresh(&self, today: NaiveDate, max_age_days: i64) -> bool {
    (today - self.window_end).num_days() <= max_age_days
  }
}

/// ---------------------------------------------------------------------------
/// Aggregation
/// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct AggregateOptions {
  pub window_days: i64,
  pub decay_days: f64,
  pub threshold_hr: Option<i64>,
}

impl Default for AggregateOptions {
  fn default() -> Self {
    Self {
      window_days: 7,
      decay_days: 7.0,
      threshold_hr: None,
    }
  }
}

impl AggregateOptions {
  /// Window and decay from `config`, threshold HR from the athlete's profile
  pub fn for_athlete(config: &PlannerConfig, profile: &AthleteProfile) -> Self {
    Self {
      window_days: config.window_days,
      decay_days: config.load_decay_days,
      threshold_hr: profile.threshold_hr,
    }
  }
}

/// Reduce activity and nutrition records into a `WeeklySignal`
///
/// Both sequences must be time-ordered. The window ends on the latest record
/// date and spans `window_days` calendar days.
pub fn aggregate(
  activity: &[ActivityRecord],
  nutrition: &[NutritionRecord],
  options: &AggregateOptions,
) -> Result<WeeklySignal, PlanError> {
  if options.window_days < 1 {
    return Err(PlanError::InvalidInput("window must span at least one day".into()));
  }
  if !options.decay_days.is_finite() || options.decay_days <= 0.0 {
    return Err(PlanError::InvalidInput("decay constant must be positive".into()));
  }

  if activity.windows(2).any(|w| w[1].started_at < w[0].started_at) {
    return Err(PlanError::InvalidInput("activity records are not time-ordered".into()));
  }
  if nutrition.windows(2).any(|w| w[1].date < w[0].date) {
    return Err(PlanError::InvalidInput("nutrition records are not time-ordered".into()));
  }

  let window_end = activity
    .last()
    .map(|a| a.date())
    .into_iter()
    .chain(nutrition.last().map(|n| n.date))
    .max()
    .ok_or(PlanError::InsufficientData { distinct_days: 0 })?;
  let window_start = Duration::try_days(options.window_days - 1)
    .and_then(|span| window_end.checked_sub_signed(span))
    .ok_or_else(|| PlanError::InvalidInput(format!("window of {} days is out of range", options.window_days)))?;

  let in_window = |date: NaiveDate| date >= window_start && date <= window_end;

  let sessions: Vec<&ActivityRecord> = activity.iter().filter(|a| in_window(a.date())).collect();
  let logged: Vec<&NutritionRecord> = nutrition
    .iter()
    .filter(|n| in_window(n.date) && n.is_logged())
    .collect();

  let distinct_days: BTreeSet<NaiveDate> = sessions
    .iter()
    .map(|a| a.date())
    .chain(logged.iter().map(|n| n.date))
    .collect();
  if distinct_days.len() < 2 {
    return Err(PlanError::InsufficientData {
      distinct_days: distinct_days.len(),
    });
  }

  let training_load = sessions
    .iter()
    .map(|a| {
      let age_days = (window_end - a.date()).num_days() as f64;
      session_stress(a, options.threshold_hr) * (-age_days / options.decay_days).exp()
    })
    .sum();

  let logged_days: BTreeSet<NaiveDate> = logged.iter().map(|n| n.date).collect();
  let adherence_raw = logged_days.len() as f64 / options.window_days as f64;

  let weights: Vec<f64> = nutrition
    .iter()
    .filter(|n| in_window(n.date))
    .filter_map(|n| n.trend_weight_kg)
    .collect();
  let body_comp_delta_kg = match (weights.first(), weights.last()) {
    (Some(first), Some(last)) if weights.len() >= 2 => Some(last - first),
    _ => None,
  };

  let nutrition_avgs = compute_nutrition_averages(&logged);
  let coverage_warnings = coverage_warnings(&sessions, &logged, logged_days.len());

  debug!(
    %window_start,
    %window_end,
    training_load,
    adherence_raw,
    sessions = sessions.len(),
    "aggregate: weekly signal computed"
  );

  Ok(WeeklySignal {
    window_start,
    window_end,
    training_load,
    session_count: sessions.len(),
    adherence_raw,
    body_comp_delta_kg,
    nutrition: nutrition_avgs,
    coverage_warnings,
  })
}

fn compute_nutrition_averages(logged: &[&NutritionRecord]) -> NutritionAverages {
  if logged.is_empty() {
    return NutritionAverages::default();
  }

  let n = logged.len() as f64;
  NutritionAverages {
    logged_days: logged.len(),
    calories: logged.iter().map(|r| r.calories).sum::<f64>() / n,
    protein_g: logged.iter().map(|r| r.protein_g).sum::<f64>() / n,
    carbs_g: logged.iter().map(|r| r.carbs_g).sum::<f64>() / n,
    fat_g: logged.iter().map(|r| r.fat_g).sum::<f64>() / n,
  }
}

fn coverage_warnings(
  sessions: &[&ActivityRecord],
  logged: &[&NutritionRecord],
  logged_days: usize,
) -> Vec<String> {
  let mut warnings = Vec::new();

  if logged_days < MIN_LOGGED_DAYS {
    warnings.push(format!(
      "Nutrition: only {} logged day(s) in the window (need {} for a complete picture)",
      logged_days, MIN_LOGGED_DAYS
    ));
  }

  let activity_days: Vec<NaiveDate> = sessions
    .iter()
    .map(|a| a.date())
    .collect::<BTreeSet<_>>()
    .into_iter()
    .collect();
  if activity_days.is_empty() {
    warnings.push("Activity: no sessions found in the window".to_string());
  }
  let max_gap = activity_days
    .windows(2)
    .map(|w| (w[1] - w[0]).num_days())
    .max()
    .unwrap_or(0);
  if max_gap > MAX_ACTIVITY_GAP_DAYS {
    warnings.push(format!(
      "Activity: gap of {} days between sessions (sync issue or rest block?)",
      max_gap
    ));
  }

  for day in logged.iter().filter(|n| n.calories > CALORIE_SPIKE_KCAL) {
    warnings.push(format!(
      "Nutrition: {:.0} kcal logged on {} (above {:.0} kcal)",
      day.calories,
      day.date.format("%a %b %d"),
      CALORIE_SPIKE_KCAL
    ));
  }

  for session in sessions
    .iter()
    .filter(|a| a.distance_meters.is_some_and(|d| d > LONG_SESSION_METERS))
  {
    warnings.push(format!(
      "Activity: {:.1} km {} on {}",
      session.distance_meters.unwrap_or_default() / 1000.0,
      session.activity_type.to_lowercase(),
      session.date().format("%a %b %d")
    ));
  }

  warnings
}

/// ---------------------------------------------------------------------------
/// Tests
/// ---------------------------------------------------------------------------
