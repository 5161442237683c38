//! Planner configuration
//!
//! All tolerances, decay constants and retry bounds live here. Defaults are
//! starting points, not authoritative values; override them per deployment
//! through `PEAKFORM_*` environment variables.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::PlanError;
use crate::models::GoalType;

/// ---------------------------------------------------------------------------
/// Target Coefficients
/// ---------------------------------------------------------------------------

/// Per-goal nutrition and load coefficients
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GoalCoefficients {
  /// Protein floor in g per kg body weight
  pub protein_g_per_kg: f64,
  /// Fat floor in g per kg body weight
  pub fat_g_per_kg: f64,
  /// Offset from maintenance calories (kcal/day)
  pub calorie_offset: f64,
  /// Weekly training-load progression factor
  pub load_progression: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetsConfig {
  pub cut: GoalCoefficients,
  pub maintain: GoalCoefficients,
  pub build: GoalCoefficients,
  pub endurance: GoalCoefficients,

  /// Maintenance estimate when no measured expenditure is available
  pub maintenance_kcal_per_kg: f64,

  /// Half-width of the calorie band as a fraction of target calories
  pub calorie_tolerance_pct: f64,

  /// Half-width of each macro band as a fraction of the macro target
  pub macro_tolerance_pct: f64,

  /// Per-day load bound as a share of the weekly bound
  pub daily_load_share: f64,

  /// Floor for the weekly load base (athletes with little history)
  pub min_weekly_load: f64,

  /// Raw adherence below this holds progression at 1.0
  pub unstable_adherence: f64,

  /// Progression factor applied during a taper mesocycle
  pub deload_factor: f64,
}

impl Default for TargetsConfig {
  fn default() -> Self {
    Self {
      cut: GoalCoefficients {
        protein_g_per_kg: 2.2,
        fat_g_per_kg: 0.7,
        calorie_offset: -500.0,
        load_progression: 0.95,
      },
      maintain: GoalCoefficients {
        protein_g_per_kg: 1.8,
        fat_g_per_kg: 0.9,
        calorie_offset: 0.0,
        load_progression: 1.0,
      },
      build: GoalCoefficients {
        protein_g_per_kg: 2.1,
        fat_g_per_kg: 1.0,
        calorie_offset: 300.0,
        load_progression: 1.10,
      },
      endurance: GoalCoefficients {
        protein_g_per_kg: 1.6,
        fat_g_per_kg: 0.9,
        calorie_offset: 250.0,
        load_progression: 1.07,
      },
      maintenance_kcal_per_kg: 33.0,
      calorie_tolerance_pct: 0.07,
      macro_tolerance_pct: 0.05,
      daily_load_share: 0.35,
      min_weekly_load: 120.0,
      unstable_adherence: 0.70,
      deload_factor: 0.85,
    }
  }
}

impl TargetsConfig {
  pub fn for_goal(&self, goal: GoalType) -> &GoalCoefficients {
    match goal {
      GoalType::Cut => &self.cut,
      GoalType::Maintain => &self.maintain,
      GoalType::Build => &self.build,
      GoalType::Endurance => &self.endurance,
    }
  }
}

/// Upper bounds for environment overrides
const MAX_WINDOW_DAYS: i64 = 365;
const MAX_REASONING_TIMEOUT_SECS: u64 = 3600;
/// One week
const MAX_IDLE_TIMEOUT_MINUTES: i64 = 7 * 24 * 60;

/// ---------------------------------------------------------------------------
/// Planner Configuration
/// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct PlannerConfig {
  /// Aggregation window length in days
  pub window_days: i64,

  /// Time constant (days) of the exponential load decay
  pub load_decay_days: f64,

  /// Failed verifications allowed before the session degrades to best-effort
  pub max_repair_cycles: u32,

  /// Attempts per reasoning call (timeouts, provider errors, malformed plans)
  pub max_reasoning_attempts: u32,

  /// Timeout of a single reasoning call
  pub reasoning_timeout: Duration,

  /// Athlete inactivity before a session is abandoned
  pub idle_timeout: chrono::Duration,

  /// Oldest acceptable weekly signal (days between window end and intake)
  pub max_signal_age_days: i64,

  pub targets: TargetsConfig,
}

impl Default for PlannerConfig {
  fn default() -> Self {
    Self {
      window_days: 7,
      load_decay_days: 7.0,
      max_repair_cycles: 3,
      max_reasoning_attempts: 3,
      reasoning_timeout: Duration::from_secs(90),
      idle_timeout: chrono::Duration::minutes(60),
      max_signal_age_days: 14,
      targets: TargetsConfig::default(),
    }
  }
}

impl PlannerConfig {
  /// Load a `.env` file if present, then read overrides from the environment
  pub fn load() -> Result<Self, PlanError> {
    dotenvy::dotenv().ok();
    Self::from_env()
  }

  /// Defaults overridden by any `PEAKFORM_*` variables that are set
  pub fn from_env() -> Result<Self, PlanError> {
    let mut config = Self::default();

    if let Some(days) = env_parse::<i64>("PEAKFORM_WINDOW_DAYS")? {
      config.window_days = check_range("PEAKFORM_WINDOW_DAYS", days, 2, MAX_WINDOW_DAYS)?;
    }
    if let Some(decay) = env_parse::<f64>("PEAKFORM_LOAD_DECAY_DAYS")? {
      if !decay.is_finite() || decay <= 0.0 {
        return Err(PlanError::Config("PEAKFORM_LOAD_DECAY_DAYS must be positive".into()));
      }
      config.load_decay_days = decay;
    }
    if let Some(pct) = env_parse::<f64>("PEAKFORM_CALORIE_TOLERANCE_PCT")? {
      config.targets.calorie_tolerance_pct = check_pct("PEAKFORM_CALORIE_TOLERANCE_PCT", pct)?;
    }
    if let Some(pct) = env_parse::<f64>("PEAKFORM_MACRO_TOLERANCE_PCT")? {
      config.targets.macro_tolerance_pct = check_pct("PEAKFORM_MACRO_TOLERANCE_PCT", pct)?;
    }
    if let Some(cycles) = env_parse::<u32>("PEAKFORM_MAX_REPAIR_CYCLES")? {
      if cycles == 0 {
        return Err(PlanError::Config("PEAKFORM_MAX_REPAIR_CYCLES must be at least 1".into()));
      }
      config.max_repair_cycles = cycles;
    }
    if let Some(attempts) = env_parse::<u32>("PEAKFORM_MAX_REASONING_ATTEMPTS")? {
      config.max_reasoning_attempts = attempts.max(1);
    }
    if let Some(secs) = env_parse::<u64>("PEAKFORM_REASONING_TIMEOUT_SECS")? {
      let secs = check_range("PEAKFORM_REASONING_TIMEOUT_SECS", secs, 1, MAX_REASONING_TIMEOUT_SECS)?;
      config.reasoning_timeout = Duration::from_secs(secs);
    }
    if let Some(minutes) = env_parse::<i64>("PEAKFORM_IDLE_TIMEOUT_MINUTES")? {
      let minutes = check_range("PEAKFORM_IDLE_TIMEOUT_MINUTES", minutes, 1, MAX_IDLE_TIMEOUT_MINUTES)?;
      config.idle_timeout = chrono::Duration::try_minutes(minutes)
        .ok_or_else(|| PlanError::Config(format!("PEAKFORM_IDLE_TIMEOUT_MINUTES out of range: {}", minutes)))?;
    }
    if let Some(days) = env_parse::<i64>("PEAKFORM_MAX_SIGNAL_AGE_DAYS")? {
      config.max_signal_age_days = check_range("PEAKFORM_MAX_SIGNAL_AGE_DAYS", days, 0, MAX_WINDOW_DAYS)?;
    }

    Ok(config)
  }
}

fn env_parse<T: FromStr>(key: &str) -> Result<Option<T>, PlanError> {
  match env::var(key) {
    Ok(raw) => raw
      .trim()
      .parse::<T>()
      .map(Some)
      .map_err(|_| PlanError::Config(format!("{} has an invalid value: '{}'", key, raw))),
    Err(_) => Ok(None),
  }
}

fn check_range<T: PartialOrd + std::fmt::Display>(key: &str, value: T, min: T, max: T) -> Result<T, PlanError> {
  if value >= min && value <= max {
    Ok(value)
  } else {
    Err(PlanError::Config(format!("{} must be between {} and {}, got {}", key, min, max, value)))
  }
}

fn check_pct(key: &str, pct: f64) -> Result<f64, PlanError> {
  if pct > 0.0 && pct < 1.0 {
    Ok(pct)
  } else {
    Err(PlanError::Config(format!("{} must be between 0 and 1, got {}", key, pct)))
  }
}

/// ---------------------------------------------------------------------------
/// Tests
/// ---------------------------------------------------------------------------
