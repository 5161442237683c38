use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// One training session from the activity export
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityRecord {
  pub started_at: DateTime<Utc>,
  pub activity_type: String,
  pub duration_seconds: i64,
  #[serde(default)]
  pub distance_meters: Option<f64>,
  #[serde(default)]
  pub average_heartrate: Option<i64>,
  /// Device-computed training load, preferred over derived stress
  #[serde(default)]
  pub training_load: Option<f64>,
}

impl ActivityRecord {
  pub fn date(&self) -> NaiveDate {
    self.started_at.date_naive()
  }
}

/// One logged day from the nutrition export
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NutritionRecord {
  pub date: NaiveDate,
  pub calories: f64,
  pub protein_g: f64,
  pub carbs_g: f64,
  pub fat_g: f64,
  #[serde(default)]
  pub trend_weight_kg: Option<f64>,
}

impl NutritionRecord {
  /// A row with zero calories is an empty placeholder, not a logged day
  pub fn is_logged(&self) -> bool {
    self.calories > 0.0
  }
}
