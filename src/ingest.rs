//! Ingestion boundary
//!
//! Vendor exports are converted to typed records before they reach the
//! aggregator. This module defines the loader interfaces plus a loader for
//! exports already normalized to JSON arrays of records. Records come back
//! time-ordered, as `analysis::aggregate` requires.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::PlanError;
use crate::models::{ActivityRecord, NutritionRecord};

pub trait ActivityLoader {
  fn load_activity(&self, path: &Path) -> Result<Vec<ActivityRecord>, PlanError>;
}

pub trait NutritionLoader {
  fn load_nutrition(&self, path: &Path) -> Result<Vec<NutritionRecord>, PlanError>;
}

/// Loads `.json` files holding an array of records
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonRecordLoader;

impl JsonRecordLoader {
  pub fn activity_from_reader<R: Read>(reader: R) -> Result<Vec<ActivityRecord>, PlanError> {
    let mut records: Vec<ActivityRecord> = parse_records(reader, "activity")?;
    records.sort_by_key(|r| r.started_at);
    Ok(records)
  }

  pub fn nutrition_from_reader<R: Read>(reader: R) -> Result<Vec<NutritionRecord>, PlanError> {
    let mut records: Vec<NutritionRecord> = parse_records(reader, "nutrition")?;
    records.sort_by_key(|r| r.date);
    Ok(records)
  }
}

impl ActivityLoader for JsonRecordLoader {
  fn load_activity(&self, path: &Path) -> Result<Vec<ActivityRecord>, PlanError> {
    let records = Self::activity_from_reader(open_json(path)?)?;
    debug!(path = %path.display(), count = records.len(), "load_activity: loaded");
    Ok(records)
  }
}

impl NutritionLoader for JsonRecordLoader {
  fn load_nutrition(&self, path: &Path) -> Result<Vec<NutritionRecord>, PlanError> {
    let records = Self::nutrition_from_reader(open_json(path)?)?;
    debug!(path = %path.display(), count = records.len(), "load_nutrition: loaded");
    Ok(records)
  }
}

fn open_json(path: &Path) -> Result<BufReader<File>, PlanError> {
  let is_json = path
    .extension()
    .and_then(|e| e.to_str())
    .is_some_and(|e| e.eq_ignore_ascii_case("json"));
  if !is_json {
    return Err(PlanError::UnsupportedFormat(format!(
      "{}: expected a .json export",
      path.display()
    )));
  }

  let file = File::open(path).map_err(|e| PlanError::InvalidInput(format!("{}: {}", path.display(), e)))?;
  Ok(BufReader::new(file))
}

fn parse_records<T: DeserializeOwned, R: Read>(reader: R, kind: &str) -> Result<Vec<T>, PlanError> {
  serde_json::from_reader(reader)
    .map_err(|e| PlanError::UnsupportedFormat(format!("{} export does not match the record schema: {}", kind, e)))
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::test_utils::date;

  #[test]
  fn test_activity_sorted_by_start() {
    let json = r#"[
      {"started_at": "2025-03-05T07:00:00Z", "activity_type": "Run", "duration_seconds": 3600, "training_load": 62.0},
      {"started_at": "2025-03-03T07:00:00Z", "activity_type": "Strength", "duration_seconds": 2700}
    ]"#;
    let records = JsonRecordLoader::activity_from_reader(json.as_bytes()).unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].activity_type, "Strength");
    assert_eq!(records[0].training_load, None);
    assert_eq!(records[1].date(), date(2025, 3, 5));
  }

  #[test]
  fn test_nutrition_schema_mismatch() {
    let json = r#"[{"Date": "2025-03-03", "Calories (kcal)": 2400}]"#;
    let err = JsonRecordLoader::nutrition_from_reader(json.as_bytes()).unwrap_err();
    assert!(matches!(err, PlanError::UnsupportedFormat(_)));
  }

  #[test]
  fn test_nutrition_parses() {
    let json = r#"[
      {"date": "2025-03-04", "calories": 2350, "protein_g": 150, "carbs_g": 260, "fat_g": 70, "trend_weight_kg": 70.2},
      {"date": "2025-03-03", "calories": 2400, "protein_g": 145, "carbs_g": 280, "fat_g": 72}
    ]"#;
    let records = JsonRecordLoader::nutrition_from_reader(json.as_bytes()).unwrap();
    assert_eq!(records[0].date, date(2025, 3, 3));
    assert_eq!(records[1].trend_weight_kg, Some(70.2));
  }

  #[test]
  fn test_non_json_path_rejected() {
    let err = JsonRecordLoader
      .load_activity(Path::new("activities.xlsx"))
      .unwrap_err();
    assert!(matches!(err, PlanError::UnsupportedFormat(_)));
  }
}
