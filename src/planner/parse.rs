//! Defensive parsing of reasoning output
//!
//! Providers return prose around JSON, numbers as strings, and the occasional
//! alias for a field name. Anything that still lacks a required field is a
//! `MalformedPlan`, which the engine retries with a clarified prompt.

use chrono::Weekday;
use serde_json::{Map, Value};

use crate::error::PlanError;
use crate::models::plan::calories_from_macros;
use crate::models::{DayPlan, DraftPlan, Meal, TrainingBlock};
use crate::reasoning::RawResponse;

/// Extract JSON from a provider response (handles markdown code blocks)
pub fn extract_json(text: &str) -> Result<&str, PlanError> {
  let trimmed = text.trim();
  // A reply that opens with JSON may still trail off into prose
  if trimmed.starts_with('{') && serde_json::from_str::<serde::de::IgnoredAny>(trimmed).is_ok() {
    return Ok(trimmed);
  }

  // Look for JSON in code blocks
  if let Some(start) = text.find("```json") {
    let start = start + 7;
    if let Some(end) = text[start..].find("```") {
      return Ok(text[start..start + end].trim());
    }
  }

  // Look for plain code blocks
  if let Some(start) = text.find("```") {
    let start = start + 3;
    // Skip language identifier if present
    let content_start = text[start..].find('\n').map(|i| start + i + 1).unwrap_or(start);
    if let Some(end) = text[content_start..].find("```") {
      return Ok(text[content_start..content_start + end].trim());
    }
  }

  // Last resort: find first { to last }
  if let (Some(start), Some(end)) = (text.find('{'), text.rfind('}')) {
    if start < end {
      return Ok(&text[start..=end]);
    }
  }

  Err(PlanError::MalformedPlan("no JSON object found in response".to_string()))
}

/// Strategy proposals are free text; a structured reply may wrap it in `strategy`
pub fn parse_strategy(raw: &RawResponse) -> Result<String, PlanError> {
  let text = match raw {
    RawResponse::Text(text) => text.trim().to_string(),
    RawResponse::Structured(value) => match value.get("strategy").and_then(Value::as_str) {
      Some(s) => s.trim().to_string(),
      None => value.to_string(),
    },
  };

  if text.is_empty() {
    return Err(PlanError::MalformedPlan("empty strategy proposal".to_string()));
  }
  Ok(text)
}

/// Parse a candidate 7-day plan
pub fn parse_draft(raw: &RawResponse) -> Result<DraftPlan, PlanError> {
  let value = match raw {
    RawResponse::Structured(value) => value.clone(),
    RawResponse::Text(text) => serde_json::from_str(extract_json(text)?)
      .map_err(|e| PlanError::MalformedPlan(format!("invalid JSON: {}", e)))?,
  };

  let days = match &value {
    Value::Array(days) => days,
    Value::Object(obj) => obj
      .get("days")
      .or_else(|| obj.get("plan"))
      .and_then(Value::as_array)
      .ok_or_else(|| PlanError::MalformedPlan("missing 'days' array".to_string()))?,
    _ => return Err(PlanError::MalformedPlan("expected a JSON object".to_string())),
  };

  let days = days
    .iter()
    .enumerate()
    .map(|(i, day)| parse_day(day).map_err(|e| PlanError::MalformedPlan(format!("day {}: {}", i + 1, e))))
    .collect::<Result<Vec<DayPlan>, PlanError>>()?;

  DraftPlan::new(days)
}

/// ---------------------------------------------------------------------------
/// Field Helpers
/// ---------------------------------------------------------------------------

fn parse_day(value: &Value) -> Result<DayPlan, String> {
  let obj = value.as_object().ok_or("not an object")?;

  let day_name = string_field(obj, &["day", "weekday"]).ok_or("missing 'day'")?;
  let day = day_name
    .parse::<Weekday>()
    .map_err(|_| format!("unknown weekday '{}'", day_name))?;

  let training = obj
    .get("training")
    .or_else(|| obj.get("workout"))
    .ok_or("missing 'training'")?;
  let training = parse_training(training)?;

  let meals = obj
    .get("meals")
    .and_then(Value::as_array)
    .ok_or("missing 'meals' array")?
    .iter()
    .map(parse_meal)
    .collect::<Result<Vec<Meal>, String>>()?;

  Ok(DayPlan {
    day,
    training,
    meals,
    notes: string_field(obj, &["notes"]),
  })
}

fn parse_training(value: &Value) -> Result<TrainingBlock, String> {
  // "training": "rest"
  if let Some(kind) = value.as_str() {
    let block = TrainingBlock {
      kind: kind.trim().to_string(),
      target_load: 0.0,
    };
    return if block.is_rest() {
      Ok(block)
    } else {
      Err(format!("training '{}' has no target_load", kind))
    };
  }

  let obj = value.as_object().ok_or("'training' is not an object")?;
  let kind = string_field(obj, &["type", "kind", "name"]).ok_or("training is missing 'type'")?;

  let target_load = match number_field(obj, &["target_load", "load"])? {
    Some(load) => load,
    None if kind.eq_ignore_ascii_case("rest") => 0.0,
    None => return Err(format!("training '{}' has no target_load", kind)),
  };

  Ok(TrainingBlock { kind, target_load })
}

fn parse_meal(value: &Value) -> Result<Meal, String> {
  let obj = value.as_object().ok_or("meal is not an object")?;
  let name = string_field(obj, &["name", "meal"]).ok_or("meal is missing 'name'")?;

  let required = |keys: &[&str]| -> Result<f64, String> {
    number_field(obj, keys)?.ok_or_else(|| format!("meal '{}' is missing '{}'", name, keys[0]))
  };
  let protein_g = required(&["protein_g", "protein"])?;
  let carbs_g = required(&["carbs_g", "carbs", "carbohydrates_g"])?;
  let fat_g = required(&["fat_g", "fat"])?;
  let calories = number_field(obj, &["calories", "kcal"])?
    .unwrap_or_else(|| calories_from_macros(protein_g, carbs_g, fat_g));

  Ok(Meal {
    name,
    protein_g,
    carbs_g,
    fat_g,
    calories,
  })
}

fn string_field(obj: &Map<String, Value>, keys: &[&str]) -> Option<String> {
  keys
    .iter()
    .filter_map(|k| obj.get(*k))
    .filter_map(Value::as_str)
    .map(|s| s.trim().to_string())
    .find(|s| !s.is_empty())
}

/// First present key wins; accepts numbers and numeric strings like "147" or "147g"
fn number_field(obj: &Map<String, Value>, keys: &[&str]) -> Result<Option<f64>, String> {
  let Some((key, value)) = keys.iter().find_map(|k| obj.get(*k).map(|v| (*k, v))) else {
    return Ok(None);
  };

  let number = match value {
    Value::Number(n) => n.as_f64(),
    Value::String(s) => s
      .trim()
      .trim_end_matches(|c: char| c.is_ascii_alphabetic())
      .trim()
      .parse::<f64>()
      .ok(),
    Value::Null => return Ok(None),
    _ => None,
  };

  match number {
    Some(n) if n.is_finite() && n >= 0.0 => Ok(Some(n)),
    _ => Err(format!("'{}' is not a non-negative number: {}", key, value)),
  }
}

/// ---------------------------------------------------------------------------
/// Tests
/// ---------------------------------------------------------------------------
