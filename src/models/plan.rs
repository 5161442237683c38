use std::collections::HashSet;
use std::ops::Add;

use chrono::Weekday;
use serde::{Deserialize, Serialize};

use crate::error::PlanError;

pub const KCAL_PER_G_PROTEIN: f64 = 4.0;
pub const KCAL_PER_G_CARB: f64 = 4.0;
pub const KCAL_PER_G_FAT: f64 = 9.0;

/// Calories implied by a macro split (4/4/9)
pub fn calories_from_macros(protein_g: f64, carbs_g: f64, fat_g: f64) -> f64 {
  protein_g * KCAL_PER_G_PROTEIN + carbs_g * KCAL_PER_G_CARB + fat_g * KCAL_PER_G_FAT
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Meal {
  pub name: String,
  pub protein_g: f64,
  pub carbs_g: f64,
  pub fat_g: f64,
  pub calories: f64,
}

impl Meal {
  /// Build a meal whose calories follow from its macros
  pub fn new(name: impl Into<String>, protein_g: f64, carbs_g: f64, fat_g: f64) -> Self {
    Self {
      name: name.into(),
      protein_g,
      carbs_g,
      fat_g,
      calories: calories_from_macros(protein_g, carbs_g, fat_g),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingBlock {
  /// e.g. "easy run", "intervals", "strength", "rest"
  #[serde(rename = "type")]
  pub kind: String,
  pub target_load: f64,
}

impl TrainingBlock {
  pub fn rest() -> Self {
    Self {
      kind: "rest".to_string(),
      target_load: 0.0,
    }
  }

  pub fn is_rest(&self) -> bool {
    self.kind.eq_ignore_ascii_case("rest")
  }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MacroTotals {
  pub calories: f64,
  pub protein_g: f64,
  pub carbs_g: f64,
  pub fat_g: f64,
}

impl Add for MacroTotals {
  type Output = MacroTotals;

  fn add(self, rhs: Self) -> Self::Output {
    MacroTotals {
      calories: self.calories + rhs.calories,
      protein_g: self.protein_g + rhs.protein_g,
      carbs_g: self.carbs_g + rhs.carbs_g,
      fat_g: self.fat_g + rhs.fat_g,
    }
  }
}

impl From<&Meal> for MacroTotals {
  fn from(meal: &Meal) -> Self {
    MacroTotals {
      calories: meal.calories,
      protein_g: meal.protein_g,
      carbs_g: meal.carbs_g,
      fat_g: meal.fat_g,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DayPlan {
  pub day: Weekday,
  pub training: TrainingBlock,
  pub meals: Vec<Meal>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub notes: Option<String>,
}

impl DayPlan {
  pub fn totals(&self) -> MacroTotals {
    self
      .meals
      .iter()
      .map(MacroTotals::from)
      .fold(MacroTotals::default(), |acc, m| acc + m)
  }
}

/// ---------------------------------------------------------------------------
/// Draft Plan
/// ---------------------------------------------------------------------------

/// Exactly seven days, one per weekday, ordered Monday to Sunday
///
/// Deserialization goes through `DraftPlan::new`, so a stored snapshot is held
/// to the same shape rules as a freshly parsed draft.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "DraftPlanRepr")]
pub struct DraftPlan {
  days: Vec<DayPlan>,
}

#[derive(Deserialize)]
struct DraftPlanRepr {
  days: Vec<DayPlan>,
}

impl TryFrom<DraftPlanRepr> for DraftPlan {
  type Error = PlanError;

  fn try_from(repr: DraftPlanRepr) -> Result<Self, Self::Error> {
    Self::new(repr.days)
  }
}

impl DraftPlan {
  pub fn new(mut days: Vec<DayPlan>) -> Result<Self, PlanError> {
    if days.len() != 7 {
      return Err(PlanError::MalformedPlan(format!(
        "expected 7 days, got {}",
        days.len()
      )));
    }

    let distinct: HashSet<Weekday> = days.iter().map(|d| d.day).collect();
    if distinct.len() != 7 {
      return Err(PlanError::MalformedPlan("each weekday must appear exactly once".into()));
    }

    if let Some(empty) = days.iter().find(|d| d.meals.is_empty()) {
      return Err(PlanError::MalformedPlan(format!("{} has no meals", empty.day)));
    }

    days.sort_by_key(|d| d.day.num_days_from_monday());
    Ok(Self { days })
  }

  pub fn days(&self) -> &[DayPlan] {
    &self.days
  }

  pub fn day(&self, weekday: Weekday) -> Option<&DayPlan> {
    self.days.iter().find(|d| d.day == weekday)
  }

  pub fn into_days(self) -> Vec<DayPlan> {
    self.days
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn day(weekday: Weekday) -> DayPlan {
    DayPlan {
      day: weekday,
      training: TrainingBlock::rest(),
      meals: vec![Meal::new("Yogurt bowl", 51.0, 30.0, 3.0)],
      notes: None,
    }
  }

  fn week() -> Vec<DayPlan> {
    [
      Weekday::Sun,
      Weekday::Mon,
      Weekday::Tue,
      Weekday::Wed,
      Weekday::Thu,
      Weekday::Fri,
      Weekday::Sat,
    ]
    .into_iter()
    .map(day)
    .collect()
  }

  #[test]
  fn test_meal_calories_from_macros() {
    let meal = Meal::new("Yogurt bowl", 51.0, 30.0, 3.0);
    assert_eq!(meal.calories, 51.0 * 4.0 + 30.0 * 4.0 + 27.0);
  }

  #[test]
  fn test_draft_orders_monday_first() {
    let plan = DraftPlan::new(week()).unwrap();
    assert_eq!(plan.days()[0].day, Weekday::Mon);
    assert_eq!(plan.days()[6].day, Weekday::Sun);
  }

  #[test]
  fn test_draft_rejects_wrong_shape() {
    let mut six = week();
    six.pop();
    assert!(matches!(DraftPlan::new(six), Err(PlanError::MalformedPlan(_))));

    let mut duplicate = week();
    duplicate[0].day = Weekday::Mon;
    assert!(DraftPlan::new(duplicate).is_err());

    let mut no_meals = week();
    no_meals[3].meals.clear();
    assert!(DraftPlan::new(no_meals).is_err());
  }

  #[test]
  fn test_deserialize_enforces_shape() {
    let plan = DraftPlan::new(week()).unwrap();
    let json = serde_json::to_value(&plan).unwrap();
    let back: DraftPlan = serde_json::from_value(json.clone()).unwrap();
    assert_eq!(back, plan);

    // Drop Sunday from the stored form
    let mut six = json;
    six["days"].as_array_mut().unwrap().pop();
    let err = serde_json::from_value::<DraftPlan>(six).unwrap_err();
    assert!(err.to_string().contains("expected 7 days"));
  }

  #[test]
  fn test_day_totals_sum_meals() {
    let mut d = day(Weekday::Mon);
    d.meals.push(Meal::new("Jambalaya", 31.0, 100.0, 10.0));
    let totals = d.totals();
    assert_eq!(totals.protein_g, 82.0);
    assert_eq!(totals.carbs_g, 130.0);
    assert_eq!(totals.fat_g, 13.0);
  }
}
