use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::plan::Meal;
use crate::error::PlanError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GoalType {
  Cut,
  Maintain,
  Build,
  Endurance,
}

impl std::fmt::Display for GoalType {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      Self::Cut => write!(f, "cut"),
      Self::Maintain => write!(f, "maintain"),
      Self::Build => write!(f, "build"),
      Self::Endurance => write!(f, "endurance"),
    }
  }
}

impl std::str::FromStr for GoalType {
  type Err = PlanError;
  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_lowercase().as_str() {
      "cut" => Ok(Self::Cut),
      "maintain" | "maintenance" => Ok(Self::Maintain),
      "build" => Ok(Self::Build),
      "endurance" => Ok(Self::Endurance),
      other => Err(PlanError::InvalidInput(format!("Unknown goal type: {}", other))),
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MesocycleKind {
  BaseBuild,
  StrengthBlock,
  Peak,
  Taper,
  Maintenance,
}

/// Position within the current training block ("week 3 of 8, base build")
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mesocycle {
  pub week: u8,
  pub length: u8,
  pub kind: MesocycleKind,
}

impl Mesocycle {
  pub fn validate(&self) -> Result<(), PlanError> {
    if ![4, 8, 12, 16].contains(&self.length) {
      return Err(PlanError::InvalidInput(format!(
        "Mesocycle length must be 4, 8, 12 or 16 weeks, got {}",
        self.length
      )));
    }
    if self.week == 0 || self.week > self.length {
      return Err(PlanError::InvalidInput(format!(
        "Mesocycle week {} is outside 1..={}",
        self.week, self.length
      )));
    }
    Ok(())
  }

  pub fn is_deload(&self) -> bool {
    self.kind == MesocycleKind::Taper
  }
}

/// ---------------------------------------------------------------------------
/// Athlete Profile
/// ---------------------------------------------------------------------------

/// User-editable attributes that drive target derivation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AthleteProfile {
  pub body_weight_kg: f64,
  pub goal: GoalType,
  pub training_days_per_week: u8,

  /// Free-form tags, e.g. "vegetarian", "no_dairy"
  #[serde(default)]
  pub dietary_constraints: BTreeSet<String>,

  /// Measured expenditure from the nutrition app, overrides the per-kg estimate
  #[serde(default)]
  pub maintenance_kcal: Option<f64>,

  /// Lactate threshold HR for HR-based session stress
  #[serde(default)]
  pub threshold_hr: Option<i64>,

  #[serde(default)]
  pub mesocycle: Option<Mesocycle>,

  /// Meals the athlete already cooks, with per-serving macros
  #[serde(default)]
  pub meal_rotation: Vec<Meal>,

  /// Whether drafts may introduce meals outside the rotation
  #[serde(default)]
  pub allow_new_meals: bool,
}

impl AthleteProfile {
  pub fn new(body_weight_kg: f64, goal: GoalType, training_days_per_week: u8) -> Self {
    Self {
      body_weight_kg,
      goal,
      training_days_per_week,
      dietary_constraints: BTreeSet::new(),
      maintenance_kcal: None,
      threshold_hr: None,
      mesocycle: None,
      meal_rotation: Vec::new(),
      allow_new_meals: false,
    }
  }

  pub fn validate(&self) -> Result<(), PlanError> {
    if !(self.body_weight_kg > 0.0 && self.body_weight_kg <= 400.0) {
      return Err(PlanError::InvalidInput(format!(
        "Body weight must be in (0, 400] kg, got {}",
        self.body_weight_kg
      )));
    }
    if !(1..=7).contains(&self.training_days_per_week) {
      return Err(PlanError::InvalidInput(format!(
        "Training days per week must be 1-7, got {}",
        self.training_days_per_week
      )));
    }
    if let Some(kcal) = self.maintenance_kcal {
      if kcal <= 0.0 {
        return Err(PlanError::InvalidInput("Maintenance calories must be positive".into()));
      }
    }
    if let Some(mesocycle) = &self.mesocycle {
      mesocycle.validate()?;
    }
    Ok(())
  }
}

/// ---------------------------------------------------------------------------
/// Subjective Biofeedback
/// ---------------------------------------------------------------------------

/// Weekly self-report collected at intake. Scores are 1-10.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Biofeedback {
  /// 1 = terrible, 10 = perfect
  pub sleep: u8,
  /// 1 = never hungry, 10 = ravenous
  pub hunger: u8,
  /// 1 = very easy week, 10 = maximal
  pub rpe: u8,
  #[serde(default)]
  pub notes: String,
  /// Last week's plan as the athlete pasted it
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub previous_plan: Option<String>,
}

impl Default for Biofeedback {
  fn default() -> Self {
    Self {
      sleep: 5,
      hunger: 5,
      rpe: 5,
      notes: String::new(),
      previous_plan: None,
    }
  }
}

impl Biofeedback {
  pub fn validate(&self) -> Result<(), PlanError> {
    for (name, score) in [("sleep", self.sleep), ("hunger", self.hunger), ("rpe", self.rpe)] {
      if !(1..=10).contains(&score) {
        return Err(PlanError::InvalidInput(format!(
          "{} score must be 1-10, got {}",
          name, score
        )));
      }
    }
    Ok(())
  }

  /// Pasted previous plan, if it has any content
  pub fn previous_plan(&self) -> Option<&str> {
    self.previous_plan.as_deref().map(str::trim).filter(|p| !p.is_empty())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_profile_validation() {
    assert!(AthleteProfile::new(70.0, GoalType::Build, 5).validate().is_ok());
    assert!(AthleteProfile::new(0.0, GoalType::Build, 5).validate().is_err());
    assert!(AthleteProfile::new(70.0, GoalType::Build, 0).validate().is_err());
    assert!(AthleteProfile::new(70.0, GoalType::Build, 8).validate().is_err());

    let mut profile = AthleteProfile::new(70.0, GoalType::Cut, 4);
    profile.mesocycle = Some(Mesocycle {
      week: 9,
      length: 8,
      kind: MesocycleKind::BaseBuild,
    });
    assert!(profile.validate().is_err());
  }

  #[test]
  fn test_biofeedback_range() {
    assert!(Biofeedback::default().validate().is_ok());
    let bad = Biofeedback {
      rpe: 11,
      ..Biofeedback::default()
    };
    assert!(matches!(bad.validate(), Err(PlanError::InvalidInput(_))));
  }

  #[test]
  fn test_previous_plan_blank_is_absent() {
    let mut feedback: Biofeedback = serde_json::from_str(r#"{"sleep": 6, "hunger": 4, "rpe": 7}"#).unwrap();
    assert_eq!(feedback.previous_plan(), None);

    feedback.previous_plan = Some("   \n".into());
    assert_eq!(feedback.previous_plan(), None);

    feedback.previous_plan = Some("Mon: 8 km easy\n".into());
    assert_eq!(feedback.previous_plan(), Some("Mon: 8 km easy"));
  }

  #[test]
  fn test_goal_parse_roundtrip() {
    for goal in [GoalType::Cut, GoalType::Maintain, GoalType::Build, GoalType::Endurance] {
      assert_eq!(goal.to_string().parse::<GoalType>().unwrap(), goal);
    }
    assert!("bulk".parse::<GoalType>().is_err());
  }
}
