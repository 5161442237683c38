pub mod plan;
pub mod profile;
pub mod records;

pub use plan::{DayPlan, DraftPlan, MacroTotals, Meal, TrainingBlock};
pub use profile::{AthleteProfile, Biofeedback, GoalType, Mesocycle, MesocycleKind};
pub use records::{ActivityRecord, NutritionRecord};
