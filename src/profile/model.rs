//! Profile and version-ledger data models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Map;
use uuid::Uuid;

use crate::error::ProfileError;
use crate::onboarding::state::{FIRST_STATE, LAST_STATE, domain_key};

/// Training experience level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExperienceLevel {
    Beginner,
    Intermediate,
    Advanced,
}

/// Day-to-day activity level outside training.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityLevel {
    Sedentary,
    Light,
    Moderate,
    High,
}

/// Preferred time of day for training.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PreferredTime {
    Morning,
    Afternoon,
    Evening,
}

/// Target workout intensity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intensity {
    Low,
    Moderate,
    High,
}

/// Self-reported stress level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StressLevel {
    Low,
    Moderate,
    High,
}

/// How physically active the user's occupation is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OccupationActivity {
    Seated,
    Mixed,
    OnFeet,
}

/// State 1 — fitness goals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FitnessGoals {
    pub goals: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub motivation: Option<String>,
}

/// State 2 — experience and baseline activity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FitnessAssessment {
    pub experience_level: ExperienceLevel,
    pub current_activity: ActivityLevel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub training_years: Option<u32>,
}

/// State 3 — equipment, injuries, and other limitations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WorkoutConstraints {
    pub equipment: Vec<String>,
    pub injuries: Vec<String>,
    pub limitations: Vec<String>,
}

/// State 4 — weekly schedule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TrainingSchedule {
    pub days_per_week: u8,
    pub session_minutes: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_time: Option<PreferredTime>,
}

/// State 5 — style and intensity preferences.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WorkoutPlanning {
    pub preferred_styles: Vec<String>,
    pub intensity: Intensity,
}

/// State 6 — current eating habits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NutritionHabits {
    pub meals_per_day: u8,
    pub dietary_restrictions: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cooks_at_home: Option<bool>,
}

/// State 7 — macro split and optional calorie target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NutritionTargets {
    pub protein_pct: u8,
    pub carbs_pct: u8,
    pub fat_pct: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub calorie_target: Option<u32>,
}

/// State 8 — sleep, stress, occupation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Lifestyle {
    pub sleep_hours: f64,
    pub stress_level: StressLevel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub occupation_activity: Option<OccupationActivity>,
}

/// State 9 — body measurements.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BodyMetrics {
    pub height_cm: f64,
    pub weight_kg: f64,
    pub age: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body_fat_pct: Option<f64>,
}

/// All domain attributes assembled from a completed onboarding context.
///
/// Field names match the onboarding domain keys, so the completed context
/// deserializes directly into this struct.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileAttributes {
    pub fitness_goals: FitnessGoals,
    pub fitness_assessment: FitnessAssessment,
    pub workout_constraints: WorkoutConstraints,
    pub training_schedule: TrainingSchedule,
    pub workout_planning: WorkoutPlanning,
    pub nutrition_habits: NutritionHabits,
    pub nutrition_targets: NutritionTargets,
    pub lifestyle: Lifestyle,
    pub body_metrics: BodyMetrics,
}

impl ProfileAttributes {
    /// Build the attributes from a completed onboarding context.
    ///
    /// Each of the 9 domain sections must be present and well-formed; the
    /// first missing or malformed section is reported.
    pub fn from_context(
        context: &Map<String, serde_json::Value>,
    ) -> Result<Self, ProfileError> {
        for state in FIRST_STATE..=LAST_STATE {
            let key = domain_key(state).unwrap_or_default();
            if !context.contains_key(key) {
                return Err(ProfileError::MalformedContext {
                    section: key.to_string(),
                    reason: "section missing from context".to_string(),
                });
            }
        }
        serde_json::from_value(serde_json::Value::Object(context.clone())).map_err(|e| {
            ProfileError::MalformedContext {
                section: "context".to_string(),
                reason: e.to_string(),
            }
        })
    }
}

/// A user's materialized profile. At most one non-deleted profile per user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    pub id: Uuid,
    pub user_id: String,
    /// Locked profiles reject mutation unless the caller explicitly unlocks.
    pub locked: bool,
    pub attributes: ProfileAttributes,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Profile {
    /// A freshly materialized profile. Always starts locked.
    pub fn new(user_id: impl Into<String>, attributes: ProfileAttributes) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.into(),
            locked: true,
            attributes,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Reason recorded on the first version of every profile.
pub const INITIAL_VERSION_REASON: &str = "onboarding completed";

/// One row of the append-only version ledger.
///
/// `snapshot` is the full serialized profile *after* the mutation that
/// produced this version; rows are never updated or deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileVersion {
    pub id: Uuid,
    pub profile_id: Uuid,
    pub version_number: i64,
    pub reason: String,
    pub snapshot: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl ProfileVersion {
    pub fn new(
        profile_id: Uuid,
        version_number: i64,
        reason: impl Into<String>,
        snapshot: serde_json::Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            profile_id,
            version_number,
            reason: reason.into(),
            snapshot,
            created_at: Utc::now(),
        }
    }
}
