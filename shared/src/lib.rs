use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Weekday names in day-index order (0 = Sunday .. 6 = Saturday)
pub const DAY_NAMES: [&str; 7] = [
    "sunday",
    "monday",
    "tuesday",
    "wednesday",
    "thursday",
    "friday",
    "saturday",
];

/// Name for a day index (0 = Sunday .. 6 = Saturday)
pub fn day_name(day_index: usize) -> Option<&'static str> {
    DAY_NAMES.get(day_index).copied()
}

/// A single planned exercise inside a day template.
///
/// Catalog fields (`name`, `image_url`, `gif_url`) are denormalized snapshots
/// taken when the exercise was added, not live references into the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkoutExercise {
    pub id: String,
    /// ID of the catalog exercise this entry was created from
    pub exercise_id: String,
    /// Name snapshot taken at add-time
    pub name: String,
    pub sets: u32,
    pub reps: u32,
    pub weight: f64,
    /// Duration in seconds, for timed exercises (plank, cardio)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<u32>,
    #[serde(default)]
    pub notes: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gif_url: Option<String>,
    /// Explicit position within the day (0-based)
    pub order: u32,
}

/// An exercise inside a day log: the planned exercise plus completion state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggedExercise {
    #[serde(flatten)]
    pub exercise: WorkoutExercise,
    pub completed: bool,
}

impl LoggedExercise {
    /// Wrap a planned exercise with a completion flag
    pub fn from_exercise(exercise: WorkoutExercise, completed: bool) -> Self {
        Self {
            exercise,
            completed,
        }
    }
}

/// The planned exercises for one weekday within a template range
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DayTemplate {
    pub exercises: Vec<WorkoutExercise>,
    /// RFC 3339 timestamp of the last edit to this day
    pub updated_at: String,
}

impl DayTemplate {
    pub fn empty(now: &str) -> Self {
        Self {
            exercises: Vec::new(),
            updated_at: now.to_string(),
        }
    }
}

/// The seven day templates of a weekly plan, keyed by weekday name on the wire
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeekPlan {
    pub sunday: DayTemplate,
    pub monday: DayTemplate,
    pub tuesday: DayTemplate,
    pub wednesday: DayTemplate,
    pub thursday: DayTemplate,
    pub friday: DayTemplate,
    pub saturday: DayTemplate,
}

impl WeekPlan {
    /// A plan with seven empty day templates
    pub fn empty(now: &str) -> Self {
        Self {
            sunday: DayTemplate::empty(now),
            monday: DayTemplate::empty(now),
            tuesday: DayTemplate::empty(now),
            wednesday: DayTemplate::empty(now),
            thursday: DayTemplate::empty(now),
            friday: DayTemplate::empty(now),
            saturday: DayTemplate::empty(now),
        }
    }

    /// Day template by index (0 = Sunday .. 6 = Saturday)
    pub fn day(&self, day_index: usize) -> Option<&DayTemplate> {
        match day_index {
            0 => Some(&self.sunday),
            1 => Some(&self.monday),
            2 => Some(&self.tuesday),
            3 => Some(&self.wednesday),
            4 => Some(&self.thursday),
            5 => Some(&self.friday),
            6 => Some(&self.saturday),
            _ => None,
        }
    }

    /// Mutable day template by index (0 = Sunday .. 6 = Saturday)
    pub fn day_mut(&mut self, day_index: usize) -> Option<&mut DayTemplate> {
        match day_index {
            0 => Some(&mut self.sunday),
            1 => Some(&mut self.monday),
            2 => Some(&mut self.tuesday),
            3 => Some(&mut self.wednesday),
            4 => Some(&mut self.thursday),
            5 => Some(&mut self.friday),
            6 => Some(&mut self.saturday),
            _ => None,
        }
    }
}

/// A versioned, time-bounded weekly template.
///
/// Ranges form a per-user timeline: `start_week_id` is inclusive and
/// mandatory, `end_week_id` is inclusive and absent for the open-ended
/// ("indefinite") range. At most one range per user is open-ended at a time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateRange {
    pub user_id: String,
    pub template_id: String,
    /// Optional display name ("Holiday Routine", "Bulk Phase", ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// First week this template applies to, `YYYY-Wnn`
    pub start_week_id: String,
    /// Last week this template applies to; absent = indefinite
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_week_id: Option<String>,
    pub is_active: bool,
    #[serde(flatten)]
    pub plan: WeekPlan,
    pub created_at: String,
    pub updated_at: String,
}

/// The persisted record of one calendar day's workout, unique per (user, date)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DayWorkoutLog {
    pub user_id: String,
    /// Calendar date, `YYYY-MM-DD`
    pub date: String,
    /// Week this date falls in, `YYYY-Wnn`
    pub week_id: String,
    /// 0 = Sunday .. 6 = Saturday
    pub day_of_week: u8,
    pub exercises: Vec<LoggedExercise>,
    /// Day-level completion flag, independent of per-exercise flags
    pub completed: bool,
    pub created_at: String,
    pub updated_at: String,
}

/// One week's worth of day logs keyed by day index ("0".."6").
///
/// An in-memory projection assembled per request; days with neither a
/// persisted log nor a template entry are simply absent. Never stored.
pub type WeeklyWorkoutData = BTreeMap<String, DayWorkoutLog>;

/// An exercise record as supplied by the external catalog service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogExercise {
    pub id: String,
    pub name: String,
    pub body_part: String,
    pub equipment: String,
    pub target: String,
    #[serde(default)]
    pub secondary_muscles: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gif_url: Option<String>,
}

/// Request body for POST /api/template-ranges
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpsertTemplateRangeRequest {
    pub start_week_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(flatten)]
    pub plan: WeekPlan,
}

/// Request body for POST /api/day-workout-logs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpsertDayLogRequest {
    pub date: String,
    pub week_id: String,
    pub day_of_week: u8,
    pub exercises: Vec<LoggedExercise>,
    #[serde(default)]
    pub completed: bool,
}

/// Request body for POST /api/workouts/days/{day}/exercises.
///
/// Carries the catalog record plus the user's prescription; the server takes
/// the denormalized snapshot so catalog fields are frozen at add-time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddExerciseRequest {
    pub exercise: CatalogExercise,
    pub sets: u32,
    pub reps: u32,
    #[serde(default)]
    pub weight: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<u32>,
    #[serde(default)]
    pub notes: String,
}

/// Partial update for a single exercise; absent fields are left unchanged
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExercisePatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sets: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reps: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gif_url: Option<String>,
}

impl ExercisePatch {
    /// Apply this patch to an exercise, overwriting only the present fields
    pub fn apply_to(&self, exercise: &mut WorkoutExercise) {
        if let Some(name) = &self.name {
            exercise.name = name.clone();
        }
        if let Some(sets) = self.sets {
            exercise.sets = sets;
        }
        if let Some(reps) = self.reps {
            exercise.reps = reps;
        }
        if let Some(weight) = self.weight {
            exercise.weight = weight;
        }
        if let Some(duration) = self.duration {
            exercise.duration = Some(duration);
        }
        if let Some(notes) = &self.notes {
            exercise.notes = notes.clone();
        }
        if let Some(image_url) = &self.image_url {
            exercise.image_url = Some(image_url.clone());
        }
        if let Some(gif_url) = &self.gif_url {
            exercise.gif_url = Some(gif_url.clone());
        }
    }
}

/// Request body for POST /api/workouts/days/{day}/reorder
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReorderExercisesRequest {
    /// Exercise ids in their new order; unknown ids are dropped
    pub exercise_ids: Vec<String>,
}

/// Stable error payload returned by every failing API call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}
