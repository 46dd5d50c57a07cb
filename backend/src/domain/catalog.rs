//! Seam to the external exercise catalog.
//!
//! The catalog itself (storage, search, filters) lives outside this service.
//! What belongs here is the add-time snapshot rule: when a user adds a
//! catalog exercise to their plan we copy the display fields into the
//! `WorkoutExercise` instead of keeping a live reference, so later catalog
//! edits never rewrite a user's history.

use uuid::Uuid;

use shared::{AddExerciseRequest, WorkoutExercise};

/// Generate a unique id for a planned exercise
pub fn generate_exercise_id() -> String {
    format!("exercise_{}", Uuid::new_v4().simple())
}

/// Freeze a catalog record plus the user's prescription into a planned
/// exercise. `order` is assigned by the caller once the target day is known.
pub fn snapshot_from_catalog(request: &AddExerciseRequest) -> WorkoutExercise {
    WorkoutExercise {
        id: generate_exercise_id(),
        exercise_id: request.exercise.id.clone(),
        name: request.exercise.name.clone(),
        sets: request.sets,
        reps: request.reps,
        weight: request.weight,
        duration: request.duration,
        notes: request.notes.clone(),
        image_url: None,
        gif_url: request.exercise.gif_url.clone(),
        order: 0,
    }
}
