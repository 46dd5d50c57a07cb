//! Day/exercise mutation engine.
//!
//! Operations either edit the template (affecting this week onward) or a
//! specific day's log (affecting history). Template edits always target the
//! range starting at today's week, never the week being viewed, so editing
//! while browsing history still writes to "now". Callers pass `today`
//! explicitly.

use chrono::{NaiveDate, Utc};
use tracing::info;

use shared::{
    AddExerciseRequest, DayWorkoutLog, ExercisePatch, LoggedExercise, TemplateRange,
    UpsertDayLogRequest, WeekPlan,
};

use crate::db::DbConnection;
use crate::domain::catalog;
use crate::domain::timeline::TimelineService;
use crate::domain::week::{date_for_day, week_start_date, WeekId};
use crate::domain::weekly_log::synthesize_day_log;
use crate::error::{AppError, AppResult};

/// Service applying user mutations to templates and day logs
#[derive(Clone)]
pub struct WorkoutService {
    db: DbConnection,
    timeline: TimelineService,
}

impl WorkoutService {
    pub fn new(db: DbConnection) -> Self {
        let timeline = TimelineService::new(db.clone());
        Self { db, timeline }
    }

    fn checked_day(day: usize) -> AppResult<usize> {
        if day > 6 {
            return Err(AppError::Validation(format!(
                "day index {day} out of range (expected 0..=6)"
            )));
        }
        Ok(day)
    }

    fn day_date(today: NaiveDate, day: usize) -> String {
        date_for_day(week_start_date(today), day)
            .format("%Y-%m-%d")
            .to_string()
    }

    /// Today's effective plan, or seven empty day templates on first write
    async fn effective_plan(&self, user_id: &str, week: WeekId, now: &str) -> AppResult<WeekPlan> {
        Ok(self
            .timeline
            .resolve_template_for_week(user_id, week)
            .await?
            .map(|range| range.plan)
            .unwrap_or_else(|| WeekPlan::empty(now)))
    }

    /// Add a catalog exercise to a weekday.
    ///
    /// Appends to the template (lazily created) at the end of the day's
    /// list, and mirrors the addition into the day's persisted log if one
    /// exists in the current week.
    pub async fn add_exercise(
        &self,
        user_id: &str,
        today: NaiveDate,
        day: usize,
        request: AddExerciseRequest,
    ) -> AppResult<TemplateRange> {
        let day = Self::checked_day(day)?;
        let week = WeekId::from_date(today);
        let now = Utc::now().to_rfc3339();

        let mut plan = self.effective_plan(user_id, week, &now).await?;
        let mut exercise = catalog::snapshot_from_catalog(&request);
        {
            let day_template = plan
                .day_mut(day)
                .ok_or_else(|| AppError::Validation(format!("day index {day} out of range")))?;
            exercise.order = day_template.exercises.len() as u32;
            day_template.exercises.push(exercise.clone());
            day_template.updated_at = now.clone();
        }

        info!(user_id, week = %week, day, exercise_id = %exercise.id, "adding exercise");
        let range = self
            .timeline
            .upsert_range_starting_at(user_id, week, plan, None)
            .await?;

        let date = Self::day_date(today, day);
        if let Some(mut log) = self.db.get_day_log(user_id, &date).await? {
            log.exercises
                .push(LoggedExercise::from_exercise(exercise, false));
            log.updated_at = now;
            self.db.upsert_day_log(&log).await?;
        }

        Ok(range)
    }

    /// Remove an exercise from a weekday's template (and its log, if any).
    /// An unknown id is a no-op filter, matching the lenient remove
    /// semantics of the template editor.
    pub async fn remove_exercise(
        &self,
        user_id: &str,
        today: NaiveDate,
        day: usize,
        exercise_id: &str,
    ) -> AppResult<TemplateRange> {
        let day = Self::checked_day(day)?;
        let week = WeekId::from_date(today);
        let now = Utc::now().to_rfc3339();

        let mut plan = self.effective_plan(user_id, week, &now).await?;
        {
            let day_template = plan
                .day_mut(day)
                .ok_or_else(|| AppError::Validation(format!("day index {day} out of range")))?;
            day_template.exercises.retain(|e| e.id != exercise_id);
            day_template.updated_at = now.clone();
        }

        info!(user_id, week = %week, day, exercise_id, "removing exercise");
        let range = self
            .timeline
            .upsert_range_starting_at(user_id, week, plan, None)
            .await?;

        let date = Self::day_date(today, day);
        if let Some(mut log) = self.db.get_day_log(user_id, &date).await? {
            log.exercises.retain(|e| e.exercise.id != exercise_id);
            log.updated_at = now;
            self.db.upsert_day_log(&log).await?;
        }

        Ok(range)
    }

    /// Apply a partial update to an exercise in the template and, if the
    /// day has a persisted log, to the matching log entry.
    pub async fn update_exercise(
        &self,
        user_id: &str,
        today: NaiveDate,
        day: usize,
        exercise_id: &str,
        patch: &ExercisePatch,
    ) -> AppResult<TemplateRange> {
        let day = Self::checked_day(day)?;
        let week = WeekId::from_date(today);
        let now = Utc::now().to_rfc3339();

        let mut plan = self.effective_plan(user_id, week, &now).await?;
        {
            let day_template = plan
                .day_mut(day)
                .ok_or_else(|| AppError::Validation(format!("day index {day} out of range")))?;
            let exercise = day_template
                .exercises
                .iter_mut()
                .find(|e| e.id == exercise_id)
                .ok_or_else(|| {
                    AppError::NotFound(format!("exercise {exercise_id} not found on day {day}"))
                })?;
            patch.apply_to(exercise);
            day_template.updated_at = now.clone();
        }

        info!(user_id, week = %week, day, exercise_id, "updating exercise");
        let range = self
            .timeline
            .upsert_range_starting_at(user_id, week, plan, None)
            .await?;

        let date = Self::day_date(today, day);
        if let Some(mut log) = self.db.get_day_log(user_id, &date).await? {
            if let Some(entry) = log
                .exercises
                .iter_mut()
                .find(|e| e.exercise.id == exercise_id)
            {
                patch.apply_to(&mut entry.exercise);
                log.updated_at = now;
                self.db.upsert_day_log(&log).await?;
            }
        }

        Ok(range)
    }

    /// Put a weekday's exercises in the given id order.
    ///
    /// Ids with no matching exercise are silently dropped, and entries not
    /// listed are dropped with them; `order` is reassigned 0..n. The
    /// persisted log (if any) is put in the same sequence.
    pub async fn reorder_exercises(
        &self,
        user_id: &str,
        today: NaiveDate,
        day: usize,
        ordered_ids: &[String],
    ) -> AppResult<TemplateRange> {
        let day = Self::checked_day(day)?;
        let week = WeekId::from_date(today);
        let now = Utc::now().to_rfc3339();

        let mut plan = self.effective_plan(user_id, week, &now).await?;
        {
            let day_template = plan
                .day_mut(day)
                .ok_or_else(|| AppError::Validation(format!("day index {day} out of range")))?;
            let mut reordered = Vec::with_capacity(ordered_ids.len());
            for id in ordered_ids {
                if let Some(exercise) = day_template.exercises.iter().find(|e| &e.id == id) {
                    reordered.push(exercise.clone());
                }
            }
            for (index, exercise) in reordered.iter_mut().enumerate() {
                exercise.order = index as u32;
            }
            day_template.exercises = reordered;
            day_template.updated_at = now.clone();
        }

        info!(user_id, week = %week, day, "reordering exercises");
        let range = self
            .timeline
            .upsert_range_starting_at(user_id, week, plan, None)
            .await?;

        let date = Self::day_date(today, day);
        if let Some(mut log) = self.db.get_day_log(user_id, &date).await? {
            let mut reordered = Vec::with_capacity(ordered_ids.len());
            for id in ordered_ids {
                if let Some(entry) = log.exercises.iter().find(|e| &e.exercise.id == id) {
                    reordered.push(entry.clone());
                }
            }
            for (index, entry) in reordered.iter_mut().enumerate() {
                entry.exercise.order = index as u32;
            }
            log.exercises = reordered;
            log.updated_at = now;
            self.db.upsert_day_log(&log).await?;
        }

        Ok(range)
    }

    /// Flip completion on one exercise in a day's log. Never touches the
    /// template.
    ///
    /// With no persisted log, the day is lazily materialized from the
    /// template with only the toggled exercise complete. An exercise
    /// present in the template but missing from an existing log (added
    /// after the log was created) is appended marked complete. With
    /// neither a log entry nor a template entry to act on, the operation
    /// has no target and fails with not-found.
    pub async fn toggle_exercise_complete(
        &self,
        user_id: &str,
        today: NaiveDate,
        day: usize,
        exercise_id: &str,
    ) -> AppResult<DayWorkoutLog> {
        let day = Self::checked_day(day)?;
        let week = WeekId::from_date(today);
        let now = Utc::now().to_rfc3339();
        let date = Self::day_date(today, day);

        match self.db.get_day_log(user_id, &date).await? {
            Some(mut log) => {
                if let Some(entry) = log
                    .exercises
                    .iter_mut()
                    .find(|e| e.exercise.id == exercise_id)
                {
                    entry.completed = !entry.completed;
                } else {
                    let template = self
                        .timeline
                        .resolve_template_for_week(user_id, week)
                        .await?;
                    let from_template = template
                        .as_ref()
                        .and_then(|t| t.plan.day(day))
                        .and_then(|d| d.exercises.iter().find(|e| e.id == exercise_id))
                        .cloned();
                    match from_template {
                        Some(exercise) => log
                            .exercises
                            .push(LoggedExercise::from_exercise(exercise, true)),
                        None => {
                            return Err(AppError::NotFound(format!(
                                "exercise {exercise_id} not found in log or template for {date}"
                            )))
                        }
                    }
                }
                log.updated_at = now;
                info!(user_id, date = %log.date, exercise_id, "toggling exercise completion");
                self.db.upsert_day_log(&log).await
            }
            None => {
                let template = self
                    .timeline
                    .resolve_template_for_week(user_id, week)
                    .await?
                    .ok_or_else(|| {
                        AppError::NotFound(format!("no template or log for {date}"))
                    })?;
                let mut log = synthesize_day_log(user_id, &date, week, day, &template);
                for entry in &mut log.exercises {
                    entry.completed = entry.exercise.id == exercise_id;
                }
                info!(user_id, %date, exercise_id, "materializing day log on first toggle");
                self.db.upsert_day_log(&log).await
            }
        }
    }

    /// Flip the day-level completion flag, lazily materializing the log
    /// from the template (exercises incomplete, day complete) on first use.
    pub async fn mark_day_complete(
        &self,
        user_id: &str,
        today: NaiveDate,
        day: usize,
    ) -> AppResult<DayWorkoutLog> {
        let day = Self::checked_day(day)?;
        let week = WeekId::from_date(today);
        let now = Utc::now().to_rfc3339();
        let date = Self::day_date(today, day);

        match self.db.get_day_log(user_id, &date).await? {
            Some(mut log) => {
                log.completed = !log.completed;
                log.updated_at = now;
                info!(user_id, date = %log.date, completed = log.completed, "marking day");
                self.db.upsert_day_log(&log).await
            }
            None => {
                let template = self
                    .timeline
                    .resolve_template_for_week(user_id, week)
                    .await?
                    .ok_or_else(|| {
                        AppError::NotFound(format!("no template or log for {date}"))
                    })?;
                let mut log = synthesize_day_log(user_id, &date, week, day, &template);
                log.completed = true;
                info!(user_id, %date, "materializing day log as complete");
                self.db.upsert_day_log(&log).await
            }
        }
    }

    /// Direct day-log upsert (the raw persistence path used when the client
    /// already holds a materialized day shape)
    pub async fn upsert_day_log(
        &self,
        user_id: &str,
        request: UpsertDayLogRequest,
    ) -> AppResult<DayWorkoutLog> {
        if request.date.is_empty() || request.week_id.is_empty() {
            return Err(AppError::Validation(
                "date and weekId are required".to_string(),
            ));
        }
        NaiveDate::parse_from_str(&request.date, "%Y-%m-%d").map_err(|_| {
            AppError::Validation(format!("invalid date: {} (expected YYYY-MM-DD)", request.date))
        })?;
        let _: WeekId = request.week_id.parse()?;
        if request.day_of_week > 6 {
            return Err(AppError::Validation(format!(
                "dayOfWeek {} out of range (expected 0..=6)",
                request.day_of_week
            )));
        }

        let now = Utc::now().to_rfc3339();
        let log = DayWorkoutLog {
            user_id: user_id.to_string(),
            date: request.date,
            week_id: request.week_id,
            day_of_week: request.day_of_week,
            exercises: request.exercises,
            completed: request.completed,
            created_at: now.clone(),
            updated_at: now,
        };
        self.db.upsert_day_log(&log).await
    }
}
