//! Weekly log materialization: combine the template effective for a week
//! with whatever day logs were actually persisted, producing a complete
//! 7-day dataset for the UI.

use chrono::{NaiveDate, Utc};
use tracing::debug;

use shared::{DayWorkoutLog, LoggedExercise, TemplateRange, WeeklyWorkoutData};

use crate::db::DbConnection;
use crate::domain::timeline::TimelineService;
use crate::domain::week::{date_for_day, week_start_date, WeekId};
use crate::error::AppResult;

/// Build a transient day log from the template's entry for `day_index`.
///
/// Every exercise starts incomplete and the day itself starts incomplete;
/// the result is not persisted here. Persistence happens only when a
/// mutation later targets the day, at which point this shape is the
/// baseline that gets upserted.
pub fn synthesize_day_log(
    user_id: &str,
    date: &str,
    week: WeekId,
    day_index: usize,
    template: &TemplateRange,
) -> DayWorkoutLog {
    let now = Utc::now().to_rfc3339();
    let exercises = template
        .plan
        .day(day_index)
        .map(|day| {
            day.exercises
                .iter()
                .cloned()
                .map(|exercise| LoggedExercise::from_exercise(exercise, false))
                .collect()
        })
        .unwrap_or_default();

    DayWorkoutLog {
        user_id: user_id.to_string(),
        date: date.to_string(),
        week_id: week.to_string(),
        day_of_week: day_index as u8,
        exercises,
        completed: false,
        created_at: now.clone(),
        updated_at: now,
    }
}

/// Service producing the per-week materialized view
#[derive(Clone)]
pub struct WeeklyLogService {
    db: DbConnection,
    timeline: TimelineService,
}

impl WeeklyLogService {
    pub fn new(db: DbConnection) -> Self {
        let timeline = TimelineService::new(db.clone());
        Self { db, timeline }
    }

    /// The template covering the week of `week` (UI read path)
    pub async fn resolved_template(
        &self,
        user_id: &str,
        week: WeekId,
    ) -> AppResult<Option<TemplateRange>> {
        self.timeline.resolve_template_for_week(user_id, week).await
    }

    /// Persisted logs for a week, in date order. Synthesizes nothing.
    pub async fn persisted_logs_for_week(
        &self,
        user_id: &str,
        week: WeekId,
    ) -> AppResult<Vec<DayWorkoutLog>> {
        self.db.list_day_logs_for_week(user_id, &week.to_string()).await
    }

    /// The persisted log for a single date, if any
    pub async fn persisted_log_for_date(
        &self,
        user_id: &str,
        date: &str,
    ) -> AppResult<Option<DayWorkoutLog>> {
        self.db.get_day_log(user_id, date).await
    }

    /// Materialize the week containing `date`.
    ///
    /// Persisted logs win verbatim; days without a log fall back to a
    /// synthesized template-derived entry; with neither, the day index is
    /// simply absent from the map.
    pub async fn materialize_week(
        &self,
        user_id: &str,
        date: NaiveDate,
    ) -> AppResult<WeeklyWorkoutData> {
        let week = WeekId::from_date(date);
        let week_start = week_start_date(date);

        let template = self.timeline.resolve_template_for_week(user_id, week).await?;
        let logs = self.db.list_day_logs_for_week(user_id, &week.to_string()).await?;

        debug!(
            user_id,
            week = %week,
            persisted = logs.len(),
            has_template = template.is_some(),
            "materializing week"
        );

        let mut data = WeeklyWorkoutData::new();
        for day_index in 0..7 {
            let day_date = date_for_day(week_start, day_index)
                .format("%Y-%m-%d")
                .to_string();

            if let Some(log) = logs.iter().find(|log| log.date == day_date) {
                data.insert(day_index.to_string(), log.clone());
            } else if let Some(template) = &template {
                data.insert(
                    day_index.to_string(),
                    synthesize_day_log(user_id, &day_date, week, day_index, template),
                );
            }
        }

        Ok(data)
    }
}
