//! Template timeline: the ordered, non-overlapping set of template ranges
//! per user, and the resolution of "which template applies to week W".

use chrono::Utc;
use tracing::{debug, info};
use uuid::Uuid;

use shared::{TemplateRange, WeekPlan};

use crate::db::DbConnection;
use crate::domain::week::WeekId;
use crate::error::{AppError, AppResult};

/// Generate a unique id for a new template range
pub fn generate_template_id() -> String {
    format!("template_{}", Uuid::new_v4().simple())
}

/// Service owning the per-user template timeline
#[derive(Clone)]
pub struct TimelineService {
    db: DbConnection,
}

impl TimelineService {
    pub fn new(db: DbConnection) -> Self {
        Self { db }
    }

    /// The template range covering `week`, if any.
    ///
    /// Among ranges with `start <= week` and (`end` absent or `end >= week`),
    /// the greatest start wins. At most one range should match; if the
    /// no-overlap invariant has been violated the greatest-start tie-break
    /// is the defined recovery. Side-effect-free.
    pub async fn resolve_template_for_week(
        &self,
        user_id: &str,
        week: WeekId,
    ) -> AppResult<Option<TemplateRange>> {
        let covering = self
            .db
            .ranges_covering_week(user_id, &week.to_string())
            .await?;
        if covering.len() > 1 {
            debug!(
                user_id,
                week = %week,
                matches = covering.len(),
                "multiple ranges cover week, using greatest start"
            );
        }
        Ok(covering.into_iter().next())
    }

    /// All ranges for the user, ascending by start week (timeline view)
    pub async fn list_ranges(&self, user_id: &str) -> AppResult<Vec<TemplateRange>> {
        self.db.list_template_ranges(user_id).await
    }

    /// Upsert the range starting exactly at `week`.
    ///
    /// If one exists its day templates are replaced in place. Otherwise a
    /// new open-ended active range is inserted and every open-ended range
    /// with an earlier start is capped at `week.previous()` in the same
    /// transaction. Capping is the only way ranges are ever closed.
    pub async fn upsert_range_starting_at(
        &self,
        user_id: &str,
        week: WeekId,
        plan: WeekPlan,
        name: Option<String>,
    ) -> AppResult<TemplateRange> {
        if user_id.is_empty() {
            return Err(AppError::Unauthenticated);
        }

        let now = Utc::now().to_rfc3339();
        let start_week_id = week.to_string();

        if let Some(existing) = self.db.get_range_starting_at(user_id, &start_week_id).await? {
            info!(user_id, week = %week, template_id = %existing.template_id,
                "updating existing template range");
            let updated = TemplateRange {
                plan,
                name: name.or(existing.name),
                updated_at: now,
                ..existing
            };
            self.db.upsert_template_range(&updated).await?;
            return Ok(updated);
        }

        // A finite range covering this week cannot be repaired by capping;
        // reject instead of creating a silent overlap.
        if let Some(conflict) = self.db.finite_range_covering(user_id, &start_week_id).await? {
            return Err(AppError::Validation(format!(
                "week {} is already covered by range {} ({} - {})",
                start_week_id,
                conflict.template_id,
                conflict.start_week_id,
                conflict.end_week_id.as_deref().unwrap_or("indefinite"),
            )));
        }

        let range = TemplateRange {
            user_id: user_id.to_string(),
            template_id: generate_template_id(),
            name: Some(name.unwrap_or_else(|| format!("Template from {start_week_id}"))),
            start_week_id: start_week_id.clone(),
            end_week_id: None,
            is_active: true,
            plan,
            created_at: now.clone(),
            updated_at: now,
        };

        let cap_end = week.previous().to_string();
        info!(user_id, week = %week, template_id = %range.template_id,
            "creating template range, capping open predecessors at {cap_end}");
        self.db.insert_range_capping_open(&range, &cap_end).await?;

        Ok(range)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::WorkoutExercise;

    async fn setup_test() -> TimelineService {
        let db = DbConnection::init_test()
            .await
            .expect("Failed to create test database");
        TimelineService::new(db)
    }

    fn week(s: &str) -> WeekId {
        s.parse().unwrap()
    }

    fn plan_with_monday_exercise(id: &str) -> WeekPlan {
        let now = "2024-01-01T00:00:00Z".to_string();
        let mut plan = WeekPlan::empty(&now);
        plan.monday.exercises.push(WorkoutExercise {
            id: id.to_string(),
            exercise_id: "0001".to_string(),
            name: "Barbell squat".to_string(),
            sets: 3,
            reps: 8,
            weight: 80.0,
            duration: None,
            notes: String::new(),
            image_url: None,
            gif_url: None,
            order: 0,
        });
        plan
    }

    #[tokio::test]
    async fn test_resolve_returns_none_for_user_with_no_ranges() {
        let timeline = setup_test().await;
        let resolved = timeline
            .resolve_template_for_week("user_1", week("2024-W10"))
            .await
            .unwrap();
        assert!(resolved.is_none());
    }

    #[tokio::test]
    async fn test_upsert_caps_open_predecessor_at_previous_week() {
        let timeline = setup_test().await;
        let now = "2024-01-01T00:00:00Z".to_string();

        let first = timeline
            .upsert_range_starting_at("user_1", week("2024-W01"), WeekPlan::empty(&now), None)
            .await
            .unwrap();
        assert_eq!(first.end_week_id, None);

        let second = timeline
            .upsert_range_starting_at(
                "user_1",
                week("2024-W10"),
                plan_with_monday_exercise("ex_1"),
                None,
            )
            .await
            .unwrap();

        let ranges = timeline.list_ranges("user_1").await.unwrap();
        assert_eq!(ranges.len(), 2);
        assert_eq!(ranges[0].template_id, first.template_id);
        assert_eq!(ranges[0].end_week_id.as_deref(), Some("2024-W09"));
        assert_eq!(ranges[1].template_id, second.template_id);
        assert_eq!(ranges[1].end_week_id, None);

        // Resolution flips exactly at the boundary
        let before = timeline
            .resolve_template_for_week("user_1", week("2024-W09"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(before.template_id, first.template_id);

        let after = timeline
            .resolve_template_for_week("user_1", week("2024-W10"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(after.template_id, second.template_id);
    }

    #[tokio::test]
    async fn test_upsert_at_same_week_updates_in_place() {
        let timeline = setup_test().await;
        let now = "2024-01-01T00:00:00Z".to_string();

        let first = timeline
            .upsert_range_starting_at("user_1", week("2024-W10"), WeekPlan::empty(&now), None)
            .await
            .unwrap();
        let second = timeline
            .upsert_range_starting_at(
                "user_1",
                week("2024-W10"),
                plan_with_monday_exercise("ex_1"),
                None,
            )
            .await
            .unwrap();

        assert_eq!(first.template_id, second.template_id);
        let ranges = timeline.list_ranges("user_1").await.unwrap();
        assert_eq!(ranges.len(), 1);
        assert_eq!(ranges[0].plan.monday.exercises.len(), 1);
    }

    #[tokio::test]
    async fn test_upsert_is_idempotent_for_identical_input() {
        let timeline = setup_test().await;
        let plan = plan_with_monday_exercise("ex_1");

        timeline
            .upsert_range_starting_at("user_1", week("2024-W10"), plan.clone(), None)
            .await
            .unwrap();
        timeline
            .upsert_range_starting_at("user_1", week("2024-W10"), plan, None)
            .await
            .unwrap();

        let ranges = timeline.list_ranges("user_1").await.unwrap();
        assert_eq!(ranges.len(), 1);
    }

    #[tokio::test]
    async fn test_resolution_is_stable_across_a_range_span() {
        let timeline = setup_test().await;
        let now = "2024-01-01T00:00:00Z".to_string();

        timeline
            .upsert_range_starting_at("user_1", week("2024-W05"), WeekPlan::empty(&now), None)
            .await
            .unwrap();
        let newer = timeline
            .upsert_range_starting_at("user_1", week("2024-W11"), WeekPlan::empty(&now), None)
            .await
            .unwrap();

        // The first range now spans W05..W10 inclusive
        let capped = timeline.list_ranges("user_1").await.unwrap()[0].clone();
        for w in ["2024-W05", "2024-W07", "2024-W10"] {
            let resolved = timeline
                .resolve_template_for_week("user_1", week(w))
                .await
                .unwrap()
                .unwrap();
            assert_eq!(resolved.template_id, capped.template_id, "week {w}");
        }
        // Before the first range: nothing
        assert!(timeline
            .resolve_template_for_week("user_1", week("2024-W04"))
            .await
            .unwrap()
            .is_none());
        // The open-ended range extends indefinitely
        let far = timeline
            .resolve_template_for_week("user_1", week("2031-W01"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(far.template_id, newer.template_id);
    }

    #[tokio::test]
    async fn test_later_finite_range_is_not_capped_by_newer_start() {
        let timeline = setup_test().await;
        let now = "2024-01-01T00:00:00Z".to_string();

        // Build a finite future range by hand (start W15, end W20)
        let mut future = timeline
            .upsert_range_starting_at("user_1", week("2024-W15"), WeekPlan::empty(&now), None)
            .await
            .unwrap();
        future.end_week_id = Some("2024-W20".to_string());
        timeline.db.upsert_template_range(&future).await.unwrap();

        // A new range starting earlier caps nothing finite
        timeline
            .upsert_range_starting_at("user_1", week("2024-W10"), WeekPlan::empty(&now), None)
            .await
            .unwrap();

        let ranges = timeline.list_ranges("user_1").await.unwrap();
        let stored_future = ranges
            .iter()
            .find(|r| r.template_id == future.template_id)
            .unwrap();
        assert_eq!(stored_future.end_week_id.as_deref(), Some("2024-W20"));
    }

    #[tokio::test]
    async fn test_upsert_rejects_week_covered_by_finite_range() {
        let timeline = setup_test().await;
        let now = "2024-01-01T00:00:00Z".to_string();

        let mut range = timeline
            .upsert_range_starting_at("user_1", week("2024-W01"), WeekPlan::empty(&now), None)
            .await
            .unwrap();
        range.end_week_id = Some("2024-W20".to_string());
        timeline.db.upsert_template_range(&range).await.unwrap();

        let result = timeline
            .upsert_range_starting_at("user_1", week("2024-W10"), WeekPlan::empty(&now), None)
            .await;
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn test_named_range_keeps_its_name_on_update() {
        let timeline = setup_test().await;
        let now = "2024-01-01T00:00:00Z".to_string();

        timeline
            .upsert_range_starting_at(
                "user_1",
                week("2024-W10"),
                WeekPlan::empty(&now),
                Some("Bulk Phase".to_string()),
            )
            .await
            .unwrap();
        let updated = timeline
            .upsert_range_starting_at("user_1", week("2024-W10"), WeekPlan::empty(&now), None)
            .await
            .unwrap();

        assert_eq!(updated.name.as_deref(), Some("Bulk Phase"));
    }
}
