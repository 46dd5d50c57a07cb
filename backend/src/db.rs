//! SQLite persistence for the two core collections.
//!
//! `template_ranges` is keyed by (user_id, template_id) and queried by week
//! coverage; `day_workout_logs` is keyed by (user_id, date) and queried per
//! week. Week-id columns are zero-padded `YYYY-Wnn` strings, so plain string
//! comparison orders them correctly. Nested day templates and exercise
//! arrays are stored as JSON text columns. All writes are upserts on the
//! natural key, so concurrent requests for the same user converge instead of
//! duplicating rows.

use anyhow::Result;
use sqlx::{migrate::MigrateDatabase, Row, Sqlite, SqlitePool};
use std::sync::Arc;

use shared::{DayWorkoutLog, TemplateRange, WeekPlan};

use crate::error::AppResult;

// The database URL for the production database
const DATABASE_URL: &str = "sqlite:workouts.db";

/// DbConnection manages database operations
#[derive(Clone)]
pub struct DbConnection {
    pool: Arc<SqlitePool>,
}

impl DbConnection {
    /// Create a new database connection
    pub async fn new(url: &str) -> Result<Self> {
        // Create database if it doesn't exist
        if !Sqlite::database_exists(url).await.unwrap_or(false) {
            Sqlite::create_database(url).await?
        }

        let pool = SqlitePool::connect(url).await?;

        Self::setup_schema(&pool).await?;

        Ok(Self {
            pool: Arc::new(pool),
        })
    }

    /// Initialize the standard database
    pub async fn init() -> Result<Self> {
        Self::new(DATABASE_URL).await
    }

    /// Initialize a test database with a unique name
    #[cfg(test)]
    pub async fn init_test() -> Result<Self> {
        let test_id = uuid::Uuid::new_v4().simple().to_string();
        let db_url = format!("sqlite:file:memdb_{}?mode=memory&cache=shared", test_id);

        Self::new(&db_url).await
    }

    /// Set up the required database schema
    async fn setup_schema(pool: &SqlitePool) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS template_ranges (
                user_id       TEXT NOT NULL,
                template_id   TEXT NOT NULL,
                name          TEXT,
                start_week_id TEXT NOT NULL,
                end_week_id   TEXT,
                is_active     INTEGER NOT NULL DEFAULT 1,
                plan          TEXT NOT NULL,
                created_at    TEXT NOT NULL,
                updated_at    TEXT NOT NULL,
                PRIMARY KEY (user_id, template_id)
            );
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_template_ranges_start
                ON template_ranges (user_id, start_week_id);
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS day_workout_logs (
                user_id     TEXT NOT NULL,
                date        TEXT NOT NULL,
                week_id     TEXT NOT NULL,
                day_of_week INTEGER NOT NULL,
                exercises   TEXT NOT NULL,
                completed   INTEGER NOT NULL DEFAULT 0,
                created_at  TEXT NOT NULL,
                updated_at  TEXT NOT NULL,
                PRIMARY KEY (user_id, date)
            );
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_day_logs_week
                ON day_workout_logs (user_id, week_id);
            "#,
        )
        .execute(pool)
        .await?;

        Ok(())
    }

    /// Get the underlying SQLite pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    fn range_from_row(row: &sqlx::sqlite::SqliteRow) -> AppResult<TemplateRange> {
        let plan_json: String = row.get("plan");
        let plan: WeekPlan = serde_json::from_str(&plan_json)?;
        Ok(TemplateRange {
            user_id: row.get("user_id"),
            template_id: row.get("template_id"),
            name: row.get("name"),
            start_week_id: row.get("start_week_id"),
            end_week_id: row.get("end_week_id"),
            is_active: row.get("is_active"),
            plan,
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        })
    }

    fn log_from_row(row: &sqlx::sqlite::SqliteRow) -> AppResult<DayWorkoutLog> {
        let exercises_json: String = row.get("exercises");
        let exercises = serde_json::from_str(&exercises_json)?;
        let day_of_week: i64 = row.get("day_of_week");
        Ok(DayWorkoutLog {
            user_id: row.get("user_id"),
            date: row.get("date"),
            week_id: row.get("week_id"),
            day_of_week: day_of_week as u8,
            exercises,
            completed: row.get("completed"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        })
    }

    /// Upsert a template range by its (user_id, template_id) natural key.
    /// `created_at` of an existing row is preserved.
    pub async fn upsert_template_range(&self, range: &TemplateRange) -> AppResult<()> {
        let plan_json = serde_json::to_string(&range.plan)?;
        sqlx::query(
            r#"
            INSERT INTO template_ranges
                (user_id, template_id, name, start_week_id, end_week_id,
                 is_active, plan, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (user_id, template_id) DO UPDATE SET
                name = excluded.name,
                start_week_id = excluded.start_week_id,
                end_week_id = excluded.end_week_id,
                is_active = excluded.is_active,
                plan = excluded.plan,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&range.user_id)
        .bind(&range.template_id)
        .bind(&range.name)
        .bind(&range.start_week_id)
        .bind(&range.end_week_id)
        .bind(range.is_active)
        .bind(plan_json)
        .bind(&range.created_at)
        .bind(&range.updated_at)
        .execute(&*self.pool)
        .await?;
        Ok(())
    }

    /// Insert a new open-ended range and cap every other open-ended range
    /// that starts earlier, as one atomic unit. A crash between the two
    /// steps must not leave a dangling open range.
    pub async fn insert_range_capping_open(
        &self,
        range: &TemplateRange,
        cap_end_week_id: &str,
    ) -> AppResult<()> {
        let plan_json = serde_json::to_string(&range.plan)?;
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            UPDATE template_ranges
            SET end_week_id = ?, updated_at = ?
            WHERE user_id = ? AND end_week_id IS NULL AND start_week_id < ?
            "#,
        )
        .bind(cap_end_week_id)
        .bind(&range.updated_at)
        .bind(&range.user_id)
        .bind(&range.start_week_id)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO template_ranges
                (user_id, template_id, name, start_week_id, end_week_id,
                 is_active, plan, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&range.user_id)
        .bind(&range.template_id)
        .bind(&range.name)
        .bind(&range.start_week_id)
        .bind(&range.end_week_id)
        .bind(range.is_active)
        .bind(plan_json)
        .bind(&range.created_at)
        .bind(&range.updated_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    /// The range starting exactly at `start_week_id`, if any
    pub async fn get_range_starting_at(
        &self,
        user_id: &str,
        start_week_id: &str,
    ) -> AppResult<Option<TemplateRange>> {
        let row = sqlx::query(
            "SELECT * FROM template_ranges WHERE user_id = ? AND start_week_id = ?",
        )
        .bind(user_id)
        .bind(start_week_id)
        .fetch_optional(&*self.pool)
        .await?;

        row.as_ref().map(Self::range_from_row).transpose()
    }

    /// All ranges for a user, ascending by start week (timeline order)
    pub async fn list_template_ranges(&self, user_id: &str) -> AppResult<Vec<TemplateRange>> {
        let rows = sqlx::query(
            "SELECT * FROM template_ranges WHERE user_id = ? ORDER BY start_week_id ASC",
        )
        .bind(user_id)
        .fetch_all(&*self.pool)
        .await?;

        rows.iter().map(Self::range_from_row).collect()
    }

    /// Ranges whose coverage includes `week_id`, most recent start first.
    /// The first row is the resolution winner.
    pub async fn ranges_covering_week(
        &self,
        user_id: &str,
        week_id: &str,
    ) -> AppResult<Vec<TemplateRange>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM template_ranges
            WHERE user_id = ?
              AND start_week_id <= ?
              AND (end_week_id IS NULL OR end_week_id >= ?)
            ORDER BY start_week_id DESC
            "#,
        )
        .bind(user_id)
        .bind(week_id)
        .bind(week_id)
        .fetch_all(&*self.pool)
        .await?;

        rows.iter().map(Self::range_from_row).collect()
    }

    /// A finite range that covers `week_id` but starts strictly before it.
    /// Such a range cannot be repaired by capping (only open-ended ranges
    /// are capped) and therefore blocks a new range at `week_id`.
    pub async fn finite_range_covering(
        &self,
        user_id: &str,
        week_id: &str,
    ) -> AppResult<Option<TemplateRange>> {
        let row = sqlx::query(
            r#"
            SELECT * FROM template_ranges
            WHERE user_id = ?
              AND start_week_id < ?
              AND end_week_id IS NOT NULL
              AND end_week_id >= ?
            ORDER BY start_week_id DESC
            "#,
        )
        .bind(user_id)
        .bind(week_id)
        .bind(week_id)
        .fetch_optional(&*self.pool)
        .await?;

        row.as_ref().map(Self::range_from_row).transpose()
    }

    /// Upsert a day log by its (user_id, date) natural key and return the
    /// stored row. `created_at` of an existing row is preserved.
    pub async fn upsert_day_log(&self, log: &DayWorkoutLog) -> AppResult<DayWorkoutLog> {
        let exercises_json = serde_json::to_string(&log.exercises)?;
        sqlx::query(
            r#"
            INSERT INTO day_workout_logs
                (user_id, date, week_id, day_of_week, exercises,
                 completed, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (user_id, date) DO UPDATE SET
                week_id = excluded.week_id,
                day_of_week = excluded.day_of_week,
                exercises = excluded.exercises,
                completed = excluded.completed,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&log.user_id)
        .bind(&log.date)
        .bind(&log.week_id)
        .bind(log.day_of_week as i64)
        .bind(exercises_json)
        .bind(log.completed)
        .bind(&log.created_at)
        .bind(&log.updated_at)
        .execute(&*self.pool)
        .await?;

        let stored = self
            .get_day_log(&log.user_id, &log.date)
            .await?
            .ok_or(sqlx::Error::RowNotFound)?;
        Ok(stored)
    }

    /// The log for one (user, date), if any
    pub async fn get_day_log(&self, user_id: &str, date: &str) -> AppResult<Option<DayWorkoutLog>> {
        let row = sqlx::query("SELECT * FROM day_workout_logs WHERE user_id = ? AND date = ?")
            .bind(user_id)
            .bind(date)
            .fetch_optional(&*self.pool)
            .await?;

        row.as_ref().map(Self::log_from_row).transpose()
    }

    /// All persisted logs for (user, week), ascending by date
    pub async fn list_day_logs_for_week(
        &self,
        user_id: &str,
        week_id: &str,
    ) -> AppResult<Vec<DayWorkoutLog>> {
        let rows = sqlx::query(
            "SELECT * FROM day_workout_logs WHERE user_id = ? AND week_id = ? ORDER BY date ASC",
        )
        .bind(user_id)
        .bind(week_id)
        .fetch_all(&*self.pool)
        .await?;

        rows.iter().map(Self::log_from_row).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::WeekPlan;

    async fn setup_test() -> DbConnection {
        DbConnection::init_test()
            .await
            .expect("Failed to create test database")
    }

    fn test_range(user_id: &str, template_id: &str, start: &str) -> TemplateRange {
        let now = "2024-01-01T00:00:00Z".to_string();
        TemplateRange {
            user_id: user_id.to_string(),
            template_id: template_id.to_string(),
            name: Some(format!("Template from {start}")),
            start_week_id: start.to_string(),
            end_week_id: None,
            is_active: true,
            plan: WeekPlan::empty(&now),
            created_at: now.clone(),
            updated_at: now,
        }
    }

    fn test_log(user_id: &str, date: &str, week_id: &str, day_of_week: u8) -> DayWorkoutLog {
        let now = "2024-01-01T00:00:00Z".to_string();
        DayWorkoutLog {
            user_id: user_id.to_string(),
            date: date.to_string(),
            week_id: week_id.to_string(),
            day_of_week,
            exercises: Vec::new(),
            completed: false,
            created_at: now.clone(),
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_upsert_template_range_is_idempotent_by_key() {
        let db = setup_test().await;
        let range = test_range("user_1", "template_a", "2024-W10");

        db.upsert_template_range(&range).await.unwrap();
        db.upsert_template_range(&range).await.unwrap();

        let ranges = db.list_template_ranges("user_1").await.unwrap();
        assert_eq!(ranges.len(), 1);
        assert_eq!(ranges[0].template_id, "template_a");
    }

    #[tokio::test]
    async fn test_upsert_template_range_preserves_created_at() {
        let db = setup_test().await;
        let mut range = test_range("user_1", "template_a", "2024-W10");
        db.upsert_template_range(&range).await.unwrap();

        range.created_at = "2024-06-01T00:00:00Z".to_string();
        range.updated_at = "2024-06-01T00:00:00Z".to_string();
        db.upsert_template_range(&range).await.unwrap();

        let stored = db
            .get_range_starting_at("user_1", "2024-W10")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.created_at, "2024-01-01T00:00:00Z");
        assert_eq!(stored.updated_at, "2024-06-01T00:00:00Z");
    }

    #[tokio::test]
    async fn test_ranges_covering_week_prefers_greatest_start() {
        let db = setup_test().await;
        let mut early = test_range("user_1", "template_a", "2024-W01");
        early.end_week_id = Some("2024-W20".to_string());
        let late = test_range("user_1", "template_b", "2024-W10");

        db.upsert_template_range(&early).await.unwrap();
        db.upsert_template_range(&late).await.unwrap();

        let covering = db.ranges_covering_week("user_1", "2024-W15").await.unwrap();
        assert_eq!(covering.len(), 2);
        assert_eq!(covering[0].template_id, "template_b");
    }

    #[tokio::test]
    async fn test_insert_range_capping_open_is_targeted() {
        let db = setup_test().await;
        let open_old = test_range("user_1", "template_a", "2024-W01");
        let mut finite = test_range("user_1", "template_b", "2024-W03");
        finite.end_week_id = Some("2024-W05".to_string());
        db.upsert_template_range(&open_old).await.unwrap();
        db.upsert_template_range(&finite).await.unwrap();

        let new_range = test_range("user_1", "template_c", "2024-W10");
        db.insert_range_capping_open(&new_range, "2024-W09")
            .await
            .unwrap();

        let ranges = db.list_template_ranges("user_1").await.unwrap();
        assert_eq!(ranges.len(), 3);
        // Only the open-ended predecessor is capped
        assert_eq!(ranges[0].end_week_id.as_deref(), Some("2024-W09"));
        // A finite range is left untouched
        assert_eq!(ranges[1].end_week_id.as_deref(), Some("2024-W05"));
        // The new range stays open-ended
        assert_eq!(ranges[2].end_week_id, None);
    }

    #[tokio::test]
    async fn test_capping_ignores_other_users() {
        let db = setup_test().await;
        let other = test_range("user_2", "template_a", "2024-W01");
        db.upsert_template_range(&other).await.unwrap();

        let new_range = test_range("user_1", "template_b", "2024-W10");
        db.insert_range_capping_open(&new_range, "2024-W09")
            .await
            .unwrap();

        let theirs = db.list_template_ranges("user_2").await.unwrap();
        assert_eq!(theirs[0].end_week_id, None);
    }

    #[tokio::test]
    async fn test_day_log_upsert_converges_on_natural_key() {
        let db = setup_test().await;
        let mut log = test_log("user_1", "2024-03-04", "2024-W10", 1);
        db.upsert_day_log(&log).await.unwrap();

        log.completed = true;
        log.created_at = "2024-06-01T00:00:00Z".to_string();
        let stored = db.upsert_day_log(&log).await.unwrap();

        assert!(stored.completed);
        // created_at of the first write wins
        assert_eq!(stored.created_at, "2024-01-01T00:00:00Z");

        let logs = db.list_day_logs_for_week("user_1", "2024-W10").await.unwrap();
        assert_eq!(logs.len(), 1);
    }

    #[tokio::test]
    async fn test_list_day_logs_for_week_scopes_by_user_and_week() {
        let db = setup_test().await;
        db.upsert_day_log(&test_log("user_1", "2024-03-04", "2024-W10", 1))
            .await
            .unwrap();
        db.upsert_day_log(&test_log("user_1", "2024-03-05", "2024-W10", 2))
            .await
            .unwrap();
        db.upsert_day_log(&test_log("user_1", "2024-03-11", "2024-W11", 1))
            .await
            .unwrap();
        db.upsert_day_log(&test_log("user_2", "2024-03-04", "2024-W10", 1))
            .await
            .unwrap();

        let logs = db.list_day_logs_for_week("user_1", "2024-W10").await.unwrap();
        assert_eq!(logs.len(), 2);
        assert_eq!(logs[0].date, "2024-03-04");
        assert_eq!(logs[1].date, "2024-03-05");
    }

    #[tokio::test]
    async fn test_get_day_log_missing_is_none() {
        let db = setup_test().await;
        let log = db.get_day_log("user_1", "2024-03-04").await.unwrap();
        assert!(log.is_none());
    }
}
