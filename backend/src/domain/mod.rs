//! Domain logic: week arithmetic, the template timeline, weekly log
//! materialization, and the mutation engine.

pub mod catalog;
pub mod timeline;
pub mod week;
pub mod weekly_log;
pub mod workout;

pub use timeline::TimelineService;
pub use weekly_log::WeeklyLogService;
pub use workout::WorkoutService;
