use thiserror::Error;

/// Failure modes of the scheduling engine.
///
/// Slot-level validation failures are returned per operation (or per item in
/// batch operations) and never leave partially-corrupted state behind.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Underlying SQLite / rusqlite error.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Malformed clock time, date, or day name.
    #[error("invalid time format: {0}")]
    InvalidTimeFormat(String),

    /// A template write would violate slot exclusivity.
    #[error("slot conflict: {0}")]
    SlotConflict(String),

    /// The destination slot already holds an active schedule.
    #[error("slot occupied: {0}")]
    SlotOccupied(String),

    /// Extending a half-hour slot back to a full hour would collide with its
    /// sibling half.
    #[error("half-hour pair conflict: {0}")]
    HalfHourPairConflict(String),

    /// Swap between an hourly and a half-hourly schedule.
    #[error("duration mismatch: {0}")]
    DurationMismatch(String),

    /// Next-week generation requested before the current week exists.
    #[error("no current-week instance exists yet")]
    PrecedingWeekMissing,

    /// A batch or copy operation was invoked with no targets.
    #[error("empty selection")]
    EmptySelection,

    #[error("weekly instance not found: {0}")]
    InstanceNotFound(String),

    /// Another generation for the same timetable is still in flight and did
    /// not finish within the wait window. Transient; the caller should retry
    /// the lookup rather than re-create.
    #[error("instance generation already in progress for timetable {0}")]
    ConcurrentGenerationInProgress(String),

    #[error("{0} not found")]
    NotFound(&'static str),
}

pub type Result<T> = std::result::Result<T, EngineError>;

impl EngineError {
    /// Stable wire code reported to the UI.
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::Database(_) => "db_query_failed",
            EngineError::InvalidTimeFormat(_) => "invalid_time_format",
            EngineError::SlotConflict(_) => "slot_conflict",
            EngineError::SlotOccupied(_) => "slot_occupied",
            EngineError::HalfHourPairConflict(_) => "half_hour_pair_conflict",
            EngineError::DurationMismatch(_) => "duration_mismatch",
            EngineError::PrecedingWeekMissing => "preceding_week_missing",
            EngineError::EmptySelection => "empty_selection",
            EngineError::InstanceNotFound(_) => "instance_not_found",
            EngineError::ConcurrentGenerationInProgress(_) => "generation_in_progress",
            EngineError::NotFound(_) => "not_found",
        }
    }
}
