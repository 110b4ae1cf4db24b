//! Core engine for optimistic roster reassignment.
//! This crate is the single source of truth for board move semantics.

pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;

pub use logging::{default_log_level, init_logging, logging_status};
pub use model::class::{ClassId, ClassRoster, RosterMember, Weekday, Zone};
pub use model::enrollment::{
    CarryOver, EnrollmentId, EnrollmentRecord, EnrollmentValidationError,
};
pub use model::moves::{compress_moves, NetMove, PendingMove};
pub use model::student::{Student, StudentId, StudentStatus};
pub use repo::enrollment_repo::{
    EnrollmentOp, EnrollmentRepoError, EnrollmentResult, EnrollmentStore,
    SqliteEnrollmentRepository,
};
pub use repo::roster_repo::{
    RosterRepoError, RosterResult, RosterSource, SqliteRosterRepository,
};
pub use service::board_session::{
    BoardError, BoardSession, CommitSummary, DragOrigin, DropOutcome,
};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::core_version;

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
