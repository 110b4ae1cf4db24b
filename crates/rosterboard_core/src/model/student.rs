//! Student domain model.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable identifier for a student.
///
/// Kept as a type alias to make semantic intent explicit in signatures.
pub type StudentId = Uuid;

/// Enrollment lifecycle status of a student as a whole (not per class).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StudentStatus {
    /// Currently attending.
    Active,
    /// Left the academy; kept for history views.
    Withdrawn,
    /// Temporarily paused; still shown on boards.
    OnHold,
    /// Inquiry-stage student, never materialized on a board.
    Prospect,
}

impl StudentStatus {
    /// Returns whether students with this status appear on roster boards.
    pub fn shows_on_board(self) -> bool {
        !matches!(self, Self::Prospect)
    }
}

/// Canonical student record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Student {
    /// Stable global ID used for linking and auditing.
    pub uuid: StudentId,
    /// Display name.
    pub name: String,
    /// Board visibility status.
    pub status: StudentStatus,
}

impl Student {
    /// Creates a new active student with a generated stable ID.
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_id(Uuid::new_v4(), name)
    }

    /// Creates a student with a caller-provided stable ID.
    ///
    /// Used by import paths where identity already exists externally.
    pub fn with_id(uuid: StudentId, name: impl Into<String>) -> Self {
        Self {
            uuid,
            name: name.into(),
            status: StudentStatus::Active,
        }
    }
}
