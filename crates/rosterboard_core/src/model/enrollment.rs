//! Durable enrollment record model.
//!
//! # Responsibility
//! - Define the persisted, time-bounded record of one student's membership
//!   in one class.
//! - Provide lifecycle helpers and commit-boundary validation.
//!
//! # Invariants
//! - At most one open record (no `end_date`) exists per (student, class);
//!   storage enforces this with a partial unique index.
//! - A close caused by a class move sets `transferred`, distinguishing it
//!   from a withdrawal close.
//! - `carry_over` is opaque to the engine and copied forward across
//!   transfers.

use crate::model::class::{ClassId, Zone};
use crate::model::student::StudentId;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Stable identifier for one enrollment record.
pub type EnrollmentId = Uuid;

/// Opaque attribute bag preserved across transfers (billing codes, import
/// provenance, and similar fields the engine must not interpret).
pub type CarryOver = serde_json::Map<String, serde_json::Value>;

/// Validation failure for an enrollment record at the commit boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnrollmentValidationError {
    /// Recorded class name is blank.
    BlankClassName,
    /// Close date precedes the open date.
    EndBeforeStart { start: NaiveDate, end: NaiveDate },
}

impl Display for EnrollmentValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BlankClassName => write!(f, "enrollment class name must not be blank"),
            Self::EndBeforeStart { start, end } => {
                write!(f, "enrollment end date {end} precedes start date {start}")
            }
        }
    }
}

impl Error for EnrollmentValidationError {}

/// Persisted membership record: one historical span of one student's
/// membership in one class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrollmentRecord {
    /// Stable record id; the handle close operations address.
    pub uuid: EnrollmentId,
    /// Student this span belongs to.
    pub student_uuid: StudentId,
    /// Class this span belongs to.
    pub class_uuid: ClassId,
    /// Class display name at record time; denormalized because records are
    /// historical and must survive later renames.
    pub class_name: String,
    /// Attendance zone held during this span.
    pub zone: Zone,
    /// First day of the span.
    pub start_date: NaiveDate,
    /// Last day of the span. `None` means the record is open.
    pub end_date: Option<NaiveDate>,
    /// The span ended because the student moved to another class, not
    /// because they withdrew.
    pub transferred: bool,
    /// Opaque fields inherited from a prior record on transfer.
    pub carry_over: Option<CarryOver>,
}

impl EnrollmentRecord {
    /// Creates a fresh open record with a generated id and no carry-over.
    pub fn open(
        student_uuid: StudentId,
        class_uuid: ClassId,
        class_name: impl Into<String>,
        zone: Zone,
        start_date: NaiveDate,
    ) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            student_uuid,
            class_uuid,
            class_name: class_name.into(),
            zone,
            start_date,
            end_date: None,
            transferred: false,
            carry_over: None,
        }
    }

    /// Returns whether this record is the student's current span in the
    /// class.
    pub fn is_open(&self) -> bool {
        self.end_date.is_none()
    }

    /// Validates the record before it crosses the persistence boundary.
    pub fn validate(&self) -> Result<(), EnrollmentValidationError> {
        if self.class_name.trim().is_empty() {
            return Err(EnrollmentValidationError::BlankClassName);
        }
        if let Some(end) = self.end_date {
            if end < self.start_date {
                return Err(EnrollmentValidationError::EndBeforeStart {
                    start: self.start_date,
                    end,
                });
            }
        }
        Ok(())
    }
}
