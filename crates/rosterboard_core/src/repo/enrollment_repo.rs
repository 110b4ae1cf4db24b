//! Enrollment record store contract and SQLite implementation.
//!
//! # Responsibility
//! - Resolve a student's current open record in a class from persisted truth.
//! - Apply a batch of record mutations (patch/close/open) all-or-nothing.
//!
//! # Invariants
//! - `apply_batch` either applies every operation or none; one error
//!   surfaces for the whole batch.
//! - Closing a record that is no longer open fails the batch.
//! - Patching a zone with no open record falls back to opening a fresh one
//!   (merge-style upsert).
//! - Records pass `EnrollmentRecord::validate()` before SQL mutations.

use crate::db::DbError;
use crate::model::class::{ClassId, Zone};
use crate::model::enrollment::{
    CarryOver, EnrollmentId, EnrollmentRecord, EnrollmentValidationError,
};
use crate::model::student::StudentId;
use chrono::NaiveDate;
use rusqlite::{params, Connection, Row, Transaction, TransactionBehavior};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

const ENROLLMENT_SELECT_SQL: &str = "SELECT
    uuid,
    student_uuid,
    class_uuid,
    class_name,
    zone,
    start_date,
    end_date,
    transferred,
    carry_over
FROM enrollments";

pub type EnrollmentResult<T> = Result<T, EnrollmentRepoError>;

/// Errors from enrollment store operations.
#[derive(Debug)]
pub enum EnrollmentRepoError {
    /// Underlying SQLite failure.
    Db(DbError),
    /// Record rejected at the commit boundary.
    Validation(EnrollmentValidationError),
    /// Close target is missing or already closed.
    RecordNotOpen(EnrollmentId),
    /// Persisted data cannot be converted to a valid record.
    InvalidData(String),
}

impl Display for EnrollmentRepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::Validation(err) => write!(f, "{err}"),
            Self::RecordNotOpen(id) => write!(f, "enrollment record not open: {id}"),
            Self::InvalidData(message) => {
                write!(f, "invalid persisted enrollment data: {message}")
            }
        }
    }
}

impl Error for EnrollmentRepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::Validation(err) => Some(err),
            Self::RecordNotOpen(_) => None,
            Self::InvalidData(_) => None,
        }
    }
}

impl From<EnrollmentValidationError> for EnrollmentRepoError {
    fn from(value: EnrollmentValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<DbError> for EnrollmentRepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for EnrollmentRepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// One record mutation inside an atomic batch.
#[derive(Debug, Clone, PartialEq)]
pub enum EnrollmentOp {
    /// Rewrites the zone of the student's open record in the class. Falls
    /// back to opening a fresh record dated `effective_date` when no open
    /// record exists.
    PatchZone {
        student_uuid: StudentId,
        class_uuid: ClassId,
        class_name: String,
        zone: Zone,
        effective_date: NaiveDate,
    },
    /// Closes one resolved record on `end_date`. `transferred` marks a
    /// class-move close as opposed to a withdrawal.
    Close {
        enrollment_uuid: EnrollmentId,
        end_date: NaiveDate,
        transferred: bool,
    },
    /// Inserts one new record (open or pre-closed).
    Open { record: EnrollmentRecord },
}

/// Store interface for membership-record resolution and batched mutation.
pub trait EnrollmentStore {
    /// Loads the student's open record in the class from persisted truth,
    /// if one exists.
    fn open_enrollment(
        &self,
        student_uuid: StudentId,
        class_uuid: ClassId,
    ) -> EnrollmentResult<Option<EnrollmentRecord>>;

    /// Applies every operation or none.
    fn apply_batch(&self, ops: &[EnrollmentOp]) -> EnrollmentResult<()>;
}

/// SQLite-backed enrollment store.
pub struct SqliteEnrollmentRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteEnrollmentRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl EnrollmentStore for SqliteEnrollmentRepository<'_> {
    fn open_enrollment(
        &self,
        student_uuid: StudentId,
        class_uuid: ClassId,
    ) -> EnrollmentResult<Option<EnrollmentRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "{ENROLLMENT_SELECT_SQL}
             WHERE student_uuid = ?1
               AND class_uuid = ?2
               AND end_date IS NULL;"
        ))?;

        let mut rows = stmt.query(params![student_uuid.to_string(), class_uuid.to_string()])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_enrollment_row(row)?));
        }

        Ok(None)
    }

    fn apply_batch(&self, ops: &[EnrollmentOp]) -> EnrollmentResult<()> {
        if ops.is_empty() {
            return Ok(());
        }

        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        for op in ops {
            apply_op(&tx, op)?;
        }
        tx.commit()?;
        Ok(())
    }
}

fn apply_op(tx: &Transaction<'_>, op: &EnrollmentOp) -> EnrollmentResult<()> {
    match op {
        EnrollmentOp::PatchZone {
            student_uuid,
            class_uuid,
            class_name,
            zone,
            effective_date,
        } => {
            let changed = tx.execute(
                "UPDATE enrollments
                 SET zone = ?3,
                     updated_at = (strftime('%s', 'now') * 1000)
                 WHERE student_uuid = ?1
                   AND class_uuid = ?2
                   AND end_date IS NULL;",
                params![
                    student_uuid.to_string(),
                    class_uuid.to_string(),
                    zone.token(),
                ],
            )?;

            if changed == 0 {
                let record = EnrollmentRecord::open(
                    *student_uuid,
                    *class_uuid,
                    class_name.clone(),
                    *zone,
                    *effective_date,
                );
                insert_record(tx, &record)?;
            }
            Ok(())
        }
        EnrollmentOp::Close {
            enrollment_uuid,
            end_date,
            transferred,
        } => {
            let changed = tx.execute(
                "UPDATE enrollments
                 SET end_date = ?2,
                     transferred = ?3,
                     updated_at = (strftime('%s', 'now') * 1000)
                 WHERE uuid = ?1
                   AND end_date IS NULL;",
                params![
                    enrollment_uuid.to_string(),
                    date_to_db(*end_date),
                    bool_to_int(*transferred),
                ],
            )?;

            if changed == 0 {
                return Err(EnrollmentRepoError::RecordNotOpen(*enrollment_uuid));
            }
            Ok(())
        }
        EnrollmentOp::Open { record } => insert_record(tx, record),
    }
}

fn insert_record(tx: &Transaction<'_>, record: &EnrollmentRecord) -> EnrollmentResult<()> {
    record.validate()?;

    let carry_over = record
        .carry_over
        .as_ref()
        .map(|bag| serde_json::to_string(bag))
        .transpose()
        .map_err(|err| {
            EnrollmentRepoError::InvalidData(format!("carry_over not serializable: {err}"))
        })?;

    tx.execute(
        "INSERT INTO enrollments (
            uuid,
            student_uuid,
            class_uuid,
            class_name,
            zone,
            start_date,
            end_date,
            transferred,
            carry_over
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9);",
        params![
            record.uuid.to_string(),
            record.student_uuid.to_string(),
            record.class_uuid.to_string(),
            record.class_name.as_str(),
            record.zone.token(),
            date_to_db(record.start_date),
            record.end_date.map(date_to_db),
            bool_to_int(record.transferred),
            carry_over,
        ],
    )?;
    Ok(())
}

fn parse_enrollment_row(row: &Row<'_>) -> EnrollmentResult<EnrollmentRecord> {
    let uuid = parse_uuid(&row.get::<_, String>("uuid")?, "enrollments.uuid")?;
    let student_uuid = parse_uuid(
        &row.get::<_, String>("student_uuid")?,
        "enrollments.student_uuid",
    )?;
    let class_uuid = parse_uuid(
        &row.get::<_, String>("class_uuid")?,
        "enrollments.class_uuid",
    )?;

    let zone_text: String = row.get("zone")?;
    let zone = Zone::parse_token(&zone_text).ok_or_else(|| {
        EnrollmentRepoError::InvalidData(format!("invalid zone `{zone_text}` in enrollments.zone"))
    })?;

    let start_date = parse_date(&row.get::<_, String>("start_date")?, "enrollments.start_date")?;
    let end_date = row
        .get::<_, Option<String>>("end_date")?
        .map(|value| parse_date(&value, "enrollments.end_date"))
        .transpose()?;

    let transferred = match row.get::<_, i64>("transferred")? {
        0 => false,
        1 => true,
        other => {
            return Err(EnrollmentRepoError::InvalidData(format!(
                "invalid transferred value `{other}` in enrollments.transferred"
            )));
        }
    };

    let carry_over = row
        .get::<_, Option<String>>("carry_over")?
        .map(|value| parse_carry_over(&value))
        .transpose()?;

    let record = EnrollmentRecord {
        uuid,
        student_uuid,
        class_uuid,
        class_name: row.get("class_name")?,
        zone,
        start_date,
        end_date,
        transferred,
        carry_over,
    };
    record.validate()?;
    Ok(record)
}

fn parse_carry_over(value: &str) -> EnrollmentResult<CarryOver> {
    match serde_json::from_str::<serde_json::Value>(value) {
        Ok(serde_json::Value::Object(bag)) => Ok(bag),
        Ok(_) => Err(EnrollmentRepoError::InvalidData(
            "carry_over is not a JSON object".to_string(),
        )),
        Err(err) => Err(EnrollmentRepoError::InvalidData(format!(
            "carry_over is not valid JSON: {err}"
        ))),
    }
}

fn parse_uuid(value: &str, column: &str) -> EnrollmentResult<Uuid> {
    Uuid::parse_str(value).map_err(|_| {
        EnrollmentRepoError::InvalidData(format!("invalid uuid `{value}` in {column}"))
    })
}

fn parse_date(value: &str, column: &str) -> EnrollmentResult<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d").map_err(|_| {
        EnrollmentRepoError::InvalidData(format!("invalid date `{value}` in {column}"))
    })
}

fn date_to_db(value: NaiveDate) -> String {
    value.format("%Y-%m-%d").to_string()
}

fn bool_to_int(value: bool) -> i64 {
    if value {
        1
    } else {
        0
    }
}
