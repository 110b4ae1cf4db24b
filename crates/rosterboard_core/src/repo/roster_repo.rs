//! Snapshot source contract and SQLite read-model derivation.
//!
//! # Responsibility
//! - Define the `RosterSource` contract the board session refreshes from.
//! - Derive board-facing class rosters from persisted enrollment history
//!   instead of storing membership lists.
//!
//! # Invariants
//! - A class's members are exactly the students holding an open enrollment
//!   in it, excluding prospect-status students.
//! - Derivation is deterministic: classes sort by name, members by name
//!   then id.
//! - Transfer-closed spans never count as withdrawals.

use crate::db::DbError;
use crate::model::class::{ClassId, ClassRoster, RosterMember, Zone};
use crate::model::student::{Student, StudentId, StudentStatus};
use chrono::{Local, NaiveDate};
use rusqlite::{params, Connection, Row};
use std::collections::{HashMap, HashSet};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

pub type RosterResult<T> = Result<T, RosterRepoError>;

/// Errors from snapshot-source operations.
#[derive(Debug)]
pub enum RosterRepoError {
    /// Underlying SQLite failure.
    Db(DbError),
    /// Persisted data cannot be converted to a valid read model.
    InvalidData(String),
}

impl Display for RosterRepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::InvalidData(message) => write!(f, "invalid persisted roster data: {message}"),
        }
    }
}

impl Error for RosterRepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::InvalidData(_) => None,
        }
    }
}

impl From<DbError> for RosterRepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RosterRepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Snapshot source the board session refreshes from.
///
/// Implementations must be idempotent and safe to poll; the session keys
/// refresh application on structural equality of the returned rosters.
pub trait RosterSource {
    /// Fetches the current roster of every class.
    fn fetch_classes(&self) -> RosterResult<Vec<ClassRoster>>;
}

/// SQLite-backed roster source deriving rosters from enrollment history.
pub struct SqliteRosterRepository<'conn> {
    conn: &'conn Connection,
    today: NaiveDate,
}

impl<'conn> SqliteRosterRepository<'conn> {
    /// Creates a source using the local calendar date for scheduled-flag
    /// derivation.
    pub fn new(conn: &'conn Connection) -> Self {
        Self::with_today(conn, Local::now().date_naive())
    }

    /// Creates a source with a fixed "today", for deterministic derivation.
    pub fn with_today(conn: &'conn Connection, today: NaiveDate) -> Self {
        Self { conn, today }
    }
}

impl RosterSource for SqliteRosterRepository<'_> {
    fn fetch_classes(&self) -> RosterResult<Vec<ClassRoster>> {
        let mut rosters = self.load_classes()?;
        let transfer_closed = self.load_transfer_closed_classes()?;

        let mut stmt = self.conn.prepare(
            "SELECT
                e.student_uuid,
                e.class_uuid,
                e.zone,
                e.start_date,
                s.name,
                s.status
             FROM enrollments e
             JOIN students s ON s.uuid = e.student_uuid
             WHERE e.end_date IS NULL;",
        )?;
        let mut rows = stmt.query([])?;

        let mut members_by_class: HashMap<ClassId, Vec<RosterMember>> = HashMap::new();
        while let Some(row) = rows.next()? {
            let Some((class_uuid, member)) = self.parse_member_row(row, &transfer_closed)? else {
                continue;
            };
            members_by_class.entry(class_uuid).or_default().push(member);
        }

        for roster in &mut rosters {
            let Some(mut members) = members_by_class.remove(&roster.uuid) else {
                continue;
            };
            members.sort_by(|a, b| a.name.cmp(&b.name).then(a.uuid.cmp(&b.uuid)));
            roster.student_ids = members.iter().map(|m| m.uuid).collect();
            roster.members = members;
        }

        Ok(rosters)
    }
}

impl SqliteRosterRepository<'_> {
    /// Inserts one student row.
    ///
    /// Seeding/import path; the board engine itself never writes students.
    pub fn insert_student(&self, student: &Student) -> RosterResult<()> {
        self.conn.execute(
            "INSERT INTO students (uuid, name, status) VALUES (?1, ?2, ?3);",
            params![
                student.uuid.to_string(),
                student.name.as_str(),
                student_status_to_db(student.status),
            ],
        )?;
        Ok(())
    }

    /// Inserts one class row.
    ///
    /// Membership is derived from enrollment history, so only identity is
    /// stored here.
    pub fn insert_class(&self, uuid: ClassId, name: &str) -> RosterResult<()> {
        self.conn.execute(
            "INSERT INTO classes (uuid, name) VALUES (?1, ?2);",
            params![uuid.to_string(), name],
        )?;
        Ok(())
    }

    fn load_classes(&self) -> RosterResult<Vec<ClassRoster>> {
        let mut stmt = self
            .conn
            .prepare("SELECT uuid, name FROM classes ORDER BY name ASC, uuid ASC;")?;
        let mut rows = stmt.query([])?;

        let mut rosters = Vec::new();
        while let Some(row) = rows.next()? {
            let uuid = parse_uuid(&row.get::<_, String>(0)?, "classes.uuid")?;
            rosters.push(ClassRoster::new(uuid, row.get::<_, String>(1)?));
        }
        Ok(rosters)
    }

    /// Collects, per student, the classes they left via a transfer close.
    fn load_transfer_closed_classes(&self) -> RosterResult<HashMap<StudentId, HashSet<ClassId>>> {
        let mut stmt = self.conn.prepare(
            "SELECT DISTINCT student_uuid, class_uuid
             FROM enrollments
             WHERE end_date IS NOT NULL AND transferred = 1;",
        )?;
        let mut rows = stmt.query([])?;

        let mut closed: HashMap<StudentId, HashSet<ClassId>> = HashMap::new();
        while let Some(row) = rows.next()? {
            let student = parse_uuid(&row.get::<_, String>(0)?, "enrollments.student_uuid")?;
            let class = parse_uuid(&row.get::<_, String>(1)?, "enrollments.class_uuid")?;
            closed.entry(student).or_default().insert(class);
        }
        Ok(closed)
    }

    fn parse_member_row(
        &self,
        row: &Row<'_>,
        transfer_closed: &HashMap<StudentId, HashSet<ClassId>>,
    ) -> RosterResult<Option<(ClassId, RosterMember)>> {
        let status_text: String = row.get(5)?;
        let status = parse_student_status(&status_text).ok_or_else(|| {
            RosterRepoError::InvalidData(format!(
                "invalid status `{status_text}` in students.status"
            ))
        })?;
        if !status.shows_on_board() {
            return Ok(None);
        }

        let student = parse_uuid(&row.get::<_, String>(0)?, "enrollments.student_uuid")?;
        let class = parse_uuid(&row.get::<_, String>(1)?, "enrollments.class_uuid")?;

        let zone_text: String = row.get(2)?;
        let zone = Zone::parse_token(&zone_text).ok_or_else(|| {
            RosterRepoError::InvalidData(format!("invalid zone `{zone_text}` in enrollments.zone"))
        })?;

        let start_text: String = row.get(3)?;
        let start_date = parse_date(&start_text, "enrollments.start_date")?;

        let transferred_in = transfer_closed
            .get(&student)
            .is_some_and(|classes| classes.iter().any(|closed| *closed != class));

        let member = RosterMember {
            uuid: student,
            name: row.get(4)?,
            zone,
            enrolled_on: Some(start_date),
            scheduled: start_date > self.today,
            transferred_in,
        };
        Ok(Some((class, member)))
    }
}

fn parse_uuid(value: &str, column: &str) -> RosterResult<Uuid> {
    Uuid::parse_str(value)
        .map_err(|_| RosterRepoError::InvalidData(format!("invalid uuid `{value}` in {column}")))
}

fn parse_date(value: &str, column: &str) -> RosterResult<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|_| RosterRepoError::InvalidData(format!("invalid date `{value}` in {column}")))
}

fn student_status_to_db(status: StudentStatus) -> &'static str {
    match status {
        StudentStatus::Active => "active",
        StudentStatus::Withdrawn => "withdrawn",
        StudentStatus::OnHold => "on_hold",
        StudentStatus::Prospect => "prospect",
    }
}

fn parse_student_status(value: &str) -> Option<StudentStatus> {
    match value {
        "active" => Some(StudentStatus::Active),
        "withdrawn" => Some(StudentStatus::Withdrawn),
        "on_hold" => Some(StudentStatus::OnHold),
        "prospect" => Some(StudentStatus::Prospect),
        _ => None,
    }
}
