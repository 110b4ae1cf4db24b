//! Class roster read model.
//!
//! # Responsibility
//! - Define the board-facing shape of one class: identity, ordered member
//!   ids, and materialized member records with zone assignments.
//! - Provide the membership mutations the optimistic replay rule needs.
//!
//! # Invariants
//! - `student_ids` and `members` stay in sync: same students, ids ordered.
//! - A student appears at most once per class.
//! - Structural equality (`PartialEq`) is the key for snapshot-refresh
//!   suppression; two rosters with identical content compare equal.

use crate::model::student::StudentId;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable identifier for a class.
pub type ClassId = Uuid;

/// Day of week a zone can pin attendance to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Weekday {
    Mon,
    Tue,
    Wed,
    Thu,
    Fri,
    Sat,
    Sun,
}

impl Weekday {
    /// Lowercase storage token for this day.
    pub fn token(self) -> &'static str {
        match self {
            Self::Mon => "mon",
            Self::Tue => "tue",
            Self::Wed => "wed",
            Self::Thu => "thu",
            Self::Fri => "fri",
            Self::Sat => "sat",
            Self::Sun => "sun",
        }
    }

    /// Parses a lowercase storage token.
    pub fn parse_token(value: &str) -> Option<Self> {
        match value {
            "mon" => Some(Self::Mon),
            "tue" => Some(Self::Tue),
            "wed" => Some(Self::Wed),
            "thu" => Some(Self::Thu),
            "fri" => Some(Self::Fri),
            "sat" => Some(Self::Sat),
            "sun" => Some(Self::Sun),
            _ => None,
        }
    }
}

/// Attendance sub-partition of a class membership.
///
/// A member is either in the common pool (attends every day the class meets)
/// or pinned to one specific weekday.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Zone {
    /// Attends on every applicable day.
    Common,
    /// Attends only on the given day.
    Day(Weekday),
}

impl Zone {
    /// Storage token: `common` or a weekday token.
    pub fn token(self) -> &'static str {
        match self {
            Self::Common => "common",
            Self::Day(day) => day.token(),
        }
    }

    /// Parses a storage token back into a zone.
    pub fn parse_token(value: &str) -> Option<Self> {
        if value == "common" {
            return Some(Self::Common);
        }
        Weekday::parse_token(value).map(Self::Day)
    }
}

impl Default for Zone {
    fn default() -> Self {
        Self::Common
    }
}

/// Materialized member record within one class roster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterMember {
    /// Stable student id.
    pub uuid: StudentId,
    /// Display name, denormalized for rendering.
    pub name: String,
    /// Attendance zone within this class.
    pub zone: Zone,
    /// Start date of the backing enrollment record, when known.
    pub enrolled_on: Option<NaiveDate>,
    /// Start date lies in the future: assignment is scheduled, not yet active.
    pub scheduled: bool,
    /// Came here via a class move (a transfer-closed record exists elsewhere).
    pub transferred_in: bool,
}

impl RosterMember {
    /// Creates a plain member in the common zone with no derived flags.
    pub fn new(uuid: StudentId, name: impl Into<String>) -> Self {
        Self {
            uuid,
            name: name.into(),
            zone: Zone::Common,
            enrolled_on: None,
            scheduled: false,
            transferred_in: false,
        }
    }
}

/// Board-facing read model of one class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassRoster {
    /// Stable class id.
    pub uuid: ClassId,
    /// Display name; also the name recorded on enrollment history.
    pub name: String,
    /// Ordered member ids.
    pub student_ids: Vec<StudentId>,
    /// Materialized member records, one per id.
    pub members: Vec<RosterMember>,
}

impl ClassRoster {
    /// Creates an empty roster.
    pub fn new(uuid: ClassId, name: impl Into<String>) -> Self {
        Self {
            uuid,
            name: name.into(),
            student_ids: Vec::new(),
            members: Vec::new(),
        }
    }

    /// Returns whether the student is a member of this class.
    pub fn contains(&self, student: StudentId) -> bool {
        self.student_ids.contains(&student) || self.members.iter().any(|m| m.uuid == student)
    }

    /// Looks up the materialized record for one member.
    pub fn member(&self, student: StudentId) -> Option<&RosterMember> {
        self.members.iter().find(|m| m.uuid == student)
    }

    /// Removes a member from ids and materialized records, returning it.
    pub fn remove_member(&mut self, student: StudentId) -> Option<RosterMember> {
        self.student_ids.retain(|id| *id != student);
        let index = self.members.iter().position(|m| m.uuid == student)?;
        Some(self.members.remove(index))
    }

    /// Appends a member, skipping duplicates already present.
    pub fn push_member(&mut self, member: RosterMember) {
        if !self.student_ids.contains(&member.uuid) {
            self.student_ids.push(member.uuid);
        }
        if !self.members.iter().any(|m| m.uuid == member.uuid) {
            self.members.push(member);
        }
    }

    /// Rewrites one member's zone. Returns whether the member was found.
    pub fn set_member_zone(&mut self, student: StudentId, zone: Zone) -> bool {
        match self.members.iter_mut().find(|m| m.uuid == student) {
            Some(member) => {
                member.zone = zone;
                true
            }
            None => false,
        }
    }
}
