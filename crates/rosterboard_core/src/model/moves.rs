//! Pending-move ledger entries and net-move compression.
//!
//! # Responsibility
//! - Define the uncommitted move record a drop appends to the ledger.
//! - Fold an arbitrarily long ledger into at most one net move per student.
//!
//! # Invariants
//! - A pending move never has origin equal to destination (same class and
//!   same zone); the drop handler discards those before they reach the
//!   ledger.
//! - Compression preserves the first-seen origin and the last-seen
//!   destination per student; chains returning to the origin vanish.

use crate::model::class::{ClassId, Zone};
use crate::model::student::StudentId;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

/// One uncommitted move created by a drop, in ledger order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingMove {
    /// Student being moved.
    pub student_id: StudentId,
    /// Class the drag started from.
    pub from_class_id: ClassId,
    /// Class the drop landed on.
    pub to_class_id: ClassId,
    /// Zone held at drag start.
    pub from_zone: Zone,
    /// Zone the drop landed on.
    pub to_zone: Zone,
    /// Future date the move should take effect on; `None` means effective
    /// immediately at commit time.
    pub scheduled_date: Option<NaiveDate>,
}

impl PendingMove {
    /// Returns whether this move stays within one class (zone change only).
    pub fn is_zone_only(&self) -> bool {
        self.from_class_id == self.to_class_id
    }
}

/// Net effect of all of one student's pending moves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetMove {
    /// Origin fixed by the student's first ledger entry.
    pub from_class_id: ClassId,
    /// Zone held at the origin.
    pub from_zone: Zone,
    /// Destination from the student's last ledger entry.
    pub to_class_id: ClassId,
    /// Zone at the destination.
    pub to_zone: Zone,
    /// Scheduled date from the student's last ledger entry.
    pub scheduled_date: Option<NaiveDate>,
}

impl NetMove {
    /// Returns whether the net move stays within one class.
    pub fn is_zone_only(&self) -> bool {
        self.from_class_id == self.to_class_id
    }
}

/// Folds a ledger into at most one net move per student.
///
/// The first entry per student fixes the origin; later entries overwrite
/// only the destination and scheduled date. Students whose final destination
/// equals their origin are dropped entirely, so a chain like A→B→A produces
/// nothing. Iteration order of the result is deterministic (sorted by
/// student id), keeping downstream batch op order stable.
pub fn compress_moves(moves: &[PendingMove]) -> BTreeMap<StudentId, NetMove> {
    let mut net: BTreeMap<StudentId, NetMove> = BTreeMap::new();

    for mv in moves {
        match net.entry(mv.student_id) {
            Entry::Occupied(mut slot) => {
                let folded = slot.get_mut();
                folded.to_class_id = mv.to_class_id;
                folded.to_zone = mv.to_zone;
                folded.scheduled_date = mv.scheduled_date;
            }
            Entry::Vacant(slot) => {
                slot.insert(NetMove {
                    from_class_id: mv.from_class_id,
                    from_zone: mv.from_zone,
                    to_class_id: mv.to_class_id,
                    to_zone: mv.to_zone,
                    scheduled_date: mv.scheduled_date,
                });
            }
        }
    }

    net.retain(|_, folded| {
        folded.to_class_id != folded.from_class_id || folded.to_zone != folded.from_zone
    });
    net
}
