//! Optimistic reassignment session for one roster board.
//!
//! # Responsibility
//! - Hold the last-synced snapshot and a locally mutated optimistic copy.
//! - Track drag state and append pending moves on drop.
//! - Compress the pending ledger and commit its net effect as one atomic
//!   record batch.
//!
//! # Invariants
//! - With an empty ledger, `current_view()` is the snapshot itself (no copy).
//! - Inbound refreshes are ignored while moves are pending, so the view
//!   never jumps mid-edit.
//! - Commit resolves origin records against the unmodified snapshot, never
//!   the optimistic view.
//! - On write failure the ledger and optimistic state stay untouched; the
//!   caller may retry or cancel.
//!
//! All operations take `&mut self`, so a commit can never interleave with
//! another commit or a cancel on the same board.

use crate::model::class::{ClassId, ClassRoster, Zone};
use crate::model::enrollment::EnrollmentRecord;
use crate::model::moves::{compress_moves, PendingMove};
use crate::model::student::StudentId;
use crate::repo::enrollment_repo::{EnrollmentOp, EnrollmentRepoError, EnrollmentStore};
use crate::repo::roster_repo::{RosterRepoError, RosterSource};
use chrono::{Local, NaiveDate};
use log::{debug, error, info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Errors from board session operations.
#[derive(Debug)]
pub enum BoardError {
    /// Referenced class is not on the board.
    UnknownClass(ClassId),
    /// Dragged student is not a member of the origin class.
    MemberNotInClass { student: StudentId, class: ClassId },
    /// Student has no pending move to edit.
    NoPendingMove(StudentId),
    /// Scheduled date must lie strictly after today.
    ScheduledDateNotUpcoming { date: NaiveDate, today: NaiveDate },
    /// Snapshot source failure.
    Source(RosterRepoError),
    /// Enrollment store failure (lookup degradations excluded; this is the
    /// batched write rejecting).
    Store(EnrollmentRepoError),
}

impl Display for BoardError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownClass(id) => write!(f, "class not on board: {id}"),
            Self::MemberNotInClass { student, class } => {
                write!(f, "student {student} is not a member of class {class}")
            }
            Self::NoPendingMove(id) => write!(f, "no pending move for student: {id}"),
            Self::ScheduledDateNotUpcoming { date, today } => {
                write!(f, "scheduled date {date} is not after today {today}")
            }
            Self::Source(err) => write!(f, "{err}"),
            Self::Store(err) => write!(f, "{err}"),
        }
    }
}

impl Error for BoardError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Source(err) => Some(err),
            Self::Store(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RosterRepoError> for BoardError {
    fn from(value: RosterRepoError) -> Self {
        Self::Source(value)
    }
}

impl From<EnrollmentRepoError> for BoardError {
    fn from(value: EnrollmentRepoError) -> Self {
        Self::Store(value)
    }
}

/// Origin of the drag currently in progress.
///
/// Held as a session field rather than captured by any handler, so the drop
/// path always reads the latest origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DragOrigin {
    pub student_id: StudentId,
    pub from_class_id: ClassId,
    pub from_zone: Zone,
}

/// What a drop did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropOutcome {
    /// A pending move was queued and the view updated.
    Moved,
    /// Nothing happened: no drag in progress, or origin equals destination.
    Ignored,
}

/// Record operations one commit produced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommitSummary {
    /// Open records whose zone was rewritten in place.
    pub zone_patches: usize,
    /// Records closed as transfers.
    pub records_closed: usize,
    /// New records opened.
    pub records_opened: usize,
}

impl CommitSummary {
    /// Total operations handed to the store.
    pub fn ops(&self) -> usize {
        self.zone_patches + self.records_closed + self.records_opened
    }
}

/// Optimistic reassignment session over one board.
///
/// Owns the pending-move ledger and the derived optimistic view; one
/// instance per board, no state shared across boards.
pub struct BoardSession<S, E> {
    source: S,
    store: E,
    snapshot: Vec<ClassRoster>,
    /// Materialized only while moves are pending.
    local: Option<Vec<ClassRoster>>,
    pending: Vec<PendingMove>,
    dragging: Option<DragOrigin>,
    drag_over: Option<ClassId>,
    saving: bool,
}

impl<S: RosterSource, E: EnrollmentStore> BoardSession<S, E> {
    /// Creates a session and loads the initial snapshot from the source.
    pub fn try_new(source: S, store: E) -> Result<Self, BoardError> {
        let snapshot = source.fetch_classes()?;
        Ok(Self {
            source,
            store,
            snapshot,
            local: None,
            pending: Vec::new(),
            dragging: None,
            drag_over: None,
            saving: false,
        })
    }

    /// Current board state with all pending moves applied.
    ///
    /// With an empty ledger this is the snapshot itself; no copy is made
    /// until the first move lands.
    pub fn current_view(&self) -> &[ClassRoster] {
        self.local.as_deref().unwrap_or(&self.snapshot)
    }

    /// Last-synced snapshot, untouched by pending moves.
    pub fn snapshot(&self) -> &[ClassRoster] {
        &self.snapshot
    }

    /// Uncommitted moves in drop order.
    pub fn pending_moves(&self) -> &[PendingMove] {
        &self.pending
    }

    /// True only while a commit is executing.
    pub fn is_saving(&self) -> bool {
        self.saving
    }

    /// Origin of the drag in progress, if any.
    pub fn dragging(&self) -> Option<&DragOrigin> {
        self.dragging.as_ref()
    }

    /// Class currently hovered by a drag, for highlight rendering only.
    pub fn drag_over_class(&self) -> Option<ClassId> {
        self.drag_over
    }

    /// Records the drag origin.
    pub fn drag_start(&mut self, student_id: StudentId, from_class_id: ClassId, from_zone: Zone) {
        self.dragging = Some(DragOrigin {
            student_id,
            from_class_id,
            from_zone,
        });
    }

    /// Records the hovered target. Mutates nothing else.
    pub fn drag_over(&mut self, class_id: ClassId) {
        self.drag_over = Some(class_id);
    }

    /// Clears the hovered target.
    pub fn drag_leave(&mut self) {
        self.drag_over = None;
    }

    /// Completes the drag in progress onto `(to_class_id, to_zone)`.
    ///
    /// Reads the drag origin fresh. Dropping onto the origin itself (same
    /// class and same zone) is silently ignored and never reaches the
    /// ledger. Otherwise the optimistic view is mutated and one pending
    /// move is queued with no scheduled date. Drag state resets on every
    /// path, including errors.
    pub fn drop_on(&mut self, to_class_id: ClassId, to_zone: Zone) -> Result<DropOutcome, BoardError> {
        self.drag_over = None;
        let Some(origin) = self.dragging.take() else {
            return Ok(DropOutcome::Ignored);
        };

        if origin.from_class_id == to_class_id && origin.from_zone == to_zone {
            return Ok(DropOutcome::Ignored);
        }

        let view = self.current_view();
        let from_class = view
            .iter()
            .find(|class| class.uuid == origin.from_class_id)
            .ok_or(BoardError::UnknownClass(origin.from_class_id))?;
        if !from_class.contains(origin.student_id) {
            return Err(BoardError::MemberNotInClass {
                student: origin.student_id,
                class: origin.from_class_id,
            });
        }
        if !view.iter().any(|class| class.uuid == to_class_id) {
            return Err(BoardError::UnknownClass(to_class_id));
        }

        let mv = PendingMove {
            student_id: origin.student_id,
            from_class_id: origin.from_class_id,
            to_class_id,
            from_zone: origin.from_zone,
            to_zone,
            scheduled_date: None,
        };

        let local = self.local.get_or_insert_with(|| self.snapshot.clone());
        apply_move(local, &mv);

        debug!(
            "event=move_queued module=board student={} from_class={} to_class={} from_zone={} to_zone={}",
            mv.student_id,
            mv.from_class_id,
            mv.to_class_id,
            mv.from_zone.token(),
            mv.to_zone.token()
        );
        self.pending.push(mv);
        Ok(DropOutcome::Moved)
    }

    /// Rewrites the scheduled effective date of the student's most recent
    /// pending move. `None` restores immediate-effect semantics.
    ///
    /// Dates not strictly after today are rejected here, at the edit
    /// boundary; commit itself uses whatever is stored without
    /// re-validating.
    pub fn set_scheduled_date(
        &mut self,
        student_id: StudentId,
        date: Option<NaiveDate>,
    ) -> Result<(), BoardError> {
        self.set_scheduled_date_as_of(student_id, date, Local::now().date_naive())
    }

    /// `set_scheduled_date` against a caller-provided "today".
    pub fn set_scheduled_date_as_of(
        &mut self,
        student_id: StudentId,
        date: Option<NaiveDate>,
        today: NaiveDate,
    ) -> Result<(), BoardError> {
        if let Some(date) = date {
            if date <= today {
                return Err(BoardError::ScheduledDateNotUpcoming { date, today });
            }
        }

        let entry = self
            .pending
            .iter_mut()
            .rev()
            .find(|mv| mv.student_id == student_id)
            .ok_or(BoardError::NoPendingMove(student_id))?;
        entry.scheduled_date = date;
        Ok(())
    }

    /// Discards all pending moves and drag state.
    ///
    /// The next `current_view()` is the unmodified snapshot again. Never
    /// touches the store; always succeeds.
    pub fn cancel(&mut self) {
        let discarded = self.pending.len();
        self.pending.clear();
        self.local = None;
        self.dragging = None;
        self.drag_over = None;
        if discarded > 0 {
            info!("event=moves_cancelled module=board discarded={discarded}");
        }
    }

    /// Commits all pending moves, effective today where unscheduled.
    pub fn commit(&mut self) -> Result<CommitSummary, BoardError> {
        self.commit_as_of(Local::now().date_naive())
    }

    /// `commit` against a caller-provided "today".
    ///
    /// Compresses the ledger to one net move per student, resolves origin
    /// records against the unmodified snapshot, and applies every resulting
    /// record operation as one atomic batch. On success the ledger is
    /// cleared and the snapshot refetched; on failure both are left exactly
    /// as they were.
    pub fn commit_as_of(&mut self, today: NaiveDate) -> Result<CommitSummary, BoardError> {
        if self.pending.is_empty() {
            return Ok(CommitSummary::default());
        }

        self.saving = true;
        let result = self.commit_inner(today);
        self.saving = false;
        result
    }

    fn commit_inner(&mut self, today: NaiveDate) -> Result<CommitSummary, BoardError> {
        let net = compress_moves(&self.pending);
        info!(
            "event=commit_moves module=board status=start queued={} net={}",
            self.pending.len(),
            net.len()
        );

        if net.is_empty() {
            // Every chain returned to its origin; drop the ledger without
            // touching the store.
            self.pending.clear();
            self.local = None;
            info!("event=commit_moves module=board status=ok zone_patches=0 closed=0 opened=0");
            return Ok(CommitSummary::default());
        }

        let mut ops = Vec::new();
        let mut summary = CommitSummary::default();

        for (student_id, mv) in &net {
            // Resolve against the unmodified snapshot: by now the optimistic
            // view may no longer show the student in the origin class at all.
            if !self.snapshot.iter().any(|c| c.uuid == mv.from_class_id) {
                warn!(
                    "event=commit_moves module=board status=skip reason=origin_class_missing student={student_id}"
                );
                continue;
            }
            let Some(to_class) = self.snapshot.iter().find(|c| c.uuid == mv.to_class_id) else {
                warn!(
                    "event=commit_moves module=board status=skip reason=target_class_missing student={student_id}"
                );
                continue;
            };

            let effective = mv.scheduled_date.unwrap_or(today);

            if mv.is_zone_only() {
                ops.push(EnrollmentOp::PatchZone {
                    student_uuid: *student_id,
                    class_uuid: mv.to_class_id,
                    class_name: to_class.name.clone(),
                    zone: mv.to_zone,
                    effective_date: effective,
                });
                summary.zone_patches += 1;
                continue;
            }

            let prior = match self.store.open_enrollment(*student_id, mv.from_class_id) {
                Ok(prior) => prior,
                Err(err) => {
                    // Recoverable degradation: attempt the move with fresh
                    // defaults instead of failing the whole commit.
                    warn!(
                        "event=commit_moves module=board status=degraded reason=lookup_failed student={student_id} error={err}"
                    );
                    None
                }
            };

            let record = match prior {
                Some(prior) => {
                    ops.push(EnrollmentOp::Close {
                        enrollment_uuid: prior.uuid,
                        end_date: effective,
                        transferred: true,
                    });
                    summary.records_closed += 1;

                    let mut record = EnrollmentRecord::open(
                        *student_id,
                        mv.to_class_id,
                        to_class.name.clone(),
                        mv.to_zone,
                        prior.start_date,
                    );
                    record.carry_over = prior.carry_over;
                    record
                }
                None => EnrollmentRecord::open(
                    *student_id,
                    mv.to_class_id,
                    to_class.name.clone(),
                    mv.to_zone,
                    effective,
                ),
            };
            ops.push(EnrollmentOp::Open { record });
            summary.records_opened += 1;
        }

        if !ops.is_empty() {
            if let Err(err) = self.store.apply_batch(&ops) {
                error!(
                    "event=commit_moves module=board status=error ops={} error={err}",
                    ops.len()
                );
                return Err(BoardError::Store(err));
            }
        }

        self.pending.clear();
        self.local = None;
        self.refetch_snapshot();

        info!(
            "event=commit_moves module=board status=ok zone_patches={} closed={} opened={}",
            summary.zone_patches, summary.records_closed, summary.records_opened
        );
        Ok(summary)
    }

    /// Pulls a fresh snapshot from the source when it is safe to apply.
    ///
    /// Ignored while moves are pending; applied only when the fetched
    /// content differs structurally from the cached snapshot. Returns
    /// whether the snapshot changed.
    pub fn refresh(&mut self) -> Result<bool, BoardError> {
        if !self.pending.is_empty() {
            debug!(
                "event=snapshot_refresh module=board status=ignored pending={}",
                self.pending.len()
            );
            return Ok(false);
        }

        let classes = self.source.fetch_classes()?;
        if classes == self.snapshot {
            debug!("event=snapshot_refresh module=board status=unchanged");
            return Ok(false);
        }

        self.snapshot = classes;
        info!(
            "event=snapshot_refresh module=board status=ok classes={}",
            self.snapshot.len()
        );
        Ok(true)
    }

    fn refetch_snapshot(&mut self) {
        match self.source.fetch_classes() {
            Ok(classes) => self.snapshot = classes,
            Err(err) => {
                // The committed write stands; the stale snapshot heals on the
                // next successful refresh.
                error!("event=snapshot_refresh module=board status=error error={err}");
            }
        }
    }
}

/// Replays one pending move against a board state.
///
/// Same-class moves rewrite the member's zone; cross-class moves carry the
/// materialized member from source to destination with the new zone.
fn apply_move(classes: &mut [ClassRoster], mv: &PendingMove) {
    if mv.is_zone_only() {
        if let Some(class) = classes.iter_mut().find(|c| c.uuid == mv.from_class_id) {
            class.set_member_zone(mv.student_id, mv.to_zone);
        }
        return;
    }

    let moved = classes
        .iter_mut()
        .find(|c| c.uuid == mv.from_class_id)
        .and_then(|from| from.remove_member(mv.student_id));

    if let Some(to) = classes.iter_mut().find(|c| c.uuid == mv.to_class_id) {
        if let Some(mut member) = moved {
            member.zone = mv.to_zone;
            to.push_member(member);
        }
    }
}
