use chrono::NaiveDate;
use rosterboard_core::db::open_db_in_memory;
use rosterboard_core::{
    BoardError, BoardSession, ClassId, ClassRoster, DropOutcome, EnrollmentOp, EnrollmentRecord,
    EnrollmentRepoError, EnrollmentResult, EnrollmentStore, SqliteEnrollmentRepository,
    SqliteRosterRepository, Student, StudentId, Weekday, Zone,
};
use rusqlite::{Connection, OptionalExtension};
use uuid::Uuid;

fn setup() -> Connection {
    open_db_in_memory().unwrap()
}

fn day(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn today() -> NaiveDate {
    day(2026, 3, 2)
}

fn seed_student(conn: &Connection, name: &str) -> StudentId {
    let student = Student::new(name);
    SqliteRosterRepository::new(conn)
        .insert_student(&student)
        .unwrap();
    student.uuid
}

fn seed_class(conn: &Connection, name: &str) -> ClassId {
    let uuid = Uuid::new_v4();
    SqliteRosterRepository::new(conn)
        .insert_class(uuid, name)
        .unwrap();
    uuid
}

fn seed_open_enrollment(
    conn: &Connection,
    student: StudentId,
    class: ClassId,
    class_name: &str,
    zone: Zone,
    start: NaiveDate,
) -> Uuid {
    let record = EnrollmentRecord::open(student, class, class_name, zone, start);
    let uuid = record.uuid;
    SqliteEnrollmentRepository::new(conn)
        .apply_batch(&[EnrollmentOp::Open { record }])
        .unwrap();
    uuid
}

struct Board {
    class_a: ClassId,
    class_b: ClassId,
    s1: StudentId,
    s2: StudentId,
    s3: StudentId,
    record_s1_a: Uuid,
}

/// Class A holds s1 (kim) and s2 (lee), class B holds s3 (park), all in the
/// common zone since 2026-01-05.
fn seed_board(conn: &Connection) -> Board {
    let class_a = seed_class(conn, "algebra-a");
    let class_b = seed_class(conn, "algebra-b");
    let s1 = seed_student(conn, "kim");
    let s2 = seed_student(conn, "lee");
    let s3 = seed_student(conn, "park");
    let record_s1_a =
        seed_open_enrollment(conn, s1, class_a, "algebra-a", Zone::Common, day(2026, 1, 5));
    seed_open_enrollment(conn, s2, class_a, "algebra-a", Zone::Common, day(2026, 1, 5));
    seed_open_enrollment(conn, s3, class_b, "algebra-b", Zone::Common, day(2026, 1, 5));
    Board {
        class_a,
        class_b,
        s1,
        s2,
        s3,
        record_s1_a,
    }
}

fn make_session(
    conn: &Connection,
) -> BoardSession<SqliteRosterRepository<'_>, SqliteEnrollmentRepository<'_>> {
    let source = SqliteRosterRepository::with_today(conn, today());
    let store = SqliteEnrollmentRepository::new(conn);
    BoardSession::try_new(source, store).unwrap()
}

fn class<'a>(view: &'a [ClassRoster], id: ClassId) -> &'a ClassRoster {
    view.iter().find(|c| c.uuid == id).unwrap()
}

fn count_enrollments(conn: &Connection, class_id: ClassId) -> i64 {
    conn.query_row(
        "SELECT COUNT(*) FROM enrollments WHERE class_uuid = ?1;",
        [class_id.to_string()],
        |row| row.get(0),
    )
    .unwrap()
}

fn closed_record(
    conn: &Connection,
    student: StudentId,
    class_id: ClassId,
) -> Option<(String, i64)> {
    conn.query_row(
        "SELECT end_date, transferred FROM enrollments
         WHERE student_uuid = ?1 AND class_uuid = ?2 AND end_date IS NOT NULL;",
        [student.to_string(), class_id.to_string()],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )
    .optional()
    .unwrap()
}

#[test]
fn empty_ledger_view_is_snapshot_itself() {
    let conn = setup();
    seed_board(&conn);
    let session = make_session(&conn);

    assert!(session.pending_moves().is_empty());
    assert!(!session.is_saving());
    assert_eq!(
        session.current_view().as_ptr(),
        session.snapshot().as_ptr()
    );
}

#[test]
fn drop_without_drag_in_progress_is_ignored() {
    let conn = setup();
    let board = seed_board(&conn);
    let mut session = make_session(&conn);

    let outcome = session.drop_on(board.class_b, Zone::Common).unwrap();
    assert_eq!(outcome, DropOutcome::Ignored);
    assert!(session.pending_moves().is_empty());
}

#[test]
fn drop_onto_same_class_and_zone_is_discarded() {
    let conn = setup();
    let board = seed_board(&conn);
    let mut session = make_session(&conn);

    session.drag_start(board.s1, board.class_a, Zone::Common);
    let outcome = session.drop_on(board.class_a, Zone::Common).unwrap();

    assert_eq!(outcome, DropOutcome::Ignored);
    assert!(session.pending_moves().is_empty());
    assert!(session.dragging().is_none());
    // No copy was materialized either.
    assert_eq!(
        session.current_view().as_ptr(),
        session.snapshot().as_ptr()
    );
}

#[test]
fn cross_class_drop_updates_view_and_queues_one_move() {
    let conn = setup();
    let board = seed_board(&conn);
    let mut session = make_session(&conn);

    session.drag_start(board.s1, board.class_a, Zone::Common);
    let outcome = session
        .drop_on(board.class_b, Zone::Day(Weekday::Thu))
        .unwrap();
    assert_eq!(outcome, DropOutcome::Moved);

    let moves = session.pending_moves();
    assert_eq!(moves.len(), 1);
    assert_eq!(moves[0].student_id, board.s1);
    assert_eq!(moves[0].from_class_id, board.class_a);
    assert_eq!(moves[0].to_class_id, board.class_b);
    assert_eq!(moves[0].from_zone, Zone::Common);
    assert_eq!(moves[0].to_zone, Zone::Day(Weekday::Thu));
    assert_eq!(moves[0].scheduled_date, None);

    let view = session.current_view();
    assert!(!class(view, board.class_a).contains(board.s1));
    let landed = class(view, board.class_b).member(board.s1).unwrap();
    assert_eq!(landed.zone, Zone::Day(Weekday::Thu));
    assert_eq!(landed.name, "kim");

    // The snapshot itself stays untouched.
    assert!(class(session.snapshot(), board.class_a).contains(board.s1));
}

#[test]
fn zone_drop_within_class_rewrites_zone_only() {
    let conn = setup();
    let board = seed_board(&conn);
    let mut session = make_session(&conn);

    session.drag_start(board.s1, board.class_a, Zone::Common);
    let outcome = session
        .drop_on(board.class_a, Zone::Day(Weekday::Mon))
        .unwrap();
    assert_eq!(outcome, DropOutcome::Moved);

    let moves = session.pending_moves();
    assert_eq!(moves.len(), 1);
    assert!(moves[0].is_zone_only());

    let view = session.current_view();
    let roster = class(view, board.class_a);
    assert_eq!(roster.member(board.s1).unwrap().zone, Zone::Day(Weekday::Mon));
    assert_eq!(roster.student_ids.len(), 2);
}

#[test]
fn drop_reads_the_latest_drag_origin() {
    let conn = setup();
    let board = seed_board(&conn);
    let mut session = make_session(&conn);

    // A second drag_start before any drop supersedes the first origin.
    session.drag_start(board.s1, board.class_a, Zone::Common);
    session.drag_start(board.s2, board.class_a, Zone::Common);
    session.drop_on(board.class_b, Zone::Common).unwrap();

    let moves = session.pending_moves();
    assert_eq!(moves.len(), 1);
    assert_eq!(moves[0].student_id, board.s2);
}

#[test]
fn drag_over_tracks_hover_target_only() {
    let conn = setup();
    let board = seed_board(&conn);
    let mut session = make_session(&conn);

    session.drag_over(board.class_b);
    assert_eq!(session.drag_over_class(), Some(board.class_b));
    assert!(session.pending_moves().is_empty());

    session.drag_leave();
    assert_eq!(session.drag_over_class(), None);

    session.drag_start(board.s1, board.class_a, Zone::Common);
    session.drag_over(board.class_b);
    session.drop_on(board.class_b, Zone::Common).unwrap();
    assert_eq!(session.drag_over_class(), None);
}

#[test]
fn drop_from_unknown_class_resets_drag_state() {
    let conn = setup();
    let board = seed_board(&conn);
    let mut session = make_session(&conn);

    session.drag_start(board.s1, Uuid::new_v4(), Zone::Common);
    let err = session.drop_on(board.class_b, Zone::Common).unwrap_err();
    assert!(matches!(err, BoardError::UnknownClass(_)));
    assert!(session.dragging().is_none());
    assert!(session.pending_moves().is_empty());
}

#[test]
fn drop_of_non_member_is_rejected() {
    let conn = setup();
    let board = seed_board(&conn);
    let mut session = make_session(&conn);

    session.drag_start(board.s3, board.class_a, Zone::Common);
    let err = session.drop_on(board.class_b, Zone::Common).unwrap_err();
    assert!(
        matches!(err, BoardError::MemberNotInClass { student, class } if student == board.s3 && class == board.class_a)
    );
}

#[test]
fn scheduled_date_edits_latest_entry_of_that_student_only() {
    let conn = setup();
    let board = seed_board(&conn);
    let mut session = make_session(&conn);

    session.drag_start(board.s1, board.class_a, Zone::Common);
    session.drop_on(board.class_b, Zone::Common).unwrap();
    session.drag_start(board.s1, board.class_b, Zone::Common);
    session
        .drop_on(board.class_a, Zone::Day(Weekday::Fri))
        .unwrap();
    session.drag_start(board.s2, board.class_a, Zone::Common);
    session.drop_on(board.class_b, Zone::Common).unwrap();

    let scheduled = day(2026, 4, 1);
    session
        .set_scheduled_date_as_of(board.s1, Some(scheduled), today())
        .unwrap();

    let moves = session.pending_moves();
    assert_eq!(moves[0].scheduled_date, None);
    assert_eq!(moves[1].scheduled_date, Some(scheduled));
    assert_eq!(moves[2].scheduled_date, None);

    session
        .set_scheduled_date_as_of(board.s1, None, today())
        .unwrap();
    assert_eq!(session.pending_moves()[1].scheduled_date, None);
}

#[test]
fn scheduled_date_rejects_non_future_dates_and_unknown_students() {
    let conn = setup();
    let board = seed_board(&conn);
    let mut session = make_session(&conn);

    session.drag_start(board.s1, board.class_a, Zone::Common);
    session.drop_on(board.class_b, Zone::Common).unwrap();

    let err = session
        .set_scheduled_date_as_of(board.s1, Some(today()), today())
        .unwrap_err();
    assert!(matches!(err, BoardError::ScheduledDateNotUpcoming { .. }));
    assert_eq!(session.pending_moves()[0].scheduled_date, None);

    let err = session
        .set_scheduled_date_as_of(board.s2, Some(day(2026, 4, 1)), today())
        .unwrap_err();
    assert!(matches!(err, BoardError::NoPendingMove(id) if id == board.s2));
}

#[test]
fn cancel_restores_snapshot_reference_and_clears_state() {
    let conn = setup();
    let board = seed_board(&conn);
    let mut session = make_session(&conn);

    session.drag_start(board.s1, board.class_a, Zone::Common);
    session.drop_on(board.class_b, Zone::Common).unwrap();
    assert_ne!(
        session.current_view().as_ptr(),
        session.snapshot().as_ptr()
    );

    session.cancel();

    assert!(session.pending_moves().is_empty());
    assert!(session.dragging().is_none());
    assert_eq!(
        session.current_view().as_ptr(),
        session.snapshot().as_ptr()
    );
    assert!(class(session.current_view(), board.class_a).contains(board.s1));
}

#[test]
fn commit_with_empty_ledger_is_a_noop() {
    let conn = setup();
    seed_board(&conn);
    let mut session = make_session(&conn);

    let summary = session.commit_as_of(today()).unwrap();
    assert_eq!(summary.ops(), 0);
}

#[test]
fn round_trip_moves_commit_without_any_write() {
    let conn = setup();
    let board = seed_board(&conn);
    let rows_before = count_enrollments(&conn, board.class_a)
        + count_enrollments(&conn, board.class_b);
    let mut session = make_session(&conn);

    session.drag_start(board.s1, board.class_a, Zone::Common);
    session.drop_on(board.class_b, Zone::Common).unwrap();
    session.drag_start(board.s1, board.class_b, Zone::Common);
    session.drop_on(board.class_a, Zone::Common).unwrap();

    let summary = session.commit_as_of(today()).unwrap();

    assert_eq!(summary.ops(), 0);
    assert!(session.pending_moves().is_empty());
    assert_eq!(
        session.current_view().as_ptr(),
        session.snapshot().as_ptr()
    );
    let rows_after = count_enrollments(&conn, board.class_a)
        + count_enrollments(&conn, board.class_b);
    assert_eq!(rows_before, rows_after);
    assert!(closed_record(&conn, board.s1, board.class_a).is_none());
}

#[test]
fn cross_class_commit_closes_origin_as_transfer_and_carries_start_date() {
    let conn = setup();
    let board = seed_board(&conn);
    let mut session = make_session(&conn);

    session.drag_start(board.s1, board.class_a, Zone::Common);
    session
        .drop_on(board.class_b, Zone::Day(Weekday::Thu))
        .unwrap();

    let summary = session.commit_as_of(today()).unwrap();
    assert_eq!(summary.zone_patches, 0);
    assert_eq!(summary.records_closed, 1);
    assert_eq!(summary.records_opened, 1);
    assert!(session.pending_moves().is_empty());

    let (end_date, transferred) = closed_record(&conn, board.s1, board.class_a).unwrap();
    assert_eq!(end_date, "2026-03-02");
    assert_eq!(transferred, 1);

    let store = SqliteEnrollmentRepository::new(&conn);
    let opened = store
        .open_enrollment(board.s1, board.class_b)
        .unwrap()
        .unwrap();
    assert_ne!(opened.uuid, board.record_s1_a);
    assert_eq!(opened.class_name, "algebra-b");
    assert_eq!(opened.zone, Zone::Day(Weekday::Thu));
    // Original open date survives the transfer.
    assert_eq!(opened.start_date, day(2026, 1, 5));
    assert!(!opened.transferred);

    // The refetched snapshot reflects committed truth, including the
    // transfer-in marker derived from the closed span.
    assert_eq!(
        session.current_view().as_ptr(),
        session.snapshot().as_ptr()
    );
    let view = session.current_view();
    assert!(!class(view, board.class_a).contains(board.s1));
    let landed = class(view, board.class_b).member(board.s1).unwrap();
    assert!(landed.transferred_in);
}

#[test]
fn chain_commit_skips_intermediate_class_entirely() {
    let conn = setup();
    let board = seed_board(&conn);
    let class_c = seed_class(&conn, "algebra-c");
    let mut session = make_session(&conn);

    session.drag_start(board.s1, board.class_a, Zone::Common);
    session.drop_on(board.class_b, Zone::Common).unwrap();
    session.drag_start(board.s1, board.class_b, Zone::Common);
    session.drop_on(class_c, Zone::Common).unwrap();

    let summary = session.commit_as_of(today()).unwrap();
    assert_eq!(summary.records_closed, 1);
    assert_eq!(summary.records_opened, 1);

    // Nothing was ever written for the intermediate class.
    assert_eq!(count_enrollments(&conn, board.class_b), 1); // s3 only
    let store = SqliteEnrollmentRepository::new(&conn);
    assert!(store.open_enrollment(board.s1, board.class_b).unwrap().is_none());
    let opened = store.open_enrollment(board.s1, class_c).unwrap().unwrap();
    assert_eq!(opened.class_name, "algebra-c");
}

#[test]
fn commit_without_prior_record_opens_fresh_with_effective_date() {
    let conn = setup();
    let board = seed_board(&conn);
    let mut session = make_session(&conn);

    session.drag_start(board.s1, board.class_a, Zone::Common);
    session.drop_on(board.class_b, Zone::Common).unwrap();

    // The origin record vanishes between snapshot and commit.
    conn.execute(
        "DELETE FROM enrollments WHERE student_uuid = ?1;",
        [board.s1.to_string()],
    )
    .unwrap();

    let summary = session.commit_as_of(today()).unwrap();
    assert_eq!(summary.records_closed, 0);
    assert_eq!(summary.records_opened, 1);

    let store = SqliteEnrollmentRepository::new(&conn);
    let opened = store
        .open_enrollment(board.s1, board.class_b)
        .unwrap()
        .unwrap();
    assert_eq!(opened.class_name, "algebra-b");
    assert_eq!(opened.start_date, today());
    assert!(opened.carry_over.is_none());
    assert!(closed_record(&conn, board.s1, board.class_a).is_none());
}

#[test]
fn zone_only_commit_patches_the_open_record_in_place() {
    let conn = setup();
    let board = seed_board(&conn);
    let mut session = make_session(&conn);

    session.drag_start(board.s1, board.class_a, Zone::Common);
    session
        .drop_on(board.class_a, Zone::Day(Weekday::Mon))
        .unwrap();

    let summary = session.commit_as_of(today()).unwrap();
    assert_eq!(summary.zone_patches, 1);
    assert_eq!(summary.records_closed, 0);
    assert_eq!(summary.records_opened, 0);

    let store = SqliteEnrollmentRepository::new(&conn);
    let patched = store
        .open_enrollment(board.s1, board.class_a)
        .unwrap()
        .unwrap();
    assert_eq!(patched.uuid, board.record_s1_a);
    assert_eq!(patched.zone, Zone::Day(Weekday::Mon));
    assert_eq!(patched.start_date, day(2026, 1, 5));
    assert_eq!(count_enrollments(&conn, board.class_a), 2);
}

#[test]
fn scheduled_date_becomes_the_effective_close_date() {
    let conn = setup();
    let board = seed_board(&conn);
    let mut session = make_session(&conn);

    session.drag_start(board.s1, board.class_a, Zone::Common);
    session.drop_on(board.class_b, Zone::Common).unwrap();
    session
        .set_scheduled_date_as_of(board.s1, Some(day(2026, 4, 1)), today())
        .unwrap();

    session.commit_as_of(today()).unwrap();

    let (end_date, transferred) = closed_record(&conn, board.s1, board.class_a).unwrap();
    assert_eq!(end_date, "2026-04-01");
    assert_eq!(transferred, 1);

    let store = SqliteEnrollmentRepository::new(&conn);
    let opened = store
        .open_enrollment(board.s1, board.class_b)
        .unwrap()
        .unwrap();
    assert_eq!(opened.start_date, day(2026, 1, 5));
}

#[test]
fn carry_over_bag_survives_the_transfer() {
    let conn = setup();
    let class_a = seed_class(&conn, "algebra-a");
    let class_b = seed_class(&conn, "algebra-b");
    let s1 = seed_student(&conn, "kim");

    let mut record = EnrollmentRecord::open(s1, class_a, "algebra-a", Zone::Common, day(2026, 1, 5));
    let mut bag = rosterboard_core::CarryOver::new();
    bag.insert("billing_code".to_string(), serde_json::json!("b-77"));
    record.carry_over = Some(bag.clone());
    SqliteEnrollmentRepository::new(&conn)
        .apply_batch(&[EnrollmentOp::Open { record }])
        .unwrap();

    let mut session = make_session(&conn);
    session.drag_start(s1, class_a, Zone::Common);
    session.drop_on(class_b, Zone::Common).unwrap();
    session.commit_as_of(today()).unwrap();

    let store = SqliteEnrollmentRepository::new(&conn);
    let opened = store.open_enrollment(s1, class_b).unwrap().unwrap();
    assert_eq!(opened.carry_over, Some(bag));
}

struct RejectingStore;

impl EnrollmentStore for RejectingStore {
    fn open_enrollment(
        &self,
        _student_uuid: StudentId,
        _class_uuid: ClassId,
    ) -> EnrollmentResult<Option<EnrollmentRecord>> {
        Ok(None)
    }

    fn apply_batch(&self, _ops: &[EnrollmentOp]) -> EnrollmentResult<()> {
        Err(EnrollmentRepoError::RecordNotOpen(Uuid::nil()))
    }
}

#[test]
fn write_failure_surfaces_once_and_leaves_state_for_retry() {
    let conn = setup();
    let board = seed_board(&conn);
    let source = SqliteRosterRepository::with_today(&conn, today());
    let mut session = BoardSession::try_new(source, RejectingStore).unwrap();

    session.drag_start(board.s1, board.class_a, Zone::Common);
    session.drop_on(board.class_b, Zone::Common).unwrap();

    let err = session.commit_as_of(today()).unwrap_err();
    assert!(matches!(err, BoardError::Store(_)));

    // Ledger and optimistic view stay exactly as they were; the caller may
    // retry the same commit or cancel.
    assert!(!session.is_saving());
    assert_eq!(session.pending_moves().len(), 1);
    let view = session.current_view();
    assert!(class(view, board.class_b).contains(board.s1));

    session.cancel();
    assert!(session.pending_moves().is_empty());
}

#[test]
fn refresh_is_ignored_while_moves_are_pending() {
    let conn = setup();
    let board = seed_board(&conn);
    let mut session = make_session(&conn);

    session.drag_start(board.s1, board.class_a, Zone::Common);
    session.drop_on(board.class_b, Zone::Common).unwrap();

    let classes_before = session.snapshot().len();
    seed_class(&conn, "algebra-z");

    assert!(!session.refresh().unwrap());
    assert_eq!(session.snapshot().len(), classes_before);

    // Once the ledger empties, the same refresh applies.
    session.cancel();
    assert!(session.refresh().unwrap());
    assert_eq!(session.snapshot().len(), classes_before + 1);
}

#[test]
fn refresh_with_identical_content_reports_no_change() {
    let conn = setup();
    seed_board(&conn);
    let mut session = make_session(&conn);

    assert!(!session.refresh().unwrap());
}
