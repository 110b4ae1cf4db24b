//! Domain model for roster boards and membership history.
//!
//! # Responsibility
//! - Define the canonical read model a board renders (classes, members, zones).
//! - Define pending-move ledger entries and their compression into net moves.
//! - Define the durable enrollment record and its lifecycle invariants.
//!
//! # Invariants
//! - Every domain object is identified by a stable UUID.
//! - A member holds exactly one zone per class membership at any time.
//! - Leaving a class closes its enrollment record; history is never deleted.

pub mod class;
pub mod enrollment;
pub mod moves;
pub mod student;
