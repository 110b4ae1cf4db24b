//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate snapshot source and enrollment store into the board-level
//!   reassignment workflow.
//! - Keep UI layers decoupled from storage details.

pub mod board_session;
