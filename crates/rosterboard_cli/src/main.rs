//! CLI smoke entry point.
//!
//! # Responsibility
//! - Provide a minimal executable to verify `rosterboard_core` linkage.
//! - Keep output deterministic for quick local sanity checks.

use rosterboard_core::db::migrations::latest_version;
use rosterboard_core::db::open_db_in_memory;

fn main() {
    println!("rosterboard_core version={}", rosterboard_core::core_version());
    match open_db_in_memory() {
        Ok(_) => println!("rosterboard_core schema_version={}", latest_version()),
        Err(err) => {
            eprintln!("rosterboard_core db_bootstrap_failed error={err}");
            std::process::exit(1);
        }
    }
}
