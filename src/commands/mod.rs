//! CLI command handlers, organized by functional area.
//!
//! - `monitor`: summary, IP detail, audit log
//! - `actions`: one-shot block, release, note
//! - `system`: server settings
//! - `watch`: the interactive live session
//! - `logic`: pure parsing and validation (unit-testable)

pub mod actions;
pub mod logic;
pub mod monitor;
pub mod system;
pub mod watch;

pub use logic::{parse_operator_command, OperatorCommand};
