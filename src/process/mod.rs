//! External command execution.
//!
//! Dry-run validators and reload actions are both shell command strings run
//! through a [`CommandRunner`], so tests can substitute a recording double.

pub mod runner;

pub use runner::{CommandRunner, MockRunner, ShellRunner};
