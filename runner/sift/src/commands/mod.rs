//! Command handlers for the sift CLI.
//!
//! There is one command: run tests. Argument parsing lives here so the
//! binary stays a thin shell and tests can drive the same path.

mod run;

pub use run::{parse_args, run_tests, RunOptions};
