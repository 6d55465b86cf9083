//! Test doubles for the process seam.
//!
//! The execution engine only ever talks to a [`ProcessRunner`](crate::ProcessRunner),
//! so tests swap in a [`MockRunner`] with scripted exit codes and canned
//! stream content instead of spawning a real binary.

mod mock_runner;

pub use mock_runner::{MockBehavior, MockRunner};
