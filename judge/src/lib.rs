//! Judge engine: takes a stored submission, compiles it, runs the artifact
//! against the problem's ordered test cases inside a resource-bounded
//! sandbox and persists one of `AC`/`WA`/`TLE`/`RE`/`CE`/`IE` (or
//! `cancelled`) through an injectable [`SubmissionStore`].
//!
//! [`Daemon`] is the front door: [`Daemon::enqueue`] accepts a submission
//! and returns immediately, [`Daemon::status`] polls its lifecycle,
//! [`Daemon::cancel`] and [`Daemon::shutdown`] stop runs without leaving
//! workspaces or processes behind.

pub mod compile;
pub mod config;
pub mod daemon;
pub mod error;
pub mod init;
pub mod judge;
pub mod sandbox;
pub mod store;
pub mod submission;
#[cfg(test)]
mod test;
pub mod verdict;
pub mod workspace;

pub use config::Config;
pub use daemon::Daemon;
pub use error::Error;
pub use store::{MemoryStore, SubmissionStore};
pub use submission::{JudgeReport, JudgeState, Submission, TestCase, TestResult};
pub use verdict::{SubmissionVerdict, TestVerdict};
