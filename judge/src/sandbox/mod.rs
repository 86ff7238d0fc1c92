pub mod output;
pub mod process;

use std::fmt;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

pub use process::RlimitExecutor;

#[derive(Error, Debug)]
pub enum Error {
    #[error("io: `{0}`")]
    IO(#[from] std::io::Error),
    #[error("empty argument vector")]
    EmptyArgs,
    #[error("the pipe has been captured")]
    CapturedPipe,
    #[error("output collector aborted")]
    Collector,
}

/// resource profile for one sandboxed run
#[derive(Debug, Clone)]
pub struct Limit {
    /// primary time bound, the process group dies when it expires
    pub wall_time: Duration,
    /// address space ceiling in bytes
    pub memory: u64,
    /// capture budget per output stream in bytes
    pub output: u64,
    pub nproc: u64,
    pub fsize: u64,
}

/// why a sandboxed process stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationCause {
    /// exited with status 0, the only cause whose output is worth comparing
    Completed,
    /// killed at the wall clock deadline, or stopped by the cpu backstop
    TimedOut,
    /// killed by a signal, resource violations land here too
    Signaled(i32),
    /// exited on its own with a nonzero status
    Exited(i32),
}

impl TerminationCause {
    pub fn completed(&self) -> bool {
        matches!(self, TerminationCause::Completed)
    }
}

impl fmt::Display for TerminationCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TerminationCause::Completed => write!(f, "completed"),
            TerminationCause::TimedOut => write!(f, "timed out"),
            TerminationCause::Signaled(sig) => write!(f, "killed by signal {}", sig),
            TerminationCause::Exited(code) => write!(f, "exited with status {}", code),
        }
    }
}

/// everything captured from one sandboxed run
#[derive(Debug, Clone)]
pub struct Execution {
    pub stdout: Vec<u8>,
    /// diagnostic only, never part of answer comparison
    pub stderr: Vec<u8>,
    /// either stream ran past its capture budget
    pub truncated: bool,
    pub cause: TerminationCause,
    pub wall_time: Duration,
}

/// the substitution seam for isolation backends
///
/// one opaque operation: run this argv under these limits with this input.
/// the shipped backend is [`RlimitExecutor`], container or vm backends slot
/// in here without touching the rest of the pipeline
#[async_trait]
pub trait Executor: Send + Sync + 'static {
    async fn run(
        &self,
        args: &[String],
        dir: &Path,
        input: &[u8],
        limit: &Limit,
        token: &CancellationToken,
    ) -> Result<Execution, Error>;
}
