use std::sync::Arc;

use tokio::fs;
use tokio_util::sync::CancellationToken;

use crate::config::Lang;
use crate::error::{Error, InternalError};
use crate::sandbox::{Executor, Limit, TerminationCause};
use crate::workspace::Workspace;

/// ready-to-run build output, carries the argv that executes it
#[derive(Debug, Clone)]
pub struct CompiledArtifact {
    pub args: Vec<String>,
}

pub enum CompileOutcome {
    Artifact(CompiledArtifact),
    /// the toolchain refused the source, maps to `CE`
    Rejected { diagnostics: String },
}

/// turns source text into a runnable artifact inside a workspace
///
/// the toolchain runs through the same bounded process runner as untrusted
/// code, only with the roomier compile limit profile
pub struct Compiler {
    executor: Arc<dyn Executor>,
    lang: Lang,
    limit: Limit,
}

impl Compiler {
    pub fn new(executor: Arc<dyn Executor>, lang: Lang, limit: Limit) -> Self {
        Self {
            executor,
            lang,
            limit,
        }
    }

    pub async fn compile(
        &self,
        workspace: &Workspace,
        source: &str,
        token: &CancellationToken,
    ) -> Result<CompileOutcome, Error> {
        workspace.write(&self.lang.file, source.as_bytes()).await?;
        log::debug!("compile {} in {:?}", self.lang.file, workspace.path());

        let execution = self
            .executor
            .run(&self.lang.compile, workspace.path(), b"", &self.limit, token)
            .await
            .map_err(InternalError::from)?;

        if !execution.cause.completed() {
            let mut diagnostics = diagnostics_of(&execution.stderr, &execution.stdout);
            if matches!(execution.cause, TerminationCause::TimedOut) {
                if !diagnostics.is_empty() {
                    diagnostics.push('\n');
                }
                diagnostics.push_str("compilation timed out");
            } else if diagnostics.is_empty() {
                diagnostics = format!("compiler {}", execution.cause);
            }
            log::debug!("compiler rejected the source: {}", execution.cause);
            return Ok(CompileOutcome::Rejected { diagnostics });
        }

        if let Some(name) = &self.lang.artifact {
            let path = workspace.file(name);
            if fs::metadata(&path).await.is_err() {
                log::warn!("toolchain exited 0 but left no {:?}", path);
                return Err(InternalError::MissingArtifact.into());
            }
        }
        Ok(CompileOutcome::Artifact(CompiledArtifact {
            args: self.lang.run.clone(),
        }))
    }
}

fn diagnostics_of(stderr: &[u8], stdout: &[u8]) -> String {
    let mut buf = String::from_utf8_lossy(stderr).into_owned();
    if !stdout.is_empty() {
        if !buf.is_empty() {
            buf.push('\n');
        }
        buf.push_str(&String::from_utf8_lossy(stdout));
    }
    buf
}
