use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::compile::{CompileOutcome, Compiler};
use crate::config::Config;
use crate::error::{Error, RequestError};
use crate::sandbox::Executor;
use crate::store::SubmissionStore;
use crate::submission::{JudgeReport, JudgeState, Submission, TestCase, TestResult};
use crate::verdict::evaluate;
use crate::workspace::{Workspace, WorkspaceManager};

/// drives one submission from source text to saved verdict
///
/// state moves strictly forward: pending, compiling, running, then exactly
/// one terminal state, and a cancelled run still releases its workspace
pub struct Judge {
    config: Arc<Config>,
    store: Arc<dyn SubmissionStore>,
    executor: Arc<dyn Executor>,
    workspaces: WorkspaceManager,
    compiler: Compiler,
}

impl Judge {
    pub fn new(
        config: Arc<Config>,
        store: Arc<dyn SubmissionStore>,
        executor: Arc<dyn Executor>,
    ) -> Self {
        let workspaces = WorkspaceManager::new(&config.runtime.temp);
        let compiler = Compiler::new(
            executor.clone(),
            config.lang.clone(),
            config.limit.compile(),
        );
        Self {
            config,
            store,
            executor,
            workspaces,
            compiler,
        }
    }

    pub async fn run(&self, id: Uuid, token: &CancellationToken) -> Result<(), Error> {
        // a store that cannot even hand out the inputs still owes the
        // submitter a terminal state
        let (submission, cases) = match self.load(id).await {
            Ok(x) => x,
            Err(Error::Internal(err)) => {
                log::error!("judge {}: store load failed: {}", id, err);
                return self.finish(id, JudgeReport::infrastructure(Vec::new())).await;
            }
            Err(err) => return Err(err),
        };
        // a verdict needs at least one executed case
        if cases.is_empty() {
            log::error!("judge {}: problem {} has no test cases", id, submission.problem);
            return self.finish(id, JudgeReport::infrastructure(Vec::new())).await;
        }
        log::info!(
            "judge {}: {} case(s), lang {}",
            id,
            cases.len(),
            submission.lang
        );

        self.transition(id, JudgeState::Compiling).await;
        let workspace = match self.workspaces.acquire(id).await {
            Ok(x) => x,
            Err(err) => {
                log::error!("no workspace for {}: {}", id, err);
                return self.finish(id, JudgeReport::infrastructure(Vec::new())).await;
            }
        };

        let report = self
            .build_and_run(&submission, &cases, &workspace, token)
            .await;
        workspace.release().await;

        match report {
            Some(report) => self.finish(id, report).await,
            None => {
                log::info!("judge {}: cancelled", id);
                self.transition(id, JudgeState::Cancelled).await;
                Ok(())
            }
        }
    }

    async fn load(&self, id: Uuid) -> Result<(Submission, Vec<TestCase>), Error> {
        let submission = self
            .store
            .load_submission(id)
            .await?
            .ok_or(RequestError::SubmissionNotFound(id))?;
        let cases = self.store.load_test_cases(submission.problem).await?;
        Ok((submission, cases))
    }

    /// `None` means the run was cancelled and nothing should be saved
    async fn build_and_run(
        &self,
        submission: &Submission,
        cases: &[TestCase],
        workspace: &Workspace,
        token: &CancellationToken,
    ) -> Option<JudgeReport> {
        if token.is_cancelled() {
            return None;
        }
        let artifact = match self
            .compiler
            .compile(workspace, &submission.source, token)
            .await
        {
            Ok(CompileOutcome::Artifact(x)) => x,
            Ok(CompileOutcome::Rejected { diagnostics }) => {
                // a kill on cancel looks like a rejection, tell them apart
                if token.is_cancelled() {
                    return None;
                }
                return Some(JudgeReport::compile_error(diagnostics));
            }
            Err(err) => {
                if token.is_cancelled() {
                    return None;
                }
                log::error!("judge {}: compile step failed: {}", submission.id, err);
                return Some(JudgeReport::infrastructure(Vec::new()));
            }
        };
        if token.is_cancelled() {
            return None;
        }

        self.transition(submission.id, JudgeState::Running).await;
        let mut results = Vec::with_capacity(cases.len());
        // every case runs even after a slip, only the judge's own failure
        // cuts the sequence short
        let mut failed = false;
        for (seq, case) in cases.iter().enumerate() {
            let limit = self.config.limit.execute(
                case.time_ms.or(submission.time_ms),
                case.memory.or(submission.memory),
            );
            let execution = match self
                .executor
                .run(
                    &artifact.args,
                    workspace.path(),
                    case.input.as_bytes(),
                    &limit,
                    token,
                )
                .await
            {
                Ok(x) => x,
                Err(err) => {
                    log::error!("judge {}: case {} did not run: {}", submission.id, seq, err);
                    failed = true;
                    break;
                }
            };
            if token.is_cancelled() {
                return None;
            }
            let verdict = evaluate(&execution, &case.output);
            log::debug!(
                "judge {}: case {} {} in {:?}",
                submission.id,
                seq,
                verdict,
                execution.wall_time
            );
            results.push(TestResult {
                verdict,
                time: execution.wall_time,
                stdout: execution.stdout,
                stderr: execution.stderr,
            });
        }
        Some(match failed {
            true => JudgeReport::infrastructure(results),
            false => JudgeReport::completed(results),
        })
    }

    async fn transition(&self, id: Uuid, state: JudgeState) {
        if let Err(err) = self.store.update_status(id, state).await {
            log::warn!("judge {}: status update failed: {}", id, err);
        }
    }

    async fn finish(&self, id: Uuid, report: JudgeReport) -> Result<(), Error> {
        log::info!("judge {}: {}", id, report.verdict);
        self.store.save_verdict(id, report).await
    }
}
