use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::Config;
use crate::error::{Error, RequestError};
use crate::judge::Judge;
use crate::sandbox::process::RlimitExecutor;
use crate::sandbox::Executor;
use crate::store::SubmissionStore;
use crate::submission::JudgeState;

struct RunHandle {
    token: CancellationToken,
    task: JoinHandle<()>,
}

/// accepts submissions, fans them out to at most `workers` concurrent judge
/// runs and keeps a cancel handle for each until it finishes
pub struct Daemon {
    judge: Judge,
    store: Arc<dyn SubmissionStore>,
    /// language tag this engine accepts, from config
    lang: String,
    semaphore: Arc<Semaphore>,
    running: Mutex<HashMap<Uuid, RunHandle>>,
    shutdown: CancellationToken,
}

impl Daemon {
    pub fn new(config: Config, store: Arc<dyn SubmissionStore>) -> Result<Arc<Self>, Error> {
        Self::with_executor(config, store, Arc::new(RlimitExecutor::new()))
    }

    /// same daemon over a custom process backend
    pub fn with_executor(
        config: Config,
        store: Arc<dyn SubmissionStore>,
        executor: Arc<dyn Executor>,
    ) -> Result<Arc<Self>, Error> {
        let config = Arc::new(config.check()?);
        log::info!(
            "daemon up: lang {}, {} worker(s)",
            config.lang.name,
            config.runtime.workers
        );
        Ok(Arc::new(Self {
            judge: Judge::new(config.clone(), store.clone(), executor),
            store,
            lang: config.lang.name.clone(),
            semaphore: Arc::new(Semaphore::new(config.runtime.workers)),
            running: Mutex::new(HashMap::new()),
            shutdown: CancellationToken::new(),
        }))
    }

    /// accept a stored submission for judging
    ///
    /// returns as soon as the run is queued, callers poll [`Daemon::status`]
    /// for progress
    pub async fn enqueue(self: &Arc<Self>, id: Uuid) -> Result<(), Error> {
        if self.shutdown.is_cancelled() {
            return Err(RequestError::ShuttingDown.into());
        }
        let submission = self
            .store
            .load_submission(id)
            .await?
            .ok_or(RequestError::SubmissionNotFound(id))?;
        if submission.lang != self.lang {
            return Err(RequestError::LangNotSupported(submission.lang).into());
        }

        let mut running = self.running.lock().await;
        running.retain(|_, handle| !handle.task.is_finished());
        if running.contains_key(&id) {
            return Err(RequestError::AlreadyQueued(id).into());
        }

        self.store.update_status(id, JudgeState::Pending).await?;
        let token = self.shutdown.child_token();
        let task = tokio::spawn(run_when_admitted(
            self.clone(),
            id,
            token.clone(),
        ));
        running.insert(id, RunHandle { token, task });
        log::debug!("queued {}", id);
        Ok(())
    }

    pub async fn status(&self, id: Uuid) -> Result<Option<JudgeState>, Error> {
        self.store.status(id).await
    }

    /// stop a queued or running submission, no-op once it is terminal
    pub async fn cancel(&self, id: Uuid) {
        let running = self.running.lock().await;
        if let Some(handle) = running.get(&id) {
            log::info!("cancel {}", id);
            handle.token.cancel();
        }
    }

    /// cancel everything in flight and wait for the runs to wind down
    pub async fn shutdown(&self) {
        log::info!("daemon shutting down");
        self.shutdown.cancel();
        let handles: Vec<_> = self.running.lock().await.drain().collect();
        for (id, handle) in handles {
            if let Err(err) = handle.task.await {
                log::warn!("run {} did not stop cleanly: {}", id, err);
            }
        }
    }
}

/// waits for a worker slot, then judges; a cancel while still in line skips
/// the run entirely
async fn run_when_admitted(daemon: Arc<Daemon>, id: Uuid, token: CancellationToken) {
    let _permit = tokio::select! {
        permit = daemon.semaphore.clone().acquire_owned() => match permit {
            Ok(x) => x,
            Err(_) => return,
        },
        _ = token.cancelled() => {
            log::info!("judge {}: cancelled while queued", id);
            if let Err(err) = daemon.store.update_status(id, JudgeState::Cancelled).await {
                log::warn!("judge {}: status update failed: {}", id, err);
            }
            return;
        }
    };
    if let Err(err) = daemon.judge.run(id, &token).await {
        log::error!("judge {} failed: {}", id, err);
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::store::MemoryStore;
    use crate::submission::{Submission, TestCase};
    use crate::test::script_config;

    #[tokio::test]
    async fn wrong_lang_is_rejected_up_front() {
        let dir = tempfile::tempdir().unwrap();
        let store = MemoryStore::new();
        let daemon = Daemon::new(script_config(dir.path()), Arc::new(store.clone())).unwrap();

        let submission = Submission::builder().lang("cpp").source("x").build();
        let id = submission.id;
        store.insert_submission(submission).await;

        let err = daemon.enqueue(id).await.unwrap_err();
        assert!(matches!(
            err,
            Error::BadRequest(RequestError::LangNotSupported(_))
        ));
        daemon.shutdown().await;
    }

    #[tokio::test]
    async fn unknown_submission_is_rejected_up_front() {
        let dir = tempfile::tempdir().unwrap();
        let daemon =
            Daemon::new(script_config(dir.path()), Arc::new(MemoryStore::new())).unwrap();

        let err = daemon.enqueue(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(
            err,
            Error::BadRequest(RequestError::SubmissionNotFound(_))
        ));
        daemon.shutdown().await;
    }

    #[tokio::test]
    async fn double_enqueue_is_rejected_while_in_flight() {
        let dir = tempfile::tempdir().unwrap();
        let store = MemoryStore::new();
        let daemon = Daemon::new(script_config(dir.path()), Arc::new(store.clone())).unwrap();

        let submission = Submission::builder()
            .lang("sh")
            .source("sleep 2\necho 'echo hi' > main")
            .build();
        let id = submission.id;
        let problem = submission.problem;
        store.insert_submission(submission).await;
        store
            .insert_test_cases(problem, vec![TestCase::new("", "hi")])
            .await;

        daemon.enqueue(id).await.unwrap();
        let err = daemon.enqueue(id).await.unwrap_err();
        assert!(matches!(
            err,
            Error::BadRequest(RequestError::AlreadyQueued(_))
        ));
        daemon.shutdown().await;
    }
}
