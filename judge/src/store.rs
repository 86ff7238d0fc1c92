use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::{Error, InternalError};
use crate::submission::{JudgeReport, JudgeState, Submission, TestCase};

/// persistence seam for the judge
///
/// the daemon takes any implementation by handle, nothing in the pipeline
/// reaches for shared state behind its back
#[async_trait]
pub trait SubmissionStore: Send + Sync + 'static {
    async fn load_submission(&self, id: Uuid) -> Result<Option<Submission>, Error>;
    /// cases in the problem's declared order
    async fn load_test_cases(&self, problem: Uuid) -> Result<Vec<TestCase>, Error>;
    async fn update_status(&self, id: Uuid, state: JudgeState) -> Result<(), Error>;
    /// persist the final report and mark the submission finished
    async fn save_verdict(&self, id: Uuid, report: JudgeReport) -> Result<(), Error>;
    async fn status(&self, id: Uuid) -> Result<Option<JudgeState>, Error>;
}

#[derive(Default)]
struct Inner {
    submissions: HashMap<Uuid, Submission>,
    test_cases: HashMap<Uuid, Vec<TestCase>>,
    status: HashMap<Uuid, JudgeState>,
    reports: HashMap<Uuid, JudgeReport>,
}

/// in memory store, the default for tests and single process deployments
#[derive(Default, Clone)]
pub struct MemoryStore(Arc<Mutex<Inner>>);

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
    pub async fn insert_submission(&self, submission: Submission) {
        let mut inner = self.0.lock().await;
        inner.status.insert(submission.id, JudgeState::Pending);
        inner.submissions.insert(submission.id, submission);
    }
    pub async fn insert_test_cases(&self, problem: Uuid, cases: Vec<TestCase>) {
        self.0.lock().await.test_cases.insert(problem, cases);
    }
    pub async fn report(&self, id: Uuid) -> Option<JudgeReport> {
        self.0.lock().await.reports.get(&id).cloned()
    }
}

#[async_trait]
impl SubmissionStore for MemoryStore {
    async fn load_submission(&self, id: Uuid) -> Result<Option<Submission>, Error> {
        Ok(self.0.lock().await.submissions.get(&id).cloned())
    }
    async fn load_test_cases(&self, problem: Uuid) -> Result<Vec<TestCase>, Error> {
        self.0
            .lock()
            .await
            .test_cases
            .get(&problem)
            .cloned()
            .ok_or_else(|| {
                InternalError::Store(format!("no test cases for problem {}", problem)).into()
            })
    }
    async fn update_status(&self, id: Uuid, state: JudgeState) -> Result<(), Error> {
        self.0.lock().await.status.insert(id, state);
        Ok(())
    }
    async fn save_verdict(&self, id: Uuid, report: JudgeReport) -> Result<(), Error> {
        let mut inner = self.0.lock().await;
        inner.status.insert(id, JudgeState::Finished(report.verdict));
        inner.reports.insert(id, report);
        Ok(())
    }
    async fn status(&self, id: Uuid) -> Result<Option<JudgeState>, Error> {
        Ok(self.0.lock().await.status.get(&id).copied())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::verdict::SubmissionVerdict;

    #[tokio::test]
    async fn round_trips_a_submission() {
        let store = MemoryStore::new();
        let submission = Submission::builder().lang("cpp").source("x").build();
        let id = submission.id;
        store.insert_submission(submission).await;

        let loaded = store.load_submission(id).await.unwrap().unwrap();
        assert_eq!(loaded.lang, "cpp");
        assert_eq!(store.status(id).await.unwrap(), Some(JudgeState::Pending));
        assert!(store.load_submission(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn missing_test_cases_are_an_error() {
        let store = MemoryStore::new();
        assert!(store.load_test_cases(Uuid::new_v4()).await.is_err());
    }

    #[tokio::test]
    async fn save_verdict_finishes_the_submission() {
        let store = MemoryStore::new();
        let submission = Submission::builder().build();
        let id = submission.id;
        store.insert_submission(submission).await;
        store
            .save_verdict(id, JudgeReport::completed(Vec::new()))
            .await
            .unwrap();

        assert_eq!(
            store.status(id).await.unwrap(),
            Some(JudgeState::Finished(SubmissionVerdict::Ac))
        );
        assert!(store.report(id).await.is_some());
    }
}
