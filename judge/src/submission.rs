use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::verdict::{aggregate, SubmissionVerdict, TestVerdict};

/// one judging request, loaded from the store and owned by the orchestrator
/// for the duration of the run
#[derive(Debug, Clone)]
pub struct Submission {
    pub id: Uuid,
    /// keys the ordered test case set
    pub problem: Uuid,
    pub lang: String,
    pub source: String,
    /// submission level overrides, sit between case overrides and config
    pub time_ms: Option<u64>,
    pub memory: Option<u64>,
}

impl Submission {
    pub fn builder() -> SubmissionBuilder {
        SubmissionBuilder::new()
    }
}

pub struct SubmissionBuilder {
    inner: Submission,
}

impl SubmissionBuilder {
    pub fn new() -> Self {
        Self {
            inner: Submission {
                id: Uuid::new_v4(),
                problem: Uuid::new_v4(),
                lang: String::new(),
                source: String::new(),
                time_ms: None,
                memory: None,
            },
        }
    }
    pub fn id(mut self, id: Uuid) -> Self {
        self.inner.id = id;
        self
    }
    pub fn problem(mut self, problem: Uuid) -> Self {
        self.inner.problem = problem;
        self
    }
    pub fn lang(mut self, lang: impl Into<String>) -> Self {
        self.inner.lang = lang.into();
        self
    }
    pub fn source(mut self, source: impl Into<String>) -> Self {
        self.inner.source = source.into();
        self
    }
    pub fn time_ms(mut self, time_ms: u64) -> Self {
        self.inner.time_ms = Some(time_ms);
        self
    }
    pub fn memory(mut self, memory: u64) -> Self {
        self.inner.memory = Some(memory);
        self
    }
    pub fn build(self) -> Submission {
        self.inner
    }
}

impl Default for SubmissionBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// one test case, immutable once handed to the orchestrator
///
/// identity is the position in the problem's declared sequence, results come
/// back in the same order
#[derive(Debug, Clone)]
pub struct TestCase {
    pub input: String,
    pub output: String,
    pub time_ms: Option<u64>,
    pub memory: Option<u64>,
}

impl TestCase {
    pub fn new(input: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            output: output.into(),
            time_ms: None,
            memory: None,
        }
    }
    pub fn time_ms(mut self, time_ms: u64) -> Self {
        self.time_ms = Some(time_ms);
        self
    }
    pub fn memory(mut self, memory: u64) -> Self {
        self.memory = Some(memory);
        self
    }
}

/// observable lifecycle of a submission, transitions move strictly forward
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JudgeState {
    Pending,
    Compiling,
    Running,
    Finished(SubmissionVerdict),
    Cancelled,
}

impl JudgeState {
    pub fn terminal(&self) -> bool {
        matches!(self, JudgeState::Finished(_) | JudgeState::Cancelled)
    }
}

/// outcome of one test case
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestResult {
    pub verdict: TestVerdict,
    pub time: Duration,
    pub stdout: Vec<u8>,
    /// diagnostic only
    pub stderr: Vec<u8>,
}

/// the final word on a submission
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JudgeReport {
    pub verdict: SubmissionVerdict,
    /// one entry per executed test case, declared order
    pub results: Vec<TestResult>,
    /// slowest case wall time
    pub time: Duration,
    /// toolchain output, empty unless the verdict is `CE`
    pub diagnostics: String,
}

impl JudgeReport {
    /// aggregate a full run, `AC` or the first non `AC` in order
    pub fn completed(results: Vec<TestResult>) -> Self {
        Self {
            verdict: aggregate(results.iter().map(|x| x.verdict)),
            time: max_time(&results),
            results,
            diagnostics: String::new(),
        }
    }

    pub fn compile_error(diagnostics: String) -> Self {
        Self {
            verdict: SubmissionVerdict::Ce,
            results: Vec::new(),
            time: Duration::ZERO,
            diagnostics,
        }
    }

    /// the judge failed, collected results survive for diagnosis
    pub fn infrastructure(results: Vec<TestResult>) -> Self {
        Self {
            verdict: SubmissionVerdict::Ie,
            time: max_time(&results),
            results,
            diagnostics: String::new(),
        }
    }
}

fn max_time(results: &[TestResult]) -> Duration {
    results.iter().map(|x| x.time).max().unwrap_or_default()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn builder_fills_the_fields() {
        let problem = Uuid::new_v4();
        let submission = Submission::builder()
            .problem(problem)
            .lang("cpp")
            .source("int main() {}")
            .time_ms(2500)
            .build();
        assert_eq!(submission.problem, problem);
        assert_eq!(submission.lang, "cpp");
        assert_eq!(submission.time_ms, Some(2500));
        assert_eq!(submission.memory, None);
    }

    #[test]
    fn report_time_is_the_slowest_case() {
        let result = |verdict, ms| TestResult {
            verdict,
            time: Duration::from_millis(ms),
            stdout: Vec::new(),
            stderr: Vec::new(),
        };
        let report = JudgeReport::completed(vec![
            result(TestVerdict::Ac, 30),
            result(TestVerdict::Ac, 120),
            result(TestVerdict::Ac, 70),
        ]);
        assert_eq!(report.verdict, SubmissionVerdict::Ac);
        assert_eq!(report.time, Duration::from_millis(120));
    }

    #[test]
    fn compile_error_report_has_no_results() {
        let report = JudgeReport::compile_error("main.cpp:1: error".to_owned());
        assert_eq!(report.verdict, SubmissionVerdict::Ce);
        assert!(report.results.is_empty());
        assert!(!report.diagnostics.is_empty());
    }

    #[test]
    fn terminal_states() {
        assert!(JudgeState::Finished(SubmissionVerdict::Ac).terminal());
        assert!(JudgeState::Cancelled.terminal());
        assert!(!JudgeState::Running.terminal());
        assert!(!JudgeState::Pending.terminal());
    }
}
