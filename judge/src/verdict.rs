use std::fmt;

use serde::{Deserialize, Serialize};

use crate::sandbox::{Execution, TerminationCause};

/// classification of a single test case
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TestVerdict {
    Ac,
    Wa,
    Tle,
    Re,
}

impl fmt::Display for TestVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TestVerdict::Ac => "AC",
            TestVerdict::Wa => "WA",
            TestVerdict::Tle => "TLE",
            TestVerdict::Re => "RE",
        })
    }
}

/// classification of a whole submission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubmissionVerdict {
    Ac,
    Wa,
    Tle,
    Re,
    Ce,
    Ie,
}

impl fmt::Display for SubmissionVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SubmissionVerdict::Ac => "AC",
            SubmissionVerdict::Wa => "WA",
            SubmissionVerdict::Tle => "TLE",
            SubmissionVerdict::Re => "RE",
            SubmissionVerdict::Ce => "CE",
            SubmissionVerdict::Ie => "IE",
        })
    }
}

impl From<TestVerdict> for SubmissionVerdict {
    fn from(value: TestVerdict) -> Self {
        match value {
            TestVerdict::Ac => SubmissionVerdict::Ac,
            TestVerdict::Wa => SubmissionVerdict::Wa,
            TestVerdict::Tle => SubmissionVerdict::Tle,
            TestVerdict::Re => SubmissionVerdict::Re,
        }
    }
}

/// classify one execution against the expected output
///
/// comparison policy: leading and trailing ascii whitespace of the whole
/// text is insignificant, every byte in between counts. the policy is
/// deliberate, answer disputes start here
pub fn evaluate(execution: &Execution, expected: &str) -> TestVerdict {
    if execution.truncated {
        return TestVerdict::Re;
    }
    match execution.cause {
        TerminationCause::TimedOut => TestVerdict::Tle,
        TerminationCause::Signaled(_) | TerminationCause::Exited(_) => TestVerdict::Re,
        TerminationCause::Completed => {
            match execution.stdout.trim_ascii() == expected.as_bytes().trim_ascii() {
                true => TestVerdict::Ac,
                false => TestVerdict::Wa,
            }
        }
    }
}

/// `AC` if every case is, otherwise the first slip in declared order
pub fn aggregate<I: IntoIterator<Item = TestVerdict>>(results: I) -> SubmissionVerdict {
    for verdict in results {
        if verdict != TestVerdict::Ac {
            return verdict.into();
        }
    }
    SubmissionVerdict::Ac
}

#[cfg(test)]
mod test {
    use super::*;
    use std::time::Duration;

    fn execution(cause: TerminationCause, stdout: &str) -> Execution {
        Execution {
            stdout: stdout.as_bytes().to_vec(),
            stderr: Vec::new(),
            truncated: false,
            cause,
            wall_time: Duration::from_millis(10),
        }
    }

    #[test]
    fn trim_insignificant_at_the_edges() {
        let out = execution(TerminationCause::Completed, "3 ");
        assert_eq!(evaluate(&out, "3"), TestVerdict::Ac);

        let out = execution(TerminationCause::Completed, "\n3\n");
        assert_eq!(evaluate(&out, "  3"), TestVerdict::Ac);
    }

    #[test]
    fn internal_whitespace_counts() {
        let out = execution(TerminationCause::Completed, "3\n4");
        assert_eq!(evaluate(&out, "3"), TestVerdict::Wa);

        let out = execution(TerminationCause::Completed, "3 4");
        assert_eq!(evaluate(&out, "3  4"), TestVerdict::Wa);
    }

    #[test]
    fn timeout_beats_matching_output() {
        let out = execution(TerminationCause::TimedOut, "3");
        assert_eq!(evaluate(&out, "3"), TestVerdict::Tle);
    }

    #[test]
    fn crash_beats_matching_output() {
        let out = execution(TerminationCause::Signaled(11), "3");
        assert_eq!(evaluate(&out, "3"), TestVerdict::Re);

        let out = execution(TerminationCause::Exited(1), "3");
        assert_eq!(evaluate(&out, "3"), TestVerdict::Re);
    }

    #[test]
    fn truncated_output_is_a_runtime_error() {
        let mut out = execution(TerminationCause::Completed, "3");
        out.truncated = true;
        assert_eq!(evaluate(&out, "3"), TestVerdict::Re);
    }

    #[test]
    fn evaluation_is_idempotent() {
        let out = execution(TerminationCause::Completed, "answer");
        assert_eq!(evaluate(&out, "answer"), evaluate(&out, "answer"));
        assert_eq!(evaluate(&out, "other"), evaluate(&out, "other"));
    }

    #[test]
    fn aggregate_takes_the_first_slip() {
        use TestVerdict::*;
        assert_eq!(aggregate([Ac, Wa, Tle]), SubmissionVerdict::Wa);
        assert_eq!(aggregate([Ac, Tle, Wa]), SubmissionVerdict::Tle);
        assert_eq!(aggregate([Re, Ac]), SubmissionVerdict::Re);
    }

    #[test]
    fn aggregate_all_accepted() {
        use TestVerdict::*;
        assert_eq!(aggregate([Ac, Ac, Ac]), SubmissionVerdict::Ac);
        assert_eq!(aggregate([]), SubmissionVerdict::Ac);
    }
}
