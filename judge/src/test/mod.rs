//! end-to-end suite over a script language that needs nothing but /bin/sh
//! and coreutils, the submitted source is itself the build step and must
//! leave a `main` behind


use std::path::Path;
use std::time::Duration;

use uuid::Uuid;

use crate::config::{Config, Lang};
use crate::daemon::Daemon;
use crate::store::MemoryStore;
use crate::submission::{JudgeState, Submission, TestCase};

pub fn init_log() {
    env_logger::Builder::new()
        .filter_module("judge", log::LevelFilter::Trace)
        .is_test(true)
        .try_init()
        .ok();
}

pub fn script_lang() -> Lang {
    Lang {
        name: "sh".to_owned(),
        file: "build.sh".to_owned(),
        compile: vec!["/bin/sh".to_owned(), "build.sh".to_owned()],
        run: vec!["/bin/sh".to_owned(), "main".to_owned()],
        artifact: Some("main".to_owned()),
    }
}

pub fn script_config(temp: &Path) -> Config {
    let mut config = Config::default();
    config.runtime.temp = temp.join("work");
    config.runtime.workers = 2;
    config.limit.compile_time_ms = 5 * 1000;
    config.lang = script_lang();
    config
}

/// build script that installs `body` as the runnable `main`
pub fn program(body: &str) -> String {
    format!("cat > main <<'SH'\n{}\nSH\n", body)
}

/// store a submission plus its problem's cases, returns the submission id
pub async fn seed(store: &MemoryStore, source: String, cases: Vec<TestCase>) -> Uuid {
    let submission = Submission::builder().lang("sh").source(source).build();
    seed_submission(store, submission, cases).await
}

pub async fn seed_submission(
    store: &MemoryStore,
    submission: Submission,
    cases: Vec<TestCase>,
) -> Uuid {
    let id = submission.id;
    store.insert_test_cases(submission.problem, cases).await;
    store.insert_submission(submission).await;
    id
}

pub async fn wait_terminal(daemon: &Daemon, id: Uuid) -> JudgeState {
    wait_for(daemon, id, JudgeState::terminal).await
}

pub async fn wait_for(
    daemon: &Daemon,
    id: Uuid,
    hit: impl Fn(&JudgeState) -> bool,
) -> JudgeState {
    for _ in 0..400 {
        if let Some(state) = daemon.status(id).await.unwrap() {
            if hit(&state) {
                return state;
            }
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    panic!("submission {} never reached the awaited state", id);
}
