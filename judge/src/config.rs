use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::error::{Error, InternalError};
use crate::sandbox::Limit;

/// env var naming the config file, missing file falls back to defaults
pub static CONFIG_PATH: &str = "JUDGE_CONFIG";

fn default_log() -> u8 {
    2
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// 0..=4, trace to error
    #[serde(default = "default_log")]
    pub log_level: u8,
    #[serde(default)]
    pub runtime: Runtime,
    #[serde(default)]
    pub limit: Limits,
    #[serde(default)]
    pub lang: Lang,
}

fn default_temp() -> PathBuf {
    PathBuf::from_str(".temp").unwrap()
}

fn default_workers() -> usize {
    4
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct Runtime {
    /// root under which per-submission workspaces are created
    #[serde(default = "default_temp")]
    pub temp: PathBuf,
    /// upper bound on concurrently judged submissions
    #[serde(default = "default_workers")]
    pub workers: usize,
}

impl Default for Runtime {
    fn default() -> Self {
        Self {
            temp: default_temp(),
            workers: default_workers(),
        }
    }
}

fn default_time() -> u64 {
    1000
}

fn default_compile_time() -> u64 {
    10 * 1000
}

fn default_memory() -> u64 {
    256 * 1024 * 1024
}

fn default_output() -> u64 {
    1024 * 1024
}

fn default_nproc() -> u64 {
    512
}

fn default_fsize() -> u64 {
    64 * 1024 * 1024
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct Limits {
    /// wall clock per test case, unless the submission or case overrides it
    #[serde(default = "default_time")]
    pub time_ms: u64,
    /// wall clock for the whole build step
    #[serde(default = "default_compile_time")]
    pub compile_time_ms: u64,
    /// address space ceiling in bytes
    #[serde(default = "default_memory")]
    pub memory: u64,
    /// capture budget per output stream in bytes
    #[serde(default = "default_output")]
    pub output: u64,
    /// process count ceiling, counted per uid by the kernel
    #[serde(default = "default_nproc")]
    pub nproc: u64,
    /// largest file the sandboxed process may write
    #[serde(default = "default_fsize")]
    pub fsize: u64,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            time_ms: default_time(),
            compile_time_ms: default_compile_time(),
            memory: default_memory(),
            output: default_output(),
            nproc: default_nproc(),
            fsize: default_fsize(),
        }
    }
}

impl Limits {
    /// limit profile for running the artifact against one test case
    pub fn execute(&self, time_ms: Option<u64>, memory: Option<u64>) -> Limit {
        Limit {
            wall_time: Duration::from_millis(time_ms.unwrap_or(self.time_ms)),
            memory: memory.unwrap_or(self.memory),
            output: self.output,
            nproc: self.nproc,
            fsize: self.fsize,
        }
    }

    /// limit profile for the toolchain, roomier than the one untrusted code
    /// gets but still wall clock bounded
    pub fn compile(&self) -> Limit {
        Limit {
            wall_time: Duration::from_millis(self.compile_time_ms),
            memory: self.memory.saturating_mul(4),
            output: self.output,
            nproc: self.nproc,
            fsize: self.fsize,
        }
    }
}

fn default_lang_name() -> String {
    "cpp".to_owned()
}

fn default_lang_file() -> String {
    "main.cpp".to_owned()
}

fn default_lang_compile() -> Vec<String> {
    vec!["g++", "-O2", "-w", "-o", "main", "main.cpp"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_lang_run() -> Vec<String> {
    vec!["./main".to_owned()]
}

/// the single compiled language this engine judges
///
/// `file` is the fixed source filename inside the workspace, `compile` and
/// `run` are argument vectors executed as-is, never through a shell
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct Lang {
    #[serde(default = "default_lang_name")]
    pub name: String,
    #[serde(default = "default_lang_file")]
    pub file: String,
    #[serde(default = "default_lang_compile")]
    pub compile: Vec<String>,
    #[serde(default = "default_lang_run")]
    pub run: Vec<String>,
    /// file the toolchain must leave behind, checked after a clean exit
    #[serde(default)]
    pub artifact: Option<String>,
}

impl Default for Lang {
    fn default() -> Self {
        Self {
            name: default_lang_name(),
            file: default_lang_file(),
            compile: default_lang_compile(),
            run: default_lang_run(),
            artifact: Some("main".to_owned()),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: default_log(),
            runtime: Runtime::default(),
            limit: Limits::default(),
            lang: Lang::default(),
        }
    }
}

impl Config {
    /// load from the file named by `JUDGE_CONFIG`, defaults when unset
    pub async fn from_env() -> Result<Self, Error> {
        match std::env::var(CONFIG_PATH) {
            Ok(path) => Self::from_file(path).await,
            Err(_) => Ok(Self::default()),
        }
    }

    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, Error> {
        let buf = fs::read_to_string(path.as_ref()).await?;
        let config = toml::from_str(&buf)?;
        log::info!("load config from {:?}", path.as_ref());
        Ok(config)
    }

    /// fix what can be fixed, reject what cannot
    pub fn check(mut self) -> Result<Self, Error> {
        if self.lang.file.is_empty() {
            return Err(InternalError::Config("lang.file must name the source file").into());
        }
        if self.lang.compile.is_empty() {
            return Err(InternalError::Config("lang.compile must not be empty").into());
        }
        if self.lang.run.is_empty() {
            return Err(InternalError::Config("lang.run must not be empty").into());
        }
        if self.runtime.workers == 0 {
            log::warn!("workers is 0, judging would stall, set workers=1");
            self.runtime.workers = 1;
        }
        if self.limit.time_ms == 0 {
            log::warn!("time_ms is 0, set time_ms=1000");
            self.limit.time_ms = 1000;
        }
        if self.limit.output == 0 {
            log::warn!("output is 0, set output=1MiB");
            self.limit.output = 1024 * 1024;
        }
        Ok(self)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn default_from_empty_toml() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.log_level, 2);
        assert_eq!(config.runtime.workers, 4);
        assert_eq!(config.limit.time_ms, 1000);
        assert_eq!(config.lang.name, "cpp");
        assert_eq!(config.lang.artifact.as_deref(), Some("main"));
    }

    #[test]
    fn sections_parse() {
        let config: Config = toml::from_str(
            r#"
            log_level = 3

            [runtime]
            temp = "/tmp/judge"
            workers = 2

            [limit]
            time_ms = 500
            compile_time_ms = 5000
            memory = 1048576
            output = 4096
            nproc = 64
            fsize = 1048576

            [lang]
            name = "sh"
            file = "main.sh"
            compile = ["cp", "main.sh", "main"]
            run = ["/bin/sh", "main"]
            "#,
        )
        .unwrap();
        assert_eq!(config.runtime.workers, 2);
        assert_eq!(config.limit.output, 4096);
        assert_eq!(config.lang.run[0], "/bin/sh");
        assert_eq!(config.lang.artifact, None);
    }

    #[test]
    fn partial_section_keeps_field_defaults() {
        let config: Config = toml::from_str("[limit]\ntime_ms = 250").unwrap();
        assert_eq!(config.limit.time_ms, 250);
        assert_eq!(config.limit.output, 1024 * 1024);
    }

    #[test]
    fn unknown_field_rejected() {
        assert!(toml::from_str::<Config>("loglevel = 2").is_err());
    }

    #[tokio::test]
    async fn from_file_reads_the_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("judge.toml");
        tokio::fs::write(&path, "log_level = 4\n\n[runtime]\nworkers = 9\n")
            .await
            .unwrap();

        let config = Config::from_file(&path).await.unwrap();
        assert_eq!(config.log_level, 4);
        assert_eq!(config.runtime.workers, 9);
        assert_eq!(config.limit.memory, 256 * 1024 * 1024);
        assert!(Config::from_file(dir.path().join("nope.toml")).await.is_err());
    }

    #[test]
    fn check_rejects_empty_argv() {
        let mut config = Config::default();
        config.lang.compile.clear();
        assert!(config.check().is_err());
    }

    #[test]
    fn check_fixes_zero_workers() {
        let mut config = Config::default();
        config.runtime.workers = 0;
        let config = config.check().unwrap();
        assert_eq!(config.runtime.workers, 1);
    }

    #[test]
    fn override_beats_default() {
        let limits = Limits::default();
        let limit = limits.execute(Some(250), None);
        assert_eq!(limit.wall_time, Duration::from_millis(250));
        assert_eq!(limit.memory, limits.memory);
    }
}
