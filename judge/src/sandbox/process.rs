use std::os::unix::process::{CommandExt, ExitStatusExt};
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;

use super::output::{self, Capture};
use super::{Error, Execution, Executor, Limit, TerminationCause};

/// the only environment untrusted code gets to see
static PATH: &str = "/usr/local/bin:/usr/bin:/bin";

/// how long pipe draining may lag behind the death of the process group
const DRAIN: Duration = Duration::from_millis(100);

/// result of the one-time network isolation probe
static NET_ISOLATION: OnceLock<bool> = OnceLock::new();

/// subprocess backend fencing children in with rlimits
///
/// the child runs in its own session so the whole group can be killed at
/// once; the wall clock deadline is the primary bound and the rlimits stop
/// what a kill alone cannot, memory growth, fork storms and disk fill
#[derive(Debug, Default)]
pub struct RlimitExecutor;

impl RlimitExecutor {
    /// checks network isolation availability up front, warning once when
    /// no namespace variant works on this host
    pub fn new() -> Self {
        network_isolated();
        Self
    }
}

#[async_trait]
impl Executor for RlimitExecutor {
    async fn run(
        &self,
        args: &[String],
        dir: &Path,
        input: &[u8],
        limit: &Limit,
        token: &CancellationToken,
    ) -> Result<Execution, Error> {
        let start = Instant::now();
        let mut child = spawn(args, dir, limit)?;
        let pid = child.id();

        let mut stdin = child.stdin.take().ok_or(Error::CapturedPipe)?;
        let stdout = child.stdout.take().ok_or(Error::CapturedPipe)?;
        let stderr = child.stderr.take().ok_or(Error::CapturedPipe)?;

        // a program that exits without reading its input is fine, EPIPE here
        // is its problem, not ours
        let input = input.to_vec();
        tokio::spawn(async move {
            if let Err(err) = stdin.write_all(&input).await {
                log::trace!("stdin write cut short: {}", err);
            }
        });

        let mut stdout_task = tokio::spawn(output::capture(limit.output, stdout));
        let mut stderr_task = tokio::spawn(output::capture(limit.output, stderr));
        let mut stdout_cap: Option<Capture> = None;
        let mut stderr_cap: Option<Capture> = None;

        let deadline = start + limit.wall_time;
        let mut timed_out = false;
        let mut cancelled = false;

        let status = loop {
            tokio::select! {
                status = child.wait() => break status?,
                cap = &mut stdout_task, if stdout_cap.is_none() => {
                    let cap = cap.map_err(|_| Error::Collector)??;
                    if cap.truncated {
                        kill_group(pid);
                    }
                    stdout_cap = Some(cap);
                }
                cap = &mut stderr_task, if stderr_cap.is_none() => {
                    let cap = cap.map_err(|_| Error::Collector)??;
                    if cap.truncated {
                        kill_group(pid);
                    }
                    stderr_cap = Some(cap);
                }
                _ = time::sleep_until(deadline), if !timed_out => {
                    timed_out = true;
                    kill_group(pid);
                }
                _ = token.cancelled(), if !cancelled => {
                    cancelled = true;
                    kill_group(pid);
                }
            }
        };
        let wall_time = start.elapsed();

        // survivors of the session would keep the pipes open forever
        kill_group(pid);
        let stdout = collect(stdout_cap, stdout_task).await?;
        let stderr = collect(stderr_cap, stderr_task).await?;

        let cause = match timed_out {
            true => TerminationCause::TimedOut,
            false => classify(status),
        };
        log::trace!("{:?} stopped: {} after {:?}", args, cause, wall_time);

        Ok(Execution {
            truncated: stdout.truncated || stderr.truncated,
            stdout: stdout.bytes,
            stderr: stderr.bytes,
            cause,
            wall_time,
        })
    }
}

fn spawn(args: &[String], dir: &Path, limit: &Limit) -> Result<Child, Error> {
    // covers executors built with `default`, the probe runs at most once
    network_isolated();
    let (program, rest) = args.split_first().ok_or(Error::EmptyArgs)?;

    let mut cmd = Command::new(program);
    cmd.args(rest)
        .current_dir(dir)
        .env_clear()
        .env("PATH", PATH)
        .kill_on_drop(true)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let limit = limit.clone();
    unsafe {
        cmd.pre_exec(move || setup_child(&limit));
    }
    Ok(cmd.spawn()?)
}

/// runs between fork and exec, async signal safety applies
fn setup_child(limit: &Limit) -> std::io::Result<()> {
    // own session, so killing the group reaches every descendant
    if unsafe { libc::setsid() } < 0 {
        return Err(std::io::Error::last_os_error());
    }
    // best effort here, the first spawn already warned when no variant works
    unshare_net();

    // cpu backstop above the wall clock, for spinners that outrun the
    // deadline on several threads at once
    let secs = (limit.wall_time.as_millis() as u64).saturating_add(999) / 1000 + 1;
    set_rlimit(libc::RLIMIT_CPU, secs, secs + 1)?;
    set_rlimit(libc::RLIMIT_AS, limit.memory, limit.memory)?;
    set_rlimit(libc::RLIMIT_NPROC, limit.nproc, limit.nproc)?;
    set_rlimit(libc::RLIMIT_FSIZE, limit.fsize, limit.fsize)?;
    set_rlimit(libc::RLIMIT_CORE, 0, 0)?;
    Ok(())
}

fn set_rlimit(resource: libc::__rlimit_resource_t, soft: u64, hard: u64) -> std::io::Result<()> {
    let limit = libc::rlimit {
        rlim_cur: soft as libc::rlim_t,
        rlim_max: hard as libc::rlim_t,
    };
    match unsafe { libc::setrlimit(resource, &limit) } {
        0 => Ok(()),
        _ => Err(std::io::Error::last_os_error()),
    }
}

/// move the caller into a network namespace of its own
///
/// the user+net pair works without privileges wherever user namespaces are
/// enabled, plain net needs root; credentials stay untouched either way, so
/// file access inside the workspace is unaffected
fn unshare_net() -> bool {
    use rustix::thread::{unshare, UnshareFlags};

    unshare(UnshareFlags::NEWUSER | UnshareFlags::NEWNET).is_ok()
        || unshare(UnshareFlags::NEWNET).is_ok()
}

/// whether this host lets us take the network away from sandboxed code,
/// probed once and logged when it cannot
fn network_isolated() -> bool {
    *NET_ISOLATION.get_or_init(|| {
        let isolated = probe_network_isolation();
        if !isolated {
            log::warn!("cannot unshare the network, sandboxed code keeps host network access");
        }
        isolated
    })
}

/// unshare of a user namespace only works from a single threaded process,
/// which the sandbox child is right after fork and this daemon never is,
/// so the answer has to come from a throwaway child
fn probe_network_isolation() -> bool {
    let mut cmd = std::process::Command::new("/bin/true");
    unsafe {
        cmd.pre_exec(|| match unshare_net() {
            true => Ok(()),
            false => Err(std::io::Error::from(std::io::ErrorKind::PermissionDenied)),
        });
    }
    matches!(cmd.status(), Ok(status) if status.success())
}

/// SIGKILL the whole group, the child is its own session leader
fn kill_group(pid: Option<u32>) {
    use rustix::process::{kill_process_group, Pid, Signal};

    if let Some(pid) = pid.and_then(|x| Pid::from_raw(x as i32)) {
        if let Err(err) = kill_process_group(pid, Signal::Kill) {
            if err != rustix::io::Errno::SRCH {
                log::debug!("fail killing process group: {}", err);
            }
        }
    }
}

async fn collect(
    done: Option<Capture>,
    mut task: JoinHandle<std::io::Result<Capture>>,
) -> Result<Capture, Error> {
    if let Some(cap) = done {
        return Ok(cap);
    }
    match time::timeout(DRAIN, &mut task).await {
        Ok(cap) => Ok(cap.map_err(|_| Error::Collector)??),
        Err(_) => {
            // a stray descendant that re-created its own session can hold
            // the pipe open past the group kill, the escape counts as
            // misbehavior, not as clean empty output
            task.abort();
            log::debug!("output collector stalled, dropping the stream");
            Ok(Capture {
                bytes: Vec::new(),
                truncated: true,
            })
        }
    }
}

fn classify(status: ExitStatus) -> TerminationCause {
    if let Some(sig) = status.signal() {
        if sig == libc::SIGXCPU {
            return TerminationCause::TimedOut;
        }
        return TerminationCause::Signaled(sig);
    }
    match status.code() {
        Some(0) => TerminationCause::Completed,
        Some(code) => TerminationCause::Exited(code),
        None => TerminationCause::Signaled(libc::SIGKILL),
    }
}
