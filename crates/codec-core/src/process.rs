use serde::{Deserialize, Serialize};
use std::ffi::OsStr;
use std::io::Read;
#[cfg(unix)]
use std::os::unix::process::CommandExt;
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

pub const COMMAND_NOT_FOUND: &str = "Command not found";
pub const TIMEOUT_EXIT_CODE: i32 = 124;
pub const CANCELLED_EXIT_CODE: i32 = 130;

const POLL_INTERVAL: Duration = Duration::from_millis(10);
// Output still buffered after a forced kill is collected for at most this long.
const DRAIN_GRACE: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ProcessOptions {
    pub timeout: Option<Duration>,
    pub cancel: Option<CancelToken>,
    pub current_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessStatus {
    Exited,
    Signaled,
    NotFound,
    TimedOut,
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct ProcessOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub status: ProcessStatus,
    pub elapsed: Duration,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    fn not_found(elapsed: Duration) -> Self {
        Self {
            exit_code: 1,
            stdout: String::new(),
            stderr: COMMAND_NOT_FOUND.to_string(),
            status: ProcessStatus::NotFound,
            elapsed,
        }
    }
}

pub fn run_command<S: AsRef<OsStr>>(
    program: &str,
    args: &[S],
    options: &ProcessOptions,
) -> ProcessOutput {
    let start = Instant::now();
    let mut cmd = Command::new(program);
    cmd.args(args);
    if let Some(dir) = &options.current_dir {
        cmd.current_dir(dir);
    }
    cmd.stdin(Stdio::null());
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());
    #[cfg(unix)]
    cmd.process_group(0);

    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(err) => {
            debug!(program, error = %err, "failed to launch command");
            return ProcessOutput::not_found(start.elapsed());
        }
    };
    debug!(program, pid = child.id(), "spawned command");

    let stdout_rx = drain(child.stdout.take());
    let stderr_rx = drain(child.stderr.take());

    let (exit_code, status) = wait_child(&mut child, start, options);

    let grace = matches!(status, ProcessStatus::TimedOut | ProcessStatus::Cancelled)
        .then_some(DRAIN_GRACE);
    let stdout = collect_drain(stdout_rx, grace);
    let mut stderr = collect_drain(stderr_rx, grace);
    match status {
        ProcessStatus::TimedOut => {
            let secs = options.timeout.map(|t| t.as_secs_f64()).unwrap_or_default();
            warn!(program, timeout_seconds = secs, "command exceeded timeout and was killed");
            push_line(
                &mut stderr,
                &format!("[harness-timeout] command '{}' exceeded {:.3}s and was terminated", program, secs),
            );
        }
        ProcessStatus::Cancelled => {
            push_line(
                &mut stderr,
                &format!("[harness-cancelled] command '{}' was interrupted", program),
            );
        }
        _ => {}
    }

    ProcessOutput {
        exit_code,
        stdout,
        stderr,
        status,
        elapsed: start.elapsed(),
    }
}

fn wait_child(child: &mut Child, start: Instant, options: &ProcessOptions) -> (i32, ProcessStatus) {
    if options.timeout.is_none() && options.cancel.is_none() {
        return match child.wait() {
            Ok(status) => exit_status(status),
            Err(err) => {
                warn!(error = %err, "failed waiting for child");
                (-1, ProcessStatus::Signaled)
            }
        };
    }

    let deadline = options.timeout.map(|t| start + t);
    loop {
        match child.try_wait() {
            Ok(Some(status)) => return exit_status(status),
            Ok(None) => {}
            Err(err) => {
                warn!(error = %err, "failed polling child");
                kill_and_reap(child);
                return (-1, ProcessStatus::Signaled);
            }
        }
        if options.cancel.as_ref().is_some_and(|c| c.is_cancelled()) {
            kill_and_reap(child);
            return (CANCELLED_EXIT_CODE, ProcessStatus::Cancelled);
        }
        if deadline.is_some_and(|d| Instant::now() >= d) {
            kill_and_reap(child);
            return (TIMEOUT_EXIT_CODE, ProcessStatus::TimedOut);
        }
        thread::sleep(POLL_INTERVAL);
    }
}

fn exit_status(status: std::process::ExitStatus) -> (i32, ProcessStatus) {
    match status.code() {
        Some(code) => (code, ProcessStatus::Exited),
        None => (-1, ProcessStatus::Signaled),
    }
}

// The child leads its own process group, so helpers it forked die with it.
fn kill_and_reap(child: &mut Child) {
    #[cfg(unix)]
    kill_process_group(child.id());
    let _ = child.kill();
    let _ = child.wait();
}

#[cfg(unix)]
fn kill_process_group(pid: u32) {
    let ret = unsafe { libc::kill(-(pid as libc::pid_t), libc::SIGKILL) };
    if ret != 0 {
        debug!(pid, error = %std::io::Error::last_os_error(), "process group kill failed");
    }
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Option<Receiver<Vec<u8>>> {
    pipe.map(|mut reader| {
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = reader.read_to_end(&mut buf);
            let _ = tx.send(buf);
        });
        rx
    })
}

// With a grace period, a pipe still held open by an escaped descendant is
// abandoned instead of blocking the caller.
fn collect_drain(rx: Option<Receiver<Vec<u8>>>, grace: Option<Duration>) -> String {
    let bytes = rx.and_then(|rx| match grace {
        Some(limit) => rx.recv_timeout(limit).ok(),
        None => rx.recv().ok(),
    });
    bytes
        .map(|b| String::from_utf8_lossy(&b).into_owned())
        .unwrap_or_default()
}

fn push_line(buf: &mut String, line: &str) {
    if !buf.is_empty() && !buf.ends_with('\n') {
        buf.push('\n');
    }
    buf.push_str(line);
}
