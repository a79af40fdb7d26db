//! Ownership of one external attack process
//!
//! A `ProcessHandle` owns the child process, a scratch directory, the two
//! files its stdout/stderr are redirected into, and independent read
//! cursors on those same files. The cursors are separate open handles, so
//! appended output becomes visible to the supervisor while the tool still
//! holds the write side open.

use std::fs::File;
use std::io;
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use tempfile::TempDir;
use tracing::{debug, warn};

use wepraid_core::{Error, Result};

use crate::tail::OutputLog;

const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// One running (or already exited) external process with its output files.
#[derive(Debug)]
pub struct ProcessHandle {
    tool: &'static str,
    child: Child,
    pid: u32,
    stdout: Option<OutputLog>,
    stderr: Option<OutputLog>,
    scratch: Option<TempDir>,
    exit_code: Option<i32>,
}

impl ProcessHandle {
    /// Spawn `argv` with stdout and stderr redirected to fresh temporary
    /// files, and open read cursors on both immediately.
    ///
    /// The process runs in `workdir` when given, otherwise in the handle's
    /// own scratch directory (useful for tools that drop output files into
    /// their working directory).
    pub fn start(tool: &'static str, argv: &[String], workdir: Option<&Path>) -> Result<Self> {
        let (program, args) = argv.split_first().ok_or_else(|| {
            Error::invalid_parameter("argv", "command line must not be empty".to_string())
        })?;

        let scratch = tempfile::Builder::new()
            .prefix(&format!("{tool}-"))
            .tempdir()?;
        let stdout_path = scratch.path().join("stdout.log");
        let stderr_path = scratch.path().join("stderr.log");
        let stdout_file = File::create(&stdout_path)?;
        let stderr_file = File::create(&stderr_path)?;

        let child = Command::new(program)
            .args(args)
            .current_dir(workdir.unwrap_or_else(|| scratch.path()))
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout_file))
            .stderr(Stdio::from(stderr_file))
            .spawn()
            .map_err(|source| Error::Spawn {
                command: argv.join(" "),
                source,
            })?;

        let pid = child.id();
        debug!(
            tool,
            pid,
            stdout = %stdout_path.display(),
            stderr = %stderr_path.display(),
            "process started"
        );

        Ok(Self {
            tool,
            child,
            pid,
            stdout: Some(OutputLog::open(&stdout_path)?),
            stderr: Some(OutputLog::open(&stderr_path)?),
            scratch: Some(scratch),
            exit_code: None,
        })
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Scratch directory of this process; also its working directory unless
    /// an explicit one was given at start. Gone after `release`.
    pub fn work_dir(&self) -> Option<&Path> {
        self.scratch.as_ref().map(TempDir::path)
    }

    /// Non-blocking exit check: `None` while the process is still running.
    pub fn poll_exit_code(&mut self) -> Option<i32> {
        if self.exit_code.is_some() {
            return self.exit_code;
        }
        match self.child.try_wait() {
            Ok(Some(status)) => {
                self.exit_code = Some(status_code(status));
                self.exit_code
            }
            Ok(None) => None,
            Err(e) => {
                warn!(tool = self.tool, pid = self.pid, error = %e, "exit poll failed");
                None
            }
        }
    }

    /// Complete lines appended to stdout since the last call; never blocks.
    pub fn read_new_stdout_lines(&mut self) -> io::Result<Vec<String>> {
        match &mut self.stdout {
            Some(log) => log.drain_lines(),
            None => Ok(Vec::new()),
        }
    }

    /// Complete lines appended to stderr since the last call; never blocks.
    pub fn read_new_stderr_lines(&mut self) -> io::Result<Vec<String>> {
        match &mut self.stderr {
            Some(log) => log.drain_lines(),
            None => Ok(Vec::new()),
        }
    }

    /// Stop the process: SIGTERM first, then SIGKILL once the grace period
    /// elapses. Returns the exit code once observed.
    pub fn terminate(&mut self, grace: Duration) -> Option<i32> {
        if let Some(code) = self.poll_exit_code() {
            return Some(code);
        }

        if let Err(e) = kill(Pid::from_raw(self.pid as i32), Signal::SIGTERM) {
            debug!(tool = self.tool, pid = self.pid, error = %e, "SIGTERM failed");
        }
        let deadline = Instant::now() + grace;
        while Instant::now() < deadline {
            if let Some(code) = self.poll_exit_code() {
                debug!(tool = self.tool, pid = self.pid, code, "process terminated");
                return Some(code);
            }
            thread::sleep(EXIT_POLL_INTERVAL);
        }

        // grace period over, escalate
        if let Err(e) = self.child.kill() {
            warn!(tool = self.tool, pid = self.pid, error = %e, "SIGKILL failed");
        }
        match self.child.wait() {
            Ok(status) => {
                let code = status_code(status);
                self.exit_code = Some(code);
                debug!(tool = self.tool, pid = self.pid, code, "process killed");
                Some(code)
            }
            Err(e) => {
                warn!(tool = self.tool, pid = self.pid, error = %e, "wait after kill failed");
                self.exit_code
            }
        }
    }

    /// Close the read cursors and remove the temporary files. Safe to call
    /// repeatedly and after `terminate`.
    pub fn release(&mut self) {
        self.stdout = None;
        self.stderr = None;
        if self.scratch.take().is_some() {
            debug!(tool = self.tool, pid = self.pid, "process resources released");
        }
    }
}

impl Drop for ProcessHandle {
    fn drop(&mut self) {
        // no zombies, no leaked temp files, even on abnormal exit paths
        if self.exit_code.is_none() {
            self.terminate(Duration::from_secs(1));
        }
        self.release();
    }
}

fn status_code(status: std::process::ExitStatus) -> i32 {
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        status.code().or_else(|| status.signal().map(|s| -s)).unwrap_or(-1)
    }
    #[cfg(not(unix))]
    {
        status.code().unwrap_or(-1)
    }
}
