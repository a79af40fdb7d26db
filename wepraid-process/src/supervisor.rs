//! Generic supervised external process
//!
//! All four attack tools share one lifecycle: spawn, repeatedly drain and
//! classify new output, poll for exit, stop, clean. `SupervisedProcess`
//! implements that lifecycle once, parameterized over a `ToolSpec` that
//! contributes the tool's state enum, flag names and pure line classifier.
//! Each `update` returns an immutable `UpdateReport` snapshot, so state
//! transitions stay testable as functions from (previous state, new lines)
//! to (new state, effects).

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::time::Duration;

use tracing::{debug, warn};

use wepraid_core::{Error, Result};

use crate::handle::ProcessHandle;

/// Which output stream a line came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    Stdout,
    Stderr,
}

impl fmt::Display for Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stream::Stdout => write!(f, "stdout"),
            Stream::Stderr => write!(f, "stderr"),
        }
    }
}

/// Effects a single classified line requests on the supervised state.
#[derive(Debug, Clone, PartialEq)]
pub struct LineEffects<S, E> {
    /// New lifecycle state, if the line signals a transition
    pub state: Option<S>,
    /// Flags to set
    pub flags: Vec<&'static str>,
    /// Statistics updates, latest observed value wins
    pub stats: Vec<(&'static str, u64)>,
    /// Side effects for the per-tool wrapper to execute
    pub effects: Vec<E>,
    /// A data inconsistency worth reporting, without stopping the attack
    pub warning: Option<String>,
}

impl<S, E> Default for LineEffects<S, E> {
    fn default() -> Self {
        Self {
            state: None,
            flags: Vec::new(),
            stats: Vec::new(),
            effects: Vec::new(),
            warning: None,
        }
    }
}

impl<S, E> LineEffects<S, E> {
    /// No effect; the line is ignored
    pub fn none() -> Self {
        Self::default()
    }

    pub fn state(state: S) -> Self {
        Self {
            state: Some(state),
            ..Self::default()
        }
    }

    pub fn flag(flag: &'static str) -> Self {
        Self {
            flags: vec![flag],
            ..Self::default()
        }
    }

    pub fn with_stat(mut self, key: &'static str, value: u64) -> Self {
        self.stats.push((key, value));
        self
    }

    pub fn with_effect(mut self, effect: E) -> Self {
        self.effects.push(effect);
        self
    }

    pub fn with_warning(mut self, warning: impl Into<String>) -> Self {
        self.warning = Some(warning.into());
        self
    }
}

/// Per-tool behavior plugged into `SupervisedProcess`
pub trait ToolSpec {
    /// Lifecycle states of this tool; the terminated state is absorbing
    type State: fmt::Debug + Copy + PartialEq + Eq + Send;
    /// Side effects this tool's classifier can request
    type Effect: fmt::Debug + Send;

    /// Short tool name for logging
    fn tool(&self) -> &'static str;

    fn initial_state(&self) -> Self::State;

    /// State to assume right after a successful spawn, for tools that are
    /// considered active from the first instant (no recognizable banner)
    fn started_state(&self) -> Option<Self::State> {
        None
    }

    fn terminated_state(&self) -> Self::State;

    /// The stream carrying protocol output. Non-empty lines on the other
    /// stream are anomalies: reported, never fatal.
    fn protocol_stream(&self) -> Stream {
        Stream::Stdout
    }

    /// Flags this tool can raise, reset to false on every start
    fn flag_names(&self) -> &'static [&'static str] {
        &[]
    }

    /// Pure classification of one protocol-stream line
    fn classify(&self, line: &str) -> LineEffects<Self::State, Self::Effect>;
}

/// Mapping from flag name to boolean, all-false after every start
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlagSet {
    values: BTreeMap<&'static str, bool>,
}

impl FlagSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reinitialize to exactly `names`, all false
    pub fn reset(&mut self, names: &[&'static str]) {
        self.values = names.iter().map(|&n| (n, false)).collect();
    }

    pub fn set(&mut self, name: &'static str) {
        self.values.insert(name, true);
    }

    pub fn clear(&mut self, name: &'static str) {
        if let Some(v) = self.values.get_mut(name) {
            *v = false;
        }
    }

    pub fn clear_all(&mut self) {
        self.values.clear();
    }

    pub fn is_set(&self, name: &str) -> bool {
        self.values.get(name).copied().unwrap_or(false)
    }
}

/// Latest observed value per counter name
pub type Stats = BTreeMap<&'static str, u64>;

/// Unexpected output on a stream that should have stayed silent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Anomaly {
    pub stream: Stream,
    pub line: String,
}

impl Anomaly {
    /// The typed, reportable form of this anomaly
    pub fn as_error(&self, tool: &'static str) -> Error {
        Error::UnexpectedOutput {
            tool,
            stream: match self.stream {
                Stream::Stdout => "stdout",
                Stream::Stderr => "stderr",
            },
            line: self.line.clone(),
        }
    }
}

/// Immutable snapshot returned by each `update` call
#[derive(Debug, Clone)]
pub struct UpdateReport<S, E> {
    pub state: S,
    pub flags: FlagSet,
    pub stats: Stats,
    pub effects: Vec<E>,
    pub anomalies: Vec<Anomaly>,
    /// Set once the underlying process has exited
    pub exit_code: Option<i32>,
}

/// One supervised external process: lifecycle, typed state, flags, stats.
pub struct SupervisedProcess<T: ToolSpec> {
    spec: T,
    grace: Duration,
    handle: Option<ProcessHandle>,
    state: T::State,
    flags: FlagSet,
    stats: Stats,
}

impl<T: ToolSpec> SupervisedProcess<T> {
    pub fn new(spec: T, grace: Duration) -> Self {
        let state = spec.initial_state();
        Self {
            spec,
            grace,
            handle: None,
            state,
            flags: FlagSet::new(),
            stats: Stats::new(),
        }
    }

    pub fn spec(&self) -> &T {
        &self.spec
    }

    pub fn spec_mut(&mut self) -> &mut T {
        &mut self.spec
    }

    /// Spawn the tool. Starting while a handle is still owned (running or
    /// not yet cleaned) is a usage error; `clean` first.
    pub fn start(&mut self, argv: &[String]) -> Result<()> {
        if self.handle.is_some() {
            return Err(Error::AlreadyRunning(self.spec.tool()));
        }
        self.state = self.spec.initial_state();
        self.flags.reset(self.spec.flag_names());
        self.stats.clear();

        let handle = ProcessHandle::start(self.spec.tool(), argv, None)?;
        self.handle = Some(handle);
        if let Some(state) = self.spec.started_state() {
            self.state = state;
        }
        Ok(())
    }

    /// Drain new output through the classifier, then poll for exit.
    ///
    /// All available lines are classified in file order before the exit
    /// check; if the exit check fires, the streams are drained once more so
    /// a final burst written just before exit is never lost.
    pub fn update(&mut self) -> Result<UpdateReport<T::State, T::Effect>> {
        let mut effects = Vec::new();
        let mut anomalies = Vec::new();

        if self.handle.is_none() {
            return Ok(self.report(effects, anomalies, None));
        }

        let (stdout, stderr) = self.drain()?;
        self.apply(stdout, stderr, &mut effects, &mut anomalies);

        let exit_code = match self.handle.as_mut() {
            Some(handle) => handle.poll_exit_code(),
            None => None,
        };
        if let Some(code) = exit_code {
            let (stdout, stderr) = self.drain()?;
            self.apply(stdout, stderr, &mut effects, &mut anomalies);
            if self.state != self.spec.terminated_state() {
                debug!(tool = self.spec.tool(), code, "process exited");
            }
            self.state = self.spec.terminated_state();
        }

        Ok(self.report(effects, anomalies, exit_code))
    }

    /// Request termination (graceful, then forced). Returns the exit code,
    /// or `None` if the tool was never started.
    pub fn stop(&mut self) -> Option<i32> {
        let handle = self.handle.as_mut()?;
        let code = handle.terminate(self.grace);
        self.state = self.spec.terminated_state();
        code
    }

    /// Stop if still running, release all resources and reset in-memory
    /// state, flags and stats. Idempotent; callable when never started.
    pub fn clean(&mut self) {
        if let Some(mut handle) = self.handle.take() {
            handle.terminate(self.grace);
            handle.release();
            debug!(tool = self.spec.tool(), "cleaned");
        }
        self.state = self.spec.initial_state();
        self.flags.clear_all();
        self.stats.clear();
    }

    pub fn state(&self) -> T::State {
        self.state
    }

    pub fn flags(&self) -> &FlagSet {
        &self.flags
    }

    pub fn clear_flag(&mut self, name: &'static str) {
        self.flags.clear(name);
    }

    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    /// A handle is owned from `start` until `clean`
    pub fn is_live(&self) -> bool {
        self.handle.is_some()
    }

    /// Scratch/working directory of the current handle
    pub fn work_dir(&self) -> Option<&Path> {
        self.handle.as_ref().and_then(ProcessHandle::work_dir)
    }

    fn drain(&mut self) -> Result<(Vec<String>, Vec<String>)> {
        match self.handle.as_mut() {
            Some(handle) => Ok((
                handle.read_new_stdout_lines()?,
                handle.read_new_stderr_lines()?,
            )),
            None => Ok((Vec::new(), Vec::new())),
        }
    }

    fn apply(
        &mut self,
        stdout: Vec<String>,
        stderr: Vec<String>,
        effects: &mut Vec<T::Effect>,
        anomalies: &mut Vec<Anomaly>,
    ) {
        let (protocol, silent, silent_stream) = match self.spec.protocol_stream() {
            Stream::Stdout => (stdout, stderr, Stream::Stderr),
            Stream::Stderr => (stderr, stdout, Stream::Stdout),
        };

        for line in &protocol {
            let fx = self.spec.classify(line);
            if let Some(state) = fx.state {
                if state != self.state {
                    debug!(tool = self.spec.tool(), state = ?state, "state change");
                }
                self.state = state;
            }
            for flag in fx.flags {
                debug!(tool = self.spec.tool(), flag, "flag set");
                self.flags.set(flag);
            }
            for (key, value) in fx.stats {
                self.stats.insert(key, value);
            }
            if let Some(warning) = fx.warning {
                warn!(tool = self.spec.tool(), line = %line, "{warning}");
            }
            effects.extend(fx.effects);
        }

        for line in silent {
            if line.trim().is_empty() {
                continue;
            }
            let anomaly = Anomaly {
                stream: silent_stream,
                line,
            };
            warn!("{}", anomaly.as_error(self.spec.tool()));
            anomalies.push(anomaly);
        }
    }

    fn report(
        &self,
        effects: Vec<T::Effect>,
        anomalies: Vec<Anomaly>,
        exit_code: Option<i32>,
    ) -> UpdateReport<T::State, T::Effect> {
        UpdateReport {
            state: self.state,
            flags: self.flags.clone(),
            stats: self.stats.clone(),
            effects,
            anomalies,
            exit_code,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Instant;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum TestState {
        New,
        Ok,
        Terminated,
    }

    #[derive(Debug, PartialEq, Eq)]
    enum TestEffect {
        Remember(String),
    }

    struct TestSpec;

    impl ToolSpec for TestSpec {
        type State = TestState;
        type Effect = TestEffect;

        fn tool(&self) -> &'static str {
            "test-tool"
        }

        fn initial_state(&self) -> TestState {
            TestState::New
        }

        fn terminated_state(&self) -> TestState {
            TestState::Terminated
        }

        fn flag_names(&self) -> &'static [&'static str] {
            &["seen"]
        }

        fn classify(&self, line: &str) -> LineEffects<TestState, TestEffect> {
            if line.contains("hello") {
                let mut fx = LineEffects::state(TestState::Ok);
                fx.flags.push("seen");
                fx
            } else if let Some(rest) = line.strip_prefix("remember ") {
                LineEffects::none().with_effect(TestEffect::Remember(rest.to_string()))
            } else {
                LineEffects::none()
            }
        }
    }

    fn sh(script: &str) -> Vec<String> {
        vec!["/bin/sh".to_string(), "-c".to_string(), script.to_string()]
    }

    fn updated_until<T: ToolSpec>(
        process: &mut SupervisedProcess<T>,
        mut done: impl FnMut(&UpdateReport<T::State, T::Effect>) -> bool,
        timeout: Duration,
    ) -> Vec<UpdateReport<T::State, T::Effect>> {
        let deadline = Instant::now() + timeout;
        let mut reports = Vec::new();
        loop {
            let report = process.update().unwrap();
            let finished = done(&report);
            reports.push(report);
            if finished || Instant::now() >= deadline {
                return reports;
            }
            thread::sleep(Duration::from_millis(20));
        }
    }

    #[test]
    fn test_start_while_live_is_usage_error() {
        let mut process = SupervisedProcess::new(TestSpec, Duration::from_millis(200));
        process.start(&sh("sleep 5")).unwrap();
        match process.start(&sh("sleep 5")) {
            Err(Error::AlreadyRunning(tool)) => assert_eq!(tool, "test-tool"),
            other => panic!("expected AlreadyRunning, got {other:?}"),
        }
        process.clean();
    }

    #[test]
    fn test_clean_is_idempotent_and_safe_when_never_started() {
        let mut process = SupervisedProcess::new(TestSpec, Duration::from_millis(200));
        process.clean();
        assert_eq!(process.state(), TestState::New);

        process.start(&sh("sleep 5")).unwrap();
        process.clean();
        let after_first = process.state();
        process.clean();
        assert_eq!(process.state(), after_first);
        assert!(!process.is_live());
        // a fresh start is allowed again after clean
        process.start(&sh("exit 0")).unwrap();
        process.clean();
    }

    #[test]
    fn test_update_classifies_output_and_sets_flags() {
        let mut process = SupervisedProcess::new(TestSpec, Duration::from_millis(200));
        process.start(&sh("echo hello; sleep 5")).unwrap();

        let reports = updated_until(
            &mut process,
            |r| r.state == TestState::Ok,
            Duration::from_secs(5),
        );
        let last = reports.last().unwrap();
        assert_eq!(last.state, TestState::Ok);
        assert!(last.flags.is_set("seen"));

        process.clean();
    }

    #[test]
    fn test_exit_forces_terminated_without_losing_final_burst() {
        let mut process = SupervisedProcess::new(TestSpec, Duration::from_millis(200));
        process.start(&sh("echo hello")).unwrap();

        let reports = updated_until(
            &mut process,
            |r| r.exit_code.is_some(),
            Duration::from_secs(5),
        );
        let last = reports.last().unwrap();
        assert_eq!(last.exit_code, Some(0));
        // exit wins the state, but the burst was still classified
        assert_eq!(last.state, TestState::Terminated);
        assert!(last.flags.is_set("seen"));

        process.clean();
    }

    #[test]
    fn test_side_effects_are_reported_once() {
        let mut process = SupervisedProcess::new(TestSpec, Duration::from_millis(200));
        process
            .start(&sh("echo 'remember replay_arp-0402-145500.cap'"))
            .unwrap();

        let reports = updated_until(
            &mut process,
            |r| r.exit_code.is_some(),
            Duration::from_secs(5),
        );
        let all_effects: Vec<_> = reports.iter().flat_map(|r| r.effects.iter()).collect();
        assert_eq!(
            all_effects,
            vec![&TestEffect::Remember(
                "replay_arp-0402-145500.cap".to_string()
            )]
        );

        process.clean();
    }

    #[test]
    fn test_unexpected_stderr_is_an_anomaly_not_a_failure() {
        let mut process = SupervisedProcess::new(TestSpec, Duration::from_millis(200));
        process
            .start(&sh("echo 'oops' 1>&2; echo hello; sleep 5"))
            .unwrap();

        let reports = updated_until(
            &mut process,
            |r| !r.anomalies.is_empty(),
            Duration::from_secs(5),
        );
        let with_anomaly = reports.iter().find(|r| !r.anomalies.is_empty()).unwrap();
        assert_eq!(
            with_anomaly.anomalies[0],
            Anomaly {
                stream: Stream::Stderr,
                line: "oops".to_string()
            }
        );

        process.clean();
    }

    #[test]
    fn test_stop_returns_exit_code_and_none_when_never_started() {
        let mut process = SupervisedProcess::new(TestSpec, Duration::from_millis(200));
        assert_eq!(process.stop(), None);

        process.start(&sh("sleep 600")).unwrap();
        let code = process.stop();
        assert!(code.is_some());
        assert_eq!(process.state(), TestState::Terminated);
        process.clean();
    }

    #[test]
    fn test_flag_clear() {
        let mut flags = FlagSet::new();
        flags.reset(&["deauthenticated"]);
        assert!(!flags.is_set("deauthenticated"));
        flags.set("deauthenticated");
        assert!(flags.is_set("deauthenticated"));
        flags.clear("deauthenticated");
        assert!(!flags.is_set("deauthenticated"));
    }
}
