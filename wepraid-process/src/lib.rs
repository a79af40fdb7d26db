//! External process supervision for wepraid
//!
//! The aircrack-ng tools run as long-lived external processes and report
//! progress only through free-text output. This crate provides the
//! supervision engine the attack layer is built on:
//!
//! - `OutputLog`: an append-only log file with a persistent read cursor,
//!   tailing a stream the writing process still holds open
//! - `ProcessHandle`: owns one external process and its redirected
//!   stdout/stderr, with non-blocking polling and graceful-then-forced
//!   termination
//! - `SupervisedProcess<T>`: the generic lifecycle (start / update / stop /
//!   clean) parameterized over a per-tool `ToolSpec` classifier

pub mod handle;
pub mod supervisor;
pub mod tail;

pub use handle::ProcessHandle;
pub use supervisor::{
    Anomaly, FlagSet, LineEffects, Stats, Stream, SupervisedProcess, ToolSpec, UpdateReport,
};
pub use tail::OutputLog;
