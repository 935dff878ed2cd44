//! The seam between the metadata facade and the Perl interpreter that runs ExifTool.
//!
//! A backend provides two things:
//!
//! - a [`RuntimeFactory`] that builds an interpreter bound to a
//!   [`MemoryFileSystem`] and two output sinks;
//! - the [`PerlRuntime`] itself, which can run a script from that filesystem.
//!
//! The crate ships [`ProcessRuntimeFactory`], which drives a host `perl`
//! binary inside a throwaway sandbox directory.

mod output;
mod process;

pub use output::{OutputBuffer, OutputSink};
pub use process::{ProcessRuntime, ProcessRuntimeFactory};

use anyhow::Result;

use crate::vfs::MemoryFileSystem;

/// Outcome of one script run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOutcome {
    /// `true` when the interpreter completed without an internal failure.
    pub success: bool,
    /// Process-style exit code. `None` when the run never produced one
    /// (killed, timed out).
    pub exit_code: Option<i32>,
}

impl RunOutcome {
    pub fn exited(code: i32) -> Self {
        Self { success: code == 0, exit_code: Some(code) }
    }

    pub fn aborted() -> Self {
        Self { success: false, exit_code: None }
    }
}

/// Everything a backend needs to build an interpreter.
#[derive(Clone)]
pub struct RuntimeContext {
    pub fs: MemoryFileSystem,
    pub stdout: OutputSink,
    pub stderr: OutputSink,
}

/// A Perl interpreter able to run scripts stored in its [`MemoryFileSystem`].
///
/// Implement this trait to host ExifTool in a different sandbox (a WASI
/// runtime, a remote worker, ...).
#[async_trait::async_trait]
pub trait PerlRuntime: Send {
    /// Return the interpreter to a clean state before the next run.
    async fn reset(&mut self) -> Result<()>;

    /// Run the script at `script` (a virtual path) with `args`.
    ///
    /// Output is delivered to the sinks given at construction. An `Err` means
    /// the interpreter could not be driven at all; a script that fails is an
    /// `Ok` outcome with a non-zero exit code.
    async fn run_file(&mut self, script: &str, args: &[String]) -> Result<RunOutcome>;

    /// Push any buffered output to the sinks.
    fn flush(&mut self);

    /// Interpreter-level error message from the last run, if any.
    fn last_error(&self) -> Option<String>;

    /// Release interpreter resources. The runtime must not be used afterwards.
    fn dispose(&mut self);
}

/// Builds [`PerlRuntime`]s.
#[async_trait::async_trait]
pub trait RuntimeFactory: Send + Sync {
    /// Display name of the backend (e.g. "process").
    fn name(&self) -> &str;

    async fn create(&self, ctx: RuntimeContext) -> Result<Box<dyn PerlRuntime>>;
}
