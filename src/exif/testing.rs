//! Scripted stand-in for a Perl runtime, used by the facade tests.

use anyhow::Result;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use super::{ExifTool, Script};
use crate::runtime::{PerlRuntime, RunOutcome, RuntimeContext, RuntimeFactory};
use crate::vfs::{MemoryFileSystem, Node};

/// What the fake interpreter does for one run.
#[derive(Debug, Clone)]
pub(crate) struct Reply {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub outcome: RunOutcome,
    pub last_error: Option<String>,
    /// Fail the run itself, as when the interpreter cannot start.
    pub run_error: Option<String>,
}

impl Reply {
    pub fn stdout(text: impl AsRef<[u8]>) -> Self {
        Self {
            stdout: text.as_ref().to_vec(),
            stderr: Vec::new(),
            outcome: RunOutcome::exited(0),
            last_error: None,
            run_error: None,
        }
    }

    pub fn run_error(error: &str) -> Self {
        Self { run_error: Some(error.to_string()), ..Self::stdout("") }
    }

    pub fn stderr(text: impl AsRef<[u8]>) -> Self {
        Self { stderr: text.as_ref().to_vec(), ..Self::stdout("") }
    }

    pub fn exit(code: i32, stderr: impl AsRef<[u8]>) -> Self {
        Self { outcome: RunOutcome::exited(code), ..Self::stderr(stderr) }
    }

    pub fn last_error(mut self, error: &str) -> Self {
        self.last_error = Some(error.to_string());
        self
    }

    pub fn outcome(mut self, outcome: RunOutcome) -> Self {
        self.outcome = outcome;
        self
    }
}

type Handler = dyn Fn(&[String], &RuntimeContext) -> Reply + Send + Sync;

#[derive(Default)]
struct State {
    created: AtomicUsize,
    disposed: AtomicUsize,
    calls: Mutex<Vec<Vec<String>>>,
    fs: Mutex<Option<MemoryFileSystem>>,
}

/// A [`RuntimeFactory`] whose runtimes answer with a handler and record calls.
#[derive(Clone)]
pub(crate) struct FakeExifTool {
    handler: Arc<Handler>,
    state: Arc<State>,
}

impl FakeExifTool {
    pub fn new(handler: impl Fn(&[String], &RuntimeContext) -> Reply + Send + Sync + 'static) -> Self {
        Self { handler: Arc::new(handler), state: Arc::default() }
    }

    pub fn factory(&self) -> Self {
        self.clone()
    }

    pub fn tool(&self) -> ExifTool {
        ExifTool::new(self.factory(), Script::Source(Arc::from(&b"#!/usr/bin/perl\n"[..])))
    }

    pub fn created(&self) -> usize {
        self.state.created.load(Ordering::SeqCst)
    }

    pub fn disposed(&self) -> usize {
        self.state.disposed.load(Ordering::SeqCst)
    }

    /// Argument vectors of every run so far.
    pub fn calls(&self) -> Vec<Vec<String>> {
        self.state.calls.lock().unwrap().clone()
    }

    /// Filesystem of the most recently created engine.
    pub fn fs(&self) -> Option<MemoryFileSystem> {
        self.state.fs.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl RuntimeFactory for FakeExifTool {
    fn name(&self) -> &str {
        "fake"
    }

    async fn create(&self, ctx: RuntimeContext) -> Result<Box<dyn PerlRuntime>> {
        self.state.created.fetch_add(1, Ordering::SeqCst);
        *self.state.fs.lock().unwrap() = Some(ctx.fs.clone());
        Ok(Box::new(FakeRuntime {
            handler: self.handler.clone(),
            state: self.state.clone(),
            ctx,
            last_error: None,
        }))
    }
}

struct FakeRuntime {
    handler: Arc<Handler>,
    state: Arc<State>,
    ctx: RuntimeContext,
    last_error: Option<String>,
}

#[async_trait::async_trait]
impl PerlRuntime for FakeRuntime {
    async fn reset(&mut self) -> Result<()> {
        self.last_error = None;
        Ok(())
    }

    async fn run_file(&mut self, script: &str, args: &[String]) -> Result<RunOutcome> {
        assert_eq!(script, super::SCRIPT_PATH);
        self.state.calls.lock().unwrap().push(args.to_vec());

        let reply = (self.handler)(args, &self.ctx);
        if let Some(error) = reply.run_error {
            anyhow::bail!(error);
        }
        // Deliver in two chunks to exercise incremental decoding, letting
        // other tasks run in between
        let mid = reply.stdout.len() / 2;
        (self.ctx.stdout)(&reply.stdout[..mid]);
        tokio::task::yield_now().await;
        (self.ctx.stdout)(&reply.stdout[mid..]);
        (self.ctx.stderr)(&reply.stderr);
        self.last_error = reply.last_error;
        Ok(reply.outcome)
    }

    fn flush(&mut self) {}

    fn last_error(&self) -> Option<String> {
        self.last_error.clone()
    }

    fn dispose(&mut self) {
        self.state.disposed.fetch_add(1, Ordering::SeqCst);
    }
}

/// Behaves enough like ExifTool for round trips.
///
/// Writes (`-o OUT`) copy the input and append each `-TAG=VALUE` argument as
/// a line. Reads report those lines back, as JSON with `-json`.
pub(crate) fn simulated_exiftool(args: &[String], ctx: &RuntimeContext) -> Reply {
    let Some(input) = args.last() else {
        return Reply::exit(1, "No file specified\n");
    };
    let Some(Node::File { content }) = ctx.fs.lookup(input) else {
        return Reply::exit(1, format!("Error: File not found - {input}\n"));
    };

    if let Some(pos) = args.iter().position(|a| a == "-o") {
        let Some(out) = args.get(pos + 1) else {
            return Reply::exit(1, "Missing -o argument\n");
        };
        let mut data = content.to_vec();
        for assignment in args.iter().filter(|a| a.starts_with('-') && a.contains('=')) {
            data.push(b'\n');
            data.extend_from_slice(assignment.as_bytes());
        }
        ctx.fs.add_file(out, data);
        return Reply::stdout("    1 image files created\n");
    }

    let text = String::from_utf8_lossy(&content);
    let tags: Vec<(String, String)> = text
        .lines()
        .filter_map(|line| line.strip_prefix('-')?.split_once('='))
        .map(|(name, value)| {
            let name = name.rsplit(':').next().unwrap_or(name);
            (name.to_string(), value.to_string())
        })
        .collect();

    if args.iter().any(|a| a == "-json") {
        let mut object = serde_json::Map::new();
        object.insert("SourceFile".into(), input.clone().into());
        for (name, value) in tags {
            object.insert(name, value.into());
        }
        let json = serde_json::Value::Array(vec![object.into()]);
        return Reply::stdout(serde_json::to_string_pretty(&json).unwrap_or_default());
    }

    let mut out = format!("File Name                       : {}\n", input.trim_start_matches('/'));
    for (name, value) in tags {
        out.push_str(&format!("{name:<32}: {value}\n"));
    }
    Reply::stdout(out)
}
