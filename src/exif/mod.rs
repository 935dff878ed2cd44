//! Reading and writing metadata through ExifTool.
//!
//! [`ExifTool`] owns one cached *engine*: a [`MemoryFileSystem`] holding the
//! ExifTool script plus the [`PerlRuntime`] that runs it. The engine is built
//! on first use and reused until [`ExifTool::dispose`].
//!
//! - [`ExifTool::parse_metadata`] — run ExifTool on a file and return its stdout
//! - [`ExifTool::write_metadata`] — write tags and return the modified file bytes
//!
//! Process-wide shortcuts [`parse_metadata`], [`write_metadata`] and
//! [`dispose`] use a default instance built from [`Config::load`].

mod file;
mod output;
mod reader;
mod tags;
#[cfg(test)]
pub(crate) mod testing;
mod writer;

pub use file::{BinaryFile, ExifToolOptions};
pub use output::ExifToolOutput;
pub use tags::{ExifTags, TagValue};

use anyhow::{Context, Result};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{Mutex, OnceCell};

use crate::config::Config;
use crate::runtime::{
    OutputBuffer, PerlRuntime, ProcessRuntimeFactory, RunOutcome, RuntimeContext, RuntimeFactory,
};
use crate::vfs::{self, MemoryFileSystem};

/// Where the ExifTool script lives inside the virtual filesystem.
pub const SCRIPT_PATH: &str = "/exiftool";

/// The ExifTool script to install into each new engine.
#[derive(Debug, Clone)]
pub enum Script {
    /// Script source held in memory.
    Source(Arc<[u8]>),
    /// Read from a host file when the engine is built.
    File(PathBuf),
}

impl Script {
    async fn load(&self) -> Result<Arc<[u8]>> {
        match self {
            Script::Source(bytes) => Ok(bytes.clone()),
            Script::File(path) => {
                let bytes = tokio::fs::read(path).await.with_context(|| {
                    format!("Failed to read ExifTool script {}", path.display())
                })?;
                Ok(bytes.into())
            }
        }
    }
}

/// Handle to a cached ExifTool engine.
///
/// Cloning is cheap; all clones share the engine. Calls are serialized.
///
/// ```rust,no_run
/// use exiftool_vfs::config::Config;
/// use exiftool_vfs::exif::{BinaryFile, ExifTags, ExifTool, ExifToolOptions};
///
/// # async fn example() -> anyhow::Result<()> {
/// let tool = ExifTool::from_config(&Config::load(None)?)?;
/// let photo = BinaryFile::from_path("photo.jpg").await?;
///
/// let tags = ExifTags::new().with("Artist", "Jane Smith").with("Rating", 5);
/// let written = tool.write_metadata(&photo, &tags, &ExifToolOptions::default()).await?;
///
/// if let Some(bytes) = written.data() {
///     let modified = BinaryFile::new("photo.jpg", bytes.clone());
///     let json = tool
///         .parse_metadata(&modified, &ExifToolOptions::with_args(["-json"]))
///         .await?;
///     println!("{:?}", json.data());
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct ExifTool {
    inner: Arc<Inner>,
}

struct Inner {
    factory: Box<dyn RuntimeFactory>,
    script: Script,
    engine: Mutex<Option<Engine>>,
}

impl fmt::Debug for ExifTool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExifTool")
            .field("backend", &self.inner.factory.name())
            .field("script", &self.inner.script)
            .finish()
    }
}

impl ExifTool {
    pub fn new(factory: impl RuntimeFactory + 'static, script: Script) -> Self {
        Self {
            inner: Arc::new(Inner {
                factory: Box::new(factory),
                script,
                engine: Mutex::new(None),
            }),
        }
    }

    /// An instance using the host `perl` described by `config`.
    pub fn from_config(config: &Config) -> Result<Self> {
        let script = config.runtime.script_path()?;
        Ok(Self::new(
            ProcessRuntimeFactory::new(config.runtime.clone()),
            Script::File(script),
        ))
    }

    /// Extract metadata from `file` and return ExifTool's stdout.
    pub async fn parse_metadata(
        &self,
        file: &BinaryFile,
        options: &ExifToolOptions,
    ) -> Result<ExifToolOutput<String>> {
        self.parse_metadata_with(file, options, Ok).await
    }

    /// Like [`parse_metadata`](Self::parse_metadata), passing stdout through
    /// `transform` on success. A transform error is returned as `Err`.
    pub async fn parse_metadata_with<T>(
        &self,
        file: &BinaryFile,
        options: &ExifToolOptions,
        transform: impl FnOnce(String) -> Result<T>,
    ) -> Result<ExifToolOutput<T>> {
        let mut slot = self.inner.engine.lock().await;
        let engine = self.acquire(&mut slot).await?;
        reader::parse(engine, file, options, transform).await
    }

    /// Extract metadata and deserialize ExifTool's JSON output.
    ///
    /// `-json` is appended to the arguments when missing.
    pub async fn parse_metadata_json<T: serde::de::DeserializeOwned>(
        &self,
        file: &BinaryFile,
        options: &ExifToolOptions,
    ) -> Result<ExifToolOutput<T>> {
        let mut options = options.clone();
        if !options.args.iter().any(|a| is_json_flag(a)) {
            options.args.push("-json".to_string());
        }
        self.parse_metadata_with(file, &options, |stdout| {
            serde_json::from_str(&stdout).context("Failed to parse ExifTool JSON output")
        })
        .await
    }

    /// Write `tags` into a copy of `file` and return the copy's bytes.
    ///
    /// `file` itself is not modified.
    pub async fn write_metadata(
        &self,
        file: &BinaryFile,
        tags: &ExifTags,
        options: &ExifToolOptions,
    ) -> Result<ExifToolOutput<Vec<u8>>> {
        let mut slot = self.inner.engine.lock().await;
        let engine = self.acquire(&mut slot).await?;
        writer::write(engine, file, tags, options).await
    }

    /// Release the cached engine, if any. The next call builds a fresh one.
    pub async fn dispose(&self) {
        let mut slot = self.inner.engine.lock().await;
        if let Some(mut engine) = slot.take() {
            log::debug!("Disposing ExifTool engine ({})", self.inner.factory.name());
            engine.runtime.dispose();
        }
    }

    async fn acquire<'a>(&self, slot: &'a mut Option<Engine>) -> Result<&'a mut Engine> {
        let engine = match slot.take() {
            Some(engine) => engine,
            None => self.create_engine().await?,
        };
        Ok(slot.insert(engine))
    }

    async fn create_engine(&self) -> Result<Engine> {
        log::debug!("Creating ExifTool engine ({})", self.inner.factory.name());

        let fs = MemoryFileSystem::new();
        fs.add_file(SCRIPT_PATH, self.inner.script.load().await?);

        let stdout = OutputBuffer::new();
        let stderr = OutputBuffer::new();
        let runtime = self
            .inner
            .factory
            .create(RuntimeContext {
                fs: fs.clone(),
                stdout: stdout.sink(),
                stderr: stderr.sink(),
            })
            .await
            .with_context(|| format!("Failed to create {} runtime", self.inner.factory.name()))?;

        Ok(Engine { runtime, fs, stdout, stderr })
    }
}

/// One interpreter and its filesystem and output buffers.
pub(crate) struct Engine {
    runtime: Box<dyn PerlRuntime>,
    fs: MemoryFileSystem,
    stdout: OutputBuffer,
    stderr: OutputBuffer,
}

/// Captured result of one ExifTool run.
pub(crate) struct Execution {
    outcome: RunOutcome,
    stdout: String,
    stderr: String,
    last_error: Option<String>,
}

impl Engine {
    /// Clear output and reset the interpreter before a call.
    async fn begin(&mut self) -> Result<()> {
        self.stdout.clear();
        self.stderr.clear();
        self.runtime.reset().await
    }

    async fn exec(&mut self, args: &[String]) -> Result<Execution> {
        log::debug!("exiftool {}", args.join(" "));
        let outcome = self.runtime.run_file(SCRIPT_PATH, args).await?;
        self.runtime.flush();

        Ok(Execution {
            outcome,
            stdout: self.stdout.contents(),
            stderr: self.stderr.contents(),
            last_error: self.runtime.last_error(),
        })
    }
}

impl Execution {
    /// The failure, if any, shared by reads and writes: a bad exit, then
    /// anything on stderr.
    fn failure<T>(&self) -> Option<ExifToolOutput<T>> {
        if !self.outcome.success || self.outcome.exit_code != Some(0) {
            let error = self
                .last_error
                .as_deref()
                .filter(|e| !e.is_empty())
                .or(Some(self.stderr.as_str()).filter(|e| !e.is_empty()))
                .unwrap_or("Unknown error");
            return Some(ExifToolOutput::failure(error, self.outcome.exit_code));
        }

        if !self.stderr.trim().is_empty() {
            return Some(ExifToolOutput::failure(self.stderr.clone(), Some(0)));
        }

        None
    }
}

/// Virtual paths created for one call. Removed on drop, whatever the outcome.
pub(crate) struct Staging {
    fs: MemoryFileSystem,
    paths: Vec<String>,
}

impl Staging {
    fn new(fs: &MemoryFileSystem) -> Self {
        Self { fs: fs.clone(), paths: Vec::new() }
    }

    /// Copy `file` into the virtual filesystem and return its path.
    fn stage(&mut self, file: &BinaryFile) -> Result<String> {
        let path = file.virtual_path();
        if path == SCRIPT_PATH || path == "/" {
            anyhow::bail!("Cannot stage {:?}: the name is reserved", file.name);
        }
        if self.fs.contains_file(&path) {
            log::debug!("Replacing staged {path}");
        }
        log::debug!("Staging {path} ({} bytes)", file.data.len());
        self.fs.add_file(&path, file.data.as_slice());
        self.paths.push(path.clone());
        Ok(path)
    }

    /// Remove `path` on drop without creating it.
    fn track(&mut self, path: &str) {
        self.paths.push(vfs::normalize(path));
    }
}

impl Drop for Staging {
    fn drop(&mut self) {
        for path in &self.paths {
            // Outputs that were never produced are expected here
            if let Err(e) = self.fs.remove_file(path) {
                log::trace!("Cleanup skipped {path}: {e}");
            }
        }
    }
}

/// `-j`/`-json` in any case, with or without an `=FILE` suffix.
fn is_json_flag(arg: &str) -> bool {
    let name = arg.split_once('=').map_or(arg, |(name, _)| name.trim_end_matches('+'));
    name.eq_ignore_ascii_case("-j") || name.eq_ignore_ascii_case("-json")
}

static DEFAULT: OnceCell<ExifTool> = OnceCell::const_new();

async fn default_tool() -> Result<&'static ExifTool> {
    DEFAULT
        .get_or_try_init(|| async { ExifTool::from_config(&Config::load(None)?) })
        .await
}

/// [`ExifTool::parse_metadata`] on the process-wide default instance.
pub async fn parse_metadata(
    file: &BinaryFile,
    options: &ExifToolOptions,
) -> Result<ExifToolOutput<String>> {
    default_tool().await?.parse_metadata(file, options).await
}

/// [`ExifTool::write_metadata`] on the process-wide default instance.
pub async fn write_metadata(
    file: &BinaryFile,
    tags: &ExifTags,
    options: &ExifToolOptions,
) -> Result<ExifToolOutput<Vec<u8>>> {
    default_tool().await?.write_metadata(file, tags, options).await
}

/// Dispose the process-wide default instance's engine, if one was built.
pub async fn dispose() {
    if let Some(tool) = DEFAULT.get() {
        tool.dispose().await;
    }
}
