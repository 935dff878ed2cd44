use anyhow::{Context, Result};
use std::collections::{BTreeMap, BTreeSet};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use walkdir::WalkDir;

use super::{PerlRuntime, RunOutcome, RuntimeContext, RuntimeFactory};
use crate::config::RuntimeConfig;
use crate::vfs;

/// Builds [`ProcessRuntime`]s from a [`RuntimeConfig`].
#[derive(Debug, Clone)]
pub struct ProcessRuntimeFactory {
    config: RuntimeConfig,
}

impl ProcessRuntimeFactory {
    pub fn new(config: RuntimeConfig) -> Self {
        Self { config }
    }
}

#[async_trait::async_trait]
impl RuntimeFactory for ProcessRuntimeFactory {
    fn name(&self) -> &str {
        "process"
    }

    async fn create(&self, ctx: RuntimeContext) -> Result<Box<dyn PerlRuntime>> {
        log::debug!("Using interpreter {}", self.config.perl.display());
        Ok(Box::new(ProcessRuntime {
            perl: self.config.perl.clone(),
            include_dirs: self.config.include_dirs.clone(),
            timeout: self.config.timeout_secs.map(Duration::from_secs),
            ctx,
            last_error: None,
            disposed: false,
        }))
    }
}

/// Runs scripts with a host Perl binary.
///
/// Every run gets a fresh sandbox directory that mirrors the virtual
/// filesystem: the sandbox root stands in for `/`. Arguments that start with
/// `/` are rebased into the sandbox. When the process exits, files it
/// created, changed or deleted are mirrored back into the virtual filesystem.
///
/// The sandbox only maps paths; it does not confine the interpreter.
pub struct ProcessRuntime {
    perl: PathBuf,
    include_dirs: Vec<PathBuf>,
    timeout: Option<Duration>,
    ctx: RuntimeContext,
    last_error: Option<String>,
    disposed: bool,
}

#[async_trait::async_trait]
impl PerlRuntime for ProcessRuntime {
    async fn reset(&mut self) -> Result<()> {
        if self.disposed {
            anyhow::bail!("Perl runtime has been disposed");
        }
        self.last_error = None;
        Ok(())
    }

    async fn run_file(&mut self, script: &str, args: &[String]) -> Result<RunOutcome> {
        if self.disposed {
            anyhow::bail!("Perl runtime has been disposed");
        }

        let sandbox = tempfile::Builder::new()
            .prefix("exiftool-vfs-")
            .tempdir()
            .context("Failed to create sandbox directory")?;
        let root = sandbox.path();
        let staged = self.materialize(root).await?;

        let mut cmd = Command::new(&self.perl);
        for dir in &self.include_dirs {
            let mut flag = OsString::from("-I");
            flag.push(dir);
            cmd.arg(flag);
        }
        cmd.arg(host_path(root, script))
            .args(args.iter().map(|arg| rebase_arg(root, arg)))
            .current_dir(root)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        log::debug!("Running {} {script} with {} argument(s)", self.perl.display(), args.len());

        let output = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, cmd.output()).await {
                Ok(output) => output,
                Err(_) => {
                    log::warn!("Interpreter timed out after {}s", limit.as_secs());
                    self.last_error =
                        Some(format!("Interpreter timed out after {}s", limit.as_secs()));
                    return Ok(RunOutcome::aborted());
                }
            },
            None => cmd.output().await,
        }
        .with_context(|| format!("Failed to run interpreter {}", self.perl.display()))?;

        (self.ctx.stdout)(output.stdout.as_slice());
        (self.ctx.stderr)(output.stderr.as_slice());

        self.sync_back(root, &staged).await?;

        match output.status.code() {
            Some(code) => Ok(RunOutcome::exited(code)),
            None => {
                self.last_error = Some(format!("Interpreter terminated abnormally ({})", output.status));
                Ok(RunOutcome::aborted())
            }
        }
    }

    fn flush(&mut self) {}

    fn last_error(&self) -> Option<String> {
        self.last_error.clone()
    }

    fn dispose(&mut self) {
        log::debug!("Disposing process runtime");
        self.disposed = true;
    }
}

impl ProcessRuntime {
    /// Write every virtual file under `root`. Returns what was written.
    async fn materialize(&self, root: &Path) -> Result<BTreeMap<String, Arc<[u8]>>> {
        let mut staged = BTreeMap::new();
        for (path, content) in self.ctx.fs.files() {
            let target = host_path(root, &path);
            if let Some(parent) = target.parent() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
            tokio::fs::write(&target, &content)
                .await
                .with_context(|| format!("Failed to stage {path}"))?;
            staged.insert(path, content);
        }
        Ok(staged)
    }

    /// Mirror the sandbox back into the virtual filesystem.
    async fn sync_back(&self, root: &Path, staged: &BTreeMap<String, Arc<[u8]>>) -> Result<()> {
        let mut seen = BTreeSet::new();
        let produced: Vec<PathBuf> = WalkDir::new(root)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| e.into_path())
            .collect();

        for path in produced {
            let Ok(relative) = path.strip_prefix(root) else {
                continue;
            };
            let virtual_path = vfs::normalize(&relative.to_string_lossy().replace('\\', "/"));
            let content = tokio::fs::read(&path)
                .await
                .with_context(|| format!("Failed to read back {virtual_path}"))?;

            let changed = staged
                .get(&virtual_path)
                .is_none_or(|before| before.as_ref() != content.as_slice());
            if changed {
                log::debug!("Sandbox produced {virtual_path} ({} bytes)", content.len());
                self.ctx.fs.add_file(&virtual_path, content);
            }
            seen.insert(virtual_path);
        }

        for path in staged.keys().filter(|p| !seen.contains(*p)) {
            log::debug!("Sandbox removed {path}");
            let _ = self.ctx.fs.remove_file(path);
        }
        Ok(())
    }
}

/// Map a virtual path onto the sandbox directory.
fn host_path(root: &Path, virtual_path: &str) -> PathBuf {
    let normalized = vfs::normalize(virtual_path);
    root.join(normalized.trim_start_matches('/'))
}

fn rebase_arg(root: &Path, arg: &str) -> OsString {
    if arg.starts_with('/') {
        host_path(root, arg).into_os_string()
    } else {
        OsString::from(arg)
    }
}
