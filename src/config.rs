use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::exif::{BinaryFile, ExifToolOptions};

/// Top-level configuration for exiftool-vfs.
///
/// Controls how the Perl interpreter is launched and which arguments are
/// passed to ExifTool on every call.
///
/// # Loading
///
/// ```rust,no_run
/// use exiftool_vfs::config::Config;
///
/// // From a JSON file
/// let config = Config::load(Some("config.json".as_ref())).unwrap();
///
/// // Or use defaults and customize
/// let mut config = Config::default();
/// config.runtime.script = "/opt/exiftool/exiftool".into();
/// config.runtime.include_dirs.push("/opt/exiftool/lib".into());
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Interpreter settings.
    pub runtime: RuntimeConfig,
    /// Arguments applied to every read and write.
    pub defaults: DefaultsConfig,
}

/// How the Perl interpreter running ExifTool is launched.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Perl binary (looked up on `PATH` when not absolute).
    pub perl: PathBuf,
    /// The ExifTool script. Relative paths resolve against the executable's directory.
    pub script: PathBuf,
    /// Extra `@INC` directories, typically ExifTool's `lib/`.
    pub include_dirs: Vec<PathBuf>,
    /// Kill the interpreter after this many seconds.
    pub timeout_secs: Option<u64>,
}

/// Arguments applied to every ExifTool call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DefaultsConfig {
    /// Extra ExifTool arguments, placed before per-call arguments.
    pub args: Vec<String>,
    /// Optional `ExifTool_config` file passed with `-config`.
    pub exiftool_config: Option<PathBuf>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            perl: PathBuf::from("perl"),
            script: PathBuf::from("exiftool"),
            include_dirs: Vec::new(),
            timeout_secs: None,
        }
    }
}

impl Config {
    /// Resolve the config file path — same directory as the executable.
    pub fn config_path() -> Result<PathBuf> {
        Ok(exe_dir()?.join("config.json"))
    }

    /// Load config from the given path, or from the default location.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::config_path()?,
        };

        if !config_path.exists() {
            log::warn!(
                "Config file not found at {}. Using defaults.",
                config_path.display()
            );
            return Ok(Self::default());
        }

        let contents =
            std::fs::read_to_string(&config_path).context("Failed to read config file")?;
        let config: Config =
            serde_json::from_str(&contents).context("Failed to parse config file")?;
        Ok(config)
    }

    /// Save config to the given path, or to the default location.
    pub fn save(&self, path: Option<&Path>) -> Result<()> {
        let config_path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::config_path()?,
        };

        let contents = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(&config_path, contents).context("Failed to write config file")?;
        log::info!("Config saved to {}", config_path.display());
        Ok(())
    }

    /// Build per-call options from the configured defaults.
    ///
    /// Reads the ExifTool config file when one is set.
    pub async fn options(&self) -> Result<ExifToolOptions> {
        let config = match &self.defaults.exiftool_config {
            Some(path) => Some(BinaryFile::from_path(path).await?),
            None => None,
        };
        Ok(ExifToolOptions {
            args: self.defaults.args.clone(),
            config,
        })
    }
}

impl RuntimeConfig {
    /// The script path, resolved against the executable's directory if relative.
    pub fn script_path(&self) -> Result<PathBuf> {
        if self.script.is_absolute() {
            Ok(self.script.clone())
        } else {
            Ok(exe_dir()?.join(&self.script))
        }
    }
}

fn exe_dir() -> Result<PathBuf> {
    let exe_path = std::env::current_exe().context("Failed to get executable path")?;
    let exe_dir = exe_path
        .parent()
        .context("Failed to get executable directory")?;
    Ok(exe_dir.to_path_buf())
}
