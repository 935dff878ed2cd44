use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use exiftool_vfs::config::Config;
use exiftool_vfs::exif::{ExifTags, ExifTool, ExifToolOptions, ExifToolOutput};
use exiftool_vfs::pipeline::{self, WriteTarget};

#[derive(Parser, Debug)]
#[command(
    name = "exiftool-vfs",
    version,
    about = "Read and write EXIF/IPTC/XMP metadata with ExifTool running over an in-memory filesystem"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Path to config file (default: config.json next to binary)
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print metadata for files or directories
    Read {
        /// Files or directories to read
        #[arg(value_name = "PATH", required = true)]
        paths: Vec<PathBuf>,

        /// Output results as JSON
        #[arg(long)]
        json: bool,

        /// Extra ExifTool arguments (after `--`)
        #[arg(last = true, value_name = "EXIFTOOL_ARGS")]
        args: Vec<String>,
    },

    /// Write tags to files or directories
    Write {
        /// Files or directories to modify
        #[arg(value_name = "PATH", required = true)]
        paths: Vec<PathBuf>,

        /// Tag to write; repeat a name to write a list
        #[arg(short, long = "tag", value_name = "NAME=VALUE")]
        tag: Vec<String>,

        /// JSON object of tags to write
        #[arg(long = "tags", value_name = "FILE")]
        tags_file: Option<PathBuf>,

        /// Output file or directory (default: rewrite in place)
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,

        /// Do not keep a .bak copy when rewriting in place
        #[arg(long)]
        no_backup: bool,

        /// Output results as JSON
        #[arg(long)]
        json: bool,

        /// Extra ExifTool arguments (after `--`)
        #[arg(last = true, value_name = "EXIFTOOL_ARGS")]
        args: Vec<String>,
    },

    /// Initialize a default config.json and exit
    Init,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
        .format_timestamp(None)
        .init();

    match cli.command {
        Command::Init => {
            let config = Config::default();
            let path = cli.config.as_deref();
            config.save(path)?;
            let save_path = match path {
                Some(p) => p.to_path_buf(),
                None => Config::config_path()?,
            };
            println!("Default config written to {}", save_path.display());
            Ok(())
        }
        Command::Read { paths, json, args } => {
            let config = Config::load(cli.config.as_deref())?;
            let tool = ExifTool::from_config(&config)?;
            let options = with_extra_args(config.options().await?, args);
            let result = run_read(&tool, &paths, &options, json).await;
            tool.dispose().await;
            result
        }
        Command::Write {
            paths,
            tag,
            tags_file,
            output,
            no_backup,
            json,
            args,
        } => {
            let config = Config::load(cli.config.as_deref())?;
            let tool = ExifTool::from_config(&config)?;
            let options = with_extra_args(config.options().await?, args);
            let tags = load_tags(tags_file, &tag)?;
            let target = WriteTarget { output, backup: !no_backup };
            let result = run_write(&tool, &paths, &tags, &options, &target, json).await;
            tool.dispose().await;
            result
        }
    }
}

fn with_extra_args(mut options: ExifToolOptions, args: Vec<String>) -> ExifToolOptions {
    options.args.extend(args);
    options
}

/// Tags from `--tags FILE` first, then `--tag` assignments on top.
fn load_tags(file: Option<PathBuf>, assignments: &[String]) -> Result<ExifTags> {
    let mut tags = match file {
        Some(path) => {
            let contents = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            serde_json::from_str::<ExifTags>(&contents)
                .with_context(|| format!("Failed to parse {}", path.display()))?
        }
        None => ExifTags::new(),
    };

    for (name, value) in pipeline::parse_tag_assignments(assignments)?.iter() {
        tags.insert(name, value.clone());
    }

    if tags.is_empty() {
        anyhow::bail!("No tags to write. Use --tag NAME=VALUE or --tags FILE.");
    }
    Ok(tags)
}

async fn run_read(
    tool: &ExifTool,
    paths: &[PathBuf],
    options: &ExifToolOptions,
    json: bool,
) -> Result<()> {
    let files = pipeline::collect_files(paths);
    if files.is_empty() {
        anyhow::bail!("No files found in the specified paths.");
    }

    let total = files.len();
    let mut failed = 0;
    let mut json_results = Vec::new();

    for path in &files {
        let output = pipeline::read_file(tool, path, options).await?;
        if let ExifToolOutput::Failure { error, .. } = &output {
            log::error!("{}: {}", path.display(), error.trim_end());
            failed += 1;
        }

        if json {
            json_results.push(serde_json::json!({
                "path": path.display().to_string(),
                "result": output,
            }));
        } else if let Some(data) = output.data() {
            if total > 1 {
                println!("======== {}", path.display());
            }
            print!("{data}");
        }
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&json_results)?);
    }

    if failed > 0 {
        anyhow::bail!("{failed} of {total} file(s) failed");
    }
    Ok(())
}

async fn run_write(
    tool: &ExifTool,
    paths: &[PathBuf],
    tags: &ExifTags,
    options: &ExifToolOptions,
    target: &WriteTarget,
    json: bool,
) -> Result<()> {
    let files = pipeline::collect_files(paths);
    if files.is_empty() {
        anyhow::bail!("No files found in the specified paths.");
    }
    if files.len() > 1 {
        if let Some(output) = &target.output {
            if !output.is_dir() {
                anyhow::bail!(
                    "--output must be an existing directory when writing {} files",
                    files.len()
                );
            }
        }
    }

    let total = files.len();
    let mut reports = Vec::new();

    for (i, path) in files.iter().enumerate() {
        log::info!("[{}/{}] Writing: {}", i + 1, total, path.display());

        let report = pipeline::write_file(tool, path, tags, options, target).await?;
        match (&report.error, &report.written_to) {
            (Some(err), _) => log::error!("  Error: {}", err.trim_end()),
            (None, Some(dest)) => {
                log::info!("  Saved: {}", dest.display());
                if let Some(ref backup) = report.backup_path {
                    log::info!("  Backup: {}", backup.display());
                }
            }
            (None, None) => {}
        }
        reports.push(report);
    }

    // JSON output
    if json {
        let json_results: Vec<serde_json::Value> = reports
            .iter()
            .map(|r| {
                serde_json::json!({
                    "path": r.path.display().to_string(),
                    "written_to": r.written_to.as_ref().map(|p| p.display().to_string()),
                    "backup_path": r.backup_path.as_ref().map(|p| p.display().to_string()),
                    "error": r.error,
                    "exit_code": r.exit_code,
                })
            })
            .collect();

        println!("{}", serde_json::to_string_pretty(&json_results)?);
    }

    // Summary
    let success = reports.iter().filter(|r| r.error.is_none()).count();
    let failed = reports.iter().filter(|r| r.error.is_some()).count();
    log::info!("Done: {success} succeeded, {failed} failed out of {total} files");

    if failed > 0 {
        anyhow::bail!("{failed} of {total} file(s) failed");
    }
    Ok(())
}
