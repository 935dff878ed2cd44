use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::exif::{BinaryFile, ExifTags, ExifTool, ExifToolOptions, ExifToolOutput, TagValue};

/// Where [`write_file`] puts its result.
#[derive(Debug, Clone, Default)]
pub struct WriteTarget {
    /// Output file or directory. `None` rewrites the input in place.
    pub output: Option<PathBuf>,
    /// Copy the input to `<name>.<ext>.bak` before rewriting it in place.
    pub backup: bool,
}

/// The result of writing metadata to one host file.
#[derive(Debug)]
pub struct WriteReport {
    pub path: PathBuf,
    /// Where the modified file was saved, if the write succeeded.
    pub written_to: Option<PathBuf>,
    pub backup_path: Option<PathBuf>,
    pub error: Option<String>,
    pub exit_code: Option<i32>,
}

/// Collect files from the given paths.
///
/// Accepts a mix of file paths and directory paths. Directories are walked
/// recursively (following symlinks); hidden entries are skipped. The result
/// is sorted and free of duplicates.
///
/// # Example
///
/// ```rust,no_run
/// use exiftool_vfs::pipeline::collect_files;
/// use std::path::PathBuf;
///
/// let files = collect_files(&[
///     PathBuf::from("photo.jpg"),       // single file
///     PathBuf::from("./photos/"),        // entire directory
/// ]);
/// println!("Found {} files", files.len());
/// ```
pub fn collect_files(paths: &[PathBuf]) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for path in paths {
        if path.is_file() {
            files.push(path.clone());
        } else if path.is_dir() {
            for entry in WalkDir::new(path)
                .follow_links(true)
                .into_iter()
                .filter_entry(|e| e.depth() == 0 || !is_hidden(e.path()))
                .filter_map(|e| e.ok())
            {
                if entry.file_type().is_file() {
                    files.push(entry.into_path());
                }
            }
        } else {
            log::warn!("Path does not exist: {}", path.display());
        }
    }

    files.sort();
    files.dedup();
    files
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with('.'))
}

/// Parse `NAME=VALUE` assignments into tags.
///
/// A name given more than once collects its values into a list, in order.
/// Values are kept as text; ExifTool converts them.
pub fn parse_tag_assignments(items: &[String]) -> Result<ExifTags> {
    let mut tags = ExifTags::new();
    for item in items {
        let (name, value) = item
            .split_once('=')
            .with_context(|| format!("Invalid tag assignment {item:?}, expected NAME=VALUE"))?;
        let name = name.trim();
        if name.is_empty() {
            anyhow::bail!("Invalid tag assignment {item:?}: empty tag name");
        }

        let value = match tags.get(name) {
            Some(TagValue::List(existing)) => {
                let mut list = existing.clone();
                list.push(TagValue::from(value));
                TagValue::List(list)
            }
            Some(existing) => TagValue::List(vec![existing.clone(), TagValue::from(value)]),
            None => TagValue::from(value),
        };
        tags.insert(name, value);
    }
    Ok(tags)
}

/// Run ExifTool over one host file.
pub async fn read_file(
    tool: &ExifTool,
    path: &Path,
    options: &ExifToolOptions,
) -> Result<ExifToolOutput<String>> {
    let file = BinaryFile::from_path(path).await?;
    tool.parse_metadata(&file, options).await
}

/// Write `tags` to one host file and save the result according to `target`.
///
/// ExifTool failures are reported in the [`WriteReport`]; only I/O problems
/// are returned as `Err`. Nothing is saved when ExifTool fails.
pub async fn write_file(
    tool: &ExifTool,
    path: &Path,
    tags: &ExifTags,
    options: &ExifToolOptions,
    target: &WriteTarget,
) -> Result<WriteReport> {
    let file = BinaryFile::from_path(path).await?;
    let output = tool.write_metadata(&file, tags, options).await?;

    let mut report = WriteReport {
        path: path.to_path_buf(),
        written_to: None,
        backup_path: None,
        error: None,
        exit_code: output.exit_code(),
    };

    let data = match output {
        ExifToolOutput::Success { data } => data,
        ExifToolOutput::Failure { error, .. } => {
            report.error = Some(error);
            return Ok(report);
        }
    };

    let destination = output_path_for(path, target.output.as_deref());
    if destination == path && target.backup {
        report.backup_path = Some(backup_file(path)?);
    }

    tokio::fs::write(&destination, &data)
        .await
        .with_context(|| format!("Failed to save {}", destination.display()))?;
    log::debug!("Saved {} ({} bytes)", destination.display(), data.len());
    report.written_to = Some(destination);

    Ok(report)
}

/// Resolve the destination for `input`: in place, inside a directory, or a file.
pub fn output_path_for(input: &Path, output: Option<&Path>) -> PathBuf {
    match output {
        None => input.to_path_buf(),
        Some(dir) if dir.is_dir() => match input.file_name() {
            Some(name) => dir.join(name),
            None => dir.to_path_buf(),
        },
        Some(file) => file.to_path_buf(),
    }
}

/// Create a backup of the original file.
fn backup_file(path: &Path) -> Result<PathBuf> {
    let backup_path = path.with_extension(format!(
        "{}.bak",
        path.extension().unwrap_or_default().to_string_lossy()
    ));

    if !backup_path.exists() {
        std::fs::copy(path, &backup_path).context("Failed to create backup")?;
        log::debug!("Backup created: {}", backup_path.display());
    }

    Ok(backup_path)
}
