use anyhow::Result;

use super::{BinaryFile, Engine, ExifTags, ExifToolOptions, ExifToolOutput, Staging};
use crate::vfs::Node;

/// A fresh output path: 32 hex characters plus `.tmp`.
fn temp_output_path() -> String {
    format!("/{}.tmp", uuid::Uuid::new_v4().simple())
}

/// Write `tags` into a copy of `file` and return the copy's bytes.
///
/// Arguments: `options.args`, `-config PATH` when given, one `-TAG=VALUE`
/// per tag value, `-o TEMP`, then the input path. ExifTool writes the result
/// to `TEMP`, so the staged input is left untouched.
pub(super) async fn write(
    engine: &mut Engine,
    file: &BinaryFile,
    tags: &ExifTags,
    options: &ExifToolOptions,
) -> Result<ExifToolOutput<Vec<u8>>> {
    engine.begin().await?;
    let mut staging = Staging::new(&engine.fs);

    let input = staging.stage(file)?;
    let mut args = options.args.clone();
    if let Some(config) = &options.config {
        let config_path = staging.stage(config)?;
        args.push("-config".to_string());
        args.push(config_path);
    }
    args.extend(tags.to_args());

    let output = temp_output_path();
    staging.track(&output);
    args.push("-o".to_string());
    args.push(output.clone());
    args.push(input);

    let run = engine.exec(&args).await?;

    if let Some(failure) = run.failure() {
        log::debug!("Write failed: {:?}", failure.error());
        return Ok(failure);
    }

    match engine.fs.lookup(&output) {
        Some(Node::File { content }) => {
            log::debug!("Wrote {} tag(s), {} bytes", tags.len(), content.len());
            Ok(ExifToolOutput::Success { data: content.to_vec() })
        }
        _ => Ok(ExifToolOutput::failure(
            format!("Temporary output file not found: {output}"),
            Some(0),
        )),
    }
}
