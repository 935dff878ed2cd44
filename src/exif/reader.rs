use anyhow::Result;

use super::{BinaryFile, Engine, ExifToolOptions, ExifToolOutput, Staging};

/// Run ExifTool over `file` and hand its stdout to `transform`.
///
/// Arguments: `options.args`, then `-config PATH` when a config file is given,
/// then the input path.
pub(super) async fn parse<T>(
    engine: &mut Engine,
    file: &BinaryFile,
    options: &ExifToolOptions,
    transform: impl FnOnce(String) -> Result<T>,
) -> Result<ExifToolOutput<T>> {
    engine.begin().await?;
    let mut staging = Staging::new(&engine.fs);

    let input = staging.stage(file)?;
    let mut args = options.args.clone();
    if let Some(config) = &options.config {
        let config_path = staging.stage(config)?;
        args.push("-config".to_string());
        args.push(config_path);
    }
    args.push(input);

    let run = engine.exec(&args).await?;

    if let Some(failure) = run.failure() {
        log::debug!("Read failed: {:?}", failure.error());
        return Ok(failure);
    }

    if run.stdout.trim().is_empty() {
        return Ok(ExifToolOutput::failure("No output data from ExifTool", Some(0)));
    }

    Ok(ExifToolOutput::Success { data: transform(run.stdout)? })
}

#[cfg(test)]
mod tests {
    use super::super::testing::{simulated_exiftool, FakeExifTool, Reply};
    use super::super::ExifTool;
    use super::*;
    use crate::runtime::RunOutcome;

    fn jpeg() -> BinaryFile {
        BinaryFile::new("test.jpg", vec![0xFF, 0xD8, 0xFF, 0xE0, 0xFF, 0xD9])
    }

    async fn read(tool: &ExifTool, options: ExifToolOptions) -> ExifToolOutput<String> {
        tool.parse_metadata(&jpeg(), &options).await.unwrap()
    }

    #[tokio::test]
    async fn returns_stdout_on_success() {
        let fake = FakeExifTool::new(simulated_exiftool);
        let out = read(&fake.tool(), ExifToolOptions::default()).await;

        assert!(out.is_success());
        assert_eq!(out.exit_code(), Some(0));
        assert!(out.data().unwrap().contains("File Name"));
        assert!(out.data().unwrap().contains("test.jpg"));
    }

    #[tokio::test]
    async fn argument_order_and_config() {
        let fake = FakeExifTool::new(simulated_exiftool);
        let options = ExifToolOptions::with_args(["-json", "-n"])
            .config(BinaryFile::new("my.config", b"1;".to_vec()));
        let out = read(&fake.tool(), options).await;

        assert!(out.is_success());
        assert_eq!(
            fake.calls(),
            vec![vec!["-json", "-n", "-config", "/my.config", "/test.jpg"]]
        );
    }

    #[tokio::test]
    async fn temporary_files_are_removed() {
        let fake = FakeExifTool::new(|_, ctx| {
            assert!(ctx.fs.contains_file("/test.jpg"));
            assert!(ctx.fs.contains_file("/cfg"));
            Reply::stdout("ok")
        });
        let options = ExifToolOptions::default().config(BinaryFile::new("cfg", b"1;".to_vec()));
        read(&fake.tool(), options).await;

        let fs = fake.fs().unwrap();
        assert!(!fs.contains_file("/test.jpg"));
        assert!(!fs.contains_file("/cfg"));
        assert!(fs.contains_file("/exiftool"));
    }

    #[tokio::test]
    async fn nonzero_exit_reports_stderr() {
        let fake = FakeExifTool::new(|_, _| Reply::exit(1, "Error: Unknown file type - /test.jpg\n"));
        let out = read(&fake.tool(), ExifToolOptions::default()).await;

        assert_eq!(
            out,
            ExifToolOutput::Failure {
                error: "Error: Unknown file type - /test.jpg\n".into(),
                exit_code: Some(1),
            }
        );
    }

    #[tokio::test]
    async fn interpreter_error_takes_precedence() {
        let fake = FakeExifTool::new(|_, _| {
            Reply::exit(255, "some stderr").last_error("Can't locate Image/ExifTool.pm in @INC")
        });
        let out = read(&fake.tool(), ExifToolOptions::default()).await;

        assert_eq!(out.error(), Some("Can't locate Image/ExifTool.pm in @INC"));
        assert_eq!(out.exit_code(), Some(255));
    }

    #[tokio::test]
    async fn aborted_run_without_messages() {
        let fake = FakeExifTool::new(|_, _| Reply::stdout("").outcome(RunOutcome::aborted()));
        let out = read(&fake.tool(), ExifToolOptions::default()).await;

        assert_eq!(
            out,
            ExifToolOutput::Failure { error: "Unknown error".into(), exit_code: None }
        );
    }

    #[tokio::test]
    async fn warnings_on_stderr_fail_with_exit_zero() {
        let fake = FakeExifTool::new(|_, _| {
            let mut reply = Reply::stdout("Artist : x\n");
            reply.stderr = b"Warning: [minor] Bad format\n".to_vec();
            reply
        });
        let out = read(&fake.tool(), ExifToolOptions::default()).await;

        assert_eq!(out.error(), Some("Warning: [minor] Bad format\n"));
        assert_eq!(out.exit_code(), Some(0));
    }

    #[tokio::test]
    async fn blank_stderr_is_ignored() {
        let fake = FakeExifTool::new(|_, _| {
            let mut reply = Reply::stdout("Artist : x\n");
            reply.stderr = b" \n".to_vec();
            reply
        });
        assert!(read(&fake.tool(), ExifToolOptions::default()).await.is_success());
    }

    #[tokio::test]
    async fn blank_stdout_is_a_failure() {
        let fake = FakeExifTool::new(|_, _| Reply::stdout("  \n"));
        let out = read(&fake.tool(), ExifToolOptions::default()).await;

        assert_eq!(out.error(), Some("No output data from ExifTool"));
        assert_eq!(out.exit_code(), Some(0));
    }

    #[tokio::test]
    async fn output_from_previous_call_does_not_leak() {
        let fake = FakeExifTool::new(|args, _| {
            if args.iter().any(|a| a == "-fail") {
                Reply::exit(1, "first failure")
            } else {
                Reply::stdout("second")
            }
        });
        let tool = fake.tool();
        read(&tool, ExifToolOptions::with_args(["-fail"])).await;
        let out = read(&tool, ExifToolOptions::default()).await;
        assert_eq!(out.data().map(String::as_str), Some("second"));
    }

    #[tokio::test]
    async fn transform_is_applied() {
        let fake = FakeExifTool::new(|_, _| Reply::stdout("abc"));
        let out = fake
            .tool()
            .parse_metadata_with(&jpeg(), &ExifToolOptions::default(), |s| Ok(s.len()))
            .await
            .unwrap();
        assert_eq!(out.data(), Some(&3));
    }

    #[tokio::test]
    async fn transform_error_propagates_and_still_cleans_up() {
        let fake = FakeExifTool::new(|_, _| Reply::stdout("not json"));
        let result = fake
            .tool()
            .parse_metadata_json::<serde_json::Value>(&jpeg(), &ExifToolOptions::default())
            .await;

        assert!(result.is_err());
        assert!(!fake.fs().unwrap().contains_file("/test.jpg"));
    }

    #[tokio::test]
    async fn json_helper_adds_flag_once() {
        let fake = FakeExifTool::new(simulated_exiftool);
        let tool = fake.tool();

        let out = tool
            .parse_metadata_json::<serde_json::Value>(&jpeg(), &ExifToolOptions::default())
            .await
            .unwrap();
        assert_eq!(out.data().unwrap()[0]["SourceFile"], "/test.jpg");

        tool.parse_metadata_json::<serde_json::Value>(&jpeg(), &ExifToolOptions::with_args(["-json"]))
            .await
            .unwrap();
        let calls = fake.calls();
        assert_eq!(calls[0], vec!["-json", "/test.jpg"]);
        assert_eq!(calls[1], vec!["-json", "/test.jpg"]);
    }

    #[tokio::test]
    async fn multibyte_output_survives_chunking() {
        let fake = FakeExifTool::new(|_, _| Reply::stdout("Artist : 안녕하세요 こんにちは世界\n"));
        let out = read(&fake.tool(), ExifToolOptions::default()).await;
        let data = out.data().unwrap();
        assert!(data.contains("안녕하세요 こんにちは世界"));
        assert!(!data.contains(char::REPLACEMENT_CHARACTER));
    }
}
