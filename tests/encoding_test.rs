//! Text encoding round-trips through real processes
#![cfg(unix)]

use anyhow::Result;
use conduit_config::ExecutionConfig;
use conduit_execution::{cmd, PipeSource, PipeTarget, ProcessRunner, TextBuffer, TextEncoding};

const SAMPLE: &str = "plain ascii, café, naïve, €uro, 日本語 and 🦀";

#[tokio::test]
async fn test_buffered_utf8_round_trip() -> Result<()> {
    let result = cmd("cat")
        .with_standard_input_pipe(PipeSource::from_text(SAMPLE))
        .execute_buffered(())
        .await?;

    assert_eq!(result.stdout.as_deref(), Some(SAMPLE));
    assert_eq!(result.stderr.as_deref(), Some(""));
    Ok(())
}

#[tokio::test]
async fn test_buffered_utf16_round_trip() -> Result<()> {
    for encoding in [TextEncoding::Utf16Le, TextEncoding::Utf16Be] {
        let result = cmd("cat")
            .with_standard_input_pipe(PipeSource::from_text_with_encoding(SAMPLE, encoding))
            .execute_buffered_with_encoding(encoding, TextEncoding::Utf8, ())
            .await?;

        assert_eq!(result.stdout.as_deref(), Some(SAMPLE), "{}", encoding);
    }
    Ok(())
}

#[tokio::test]
async fn test_latin1_round_trip() -> Result<()> {
    let text = "déjà vu, über, £5";

    let result = cmd("cat")
        .with_standard_input_pipe(PipeSource::from_text_with_encoding(text, TextEncoding::Latin1))
        .execute_buffered_with_encoding(TextEncoding::Latin1, TextEncoding::Latin1, ())
        .await?;

    assert_eq!(result.stdout.as_deref(), Some(text));
    Ok(())
}

#[tokio::test]
async fn test_runner_default_encoding_applies_to_text_pipes() -> Result<()> {
    let runner = ProcessRunner::new(ExecutionConfig {
        default_encoding: TextEncoding::Utf16Le,
        ..ExecutionConfig::default()
    })?;
    let captured = TextBuffer::new();

    let command = cmd("cat")
        .with_standard_input_pipe(PipeSource::from_text(SAMPLE))
        .with_standard_output_pipe(PipeTarget::to_text(&captured));
    let result = runner.execute_buffered(&command, ()).await?;

    assert_eq!(captured.contents(), SAMPLE);
    assert_eq!(result.stdout.as_deref(), Some(SAMPLE));
    Ok(())
}

#[tokio::test]
async fn test_multibyte_sequences_split_across_reads() -> Result<()> {
    // A one-byte copy buffer splits every multi-byte character across reads
    let runner = ProcessRunner::new(ExecutionConfig {
        pipe_buffer_size: 1,
        ..ExecutionConfig::default()
    })?;
    let lines = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
    let sink = std::sync::Arc::clone(&lines);

    let command = cmd("cat")
        .with_standard_input_pipe(PipeSource::from_text(format!("{}\n{}", SAMPLE, SAMPLE)))
        .with_standard_output_pipe(PipeTarget::to_line_handler(move |line| {
            sink.lock().unwrap().push(line.to_string())
        }));
    let result = runner.execute_buffered(&command, ()).await?;

    assert_eq!(result.stdout, Some(format!("{}\n{}", SAMPLE, SAMPLE)));
    assert_eq!(*lines.lock().unwrap(), vec![SAMPLE, SAMPLE]);
    Ok(())
}

#[tokio::test]
async fn test_invalid_bytes_are_replaced() -> Result<()> {
    let result = cmd("cat")
        .with_standard_input_pipe(PipeSource::from_static(b"ok \xff\xfe end"))
        .execute_buffered(())
        .await?;

    assert_eq!(result.stdout.as_deref(), Some("ok \u{fffd}\u{fffd} end"));
    Ok(())
}
