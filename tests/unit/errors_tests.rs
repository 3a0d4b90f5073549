/*!
 * Tests for error types and conversions
 */

use lingoclip::errors::{MediaError, SelectionError, Stage, StageContext};

#[test]
fn test_mediaError_composition_shouldDisplayDurations() {
    let error = MediaError::Composition {
        expected: 12.0,
        actual: 13.25,
        message: "stacked drifted".to_string(),
    };
    let display = format!("{}", error);
    assert!(display.contains("12.000"));
    assert!(display.contains("13.250"));
    assert!(display.contains("stacked drifted"));
}

#[test]
fn test_mediaError_tool_shouldDisplayExitCodeAndDiagnostic() {
    let error = MediaError::Tool {
        tool: "ffmpeg".to_string(),
        exit_code: Some(1),
        diagnostic: "Invalid data found when processing input".to_string(),
    };
    let display = format!("{}", error);
    assert!(display.contains("ffmpeg"));
    assert!(display.contains("exit code 1"));
    assert!(display.contains("Invalid data"));

    let killed = MediaError::Tool {
        tool: "ffmpeg".to_string(),
        exit_code: None,
        diagnostic: String::new(),
    };
    assert!(format!("{}", killed).contains("exit code none"));
}

#[test]
fn test_mediaError_timeout_shouldBeRecognised() {
    let error = MediaError::Timeout {
        tool: "ffprobe".to_string(),
        secs: 30,
    };
    assert!(error.is_timeout());
    assert_eq!(format!("{}", error), "ffprobe timed out after 30s");
    assert!(!MediaError::Concatenation("x".to_string()).is_timeout());
}

#[test]
fn test_mediaError_fromIoError_shouldConvert() {
    let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "clip.mp4 missing");
    let error: MediaError = io_error.into();
    assert!(matches!(error, MediaError::Io(_)));
    assert!(format!("{}", error).contains("clip.mp4 missing"));
}

#[test]
fn test_mediaError_validation_shouldNamePathAndReason() {
    let error = MediaError::validation("/tmp/out.mp4", "empty file");
    let display = format!("{}", error);
    assert!(display.contains("out.mp4"));
    assert!(display.contains("empty file"));
}

#[test]
fn test_selectionError_shouldCarryIdStageAndSource() {
    let error = SelectionError::new("ep1-007", Stage::Concatenate, MediaError::Concatenation("no audio".to_string()));
    assert_eq!(error.selection_id, "ep1-007");
    assert_eq!(error.stage, Stage::Concatenate);

    let display = format!("{}", error);
    assert!(display.contains("ep1-007"));
    assert!(display.contains("concatenate"));
    assert!(display.contains("no audio"));

    let source = std::error::Error::source(&error).map(|s| s.to_string());
    assert_eq!(source.as_deref(), Some("Concatenation error: no audio"));
}

#[test]
fn test_stageContext_withError_shouldWrapIntoSelectionError() {
    let result: Result<(), MediaError> = Err(MediaError::Synchronization("no subtitle lines".to_string()));
    let wrapped = result.at_stage("s1", Stage::Synchronize).unwrap_err();
    assert_eq!(wrapped.stage, Stage::Synchronize);
    assert_eq!(wrapped.selection_id, "s1");

    let ok: Result<u32, MediaError> = Ok(7);
    assert_eq!(ok.at_stage("s1", Stage::Extract).unwrap(), 7);
}

#[test]
fn test_stage_shouldSerializeAsSnakeCase() {
    assert_eq!(serde_json::to_string(&Stage::Worker).unwrap(), "\"worker\"");
    assert_eq!(Stage::Publish.to_string(), "publish");
    let parsed: Stage = serde_json::from_str("\"layout\"").unwrap();
    assert_eq!(parsed, Stage::Layout);
}
