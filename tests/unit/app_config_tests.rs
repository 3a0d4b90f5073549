/*!
 * Tests for application configuration functionality
 */

use anyhow::Result;
use lingoclip::app_config::{
    Config, ConcatPreference, ExtractionStrategy, LogLevel, ShortArrangement, SlideMode, WideArrangement,
};
use lingoclip::models::Resolution;

use crate::common;

/// Test default configuration values
#[test]
fn test_default_config_withNoParameters_shouldHaveCorrectDefaults() {
    let config = Config::default();

    assert_eq!(config.quality.fps, 24);
    assert_eq!(config.quality.resolution, Resolution::new(1920, 1080));
    assert_eq!(config.quality.video_codec, "libx264");
    assert_eq!(config.quality.preset, "veryfast");
    assert_eq!(config.quality.crf, 20);
    assert_eq!(config.quality.audio_bitrate_kbps, 192);
    assert_eq!(config.quality.sample_rate, 48000);

    assert_eq!(config.extraction.strategy, ExtractionStrategy::Auto);
    assert_eq!(config.extraction.copy_threshold_secs, 30.0);
    assert_eq!(config.concat.preference, ConcatPreference::Auto);
    assert_eq!(config.repeat_count, 3);
    assert!(config.overlay.burn_subtitles);

    assert_eq!(config.slide.mode, SlideMode::PerExpression);
    assert_eq!(config.slide.sequential_duration_secs, 5.0);
    assert_eq!(config.transition.duration_secs, 1.0);
    assert_eq!(config.wide_form.arrangement, WideArrangement::SideBySide);
    assert_eq!(config.short_form.arrangement, ShortArrangement::Stacked);
    assert_eq!(config.short_form.resolution, Resolution::new(1080, 1920));
    assert_eq!(config.short_form.max_batch_duration_secs, 120.0);
    assert_eq!(config.short_form.hard_cap_secs, 180.0);
    assert_eq!(config.short_form.duration_tolerance_secs, 0.5);
    assert_eq!(config.short_form.preserve_max_duration_secs, 60.0);

    assert_eq!(config.audio_gain_percent, 100.0);
    assert_eq!(config.concurrency.cpu_fraction, 0.5);
    assert_eq!(config.tool.timeout_secs, 600);
    assert_eq!(config.log_level, LogLevel::Info);
    assert!(config.validate().is_ok());
}

/// Test configuration validation
#[test]
fn test_config_validation_withOutOfRangeValues_shouldFail() {
    let cases: Vec<Box<dyn Fn(&mut Config)>> = vec![
        Box::new(|c| c.quality.video_codec = "mpeg2video".to_string()),
        Box::new(|c| c.quality.crf = 52),
        Box::new(|c| c.quality.preset = "ludicrous".to_string()),
        Box::new(|c| c.quality.fps = 0),
        Box::new(|c| c.quality.resolution = Resolution::new(1921, 1080)),
        Box::new(|c| c.quality.sample_rate = 12345),
        Box::new(|c| c.repeat_count = 0),
        Box::new(|c| c.repeat_count = 6),
        Box::new(|c| c.overlay.highlight_color = "yellow".to_string()),
        Box::new(|c| c.slide.background_color = "#000000".to_string()),
        Box::new(|c| c.transition.duration_secs = 0.0),
        Box::new(|c| c.short_form.resolution = Resolution::new(1920, 1080)),
        Box::new(|c| c.short_form.max_batch_duration_secs = 200.0),
        Box::new(|c| c.audio_gain_percent = -5.0),
        Box::new(|c| c.concurrency.cpu_fraction = 0.0),
        Box::new(|c| c.concurrency.cpu_fraction = 1.5),
        Box::new(|c| c.tool.timeout_secs = 0),
    ];

    for (i, mutate) in cases.iter().enumerate() {
        let mut config = Config::default();
        mutate(&mut config);
        assert!(config.validate().is_err(), "case {} should be rejected", i);
    }
}

/// Boundary values are accepted
#[test]
fn test_config_validation_withBoundaryValues_shouldPass() {
    let mut config = Config::default();
    config.quality.video_codec = "libx265".to_string();
    config.quality.crf = 51;
    config.repeat_count = 5;
    config.audio_gain_percent = 0.0;
    config.concurrency.cpu_fraction = 1.0;
    config.short_form.max_batch_duration_secs = config.short_form.hard_cap_secs;
    assert!(config.validate().is_ok());
}

/// Partial JSON files fall back to defaults for everything they omit
#[test]
fn test_from_file_withPartialJson_shouldFillDefaults() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let path = temp_dir.path().join("lingoclip.json");
    std::fs::write(
        &path,
        r#"{
            "quality": { "fps": 30, "preset": "fast" },
            "extraction": { "strategy": "encode" },
            "short_form": { "arrangement": "letterboxed" },
            "log_level": "debug"
        }"#,
    )?;

    let config = Config::from_file(&path)?;
    assert_eq!(config.quality.fps, 30);
    assert_eq!(config.quality.preset, "fast");
    assert_eq!(config.quality.crf, 20);
    assert_eq!(config.extraction.strategy, ExtractionStrategy::Encode);
    assert_eq!(config.extraction.copy_threshold_secs, 30.0);
    assert_eq!(config.short_form.arrangement, ShortArrangement::Letterboxed);
    assert_eq!(config.short_form.hard_cap_secs, 180.0);
    assert_eq!(config.log_level, LogLevel::Debug);
    assert!(config.validate().is_ok());
    Ok(())
}

/// Malformed files are reported with the offending path
#[test]
fn test_from_file_withInvalidJson_shouldFail() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let path = temp_dir.path().join("broken.json");
    std::fs::write(&path, "{ not json")?;

    let error = Config::from_file(&path).unwrap_err();
    assert!(format!("{:#}", error).contains("broken.json"));
    assert!(Config::from_file(temp_dir.path().join("missing.json")).is_err());
    Ok(())
}

/// Strategy names parse case-insensitively
#[test]
fn test_extraction_strategy_fromStr_shouldParseKnownNames() {
    assert_eq!("COPY".parse::<ExtractionStrategy>().unwrap(), ExtractionStrategy::Copy);
    assert_eq!("encode".parse::<ExtractionStrategy>().unwrap(), ExtractionStrategy::Encode);
    assert_eq!("Auto".parse::<ExtractionStrategy>().unwrap(), ExtractionStrategy::Auto);
    assert!("stream".parse::<ExtractionStrategy>().is_err());
    assert_eq!(ExtractionStrategy::Copy.to_string(), "copy");
}

/// An explicit work directory wins over the cache default
#[test]
fn test_resolved_work_dir_withExplicitDir_shouldUseIt() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let config = common::test_config(temp_dir.path());
    assert_eq!(config.resolved_work_dir(), temp_dir.path());

    let default_dir = Config::default().resolved_work_dir();
    assert!(default_dir.ends_with("lingoclip/work"));
    Ok(())
}
