use std::time::Duration;
use super::*;
use crate::utils::RetryStrategy;

#[test]
fn test_upload_status_transition() {
    use UploadStatus::*;

    // valid
    assert!(UploadStatus::is_valid_transition(Pending, Uploading));
    assert!(UploadStatus::is_valid_transition(Uploading, Paused));
    assert!(UploadStatus::is_valid_transition(Paused, Uploading));
    assert!(UploadStatus::is_valid_transition(Uploading, Completed));
    assert!(UploadStatus::is_valid_transition(Uploading, Error));
    assert!(UploadStatus::is_valid_transition(Error, Uploading));
    assert!(UploadStatus::is_valid_transition(Paused, Pending));

    // invalid
    assert!(!UploadStatus::is_valid_transition(Completed, Uploading));
    assert!(!UploadStatus::is_valid_transition(Completed, Pending));
    assert!(!UploadStatus::is_valid_transition(Pending, Paused));
    assert!(!UploadStatus::is_valid_transition(Pending, Completed));
    assert!(!UploadStatus::is_valid_transition(Error, Paused));
}

#[test]
fn test_total_chunks() {
    assert_eq!(total_chunks(0, 100), 0);
    assert_eq!(total_chunks(1, 100), 1);
    assert_eq!(total_chunks(100, 100), 1);
    assert_eq!(total_chunks(101, 100), 2);
    assert_eq!(total_chunks(12 * 1024 * 1024, 5 * 1024 * 1024), 3);
    assert_eq!(total_chunks(10, 0), 0);
}

#[test]
fn test_chunk_ranges_cover_file() {
    let size = 12 * 1024 * 1024 + 7;
    let plan = ChunkPlan::new(size, 5 * 1024 * 1024);

    let mut covered = 0;
    for index in 0..plan.total_chunks {
        let (start, end) = plan.chunk_range(index, size);
        assert_eq!(start, covered);
        assert!(end > start);
        covered = end;
    }
    assert_eq!(covered, size);
    assert_eq!(plan.chunk_range(plan.total_chunks, size), (size, size));
}

#[test]
fn test_progress_percent() {
    assert_eq!(chunk_percent(0, 3), 0);
    assert_eq!(chunk_percent(1, 3), 33);
    assert_eq!(chunk_percent(2, 3), 66);
    assert_eq!(chunk_percent(3, 3), 100);
    assert_eq!(chunk_percent(5, 3), 100);
    assert_eq!(chunk_percent(0, 0), 0);

    assert_eq!(tick_percent(1, 10), 9);
    assert_eq!(tick_percent(10, 10), SIMULATED_CEILING);
    assert_eq!(tick_percent(3, 4), 67);
    assert_eq!(tick_percent(1, 0), 0);
}

#[test]
fn test_progress_reporter_monotonic() {
    let mut reporter = ProgressReporter::new();

    assert_eq!(reporter.advance(30), 30);
    assert_eq!(reporter.advance(10), 30);
    assert_eq!(reporter.advance(66), 66);
    assert_eq!(reporter.advance(250), 100);
    assert_eq!(reporter.last(), 100);

    let mut reporter = ProgressReporter::new();
    reporter.advance(90);
    assert_eq!(reporter.complete(), 100);
}

#[test]
fn test_upload_config_defaults() {
    let config = UploadConfig::default();

    assert_eq!(config.chunk_size_bytes, 5 * 1024 * 1024);
    assert_eq!(config.retry_count, 3);
    assert_eq!(config.retry_delay, Duration::from_secs(1));
    assert_eq!(config.max_concurrent_uploads, 1);
    assert!(config.validate().is_ok());
    assert_eq!(config.retry_strategy(), RetryStrategy::Fixed(Duration::from_secs(1)));
}

#[test]
fn test_upload_config_from_toml() {
    let config: UploadConfig = toml::from_str(
        r#"
        chunk_size_bytes = 1048576
        retry_delay_ms = 250

        [retry_backoff]
        kind = "exponential"
        multiplier = 2.0
        max_delay_ms = 4000
        "#,
    )
    .unwrap();

    assert_eq!(config.chunk_size_bytes, 1024 * 1024);
    assert_eq!(config.retry_count, 3);
    assert_eq!(config.retry_delay, Duration::from_millis(250));
    assert_eq!(
        config.retry_strategy(),
        RetryStrategy::Exponential {
            initial: Duration::from_millis(250),
            multiplier: 2.0,
            max_delay: Duration::from_secs(4),
        }
    );
}

#[test]
fn test_invalid_configs_rejected() {
    let config = UploadConfig {
        chunk_size_bytes: 0,
        ..Default::default()
    };
    assert!(matches!(config.validate(), Err(UploadError::InvalidConfig(_))));

    let config = UploadConfig {
        retry_backoff: RetryBackoff::Exponential {
            multiplier: 0.5,
            max_delay: Duration::from_secs(1),
        },
        ..Default::default()
    };
    assert!(config.validate().is_err());

    let thumbnail = ThumbnailConfig {
        quality: 1.5,
        ..Default::default()
    };
    assert!(thumbnail.validate().is_err());

    let thumbnail = ThumbnailConfig {
        target_dimensions: vec![],
        ..Default::default()
    };
    assert!(thumbnail.validate().is_err());
}

#[test]
fn test_thumbnail_bounds_follow_orientation() {
    let config = ThumbnailConfig::default();

    assert_eq!(config.bounds_for(4000, 3000), (480, 360));
    assert_eq!(config.bounds_for(1080, 1920), (360, 480));

    let single = ThumbnailConfig {
        target_dimensions: vec![(480, 360)],
        ..Default::default()
    };
    assert_eq!(single.bounds_for(1080, 1920), (480, 360));
}

#[test]
fn test_preview_data_url() {
    let preview = PreviewImage {
        data: bytes::Bytes::from_static(b"abc"),
        mime_type: "image/jpeg".to_string(),
        width: 1,
        height: 1,
    };
    assert_eq!(preview.to_data_url(), "data:image/jpeg;base64,YWJj");
}

#[test]
fn test_retryable_errors() {
    assert!(UploadError::transport("reset").is_retryable());
    assert!(UploadError::server_error(503, "busy").is_retryable());
    assert!(UploadError::server_error(500, "oops").is_retryable());
    assert!(UploadError::server_error(429, "slow down").is_retryable());
    assert!(UploadError::server_error(408, "timeout").is_retryable());
    assert!(!UploadError::server_error(401, "unauthorized").is_retryable());
    assert!(!UploadError::server_error(404, "missing").is_retryable());
    assert!(!UploadError::server_error(413, "too large").is_retryable());
    assert!(UploadError::NotReceived { chunk_index: 2 }.is_retryable());
    assert!(!UploadError::Aborted.is_retryable());
    assert!(!UploadError::NoFile.is_retryable());
    assert!(UploadError::Aborted.is_aborted());

    let err = UploadError::InvalidTransition {
        from: UploadStatus::Completed,
        action: "cancel",
    };
    assert_eq!(err.to_string(), "Cannot cancel while completed");
}
