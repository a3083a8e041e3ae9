/*!
 * Tests for error types and conversions
 */

use epubwai::errors::{AppError, ContainerError, ProviderError, SegmentError, SegmentationError, TranslationError};

#[test]
fn test_providerError_apiError_shouldDisplayStatusAndMessage() {
    let error = ProviderError::ApiError {
        status_code: 503,
        message: "Service unavailable".to_string(),
    };
    let display = format!("{}", error);
    assert!(display.contains("503"));
    assert!(display.contains("Service unavailable"));
}

#[test]
fn test_providerError_batchMismatch_shouldDisplayCounts() {
    let error = ProviderError::BatchMismatch { sent: 5, received: 4 };
    assert_eq!(error.to_string(), "Batch size mismatch: sent 5, received 4");
}

#[test]
fn test_providerError_isTransient_shouldSeparateRetryableErrors() {
    assert!(ProviderError::Timeout("slow".to_string()).is_transient());
    assert!(ProviderError::ConnectionError("reset".to_string()).is_transient());
    assert!(ProviderError::BatchMismatch { sent: 2, received: 1 }.is_transient());
    assert!(
        ProviderError::ApiError {
            status_code: 502,
            message: String::new()
        }
        .is_transient()
    );

    assert!(!ProviderError::AuthenticationError("bad key".to_string()).is_transient());
    assert!(
        !ProviderError::ApiError {
            status_code: 400,
            message: "bad request".to_string()
        }
        .is_transient()
    );
}

#[test]
fn test_providerError_fromStatus_shouldClassifyHttpCodes() {
    assert!(matches!(
        ProviderError::from_status(401, "no".to_string()),
        ProviderError::AuthenticationError(_)
    ));
    assert!(matches!(
        ProviderError::from_status(429, "slow down".to_string()),
        ProviderError::RateLimitExceeded { retry_after_secs: None, .. }
    ));
    assert!(matches!(
        ProviderError::from_status(500, "boom".to_string()),
        ProviderError::ApiError { status_code: 500, .. }
    ));
}

#[test]
fn test_translationError_fromProviderError_shouldWrapCorrectly() {
    let provider_error = ProviderError::RequestFailed("Test error".to_string());
    let translation_error: TranslationError = provider_error.into();
    let display = format!("{}", translation_error);
    assert!(display.contains("Provider error"));
    assert!(display.contains("Test error"));
}

#[test]
fn test_segmentError_shouldNameTheSegment() {
    let error = SegmentError::PlaceholderIntegrity {
        segment_index: 7,
        reason: "missing tokens {NUM_0}".to_string(),
    };
    let display = error.to_string();
    assert!(display.contains("segment 7"));
    assert!(display.contains("{NUM_0}"));
}

#[test]
fn test_appError_reasonCode_shouldReflectTheFailureKind() {
    let unsafe_input: AppError = ContainerError::UnsafeInput("zip bomb".to_string()).into();
    assert_eq!(unsafe_input.reason_code(), "unsafe_input");

    let invalid: AppError = ContainerError::InvalidEpub("no rootfile".to_string()).into();
    assert_eq!(invalid.reason_code(), "container_error");

    let mismatch: AppError = SegmentationError::Mismatch {
        stage: "restore".to_string(),
        segments: 3,
        entries: 4,
    }
    .into();
    assert_eq!(mismatch.reason_code(), "segmentation_mismatch");

    let translation: AppError = TranslationError::NoBackend("fr".to_string()).into();
    assert_eq!(translation.reason_code(), "translation_error");
}

#[test]
fn test_appError_fromIoError_shouldWrapAsFileError() {
    let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "File not found");
    let app_error: AppError = io_error.into();
    let display = format!("{}", app_error);
    assert!(display.contains("File error"));
    assert!(display.contains("File not found"));
    assert_eq!(app_error.reason_code(), "file_error");
}

#[test]
fn test_appError_fromAnyhowError_shouldWrapAsUnknown() {
    let anyhow_error = anyhow::anyhow!("Something went wrong");
    let app_error: AppError = anyhow_error.into();
    let display = format!("{}", app_error);
    assert!(display.contains("Unknown error"));
    assert!(display.contains("Something went wrong"));
}

#[test]
fn test_containerError_fromZipError_shouldWrap() {
    let error: ContainerError = zip::result::ZipError::FileNotFound.into();
    assert!(error.to_string().starts_with("ZIP error"));
}
