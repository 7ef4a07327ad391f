//! Unit tests for log.rs
//!
//! Tests Logger trait, LogEntry, LogSeverity, DefaultLogger and the global sink.

use crate::log::{DefaultLogger, Log, LogEntry, LogSeverity, Logger};
use crate::test_support::CaptureLogger;
use serial_test::serial;
use std::time::SystemTime;

// ============================================================================
// LOG SEVERITY TESTS
// ============================================================================

#[test]
fn test_log_severity_ordering() {
    assert!(LogSeverity::Trace < LogSeverity::Debug);
    assert!(LogSeverity::Debug < LogSeverity::Info);
    assert!(LogSeverity::Info < LogSeverity::Warn);
    assert!(LogSeverity::Warn < LogSeverity::Error);
}

#[test]
fn test_log_severity_labels_have_fixed_width() {
    for severity in [
        LogSeverity::Trace,
        LogSeverity::Debug,
        LogSeverity::Info,
        LogSeverity::Warn,
        LogSeverity::Error,
    ] {
        assert_eq!(severity.label().len(), 5);
    }
}

// ============================================================================
// DEFAULT LOGGER TESTS
// ============================================================================

fn entry(severity: LogSeverity, file: Option<&'static str>, line: Option<u32>) -> LogEntry {
    LogEntry {
        severity,
        timestamp: SystemTime::now(),
        source: "ferrite::test".to_string(),
        message: "something happened".to_string(),
        file,
        line,
    }
}

#[test]
fn test_default_logger_plain_format() {
    let line = DefaultLogger::format_plain(&entry(LogSeverity::Warn, None, None));
    assert!(line.contains("[WARN ]"));
    assert!(line.contains("[ferrite::test]"));
    assert!(line.ends_with("something happened"));
}

#[test]
fn test_default_logger_plain_format_with_location() {
    let line = DefaultLogger::format_plain(&entry(LogSeverity::Error, Some("cache.rs"), Some(42)));
    assert!(line.contains("[ERROR]"));
    assert!(line.ends_with("(cache.rs:42)"));
}

#[test]
fn test_default_logger_does_not_panic() {
    let logger = DefaultLogger;
    logger.log(&entry(LogSeverity::Trace, None, None));
    logger.log(&entry(LogSeverity::Error, Some("file.rs"), Some(1)));
}

// ============================================================================
// GLOBAL SINK TESTS
// ============================================================================

#[test]
#[serial]
fn test_custom_logger_receives_macro_output() {
    let capture = CaptureLogger::install();

    crate::ferrite_warn!("ferrite::test", "slot {} skipped", 7);
    crate::ferrite_info!("ferrite::test", "info line");

    let warnings = capture.messages_at(LogSeverity::Warn);
    assert!(warnings.iter().any(|m| m == "slot 7 skipped"));
    assert!(capture
        .messages_at(LogSeverity::Info)
        .iter()
        .any(|m| m == "info line"));

    Log::reset_logger();
}

#[test]
#[serial]
fn test_error_macro_records_location() {
    let capture = CaptureLogger::install();

    crate::ferrite_error!("ferrite::test", "boom");

    let entries = capture.entries();
    let boom = entries
        .iter()
        .find(|e| e.message == "boom")
        .expect("error entry captured");
    assert_eq!(boom.severity, LogSeverity::Error);
    assert!(boom.file.is_some());
    assert!(boom.line.is_some());

    Log::reset_logger();
}

#[test]
#[serial]
fn test_err_macro_builds_backend_failure() {
    let capture = CaptureLogger::install();

    let err = crate::ferrite_err!("ferrite::test", "create failed: {}", -3);
    assert!(matches!(err, crate::Error::BackendFailure(ref m) if m == "create failed: -3"));
    assert!(capture
        .messages_at(LogSeverity::Error)
        .iter()
        .any(|m| m == "create failed: -3"));

    Log::reset_logger();
}

#[test]
#[serial]
fn test_invalid_macro_returns_invalid_usage() {
    fn check(flag: bool) -> crate::Result<()> {
        if !flag {
            crate::ferrite_invalid!("ferrite::test", "flag must be set");
        }
        Ok(())
    }

    let _capture = CaptureLogger::install();
    assert!(check(true).is_ok());
    assert!(matches!(check(false), Err(crate::Error::InvalidUsage(_))));
    Log::reset_logger();
}
