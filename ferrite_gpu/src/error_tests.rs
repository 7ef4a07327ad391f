//! Unit tests for error.rs
//!
//! Tests all Error variants and their implementations (Display, Debug, Clone, std::error::Error).

use crate::error::{lock, Error, Result};
use std::sync::{Arc, Mutex};

// ============================================================================
// ERROR DISPLAY TESTS
// ============================================================================

#[test]
fn test_resource_exhausted_display() {
    let err = Error::ResourceExhausted("descriptor pool limit reached".to_string());
    let display = format!("{}", err);
    assert!(display.contains("Resource exhausted"));
    assert!(display.contains("descriptor pool limit reached"));
}

#[test]
fn test_invalid_usage_display() {
    let err = Error::InvalidUsage("begin() called twice".to_string());
    let display = format!("{}", err);
    assert!(display.contains("Invalid usage"));
    assert!(display.contains("begin() called twice"));
}

#[test]
fn test_unsupported_operation_display() {
    let err = Error::UnsupportedOperation("resolve".to_string());
    assert_eq!(format!("{}", err), "Unsupported operation: resolve");
}

#[test]
fn test_backend_failure_display() {
    let err = Error::BackendFailure("VK_ERROR_DEVICE_LOST".to_string());
    let display = format!("{}", err);
    assert!(display.contains("Backend failure"));
    assert!(display.contains("VK_ERROR_DEVICE_LOST"));
}

// ============================================================================
// ACCESSORS
// ============================================================================

#[test]
fn test_error_class_names() {
    assert_eq!(Error::ResourceExhausted(String::new()).class(), "ResourceExhausted");
    assert_eq!(Error::InvalidUsage(String::new()).class(), "InvalidUsage");
    assert_eq!(Error::UnsupportedOperation(String::new()).class(), "UnsupportedOperation");
    assert_eq!(Error::BackendFailure(String::new()).class(), "BackendFailure");
}

#[test]
fn test_error_message() {
    let err = Error::InvalidUsage("wrong thread".to_string());
    assert_eq!(err.message(), "wrong thread");
}

// ============================================================================
// ERROR TRAIT IMPLEMENTATIONS
// ============================================================================

#[test]
fn test_error_is_std_error() {
    let err = Error::BackendFailure("x".to_string());
    let _: &dyn std::error::Error = &err;
}

#[test]
fn test_error_clone() {
    let err1 = Error::ResourceExhausted("pool".to_string());
    let err2 = err1.clone();
    assert_eq!(format!("{}", err1), format!("{}", err2));
}

#[test]
fn test_error_debug() {
    let debug = format!("{:?}", Error::InvalidUsage("state".to_string()));
    assert!(debug.contains("InvalidUsage"));
}

#[test]
fn test_result_propagation() {
    fn inner() -> Result<u32> {
        Err(Error::UnsupportedOperation("blit".to_string()))
    }
    fn outer() -> Result<u32> {
        let value = inner()?;
        Ok(value + 1)
    }
    assert!(matches!(outer(), Err(Error::UnsupportedOperation(_))));
}

// ============================================================================
// LOCK HELPER
// ============================================================================

#[test]
fn test_lock_helper_ok() {
    let mutex = Mutex::new(5u32);
    let guard = lock(&mutex, "value").unwrap();
    assert_eq!(*guard, 5);
}

#[test]
fn test_lock_helper_reports_poison() {
    let mutex = Arc::new(Mutex::new(0u32));
    let poisoned = Arc::clone(&mutex);
    let _ = std::thread::spawn(move || {
        let _guard = poisoned.lock().unwrap();
        panic!("poison the lock");
    })
    .join();

    match lock(&mutex, "counter") {
        Err(Error::BackendFailure(msg)) => assert!(msg.contains("counter")),
        other => panic!("expected BackendFailure, got {:?}", other.map(|g| *g)),
    };
}
