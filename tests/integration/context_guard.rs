//! Integration tests for the extension context guard

use pagewire::error::{EligibilityError, FeatureError, GuardError};
use pagewire::guard::{ExtensionContextGuard, ManualRuntimeBinding};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[test]
fn test_classifies_invalidated_context_errors() {
    let invalidated = std::io::Error::new(
        std::io::ErrorKind::Other,
        "Error: Extension context invalidated.",
    );
    let type_error = std::io::Error::new(
        std::io::ErrorKind::Other,
        "TypeError: Cannot read properties of null (reading 'style')",
    );

    assert!(ExtensionContextGuard::is_context_error(&invalidated));
    assert!(!ExtensionContextGuard::is_context_error(&type_error));
}

#[test]
fn test_classifies_domain_errors_by_message() {
    let feature = FeatureError::ContextInvalidated("storage.local.get".to_string());
    let eligibility = EligibilityError::Unavailable("settings not loaded".to_string());

    assert!(ExtensionContextGuard::is_context_error(&feature));
    assert!(!ExtensionContextGuard::is_context_error(&eligibility));
    assert!(ExtensionContextGuard::is_context_error_message(
        "Could not establish connection. Receiving end does not exist."
    ));
}

#[tokio::test]
async fn test_run_guarded_latches_after_context_loss() {
    let binding = Arc::new(ManualRuntimeBinding::new("abcdefghijklmnop"));
    let guard = ExtensionContextGuard::new(binding.clone());
    let calls = AtomicUsize::new(0);

    let first: Result<Option<&str>, GuardError> = guard
        .run_guarded("runtime.sendMessage", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok("pong")
        })
        .await;
    assert_eq!(first, Ok(Some("pong")));

    let lost: Result<Option<&str>, GuardError> = guard
        .run_guarded("runtime.sendMessage", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(GuardError::ContextInvalidated {
                operation: "runtime.sendMessage".to_string(),
            })
        })
        .await;
    assert_eq!(lost, Ok(None));

    // A restored binding does not reopen the guard within the same document.
    binding.restore();
    let skipped: Result<Option<&str>, GuardError> = guard
        .run_guarded("runtime.sendMessage", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok("pong")
        })
        .await;
    assert_eq!(skipped, Ok(None));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert!(!guard.is_valid().await);
}

#[tokio::test]
async fn test_genuine_failures_pass_through() {
    let guard = ExtensionContextGuard::new(Arc::new(ManualRuntimeBinding::new("abc")));

    let result: Result<Option<()>, GuardError> = guard
        .run_guarded("storage.local.get", || async {
            Err(GuardError::RuntimeUnreachable("quota exceeded".to_string()))
        })
        .await;

    assert_eq!(
        result,
        Err(GuardError::RuntimeUnreachable("quota exceeded".to_string()))
    );
    assert!(guard.is_valid_sync());
}
