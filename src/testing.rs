//! Testing utilities for provider implementations.
//!
//! This module provides scripted stand-ins for the remote control plane so
//! the waiter and reconciler can be exercised without an HTTP server, plus
//! assertion helpers for diagnostics and set diffs.
//!
//! # Example
//!
//! ```
//! use nimbus_provider_sdk::testing::ScriptedRefresh;
//! use nimbus_provider_sdk::waiter::{StateWaiter, WaitConfig};
//! use serde_json::json;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let refresh = ScriptedRefresh::new(vec![
//!     Ok(json!({"status": "PENDING"})),
//!     Ok(json!({"status": "ACTIVE"})),
//! ]);
//! let config = WaitConfig::for_available("status", &["ACTIVE"], &["ERROR"])
//!     .with_delay(std::time::Duration::from_millis(1))
//!     .with_interval(std::time::Duration::from_millis(1));
//!
//! let document = StateWaiter::new(&refresh, &config).wait().await.unwrap();
//! assert_eq!(document["status"], "ACTIVE");
//! assert_eq!(refresh.polls(), 2);
//! # }
//! ```

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::ProviderError;
use crate::reconcile::{SetDiff, SetOps, Tag};
use crate::schema::{Diagnostic, DiagnosticSeverity};
use crate::waiter::StateRefresh;

/// A [`StateRefresh`] that replays a fixed script of poll results.
///
/// Each call to `refresh` consumes the next entry. Polling past the end of
/// the script panics, so a test that loops more than it scripted fails
/// loudly instead of hanging.
pub struct ScriptedRefresh {
    script: Mutex<VecDeque<Result<Value, ProviderError>>>,
    repeat: Option<Value>,
    polls: AtomicUsize,
}

impl ScriptedRefresh {
    /// Replay `script` in order, one entry per poll.
    pub fn new(script: Vec<Result<Value, ProviderError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            repeat: None,
            polls: AtomicUsize::new(0),
        }
    }

    /// Return `document` on every poll, forever. Useful for timeout tests
    /// and for re-ticking a terminal document.
    pub fn pending_forever(document: Value) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            repeat: Some(document),
            polls: AtomicUsize::new(0),
        }
    }

    /// How many times the waiter polled.
    pub fn polls(&self) -> usize {
        self.polls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StateRefresh for ScriptedRefresh {
    async fn refresh(&self) -> Result<Value, ProviderError> {
        self.polls.fetch_add(1, Ordering::SeqCst);
        let next = {
            let mut script = self.script.lock().unwrap_or_else(|e| e.into_inner());
            script.pop_front()
        };
        match next {
            Some(result) => result,
            None => match &self.repeat {
                Some(document) => Ok(document.clone()),
                None => panic!("ScriptedRefresh polled after its script ended"),
            },
        }
    }
}

/// A [`SetOps`] implementation that records every call in order and can be
/// scripted to fail.
///
/// Each configured error is returned exactly once, on the first matching
/// call; subsequent calls succeed.
pub struct ScriptedSetOps {
    add_err: Mutex<Option<ProviderError>>,
    remove_err: Mutex<Option<ProviderError>>,
    calls: Mutex<Vec<(String, Vec<Tag>)>>,
}

impl ScriptedSetOps {
    /// Accept every call.
    pub fn accepting() -> Self {
        Self::new(None, None)
    }

    /// Fail the first add with `add_err` and the first remove with
    /// `remove_err`, if given.
    pub fn new(add_err: Option<ProviderError>, remove_err: Option<ProviderError>) -> Self {
        Self {
            add_err: Mutex::new(add_err),
            remove_err: Mutex::new(remove_err),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Every call made so far, as `("add" | "remove", members)` in order.
    pub fn calls(&self) -> Vec<(String, Vec<Tag>)> {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn record(&self, verb: &str, members: &[Tag]) {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((verb.to_string(), members.to_vec()));
    }
}

#[async_trait]
impl SetOps<Tag> for ScriptedSetOps {
    async fn add(&self, members: &[Tag]) -> Result<(), ProviderError> {
        self.record("add", members);
        match self.add_err.lock().unwrap_or_else(|e| e.into_inner()).take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn remove(&self, members: &[Tag]) -> Result<(), ProviderError> {
        self.record("remove", members);
        match self
            .remove_err
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
        {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

// =========================================================================
// Assertion Helpers
// =========================================================================

/// Assert that diagnostics contain no errors.
///
/// # Panics
///
/// Panics if there are any error diagnostics.
pub fn assert_no_errors(diagnostics: &[Diagnostic]) {
    let errors: Vec<_> = diagnostics
        .iter()
        .filter(|d| matches!(d.severity, DiagnosticSeverity::Error))
        .collect();

    assert!(
        errors.is_empty(),
        "Expected no errors, but got {} error(s): {:?}",
        errors.len(),
        errors.iter().map(|d| &d.summary).collect::<Vec<_>>()
    );
}

/// Assert that diagnostics contain at least one error.
///
/// # Panics
///
/// Panics if there are no error diagnostics.
pub fn assert_has_errors(diagnostics: &[Diagnostic]) {
    let has_errors = diagnostics
        .iter()
        .any(|d| matches!(d.severity, DiagnosticSeverity::Error));

    assert!(has_errors, "Expected at least one error, but got none");
}

/// Assert that diagnostics contain an error with the given summary substring.
///
/// # Panics
///
/// Panics if no error diagnostic contains the given substring.
pub fn assert_error_contains(diagnostics: &[Diagnostic], substring: &str) {
    let has_matching_error = diagnostics
        .iter()
        .any(|d| matches!(d.severity, DiagnosticSeverity::Error) && d.summary.contains(substring));

    assert!(
        has_matching_error,
        "Expected an error containing '{}', but no matching error found. Errors: {:?}",
        substring,
        diagnostics
            .iter()
            .filter(|d| matches!(d.severity, DiagnosticSeverity::Error))
            .map(|d| &d.summary)
            .collect::<Vec<_>>()
    );
}

/// Assert that a diff adds exactly `expected`, in order.
///
/// # Panics
///
/// Panics if the additions differ.
pub fn assert_diff_adds<T: PartialEq + std::fmt::Debug>(diff: &SetDiff<T>, expected: &[T]) {
    assert_eq!(
        diff.to_add, expected,
        "Expected diff to add {:?}, but it adds {:?}",
        expected, diff.to_add
    );
}

/// Assert that a diff removes exactly `expected`, in order.
///
/// # Panics
///
/// Panics if the removals differ.
pub fn assert_diff_removes<T: PartialEq + std::fmt::Debug>(diff: &SetDiff<T>, expected: &[T]) {
    assert_eq!(
        diff.to_remove, expected,
        "Expected diff to remove {:?}, but it removes {:?}",
        expected, diff.to_remove
    );
}

/// Assert that a diff is a no-op.
///
/// # Panics
///
/// Panics if the diff adds or removes anything.
pub fn assert_diff_empty<T: std::fmt::Debug>(diff: &SetDiff<T>) {
    assert!(
        diff.is_empty(),
        "Expected an empty diff, but it adds {:?} and removes {:?}",
        diff.to_add,
        diff.to_remove
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconcile::diff_tags;
    use serde_json::json;

    #[tokio::test]
    async fn test_scripted_refresh_replays_in_order() {
        let refresh = ScriptedRefresh::new(vec![
            Ok(json!({"status": "PENDING"})),
            Err(ProviderError::NotFound("gone".into())),
        ]);

        assert_eq!(refresh.refresh().await.unwrap()["status"], "PENDING");
        assert!(refresh.refresh().await.unwrap_err().is_not_found());
        assert_eq!(refresh.polls(), 2);
    }

    #[tokio::test]
    async fn test_pending_forever_repeats() {
        let refresh = ScriptedRefresh::pending_forever(json!({"status": "PENDING"}));
        for _ in 0..5 {
            assert_eq!(refresh.refresh().await.unwrap()["status"], "PENDING");
        }
        assert_eq!(refresh.polls(), 5);
    }

    #[tokio::test]
    async fn test_scripted_ops_fail_once_then_accept() {
        let ops = ScriptedSetOps::new(
            Some(ProviderError::Conflict("taken".into())),
            None,
        );
        let tag = ("k".to_string(), "v".to_string());

        assert!(ops.add(std::slice::from_ref(&tag)).await.is_err());
        assert!(ops.add(std::slice::from_ref(&tag)).await.is_ok());
        assert_eq!(ops.calls().len(), 2);
    }

    #[test]
    fn test_diff_assertions() {
        let tag = |k: &str, v: &str| (k.to_string(), v.to_string());
        let diff = diff_tags(&[tag("a", "1")], &[tag("b", "2")]);
        assert_diff_removes(&diff, &[tag("a", "1")]);
        assert_diff_adds(&diff, &[tag("b", "2")]);
        assert_diff_empty(&diff_tags(&[tag("a", "1")], &[tag("a", "1")]));
    }

    #[test]
    #[should_panic(expected = "Expected no errors")]
    fn test_assert_no_errors_fails() {
        let diagnostics = vec![Diagnostic::error("Invalid configuration")];
        assert_no_errors(&diagnostics);
    }

    #[test]
    fn test_assert_error_contains() {
        let diagnostics = vec![Diagnostic::error("Invalid configuration")];
        assert_has_errors(&diagnostics);
        assert_error_contains(&diagnostics, "Invalid");
        assert_error_contains(&diagnostics, "configuration");
    }
}
