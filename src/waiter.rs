//! State-poll waiter.
//!
//! Asynchronous control planes acknowledge a mutation long before it
//! finishes. The waiter drives a bounded sleep-then-poll loop against the
//! remote state, classifying each observed status into pending, terminal
//! success, or terminal failure, and returns the final document, a failure,
//! or a timeout. A waiter instance drives a single logical resource and
//! blocks its orchestration step; independent resources wait on independent
//! instances with no shared state.
//!
//! Unrecognized statuses count as pending: control planes grow new
//! intermediate states over time, and a stalled unknown state is still
//! caught by the timeout.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::time::Instant;

use crate::classify::{apply_rules, NotFoundRule};
use crate::client::{ApiRequest, RestClient};
use crate::error::{ErrorClassification, ProviderError};
use crate::path::path_str;

/// The observable state of one poll tick.
#[derive(Debug, Clone, PartialEq)]
pub enum PollState {
    /// Not terminal yet; poll again.
    Pending,
    /// The operation completed; carries the last observed document.
    Success(Value),
    /// The operation reached a terminal failure state; carries the reason.
    Failure(String),
}

/// What absence of the resource means while waiting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbsencePolicy {
    /// Absence is the success condition (delete waits).
    SucceedOnNotFound,
    /// Absence during provisioning is a hard failure (availability waits).
    FailOnNotFound,
}

/// One fetch of the current remote state.
///
/// The HTTP-backed implementation is [`HttpRefresh`]; tests drive the
/// waiter with scripted implementations instead.
#[async_trait]
pub trait StateRefresh: Send + Sync {
    /// Fetch the resource document, or an error for the tick to classify.
    async fn refresh(&self) -> Result<Value, ProviderError>;
}

/// [`StateRefresh`] backed by a GET against the control plane, with
/// business-code absence rules applied to failures.
pub struct HttpRefresh<'a> {
    client: &'a RestClient,
    request: ApiRequest,
    not_found: &'a [NotFoundRule],
}

impl<'a> HttpRefresh<'a> {
    /// Poll `request` through `client`, reclassifying errors per `not_found`.
    pub fn new(client: &'a RestClient, request: ApiRequest, not_found: &'a [NotFoundRule]) -> Self {
        Self {
            client,
            request,
            not_found,
        }
    }
}

#[async_trait]
impl StateRefresh for HttpRefresh<'_> {
    async fn refresh(&self) -> Result<Value, ProviderError> {
        self.client
            .execute(&self.request)
            .await
            .map_err(|e| apply_rules(e, self.not_found))
    }
}

/// Status classification and timing for one wait.
#[derive(Debug, Clone)]
pub struct WaitConfig {
    /// Path of the status field in the polled document.
    pub status_path: String,
    /// Statuses that complete the wait successfully.
    pub success: Vec<String>,
    /// Statuses that are terminal failures.
    pub failure: Vec<String>,
    /// What a NotFound poll result means.
    pub absence: AbsencePolicy,
    /// Delay before the first poll, giving the control plane time to
    /// register the mutation.
    pub delay: Duration,
    /// Interval between polls.
    pub interval: Duration,
    /// Overall deadline; exceeding it while pending is a timeout error.
    pub timeout: Duration,
}

impl WaitConfig {
    /// A wait targeting availability: `success` statuses complete it,
    /// `failure` statuses fail it, absence fails it.
    pub fn for_available(status_path: impl Into<String>, success: &[&str], failure: &[&str]) -> Self {
        Self {
            status_path: status_path.into(),
            success: success.iter().map(|s| s.to_string()).collect(),
            failure: failure.iter().map(|s| s.to_string()).collect(),
            absence: AbsencePolicy::FailOnNotFound,
            delay: Duration::from_secs(10),
            interval: Duration::from_secs(5),
            timeout: Duration::from_secs(1800),
        }
    }

    /// A wait targeting deletion: absence completes it; a terminal
    /// `DELETED`-style status (if the API soft-deletes) also completes it.
    pub fn for_deleted(status_path: impl Into<String>, deleted: &[&str]) -> Self {
        Self {
            status_path: status_path.into(),
            success: deleted.iter().map(|s| s.to_string()).collect(),
            failure: Vec::new(),
            absence: AbsencePolicy::SucceedOnNotFound,
            delay: Duration::from_secs(10),
            interval: Duration::from_secs(5),
            timeout: Duration::from_secs(1800),
        }
    }

    /// Override the initial delay.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Override the poll interval.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Override the overall timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// The polling state machine. Drives a [`StateRefresh`] until a terminal
/// state or the deadline.
pub struct StateWaiter<'a, R: StateRefresh> {
    refresh: &'a R,
    config: &'a WaitConfig,
}

impl<'a, R: StateRefresh> StateWaiter<'a, R> {
    /// Create a waiter over `refresh` with `config`.
    pub fn new(refresh: &'a R, config: &'a WaitConfig) -> Self {
        Self { refresh, config }
    }

    /// Evaluate one poll tick.
    ///
    /// Transient errors leave the wait pending; fatal errors fail it;
    /// absence resolves per the configured policy. Once a tick observes a
    /// terminal status the remote system is assumed not to revert it, so
    /// the loop in [`wait`](Self::wait) stops at the first terminal tick.
    pub async fn tick(&self) -> Result<PollState, ProviderError> {
        let document = match self.refresh.refresh().await {
            Ok(document) => document,
            Err(err) => {
                return match err.classification() {
                    ErrorClassification::NotFound => match self.config.absence {
                        AbsencePolicy::SucceedOnNotFound => Ok(PollState::Success(Value::Null)),
                        AbsencePolicy::FailOnNotFound => Ok(PollState::Failure(format!(
                            "resource vanished while waiting: {err}"
                        ))),
                    },
                    ErrorClassification::Transient => {
                        tracing::debug!(error = %err, "transient error during poll, retrying");
                        Ok(PollState::Pending)
                    }
                    ErrorClassification::Fatal => Err(err),
                };
            }
        };

        let status = path_str(&self.config.status_path, &document, "");
        if self.config.failure.iter().any(|s| s == &status) {
            return Ok(PollState::Failure(status));
        }
        if self.config.success.iter().any(|s| s == &status) {
            return Ok(PollState::Success(document));
        }
        tracing::trace!(%status, "status not terminal, still pending");
        Ok(PollState::Pending)
    }

    /// Block until the wait resolves.
    ///
    /// Sleeps the initial delay, then ticks at the configured interval.
    /// Returns the last document on success, [`ProviderError::OperationFailed`]
    /// on a terminal failure, and [`ProviderError::Timeout`] if the deadline
    /// passes while still pending. A timed-out operation may still complete
    /// server-side.
    pub async fn wait(&self) -> Result<Value, ProviderError> {
        let deadline = Instant::now() + self.config.timeout;
        tokio::time::sleep(self.config.delay).await;

        loop {
            match self.tick().await? {
                PollState::Success(document) => return Ok(document),
                PollState::Failure(reason) => {
                    return Err(ProviderError::OperationFailed(format!(
                        "unexpected status: {reason}"
                    )))
                }
                PollState::Pending => {}
            }

            if Instant::now() + self.config.interval > deadline {
                return Err(ProviderError::Timeout(format!(
                    "still pending after {:?} (status path {})",
                    self.config.timeout, self.config.status_path
                )));
            }
            tokio::time::sleep(self.config.interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedRefresh;
    use serde_json::json;

    fn availability(timeout_ticks: u64) -> WaitConfig {
        WaitConfig::for_available("status", &["AVAILABLE"], &["FAILED"])
            .with_delay(Duration::from_secs(1))
            .with_interval(Duration::from_secs(1))
            .with_timeout(Duration::from_secs(timeout_ticks))
    }

    fn status(s: &str) -> Value {
        json!({ "status": s })
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_reaches_success_after_pending_polls() {
        let refresh = ScriptedRefresh::new(vec![
            Ok(status("PENDING")),
            Ok(status("PENDING")),
            Ok(status("AVAILABLE")),
        ]);
        let config = availability(60);
        let document = StateWaiter::new(&refresh, &config).wait().await.unwrap();
        assert_eq!(document["status"], "AVAILABLE");
        assert_eq!(refresh.polls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_status_treated_as_pending() {
        let mut script: Vec<Result<Value, ProviderError>> =
            (0..5).map(|_| Ok(status("PROVISIONING"))).collect();
        script.push(Ok(status("AVAILABLE")));
        let refresh = ScriptedRefresh::new(script);
        let config = availability(60);
        let document = StateWaiter::new(&refresh, &config).wait().await.unwrap();
        assert_eq!(document["status"], "AVAILABLE");
        assert_eq!(refresh.polls(), 6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_status_is_operation_failed() {
        let refresh = ScriptedRefresh::new(vec![Ok(status("PENDING")), Ok(status("FAILED"))]);
        let config = availability(60);
        let err = StateWaiter::new(&refresh, &config).wait().await.unwrap_err();
        match err {
            ProviderError::OperationFailed(reason) => assert!(reason.contains("FAILED")),
            other => panic!("expected OperationFailed, got {other}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_is_distinct_from_failure() {
        let refresh = ScriptedRefresh::pending_forever(status("PENDING"));
        let config = availability(3);
        let err = StateWaiter::new(&refresh, &config).wait().await.unwrap_err();
        assert!(matches!(err, ProviderError::Timeout(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_delete_wait_succeeds_on_first_not_found_tick() {
        let refresh = ScriptedRefresh::new(vec![Err(ProviderError::NotFound("gone".into()))]);
        let config = WaitConfig::for_deleted("status", &["DELETED"])
            .with_delay(Duration::from_secs(1))
            .with_interval(Duration::from_secs(1))
            .with_timeout(Duration::from_secs(60));
        let document = StateWaiter::new(&refresh, &config).wait().await.unwrap();
        assert_eq!(document, Value::Null);
        assert_eq!(refresh.polls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delete_wait_accepts_terminal_deleted_status() {
        let refresh =
            ScriptedRefresh::new(vec![Ok(status("DELETING")), Ok(status("DELETED"))]);
        let config = WaitConfig::for_deleted("status", &["DELETED"])
            .with_delay(Duration::from_secs(1))
            .with_interval(Duration::from_secs(1))
            .with_timeout(Duration::from_secs(60));
        StateWaiter::new(&refresh, &config).wait().await.unwrap();
        assert_eq!(refresh.polls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_absence_during_availability_wait_fails() {
        let refresh = ScriptedRefresh::new(vec![
            Ok(status("PENDING")),
            Err(ProviderError::NotFound("vanished".into())),
        ]);
        let config = availability(60);
        let err = StateWaiter::new(&refresh, &config).wait().await.unwrap_err();
        match err {
            ProviderError::OperationFailed(reason) => assert!(reason.contains("vanished")),
            other => panic!("expected OperationFailed, got {other}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_error_retried_until_deadline() {
        let refresh = ScriptedRefresh::new(vec![
            Err(ProviderError::Unavailable("blip".into())),
            Err(ProviderError::Api {
                status: 502,
                body: "bad gateway".into(),
            }),
            Ok(status("AVAILABLE")),
        ]);
        let config = availability(60);
        StateWaiter::new(&refresh, &config).wait().await.unwrap();
        assert_eq!(refresh.polls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fatal_error_aborts_immediately() {
        let refresh = ScriptedRefresh::new(vec![Err(ProviderError::PermissionDenied(
            "token expired".into(),
        ))]);
        let config = availability(60);
        let err = StateWaiter::new(&refresh, &config).wait().await.unwrap_err();
        assert!(matches!(err, ProviderError::PermissionDenied(_)));
        assert_eq!(refresh.polls(), 1);
    }

    #[tokio::test]
    async fn test_terminal_ticks_are_idempotent() {
        // Further simulated ticks after a terminal observation keep
        // reporting the same outcome.
        let refresh = ScriptedRefresh::pending_forever(status("AVAILABLE"));
        let config = availability(60);
        let waiter = StateWaiter::new(&refresh, &config);
        for _ in 0..3 {
            match waiter.tick().await.unwrap() {
                PollState::Success(document) => assert_eq!(document["status"], "AVAILABLE"),
                other => panic!("expected success, got {other:?}"),
            }
        }

        let refresh = ScriptedRefresh::pending_forever(status("FAILED"));
        let waiter = StateWaiter::new(&refresh, &config);
        for _ in 0..3 {
            assert_eq!(
                waiter.tick().await.unwrap(),
                PollState::Failure("FAILED".to_string())
            );
        }
    }

    #[tokio::test]
    async fn test_http_refresh_applies_not_found_rules() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/gateways/g-1"))
            .respond_with(
                ResponseTemplate::new(400).set_body_string(r#"{"error_code":"GW.0404"}"#),
            )
            .mount(&server)
            .await;

        let client = RestClient::new(&server.uri()).unwrap();
        let rules = vec![NotFoundRule::on_400("error_code", &["GW.0404"])];
        let request = ApiRequest::get("v1/gateways/{id}").path_param("id", "g-1");
        let refresh = HttpRefresh::new(&client, request, &rules);

        let config = WaitConfig::for_deleted("status", &[])
            .with_delay(Duration::from_millis(1))
            .with_interval(Duration::from_millis(1))
            .with_timeout(Duration::from_secs(5));
        let document = StateWaiter::new(&refresh, &config).wait().await.unwrap();
        assert_eq!(document, Value::Null);
    }
}
