// Bounded retry around controller calls

use crate::error::CoreError;
use crate::error::config::ConfigError;
use crate::error::controller::ControllerError;
use crate::error::ipc::IpcError;
use crate::supervisor::RetryPolicy;
use crate::tests::support::harness;

use common::{ErrorLocation, HttpStatusCode};
use models::{CoreMode, RoutingMode};

use std::panic::Location;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn fast() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        initial_delay: Duration::from_millis(1),
    }
}

fn booting() -> CoreError {
    ControllerError::Status {
        message: "Service Unavailable".to_string(),
        status: HttpStatusCode(503),
        location: ErrorLocation::from(Location::caller()),
    }
    .into()
}

fn unauthorized() -> CoreError {
    ControllerError::Status {
        message: "Unauthorized".to_string(),
        status: HttpStatusCode(401),
        location: ErrorLocation::from(Location::caller()),
    }
    .into()
}

/// **VALUE**: Only failures that can clear on their own are retried.
///
/// **WHY THIS MATTERS**: Retrying a wrong secret or a broken profile only
/// delays the error the user has to act on.
///
/// **BUG THIS CATCHES**: Auth failures retried like a booting controller, or
/// an unreachable daemon treated as final.
#[test]
fn given_error_categories_when_is_retryable_then_only_transient_ones() {
    // GIVEN / WHEN / THEN
    assert!(booting().is_retryable());
    assert!(!unauthorized().is_retryable());
    assert!(
        CoreError::from(IpcError::Unreachable {
            message: "no socket".to_string(),
            attempts: 3,
            location: ErrorLocation::from(Location::caller()),
        })
        .is_retryable()
    );
    assert!(
        !CoreError::from(ConfigError::ValidationError {
            location: ErrorLocation::from(Location::caller()),
            reason: "port 0".to_string(),
        })
        .is_retryable()
    );
}

#[tokio::test]
async fn given_transient_failures_when_run_then_retried_until_success() {
    // GIVEN: Two 503s, then success
    let calls = AtomicU32::new(0);

    // WHEN
    let result = fast()
        .run("set_routing_mode", || async {
            match calls.fetch_add(1, Ordering::SeqCst) {
                0 | 1 => Err(booting()),
                _ => Ok("rule"),
            }
        })
        .await;

    // THEN
    assert_eq!(result.unwrap(), "rule");
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn given_permanent_failure_when_run_then_single_attempt() {
    let calls = AtomicU32::new(0);

    let result: Result<(), CoreError> = fast()
        .run("set_routing_mode", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(unauthorized())
        })
        .await;

    assert!(result.is_err());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

/// **VALUE**: Retrying is bounded and the last error comes back.
///
/// **BUG THIS CATCHES**: An unbounded loop against a controller that never
/// comes up, which would hold the lifecycle lock forever.
#[tokio::test]
async fn given_persistent_transient_failure_when_run_then_gives_up_after_max_attempts() {
    // GIVEN
    let calls = AtomicU32::new(0);

    // WHEN
    let result: Result<(), CoreError> = fast()
        .run("get_routing_mode", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(booting())
        })
        .await;

    // THEN
    assert!(result.unwrap_err().is_retryable());
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

/// **VALUE**: A routing switch survives the controller answering 503 once.
///
/// **WHY THIS MATTERS**: Right after a start or a profile reload the core
/// briefly refuses `/configs`, and the user's click would be lost.
///
/// **BUG THIS CATCHES**: The supervisor calling the controller directly,
/// without the retry policy.
#[tokio::test]
async fn given_controller_busy_once_when_set_routing_mode_then_applied_on_retry() {
    // GIVEN: A running core whose controller is the mock server
    let server = MockServer::start().await;
    let h = harness(CoreMode::User).await;
    std::fs::write(
        h.dir.path().join("config.yaml"),
        format!("mixed-port: 7890\nexternal-controller: {}\n", server.address()),
    )
    .unwrap();
    h.supervisor.start(None).await.unwrap();

    Mock::given(method("PATCH"))
        .and(path("/configs"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/configs"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    // WHEN
    let mode = h.supervisor.set_routing_mode(RoutingMode::Global).await.unwrap();

    // THEN
    assert_eq!(mode, RoutingMode::Global);
    assert_eq!(h.config.get().await.mode.routing, RoutingMode::Global);
    server.verify().await;
}
