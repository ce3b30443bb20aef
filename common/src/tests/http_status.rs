use crate::HttpStatusCode;

/// **VALUE**: Verifies the classification of controller status codes.
///
/// **WHY THIS MATTERS**: The startup probe keeps polling on retryable codes and gives up
/// immediately on auth failures. A wrong classification either hangs startup for the full
/// window or aborts a core that was only still booting.
///
/// **BUG THIS CATCHES**: Would catch if 401/403 became retryable or 503 stopped being so.
#[test]
fn given_controller_status_codes_when_classified_then_match_retry_policy() {
    // GIVEN / WHEN / THEN
    assert!(HttpStatusCode(503).is_retryable());
    assert!(!HttpStatusCode(401).is_retryable());
    assert!(HttpStatusCode(401).is_auth_failure());
    assert!(HttpStatusCode(403).is_auth_failure());
    assert!(!HttpStatusCode(200).is_retryable());
    assert_eq!(HttpStatusCode::from(404).to_string(), "404");
}
