use supervisor_core::controller::ControllerClient;
use supervisor_core::error::ErrorKind;

use common::RedactedSecret;
use models::RoutingMode;

use std::path::Path;

use serde_json::json;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

// ============================================================================
// Public API tests for the core's REST controller client
// ============================================================================

fn client_for(server: &MockServer, secret: Option<&str>) -> ControllerClient {
    let address = server.address();
    ControllerClient::new(
        &address.ip().to_string(),
        address.port(),
        secret.map(RedactedSecret::new),
    )
    .expect("controller client")
}

/// **VALUE**: `/version` is the liveness probe used at start and by the health poll.
///
/// **BUG THIS CATCHES**: Deserializing the wrong field, which would mark every
/// healthy core as unresponsive.
#[tokio::test]
async fn given_core_answers_when_version_then_returns_version() {
    // GIVEN: A controller answering /version
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/version"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "meta": true, "version": "v1.19.0" })),
        )
        .mount(&server)
        .await;
    let client = client_for(&server, None);

    // WHEN
    let version = client.version().await.unwrap();

    // THEN
    assert_eq!(version, "v1.19.0");
    assert!(client.is_alive().await);
}

/// **VALUE**: The profile secret is sent as a bearer token.
///
/// **WHY THIS MATTERS**: A core with `secret:` set rejects unauthenticated
/// requests, so a missing header looks like a dead core.
///
/// **BUG THIS CATCHES**: Forgetting `prepare_request` on one of the calls.
#[tokio::test]
async fn given_secret_when_request_then_bearer_header_sent() {
    // GIVEN
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/version"))
        .and(header("authorization", "Bearer s3cret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "version": "v1.19.0" })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/version"))
        .respond_with(ResponseTemplate::new(401).set_body_string("Unauthorized"))
        .mount(&server)
        .await;

    // WHEN
    let authorized = client_for(&server, Some("s3cret")).version().await;
    let anonymous = client_for(&server, None).version().await;

    // THEN
    assert_eq!(authorized.unwrap(), "v1.19.0");
    assert_eq!(anonymous.unwrap_err().kind(), ErrorKind::ConfigInvalid);
}

#[tokio::test]
async fn given_core_in_global_when_get_routing_mode_then_global() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/configs"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "mode": "global", "mixed-port": 7890 })),
        )
        .mount(&server)
        .await;

    let mode = client_for(&server, None).get_routing_mode().await.unwrap();

    assert_eq!(mode, RoutingMode::Global);
}

#[tokio::test]
async fn given_routing_mode_when_set_then_patch_sent() {
    // GIVEN
    let server = MockServer::start().await;
    Mock::given(method("PATCH"))
        .and(path("/configs"))
        .and(body_json(json!({ "mode": "direct" })))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    // WHEN
    let result = client_for(&server, None)
        .set_routing_mode(RoutingMode::Direct)
        .await;

    // THEN
    assert!(result.is_ok());
}

#[tokio::test]
async fn given_tun_toggle_when_set_tun_then_nested_enable_patched() {
    let server = MockServer::start().await;
    Mock::given(method("PATCH"))
        .and(path("/configs"))
        .and(body_json(json!({ "tun": { "enable": true } })))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    client_for(&server, None).set_tun(true).await.unwrap();
}

#[tokio::test]
async fn given_profile_path_when_reload_config_then_forced_put() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/configs"))
        .and(query_param("force", "true"))
        .and(body_json(json!({ "path": "/etc/coreward/config.yaml" })))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    client_for(&server, None)
        .reload_config(Path::new("/etc/coreward/config.yaml"))
        .await
        .unwrap();
}

/// **VALUE**: Server errors surface as an unresponsive API, not a bad config.
///
/// **BUG THIS CATCHES**: Mapping every non-2xx to ConfigInvalid, which would
/// send users editing a profile that is fine.
#[tokio::test]
async fn given_server_error_when_set_tun_then_api_unresponsive() {
    let server = MockServer::start().await;
    Mock::given(method("PATCH"))
        .and(path("/configs"))
        .respond_with(ResponseTemplate::new(500).set_body_string("tun device busy"))
        .mount(&server)
        .await;

    let err = client_for(&server, None).set_tun(true).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::ApiUnresponsive);
    assert!(err.to_string().contains("tun device busy"));
}

#[tokio::test]
async fn given_nothing_listening_when_is_alive_then_false() {
    // Port 1 is privileged and never bound in test environments
    let client = ControllerClient::new("127.0.0.1", 1, None).unwrap();

    assert!(!client.is_alive().await);
}
