use crate::ipc::{
    IpcEmpty, IpcErrorKind, IpcGetLogs, IpcRequest, IpcResponse, IpcSetTunMode, ipc_request::Method,
    ipc_response::Data,
};

use prost::Message;

/// **VALUE**: Only read-only queries are flagged as safe to resend.
///
/// **WHY THIS MATTERS**: The client retries idempotent calls after a timeout. Resending a
/// start or stop could double-apply it.
///
/// **BUG THIS CATCHES**: StartCore being marked idempotent and spawning twice.
#[test]
fn given_methods_when_idempotency_checked_then_only_queries_qualify() {
    assert!(Method::Ping(IpcEmpty {}).is_idempotent());
    assert!(Method::GetStatus(IpcEmpty {}).is_idempotent());
    assert!(Method::GetLogs(IpcGetLogs { limit: Some(10) }).is_idempotent());
    assert!(!Method::StopCore(IpcEmpty {}).is_idempotent());
    assert!(!Method::SetTunMode(IpcSetTunMode { enabled: true, ..Default::default() }).is_idempotent());
    assert!(!Method::Shutdown(IpcEmpty {}).is_idempotent());
}

/// **VALUE**: A request decodes back to the same method and id after crossing the wire.
#[test]
fn given_request_when_encoded_and_decoded_then_method_preserved() {
    // GIVEN
    let request = IpcRequest::new(7, Method::SetTunMode(IpcSetTunMode { enabled: true, ..Default::default() }));

    // WHEN
    let bytes = request.encode_to_vec();
    let decoded = IpcRequest::decode(bytes.as_slice()).unwrap();

    // THEN
    assert_eq!(decoded.request_id, 7);
    assert_eq!(
        decoded.method,
        Some(Method::SetTunMode(IpcSetTunMode { enabled: true, ..Default::default() }))
    );
}

/// **VALUE**: Response helpers set the error kind consistently with `is_ok()`.
///
/// **BUG THIS CATCHES**: A failure response that reads as success because the kind
/// defaulted to zero.
#[test]
fn given_response_helpers_when_built_then_kind_matches_outcome() {
    // GIVEN / WHEN
    let ok = IpcResponse::ok_with(1, "ok", Data::Version("1.18.0".to_string()));
    let failure = IpcResponse::failure(2, IpcErrorKind::PortInUse, "port busy");

    // THEN
    assert!(ok.is_ok());
    assert_eq!(ok.data, Some(Data::Version("1.18.0".to_string())));
    assert!(!failure.is_ok());
    assert_eq!(failure.error_kind(), IpcErrorKind::PortInUse);
    assert_eq!(failure.request_id, 2);
}

#[test]
fn given_unknown_error_kind_value_when_read_then_falls_back_to_default() {
    let response = IpcResponse {
        request_id: 3,
        error_kind: 999,
        message: String::new(),
        data: None,
    };

    assert_eq!(response.error_kind(), IpcErrorKind::Unspecified);
    assert!(!response.is_ok());
}
