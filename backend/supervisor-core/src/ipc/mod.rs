//! Request/response transport between the desktop app and the privileged daemon.
//!
//! - One connection carries one request and one response
//! - Every message is a 4-byte little-endian length followed by a protobuf payload
//! - Unix domain socket on macOS/Linux, named pipe on Windows
//! - Responses carry the request id they answer
//!
//! See [`models::ipc`] for the message definitions.

pub mod client;
pub mod frame;
pub mod server;
pub mod transport;

pub use client::{IpcClient, IpcClientConfig};
pub use frame::{Frame, FrameDecoder, FramedStream, MAX_FRAME_LEN, encode_frame};
pub use server::{IpcServer, RequestHandler};
pub use transport::IpcListener;
