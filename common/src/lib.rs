//! Shared primitives for the Coreward workspace.
//!
//! Everything here is dependency-light and safe to pull into any crate:
//!
//! - [`ErrorLocation`]: `file:line:column` capture for every error variant
//! - [`RedactedSecret`]: the core controller secret, never printed and zeroed on drop
//! - [`HttpStatusCode`]: status classification for controller responses

pub mod error;
pub mod http_status;
pub mod redacted_secret;

#[cfg(test)]
mod tests;

pub use error::error_location::ErrorLocation;
pub use error::redact_error::RedactError;
pub use http_status::HttpStatusCode;
pub use redacted_secret::RedactedSecret;
