//! Error types surfaced by this crate.
//!
//! [`OpStatus`] is the three-valued result every user-visible operation
//! event carries; it is plain data, not an [`std::error::Error`].
//! [`ConfigError`] and [`SetupError`] are the small set of genuine internal
//! errors, raised only for misconfiguration or collaborator setup failures
//! that happen before a task can even begin.

use thiserror::Error;

/// The outcome of a single user-visible operation (login, create/join/list
/// game). Carried by the corresponding [`crate::events::Event`] variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpStatus {
    /// The operation succeeded; the event's payload holds the result.
    Ok,
    /// The server answered but rejected the request (non-2xx). The event's
    /// payload holds the server's response body verbatim.
    ErrRejected,
    /// Local or network failure: DNS, TLS, connection, a malformed or
    /// oversize response body, a transport that disconnected mid-handshake,
    /// or an internal setup failure. No server-provided reason exists.
    ErrIo,
}

/// Raised by [`crate::Config::validate`] when the host supplies an
/// unusable configuration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("config.host must not be empty")]
    EmptyHost,
}

/// Internal setup failures that collapse into [`OpStatus::ErrIo`] at the
/// task level rather than getting a variant of their own.
#[derive(Debug, Error)]
pub enum SetupError {
    #[error("failed to bind OAuth loopback listener: {0}")]
    OAuthBind(#[source] std::io::Error),
    #[error("failed to construct transport: {0}")]
    Transport(String),
}
