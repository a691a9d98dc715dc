use std::backtrace::Backtrace;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Fault kinds reserved by the protocol machinery itself. Applications
/// pick their own kind strings for handler failures.
pub mod kind {
    /// No handler is registered under the requested key.
    pub const NOT_REGISTERED: &str = "NotRegistered";
    /// A frame did not decode to the expected request shape.
    pub const MALFORMED_FRAME: &str = "MalformedFrame";
    /// A positional argument was absent.
    pub const BAD_ARITY: &str = "BadArity";
    /// A positional argument had the wrong shape.
    pub const INVALID_ARGUMENT: &str = "InvalidArgument";
    /// A legacy peer reported an error as a bare prefixed string.
    pub const LEGACY_ERROR: &str = "LegacyError";
}

/// Leaf failure: an application-chosen kind string plus a message.
///
/// The kind survives the wire unchanged, so a caller can check for a
/// specific failure (`err.is_kind("DivideByZero")`) instead of matching on
/// message text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("{kind}: {message}")]
pub struct Fault {
    pub kind: String,
    pub message: String,
}

impl Fault {
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
        }
    }

    pub fn is(&self, kind: &str) -> bool {
        self.kind == kind
    }
}

/// One link in a cause chain: either a leaf fault or another wrapped error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Cause {
    Fault(Fault),
    Wrapped(RemoteError),
}

impl From<Fault> for Cause {
    fn from(fault: Fault) -> Self {
        Cause::Fault(fault)
    }
}

impl From<RemoteError> for Cause {
    fn from(err: RemoteError) -> Self {
        Cause::Wrapped(err)
    }
}

/// A failure that crossed the process boundary.
///
/// Carries a context message, the original cause (recursively), and an
/// opaque origin trace captured where the failure was first wrapped. The
/// trace is display-only: it is never parsed back into native frames on
/// the receiving side.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteError {
    message: String,
    cause: Box<Cause>,
    trace: String,
}

impl RemoteError {
    /// Wrap a failure with context. Wrapping is additive: the cause stays
    /// introspectable through [`RemoteError::root_fault`] and
    /// [`std::error::Error::source`].
    pub fn wrap(message: impl Into<String>, cause: impl Into<Cause>) -> Self {
        let cause = cause.into();
        let trace = match &cause {
            Cause::Wrapped(inner) => inner.trace.clone(),
            Cause::Fault(_) => Backtrace::force_capture().to_string(),
        };
        Self {
            message: message.into(),
            cause: Box::new(cause),
            trace,
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn cause(&self) -> &Cause {
        &self.cause
    }

    pub fn trace(&self) -> &str {
        &self.trace
    }

    /// The innermost fault of the cause chain.
    pub fn root_fault(&self) -> Option<&Fault> {
        match self.cause.as_ref() {
            Cause::Fault(fault) => Some(fault),
            Cause::Wrapped(inner) => inner.root_fault(),
        }
    }

    /// Whether the innermost fault has the given kind.
    pub fn is_kind(&self, kind: &str) -> bool {
        self.root_fault().is_some_and(|fault| fault.is(kind))
    }
}

impl fmt::Display for RemoteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)?;
        let mut cause = self.cause.as_ref();
        loop {
            match cause {
                Cause::Fault(fault) => {
                    write!(f, "\ncaused by: {fault}")?;
                    break;
                }
                Cause::Wrapped(inner) => {
                    write!(f, "\ncaused by: {}", inner.message)?;
                    cause = inner.cause.as_ref();
                }
            }
        }
        if !self.trace.is_empty() {
            write!(f, "\norigin trace:\n{}", self.trace)?;
        }
        Ok(())
    }
}

impl std::error::Error for RemoteError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self.cause.as_ref() {
            Cause::Fault(fault) => Some(fault),
            Cause::Wrapped(inner) => Some(inner),
        }
    }
}

/// Errors surfaced to users of the client and server.
///
/// Transport-level failures are local variants here; only failures that
/// happened on the remote side arrive as [`Error::Remote`].
#[derive(Debug, Error)]
pub enum Error {
    #[error("not connected")]
    NotConnected,

    #[error("timed out connecting to {url} after {waited:?}")]
    ConnectTimeout { url: String, waited: Duration },

    #[error("connecting to {url} failed: {reason}")]
    ConnectFailed { url: String, reason: String },

    #[error("connection lost before a response arrived")]
    ConnectionLost,

    #[error("call timed out after {0:?}")]
    CallTimeout(Duration),

    #[error("invalid listen address: {0}")]
    InvalidAddress(String),

    #[error("transport error: {0}")]
    Transport(#[from] tether_fabric::Error),

    #[error(transparent)]
    Remote(#[from] RemoteError),
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_renders_context_cause_and_trace() {
        let inner = RemoteError::wrap("inner context", Fault::new("DivideByZero", "n / 0"));
        let outer = RemoteError::wrap("remote call `Demo::div` failed", inner);

        let rendered = outer.to_string();
        let context = rendered.find("remote call `Demo::div` failed").unwrap();
        let first_cause = rendered.find("caused by: inner context").unwrap();
        let second_cause = rendered.find("caused by: DivideByZero: n / 0").unwrap();
        let trace = rendered.find("origin trace:").unwrap();
        assert!(context < first_cause);
        assert!(first_cause < second_cause);
        assert!(second_cause < trace);
    }

    #[test]
    fn wrapping_preserves_the_root_fault() {
        let err = RemoteError::wrap(
            "outer",
            RemoteError::wrap("middle", Fault::new("DivideByZero", "n / 0")),
        );
        assert!(err.is_kind("DivideByZero"));
        assert_eq!(err.root_fault().unwrap().message, "n / 0");
        assert!(!err.is_kind(kind::NOT_REGISTERED));
    }

    #[test]
    fn source_chain_is_walkable() {
        let err = RemoteError::wrap("outer", Fault::new("Boom", "went boom"));
        let source = std::error::Error::source(&err).unwrap();
        assert_eq!(source.to_string(), "Boom: went boom");
    }

    #[test]
    fn survives_serialization() {
        let err = RemoteError::wrap(
            "remote call `Demo::div` failed",
            Fault::new("DivideByZero", "n / 0"),
        );
        let bytes = serde_json::to_vec(&err).unwrap();
        let back: RemoteError = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(back.message(), err.message());
        assert_eq!(back.trace(), err.trace());
        assert!(back.is_kind("DivideByZero"));
    }
}
