//! Error taxonomy for the rendering gateway.
//!
//! Every fallible operation in the core returns a `Result<_, GatewayError>` (or a
//! more specific kind that converts into it via `From`). The coordinator maps
//! `GatewayError` onto HTTP status codes at the edge; nothing below the HTTP
//! layer should be matching on status codes directly.

use axum::http::StatusCode;

/// Top-level error kind produced anywhere in the core.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// The CDP websocket for a session died; the session is condemned.
    #[error("CDP transport failed: {0}")]
    Transport(String),

    /// The browser reported a navigation failure.
    #[error("navigation failed: {0}")]
    Navigate(#[from] NavigateError),

    /// A render did not complete before its deadline.
    #[error("render timed out")]
    Timeout,

    /// CDP refused the extraction call for the requested format.
    #[error("artifact extraction failed: {0}")]
    Extract(String),

    /// The request violates the configured domain allow-list.
    #[error("domain not allowed: {0}")]
    Policy(String),

    /// The pool could not hand back a session before the caller's deadline.
    #[error("no page session became available in time")]
    PoolExhausted,

    /// The circuit breaker for the upstream browser is open.
    #[error("upstream browser circuit breaker is open")]
    UpstreamOpen,

    /// The caller abandoned the request before it completed.
    #[error("render was cancelled")]
    Cancelled,

    /// The requested URL could not be parsed or canonicalized.
    #[error("malformed url: {0}")]
    MalformedUrl(String),

    /// Anything else (config, startup, internal invariant violation).
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Whether a [`NavigateError`] originated from the browser/network (and thus
/// counts against the circuit breaker) or from the client's malformed request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavigateFault {
    Upstream,
    Client,
}

#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct NavigateError {
    pub message: String,
    pub fault: NavigateFault,
}

impl NavigateError {
    #[must_use]
    pub fn upstream(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            fault: NavigateFault::Upstream,
        }
    }

    #[must_use]
    pub fn client(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            fault: NavigateFault::Client,
        }
    }
}

impl GatewayError {
    /// Whether this error should count as a failure against the per-upstream
    /// circuit breaker. Mirrors §4.5 / §7 of the spec: transport and timeout
    /// errors always count; navigation errors count only when the fault is
    /// upstream; extraction/policy/pool/cancellation errors never do.
    #[must_use]
    pub fn counts_as_breaker_failure(&self) -> bool {
        match self {
            GatewayError::Transport(_) | GatewayError::Timeout => true,
            GatewayError::Navigate(e) => e.fault == NavigateFault::Upstream,
            _ => false,
        }
    }

    /// Whether the page session that produced this error must be destroyed
    /// rather than returned to the pool healthy.
    #[must_use]
    pub fn condemns_session(&self) -> bool {
        matches!(
            self,
            GatewayError::Transport(_) | GatewayError::Timeout | GatewayError::Cancelled
        )
    }

    /// Maps this error onto the HTTP status codes enumerated in §6.
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::MalformedUrl(_) => StatusCode::BAD_REQUEST,
            GatewayError::Policy(_) => StatusCode::FORBIDDEN,
            GatewayError::Timeout => StatusCode::GATEWAY_TIMEOUT,
            GatewayError::Transport(_)
            | GatewayError::Navigate(_)
            | GatewayError::Extract(_)
            | GatewayError::PoolExhausted
            | GatewayError::UpstreamOpen => StatusCode::BAD_GATEWAY,
            GatewayError::Cancelled => StatusCode::INTERNAL_SERVER_ERROR,
            GatewayError::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<crate::cdp::TransportError> for GatewayError {
    fn from(e: crate::cdp::TransportError) -> Self {
        GatewayError::Transport(e.to_string())
    }
}

pub type GatewayResult<T> = Result<T, GatewayError>;
