//! Failure types shared by the delivery path and the action middleware.
//!
//! These are the shapes [`classify`](crate::classify::classify) recognizes. Anything else a
//! handler returns is treated as an unknown failure.
use std::any::Any;

/// Boxed error used at handler seams, the same alias tower uses.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Failure surfaced by a transport while delivering a request.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// No response was received (connect failure, reset, timeout).
    #[error("no response from {url}: {message}")]
    Connectivity {
        /// Request URL.
        url: String,
        /// Underlying transport message.
        message: String,
    },
    /// The remote end answered with a rejection.
    #[error("{url} rejected the request with status {status}")]
    Api {
        /// Request URL.
        url: String,
        /// HTTP status code.
        status: u16,
        /// Server-supplied machine readable code, e.g. `VALIDATION_ERROR`.
        error_code: Option<String>,
        /// Server-supplied correlation id.
        error_id: Option<String>,
        /// Raw response body.
        body: Option<String>,
    },
}

impl TransportError {
    /// Build a connectivity failure.
    pub fn connectivity(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Connectivity { url: url.into(), message: message.into() }
    }

    /// Build an API rejection with only a status; use the `with_*` methods to add detail.
    pub fn api(url: impl Into<String>, status: u16) -> Self {
        Self::Api { url: url.into(), status, error_code: None, error_id: None, body: None }
    }

    /// Attach a server error code. No effect on connectivity failures.
    pub fn with_error_code(mut self, code: impl Into<String>) -> Self {
        if let Self::Api { error_code, .. } = &mut self {
            *error_code = Some(code.into());
        }
        self
    }

    /// Attach a server error id. No effect on connectivity failures.
    pub fn with_error_id(mut self, id: impl Into<String>) -> Self {
        if let Self::Api { error_id, .. } = &mut self {
            *error_id = Some(id.into());
        }
        self
    }

    /// Attach the response body. No effect on connectivity failures.
    pub fn with_body(mut self, text: impl Into<String>) -> Self {
        if let Self::Api { body, .. } = &mut self {
            *body = Some(text.into());
        }
        self
    }

    /// URL of the failed request.
    pub fn url(&self) -> &str {
        match self {
            Self::Connectivity { url, .. } | Self::Api { url, .. } => url,
        }
    }

    /// Status code, if the remote answered.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            Self::Connectivity { .. } => None,
        }
    }

    /// True when no response was received.
    pub fn is_connectivity(&self) -> bool {
        matches!(self, Self::Connectivity { .. })
    }
}

/// A programming defect raised by application code, optionally carrying a state snapshot.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{message}")]
pub struct RuntimeError {
    message: String,
    state: Option<serde_json::Value>,
}

impl RuntimeError {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into(), state: None }
    }

    /// Attach a snapshot of application state taken when the defect was raised.
    pub fn with_state(mut self, state: serde_json::Value) -> Self {
        self.state = Some(state);
        self
    }

    /// Convert a panic payload caught with `catch_unwind`.
    pub fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        Self::new(format!("panicked: {}", panic_message(payload.as_ref())))
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn state(&self) -> Option<&serde_json::Value> {
        self.state.as_ref()
    }
}

/// Errors produced while building a [`DeliveryConfig`](crate::DeliveryConfig).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("server url must not be empty")]
    EmptyServerUrl,
    #[error("server url must use http or https (got {0})")]
    UnsupportedScheme(String),
    #[error("environment variable {var} is invalid: {reason}")]
    InvalidEnv { var: &'static str, reason: String },
}

/// Best-effort text for a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
