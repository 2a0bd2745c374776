//! Mapping from caught failures to the error taxonomy.
//!
//! Classification is structural: the failure and its `source()` chain are downcast to the
//! framework's own failure types ([`TransportError`], [`RuntimeError`]). Messages are never
//! inspected, so the mapping does not depend on how a transport words its errors.
use crate::error::{RuntimeError, TransportError};
use crate::event::truncate;
use crate::fatal::Severity;
use std::error::Error;

/// Server error code marking a request as invalid input rather than a server malfunction.
pub const VALIDATION_ERROR_CODE: &str = "VALIDATION_ERROR";

/// Closed set of failure categories.
#[derive(Debug, Clone, PartialEq)]
pub enum ErrorTaxonomy {
    /// Transport-level failure, no response received. Presumed transient.
    ConnectivityFailure { url: String, message: String },
    /// The remote end rejected the request.
    ApiFailure {
        url: String,
        status: u16,
        error_code: Option<String>,
        error_id: Option<String>,
        body: Option<String>,
    },
    /// Programming defect in application code.
    RuntimeFailure { message: String, state: Option<serde_json::Value> },
    /// A failure type the framework does not know about.
    UnknownFailure { message: String },
}

/// Classify any caught failure. Pure and total.
pub fn classify(err: &(dyn Error + 'static)) -> ErrorTaxonomy {
    let mut current: Option<&(dyn Error + 'static)> = Some(err);
    while let Some(e) = current {
        if let Some(transport) = e.downcast_ref::<TransportError>() {
            return from_transport(transport);
        }
        if let Some(runtime) = e.downcast_ref::<RuntimeError>() {
            return ErrorTaxonomy::RuntimeFailure {
                message: runtime.message().to_string(),
                state: runtime.state().cloned(),
            };
        }
        current = e.source();
    }
    ErrorTaxonomy::UnknownFailure { message: err.to_string() }
}

fn from_transport(err: &TransportError) -> ErrorTaxonomy {
    match err {
        TransportError::Connectivity { url, message } => {
            ErrorTaxonomy::ConnectivityFailure { url: url.clone(), message: message.clone() }
        }
        TransportError::Api { url, status, error_code, error_id, body } => {
            ErrorTaxonomy::ApiFailure {
                url: url.clone(),
                status: *status,
                error_code: error_code.clone(),
                error_id: error_id.clone(),
                body: body.clone(),
            }
        }
    }
}

impl ErrorTaxonomy {
    /// Short machine readable code stored in `errorCode`.
    pub fn code(&self) -> String {
        match self {
            Self::ConnectivityFailure { .. } => "CONNECTIVITY_ERROR".to_string(),
            Self::ApiFailure { .. } if self.is_validation() => "API_VALIDATION_ERROR".to_string(),
            Self::ApiFailure { status, .. } => format!("API_ERROR_{}", status),
            Self::RuntimeFailure { .. } => "RUNTIME_ERROR".to_string(),
            Self::UnknownFailure { .. } => "UNKNOWN_ERROR".to_string(),
        }
    }

    /// Human readable message, capped like any stored value.
    pub fn message(&self) -> String {
        let text = match self {
            Self::ConnectivityFailure { url, message } => {
                format!("no response from {}: {}", url, message)
            }
            Self::ApiFailure { url, status, error_id, body, .. } => {
                let mut text = format!("{} rejected the request with status {}", url, status);
                if let Some(id) = error_id {
                    text.push_str(&format!(" (error id {})", id));
                }
                if let Some(body) = body.as_deref().filter(|b| !b.is_empty()) {
                    text.push_str(": ");
                    text.push_str(body);
                }
                text
            }
            Self::RuntimeFailure { message, .. } | Self::UnknownFailure { message } => {
                message.clone()
            }
        };
        truncate(text)
    }

    /// Only connectivity failures are worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ConnectivityFailure { .. })
    }

    pub fn is_connectivity(&self) -> bool {
        matches!(self, Self::ConnectivityFailure { .. })
    }

    /// Status 400 with `VALIDATION_ERROR`: the request itself was invalid.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::ApiFailure { status: 400, error_code: Some(code), .. } if code == VALIDATION_ERROR_CODE
        )
    }

    pub fn is_api(&self) -> bool {
        matches!(self, Self::ApiFailure { .. })
    }

    /// Severity hint passed to the fatal-error channel.
    pub fn severity(&self) -> Severity {
        match self {
            Self::ConnectivityFailure { .. } => Severity::Warning,
            Self::ApiFailure { .. } | Self::UnknownFailure { .. } => Severity::Error,
            Self::RuntimeFailure { .. } => Severity::Fatal,
        }
    }

    /// Fill in the application state of a runtime failure that was raised without one.
    pub fn with_state(mut self, snapshot: serde_json::Value) -> Self {
        if let Self::RuntimeFailure { state: state @ None, .. } = &mut self {
            *state = Some(snapshot);
        }
        self
    }
}
