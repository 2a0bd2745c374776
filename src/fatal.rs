//! Process-wide channel for failures nothing else recovered from.
use crate::classify::ErrorTaxonomy;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

/// Severity hint attached to a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Severity {
    Warning,
    Error,
    Fatal,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Warning => f.write_str("warning"),
            Severity::Error => f.write_str("error"),
            Severity::Fatal => f.write_str("fatal"),
        }
    }
}

/// Receives unrecovered failures from the delivery cycle and the middleware chain.
///
/// Implementations decide how a failure becomes operator-visible; they must not panic.
pub trait FatalHandler: Send + Sync + fmt::Debug {
    fn report(&self, failure: &ErrorTaxonomy, severity: Severity);
}

/// Default handler: emits a `tracing` event.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingFatalHandler;

impl FatalHandler for TracingFatalHandler {
    fn report(&self, failure: &ErrorTaxonomy, severity: Severity) {
        let code = failure.code();
        let message = failure.message();
        match severity {
            Severity::Warning => tracing::warn!(%code, %severity, "{}", message),
            Severity::Error | Severity::Fatal => tracing::error!(%code, %severity, "{}", message),
        }
    }
}

/// Handler that keeps every report in memory. Useful in tests.
#[derive(Debug, Default, Clone)]
pub struct MemoryFatalHandler {
    reports: Arc<Mutex<Vec<(ErrorTaxonomy, Severity)>>>,
}

impl MemoryFatalHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reports(&self) -> Vec<(ErrorTaxonomy, Severity)> {
        self.reports.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn len(&self) -> usize {
        self.reports.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.reports.lock().unwrap_or_else(PoisonError::into_inner).clear();
    }
}

impl FatalHandler for MemoryFatalHandler {
    fn report(&self, failure: &ErrorTaxonomy, severity: Severity) {
        self.reports
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((failure.clone(), severity));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_handler_records_and_clears() {
        let handler = MemoryFatalHandler::new();
        let clone = handler.clone();
        let failure = ErrorTaxonomy::UnknownFailure { message: "x".into() };
        clone.report(&failure, Severity::Error);
        assert_eq!(handler.reports(), vec![(failure, Severity::Error)]);
        handler.clear();
        assert!(handler.is_empty());
    }

    #[test]
    fn tracing_handler_does_not_panic() {
        let failure = ErrorTaxonomy::RuntimeFailure { message: "boom".into(), state: None };
        TracingFatalHandler.report(&failure, Severity::Fatal);
        TracingFatalHandler.report(&failure, Severity::Warning);
    }

    #[test]
    fn severities_are_ordered() {
        assert!(Severity::Warning < Severity::Error);
        assert!(Severity::Error < Severity::Fatal);
        assert_eq!(Severity::Fatal.to_string(), "fatal");
    }
}
