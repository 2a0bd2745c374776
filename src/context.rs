//! Environment context attached to every event at append time.
use crate::error::{panic_message, BoxError};
use crate::event::{degraded, Fields};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Instant;

/// Lazily evaluated context value.
pub type Provider = Arc<dyn Fn() -> Result<String, BoxError> + Send + Sync>;

/// A context entry: either fixed text or a provider evaluated on each append.
#[derive(Clone)]
pub enum ContextValue {
    Literal(String),
    Provider(Provider),
}

impl ContextValue {
    /// Wrap a provider closure.
    pub fn provider<F>(f: F) -> Self
    where
        F: Fn() -> Result<String, BoxError> + Send + Sync + 'static,
    {
        Self::Provider(Arc::new(f))
    }

    fn evaluate(&self, key: &str) -> String {
        match self {
            ContextValue::Literal(s) => s.clone(),
            ContextValue::Provider(f) => match panic::catch_unwind(AssertUnwindSafe(|| f())) {
                Ok(Ok(value)) => value,
                Ok(Err(err)) => {
                    tracing::warn!(key, error = %err, "context provider failed");
                    degraded(&err.to_string())
                }
                Err(payload) => {
                    let reason = panic_message(payload.as_ref());
                    tracing::warn!(key, %reason, "context provider panicked");
                    degraded(&reason)
                }
            },
        }
    }
}

impl fmt::Debug for ContextValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContextValue::Literal(s) => f.debug_tuple("Literal").field(s).finish(),
            ContextValue::Provider(_) => f.write_str("Provider(<fn>)"),
        }
    }
}

impl From<&str> for ContextValue {
    fn from(value: &str) -> Self {
        Self::Literal(value.to_string())
    }
}

impl From<String> for ContextValue {
    fn from(value: String) -> Self {
        Self::Literal(value)
    }
}

/// Process-wide enrichment shared by all events of one [`EventStore`](crate::EventStore).
///
/// Keys keep their first insertion position; re-adding a key replaces its value.
#[derive(Debug, Default)]
pub struct EnvironmentContext {
    entries: RwLock<Vec<(String, ContextValue)>>,
}

impl EnvironmentContext {
    /// Empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Context pre-populated with platform defaults:
    /// `sessionId`, `os`, `arch`, `pid`, `sdkVersion` and a lazy `uptimeMs`.
    pub fn with_defaults() -> Self {
        let ctx = Self::new();
        let started = Instant::now();
        ctx.add_context([
            ("sessionId", ContextValue::from(uuid::Uuid::new_v4().to_string())),
            ("os", ContextValue::from(std::env::consts::OS)),
            ("arch", ContextValue::from(std::env::consts::ARCH)),
            ("pid", ContextValue::from(std::process::id().to_string())),
            ("sdkVersion", ContextValue::from(env!("CARGO_PKG_VERSION"))),
        ]);
        ctx.add_provider("uptimeMs", move || Ok(started.elapsed().as_millis().to_string()));
        ctx
    }

    /// Merge entries; new keys overwrite existing ones.
    pub fn add_context<I, K, V>(&self, entries: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<ContextValue>,
    {
        let mut guard = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        for (key, value) in entries {
            let key = key.into();
            let value = value.into();
            match guard.iter_mut().find(|(k, _)| *k == key) {
                Some(slot) => slot.1 = value,
                None => guard.push((key, value)),
            }
        }
    }

    /// Register a single lazily evaluated entry.
    pub fn add_provider<F>(&self, key: impl Into<String>, provider: F)
    where
        F: Fn() -> Result<String, BoxError> + Send + Sync + 'static,
    {
        self.add_context([(key.into(), ContextValue::provider(provider))]);
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Evaluate every entry into capped event fields. Never fails.
    pub fn evaluate(&self) -> Fields {
        let entries: Vec<(String, ContextValue)> =
            self.entries.read().unwrap_or_else(PoisonError::into_inner).clone();
        let (fields, dropped) =
            Fields::capped(entries.into_iter().map(|(k, v)| {
                let value = v.evaluate(&k);
                (k, value)
            }));
        if dropped > 0 {
            tracing::warn!(dropped, "environment context exceeds field cap");
        }
        fields
    }
}
