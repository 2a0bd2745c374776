//! Invocation metadata and the caller-facing [`Action`] entry point.
use crate::config::DeliveryConfig;
use crate::event::render;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tower::ServiceExt;
use tower_service::Service;

/// Replacement text for masked parameter values.
pub const MASK: &str = "***";

/// Masks parameters whose key contains any configured keyword (case-insensitive).
#[derive(Debug, Clone)]
pub struct Masker {
    keywords: Arc<[String]>,
}

impl Default for Masker {
    fn default() -> Self {
        Self { keywords: Arc::from(Vec::new()) }
    }
}

impl Masker {
    pub fn new<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let keywords: Vec<String> = keywords
            .into_iter()
            .map(|k| k.as_ref().trim().to_lowercase())
            .filter(|k| !k.is_empty())
            .collect();
        Self { keywords: keywords.into() }
    }

    pub fn from_config(config: &DeliveryConfig) -> Self {
        Self::new(config.masked_keywords())
    }

    fn matches(&self, key: &str) -> bool {
        let key = key.to_lowercase();
        self.keywords.iter().any(|k| key.contains(k.as_str()))
    }

    /// Mask a JSON value recursively.
    pub fn mask_value(&self, value: Value) -> Value {
        if self.keywords.is_empty() {
            return value;
        }
        match value {
            Value::Object(map) => Value::Object(
                map.into_iter()
                    .map(|(k, v)| {
                        let v = if self.matches(&k) {
                            Value::String(MASK.to_string())
                        } else {
                            self.mask_value(v)
                        };
                        (k, v)
                    })
                    .collect(),
            ),
            Value::Array(items) => {
                Value::Array(items.into_iter().map(|v| self.mask_value(v)).collect())
            }
            other => other,
        }
    }

    /// Serialize `params` and mask the result. Serialization failures degrade to a string.
    pub fn mask<P: Serialize + ?Sized>(&self, params: &P) -> Value {
        match serde_json::to_value(params) {
            Ok(value) => self.mask_value(value),
            Err(err) => {
                tracing::warn!(error = %err, "action parameters could not be serialized");
                Value::String(crate::event::degraded(&err.to_string()))
            }
        }
    }
}

/// Name and masked parameters of one invocation, visible to every decorator.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionMeta {
    name: Arc<str>,
    params: Arc<Value>,
}

impl ActionMeta {
    pub fn new(name: impl Into<Arc<str>>, masked_params: Value) -> Self {
        Self { name: name.into(), params: Arc::new(masked_params) }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Masked parameters.
    pub fn params(&self) -> &Value {
        &self.params
    }

    /// Masked parameters flattened into event `info` pairs.
    ///
    /// Top-level object keys become fields; any other shape is stored under `params`.
    pub fn param_fields(&self) -> Vec<(String, String)> {
        match self.params.as_ref() {
            Value::Object(map) => map.iter().map(|(k, v)| (k.clone(), value_text(v))).collect(),
            Value::Null => Vec::new(),
            other => vec![("params".to_string(), value_text(other))],
        }
    }
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => render(other),
    }
}

/// Request type flowing through a decorated handler.
#[derive(Debug, Clone)]
pub struct Invocation<P> {
    meta: ActionMeta,
    params: P,
}

impl<P> Invocation<P> {
    pub fn new(meta: ActionMeta, params: P) -> Self {
        Self { meta, params }
    }

    pub fn meta(&self) -> &ActionMeta {
        &self.meta
    }

    pub fn params(&self) -> &P {
        &self.params
    }

    pub fn into_params(self) -> P {
        self.params
    }

    pub fn into_parts(self) -> (ActionMeta, P) {
        (self.meta, self.params)
    }
}

/// A named, decorated handler that callers invoke with plain parameters.
#[derive(Clone)]
pub struct Action<S> {
    name: Arc<str>,
    service: S,
    masker: Masker,
}

impl<S> fmt::Debug for Action<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Action")
            .field("name", &self.name)
            .field("service", &"<service>")
            .field("masker", &self.masker)
            .finish()
    }
}

impl<S> Action<S> {
    pub fn new(name: impl Into<Arc<str>>, service: S) -> Self {
        Self { name: name.into(), service, masker: Masker::default() }
    }

    pub fn with_masker(mut self, masker: Masker) -> Self {
        self.masker = masker;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Invoke the handler chain once.
    pub async fn invoke<P>(&self, params: P) -> Result<S::Response, S::Error>
    where
        S: Service<Invocation<P>> + Clone,
        P: Serialize,
    {
        let meta = ActionMeta::new(self.name.clone(), self.masker.mask(&params));
        self.service.clone().oneshot(Invocation::new(meta, params)).await
    }
}
