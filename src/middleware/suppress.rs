//! Suppress-and-warn policy.
//!
//! A matched failure is recorded as one `WARN` event carrying the masked parameters and
//! `isSilent=true`, and the call resolves to `Response::default()`. Anything else is returned
//! unchanged, so outer decorators see exactly what the handler produced.
use super::action::Invocation;
use crate::classify::{classify, ErrorTaxonomy};
use crate::error::BoxError;
use crate::event::{Entry, MAX_FIELDS};
use crate::store::EventStore;
use futures::future::BoxFuture;
use std::fmt;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower_layer::Layer;
use tower_service::Service;

/// Info key marking a suppressed failure. Always kept, whatever the parameters are.
pub const SILENT_KEY: &str = "isSilent";

/// Decides which classified failures a [`SuppressLayer`] absorbs.
pub type Matcher = Arc<dyn Fn(&ErrorTaxonomy) -> bool + Send + Sync>;

#[derive(Clone)]
pub struct SuppressLayer {
    store: Arc<EventStore>,
    matcher: Matcher,
    label: &'static str,
}

impl fmt::Debug for SuppressLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SuppressLayer").field("label", &self.label).finish_non_exhaustive()
    }
}

impl SuppressLayer {
    pub fn new<F>(store: Arc<EventStore>, label: &'static str, matcher: F) -> Self
    where
        F: Fn(&ErrorTaxonomy) -> bool + Send + Sync + 'static,
    {
        Self { store, matcher: Arc::new(matcher), label }
    }

    /// Absorb collector-unreachable failures.
    pub fn connectivity(store: Arc<EventStore>) -> Self {
        Self::new(store, "connectivity", ErrorTaxonomy::is_connectivity)
    }

    /// Absorb `400 VALIDATION_ERROR` rejections.
    pub fn validation(store: Arc<EventStore>) -> Self {
        Self::new(store, "validation", ErrorTaxonomy::is_validation)
    }

    pub fn label(&self) -> &'static str {
        self.label
    }
}

impl<S> Layer<S> for SuppressLayer {
    type Service = Suppress<S>;

    fn layer(&self, inner: S) -> Self::Service {
        Suppress { inner, policy: self.clone() }
    }
}

/// Service produced by [`SuppressLayer`].
#[derive(Clone, Debug)]
pub struct Suppress<S> {
    inner: S,
    policy: SuppressLayer,
}

impl<S, P> Service<Invocation<P>> for Suppress<S>
where
    S: Service<Invocation<P>> + Clone + Send + 'static,
    S::Response: Default + Send + 'static,
    S::Error: Into<BoxError>,
    S::Future: Send + 'static,
    P: Send + 'static,
{
    type Response = S::Response;
    type Error = BoxError;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx).map_err(Into::into)
    }

    fn call(&mut self, req: Invocation<P>) -> Self::Future {
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let policy = self.policy.clone();
        let meta = req.meta().clone();
        Box::pin(async move {
            let err: BoxError = match inner.call(req).await {
                Ok(response) => return Ok(response),
                Err(err) => err.into(),
            };
            let failure = classify(&*err);
            if !(policy.matcher)(&failure) {
                return Err(err);
            }
            policy.store.append(
                Entry::warn()
                    .action(meta.name())
                    .info_fields(
                        meta.param_fields()
                            .into_iter()
                            .filter(|(key, _)| key != SILENT_KEY)
                            .take(MAX_FIELDS - 1),
                    )
                    .info(SILENT_KEY, &true)
                    .failure(failure.code(), failure.message()),
            );
            tracing::debug!(
                action = meta.name(),
                policy = policy.label,
                code = %failure.code(),
                "failure suppressed"
            );
            Ok(S::Response::default())
        })
    }
}
