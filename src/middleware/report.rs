//! Outermost policy: record and report every failure that survived the inner decorators.
//!
//! A panic inside the handler (or any layer below) is caught and turned into a
//! [`RuntimeError`], so callers always get an `Err` rather than an unwinding task.
use super::action::Invocation;
use crate::classify::{classify, ErrorTaxonomy};
use crate::error::{panic_message, BoxError, RuntimeError};
use crate::event::Entry;
use crate::fatal::FatalHandler;
use crate::store::EventStore;
use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::Value;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower_layer::Layer;
use tower_service::Service;

/// Produces a snapshot of application state attached to runtime failures.
pub type StateSource = Arc<dyn Fn() -> Value + Send + Sync>;

#[derive(Clone)]
pub struct ReportLayer {
    store: Arc<EventStore>,
    fatal: Arc<dyn FatalHandler>,
    state: Option<StateSource>,
}

impl fmt::Debug for ReportLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReportLayer")
            .field("fatal", &self.fatal)
            .field("state", &self.state.as_ref().map(|_| "<fn>"))
            .finish_non_exhaustive()
    }
}

impl ReportLayer {
    pub fn new(store: Arc<EventStore>, fatal: Arc<dyn FatalHandler>) -> Self {
        Self { store, fatal, state: None }
    }

    /// Attach `source()` as the state of runtime failures that carry none.
    pub fn with_state_source<F>(mut self, source: F) -> Self
    where
        F: Fn() -> Value + Send + Sync + 'static,
    {
        self.state = Some(Arc::new(source));
        self
    }

    fn capture_state(&self) -> Option<Value> {
        let source = self.state.as_ref()?;
        match std::panic::catch_unwind(AssertUnwindSafe(|| source())) {
            Ok(state) => Some(state),
            Err(payload) => {
                tracing::warn!(panic = %panic_message(payload.as_ref()), "state source panicked");
                None
            }
        }
    }

    fn record(&self, action: &str, params: Vec<(String, String)>, err: &BoxError) {
        let mut failure = classify(&**err);
        if let ErrorTaxonomy::RuntimeFailure { state: None, .. } = failure {
            if let Some(state) = self.capture_state() {
                failure = failure.with_state(state);
            }
        }
        if let ErrorTaxonomy::UnknownFailure { message } = &failure {
            tracing::warn!(action, %message, "unclassified failure");
        }
        self.store.append(
            Entry::error()
                .action(action)
                .info_fields(params)
                .failure(failure.code(), failure.message()),
        );
        self.fatal.report(&failure, failure.severity());
    }
}

impl<S> Layer<S> for ReportLayer {
    type Service = Report<S>;

    fn layer(&self, inner: S) -> Self::Service {
        Report { inner, policy: self.clone() }
    }
}

#[derive(Clone, Debug)]
pub struct Report<S> {
    inner: S,
    policy: ReportLayer,
}

impl<S, P> Service<Invocation<P>> for Report<S>
where
    S: Service<Invocation<P>> + Clone + Send + 'static,
    S::Response: Send + 'static,
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
        // `call` itself runs inside the guarded future so synchronous panics are caught too.
        let guarded = AssertUnwindSafe(async move { inner.call(req).await.map_err(Into::<BoxError>::into) })
            .catch_unwind();
        Box::pin(async move {
            let err: BoxError = match guarded.await {
                Ok(Ok(response)) => return Ok(response),
                Ok(Err(err)) => err,
                Err(payload) => RuntimeError::from_panic(payload).into(),
            };
            policy.record(meta.name(), meta.param_fields(), &err);
            Err(err)
        })
    }
}
