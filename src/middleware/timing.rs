//! Performance logging.
use super::action::Invocation;
use crate::config::DeliveryConfig;
use crate::event::Entry;
use crate::store::EventStore;
use futures::future::BoxFuture;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::time::Instant;
use tower_layer::Layer;
use tower_service::Service;

/// Records an `OK` event with the elapsed time of every successful invocation.
///
/// Responses and errors pass through unchanged. When disabled the layer only forwards.
#[derive(Debug, Clone)]
pub struct TimingLayer {
    store: Arc<EventStore>,
    enabled: bool,
}

impl TimingLayer {
    pub fn new(store: Arc<EventStore>, enabled: bool) -> Self {
        Self { store, enabled }
    }

    /// Enabled according to `performanceLogging`.
    pub fn from_config(store: Arc<EventStore>, config: &DeliveryConfig) -> Self {
        Self::new(store, config.performance_logging())
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }
}

impl<S> Layer<S> for TimingLayer {
    type Service = Timing<S>;

    fn layer(&self, inner: S) -> Self::Service {
        Timing { inner, policy: self.clone() }
    }
}

#[derive(Debug, Clone)]
pub struct Timing<S> {
    inner: S,
    policy: TimingLayer,
}

impl<S, P> Service<Invocation<P>> for Timing<S>
where
    S: Service<Invocation<P>> + Clone + Send + 'static,
    S::Response: Send + 'static,
    S::Error: Send + 'static,
    S::Future: Send + 'static,
    P: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Invocation<P>) -> Self::Future {
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        if !self.policy.enabled {
            return Box::pin(inner.call(req));
        }
        let store = self.policy.store.clone();
        let meta = req.meta().clone();
        Box::pin(async move {
            let start = Instant::now();
            let response = inner.call(req).await?;
            store.append(
                Entry::ok()
                    .action(meta.name())
                    .info_fields(meta.param_fields())
                    .elapsed(start.elapsed()),
            );
            Ok(response)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::EnvironmentContext;
    use crate::error::BoxError;
    use crate::event::LogResult;
    use crate::middleware::Action;
    use std::time::Duration;
    use tower::util::BoxCloneService;

    fn slow_handler() -> BoxCloneService<Invocation<u64>, u64, BoxError> {
        BoxCloneService::new(tower::service_fn(|inv: Invocation<u64>| async move {
            let ms = *inv.params();
            tokio::time::sleep(Duration::from_millis(ms)).await;
            if ms == 0 {
                return Err::<u64, BoxError>("zero".into());
            }
            Ok(ms)
        }))
    }

    #[tokio::test(start_paused = true)]
    async fn records_elapsed_time_on_success() {
        let store = Arc::new(EventStore::new(EnvironmentContext::new()));
        let action = Action::new("render", TimingLayer::new(store.clone(), true).layer(slow_handler()));

        assert_eq!(action.invoke(250).await.unwrap(), 250);
        let snap = store.snapshot(0);
        let event = &snap.events()[0];
        assert_eq!(event.result(), LogResult::Ok);
        assert_eq!(event.action(), Some("render"));
        assert!(event.elapsed_time() >= Duration::from_millis(250));
        assert_eq!(event.info().get("params"), Some("250"));
    }

    #[tokio::test(start_paused = true)]
    async fn errors_pass_through_without_events() {
        let store = Arc::new(EventStore::new(EnvironmentContext::new()));
        let action = Action::new("render", TimingLayer::new(store.clone(), true).layer(slow_handler()));
        assert_eq!(action.invoke(0).await.unwrap_err().to_string(), "zero");
        assert!(store.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn disabled_layer_records_nothing() {
        let store = Arc::new(EventStore::new(EnvironmentContext::new()));
        let config = DeliveryConfig::builder("https://c/logs").build().unwrap();
        let layer = TimingLayer::from_config(store.clone(), &config);
        assert!(!layer.is_enabled());
        let action = Action::new("render", layer.layer(slow_handler()));
        action.invoke(10).await.unwrap();
        assert!(store.is_empty());
    }
}
