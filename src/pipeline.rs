//! Owned assembly of the store, delivery settings, and fatal-error channel.
//!
//! There is no global instance: the host builds one [`Pipeline`] at startup and hands clones of
//! its parts to whatever records telemetry.
use crate::config::DeliveryConfig;
use crate::context::EnvironmentContext;
use crate::delivery::DeliveryCycle;
use crate::error::{ConfigError, TransportError};
use crate::fatal::{FatalHandler, TracingFatalHandler};
use crate::middleware::{Action, Masker, ReportLayer, SuppressLayer, TimingLayer};
use crate::scheduler::{FlushScheduler, SchedulerHandle, DEFAULT_FLUSH_INTERVAL};
use crate::store::{EventStore, DEFAULT_CAPACITY};
use crate::transport::DeliveryRequest;
use std::sync::Arc;
use std::time::Duration;
use tower_service::Service;

#[derive(Debug, Clone)]
pub struct Pipeline {
    store: Arc<EventStore>,
    config: Option<Arc<DeliveryConfig>>,
    fatal: Arc<dyn FatalHandler>,
    masker: Masker,
    interval: Duration,
}

impl Pipeline {
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::default()
    }

    /// Builder preloaded from `RELAYLOG_*` environment variables.
    pub fn from_env() -> Result<PipelineBuilder, ConfigError> {
        let mut builder = PipelineBuilder::default();
        builder.config = DeliveryConfig::from_env()?;
        Ok(builder)
    }

    pub fn store(&self) -> &Arc<EventStore> {
        &self.store
    }

    pub fn config(&self) -> Option<&DeliveryConfig> {
        self.config.as_deref()
    }

    pub fn fatal_handler(&self) -> &Arc<dyn FatalHandler> {
        &self.fatal
    }

    pub fn masker(&self) -> &Masker {
        &self.masker
    }

    pub fn flush_interval(&self) -> Duration {
        self.interval
    }

    pub fn delivery_cycle<T>(&self, transport: T) -> DeliveryCycle<T>
    where
        T: Service<DeliveryRequest, Response = (), Error = TransportError> + Send,
        T::Future: Send,
    {
        DeliveryCycle::new(self.store.clone(), self.config.clone(), transport, self.fatal.clone())
    }

    /// Start periodic delivery over `transport`. Must be called inside a tokio runtime.
    pub fn spawn_scheduler<T>(&self, transport: T) -> SchedulerHandle
    where
        T: Service<DeliveryRequest, Response = (), Error = TransportError> + Send + 'static,
        T::Future: Send,
    {
        if self.config.is_none() {
            tracing::info!("no delivery config; events will be buffered but not sent");
        }
        FlushScheduler::new(self.delivery_cycle(transport)).with_interval(self.interval).spawn()
    }

    /// Name a decorated handler, masking with the configured keywords.
    pub fn action<S>(&self, name: impl Into<Arc<str>>, service: S) -> Action<S> {
        Action::new(name, service).with_masker(self.masker.clone())
    }

    pub fn suppress_connectivity(&self) -> SuppressLayer {
        SuppressLayer::connectivity(self.store.clone())
    }

    pub fn suppress_validation(&self) -> SuppressLayer {
        SuppressLayer::validation(self.store.clone())
    }

    /// Timing layer following `performanceLogging`; disabled without a config.
    pub fn timing(&self) -> TimingLayer {
        let enabled = self.config.as_ref().is_some_and(|c| c.performance_logging());
        TimingLayer::new(self.store.clone(), enabled)
    }

    pub fn report(&self) -> ReportLayer {
        ReportLayer::new(self.store.clone(), self.fatal.clone())
    }
}

/// Builder for [`Pipeline`].
#[derive(Debug)]
pub struct PipelineBuilder {
    capacity: usize,
    context: Option<EnvironmentContext>,
    config: Option<DeliveryConfig>,
    fatal: Arc<dyn FatalHandler>,
    interval: Duration,
}

impl Default for PipelineBuilder {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            context: None,
            config: None,
            fatal: Arc::new(TracingFatalHandler),
            interval: DEFAULT_FLUSH_INTERVAL,
        }
    }
}

impl PipelineBuilder {
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Replace the default enrichment (session id, platform, SDK version).
    pub fn context(mut self, context: EnvironmentContext) -> Self {
        self.context = Some(context);
        self
    }

    pub fn config(mut self, config: DeliveryConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn fatal_handler<H>(mut self, handler: H) -> Self
    where
        H: FatalHandler + 'static,
    {
        self.fatal = Arc::new(handler);
        self
    }

    pub fn flush_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Validate the delivery config (if any) and assemble the pipeline.
    pub fn build(self) -> Result<Pipeline, ConfigError> {
        if let Some(config) = &self.config {
            config.validate()?;
        }
        let context = self.context.unwrap_or_else(EnvironmentContext::with_defaults);
        let masker = self.config.as_ref().map(Masker::from_config).unwrap_or_default();
        Ok(Pipeline {
            store: Arc::new(EventStore::with_capacity(context, self.capacity)),
            config: self.config.map(Arc::new),
            fatal: self.fatal,
            masker,
            interval: self.interval,
        })
    }
}
