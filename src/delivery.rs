//! One flush attempt: snapshot, send, then commit or apply the failure policy.
//!
//! | transport result      | buffer                            | events written       |
//! |-----------------------|-----------------------------------|----------------------|
//! | success               | snapshotted prefix removed        | none                 |
//! | connectivity failure  | untouched, retried next cycle     | none                 |
//! | API rejection         | everything discarded              | one `ERROR` meta-event |
//! | anything else         | untouched                         | none, fatal report   |
//!
//! A transport that panics is treated as a runtime failure; the unwind never reaches the caller.
use crate::classify::{classify, ErrorTaxonomy};
use crate::config::DeliveryConfig;
use crate::error::{RuntimeError, TransportError};
use crate::event::Entry;
use crate::fatal::FatalHandler;
use crate::store::EventStore;
use crate::transport::DeliveryRequest;
use futures::FutureExt;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tower::ServiceExt;
use tower_service::Service;

/// Action identifier of the events the delivery path writes about itself.
pub const FLUSH_ACTION: &str = "relaylog.flush";

/// What a single cycle did.
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    /// No delivery config; nothing attempted.
    Idle,
    /// Buffer was empty; no request made.
    Empty,
    /// Batch accepted and committed.
    Delivered { count: usize },
    /// Collector unreachable; `pending` events kept for the next cycle.
    Deferred { pending: usize },
    /// Collector rejected the batch; `count` events discarded and the loss recorded.
    Dropped { count: usize },
    /// Unclassified failure handed to the fatal-error channel.
    Failed(ErrorTaxonomy),
}

/// Runs flush attempts against one transport.
///
/// Cycles take `&mut self`, so one instance never has two attempts in flight.
pub struct DeliveryCycle<T> {
    store: Arc<EventStore>,
    config: Option<Arc<DeliveryConfig>>,
    transport: T,
    fatal: Arc<dyn FatalHandler>,
}

impl<T> fmt::Debug for DeliveryCycle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeliveryCycle")
            .field("store", &self.store)
            .field("config", &self.config)
            .field("transport", &"<transport>")
            .field("fatal", &self.fatal)
            .finish()
    }
}

impl<T> DeliveryCycle<T>
where
    T: Service<DeliveryRequest, Response = (), Error = TransportError> + Send,
    T::Future: Send,
{
    pub fn new(
        store: Arc<EventStore>,
        config: Option<Arc<DeliveryConfig>>,
        transport: T,
        fatal: Arc<dyn FatalHandler>,
    ) -> Self {
        Self { store, config, transport, fatal }
    }

    pub fn store(&self) -> &Arc<EventStore> {
        &self.store
    }

    /// Run one flush attempt to completion.
    pub async fn run(&mut self) -> CycleOutcome {
        let Some(config) = self.config.clone() else {
            return CycleOutcome::Idle;
        };

        let snapshot = self.store.snapshot(0);
        if snapshot.is_empty() {
            return CycleOutcome::Empty;
        }

        let request = match DeliveryRequest::batch(config.server_url(), snapshot.events()) {
            Ok(request) => request,
            Err(err) => {
                let failure =
                    classify(&RuntimeError::new(format!("failed to encode batch: {}", err)));
                return self.fail(failure);
            }
        };

        let transport = &mut self.transport;
        let round_trip = AssertUnwindSafe(async move {
            match transport.ready().await {
                Ok(transport) => transport.call(request).await,
                Err(err) => Err(err),
            }
        })
        .catch_unwind();

        match round_trip.await {
            Ok(Ok(())) => {
                let count = self.store.commit();
                tracing::debug!(count, "telemetry batch delivered");
                CycleOutcome::Delivered { count }
            }
            Ok(Err(err)) => self.on_failure(&err),
            Err(payload) => {
                let failure = classify(&RuntimeError::from_panic(payload));
                tracing::error!(message = %failure.message(), "transport panicked; batch kept");
                self.fail(failure)
            }
        }
    }

    fn fail(&self, failure: ErrorTaxonomy) -> CycleOutcome {
        self.fatal.report(&failure, failure.severity());
        CycleOutcome::Failed(failure)
    }

    fn on_failure(&self, err: &TransportError) -> CycleOutcome {
        match classify(err) {
            ErrorTaxonomy::ConnectivityFailure { .. } => {
                let pending = self.store.len();
                tracing::debug!(pending, "collector unreachable; keeping batch for next cycle");
                CycleOutcome::Deferred { pending }
            }
            failure @ ErrorTaxonomy::ApiFailure { .. } => {
                let count = self.store.discard_all();
                self.store.append(
                    Entry::error()
                        .action(FLUSH_ACTION)
                        .failure(failure.code(), failure.message())
                        .info("droppedCount", &count),
                );
                tracing::warn!(count, code = %failure.code(), "collector rejected batch; dropped");
                CycleOutcome::Dropped { count }
            }
            failure @ (ErrorTaxonomy::RuntimeFailure { .. } | ErrorTaxonomy::UnknownFailure { .. }) => {
                self.fail(failure)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::EnvironmentContext;
    use crate::event::LogResult;
    use crate::fatal::{MemoryFatalHandler, Severity};
    use crate::transport::MemoryTransport;

    fn config() -> Option<Arc<DeliveryConfig>> {
        Some(Arc::new(DeliveryConfig::builder("https://collector.test/logs").build().unwrap()))
    }

    fn cycle(
        transport: MemoryTransport,
    ) -> (DeliveryCycle<MemoryTransport>, Arc<EventStore>, MemoryFatalHandler) {
        let store = Arc::new(EventStore::new(EnvironmentContext::new()));
        let fatal = MemoryFatalHandler::new();
        let cycle = DeliveryCycle::new(store.clone(), config(), transport, Arc::new(fatal.clone()));
        (cycle, store, fatal)
    }

    #[tokio::test]
    async fn idle_without_config() {
        let transport = MemoryTransport::new();
        let store = Arc::new(EventStore::new(EnvironmentContext::new()));
        store.info("a", [("k", 1)]);
        let mut cycle = DeliveryCycle::new(
            store.clone(),
            None,
            transport.clone(),
            Arc::new(MemoryFatalHandler::new()),
        );
        assert_eq!(cycle.run().await, CycleOutcome::Idle);
        assert!(transport.is_empty());
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn empty_buffer_makes_no_request() {
        let transport = MemoryTransport::new();
        let (mut cycle, _, _) = cycle(transport.clone());
        assert_eq!(cycle.run().await, CycleOutcome::Empty);
        assert!(transport.is_empty());
    }

    #[tokio::test]
    async fn success_commits_batch() {
        let transport = MemoryTransport::new();
        let (mut cycle, store, _) = cycle(transport.clone());
        store.info("a", [("k", 1)]);
        store.info("b", [("k", 2)]);

        assert_eq!(cycle.run().await, CycleOutcome::Delivered { count: 2 });
        assert!(store.is_empty());
        let request = &transport.requests()[0];
        assert_eq!(request.url, "https://collector.test/logs");
        assert!(request.authenticated);
        assert_eq!(transport.batch_sizes(), vec![2]);
    }

    #[tokio::test]
    async fn connectivity_failure_keeps_everything_silently() {
        let transport = MemoryTransport::failing(TransportError::connectivity("u", "offline"));
        let (mut cycle, store, fatal) = cycle(transport.clone());
        store.info("a", [("k", 1)]);

        for _ in 0..3 {
            assert_eq!(cycle.run().await, CycleOutcome::Deferred { pending: 1 });
        }
        assert_eq!(store.len(), 1);
        assert!(store.snapshot(0).iter().all(|e| e.action() != Some(FLUSH_ACTION)));
        assert!(fatal.is_empty());
        assert_eq!(transport.batch_sizes(), vec![1, 1, 1]);
    }

    #[tokio::test]
    async fn api_failure_drops_buffer_and_records_loss() {
        let transport = MemoryTransport::failing(TransportError::api("u", 500));
        let (mut cycle, store, fatal) = cycle(transport);
        for i in 0..7 {
            store.info("a", [("i", i)]);
        }

        assert_eq!(cycle.run().await, CycleOutcome::Dropped { count: 7 });
        assert_eq!(store.len(), 1);
        let snap = store.snapshot(0);
        let meta = &snap.events()[0];
        assert_eq!(meta.result(), LogResult::Error);
        assert_eq!(meta.action(), Some(FLUSH_ACTION));
        assert_eq!(meta.error_code(), Some("API_ERROR_500"));
        assert_eq!(meta.info().get("droppedCount"), Some("7"));
        assert!(fatal.is_empty());
    }

    #[tokio::test]
    async fn panicking_transport_is_reported_and_keeps_batch() {
        let store = Arc::new(EventStore::new(EnvironmentContext::new()));
        let fatal = MemoryFatalHandler::new();
        let transport = tower::service_fn(|_req: DeliveryRequest| async {
            if true {
                panic!("socket layer exploded");
            }
            Ok::<(), TransportError>(())
        });
        let mut cycle = DeliveryCycle::new(store.clone(), config(), transport, Arc::new(fatal.clone()));
        store.info("a", [("k", 1)]);

        match cycle.run().await {
            CycleOutcome::Failed(ErrorTaxonomy::RuntimeFailure { message, .. }) => {
                assert!(message.contains("socket layer exploded"))
            }
            other => panic!("unexpected outcome {other:?}"),
        }
        assert_eq!(store.len(), 1);
        let reports = fatal.reports();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].1, Severity::Fatal);
    }

    #[test]
    fn fatal_reports_carry_the_failure_severity() {
        let (cycle, _, fatal) = cycle(MemoryTransport::new());
        let unknown = ErrorTaxonomy::UnknownFailure { message: "odd".to_string() };
        assert_eq!(cycle.fail(unknown.clone()), CycleOutcome::Failed(unknown));
        assert_eq!(fatal.reports()[0].1, Severity::Error);
    }

    #[tokio::test]
    async fn recovery_after_outage_delivers_backlog() {
        let transport = MemoryTransport::new();
        transport.push_response(Err(TransportError::connectivity("u", "offline")));
        let (mut cycle, store, _) = cycle(transport.clone());
        store.info("a", [("k", 1)]);

        assert!(matches!(cycle.run().await, CycleOutcome::Deferred { .. }));
        store.info("b", [("k", 2)]);
        assert_eq!(cycle.run().await, CycleOutcome::Delivered { count: 2 });
        assert_eq!(transport.batch_sizes(), vec![1, 2]);
    }
}
