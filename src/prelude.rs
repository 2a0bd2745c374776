//! Convenient re-exports for common relaylog types.
pub use crate::{
    classify::{classify, ErrorTaxonomy},
    config::DeliveryConfig,
    context::EnvironmentContext,
    delivery::{CycleOutcome, DeliveryCycle},
    error::{BoxError, RuntimeError, TransportError},
    event::{Entry, LogEvent, LogResult},
    fatal::{FatalHandler, Severity},
    middleware::{
        wrap, Action, Chain, Invocation, ReportLayer, SuppressLayer, TimingLayer,
    },
    pipeline::Pipeline,
    scheduler::SchedulerHandle,
    store::EventStore,
    transport::{DeliveryRequest, MemoryTransport},
};
