#![forbid(unsafe_code)]
#![cfg_attr(not(test), deny(clippy::all))]

//! # relaylog
//!
//! Client-side telemetry: buffer structured events in memory, ship them to a collector in
//! batches, and decorate business actions with failure policies that log what they absorb.
//!
//! ## Pieces
//!
//! - **[`EventStore`]**: bounded buffer with snapshot/commit delivery semantics
//! - **[`EnvironmentContext`]**: key/value enrichment (literal or computed) added to every event
//! - **[`DeliveryCycle`]** and **[`FlushScheduler`]**: one flush attempt, and the loop that
//!   repeats it every 30 seconds
//! - **[`classify`]**: maps any failure onto the closed [`ErrorTaxonomy`]
//! - **[`middleware`]**: tower layers that suppress, time, and report handler failures
//!
//! ## Quick Start
//!
//! ```rust
//! use relaylog::prelude::*;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), BoxError> {
//! let config = DeliveryConfig::builder("https://collector.example/logs")
//!     .masked_keywords(["password"])
//!     .build()?;
//! let pipeline = Pipeline::builder().config(config).build()?;
//!
//! let login = Chain::new(tower::service_fn(|inv: Invocation<serde_json::Value>| async move {
//!     Ok::<_, BoxError>(inv.params()["user"].as_str().map(str::to_owned))
//! }))
//! .with(pipeline.suppress_connectivity())
//! .with(pipeline.report());
//! let login = pipeline.action("login", login.into_inner());
//!
//! let user = login.invoke(serde_json::json!({"user": "ann", "password": "x"})).await?;
//! assert_eq!(user.as_deref(), Some("ann"));
//!
//! let transport = MemoryTransport::new();
//! let scheduler = pipeline.spawn_scheduler(transport);
//! scheduler.stop().await?;
//! # Ok(())
//! # }
//! ```

pub mod classify;
pub mod config;
pub mod context;
pub mod delivery;
pub mod error;
pub mod event;
pub mod fatal;
pub mod middleware;
pub mod pipeline;
pub mod prelude;
pub mod scheduler;
pub mod sleeper;
pub mod store;
pub mod transport;

// Re-exports
pub use classify::{classify, ErrorTaxonomy};
pub use config::{DeliveryConfig, DeliveryConfigBuilder};
pub use context::{ContextValue, EnvironmentContext};
pub use delivery::{CycleOutcome, DeliveryCycle};
pub use error::{BoxError, ConfigError, RuntimeError, TransportError};
pub use event::{Entry, Fields, LogEvent, LogResult};
pub use fatal::{FatalHandler, MemoryFatalHandler, Severity, TracingFatalHandler};
pub use pipeline::{Pipeline, PipelineBuilder};
pub use scheduler::{FlushScheduler, SchedulerHandle};
pub use sleeper::{Sleeper, TokioSleeper, TrackingSleeper};
pub use store::{EventStore, Snapshot};
pub use transport::{DeliveryRequest, MemoryTransport, Method, NullTransport};
