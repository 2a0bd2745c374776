//! Decorators for asynchronous business actions.
//!
//! A handler is a `tower::Service<Invocation<P>>`. Decorators are layers over it, composed with
//! [`wrap`] or [`Chain`] so that the first one listed sits closest to the handler. Callers go
//! through an [`Action`], which masks the parameters once and attaches the action name.
//!
//! ```ignore
//! let action = Chain::new(handler)
//!     .with(SuppressLayer::connectivity(store.clone()))
//!     .with(ReportLayer::new(store, fatal))
//!     .into_action("sync_profile");
//! ```
//!
//! Here a connectivity failure is recorded as a `WARN` event and never reaches the report
//! layer; every other failure is recorded once as `ERROR`, reported, and returned.
mod action;
mod chain;
mod report;
mod suppress;
mod timing;

pub use action::{Action, ActionMeta, Invocation, Masker, MASK};
pub use chain::{wrap, Chain, Decorators};
pub use report::{Report, ReportLayer, StateSource};
pub use suppress::{Matcher, Suppress, SuppressLayer, SILENT_KEY};
pub use timing::{Timing, TimingLayer};
