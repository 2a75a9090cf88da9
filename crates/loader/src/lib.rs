//! Deferred, batched loading of modules with observable load state.
//!
//! A declaration wraps one loader (or a nested tree of module identifiers)
//! in a [`Loadable`]/[`BatchLoadable`]; a [`Subscription`] tracks the load
//! with delay/timeout/retry semantics and fans state transitions out to
//! observers; the [`LoadRegistry`] collects initializers so a startup or
//! server-rendering driver can drain every pending load before declaring
//! the system ready. Tree flattening and reconstruction live in
//! [`lode_treemap`], re-exported as [`treemap`].

mod batch;
mod config;
mod driver;
mod error;
mod loadable;
mod registry;
mod spawn;
mod state;
mod subscription;
mod unit;

pub use lode_treemap as treemap;

pub use crate::batch::BatchLoadUnit;
pub use crate::config::{AvailabilityCheck, LoadOptions};
pub use crate::driver::LoadDriver;
pub use crate::error::{ConfigError, LoadError};
pub use crate::loadable::{
	BatchLoadable, BatchLoadableSpec, BatchRenderer, LoadView, Loadable, LoadableSpec, PendingView, Render, ResolveFn,
	RetryHandle,
};
pub use crate::registry::{InitFuture, Initializer, LoadRegistry};
pub use crate::state::LoadState;
pub use crate::subscription::{ObserverId, Subscription};
pub use crate::unit::{LoadFuture, LoadUnit, LoaderFn};
