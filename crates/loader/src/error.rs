use std::sync::Arc;

use thiserror::Error;

/// Terminal failure produced by a loader.
///
/// Cloneable so every observer snapshot can carry the same failure without
/// re-running the loader.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct LoadError {
	message: Arc<str>,
}

impl LoadError {
	/// Creates a load error from a display message.
	pub fn new(message: impl Into<String>) -> Self {
		Self {
			message: message.into().into(),
		}
	}

	/// Failure message.
	pub fn message(&self) -> &str {
		&self.message
	}
}

impl From<&str> for LoadError {
	fn from(message: &str) -> Self {
		Self::new(message)
	}
}

impl From<String> for LoadError {
	fn from(message: String) -> Self {
		Self::new(message)
	}
}

/// Configuration failure reported at construction time, never deferred into
/// the async state machine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
	/// The batch form has no meaningful default presentation for a loaded
	/// tree, so a renderer is required up front.
	#[error("batch loadable requires a renderer")]
	MissingRenderer,
	/// An identifier in the module tree did not resolve to a loader.
	#[error("unresolved module identifier: {0}")]
	UnresolvedIdentifier(String),
}
