//! # dcf-core
//!
//! Shared error and result types for the deconfounder study workspace.
//!
//! Every other crate depends on this one and nothing else internal:
//! `dcf-panel` produces the data, `dcf-inference` fits the models, and both
//! report failures through [`Error`] and fit output through [`FitSummary`].

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod types;

pub use error::{Error, Result};
pub use types::{Coefficient, FitMethod, FitSummary, TestStatistic};

/// Workspace version, reported by the CLI.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
