//! # dcf-panel
//!
//! Synthetic panel data for the deconfounder study.
//!
//! - [`generate_panel`] draws one latent trait per entity and a cumulative,
//!   trait-driven observed series per entity (wide layout).
//! - [`melt`] reshapes the wide panel into long records and
//!   [`LongPanel::assign_outcome`] derives the ground-truth outcome column.
//!
//! All randomness comes from a caller-owned generator passed by `&mut`.

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Panel and outcome configuration with validation.
pub mod config;
/// Wide panel generation.
pub mod generator;
/// Wide-to-long reshaping and outcome derivation.
pub mod long;

pub use config::{OutcomeConfig, PanelConfig};
pub use generator::{WidePanel, generate_panel};
pub use long::{LongPanel, LongRecord, melt};
