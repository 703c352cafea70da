//! Panel econometrics.
//!
//! This module provides:
//! - **Within estimator**: entity-demeaned OLS that absorbs every
//!   time-invariant entity trait, observed or not.
//! - **Cluster-robust covariance** (Liang–Zeger HC0 sandwich with the usual
//!   small-sample correction), shared with the pooled OLS fits.

pub mod panel;

pub use panel::{WithinFit, cluster_robust_se, within_fit};
