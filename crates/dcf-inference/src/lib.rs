//! # dcf-inference
//!
//! Confounder recovery and evaluation for the deconfounder study.
//!
//! This crate provides:
//! - OLS with classical and entity-clustered inference ([`regression`])
//! - Random-intercept linear mixed model, REML/ML ([`lmm`])
//! - Entity fixed-effects ("within") estimator ([`econometrics`])
//! - Latent-trait reconstruction strategies: PCA and one-factor analysis
//!   ([`reconstruct`])
//! - The end-to-end study: generate → reconstruct → reshape → fit
//!   ([`deconfounder`])

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Study configuration.
pub mod config;
/// End-to-end study orchestration and bias comparison.
pub mod deconfounder;
/// Panel econometrics: within estimator and cluster-robust covariance.
pub mod econometrics;
/// Random-intercept linear mixed model.
pub mod lmm;
/// One-dimensional bounded minimization (Brent).
pub mod optimizer;
/// Latent-trait reconstruction strategies.
pub mod reconstruct;
/// Ordinary least squares with inference.
pub mod regression;
/// p-values and critical values.
pub mod significance;

pub use config::StudyConfig;
pub use deconfounder::{
    BiasRow, StudyModel, StudyOutcome, StudyReport, run_study, run_study_with_rng,
};
pub use econometrics::{WithinFit, cluster_robust_se, within_fit};
pub use lmm::{LmmConfig, LmmFit, fit_random_intercept};
pub use optimizer::{BrentConfig, BrentMinimizer, ScalarObjective, ScalarOptimum};
pub use reconstruct::{
    FactorAnalysis, LatentReconstructor, PrincipalComponent, Reconstruction, ReconstructionMethod,
};
pub use regression::{OlsFit, ols_fit};
