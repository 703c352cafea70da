//! Latent-trait reconstruction from the wide panel.
//!
//! A reconstructor reads the `entities × periods` matrix of observed traits and
//! returns one scalar per entity that stands in for the unobserved latent
//! trait. Two strategies are provided:
//!
//! - [`PrincipalComponent`]: scores on the leading principal component.
//! - [`FactorAnalysis`]: posterior-mean scores of a one-factor Gaussian model.
//!
//! Both orient their loadings so that the loading sum is non-negative, which
//! makes scores increase with the observed traits.

mod factor;
mod pca;

pub use factor::FactorAnalysis;
pub use pca::PrincipalComponent;

use dcf_core::{Error, Result};
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

/// One scalar per entity, plus fit diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reconstruction {
    /// Name of the strategy that produced it.
    pub method: String,
    /// Entity scores, in row order of the input matrix.
    pub scores: Vec<f64>,
    /// Per-period loadings.
    pub loadings: Vec<f64>,
    /// Share of total variance on the leading component (PCA only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explained_variance_ratio: Option<f64>,
    /// Per-period unique variances (factor analysis only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uniquenesses: Option<Vec<f64>>,
    /// Iterative fits report whether they met their tolerance.
    pub converged: bool,
    /// Iterations used (0 for closed-form strategies).
    pub n_iter: usize,
}

/// Maps a wide matrix to a single latent-trait column.
pub trait LatentReconstructor {
    /// Short identifier, used as the reconstruction's column name.
    fn name(&self) -> &str;

    /// Reconstruct one scalar per row of `wide`.
    fn reconstruct(&self, wide: &DMatrix<f64>) -> Result<Reconstruction>;
}

/// Strategy selector for configuration files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconstructionMethod {
    /// Leading principal component.
    Pca,
    /// One-factor analysis.
    FactorAnalysis,
}

impl ReconstructionMethod {
    /// Every available strategy, in reporting order.
    pub const ALL: [ReconstructionMethod; 2] =
        [ReconstructionMethod::Pca, ReconstructionMethod::FactorAnalysis];

    /// Column name used for this strategy's scores.
    pub fn column_name(self) -> &'static str {
        match self {
            ReconstructionMethod::Pca => "pca",
            ReconstructionMethod::FactorAnalysis => "factor",
        }
    }

    /// Build the strategy with the given tuning.
    pub fn build(
        self,
        pca_standardize: bool,
        factor_max_iter: usize,
        factor_tol: f64,
    ) -> Box<dyn LatentReconstructor> {
        match self {
            ReconstructionMethod::Pca => Box::new(PrincipalComponent::new(pca_standardize)),
            ReconstructionMethod::FactorAnalysis => {
                Box::new(FactorAnalysis::new(factor_max_iter, factor_tol))
            }
        }
    }
}

/// Column means and centered copy of `wide`.
fn center_columns(wide: &DMatrix<f64>) -> (DVector<f64>, DMatrix<f64>) {
    let n = wide.nrows() as f64;
    let means = DVector::from_iterator(wide.ncols(), wide.column_iter().map(|c| c.sum() / n));
    let mut centered = wide.clone();
    for (j, mut col) in centered.column_iter_mut().enumerate() {
        col.add_scalar_mut(-means[j]);
    }
    (means, centered)
}

/// Shared input checks: at least two rows, one column, finite values.
fn validate_wide(wide: &DMatrix<f64>) -> Result<()> {
    if wide.nrows() < 2 || wide.ncols() == 0 {
        return Err(Error::Validation(format!(
            "reconstruction needs at least 2 rows and 1 column, got {}x{}",
            wide.nrows(),
            wide.ncols()
        )));
    }
    if wide.iter().any(|v| !v.is_finite()) {
        return Err(Error::Validation("wide matrix must contain only finite values".into()));
    }
    Ok(())
}

/// Largest eigenvalue of a symmetric matrix, its eigenvector oriented to a
/// non-negative component sum, and the sum of all eigenvalues.
fn leading_eigen(sym: DMatrix<f64>) -> (f64, DVector<f64>, f64) {
    let eig = sym.symmetric_eigen();
    let (idx, &value) = eig
        .eigenvalues
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.total_cmp(b.1))
        .unwrap_or((0, &0.0));
    let mut vector: DVector<f64> = eig.eigenvectors.column(idx).into_owned();
    if vector.sum() < 0.0 {
        vector.neg_mut();
    }
    (value, vector, eig.eigenvalues.sum())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_serde_names() {
        let json = serde_json::to_string(&ReconstructionMethod::FactorAnalysis).unwrap();
        assert_eq!(json, "\"factor_analysis\"");
        let back: ReconstructionMethod = serde_json::from_str("\"pca\"").unwrap();
        assert_eq!(back, ReconstructionMethod::Pca);
    }

    #[test]
    fn test_build_uses_column_names() {
        for method in ReconstructionMethod::ALL {
            let strategy = method.build(true, 100, 1e-8);
            assert_eq!(strategy.name(), method.column_name());
        }
    }

    #[test]
    fn test_center_columns() {
        let m = DMatrix::from_row_slice(3, 2, &[1.0, 10.0, 2.0, 20.0, 3.0, 30.0]);
        let (means, c) = center_columns(&m);
        assert_eq!(means.as_slice(), &[2.0, 20.0]);
        let col = |j: usize| c.column(j).iter().copied().collect::<Vec<f64>>();
        assert_eq!(col(0), vec![-1.0, 0.0, 1.0]);
        assert_eq!(col(1), vec![-10.0, 0.0, 10.0]);
    }

    #[test]
    fn test_validate_wide() {
        assert!(validate_wide(&DMatrix::from_element(1, 3, 1.0)).is_err());
        assert!(validate_wide(&DMatrix::<f64>::zeros(4, 0)).is_err());
        let mut m = DMatrix::from_element(3, 2, 1.0);
        m[(1, 1)] = f64::INFINITY;
        assert!(validate_wide(&m).is_err());
    }
}
