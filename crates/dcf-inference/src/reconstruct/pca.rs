use dcf_core::{Error, Result};
use nalgebra::DMatrix;

use super::{LatentReconstructor, Reconstruction, center_columns, leading_eigen, validate_wide};

/// Scores on the leading principal component of the period columns.
///
/// By default the decomposition runs on the covariance matrix of the
/// centered columns. With `standardize` each column is first scaled to unit
/// sample variance, so the correlation matrix is used instead and late,
/// high-variance periods do not dominate the component. A column with zero
/// variance cannot be scaled and is rejected.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PrincipalComponent {
    /// Scale columns to unit variance before the decomposition.
    pub standardize: bool,
}

impl PrincipalComponent {
    /// Create a PCA reconstructor.
    pub fn new(standardize: bool) -> Self {
        Self { standardize }
    }
}

impl Default for PrincipalComponent {
    fn default() -> Self {
        Self::new(false)
    }
}

impl LatentReconstructor for PrincipalComponent {
    fn name(&self) -> &str {
        "pca"
    }

    fn reconstruct(&self, wide: &DMatrix<f64>) -> Result<Reconstruction> {
        validate_wide(wide)?;
        let n = wide.nrows();
        let (_, mut z) = center_columns(wide);

        if self.standardize {
            for (j, mut col) in z.column_iter_mut().enumerate() {
                let sd = (col.norm_squared() / (n - 1) as f64).sqrt();
                if sd <= 0.0 {
                    return Err(Error::Computation(format!(
                        "cannot standardize period column {j}: zero variance"
                    )));
                }
                col /= sd;
            }
        }

        let cov = z.transpose() * &z / (n - 1) as f64;
        let (value, loadings, total) = leading_eigen(cov);
        if total <= 0.0 {
            return Err(Error::Computation("wide matrix has zero total variance".into()));
        }
        let scores = &z * &loadings;

        log::debug!(
            "pca: leading eigenvalue {:.6} explains {:.2}% of variance",
            value,
            100.0 * value / total
        );

        Ok(Reconstruction {
            method: self.name().to_string(),
            scores: scores.iter().copied().collect(),
            loadings: loadings.iter().copied().collect(),
            explained_variance_ratio: Some(value / total),
            uniquenesses: None,
            converged: true,
            n_iter: 0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    /// Rows on the line (t, 2t) plus a small wiggle along (-2, 1). The
    /// wiggle pattern is uncorrelated with t, so (1, 2) is an exact
    /// eigenvector of the covariance.
    fn near_line() -> DMatrix<f64> {
        let mut m = DMatrix::<f64>::zeros(8, 2);
        for i in 0..8 {
            let t = i as f64;
            let w = if matches!(i % 4, 0 | 3) { 0.05 } else { -0.05 };
            m[(i, 0)] = t - 2.0 * w;
            m[(i, 1)] = 2.0 * t + w;
        }
        m
    }

    #[test]
    fn test_pca_unstandardized_direction() {
        let rec = PrincipalComponent::new(false).reconstruct(&near_line()).unwrap();
        let norm = 5f64.sqrt();
        assert_relative_eq!(rec.loadings[0], 1.0 / norm, epsilon = 1e-6);
        assert_relative_eq!(rec.loadings[1], 2.0 / norm, epsilon = 1e-6);
        assert!(rec.explained_variance_ratio.unwrap() > 0.99);
        assert!(rec.converged);
        assert_eq!(rec.method, "pca");
    }

    #[test]
    fn test_pca_scores_centered_and_increasing() {
        let rec = PrincipalComponent::default().reconstruct(&near_line()).unwrap();
        let mean: f64 = rec.scores.iter().sum::<f64>() / rec.scores.len() as f64;
        assert!(mean.abs() < 1e-12);
        assert!(rec.scores.windows(2).all(|w| w[1] > w[0]));
        assert!(rec.loadings.iter().sum::<f64>() >= 0.0);
    }

    #[test]
    fn test_pca_default_uses_covariance() {
        assert!(!PrincipalComponent::default().standardize);
        let m = near_line();
        let default = PrincipalComponent::default().reconstruct(&m).unwrap();
        let covariance = PrincipalComponent::new(false).reconstruct(&m).unwrap();
        assert_eq!(default.loadings, covariance.loadings);
        assert_eq!(default.scores, covariance.scores);
    }

    #[test]
    fn test_pca_standardized_equal_loadings_for_two_columns() {
        // Correlation matrix of two columns has eigenvector (1, 1)/sqrt(2).
        let m = DMatrix::from_row_slice(4, 2, &[1.0, 3.0, 2.0, 9.0, 4.0, 7.0, 8.0, 20.0]);
        let rec = PrincipalComponent::new(true).reconstruct(&m).unwrap();
        let h = 0.5f64.sqrt();
        assert_relative_eq!(rec.loadings[0], h, epsilon = 1e-10);
        assert_relative_eq!(rec.loadings[1], h, epsilon = 1e-10);
    }

    #[test]
    fn test_pca_sign_convention() {
        let m = near_line();
        let flipped = -m.clone();
        let a = PrincipalComponent::new(false).reconstruct(&m).unwrap();
        let b = PrincipalComponent::new(false).reconstruct(&flipped).unwrap();
        assert!(a.loadings.iter().sum::<f64>() >= 0.0);
        assert!(b.loadings.iter().sum::<f64>() >= 0.0);
        for (x, y) in a.scores.iter().zip(&b.scores) {
            assert_relative_eq!(*x, -*y, epsilon = 1e-10);
        }
    }

    #[test]
    fn test_pca_rejects_constant_column_when_standardizing() {
        let m = DMatrix::from_row_slice(3, 2, &[1.0, 5.0, 2.0, 5.0, 3.0, 5.0]);
        assert!(PrincipalComponent::new(true).reconstruct(&m).is_err());
        assert!(PrincipalComponent::new(false).reconstruct(&m).is_ok());
        let flat = DMatrix::from_element(3, 2, 1.0);
        assert!(PrincipalComponent::new(false).reconstruct(&flat).is_err());
    }
}
