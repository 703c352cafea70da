//! One-factor Gaussian factor analysis fitted by EM.
//!
//! Model: `x = mu + lambda f + e`, `f ~ N(0, 1)`, `e ~ N(0, diag(psi))`, so
//! `Sigma = lambda lambda' + diag(psi)`. With one factor the E-step reduces
//! to scalars through the Woodbury identity:
//!
//! - `q = sum_j lambda_j^2 / psi_j`
//! - `beta = (lambda / psi) / (1 + q)`, the posterior-mean weights `Sigma^{-1} lambda`
//! - `E[f^2]` averaged over rows `= 1 - beta' lambda + beta' S beta`
//!
//! and the M-step updates `lambda = S beta / E[f^2]`,
//! `psi_j = S_jj - lambda_j (S beta)_j`.

use dcf_core::{Error, Result};
use nalgebra::{DMatrix, DVector};

use super::{LatentReconstructor, Reconstruction, center_columns, leading_eigen, validate_wide};

const LN_2PI: f64 = 1.837_877_066_409_345_5;

/// Unique variances never drop below this fraction of the column variance.
const PSI_FLOOR_FRACTION: f64 = 1e-6;

/// One-factor analysis with posterior-mean factor scores.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FactorAnalysis {
    /// EM iteration cap.
    pub max_iter: usize,
    /// Convergence threshold on the change in log-likelihood.
    pub tol: f64,
}

impl FactorAnalysis {
    /// Create a factor-analysis reconstructor.
    pub fn new(max_iter: usize, tol: f64) -> Self {
        Self { max_iter, tol }
    }
}

impl Default for FactorAnalysis {
    fn default() -> Self {
        Self::new(1000, 1e-8)
    }
}

/// Current parameters and the quantities the E-step derives from them.
struct EmState {
    lambda: DVector<f64>,
    psi: DVector<f64>,
}

impl EmState {
    fn q(&self) -> f64 {
        self.lambda.iter().zip(self.psi.iter()).map(|(l, p)| l * l / p).sum()
    }

    /// Posterior-mean weights `Sigma^{-1} lambda`.
    fn beta(&self) -> DVector<f64> {
        let q = self.q();
        self.lambda.component_div(&self.psi) / (1.0 + q)
    }

    /// Gaussian log-likelihood of `n` rows with sample covariance `s`.
    fn log_likelihood(&self, s: &DMatrix<f64>, n: usize) -> f64 {
        let p = self.psi.len() as f64;
        let q = self.q();
        let u = self.lambda.component_div(&self.psi);
        let log_det = self.psi.iter().map(|v| v.ln()).sum::<f64>() + q.ln_1p();
        let trace = s.diagonal().component_div(&self.psi).sum() - (s * &u).dot(&u) / (1.0 + q);
        -0.5 * n as f64 * (p * LN_2PI + log_det + trace)
    }
}

impl LatentReconstructor for FactorAnalysis {
    fn name(&self) -> &str {
        "factor"
    }

    fn reconstruct(&self, wide: &DMatrix<f64>) -> Result<Reconstruction> {
        validate_wide(wide)?;
        if self.max_iter == 0 || !(self.tol.is_finite() && self.tol > 0.0) {
            return Err(Error::Validation(format!(
                "factor analysis needs max_iter > 0 and a positive tolerance, got {} / {}",
                self.max_iter, self.tol
            )));
        }
        let n = wide.nrows();
        let (_, centered) = center_columns(wide);
        let s = centered.transpose() * &centered / n as f64;
        let var = s.diagonal();
        if let Some(j) = var.iter().position(|v| *v <= 0.0) {
            return Err(Error::Computation(format!(
                "factor analysis: period column {j} has zero variance"
            )));
        }
        let floor = var.map(|v| (PSI_FLOOR_FRACTION * v).max(1e-12));

        // Start from the leading principal axis of S.
        let (value, axis, _) = leading_eigen(s.clone());
        let lambda = axis * value.max(0.0).sqrt();
        let psi = DVector::from_fn(var.len(), |j, _| {
            (var[j] - lambda[j] * lambda[j]).max(0.1 * var[j]).max(floor[j])
        });
        let mut state = EmState { lambda, psi };

        let mut ll = state.log_likelihood(&s, n);
        let mut converged = false;
        let mut n_iter = 0;
        while n_iter < self.max_iter {
            n_iter += 1;
            let beta = state.beta();
            let s_beta = &s * &beta;
            let ezz = 1.0 - beta.dot(&state.lambda) + beta.dot(&s_beta);
            let lambda = &s_beta / ezz;
            let psi = DVector::from_fn(var.len(), |j, _| {
                (var[j] - lambda[j] * s_beta[j]).max(floor[j])
            });
            state = EmState { lambda, psi };

            let next = state.log_likelihood(&s, n);
            if !next.is_finite() {
                return Err(Error::Computation(format!(
                    "factor analysis log-likelihood diverged at iteration {n_iter}"
                )));
            }
            let delta = (next - ll).abs();
            ll = next;
            if delta < self.tol {
                converged = true;
                break;
            }
        }
        if !converged {
            log::warn!(
                "factor analysis did not converge in {} iterations (log-likelihood {:.6})",
                self.max_iter,
                ll
            );
        }

        if state.lambda.sum() < 0.0 {
            state.lambda.neg_mut();
        }
        let beta = state.beta();
        let scores = &centered * &beta;

        log::debug!("factor analysis: {n_iter} EM iterations, log-likelihood {ll:.6}");

        Ok(Reconstruction {
            method: self.name().to_string(),
            scores: scores.iter().copied().collect(),
            loadings: state.lambda.iter().copied().collect(),
            explained_variance_ratio: None,
            uniquenesses: Some(state.psi.iter().copied().collect()),
            converged,
            n_iter,
        })
    }
}
