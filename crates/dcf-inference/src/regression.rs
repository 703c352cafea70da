//! Ordinary least squares with classical and cluster-robust inference.
//!
//! Solves the normal equations `(X^T X) beta = X^T y` by Cholesky and reports
//! the usual coefficient table (standard errors, t statistics, p-values, 95%
//! intervals), R², adjusted R² and the overall F test. When cluster ids are
//! supplied, Liang–Zeger standard errors are added next to the classical ones.

use dcf_core::{Coefficient, Error, FitMethod, FitSummary, Result, TestStatistic};
use nalgebra::{Cholesky, DMatrix, DVector, Dyn};

use crate::econometrics::cluster_robust_se;
use crate::significance::{CONFIDENCE_LEVEL, f_upper_p, t_critical, t_two_sided_p};

/// Name given to the constant column.
pub const INTERCEPT: &str = "Intercept";

#[inline]
pub(crate) fn validate_columns(columns: &[&[f64]], n: usize) -> Result<()> {
    if n == 0 {
        return Err(Error::Validation("y must be non-empty".to_string()));
    }
    for (j, col) in columns.iter().enumerate() {
        if col.len() != n {
            return Err(Error::Validation(format!(
                "column {} has wrong length: expected n={}, got {}",
                j,
                n,
                col.len()
            )));
        }
        if col.iter().any(|v| !v.is_finite()) {
            return Err(Error::Validation(format!("column {j} must contain only finite values")));
        }
    }
    Ok(())
}

/// Dense design matrix built from named columns, intercept first when requested.
pub(crate) fn design_matrix(
    columns: &[&[f64]],
    n: usize,
    include_intercept: bool,
) -> DMatrix<f64> {
    let k = columns.len() + usize::from(include_intercept);
    DMatrix::from_fn(n, k, |i, j| match (include_intercept, j) {
        (true, 0) => 1.0,
        (true, j) => columns[j - 1][i],
        (false, j) => columns[j][i],
    })
}

/// Relative pivot below which a Gram matrix is treated as singular.
const PIVOT_TOL: f64 = 1e-12;

/// Cholesky factor of a symmetric Gram matrix, rejecting (numerically) singular input.
///
/// A pivot `L_jj^2` smaller than `PIVOT_TOL * A_jj` means column `j` is
/// (nearly) a linear combination of the preceding ones.
pub(crate) fn checked_cholesky(a: DMatrix<f64>, what: &str) -> Result<Cholesky<f64, Dyn>> {
    let diag = a.diagonal();
    let chol = a
        .cholesky()
        .ok_or_else(|| Error::Computation(format!("{what} is singular or not positive definite")))?;
    let l = chol.l_dirty();
    for j in 0..diag.len() {
        if l[(j, j)] * l[(j, j)] <= PIVOT_TOL * diag[j].abs() {
            return Err(Error::Computation(format!(
                "{what} is numerically singular (column {j} is collinear)"
            )));
        }
    }
    Ok(chol)
}

/// Parameter names matching [`design_matrix`] column order.
pub(crate) fn parameter_names(names: &[&str], include_intercept: bool) -> Vec<String> {
    let mut out = Vec::with_capacity(names.len() + 1);
    if include_intercept {
        out.push(INTERCEPT.to_string());
    }
    out.extend(names.iter().map(|s| s.to_string()));
    out
}

/// Result of an OLS fit.
#[derive(Debug, Clone)]
pub struct OlsFit {
    /// Parameter names (intercept first when present).
    pub names: Vec<String>,
    /// Coefficient estimates.
    pub coefficients: Vec<f64>,
    /// Classical standard errors.
    pub se: Vec<f64>,
    /// Cluster-robust standard errors, when cluster ids were supplied.
    pub se_cluster: Option<Vec<f64>>,
    /// Number of clusters behind `se_cluster`.
    pub n_clusters: Option<usize>,
    /// Residuals `y - X beta`.
    pub residuals: Vec<f64>,
    /// Residual sum of squares.
    pub rss: f64,
    /// Total sum of squares (centered when an intercept is present).
    pub tss: f64,
    /// Residual degrees of freedom `n - k`.
    pub df_resid: f64,
    /// Residual variance `rss / df_resid`.
    pub sigma2: f64,
    /// R².
    pub r_squared: f64,
    /// Adjusted R².
    pub adj_r_squared: f64,
    /// Overall F statistic and p-value (intercept models with at least one slope).
    pub f_test: Option<(f64, f64)>,
    /// Number of observations.
    pub n_obs: usize,
}

/// Fit `y ~ columns` by ordinary least squares.
///
/// `names` labels `columns` (one slice per regressor, each of length `n`).
/// `clusters`, when given, adds entity-clustered standard errors.
pub fn ols_fit(
    names: &[&str],
    columns: &[&[f64]],
    y: &[f64],
    include_intercept: bool,
    clusters: Option<&[u64]>,
) -> Result<OlsFit> {
    let n = y.len();
    if names.len() != columns.len() {
        return Err(Error::Validation(format!(
            "names ({}) and columns ({}) disagree",
            names.len(),
            columns.len()
        )));
    }
    validate_columns(columns, n)?;
    validate_columns(&[y], n)?;
    let k = columns.len() + usize::from(include_intercept);
    if k == 0 {
        return Err(Error::Validation("model has no parameters".to_string()));
    }
    if n <= k {
        return Err(Error::Computation(format!(
            "not enough observations: n={n} must exceed the number of parameters k={k}"
        )));
    }

    let x = design_matrix(columns, n, include_intercept);
    let y_vec = DVector::from_column_slice(y);

    let xtx = x.transpose() * &x;
    let xty = x.transpose() * &y_vec;
    let chol = checked_cholesky(xtx, "X'X")?;
    let beta = chol.solve(&xty);
    let xtx_inv = chol.inverse();

    let resid = &y_vec - &x * &beta;
    let rss: f64 = resid.iter().map(|r| r * r).sum();
    let tss = if include_intercept {
        let mean = y.iter().sum::<f64>() / n as f64;
        y.iter().map(|v| (v - mean).powi(2)).sum()
    } else {
        y.iter().map(|v| v * v).sum()
    };

    let df_resid = (n - k) as f64;
    let sigma2 = rss / df_resid;
    let se: Vec<f64> = (0..k).map(|j| (sigma2 * xtx_inv[(j, j)]).max(0.0).sqrt()).collect();

    let r_squared = if tss > 0.0 { 1.0 - rss / tss } else { 0.0 };
    let df_model = (k - usize::from(include_intercept)) as f64;
    let adj_r_squared = if include_intercept {
        1.0 - (1.0 - r_squared) * (n as f64 - 1.0) / df_resid
    } else {
        1.0 - (1.0 - r_squared) * n as f64 / df_resid
    };
    let f_test = if include_intercept && df_model > 0.0 {
        let f = ((tss - rss) / df_model) / sigma2;
        Some((f, f_upper_p(f, df_model, df_resid)?))
    } else {
        None
    };

    let (se_cluster, n_clusters) = match clusters {
        Some(ids) => {
            if ids.len() != n {
                return Err(Error::Validation(format!(
                    "cluster ids length ({}) != n ({})",
                    ids.len(),
                    n
                )));
            }
            let robust = cluster_robust_se(&x, &resid, &xtx_inv, ids)?;
            let mut distinct = ids.to_vec();
            distinct.sort_unstable();
            distinct.dedup();
            (Some(robust), Some(distinct.len()))
        }
        None => (None, None),
    };

    Ok(OlsFit {
        names: parameter_names(names, include_intercept),
        coefficients: beta.iter().copied().collect(),
        se,
        se_cluster,
        n_clusters,
        residuals: resid.iter().copied().collect(),
        rss,
        tss,
        df_resid,
        sigma2,
        r_squared,
        adj_r_squared,
        f_test,
        n_obs: n,
    })
}

impl OlsFit {
    /// Build the coefficient table and wrap it into a [`FitSummary`].
    pub fn summary(&self, label: &str, formula: &str) -> Result<FitSummary> {
        let crit = t_critical(self.df_resid, CONFIDENCE_LEVEL)?;
        // Cluster intervals use G - 1 degrees of freedom.
        let robust_crit = match self.n_clusters {
            Some(g) if g > 1 => Some(t_critical(g as f64 - 1.0, CONFIDENCE_LEVEL)?),
            _ => None,
        };

        let mut coefficients = Vec::with_capacity(self.coefficients.len());
        for (j, name) in self.names.iter().enumerate() {
            let estimate = self.coefficients[j];
            let se = self.se[j];
            let statistic = estimate / se;
            let robust_std_error = self.se_cluster.as_ref().map(|s| s[j]);
            let robust_interval = match (robust_std_error, robust_crit) {
                (Some(rse), Some(c)) => Some((estimate - c * rse, estimate + c * rse)),
                _ => None,
            };
            coefficients.push(Coefficient {
                name: name.clone(),
                estimate,
                std_error: se,
                statistic,
                p_value: t_two_sided_p(statistic, self.df_resid)?,
                conf_low: estimate - crit * se,
                conf_high: estimate + crit * se,
                robust_std_error,
                robust_interval,
            });
        }

        Ok(FitSummary {
            label: label.to_string(),
            formula: formula.to_string(),
            method: FitMethod::Ols,
            statistic: TestStatistic::T,
            coefficients,
            n_obs: self.n_obs,
            n_groups: self.n_clusters,
            df_resid: self.df_resid,
            scale: self.sigma2,
            r_squared: Some(self.r_squared),
            adj_r_squared: Some(self.adj_r_squared),
            f_test: self.f_test,
            group_variance: None,
            log_likelihood: None,
            converged: true,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_ols_exact_fit() {
        // y = 1 + 2*x1 - 0.5*x2, no noise
        let x1 = [0.0, 1.0, 2.0, 3.0, 4.0, 5.0];
        let x2 = [1.0, 0.0, 3.0, 1.0, 2.0, 5.0];
        let y: Vec<f64> = x1.iter().zip(&x2).map(|(a, b)| 1.0 + 2.0 * a - 0.5 * b).collect();

        let fit = ols_fit(&["x1", "x2"], &[&x1, &x2], &y, true, None).unwrap();
        assert_eq!(fit.names, vec!["Intercept", "x1", "x2"]);
        assert_relative_eq!(fit.coefficients[0], 1.0, epsilon = 1e-10);
        assert_relative_eq!(fit.coefficients[1], 2.0, epsilon = 1e-10);
        assert_relative_eq!(fit.coefficients[2], -0.5, epsilon = 1e-10);
        assert!(fit.rss < 1e-18);
        assert_relative_eq!(fit.r_squared, 1.0, epsilon = 1e-12);
        assert_eq!(fit.df_resid, 3.0);
    }

    #[test]
    fn test_ols_textbook_standard_errors() {
        // Simple regression with hand-checked values:
        // x = [1..5], y = [2, 4, 5, 4, 5]
        // beta1 = 0.6, beta0 = 2.2, RSS = 2.4, sigma2 = 0.8, Sxx = 10
        // se(beta1) = sqrt(0.8/10), se(beta0) = sqrt(0.8 * (1/5 + 9/10))
        let x = [1.0, 2.0, 3.0, 4.0, 5.0];
        let y = [2.0, 4.0, 5.0, 4.0, 5.0];
        let fit = ols_fit(&["x"], &[&x], &y, true, None).unwrap();

        assert_relative_eq!(fit.coefficients[0], 2.2, epsilon = 1e-10);
        assert_relative_eq!(fit.coefficients[1], 0.6, epsilon = 1e-10);
        assert_relative_eq!(fit.rss, 2.4, epsilon = 1e-10);
        assert_relative_eq!(fit.sigma2, 0.8, epsilon = 1e-10);
        assert_relative_eq!(fit.se[1], (0.08f64).sqrt(), epsilon = 1e-10);
        assert_relative_eq!(fit.se[0], (0.8f64 * 1.1).sqrt(), epsilon = 1e-10);
        // R² = 1 - 2.4 / 6
        assert_relative_eq!(fit.r_squared, 0.6, epsilon = 1e-10);
        let (f, p) = fit.f_test.unwrap();
        assert_relative_eq!(f, 4.5, epsilon = 1e-10);
        assert!(p > 0.05 && p < 0.2, "p={p}");

        let summary = fit.summary("simple", "y ~ x").unwrap();
        let slope = summary.coefficient("x").unwrap();
        assert_relative_eq!(slope.statistic, 0.6 / (0.08f64).sqrt(), epsilon = 1e-10);
        assert!(slope.interval_contains(0.0));
        assert!(slope.interval_contains(0.6));
        assert!(slope.robust_std_error.is_none());
        assert_eq!(summary.method, FitMethod::Ols);
    }

    #[test]
    fn test_ols_without_intercept() {
        let x = [1.0, 2.0, 3.0];
        let y = [2.0, 4.0, 6.0];
        let fit = ols_fit(&["x"], &[&x], &y, false, None).unwrap();
        assert_eq!(fit.names, vec!["x"]);
        assert_relative_eq!(fit.coefficients[0], 2.0, epsilon = 1e-12);
        assert!(fit.f_test.is_none());
    }

    #[test]
    fn test_ols_cluster_se_reported() {
        let x: Vec<f64> = (0..12).map(|i| i as f64).collect();
        let y: Vec<f64> =
            x.iter().enumerate().map(|(i, xi)| 2.0 * xi + 1.0 + (i % 4) as f64 * 0.3).collect();
        let ids: Vec<u64> = (0..12).map(|i| (i / 4) as u64).collect();
        let fit = ols_fit(&["x"], &[&x], &y, true, Some(&ids)).unwrap();
        assert_eq!(fit.n_clusters, Some(3));
        let robust = fit.se_cluster.as_ref().unwrap();
        assert!(robust.iter().all(|s| s.is_finite() && *s >= 0.0));

        let summary = fit.summary("clustered", "y ~ x").unwrap();
        let slope = summary.coefficient("x").unwrap();
        let (lo, hi) = slope.robust_interval.unwrap();
        assert!(lo <= slope.estimate && slope.estimate <= hi);
        assert_eq!(summary.n_groups, Some(3));
    }

    #[test]
    fn test_ols_singular_design() {
        let x1 = [1.0, 2.0, 3.0, 4.0];
        let x2 = [2.0, 4.0, 6.0, 8.0];
        let y = [1.0, 2.0, 3.0, 5.0];
        let err = ols_fit(&["x1", "x2"], &[&x1, &x2], &y, true, None).unwrap_err();
        assert!(matches!(err, Error::Computation(_)), "{err}");
    }

    #[test]
    fn test_ols_validation() {
        assert!(ols_fit(&["x"], &[&[]], &[], true, None).is_err());
        assert!(ols_fit(&["x"], &[&[1.0, 2.0]], &[1.0, 2.0, 3.0], true, None).is_err());
        assert!(ols_fit(&["x"], &[&[1.0, f64::NAN, 3.0]], &[1.0, 2.0, 3.0], true, None).is_err());
        assert!(ols_fit(&["x", "z"], &[&[1.0, 2.0, 3.0]], &[1.0, 2.0, 3.0], true, None).is_err());
        // n must exceed k
        assert!(ols_fit(&["x"], &[&[1.0, 2.0]], &[1.0, 2.0], true, None).is_err());
    }
}
