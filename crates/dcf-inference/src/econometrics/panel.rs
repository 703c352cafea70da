//! Entity fixed-effects ("within") regression with cluster-robust standard errors.
//!
//! Every regressor and the outcome are demeaned by entity, then OLS runs on the
//! demeaned data. The entity intercepts, and with them any time-invariant
//! confounder, drop out; no intercept is reported.
//!
//! # References
//!
//! - Wooldridge, *Econometric Analysis of Cross Section and Panel Data*, Ch. 10.
//! - Arellano (1987), "Computing robust standard errors for within-groups estimators."

use std::collections::BTreeMap;

use dcf_core::{Coefficient, Error, FitMethod, FitSummary, Result, TestStatistic};
use nalgebra::{DMatrix, DVector};

use crate::regression::{checked_cholesky, validate_columns};
use crate::significance::{CONFIDENCE_LEVEL, t_critical, t_two_sided_p};

/// Row indices per entity, in ascending entity order.
pub(crate) fn group_rows(ids: &[u64]) -> BTreeMap<u64, Vec<usize>> {
    let mut groups: BTreeMap<u64, Vec<usize>> = BTreeMap::new();
    for (i, &id) in ids.iter().enumerate() {
        groups.entry(id).or_default().push(i);
    }
    groups
}

/// Result of a within regression.
#[derive(Debug, Clone)]
pub struct WithinFit {
    /// Regressor names (no intercept: it is absorbed).
    pub names: Vec<String>,
    /// Coefficient estimates.
    pub coefficients: Vec<f64>,
    /// Homoskedastic standard errors with `n - G - p` degrees of freedom.
    pub se_ols: Vec<f64>,
    /// Entity-clustered standard errors.
    pub se_cluster: Vec<f64>,
    /// R² of the demeaned regression.
    pub r_squared_within: f64,
    /// Residual sum of squares.
    pub rss: f64,
    /// Residual degrees of freedom `n - G - p`.
    pub df_resid: f64,
    /// Number of observations.
    pub n_obs: usize,
    /// Number of entities.
    pub n_entities: usize,
}

/// Fit `y ~ columns + entity FE` by the within transformation.
pub fn within_fit(
    names: &[&str],
    columns: &[&[f64]],
    y: &[f64],
    entity_ids: &[u64],
) -> Result<WithinFit> {
    let n = y.len();
    let p = columns.len();
    if p == 0 {
        return Err(Error::Validation("within regression needs at least one regressor".into()));
    }
    if names.len() != p {
        return Err(Error::Validation(format!("names ({}) != columns ({})", names.len(), p)));
    }
    validate_columns(columns, n)?;
    validate_columns(&[y], n)?;
    if entity_ids.len() != n {
        return Err(Error::Validation(format!(
            "entity_ids length ({}) != n ({})",
            entity_ids.len(),
            n
        )));
    }

    let groups = group_rows(entity_ids);
    let n_entities = groups.len();

    let mut x_dm = DMatrix::<f64>::zeros(n, p);
    let mut y_dm = DVector::<f64>::zeros(n);
    for rows in groups.values() {
        let m = rows.len() as f64;
        let y_mean = rows.iter().map(|&i| y[i]).sum::<f64>() / m;
        for &i in rows {
            y_dm[i] = y[i] - y_mean;
        }
        for (j, col) in columns.iter().enumerate() {
            let x_mean = rows.iter().map(|&i| col[i]).sum::<f64>() / m;
            for &i in rows {
                x_dm[(i, j)] = col[i] - x_mean;
            }
        }
    }

    let xtx = x_dm.transpose() * &x_dm;
    let xty = x_dm.transpose() * &y_dm;
    let chol = checked_cholesky(xtx, "X'X after entity demeaning")?;
    let beta = chol.solve(&xty);
    let xtx_inv = chol.inverse();

    let resid = &y_dm - &x_dm * &beta;
    let rss: f64 = resid.iter().map(|r| r * r).sum();
    let tss: f64 = y_dm.iter().map(|v| v * v).sum();
    let r_squared_within = if tss > 0.0 { 1.0 - rss / tss } else { 0.0 };

    let df_resid = n as f64 - n_entities as f64 - p as f64;
    if df_resid <= 0.0 {
        return Err(Error::Computation(format!(
            "not enough within variation: n={n}, entities={n_entities}, regressors={p}"
        )));
    }
    let sigma2 = rss / df_resid;
    let se_ols: Vec<f64> = (0..p).map(|j| (sigma2 * xtx_inv[(j, j)]).max(0.0).sqrt()).collect();
    let se_cluster = cluster_robust_se(&x_dm, &resid, &xtx_inv, entity_ids)?;

    Ok(WithinFit {
        names: names.iter().map(|s| s.to_string()).collect(),
        coefficients: beta.iter().copied().collect(),
        se_ols,
        se_cluster,
        r_squared_within,
        rss,
        df_resid,
        n_obs: n,
        n_entities,
    })
}

impl WithinFit {
    /// Coefficient table with classical and entity-clustered intervals.
    pub fn summary(&self, label: &str, formula: &str) -> Result<FitSummary> {
        let crit = t_critical(self.df_resid, CONFIDENCE_LEVEL)?;
        let robust_crit = if self.n_entities > 1 {
            Some(t_critical(self.n_entities as f64 - 1.0, CONFIDENCE_LEVEL)?)
        } else {
            None
        };

        let mut coefficients = Vec::with_capacity(self.coefficients.len());
        for (j, name) in self.names.iter().enumerate() {
            let estimate = self.coefficients[j];
            let se = self.se_ols[j];
            let statistic = estimate / se;
            let rse = self.se_cluster[j];
            coefficients.push(Coefficient {
                name: name.clone(),
                estimate,
                std_error: se,
                statistic,
                p_value: t_two_sided_p(statistic, self.df_resid)?,
                conf_low: estimate - crit * se,
                conf_high: estimate + crit * se,
                robust_std_error: Some(rse),
                robust_interval: robust_crit.map(|c| (estimate - c * rse, estimate + c * rse)),
            });
        }

        Ok(FitSummary {
            label: label.to_string(),
            formula: formula.to_string(),
            method: FitMethod::Within,
            statistic: TestStatistic::T,
            coefficients,
            n_obs: self.n_obs,
            n_groups: Some(self.n_entities),
            df_resid: self.df_resid,
            scale: self.rss / self.df_resid,
            r_squared: Some(self.r_squared_within),
            adj_r_squared: None,
            f_test: None,
            group_variance: None,
            log_likelihood: None,
            converged: true,
        })
    }
}

/// Compute Liang–Zeger cluster-robust (HC0 sandwich) standard errors.
///
/// `V_CR = c (X'X)^{-1} B (X'X)^{-1}` where `B = Σ_g X_g' e_g e_g' X_g` and
/// `c = G/(G-1) * (N-1)/(N-K)`.
pub fn cluster_robust_se(
    x: &DMatrix<f64>,
    residuals: &DVector<f64>,
    xtx_inv: &DMatrix<f64>,
    cluster_ids: &[u64],
) -> Result<Vec<f64>> {
    let n = x.nrows();
    let p = x.ncols();
    if residuals.len() != n || cluster_ids.len() != n {
        return Err(Error::Validation(format!(
            "cluster_robust_se: x has {} rows, residuals {}, cluster ids {}",
            n,
            residuals.len(),
            cluster_ids.len()
        )));
    }

    let clusters = group_rows(cluster_ids);
    let g = clusters.len() as f64;

    // Meat: sum of score outer products
    let mut meat = DMatrix::<f64>::zeros(p, p);
    for rows in clusters.values() {
        let mut score = DVector::<f64>::zeros(p);
        for &i in rows {
            score += x.row(i).transpose() * residuals[i];
        }
        meat += &score * score.transpose();
    }

    let n_f = n as f64;
    let p_f = p as f64;
    let correction =
        if g > 1.0 && n_f > p_f { (g / (g - 1.0)) * ((n_f - 1.0) / (n_f - p_f)) } else { 1.0 };

    let vcr = (xtx_inv * &meat) * xtx_inv * correction;
    Ok((0..p).map(|j| vcr[(j, j)].max(0.0).sqrt()).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_within_two_entities() {
        // Entity 1: x=[1,2,3], y=[2,4,6]; entity 2: x=[10,20,30], y=[20,40,60]
        // Demeaned slopes are both 2.
        let ids = [1, 1, 1, 2, 2, 2];
        let x = [1.0, 2.0, 3.0, 10.0, 20.0, 30.0];
        let y = [2.0, 4.0, 6.0, 20.0, 40.0, 60.0];

        let fit = within_fit(&["x"], &[&x], &y, &ids).unwrap();
        assert_eq!(fit.n_obs, 6);
        assert_eq!(fit.n_entities, 2);
        assert_relative_eq!(fit.coefficients[0], 2.0, epsilon = 1e-10);
        assert!(fit.r_squared_within > 0.999);
        assert!(fit.rss < 1e-20);
    }

    #[test]
    fn test_within_absorbs_entity_confounder() {
        // y = 3x + a_i where a_i is correlated with x; pooled OLS would be biased.
        let ids = [0, 0, 0, 0, 1, 1, 1, 1, 2, 2, 2, 2];
        let a = [1.0, 1.0, 1.0, 1.0, 5.0, 5.0, 5.0, 5.0, 9.0, 9.0, 9.0, 9.0];
        let x = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 8.0, 9.0, 9.0, 10.0, 11.0, 13.0];
        let y: Vec<f64> = x.iter().zip(&a).map(|(x, a)| 3.0 * x + a + 0.01 * x * x).collect();

        let fit = within_fit(&["x"], &[&x], &y, &ids).unwrap();
        assert!((fit.coefficients[0] - 3.0).abs() < 0.3, "beta={}", fit.coefficients[0]);
        assert!(fit.se_ols[0] > 0.0);
        assert!(fit.se_cluster[0].is_finite());

        let summary = fit.summary("within", "y ~ x + C(entity)").unwrap();
        assert_eq!(summary.method, FitMethod::Within);
        assert!(summary.coefficient("Intercept").is_none());
        assert!(summary.coefficient("x").unwrap().robust_interval.is_some());
    }

    #[test]
    fn test_within_rejects_time_invariant_regressor() {
        let ids = [0, 0, 1, 1, 2, 2];
        let x = [1.0, 1.0, 2.0, 2.0, 3.0, 3.0];
        let y = [1.0, 2.0, 3.0, 4.0, 5.0, 7.0];
        assert!(within_fit(&["x"], &[&x], &y, &ids).is_err());
    }

    #[test]
    fn test_cluster_se_matches_manual_sandwich() {
        // Two clusters, intercept-only model: beta = mean, X'X = n.
        let x = DMatrix::from_element(4, 1, 1.0);
        let y = DVector::from_vec(vec![1.0, 3.0, 2.0, 6.0]);
        let resid = y.add_scalar(-3.0);
        let xtx_inv = DMatrix::from_element(1, 1, 0.25);
        let se = cluster_robust_se(&x, &resid, &xtx_inv, &[0, 0, 1, 1]).unwrap();
        // scores: (-2 + 0) = -2, (-1 + 3) = 2 -> meat = 8
        // V = 8 / 16 * (2/1) * (3/3) = 1
        assert_relative_eq!(se[0], 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_within_validation() {
        assert!(within_fit(&["x"], &[&[]], &[], &[]).is_err());
        assert!(within_fit(&["x"], &[&[1.0]], &[1.0, 2.0], &[1, 1]).is_err());
        assert!(within_fit(&[], &[], &[1.0, 2.0], &[1, 1]).is_err());
    }
}
