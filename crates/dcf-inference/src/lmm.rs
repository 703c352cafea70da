//! Linear mixed model with a Gaussian random intercept per group.
//!
//! Model: `y_gi = x_gi' beta + a_g + e_gi`, `a_g ~ N(0, tau^2)`,
//! `e_gi ~ N(0, sigma^2)`. With `lambda = tau^2 / sigma^2` the group covariance
//! is `sigma^2 (I + lambda J)`, and for fixed `lambda` both `beta` (GLS) and
//! `sigma^2` have closed forms. The remaining one-dimensional profile
//! likelihood in `log(lambda)` is minimized with Brent's method, so the fit is
//! exact up to the optimizer tolerance.
//!
//! The GLS weights reduce to per-group sufficient statistics:
//! `X' V^{-1} X = sigma^{-2} (W_xx + sum_g m_g x̄_g x̄_g' / (1 + lambda m_g))`,
//! with `W_xx` the pooled within-group scatter.
//!
//! REML (default) profiles
//! `(n-k) log(sigma^2) + log|H| + log|X' H^{-1} X|`, ML profiles
//! `n log(sigma^2) + log|H|`, both up to constants.

use std::collections::BTreeMap;

use dcf_core::{Coefficient, Error, FitMethod, FitSummary, Result, TestStatistic};
use nalgebra::{DMatrix, DVector};

use crate::econometrics::panel::group_rows;
use crate::optimizer::{BrentConfig, BrentMinimizer};
use crate::regression::{checked_cholesky, design_matrix, parameter_names, validate_columns};
use crate::significance::{CONFIDENCE_LEVEL, z_critical, z_two_sided_p};

const LN_2PI: f64 = 1.837_877_066_409_345_5;

/// Mixed-model fitting options.
#[derive(Debug, Clone)]
pub struct LmmConfig {
    /// Restricted (REML) instead of full maximum likelihood.
    pub reml: bool,
    /// Search interval for `log(tau^2 / sigma^2)`.
    pub log_ratio_bounds: (f64, f64),
    /// Brent settings for the profile likelihood.
    pub optimizer: BrentConfig,
}

impl Default for LmmConfig {
    fn default() -> Self {
        Self { reml: true, log_ratio_bounds: (-15.0, 15.0), optimizer: BrentConfig::default() }
    }
}

/// Result of a random-intercept fit.
#[derive(Debug, Clone)]
pub struct LmmFit {
    /// Fixed-effect names, `Intercept` first.
    pub names: Vec<String>,
    /// Fixed-effect estimates.
    pub coefficients: Vec<f64>,
    /// Standard errors from `sigma^2 (X' H^{-1} X)^{-1}`.
    pub se: Vec<f64>,
    /// Residual variance.
    pub sigma2: f64,
    /// Random-intercept variance.
    pub tau2: f64,
    /// Optimal `log(tau^2 / sigma^2)`.
    pub log_ratio: f64,
    /// Maximized (restricted) log-likelihood.
    pub log_likelihood: f64,
    /// REML or ML.
    pub reml: bool,
    /// Number of observations.
    pub n_obs: usize,
    /// Number of groups.
    pub n_groups: usize,
    /// Optimizer convergence flag.
    pub converged: bool,
    /// `true` when the variance ratio ended on the search boundary.
    pub on_boundary: bool,
}

#[derive(Debug, Clone)]
struct GroupStats {
    m: f64,
    x_mean: DVector<f64>,
    y_mean: f64,
}

/// Sufficient statistics for the profile likelihood.
#[derive(Debug, Clone)]
struct Profile {
    n: usize,
    k: usize,
    x_within: DMatrix<f64>,
    y_within: DVector<f64>,
    within_xx: DMatrix<f64>,
    within_xy: DVector<f64>,
    groups: Vec<GroupStats>,
}

/// GLS solution at a fixed variance ratio.
struct GlsState {
    beta: DVector<f64>,
    a_inv: DMatrix<f64>,
    log_det_a: f64,
    log_det_h: f64,
    rss_w: f64,
}

impl Profile {
    fn new(x: &DMatrix<f64>, y: &[f64], groups: &BTreeMap<u64, Vec<usize>>) -> Self {
        let (n, k) = x.shape();
        let mut x_within = DMatrix::<f64>::zeros(n, k);
        let mut y_within = DVector::<f64>::zeros(n);
        let mut stats = Vec::with_capacity(groups.len());

        for rows in groups.values() {
            let m = rows.len() as f64;
            let mut x_mean = DVector::<f64>::zeros(k);
            let mut y_mean = 0.0;
            for &i in rows {
                x_mean += x.row(i).transpose();
                y_mean += y[i];
            }
            x_mean /= m;
            y_mean /= m;
            for &i in rows {
                y_within[i] = y[i] - y_mean;
                for j in 0..k {
                    x_within[(i, j)] = x[(i, j)] - x_mean[j];
                }
            }
            stats.push(GroupStats { m, x_mean, y_mean });
        }

        let within_xx = x_within.transpose() * &x_within;
        let within_xy = x_within.transpose() * &y_within;
        Self { n, k, x_within, y_within, within_xx, within_xy, groups: stats }
    }

    fn gls(&self, log_ratio: f64) -> Result<GlsState> {
        let lambda = log_ratio.exp();
        let mut a = self.within_xx.clone();
        let mut b = self.within_xy.clone();
        let mut log_det_h = 0.0;
        for g in &self.groups {
            let w = g.m / (1.0 + lambda * g.m);
            a += &g.x_mean * g.x_mean.transpose() * w;
            b += &g.x_mean * (g.y_mean * w);
            log_det_h += (lambda * g.m).ln_1p();
        }

        let chol = checked_cholesky(a, "X' H^-1 X")?;
        let beta = chol.solve(&b);
        let log_det_a = 2.0 * chol.l_dirty().diagonal().iter().map(|d| d.ln()).sum::<f64>();
        let a_inv = chol.inverse();

        // Within and between parts of r' H^{-1} r, each free of cancellation.
        let within = &self.y_within - &self.x_within * &beta;
        let mut rss_w = within.norm_squared();
        for g in &self.groups {
            let r_bar = g.y_mean - g.x_mean.dot(&beta);
            rss_w += g.m * r_bar * r_bar / (1.0 + lambda * g.m);
        }
        if !(rss_w.is_finite() && rss_w > 0.0) {
            return Err(Error::Computation(format!(
                "degenerate residual variance at log(lambda)={log_ratio}"
            )));
        }

        Ok(GlsState { beta, a_inv, log_det_a, log_det_h, rss_w })
    }

    fn dof(&self, reml: bool) -> f64 {
        if reml { (self.n - self.k) as f64 } else { self.n as f64 }
    }

    /// Profiled deviance (minus twice the log-likelihood, constants dropped).
    fn objective(&self, log_ratio: f64, reml: bool) -> Result<f64> {
        let s = self.gls(log_ratio)?;
        let dof = self.dof(reml);
        let mut f = dof * (s.rss_w / dof).ln() + s.log_det_h;
        if reml {
            f += s.log_det_a;
        }
        Ok(f)
    }
}

/// Fit `y ~ columns + (1 | group)` by REML or ML.
///
/// An intercept is always included. Failure of the variance-ratio search to
/// converge is an error; an optimum on the search boundary (for example a
/// random-intercept variance that dominates a near-zero residual variance) is
/// accepted and flagged in [`LmmFit::on_boundary`].
pub fn fit_random_intercept(
    names: &[&str],
    columns: &[&[f64]],
    y: &[f64],
    groups: &[u64],
    config: &LmmConfig,
) -> Result<LmmFit> {
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
    if groups.len() != n {
        return Err(Error::Validation(format!(
            "group ids length ({}) != n ({})",
            groups.len(),
            n
        )));
    }
    let k = columns.len() + 1;
    if n <= k {
        return Err(Error::Computation(format!(
            "not enough observations: n={n} must exceed the number of fixed effects k={k}"
        )));
    }

    let grouped = group_rows(groups);
    let x = design_matrix(columns, n, true);
    let profile = Profile::new(&x, y, &grouped);

    let (lo, hi) = config.log_ratio_bounds;
    let reml = config.reml;
    let objective = |log_ratio: f64| -> Result<f64> { profile.objective(log_ratio, reml) };
    let opt = BrentMinimizer::new(config.optimizer.clone()).minimize(&objective, lo, hi)?;
    if !opt.converged {
        return Err(Error::Computation(format!(
            "mixed-model variance search did not converge: {}",
            opt.message
        )));
    }

    let span = hi - lo;
    let on_boundary = (opt.x - lo) < 1e-4 * span || (hi - opt.x) < 1e-4 * span;
    if on_boundary {
        log::warn!(
            "random-intercept variance ratio on search boundary (log ratio {:.3}); \
             residual or group variance is effectively zero",
            opt.x
        );
    }

    let state = profile.gls(opt.x)?;
    let sigma2 = state.rss_w / profile.dof(reml);
    let tau2 = opt.x.exp() * sigma2;
    let se: Vec<f64> = (0..k).map(|j| (sigma2 * state.a_inv[(j, j)]).max(0.0).sqrt()).collect();

    let log_likelihood = if reml {
        let dof = profile.dof(true);
        -0.5 * (dof * (LN_2PI + sigma2.ln() + 1.0) + state.log_det_h + state.log_det_a
            - k as f64 * sigma2.ln())
    } else {
        let nf = n as f64;
        -0.5 * (nf * (LN_2PI + sigma2.ln() + 1.0) + state.log_det_h)
    };

    log::debug!(
        "random intercept fit: log_ratio={:.4}, sigma2={:.6e}, tau2={:.6e}, {} evaluations",
        opt.x,
        sigma2,
        tau2,
        opt.n_fev
    );

    Ok(LmmFit {
        names: parameter_names(names, true),
        coefficients: state.beta.iter().copied().collect(),
        se,
        sigma2,
        tau2,
        log_ratio: opt.x,
        log_likelihood,
        reml,
        n_obs: n,
        n_groups: grouped.len(),
        converged: opt.converged,
        on_boundary,
    })
}

impl LmmFit {
    /// Coefficient table with z statistics.
    pub fn summary(&self, label: &str, formula: &str) -> Result<FitSummary> {
        let crit = z_critical(CONFIDENCE_LEVEL);
        let coefficients = self
            .names
            .iter()
            .zip(self.coefficients.iter().zip(&self.se))
            .map(|(name, (&estimate, &se))| {
                let statistic = estimate / se;
                Coefficient {
                    name: name.clone(),
                    estimate,
                    std_error: se,
                    statistic,
                    p_value: z_two_sided_p(statistic),
                    conf_low: estimate - crit * se,
                    conf_high: estimate + crit * se,
                    robust_std_error: None,
                    robust_interval: None,
                }
            })
            .collect();

        Ok(FitSummary {
            label: label.to_string(),
            formula: formula.to_string(),
            method: if self.reml { FitMethod::MixedReml } else { FitMethod::MixedMl },
            statistic: TestStatistic::Z,
            coefficients,
            n_obs: self.n_obs,
            n_groups: Some(self.n_groups),
            df_resid: (self.n_obs - self.names.len()) as f64,
            scale: self.sigma2,
            r_squared: None,
            adj_r_squared: None,
            f_test: None,
            group_variance: Some(self.tau2),
            log_likelihood: Some(self.log_likelihood),
            converged: self.converged,
        })
    }
}
