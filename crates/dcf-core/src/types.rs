//! Fit summaries shared by every model in the study

use serde::{Deserialize, Serialize};

/// Estimation method behind a [`FitSummary`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FitMethod {
    /// Ordinary least squares.
    Ols,
    /// Entity-demeaned ("within") least squares.
    Within,
    /// Linear mixed model, restricted maximum likelihood.
    MixedReml,
    /// Linear mixed model, maximum likelihood.
    MixedMl,
}

impl FitMethod {
    /// Short label used in text reports.
    pub fn label(self) -> &'static str {
        match self {
            FitMethod::Ols => "OLS",
            FitMethod::Within => "Within (entity FE)",
            FitMethod::MixedReml => "MixedLM (REML)",
            FitMethod::MixedMl => "MixedLM (ML)",
        }
    }
}

/// Reference distribution of the per-coefficient test statistic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestStatistic {
    /// Student-t with residual degrees of freedom.
    T,
    /// Standard normal (asymptotic).
    Z,
}

/// One row of a coefficient table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Coefficient {
    /// Regressor name (`Intercept` for the constant term).
    pub name: String,
    /// Point estimate.
    pub estimate: f64,
    /// Classical standard error.
    pub std_error: f64,
    /// `estimate / std_error`.
    pub statistic: f64,
    /// Two-sided p-value of `statistic`.
    pub p_value: f64,
    /// Lower bound of the 95% interval.
    pub conf_low: f64,
    /// Upper bound of the 95% interval.
    pub conf_high: f64,
    /// Entity-clustered standard error, when computed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub robust_std_error: Option<f64>,
    /// 95% interval built from `robust_std_error`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub robust_interval: Option<(f64, f64)>,
}

impl Coefficient {
    /// `true` if the classical 95% interval covers `value`.
    pub fn interval_contains(&self, value: f64) -> bool {
        self.conf_low <= value && value <= self.conf_high
    }
}

/// Result of fitting one model of the study.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FitSummary {
    /// Short identifier, e.g. `naive` or `pca_proxy`.
    pub label: String,
    /// Human-readable formula, e.g. `outcome ~ observed + latent`.
    pub formula: String,
    /// Estimation method.
    pub method: FitMethod,
    /// Statistic reported in `coefficients[..].statistic`.
    pub statistic: TestStatistic,
    /// Coefficient table (intercept first when present).
    pub coefficients: Vec<Coefficient>,
    /// Number of observations.
    pub n_obs: usize,
    /// Number of groups (entities) for grouped models.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n_groups: Option<usize>,
    /// Residual degrees of freedom.
    pub df_resid: f64,
    /// Residual variance estimate.
    pub scale: f64,
    /// R² (within R² for the within estimator).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub r_squared: Option<f64>,
    /// Adjusted R².
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub adj_r_squared: Option<f64>,
    /// Overall F-statistic and its p-value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub f_test: Option<(f64, f64)>,
    /// Random-intercept variance (mixed models).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_variance: Option<f64>,
    /// Maximized (restricted) log-likelihood (mixed models).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_likelihood: Option<f64>,
    /// Whether the underlying optimizer reported convergence.
    pub converged: bool,
}

impl FitSummary {
    /// Look up a coefficient by regressor name.
    pub fn coefficient(&self, name: &str) -> Option<&Coefficient> {
        self.coefficients.iter().find(|c| c.name == name)
    }

    /// Point estimate for `name`, if present.
    pub fn estimate(&self, name: &str) -> Option<f64> {
        self.coefficient(name).map(|c| c.estimate)
    }
}
