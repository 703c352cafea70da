//! Study configuration: panel shape, ground truth, and model tuning.
//!
//! Files may be JSON (`.json` extension) or YAML (anything else). Every field
//! is optional and falls back to [`StudyConfig::default`], so a file only
//! needs the values it changes:
//!
//! ```yaml
//! seed: 7
//! n_entities: 500
//! noise_sd: 1.5
//! ```

use std::path::Path;

use dcf_core::{Error, Result};
use dcf_panel::{OutcomeConfig, PanelConfig};
use serde::{Deserialize, Serialize};

use crate::lmm::LmmConfig;
use crate::reconstruct::{LatentReconstructor, ReconstructionMethod};

/// Seed used when none is given.
pub const DEFAULT_SEED: u64 = 6429;

/// Everything one study run depends on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StudyConfig {
    /// Seed of the single generator threaded through the run.
    pub seed: u64,
    /// Panel shape and latent-trait distribution.
    #[serde(flatten)]
    pub panel: PanelConfig,
    /// Ground-truth outcome model.
    #[serde(flatten)]
    pub outcome: OutcomeConfig,
    /// Fit the random-intercept model by REML (`false`: ML).
    pub reml: bool,
    /// Scale period columns to unit variance before PCA (`false`: covariance PCA).
    pub pca_standardize: bool,
    /// EM iteration cap for factor analysis.
    pub factor_max_iter: usize,
    /// EM log-likelihood tolerance for factor analysis.
    pub factor_tol: f64,
}

impl Default for StudyConfig {
    fn default() -> Self {
        Self {
            seed: DEFAULT_SEED,
            panel: PanelConfig::default(),
            outcome: OutcomeConfig::default(),
            reml: true,
            pca_standardize: false,
            factor_max_iter: 1000,
            factor_tol: 1e-8,
        }
    }
}

impl StudyConfig {
    /// Read a configuration file; `.json` is parsed as JSON, anything else as YAML.
    pub fn from_path(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let is_json = path.extension().and_then(|e| e.to_str()) == Some("json");
        let config: Self =
            if is_json { serde_json::from_str(&text)? } else { serde_yaml_ng::from_str(&text)? };
        Ok(config)
    }

    /// Reject configurations before anything is drawn.
    ///
    /// Beyond the generator's own rules, the study needs at least two periods
    /// (the within and mixed models need within-entity variation) and at least
    /// three entities (the regressions need more rows than parameters).
    pub fn validate(&self) -> Result<()> {
        self.panel.validate()?;
        self.outcome.validate()?;
        if self.panel.n_periods < 2 {
            return Err(Error::InvalidConfig(format!(
                "the study needs n_periods >= 2, got {}",
                self.panel.n_periods
            )));
        }
        if self.panel.n_entities < 3 {
            return Err(Error::InvalidConfig(format!(
                "the study needs n_entities >= 3, got {}",
                self.panel.n_entities
            )));
        }
        if self.factor_max_iter == 0 {
            return Err(Error::InvalidConfig("factor_max_iter must be > 0".to_string()));
        }
        if !self.factor_tol.is_finite() || self.factor_tol <= 0.0 {
            return Err(Error::InvalidConfig(format!(
                "factor_tol must be finite and > 0, got {}",
                self.factor_tol
            )));
        }
        Ok(())
    }

    /// Mixed-model options implied by this configuration.
    pub fn lmm_config(&self) -> LmmConfig {
        LmmConfig { reml: self.reml, ..LmmConfig::default() }
    }

    /// Reconstruction strategies in reporting order.
    pub fn reconstructors(&self) -> Vec<Box<dyn LatentReconstructor>> {
        ReconstructionMethod::ALL
            .iter()
            .map(|m| m.build(self.pca_standardize, self.factor_max_iter, self.factor_tol))
            .collect()
    }
}
