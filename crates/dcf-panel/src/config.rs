use dcf_core::{Error, Result};
use serde::{Deserialize, Serialize};

/// Shape of the simulated panel and the latent-trait distribution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PanelConfig {
    /// Number of entities (rows of the wide panel).
    pub n_entities: usize,
    /// Number of periods (columns of the wide panel).
    pub n_periods: usize,
    /// Mean of the exponential latent-trait distribution.
    pub latent_scale: f64,
}

impl Default for PanelConfig {
    fn default() -> Self {
        Self { n_entities: 100, n_periods: 3, latent_scale: 5.0 }
    }
}

impl PanelConfig {
    /// Reject configurations the generator cannot honour.
    pub fn validate(&self) -> Result<()> {
        if self.n_entities == 0 {
            return Err(Error::InvalidConfig("n_entities must be > 0".to_string()));
        }
        if self.n_periods == 0 {
            return Err(Error::InvalidConfig("n_periods must be > 0".to_string()));
        }
        if !self.latent_scale.is_finite() || self.latent_scale <= 0.0 {
            return Err(Error::InvalidConfig(format!(
                "latent_scale must be finite and > 0, got {}",
                self.latent_scale
            )));
        }
        Ok(())
    }

    /// Number of long-format rows the panel reshapes into.
    pub fn n_rows(&self) -> usize {
        self.n_entities * self.n_periods
    }
}

/// Ground-truth outcome model:
/// `outcome = intercept + coefficient * observed + 1 * latent + N(0, noise_sd)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutcomeConfig {
    /// Constant term.
    pub intercept: f64,
    /// Effect of the observed trait.
    pub coefficient: f64,
    /// Standard deviation of row-level outcome noise (0 disables it).
    pub noise_sd: f64,
}

impl Default for OutcomeConfig {
    fn default() -> Self {
        Self { intercept: 4.0, coefficient: 3.0, noise_sd: 0.0 }
    }
}

impl OutcomeConfig {
    /// Latent-trait coefficient of the generative model.
    pub const LATENT_COEFFICIENT: f64 = 1.0;

    /// Reject non-finite ground truth and negative noise.
    pub fn validate(&self) -> Result<()> {
        if !self.intercept.is_finite() || !self.coefficient.is_finite() {
            return Err(Error::InvalidConfig(
                "intercept and coefficient must be finite".to_string(),
            ));
        }
        if !self.noise_sd.is_finite() || self.noise_sd < 0.0 {
            return Err(Error::InvalidConfig(format!(
                "noise_sd must be finite and >= 0, got {}",
                self.noise_sd
            )));
        }
        Ok(())
    }

    /// Noise-free outcome for one row.
    #[inline]
    pub fn mean(&self, observed: f64, latent: f64) -> f64 {
        self.intercept + self.coefficient * observed + Self::LATENT_COEFFICIENT * latent
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(PanelConfig::default().validate().is_ok());
        assert!(OutcomeConfig::default().validate().is_ok());
        assert_eq!(PanelConfig::default().n_rows(), 300);
    }

    #[test]
    fn test_panel_config_rejects_non_positive() {
        let cfg = PanelConfig { n_entities: 0, ..Default::default() };
        assert!(matches!(cfg.validate(), Err(Error::InvalidConfig(_))));

        let cfg = PanelConfig { n_periods: 0, ..Default::default() };
        assert!(matches!(cfg.validate(), Err(Error::InvalidConfig(_))));

        for scale in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            let cfg = PanelConfig { latent_scale: scale, ..Default::default() };
            assert!(matches!(cfg.validate(), Err(Error::InvalidConfig(_))), "scale={scale}");
        }
    }

    #[test]
    fn test_outcome_config_rejects_bad_noise() {
        let cfg = OutcomeConfig { noise_sd: -0.1, ..Default::default() };
        assert!(matches!(cfg.validate(), Err(Error::InvalidConfig(_))));
        let cfg = OutcomeConfig { intercept: f64::NAN, ..Default::default() };
        assert!(matches!(cfg.validate(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_outcome_mean() {
        let cfg = OutcomeConfig::default();
        assert_eq!(cfg.mean(2.0, 0.5), 4.0 + 6.0 + 0.5);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let cfg: PanelConfig = serde_json::from_str(r#"{"n_periods": 5}"#).unwrap();
        assert_eq!(cfg.n_periods, 5);
        assert_eq!(cfg.n_entities, 100);
    }
}
