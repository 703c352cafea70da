use dcf_core::{Error, Result};
use nalgebra::DMatrix;
use rand::Rng;
use rand_distr::{Distribution, Exp, Poisson, StandardNormal};

use crate::config::PanelConfig;

/// Entity × period panel in wide layout.
///
/// `observed` is row-major: row `i` holds the cumulative series of entity `i`.
#[derive(Debug, Clone)]
pub struct WidePanel {
    entity_ids: Vec<u64>,
    latent: Vec<f64>,
    observed: Vec<f64>,
    n_periods: usize,
    control_noise: Vec<f64>,
}

impl WidePanel {
    /// Assemble a panel from already generated columns.
    ///
    /// `observed` is row-major with `latent.len()` rows and `n_periods` columns;
    /// `control_noise` holds one value per entity.
    pub fn from_parts(
        latent: Vec<f64>,
        observed: Vec<f64>,
        n_periods: usize,
        control_noise: Vec<f64>,
    ) -> Result<Self> {
        let n = latent.len();
        if n == 0 || n_periods == 0 {
            return Err(Error::Validation("panel must be non-empty".to_string()));
        }
        if observed.len() != n * n_periods {
            return Err(Error::Validation(format!(
                "observed has wrong length: expected {}x{}={}, got {}",
                n,
                n_periods,
                n * n_periods,
                observed.len()
            )));
        }
        if control_noise.len() != n {
            return Err(Error::Validation(format!(
                "control_noise length ({}) != n_entities ({})",
                control_noise.len(),
                n
            )));
        }
        let entity_ids = (0..n as u64).collect();
        Ok(Self { entity_ids, latent, observed, n_periods, control_noise })
    }

    /// Number of entities.
    pub fn n_entities(&self) -> usize {
        self.latent.len()
    }

    /// Number of periods.
    pub fn n_periods(&self) -> usize {
        self.n_periods
    }

    /// Entity identifiers, `0..n_entities`.
    pub fn entity_ids(&self) -> &[u64] {
        &self.entity_ids
    }

    /// Latent trait per entity.
    pub fn latent(&self) -> &[f64] {
        &self.latent
    }

    /// Entity-level control noise (one draw per entity, time-invariant).
    pub fn control_noise(&self) -> &[f64] {
        &self.control_noise
    }

    /// Observed series of entity `i`.
    pub fn observed_row(&self, i: usize) -> &[f64] {
        let start = i * self.n_periods;
        &self.observed[start..start + self.n_periods]
    }

    /// Observed value of entity `i` at `period`.
    #[inline]
    pub fn observed(&self, i: usize, period: usize) -> f64 {
        self.observed[i * self.n_periods + period]
    }

    /// Observed values as an `n_entities × n_periods` matrix.
    pub fn observed_matrix(&self) -> DMatrix<f64> {
        DMatrix::from_row_slice(self.n_entities(), self.n_periods, &self.observed)
    }
}

/// Draw one Poisson increment; a latent trait of exactly zero contributes nothing.
fn poisson_increment<R: Rng + ?Sized>(rate: f64, rng: &mut R) -> Result<f64> {
    if rate <= 0.0 {
        return Ok(0.0);
    }
    let dist = Poisson::new(rate)
        .map_err(|e| Error::Computation(format!("invalid Poisson rate {rate}: {e}")))?;
    Ok(dist.sample(rng))
}

/// Generate a synthetic wide panel.
///
/// Draw order is fixed so a seeded generator reproduces the same panel:
/// 1. latent trait for every entity, `Exp(mean = latent_scale)`;
/// 2. per entity, per period, an increment `Poisson(latent)` accumulated
///    into the observed series (period 0 is the first increment itself);
/// 3. one standard-normal control-noise value per entity.
///
/// The configuration is validated before the first draw.
pub fn generate_panel<R: Rng + ?Sized>(config: &PanelConfig, rng: &mut R) -> Result<WidePanel> {
    config.validate()?;
    let n = config.n_entities;
    let t = config.n_periods;

    let latent_dist = Exp::new(1.0 / config.latent_scale)
        .map_err(|e| Error::InvalidConfig(format!("latent_scale: {e}")))?;
    let latent: Vec<f64> = (0..n).map(|_| latent_dist.sample(rng)).collect();

    let mut observed = Vec::with_capacity(n * t);
    for &rate in &latent {
        let mut level = 0.0;
        for _ in 0..t {
            level += poisson_increment(rate, rng)?;
            observed.push(level);
        }
    }

    let control_noise: Vec<f64> = (0..n).map(|_| StandardNormal.sample(rng)).collect();

    log::debug!(
        "generated panel: {} entities x {} periods, mean latent {:.4}",
        n,
        t,
        latent.iter().sum::<f64>() / n as f64
    );

    WidePanel::from_parts(latent, observed, t, control_noise)
}
