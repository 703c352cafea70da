use dcf_core::{Error, Result};
use rand::Rng;
use rand_distr::{Distribution, StandardNormal};
use serde::Serialize;

use crate::config::OutcomeConfig;
use crate::generator::WidePanel;

/// One (entity, period) row of the long panel.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LongRecord {
    /// Entity identifier.
    pub entity: u64,
    /// Latent trait of the entity (repeated on every row of the entity).
    pub latent: f64,
    /// Period index, `0..n_periods`.
    pub period: usize,
    /// Observed trait at this period.
    pub observed: f64,
    /// Latent-trait reconstructions, aligned with [`LongPanel::reconstruction_names`].
    pub reconstructions: Vec<f64>,
    /// Entity-level control noise (time-invariant).
    pub control_noise: f64,
    /// Outcome; `NaN` until [`LongPanel::assign_outcome`] runs.
    pub outcome: f64,
}

/// Long-format panel: one record per (entity, period).
#[derive(Debug, Clone, Serialize)]
pub struct LongPanel {
    records: Vec<LongRecord>,
    reconstruction_names: Vec<String>,
    n_entities: usize,
}

/// Reshape a wide panel into long records ("melt").
///
/// Rows are period-major: all entities at period 0, then all at period 1, and
/// so on. Per-entity columns (latent trait, every reconstruction, control
/// noise) are repeated onto each of the entity's rows. Each reconstruction
/// must carry exactly one value per entity.
pub fn melt(panel: &WidePanel, reconstructions: &[(String, Vec<f64>)]) -> Result<LongPanel> {
    let n = panel.n_entities();
    for (name, values) in reconstructions {
        if values.len() != n {
            return Err(Error::Validation(format!(
                "reconstruction `{}` has {} values, expected one per entity ({})",
                name,
                values.len(),
                n
            )));
        }
    }

    let mut records = Vec::with_capacity(n * panel.n_periods());
    for period in 0..panel.n_periods() {
        for i in 0..n {
            records.push(LongRecord {
                entity: panel.entity_ids()[i],
                latent: panel.latent()[i],
                period,
                observed: panel.observed(i, period),
                reconstructions: reconstructions.iter().map(|(_, v)| v[i]).collect(),
                control_noise: panel.control_noise()[i],
                outcome: f64::NAN,
            });
        }
    }

    Ok(LongPanel {
        records,
        reconstruction_names: reconstructions.iter().map(|(name, _)| name.clone()).collect(),
        n_entities: n,
    })
}

impl LongPanel {
    /// Derive the outcome of every row from the ground-truth model.
    ///
    /// One standard-normal draw per row, in row order, scaled by `noise_sd`;
    /// draws happen even when `noise_sd == 0` so the generator state after
    /// this call does not depend on the noise level.
    pub fn assign_outcome<R: Rng + ?Sized>(
        &mut self,
        outcome: &OutcomeConfig,
        rng: &mut R,
    ) -> Result<()> {
        outcome.validate()?;
        for rec in &mut self.records {
            let eps: f64 = StandardNormal.sample(rng);
            rec.outcome = outcome.mean(rec.observed, rec.latent) + outcome.noise_sd * eps;
        }
        Ok(())
    }

    /// All records, period-major.
    pub fn records(&self) -> &[LongRecord] {
        &self.records
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// `true` if the panel has no rows.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Number of distinct entities.
    pub fn n_entities(&self) -> usize {
        self.n_entities
    }

    /// Names of the attached reconstructions.
    pub fn reconstruction_names(&self) -> &[String] {
        &self.reconstruction_names
    }

    /// Entity identifier column.
    pub fn entities(&self) -> Vec<u64> {
        self.records.iter().map(|r| r.entity).collect()
    }

    /// Observed-trait column.
    pub fn observed(&self) -> Vec<f64> {
        self.records.iter().map(|r| r.observed).collect()
    }

    /// Latent-trait column.
    pub fn latent(&self) -> Vec<f64> {
        self.records.iter().map(|r| r.latent).collect()
    }

    /// Control-noise column.
    pub fn control_noise(&self) -> Vec<f64> {
        self.records.iter().map(|r| r.control_noise).collect()
    }

    /// Outcome column.
    pub fn outcome(&self) -> Vec<f64> {
        self.records.iter().map(|r| r.outcome).collect()
    }

    /// Column of the reconstruction called `name`.
    pub fn reconstruction(&self, name: &str) -> Option<Vec<f64>> {
        let k = self.reconstruction_names.iter().position(|n| n == name)?;
        Some(self.records.iter().map(|r| r.reconstructions[k]).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PanelConfig;
    use crate::generator::generate_panel;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::collections::HashMap;

    fn small_panel() -> WidePanel {
        WidePanel::from_parts(
            vec![0.5, 2.0],
            vec![1.0, 1.0, 3.0, 2.0, 5.0, 6.0],
            3,
            vec![-0.3, 0.7],
        )
        .unwrap()
    }

    #[test]
    fn test_melt_period_major() {
        let recon = vec![("pca".to_string(), vec![-1.0, 1.0])];
        let long = melt(&small_panel(), &recon).unwrap();
        assert_eq!(long.len(), 6);
        assert_eq!(long.n_entities(), 2);
        assert_eq!(long.entities(), vec![0, 1, 0, 1, 0, 1]);
        assert_eq!(long.observed(), vec![1.0, 2.0, 1.0, 5.0, 3.0, 6.0]);
        let periods: Vec<usize> = long.records().iter().map(|r| r.period).collect();
        assert_eq!(periods, vec![0, 0, 1, 1, 2, 2]);
        assert_eq!(long.reconstruction("pca").unwrap(), vec![-1.0, 1.0, -1.0, 1.0, -1.0, 1.0]);
        assert!(long.reconstruction("fa").is_none());
        assert!(long.outcome().iter().all(|v| v.is_nan()));
    }

    #[test]
    fn test_melt_rejects_misaligned_reconstruction() {
        let recon = vec![("pca".to_string(), vec![1.0, 2.0, 3.0])];
        assert!(matches!(melt(&small_panel(), &recon), Err(Error::Validation(_))));
    }

    #[test]
    fn test_entity_columns_constant_within_entity() {
        let mut rng = StdRng::seed_from_u64(6429);
        let panel = generate_panel(&PanelConfig::default(), &mut rng).unwrap();
        let long = melt(&panel, &[]).unwrap();

        let mut seen: HashMap<u64, (f64, f64)> = HashMap::new();
        for rec in long.records() {
            let entry = seen.entry(rec.entity).or_insert((rec.latent, rec.control_noise));
            assert_eq!(entry.0, rec.latent, "latent varies within entity {}", rec.entity);
            assert_eq!(entry.1, rec.control_noise, "noise varies within entity {}", rec.entity);
        }
        assert_eq!(seen.len(), 100);
    }

    #[test]
    fn test_noise_free_outcome_is_exact() {
        let mut long = melt(&small_panel(), &[]).unwrap();
        let mut rng = StdRng::seed_from_u64(3);
        long.assign_outcome(&OutcomeConfig::default(), &mut rng).unwrap();
        for rec in long.records() {
            assert_eq!(rec.outcome, 4.0 + 3.0 * rec.observed + rec.latent);
        }
    }

    #[test]
    fn test_noisy_outcome_deviates() {
        let mut long = melt(&small_panel(), &[]).unwrap();
        let mut rng = StdRng::seed_from_u64(3);
        let cfg = OutcomeConfig { noise_sd: 2.0, ..Default::default() };
        long.assign_outcome(&cfg, &mut rng).unwrap();
        let deviations: Vec<f64> =
            long.records().iter().map(|r| r.outcome - cfg.mean(r.observed, r.latent)).collect();
        assert!(deviations.iter().any(|d| d.abs() > 1e-12));
        assert!(deviations.iter().all(|d| d.is_finite()));
    }

    #[test]
    fn test_outcome_draw_count_independent_of_noise_level() {
        let mut a = melt(&small_panel(), &[]).unwrap();
        let mut b = a.clone();
        let mut rng_a = StdRng::seed_from_u64(9);
        let mut rng_b = StdRng::seed_from_u64(9);
        a.assign_outcome(&OutcomeConfig::default(), &mut rng_a).unwrap();
        let noisy = OutcomeConfig { noise_sd: 1.0, ..Default::default() };
        b.assign_outcome(&noisy, &mut rng_b).unwrap();
        assert_eq!(rng_a.random::<u64>(), rng_b.random::<u64>());
    }
}
