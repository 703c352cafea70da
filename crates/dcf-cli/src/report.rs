//! Plain-text rendering of a study report.

use dcf_core::{FitSummary, TestStatistic};
use dcf_inference::{StudyModel, StudyReport};
use std::fmt::{self, Write as _};

const WIDTH: usize = 78;

/// Render `report` as regression tables followed by the bias comparison.
pub fn render(report: &StudyReport) -> String {
    TextReport(report).to_string()
}

struct TextReport<'a>(&'a StudyReport);

impl fmt::Display for TextReport<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let report = self.0;
        let cfg = &report.config;
        writeln!(
            f,
            "Deconfounder study: seed={}, entities={}, periods={}, latent_scale={}, noise_sd={}",
            cfg.seed, cfg.panel.n_entities, cfg.panel.n_periods, cfg.panel.latent_scale,
            cfg.outcome.noise_sd
        )?;
        writeln!(
            f,
            "Truth: outcome = {} + {} * observed + 1 * latent",
            cfg.outcome.intercept, cfg.outcome.coefficient
        )?;
        writeln!(f)?;

        writeln!(f, "Latent-trait reconstructions")?;
        for rec in &report.reconstructions {
            write!(f, "  {:<8} loadings {}", rec.method, join(&rec.loadings))?;
            if let Some(ratio) = rec.explained_variance_ratio {
                write!(f, "  explained variance {:.1}%", 100.0 * ratio)?;
            }
            if let Some(psi) = &rec.uniquenesses {
                write!(f, "  uniquenesses {}", join(psi))?;
            }
            if rec.n_iter > 0 {
                let status = if rec.converged { "converged" } else { "NOT converged" };
                write!(f, "  ({status} after {} iterations)", rec.n_iter)?;
            }
            writeln!(f)?;
        }

        for fit in &report.fits {
            writeln!(f)?;
            write_fit(f, fit)?;
        }

        writeln!(f)?;
        writeln!(f, "Observed-trait coefficient vs truth ({})", cfg.outcome.coefficient)?;
        writeln!(f, "{:<28}{:>12}{:>12}{:>16}", "model", "estimate", "bias", "naive bias left")?;
        writeln!(f, "{}", "-".repeat(68))?;
        for row in &report.comparison {
            let share = row
                .remaining_share
                .map(|s| format!("{:.1}%", 100.0 * s))
                .unwrap_or_else(|| "-".to_string());
            let name = format!("{} {}", row.tag, row.label);
            writeln!(f, "{:<28}{:>12.4}{:>12.4}{:>16}", name, row.estimate, row.bias, share)?;
        }
        Ok(())
    }
}

fn write_fit(f: &mut fmt::Formatter<'_>, fit: &FitSummary) -> fmt::Result {
    let tag = StudyModel::from_label(&fit.label).map(|m| m.tag()).unwrap_or("");
    writeln!(f, "{}", "=".repeat(WIDTH))?;
    writeln!(f, "{tag} {}: {}", fit.label, fit.formula)?;
    write!(f, "Method: {}   No. observations: {}", fit.method.label(), fit.n_obs)?;
    if let Some(g) = fit.n_groups {
        write!(f, "   Groups: {g}")?;
    }
    writeln!(f, "   Df residuals: {}", fit.df_resid)?;

    let mut stats = format!("Scale: {:.6}", fit.scale);
    if let Some(r2) = fit.r_squared {
        write!(stats, "   R-squared: {r2:.4}")?;
    }
    if let Some(adj) = fit.adj_r_squared {
        write!(stats, "   Adj. R-squared: {adj:.4}")?;
    }
    if let Some((fstat, p)) = fit.f_test {
        write!(stats, "   F: {fstat:.4e} (p={p:.3e})")?;
    }
    if let Some(tau2) = fit.group_variance {
        write!(stats, "   Group var: {tau2:.6}")?;
    }
    if let Some(ll) = fit.log_likelihood {
        write!(stats, "   Log-lik: {ll:.4}")?;
    }
    if !fit.converged {
        stats.push_str("   (NOT converged)");
    }
    writeln!(f, "{stats}")?;
    writeln!(f, "{}", "-".repeat(WIDTH))?;

    let (stat, p) = match fit.statistic {
        TestStatistic::T => ("t", "P>|t|"),
        TestStatistic::Z => ("z", "P>|z|"),
    };
    writeln!(
        f,
        "{:<16}{:>10}{:>11}{:>11}{:>9}{:>11}{:>10}",
        "", "coef", "std err", stat, p, "[0.025", "0.975]"
    )?;
    for c in &fit.coefficients {
        writeln!(
            f,
            "{:<16}{:>10.4}{:>11.4}{:>11.3}{:>9.3}{:>11.4}{:>10.4}",
            c.name, c.estimate, c.std_error, c.statistic, c.p_value, c.conf_low, c.conf_high
        )?;
    }
    let robust: Vec<_> = fit
        .coefficients
        .iter()
        .filter_map(|c| Some((c, c.robust_std_error?, c.robust_interval?)))
        .collect();
    if !robust.is_empty() {
        writeln!(f, "Entity-clustered:")?;
        for (c, se, (lo, hi)) in robust {
            writeln!(f, "{:<16}{:>10}{:>11.4}{:>31.4}{:>10.4}", c.name, "", se, lo, hi)?;
        }
    }
    writeln!(f, "{}", "=".repeat(WIDTH))
}

fn join(values: &[f64]) -> String {
    let parts: Vec<String> = values.iter().map(|v| format!("{v:.4}")).collect();
    format!("[{}]", parts.join(", "))
}
