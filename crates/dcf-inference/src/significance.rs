//! Two-sided p-values and critical values for coefficient tables.

use dcf_core::{Error, Result};
use statrs::distribution::{ContinuousCDF, FisherSnedecor, StudentsT};
use statrs::function::erf::{erf_inv, erfc};

/// Coverage of every interval reported by the study.
pub const CONFIDENCE_LEVEL: f64 = 0.95;

fn students_t(df: f64) -> Result<StudentsT> {
    StudentsT::new(0.0, 1.0, df)
        .map_err(|e| Error::Computation(format!("invalid Student-t df={df}: {e}")))
}

/// Two-sided p-value of `t` under Student-t with `df` degrees of freedom.
pub fn t_two_sided_p(t: f64, df: f64) -> Result<f64> {
    if t.is_nan() {
        return Ok(f64::NAN);
    }
    let dist = students_t(df)?;
    Ok((2.0 * (1.0 - dist.cdf(t.abs()))).clamp(0.0, 1.0))
}

/// Two-sided p-value of `z` under the standard normal.
pub fn z_two_sided_p(z: f64) -> f64 {
    if z.is_nan() {
        return f64::NAN;
    }
    erfc(z.abs() / std::f64::consts::SQRT_2).clamp(0.0, 1.0)
}

/// Critical value `c` with `P(|T| <= c) = level` for Student-t(`df`).
pub fn t_critical(df: f64, level: f64) -> Result<f64> {
    Ok(students_t(df)?.inverse_cdf(0.5 + 0.5 * level))
}

/// Critical value `c` with `P(|Z| <= c) = level`.
pub fn z_critical(level: f64) -> f64 {
    std::f64::consts::SQRT_2 * erf_inv(level)
}

/// Upper-tail p-value of an F statistic.
pub fn f_upper_p(f: f64, df_num: f64, df_den: f64) -> Result<f64> {
    if f.is_nan() {
        return Ok(f64::NAN);
    }
    if f.is_infinite() {
        return Ok(0.0);
    }
    let dist = FisherSnedecor::new(df_num, df_den)
        .map_err(|e| Error::Computation(format!("invalid F({df_num}, {df_den}): {e}")))?;
    Ok((1.0 - dist.cdf(f.max(0.0))).clamp(0.0, 1.0))
}
