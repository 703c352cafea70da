//! Bounded one-dimensional minimization
//!
//! This module wraps argmin's Brent solver behind a small interface used by the
//! mixed-model profile likelihood.

use argmin::core::{CostFunction, Executor, State, TerminationReason, TerminationStatus};
use argmin::solver::brent::BrentOpt;
use dcf_core::{Error, Result};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Configuration for the Brent minimizer
#[derive(Debug, Clone)]
pub struct BrentConfig {
    /// Maximum number of iterations
    pub max_iter: u64,
    /// Relative tolerance on the abscissa
    pub tol: f64,
}

impl Default for BrentConfig {
    fn default() -> Self {
        Self { max_iter: 500, tol: 1e-10 }
    }
}

/// Result of a scalar minimization
#[derive(Debug, Clone)]
pub struct ScalarOptimum {
    /// Minimizer
    pub x: f64,
    /// Function value at `x`
    pub fval: f64,
    /// Number of iterations
    pub n_iter: u64,
    /// Number of objective evaluations
    pub n_fev: usize,
    /// Convergence status
    pub converged: bool,
    /// Termination message
    pub message: String,
}

impl fmt::Display for ScalarOptimum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ScalarOptimum(x={:.6}, fval={:.6}, n_iter={}, n_fev={}, converged={})",
            self.x, self.fval, self.n_iter, self.n_fev, self.converged
        )
    }
}

/// Objective of one real variable
pub trait ScalarObjective {
    /// Evaluate the objective at `x`
    fn eval(&self, x: f64) -> Result<f64>;
}

impl<F> ScalarObjective for F
where
    F: Fn(f64) -> Result<f64>,
{
    fn eval(&self, x: f64) -> Result<f64> {
        self(x)
    }
}

/// Wrapper to make ScalarObjective compatible with argmin
struct ArgminScalar<'a> {
    objective: &'a dyn ScalarObjective,
    n_fev: Arc<AtomicUsize>,
}

impl CostFunction for ArgminScalar<'_> {
    type Param = f64;
    type Output = f64;

    fn cost(&self, x: &Self::Param) -> std::result::Result<Self::Output, argmin::core::Error> {
        self.n_fev.fetch_add(1, Ordering::Relaxed);
        self.objective.eval(*x).map_err(|e| argmin::core::Error::msg(e.to_string()))
    }
}

/// Brent's method on a closed interval
pub struct BrentMinimizer {
    config: BrentConfig,
}

impl BrentMinimizer {
    /// Create a new minimizer with the given configuration
    pub fn new(config: BrentConfig) -> Self {
        Self { config }
    }

    /// Minimize `objective` over `[lo, hi]`.
    ///
    /// A minimum sitting on either end of the interval is returned as a
    /// regular, converged result; callers decide whether a boundary optimum
    /// is acceptable.
    pub fn minimize(
        &self,
        objective: &dyn ScalarObjective,
        lo: f64,
        hi: f64,
    ) -> Result<ScalarOptimum> {
        if !(lo.is_finite() && hi.is_finite() && lo < hi) {
            return Err(Error::Validation(format!("invalid bracket [{lo}, {hi}]")));
        }

        let n_fev = Arc::new(AtomicUsize::new(0));
        let problem = ArgminScalar { objective, n_fev: n_fev.clone() };
        let solver = BrentOpt::new(lo, hi).set_tolerance(self.config.tol, 1e-14);

        let res = Executor::new(problem, solver)
            .configure(|state| state.max_iters(self.config.max_iter))
            .run()
            .map_err(|e| Error::Computation(format!("Optimization failed: {e}")))?;

        let state = res.state();
        let x = *state
            .get_best_param()
            .ok_or_else(|| Error::Computation("No best parameter found".to_string()))?;
        let fval = state.get_best_cost();
        let n_iter = state.get_iter();
        let n_fev = n_fev.load(Ordering::Relaxed);

        let termination = state.get_termination_status();
        let converged = matches!(
            termination,
            TerminationStatus::Terminated(TerminationReason::SolverConverged)
                | TerminationStatus::Terminated(TerminationReason::TargetCostReached)
        );
        let message = termination.to_string();

        Ok(ScalarOptimum { x: x.clamp(lo, hi), fval, n_iter, n_fev, converged, message })
    }
}

impl Default for BrentMinimizer {
    fn default() -> Self {
        Self::new(BrentConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_brent_quadratic() {
        let objective = |x: f64| -> Result<f64> { Ok((x - 2.0).powi(2) + 1.0) };
        let result = BrentMinimizer::default().minimize(&objective, -10.0, 10.0).unwrap();

        println!("{}", result);

        assert!(result.converged, "Brent should converge: {}", result.message);
        assert_relative_eq!(result.x, 2.0, epsilon = 1e-6);
        assert_relative_eq!(result.fval, 1.0, epsilon = 1e-10);
        assert!(result.n_fev > 0);
    }

    #[test]
    fn test_brent_boundary_minimum() {
        // Monotone decreasing on the bracket: optimum at the upper end.
        let objective = |x: f64| -> Result<f64> { Ok(-x) };
        let result = BrentMinimizer::default().minimize(&objective, 0.0, 5.0).unwrap();
        assert!(result.x > 5.0 - 1e-4, "x={}", result.x);
        assert!(result.x <= 5.0);
    }

    #[test]
    fn test_brent_propagates_objective_error() {
        let objective =
            |_: f64| -> Result<f64> { Err(Error::Computation("objective blew up".to_string())) };
        let err = BrentMinimizer::default().minimize(&objective, 0.0, 1.0).unwrap_err();
        assert!(err.to_string().contains("objective blew up"), "{err}");
    }

    #[test]
    fn test_brent_rejects_bad_bracket() {
        let objective = |x: f64| -> Result<f64> { Ok(x * x) };
        assert!(BrentMinimizer::default().minimize(&objective, 1.0, -1.0).is_err());
        assert!(BrentMinimizer::default().minimize(&objective, f64::NAN, 1.0).is_err());
    }
}
