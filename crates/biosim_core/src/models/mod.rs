//! Pharmacokinetic, binding, epidemic, and enzyme models.
//!
//! Every model is an explicit parameter struct; nothing is shared between
//! invocations. ODE models implement [`DynamicalSystem`] for any [`Scalar`],
//! so the same right-hand side can be integrated with dual numbers.
//!
//! [`Scalar`]: crate::traits::Scalar

pub mod binding;
pub mod enzyme;
pub mod epidemic;
pub mod gut_blood;
pub mod oral_dose;

pub use binding::Binding;
pub use enzyme::{EnzymeAnalysis, EnzymeAssay, MichaelisMenten};
pub use epidemic::{Seirs, Sirs};
pub use gut_blood::GutBlood;
pub use oral_dose::OralDose;

use crate::error::{Error, Result};
use crate::integrate::{integrate, IntegratorSettings};
use crate::trajectory::Trajectory;
use crate::traits::DynamicalSystem;

/// An ODE model with its own initial state and output grid.
pub trait OdeModel: DynamicalSystem<f64> {
    fn component_names(&self) -> &'static [&'static str];

    fn initial_state(&self) -> Vec<f64>;

    /// End of the simulated interval, starting from t = 0.
    fn duration(&self) -> f64;

    fn output_step(&self) -> f64;

    fn validate(&self) -> Result<()>;

    fn output_times(&self) -> Result<Vec<f64>> {
        time_grid(self.duration(), self.output_step())
    }

    fn simulate(&self, settings: &IntegratorSettings) -> Result<Trajectory> {
        self.validate()?;
        let times = self.output_times()?;
        integrate(self, &self.initial_state(), &times, settings)?
            .with_names(self.component_names().iter().copied())
    }
}

/// Evenly spaced output times `0, step, 2 step, ...` up to and including
/// `end` (the last point is clamped to `end`).
pub fn time_grid(end: f64, step: f64) -> Result<Vec<f64>> {
    if !(end.is_finite() && end > 0.0) {
        return Err(Error::invalid(format!("duration must be positive, got {end}")));
    }
    if !(step.is_finite() && step > 0.0 && step <= end) {
        return Err(Error::invalid(format!(
            "output step must lie in (0, {end}], got {step}"
        )));
    }
    let intervals = (end / step - 1e-9).ceil() as usize;
    let mut times: Vec<f64> = (0..intervals).map(|i| i as f64 * step).collect();
    times.push(end);
    Ok(times)
}

pub(crate) fn require_non_negative(name: &str, value: f64) -> Result<()> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(Error::invalid(format!(
            "{name} must be finite and non-negative, got {value}"
        )))
    }
}

pub(crate) fn require_positive(name: &str, value: f64) -> Result<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(Error::invalid(format!(
            "{name} must be finite and positive, got {value}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::time_grid;

    #[test]
    fn time_grid_includes_both_ends() {
        let grid = time_grid(1.0, 0.25).expect("grid");
        assert_eq!(grid, vec![0.0, 0.25, 0.5, 0.75, 1.0]);

        let grid = time_grid(40.0, 0.1).expect("grid");
        assert_eq!(grid.len(), 401);
        assert_eq!(*grid.last().unwrap(), 40.0);
        assert!(grid.windows(2).all(|w| w[1] > w[0]));
    }

    #[test]
    fn time_grid_clamps_uneven_end() {
        let grid = time_grid(1.0, 0.3).expect("grid");
        assert_eq!(grid.len(), 5);
        assert_eq!(grid[4], 1.0);
    }

    #[test]
    fn time_grid_rejects_bad_steps() {
        assert!(time_grid(1.0, 0.0).is_err());
        assert!(time_grid(1.0, 2.0).is_err());
        assert!(time_grid(0.0, 0.1).is_err());
    }
}
