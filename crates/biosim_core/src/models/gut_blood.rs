use super::{require_non_negative, require_positive, OdeModel};
use crate::error::Result;
use crate::traits::{DynamicalSystem, Scalar};
use serde::{Deserialize, Serialize};

/// Two-compartment oral dosing: drug moves from the gut into the blood at
/// rate `a` and is eliminated from the blood with half-life `ln 2 / k`.
///
/// ```text
/// dG/dt = -a G
/// dB/dt =  a G - k B
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GutBlood {
    pub half_life: f64,
    pub absorption_rate: f64,
    /// Initial amount in the gut.
    pub dose: f64,
    pub blood_initial: f64,
    pub duration: f64,
    pub output_step: f64,
}

impl Default for GutBlood {
    fn default() -> Self {
        Self {
            half_life: 5.0,
            absorption_rate: 0.9,
            dose: 1000.0,
            blood_initial: 0.0,
            duration: 40.0,
            output_step: 0.1,
        }
    }
}

impl GutBlood {
    pub fn elimination_rate(&self) -> f64 {
        std::f64::consts::LN_2 / self.half_life
    }
}

impl<T: Scalar> DynamicalSystem<T> for GutBlood {
    fn dimension(&self) -> usize {
        2
    }

    fn apply(&self, _t: T, x: &[T], out: &mut [T]) {
        let a = T::lit(self.absorption_rate);
        let k = T::lit(self.elimination_rate());
        out[0] = -a * x[0];
        out[1] = a * x[0] - k * x[1];
    }
}

impl OdeModel for GutBlood {
    fn component_names(&self) -> &'static [&'static str] {
        &["gut", "blood"]
    }

    fn initial_state(&self) -> Vec<f64> {
        vec![self.dose, self.blood_initial]
    }

    fn duration(&self) -> f64 {
        self.duration
    }

    fn output_step(&self) -> f64 {
        self.output_step
    }

    fn validate(&self) -> Result<()> {
        require_positive("half_life", self.half_life)?;
        require_non_negative("absorption_rate", self.absorption_rate)?;
        require_non_negative("dose", self.dose)?;
        require_non_negative("blood_initial", self.blood_initial)
    }
}

#[cfg(test)]
mod tests {
    use super::GutBlood;
    use crate::integrate::IntegratorSettings;
    use crate::models::OdeModel;

    #[test]
    fn gut_empties_exponentially() {
        let model = GutBlood::default();
        let trajectory = model.simulate(&IntegratorSettings::default()).expect("simulate");
        let gut = trajectory.column_by_name("gut").expect("gut column");
        for (t, g) in trajectory.times().iter().zip(&gut) {
            let exact = 1000.0 * (-0.9 * t).exp();
            assert!((g - exact).abs() <= 1e-6 * 1000.0, "t = {t}: {g} vs {exact}");
        }
    }

    #[test]
    fn total_drug_only_decreases() {
        let model = GutBlood::default();
        let trajectory = model.simulate(&IntegratorSettings::default()).expect("simulate");
        let totals: Vec<f64> = trajectory.states().iter().map(|s| s[0] + s[1]).collect();
        assert!(totals.windows(2).all(|w| w[1] <= w[0] + 1e-9));
    }

    #[test]
    fn rejects_non_positive_half_life() {
        let model = GutBlood {
            half_life: 0.0,
            ..GutBlood::default()
        };
        assert!(model.simulate(&IntegratorSettings::default()).is_err());
    }
}
