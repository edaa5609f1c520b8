use super::{require_non_negative, require_positive, OdeModel};
use crate::error::{Error, Result};
use crate::traits::{DynamicalSystem, Scalar};
use serde::{Deserialize, Serialize};

/// Ligand binding to a fixed pool of receptors at constant ligand
/// concentration `L`. State is `[free, bound]` receptor counts.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Binding {
    pub kon: f64,
    pub koff: f64,
    pub receptor_total: f64,
    pub ligand_concentration: f64,
    pub bound_initial: f64,
    pub duration: f64,
    pub output_step: f64,
}

impl Default for Binding {
    fn default() -> Self {
        Self {
            kon: 0.6,
            koff: 0.01,
            receptor_total: 2000.0,
            ligand_concentration: 0.0167,
            bound_initial: 0.0,
            duration: 1000.0,
            output_step: 1.0,
        }
    }
}

impl Binding {
    /// Bound receptors once association and dissociation balance.
    pub fn equilibrium_bound(&self) -> f64 {
        let on = self.kon * self.ligand_concentration;
        self.receptor_total * on / (on + self.koff)
    }
}

impl<T: Scalar> DynamicalSystem<T> for Binding {
    fn dimension(&self) -> usize {
        2
    }

    fn apply(&self, _t: T, x: &[T], out: &mut [T]) {
        let on = T::lit(self.kon * self.ligand_concentration);
        let flux = on * x[0] - T::lit(self.koff) * x[1];
        out[0] = -flux;
        out[1] = flux;
    }
}

impl OdeModel for Binding {
    fn component_names(&self) -> &'static [&'static str] {
        &["free", "bound"]
    }

    fn initial_state(&self) -> Vec<f64> {
        vec![self.receptor_total - self.bound_initial, self.bound_initial]
    }

    fn duration(&self) -> f64 {
        self.duration
    }

    fn output_step(&self) -> f64 {
        self.output_step
    }

    fn validate(&self) -> Result<()> {
        require_non_negative("kon", self.kon)?;
        require_non_negative("koff", self.koff)?;
        require_non_negative("ligand_concentration", self.ligand_concentration)?;
        require_positive("receptor_total", self.receptor_total)?;
        require_non_negative("bound_initial", self.bound_initial)?;
        if self.kon * self.ligand_concentration + self.koff == 0.0 {
            return Err(Error::invalid("kon * ligand_concentration + koff must be positive"));
        }
        if self.bound_initial > self.receptor_total {
            return Err(Error::invalid(format!(
                "bound_initial {} exceeds receptor_total {}",
                self.bound_initial, self.receptor_total
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::Binding;
    use crate::integrate::IntegratorSettings;
    use crate::models::OdeModel;

    #[test]
    fn bound_rises_to_equilibrium() {
        let model = Binding::default();
        let expected = model.equilibrium_bound();
        assert!((expected - 1000.999).abs() < 1e-3, "equilibrium {expected}");

        let trajectory = model.simulate(&IntegratorSettings::default()).expect("simulate");
        let bound = trajectory.component_index("bound").expect("bound");
        assert!(trajectory.is_non_decreasing(bound, 1e-4));
        let last = trajectory.final_state().expect("non-empty")[bound];
        assert!((last - expected).abs() < 1e-6 * expected, "final {last}");
    }

    #[test]
    fn receptors_are_conserved() {
        let model = Binding {
            bound_initial: 500.0,
            ..Binding::default()
        };
        let trajectory = model.simulate(&IntegratorSettings::default()).expect("simulate");
        for (_, state) in trajectory.iter() {
            assert!((state[0] + state[1] - 2000.0).abs() < 1e-6);
        }
    }

    #[test]
    fn steady_state_is_reached_well_before_the_horizon() {
        let trajectory = Binding::default()
            .simulate(&IntegratorSettings::default())
            .expect("simulate");
        let settled = trajectory.steady_state_time(1, 1e-3).expect("settles");
        assert!(settled > 100.0 && settled < 1000.0, "settled at {settled}");
    }

    #[test]
    fn rejects_overfull_initial_state() {
        let model = Binding {
            bound_initial: 2500.0,
            ..Binding::default()
        };
        assert!(model.validate().is_err());
    }
}
