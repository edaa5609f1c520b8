//! Compartmental epidemic models with waning immunity.
//!
//! Incidence is frequency dependent, `beta * S * I / N`. Setting
//! `delta = 0` removes the return flow from R to S and gives the classic
//! SIR (or SEIR) model.

use super::{require_non_negative, require_positive, OdeModel};
use crate::error::{Error, Result};
use crate::traits::{DynamicalSystem, Scalar};
use serde::{Deserialize, Serialize};

/// Susceptible, infectious, recovered; recovered lose immunity at `delta`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Sirs {
    pub beta: f64,
    pub gamma: f64,
    pub delta: f64,
    pub population_size: f64,
    pub initial_infected: f64,
    pub initial_recovered: f64,
    pub duration: f64,
    pub output_step: f64,
}

impl Default for Sirs {
    fn default() -> Self {
        Self {
            beta: 0.3,
            gamma: 0.1,
            delta: 0.01,
            population_size: 1.0,
            initial_infected: 0.001,
            initial_recovered: 0.0,
            duration: 365.0,
            output_step: 1.0,
        }
    }
}

impl Sirs {
    /// Basic reproduction number `beta / gamma`.
    pub fn r0(&self) -> f64 {
        self.beta / self.gamma
    }

    /// The SEIRS model with the same rates and the given incubation rate.
    pub fn with_incubation(&self, incubation_rate: f64) -> Seirs {
        Seirs {
            beta: self.beta,
            gamma: self.gamma,
            delta: self.delta,
            incubation_rate,
            population_size: self.population_size,
            initial_exposed: 0.0,
            initial_infected: self.initial_infected,
            initial_recovered: self.initial_recovered,
            duration: self.duration,
            output_step: self.output_step,
        }
    }
}

impl<T: Scalar> DynamicalSystem<T> for Sirs {
    fn dimension(&self) -> usize {
        3
    }

    fn apply(&self, _t: T, x: &[T], out: &mut [T]) {
        let (s, i, r) = (x[0], x[1], x[2]);
        let infection = T::lit(self.beta) * s * i / T::lit(self.population_size);
        let recovery = T::lit(self.gamma) * i;
        let waning = T::lit(self.delta) * r;
        out[0] = waning - infection;
        out[1] = infection - recovery;
        out[2] = recovery - waning;
    }
}

impl OdeModel for Sirs {
    fn component_names(&self) -> &'static [&'static str] {
        &["susceptible", "infected", "recovered"]
    }

    fn initial_state(&self) -> Vec<f64> {
        let susceptible = self.population_size - self.initial_infected - self.initial_recovered;
        vec![susceptible, self.initial_infected, self.initial_recovered]
    }

    fn duration(&self) -> f64 {
        self.duration
    }

    fn output_step(&self) -> f64 {
        self.output_step
    }

    fn validate(&self) -> Result<()> {
        validate_rates(self.beta, self.gamma, self.delta)?;
        validate_population(
            self.population_size,
            &[
                ("initial_infected", self.initial_infected),
                ("initial_recovered", self.initial_recovered),
            ],
        )
    }
}

/// SIRS with an exposed (latent) compartment left at rate `incubation_rate`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Seirs {
    pub beta: f64,
    pub gamma: f64,
    pub delta: f64,
    pub incubation_rate: f64,
    pub population_size: f64,
    pub initial_exposed: f64,
    pub initial_infected: f64,
    pub initial_recovered: f64,
    pub duration: f64,
    pub output_step: f64,
}

impl Default for Seirs {
    fn default() -> Self {
        Sirs::default().with_incubation(0.2)
    }
}

impl<T: Scalar> DynamicalSystem<T> for Seirs {
    fn dimension(&self) -> usize {
        4
    }

    fn apply(&self, _t: T, x: &[T], out: &mut [T]) {
        let (s, e, i, r) = (x[0], x[1], x[2], x[3]);
        let infection = T::lit(self.beta) * s * i / T::lit(self.population_size);
        let onset = T::lit(self.incubation_rate) * e;
        let recovery = T::lit(self.gamma) * i;
        let waning = T::lit(self.delta) * r;
        out[0] = waning - infection;
        out[1] = infection - onset;
        out[2] = onset - recovery;
        out[3] = recovery - waning;
    }
}

impl OdeModel for Seirs {
    fn component_names(&self) -> &'static [&'static str] {
        &["susceptible", "exposed", "infected", "recovered"]
    }

    fn initial_state(&self) -> Vec<f64> {
        let susceptible = self.population_size
            - self.initial_exposed
            - self.initial_infected
            - self.initial_recovered;
        vec![
            susceptible,
            self.initial_exposed,
            self.initial_infected,
            self.initial_recovered,
        ]
    }

    fn duration(&self) -> f64 {
        self.duration
    }

    fn output_step(&self) -> f64 {
        self.output_step
    }

    fn validate(&self) -> Result<()> {
        validate_rates(self.beta, self.gamma, self.delta)?;
        require_non_negative("incubation_rate", self.incubation_rate)?;
        validate_population(
            self.population_size,
            &[
                ("initial_exposed", self.initial_exposed),
                ("initial_infected", self.initial_infected),
                ("initial_recovered", self.initial_recovered),
            ],
        )
    }
}

fn validate_rates(beta: f64, gamma: f64, delta: f64) -> Result<()> {
    require_non_negative("beta", beta)?;
    require_non_negative("gamma", gamma)?;
    require_non_negative("delta", delta)
}

fn validate_population(size: f64, initial: &[(&str, f64)]) -> Result<()> {
    require_positive("population_size", size)?;
    let mut occupied = 0.0;
    for &(name, value) in initial {
        require_non_negative(name, value)?;
        occupied += value;
    }
    if occupied > size {
        return Err(Error::invalid(format!(
            "initial compartments hold {occupied}, more than population_size {size}"
        )));
    }
    Ok(())
}
