//! Closed-form concentration after a single oral dose with first-order
//! absorption and elimination (the Bateman function).

use super::{require_non_negative, require_positive, time_grid};
use crate::error::Result;
use crate::trajectory::Trajectory;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OralDose {
    pub half_life: f64,
    pub absorption_rate: f64,
    pub dose: f64,
    /// Apparent volume of distribution; concentration is amount / volume.
    pub volume: f64,
    pub duration: f64,
    pub output_step: f64,
}

impl Default for OralDose {
    fn default() -> Self {
        Self {
            half_life: 5.0,
            absorption_rate: 0.9,
            dose: 1000.0,
            volume: 1.0,
            duration: 40.0,
            output_step: 0.1,
        }
    }
}

impl OralDose {
    pub fn elimination_rate(&self) -> f64 {
        std::f64::consts::LN_2 / self.half_life
    }

    pub fn validate(&self) -> Result<()> {
        require_positive("half_life", self.half_life)?;
        require_positive("absorption_rate", self.absorption_rate)?;
        require_non_negative("dose", self.dose)?;
        require_positive("volume", self.volume)
    }

    /// `C(t) = D ka / (V (ka - ke)) (e^{-ke t} - e^{-ka t})`.
    pub fn concentration(&self, t: f64) -> f64 {
        let ka = self.absorption_rate;
        let ke = self.elimination_rate();
        let d = ka - ke;
        let eke = (-ke * t).exp();
        // (e^{-ke t} - e^{-ka t}) / (ka - ke) without cancellation near ka = ke.
        let s = if d.abs() < 1e-10 {
            t
        } else {
            -(-d * t).exp_m1() / d
        };
        self.dose / self.volume * ka * eke * s
    }

    /// Time of maximum concentration, `ln(ka / ke) / (ka - ke)`.
    pub fn peak_time(&self) -> f64 {
        let ka = self.absorption_rate;
        let ke = self.elimination_rate();
        if (ka - ke).abs() < 1e-10 {
            1.0 / ka
        } else {
            (ka / ke).ln() / (ka - ke)
        }
    }

    pub fn peak_concentration(&self) -> f64 {
        self.concentration(self.peak_time())
    }

    /// The concentration curve on the model's output grid.
    pub fn curve(&self) -> Result<Trajectory> {
        self.validate()?;
        let times = time_grid(self.duration, self.output_step)?;
        let states = times.iter().map(|&t| vec![self.concentration(t)]).collect();
        Trajectory::new(vec!["concentration".to_string()], times, states)
    }
}
