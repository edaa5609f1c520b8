//! Michaelis-Menten kinetics from a spectrophotometric assay.
//!
//! Product formation is followed as NADH absorbance at 340 nm. A calibration
//! series fixes the absorbance per unit concentration (a line through the
//! origin); absorbance slopes are converted to velocities with it and the
//! velocities are fitted to `v = Vmax S / (Km + S)`.

use crate::autodiff::{self, Dual};
use crate::error::{Error, Result};
use crate::fit::{
    fit, fit_proportional, CurveModel, FitResult, FitSettings, ParameterSet, ProportionalFit,
};
use crate::traits::Scalar;
use log::info;
use serde::{Deserialize, Serialize};

pub const VMAX: &str = "vmax";
pub const KM: &str = "km";

/// The Michaelis-Menten rate law as a fittable curve, parameters `[vmax, km]`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MichaelisMenten;

impl MichaelisMenten {
    pub fn rate<T: Scalar>(substrate: T, vmax: T, km: T) -> T {
        vmax * substrate / (km + substrate)
    }

    /// Starting point for a fit: `vmax` is the largest observed velocity and
    /// `km` the substrate level whose velocity is closest to half of it.
    pub fn initial_guess(substrate: &[f64], velocity: &[f64]) -> Result<ParameterSet> {
        if substrate.len() != velocity.len() || substrate.is_empty() {
            return Err(Error::invalid(format!(
                "need matching non-empty substrate and velocity data, got {} and {}",
                substrate.len(),
                velocity.len()
            )));
        }
        let vmax = velocity.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let half = 0.5 * vmax;
        let km = substrate
            .iter()
            .zip(velocity)
            .min_by(|a, b| (a.1 - half).abs().total_cmp(&(b.1 - half).abs()))
            .map(|(&s, _)| s)
            .unwrap_or(1.0);
        Ok(ParameterSet::new().with(VMAX, vmax).with(KM, km))
    }
}

impl CurveModel for MichaelisMenten {
    fn param_names(&self) -> Vec<String> {
        vec![VMAX.to_string(), KM.to_string()]
    }

    fn value(&self, x: f64, params: &[f64]) -> f64 {
        Self::rate(x, params[0], params[1])
    }

    fn gradient(&self, x: f64, params: &[f64], out: &mut [f64]) {
        autodiff::gradient(params, out, |p| Self::rate(Dual::constant(x), p[0], p[1]));
    }
}

/// Assay data with the published demo values as defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EnzymeAssay {
    /// NADH standards (mM) and their absorbance.
    pub calibration_concentration: Vec<f64>,
    pub calibration_absorbance: Vec<f64>,
    /// Substrate concentrations (mM) and the initial absorbance slope
    /// (per minute) measured at each.
    pub substrate: Vec<f64>,
    pub absorbance_rate: Vec<f64>,
    pub initial_vmax: Option<f64>,
    pub initial_km: Option<f64>,
}

impl Default for EnzymeAssay {
    fn default() -> Self {
        Self {
            calibration_concentration: vec![0.0, 0.025, 0.05, 0.1, 0.15, 0.2],
            calibration_absorbance: vec![0.0, 0.158, 0.309, 0.627, 0.931, 1.246],
            substrate: vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.0, 4.0],
            absorbance_rate: vec![0.0057, 0.0103, 0.0209, 0.0309, 0.0417, 0.0496, 0.0554],
            initial_vmax: None,
            initial_km: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnzymeAnalysis {
    pub calibration: ProportionalFit,
    /// Velocities (mM/min) derived from `absorbance_rate`.
    pub velocities: Vec<f64>,
    pub fit: FitResult,
}

impl EnzymeAssay {
    pub fn analyze(&self, settings: &FitSettings) -> Result<EnzymeAnalysis> {
        let calibration = fit_proportional(
            &self.calibration_concentration,
            &self.calibration_absorbance,
            settings.confidence_level,
        )?;
        if calibration.slope <= 0.0 {
            return Err(Error::invalid(format!(
                "calibration slope must be positive, got {}",
                calibration.slope
            )));
        }
        info!(
            "calibration slope {:.4} absorbance per mM (r² = {:?})",
            calibration.slope, calibration.r_squared
        );

        let velocities: Vec<f64> = self
            .absorbance_rate
            .iter()
            .map(|&a| calibration.invert(a))
            .collect();

        let mut initial = MichaelisMenten::initial_guess(&self.substrate, &velocities)?;
        if let Some(vmax) = self.initial_vmax {
            initial.insert(VMAX, vmax);
        }
        if let Some(km) = self.initial_km {
            initial.insert(KM, km);
        }

        let fit = fit(&MichaelisMenten, &self.substrate, &velocities, &initial, settings)?;
        Ok(EnzymeAnalysis {
            calibration,
            velocities,
            fit,
        })
    }
}
