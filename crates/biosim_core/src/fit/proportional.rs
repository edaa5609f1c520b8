//! Least squares for a line through the origin, `y = slope * x`.
//!
//! Closed form: `slope = Σxy / Σx²`, with `s² = SSR / (n - 1)` and
//! `se(slope) = sqrt(s² / Σx²)`.

use super::{t_critical, validate_confidence};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProportionalFit {
    pub slope: f64,
    pub std_error: f64,
    pub lower: f64,
    pub upper: f64,
    pub residuals: Vec<f64>,
    pub sum_squared_residuals: f64,
    /// Uncentred coefficient of determination, `1 - SSR / Σy²`.
    pub r_squared: Option<f64>,
    pub degrees_of_freedom: usize,
    pub confidence_level: f64,
}

impl ProportionalFit {
    pub fn predict(&self, x: f64) -> f64 {
        self.slope * x
    }

    /// Inverts the calibration line: the `x` that would produce `y`.
    pub fn invert(&self, y: f64) -> f64 {
        y / self.slope
    }
}

pub fn fit_proportional(x_data: &[f64], y_data: &[f64], confidence_level: f64) -> Result<ProportionalFit> {
    validate_confidence(confidence_level)?;
    if x_data.len() != y_data.len() {
        return Err(Error::invalid(format!(
            "x and y lengths differ: {} vs {}",
            x_data.len(),
            y_data.len()
        )));
    }
    if x_data.iter().chain(y_data).any(|v| !v.is_finite()) {
        return Err(Error::invalid("observations must be finite"));
    }
    let n = x_data.len();
    if n < 2 {
        return Err(Error::InsufficientData {
            observations: n,
            parameters: 1,
        });
    }

    let sxx: f64 = x_data.iter().map(|x| x * x).sum();
    if sxx == 0.0 {
        return Err(Error::invalid("all x values are zero; slope is undefined"));
    }
    let sxy: f64 = x_data.iter().zip(y_data).map(|(x, y)| x * y).sum();
    let slope = sxy / sxx;

    let residuals: Vec<f64> = x_data
        .iter()
        .zip(y_data)
        .map(|(x, y)| y - slope * x)
        .collect();
    let ssr: f64 = residuals.iter().map(|r| r * r).sum();
    let dof = n - 1;
    let std_error = (ssr / dof as f64 / sxx).sqrt();
    let t = t_critical(confidence_level, dof)?;
    let syy: f64 = y_data.iter().map(|y| y * y).sum();

    Ok(ProportionalFit {
        slope,
        std_error,
        lower: slope - t * std_error,
        upper: slope + t * std_error,
        residuals,
        sum_squared_residuals: ssr,
        r_squared: (syy > 0.0).then(|| 1.0 - ssr / syy),
        degrees_of_freedom: dof,
        confidence_level,
    })
}

#[cfg(test)]
mod tests {
    use super::fit_proportional;
    use crate::error::Error;

    #[test]
    fn exact_line_through_origin() {
        // NADH at 340 nm: A = 6.22 * c for a 1 cm path.
        let conc = [0.0, 0.05, 0.1, 0.15, 0.2];
        let absorbance: Vec<f64> = conc.iter().map(|c| 6.22 * c).collect();
        let fit = fit_proportional(&conc, &absorbance, 0.95).expect("fit");
        assert!((fit.slope - 6.22).abs() < 1e-12);
        assert!(fit.std_error < 1e-12);
        assert!((fit.invert(fit.predict(0.12)) - 0.12).abs() < 1e-12);
        assert_eq!(fit.degrees_of_freedom, 4);
    }

    #[test]
    fn noisy_slope_has_covering_interval() {
        let x = [1.0, 2.0, 3.0, 4.0];
        let y = [2.1, 3.9, 6.2, 7.8];
        let fit = fit_proportional(&x, &y, 0.95).expect("fit");
        // Σxy = 59.7, Σx² = 30
        assert!((fit.slope - 1.99).abs() < 1e-12, "slope {}", fit.slope);
        assert!(fit.lower < 2.0 && 2.0 < fit.upper);
        assert!(fit.r_squared.expect("non-zero y") > 0.99);
    }

    #[test]
    fn degenerate_inputs_fail() {
        assert!(matches!(
            fit_proportional(&[1.0], &[2.0], 0.95),
            Err(Error::InsufficientData { observations: 1, .. })
        ));
        assert!(matches!(
            fit_proportional(&[0.0, 0.0], &[1.0, 2.0], 0.95),
            Err(Error::InvalidInput(_))
        ));
        assert!(matches!(
            fit_proportional(&[1.0, 2.0], &[1.0], 0.95),
            Err(Error::InvalidInput(_))
        ));
    }
}
