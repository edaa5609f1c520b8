//! Nonlinear least-squares curve fitting.
//!
//! [`fit`] minimizes `Σ (y_i - f(x_i; p))²` with Levenberg-Marquardt and
//! reports each parameter with a standard error taken from the approximate
//! covariance `s² (JᵀJ)⁻¹` and a Student-t confidence interval.

mod parameters;
mod proportional;

pub use parameters::ParameterSet;
pub use proportional::{fit_proportional, ProportionalFit};

use crate::error::{Error, Result};
use log::{debug, warn};
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, StudentsT};

/// A model `y = f(x; p)` that is smooth in its parameters.
pub trait CurveModel {
    /// Parameter names, in the order `value` and `gradient` expect them.
    fn param_names(&self) -> Vec<String>;

    fn value(&self, x: f64, params: &[f64]) -> f64;

    /// Writes `∂f/∂p_j` at `x` into `out`.
    ///
    /// Defaults to central finite differences.
    fn gradient(&self, x: f64, params: &[f64], out: &mut [f64]) {
        let step_scale = f64::EPSILON.cbrt();
        let mut shifted = params.to_vec();
        for j in 0..params.len() {
            let h = step_scale * if params[j] != 0.0 { params[j].abs() } else { 1.0 };
            shifted[j] = params[j] + h;
            let up = self.value(x, &shifted);
            shifted[j] = params[j] - h;
            let down = self.value(x, &shifted);
            shifted[j] = params[j];
            out[j] = (up - down) / (2.0 * h);
        }
    }
}

/// Adapts a closure `(x, params) -> y` into a [`CurveModel`].
pub struct FnCurve<F> {
    names: Vec<String>,
    f: F,
}

impl<F> FnCurve<F>
where
    F: Fn(f64, &[f64]) -> f64,
{
    pub fn new<I, S>(names: I, f: F) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
            f,
        }
    }
}

impl<F> CurveModel for FnCurve<F>
where
    F: Fn(f64, &[f64]) -> f64,
{
    fn param_names(&self) -> Vec<String> {
        self.names.clone()
    }

    fn value(&self, x: f64, params: &[f64]) -> f64 {
        (self.f)(x, params)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FitSettings {
    pub max_iterations: usize,
    /// Relative parameter-step tolerance.
    pub xtol: f64,
    /// Relative reduction in the sum of squares below which an accepted step
    /// counts as converged.
    pub ftol: f64,
    pub initial_damping: f64,
    /// Two-sided coverage of the reported intervals, in (0, 1).
    pub confidence_level: f64,
}

impl Default for FitSettings {
    fn default() -> Self {
        Self {
            max_iterations: 200,
            xtol: 1e-8,
            ftol: 1e-14,
            initial_damping: 1e-3,
            confidence_level: 0.95,
        }
    }
}

impl FitSettings {
    pub fn validate(&self) -> Result<()> {
        if self.max_iterations == 0 {
            return Err(Error::invalid("max_iterations must be greater than zero"));
        }
        if !(self.xtol.is_finite() && self.xtol > 0.0) {
            return Err(Error::invalid("xtol must be positive"));
        }
        if !(self.ftol.is_finite() && self.ftol >= 0.0) {
            return Err(Error::invalid("ftol must be non-negative"));
        }
        if !(self.initial_damping.is_finite() && self.initial_damping > 0.0) {
            return Err(Error::invalid("initial_damping must be positive"));
        }
        validate_confidence(self.confidence_level)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterEstimate {
    pub name: String,
    pub value: f64,
    pub std_error: f64,
    pub lower: f64,
    pub upper: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitResult {
    /// Estimates in model parameter order.
    pub parameters: Vec<ParameterEstimate>,
    /// Row-major covariance of the estimates.
    pub covariance: Vec<Vec<f64>>,
    pub residuals: Vec<f64>,
    pub sum_squared_residuals: f64,
    pub residual_variance: f64,
    pub rmse: f64,
    /// `None` when the observations have no spread.
    pub r_squared: Option<f64>,
    pub degrees_of_freedom: usize,
    pub iterations: usize,
    pub confidence_level: f64,
}

impl FitResult {
    pub fn estimate(&self, name: &str) -> Option<&ParameterEstimate> {
        self.parameters.iter().find(|p| p.name == name)
    }

    pub fn values(&self) -> ParameterSet {
        self.parameters
            .iter()
            .map(|p| (p.name.clone(), p.value))
            .collect()
    }
}

/// Fits `model` to `(x_data, y_data)` starting from `initial_params`, which
/// must name every model parameter and nothing else.
pub fn fit<M>(
    model: &M,
    x_data: &[f64],
    y_data: &[f64],
    initial_params: &ParameterSet,
    settings: &FitSettings,
) -> Result<FitResult>
where
    M: CurveModel + ?Sized,
{
    settings.validate()?;
    let names = model.param_names();
    let mut params = ordered_initial_params(&names, initial_params)?;
    validate_data(x_data, y_data)?;

    let n = x_data.len();
    let p = names.len();
    if n <= p {
        return Err(Error::InsufficientData {
            observations: n,
            parameters: p,
        });
    }
    let dof = n - p;

    let mut residuals = compute_residuals(model, x_data, y_data, &params);
    if let Some(i) = residuals.iter().position(|r| !r.is_finite()) {
        return Err(Error::invalid(format!(
            "model is not finite at the initial parameters (x = {})",
            x_data[i]
        )));
    }
    let mut cost = residuals.norm_squared();
    let mut lambda = settings.initial_damping;
    let mut scale = vec![0.0_f64; p];
    let mut iterations = 0usize;
    let mut converged = cost == 0.0;

    while !converged {
        if iterations >= settings.max_iterations {
            return Err(Error::ConvergenceFailure(format!(
                "no convergence after {} iterations (sum of squares {:e})",
                settings.max_iterations, cost
            )));
        }
        iterations += 1;

        let jacobian = compute_jacobian(model, x_data, &params);
        let jtj = jacobian.transpose() * &jacobian;
        let gradient = jacobian.transpose() * &residuals;

        // Marquardt scaling uses the largest diagonal seen so far.
        for j in 0..p {
            scale[j] = scale[j].max(jtj[(j, j)]);
            if scale[j] == 0.0 || !scale[j].is_finite() {
                return Err(Error::ConvergenceFailure(format!(
                    "Jacobian is singular: parameter '{}' has no effect on the model",
                    names[j]
                )));
            }
        }

        loop {
            let mut damped = jtj.clone();
            for j in 0..p {
                damped[(j, j)] += lambda * scale[j];
            }
            let step = damped
                .clone()
                .cholesky()
                .map(|c| c.solve(&gradient))
                .or_else(|| damped.lu().solve(&gradient));

            if let Some(step) = step.filter(|s| s.iter().all(|v| v.is_finite())) {
                let trial = &params + &step;
                let trial_residuals = compute_residuals(model, x_data, y_data, &trial);
                let trial_cost = trial_residuals.norm_squared();

                if trial_cost.is_finite() && trial_cost <= cost {
                    let small_step = step.norm() <= settings.xtol * (params.norm() + settings.xtol);
                    let small_gain = cost - trial_cost <= settings.ftol * cost;
                    params = trial;
                    residuals = trial_residuals;
                    cost = trial_cost;
                    lambda = (lambda / 10.0).max(1e-12);
                    converged = small_step || small_gain || cost == 0.0;
                    debug!("lm iteration {iterations}: cost {cost:e}, lambda {lambda:e}");
                    break;
                }
            }

            lambda *= 10.0;
            if lambda > 1e16 {
                return Err(Error::ConvergenceFailure(format!(
                    "damping grew without an improving step after {} iterations \
                     (sum of squares {:e}); the Jacobian is likely singular",
                    iterations, cost
                )));
            }
        }
    }

    summarize(
        model,
        &names,
        x_data,
        y_data,
        &params,
        residuals,
        dof,
        iterations,
        settings.confidence_level,
    )
}

fn ordered_initial_params(names: &[String], initial: &ParameterSet) -> Result<DVector<f64>> {
    if names.is_empty() {
        return Err(Error::invalid("model has no parameters"));
    }
    if let Some(extra) = initial.names().find(|k| !names.iter().any(|n| n == k)) {
        return Err(Error::invalid(format!(
            "unknown parameter '{extra}' in initial guesses"
        )));
    }
    let mut values = Vec::with_capacity(names.len());
    for name in names {
        let value = initial
            .get(name)
            .ok_or_else(|| Error::invalid(format!("missing initial guess for '{name}'")))?;
        if !value.is_finite() {
            return Err(Error::invalid(format!(
                "initial guess for '{name}' is not finite"
            )));
        }
        values.push(value);
    }
    Ok(DVector::from_vec(values))
}

fn validate_data(x_data: &[f64], y_data: &[f64]) -> Result<()> {
    if x_data.len() != y_data.len() {
        return Err(Error::invalid(format!(
            "x and y lengths differ: {} vs {}",
            x_data.len(),
            y_data.len()
        )));
    }
    if x_data.is_empty() {
        return Err(Error::invalid("no observations"));
    }
    if x_data.iter().chain(y_data).any(|v| !v.is_finite()) {
        return Err(Error::invalid("observations must be finite"));
    }
    Ok(())
}

pub(crate) fn validate_confidence(level: f64) -> Result<()> {
    if !(level > 0.0 && level < 1.0) {
        return Err(Error::invalid(format!(
            "confidence level must lie in (0, 1), got {level}"
        )));
    }
    Ok(())
}

/// Two-sided Student-t critical value for `dof` degrees of freedom.
pub(crate) fn t_critical(confidence_level: f64, dof: usize) -> Result<f64> {
    let dist = StudentsT::new(0.0, 1.0, dof as f64)
        .map_err(|e| Error::invalid(format!("t-distribution with {dof} degrees of freedom: {e}")))?;
    Ok(dist.inverse_cdf(0.5 + 0.5 * confidence_level))
}

fn compute_residuals<M>(model: &M, x_data: &[f64], y_data: &[f64], params: &DVector<f64>) -> DVector<f64>
where
    M: CurveModel + ?Sized,
{
    let p = params.as_slice();
    DVector::from_iterator(
        x_data.len(),
        x_data.iter().zip(y_data).map(|(&x, &y)| y - model.value(x, p)),
    )
}

/// `J[i][j] = ∂f(x_i)/∂p_j`. Residuals are `y - f`, so the normal equations
/// use `+Jᵀr` on the right-hand side.
fn compute_jacobian<M>(model: &M, x_data: &[f64], params: &DVector<f64>) -> DMatrix<f64>
where
    M: CurveModel + ?Sized,
{
    let p = params.len();
    let mut jacobian = DMatrix::zeros(x_data.len(), p);
    let mut row = vec![0.0; p];
    for (i, &x) in x_data.iter().enumerate() {
        model.gradient(x, params.as_slice(), &mut row);
        for j in 0..p {
            jacobian[(i, j)] = row[j];
        }
    }
    jacobian
}

/// Singular values of the column-normalized Jacobian below this fraction of
/// the largest mean the parameters cannot be separated. Finite-difference
/// gradients carry relative noise near `eps^(2/3)`.
const RANK_TOLERANCE: f64 = 1.5e-8;

/// Rejects Jacobians whose columns are (numerically) linearly dependent.
fn check_identifiable(jacobian: &DMatrix<f64>, names: &[String]) -> Result<()> {
    let mut normalized = jacobian.clone();
    for (j, name) in names.iter().enumerate() {
        let norm = jacobian.column(j).norm();
        if !(norm > 0.0 && norm.is_finite()) {
            warn!("parameter '{name}' has no effect on the model at the solution");
            return Err(Error::ConvergenceFailure(format!(
                "Jacobian is singular: parameter '{name}' has no effect on the model"
            )));
        }
        normalized.column_mut(j).scale_mut(1.0 / norm);
    }
    let singular = normalized.singular_values();
    let (largest, smallest) = (singular.max(), singular.min());
    if !(smallest > RANK_TOLERANCE * largest) {
        warn!("rank-deficient Jacobian at the solution: singular values {smallest:e} / {largest:e}");
        return Err(Error::ConvergenceFailure(format!(
            "Jacobian is rank deficient at the solution (singular value ratio {:e}); \
             the parameters {:?} are not separately identifiable",
            smallest / largest,
            names
        )));
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn summarize<M>(
    model: &M,
    names: &[String],
    x_data: &[f64],
    y_data: &[f64],
    params: &DVector<f64>,
    residuals: DVector<f64>,
    dof: usize,
    iterations: usize,
    confidence_level: f64,
) -> Result<FitResult>
where
    M: CurveModel + ?Sized,
{
    let n = x_data.len();
    let jacobian = compute_jacobian(model, x_data, params);
    check_identifiable(&jacobian, names)?;
    let jtj = jacobian.transpose() * &jacobian;
    let inverse = jtj.cholesky().map(|c| c.inverse()).ok_or_else(|| {
        warn!("JᵀJ is not positive definite at the solution; no covariance");
        Error::ConvergenceFailure("Jacobian is singular at the solution".into())
    })?;
    let degenerate = (0..names.len()).find(|&j| {
        let d = inverse[(j, j)];
        !(d > 0.0 && d.is_finite())
    });
    if let Some(j) = degenerate {
        warn!("degenerate covariance for '{}': {:e}", names[j], inverse[(j, j)]);
        return Err(Error::ConvergenceFailure(format!(
            "covariance of '{}' is degenerate at the solution",
            names[j]
        )));
    }

    let ssr = residuals.norm_squared();
    let variance = ssr / dof as f64;
    let covariance = inverse * variance;
    let t = t_critical(confidence_level, dof)?;

    let parameters = names
        .iter()
        .enumerate()
        .map(|(j, name)| {
            let std_error = covariance[(j, j)].sqrt();
            ParameterEstimate {
                name: name.clone(),
                value: params[j],
                std_error,
                lower: params[j] - t * std_error,
                upper: params[j] + t * std_error,
            }
        })
        .collect();

    let mean = y_data.iter().sum::<f64>() / n as f64;
    let total: f64 = y_data.iter().map(|y| (y - mean).powi(2)).sum();
    let r_squared = (total > 0.0).then(|| 1.0 - ssr / total);

    debug!("fit converged in {iterations} iterations, ssr {ssr:e}, dof {dof}");

    Ok(FitResult {
        parameters,
        covariance: (0..names.len())
            .map(|i| covariance.row(i).iter().copied().collect())
            .collect(),
        residuals: residuals.iter().copied().collect(),
        sum_squared_residuals: ssr,
        residual_variance: variance,
        rmse: (ssr / n as f64).sqrt(),
        r_squared,
        degrees_of_freedom: dof,
        iterations,
        confidence_level,
    })
}

#[cfg(test)]
mod tests {
    use super::{fit, CurveModel, FitSettings, FnCurve, ParameterSet};
    use crate::error::Error;

    fn line() -> FnCurve<impl Fn(f64, &[f64]) -> f64> {
        FnCurve::new(["intercept", "slope"], |x, p: &[f64]| p[0] + p[1] * x)
    }

    fn exponential() -> FnCurve<impl Fn(f64, &[f64]) -> f64> {
        FnCurve::new(["amplitude", "rate"], |x, p: &[f64]| p[0] * (-p[1] * x).exp())
    }

    #[test]
    fn finite_difference_gradient_matches_analytic() {
        let model = exponential();
        let mut grad = [0.0; 2];
        model.gradient(2.0, &[3.0, 0.4], &mut grad);
        let e = (-0.8_f64).exp();
        assert!((grad[0] - e).abs() < 1e-8, "got {}", grad[0]);
        assert!((grad[1] + 6.0 * e).abs() < 1e-7, "got {}", grad[1]);
    }

    #[test]
    fn linear_model_recovered_with_textbook_intervals() {
        let x = [0.0, 1.0, 2.0, 3.0, 4.0];
        let y = [1.1, 2.9, 5.2, 6.8, 9.1];
        let initial = ParameterSet::new().with("intercept", 0.0).with("slope", 1.0);
        let result = fit(&line(), &x, &y, &initial, &FitSettings::default()).expect("fit");

        // Closed-form OLS for comparison.
        let slope = 1.99;
        let intercept = 5.02 - slope * 2.0;
        let b = result.estimate("slope").expect("slope");
        let a = result.estimate("intercept").expect("intercept");
        assert!((b.value - slope).abs() < 1e-8, "slope {}", b.value);
        assert!((a.value - intercept).abs() < 1e-8, "intercept {}", a.value);

        // se(slope) = sqrt(s² / Sxx), Sxx = 10
        let ssr: f64 = x
            .iter()
            .zip(&y)
            .map(|(xi, yi)| (yi - intercept - slope * xi).powi(2))
            .sum();
        let se = (ssr / 3.0 / 10.0).sqrt();
        assert!((b.std_error - se).abs() < 1e-8, "se {}", b.std_error);
        // t(0.975, 3) = 3.182446...
        assert!((b.upper - b.value - 3.182446305 * se).abs() < 1e-6);
        assert!((b.value - b.lower - 3.182446305 * se).abs() < 1e-6);
        assert_eq!(result.degrees_of_freedom, 3);
        assert!(result.r_squared.expect("spread") > 0.99);
    }

    #[test]
    fn exponential_decay_recovered_from_poor_guess() {
        let x: Vec<f64> = (0..12).map(|i| i as f64 * 0.5).collect();
        let y: Vec<f64> = x.iter().map(|t| 4.0 * (-0.6 * t).exp()).collect();
        let initial = ParameterSet::new().with("amplitude", 1.0).with("rate", 2.0);
        let result = fit(&exponential(), &x, &y, &initial, &FitSettings::default()).expect("fit");
        let values = result.values();
        assert!((values.get("amplitude").unwrap() - 4.0).abs() < 1e-6);
        assert!((values.get("rate").unwrap() - 0.6).abs() < 1e-6);
    }

    #[test]
    fn too_few_points_is_insufficient_data() {
        let initial = ParameterSet::new().with("intercept", 0.0).with("slope", 1.0);
        let err = fit(&line(), &[1.0], &[2.0], &initial, &FitSettings::default())
            .expect_err("one point, two parameters");
        assert_eq!(
            err,
            Error::InsufficientData {
                observations: 1,
                parameters: 2
            }
        );
        let err = fit(&line(), &[1.0, 2.0], &[2.0, 3.0], &initial, &FitSettings::default())
            .expect_err("zero degrees of freedom");
        assert!(matches!(err, Error::InsufficientData { .. }));
    }

    #[test]
    fn malformed_inputs_are_rejected() {
        let initial = ParameterSet::new().with("intercept", 0.0).with("slope", 1.0);
        let settings = FitSettings::default();
        let err = fit(&line(), &[1.0, 2.0, 3.0], &[1.0, 2.0], &initial, &settings)
            .expect_err("length mismatch");
        assert!(matches!(err, Error::InvalidInput(_)));

        let missing = ParameterSet::new().with("slope", 1.0);
        let err = fit(&line(), &[1.0, 2.0, 3.0], &[1.0, 2.0, 3.0], &missing, &settings)
            .expect_err("missing guess");
        assert!(err.to_string().contains("intercept"), "got {err}");

        let extra = initial.clone().with("curvature", 0.0);
        let err = fit(&line(), &[1.0, 2.0, 3.0], &[1.0, 2.0, 3.0], &extra, &settings)
            .expect_err("extra guess");
        assert!(err.to_string().contains("curvature"), "got {err}");

        let bad_level = FitSettings {
            confidence_level: 1.0,
            ..settings
        };
        assert!(fit(&line(), &[1.0, 2.0, 3.0], &[1.0, 2.0, 3.0], &initial, &bad_level).is_err());
    }

    #[test]
    fn parameter_without_effect_is_singular() {
        let model = FnCurve::new(["a", "unused"], |x, p: &[f64]| p[0] * x);
        let initial = ParameterSet::new().with("a", 1.0).with("unused", 3.0);
        let err = fit(&model, &[1.0, 2.0, 3.0], &[2.0, 4.1, 5.9], &initial, &FitSettings::default())
            .expect_err("singular Jacobian");
        assert!(matches!(err, Error::ConvergenceFailure(_)), "got {err:?}");
    }

    #[test]
    fn collinear_parameters_are_not_identifiable() {
        // Only the product a * b is determined by the data.
        let model = FnCurve::new(["a", "b"], |x, p: &[f64]| p[0] * p[1] * x);
        let initial = ParameterSet::new().with("a", 1.0).with("b", 1.0);
        let err = fit(
            &model,
            &[1.0, 2.0, 3.0, 4.0],
            &[2.1, 3.9, 6.2, 7.8],
            &initial,
            &FitSettings::default(),
        )
        .expect_err("rank-deficient Jacobian");
        assert!(matches!(err, Error::ConvergenceFailure(_)), "got {err:?}");
    }

    #[test]
    fn well_posed_fit_has_positive_standard_errors() {
        let model = FnCurve::new(["a", "b"], |x, p: &[f64]| p[0] * x + p[1] * x * x);
        let initial = ParameterSet::new().with("a", 1.0).with("b", 0.0);
        let result = fit(
            &model,
            &[1.0, 2.0, 3.0, 4.0, 5.0],
            &[1.1, 4.2, 8.8, 16.3, 24.9],
            &initial,
            &FitSettings::default(),
        )
        .expect("fit");
        for p in &result.parameters {
            assert!(p.std_error > 0.0 && p.std_error.is_finite(), "{p:?}");
            assert!(p.lower < p.value && p.value < p.upper, "{p:?}");
        }
    }

    #[test]
    fn iteration_budget_is_enforced() {
        let x: Vec<f64> = (0..12).map(|i| i as f64 * 0.5).collect();
        let y: Vec<f64> = x.iter().map(|t| 4.0 * (-0.6 * t).exp()).collect();
        let initial = ParameterSet::new().with("amplitude", 1.0).with("rate", 2.0);
        let settings = FitSettings {
            max_iterations: 1,
            ..FitSettings::default()
        };
        let err = fit(&exponential(), &x, &y, &initial, &settings).expect_err("budget");
        assert!(matches!(err, Error::ConvergenceFailure(_)), "got {err:?}");
    }
}
