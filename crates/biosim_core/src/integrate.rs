//! Integration of an ODE system onto a caller-supplied grid of output times.
//!
//! The adaptive driver restarts at every requested output: steps are clipped
//! so that one lands exactly on each output time, and the state there is
//! recorded as-is, without interpolation.

use crate::error::{Error, Result};
use crate::solvers::{Tsit5, RK4};
use crate::trajectory::Trajectory;
use crate::traits::{DynamicalSystem, Steppable};
use log::{debug, trace};
use serde::{Deserialize, Serialize};

/// Stepping scheme used between output times.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Method {
    /// Tsitouras 5(4) with embedded error control.
    Tsit5,
    /// Classic RK4 with a fixed maximum step. Each output interval is split
    /// into equal sub-steps no longer than `step`.
    Rk4 { step: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct IntegratorSettings {
    pub method: Method,
    pub rtol: f64,
    pub atol: f64,
    /// Upper bound on attempted steps (accepted and rejected) over the whole run.
    pub max_steps: usize,
    /// First trial step; chosen automatically when absent.
    pub initial_step: Option<f64>,
    /// Smallest step the adaptive controller may take before giving up.
    pub min_step: f64,
}

impl Default for IntegratorSettings {
    fn default() -> Self {
        Self {
            method: Method::Tsit5,
            rtol: 1e-8,
            atol: 1e-10,
            max_steps: 100_000,
            initial_step: None,
            min_step: 1e-12,
        }
    }
}

impl IntegratorSettings {
    pub fn fixed_step(step: f64) -> Self {
        Self {
            method: Method::Rk4 { step },
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.rtol.is_finite() && self.rtol >= 0.0) {
            return Err(Error::invalid("rtol must be finite and non-negative"));
        }
        if !(self.atol.is_finite() && self.atol >= 0.0) {
            return Err(Error::invalid("atol must be finite and non-negative"));
        }
        if self.rtol == 0.0 && self.atol == 0.0 {
            return Err(Error::invalid("rtol and atol cannot both be zero"));
        }
        if self.max_steps == 0 {
            return Err(Error::invalid("max_steps must be greater than zero"));
        }
        if !(self.min_step.is_finite() && self.min_step > 0.0) {
            return Err(Error::invalid("min_step must be positive"));
        }
        if let Some(h) = self.initial_step {
            if !(h.is_finite() && h > 0.0) {
                return Err(Error::invalid("initial_step must be positive"));
            }
        }
        if let Method::Rk4 { step } = self.method {
            if !(step.is_finite() && step > 0.0) {
                return Err(Error::invalid("RK4 step must be positive"));
            }
        }
        Ok(())
    }
}

/// Integrates `system` from `initial_state` at `time_points[0]` and samples
/// the solution at every entry of `time_points`.
///
/// The first sample is `initial_state` itself. Parameters are part of
/// `system`; the call has no side effects and is deterministic.
pub fn integrate<S>(
    system: &S,
    initial_state: &[f64],
    time_points: &[f64],
    settings: &IntegratorSettings,
) -> Result<Trajectory>
where
    S: DynamicalSystem<f64> + ?Sized,
{
    let dim = system.dimension();
    if dim == 0 {
        return Err(Error::invalid("system has zero dimension"));
    }
    if initial_state.len() != dim {
        return Err(Error::invalid(format!(
            "initial state dimension mismatch: expected {}, got {}",
            dim,
            initial_state.len()
        )));
    }
    if initial_state.iter().any(|v| !v.is_finite()) {
        return Err(Error::invalid("initial state contains non-finite values"));
    }
    validate_time_points(time_points)?;
    settings.validate()?;

    let t0 = time_points[0];
    let mut f0 = vec![0.0; dim];
    system.apply(t0, initial_state, &mut f0);
    if f0.iter().any(|v| !v.is_finite()) {
        return Err(Error::unstable(
            t0,
            "derivative evaluated to a non-finite value at the initial state",
        ));
    }

    let mut states = Vec::with_capacity(time_points.len());
    states.push(initial_state.to_vec());

    match settings.method {
        Method::Tsit5 => {
            integrate_adaptive(system, initial_state, &f0, time_points, settings, &mut states)?
        }
        Method::Rk4 { step } => integrate_fixed(
            system,
            initial_state,
            time_points,
            step,
            settings.max_steps,
            &mut states,
        )?,
    }

    Trajectory::new(default_names(dim), time_points.to_vec(), states)
}

fn validate_time_points(time_points: &[f64]) -> Result<()> {
    if time_points.is_empty() {
        return Err(Error::invalid("time grid is empty"));
    }
    if time_points.iter().any(|t| !t.is_finite()) {
        return Err(Error::invalid("time grid contains non-finite values"));
    }
    if let Some(idx) = time_points.windows(2).position(|w| w[1] <= w[0]) {
        return Err(Error::invalid(format!(
            "time grid must be strictly increasing (t[{}] = {} is followed by {})",
            idx,
            time_points[idx],
            time_points[idx + 1]
        )));
    }
    Ok(())
}

fn default_names(dim: usize) -> Vec<String> {
    (0..dim).map(|i| format!("y{i}")).collect()
}

fn integrate_adaptive<S>(
    system: &S,
    initial_state: &[f64],
    f0: &[f64],
    time_points: &[f64],
    settings: &IntegratorSettings,
    states: &mut Vec<Vec<f64>>,
) -> Result<()>
where
    S: DynamicalSystem<f64> + ?Sized,
{
    const SAFETY: f64 = 0.9;
    const MIN_FACTOR: f64 = 0.2;
    const MAX_FACTOR: f64 = 5.0;

    let dim = initial_state.len();
    let t0 = time_points[0];
    let span = time_points[time_points.len() - 1] - t0;
    if span == 0.0 {
        return Ok(());
    }

    let system = SizedRef(system);
    let mut stepper = Tsit5::new(dim);
    let mut state = initial_state.to_vec();
    let mut t = t0;
    let mut h = settings
        .initial_step
        .unwrap_or_else(|| initial_step_size(&system, t0, &state, f0, settings.rtol, settings.atol))
        .min(span);

    let mut attempts = 0usize;
    let mut accepted = 0usize;

    for &target in &time_points[1..] {
        while t < target {
            let remaining = target - t;
            let (dt, lands) = if remaining <= h {
                (remaining, true)
            } else if remaining < 2.0 * h {
                // Split the remainder evenly instead of leaving a sliver.
                (0.5 * remaining, false)
            } else {
                (h, false)
            };

            if attempts >= settings.max_steps {
                return Err(Error::StepLimitExceeded {
                    max_steps: settings.max_steps,
                    t,
                });
            }
            attempts += 1;

            let err = stepper.attempt(&system, t, &state, dt, settings.rtol, settings.atol);
            let finite_state = stepper.proposed().iter().all(|v| v.is_finite());
            let finite = err.is_finite() && finite_state;

            if finite && err <= 1.0 {
                stepper.accept(&mut t, &mut state, dt);
                if lands {
                    t = target;
                }
                accepted += 1;
                let factor = if err == 0.0 {
                    MAX_FACTOR
                } else {
                    (SAFETY * err.powf(-0.2)).clamp(MIN_FACTOR, MAX_FACTOR)
                };
                // A step shortened to hit an output says nothing about how large
                // the next one may be.
                h = if dt < h { h.max(dt * factor) } else { dt * factor };
            } else {
                let factor = if finite {
                    (SAFETY * err.powf(-0.2)).clamp(MIN_FACTOR, 1.0)
                } else {
                    MIN_FACTOR
                };
                h = dt * factor;
                trace!("rejected step at t = {t}: dt = {dt}, error norm = {err}");

                let floor = settings.min_step.max(16.0 * f64::EPSILON * t.abs().max(1.0));
                if h < floor {
                    let message = if finite {
                        format!("step size {h:e} fell below the minimum {floor:e}")
                    } else if finite_state {
                        "error estimate is not finite".to_string()
                    } else {
                        "state became non-finite".to_string()
                    };
                    return Err(Error::unstable(t, message));
                }
            }
        }
        states.push(state.clone());
    }

    debug!(
        "tsit5: {} outputs over [{}, {}], {} accepted / {} rejected steps",
        time_points.len(),
        t0,
        t,
        accepted,
        attempts - accepted
    );
    Ok(())
}

/// Starting step from the local scale of the solution and its derivatives
/// (Hairer, Nørsett & Wanner, Solving ODEs I, II.4).
fn initial_step_size<S>(system: &S, t0: f64, y0: &[f64], f0: &[f64], rtol: f64, atol: f64) -> f64
where
    S: DynamicalSystem<f64> + ?Sized,
{
    let scale: Vec<f64> = y0.iter().map(|y| atol + rtol * y.abs()).collect();
    let rms = |values: &mut dyn Iterator<Item = f64>| -> f64 {
        let (sum, count) = values.fold((0.0, 0usize), |(s, c), v| (s + v * v, c + 1));
        (sum / count.max(1) as f64).sqrt()
    };

    // Zero over a zero scale (pure relative tolerance) counts as zero.
    let scaled = |v: f64, s: f64| if v == 0.0 { 0.0 } else { v / s };

    let d0 = rms(&mut y0.iter().zip(&scale).map(|(y, s)| scaled(*y, *s)));
    let d1 = rms(&mut f0.iter().zip(&scale).map(|(f, s)| scaled(*f, *s)));
    let h0 = if d0 < 1e-5 || d1 < 1e-5 || !(d0 * d1).is_finite() {
        1e-6
    } else {
        0.01 * d0 / d1
    };

    let y1: Vec<f64> = y0.iter().zip(f0).map(|(y, f)| y + h0 * f).collect();
    let mut f1 = vec![0.0; y0.len()];
    system.apply(t0 + h0, &y1, &mut f1);
    let d2 = rms(&mut f1.iter().zip(f0).zip(&scale).map(|((a, b), s)| scaled(a - b, *s))) / h0;

    let h1 = if d1.max(d2) <= 1e-15 || !d1.is_finite() || !d2.is_finite() {
        (h0 * 1e-3).max(1e-6)
    } else {
        (0.01 / d1.max(d2)).powf(0.2)
    };
    (100.0 * h0).min(h1)
}

fn integrate_fixed<S>(
    system: &S,
    initial_state: &[f64],
    time_points: &[f64],
    step: f64,
    max_steps: usize,
    states: &mut Vec<Vec<f64>>,
) -> Result<()>
where
    S: DynamicalSystem<f64> + ?Sized,
{
    let system = SizedRef(system);
    let mut stepper = RK4::new(initial_state.len());
    let mut state = initial_state.to_vec();
    let mut steps = 0usize;

    for window in time_points.windows(2) {
        let (start, target) = (window[0], window[1]);
        let substeps = ((target - start) / step).ceil().max(1.0) as usize;
        let dt = (target - start) / substeps as f64;
        let mut t = start;
        for _ in 0..substeps {
            if steps >= max_steps {
                return Err(Error::StepLimitExceeded { max_steps, t });
            }
            steps += 1;
            stepper.step(&system, &mut t, &mut state, dt);
            if state.iter().any(|v| !v.is_finite()) {
                return Err(Error::unstable(
                    t,
                    "state became non-finite during a fixed RK4 step",
                ));
            }
        }
        states.push(state.clone());
    }

    debug!(
        "rk4: {} outputs, {} fixed steps (max step {})",
        time_points.len(),
        steps,
        step
    );
    Ok(())
}

/// Lets unsized systems (`dyn DynamicalSystem`) through the `impl Trait` stepper API.
struct SizedRef<'a, S: ?Sized>(&'a S);

impl<S> DynamicalSystem<f64> for SizedRef<'_, S>
where
    S: DynamicalSystem<f64> + ?Sized,
{
    fn dimension(&self) -> usize {
        self.0.dimension()
    }

    fn apply(&self, t: f64, x: &[f64], out: &mut [f64]) {
        self.0.apply(t, x, out)
    }
}
