pub mod autodiff;
pub mod config;
pub mod error;
pub mod fit;
pub mod integrate;
pub mod models;
pub mod solvers;
pub mod trajectory;
/// The `biosim_core` crate provides the numerical engine behind the biosim model scripts.
/// Everything here is a pure function of its inputs: nothing is cached between calls and
/// every result is computed in full before it is returned.
///
/// Key components:
/// - **Traits**: `Scalar` (numeric type abstraction), `DynamicalSystem` (ODE right-hand sides), `Steppable` (Solvers).
/// - **Solvers**: Runge-Kutta steppers (RK4, Tsit5 with an embedded error estimate).
/// - **Integrate**: adaptive integration onto a caller-supplied output grid.
/// - **Fit**: Levenberg-Marquardt least squares with t-based confidence intervals.
/// - **Autodiff**: Dual numbers used for exact model gradients and forward sensitivities.
/// - **Models**: pharmacokinetic, binding, epidemic and enzyme-kinetic model definitions.
pub mod traits;

pub use error::{Error, Result};
pub use fit::{fit, fit_proportional, CurveModel, FitResult, FitSettings, ParameterSet};
pub use integrate::{integrate, IntegratorSettings, Method};
pub use trajectory::Trajectory;
