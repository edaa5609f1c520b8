use num_traits::{Float, FromPrimitive};
use std::fmt::Debug;

/// A trait for types that can be used as scalars in our dynamical systems.
/// Must support basic arithmetic, debug printing, and conversion from f64.
pub trait Scalar: Float + FromPrimitive + Debug + 'static {
    /// Lifts a literal constant into the scalar type.
    fn lit(value: f64) -> Self {
        Self::from_f64(value).unwrap_or_else(Self::nan)
    }
}

impl<T: Float + FromPrimitive + Debug + 'static> Scalar for T {}

/// A system of first-order ordinary differential equations.
///
/// Parameters belong to the implementing type, so two systems never share
/// mutable state.
pub trait DynamicalSystem<T: Scalar> {
    /// Returns the dimension of the state space.
    fn dimension(&self) -> usize;

    /// Evaluates the vector field.
    /// t: current time
    /// x: current state
    /// out: buffer to write dx/dt into
    fn apply(&self, t: T, x: &[T], out: &mut [T]);
}

/// A trait for solvers that can step a system forward.
pub trait Steppable<T: Scalar> {
    /// Performs one step of size dt.
    /// t: current time (updated after step)
    /// state: current state (updated after step)
    /// dt: step size
    fn step(&mut self, system: &impl DynamicalSystem<T>, t: &mut T, state: &mut [T], dt: T);
}

/// Adapts a closure `(t, x, out)` into a [`DynamicalSystem`].
pub struct FnSystem<F> {
    dim: usize,
    rhs: F,
}

impl<F> FnSystem<F>
where
    F: Fn(f64, &[f64], &mut [f64]),
{
    pub fn new(dim: usize, rhs: F) -> Self {
        Self { dim, rhs }
    }
}

impl<F> DynamicalSystem<f64> for FnSystem<F>
where
    F: Fn(f64, &[f64], &mut [f64]),
{
    fn dimension(&self) -> usize {
        self.dim
    }

    fn apply(&self, t: f64, x: &[f64], out: &mut [f64]) {
        (self.rhs)(t, x, out)
    }
}
