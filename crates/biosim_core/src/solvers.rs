use crate::traits::{DynamicalSystem, Scalar, Steppable};

/// Classic Runge-Kutta 4th Order Solver
pub struct RK4<T: Scalar> {
    k1: Vec<T>,
    k2: Vec<T>,
    k3: Vec<T>,
    k4: Vec<T>,
    tmp: Vec<T>,
}

impl<T: Scalar> RK4<T> {
    pub fn new(dim: usize) -> Self {
        let z = T::zero();
        Self {
            k1: vec![z; dim],
            k2: vec![z; dim],
            k3: vec![z; dim],
            k4: vec![z; dim],
            tmp: vec![z; dim],
        }
    }
}

impl<T: Scalar> Steppable<T> for RK4<T> {
    fn step(&mut self, system: &impl DynamicalSystem<T>, t: &mut T, state: &mut [T], dt: T) {
        let half = T::lit(0.5);
        let sixth = T::lit(1.0 / 6.0);
        let two = T::lit(2.0);

        let t0 = *t;

        // k1 = f(t, y)
        system.apply(t0, state, &mut self.k1);

        // k2 = f(t + dt/2, y + dt*k1/2)
        for i in 0..state.len() {
            self.tmp[i] = state[i] + dt * self.k1[i] * half;
        }
        system.apply(t0 + dt * half, &self.tmp, &mut self.k2);

        // k3 = f(t + dt/2, y + dt*k2/2)
        for i in 0..state.len() {
            self.tmp[i] = state[i] + dt * self.k2[i] * half;
        }
        system.apply(t0 + dt * half, &self.tmp, &mut self.k3);

        // k4 = f(t + dt, y + dt*k3)
        for i in 0..state.len() {
            self.tmp[i] = state[i] + dt * self.k3[i];
        }
        system.apply(t0 + dt, &self.tmp, &mut self.k4);

        // y_next = y + dt/6 * (k1 + 2k2 + 2k3 + k4)
        for i in 0..state.len() {
            state[i] = state[i]
                + dt * sixth * (self.k1[i] + two * self.k2[i] + two * self.k3[i] + self.k4[i]);
        }

        *t = t0 + dt;
    }
}

/// Tsitouras 5(4) Butcher tableau.
mod tableau {
    pub const C2: f64 = 0.161;
    pub const C3: f64 = 0.327;
    pub const C4: f64 = 0.9;
    pub const C5: f64 = 0.9800255409045097;

    pub const A21: f64 = 0.161;

    pub const A31: f64 = -0.008480655492356989;
    pub const A32: f64 = 0.335480655492357;

    pub const A41: f64 = 2.897153057105493;
    pub const A42: f64 = -6.359448489975075;
    pub const A43: f64 = 4.3622954328695815;

    pub const A51: f64 = 5.325864828439257;
    pub const A52: f64 = -11.748883564062828;
    pub const A53: f64 = 7.4955393428898365;
    pub const A54: f64 = -0.09249506636175525;

    pub const A61: f64 = 5.86145544294642;
    pub const A62: f64 = -12.92096931784711;
    pub const A63: f64 = 8.159367898576159;
    pub const A64: f64 = -0.071584973281401;
    pub const A65: f64 = -0.028269050394068383;

    // 5th order weights; the seventh stage is evaluated at the new point (FSAL).
    pub const B1: f64 = 0.09646076681806523;
    pub const B2: f64 = 0.01;
    pub const B3: f64 = 0.4798896504144996;
    pub const B4: f64 = 1.379008574103742;
    pub const B5: f64 = -3.290069515436081;
    pub const B6: f64 = 2.324710524099774;

    // Difference between the 5th and embedded 4th order weights.
    pub const E1: f64 = -0.00178001105222577714;
    pub const E2: f64 = -0.0008164344596567469;
    pub const E3: f64 = 0.007880878010261995;
    pub const E4: f64 = -0.1447110071732629;
    pub const E5: f64 = 0.5823571654525552;
    pub const E6: f64 = -0.45808210592918697;
    pub const E7: f64 = 1.0 / 66.0;
}

/// Tsitouras 5/4 Solver
///
/// Used directly as a fixed-step [`Steppable`], or through [`Tsit5::attempt`] /
/// [`Tsit5::accept`] by the adaptive driver in [`crate::integrate`].
pub struct Tsit5<T: Scalar> {
    k1: Vec<T>,
    k2: Vec<T>,
    k3: Vec<T>,
    k4: Vec<T>,
    k5: Vec<T>,
    k6: Vec<T>,
    k7: Vec<T>,
    tmp: Vec<T>,
    proposed: Vec<T>,
    // k1 already holds f(t, state) from the previous accepted step.
    fsal: bool,
}

impl<T: Scalar> Tsit5<T> {
    pub fn new(dim: usize) -> Self {
        let z = T::zero();
        Self {
            k1: vec![z; dim],
            k2: vec![z; dim],
            k3: vec![z; dim],
            k4: vec![z; dim],
            k5: vec![z; dim],
            k6: vec![z; dim],
            k7: vec![z; dim],
            tmp: vec![z; dim],
            proposed: vec![z; dim],
            fsal: false,
        }
    }

    /// Forgets the cached first stage; call after modifying the state externally.
    pub fn reset(&mut self) {
        self.fsal = false;
    }

    /// Derivative at the start of the next step (valid once a step was accepted).
    pub fn first_stage(&self) -> Option<&[T]> {
        self.fsal.then_some(self.k1.as_slice())
    }

    /// Computes a trial step of size `dt` without committing it.
    ///
    /// Returns the RMS norm of the embedded error estimate, weighted by
    /// `atol + rtol * max(|y|, |y_new|)` per component. A value `<= 1` means the
    /// step meets the tolerance.
    pub fn attempt(
        &mut self,
        system: &impl DynamicalSystem<T>,
        t: T,
        state: &[T],
        dt: T,
        rtol: T,
        atol: T,
    ) -> T {
        use tableau::*;

        let n = state.len();
        if !self.fsal {
            system.apply(t, state, &mut self.k1);
        }

        // k2
        for i in 0..n {
            self.tmp[i] = state[i] + dt * (T::lit(A21) * self.k1[i]);
        }
        system.apply(t + T::lit(C2) * dt, &self.tmp, &mut self.k2);

        // k3
        for i in 0..n {
            self.tmp[i] = state[i] + dt * (T::lit(A31) * self.k1[i] + T::lit(A32) * self.k2[i]);
        }
        system.apply(t + T::lit(C3) * dt, &self.tmp, &mut self.k3);

        // k4
        for i in 0..n {
            self.tmp[i] = state[i]
                + dt * (T::lit(A41) * self.k1[i]
                    + T::lit(A42) * self.k2[i]
                    + T::lit(A43) * self.k3[i]);
        }
        system.apply(t + T::lit(C4) * dt, &self.tmp, &mut self.k4);

        // k5
        for i in 0..n {
            self.tmp[i] = state[i]
                + dt * (T::lit(A51) * self.k1[i]
                    + T::lit(A52) * self.k2[i]
                    + T::lit(A53) * self.k3[i]
                    + T::lit(A54) * self.k4[i]);
        }
        system.apply(t + T::lit(C5) * dt, &self.tmp, &mut self.k5);

        // k6
        for i in 0..n {
            self.tmp[i] = state[i]
                + dt * (T::lit(A61) * self.k1[i]
                    + T::lit(A62) * self.k2[i]
                    + T::lit(A63) * self.k3[i]
                    + T::lit(A64) * self.k4[i]
                    + T::lit(A65) * self.k5[i]);
        }
        system.apply(t + dt, &self.tmp, &mut self.k6);

        // 5th order proposal
        for i in 0..n {
            self.proposed[i] = state[i]
                + dt * (T::lit(B1) * self.k1[i]
                    + T::lit(B2) * self.k2[i]
                    + T::lit(B3) * self.k3[i]
                    + T::lit(B4) * self.k4[i]
                    + T::lit(B5) * self.k5[i]
                    + T::lit(B6) * self.k6[i]);
        }

        // k7 = f(t + dt, y_new), reused as k1 if the step is accepted
        system.apply(t + dt, &self.proposed, &mut self.k7);

        let mut sum = T::zero();
        for i in 0..n {
            let err = dt
                * (T::lit(E1) * self.k1[i]
                    + T::lit(E2) * self.k2[i]
                    + T::lit(E3) * self.k3[i]
                    + T::lit(E4) * self.k4[i]
                    + T::lit(E5) * self.k5[i]
                    + T::lit(E6) * self.k6[i]
                    + T::lit(E7) * self.k7[i]);
            // An exact component (zero error) contributes nothing, even when
            // its scale is zero under a purely relative tolerance.
            if err != T::zero() {
                let scale = atol + rtol * state[i].abs().max(self.proposed[i].abs());
                let ratio = err / scale;
                sum = sum + ratio * ratio;
            }
        }
        if n == 0 {
            return T::zero();
        }
        (sum / T::lit(n as f64)).sqrt()
    }

    /// The solution proposed by the last [`Tsit5::attempt`].
    pub fn proposed(&self) -> &[T] {
        &self.proposed
    }

    /// Commits the last attempted step.
    pub fn accept(&mut self, t: &mut T, state: &mut [T], dt: T) {
        state.copy_from_slice(&self.proposed);
        std::mem::swap(&mut self.k1, &mut self.k7);
        self.fsal = true;
        *t = *t + dt;
    }
}

impl<T: Scalar> Steppable<T> for Tsit5<T> {
    fn step(&mut self, system: &impl DynamicalSystem<T>, t: &mut T, state: &mut [T], dt: T) {
        // Tolerances only affect the returned error norm, which a fixed step ignores.
        self.attempt(system, *t, state, dt, T::one(), T::one());
        self.accept(t, state, dt);
    }
}
