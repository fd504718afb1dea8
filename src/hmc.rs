//! A Hamiltonian (Hybrid) Monte Carlo chain over an [`Objective`].
//!
//! The potential energy is the negative log density of the objective value,
//! momenta are drawn per parameter with variance equal to that parameter's
//! mass. Trajectories are integrated with the leapfrog scheme and accepted with
//! probability `min(1, exp(H_current - H_proposed))`. Gradients are taken by
//! central finite differences, so any objective can be sampled.

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;

use crate::core::MarkovChain;
use crate::error::{FitError, Result};
use crate::metropolis::acceptance_probability;
use crate::objective::{Objective, SignConvention};

/// Relative step of the finite-difference gradient.
const FD_REL_STEP: f64 = 1e-5;

#[derive(Debug, Clone)]
pub struct HamiltonianChain<O> {
    pub objective: O,
    /// The step size for the leapfrog integrator.
    pub step_size: f64,
    /// The number of leapfrog steps to take per update.
    pub n_leapfrog: usize,
    masses: Vec<f64>,
    convention: SignConvention,
    bounds: Option<(Vec<f64>, Vec<f64>)>,
    current_state: Vec<f64>,
    current_value: f64,
    current_log_density: f64,
    last_accepted: bool,
    pub seed: u64,
    rng: SmallRng,
}

impl<O: Objective> HamiltonianChain<O> {
    /// Creates a chain at `initial_state`.
    ///
    /// `masses` holds one positive mass per parameter. A larger mass makes the
    /// parameter move more slowly along a trajectory.
    pub fn new(
        objective: O,
        initial_state: &[f64],
        masses: Vec<f64>,
        step_size: f64,
        n_leapfrog: usize,
        seed: u64,
    ) -> Result<Self> {
        if masses.len() != initial_state.len() {
            return Err(FitError::DimensionMismatch(format!(
                "{} masses for {} parameters",
                masses.len(),
                initial_state.len()
            )));
        }
        if let Some(bad) = masses.iter().find(|m| !(m.is_finite() && **m > 0.0)) {
            return Err(FitError::Config(format!("masses must be positive, got {bad}")));
        }
        if !(step_size.is_finite() && step_size > 0.0) {
            return Err(FitError::Config(format!(
                "leapfrog step size must be positive, got {step_size}"
            )));
        }
        if n_leapfrog == 0 {
            return Err(FitError::Config("at least one leapfrog step is needed".into()));
        }
        let mut chain = Self {
            objective,
            step_size,
            n_leapfrog,
            masses,
            convention: SignConvention::NLLH,
            bounds: None,
            current_state: initial_state.to_vec(),
            current_value: f64::NAN,
            current_log_density: f64::NEG_INFINITY,
            last_accepted: false,
            seed,
            rng: SmallRng::seed_from_u64(seed),
        };
        chain.reset_current();
        Ok(chain)
    }

    pub fn with_convention(mut self, convention: SignConvention) -> Self {
        self.convention = convention;
        self.reset_current();
        self
    }

    /// Restricts the chain to the box `[minima, maxima]`. A trajectory that
    /// leaves the box is rejected.
    pub fn with_bounds(mut self, minima: Vec<f64>, maxima: Vec<f64>) -> Result<Self> {
        let dim = self.current_state.len();
        if minima.len() != dim || maxima.len() != dim {
            return Err(FitError::DimensionMismatch(format!(
                "bounds of length {} and {} for {dim} parameters",
                minima.len(),
                maxima.len()
            )));
        }
        self.bounds = Some((minima, maxima));
        self.reset_current();
        Ok(self)
    }

    pub fn set_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self.rng = SmallRng::seed_from_u64(seed);
        self
    }

    pub fn masses(&self) -> &[f64] {
        &self.masses
    }

    fn in_bounds(&self, x: &[f64]) -> bool {
        match &self.bounds {
            Some((lo, hi)) => x
                .iter()
                .zip(lo.iter().zip(hi))
                .all(|(v, (l, h))| v >= l && v <= h),
            None => true,
        }
    }

    /// Objective value and potential energy at `x`.
    fn potential(&self, x: &[f64]) -> (f64, f64) {
        if !self.in_bounds(x) {
            return (f64::NAN, f64::INFINITY);
        }
        let value = self.objective.evaluate(x);
        (value, -self.convention.log_density(value))
    }

    fn reset_current(&mut self) {
        let (value, u) = self.potential(&self.current_state);
        self.current_value = value;
        self.current_log_density = -u;
    }

    /// Gradient of the potential at `x`, where the potential is `u`.
    ///
    /// Central differences, falling back to a one-sided difference when one
    /// neighbour is impossible. `None` if neither side is usable.
    fn gradient(&self, x: &[f64], u: f64) -> Option<Vec<f64>> {
        let mut probe = x.to_vec();
        let mut grad = Vec::with_capacity(x.len());
        for i in 0..x.len() {
            let h = FD_REL_STEP * (1.0 + x[i].abs());
            probe[i] = x[i] + h;
            let (_, up) = self.potential(&probe);
            probe[i] = x[i] - h;
            let (_, down) = self.potential(&probe);
            probe[i] = x[i];
            let g = match (up.is_finite(), down.is_finite()) {
                (true, true) => (up - down) / (2.0 * h),
                (true, false) => (up - u) / h,
                (false, true) => (u - down) / h,
                (false, false) => return None,
            };
            grad.push(g);
        }
        Some(grad)
    }

    fn kinetic(&self, momentum: &[f64]) -> f64 {
        momentum
            .iter()
            .zip(&self.masses)
            .map(|(p, m)| 0.5 * p * p / m)
            .sum()
    }

    /// Runs the leapfrog integrator from the current state.
    ///
    /// Returns the end point, its momentum, objective value and potential, or
    /// `None` if the trajectory hit an impossible region.
    fn leapfrog(&self, mut momentum: Vec<f64>) -> Option<(Vec<f64>, Vec<f64>, f64, f64)> {
        let eps = self.step_size;
        let mut pos = self.current_state.clone();
        let mut u = -self.current_log_density;
        let mut value = self.current_value;
        let mut grad = self.gradient(&pos, u)?;

        for _ in 0..self.n_leapfrog {
            // Half-step in momentum, full step in position, second half-step.
            for (p, g) in momentum.iter_mut().zip(&grad) {
                *p -= 0.5 * eps * g;
            }
            for ((x, p), m) in pos.iter_mut().zip(&momentum).zip(&self.masses) {
                *x += eps * p / m;
            }
            (value, u) = self.potential(&pos);
            if !u.is_finite() {
                return None;
            }
            grad = self.gradient(&pos, u)?;
            for (p, g) in momentum.iter_mut().zip(&grad) {
                *p -= 0.5 * eps * g;
            }
        }
        Some((pos, momentum, value, u))
    }
}

impl<O: Objective> MarkovChain for HamiltonianChain<O> {
    fn step(&mut self) -> &[f64] {
        self.last_accepted = false;
        let momentum: Vec<f64> = self
            .masses
            .iter()
            .map(|m| {
                let z: f64 = self.rng.sample(StandardNormal);
                z * m.sqrt()
            })
            .collect();
        // One momentum vector and one uniform per step, diverging or not.
        let u: f64 = self.rng.gen();

        if self.current_log_density == f64::NEG_INFINITY {
            return &self.current_state;
        }
        let h_current = -self.current_log_density + self.kinetic(&momentum);

        if let Some((pos, mom, value, potential)) = self.leapfrog(momentum) {
            let h_proposed = potential + self.kinetic(&mom);
            let p = acceptance_probability(-h_current, -h_proposed);
            if u < p {
                self.current_state = pos;
                self.current_value = value;
                self.current_log_density = -potential;
                self.last_accepted = true;
            }
        }
        &self.current_state
    }

    fn current_state(&self) -> &[f64] {
        &self.current_state
    }

    fn current_value(&self) -> f64 {
        self.current_value
    }

    fn current_log_density(&self) -> f64 {
        self.current_log_density
    }

    fn last_accepted(&self) -> bool {
        self.last_accepted
    }
}
