/*!
Random-walk Metropolis-Hastings over an [`Objective`].

The chain works on the log density obtained from the objective value through a
[`SignConvention`]. Proposals come from a [`Proposal`], by default a
[`GaussianProposal`] with one width per parameter. Optional hard bounds reject
any proposal outside the box without evaluating the objective.

# Examples

```rust
use bbfit::core::run_chain;
use bbfit::metropolis::{GaussianProposal, MetropolisChain};
use bbfit::objective::Objective;

struct Parabola;

impl Objective for Parabola {
    fn parameter_names(&self) -> Vec<String> {
        vec!["x".into()]
    }
    fn evaluate(&self, x: &[f64]) -> f64 {
        0.5 * x[0] * x[0]
    }
}

let proposal = GaussianProposal::new(vec![0.5]).unwrap();
let mut chain = MetropolisChain::new(Parabola, proposal, &[0.0], 42)
    .with_bounds(vec![-3.0], vec![3.0])
    .unwrap();
let samples = run_chain(&mut chain, 100);
assert_eq!(samples.nrows(), 100);
assert!(samples.iter().all(|x| x.abs() <= 3.0));
```
*/

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;

use crate::core::MarkovChain;
use crate::error::{FitError, Result};
use crate::objective::{Objective, SignConvention};

/// Probability of moving from a state with `current` log density to one with
/// `proposed` log density.
///
/// Always in `[0, 1]`. Equal log densities give exactly one, a proposal with
/// `-inf` or NaN log density is never accepted, and any finite proposal
/// leaves an impossible current state.
pub fn acceptance_probability(current: f64, proposed: f64) -> f64 {
    if proposed.is_nan() || proposed == f64::NEG_INFINITY {
        return 0.0;
    }
    if current.is_nan() || current == f64::NEG_INFINITY {
        return 1.0;
    }
    let log_ratio = proposed - current;
    if log_ratio.is_nan() {
        0.0
    } else if log_ratio >= 0.0 {
        1.0
    } else {
        log_ratio.exp()
    }
}

/// A proposal kernel q(x' | x).
pub trait Proposal {
    /// Draws a candidate state given the current one.
    fn sample<R: Rng>(&self, current: &[f64], rng: &mut R) -> Vec<f64>;

    /// Evaluates ln q(to | from), up to a constant.
    fn log_prob(&self, from: &[f64], to: &[f64]) -> f64;
}

/// Independent Gaussian steps, one standard deviation per parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct GaussianProposal {
    sigmas: Vec<f64>,
}

impl GaussianProposal {
    pub fn new(sigmas: Vec<f64>) -> Result<Self> {
        if let Some(bad) = sigmas.iter().find(|s| !(s.is_finite() && **s > 0.0)) {
            return Err(FitError::Config(format!(
                "proposal widths must be positive and finite, got {bad}"
            )));
        }
        Ok(Self { sigmas })
    }

    pub fn sigmas(&self) -> &[f64] {
        &self.sigmas
    }
}

impl Proposal for GaussianProposal {
    fn sample<R: Rng>(&self, current: &[f64], rng: &mut R) -> Vec<f64> {
        current
            .iter()
            .zip(&self.sigmas)
            .map(|(&x, &s)| {
                let eps: f64 = rng.sample(StandardNormal);
                x + s * eps
            })
            .collect()
    }

    fn log_prob(&self, from: &[f64], to: &[f64]) -> f64 {
        from.iter()
            .zip(to)
            .zip(&self.sigmas)
            .map(|((&f, &t), &s)| {
                let d = (t - f) / s;
                -0.5 * d * d
            })
            .sum()
    }
}

/// A single Metropolis-Hastings chain.
#[derive(Debug, Clone)]
pub struct MetropolisChain<O, Q = GaussianProposal> {
    pub objective: O,
    pub proposal: Q,
    convention: SignConvention,
    bounds: Option<(Vec<f64>, Vec<f64>)>,
    current_state: Vec<f64>,
    current_value: f64,
    current_log_density: f64,
    last_accepted: bool,
    pub seed: u64,
    rng: SmallRng,
}

impl<O: Objective, Q: Proposal> MetropolisChain<O, Q> {
    /// Creates a chain at `initial_state`, evaluating the objective there.
    /// The objective is read as a negative log-likelihood until
    /// [`MetropolisChain::with_convention`] says otherwise.
    pub fn new(objective: O, proposal: Q, initial_state: &[f64], seed: u64) -> Self {
        let mut chain = Self {
            objective,
            proposal,
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
        chain
    }

    pub fn with_convention(mut self, convention: SignConvention) -> Self {
        self.convention = convention;
        self.reset_current();
        self
    }

    /// Restricts the chain to the box `[minima, maxima]`.
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

    fn in_bounds(&self, x: &[f64]) -> bool {
        match &self.bounds {
            Some((lo, hi)) => x
                .iter()
                .zip(lo.iter().zip(hi))
                .all(|(v, (l, h))| v >= l && v <= h),
            None => true,
        }
    }

    /// Objective value and log density at `x`. Points outside the bounds are
    /// not evaluated.
    fn assess(&self, x: &[f64]) -> (f64, f64) {
        if !self.in_bounds(x) {
            return (f64::NAN, f64::NEG_INFINITY);
        }
        let value = self.objective.evaluate(x);
        (value, self.convention.log_density(value))
    }

    fn reset_current(&mut self) {
        let (value, log_density) = self.assess(&self.current_state);
        self.current_value = value;
        self.current_log_density = log_density;
    }
}

impl<O: Objective, Q: Proposal> MarkovChain for MetropolisChain<O, Q> {
    fn step(&mut self) -> &[f64] {
        let proposed = self.proposal.sample(&self.current_state, &mut self.rng);
        let (value, log_density) = self.assess(&proposed);

        let log_q_forward = self.proposal.log_prob(&self.current_state, &proposed);
        let log_q_backward = self.proposal.log_prob(&proposed, &self.current_state);
        let p = acceptance_probability(
            self.current_log_density + log_q_forward,
            log_density + log_q_backward,
        );

        let u: f64 = self.rng.gen();
        self.last_accepted = u < p;
        if self.last_accepted {
            self.current_state = proposed;
            self.current_value = value;
            self.current_log_density = log_density;
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
