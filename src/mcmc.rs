/*!
The MCMC fit driver.

[`Mcmc`] owns the sampler configuration (bounds, step widths or masses,
iteration budget, burn-in, sign convention), runs one chain over an
[`Objective`] and summarises it into a [`FitResult`].

# Examples

```rust
use bbfit::mcmc::{Mcmc, SamplerKind};
use bbfit::objective::Objective;
use bbfit::params::ParameterDict;

struct Parabola;

impl Objective for Parabola {
    fn parameter_names(&self) -> Vec<String> {
        vec!["x".into()]
    }
    fn evaluate(&self, x: &[f64]) -> f64 {
        0.5 * (x[0] - 1.0).powi(2)
    }
}

let dict = |v: f64| ParameterDict::from([("x".to_string(), v)]);
let mut mcmc = Mcmc::new(SamplerKind::Metropolis)
    .set_minima(dict(-5.0))
    .set_maxima(dict(5.0))
    .set_sigmas(dict(0.8))
    .set_max_iter(2000)
    .set_burn_in(200)
    .set_seed(42);
let result = mcmc.optimise(&Parabola).unwrap();
assert!((result.get_best_fit()["x"] - 1.0).abs() < 0.3);
```
*/

use std::collections::BTreeMap;
use std::time::Instant;

use log::{debug, info};
use ndarray::Array2;
use rayon::prelude::*;

use crate::axis::{AxisCollection, BinAxis};
use crate::binned::BinnedDistribution;
use crate::core::{progress_bar, MarkovChain, UPDATE_INTERVAL};
use crate::error::{FitError, Result};
use crate::fit_result::FitResult;
use crate::hmc::HamiltonianChain;
use crate::metropolis::{GaussianProposal, MetropolisChain};
use crate::objective::{Objective, SignConvention};
use crate::params::ParameterDict;
use crate::stats::{autocorrelation, ChainTracker};
use crate::transform::{Bounded, SigmoidBoundary};

/// Bins per parameter of the projections when nothing else is configured.
pub const DEFAULT_PROJECTION_BINS: usize = 50;
pub const DEFAULT_MAX_LAG: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SamplerKind {
    Metropolis,
    Hamiltonian { epsilon: f64, n_steps: usize },
}

/// How the parameter bounds are enforced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BoundaryMode {
    /// Proposals outside the bounds are rejected.
    #[default]
    Reject,
    /// Sampling happens in unconstrained coordinates mapped into the bounds.
    Sigmoid,
}

/// Lifecycle of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    BurnIn,
    Sampling,
    Done,
}

#[derive(Debug, Clone)]
pub struct Mcmc {
    kind: SamplerKind,
    boundary: BoundaryMode,
    max_iter: usize,
    burn_in: usize,
    minima: ParameterDict,
    maxima: ParameterDict,
    sigmas: ParameterDict,
    masses: ParameterDict,
    initial: ParameterDict,
    convention: SignConvention,
    save_chain: bool,
    seed: u64,
    histogram_axes: Option<AxisCollection>,
    nbins: BTreeMap<String, usize>,
    max_lag: usize,
    show_progress: bool,
    phase: Phase,
}

/// Bounds and step scales resolved against an objective's parameter order.
struct Resolved {
    names: Vec<String>,
    minima: Vec<f64>,
    maxima: Vec<f64>,
    steps: Vec<f64>,
    initial: Vec<f64>,
    axes: Vec<BinAxis>,
}

impl Mcmc {
    pub fn new(kind: SamplerKind) -> Self {
        Self {
            kind,
            boundary: BoundaryMode::Reject,
            max_iter: 10_000,
            burn_in: 1_000,
            minima: ParameterDict::new(),
            maxima: ParameterDict::new(),
            sigmas: ParameterDict::new(),
            masses: ParameterDict::new(),
            initial: ParameterDict::new(),
            convention: SignConvention::NLLH,
            save_chain: true,
            seed: 0,
            histogram_axes: None,
            nbins: BTreeMap::new(),
            max_lag: DEFAULT_MAX_LAG,
            show_progress: false,
            phase: Phase::Idle,
        }
    }

    /// Total number of iterations, burn-in included.
    pub fn set_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    pub fn set_burn_in(mut self, burn_in: usize) -> Self {
        self.burn_in = burn_in;
        self
    }

    pub fn set_minima(mut self, minima: ParameterDict) -> Self {
        self.minima = minima;
        self
    }

    pub fn set_maxima(mut self, maxima: ParameterDict) -> Self {
        self.maxima = maxima;
        self
    }

    /// Proposal widths of the Metropolis sampler.
    pub fn set_sigmas(mut self, sigmas: ParameterDict) -> Self {
        self.sigmas = sigmas;
        self
    }

    /// Masses of the Hamiltonian sampler. Parameters without an entry get 1.
    pub fn set_masses(mut self, masses: ParameterDict) -> Self {
        self.masses = masses;
        self
    }

    /// Starting point. Parameters without an entry start mid-range.
    pub fn set_initial(mut self, initial: ParameterDict) -> Self {
        self.initial = initial;
        self
    }

    pub fn set_flip_sign(mut self, flip_sign: bool) -> Self {
        self.convention.flip_sign = flip_sign;
        self
    }

    pub fn set_test_stat_logged(mut self, logged: bool) -> Self {
        self.convention.test_stat_logged = logged;
        self
    }

    pub fn set_boundary_mode(mut self, mode: BoundaryMode) -> Self {
        self.boundary = mode;
        self
    }

    pub fn set_save_chain(mut self, save_chain: bool) -> Self {
        self.save_chain = save_chain;
        self
    }

    pub fn set_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Projection axes, one per parameter, looked up by parameter name.
    pub fn set_histogram_axes(mut self, axes: AxisCollection) -> Self {
        self.histogram_axes = Some(axes);
        self
    }

    /// Projection bin counts per parameter, used when no histogram axes are
    /// set. Parameters without an entry get [`DEFAULT_PROJECTION_BINS`].
    pub fn set_nbins(mut self, nbins: BTreeMap<String, usize>) -> Self {
        self.nbins = nbins;
        self
    }

    pub fn set_max_lag(mut self, max_lag: usize) -> Self {
        self.max_lag = max_lag;
        self
    }

    pub fn set_show_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    pub fn kind(&self) -> SamplerKind {
        self.kind
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn convention(&self) -> SignConvention {
        self.convention
    }

    fn resolve(&self, names: &[String]) -> Result<Resolved> {
        if names.is_empty() {
            return Err(FitError::Config("objective has no parameters".into()));
        }
        if self.max_iter == 0 {
            return Err(FitError::Config("max_iter must be positive".into()));
        }
        if self.burn_in >= self.max_iter {
            return Err(FitError::Config(format!(
                "burn-in ({}) must be smaller than max_iter ({})",
                self.burn_in, self.max_iter
            )));
        }
        if let SamplerKind::Hamiltonian { epsilon, n_steps } = self.kind {
            if !(epsilon.is_finite() && epsilon > 0.0) || n_steps == 0 {
                return Err(FitError::Config(format!(
                    "HMC needs a positive step size and at least one step, \
                     got epsilon={epsilon}, n_steps={n_steps}"
                )));
            }
        }

        let lookup = |dict: &ParameterDict, what: &str, name: &str| {
            dict.get(name)
                .copied()
                .ok_or_else(|| FitError::Config(format!("no {what} given for parameter '{name}'")))
        };

        let mut resolved = Resolved {
            names: names.to_vec(),
            minima: Vec::with_capacity(names.len()),
            maxima: Vec::with_capacity(names.len()),
            steps: Vec::with_capacity(names.len()),
            initial: Vec::with_capacity(names.len()),
            axes: Vec::with_capacity(names.len()),
        };
        for name in names {
            let lo = lookup(&self.minima, "minimum", name)?;
            let hi = lookup(&self.maxima, "maximum", name)?;
            if !(lo < hi) || !lo.is_finite() || !hi.is_finite() {
                return Err(FitError::Config(format!(
                    "parameter '{name}' needs finite minimum < maximum, got [{lo}, {hi}]"
                )));
            }
            let step = match self.kind {
                SamplerKind::Metropolis => lookup(&self.sigmas, "sigma", name)?,
                SamplerKind::Hamiltonian { .. } => self.masses.get(name).copied().unwrap_or(1.0),
            };
            if !(step.is_finite() && step > 0.0) {
                return Err(FitError::Config(format!(
                    "step scale of parameter '{name}' must be positive, got {step}"
                )));
            }
            let start = self.initial.get(name).copied().unwrap_or(0.5 * (lo + hi));
            if !(start >= lo && start <= hi) {
                return Err(FitError::Config(format!(
                    "initial value {start} of '{name}' outside [{lo}, {hi}]"
                )));
            }
            let axis = match &self.histogram_axes {
                Some(axes) => axes
                    .index_of(name)
                    .and_then(|i| axes.axis(i))
                    .cloned()
                    .ok_or_else(|| {
                        FitError::Config(format!("no histogram axis for parameter '{name}'"))
                    })?,
                None => BinAxis::new(
                    name,
                    lo,
                    hi,
                    self.nbins.get(name).copied().unwrap_or(DEFAULT_PROJECTION_BINS),
                )?,
            };
            resolved.minima.push(lo);
            resolved.maxima.push(hi);
            resolved.steps.push(step);
            resolved.initial.push(start);
            resolved.axes.push(axis);
        }
        Ok(resolved)
    }

    /// Samples the objective and summarises the chain.
    ///
    /// All configuration problems are reported before the first iteration.
    pub fn optimise<O: Objective>(&mut self, objective: &O) -> Result<FitResult> {
        let names = objective.parameter_names();
        let resolved = self.resolve(&names)?;
        objective.validate()?;
        let start_value = objective.evaluate(&resolved.initial);
        if self.convention.log_density(start_value) == f64::NEG_INFINITY {
            return Err(FitError::Config(format!(
                "objective is {start_value} at the starting point {:?}",
                resolved.initial
            )));
        }

        info!(
            "starting {:?} run: {} parameters, {} iterations ({} burn-in), seed {}",
            self.kind,
            names.len(),
            self.max_iter,
            self.burn_in,
            self.seed
        );

        match self.boundary {
            BoundaryMode::Reject => {
                let identity = |state: &[f64], value: f64| (state.to_vec(), value);
                match self.kind {
                    SamplerKind::Metropolis => {
                        let chain = MetropolisChain::new(
                            objective,
                            GaussianProposal::new(resolved.steps.clone())?,
                            &resolved.initial,
                            self.seed,
                        )
                        .with_convention(self.convention)
                        .with_bounds(resolved.minima.clone(), resolved.maxima.clone())?;
                        self.sample(chain, identity, resolved)
                    }
                    SamplerKind::Hamiltonian { epsilon, n_steps } => {
                        let chain = HamiltonianChain::new(
                            objective,
                            &resolved.initial,
                            resolved.steps.clone(),
                            epsilon,
                            n_steps,
                            self.seed,
                        )?
                        .with_convention(self.convention)
                        .with_bounds(resolved.minima.clone(), resolved.maxima.clone())?;
                        self.sample(chain, identity, resolved)
                    }
                }
            }
            BoundaryMode::Sigmoid => {
                let boundaries = resolved
                    .minima
                    .iter()
                    .zip(&resolved.maxima)
                    .map(|(&lo, &hi)| SigmoidBoundary::new(lo, hi))
                    .collect::<Result<Vec<_>>>()?;
                // The Jacobian term only makes sense for a negative log density.
                let mut wrapped = Bounded::new(objective, boundaries)?;
                if self.convention != SignConvention::NLLH {
                    wrapped = wrapped.without_jacobian();
                }
                let z0 = wrapped.to_unconstrained(&resolved.initial);
                let back =
                    |z: &[f64], value: f64| (wrapped.to_bounded(z), wrapped.unwrap_value(z, value));
                match self.kind {
                    SamplerKind::Metropolis => {
                        // Local width in z of a step of sigma at the centre of the range.
                        let steps: Vec<f64> = resolved
                            .steps
                            .iter()
                            .zip(resolved.minima.iter().zip(&resolved.maxima))
                            .map(|(s, (lo, hi))| 4.0 * s / (hi - lo))
                            .collect();
                        let chain = MetropolisChain::new(
                            &wrapped,
                            GaussianProposal::new(steps)?,
                            &z0,
                            self.seed,
                        )
                        .with_convention(self.convention);
                        self.sample(chain, back, resolved)
                    }
                    SamplerKind::Hamiltonian { epsilon, n_steps } => {
                        let chain = HamiltonianChain::new(
                            &wrapped,
                            &z0,
                            resolved.steps.clone(),
                            epsilon,
                            n_steps,
                            self.seed,
                        )?
                        .with_convention(self.convention);
                        self.sample(chain, back, resolved)
                    }
                }
            }
        }
    }

    /// Runs `chain` through burn-in and sampling. `to_parameters` maps a chain
    /// state and its objective value onto the parameter vector and the value
    /// of the original objective there.
    fn sample<M, F>(&mut self, chain: M, to_parameters: F, resolved: Resolved) -> Result<FitResult>
    where
        M: MarkovChain,
        F: Fn(&[f64], f64) -> (Vec<f64>, f64),
    {
        let outcome = self.run_phases(chain, to_parameters, resolved);
        if outcome.is_err() {
            self.phase = Phase::Idle;
        }
        outcome
    }

    fn run_phases<M, F>(
        &mut self,
        mut chain: M,
        to_parameters: F,
        resolved: Resolved,
    ) -> Result<FitResult>
    where
        M: MarkovChain,
        F: Fn(&[f64], f64) -> (Vec<f64>, f64),
    {
        let Resolved { names, axes, .. } = resolved;
        let dim = names.len();
        let n_samples = self.max_iter - self.burn_in;

        let mut projections = Projections::new(&names, &axes)?;
        let mut tracker = ChainTracker::new(dim);
        let mut trace = Vec::with_capacity(n_samples);
        let mut chain_rows: Vec<f64> = if self.save_chain {
            Vec::with_capacity(n_samples * dim)
        } else {
            Vec::new()
        };
        let mut best: Option<(Vec<f64>, f64, f64)> = None;

        let pb = if self.show_progress {
            progress_bar(self.max_iter, &format!("seed {}", self.seed))
        } else {
            indicatif::ProgressBar::hidden()
        };
        let mut last_update = Instant::now();

        self.phase = if self.burn_in > 0 { Phase::BurnIn } else { Phase::Sampling };
        debug!("entering {:?}", self.phase);

        for iteration in 0..self.max_iter {
            if iteration == self.burn_in && self.phase == Phase::BurnIn {
                self.phase = Phase::Sampling;
                debug!("burn-in finished after {iteration} iterations");
            }
            chain.step();

            if self.phase == Phase::Sampling {
                let (theta, value) = to_parameters(chain.current_state(), chain.current_value());
                let log_density = self.convention.log_density(value);
                let best_ld = best.as_ref().map_or(f64::NEG_INFINITY, |b| b.2);
                if log_density > best_ld {
                    best = Some((theta.clone(), value, log_density));
                }

                tracker.step(&theta, chain.last_accepted())?;
                projections.fill(&theta)?;
                trace.push(value);
                if self.save_chain {
                    chain_rows.extend_from_slice(&theta);
                }
            }

            if last_update.elapsed() >= UPDATE_INTERVAL || iteration + 1 == self.max_iter {
                pb.set_position(iteration as u64 + 1);
                pb.set_message(format!("p(accept)≈{:.2}", tracker.window_acceptance()));
                last_update = Instant::now();
            }
        }
        pb.finish_and_clear();
        self.phase = Phase::Done;

        let (best_fit, best_fit_value, _) = best.ok_or_else(|| {
            FitError::Config("no sample after burn-in had a finite objective value".into())
        })?;

        // Trace of the test statistic, sanitised so the FFT stays finite.
        let finite_trace: Vec<f64> = trace.iter().copied().filter(|v| v.is_finite()).collect();
        let autocorrelations = autocorrelation(&finite_trace, self.max_lag);

        let chain_samples = if self.save_chain {
            Some(
                Array2::from_shape_vec((n_samples, dim), chain_rows)
                    .map_err(|e| FitError::DimensionMismatch(e.to_string()))?,
            )
        } else {
            None
        };

        let stats = tracker.stats();
        info!(
            "finished run: best value {best_fit_value:.6}, acceptance rate {:.3}",
            stats.p_accept
        );

        Ok(FitResult {
            parameter_names: names,
            best_fit,
            best_fit_value,
            chain: chain_samples,
            chain_values: self.save_chain.then_some(trace),
            projections_1d: projections.one_d,
            projections_2d: projections.two_d,
            autocorrelations,
            means: stats.mean.to_vec(),
            uncertainties: stats.sm2.mapv(f64::sqrt).to_vec(),
            acceptance_rate: stats.p_accept,
            n_samples,
        })
    }

    /// Runs `n_chains` independent copies of this configuration in parallel,
    /// chain `i` seeded with `seed + i`.
    pub fn run_independent<O: Objective + Sync>(
        &self,
        objective: &O,
        n_chains: usize,
    ) -> Result<Vec<FitResult>> {
        (0..n_chains)
            .into_par_iter()
            .map(|i| {
                let mut mcmc = self
                    .clone()
                    .set_seed(self.seed + i as u64)
                    .set_show_progress(false);
                mcmc.optimise(objective)
            })
            .collect()
    }
}

/// One- and two-dimensional histograms of the sampled parameters.
struct Projections {
    one_d: BTreeMap<String, BinnedDistribution>,
    two_d: BTreeMap<String, BinnedDistribution>,
    keys_1d: Vec<String>,
    pairs: Vec<(usize, usize, String)>,
}

impl Projections {
    fn new(names: &[String], axes: &[BinAxis]) -> Result<Self> {
        let mut one_d = BTreeMap::new();
        let mut keys_1d = Vec::with_capacity(axes.len());
        for axis in axes {
            let collection = AxisCollection::from_axes(vec![axis.clone()])?;
            one_d.insert(
                axis.name().to_string(),
                BinnedDistribution::new(axis.name(), collection),
            );
            keys_1d.push(axis.name().to_string());
        }
        let mut two_d = BTreeMap::new();
        let mut pairs = Vec::new();
        for i in 0..names.len() {
            for j in (i + 1)..names.len() {
                let key = format!("{}_{}", names[i], names[j]);
                let collection =
                    AxisCollection::from_axes(vec![axes[i].clone(), axes[j].clone()])?;
                two_d.insert(key.clone(), BinnedDistribution::new(&key, collection));
                pairs.push((i, j, key));
            }
        }
        Ok(Self {
            one_d,
            two_d,
            keys_1d,
            pairs,
        })
    }

    fn fill(&mut self, theta: &[f64]) -> Result<()> {
        if theta.len() != self.keys_1d.len() {
            return Err(FitError::DimensionMismatch(format!(
                "projections expect {} parameters, got {}",
                self.keys_1d.len(),
                theta.len()
            )));
        }
        for (key, &x) in self.keys_1d.iter().zip(theta) {
            if let Some(proj) = self.one_d.get_mut(key) {
                proj.fill(&[x], 1.0)?;
            }
        }
        for (i, j, key) in &self.pairs {
            if let Some(proj) = self.two_d.get_mut(key) {
                proj.fill(&[theta[*i], theta[*j]], 1.0)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Parabola {
        centre: Vec<f64>,
    }

    impl Objective for Parabola {
        fn parameter_names(&self) -> Vec<String> {
            (0..self.centre.len()).map(|i| format!("p{i}")).collect()
        }

        fn evaluate(&self, x: &[f64]) -> f64 {
            x.iter()
                .zip(&self.centre)
                .map(|(a, c)| 0.5 * ((a - c) / 0.5).powi(2))
                .sum()
        }
    }

    fn dict(pairs: &[(&str, f64)]) -> ParameterDict {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    fn configured(kind: SamplerKind) -> Mcmc {
        Mcmc::new(kind)
            .set_minima(dict(&[("p0", -2.0), ("p1", 0.0)]))
            .set_maxima(dict(&[("p0", 2.0), ("p1", 3.0)]))
            .set_sigmas(dict(&[("p0", 0.4), ("p1", 0.4)]))
            .set_max_iter(4000)
            .set_burn_in(500)
            .set_seed(17)
    }

    #[test]
    fn missing_configuration_fails_before_sampling() {
        let objective = Parabola { centre: vec![0.0, 1.0] };
        let mut no_sigma = configured(SamplerKind::Metropolis).set_sigmas(dict(&[("p0", 0.4)]));
        assert!(matches!(no_sigma.optimise(&objective), Err(FitError::Config(_))));
        assert_eq!(no_sigma.phase(), Phase::Idle);

        let mut bad_bounds = configured(SamplerKind::Metropolis)
            .set_maxima(dict(&[("p0", -3.0), ("p1", 3.0)]));
        assert!(bad_bounds.optimise(&objective).is_err());

        let mut long_burn = configured(SamplerKind::Metropolis).set_burn_in(4000);
        assert!(long_burn.optimise(&objective).is_err());

        let mut bad_start = configured(SamplerKind::Metropolis).set_initial(dict(&[("p0", 9.0)]));
        assert!(bad_start.optimise(&objective).is_err());
    }

    #[test]
    fn phase_ends_done_and_counts_samples() {
        let objective = Parabola { centre: vec![0.0, 1.0] };
        let mut mcmc = configured(SamplerKind::Metropolis);
        let result = mcmc.optimise(&objective).unwrap();
        assert_eq!(mcmc.phase(), Phase::Done);
        assert_eq!(result.n_samples, 3500);
        assert_eq!(result.chain.as_ref().unwrap().nrows(), 3500);
        let total: f64 = result.get_1d_projections()["p0"].integral();
        assert_eq!(total, 3500.0);
        assert!(result.get_2d_projections().contains_key("p0_p1"));
    }

    #[test]
    fn best_fit_is_the_minimum_of_the_chain() {
        let objective = Parabola { centre: vec![0.3, 1.2] };
        let mut mcmc = configured(SamplerKind::Metropolis);
        let result = mcmc.optimise(&objective).unwrap();
        let chain = result.chain.as_ref().unwrap();
        let min = chain
            .rows()
            .into_iter()
            .map(|r| objective.evaluate(r.as_slice().unwrap()))
            .fold(f64::INFINITY, f64::min);
        assert_eq!(result.best_fit_value, min);
        assert!((result.best_fit[0] - 0.3).abs() < 0.1);
        assert!((result.best_fit[1] - 1.2).abs() < 0.1);
    }

    #[test]
    fn chain_can_be_dropped() {
        let objective = Parabola { centre: vec![0.0, 1.0] };
        let mut mcmc = configured(SamplerKind::Metropolis).set_save_chain(false);
        let result = mcmc.optimise(&objective).unwrap();
        assert!(result.chain.is_none());
        assert!(result.chain_values.is_none());
        assert_eq!(result.get_1d_projections()["p1"].integral(), 3500.0);
    }

    #[test]
    fn sigmoid_mode_stays_inside() {
        // Minimum outside the box: the chain presses against the upper bound.
        let objective = Parabola { centre: vec![5.0, 1.0] };
        let mut mcmc = configured(SamplerKind::Metropolis).set_boundary_mode(BoundaryMode::Sigmoid);
        let result = mcmc.optimise(&objective).unwrap();
        for row in result.chain.as_ref().unwrap().rows() {
            assert!(row[0] > -2.0 && row[0] < 2.0);
            assert!(row[1] > 0.0 && row[1] < 3.0);
        }
        assert!(result.best_fit[0] > 1.5);
        // Reported values are those of the plain objective.
        let recomputed = objective.evaluate(&result.best_fit);
        assert!((recomputed - result.best_fit_value).abs() < 1e-9);
    }

    #[test]
    fn hamiltonian_reject_mode() {
        let objective = Parabola { centre: vec![0.5, 2.0] };
        let mut mcmc = configured(SamplerKind::Hamiltonian {
            epsilon: 0.1,
            n_steps: 10,
        });
        let result = mcmc.optimise(&objective).unwrap();
        assert!((result.means[0] - 0.5).abs() < 0.1, "means={:?}", result.means);
        assert!((result.means[1] - 2.0).abs() < 0.1, "means={:?}", result.means);
        assert!(result.acceptance_rate > 0.5);
    }

    #[test]
    fn independent_runs_use_distinct_seeds() {
        let objective = Parabola { centre: vec![0.0, 1.0] };
        let mcmc = configured(SamplerKind::Metropolis).set_max_iter(600).set_burn_in(100);
        let results = mcmc.run_independent(&objective, 3).unwrap();
        assert_eq!(results.len(), 3);
        assert_ne!(results[0].chain, results[1].chain);

        let mut again = mcmc.clone().set_seed(18);
        assert_eq!(again.optimise(&objective).unwrap().chain, results[1].chain);
    }

    #[test]
    fn custom_projection_axes_and_lags() {
        let objective = Parabola { centre: vec![0.0, 1.0] };
        let axes = AxisCollection::from_axes(vec![
            BinAxis::new("p1", 0.0, 3.0, 6).unwrap(),
            BinAxis::new("p0", -2.0, 2.0, 8).unwrap(),
        ])
        .unwrap();
        let mut mcmc = configured(SamplerKind::Metropolis)
            .set_histogram_axes(axes)
            .set_max_lag(10);
        let result = mcmc.optimise(&objective).unwrap();
        assert_eq!(result.get_1d_projections()["p0"].n_bins(), 8);
        assert_eq!(result.get_1d_projections()["p1"].n_bins(), 6);
        assert_eq!(result.get_2d_projections()["p0_p1"].n_bins(), 48);
        assert_eq!(result.get_autocorrelations().len(), 11);
        assert!((result.get_autocorrelations()[0] - 1.0).abs() < 1e-12);

        let partial =
            AxisCollection::from_axes(vec![BinAxis::new("p0", -2.0, 2.0, 8).unwrap()]).unwrap();
        let mut missing = configured(SamplerKind::Metropolis).set_histogram_axes(partial);
        assert!(matches!(missing.optimise(&objective), Err(FitError::Config(_))));
    }

    // Undefined for negative x, minimum at x = 1.
    struct HalfLine;

    impl Objective for HalfLine {
        fn parameter_names(&self) -> Vec<String> {
            vec!["x".into()]
        }

        fn evaluate(&self, x: &[f64]) -> f64 {
            if x[0] < 0.0 {
                f64::NAN
            } else {
                0.5 * ((x[0] - 1.0) / 0.5).powi(2)
            }
        }
    }

    fn half_line(kind: SamplerKind, start: f64) -> Mcmc {
        Mcmc::new(kind)
            .set_minima(dict(&[("x", -5.0)]))
            .set_maxima(dict(&[("x", 5.0)]))
            .set_sigmas(dict(&[("x", 1.0)]))
            .set_initial(dict(&[("x", start)]))
            .set_max_iter(3000)
            .set_burn_in(300)
            .set_seed(1)
    }

    const HALF_LINE_SAMPLERS: [SamplerKind; 2] = [
        SamplerKind::Metropolis,
        SamplerKind::Hamiltonian {
            epsilon: 0.1,
            n_steps: 10,
        },
    ];

    #[test]
    fn undefined_starting_point_is_rejected() {
        for kind in HALF_LINE_SAMPLERS {
            let mut mcmc = half_line(kind, -1.0);
            assert!(
                matches!(mcmc.optimise(&HalfLine), Err(FitError::Config(_))),
                "{kind:?}"
            );
            assert_eq!(mcmc.phase(), Phase::Idle);
        }
    }

    #[test]
    fn undefined_region_is_never_recorded() {
        for kind in HALF_LINE_SAMPLERS {
            let result = half_line(kind, 1.0).optimise(&HalfLine).unwrap();
            let samples = result.parameter_samples("x").unwrap();
            assert!(samples.iter().all(|&x| x >= 0.0), "{kind:?}");
            assert!(result.best_fit_value.is_finite());
            assert!(result.best_fit[0] >= 0.0);
            assert!((result.best_fit[0] - 1.0).abs() < 0.2, "{kind:?}: {:?}", result.best_fit);
            assert!(result.uncertainties[0] > 0.0);
        }
    }

    #[test]
    fn failed_run_returns_to_idle() {
        let objective = Parabola { centre: vec![0.0, 1.0] };
        let mut mcmc = configured(SamplerKind::Metropolis);
        let resolved = mcmc.resolve(&objective.parameter_names()).unwrap();
        let chain = MetropolisChain::new(
            &objective,
            GaussianProposal::new(resolved.steps.clone()).unwrap(),
            &resolved.initial,
            1,
        );
        // Drops a parameter, so the first recorded sample has the wrong length.
        let truncate = |state: &[f64], value: f64| (state[..1].to_vec(), value);
        assert!(matches!(
            mcmc.sample(chain, truncate, resolved),
            Err(FitError::DimensionMismatch(_))
        ));
        assert_eq!(mcmc.phase(), Phase::Idle);

        mcmc.optimise(&objective).unwrap();
        assert_eq!(mcmc.phase(), Phase::Done);
    }

    struct Bump;

    impl Objective for Bump {
        fn parameter_names(&self) -> Vec<String> {
            vec!["p0".into(), "p1".into()]
        }

        // Unnormalised density, largest at (0.5, 1.5).
        fn evaluate(&self, x: &[f64]) -> f64 {
            (-0.5 * (((x[0] - 0.5) / 0.5).powi(2) + ((x[1] - 1.5) / 0.5).powi(2))).exp()
        }
    }

    #[test]
    fn density_statistic_is_climbed() {
        let mut mcmc = configured(SamplerKind::Metropolis)
            .set_flip_sign(false)
            .set_test_stat_logged(false);
        let result = mcmc.optimise(&Bump).unwrap();
        assert!((result.means[0] - 0.5).abs() < 0.1, "means={:?}", result.means);
        assert!((result.means[1] - 1.5).abs() < 0.1, "means={:?}", result.means);
        // The best fit maximises the density.
        assert!(result.best_fit_value > 0.95);
        let chain = result.chain.as_ref().unwrap();
        let max = chain
            .rows()
            .into_iter()
            .map(|r| Bump.evaluate(r.as_slice().unwrap()))
            .fold(f64::NEG_INFINITY, f64::max);
        assert_eq!(result.best_fit_value, max);
    }
}
