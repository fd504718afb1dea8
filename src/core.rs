//! Chain abstraction shared by the samplers, plus generic run helpers.

use std::time::{Duration, Instant};

use indicatif::{ProgressBar, ProgressStyle};
use ndarray::Array2;

/// Minimum time between two progress bar refreshes.
pub(crate) const UPDATE_INTERVAL: Duration = Duration::from_millis(500);

pub trait MarkovChain {
    /// Does one iteration of the chain, returning the new current state.
    fn step(&mut self) -> &[f64];

    fn current_state(&self) -> &[f64];

    /// Raw objective value at the current state.
    fn current_value(&self) -> f64;

    /// Log density at the current state, `-inf` if it is impossible.
    fn current_log_density(&self) -> f64;

    /// Whether the most recent step moved to its proposal.
    fn last_accepted(&self) -> bool;
}

/// Runs `chain` for `n_steps` and returns one state per row.
pub fn run_chain<M: MarkovChain + ?Sized>(chain: &mut M, n_steps: usize) -> Array2<f64> {
    run_chain_with_progress(chain, n_steps, &ProgressBar::hidden())
}

/// Like [`run_chain`], reporting progress and the running acceptance rate on `pb`.
pub fn run_chain_with_progress<M: MarkovChain + ?Sized>(
    chain: &mut M,
    n_steps: usize,
    pb: &ProgressBar,
) -> Array2<f64> {
    let dim = chain.current_state().len();
    let mut out = Array2::<f64>::zeros((n_steps, dim));
    let mut accept_count = 0_usize;
    let mut last_update = Instant::now();

    pb.set_length(n_steps as u64);

    for (i, mut row) in out.rows_mut().into_iter().enumerate() {
        let state = chain.step();
        row.iter_mut().zip(state).for_each(|(r, &s)| *r = s);
        accept_count += chain.last_accepted() as usize;

        if last_update.elapsed() >= UPDATE_INTERVAL || i + 1 == n_steps {
            pb.set_position(i as u64 + 1);
            pb.set_message(format!("AcceptRate={:.3}", accept_count as f64 / (i + 1) as f64));
            last_update = Instant::now();
        }
    }
    out
}

/// Progress bar used by the fit driver.
pub(crate) fn progress_bar(n_steps: usize, prefix: &str) -> ProgressBar {
    let pb = ProgressBar::new(n_steps as u64);
    match ProgressStyle::default_bar()
        .template("{prefix} [{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")
    {
        Ok(style) => pb.set_style(style.progress_chars("##-")),
        Err(e) => log::debug!("keeping default progress style: {e}"),
    }
    pb.set_prefix(prefix.to_string());
    pb
}
