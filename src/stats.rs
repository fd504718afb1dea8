//! Running chain statistics and autocorrelation estimates.

use std::collections::VecDeque;

use ndarray::prelude::*;
use num_traits::Float;
use rustfft::num_complex::Complex;
use rustfft::{FftNum, FftPlanner};

use crate::error::{FitError, Result};

/// Number of most recent steps used for the windowed acceptance rate.
const ACCEPT_WINDOW: usize = 100;

/// Online mean, variance and acceptance bookkeeping for one chain.
#[derive(Debug, Clone, PartialEq)]
pub struct ChainTracker {
    n_params: usize,
    n: u64,
    n_accepted: u64,
    p_accept_window: f64,
    mean: Array1<f64>,    // n_params
    mean_sq: Array1<f64>, // n_params
    accept_queue: VecDeque<bool>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChainStats {
    pub n: u64,
    /// Acceptance rate over all tracked steps.
    pub p_accept: f64,
    pub mean: Array1<f64>, // n_params
    pub sm2: Array1<f64>,  // n_params
}

impl ChainTracker {
    pub fn new(n_params: usize) -> Self {
        Self {
            n_params,
            n: 0,
            n_accepted: 0,
            p_accept_window: 0.0,
            mean: Array1::zeros(n_params),
            mean_sq: Array1::zeros(n_params),
            accept_queue: VecDeque::with_capacity(ACCEPT_WINDOW + 1),
        }
    }

    pub fn step(&mut self, x: &[f64], accepted: bool) -> Result<()> {
        let x_arr = ArrayView1::from_shape(self.n_params, x).map_err(|_| {
            FitError::DimensionMismatch(format!(
                "tracker expects {} parameters, got {}",
                self.n_params,
                x.len()
            ))
        })?;
        self.n += 1;
        self.n_accepted += accepted as u64;

        let old_len = self.accept_queue.len() as f64;
        self.accept_queue.push_back(accepted);
        let removed = if self.accept_queue.len() > ACCEPT_WINDOW {
            self.accept_queue.pop_front().unwrap_or(false)
        } else {
            false
        };
        let new_len = self.accept_queue.len() as f64;
        let delta = accepted as u8 as f64 - removed as u8 as f64;
        self.p_accept_window = (self.p_accept_window * old_len + delta) / new_len;

        let n = self.n as f64;
        self.mean = (&self.mean * (n - 1.0) + &x_arr) / n;
        self.mean_sq = (&self.mean_sq * (n - 1.0) + &x_arr.mapv(|v| v * v)) / n;
        Ok(())
    }

    pub fn n(&self) -> u64 {
        self.n
    }

    /// Acceptance rate over the last steps only.
    pub fn window_acceptance(&self) -> f64 {
        self.p_accept_window
    }

    pub fn acceptance_rate(&self) -> f64 {
        if self.n == 0 {
            return 0.0;
        }
        self.n_accepted as f64 / self.n as f64
    }

    pub fn mean(&self) -> &Array1<f64> {
        &self.mean
    }

    /// Unbiased sample variance. Zero until two samples were seen.
    pub fn sm2(&self) -> Array1<f64> {
        if self.n < 2 {
            return Array1::zeros(self.n_params);
        }
        let n = self.n as f64;
        ((&self.mean_sq - &self.mean.mapv(|m| m * m)) * n / (n - 1.0)).mapv(|v| v.max(0.0))
    }

    pub fn stats(&self) -> ChainStats {
        ChainStats {
            n: self.n,
            p_accept: self.acceptance_rate(),
            mean: self.mean.clone(),
            sm2: self.sm2(),
        }
    }
}

/// Normalised autocorrelation of `series` for lags `0..=max_lag`.
///
/// Computed through the power spectrum of the mean-subtracted series, zero
/// padded so the circular correlation equals the linear one. `max_lag` is
/// clipped to `len - 1`. A constant series has correlation one at lag zero
/// and zero everywhere else.
pub fn autocorrelation<T: FftNum + Float>(series: &[T], max_lag: usize) -> Vec<T> {
    let n = series.len();
    if n == 0 {
        return Vec::new();
    }
    let max_lag = max_lag.min(n - 1);
    let n_t = T::from(n).unwrap_or_else(T::one);
    let mean = series.iter().fold(T::zero(), |acc, &x| acc + x) / n_t;

    let padded_len = (2 * n).next_power_of_two();
    let mut buffer: Vec<Complex<T>> = series
        .iter()
        .map(|&x| Complex::new(x - mean, T::zero()))
        .chain(std::iter::repeat(Complex::new(T::zero(), T::zero())))
        .take(padded_len)
        .collect();

    let mut planner = FftPlanner::new();
    planner.plan_fft_forward(padded_len).process(&mut buffer);
    for c in buffer.iter_mut() {
        *c = Complex::new(c.norm_sqr(), T::zero());
    }
    planner.plan_fft_inverse(padded_len).process(&mut buffer);

    let c0 = buffer[0].re;
    if !(c0 > T::zero()) {
        let mut out = vec![T::zero(); max_lag + 1];
        out[0] = T::one();
        return out;
    }
    buffer[..=max_lag].iter().map(|c| c.re / c0).collect()
}

/// Integrated autocorrelation time `1 + 2 sum rho_k`, summed until the first
/// non-positive `rho_k`.
pub fn integrated_autocorrelation_time(acf: &[f64]) -> f64 {
    1.0 + 2.0
        * acf
            .iter()
            .skip(1)
            .take_while(|&&rho| rho > 0.0)
            .sum::<f64>()
}

/// Number of independent draws equivalent to `series`.
pub fn effective_sample_size(series: &[f64]) -> f64 {
    if series.is_empty() {
        return 0.0;
    }
    let acf = autocorrelation(series, series.len() - 1);
    series.len() as f64 / integrated_autocorrelation_time(&acf)
}
