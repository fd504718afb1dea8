//! Sigmoid reparameterisation of bounded parameters.
//!
//! [`SigmoidBoundary`] maps an unconstrained `z` onto the open interval
//! `(lower, upper)` via `theta = lower + (upper - lower) * sigmoid(z)`.
//! [`Bounded`] composes an [`Objective`] with one boundary per parameter so that a
//! sampler can move freely in `z` while the wrapped objective is only ever
//! evaluated inside its bounds.

use crate::error::{FitError, Result};
use crate::objective::Objective;

/// Clamp applied to `(theta - lower) / width` before the logit.
const LOGIT_CLAMP: f64 = 1e-15;

#[inline]
fn sigmoid(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    }
}

/// `ln sigmoid(z)`, stable for large `|z|`.
#[inline]
fn log_sigmoid(z: f64) -> f64 {
    if z >= 0.0 {
        -(-z).exp().ln_1p()
    } else {
        z - z.exp().ln_1p()
    }
}

/// Bijection between the real line and `(lower, upper)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SigmoidBoundary {
    lower: f64,
    width: f64,
}

impl SigmoidBoundary {
    pub fn new(lower: f64, upper: f64) -> Result<Self> {
        if !(lower < upper) || !lower.is_finite() || !upper.is_finite() {
            return Err(FitError::Config(format!(
                "sigmoid boundary needs finite lower < upper, got [{lower}, {upper}]"
            )));
        }
        Ok(Self {
            lower,
            width: upper - lower,
        })
    }

    pub fn lower(&self) -> f64 {
        self.lower
    }

    pub fn upper(&self) -> f64 {
        self.lower + self.width
    }

    /// Unconstrained -> bounded.
    #[inline]
    pub fn forward(&self, z: f64) -> f64 {
        self.lower + self.width * sigmoid(z)
    }

    /// Bounded -> unconstrained. Values on or beyond the bounds are clamped
    /// to just inside the interval.
    #[inline]
    pub fn inverse(&self, theta: f64) -> f64 {
        let p = ((theta - self.lower) / self.width).clamp(LOGIT_CLAMP, 1.0 - LOGIT_CLAMP);
        (p / (1.0 - p)).ln()
    }

    /// `ln |d theta / d z|`.
    #[inline]
    pub fn log_abs_det_jacobian(&self, z: f64) -> f64 {
        self.width.ln() + log_sigmoid(z) + log_sigmoid(-z)
    }
}

/// An objective evaluated in unconstrained coordinates.
///
/// `evaluate(z) = inner(theta(z)) - sum ln|J(z)|`, where the Jacobian term keeps
/// the sampled density equivalent to a flat prior on `theta`. This assumes the
/// inner objective is a negative log density, like a negative log-likelihood;
/// use [`Bounded::without_jacobian`] for anything else.
#[derive(Debug, Clone)]
pub struct Bounded<O> {
    inner: O,
    boundaries: Vec<SigmoidBoundary>,
    jacobian: bool,
}

impl<O: Objective> Bounded<O> {
    /// Wraps `inner`, one boundary per parameter in its parameter order.
    pub fn new(inner: O, boundaries: Vec<SigmoidBoundary>) -> Result<Self> {
        let n = inner.parameter_names().len();
        if boundaries.len() != n {
            return Err(FitError::DimensionMismatch(format!(
                "{} boundaries for {n} parameters",
                boundaries.len()
            )));
        }
        Ok(Self {
            inner,
            boundaries,
            jacobian: true,
        })
    }

    pub fn without_jacobian(mut self) -> Self {
        self.jacobian = false;
        self
    }

    pub fn inner(&self) -> &O {
        &self.inner
    }

    pub fn to_bounded(&self, z: &[f64]) -> Vec<f64> {
        z.iter()
            .zip(self.boundaries.iter())
            .map(|(&z, b)| b.forward(z))
            .collect()
    }

    pub fn has_jacobian(&self) -> bool {
        self.jacobian
    }

    /// `sum ln|J(z)|` over all parameters.
    pub fn log_jacobian(&self, z: &[f64]) -> f64 {
        z.iter()
            .zip(self.boundaries.iter())
            .map(|(&z, b)| b.log_abs_det_jacobian(z))
            .sum()
    }

    /// Recovers the inner objective value from a value of this wrapper at `z`.
    pub fn unwrap_value(&self, z: &[f64], value: f64) -> f64 {
        if self.jacobian {
            value + self.log_jacobian(z)
        } else {
            value
        }
    }

    pub fn to_unconstrained(&self, theta: &[f64]) -> Vec<f64> {
        theta
            .iter()
            .zip(self.boundaries.iter())
            .map(|(&t, b)| b.inverse(t))
            .collect()
    }
}

impl<O: Objective> Objective for Bounded<O> {
    fn parameter_names(&self) -> Vec<String> {
        self.inner.parameter_names()
    }

    fn evaluate(&self, z: &[f64]) -> f64 {
        let value = self.inner.evaluate(&self.to_bounded(z));
        if !self.jacobian {
            return value;
        }
        value - self.log_jacobian(z)
    }

    fn validate(&self) -> Result<()> {
        self.inner.validate()
    }
}
