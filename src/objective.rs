//! The interface between test statistics and samplers.

use crate::error::Result;

/// A scalar test statistic over a named parameter vector.
///
/// Samplers only see this trait. The order of [`Objective::parameter_names`]
/// fixes the layout of every parameter vector passed to
/// [`Objective::evaluate`] and of every stored chain sample.
pub trait Objective {
    fn parameter_names(&self) -> Vec<String>;

    /// Value of the test statistic at `x`. Non-finite values are allowed and
    /// are treated by the samplers as infinitely unlikely.
    fn evaluate(&self, x: &[f64]) -> f64;

    /// Checks that the objective is ready to be evaluated. Called once before
    /// a run starts.
    fn validate(&self) -> Result<()> {
        Ok(())
    }
}

impl<O: Objective + ?Sized> Objective for &O {
    fn parameter_names(&self) -> Vec<String> {
        (**self).parameter_names()
    }

    fn evaluate(&self, x: &[f64]) -> f64 {
        (**self).evaluate(x)
    }

    fn validate(&self) -> Result<()> {
        (**self).validate()
    }
}

/// Sign convention of a test statistic, turning its value into a log density.
///
/// With `test_stat_logged` the statistic already is a (possibly negated) log
/// density; otherwise its logarithm is taken. `flip_sign` negates the result,
/// used when the statistic is minimised (a negative log-likelihood) while the
/// sampler climbs the log density.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignConvention {
    pub flip_sign: bool,
    pub test_stat_logged: bool,
}

impl SignConvention {
    /// Convention for negative log-likelihoods.
    pub const NLLH: SignConvention = SignConvention {
        flip_sign: true,
        test_stat_logged: true,
    };

    /// Log density of a test statistic value. NaN and `+inf` log densities are
    /// mapped to `-inf`.
    pub fn log_density(&self, value: f64) -> f64 {
        let logged = if self.test_stat_logged { value } else { value.ln() };
        let signed = if self.flip_sign { -logged } else { logged };
        if signed.is_nan() || signed == f64::INFINITY {
            f64::NEG_INFINITY
        } else {
            signed
        }
    }
}

impl Default for SignConvention {
    fn default() -> Self {
        Self::NLLH
    }
}
