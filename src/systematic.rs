/*!
Systematic transformations of binned distributions.

A [`Systematic`] moves content between the bins of one observable axis according to
the current values of its fit parameters. All kinds share one mechanism: a square
response matrix over the bins of the transformed axis, `R[to][from]`, applied along
that axis of the (possibly multi-dimensional) distribution. Content mapped outside
the axis range is lost.

Kinds:
- [`SystematicKind::Scale`]: `x -> p * x` (nominal `p = 1`), e.g. an energy scale.
- [`SystematicKind::Shift`]: `x -> x + p` (nominal `p = 0`).
- [`SystematicKind::Convolution`]: Gaussian smearing of each bin centre with mean
  `mu` and width `sigma` (a resolution systematic).

Content is assumed uniform within a bin for scale and shift.

# Examples

```rust
use bbfit::axis::{AxisCollection, BinAxis};
use bbfit::binned::BinnedDistribution;
use bbfit::params::ParameterDict;
use bbfit::systematic::Systematic;

let axes = AxisCollection::from_axes(vec![BinAxis::new("energy", 0.0, 4.0, 4).unwrap()]).unwrap();
let dist = BinnedDistribution::from_contents("bkg", axes, vec![0.0, 10.0, 0.0, 0.0]).unwrap();

let shift = Systematic::shift("e_shift", "e_offset", "energy");
let params: ParameterDict = [("e_offset".to_string(), 0.5)].into_iter().collect();
let shifted = shift.apply(&dist, &params).unwrap();
assert_eq!(shifted.contents(), &[0.0, 5.0, 5.0, 0.0]);
```
*/

use serde::{Deserialize, Serialize};
use statrs::function::erf::erf;
use std::f64::consts::SQRT_2;

use crate::axis::BinAxis;
use crate::binned::BinnedDistribution;
use crate::error::{FitError, Result};
use crate::params::{require, ParameterDict};

/// Smallest image width treated as an interval rather than a point.
const MIN_IMAGE_WIDTH: f64 = 1e-300;

/// The transformation applied by a systematic, with the names of the fit
/// parameters it reads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SystematicKind {
    Scale { param: String },
    Shift { param: String },
    Convolution { mean: String, sigma: String },
}

/// A named systematic acting on one observable of a distribution.
#[derive(Debug, Clone, PartialEq)]
pub struct Systematic {
    name: String,
    kind: SystematicKind,
    transform_obs: String,
    distribution_obs: Vec<String>,
}

impl Systematic {
    pub fn new(name: &str, kind: SystematicKind, transform_obs: &str) -> Self {
        Self {
            name: name.to_string(),
            kind,
            transform_obs: transform_obs.to_string(),
            distribution_obs: Vec::new(),
        }
    }

    pub fn scale(name: &str, param: &str, transform_obs: &str) -> Self {
        Self::new(
            name,
            SystematicKind::Scale {
                param: param.to_string(),
            },
            transform_obs,
        )
    }

    pub fn shift(name: &str, param: &str, transform_obs: &str) -> Self {
        Self::new(
            name,
            SystematicKind::Shift {
                param: param.to_string(),
            },
            transform_obs,
        )
    }

    pub fn convolution(name: &str, mean: &str, sigma: &str, transform_obs: &str) -> Self {
        Self::new(
            name,
            SystematicKind::Convolution {
                mean: mean.to_string(),
                sigma: sigma.to_string(),
            },
            transform_obs,
        )
    }

    /// Pins the full observable list of the distributions this systematic may
    /// be applied to. Applying it to anything else is an error.
    pub fn with_distribution_obs(mut self, observables: Vec<String>) -> Self {
        self.distribution_obs = observables;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &SystematicKind {
        &self.kind
    }

    pub fn transform_obs(&self) -> &str {
        &self.transform_obs
    }

    pub fn distribution_obs(&self) -> &[String] {
        &self.distribution_obs
    }

    pub fn parameter_names(&self) -> Vec<String> {
        match &self.kind {
            SystematicKind::Scale { param } | SystematicKind::Shift { param } => {
                vec![param.clone()]
            }
            SystematicKind::Convolution { mean, sigma } => vec![mean.clone(), sigma.clone()],
        }
    }

    /// Response matrix `R[to][from]` over the bins of `axis` for the given
    /// parameter values.
    pub fn response_matrix(&self, axis: &BinAxis, params: &ParameterDict) -> Result<Vec<Vec<f64>>> {
        let n = axis.nbins();
        let mut response = vec![vec![0.0; n]; n];
        match &self.kind {
            SystematicKind::Scale { param } => {
                let p = require(params, param)?;
                for from in 0..n {
                    let (a, b) = (p * axis.low_edge(from), p * axis.high_edge(from));
                    spread_interval(axis, a.min(b), a.max(b), from, &mut response);
                }
            }
            SystematicKind::Shift { param } => {
                let p = require(params, param)?;
                for from in 0..n {
                    spread_interval(
                        axis,
                        axis.low_edge(from) + p,
                        axis.high_edge(from) + p,
                        from,
                        &mut response,
                    );
                }
            }
            SystematicKind::Convolution { mean, sigma } => {
                let mu = require(params, mean)?;
                let s = require(params, sigma)?;
                if s < 0.0 || !s.is_finite() {
                    return Err(FitError::Config(format!(
                        "systematic '{}': smearing width must be >= 0, got {s}",
                        self.name
                    )));
                }
                for from in 0..n {
                    if s == 0.0 {
                        spread_interval(
                            axis,
                            axis.low_edge(from) + mu,
                            axis.high_edge(from) + mu,
                            from,
                            &mut response,
                        );
                        continue;
                    }
                    let centre = axis.center(from) + mu;
                    for (to, row) in response.iter_mut().enumerate() {
                        let w = normal_cdf((axis.high_edge(to) - centre) / s)
                            - normal_cdf((axis.low_edge(to) - centre) / s);
                        row[from] = w;
                    }
                }
            }
        }
        Ok(response)
    }

    /// Returns the transformed copy of `dist`. `dist` itself is never modified.
    pub fn apply(
        &self,
        dist: &BinnedDistribution,
        params: &ParameterDict,
    ) -> Result<BinnedDistribution> {
        let expected_obs = self.distribution_obs.as_slice();
        if !expected_obs.is_empty() && dist.observables() != expected_obs {
            return Err(FitError::DimensionMismatch(format!(
                "systematic '{}' expects observables {:?}, distribution '{}' has {:?}",
                self.name,
                self.distribution_obs,
                dist.name(),
                dist.observables()
            )));
        }
        let dim = dist.observable_index(&self.transform_obs)?;
        let axes = dist.axes().axes();
        let axis = &axes[dim];
        let response = self.response_matrix(axis, params)?;

        let nb = axis.nbins();
        let stride: usize = axes[dim + 1..].iter().map(BinAxis::nbins).product();

        let mut out = dist.clone();
        out.clear();
        let mut transformed = vec![0.0; dist.n_bins()];
        for (flat, &content) in dist.contents().iter().enumerate() {
            if content == 0.0 {
                continue;
            }
            let from = (flat / stride) % nb;
            let base = flat - from * stride;
            for (to, row) in response.iter().enumerate() {
                let w = row[from];
                if w != 0.0 {
                    transformed[base + to * stride] += w * content;
                }
            }
        }
        for (i, value) in transformed.into_iter().enumerate() {
            out.set_bin_content(i, value)?;
        }
        Ok(out)
    }
}

fn normal_cdf(z: f64) -> f64 {
    0.5 * (1.0 + erf(z / SQRT_2))
}

/// Distributes unit content of bin `from`, mapped onto `[a, b]`, over the bins
/// of `axis` in proportion to the overlap.
fn spread_interval(axis: &BinAxis, a: f64, b: f64, from: usize, response: &mut [Vec<f64>]) {
    let width = b - a;
    if width <= MIN_IMAGE_WIDTH {
        if let Some(to) = axis.find_bin(a) {
            response[to][from] += 1.0;
        }
        return;
    }
    for (to, row) in response.iter_mut().enumerate() {
        let overlap = b.min(axis.high_edge(to)) - a.max(axis.low_edge(to));
        if overlap > 0.0 {
            row[from] += overlap / width;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::axis::AxisCollection;
    use approx::assert_abs_diff_eq;

    fn energy_axis() -> AxisCollection {
        AxisCollection::from_axes(vec![BinAxis::new("energy", 0.0, 10.0, 10).unwrap()]).unwrap()
    }

    fn two_dim() -> BinnedDistribution {
        let axes = AxisCollection::from_axes(vec![
            BinAxis::new("r", 0.0, 2.0, 2).unwrap(),
            BinAxis::new("energy", 0.0, 4.0, 4).unwrap(),
        ])
        .unwrap();
        BinnedDistribution::from_contents(
            "d",
            axes,
            vec![1.0, 2.0, 3.0, 0.0, 4.0, 0.0, 0.0, 0.0],
        )
        .unwrap()
    }

    fn dict(pairs: &[(&str, f64)]) -> ParameterDict {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn nominal_values_are_identity() {
        let dist = two_dim();
        let scale = Systematic::scale("s", "e_scale", "energy");
        let shift = Systematic::shift("t", "e_shift", "energy");
        let params = dict(&[("e_scale", 1.0), ("e_shift", 0.0)]);
        assert_eq!(scale.apply(&dist, &params).unwrap(), dist);
        assert_eq!(shift.apply(&dist, &params).unwrap(), dist);
    }

    #[test]
    fn scale_stretches_content() {
        let dist = BinnedDistribution::from_contents(
            "d",
            energy_axis(),
            vec![0.0, 0.0, 10.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0],
        )
        .unwrap();
        // [2, 3) -> [3, 4.5)
        let out = Systematic::scale("s", "k", "energy")
            .apply(&dist, &dict(&[("k", 1.5)]))
            .unwrap();
        assert_abs_diff_eq!(out.contents()[3], 10.0 / 1.5, epsilon = 1e-12);
        assert_abs_diff_eq!(out.contents()[4], 5.0 / 1.5, epsilon = 1e-12);
        assert_abs_diff_eq!(out.integral(), 10.0, epsilon = 1e-12);
    }

    #[test]
    fn shift_out_of_range_loses_content() {
        let dist = BinnedDistribution::from_contents(
            "d",
            energy_axis(),
            vec![0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 4.0],
        )
        .unwrap();
        let out = Systematic::shift("t", "dx", "energy")
            .apply(&dist, &dict(&[("dx", 0.25)]))
            .unwrap();
        assert_abs_diff_eq!(out.contents()[9], 3.0, epsilon = 1e-12);
        assert_abs_diff_eq!(out.integral(), 3.0, epsilon = 1e-12);
    }

    #[test]
    fn shift_acts_along_named_axis_only() {
        let dist = two_dim();
        let out = Systematic::shift("t", "dx", "energy")
            .apply(&dist, &dict(&[("dx", 1.0)]))
            .unwrap();
        assert_eq!(out.contents(), &[0.0, 1.0, 2.0, 3.0, 0.0, 4.0, 0.0, 0.0]);
    }

    #[test]
    fn convolution_conserves_content_away_from_edges() {
        let mut contents = vec![0.0; 10];
        contents[5] = 100.0;
        let dist = BinnedDistribution::from_contents("d", energy_axis(), contents).unwrap();
        let out = Systematic::convolution("res", "mu", "sigma", "energy")
            .apply(&dist, &dict(&[("mu", 0.0), ("sigma", 0.5)]))
            .unwrap();
        assert_abs_diff_eq!(out.integral(), 100.0, epsilon = 1e-6);
        // Symmetric around the original bin.
        assert_abs_diff_eq!(out.contents()[4], out.contents()[6], epsilon = 1e-9);
        assert!(out.contents()[5] > out.contents()[4]);
        // |z| < 1 covers ~68% of the kernel: bin 5 spans +-0.5 = +-1 sigma.
        assert_abs_diff_eq!(out.contents()[5], 68.2689, epsilon = 1e-3);
    }

    #[test]
    fn zero_width_convolution_is_a_shift() {
        let dist = two_dim();
        let smeared = Systematic::convolution("res", "mu", "sigma", "energy")
            .apply(&dist, &dict(&[("mu", 1.0), ("sigma", 0.0)]))
            .unwrap();
        let shifted = Systematic::shift("t", "dx", "energy")
            .apply(&dist, &dict(&[("dx", 1.0)]))
            .unwrap();
        assert_eq!(smeared.contents(), shifted.contents());
    }

    #[test]
    fn negative_width_rejected() {
        let dist = two_dim();
        let res = Systematic::convolution("res", "mu", "sigma", "energy")
            .apply(&dist, &dict(&[("mu", 0.0), ("sigma", -1.0)]));
        assert!(matches!(res, Err(FitError::Config(_))));
    }

    #[test]
    fn missing_parameter_and_observable() {
        let dist = two_dim();
        assert!(matches!(
            Systematic::scale("s", "k", "energy").apply(&dist, &ParameterDict::new()),
            Err(FitError::MissingParameter(_))
        ));
        assert!(matches!(
            Systematic::scale("s", "k", "time").apply(&dist, &dict(&[("k", 1.0)])),
            Err(FitError::UnknownObservable(_))
        ));
    }

    #[test]
    fn distribution_obs_are_enforced() {
        let dist = two_dim();
        let syst = Systematic::scale("s", "k", "energy")
            .with_distribution_obs(vec!["energy".into(), "r".into()]);
        assert!(matches!(
            syst.apply(&dist, &dict(&[("k", 1.0)])),
            Err(FitError::DimensionMismatch(_))
        ));
    }

    #[test]
    fn template_is_untouched() {
        let dist = two_dim();
        let before = dist.clone();
        let _ = Systematic::shift("t", "dx", "energy")
            .apply(&dist, &dict(&[("dx", 0.3)]))
            .unwrap();
        assert_eq!(dist, before);
    }
}
