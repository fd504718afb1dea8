/*!
Binned Poisson negative log-likelihood.

[`BinnedNllh`] compares a fixed observed distribution against the expectation

```text
mu = S_k( ... S_1( sum_i v_i * template_i ) )
```

built from the registered templates (one fit parameter `v_i` per template, named
like the template) and the registered systematics `S_k`, applied in registration
order. The statistic is

```text
NLLH = sum_bins [ mu_b - n_b ln mu_b ] + sum_constraints 0.5 * ((v - mean) / sigma)^2
```

(the constant `ln n_b!` is dropped).

Degenerate bins: a bin with `n_b = 0` contributes `mu_b`, i.e. `0 ln 0 = 0`. A bin
with `n_b > 0` whose expectation is not positive (or not finite) is evaluated at the
floor [`MODEL_FLOOR`], a large but finite penalty.

Buffers exclude the outermost bins of a dimension from the sum. They let systematics
move content in from beyond the fit range. With overflow buffers the excluded bins
are folded into the nearest kept bin instead.
*/

use log::{debug, warn};
use std::collections::{BTreeMap, BTreeSet};

use crate::binned::BinnedDistribution;
use crate::dataset::DataSet;
use crate::error::{FitError, Result};
use crate::objective::Objective;
use crate::params::{from_slice, require, ParameterDict};
use crate::systematic::Systematic;

/// Expectation used for bins with observed events but no positive prediction.
pub const MODEL_FLOOR: f64 = 1e-10;

#[derive(Debug, Clone, Copy, PartialEq)]
struct Constraint {
    mean: f64,
    sigma: f64,
}

/// Binned negative log-likelihood over templates, data, systematics and
/// Gaussian constraints.
#[derive(Debug, Clone, Default)]
pub struct BinnedNllh {
    pdfs: Vec<BinnedDistribution>,
    data: Option<BinnedDistribution>,
    systematics: Vec<Systematic>,
    constraints: BTreeMap<String, Constraint>,
    buffers: BTreeMap<String, (usize, usize)>,
    buffer_as_overflow: bool,
    parameters: ParameterDict,
    /// Sorted template and systematic parameter names.
    names: Vec<String>,
    /// Full-grid bin -> bin entering the sum, `None` for dropped buffer bins.
    bin_map: Vec<Option<usize>>,
}

impl BinnedNllh {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers templates. Each template's name is the name of the fit
    /// parameter scaling it.
    pub fn add_pdfs(&mut self, pdfs: Vec<BinnedDistribution>) -> Result<()> {
        for pdf in pdfs {
            self.add_pdf(pdf)?;
        }
        Ok(())
    }

    pub fn add_pdf(&mut self, pdf: BinnedDistribution) -> Result<()> {
        if self.pdfs.iter().any(|p| p.name() == pdf.name()) {
            return Err(FitError::Config(format!(
                "template '{}' registered twice",
                pdf.name()
            )));
        }
        if let Some(reference) = self.reference() {
            if !reference.axes().same_binning(pdf.axes()) {
                return Err(FitError::AxesMismatch(format!(
                    "template '{}' does not share the binning of '{}'",
                    pdf.name(),
                    reference.name()
                )));
            }
            if reference.observables() != pdf.observables() {
                return Err(FitError::AxesMismatch(format!(
                    "template '{}' has observables {:?}, expected {:?}",
                    pdf.name(),
                    pdf.observables(),
                    reference.observables()
                )));
            }
        }
        self.pdfs.push(pdf);
        self.refresh_names();
        Ok(())
    }

    fn refresh_names(&mut self) {
        let names: BTreeSet<String> = self
            .pdfs
            .iter()
            .map(|p| p.name().to_string())
            .chain(self.systematics.iter().flat_map(Systematic::parameter_names))
            .collect();
        self.names = names.into_iter().collect();
    }

    pub fn pdfs(&self) -> &[BinnedDistribution] {
        &self.pdfs
    }

    fn reference(&self) -> Option<&BinnedDistribution> {
        self.data.as_ref().or_else(|| self.pdfs.first())
    }

    /// Sets the observed distribution. It can be set only once; a call that
    /// fails leaves the likelihood without data.
    pub fn set_data_dist(&mut self, data: BinnedDistribution) -> Result<()> {
        if self.data.is_some() {
            return Err(FitError::DataAlreadySet);
        }
        if let Some(pdf) = self.pdfs.first() {
            if !pdf.axes().same_binning(data.axes()) {
                return Err(FitError::AxesMismatch(format!(
                    "data '{}' does not share the binning of template '{}'",
                    data.name(),
                    pdf.name()
                )));
            }
            if pdf.observables() != data.observables() {
                return Err(FitError::AxesMismatch(format!(
                    "data has observables {:?}, templates have {:?}",
                    data.observables(),
                    pdf.observables()
                )));
            }
        }
        let bin_map = self.bin_map_for(&data)?;
        self.data = Some(data);
        self.bin_map = bin_map;
        Ok(())
    }

    /// Bins `events` passing `cut` on the templates' grid and uses the result
    /// as the observed distribution. Templates must be registered first.
    pub fn set_data_set<D, C>(&mut self, events: &D, cut: C) -> Result<()>
    where
        D: DataSet + ?Sized,
        C: Fn(&[f64]) -> bool,
    {
        let template = self.pdfs.first().ok_or_else(|| {
            FitError::NotConfigured("templates must be added before binning a data set".into())
        })?;
        let mut data = BinnedDistribution::new("data", template.axes().clone());
        data.set_observables(template.observables().to_vec())?;
        data.fill_from(events, cut)?;
        self.set_data_dist(data)
    }

    pub fn data(&self) -> Option<&BinnedDistribution> {
        self.data.as_ref()
    }

    /// Adds a Gaussian penalty on parameter `name`. It only takes effect if
    /// `name` is a template or systematic parameter.
    pub fn set_constraint(&mut self, name: &str, mean: f64, sigma: f64) -> Result<()> {
        if !(sigma > 0.0) || !sigma.is_finite() || !mean.is_finite() {
            return Err(FitError::Config(format!(
                "constraint on '{name}' needs finite mean and sigma > 0, got ({mean}, {sigma})"
            )));
        }
        self.constraints
            .insert(name.to_string(), Constraint { mean, sigma });
        Ok(())
    }

    pub fn add_systematic(&mut self, systematic: Systematic) {
        self.systematics.push(systematic);
        self.refresh_names();
    }

    pub fn systematics(&self) -> &[Systematic] {
        &self.systematics
    }

    /// Excludes the first `lower` and last `upper` bins of observable `name`
    /// from the likelihood sum.
    pub fn set_buffer(&mut self, name: &str, lower: usize, upper: usize) -> Result<()> {
        let previous = self.buffers.insert(name.to_string(), (lower, upper));
        if let Err(e) = self.rebuild_bin_map() {
            match previous {
                Some(p) => self.buffers.insert(name.to_string(), p),
                None => self.buffers.remove(name),
            };
            self.rebuild_bin_map()?;
            return Err(e);
        }
        Ok(())
    }

    pub fn remove_buffer(&mut self, name: &str) -> Result<()> {
        if self.buffers.remove(name).is_some() {
            self.rebuild_bin_map()?;
        }
        Ok(())
    }

    /// Folds buffer bins into the nearest kept bin instead of dropping them.
    pub fn set_buffer_as_overflow(&mut self, overflow: bool) -> Result<()> {
        self.buffer_as_overflow = overflow;
        self.rebuild_bin_map()
    }

    /// Sorted names of all fit parameters: template names and systematic
    /// parameters.
    pub fn parameter_names(&self) -> Vec<String> {
        self.names.clone()
    }

    /// Sets the current parameter values. Every fit parameter must be present.
    pub fn set_parameters(&mut self, values: ParameterDict) -> Result<()> {
        for name in &self.names {
            require(&values, name)?;
        }
        self.parameters = values;
        Ok(())
    }

    pub fn parameters(&self) -> &ParameterDict {
        &self.parameters
    }

    /// Likelihood at the current parameters.
    pub fn evaluate(&self) -> Result<f64> {
        self.evaluate_at(&self.parameters)
    }

    /// Expected distribution for `params`: scaled templates summed, then the
    /// systematics applied. Buffers are not applied.
    pub fn expected(&self, params: &ParameterDict) -> Result<BinnedDistribution> {
        let first = self
            .pdfs
            .first()
            .ok_or_else(|| FitError::NotConfigured("no templates registered".into()))?;
        let mut model = first.clone();
        model.set_name("expected");
        model.clear();
        for pdf in &self.pdfs {
            let v = require(params, pdf.name())?;
            if v == 0.0 {
                continue;
            }
            model.add_scaled(pdf, v)?;
        }
        for syst in &self.systematics {
            model = syst.apply(&model, params)?;
        }
        Ok(model)
    }

    /// Every template scaled by its parameter value in `params`, i.e. the
    /// contribution of each template to the expectation before systematics.
    /// For normalised templates these are the fitted event counts per bin.
    pub fn scaled_templates(&self, params: &ParameterDict) -> Result<Vec<BinnedDistribution>> {
        self.pdfs
            .iter()
            .map(|pdf| Ok(pdf.scaled(require(params, pdf.name())?)))
            .collect()
    }

    /// Likelihood at `params`.
    pub fn evaluate_at(&self, params: &ParameterDict) -> Result<f64> {
        let data = self
            .data
            .as_ref()
            .ok_or_else(|| FitError::NotConfigured("data distribution not set".into()))?;
        let model = self.expected(params)?;

        let nllh = if self.buffers.is_empty() {
            data.contents()
                .iter()
                .zip(model.contents())
                .map(|(&n, &mu)| bin_nllh(n, mu))
                .sum::<f64>()
        } else {
            let kept = self.bin_map.iter().filter_map(|b| *b).max().map_or(0, |m| m + 1);
            let mut n_sum = vec![0.0; kept];
            let mut mu_sum = vec![0.0; kept];
            let bins = self.bin_map.iter().zip(data.contents()).zip(model.contents());
            for ((target, &n), &mu) in bins {
                if let Some(t) = *target {
                    n_sum[t] += n;
                    mu_sum[t] += mu;
                }
            }
            n_sum
                .iter()
                .zip(mu_sum.iter())
                .map(|(&n, &mu)| bin_nllh(n, mu))
                .sum::<f64>()
        };

        Ok(nllh + self.constraint_penalty(params)?)
    }

    /// Sum of the Gaussian penalties of all active constraints.
    pub fn constraint_penalty(&self, params: &ParameterDict) -> Result<f64> {
        let mut penalty = 0.0;
        for (name, c) in &self.constraints {
            if self.names.binary_search(name).is_err() {
                debug!("constraint on '{name}' ignored: not a fit parameter");
                continue;
            }
            let v = require(params, name)?;
            let z = (v - c.mean) / c.sigma;
            penalty += 0.5 * z * z;
        }
        Ok(penalty)
    }

    fn rebuild_bin_map(&mut self) -> Result<()> {
        let map = match self.reference() {
            Some(reference) => self.bin_map_for(reference)?,
            None => Vec::new(),
        };
        self.bin_map = map;
        Ok(())
    }

    /// Bin map of the current buffers over the grid of `reference`. Empty
    /// when no buffers are set.
    fn bin_map_for(&self, reference: &BinnedDistribution) -> Result<Vec<Option<usize>>> {
        if self.buffers.is_empty() {
            return Ok(Vec::new());
        }

        let axes = reference.axes().clone();
        let mut limits: Vec<(usize, usize)> =
            axes.axes().iter().map(|a| (0, a.nbins())).collect();
        for (name, &(lower, upper)) in &self.buffers {
            let dim = reference.observable_index(name)?;
            let nbins = axes.axes()[dim].nbins();
            if lower + upper >= nbins {
                return Err(FitError::Config(format!(
                    "buffer ({lower}, {upper}) on '{name}' leaves no bins out of {nbins}"
                )));
            }
            limits[dim] = (lower, nbins - upper);
        }

        // Kept bins are renumbered row-major over the reduced grid.
        let kept_sizes: Vec<usize> = limits.iter().map(|(lo, hi)| hi - lo).collect();
        let mut map = Vec::with_capacity(axes.n_bins());
        for flat in 0..axes.n_bins() {
            let coords = axes.unflatten_index(flat)?;
            let mut target = 0;
            let mut inside = true;
            let dims = coords.iter().zip(limits.iter()).zip(kept_sizes.iter());
            for ((&c, &(lo, hi)), &size) in dims {
                let local = if c < lo {
                    inside = false;
                    0
                } else if c >= hi {
                    inside = false;
                    size - 1
                } else {
                    c - lo
                };
                target = target * size + local;
            }
            map.push(if inside || self.buffer_as_overflow {
                Some(target)
            } else {
                None
            });
        }
        Ok(map)
    }

    /// Checks that the likelihood can be evaluated.
    pub fn validate(&self) -> Result<()> {
        if self.pdfs.is_empty() {
            return Err(FitError::NotConfigured("no templates registered".into()));
        }
        if self.data.is_none() {
            return Err(FitError::NotConfigured("data distribution not set".into()));
        }
        let pdf = &self.pdfs[0];
        for name in self.buffers.keys() {
            pdf.observable_index(name)?;
        }
        if !self.buffers.is_empty() && self.bin_map.len() != pdf.n_bins() {
            return Err(FitError::NotConfigured("buffers have not been applied".into()));
        }
        for syst in &self.systematics {
            pdf.observable_index(syst.transform_obs())?;
            let expected_obs = syst.distribution_obs();
            if !expected_obs.is_empty() && expected_obs != pdf.observables() {
                return Err(FitError::AxesMismatch(format!(
                    "systematic '{}' expects observables {:?}",
                    syst.name(),
                    syst.distribution_obs()
                )));
            }
        }
        Ok(())
    }
}

/// Contribution of one bin with `n` observed and `mu` expected events.
pub fn bin_nllh(n: f64, mu: f64) -> f64 {
    if n == 0.0 {
        return if mu.is_finite() { mu.max(0.0) } else { mu };
    }
    let mu = if mu > 0.0 && mu.is_finite() { mu } else { MODEL_FLOOR };
    mu - n * mu.ln()
}

impl Objective for BinnedNllh {
    fn parameter_names(&self) -> Vec<String> {
        BinnedNllh::parameter_names(self)
    }

    fn evaluate(&self, x: &[f64]) -> f64 {
        let params = from_slice(&self.names, x);
        match self.evaluate_at(&params) {
            Ok(v) => v,
            Err(e) => {
                warn!("likelihood evaluation failed: {e}");
                f64::NAN
            }
        }
    }

    fn validate(&self) -> Result<()> {
        BinnedNllh::validate(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::axis::{AxisCollection, BinAxis};
    use crate::dataset::EventTable;
    use approx::assert_abs_diff_eq;

    fn axis3() -> AxisCollection {
        AxisCollection::from_axes(vec![BinAxis::new("energy", 0.0, 3.0, 3).unwrap()]).unwrap()
    }

    fn dist(name: &str, contents: Vec<f64>) -> BinnedDistribution {
        BinnedDistribution::from_contents(name, axis3(), contents).unwrap()
    }

    fn dict(pairs: &[(&str, f64)]) -> ParameterDict {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    fn sig_bkg() -> BinnedNllh {
        let mut lh = BinnedNllh::new();
        lh.add_pdfs(vec![
            dist("sig", vec![10.0, 20.0, 10.0]),
            dist("bkg", vec![5.0, 5.0, 5.0]),
        ])
        .unwrap();
        lh.set_data_dist(dist("data", vec![16.0, 24.0, 14.0])).unwrap();
        lh
    }

    fn poisson_nllh(n: &[f64], mu: &[f64]) -> f64 {
        n.iter().zip(mu).map(|(n, mu)| mu - n * mu.ln()).sum()
    }

    #[test]
    fn evaluates_poisson_sum() {
        let lh = sig_bkg();
        let v = lh.evaluate_at(&dict(&[("sig", 1.0), ("bkg", 1.2)])).unwrap();
        let expected = poisson_nllh(&[16.0, 24.0, 14.0], &[16.0, 26.0, 16.0]);
        assert_abs_diff_eq!(v, expected, epsilon = 1e-12);
    }

    #[test]
    fn parameter_names_are_sorted_union() {
        let mut lh = sig_bkg();
        lh.add_systematic(Systematic::convolution("res", "res_mu", "res_sigma", "energy"));
        assert_eq!(lh.parameter_names(), vec!["bkg", "res_mu", "res_sigma", "sig"]);
    }

    #[test]
    fn evaluate_needs_data() {
        let mut lh = BinnedNllh::new();
        lh.add_pdf(dist("sig", vec![1.0, 1.0, 1.0])).unwrap();
        assert!(matches!(
            lh.evaluate_at(&dict(&[("sig", 1.0)])),
            Err(FitError::NotConfigured(_))
        ));
        assert!(lh.validate().is_err());
    }

    #[test]
    fn data_is_set_once() {
        let mut lh = sig_bkg();
        assert!(matches!(
            lh.set_data_dist(dist("data", vec![1.0, 1.0, 1.0])),
            Err(FitError::DataAlreadySet)
        ));
    }

    #[test]
    fn mismatched_axes_rejected() {
        let mut lh = sig_bkg();
        let other = BinnedDistribution::new(
            "other",
            AxisCollection::from_axes(vec![BinAxis::new("energy", 0.0, 3.0, 4).unwrap()]).unwrap(),
        );
        assert!(matches!(lh.add_pdf(other), Err(FitError::AxesMismatch(_))));
        assert!(matches!(
            lh.add_pdf(dist("sig", vec![0.0; 3])),
            Err(FitError::Config(_))
        ));
    }

    #[test]
    fn constraint_adds_half_k_squared() {
        let base = sig_bkg();
        let mut constrained = sig_bkg();
        constrained.set_constraint("bkg", 1.0, 0.1).unwrap();

        for k in [0.0, 1.0, -2.0, 3.5] {
            let params = dict(&[("sig", 1.0), ("bkg", 1.0 + k * 0.1)]);
            let diff =
                constrained.evaluate_at(&params).unwrap() - base.evaluate_at(&params).unwrap();
            assert_abs_diff_eq!(diff, 0.5 * k * k, epsilon = 1e-9);
        }
    }

    #[test]
    fn constraint_on_unknown_parameter_is_ignored() {
        let mut lh = sig_bkg();
        lh.set_constraint("nonexistent", 0.0, 1.0).unwrap();
        let params = dict(&[("sig", 1.0), ("bkg", 1.0), ("nonexistent", 10.0)]);
        assert_abs_diff_eq!(
            lh.evaluate_at(&params).unwrap(),
            sig_bkg().evaluate_at(&params).unwrap(),
            epsilon = 1e-12
        );
        assert!(lh.set_constraint("bkg", 1.0, 0.0).is_err());
    }

    #[test]
    fn degenerate_bins_follow_policy() {
        assert_eq!(bin_nllh(0.0, 0.0), 0.0);
        assert_eq!(bin_nllh(0.0, 2.5), 2.5);
        let penalty = MODEL_FLOOR - 3.0 * MODEL_FLOOR.ln();
        assert_abs_diff_eq!(bin_nllh(3.0, 0.0), penalty, epsilon = 1e-9);
        assert_abs_diff_eq!(bin_nllh(3.0, -1.0), penalty, epsilon = 1e-9);
        assert!(bin_nllh(3.0, 0.0).is_finite());
    }

    #[test]
    fn empty_template_contributes_nothing() {
        let mut lh = BinnedNllh::new();
        lh.add_pdfs(vec![
            dist("sig", vec![1.0, 2.0, 1.0]),
            dist("empty", vec![0.0, 0.0, 0.0]),
        ])
        .unwrap();
        lh.set_data_dist(dist("data", vec![1.0, 2.0, 1.0])).unwrap();
        let a = lh.evaluate_at(&dict(&[("sig", 1.0), ("empty", 0.0)])).unwrap();
        let b = lh.evaluate_at(&dict(&[("sig", 1.0), ("empty", 50.0)])).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn systematic_acts_on_summed_model() {
        let mut lh = sig_bkg();
        lh.add_systematic(Systematic::shift("e_shift", "dx", "energy"));
        let params = dict(&[("sig", 1.0), ("bkg", 1.2), ("dx", 1.0)]);
        let model = lh.expected(&params).unwrap();
        assert_eq!(model.contents(), &[0.0, 16.0, 26.0]);
        let v = lh.evaluate_at(&params).unwrap();
        let expected = poisson_nllh(&[24.0, 14.0], &[16.0, 26.0]) + bin_nllh(16.0, 0.0);
        assert_abs_diff_eq!(v, expected, epsilon = 1e-9);
        assert_eq!(lh.pdfs()[0].contents(), &[10.0, 20.0, 10.0]);
    }

    #[test]
    fn buffers_drop_edge_bins() {
        let mut lh = sig_bkg();
        lh.set_buffer("energy", 1, 0).unwrap();
        let params = dict(&[("sig", 1.0), ("bkg", 1.2)]);
        let v = lh.evaluate_at(&params).unwrap();
        let expected = poisson_nllh(&[24.0, 14.0], &[26.0, 16.0]);
        assert_abs_diff_eq!(v, expected, epsilon = 1e-12);
    }

    #[test]
    fn overflow_buffers_fold_into_edge_bins() {
        let mut lh = sig_bkg();
        lh.set_buffer("energy", 0, 1).unwrap();
        lh.set_buffer_as_overflow(true).unwrap();
        let params = dict(&[("sig", 1.0), ("bkg", 1.2)]);
        let v = lh.evaluate_at(&params).unwrap();
        let expected = poisson_nllh(&[16.0, 38.0], &[16.0, 42.0]);
        assert_abs_diff_eq!(v, expected, epsilon = 1e-12);
    }

    #[test]
    fn buffer_must_leave_bins() {
        let mut lh = sig_bkg();
        assert!(matches!(lh.set_buffer("energy", 2, 1), Err(FitError::Config(_))));
        assert!(matches!(
            lh.set_buffer("time", 1, 0),
            Err(FitError::UnknownObservable(_))
        ));
    }

    #[test]
    fn failed_data_load_keeps_no_data() {
        let mut lh = BinnedNllh::new();
        lh.set_buffer("time", 1, 0).unwrap();
        lh.add_pdfs(vec![
            dist("sig", vec![10.0, 20.0, 10.0]),
            dist("bkg", vec![5.0, 5.0, 5.0]),
        ])
        .unwrap();
        assert!(lh.validate().is_err());

        let data = dist("data", vec![16.0, 24.0, 14.0]);
        assert!(matches!(
            lh.set_data_dist(data.clone()),
            Err(FitError::UnknownObservable(_))
        ));
        assert!(lh.data().is_none());
        let params = dict(&[("sig", 0.9), ("bkg", 1.2)]);
        assert!(matches!(lh.evaluate_at(&params), Err(FitError::NotConfigured(_))));
        assert!(lh.validate().is_err());

        lh.remove_buffer("time").unwrap();
        lh.set_data_dist(data).unwrap();
        lh.validate().unwrap();
        assert_abs_diff_eq!(
            lh.evaluate_at(&params).unwrap(),
            sig_bkg().evaluate_at(&params).unwrap(),
            epsilon = 1e-12
        );
    }

    #[test]
    fn buffers_set_before_data_are_applied() {
        let mut lh = BinnedNllh::new();
        lh.set_buffer("energy", 1, 0).unwrap();
        lh.add_pdfs(vec![
            dist("sig", vec![10.0, 20.0, 10.0]),
            dist("bkg", vec![5.0, 5.0, 5.0]),
        ])
        .unwrap();
        lh.set_data_dist(dist("data", vec![16.0, 24.0, 14.0])).unwrap();
        lh.validate().unwrap();
        let v = lh.evaluate_at(&dict(&[("sig", 1.0), ("bkg", 1.2)])).unwrap();
        let expected = poisson_nllh(&[24.0, 14.0], &[26.0, 16.0]);
        assert_abs_diff_eq!(v, expected, epsilon = 1e-12);
    }

    #[test]
    fn scaled_templates_sum_to_expectation() {
        let lh = sig_bkg();
        let params = dict(&[("sig", 0.9), ("bkg", 1.2)]);
        let scaled = lh.scaled_templates(&params).unwrap();
        assert_eq!(scaled.len(), 2);
        assert_eq!(scaled[0].name(), "sig");
        for (v, want) in scaled[0].contents().iter().zip([9.0, 18.0, 9.0]) {
            assert_abs_diff_eq!(*v, want, epsilon = 1e-12);
        }
        assert_abs_diff_eq!(scaled[1].integral(), 18.0, epsilon = 1e-12);

        let mut total = scaled[0].clone();
        total.add(&scaled[1]).unwrap();
        assert_eq!(total.contents(), lh.expected(&params).unwrap().contents());
        assert!(matches!(
            lh.scaled_templates(&dict(&[("sig", 1.0)])),
            Err(FitError::MissingParameter(_))
        ));
    }

    #[test]
    fn set_parameters_requires_all() {
        let mut lh = sig_bkg();
        assert!(lh.set_parameters(dict(&[("sig", 1.0)])).is_err());
        lh.set_parameters(dict(&[("sig", 1.0), ("bkg", 1.2)])).unwrap();
        let expected = poisson_nllh(&[16.0, 24.0, 14.0], &[16.0, 26.0, 16.0]);
        assert_abs_diff_eq!(lh.evaluate().unwrap(), expected, epsilon = 1e-12);
    }

    #[test]
    fn objective_uses_sorted_parameter_order() {
        let lh = sig_bkg();
        // ["bkg", "sig"]
        let v = Objective::evaluate(&lh, &[1.2, 1.0]);
        let expected = poisson_nllh(&[16.0, 24.0, 14.0], &[16.0, 26.0, 16.0]);
        assert_abs_diff_eq!(v, expected, epsilon = 1e-12);
    }

    #[test]
    fn data_from_events() {
        let mut events = EventTable::new(vec!["energy".into()]);
        for e in [0.5, 1.5, 1.6, 2.5, 7.0] {
            events.push(vec![e]).unwrap();
        }
        let mut lh = BinnedNllh::new();
        lh.add_pdf(dist("sig", vec![1.0, 1.0, 1.0])).unwrap();
        lh.set_data_set(&events, |ev| ev[0] < 2.0).unwrap();
        assert_eq!(lh.data().unwrap().contents(), &[1.0, 2.0, 0.0]);
    }
}
