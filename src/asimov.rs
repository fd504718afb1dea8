/*!
Expected ("Asimov") and fake data sets.

An Asimov data set is the sum of all templates, each scaled to the number of
events it is expected to contribute:

```text
expected events = live_time * rate * (selected / generated)
```

A template binned from `n_generated` simulated events is therefore scaled by
`live_time * rate / n_generated`. [`poisson_fluctuate`] turns an expectation
into one pseudo-experiment.
*/

use log::{debug, info, warn};
use rand::Rng;
use rand_distr::{Distribution, Poisson};

use crate::binned::BinnedDistribution;
use crate::error::{FitError, Result};
use crate::params::ParameterDict;

/// Factor turning a template binned from `n_generated` simulated events into
/// expected counts. Zero when nothing was generated.
pub fn expected_scale(live_time: f64, rate: f64, n_generated: f64) -> f64 {
    if n_generated <= 0.0 {
        return 0.0;
    }
    live_time * rate / n_generated
}

/// Scales `dist` so its integral becomes `target`. Returns `false` and leaves
/// the content unchanged if the current integral is zero or not finite.
pub fn rescale_to_integral(dist: &mut BinnedDistribution, target: f64) -> bool {
    let integral = dist.integral();
    if integral == 0.0 || !integral.is_finite() {
        return false;
    }
    dist.scale(target / integral);
    true
}

/// One Poisson draw per bin around the bin content. Bins with a non-positive
/// or non-finite expectation stay empty.
pub fn poisson_fluctuate<R: Rng>(
    dist: &BinnedDistribution,
    rng: &mut R,
) -> Result<BinnedDistribution> {
    let mut fake = dist.clone();
    fake.clear();
    for (i, &mu) in dist.contents().iter().enumerate() {
        if !(mu > 0.0 && mu.is_finite()) {
            continue;
        }
        if let Ok(poisson) = Poisson::new(mu) {
            let n: f64 = poisson.sample(rng);
            fake.set_bin_content(i, n)?;
        }
    }
    Ok(fake)
}

#[derive(Debug, Clone)]
struct Component {
    template: BinnedDistribution,
    rate: f64,
    n_generated: f64,
    shape: Option<BinnedDistribution>,
}

/// Builds an Asimov data set from templates and their rates.
#[derive(Debug, Clone)]
pub struct AsimovBuilder {
    live_time: f64,
    n_gen_scale: f64,
    components: Vec<Component>,
}

/// The summed expectation and the expected event count of each component.
#[derive(Debug, Clone, PartialEq)]
pub struct AsimovDataSet {
    pub distribution: BinnedDistribution,
    pub expected_counts: ParameterDict,
}

impl AsimovBuilder {
    pub fn new(live_time: f64) -> Self {
        Self {
            live_time,
            n_gen_scale: 1.0,
            components: Vec::new(),
        }
    }

    /// Multiplies every generated count, e.g. `0.5` when the simulation was
    /// split in halves.
    pub fn set_n_gen_scale(mut self, scale: f64) -> Self {
        self.n_gen_scale = scale;
        self
    }

    /// Adds a template binned from `n_generated` simulated events with a rate
    /// per unit live time.
    pub fn add(&mut self, template: BinnedDistribution, rate: f64, n_generated: f64) {
        self.components.push(Component {
            template,
            rate,
            n_generated,
            shape: None,
        });
    }

    /// Like [`AsimovBuilder::add`], but the expectation takes the binning and
    /// shape of `shape`. The count still comes from `template`.
    pub fn add_with_shape(
        &mut self,
        template: BinnedDistribution,
        shape: BinnedDistribution,
        rate: f64,
        n_generated: f64,
    ) {
        self.components.push(Component {
            template,
            rate,
            n_generated,
            shape: Some(shape),
        });
    }

    /// Sums the scaled components. Components with zero rate, with an empty
    /// or non-finite expectation are skipped. The first kept component fixes
    /// the binning, all others must share it.
    pub fn build(&self, name: &str) -> Result<AsimovDataSet> {
        let mut total: Option<BinnedDistribution> = None;
        let mut expected_counts = ParameterDict::new();

        for c in &self.components {
            let cname = c.template.name();
            if c.rate == 0.0 {
                debug!("skipping '{cname}': zero rate");
                continue;
            }
            let scale = expected_scale(self.live_time, c.rate, c.n_generated * self.n_gen_scale);
            let mut expected = c.template.scaled(scale);
            let count = expected.integral();
            if !count.is_finite() {
                warn!("skipping '{cname}': expected count is {count}");
                continue;
            }
            if count == 0.0 {
                info!("skipping '{cname}': no expected events");
                continue;
            }
            if let Some(shape) = &c.shape {
                expected = shape.clone();
                if !rescale_to_integral(&mut expected, count) {
                    warn!("skipping '{cname}': shape template is empty");
                    continue;
                }
            }
            debug!("adding {count} events of '{cname}'");

            match total.as_mut() {
                None => {
                    let mut first = expected;
                    first.set_name(name);
                    total = Some(first);
                }
                Some(sum) => sum.add(&expected).map_err(|_| {
                    FitError::AxesMismatch(format!("component '{cname}' has a different binning"))
                })?,
            }
            expected_counts.insert(cname.to_string(), count);
        }

        let distribution = total.ok_or_else(|| {
            FitError::NotConfigured("no component contributes to the Asimov data set".into())
        })?;
        Ok(AsimovDataSet {
            distribution,
            expected_counts,
        })
    }
}

/// Sum of `templates`, template `i` scaled by `weights[i]`.
pub fn sum_scaled(
    templates: &[BinnedDistribution],
    weights: &[f64],
    name: &str,
) -> Result<BinnedDistribution> {
    if templates.len() != weights.len() {
        return Err(FitError::DimensionMismatch(format!(
            "{} templates but {} weights",
            templates.len(),
            weights.len()
        )));
    }
    let (first, rest) = templates
        .split_first()
        .ok_or_else(|| FitError::NotConfigured("no templates to sum".into()))?;
    let mut sum = first.scaled(weights[0]);
    sum.set_name(name);
    for (t, &w) in rest.iter().zip(&weights[1..]) {
        sum.add(&t.scaled(w))?;
    }
    Ok(sum)
}
