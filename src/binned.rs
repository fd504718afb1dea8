/*!
Multi-dimensional binned distributions.

A [`BinnedDistribution`] is a named histogram over an [`AxisCollection`]. The bin
contents are stored densely in one flat vector addressed by the row-major flat index
of the axis collection, so that a likelihood evaluation is a single pass over a slice.

Each axis carries an observable name (by default the axis name). Observables are used
to pick axes by name, e.g. in [`BinnedDistribution::marginalise`].

# Examples

```rust
use bbfit::axis::{AxisCollection, BinAxis};
use bbfit::binned::BinnedDistribution;

let axes = AxisCollection::from_axes(vec![
    BinAxis::new("energy", 0.0, 3.0, 3).unwrap(),
    BinAxis::new("r", 0.0, 2.0, 2).unwrap(),
])
.unwrap();
let mut dist = BinnedDistribution::new("signal", axes);
dist.fill(&[0.5, 1.5], 2.0).unwrap();
dist.fill(&[2.5, 0.5], 1.0).unwrap();
assert_eq!(dist.integral(), 3.0);

let energy = dist.marginalise(&["energy"]).unwrap();
assert_eq!(energy.contents(), &[2.0, 0.0, 1.0]);
```
*/

use log::debug;

use crate::axis::AxisCollection;
use crate::dataset::DataSet;
use crate::error::{FitError, Result};

/// A named histogram over an axis collection.
#[derive(Debug, Clone, PartialEq)]
pub struct BinnedDistribution {
    name: String,
    axes: AxisCollection,
    contents: Vec<f64>,
    observables: Vec<String>,
}

impl BinnedDistribution {
    /// Creates a distribution with all bins set to zero.
    pub fn new(name: &str, axes: AxisCollection) -> Self {
        let observables = axes.names();
        Self {
            name: name.to_string(),
            contents: vec![0.0; axes.n_bins()],
            axes,
            observables,
        }
    }

    /// Creates a distribution from an existing flat content vector.
    pub fn from_contents(name: &str, axes: AxisCollection, contents: Vec<f64>) -> Result<Self> {
        if contents.len() != axes.n_bins() {
            return Err(FitError::DimensionMismatch(format!(
                "'{name}': {} bin contents for {} bins",
                contents.len(),
                axes.n_bins()
            )));
        }
        let observables = axes.names();
        Ok(Self {
            name: name.to_string(),
            axes,
            contents,
            observables,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: &str) {
        self.name = name.to_string();
    }

    pub fn axes(&self) -> &AxisCollection {
        &self.axes
    }

    pub fn ndims(&self) -> usize {
        self.axes.ndims()
    }

    pub fn n_bins(&self) -> usize {
        self.contents.len()
    }

    pub fn contents(&self) -> &[f64] {
        &self.contents
    }

    pub fn observables(&self) -> &[String] {
        &self.observables
    }

    /// Renames the observables, one per axis.
    pub fn set_observables(&mut self, observables: Vec<String>) -> Result<()> {
        if observables.len() != self.ndims() {
            return Err(FitError::DimensionMismatch(format!(
                "'{}': {} observables for {} axes",
                self.name,
                observables.len(),
                self.ndims()
            )));
        }
        for (i, obs) in observables.iter().enumerate() {
            if observables[..i].contains(obs) {
                return Err(FitError::DimensionMismatch(format!(
                    "'{}': observable '{obs}' listed twice",
                    self.name
                )));
            }
        }
        self.observables = observables;
        Ok(())
    }

    /// Dimension holding observable `name`.
    pub fn observable_index(&self, name: &str) -> Result<usize> {
        self.observables
            .iter()
            .position(|o| o == name)
            .ok_or_else(|| FitError::UnknownObservable(name.to_string()))
    }

    pub fn flatten_indices(&self, coords: &[usize]) -> Result<usize> {
        self.axes.flatten_indices(coords)
    }

    pub fn unflatten_index(&self, index: usize) -> Result<Vec<usize>> {
        self.axes.unflatten_index(index)
    }

    pub fn bin_content(&self, index: usize) -> Result<f64> {
        self.contents
            .get(index)
            .copied()
            .ok_or(FitError::IndexOutOfRange {
                index,
                size: self.contents.len(),
            })
    }

    pub fn set_bin_content(&mut self, index: usize, value: f64) -> Result<()> {
        let size = self.contents.len();
        let bin = self
            .contents
            .get_mut(index)
            .ok_or(FitError::IndexOutOfRange { index, size })?;
        *bin = value;
        Ok(())
    }

    pub fn add_bin_content(&mut self, index: usize, value: f64) -> Result<()> {
        let size = self.contents.len();
        let bin = self
            .contents
            .get_mut(index)
            .ok_or(FitError::IndexOutOfRange { index, size })?;
        *bin += value;
        Ok(())
    }

    /// Sets every bin to zero.
    pub fn clear(&mut self) {
        self.contents.iter_mut().for_each(|c| *c = 0.0);
    }

    /// Adds `weight` to the bin containing `values`. Returns `false` when the
    /// point lies outside the grid and nothing was filled.
    pub fn fill(&mut self, values: &[f64], weight: f64) -> Result<bool> {
        match self.axes.find_bin(values)? {
            Some(bin) => {
                self.contents[bin] += weight;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Fills one unit of weight per event of `data` that passes `cut`.
    ///
    /// The cut sees the full event (all observables of the dataset); the
    /// distribution picks its own observables out of it by name. Returns the
    /// number of events that landed inside the grid.
    pub fn fill_from<D, C>(&mut self, data: &D, cut: C) -> Result<usize>
    where
        D: DataSet + ?Sized,
        C: Fn(&[f64]) -> bool,
    {
        let columns: Vec<usize> = self
            .observables
            .iter()
            .map(|obs| {
                data.observable_names()
                    .iter()
                    .position(|n| n == obs)
                    .ok_or_else(|| FitError::UnknownObservable(obs.clone()))
            })
            .collect::<Result<_>>()?;

        let mut filled = 0;
        let mut point = vec![0.0; columns.len()];
        for i in 0..data.n_entries() {
            let event = data.entry(i)?;
            if !cut(&event) {
                continue;
            }
            for (p, &col) in point.iter_mut().zip(columns.iter()) {
                *p = *event.get(col).ok_or_else(|| {
                    FitError::DimensionMismatch(format!(
                        "entry {i} has {} values, observable column {col} requested",
                        event.len()
                    ))
                })?;
            }
            if self.fill(&point, 1.0)? {
                filled += 1;
            }
        }
        debug!(
            "filled {filled} of {} events into '{}'",
            data.n_entries(),
            self.name
        );
        Ok(filled)
    }

    /// Sum of all bin contents.
    pub fn integral(&self) -> f64 {
        self.contents.iter().sum()
    }

    /// Element-wise sum with `other`, in place.
    pub fn add(&mut self, other: &BinnedDistribution) -> Result<()> {
        if !self.axes.same_binning(&other.axes) {
            return Err(FitError::DimensionMismatch(format!(
                "cannot add '{}' to '{}': binning differs",
                other.name, self.name
            )));
        }
        self.contents
            .iter_mut()
            .zip(other.contents.iter())
            .for_each(|(a, b)| *a += b);
        Ok(())
    }

    /// Adds `factor * other` bin by bin, in place.
    pub fn add_scaled(&mut self, other: &BinnedDistribution, factor: f64) -> Result<()> {
        if !self.axes.same_binning(&other.axes) {
            return Err(FitError::DimensionMismatch(format!(
                "cannot add '{}' to '{}': binning differs",
                other.name, self.name
            )));
        }
        self.contents
            .iter_mut()
            .zip(other.contents.iter())
            .for_each(|(a, b)| *a += factor * b);
        Ok(())
    }

    /// Multiplies every bin by `factor`. A NaN factor propagates into every bin.
    pub fn scale(&mut self, factor: f64) {
        self.contents.iter_mut().for_each(|c| *c *= factor);
    }

    /// Scaled copy, leaving `self` untouched.
    pub fn scaled(&self, factor: f64) -> Self {
        let mut copy = self.clone();
        copy.scale(factor);
        copy
    }

    /// Divides by the integral so that the contents sum to one.
    ///
    /// An empty (zero integral) or non-finite distribution is left unchanged
    /// and `false` is returned.
    pub fn normalise(&mut self) -> bool {
        let integral = self.integral();
        if integral == 0.0 || !integral.is_finite() {
            debug!("'{}' has integral {integral}, not normalised", self.name);
            return false;
        }
        self.scale(1.0 / integral);
        true
    }

    /// Projects onto the observables in `keep`, in the order given, summing
    /// over all other axes.
    pub fn marginalise(&self, keep: &[&str]) -> Result<BinnedDistribution> {
        if keep.is_empty() {
            return Err(FitError::DimensionMismatch(format!(
                "'{}': marginalise needs at least one observable",
                self.name
            )));
        }
        let mut dims = Vec::with_capacity(keep.len());
        for obs in keep {
            let dim = self.observable_index(obs)?;
            if dims.contains(&dim) {
                return Err(FitError::DimensionMismatch(format!(
                    "'{}': observable '{obs}' kept twice",
                    self.name
                )));
            }
            dims.push(dim);
        }

        let kept_axes = AxisCollection::from_axes(
            dims.iter()
                .map(|&d| self.axes.axes()[d].clone())
                .collect(),
        )?;
        let mut out = BinnedDistribution::new(&self.name, kept_axes);
        out.observables = keep.iter().map(|s| s.to_string()).collect();

        let mut sub = vec![0; dims.len()];
        for (flat, &content) in self.contents.iter().enumerate() {
            if content == 0.0 {
                continue;
            }
            let coords = self.axes.unflatten_index(flat)?;
            for (s, &d) in sub.iter_mut().zip(dims.iter()) {
                *s = coords[d];
            }
            let target = out.axes.flatten_indices(&sub)?;
            out.contents[target] += content;
        }
        Ok(out)
    }
}
