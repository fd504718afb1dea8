/*!
Binned axes and axis collections.

A [`BinAxis`] is one binned dimension, an [`AxisCollection`] is the ordered set of
dimensions that defines a multi-dimensional grid. Bins of the grid are addressed
either by one coordinate per axis or by a single flat index. The flat index is the
row-major linearisation of the coordinates: the last axis varies fastest.

# Examples

```rust
use bbfit::axis::{AxisCollection, BinAxis};

let mut axes = AxisCollection::new();
axes.add_axis(BinAxis::new("energy", 0.0, 10.0, 10).unwrap()).unwrap();
axes.add_axis(BinAxis::new("r", 0.0, 6.0, 3).unwrap()).unwrap();

assert_eq!(axes.n_bins(), 30);
let flat = axes.flatten_indices(&[4, 2]).unwrap();
assert_eq!(flat, 14);
assert_eq!(axes.unflatten_index(flat).unwrap(), vec![4, 2]);
```
*/

use approx::relative_eq;

use crate::error::{FitError, Result};

const EDGE_TOLERANCE: f64 = 1e-12;

/// One binned dimension: a name and `nbins + 1` strictly increasing edges.
#[derive(Debug, Clone, PartialEq)]
pub struct BinAxis {
    name: String,
    edges: Vec<f64>,
}

impl BinAxis {
    /// Creates an axis with `nbins` equal-width bins spanning `[min, max)`.
    pub fn new(name: &str, min: f64, max: f64, nbins: usize) -> Result<Self> {
        if nbins == 0 {
            return Err(FitError::InvalidAxis(format!("axis '{name}' needs at least one bin")));
        }
        if !(min < max) {
            return Err(FitError::InvalidAxis(format!(
                "axis '{name}' needs min < max, got [{min}, {max}]"
            )));
        }
        let width = (max - min) / nbins as f64;
        let mut edges: Vec<f64> = (0..nbins).map(|i| min + i as f64 * width).collect();
        edges.push(max);
        Ok(Self {
            name: name.to_string(),
            edges,
        })
    }

    /// Creates an axis from explicit bin edges.
    pub fn from_edges(name: &str, edges: Vec<f64>) -> Result<Self> {
        if edges.len() < 2 {
            return Err(FitError::InvalidAxis(format!(
                "axis '{name}' needs at least two edges, got {}",
                edges.len()
            )));
        }
        if edges.iter().any(|e| !e.is_finite()) {
            return Err(FitError::InvalidAxis(format!("axis '{name}' has non-finite edges")));
        }
        if edges.windows(2).any(|w| w[0] >= w[1]) {
            return Err(FitError::InvalidAxis(format!(
                "axis '{name}' edges must be strictly increasing"
            )));
        }
        Ok(Self {
            name: name.to_string(),
            edges,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn edges(&self) -> &[f64] {
        &self.edges
    }

    pub fn nbins(&self) -> usize {
        self.edges.len() - 1
    }

    pub fn min(&self) -> f64 {
        self.edges[0]
    }

    pub fn max(&self) -> f64 {
        self.edges[self.edges.len() - 1]
    }

    /// Lower edge of bin `bin`. Panics if `bin >= nbins`.
    pub fn low_edge(&self, bin: usize) -> f64 {
        self.edges[bin]
    }

    /// Upper edge of bin `bin`. Panics if `bin >= nbins`.
    pub fn high_edge(&self, bin: usize) -> f64 {
        self.edges[bin + 1]
    }

    pub fn center(&self, bin: usize) -> f64 {
        0.5 * (self.edges[bin] + self.edges[bin + 1])
    }

    pub fn width(&self, bin: usize) -> f64 {
        self.edges[bin + 1] - self.edges[bin]
    }

    /// Bin containing `x`, `None` outside `[min, max)` or for NaN.
    pub fn find_bin(&self, x: f64) -> Option<usize> {
        if !(x >= self.min() && x < self.max()) {
            return None;
        }
        // Index of the first edge strictly greater than x, minus one.
        let upper = self.edges.partition_point(|&e| e <= x);
        Some(upper - 1)
    }

    /// Whether both axes have the same number of bins and the same edges.
    /// Names are not compared.
    pub fn same_binning(&self, other: &BinAxis) -> bool {
        self.nbins() == other.nbins()
            && self
                .edges
                .iter()
                .zip(other.edges.iter())
                .all(|(a, b)| {
                    relative_eq!(*a, *b, epsilon = EDGE_TOLERANCE, max_relative = EDGE_TOLERANCE)
                })
    }
}

/// Ordered collection of axes. Insertion order is dimension order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AxisCollection {
    axes: Vec<BinAxis>,
}

impl AxisCollection {
    pub fn new() -> Self {
        Self { axes: Vec::new() }
    }

    /// Builds a collection from axes, rejecting duplicate names.
    pub fn from_axes(axes: Vec<BinAxis>) -> Result<Self> {
        let mut collection = Self::new();
        for axis in axes {
            collection.add_axis(axis)?;
        }
        Ok(collection)
    }

    /// Appends an axis as the new last (fastest varying) dimension.
    pub fn add_axis(&mut self, axis: BinAxis) -> Result<()> {
        if self.index_of(axis.name()).is_some() {
            return Err(FitError::InvalidAxis(format!(
                "axis '{}' already present in collection",
                axis.name()
            )));
        }
        self.axes.push(axis);
        Ok(())
    }

    pub fn ndims(&self) -> usize {
        self.axes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.axes.is_empty()
    }

    /// Total number of bins of the grid, the product of the per-axis bin counts.
    /// An empty collection has zero bins.
    pub fn n_bins(&self) -> usize {
        if self.axes.is_empty() {
            return 0;
        }
        self.axes.iter().map(BinAxis::nbins).product()
    }

    pub fn axes(&self) -> &[BinAxis] {
        &self.axes
    }

    pub fn axis(&self, dim: usize) -> Option<&BinAxis> {
        self.axes.get(dim)
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.axes.iter().position(|a| a.name() == name)
    }

    pub fn names(&self) -> Vec<String> {
        self.axes.iter().map(|a| a.name().to_string()).collect()
    }

    /// Row-major strides, last axis has stride one.
    fn strides(&self) -> Vec<usize> {
        let mut strides = vec![1; self.axes.len()];
        for dim in (0..self.axes.len().saturating_sub(1)).rev() {
            strides[dim] = strides[dim + 1] * self.axes[dim + 1].nbins();
        }
        strides
    }

    /// Maps one bin coordinate per axis onto the flat index.
    pub fn flatten_indices(&self, coords: &[usize]) -> Result<usize> {
        if coords.len() != self.axes.len() {
            return Err(FitError::DimensionMismatch(format!(
                "expected {} coordinates, got {}",
                self.axes.len(),
                coords.len()
            )));
        }
        let mut flat = 0;
        for (dim, (&c, axis)) in coords.iter().zip(self.axes.iter()).enumerate() {
            if c >= axis.nbins() {
                return Err(FitError::IndexOutOfRange {
                    index: c,
                    size: axis.nbins(),
                });
            }
            flat = flat * self.axes[dim].nbins() + c;
        }
        Ok(flat)
    }

    /// Inverse of [`AxisCollection::flatten_indices`].
    pub fn unflatten_index(&self, index: usize) -> Result<Vec<usize>> {
        let size = self.n_bins();
        if index >= size {
            return Err(FitError::IndexOutOfRange { index, size });
        }
        Ok(self
            .strides()
            .iter()
            .zip(self.axes.iter())
            .map(|(&stride, axis)| (index / stride) % axis.nbins())
            .collect())
    }

    /// Flat index of the bin containing the point `values`, `None` if any
    /// coordinate falls outside its axis.
    pub fn find_bin(&self, values: &[f64]) -> Result<Option<usize>> {
        if values.len() != self.axes.len() {
            return Err(FitError::DimensionMismatch(format!(
                "expected {} values, got {}",
                self.axes.len(),
                values.len()
            )));
        }
        let mut flat = 0;
        for (&x, axis) in values.iter().zip(self.axes.iter()) {
            match axis.find_bin(x) {
                Some(bin) => flat = flat * axis.nbins() + bin,
                None => return Ok(None),
            }
        }
        Ok(Some(flat))
    }

    /// Same number of dimensions with pairwise identical binning.
    pub fn same_binning(&self, other: &AxisCollection) -> bool {
        self.axes.len() == other.axes.len()
            && self
                .axes
                .iter()
                .zip(other.axes.iter())
                .all(|(a, b)| a.same_binning(b))
    }
}
