//! Parameter dictionaries.
//!
//! A [`ParameterDict`] maps parameter names to values. The same type carries
//! minima, maxima, sigmas, masses, constraint means and widths, current values and
//! best-fit values. It is ordered so that every vector built from it has a stable
//! layout across runs.

use std::collections::BTreeMap;

use crate::error::{FitError, Result};

pub type ParameterDict = BTreeMap<String, f64>;

/// Looks up `name`, failing with [`FitError::MissingParameter`] when absent.
pub fn require(dict: &ParameterDict, name: &str) -> Result<f64> {
    dict.get(name)
        .copied()
        .ok_or_else(|| FitError::MissingParameter(name.to_string()))
}

/// Values of `names` in that order.
pub fn to_vec(dict: &ParameterDict, names: &[String]) -> Result<Vec<f64>> {
    names.iter().map(|n| require(dict, n)).collect()
}

/// Zips `names` with `values` into a dictionary.
pub fn from_slice(names: &[String], values: &[f64]) -> ParameterDict {
    names
        .iter()
        .cloned()
        .zip(values.iter().copied())
        .collect()
}
