//! One-dimensional likelihood scans.
//!
//! Each parameter is stepped across its range while all other parameters are
//! held at their nominal values. The result per parameter is a one-dimensional
//! distribution whose bin contents are the objective values at the bin
//! centres.

use std::collections::BTreeMap;

use log::info;
use ndarray::Array1;
use ndarray_stats::QuantileExt;
use rayon::prelude::*;

use crate::axis::{AxisCollection, BinAxis};
use crate::binned::BinnedDistribution;
use crate::error::{FitError, Result};
use crate::objective::Objective;
use crate::params::{require, to_vec, ParameterDict};

pub const DEFAULT_SCAN_POINTS: usize = 150;

/// Units of the scan axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScanUnits {
    /// Parameter values.
    #[default]
    Absolute,
    /// Parameter values divided by the nominal value. Falls back to
    /// absolute units for a zero nominal value.
    RelativeToNominal,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LikelihoodScan {
    pub parameter: String,
    pub nominal: f64,
    pub units: ScanUnits,
    /// Objective value per scan point, binned along the scanned parameter.
    pub values: BinnedDistribution,
}

impl LikelihoodScan {
    /// Scan point with the smallest finite value, as `(parameter value, objective value)`.
    pub fn minimum(&self) -> Option<(f64, f64)> {
        let values = Array1::from(self.values.contents().to_vec());
        let i = values.argmin_skipnan().ok()?;
        let axis = self.values.axes().axis(0)?;
        let x = match self.units {
            ScanUnits::RelativeToNominal if self.nominal != 0.0 => axis.center(i) * self.nominal,
            _ => axis.center(i),
        };
        Some((x, values[i]))
    }
}

#[derive(Debug, Clone)]
pub struct Scanner {
    minima: ParameterDict,
    maxima: ParameterDict,
    n_points: usize,
    units: ScanUnits,
}

impl Scanner {
    pub fn new(minima: ParameterDict, maxima: ParameterDict) -> Self {
        Self {
            minima,
            maxima,
            n_points: DEFAULT_SCAN_POINTS,
            units: ScanUnits::Absolute,
        }
    }

    pub fn set_n_points(mut self, n_points: usize) -> Self {
        self.n_points = n_points;
        self
    }

    pub fn set_units(mut self, units: ScanUnits) -> Self {
        self.units = units;
        self
    }

    /// Scans every parameter that has bounds. Parameters are scanned in
    /// parallel. `nominal` must hold a value for every objective parameter.
    pub fn scan<O: Objective + Sync>(
        &self,
        objective: &O,
        nominal: &ParameterDict,
    ) -> Result<BTreeMap<String, LikelihoodScan>> {
        if self.n_points == 0 {
            return Err(FitError::Config("a scan needs at least one point".into()));
        }
        objective.validate()?;
        let names = objective.parameter_names();
        let start = to_vec(nominal, &names)?;

        let scanned: Vec<(usize, &String)> = names
            .iter()
            .enumerate()
            .filter(|(_, n)| self.minima.contains_key(*n))
            .collect();
        info!("scanning {} parameters with {} points each", scanned.len(), self.n_points);

        scanned
            .into_par_iter()
            .map(|(index, name)| {
                let scan = self.scan_one(objective, &start, index, name)?;
                Ok((name.clone(), scan))
            })
            .collect()
    }

    fn scan_one<O: Objective>(
        &self,
        objective: &O,
        start: &[f64],
        index: usize,
        name: &str,
    ) -> Result<LikelihoodScan> {
        let lo = require(&self.minima, name)?;
        let hi = require(&self.maxima, name)?;
        let nominal = start[index];
        let relative = self.units == ScanUnits::RelativeToNominal && nominal != 0.0;
        let (axis_lo, axis_hi) = if relative {
            let (a, b) = (lo / nominal, hi / nominal);
            (a.min(b), a.max(b))
        } else {
            (lo, hi)
        };
        let axis = BinAxis::new(name, axis_lo, axis_hi, self.n_points)?;
        let mut values =
            BinnedDistribution::new(name, AxisCollection::from_axes(vec![axis.clone()])?);

        let mut x = start.to_vec();
        for bin in 0..self.n_points {
            x[index] = if relative {
                axis.center(bin) * nominal
            } else {
                axis.center(bin)
            };
            values.set_bin_content(bin, objective.evaluate(&x))?;
        }
        Ok(LikelihoodScan {
            parameter: name.to_string(),
            nominal,
            units: if relative { ScanUnits::RelativeToNominal } else { ScanUnits::Absolute },
            values,
        })
    }
}
