//! Event datasets from which distributions are filled.

use crate::error::{FitError, Result};

/// A source of events: a fixed number of entries, each a vector of observable
/// values in the order given by [`DataSet::observable_names`].
pub trait DataSet {
    fn n_entries(&self) -> usize;

    fn observable_names(&self) -> &[String];

    /// Values of entry `index`, one per observable.
    fn entry(&self, index: usize) -> Result<Vec<f64>>;
}

/// A dataset held in memory, row per event.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventTable {
    observables: Vec<String>,
    rows: Vec<Vec<f64>>,
}

impl EventTable {
    pub fn new(observables: Vec<String>) -> Self {
        Self {
            observables,
            rows: Vec::new(),
        }
    }

    /// Appends an event. The event must carry one value per observable.
    pub fn push(&mut self, event: Vec<f64>) -> Result<()> {
        if event.len() != self.observables.len() {
            return Err(FitError::DimensionMismatch(format!(
                "event has {} values, table has {} observables",
                event.len(),
                self.observables.len()
            )));
        }
        self.rows.push(event);
        Ok(())
    }
}

impl DataSet for EventTable {
    fn n_entries(&self) -> usize {
        self.rows.len()
    }

    fn observable_names(&self) -> &[String] {
        &self.observables
    }

    fn entry(&self, index: usize) -> Result<Vec<f64>> {
        self.rows.get(index).cloned().ok_or(FitError::IndexOutOfRange {
            index,
            size: self.rows.len(),
        })
    }
}
