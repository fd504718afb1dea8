//! Summary of one sampling run.

use std::collections::BTreeMap;
use std::fmt;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use ndarray::{Array1, Array2};
use ndarray_stats::CorrelationExt;

use crate::binned::BinnedDistribution;
use crate::error::{FitError, Result};
use crate::params::{from_slice, ParameterDict};

/// Everything a run produced: best fit, projections, chain diagnostics and,
/// when requested, the raw chain.
#[derive(Debug, Clone, PartialEq)]
pub struct FitResult {
    pub parameter_names: Vec<String>,
    /// Sample with the highest log density after burn-in.
    pub best_fit: Vec<f64>,
    /// Test statistic at [`FitResult::best_fit`].
    pub best_fit_value: f64,
    /// Post burn-in samples, one row per iteration.
    pub chain: Option<Array2<f64>>,
    /// Test statistic of every row of [`FitResult::chain`].
    pub chain_values: Option<Vec<f64>>,
    pub projections_1d: BTreeMap<String, BinnedDistribution>,
    /// Keyed `"<a>_<b>"` for parameters `a` before `b`.
    pub projections_2d: BTreeMap<String, BinnedDistribution>,
    /// Autocorrelation of the test statistic trace, lag 0 first.
    pub autocorrelations: Vec<f64>,
    pub means: Vec<f64>,
    /// Posterior standard deviations.
    pub uncertainties: Vec<f64>,
    pub acceptance_rate: f64,
    pub n_samples: usize,
}

impl FitResult {
    pub fn get_best_fit(&self) -> ParameterDict {
        from_slice(&self.parameter_names, &self.best_fit)
    }

    pub fn get_uncertainties(&self) -> ParameterDict {
        from_slice(&self.parameter_names, &self.uncertainties)
    }

    pub fn get_means(&self) -> ParameterDict {
        from_slice(&self.parameter_names, &self.means)
    }

    pub fn get_1d_projections(&self) -> &BTreeMap<String, BinnedDistribution> {
        &self.projections_1d
    }

    pub fn get_2d_projections(&self) -> &BTreeMap<String, BinnedDistribution> {
        &self.projections_2d
    }

    pub fn get_autocorrelations(&self) -> &[f64] {
        &self.autocorrelations
    }

    /// Pearson correlation between parameters over the stored chain.
    pub fn correlation_matrix(&self) -> Result<Array2<f64>> {
        let chain = self
            .chain
            .as_ref()
            .ok_or_else(|| FitError::NotConfigured("the chain was not saved".into()))?;
        if chain.nrows() < 2 {
            return Err(FitError::NotConfigured(
                "at least two samples are needed for correlations".into(),
            ));
        }
        // Variables along rows, observations along columns.
        chain
            .t()
            .pearson_correlation()
            .map_err(|e| FitError::DimensionMismatch(e.to_string()))
    }

    /// Column of the chain belonging to `name`.
    pub fn parameter_samples(&self, name: &str) -> Option<Array1<f64>> {
        let i = self.parameter_names.iter().position(|n| n == name)?;
        self.chain.as_ref().map(|c| c.column(i).to_owned())
    }

    /// Writes the text report to `path`.
    pub fn save_as<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut out = BufWriter::new(File::create(path)?);
        write!(out, "{self}")?;
        out.flush()?;
        Ok(())
    }
}

impl fmt::Display for FitResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "# best fit value: {}", self.best_fit_value)?;
        writeln!(f, "# samples: {}", self.n_samples)?;
        writeln!(f, "# acceptance rate: {:.4}", self.acceptance_rate)?;
        writeln!(f, "parameter\tbest_fit\tmean\tuncertainty")?;
        for (i, name) in self.parameter_names.iter().enumerate() {
            writeln!(
                f,
                "{name}\t{}\t{}\t{}",
                self.best_fit[i],
                self.means.get(i).copied().unwrap_or(f64::NAN),
                self.uncertainties.get(i).copied().unwrap_or(f64::NAN)
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    fn result(chain: Option<Array2<f64>>) -> FitResult {
        FitResult {
            parameter_names: vec!["a".into(), "b".into()],
            best_fit: vec![1.0, 2.0],
            best_fit_value: 3.5,
            chain,
            chain_values: None,
            projections_1d: BTreeMap::new(),
            projections_2d: BTreeMap::new(),
            autocorrelations: vec![1.0, 0.5],
            means: vec![1.1, 2.1],
            uncertainties: vec![0.1, 0.2],
            acceptance_rate: 0.25,
            n_samples: 4,
        }
    }

    #[test]
    fn dictionaries_follow_parameter_names() {
        let r = result(None);
        assert_eq!(r.get_best_fit()["b"], 2.0);
        assert_eq!(r.get_uncertainties()["a"], 0.1);
        assert_eq!(r.get_means()["b"], 2.1);
    }

    #[test]
    fn correlation_of_linear_chain() {
        let chain = array![[0.0, 1.0], [1.0, -1.0], [2.0, -3.0], [3.0, -5.0]];
        let r = result(Some(chain));
        let corr = r.correlation_matrix().unwrap();
        assert_abs_diff_eq!(corr[[0, 0]], 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(corr[[0, 1]], -1.0, epsilon = 1e-12);
        assert_eq!(r.parameter_samples("b").unwrap(), array![1.0, -1.0, -3.0, -5.0]);
        assert!(result(None).correlation_matrix().is_err());
    }

    #[test]
    fn report_lists_every_parameter() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fit.txt");
        result(None).save_as(&path).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("# best fit value: 3.5"));
        assert!(text.contains("a\t1\t1.1\t0.1"));
        assert!(text.contains("b\t2\t2.1\t0.2"));
    }
}
