/*!
Storage of distributions and fit outputs.

Distributions are stored as JSON documents

```text
{"name": ..., "axes": [{"name": ..., "edges": [...]}, ...], "observables": [...], "contents": [...]}
```

and go through the validating constructors when loaded. Raw chains can be
written as CSV with the `csv` feature.

[`save_fit_outputs`] lays out the outputs of one fit in a directory:

```text
fit_result.txt          report
1d/<param>.json         1D projections
2d/<a>_<b>.json         2D projections
autocorrelations.txt    lag/value table
scaled_dists/<t>.json   templates scaled to their best-fit values
```
*/

#[cfg(feature = "csv")]
pub mod csv;

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::axis::{AxisCollection, BinAxis};
use crate::binned::BinnedDistribution;
use crate::error::Result;
use crate::fit_result::FitResult;

#[derive(Debug, Serialize, Deserialize)]
struct StoredAxis {
    name: String,
    edges: Vec<f64>,
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredDistribution {
    name: String,
    axes: Vec<StoredAxis>,
    #[serde(default)]
    observables: Vec<String>,
    contents: Vec<f64>,
}

impl From<&BinnedDistribution> for StoredDistribution {
    fn from(dist: &BinnedDistribution) -> Self {
        Self {
            name: dist.name().to_string(),
            axes: dist
                .axes()
                .axes()
                .iter()
                .map(|a| StoredAxis {
                    name: a.name().to_string(),
                    edges: a.edges().to_vec(),
                })
                .collect(),
            observables: dist.observables().to_vec(),
            contents: dist.contents().to_vec(),
        }
    }
}

impl TryFrom<StoredDistribution> for BinnedDistribution {
    type Error = crate::error::FitError;

    fn try_from(stored: StoredDistribution) -> Result<Self> {
        let axes = stored
            .axes
            .into_iter()
            .map(|a| BinAxis::from_edges(&a.name, a.edges))
            .collect::<Result<Vec<_>>>()?;
        let mut dist = BinnedDistribution::from_contents(
            &stored.name,
            AxisCollection::from_axes(axes)?,
            stored.contents,
        )?;
        if !stored.observables.is_empty() {
            dist.set_observables(stored.observables)?;
        }
        Ok(dist)
    }
}

pub fn distribution_to_json(dist: &BinnedDistribution) -> Result<String> {
    Ok(serde_json::to_string(&StoredDistribution::from(dist))?)
}

pub fn distribution_from_json(json: &str) -> Result<BinnedDistribution> {
    let stored: StoredDistribution = serde_json::from_str(json)?;
    stored.try_into()
}

pub fn save_distribution<P: AsRef<Path>>(dist: &BinnedDistribution, path: P) -> Result<()> {
    let writer = BufWriter::new(File::create(path.as_ref())?);
    serde_json::to_writer_pretty(writer, &StoredDistribution::from(dist))?;
    debug!("saved distribution '{}' to {}", dist.name(), path.as_ref().display());
    Ok(())
}

pub fn load_distribution<P: AsRef<Path>>(path: P) -> Result<BinnedDistribution> {
    let reader = BufReader::new(File::open(path)?);
    let stored: StoredDistribution = serde_json::from_reader(reader)?;
    stored.try_into()
}

/// Writes every projection to `<dir>/<key>.json`, creating `dir` if needed.
pub fn save_projections<P: AsRef<Path>>(
    projections: &BTreeMap<String, BinnedDistribution>,
    dir: P,
) -> Result<()> {
    fs::create_dir_all(dir.as_ref())?;
    for (key, dist) in projections {
        save_distribution(dist, dir.as_ref().join(format!("{key}.json")))?;
    }
    Ok(())
}

/// Writes a `lag\tvalue` table.
pub fn save_autocorrelations<P: AsRef<Path>>(acf: &[f64], path: P) -> Result<()> {
    let mut out = BufWriter::new(File::create(path)?);
    writeln!(out, "lag\tvalue")?;
    for (lag, value) in acf.iter().enumerate() {
        writeln!(out, "{lag}\t{value}")?;
    }
    out.flush()?;
    Ok(())
}

/// Writes each distribution to `<dir>/<name>.json`, creating `dir` if needed.
pub fn save_distributions<P: AsRef<Path>>(dists: &[BinnedDistribution], dir: P) -> Result<()> {
    fs::create_dir_all(dir.as_ref())?;
    for dist in dists {
        save_distribution(dist, dir.as_ref().join(format!("{}.json", dist.name())))?;
    }
    Ok(())
}

/// Writes the report, projections, autocorrelations and the best-fit scaled
/// templates of a fit under `dir`.
pub fn save_fit_outputs<P: AsRef<Path>>(
    result: &FitResult,
    scaled_templates: &[BinnedDistribution],
    dir: P,
) -> Result<()> {
    let dir = dir.as_ref();
    fs::create_dir_all(dir)?;
    result.save_as(dir.join("fit_result.txt"))?;
    save_projections(result.get_1d_projections(), dir.join("1d"))?;
    save_projections(result.get_2d_projections(), dir.join("2d"))?;
    save_autocorrelations(result.get_autocorrelations(), dir.join("autocorrelations.txt"))?;
    save_distributions(scaled_templates, dir.join("scaled_dists"))?;
    debug!("saved fit outputs to {}", dir.display());
    Ok(())
}
