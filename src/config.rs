/*!
Fit and systematic configuration.

Both objects deserialise from JSON. A fit configuration lists the fit
parameters (one per template) with their bounds, proposal widths, projection
bins and optional constraints, plus the run settings. A systematic
configuration describes one [`Systematic`] and its parameters.

```json
{
  "iterations": 20000,
  "burn_in": 2000,
  "sampler": {"kind": "hamiltonian", "epsilon": 0.05, "n_steps": 20},
  "parameters": {
    "signal": {"min": 0.0, "max": 200.0, "sigma": 5.0, "nbins": 100},
    "background": {"min": 0.0, "max": 500.0, "sigma": 5.0,
                   "constraint": {"mean": 250.0, "sigma": 20.0}}
  }
}
```
*/

use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use log::debug;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{FitError, Result};
use crate::fit_result::FitResult;
use crate::io::save_fit_outputs;
use crate::likelihood::BinnedNllh;
use crate::mcmc::{BoundaryMode, Mcmc, SamplerKind, DEFAULT_PROJECTION_BINS};
use crate::params::ParameterDict;
use crate::systematic::{Systematic, SystematicKind};

fn default_nbins() -> usize {
    DEFAULT_PROJECTION_BINS
}

fn default_true() -> bool {
    true
}

fn load_json<T: DeserializeOwned, P: AsRef<Path>>(path: P) -> Result<T> {
    let reader = BufReader::new(File::open(path)?);
    Ok(serde_json::from_reader(reader)?)
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConstraintConfig {
    pub mean: f64,
    pub sigma: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitParameter {
    pub min: f64,
    pub max: f64,
    /// Metropolis proposal width.
    pub sigma: f64,
    #[serde(default = "default_nbins")]
    pub nbins: usize,
    /// HMC mass, 1 when absent.
    #[serde(default)]
    pub mass: Option<f64>,
    /// Starting value, mid-range when absent.
    #[serde(default)]
    pub nominal: Option<f64>,
    #[serde(default)]
    pub constraint: Option<ConstraintConfig>,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SamplerConfig {
    #[default]
    Metropolis,
    Hamiltonian { epsilon: f64, n_steps: usize },
}

impl From<SamplerConfig> for SamplerKind {
    fn from(config: SamplerConfig) -> Self {
        match config {
            SamplerConfig::Metropolis => SamplerKind::Metropolis,
            SamplerConfig::Hamiltonian { epsilon, n_steps } => {
                SamplerKind::Hamiltonian { epsilon, n_steps }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitConfig {
    pub iterations: usize,
    pub burn_in: usize,
    /// Directory [`FitConfig::save_outputs`] writes to.
    #[serde(default)]
    pub out_dir: Option<PathBuf>,
    #[serde(default)]
    pub seed: u64,
    #[serde(default)]
    pub sampler: SamplerConfig,
    /// Sample through sigmoid-mapped coordinates instead of rejecting.
    #[serde(default)]
    pub sigmoid_bounds: bool,
    #[serde(default = "default_true")]
    pub save_chain: bool,
    #[serde(default)]
    pub parameters: BTreeMap<String, FitParameter>,
}

impl FitConfig {
    pub fn new(iterations: usize, burn_in: usize) -> Self {
        Self {
            iterations,
            burn_in,
            out_dir: None,
            seed: 0,
            sampler: SamplerConfig::Metropolis,
            sigmoid_bounds: false,
            save_chain: true,
            parameters: BTreeMap::new(),
        }
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        load_json(path)
    }

    pub fn add_parameter(&mut self, name: &str, min: f64, max: f64, sigma: f64, nbins: usize) {
        self.parameters.insert(
            name.to_string(),
            FitParameter {
                min,
                max,
                sigma,
                nbins,
                mass: None,
                nominal: None,
                constraint: None,
            },
        );
    }

    pub fn param_names(&self) -> Vec<String> {
        self.parameters.keys().cloned().collect()
    }

    fn collect<F: Fn(&FitParameter) -> Option<f64>>(&self, f: F) -> ParameterDict {
        self.parameters
            .iter()
            .filter_map(|(name, p)| f(p).map(|v| (name.clone(), v)))
            .collect()
    }

    pub fn minima(&self) -> ParameterDict {
        self.collect(|p| Some(p.min))
    }

    pub fn maxima(&self) -> ParameterDict {
        self.collect(|p| Some(p.max))
    }

    pub fn sigmas(&self) -> ParameterDict {
        self.collect(|p| Some(p.sigma))
    }

    pub fn masses(&self) -> ParameterDict {
        self.collect(|p| Some(p.mass.unwrap_or(1.0)))
    }

    pub fn nominal(&self) -> ParameterDict {
        self.collect(|p| p.nominal)
    }

    pub fn constraint_means(&self) -> ParameterDict {
        self.collect(|p| p.constraint.map(|c| c.mean))
    }

    pub fn constraint_sigmas(&self) -> ParameterDict {
        self.collect(|p| p.constraint.map(|c| c.sigma))
    }

    pub fn nbins(&self) -> BTreeMap<String, usize> {
        self.parameters
            .iter()
            .map(|(name, p)| (name.clone(), p.nbins))
            .collect()
    }

    /// Checks the run settings and that no name is both a fit and a
    /// systematic parameter.
    pub fn validate(&self, systs: &[SystConfig]) -> Result<()> {
        if self.burn_in >= self.iterations {
            return Err(FitError::Config(format!(
                "burn-in ({}) must be smaller than the number of iterations ({})",
                self.burn_in, self.iterations
            )));
        }
        let mut seen: BTreeMap<&str, &str> =
            self.parameters.keys().map(|k| (k.as_str(), "fit")).collect();
        for syst in systs {
            for name in syst.parameters.keys() {
                if let Some(owner) = seen.insert(name.as_str(), syst.name.as_str()) {
                    return Err(FitError::Config(format!(
                        "parameter '{name}' defined by both '{owner}' and '{}'",
                        syst.name
                    )));
                }
            }
        }
        Ok(())
    }

    /// A driver covering the fit parameters and the parameters of `systs`.
    pub fn build_mcmc(&self, systs: &[SystConfig]) -> Result<Mcmc> {
        self.validate(systs)?;
        let mut minima = self.minima();
        let mut maxima = self.maxima();
        let mut sigmas = self.sigmas();
        let mut masses = self.masses();
        let mut initial = self.nominal();
        let mut nbins = self.nbins();
        for syst in systs {
            minima.extend(syst.minima());
            maxima.extend(syst.maxima());
            sigmas.extend(syst.sigmas());
            masses.extend(syst.masses());
            initial.extend(syst.nominal());
            nbins.extend(syst.nbins());
        }
        let boundary = if self.sigmoid_bounds {
            BoundaryMode::Sigmoid
        } else {
            BoundaryMode::Reject
        };
        Ok(Mcmc::new(self.sampler.into())
            .set_max_iter(self.iterations)
            .set_burn_in(self.burn_in)
            .set_minima(minima)
            .set_maxima(maxima)
            .set_sigmas(sigmas)
            .set_masses(masses)
            .set_initial(initial)
            .set_nbins(nbins)
            .set_boundary_mode(boundary)
            .set_save_chain(self.save_chain)
            .set_seed(self.seed))
    }

    /// Adds the systematics of `systs` and every configured constraint to `lh`.
    pub fn configure_likelihood(&self, lh: &mut BinnedNllh, systs: &[SystConfig]) -> Result<()> {
        self.validate(systs)?;
        for syst in systs {
            lh.add_systematic(syst.to_systematic()?);
        }
        let mut means = self.constraint_means();
        let mut widths = self.constraint_sigmas();
        for syst in systs {
            means.extend(syst.constraint_means());
            widths.extend(syst.constraint_sigmas());
        }
        for (name, mean) in &means {
            let sigma = widths
                .get(name)
                .copied()
                .ok_or_else(|| FitError::MissingParameter(name.clone()))?;
            debug!("constraining '{name}' to {mean} +- {sigma}");
            lh.set_constraint(name, *mean, sigma)?;
        }
        Ok(())
    }

    /// Writes the outputs of `result` under `out_dir`. The templates of `lh`
    /// scaled to the best fit go next to its data in `scaled_dists/`.
    pub fn save_outputs(&self, result: &FitResult, lh: &BinnedNllh) -> Result<()> {
        let dir = self
            .out_dir
            .as_ref()
            .ok_or_else(|| FitError::NotConfigured("no out_dir in fit configuration".into()))?;
        let mut scaled = lh.scaled_templates(&result.get_best_fit())?;
        scaled.extend(lh.data().cloned());
        save_fit_outputs(result, &scaled, dir)?;
        debug!("fit outputs written to {}", dir.display());
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystParameter {
    pub nominal: f64,
    pub min: f64,
    pub max: f64,
    /// HMC mass, also the Metropolis width unless `sigma` is set.
    pub mass: f64,
    #[serde(default)]
    pub sigma: Option<f64>,
    #[serde(default = "default_nbins")]
    pub nbins: usize,
    #[serde(default)]
    pub constraint: Option<ConstraintConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystConfig {
    pub name: String,
    /// Observable the transformation acts on.
    pub observable: String,
    /// Observables the systematic expects a distribution to carry. Empty for any.
    #[serde(default)]
    pub distribution_obs: Vec<String>,
    pub kind: SystematicKind,
    pub parameters: BTreeMap<String, SystParameter>,
}

impl SystConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        load_json(path)
    }

    /// Loads a JSON array of systematic configurations.
    pub fn load_all<P: AsRef<Path>>(path: P) -> Result<Vec<Self>> {
        load_json(path)
    }

    fn collect<F: Fn(&SystParameter) -> Option<f64>>(&self, f: F) -> ParameterDict {
        self.parameters
            .iter()
            .filter_map(|(name, p)| f(p).map(|v| (name.clone(), v)))
            .collect()
    }

    pub fn nominal(&self) -> ParameterDict {
        self.collect(|p| Some(p.nominal))
    }

    pub fn minima(&self) -> ParameterDict {
        self.collect(|p| Some(p.min))
    }

    pub fn maxima(&self) -> ParameterDict {
        self.collect(|p| Some(p.max))
    }

    pub fn masses(&self) -> ParameterDict {
        self.collect(|p| Some(p.mass))
    }

    pub fn sigmas(&self) -> ParameterDict {
        self.collect(|p| Some(p.sigma.unwrap_or(p.mass)))
    }

    pub fn constraint_means(&self) -> ParameterDict {
        self.collect(|p| p.constraint.map(|c| c.mean))
    }

    pub fn constraint_sigmas(&self) -> ParameterDict {
        self.collect(|p| p.constraint.map(|c| c.sigma))
    }

    pub fn nbins(&self) -> BTreeMap<String, usize> {
        self.parameters
            .iter()
            .map(|(name, p)| (name.clone(), p.nbins))
            .collect()
    }

    /// The systematic described here. Every parameter the kind reads must be
    /// configured.
    pub fn to_systematic(&self) -> Result<Systematic> {
        let systematic = Systematic::new(&self.name, self.kind.clone(), &self.observable)
            .with_distribution_obs(self.distribution_obs.clone());
        for name in systematic.parameter_names() {
            if !self.parameters.contains_key(&name) {
                return Err(FitError::Config(format!(
                    "systematic '{}' reads parameter '{name}' which is not configured",
                    self.name
                )));
            }
        }
        Ok(systematic)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::axis::{AxisCollection, BinAxis};
    use crate::binned::BinnedDistribution;

    const FIT_JSON: &str = r#"{
        "iterations": 5000,
        "burn_in": 500,
        "seed": 3,
        "sampler": {"kind": "hamiltonian", "epsilon": 0.05, "n_steps": 20},
        "parameters": {
            "sig": {"min": 0.0, "max": 50.0, "sigma": 1.0, "nbins": 25},
            "bkg": {"min": 0.0, "max": 80.0, "sigma": 2.0, "mass": 4.0,
                    "constraint": {"mean": 40.0, "sigma": 5.0}}
        }
    }"#;

    const SYST_JSON: &str = r#"{
        "name": "energy_scale",
        "observable": "energy",
        "kind": {"type": "scale", "param": "e_scale"},
        "parameters": {
            "e_scale": {"nominal": 1.0, "min": 0.9, "max": 1.1, "mass": 0.01,
                        "constraint": {"mean": 1.0, "sigma": 0.02}}
        }
    }"#;

    #[test]
    fn fit_config_from_json() {
        let config = FitConfig::from_json_str(FIT_JSON).unwrap();
        assert_eq!(config.iterations, 5000);
        assert_eq!(
            config.sampler,
            SamplerConfig::Hamiltonian {
                epsilon: 0.05,
                n_steps: 20
            }
        );
        assert_eq!(config.param_names(), vec!["bkg".to_string(), "sig".to_string()]);
        assert_eq!(config.maxima()["bkg"], 80.0);
        assert_eq!(config.masses()["sig"], 1.0);
        assert_eq!(config.masses()["bkg"], 4.0);
        assert_eq!(config.nbins()["bkg"], DEFAULT_PROJECTION_BINS);
        assert_eq!(config.constraint_means().len(), 1);
        assert!(config.save_chain);
        assert!(!config.sigmoid_bounds);
    }

    #[test]
    fn syst_config_from_json() {
        let syst = SystConfig::from_json_str(SYST_JSON).unwrap();
        assert_eq!(syst.kind, SystematicKind::Scale { param: "e_scale".into() });
        assert_eq!(syst.sigmas()["e_scale"], 0.01);
        let systematic = syst.to_systematic().unwrap();
        assert_eq!(systematic.transform_obs(), "energy");
    }

    #[test]
    fn unconfigured_systematic_parameter() {
        let mut syst = SystConfig::from_json_str(SYST_JSON).unwrap();
        syst.kind = SystematicKind::Shift { param: "e_offset".into() };
        assert!(matches!(syst.to_systematic(), Err(FitError::Config(_))));
    }

    #[test]
    fn duplicate_parameter_across_configs() {
        let config = FitConfig::from_json_str(FIT_JSON).unwrap();
        let mut syst = SystConfig::from_json_str(SYST_JSON).unwrap();
        let p = syst.parameters["e_scale"].clone();
        syst.parameters.insert("sig".into(), p);
        assert!(config.validate(&[syst]).is_err());
    }

    #[test]
    fn builds_driver_and_likelihood() {
        let config = FitConfig::from_json_str(FIT_JSON).unwrap();
        let syst = SystConfig::from_json_str(SYST_JSON).unwrap();
        let mcmc = config.build_mcmc(std::slice::from_ref(&syst)).unwrap();
        assert_eq!(mcmc.seed(), 3);
        assert_eq!(
            mcmc.kind(),
            SamplerKind::Hamiltonian {
                epsilon: 0.05,
                n_steps: 20
            }
        );

        let axes =
            AxisCollection::from_axes(vec![BinAxis::new("energy", 0.0, 4.0, 4).unwrap()]).unwrap();
        let template = |name: &str, contents: Vec<f64>| {
            BinnedDistribution::from_contents(name, axes.clone(), contents).unwrap()
        };
        let mut lh = BinnedNllh::new();
        lh.add_pdfs(vec![
            template("sig", vec![0.0, 0.5, 0.5, 0.0]),
            template("bkg", vec![0.25; 4]),
        ])
        .unwrap();
        config.configure_likelihood(&mut lh, &[syst]).unwrap();
        assert_eq!(lh.systematics().len(), 1);
        assert_eq!(
            lh.parameter_names(),
            vec!["bkg".to_string(), "e_scale".to_string(), "sig".to_string()]
        );
    }

    #[test]
    fn rejects_long_burn_in() {
        let mut config = FitConfig::new(100, 100);
        config.add_parameter("sig", 0.0, 1.0, 0.1, 10);
        assert!(config.build_mcmc(&[]).is_err());
    }

    #[test]
    fn configs_load_from_files() {
        let dir = tempfile::tempdir().unwrap();
        let fit_path = dir.path().join("fit.json");
        std::fs::write(&fit_path, FIT_JSON).unwrap();
        let loaded = FitConfig::load(&fit_path).unwrap();
        assert_eq!(loaded, FitConfig::from_json_str(FIT_JSON).unwrap());

        let systs_path = dir.path().join("systs.json");
        std::fs::write(&systs_path, format!("[{SYST_JSON}]")).unwrap();
        let systs = SystConfig::load_all(&systs_path).unwrap();
        assert_eq!(systs.len(), 1);
        assert_eq!(systs[0].name, "energy_scale");

        let missing = FitConfig::load(dir.path().join("missing.json"));
        assert!(matches!(missing, Err(FitError::Io(_))));
    }
}
