pub mod asimov;
pub mod axis;
pub mod binned;
pub mod config;
pub mod core;
pub mod dataset;
pub mod error;
pub mod fit_result;
pub mod hmc;
pub mod io;
pub mod likelihood;
pub mod mcmc;
pub mod metropolis;
pub mod objective;
pub mod params;
pub mod scan;
pub mod stats;
pub mod systematic;
pub mod transform;
