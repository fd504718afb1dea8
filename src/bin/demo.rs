//! A toy fit: builds an Asimov data set from a signal peak and a flat
//! background, fluctuates it into fake data and fits the two rates with
//! Metropolis, then with HMC.

use bbfit::asimov::{poisson_fluctuate, AsimovBuilder};
use bbfit::axis::{AxisCollection, BinAxis};
use bbfit::binned::BinnedDistribution;
use bbfit::io::save_fit_outputs;
use bbfit::likelihood::BinnedNllh;
use bbfit::mcmc::{Mcmc, SamplerKind};
use bbfit::params::ParameterDict;
use rand::rngs::SmallRng;
use rand::SeedableRng;
use std::error::Error;

fn main() -> Result<(), Box<dyn Error>> {
    const ITERATIONS: usize = 50_000;
    const BURNIN: usize = 5_000;
    const SEED: u64 = 42;
    const LIVE_TIME: f64 = 2.0;

    let axes = AxisCollection::from_axes(vec![BinAxis::new("energy", 0.0, 10.0, 20)?])?;
    let mut sig = BinnedDistribution::new("sig", axes.clone());
    let mut bkg = BinnedDistribution::new("bkg", axes.clone());
    let energy = axes.axis(0).ok_or("no energy axis")?.clone();
    for bin in 0..energy.nbins() {
        let e = energy.center(bin);
        sig.set_bin_content(bin, (-0.5 * ((e - 4.0) / 0.8).powi(2)).exp())?;
        bkg.set_bin_content(bin, 1.0)?;
    }
    sig.normalise();
    bkg.normalise();

    // 200 signal and 400 background events per unit live time, templates
    // normalised to one generated event.
    let mut builder = AsimovBuilder::new(LIVE_TIME);
    builder.add(sig.clone(), 200.0, 1.0);
    builder.add(bkg.clone(), 400.0, 1.0);
    let asimov = builder.build("asimov")?;
    println!("Expected counts: {:?}", asimov.expected_counts);

    let mut rng = SmallRng::seed_from_u64(SEED);
    let mut data = poisson_fluctuate(&asimov.distribution, &mut rng)?;
    data.set_name("data");
    println!("Fake data with {} events", data.integral());

    // Fit parameters are event counts: templates stay normalised.
    let mut lh = BinnedNllh::new();
    lh.add_pdfs(vec![sig, bkg])?;
    lh.set_data_dist(data)?;

    let dict = |sig: f64, bkg: f64| -> ParameterDict {
        [("sig".to_string(), sig), ("bkg".to_string(), bkg)].into_iter().collect()
    };

    let mut mcmc = Mcmc::new(SamplerKind::Metropolis)
        .set_minima(dict(0.0, 0.0))
        .set_maxima(dict(1000.0, 1600.0))
        .set_sigmas(dict(10.0, 15.0))
        .set_max_iter(ITERATIONS)
        .set_burn_in(BURNIN)
        .set_seed(SEED)
        .set_show_progress(true);
    let result = mcmc.optimise(&lh)?;
    println!("{result}");

    let mut hmc = Mcmc::new(SamplerKind::Hamiltonian {
        epsilon: 0.5,
        n_steps: 20,
    })
    .set_minima(dict(0.0, 0.0))
    .set_maxima(dict(1000.0, 1600.0))
    .set_masses(dict(1e-3, 1e-3))
    .set_initial(result.get_best_fit())
    .set_max_iter(ITERATIONS / 10)
    .set_burn_in(BURNIN / 10)
    .set_seed(SEED)
    .set_show_progress(true);
    let hmc_result = hmc.optimise(&lh)?;
    println!("{hmc_result}");

    let out_dir = std::env::temp_dir().join("bbfit_demo");
    let scaled = lh.scaled_templates(&result.get_best_fit())?;
    save_fit_outputs(&result, &scaled, &out_dir)?;
    println!("Saved outputs to {}", out_dir.display());
    Ok(())
}

#[test]
fn test_main() {
    main().expect("Expected main to not return an error.");
    assert!(
        std::env::temp_dir()
            .join("bbfit_demo")
            .join("fit_result.txt")
            .exists(),
        "Expected fit_result.txt to exist."
    );
}
