//! Likelihood evaluation cost for growing binnings.
//!
//! Each case has a signal peak and a falling background over a two-dimensional
//! (energy, radius) grid, with and without an energy-scale systematic.

use bbfit::axis::{AxisCollection, BinAxis};
use bbfit::binned::BinnedDistribution;
use bbfit::likelihood::BinnedNllh;
use bbfit::objective::Objective;
use bbfit::systematic::Systematic;
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use std::hint::black_box;

fn grid(n_energy: usize) -> AxisCollection {
    AxisCollection::from_axes(vec![
        BinAxis::new("energy", 0.0, 10.0, n_energy).unwrap(),
        BinAxis::new("radius", 0.0, 1.0, 10).unwrap(),
    ])
    .unwrap()
}

fn template(
    name: &str,
    axes: &AxisCollection,
    shape: impl Fn(f64, f64) -> f64,
) -> BinnedDistribution {
    let mut dist = BinnedDistribution::new(name, axes.clone());
    for i in 0..dist.n_bins() {
        let coords = dist.unflatten_index(i).unwrap();
        let e = axes.axes()[0].center(coords[0]);
        let r = axes.axes()[1].center(coords[1]);
        dist.set_bin_content(i, shape(e, r)).unwrap();
    }
    dist
}

fn likelihood(n_energy: usize, with_systematic: bool) -> BinnedNllh {
    let axes = grid(n_energy);
    let sig = template("sig", &axes, |e, r| {
        100.0 * (-0.5 * (e - 5.0).powi(2)).exp() * (1.0 - 0.5 * r)
    });
    let bkg = template("bkg", &axes, |e, _| 20.0 * (-0.3 * e).exp());
    let mut data = sig.scaled(1.1);
    data.add(&bkg).unwrap();
    data.set_name("data");
    for i in 0..data.n_bins() {
        let n = data.bin_content(i).unwrap().round();
        data.set_bin_content(i, n).unwrap();
    }

    let mut lh = BinnedNllh::new();
    lh.add_pdfs(vec![sig, bkg]).unwrap();
    lh.set_data_dist(data).unwrap();
    if with_systematic {
        lh.add_systematic(Systematic::scale("energy_scale", "e_scale", "energy"));
    }
    lh
}

fn bench_evaluate(c: &mut Criterion) {
    let mut group = c.benchmark_group("nllh_evaluate");
    for n_energy in [10, 50, 200] {
        let plain = likelihood(n_energy, false);
        group.bench_with_input(BenchmarkId::new("templates", n_energy), &plain, |b, lh| {
            b.iter(|| Objective::evaluate(lh, black_box(&[1.0, 1.1])))
        });

        let syst = likelihood(n_energy, true);
        group.bench_with_input(BenchmarkId::new("energy_scale", n_energy), &syst, |b, lh| {
            b.iter(|| Objective::evaluate(lh, black_box(&[1.0, 1.01, 1.1])))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_evaluate);
criterion_main!(benches);
