//! Fidelity versus path length sweep.
//!
//! Every (length, seed) pair is an independent simulation with its own
//! timeline and RNG, so the pairs are spread over the rayon pool and the
//! results do not depend on thread scheduling.

use crate::stats::FidelityStats;
use anyhow::{Result, bail};
use log::warn;
use qnet_common::Coord;
use qnet_core::sim::{SimConfig, simulate};
use rayon::prelude::*;
use std::time::Instant;

/// Snake-shaped path of `len` nodes through an `n` x `n` grid.
///
/// Runs along row 0, drops one row at the end, comes back along row 1 and
/// so on. Consecutive nodes are always neighbours.
pub fn snake_path(n: u16, len: usize) -> Vec<Coord> {
    let width = n as usize;
    (0..len)
        .map(|i| {
            let row = i / width;
            let offset = i % width;
            let col = if row % 2 == 0 { offset } else { width - 1 - offset };
            Coord::new(row as u16, col as u16)
        })
        .collect()
}

/// Sweeps path lengths `2..=max_len` over `seeds` seeds each and prints a
/// table of mean fidelity and key fraction per length.
pub fn run_sweep(base: SimConfig, max_len: usize, seeds: u64) -> Result<()> {
    let capacity = base.n as usize * base.n as usize;
    if max_len < 2 || max_len > capacity {
        bail!(
            "path length must lie in 2..={capacity} on a {0}x{0} grid, got {max_len}",
            base.n
        );
    }

    println!(
        "Sweeping path lengths 2..={max_len} with {seeds} seed(s) each ({} threads)...",
        rayon::current_num_threads()
    );
    let start = Instant::now();

    let jobs: Vec<(usize, u64)> = (2..=max_len)
        .flat_map(|len| (0..seeds).map(move |seed| (len, seed)))
        .collect();

    let results: Vec<(usize, FidelityStats)> = jobs
        .par_iter()
        .map(|&(len, seed)| {
            let config = SimConfig {
                seed: base.seed.wrapping_add(seed),
                traffic: vec![snake_path(base.n, len)],
                ..base.clone()
            };
            let report = simulate(config)?;
            if let Some(err) = &report.aborted {
                warn!("length {len}, seed {seed}: aborted early: {err}");
            }
            let stats = FidelityStats::from_values(report.samples.iter().map(|s| s.fidelity));
            Ok((len, stats))
        })
        .collect::<Result<_, qnet_core::SimError>>()?;

    println!("Sweep finished in {:.3} s", start.elapsed().as_secs_f64());
    println!("{:>6} {:>8} {:>8} {:>8} {:>8} {:>8}", "nodes", "rounds", "min", "avg", "max", "key");
    for len in 2..=max_len {
        let stats = results
            .iter()
            .filter(|(l, _)| *l == len)
            .fold(FidelityStats::new(), |acc, (_, s)| acc.merge(s));
        if stats.count == 0 {
            println!("{len:>6} {:>8}", 0);
            continue;
        }
        println!(
            "{:>6} {:>8} {:>8.4} {:>8.4} {:>8.4} {:>8.4}",
            len,
            stats.count,
            stats.min,
            stats.avg(),
            stats.max,
            stats.key_fraction()
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snake_turns_at_the_edge() {
        let c = Coord::new;
        assert_eq!(
            snake_path(3, 5),
            vec![c(0, 0), c(0, 1), c(0, 2), c(1, 2), c(1, 1)]
        );
        let long = snake_path(4, 16);
        assert!(long.windows(2).all(|w| w[0].is_adjacent(&w[1])));
        assert_eq!(long.last(), Some(&c(3, 0)));
    }

    #[test]
    fn sweep_rejects_impossible_lengths() {
        let base = SimConfig {
            n: 2,
            ..SimConfig::default()
        };
        assert!(run_sweep(base.clone(), 5, 1).is_err());
        assert!(run_sweep(base, 1, 1).is_err());
    }
}
