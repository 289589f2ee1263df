//! Random traffic generator.
//!
//! Draws random staircase routes between distinct grid nodes and writes
//! them in the traffic file format, so runs can be repeated from a file.

use anyhow::{Result, bail};
use qnet_common::Coord;
use qnet_core::routing::random_route;
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::collections::HashSet;

/// Draws `count` random routes on an `n` x `n` grid.
///
/// With `disjoint` set, a route sharing a link with an earlier one is
/// redrawn, so the whole set can run in one simulation. Gives up after a
/// bounded number of attempts.
pub fn random_traffic(n: u16, count: usize, seed: u64, disjoint: bool) -> Result<Vec<Vec<Coord>>> {
    if n < 2 {
        bail!("grid of size {n} has no pair of distinct nodes");
    }
    let mut rng = StdRng::seed_from_u64(seed);
    let mut used: HashSet<(Coord, Coord)> = HashSet::new();
    let mut paths = Vec::with_capacity(count);
    let max_attempts = count.saturating_mul(1000).max(1000);

    let mut attempts = 0;
    while paths.len() < count {
        attempts += 1;
        if attempts > max_attempts {
            bail!(
                "could only place {} of {count} link-disjoint routes on a {n}x{n} grid",
                paths.len()
            );
        }
        let Some(route) = random_route(n, &mut rng) else {
            bail!("grid of size {n} has no pair of distinct nodes");
        };
        let hops: Vec<(Coord, Coord)> = route
            .windows(2)
            .map(|w| (w[0].min(w[1]), w[0].max(w[1])))
            .collect();
        if disjoint && hops.iter().any(|h| used.contains(h)) {
            continue;
        }
        used.extend(hops);
        paths.push(route);
    }
    Ok(paths)
}

/// Generates random traffic and writes it to `out`.
pub fn generate_traffic(out: &str, n: u16, count: usize, seed: u64, disjoint: bool) -> Result<()> {
    println!("Generating {count} random route(s) on a {n}x{n} grid (seed {seed})...");
    let paths = random_traffic(n, count, seed, disjoint)?;
    for (id, p) in paths.iter().enumerate() {
        println!("  path {id}: {} nodes", p.len());
    }
    qnet_io::parser::save_traffic(out, &paths)?;
    println!("Written to {out}.");
    Ok(())
}
