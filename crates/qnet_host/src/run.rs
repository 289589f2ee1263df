use crate::stats::FidelityStats;
use anyhow::{Context, Result};
use qnet_common::Coord;
use qnet_core::routing::Route;
use qnet_core::sim::{SimConfig, Simulation};
use qnet_io::{parser, writer};
use std::time::Instant;

/// Simulates the traffic in `traffic_path` and prints per-path fidelity
/// statistics. Samples are written to `csv_path` when given.
pub fn run_simulation(
    mut config: SimConfig,
    traffic_path: &str,
    csv_path: Option<&str>,
) -> Result<()> {
    println!("Loading traffic from {}...", traffic_path);
    config.traffic = parser::load_traffic(traffic_path)?;
    println!("Loaded {} path(s).", config.traffic.len());

    let sim = Simulation::new(config.clone()).context("Invalid network or traffic")?;
    println!(
        "Grid: {0}x{0}, {1} km links, sources at {2} Hz, horizon {3:.0} ns",
        config.n,
        config.node_distance_km,
        config.source_frequency_hz,
        sim.horizon_ns()
    );

    let routes: Vec<Vec<Coord>> = sim.routes().map(Route::coords).collect();

    let start = Instant::now();
    let report = sim.run();
    let wall = start.elapsed();

    println!("Results");
    println!("Wall time: {:.4} s ({} events)", wall.as_secs_f64(), report.events);
    for (id, coords) in routes.iter().enumerate() {
        let stats = FidelityStats::from_values(report.path_samples(id).map(|s| s.fidelity));
        let hops: Vec<String> = coords.iter().map(Coord::to_string).collect();
        println!(
            "\nPath {id}: {} nodes, {} repeater(s): {}",
            coords.len(),
            coords.len().saturating_sub(2),
            hops.join(" -> ")
        );
        stats.print_report();
    }
    if report.missed > 0 {
        println!("\nRounds without a sample: {}", report.missed);
    }

    if let Some(path) = csv_path {
        writer::save_samples(path, &report.samples)?;
        println!("\nSamples written to {path}.");
    }

    if let Some(err) = report.aborted {
        return Err(err).context(format!(
            "Simulation aborted at t={} ns after {} sample(s)",
            report.end_time_ns,
            report.samples.len()
        ));
    }
    Ok(())
}
