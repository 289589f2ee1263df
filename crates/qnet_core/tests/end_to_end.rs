use qnet_common::Coord;
use qnet_core::SimError;
use qnet_core::sim::{NoiseConfig, SimConfig, Simulation, simulate};

fn c(row: u16, col: u16) -> Coord {
    Coord::new(row, col)
}

/// 2x2 grid, one repeater between (0, 0) and (1, 1).
fn corner_path(noise: NoiseConfig) -> SimConfig {
    SimConfig {
        n: 2,
        node_distance_km: 20.0,
        source_frequency_hz: 4_000.0,
        noise,
        num_iters: 100,
        seed: 1234,
        traffic: vec![vec![c(0, 0), c(0, 1), c(1, 1)]],
        ..SimConfig::default()
    }
}

#[test]
fn noiseless_swap_delivers_perfect_pairs() {
    let report = simulate(corner_path(NoiseConfig::noiseless())).unwrap();
    assert!(report.aborted.is_none());
    assert_eq!(report.samples.len(), 100);
    assert_eq!(report.missed, 0);
    for s in &report.samples {
        assert!((s.fidelity - 1.0).abs() < 1e-9, "round {} gave {}", s.round, s.fidelity);
    }
}

#[test]
fn default_noise_degrades_but_keeps_entanglement() {
    let report = simulate(corner_path(NoiseConfig::default())).unwrap();
    assert!(report.aborted.is_none());
    assert_eq!(report.samples.len(), 100);
    let mean = report.mean_fidelity().unwrap();
    assert!(mean > 0.25 && mean < 1.0, "mean fidelity {mean}");
}

#[test]
fn idle_end_qubits_decohere_whatever_the_outcomes() {
    let noise = NoiseConfig {
        memory_noise_rate_hz: 10_000.0,
        ..NoiseConfig::noiseless()
    };
    let report = simulate(corner_path(noise)).unwrap();
    assert!(report.aborted.is_none());
    assert_eq!(report.samples.len(), 100);

    // Both ends wait about 100 us for the swap outcome whether or not Bob
    // has to correct, so every round sees the same memory noise.
    for s in &report.samples {
        assert!(s.fidelity < 0.5, "round {} gave {}", s.round, s.fidelity);
    }
    let lo = report.samples.iter().map(|s| s.fidelity).fold(f64::INFINITY, f64::min);
    let hi = report.samples.iter().map(|s| s.fidelity).fold(f64::NEG_INFINITY, f64::max);
    assert!(hi - lo < 1e-3, "fidelity spread {lo}..{hi}");
}

#[test]
fn same_seed_same_samples() {
    let a = simulate(corner_path(NoiseConfig::default())).unwrap();
    let b = simulate(corner_path(NoiseConfig::default())).unwrap();
    assert_eq!(a.samples, b.samples);
}

#[test]
fn direct_link_completes_every_emission() {
    let mut cfg = corner_path(NoiseConfig::noiseless());
    cfg.traffic = vec![vec![c(0, 0), c(1, 0)]];
    cfg.num_iters = 10;
    // Horizon: 1.5 * 20 km * 5000 ns/km * 10 = 1.5 ms, one emission every
    // 250 us, first arrival after 50 us.
    let report = simulate(cfg).unwrap();
    assert_eq!(report.samples.len(), 6);
    assert!(report.samples.iter().all(|s| (s.fidelity - 1.0).abs() < 1e-9));
}

#[test]
fn longer_chain_stays_perfect_without_noise() {
    let cfg = SimConfig {
        n: 3,
        node_distance_km: 10.0,
        source_frequency_hz: 2_000.0,
        noise: NoiseConfig::noiseless(),
        num_iters: 20,
        seed: 9,
        traffic: vec![vec![c(0, 0), c(0, 1), c(0, 2), c(1, 2), c(2, 2)]],
        ..SimConfig::default()
    };
    let report = simulate(cfg).unwrap();
    assert!(report.aborted.is_none());
    assert!(!report.samples.is_empty());
    for s in &report.samples {
        assert!((s.fidelity - 1.0).abs() < 1e-9, "round {} gave {}", s.round, s.fidelity);
    }
}

#[test]
fn paths_sharing_a_node_run_side_by_side() {
    let cfg = SimConfig {
        n: 3,
        noise: NoiseConfig::noiseless(),
        source_frequency_hz: 4_000.0,
        num_iters: 10,
        traffic: vec![
            vec![c(0, 1), c(1, 1), c(2, 1)],
            vec![c(1, 0), c(1, 1), c(1, 2)],
        ],
        ..SimConfig::default()
    };
    let report = simulate(cfg).unwrap();
    assert!(report.aborted.is_none());
    assert!(report.path_samples(0).count() > 0);
    assert_eq!(report.path_samples(0).count(), report.path_samples(1).count());
    assert!(report.samples.iter().all(|s| (s.fidelity - 1.0).abs() < 1e-9));
}

#[test]
fn topology_errors_surface_before_running() {
    let mut cfg = corner_path(NoiseConfig::default());
    cfg.traffic.push(vec![c(0, 0), c(0, 1)]);
    assert!(matches!(
        Simulation::new(cfg).err(),
        Some(SimError::SlotConflict { .. })
    ));

    let mut cfg = corner_path(NoiseConfig::default());
    cfg.traffic = vec![vec![c(0, 0), c(1, 1)]];
    assert_eq!(
        Simulation::new(cfg).err(),
        Some(SimError::NotAdjacent(c(0, 0), c(1, 1)))
    );

    let mut cfg = corner_path(NoiseConfig::default());
    cfg.num_positions = 1;
    assert!(matches!(
        Simulation::new(cfg).err(),
        Some(SimError::SlotExhausted(_))
    ));
}
