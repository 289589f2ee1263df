mod generator;
mod run;
mod stats;
mod sweep;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use qnet_common::defaults;
use qnet_core::sim::{NoiseConfig, SimConfig};

#[derive(Parser)]
#[command(name = "qnet", about = "Entanglement swapping on an n x n quantum repeater grid")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Network and noise parameters shared by `run` and `sweep`.
#[derive(Args, Clone, Debug)]
struct NetArgs {
    /// Grid side length.
    #[arg(short, long, default_value_t = defaults::GRID_SIZE)]
    n: u16,
    /// Distance between neighbouring nodes, in km.
    #[arg(long, default_value_t = defaults::NODE_DISTANCE_KM)]
    distance: f64,
    /// Pair source frequency, in Hz.
    #[arg(long, default_value_t = defaults::SOURCE_FREQUENCY_HZ)]
    freq: f64,
    #[arg(long, default_value_t = defaults::P_DEPOL_INIT)]
    p_depol_init: f64,
    #[arg(long, default_value_t = defaults::P_DEPOL_LENGTH)]
    p_depol_length: f64,
    /// Memory depolarization rate, in Hz.
    #[arg(long, default_value_t = defaults::MEMORY_NOISE_RATE_HZ)]
    memory_noise: f64,
    /// Gate dephasing rate, in Hz.
    #[arg(long, default_value_t = defaults::GATE_NOISE_RATE_HZ)]
    gate_noise: f64,
    /// Gate duration, in ns.
    #[arg(long, default_value_t = defaults::GATE_DURATION_NS)]
    gate_duration: f64,
    /// Memory positions per node.
    #[arg(long, default_value_t = defaults::NUM_POSITIONS)]
    positions: usize,
    /// Number of estimated round times to simulate.
    #[arg(long, default_value_t = defaults::NUM_ITERS)]
    iters: usize,
    #[arg(long, default_value_t = 0)]
    seed: u64,
    /// Switch every noise source off.
    #[arg(long)]
    noiseless: bool,
}

impl NetArgs {
    fn config(&self) -> SimConfig {
        let noise = if self.noiseless {
            NoiseConfig {
                gate_duration_ns: self.gate_duration,
                ..NoiseConfig::noiseless()
            }
        } else {
            NoiseConfig {
                p_depol_init: self.p_depol_init,
                p_depol_length: self.p_depol_length,
                memory_noise_rate_hz: self.memory_noise,
                gate_noise_rate_hz: self.gate_noise,
                gate_duration_ns: self.gate_duration,
            }
        };
        SimConfig {
            n: self.n,
            node_distance_km: self.distance,
            source_frequency_hz: self.freq,
            noise,
            num_positions: self.positions,
            num_iters: self.iters,
            seed: self.seed,
            traffic: Vec::new(),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Write a file of random routes.
    Gen {
        #[arg(short, long, default_value = "traffic.txt")]
        out: String,
        #[arg(short, long, default_value_t = defaults::GRID_SIZE)]
        n: u16,
        #[arg(short, long, default_value_t = 1)]
        count: usize,
        #[arg(long, default_value_t = 0)]
        seed: u64,
        /// Allow routes that share links (they cannot run together).
        #[arg(long)]
        overlapping: bool,
    },
    /// Simulate the routes of a traffic file.
    Run {
        #[arg(short, long)]
        traffic: String,
        /// Write per-round samples as CSV.
        #[arg(long)]
        csv: Option<String>,
        #[command(flatten)]
        net: NetArgs,
    },
    /// Fidelity against path length, one simulation per length and seed.
    Sweep {
        #[arg(long, default_value_t = 5)]
        max_len: usize,
        #[arg(long, default_value_t = 4)]
        seeds: u64,
        #[command(flatten)]
        net: NetArgs,
    },
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    match cli.command {
        Commands::Gen {
            out,
            n,
            count,
            seed,
            overlapping,
        } => {
            generator::generate_traffic(&out, n, count, seed, !overlapping)?;
        }
        Commands::Run {
            traffic,
            csv,
            net,
        } => {
            run::run_simulation(net.config(), &traffic, csv.as_deref())?;
        }
        Commands::Sweep {
            max_len,
            seeds,
            net,
        } => {
            sweep::run_sweep(net.config(), max_len, seeds)?;
        }
    }
    Ok(())
}
