//! Simulation driver.
//!
//! Owns every piece of mutable state of a run: the qubit store, one memory
//! per node, one swap protocol per repeater, one correction protocol per
//! path and the fidelity collector. Events are dispatched one at a time from
//! the [`Scheduler`]; protocol handlers report back through [`Signal`]s which
//! the driver turns into new events.

use crate::SimError;
use crate::collector::{FidelityCollector, FidelitySample};
use crate::graph::{LinkId, NetworkGraph, NodeIndex};
use crate::memory::QuantumMemory;
use crate::noise::{
    DephaseNoiseModel, DepolarNoiseModel, FibreDepolarizeModel, check_length, check_probability,
};
use crate::protocol::{CorrectProtocol, Message, Signal, SwapProtocol};
use crate::qstate::{QubitId, QubitStore};
use crate::routing::{PathId, Route, check_reservations};
use crate::scheduler::Scheduler;
use log::{debug, error, info};
use qnet_common::{BellIndex, Coord, defaults};
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::collections::{BTreeSet, HashMap};

/// Noise parameters shared by every link and memory.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NoiseConfig {
    pub p_depol_init: f64,
    pub p_depol_length: f64,
    pub memory_noise_rate_hz: f64,
    pub gate_noise_rate_hz: f64,
    pub gate_duration_ns: f64,
}

impl Default for NoiseConfig {
    fn default() -> Self {
        Self {
            p_depol_init: defaults::P_DEPOL_INIT,
            p_depol_length: defaults::P_DEPOL_LENGTH,
            memory_noise_rate_hz: defaults::MEMORY_NOISE_RATE_HZ,
            gate_noise_rate_hz: defaults::GATE_NOISE_RATE_HZ,
            gate_duration_ns: defaults::GATE_DURATION_NS,
        }
    }
}

impl NoiseConfig {
    /// Every noise source switched off. Gates keep their duration.
    pub fn noiseless() -> Self {
        Self {
            p_depol_init: 0.0,
            p_depol_length: 0.0,
            memory_noise_rate_hz: 0.0,
            gate_noise_rate_hz: 0.0,
            gate_duration_ns: defaults::GATE_DURATION_NS,
        }
    }

    /// Checks every probability, rate and duration.
    pub fn validate(&self) -> Result<(), SimError> {
        check_probability("p_depol_init", self.p_depol_init)?;
        check_probability("p_depol_length", self.p_depol_length)?;
        DepolarNoiseModel::new(self.memory_noise_rate_hz)?;
        DephaseNoiseModel::new(self.gate_noise_rate_hz)?;
        if !self.gate_duration_ns.is_finite() || self.gate_duration_ns < 0.0 {
            return Err(SimError::InvalidConfig(format!(
                "gate duration must be finite and non-negative, got {} ns",
                self.gate_duration_ns
            )));
        }
        Ok(())
    }
}

/// Full description of one simulation run.
#[derive(Debug, Clone, PartialEq)]
pub struct SimConfig {
    /// Grid side length.
    pub n: u16,
    pub node_distance_km: f64,
    pub source_frequency_hz: f64,
    pub noise: NoiseConfig,
    pub num_positions: usize,
    /// Number of estimated round times to simulate.
    pub num_iters: usize,
    pub seed: u64,
    /// One node list per path, Alice first.
    pub traffic: Vec<Vec<Coord>>,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            n: defaults::GRID_SIZE,
            node_distance_km: defaults::NODE_DISTANCE_KM,
            source_frequency_hz: defaults::SOURCE_FREQUENCY_HZ,
            noise: NoiseConfig::default(),
            num_positions: defaults::NUM_POSITIONS,
            num_iters: defaults::NUM_ITERS,
            seed: 0,
            traffic: Vec::new(),
        }
    }
}

impl SimConfig {
    /// Checks every scalar parameter. Topology checks happen when the
    /// network is built in [`Simulation::new`].
    pub fn validate(&self) -> Result<(), SimError> {
        if self.n == 0 {
            return Err(SimError::InvalidConfig("grid size must be at least 1".into()));
        }
        check_length(self.node_distance_km)?;
        if !self.source_frequency_hz.is_finite() || self.source_frequency_hz <= 0.0 {
            return Err(SimError::InvalidConfig(format!(
                "source frequency must be positive, got {} Hz",
                self.source_frequency_hz
            )));
        }
        if self.num_iters == 0 {
            return Err(SimError::InvalidConfig("num_iters must be at least 1".into()));
        }
        if self.traffic.is_empty() {
            return Err(SimError::InvalidConfig("traffic contains no paths".into()));
        }
        self.noise.validate()
    }

    /// Time between two emissions of a pair source, in ns.
    pub fn emission_period_ns(&self) -> f64 {
        1e9 / self.source_frequency_hz
    }
}

/// Outcome of a run.
#[derive(Debug, Clone, PartialEq)]
pub struct SimReport {
    /// One sample per completed round, in completion order.
    pub samples: Vec<FidelitySample>,
    /// Error that stopped the run early, if any. Samples gathered before it
    /// are kept.
    pub aborted: Option<SimError>,
    /// Rounds that completed without both end qubits present.
    pub missed: usize,
    pub end_time_ns: f64,
    pub events: u64,
}

impl SimReport {
    /// Samples of a single path.
    pub fn path_samples(&self, path: PathId) -> impl Iterator<Item = &FidelitySample> {
        self.samples.iter().filter(move |s| s.path == path)
    }

    /// Mean fidelity over every path, or `None` without samples.
    pub fn mean_fidelity(&self) -> Option<f64> {
        if self.samples.is_empty() {
            return None;
        }
        Some(self.samples.iter().map(|s| s.fidelity).sum::<f64>() / self.samples.len() as f64)
    }
}

#[derive(Debug, Clone)]
enum Event {
    SourceEmit {
        link: LinkId,
        tick: u64,
    },
    QubitArrival {
        node: NodeIndex,
        slot: usize,
        qubit: QubitId,
    },
    ClassicalArrival {
        path: PathId,
        station: usize,
        message: Message,
    },
    ProgramDone {
        path: PathId,
        station: usize,
        outcomes: Vec<BellIndex>,
    },
    RoundComplete {
        path: PathId,
        round: u64,
    },
}

/// Protocol instances of one path.
struct PathTasks {
    route: Route,
    /// `swaps[i]` runs on station `i + 1`.
    swaps: Vec<SwapProtocol>,
    correct: CorrectProtocol,
    rounds_signalled: u64,
}

/// A fully built, validated simulation ready to run.
pub struct Simulation {
    config: SimConfig,
    graph: NetworkGraph,
    fibre: FibreDepolarizeModel,
    memories: Vec<QuantumMemory>,
    paths: Vec<PathTasks>,
    /// Which path station owns a reserved memory position.
    owners: HashMap<(NodeIndex, usize), (PathId, usize)>,
    clocked_links: Vec<LinkId>,
    store: QubitStore,
    rng: StdRng,
    scheduler: Scheduler<Event>,
    collector: FidelityCollector,
    horizon_ns: f64,
}

impl Simulation {
    /// Builds the network and every protocol.
    ///
    /// # Returns
    ///
    /// The simulation, or the first configuration or topology error. No
    /// event has run at that point.
    pub fn new(config: SimConfig) -> Result<Self, SimError> {
        config.validate()?;
        let graph = NetworkGraph::grid(config.n, config.node_distance_km, config.num_positions)?;
        let routes = config
            .traffic
            .iter()
            .enumerate()
            .map(|(id, coords)| Route::new(&graph, id, coords))
            .collect::<Result<Vec<_>, _>>()?;
        check_reservations(&graph, &routes)?;

        let noise = config.noise;
        let fibre = FibreDepolarizeModel::new(noise.p_depol_init, noise.p_depol_length)?;
        let mem_noise = DepolarNoiseModel::new(noise.memory_noise_rate_hz)?;
        let gate_noise = DephaseNoiseModel::new(noise.gate_noise_rate_hz)?;
        let memories = (0..graph.num_nodes())
            .map(|_| {
                QuantumMemory::new(
                    graph.num_positions(),
                    mem_noise,
                    gate_noise,
                    noise.gate_duration_ns,
                )
            })
            .collect();

        let mut owners = HashMap::new();
        let mut clocked = BTreeSet::new();
        for route in &routes {
            for (i, station) in route.stations().iter().enumerate() {
                for slot in station.slots() {
                    owners.insert((station.node, slot), (route.id, i));
                }
            }
            clocked.extend(route.hops().iter().copied());
        }

        let horizon_ns = routes
            .iter()
            .map(|r| r.estimated_runtime_ns(config.node_distance_km))
            .fold(0.0, f64::max)
            * config.num_iters as f64;

        let paths = routes
            .into_iter()
            .map(|route| {
                let swaps = route.stations()[1..route.bob_index()]
                    .iter()
                    .map(|s| {
                        SwapProtocol::new(
                            route.id,
                            s.left_slot.unwrap_or_default(),
                            s.right_slot.unwrap_or_default(),
                        )
                    })
                    .collect();
                let correct = CorrectProtocol::new(route.id, route.num_nodes(), route.bob_slot());
                PathTasks {
                    route,
                    swaps,
                    correct,
                    rounds_signalled: 0,
                }
            })
            .collect();

        let rng = StdRng::seed_from_u64(config.seed);
        Ok(Self {
            config,
            graph,
            fibre,
            memories,
            paths,
            owners,
            clocked_links: clocked.into_iter().collect(),
            store: QubitStore::new(),
            rng,
            scheduler: Scheduler::new(),
            collector: FidelityCollector::new(),
            horizon_ns,
        })
    }

    /// Simulated time the run covers, in ns.
    pub fn horizon_ns(&self) -> f64 {
        self.horizon_ns
    }

    /// Routes in traffic order.
    pub fn routes(&self) -> impl Iterator<Item = &Route> {
        self.paths.iter().map(|p| &p.route)
    }

    /// Runs the timeline up to the horizon and returns the report.
    pub fn run(mut self) -> SimReport {
        info!(
            "simulating {} path(s) on a {}x{} grid for {} ns",
            self.paths.len(),
            self.config.n,
            self.config.n,
            self.horizon_ns
        );
        for &link in &self.clocked_links {
            self.scheduler.schedule_at(0.0, Event::SourceEmit { link, tick: 0 });
        }

        let mut events = 0u64;
        let mut aborted = None;
        while let Some((now, event)) = self.scheduler.next_until(self.horizon_ns) {
            events += 1;
            if let Err(err) = self.dispatch(now, event) {
                error!("simulation aborted at t={now} ns: {err}");
                aborted = Some(err);
                break;
            }
        }

        let end_time_ns = self.scheduler.now();
        let missed = self.collector.missed();
        let samples = self.collector.into_samples();
        info!(
            "finished at t={end_time_ns} ns after {events} events with {} samples",
            samples.len()
        );
        SimReport {
            samples,
            aborted,
            missed,
            end_time_ns,
            events,
        }
    }

    fn dispatch(&mut self, now: f64, event: Event) -> Result<(), SimError> {
        match event {
            Event::SourceEmit { link, tick } => self.emit(link, tick),
            Event::QubitArrival { node, slot, qubit } => self.qubit_arrival(now, node, slot, qubit),
            Event::ClassicalArrival {
                path,
                station,
                message,
            } => self.classical_arrival(now, path, station, message),
            Event::ProgramDone {
                path,
                station,
                outcomes,
            } => self.program_done(now, path, station, &outcomes),
            Event::RoundComplete { path, round } => self.round_complete(now, path, round),
        }
    }

    fn emit(&mut self, link_id: LinkId, tick: u64) -> Result<(), SimError> {
        let link = self.graph.link(link_id).clone();
        let (qa, qb) = self.store.create_bell_pair();
        self.fibre
            .error_operation(&mut self.store, &[qa, qb], link.half_length_km())?;
        let delay = link.quantum_delay_ns();
        self.scheduler.schedule_in(
            delay,
            Event::QubitArrival {
                node: link.a,
                slot: link.slot_a,
                qubit: qa,
            },
        );
        self.scheduler.schedule_in(
            delay,
            Event::QubitArrival {
                node: link.b,
                slot: link.slot_b,
                qubit: qb,
            },
        );

        let next = (tick + 1) as f64 * self.config.emission_period_ns();
        if next <= self.horizon_ns {
            self.scheduler.schedule_at(
                next,
                Event::SourceEmit {
                    link: link_id,
                    tick: tick + 1,
                },
            );
        }
        Ok(())
    }

    fn qubit_arrival(
        &mut self,
        now: f64,
        node: NodeIndex,
        slot: usize,
        qubit: QubitId,
    ) -> Result<(), SimError> {
        if let Some(old) = self.memories[node].put(slot, qubit, now)? {
            debug!("{}: position {slot} overwritten, dropping {old}", self.graph.coord(node));
            self.store.discard(old)?;
        }
        let Some(&(path, station)) = self.owners.get(&(node, slot)) else {
            return Ok(());
        };
        let tasks = &mut self.paths[path];
        let signals = if station == tasks.route.bob_index() {
            tasks.correct.on_qubit_arrival()
        } else if station == 0 {
            Vec::new()
        } else {
            tasks.swaps[station - 1].on_qubit_arrival(
                &mut self.memories[node],
                &mut self.store,
                &mut self.rng,
                now,
            )?
        };
        self.apply_signals(now, path, station, signals);
        Ok(())
    }

    fn classical_arrival(
        &mut self,
        now: f64,
        path: PathId,
        station: usize,
        message: Message,
    ) -> Result<(), SimError> {
        let tasks = &mut self.paths[path];
        if station < tasks.route.bob_index() {
            // Relay towards Bob.
            let hop = self.graph.link(tasks.route.hops()[station]);
            self.scheduler.schedule_in(
                hop.classical_delay_ns(),
                Event::ClassicalArrival {
                    path,
                    station: station + 1,
                    message,
                },
            );
            return Ok(());
        }
        let node = tasks.route.bob().node;
        let signals = tasks.correct.on_message(
            message,
            &mut self.memories[node],
            &mut self.store,
            &mut self.rng,
            now,
        )?;
        self.apply_signals(now, path, station, signals);
        Ok(())
    }

    fn program_done(
        &mut self,
        now: f64,
        path: PathId,
        station: usize,
        outcomes: &[BellIndex],
    ) -> Result<(), SimError> {
        let tasks = &mut self.paths[path];
        let node = tasks.route.station(station).node;
        let memory = &mut self.memories[node];
        let signals = if station == tasks.route.bob_index() {
            tasks
                .correct
                .on_program_done(memory, &mut self.store, &mut self.rng, now)?
        } else {
            tasks.swaps[station - 1].on_program_done(
                outcomes,
                memory,
                &mut self.store,
                &mut self.rng,
                now,
            )?
        };
        self.apply_signals(now, path, station, signals);
        Ok(())
    }

    fn round_complete(&mut self, now: f64, path: PathId, round: u64) -> Result<(), SimError> {
        let route = &self.paths[path].route;
        let (alice, alice_slot) = (route.alice().node, route.alice_slot());
        let (bob, bob_slot) = (route.bob().node, route.bob_slot());
        // Both ends idled through the classical round trip.
        let a = self.memories[alice].peek_refreshed(alice_slot, now, &mut self.store)?;
        let b = self.memories[bob].peek_refreshed(bob_slot, now, &mut self.store)?;
        if let Some(f) = self.collector.collect(path, round, now, a, b, &self.store)? {
            debug!("path {path}: round {round} fidelity {f:.4}");
        }
        Ok(())
    }

    fn apply_signals(&mut self, now: f64, path: PathId, station: usize, signals: Vec<Signal>) {
        for signal in signals {
            match signal {
                Signal::ProgramStarted {
                    finish_ns,
                    outcomes,
                } => self.scheduler.schedule_at(
                    finish_ns,
                    Event::ProgramDone {
                        path,
                        station,
                        outcomes,
                    },
                ),
                Signal::Forward(message) => {
                    let hop = self.graph.link(self.paths[path].route.hops()[station]);
                    self.scheduler.schedule_in(
                        hop.classical_delay_ns(),
                        Event::ClassicalArrival {
                            path,
                            station: station + 1,
                            message,
                        },
                    );
                }
                Signal::RoundComplete => {
                    let tasks = &mut self.paths[path];
                    let round = tasks.rounds_signalled;
                    tasks.rounds_signalled += 1;
                    // Queued behind everything already due now, so both end
                    // qubits of the round are in place when it is collected.
                    self.scheduler
                        .schedule_at(now, Event::RoundComplete { path, round });
                }
            }
        }
    }
}

/// Builds and runs a simulation in one call.
pub fn simulate(config: SimConfig) -> Result<SimReport, SimError> {
    Ok(Simulation::new(config)?.run())
}
