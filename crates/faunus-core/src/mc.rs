use crate::core::space::Space;
use crate::energy::{system_energy, Hamiltonian};
use crate::error::{CoreError, Result};
use crate::moves::{execute, Move};
use rand::distributions::{Distribution, WeightedIndex};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Outcome of a [`MarkovChain::run`].
#[derive(Debug, Clone, Copy)]
pub struct RunReport {
    pub steps: u64,
    pub interrupted: bool,
    /// Final audit drift: recomputed energy minus the tracked sum.
    pub drift: f64,
}

/// The Monte Carlo driver: weighted move selection, Metropolis stepping and
/// the periodic drift audit.
pub struct MarkovChain {
    moves: Vec<Box<dyn Move>>,
    weights: Vec<f64>,
    selector: Option<WeightedIndex<f64>>,
    rng: StdRng,
    /// Reference energy of the starting configuration.
    u0: f64,
    pub audit_interval: u64,
    pub drift_tolerance: f64,
    pub strict: bool,
    stop: Arc<AtomicBool>,
}

impl MarkovChain {
    pub fn new(seed: u64) -> Self {
        Self {
            moves: Vec::new(),
            weights: Vec::new(),
            selector: None,
            rng: StdRng::seed_from_u64(seed),
            u0: 0.0,
            audit_interval: 1000,
            drift_tolerance: 1e-6,
            strict: false,
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn add_move(&mut self, mv: Box<dyn Move>, weight: f64) {
        self.moves.push(mv);
        self.weights.push(weight.max(0.0));
        self.selector = None;
    }

    /// Handle for cooperative interruption; checked between macro steps.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        self.stop.clone()
    }

    /// Record the reference energy of the committed configuration.
    pub fn init(&mut self, space: &Space, pot: &Hamiltonian) {
        self.u0 = system_energy(&space.committed(), pot);
        info!(u0 = self.u0, "initial system energy (kT)");
    }

    /// Sum of accepted energy changes over all moves.
    pub fn dusum(&self) -> f64 {
        self.moves.iter().map(|m| m.stats().dusum).sum()
    }

    /// Recompute the total energy and compare with `u0 + Σdu`.
    pub fn drift(&self, space: &Space, pot: &Hamiltonian) -> f64 {
        system_energy(&space.committed(), pot) - (self.u0 + self.dusum())
    }

    /// One macro step: draw a move by weight and attempt it.
    pub fn step(&mut self, space: &mut Space, pot: &Hamiltonian) -> Result<f64> {
        if self.moves.is_empty() {
            return Err(CoreError::Config("no moves registered".into()));
        }
        if self.selector.is_none() {
            self.selector = Some(
                WeightedIndex::new(&self.weights)
                    .map_err(|e| CoreError::Config(format!("bad move weights: {e}")))?,
            );
        }
        let pick = self
            .selector
            .as_ref()
            .expect("selector built above")
            .sample(&mut self.rng);
        Ok(execute(
            self.moves[pick].as_mut(),
            space,
            pot,
            &mut self.rng,
        ))
    }

    /// Run `n` macro steps with periodic drift audits.
    ///
    /// A drift above tolerance is a warning, or an error in strict mode; the
    /// stop flag is honored between steps and in-flight steps complete.
    pub fn run(&mut self, space: &mut Space, pot: &Hamiltonian, n: u64) -> Result<RunReport> {
        let mut interrupted = false;
        let mut steps = 0;
        for i in 0..n {
            if self.stop.load(Ordering::Relaxed) {
                interrupted = true;
                break;
            }
            self.step(space, pot)?;
            steps = i + 1;
            if self.audit_interval > 0 && steps % self.audit_interval == 0 {
                let drift = self.drift(space, pot);
                debug!(steps, drift, "drift audit");
                if drift.abs() > self.drift_tolerance * steps as f64 {
                    if self.strict {
                        return Err(CoreError::DriftExceeded {
                            drift,
                            threshold: self.drift_tolerance * steps as f64,
                        });
                    }
                    warn!(
                        drift,
                        steps, "energy drift above threshold; bookkeeping may be inconsistent"
                    );
                }
            }
        }
        Ok(RunReport {
            steps,
            interrupted,
            drift: self.drift(space, pot),
        })
    }

    /// Per-move acceptance report.
    pub fn report(&self) -> String {
        self.moves
            .iter()
            .map(|m| m.info())
            .collect::<Vec<_>>()
            .join("\n")
    }
}
