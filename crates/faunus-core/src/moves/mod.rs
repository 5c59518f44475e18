//! Trial moves and the accept/reject machinery.
//!
//! Moves mutate only the trial state of [`Space`] and describe what they
//! touched through a [`Change`]; [`execute`] owns the Metropolis decision and
//! the sync/revert of the space, so a move can never leave the two states
//! out of step.

pub mod isobaric;
pub mod rotate;
pub mod saltbath;
pub mod titrate;
pub mod translate;

pub use isobaric::Isobaric;
pub use rotate::MoleculeTransRot;
pub use saltbath::{AtomTracker, SaltBath};
pub use titrate::Titration;
pub use translate::ParticleTranslation;

use crate::core::average::Average;
use crate::core::space::{Change, Space};
use crate::energy::Hamiltonian;
use rand::rngs::StdRng;
use rand::Rng;
use tracing::warn;

/// Counters shared by every move.
#[derive(Debug, Clone, Copy, Default)]
pub struct MoveStatistics {
    pub trials: u64,
    pub accepted: u64,
    /// Sum of accepted energy changes, the incremental side of the drift
    /// audit.
    pub dusum: f64,
    /// Mean-square displacement of whatever the move displaces.
    pub msd: Average,
}

impl MoveStatistics {
    pub fn acceptance(&self) -> f64 {
        if self.trials == 0 {
            0.0
        } else {
            self.accepted as f64 / self.trials as f64
        }
    }
}

/// A Markov-chain trial move.
///
/// `energy_change` returns the full argument of the Metropolis exponential,
/// including any additive bias (volume-move Jacobian, chemical potentials).
/// `+∞` means certain rejection, never an error.
pub trait Move {
    fn name(&self) -> &'static str;

    /// Fraction of calls that actually attempt a move.
    fn runfraction(&self) -> f64 {
        1.0
    }

    /// Mutate the trial state and report what was touched. An empty change
    /// aborts the attempt (e.g. the target group is empty).
    fn trial_move(&mut self, space: &mut Space, rng: &mut StdRng) -> Change;

    fn energy_change(&self, space: &Space, pot: &Hamiltonian, change: &Change) -> f64;

    /// Called after the space has been synced.
    fn on_accept(&mut self, _space: &Space, _change: &Change) {}

    /// Called after the trial state has been restored.
    fn on_reject(&mut self, _space: &Space, _change: &Change) {}

    fn stats(&self) -> &MoveStatistics;

    fn stats_mut(&mut self) -> &mut MoveStatistics;

    fn info(&self) -> String {
        let s = self.stats();
        format!(
            "{:<16} trials {:>9}  accepted {:>6.1}%  <du> sum {:>12.4}",
            self.name(),
            s.trials,
            100.0 * s.acceptance(),
            s.dusum
        )
    }
}

/// Metropolis criterion for an energy change in kT.
///
/// `NaN` is rejected with a log message; `+∞` is rejected silently (a plain
/// overlap); `−∞` is certain acceptance.
pub fn metropolis(du: f64, rng: &mut StdRng) -> bool {
    if du.is_nan() {
        warn!("rejecting trial move with NaN energy change");
        return false;
    }
    if du == f64::INFINITY {
        return false;
    }
    du <= 0.0 || rng.gen::<f64>() < (-du).exp()
}

/// Run one attempt of a move: runfraction gate, trial, energy change,
/// Metropolis, then commit or revert. Returns the accepted energy change
/// (zero on skip or rejection).
pub fn execute(
    mv: &mut dyn Move,
    space: &mut Space,
    pot: &Hamiltonian,
    rng: &mut StdRng,
) -> f64 {
    let runfraction = mv.runfraction();
    if runfraction < 1.0 && rng.gen::<f64>() > runfraction {
        return 0.0;
    }
    mv.stats_mut().trials += 1;
    let change = mv.trial_move(space, rng);
    if change.is_empty() {
        return 0.0;
    }
    let du = mv.energy_change(space, pot, &change);
    if metropolis(du, rng) {
        space.sync(&change);
        let stats = mv.stats_mut();
        stats.accepted += 1;
        stats.dusum += du;
        mv.on_accept(space, &change);
        du
    } else {
        space.revert(&change);
        mv.on_reject(space, &change);
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn metropolis_always_accepts_downhill() {
        let mut rng = StdRng::seed_from_u64(0);
        for _ in 0..100 {
            assert!(metropolis(-0.1, &mut rng));
            assert!(metropolis(0.0, &mut rng));
        }
    }

    #[test]
    fn metropolis_rejects_infinity_and_nan() {
        let mut rng = StdRng::seed_from_u64(0);
        for _ in 0..100 {
            assert!(!metropolis(f64::INFINITY, &mut rng));
            assert!(!metropolis(f64::NAN, &mut rng));
        }
    }

    #[test]
    fn metropolis_acceptance_rate_follows_boltzmann() {
        let mut rng = StdRng::seed_from_u64(123);
        let du = 1.0;
        let n = 20_000;
        let accepted = (0..n).filter(|_| metropolis(du, &mut rng)).count();
        let rate = accepted as f64 / n as f64;
        let expected = (-du as f64).exp();
        assert!((rate - expected).abs() < 0.01);
    }
}
