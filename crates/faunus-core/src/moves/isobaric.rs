use super::{Move, MoveStatistics};
use crate::core::average::Average;
use crate::core::geometry::ScalePolicy;
use crate::core::space::{Change, Space};
use crate::energy::{system_energy, Hamiltonian};
use rand::rngs::StdRng;
use rand::Rng;
use tracing::error;

/// Isobaric (NPT) volume move.
///
/// The volume walks in `ln V`: `V' = exp(ln V + δ)` with `δ` drawn from
/// `[−dV/2, +dV/2]`. Atomic groups scale every member position; rigid
/// molecular groups translate with their scaled mass center. The Hamiltonian
/// must carry an [`crate::energy::ExternalPressure`] term — the pressure and
/// `ln V` bookkeeping then appears in the total-energy difference.
pub struct Isobaric {
    /// Log-volume displacement parameter.
    pub dv: f64,
    pub policy: ScalePolicy,
    stats: MoveStatistics,
    volume: Average,
    sq_dv: Average,
    last: Option<Attempt>,
}

struct Attempt {
    old_volume: f64,
    new_volume: f64,
}

impl Isobaric {
    pub fn new(dv: f64, policy: ScalePolicy) -> Self {
        Self {
            dv,
            policy,
            stats: MoveStatistics::default(),
            volume: Average::default(),
            sq_dv: Average::default(),
            last: None,
        }
    }

    pub fn mean_volume(&self) -> f64 {
        self.volume.mean()
    }
}

impl Move for Isobaric {
    fn name(&self) -> &'static str {
        "isobaric"
    }

    fn trial_move(&mut self, space: &mut Space, rng: &mut StdRng) -> Change {
        self.last = None;
        let old_volume = space.geo.volume();
        let delta = self.dv * (rng.gen::<f64>() - 0.5);
        let new_volume = (old_volume.ln() + delta).exp();
        match space.scale_volume(new_volume, self.policy) {
            Ok(_) => {
                self.last = Some(Attempt {
                    old_volume,
                    new_volume,
                });
                let mut change = Change::all();
                change.volume = true;
                change
            }
            Err(err) => {
                error!("volume scaling failed: {err}");
                Change::default()
            }
        }
    }

    fn energy_change(&self, space: &Space, pot: &Hamiltonian, _change: &Change) -> f64 {
        system_energy(&space.trial(), pot) - system_energy(&space.committed(), pot)
    }

    fn on_accept(&mut self, _space: &Space, _change: &Change) {
        if let Some(attempt) = &self.last {
            self.volume += attempt.new_volume;
            let dv = attempt.new_volume - attempt.old_volume;
            self.sq_dv += dv * dv;
        }
    }

    fn on_reject(&mut self, _space: &Space, _change: &Change) {
        if let Some(attempt) = &self.last {
            self.volume += attempt.old_volume;
        }
    }

    fn stats(&self) -> &MoveStatistics {
        &self.stats
    }

    fn stats_mut(&mut self) -> &mut MoveStatistics {
        &mut self.stats
    }

    fn info(&self) -> String {
        format!(
            "{:<16} trials {:>9}  accepted {:>6.1}%  <V> {:>12.2} Å³",
            self.name(),
            self.stats.trials,
            100.0 * self.stats.acceptance(),
            self.volume.mean()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::atom::{AtomKind, AtomTable};
    use crate::core::geometry::Geometry;
    use crate::core::particle::Particle;
    use crate::energy::ExternalPressure;
    use crate::moves::execute;
    use crate::units::millimolar_to_inv_cubic_angstrom;
    use nalgebra::Point3;
    use rand::SeedableRng;

    fn two_molecule_space() -> Space {
        let table = AtomTable::new(vec![AtomKind::new("M")]).unwrap();
        let mut space = Space::new(Geometry::cube(10.0), table);
        space.push_group(
            0,
            false,
            vec![Particle::new(0, 0.0, Point3::new(1.0, 0.0, 0.0))],
            0,
        );
        space.push_group(
            0,
            false,
            vec![Particle::new(0, 0.0, Point3::new(-2.0, 0.0, 0.0))],
            0,
        );
        space
    }

    #[test]
    fn trial_volume_stays_inside_the_log_window() {
        let mut space = two_molecule_space();
        let mut mv = Isobaric::new(0.1, ScalePolicy::Isotropic);
        let mut rng = StdRng::seed_from_u64(21);
        let v0: f64 = 1000.0;

        let change = mv.trial_move(&mut space, &mut rng);
        assert!(change.volume && change.everything);
        let new_v = space.trial_geo.volume();
        assert!(new_v >= (v0.ln() - 0.05).exp() - 1e-9);
        assert!(new_v <= (v0.ln() + 0.05).exp() + 1e-9);
        // committed volume untouched before the decision
        assert!((space.geo.volume() - v0).abs() < 1e-9);
    }

    #[test]
    fn energy_change_carries_pressure_and_log_volume_terms() {
        let mut space = two_molecule_space();
        let pressure = millimolar_to_inv_cubic_angstrom(1.0);
        let mut pot = Hamiltonian::new();
        pot.add(ExternalPressure::new(pressure));

        let mut mv = Isobaric::new(0.1, ScalePolicy::Isotropic);
        let mut rng = StdRng::seed_from_u64(4);
        let change = mv.trial_move(&mut space, &mut rng);
        let new_v = space.trial_geo.volume();
        let old_v = space.geo.volume();

        // two molecular groups plus the system term: P·ΔV − 3·Δln V
        let expected = pressure * (new_v - old_v) - 3.0 * (new_v.ln() - old_v.ln());
        let du = mv.energy_change(&space, &pot, &change);
        assert!((du - expected).abs() < 1e-9, "du {du} vs expected {expected}");
    }

    #[test]
    fn accepted_volume_moves_commit_geometry_and_positions() {
        let mut space = two_molecule_space();
        let pressure = millimolar_to_inv_cubic_angstrom(1.0);
        let mut pot = Hamiltonian::new();
        pot.add(ExternalPressure::new(pressure));
        let mut mv = Isobaric::new(0.2, ScalePolicy::Isotropic);
        let mut rng = StdRng::seed_from_u64(8);

        for _ in 0..100 {
            execute(&mut mv, &mut space, &pot, &mut rng);
            assert!((space.geo.volume() - space.trial_geo.volume()).abs() < 1e-9);
            assert_eq!(space.p, space.trial_p);
        }
        assert!(mv.stats().accepted > 0);
        assert!(mv.mean_volume() > 0.0);
    }
}
