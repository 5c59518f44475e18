use super::{Move, MoveStatistics};
use crate::core::average::Average;
use crate::core::space::{Change, Space};
use crate::energy::Hamiltonian;
use nalgebra::Vector3;
use rand::rngs::StdRng;
use rand::Rng;
use std::collections::HashMap;
use std::fmt::Write;

/// Translation of single particles.
///
/// Works in two modes: displace one fixed particle, or displace particles
/// picked uniformly from a group (typically salt). The displacement
/// parameter comes from the atom table when the species defines one,
/// otherwise from the move itself. `dir` masks the displacement axes.
pub struct ParticleTranslation {
    group: Option<usize>,
    particle: Option<usize>,
    pub dp: f64,
    pub dir: Vector3<f64>,
    pub runfraction: f64,
    stats: MoveStatistics,
    accmap: HashMap<usize, Average>,
    sqrmap: HashMap<usize, Average>,
    last: Option<Attempt>,
}

struct Attempt {
    index: usize,
    kind: usize,
    sqdisp: f64,
}

impl ParticleTranslation {
    pub fn for_group(group: usize, dp: f64) -> Self {
        Self {
            group: Some(group),
            particle: None,
            dp,
            dir: Vector3::new(1.0, 1.0, 1.0),
            runfraction: 1.0,
            stats: MoveStatistics::default(),
            accmap: HashMap::new(),
            sqrmap: HashMap::new(),
            last: None,
        }
    }

    pub fn for_particle(index: usize, dp: f64) -> Self {
        Self {
            particle: Some(index),
            ..Self::for_group(0, dp)
        }
    }

    fn pick(&self, space: &Space, rng: &mut StdRng) -> Option<(usize, usize)> {
        if let Some(i) = self.particle {
            let group = space.committed().group_of(i)?;
            return Some((group, i));
        }
        let group = self.group?;
        let g = space.groups.get(group)?;
        if g.is_empty() {
            return None;
        }
        let offset = rng.gen_range(0..g.size());
        Some((group, g.begin() + offset))
    }
}

impl Move for ParticleTranslation {
    fn name(&self) -> &'static str {
        "translate"
    }

    fn runfraction(&self) -> f64 {
        self.runfraction
    }

    fn trial_move(&mut self, space: &mut Space, rng: &mut StdRng) -> Change {
        self.last = None;
        let Some((group, index)) = self.pick(space, rng) else {
            return Change::default();
        };
        let kind = space.trial_p[index].id;
        let dp = space
            .table()
            .get(kind)
            .map(|k| k.dp)
            .filter(|&dp| dp > 0.0)
            .unwrap_or(self.dp);

        let old = space.trial_p[index].pos;
        let mut new = old;
        for k in 0..3 {
            new[k] += dp * (rng.gen::<f64>() - 0.5) * self.dir[k];
        }
        space.trial_geo.boundary(&mut new);
        space.trial_p[index].pos = new;

        if !space.trial_groups[group].atomic {
            let cm = space.trial_groups[group].mass_center(
                &space.trial_geo,
                &space.trial_p,
                space.table(),
            );
            if let Some(cm) = cm {
                space.trial_groups[group].cm = cm;
            }
        }

        self.last = Some(Attempt {
            index,
            kind,
            sqdisp: space.trial_geo.sqdist(&old, &new),
        });
        Change::single_particle(group, index)
    }

    fn energy_change(&self, space: &Space, pot: &Hamiltonian, _change: &Change) -> f64 {
        let Some(attempt) = &self.last else {
            return 0.0;
        };
        pot.i_total(&space.trial(), attempt.index) - pot.i_total(&space.committed(), attempt.index)
    }

    fn on_accept(&mut self, _space: &Space, _change: &Change) {
        if let Some(attempt) = &self.last {
            self.stats.msd += attempt.sqdisp;
            self.accmap.entry(attempt.kind).or_default().add(1.0);
            self.sqrmap
                .entry(attempt.kind)
                .or_default()
                .add(attempt.sqdisp);
        }
    }

    fn on_reject(&mut self, _space: &Space, _change: &Change) {
        if let Some(attempt) = &self.last {
            self.accmap.entry(attempt.kind).or_default().add(0.0);
        }
    }

    fn stats(&self) -> &MoveStatistics {
        &self.stats
    }

    fn stats_mut(&mut self) -> &mut MoveStatistics {
        &mut self.stats
    }

    fn info(&self) -> String {
        let mut out = format!(
            "{:<16} trials {:>9}  accepted {:>6.1}%  msd {:>10.4}",
            self.name(),
            self.stats.trials,
            100.0 * self.stats.acceptance(),
            self.stats.msd.mean()
        );
        let mut kinds: Vec<_> = self.accmap.keys().copied().collect();
        kinds.sort_unstable();
        for kind in kinds {
            let acc = self.accmap[&kind].mean();
            let msd = self.sqrmap.get(&kind).map_or(0.0, |a| a.mean());
            let _ = write!(out, "\n  id {kind:<4} acc {:>6.1}%  msd {msd:>10.4}", 100.0 * acc);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::atom::{AtomKind, AtomTable};
    use crate::core::geometry::Geometry;
    use crate::core::particle::Particle;
    use crate::energy::{LennardJones, Nonbonded};
    use crate::moves::execute;
    use nalgebra::Point3;
    use rand::SeedableRng;

    fn salt_space(n: usize) -> Space {
        let mut kind = AtomKind::new("Na");
        kind.radius = 0.5;
        let table = AtomTable::new(vec![kind]).unwrap();
        let mut space = Space::new(Geometry::cube(20.0), table);
        let mut rng = StdRng::seed_from_u64(9);
        let particles: Vec<Particle> = (0..n)
            .map(|_| {
                Particle::new(
                    0,
                    0.0,
                    Point3::new(
                        20.0 * (rng.gen::<f64>() - 0.5),
                        20.0 * (rng.gen::<f64>() - 0.5),
                        20.0 * (rng.gen::<f64>() - 0.5),
                    ),
                )
            })
            .collect();
        space.push_group(0, true, particles, 0);
        space
    }

    #[test]
    fn accepted_moves_commit_and_rejected_moves_restore() {
        let mut space = salt_space(8);
        let mut pot = Hamiltonian::new();
        pot.add(Nonbonded::new(LennardJones::from_table(space.table(), 0.5)));
        let mut mv = ParticleTranslation::for_group(0, 1.0);
        let mut rng = StdRng::seed_from_u64(3);

        for _ in 0..200 {
            execute(&mut mv, &mut space, &pot, &mut rng);
            assert_eq!(space.p, space.trial_p);
            assert_eq!(space.groups, space.trial_groups);
        }
        assert!(mv.stats().trials == 200);
        assert!(mv.stats().accepted > 0);
    }

    #[test]
    fn displacement_respects_direction_mask() {
        let mut space = salt_space(1);
        let start = space.p[0].pos;
        let mut mv = ParticleTranslation::for_group(0, 2.0);
        mv.dir = Vector3::new(0.0, 0.0, 1.0);
        let mut rng = StdRng::seed_from_u64(5);
        let pot = Hamiltonian::new();
        for _ in 0..50 {
            execute(&mut mv, &mut space, &pot, &mut rng);
        }
        assert_eq!(space.p[0].pos.x, start.x);
        assert_eq!(space.p[0].pos.y, start.y);
        assert_ne!(space.p[0].pos.z, start.z);
    }

    #[test]
    fn empty_group_attempts_count_but_do_nothing() {
        let mut kind = AtomKind::new("Na");
        kind.radius = 0.5;
        let table = AtomTable::new(vec![kind]).unwrap();
        let mut space = Space::new(Geometry::cube(20.0), table);
        space.push_group(0, true, Vec::new(), 4); // only reserved slots
        let mut mv = ParticleTranslation::for_group(0, 1.0);
        let pot = Hamiltonian::new();
        let mut rng = StdRng::seed_from_u64(1);
        execute(&mut mv, &mut space, &pot, &mut rng);
        assert_eq!(mv.stats().trials, 1);
        assert_eq!(mv.stats().accepted, 0);
    }

    #[test]
    fn per_species_displacement_comes_from_the_atom_table() {
        let mut kind = AtomKind::new("Na");
        kind.dp = 0.0; // falls back to the move's own dp
        let table = AtomTable::new(vec![kind]).unwrap();
        let mut space = Space::new(Geometry::cube(20.0), table);
        space.push_group(0, true, vec![Particle::default()], 0);
        let mut mv = ParticleTranslation::for_particle(0, 0.0);
        let pot = Hamiltonian::new();
        let mut rng = StdRng::seed_from_u64(1);
        execute(&mut mv, &mut space, &pot, &mut rng);
        // dp = 0 everywhere: the particle cannot move
        assert_eq!(space.p[0].pos, Point3::origin());
    }
}
