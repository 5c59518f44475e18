use super::pair::{HardSphere, PairPotential};
use super::EnergyTerm;
use crate::core::atom::AtomTable;
use crate::core::geometry::Geometry;
use crate::core::particle::Particle;
use crate::core::space::SpaceView;
use itertools::Itertools;
use rayon::prelude::*;

/// Pair-loop work below this size is not worth farming out to rayon.
const PARALLEL_PAIR_THRESHOLD: usize = 256;

/// Nonbonded interactions from a pair potential.
///
/// Enumerates distinct pairs over the *active* windows of the group
/// partition; the group-level loops skip within-group self interaction. The
/// `g2g`/`g2all` loops reduce in parallel when the pair count warrants it —
/// pairs are independent and nothing mutates during evaluation.
pub struct Nonbonded<P: PairPotential> {
    pub pair: P,
}

impl<P: PairPotential> Nonbonded<P> {
    pub fn new(pair: P) -> Self {
        Self { pair }
    }

    #[inline]
    fn u(&self, geo: &Geometry, a: &Particle, b: &Particle) -> f64 {
        self.pair.energy(a, b, geo.sqdist(&a.pos, &b.pos)) * self.pair.to_kt()
    }

    fn row(&self, view: &SpaceView, i: usize, other: &[usize]) -> f64 {
        let a = &view.particles[i];
        other
            .iter()
            .map(|&j| self.u(view.geo, a, &view.particles[j]))
            .sum()
    }
}

impl<P: PairPotential> EnergyTerm for Nonbonded<P> {
    fn name(&self) -> &'static str {
        self.pair.name()
    }

    fn p2p(&self, geo: &Geometry, a: &Particle, b: &Particle) -> f64 {
        self.u(geo, a, b)
    }

    fn all2p(&self, view: &SpaceView, a: &Particle) -> f64 {
        view.active_indices()
            .map(|j| self.u(view.geo, a, &view.particles[j]))
            .sum()
    }

    fn all2all(&self, view: &SpaceView) -> f64 {
        let active: Vec<usize> = view.active_indices().collect();
        let mut u = 0.0;
        for (k, &i) in active.iter().enumerate() {
            u += self.row(view, i, &active[k + 1..]);
        }
        u
    }

    fn i2i(&self, view: &SpaceView, i: usize, j: usize) -> f64 {
        self.u(view.geo, &view.particles[i], &view.particles[j])
    }

    fn i2g(&self, view: &SpaceView, group: usize, i: usize) -> f64 {
        let g = &view.groups[group];
        let a = &view.particles[i];
        g.range()
            .filter(|&j| j != i)
            .map(|j| self.u(view.geo, a, &view.particles[j]))
            .sum()
    }

    fn i2all(&self, view: &SpaceView, i: usize) -> f64 {
        let a = &view.particles[i];
        view.active_indices()
            .filter(|&j| j != i)
            .map(|j| self.u(view.geo, a, &view.particles[j]))
            .sum()
    }

    fn g2g(&self, view: &SpaceView, g1: usize, g2: usize) -> f64 {
        if g1 == g2 {
            return self.g_internal(view, g1);
        }
        let (a, b) = (&view.groups[g1], &view.groups[g2]);
        if a.is_empty() || b.is_empty() {
            return 0.0;
        }
        let other: Vec<usize> = b.range().collect();
        if a.size() * b.size() < PARALLEL_PAIR_THRESHOLD {
            a.range().map(|i| self.row(view, i, &other)).sum()
        } else {
            a.range()
                .into_par_iter()
                .map(|i| self.row(view, i, &other))
                .sum()
        }
    }

    fn g2all(&self, view: &SpaceView, group: usize) -> f64 {
        let g = &view.groups[group];
        if g.is_empty() {
            return 0.0;
        }
        let outside: Vec<usize> = view
            .groups
            .iter()
            .enumerate()
            .filter(|&(k, _)| k != group)
            .flat_map(|(_, other)| other.range())
            .collect();
        if g.size() * outside.len() < PARALLEL_PAIR_THRESHOLD {
            g.range().map(|i| self.row(view, i, &outside)).sum()
        } else {
            g.range()
                .into_par_iter()
                .map(|i| self.row(view, i, &outside))
                .sum()
        }
    }

    fn v2v(&self, geo: &Geometry, p1: &[Particle], p2: &[Particle]) -> f64 {
        let mut u = 0.0;
        for a in p1 {
            for b in p2 {
                u += self.u(geo, a, b);
            }
        }
        u
    }

    fn g_internal(&self, view: &SpaceView, group: usize) -> f64 {
        let g = &view.groups[group];
        let mut u = 0.0;
        for i in g.range() {
            for j in i + 1..g.end() {
                u += self.u(view.geo, &view.particles[i], &view.particles[j]);
            }
        }
        u
    }
}

/// Nonbonded with a molecular coarse-graining shortcut: two rigid molecular
/// groups whose mass centers are farther apart than the cutoff contribute
/// nothing. The centers come from whatever state is being evaluated.
pub struct CutoffNonbonded<P: PairPotential> {
    inner: Nonbonded<P>,
    pub cutoff: f64,
}

impl<P: PairPotential> CutoffNonbonded<P> {
    pub fn new(pair: P, cutoff: f64) -> Self {
        Self {
            inner: Nonbonded::new(pair),
            cutoff,
        }
    }
}

impl<P: PairPotential> EnergyTerm for CutoffNonbonded<P> {
    fn name(&self) -> &'static str {
        "nonbonded-cg"
    }

    fn p2p(&self, geo: &Geometry, a: &Particle, b: &Particle) -> f64 {
        self.inner.p2p(geo, a, b)
    }

    fn all2p(&self, view: &SpaceView, a: &Particle) -> f64 {
        self.inner.all2p(view, a)
    }

    fn all2all(&self, view: &SpaceView) -> f64 {
        self.inner.all2all(view)
    }

    fn i2i(&self, view: &SpaceView, i: usize, j: usize) -> f64 {
        self.inner.i2i(view, i, j)
    }

    fn i2g(&self, view: &SpaceView, group: usize, i: usize) -> f64 {
        self.inner.i2g(view, group, i)
    }

    fn i2all(&self, view: &SpaceView, i: usize) -> f64 {
        self.inner.i2all(view, i)
    }

    fn g2g(&self, view: &SpaceView, g1: usize, g2: usize) -> f64 {
        let (a, b) = (&view.groups[g1], &view.groups[g2]);
        if !a.atomic && !b.atomic && view.geo.sqdist(&a.cm, &b.cm) > self.cutoff * self.cutoff {
            return 0.0;
        }
        self.inner.g2g(view, g1, g2)
    }

    fn g2all(&self, view: &SpaceView, group: usize) -> f64 {
        (0..view.groups.len())
            .filter(|&other| other != group)
            .map(|other| self.g2g(view, group, other))
            .sum()
    }

    fn v2v(&self, geo: &Geometry, p1: &[Particle], p2: &[Particle]) -> f64 {
        self.inner.v2v(geo, p1, p2)
    }

    fn g_internal(&self, view: &SpaceView, group: usize) -> f64 {
        self.inner.g_internal(view, group)
    }
}

/// Hard-sphere overlap detection with early exit.
///
/// Scans stop at the first overlap and return `+∞`; otherwise zero. Every
/// active particle of a group is checked, not just the first.
pub struct HardSphereOverlap {
    hs: HardSphere,
}

impl HardSphereOverlap {
    pub fn from_table(table: &AtomTable) -> Self {
        Self {
            hs: HardSphere::from_table(table),
        }
    }

    #[inline]
    fn overlap(&self, geo: &Geometry, a: &Particle, b: &Particle) -> bool {
        self.hs.energy(a, b, geo.sqdist(&a.pos, &b.pos)) == f64::INFINITY
    }
}

impl EnergyTerm for HardSphereOverlap {
    fn name(&self) -> &'static str {
        "hardsphere-overlap"
    }

    fn i2i(&self, view: &SpaceView, i: usize, j: usize) -> f64 {
        if self.overlap(view.geo, &view.particles[i], &view.particles[j]) {
            f64::INFINITY
        } else {
            0.0
        }
    }

    fn all2all(&self, view: &SpaceView) -> f64 {
        let active: Vec<usize> = view.active_indices().collect();
        for (&i, &j) in active.iter().tuple_combinations() {
            if self.overlap(view.geo, &view.particles[i], &view.particles[j]) {
                return f64::INFINITY;
            }
        }
        0.0
    }

    fn g2g(&self, view: &SpaceView, g1: usize, g2: usize) -> f64 {
        for i in view.groups[g1].range() {
            for j in view.groups[g2].range() {
                if self.overlap(view.geo, &view.particles[i], &view.particles[j]) {
                    return f64::INFINITY;
                }
            }
        }
        0.0
    }

    fn g2all(&self, view: &SpaceView, group: usize) -> f64 {
        for i in view.groups[group].range() {
            for (k, other) in view.groups.iter().enumerate() {
                if k == group {
                    continue;
                }
                for j in other.range() {
                    if self.overlap(view.geo, &view.particles[i], &view.particles[j]) {
                        return f64::INFINITY;
                    }
                }
            }
        }
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::atom::AtomKind;
    use crate::core::space::Space;
    use crate::energy::pair::LennardJones;
    use nalgebra::Point3;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    const TOLERANCE: f64 = 1e-9;

    fn lj_table(radius: f64) -> AtomTable {
        let mut kind = AtomKind::new("X");
        kind.radius = radius;
        AtomTable::new(vec![kind]).unwrap()
    }

    fn random_space(n_per_group: usize, groups: usize, side: f64) -> Space {
        let table = lj_table(0.5);
        let mut space = Space::new(Geometry::cube(side), table);
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..groups {
            let particles: Vec<Particle> = (0..n_per_group)
                .map(|_| {
                    Particle::new(
                        0,
                        0.0,
                        Point3::new(
                            side * (rng.gen::<f64>() - 0.5),
                            side * (rng.gen::<f64>() - 0.5),
                            side * (rng.gen::<f64>() - 0.5),
                        ),
                    )
                })
                .collect();
            space.push_group(0, true, particles, 0);
        }
        space
    }

    #[test]
    fn i2g_excludes_self_interaction() {
        let table = lj_table(1.0);
        let mut space = Space::new(Geometry::cube(100.0), table.clone());
        space.push_group(
            0,
            true,
            vec![
                Particle::new(0, 0.0, Point3::new(0.0, 0.0, 0.0)),
                Particle::new(0, 0.0, Point3::new(3.0, 0.0, 0.0)),
            ],
            0,
        );
        let nb = Nonbonded::new(LennardJones::from_table(&table, 1.0));
        let view = space.committed();
        let expected = nb.i2i(&view, 0, 1);
        assert!((nb.i2g(&view, 0, 0) - expected).abs() < TOLERANCE);
        assert!((nb.i2all(&view, 0) - expected).abs() < TOLERANCE);
        assert!(expected.is_finite());
    }

    #[test]
    fn group_decomposition_reproduces_all2all() {
        let space = random_space(6, 3, 30.0);
        let nb = Nonbonded::new(LennardJones::from_table(space.table(), 0.2));
        let view = space.committed();
        let mut decomposed = 0.0;
        for g in 0..3 {
            decomposed += nb.g_internal(&view, g);
            for g2 in g + 1..3 {
                decomposed += nb.g2g(&view, g, g2);
            }
        }
        assert!((decomposed - nb.all2all(&view)).abs() < 1e-6);
    }

    #[test]
    fn g2all_equals_sum_of_pairwise_group_energies() {
        let space = random_space(5, 3, 30.0);
        let nb = Nonbonded::new(LennardJones::from_table(space.table(), 0.2));
        let view = space.committed();
        let expected = nb.g2g(&view, 0, 1) + nb.g2g(&view, 0, 2);
        assert!((nb.g2all(&view, 0) - expected).abs() < 1e-9);
    }

    #[test]
    fn parallel_reduction_matches_serial_sum() {
        // 20 x 20 pairs crosses the parallel threshold
        let space = random_space(20, 2, 40.0);
        let nb = Nonbonded::new(LennardJones::from_table(space.table(), 0.2));
        let view = space.committed();
        let parallel = nb.g2g(&view, 0, 1);
        let mut serial = 0.0;
        for i in view.groups[0].range() {
            for j in view.groups[1].range() {
                serial += nb.i2i(&view, i, j);
            }
        }
        assert!((parallel - serial).abs() < 1e-9);
    }

    #[test]
    fn deactivated_particles_do_not_interact() {
        let table = lj_table(1.0);
        let mut space = Space::new(Geometry::cube(100.0), table.clone());
        space.push_group(
            0,
            true,
            vec![
                Particle::new(0, 0.0, Point3::new(0.0, 0.0, 0.0)),
                Particle::new(0, 0.0, Point3::new(3.0, 0.0, 0.0)),
            ],
            0,
        );
        let nb = Nonbonded::new(LennardJones::from_table(&table, 1.0));
        space.erase_particle(0, 1).unwrap();
        let view = space.trial();
        assert_eq!(nb.all2all(&view), 0.0);
        assert_eq!(nb.i2all(&view, view.groups[0].begin()), 0.0);
    }

    #[test]
    fn minimum_image_reaches_across_the_wall() {
        let table = lj_table(1.0);
        let mut space = Space::new(Geometry::cube(10.0), table.clone());
        space.push_group(
            0,
            true,
            vec![
                Particle::new(0, 0.0, Point3::new(4.9, 0.0, 0.0)),
                Particle::new(0, 0.0, Point3::new(-4.9, 0.0, 0.0)),
            ],
            0,
        );
        let nb = Nonbonded::new(LennardJones::from_table(&table, 1.0));
        let view = space.committed();
        // nearest-image separation is 0.2 Å, far inside σ = 2 Å
        assert!(nb.all2all(&view) > 1e3);
    }

    #[test]
    fn overlap_is_found_beyond_the_first_group_particle() {
        let mut kind = AtomKind::new("X");
        kind.radius = 1.0;
        let table = AtomTable::new(vec![kind]).unwrap();
        let mut space = Space::new(Geometry::cube(50.0), table.clone());
        // group 0: two particles, only the *second* overlaps with group 1
        space.push_group(
            0,
            true,
            vec![
                Particle::new(0, 0.0, Point3::new(-20.0, 0.0, 0.0)),
                Particle::new(0, 0.0, Point3::new(10.0, 0.0, 0.0)),
            ],
            0,
        );
        space.push_group(
            0,
            true,
            vec![Particle::new(0, 0.0, Point3::new(10.5, 0.0, 0.0))],
            0,
        );
        let term = HardSphereOverlap::from_table(&table);
        let view = space.committed();
        assert_eq!(term.g2all(&view, 0), f64::INFINITY);
        assert_eq!(term.g2g(&view, 0, 1), f64::INFINITY);
        assert_eq!(term.all2all(&view), f64::INFINITY);
    }

    #[test]
    fn cutoff_skips_distant_rigid_molecules() {
        let table = lj_table(1.0);
        let mut space = Space::new(Geometry::cube(100.0), table.clone());
        space.push_group(
            0,
            false,
            vec![Particle::new(0, 0.0, Point3::new(0.0, 0.0, 0.0))],
            0,
        );
        space.push_group(
            0,
            false,
            vec![Particle::new(0, 0.0, Point3::new(30.0, 0.0, 0.0))],
            0,
        );
        let cg = CutoffNonbonded::new(LennardJones::from_table(&table, 1.0), 10.0);
        let view = space.committed();
        assert_eq!(cg.g2g(&view, 0, 1), 0.0);
        // inside the cutoff the full pair sum is evaluated
        let near = CutoffNonbonded::new(LennardJones::from_table(&table, 1.0), 50.0);
        let direct = Nonbonded::new(LennardJones::from_table(&table, 1.0)).g2g(&view, 0, 1);
        assert!((near.g2g(&view, 0, 1) - direct).abs() < TOLERANCE);
    }
}
