//! Energy evaluation: pair potentials, polymorphic energy terms and the
//! Hamiltonian that sums them.
//!
//! Every term answers the full query set below but only implements the
//! queries that apply to it; the rest default to zero. All queries run
//! against a [`SpaceView`], so the same code path serves the trial and the
//! committed state.

pub mod bonded;
pub mod external;
pub mod nonbonded;
pub mod pair;

use crate::core::geometry::Geometry;
use crate::core::particle::Particle;
use crate::core::space::SpaceView;

pub use bonded::{BondTable, Bonded};
pub use external::{
    EnergyRest, EnergyRestHandle, ExternalPressure, MassCenterConstrain, RestrictedVolume,
    RestrictionMode,
};
pub use nonbonded::{CutoffNonbonded, HardSphereOverlap, Nonbonded};
pub use pair::{Combined, Coulomb, HardSphere, Harmonic, LennardJones, PairPotential, Tabulated};

/// One contributor to the system Hamiltonian.
///
/// Group arguments are indices into `view.groups`; particle arguments are
/// arena indices. Energies are in kT; overlaps are the domain value `+∞`,
/// never an error.
#[allow(unused_variables)]
pub trait EnergyTerm {
    fn name(&self) -> &'static str;

    fn p2p(&self, geo: &Geometry, a: &Particle, b: &Particle) -> f64 {
        0.0
    }

    fn all2p(&self, view: &SpaceView, a: &Particle) -> f64 {
        0.0
    }

    fn all2all(&self, view: &SpaceView) -> f64 {
        0.0
    }

    fn i2i(&self, view: &SpaceView, i: usize, j: usize) -> f64 {
        0.0
    }

    fn i2g(&self, view: &SpaceView, group: usize, i: usize) -> f64 {
        0.0
    }

    fn i2all(&self, view: &SpaceView, i: usize) -> f64 {
        0.0
    }

    fn g2g(&self, view: &SpaceView, g1: usize, g2: usize) -> f64 {
        0.0
    }

    fn g2all(&self, view: &SpaceView, group: usize) -> f64 {
        0.0
    }

    /// Energy between two bare particle sets, e.g. grand-canonical trial
    /// insertions against the resident particles.
    fn v2v(&self, geo: &Geometry, p1: &[Particle], p2: &[Particle]) -> f64 {
        0.0
    }

    fn i_external(&self, view: &SpaceView, i: usize) -> f64 {
        0.0
    }

    fn g_external(&self, view: &SpaceView, group: usize) -> f64 {
        0.0
    }

    /// System-wide external energy, e.g. `pV/kT − ln V`.
    fn external(&self, geo: &Geometry) -> f64 {
        0.0
    }

    fn i_internal(&self, view: &SpaceView, i: usize) -> f64 {
        0.0
    }

    fn g_internal(&self, view: &SpaceView, group: usize) -> f64 {
        0.0
    }
}

/// Heterogeneous sum of energy terms.
#[derive(Default)]
pub struct Hamiltonian {
    terms: Vec<Box<dyn EnergyTerm>>,
}

macro_rules! sum_over_terms {
    ($self:ident, $method:ident ( $($arg:expr),* )) => {
        $self.terms.iter().map(|t| t.$method($($arg),*)).sum()
    };
}

impl Hamiltonian {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, term: impl EnergyTerm + 'static) {
        self.terms.push(Box::new(term));
    }

    pub fn add_boxed(&mut self, term: Box<dyn EnergyTerm>) {
        self.terms.push(term);
    }

    pub fn term_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.terms.iter().map(|t| t.name())
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn p2p(&self, geo: &Geometry, a: &Particle, b: &Particle) -> f64 {
        sum_over_terms!(self, p2p(geo, a, b))
    }

    pub fn all2p(&self, view: &SpaceView, a: &Particle) -> f64 {
        sum_over_terms!(self, all2p(view, a))
    }

    pub fn all2all(&self, view: &SpaceView) -> f64 {
        sum_over_terms!(self, all2all(view))
    }

    pub fn i2i(&self, view: &SpaceView, i: usize, j: usize) -> f64 {
        sum_over_terms!(self, i2i(view, i, j))
    }

    pub fn i2g(&self, view: &SpaceView, group: usize, i: usize) -> f64 {
        sum_over_terms!(self, i2g(view, group, i))
    }

    pub fn i2all(&self, view: &SpaceView, i: usize) -> f64 {
        sum_over_terms!(self, i2all(view, i))
    }

    pub fn g2g(&self, view: &SpaceView, g1: usize, g2: usize) -> f64 {
        sum_over_terms!(self, g2g(view, g1, g2))
    }

    pub fn g2all(&self, view: &SpaceView, group: usize) -> f64 {
        sum_over_terms!(self, g2all(view, group))
    }

    pub fn v2v(&self, geo: &Geometry, p1: &[Particle], p2: &[Particle]) -> f64 {
        sum_over_terms!(self, v2v(geo, p1, p2))
    }

    pub fn i_external(&self, view: &SpaceView, i: usize) -> f64 {
        sum_over_terms!(self, i_external(view, i))
    }

    pub fn g_external(&self, view: &SpaceView, group: usize) -> f64 {
        sum_over_terms!(self, g_external(view, group))
    }

    pub fn external(&self, geo: &Geometry) -> f64 {
        sum_over_terms!(self, external(geo))
    }

    pub fn i_internal(&self, view: &SpaceView, i: usize) -> f64 {
        sum_over_terms!(self, i_internal(view, i))
    }

    pub fn g_internal(&self, view: &SpaceView, group: usize) -> f64 {
        sum_over_terms!(self, g_internal(view, group))
    }

    /// Total energy of one particle: pair sum plus external and internal
    /// contributions.
    pub fn i_total(&self, view: &SpaceView, i: usize) -> f64 {
        self.i2all(view, i) + self.i_external(view, i) + self.i_internal(view, i)
    }
}

/// Total system energy: external terms, per-group external and internal
/// energy, and all distinct group-pair interactions. Used at start-up and by
/// the drift audit.
pub fn system_energy(view: &SpaceView, hamiltonian: &Hamiltonian) -> f64 {
    use itertools::Itertools;
    let mut u = hamiltonian.external(view.geo);
    for g in 0..view.groups.len() {
        u += hamiltonian.g_external(view, g) + hamiltonian.g_internal(view, g);
    }
    for (g1, g2) in (0..view.groups.len()).tuple_combinations() {
        u += hamiltonian.g2g(view, g1, g2);
    }
    u
}
