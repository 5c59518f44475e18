use super::EnergyTerm;
use crate::core::geometry::Geometry;
use crate::core::space::SpaceView;
use nalgebra::Point3;
use std::cell::Cell;
use std::rc::Rc;

/// External pressure for the NPT ensemble.
///
/// The system terms are `βu = pV − ln V`; the per-group term `−N ln V`
/// contributes `N = size` for atomic groups and `N = 1` for molecular ones.
pub struct ExternalPressure {
    /// Pressure in kT/Å³.
    pub pressure: f64,
}

impl ExternalPressure {
    pub fn new(pressure: f64) -> Self {
        Self { pressure }
    }
}

impl EnergyTerm for ExternalPressure {
    fn name(&self) -> &'static str {
        "pressure"
    }

    fn external(&self, geo: &Geometry) -> f64 {
        let v = geo.volume();
        self.pressure * v - v.ln()
    }

    fn g_external(&self, view: &SpaceView, group: usize) -> f64 {
        let g = &view.groups[group];
        if g.is_empty() {
            return 0.0;
        }
        let n = if g.atomic { g.size() } else { 1 };
        -(n as f64) * view.geo.volume().ln()
    }
}

/// Whether a volume restriction applies to every particle or only to the
/// group mass center.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestrictionMode {
    AllParticles,
    MassCenter,
}

/// Confines registered groups to an axis-aligned box; `+∞` outside.
pub struct RestrictedVolume {
    pub lower: Point3<f64>,
    pub upper: Point3<f64>,
    pub mode: RestrictionMode,
    pub groups: Vec<usize>,
}

impl RestrictedVolume {
    pub fn new(lower: Point3<f64>, upper: Point3<f64>, mode: RestrictionMode) -> Self {
        Self {
            lower,
            upper,
            mode,
            groups: Vec::new(),
        }
    }

    fn outside(&self, p: &Point3<f64>) -> bool {
        (0..3).any(|k| p[k] < self.lower[k] || p[k] > self.upper[k])
    }
}

impl EnergyTerm for RestrictedVolume {
    fn name(&self) -> &'static str {
        "restricted-volume"
    }

    fn g_external(&self, view: &SpaceView, group: usize) -> f64 {
        if !self.groups.contains(&group) {
            return 0.0;
        }
        let g = &view.groups[group];
        let violated = match self.mode {
            RestrictionMode::MassCenter => self.outside(&g.cm),
            RestrictionMode::AllParticles => {
                g.active(view.particles).iter().any(|p| self.outside(&p.pos))
            }
        };
        if violated {
            f64::INFINITY
        } else {
            0.0
        }
    }
}

/// Constrains the geodesic mass-center separation of group pairs to an
/// interval; `+∞` outside.
#[derive(Default)]
pub struct MassCenterConstrain {
    pairs: Vec<ConstrainedPair>,
}

struct ConstrainedPair {
    a: usize,
    b: usize,
    min_dist: f64,
    max_dist: f64,
}

impl MassCenterConstrain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an unordered group pair with an allowed distance window.
    pub fn add_pair(&mut self, g1: usize, g2: usize, min_dist: f64, max_dist: f64) {
        self.pairs.push(ConstrainedPair {
            a: g1.min(g2),
            b: g1.max(g2),
            min_dist,
            max_dist,
        });
    }
}

impl EnergyTerm for MassCenterConstrain {
    fn name(&self) -> &'static str {
        "cm-constrain"
    }

    fn g_external(&self, view: &SpaceView, group: usize) -> f64 {
        for pair in self.pairs.iter().filter(|p| p.a == group || p.b == group) {
            let cm1 = view.groups[pair.a].cm;
            let cm2 = view.groups[pair.b].cm;
            let dist = view.geo.vdist(&cm1, &cm2).norm();
            if dist < pair.min_dist || dist > pair.max_dist {
                return f64::INFINITY;
            }
        }
        0.0
    }
}

/// Accumulator for energy changes the drift bookkeeping cannot see, e.g. the
/// activity bias of grand-canonical moves. Reported through `external()` so
/// the audit stays aligned with the exact Metropolis decisions.
///
/// The core is strictly single-threaded (moves are serialized), so a shared
/// cell is sufficient for the move-side handle.
pub struct EnergyRest {
    sum: Rc<Cell<f64>>,
}

/// Cloneable handle through which moves report discrepancies.
#[derive(Clone)]
pub struct EnergyRestHandle(Rc<Cell<f64>>);

impl EnergyRestHandle {
    pub fn add(&self, du: f64) {
        self.0.set(self.0.get() + du);
    }

    pub fn sum(&self) -> f64 {
        self.0.get()
    }
}

impl EnergyRest {
    pub fn new() -> (Self, EnergyRestHandle) {
        let sum = Rc::new(Cell::new(0.0));
        (Self { sum: sum.clone() }, EnergyRestHandle(sum))
    }
}

impl EnergyTerm for EnergyRest {
    fn name(&self) -> &'static str {
        "energy-rest"
    }

    fn external(&self, _geo: &Geometry) -> f64 {
        self.sum.get()
    }
}
