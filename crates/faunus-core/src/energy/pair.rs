use crate::core::atom::AtomTable;
use crate::core::particle::Particle;
use crate::error::{CoreError, Result};

/// Isotropic pair potential evaluated from two particles and their squared
/// minimum-image separation. Energies are in kT.
pub trait PairPotential: Send + Sync {
    fn energy(&self, a: &Particle, b: &Particle, r2: f64) -> f64;

    /// Conversion factor to kT applied by callers; fixed at unity.
    fn to_kt(&self) -> f64 {
        1.0
    }

    fn name(&self) -> &'static str;
}

/// Hard-sphere exclusion from the per-type radii.
#[derive(Debug, Clone)]
pub struct HardSphere {
    n_kinds: usize,
    contact_sq: Vec<f64>,
}

impl HardSphere {
    pub fn from_table(table: &AtomTable) -> Self {
        let n = table.len();
        let mut contact_sq = vec![0.0; n * n];
        for i in 0..n {
            for j in 0..n {
                let sum = table.get(i).map_or(0.0, |k| k.radius)
                    + table.get(j).map_or(0.0, |k| k.radius);
                contact_sq[i * n + j] = sum * sum;
            }
        }
        Self {
            n_kinds: n,
            contact_sq,
        }
    }
}

impl PairPotential for HardSphere {
    #[inline]
    fn energy(&self, a: &Particle, b: &Particle, r2: f64) -> f64 {
        if r2 < self.contact_sq[a.id * self.n_kinds + b.id] {
            f64::INFINITY
        } else {
            0.0
        }
    }

    fn name(&self) -> &'static str {
        "hardsphere"
    }
}

/// Lennard-Jones with Lorentz-style mixing: the pair diameter is the sum of
/// the two type radii, the well depth is uniform.
#[derive(Debug, Clone)]
pub struct LennardJones {
    n_kinds: usize,
    sigma_sq: Vec<f64>,
    /// Well depth (kT).
    pub epsilon: f64,
}

impl LennardJones {
    pub fn from_table(table: &AtomTable, epsilon: f64) -> Self {
        let n = table.len();
        let mut sigma_sq = vec![0.0; n * n];
        for i in 0..n {
            for j in 0..n {
                let sigma = table.get(i).map_or(0.0, |k| k.radius)
                    + table.get(j).map_or(0.0, |k| k.radius);
                sigma_sq[i * n + j] = sigma * sigma;
            }
        }
        Self {
            n_kinds: n,
            sigma_sq,
            epsilon,
        }
    }
}

impl PairPotential for LennardJones {
    #[inline]
    fn energy(&self, a: &Particle, b: &Particle, r2: f64) -> f64 {
        if r2 < 1e-12 {
            return f64::INFINITY;
        }
        let x = self.sigma_sq[a.id * self.n_kinds + b.id] / r2;
        let x3 = x * x * x;
        4.0 * self.epsilon * (x3 * x3 - x3)
    }

    fn name(&self) -> &'static str {
        "lennardjones"
    }
}

/// Harmonic spring, `½k(r − r₀)²`, used for bonds.
#[derive(Debug, Clone, Copy)]
pub struct Harmonic {
    /// Force constant (kT/Å²).
    pub k: f64,
    /// Equilibrium separation (Å).
    pub req: f64,
}

impl Harmonic {
    pub fn new(k: f64, req: f64) -> Self {
        Self { k, req }
    }
}

impl PairPotential for Harmonic {
    #[inline]
    fn energy(&self, _a: &Particle, _b: &Particle, r2: f64) -> f64 {
        let d = r2.sqrt() - self.req;
        0.5 * self.k * d * d
    }

    fn name(&self) -> &'static str {
        "harmonic"
    }
}

/// Truncation scheme for the electrostatic pair energy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Splitting {
    /// Bare `1/r`, no cutoff.
    Plain,
    /// Wolf damped-and-shifted: `erfc(αr)/r − erfc(αRc)/Rc` inside the cutoff.
    Wolf { alpha: f64 },
    /// Reaction field with external dielectric `epsilon_rf`.
    ReactionField { epsilon_rf: f64 },
}

/// Coulomb interaction `λ_B z₁ z₂ / r` in kT, with optional splitting.
#[derive(Debug, Clone)]
pub struct Coulomb {
    /// Bjerrum length (Å); ~7.0 in water at room temperature.
    pub bjerrum: f64,
    /// Spherical cutoff (Å); ignored by the plain splitting.
    pub cutoff: f64,
    pub splitting: Splitting,
}

impl Coulomb {
    pub fn plain(bjerrum: f64) -> Self {
        Self {
            bjerrum,
            cutoff: f64::INFINITY,
            splitting: Splitting::Plain,
        }
    }
}

// Abramowitz & Stegun 7.1.26, |error| < 1.5e-7. Enough for damped
// electrostatics where the potential itself is truncated.
fn erfc_approx(x: f64) -> f64 {
    let t = 1.0 / (1.0 + 0.3275911 * x);
    let poly = t
        * (0.254829592
            + t * (-0.284496736 + t * (1.421413741 + t * (-1.453152027 + t * 1.061405429))));
    poly * (-x * x).exp()
}

impl PairPotential for Coulomb {
    #[inline]
    fn energy(&self, a: &Particle, b: &Particle, r2: f64) -> f64 {
        let zz = a.charge * b.charge;
        if zz == 0.0 {
            return 0.0;
        }
        if r2 < 1e-12 {
            return zz.signum() * f64::INFINITY;
        }
        let r = r2.sqrt();
        match self.splitting {
            Splitting::Plain => self.bjerrum * zz / r,
            Splitting::Wolf { alpha } => {
                if r > self.cutoff {
                    return 0.0;
                }
                let shift = erfc_approx(alpha * self.cutoff) / self.cutoff;
                self.bjerrum * zz * (erfc_approx(alpha * r) / r - shift)
            }
            Splitting::ReactionField { epsilon_rf } => {
                if r > self.cutoff {
                    return 0.0;
                }
                let rc3 = self.cutoff.powi(3);
                let krf = (epsilon_rf - 1.0) / ((2.0 * epsilon_rf + 1.0) * rc3);
                let crf = 1.0 / self.cutoff + krf * self.cutoff * self.cutoff;
                self.bjerrum * zz * (1.0 / r + krf * r2 - crf)
            }
        }
    }

    fn name(&self) -> &'static str {
        "coulomb"
    }
}

/// Compile-time sum of two potentials for the hot inner loops.
#[derive(Debug, Clone)]
pub struct Combined<A, B> {
    pub first: A,
    pub second: B,
}

impl<A, B> Combined<A, B> {
    pub fn new(first: A, second: B) -> Self {
        Self { first, second }
    }
}

impl<A: PairPotential, B: PairPotential> PairPotential for Combined<A, B> {
    #[inline]
    fn energy(&self, a: &Particle, b: &Particle, r2: f64) -> f64 {
        self.first.energy(a, b, r2) + self.second.energy(a, b, r2)
    }

    fn name(&self) -> &'static str {
        "combined"
    }
}

/// Linear-interpolation table over r² for a charge-independent potential.
///
/// Separations inside the tabulated window read from the table; outside it
/// the wrapped potential is evaluated directly. Construction probes the
/// midpoint of every bin for every type pair and refuses tables that do not
/// reproduce the direct evaluation within `tolerance`.
pub struct Tabulated<P> {
    inner: P,
    n_kinds: usize,
    r2_min: f64,
    r2_max: f64,
    step: f64,
    tables: Vec<Vec<f64>>,
}

impl<P: PairPotential> Tabulated<P> {
    pub fn new(
        inner: P,
        table: &AtomTable,
        r_min: f64,
        r_max: f64,
        knots: usize,
        tolerance: f64,
    ) -> Result<Self> {
        if knots < 2 || r_min <= 0.0 || r_max <= r_min {
            return Err(CoreError::Config(
                "tabulation needs r_max > r_min > 0 and at least two knots".into(),
            ));
        }
        let n = table.len();
        let r2_min = r_min * r_min;
        let r2_max = r_max * r_max;
        let step = (r2_max - r2_min) / (knots - 1) as f64;

        let probe = |id: usize| {
            let kind = table.get(id);
            Particle::new(id, kind.map_or(0.0, |k| k.charge), nalgebra::Point3::origin())
        };

        let mut tables = Vec::with_capacity(n * n);
        for i in 0..n {
            for j in 0..n {
                let (a, b) = (probe(i), probe(j));
                let knots_ij: Vec<f64> = (0..knots)
                    .map(|k| inner.energy(&a, &b, r2_min + k as f64 * step))
                    .collect();
                tables.push(knots_ij);
            }
        }

        let tabulated = Self {
            inner,
            n_kinds: n,
            r2_min,
            r2_max,
            step,
            tables,
        };

        for i in 0..n {
            for j in 0..n {
                let (a, b) = (probe(i), probe(j));
                for k in 0..knots - 1 {
                    let r2 = r2_min + (k as f64 + 0.5) * step;
                    let direct = tabulated.inner.energy(&a, &b, r2);
                    let interpolated = tabulated.energy(&a, &b, r2);
                    if direct.is_finite() && (interpolated - direct).abs() > tolerance {
                        return Err(CoreError::Config(format!(
                            "tabulated potential deviates by {:.3e} at r = {:.3} Å (tolerance {:.3e})",
                            (interpolated - direct).abs(),
                            r2.sqrt(),
                            tolerance
                        )));
                    }
                }
            }
        }
        Ok(tabulated)
    }
}

impl<P: PairPotential> PairPotential for Tabulated<P> {
    #[inline]
    fn energy(&self, a: &Particle, b: &Particle, r2: f64) -> f64 {
        if r2 < self.r2_min || r2 >= self.r2_max {
            return self.inner.energy(a, b, r2);
        }
        let x = (r2 - self.r2_min) / self.step;
        let k = x as usize;
        let frac = x - k as f64;
        let knots = &self.tables[a.id * self.n_kinds + b.id];
        knots[k] * (1.0 - frac) + knots[k + 1] * frac
    }

    fn name(&self) -> &'static str {
        "tabulated"
    }
}
