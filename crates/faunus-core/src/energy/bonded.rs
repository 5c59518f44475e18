use super::pair::PairPotential;
use super::EnergyTerm;
use crate::core::space::SpaceView;
use crate::error::{CoreError, Result};
use std::collections::HashMap;

/// Symmetric sparse map from particle index pairs to bond potentials.
///
/// Keys are stored with the smaller index first, so `(i, j)` and `(j, i)`
/// reach the same entry. An adjacency index answers "all bonds touching i"
/// without a full scan.
#[derive(Default)]
pub struct BondTable {
    bonds: HashMap<(usize, usize), Box<dyn PairPotential>>,
    adjacency: HashMap<usize, Vec<usize>>,
}

impl BondTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(i: usize, j: usize) -> (usize, usize) {
        (i.min(j), i.max(j))
    }

    pub fn add(&mut self, i: usize, j: usize, potential: impl PairPotential + 'static) -> Result<()> {
        if i == j {
            return Err(CoreError::Config(format!(
                "cannot bond particle {i} to itself"
            )));
        }
        self.bonds.insert(Self::key(i, j), Box::new(potential));
        self.adjacency.entry(i).or_default().push(j);
        self.adjacency.entry(j).or_default().push(i);
        Ok(())
    }

    pub fn get(&self, i: usize, j: usize) -> Option<&dyn PairPotential> {
        self.bonds.get(&Self::key(i, j)).map(|b| b.as_ref())
    }

    pub fn partners(&self, i: usize) -> &[usize] {
        self.adjacency.get(&i).map_or(&[], |v| v.as_slice())
    }

    pub fn len(&self) -> usize {
        self.bonds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bonds.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, usize, &dyn PairPotential)> {
        self.bonds.iter().map(|(&(i, j), p)| (i, j, p.as_ref()))
    }
}

/// Bonded interactions from a [`BondTable`].
pub struct Bonded {
    pub bonds: BondTable,
}

impl Bonded {
    pub fn new(bonds: BondTable) -> Self {
        Self { bonds }
    }

    fn bond_energy(&self, view: &SpaceView, i: usize, j: usize) -> f64 {
        match self.bonds.get(i, j) {
            Some(potential) => {
                let (a, b) = (&view.particles[i], &view.particles[j]);
                potential.energy(a, b, view.geo.sqdist(&a.pos, &b.pos)) * potential.to_kt()
            }
            None => 0.0,
        }
    }
}

impl EnergyTerm for Bonded {
    fn name(&self) -> &'static str {
        "bonded"
    }

    fn i2i(&self, view: &SpaceView, i: usize, j: usize) -> f64 {
        self.bond_energy(view, i, j)
    }

    fn i2all(&self, view: &SpaceView, i: usize) -> f64 {
        self.bonds
            .partners(i)
            .iter()
            .map(|&j| self.bond_energy(view, i, j))
            .sum()
    }

    fn g2g(&self, view: &SpaceView, g1: usize, g2: usize) -> f64 {
        let (a, b) = (&view.groups[g1], &view.groups[g2]);
        self.bonds
            .iter()
            .filter(|&(i, j, _)| {
                (a.contains(i, false) && b.contains(j, false))
                    || (b.contains(i, false) && a.contains(j, false))
            })
            .map(|(i, j, _)| self.bond_energy(view, i, j))
            .sum()
    }

    fn g_internal(&self, view: &SpaceView, group: usize) -> f64 {
        let g = &view.groups[group];
        self.bonds
            .iter()
            .filter(|&(i, j, _)| g.contains(i, false) && g.contains(j, false))
            .map(|(i, j, _)| self.bond_energy(view, i, j))
            .sum()
    }
}
