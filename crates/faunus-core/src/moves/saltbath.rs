use super::{Move, MoveStatistics};
use crate::core::average::Average;
use crate::core::group::Group;
use crate::core::particle::Particle;
use crate::core::space::{Change, GroupChange, Space};
use crate::energy::{EnergyRestHandle, Hamiltonian};
use crate::error::{CoreError, Result};
use crate::units::molar_to_inv_cubic_angstrom;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::HashMap;
use std::fmt::Write;

/// Per-species index bookkeeping for grand-canonical particle exchange.
///
/// Maps each atom id to the arena indices of its active particles inside the
/// salt group. Rebuilt from the committed state after every accepted
/// exchange; index shifts from swap-deactivation make incremental updates
/// not worth the bookkeeping.
#[derive(Debug, Default)]
pub struct AtomTracker {
    map: HashMap<usize, Vec<usize>>,
}

impl AtomTracker {
    pub fn from_group(particles: &[Particle], group: &Group) -> Self {
        let mut map: HashMap<usize, Vec<usize>> = HashMap::new();
        for i in group.range() {
            map.entry(particles[i].id).or_default().push(i);
        }
        Self { map }
    }

    pub fn count(&self, id: usize) -> usize {
        self.map.get(&id).map_or(0, |v| v.len())
    }

    pub fn indices(&self, id: usize) -> &[usize] {
        self.map.get(&id).map_or(&[], |v| v.as_slice())
    }

    /// Uniformly pick `n` distinct indices of one species.
    pub fn sample(&self, id: usize, n: usize, rng: &mut StdRng) -> Option<Vec<usize>> {
        let indices = self.map.get(&id)?;
        if indices.len() < n {
            return None;
        }
        let mut shuffled = indices.clone();
        shuffled.shuffle(rng);
        shuffled.truncate(n);
        Some(shuffled)
    }
}

fn gcd(mut a: u64, mut b: u64) -> u64 {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a.max(1)
}

enum TrialOp {
    Insert { indices: Vec<usize>, bias: f64 },
    Delete { indices: Vec<usize>, bias: f64 },
}

/// Grand-canonical insertion and deletion of neutral M:X salt pairs.
///
/// Species with nonzero chemical activity are exchanged with a virtual bath.
/// Each attempt picks a random cation/anion combination, derives the neutral
/// stoichiometry from the two valencies, and with equal probability inserts
/// new particles at random positions or deletes resident ones. The activity
/// prefactor enters the Metropolis argument as an additive bias, and the
/// same bias is reported to [`crate::energy::EnergyRest`] on acceptance so
/// the drift audit stays exact.
///
/// The salt group must be the last group in the particle arena.
pub struct SaltBath {
    group: usize,
    cations: Vec<usize>,
    anions: Vec<usize>,
    charges: HashMap<usize, i64>,
    /// Activities in Å⁻³.
    activities: HashMap<usize, f64>,
    tracker: AtomTracker,
    rest: EnergyRestHandle,
    stats: MoveStatistics,
    density: HashMap<usize, Average>,
    op: Option<TrialOp>,
}

impl SaltBath {
    pub fn new(space: &Space, group: usize, rest: EnergyRestHandle) -> Result<Self> {
        if group + 1 != space.groups.len() {
            return Err(CoreError::Config(
                "grand-canonical salt must be the last group in the particle arena".into(),
            ));
        }
        if !space.groups[group].atomic {
            return Err(CoreError::Config(
                "grand-canonical salt requires an atomic group".into(),
            ));
        }
        let mut cations = Vec::new();
        let mut anions = Vec::new();
        let mut charges = HashMap::new();
        let mut activities = HashMap::new();
        for (id, kind) in space.table().kinds().iter().enumerate() {
            if kind.activity <= 0.0 {
                continue;
            }
            let z = kind.charge.round() as i64;
            if z > 0 {
                cations.push(id);
            } else if z < 0 {
                anions.push(id);
            } else {
                continue;
            }
            charges.insert(id, z);
            activities.insert(id, molar_to_inv_cubic_angstrom(kind.activity));
        }
        if cations.is_empty() || anions.is_empty() {
            return Err(CoreError::Config(
                "grand-canonical exchange needs at least one active cation and anion".into(),
            ));
        }
        let tracker = AtomTracker::from_group(&space.p, &space.groups[group]);
        Ok(Self {
            group,
            cations,
            anions,
            charges,
            activities,
            tracker,
            rest,
            stats: MoveStatistics::default(),
            density: HashMap::new(),
            op: None,
        })
    }

    /// Stoichiometric counts making an (ida, idb) combination neutral.
    fn stoichiometry(&self, ida: usize, idb: usize) -> (usize, usize) {
        let za = self.charges[&ida].unsigned_abs();
        let zb = self.charges[&idb].unsigned_abs();
        let g = gcd(za, zb);
        ((zb / g) as usize, (za / g) as usize)
    }

    fn resized_change(&self) -> Change {
        Change {
            resized: true,
            groups: vec![GroupChange {
                index: self.group,
                atoms: Vec::new(),
            }],
            ..Default::default()
        }
    }
}

impl Move for SaltBath {
    fn name(&self) -> &'static str {
        "saltbath"
    }

    fn trial_move(&mut self, space: &mut Space, rng: &mut StdRng) -> Change {
        self.op = None;
        let ida = *self.cations.choose(rng).expect("nonempty by construction");
        let idb = *self.anions.choose(rng).expect("nonempty by construction");
        let (na, nb) = self.stoichiometry(ida, idb);
        let volume = space.geo.volume();

        if rng.gen_bool(0.5) {
            // insertion at uniform random positions
            let mut incoming = Vec::with_capacity(na + nb);
            for (id, count) in [(ida, na), (idb, nb)] {
                let charge = space.table().get(id).map_or(0.0, |k| k.charge);
                for _ in 0..count {
                    let pos = space.trial_geo.random_inside(rng);
                    incoming.push(Particle::new(id, charge, pos));
                }
            }
            let indices = match space.insert_particles(self.group, &incoming) {
                Ok(indices) => indices,
                Err(_) => return Change::default(),
            };
            let mut bias = 0.0;
            for (id, count) in [(ida, na), (idb, nb)] {
                let n0 = self.tracker.count(id);
                let va = volume * self.activities[&id];
                for k in 1..=count {
                    bias -= (va / (n0 + k) as f64).ln();
                }
            }
            self.op = Some(TrialOp::Insert { indices, bias });
            self.resized_change()
        } else {
            // deletion of resident particles, chosen uniformly per species
            let Some(chosen_a) = self.tracker.sample(ida, na, rng) else {
                return Change::default();
            };
            let Some(chosen_b) = self.tracker.sample(idb, nb, rng) else {
                return Change::default();
            };
            let mut indices: Vec<usize> = chosen_a.into_iter().chain(chosen_b).collect();
            // erase from the highest arena index down so earlier removals do
            // not shift the remaining targets
            let mut in_erase_order = indices.clone();
            in_erase_order.sort_unstable_by(|a, b| b.cmp(a));
            for &index in &in_erase_order {
                if space.erase_particle(self.group, index).is_err() {
                    space.revert(&self.resized_change());
                    return Change::default();
                }
            }
            let mut bias = 0.0;
            for (id, count) in [(ida, na), (idb, nb)] {
                let n0 = self.tracker.count(id);
                let va = volume * self.activities[&id];
                for k in 0..count {
                    bias -= ((n0 - k) as f64 / va).ln();
                }
            }
            indices.sort_unstable();
            self.op = Some(TrialOp::Delete { indices, bias });
            self.resized_change()
        }
    }

    fn energy_change(&self, space: &Space, pot: &Hamiltonian, _change: &Change) -> f64 {
        match &self.op {
            Some(TrialOp::Insert { indices, bias }) => {
                let view = space.trial();
                let mut du = 0.0;
                for (k, &i) in indices.iter().enumerate() {
                    du += pot.i_total(&view, i);
                    // each incoming pair is counted once in both rows
                    for &j in &indices[k + 1..] {
                        du -= pot.i2i(&view, i, j);
                    }
                }
                du + bias
            }
            Some(TrialOp::Delete { indices, bias }) => {
                let view = space.committed();
                let mut du = 0.0;
                for (k, &i) in indices.iter().enumerate() {
                    du += pot.i_total(&view, i);
                    for &j in &indices[k + 1..] {
                        du -= pot.i2i(&view, i, j);
                    }
                }
                -du + bias
            }
            None => 0.0,
        }
    }

    fn on_accept(&mut self, space: &Space, _change: &Change) {
        let bias = match &self.op {
            Some(TrialOp::Insert { bias, .. }) | Some(TrialOp::Delete { bias, .. }) => *bias,
            None => return,
        };
        self.rest.add(bias);
        self.tracker = AtomTracker::from_group(&space.p, &space.groups[self.group]);
        let volume = space.geo.volume();
        for &id in self.cations.iter().chain(&self.anions) {
            self.density
                .entry(id)
                .or_default()
                .add(self.tracker.count(id) as f64 / volume);
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
            "{:<16} trials {:>9}  accepted {:>6.1}%",
            self.name(),
            self.stats.trials,
            100.0 * self.stats.acceptance(),
        );
        let mut ids: Vec<_> = self.density.keys().copied().collect();
        ids.sort_unstable();
        for id in ids {
            let _ = write!(
                out,
                "\n  id {id:<4} <rho> {:>12.6e} Å⁻³",
                self.density[&id].mean()
            );
        }
        out
    }
}
