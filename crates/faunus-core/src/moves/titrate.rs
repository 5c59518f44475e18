use super::{Move, MoveStatistics};
use crate::core::particle::Particle;
use crate::core::space::{Change, GroupChange, Space};
use crate::energy::{EnergyRestHandle, Hamiltonian};
use crate::error::{CoreError, Result};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use std::f64::consts::LN_10;

enum TitrationOp {
    /// Site gained a proton; a counter ion was activated at `counter`.
    Protonate { site: usize, counter: usize, bias: f64 },
    /// Site lost a proton; the counter ion at `counter` was deactivated.
    Deprotonate { site: usize, counter: usize, bias: f64 },
}

/// Discrete proton-transfer move for titratable sites.
///
/// Any active particle whose species defines a pKa is a site; its charge
/// toggles between the species base charge (deprotonated) and base + 1.
/// Every protonation activates one counter ion in a designated atomic group
/// and every deprotonation deactivates one, so the system stays neutral —
/// the counter species therefore carries charge −1. Acceptance is Metropolis
/// with the additive bias `ln 10 · (pH − pKa)` for protonation.
pub struct Titration {
    pub ph: f64,
    counter_group: usize,
    counter_id: usize,
    rest: EnergyRestHandle,
    stats: MoveStatistics,
    op: Option<TitrationOp>,
}

impl Titration {
    pub fn new(
        space: &Space,
        ph: f64,
        counter_group: usize,
        counter_id: usize,
        rest: EnergyRestHandle,
    ) -> Result<Self> {
        let group = space
            .groups
            .get(counter_group)
            .ok_or_else(|| CoreError::Config(format!("no counter-ion group {counter_group}")))?;
        if !group.atomic {
            return Err(CoreError::Config(
                "titration counter ions must live in an atomic group".into(),
            ));
        }
        let counter_charge = space
            .table()
            .get(counter_id)
            .ok_or_else(|| CoreError::Config(format!("unknown counter-ion id {counter_id}")))?
            .charge;
        if (counter_charge + 1.0).abs() > 1e-9 {
            return Err(CoreError::Config(
                "titration counter ion must carry charge -1 to balance the proton".into(),
            ));
        }
        Ok(Self {
            ph,
            counter_group,
            counter_id,
            rest,
            stats: MoveStatistics::default(),
            op: None,
        })
    }

    fn sites(&self, space: &Space) -> Vec<usize> {
        let table = space.table();
        space
            .committed()
            .active_indices()
            .filter(|&i| table.get(space.p[i].id).is_some_and(|k| k.pka.is_some()))
            .collect()
    }

    fn change(&self, site_group: usize) -> Change {
        Change {
            resized: true,
            groups: vec![
                GroupChange {
                    index: site_group,
                    atoms: Vec::new(),
                },
                GroupChange {
                    index: self.counter_group,
                    atoms: Vec::new(),
                },
            ],
            ..Default::default()
        }
    }
}

impl Move for Titration {
    fn name(&self) -> &'static str {
        "titrate"
    }

    fn trial_move(&mut self, space: &mut Space, rng: &mut StdRng) -> Change {
        self.op = None;
        let sites = self.sites(space);
        let Some(&site) = sites.choose(rng) else {
            return Change::default();
        };
        let Some(site_group) = space.committed().group_of(site) else {
            return Change::default();
        };
        let kind = match space.table().get(space.p[site].id) {
            Some(kind) => kind.clone(),
            None => return Change::default(),
        };
        let pka = kind.pka.expect("sites are filtered on pka");
        let protonated = space.p[site].charge > kind.charge + 0.5;

        if !protonated {
            // protonation: activate one counter ion in a free slot
            let counter = {
                let g = &space.trial_groups[self.counter_group];
                if g.is_full() {
                    return Change::default();
                }
                g.end()
            };
            let charge = space.table().get(self.counter_id).map_or(-1.0, |k| k.charge);
            let pos = space.trial_geo.random_inside(rng);
            space.trial_p[counter] = Particle::new(self.counter_id, charge, pos);
            if space.trial_groups[self.counter_group].activate(1).is_err() {
                return Change::default();
            }
            space.trial_p[site].charge = kind.charge + 1.0;
            self.op = Some(TitrationOp::Protonate {
                site,
                counter,
                bias: LN_10 * (self.ph - pka),
            });
            self.change(site_group)
        } else {
            // deprotonation: deactivate one random active counter ion
            let candidates: Vec<usize> = space.trial_groups[self.counter_group]
                .find_id(&space.trial_p, self.counter_id)
                .collect();
            let Some(&counter) = candidates.choose(rng) else {
                return Change::default();
            };
            if space.erase_particle(self.counter_group, counter).is_err() {
                return Change::default();
            }
            space.trial_p[site].charge = kind.charge;
            self.op = Some(TitrationOp::Deprotonate {
                site,
                counter,
                bias: -LN_10 * (self.ph - pka),
            });
            self.change(site_group)
        }
    }

    fn energy_change(&self, space: &Space, pot: &Hamiltonian, _change: &Change) -> f64 {
        let trial = space.trial();
        let committed = space.committed();
        match &self.op {
            Some(TitrationOp::Protonate { site, counter, bias }) => {
                pot.i_total(&trial, *site) + pot.i_total(&trial, *counter)
                    - pot.i2i(&trial, *site, *counter)
                    - pot.i_total(&committed, *site)
                    + bias
            }
            Some(TitrationOp::Deprotonate { site, counter, bias }) => {
                pot.i_total(&trial, *site)
                    - (pot.i_total(&committed, *site) + pot.i_total(&committed, *counter)
                        - pot.i2i(&committed, *site, *counter))
                    + bias
            }
            None => 0.0,
        }
    }

    fn on_accept(&mut self, _space: &Space, _change: &Change) {
        if let Some(
            TitrationOp::Protonate { bias, .. } | TitrationOp::Deprotonate { bias, .. },
        ) = &self.op
        {
            self.rest.add(*bias);
        }
    }

    fn stats(&self) -> &MoveStatistics {
        &self.stats
    }

    fn stats_mut(&mut self) -> &mut MoveStatistics {
        &mut self.stats
    }
}
