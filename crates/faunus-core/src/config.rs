use crate::core::atom::{AtomKind, AtomTable};
use crate::core::geometry::{Geometry, ScalePolicy};
use crate::core::particle::Particle;
use crate::core::space::Space;
use crate::energy::{
    system_energy, BondTable, Bonded, Combined, Coulomb, CutoffNonbonded, EnergyRest,
    EnergyRestHandle, ExternalPressure, Hamiltonian, HardSphere, HardSphereOverlap, Harmonic,
    LennardJones, MassCenterConstrain, Nonbonded, RestrictedVolume, RestrictionMode,
};
use crate::error::{CoreError, Result};
use crate::moves::{Isobaric, MoleculeTransRot, Move, ParticleTranslation, SaltBath, Titration};
use crate::units::millimolar_to_inv_cubic_angstrom;
use nalgebra::{Point3, Vector3};
use rand::rngs::StdRng;
use serde::Deserialize;
use tracing::{debug, info};

fn default_count() -> usize {
    1
}

fn default_weight() -> f64 {
    1.0
}

fn default_runfraction() -> f64 {
    1.0
}

fn default_placement_attempts() -> usize {
    1000
}

/// Top-level input file, JSON-shaped.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SimulationConfig {
    pub geometry: Geometry,
    pub atomlist: Vec<AtomKind>,
    pub moleculelist: Vec<MoleculeConfig>,
    #[serde(default)]
    pub energy: Vec<EnergySpec>,
    #[serde(default)]
    pub moves: Vec<MoveSpec>,
    /// Accepted for compatibility; the core ignores it.
    #[serde(default)]
    pub analysis: Option<serde_json::Value>,
    /// Accepted for compatibility; the core ignores it.
    #[serde(default)]
    pub reactionlist: Option<serde_json::Value>,
    #[serde(default = "default_placement_attempts")]
    pub placement_attempts: usize,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MoleculeConfig {
    pub name: String,
    /// Atom type names making up one molecule instance.
    pub atoms: Vec<String>,
    #[serde(default = "default_count")]
    pub count: usize,
    #[serde(default)]
    pub atomic: bool,
    #[serde(default)]
    pub compressible: bool,
    /// Extra inactive slots for grand-canonical growth.
    #[serde(default)]
    pub reserve: usize,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PotentialSpec {
    Hardsphere,
    Lennardjones {
        epsilon: f64,
    },
    Coulomb {
        bjerrum: f64,
        #[serde(default)]
        cutoff: Option<f64>,
        #[serde(default)]
        splitting: Option<SplittingSpec>,
    },
    LjCoulomb {
        epsilon: f64,
        bjerrum: f64,
        #[serde(default)]
        cutoff: Option<f64>,
        #[serde(default)]
        splitting: Option<SplittingSpec>,
    },
}

#[derive(Debug, Deserialize)]
#[serde(tag = "scheme", rename_all = "snake_case")]
pub enum SplittingSpec {
    Plain,
    Wolf { alpha: f64 },
    ReactionField { epsilon_rf: f64 },
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BondConfig {
    pub i: usize,
    pub j: usize,
    pub k: f64,
    pub req: f64,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConstrainPairConfig {
    pub first: usize,
    pub second: usize,
    pub min_dist: f64,
    pub max_dist: f64,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EnergySpec {
    Nonbonded {
        potential: PotentialSpec,
        /// Skip rigid molecule pairs beyond this mass-center separation.
        #[serde(default)]
        cm_cutoff: Option<f64>,
    },
    HardsphereOverlap,
    Bonded {
        bonds: Vec<BondConfig>,
    },
    Pressure {
        millimolar: f64,
    },
    RestrictedVolume {
        lower: [f64; 3],
        upper: [f64; 3],
        #[serde(default)]
        mass_center_only: bool,
        groups: Vec<usize>,
    },
    CmConstrain {
        pairs: Vec<ConstrainPairConfig>,
    },
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MoveSpec {
    Translate {
        molecule: String,
        dp: f64,
        #[serde(default = "default_weight")]
        weight: f64,
        #[serde(default)]
        dir: Option<[f64; 3]>,
        #[serde(default = "default_runfraction")]
        runfraction: f64,
    },
    Transrot {
        molecule: String,
        dp: f64,
        dp_rot: f64,
        #[serde(default = "default_weight")]
        weight: f64,
        #[serde(default = "default_runfraction")]
        runfraction: f64,
    },
    Isobaric {
        dv: f64,
        pressure_millimolar: f64,
        #[serde(default = "default_weight")]
        weight: f64,
    },
    Saltbath {
        molecule: String,
        #[serde(default = "default_weight")]
        weight: f64,
    },
    Titrate {
        ph: f64,
        counter_molecule: String,
        counter_ion: String,
        #[serde(default = "default_weight")]
        weight: f64,
    },
}

/// A ready-to-run simulation assembled from a [`SimulationConfig`].
pub struct System {
    pub space: Space,
    pub hamiltonian: Hamiltonian,
    pub moves: Vec<(Box<dyn Move>, f64)>,
}

impl SimulationConfig {
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| CoreError::Config(e.to_string()))
    }

    fn molid(&self, name: &str) -> Result<usize> {
        self.moleculelist
            .iter()
            .position(|m| m.name == name)
            .ok_or_else(|| CoreError::Config(format!("unknown molecule '{name}'")))
    }

    fn place(&self, table: &AtomTable, rng: &mut StdRng) -> Result<Space> {
        let mut space = Space::new(self.geometry.clone(), table.clone());
        for molecule in &self.moleculelist {
            let molid = self.molid(&molecule.name)?;
            let kind_ids: Vec<usize> = molecule
                .atoms
                .iter()
                .map(|name| {
                    table
                        .find(name)
                        .ok_or_else(|| CoreError::UnknownAtom(name.clone()))
                })
                .collect::<Result<_>>()?;
            for _ in 0..molecule.count {
                let particles: Vec<Particle> = kind_ids
                    .iter()
                    .map(|&id| {
                        let charge = table.get(id).map_or(0.0, |k| k.charge);
                        Particle::new(id, charge, space.geo.random_inside(rng))
                    })
                    .collect();
                let group = space.push_group(molid, molecule.atomic, particles, molecule.reserve);
                space.groups[group].compressible = molecule.compressible;
                space.trial_groups[group].compressible = molecule.compressible;
            }
        }
        space.check_invariants()?;
        Ok(space)
    }

    fn build_potential(
        &self,
        spec: &PotentialSpec,
        table: &AtomTable,
        cm_cutoff: Option<f64>,
        pot: &mut Hamiltonian,
    ) {
        fn push<P: crate::energy::PairPotential + 'static>(
            pair: P,
            cm_cutoff: Option<f64>,
            pot: &mut Hamiltonian,
        ) {
            match cm_cutoff {
                Some(cutoff) => pot.add(CutoffNonbonded::new(pair, cutoff)),
                None => pot.add(Nonbonded::new(pair)),
            }
        }
        let coulomb = |bjerrum: f64, cutoff: &Option<f64>, splitting: &Option<SplittingSpec>| {
            let mut pair = Coulomb::plain(bjerrum);
            if let Some(cutoff) = cutoff {
                pair.cutoff = *cutoff;
            }
            match splitting {
                Some(SplittingSpec::Wolf { alpha }) => {
                    pair.splitting = crate::energy::pair::Splitting::Wolf { alpha: *alpha };
                }
                Some(SplittingSpec::ReactionField { epsilon_rf }) => {
                    pair.splitting = crate::energy::pair::Splitting::ReactionField {
                        epsilon_rf: *epsilon_rf,
                    };
                }
                Some(SplittingSpec::Plain) | None => {}
            }
            pair
        };
        match spec {
            PotentialSpec::Hardsphere => push(HardSphere::from_table(table), cm_cutoff, pot),
            PotentialSpec::Lennardjones { epsilon } => {
                push(LennardJones::from_table(table, *epsilon), cm_cutoff, pot)
            }
            PotentialSpec::Coulomb {
                bjerrum,
                cutoff,
                splitting,
            } => push(coulomb(*bjerrum, cutoff, splitting), cm_cutoff, pot),
            PotentialSpec::LjCoulomb {
                epsilon,
                bjerrum,
                cutoff,
                splitting,
            } => push(
                Combined::new(
                    LennardJones::from_table(table, *epsilon),
                    coulomb(*bjerrum, cutoff, splitting),
                ),
                cm_cutoff,
                pot,
            ),
        }
    }

    /// Assemble space, Hamiltonian and moves. Initial placement is retried
    /// until the total energy is finite, up to `placement_attempts` times.
    pub fn build(&self, rng: &mut StdRng) -> Result<System> {
        let table = AtomTable::initialize(self.atomlist.clone())?;

        let mut hamiltonian = Hamiltonian::new();
        let mut has_pressure_term = false;
        for spec in &self.energy {
            match spec {
                EnergySpec::Nonbonded {
                    potential,
                    cm_cutoff,
                } => self.build_potential(potential, table, *cm_cutoff, &mut hamiltonian),
                EnergySpec::HardsphereOverlap => {
                    hamiltonian.add(HardSphereOverlap::from_table(table))
                }
                EnergySpec::Bonded { bonds } => {
                    let mut bond_table = BondTable::new();
                    for bond in bonds {
                        bond_table.add(bond.i, bond.j, Harmonic::new(bond.k, bond.req))?;
                    }
                    hamiltonian.add(Bonded::new(bond_table));
                }
                EnergySpec::Pressure { millimolar } => {
                    has_pressure_term = true;
                    hamiltonian.add(ExternalPressure::new(millimolar_to_inv_cubic_angstrom(
                        *millimolar,
                    )));
                }
                EnergySpec::RestrictedVolume {
                    lower,
                    upper,
                    mass_center_only,
                    groups,
                } => {
                    let mode = if *mass_center_only {
                        RestrictionMode::MassCenter
                    } else {
                        RestrictionMode::AllParticles
                    };
                    let mut term = RestrictedVolume::new(
                        Point3::from(*lower),
                        Point3::from(*upper),
                        mode,
                    );
                    term.groups = groups.clone();
                    hamiltonian.add(term);
                }
                EnergySpec::CmConstrain { pairs } => {
                    let mut term = MassCenterConstrain::new();
                    for pair in pairs {
                        term.add_pair(pair.first, pair.second, pair.min_dist, pair.max_dist);
                    }
                    hamiltonian.add(term);
                }
            }
        }
        if self.analysis.is_some() {
            debug!("ignoring 'analysis' section (handled outside the core)");
        }
        if self.reactionlist.is_some() {
            debug!("ignoring 'reactionlist' section (handled outside the core)");
        }

        // retry random placement until no overlap makes the energy infinite
        let mut space = None;
        for attempt in 1..=self.placement_attempts {
            let candidate = self.place(table, rng)?;
            let u = system_energy(&candidate.committed(), &hamiltonian);
            if u.is_finite() {
                debug!(attempt, u, "initial placement accepted");
                space = Some(candidate);
                break;
            }
        }
        let mut space = space.ok_or(CoreError::Placement {
            attempts: self.placement_attempts,
        })?;

        let mut rest_handle: Option<EnergyRestHandle> = None;
        let mut rest_for = |hamiltonian: &mut Hamiltonian| -> EnergyRestHandle {
            rest_handle
                .get_or_insert_with(|| {
                    let (term, handle) = EnergyRest::new();
                    hamiltonian.add(term);
                    handle
                })
                .clone()
        };

        let first_group_of = |space: &Space, molid: usize| -> Result<usize> {
            space
                .groups
                .iter()
                .position(|g| g.id == molid)
                .ok_or_else(|| CoreError::Config(format!("no group for molecule id {molid}")))
        };

        let mut moves: Vec<(Box<dyn Move>, f64)> = Vec::new();
        for spec in &self.moves {
            match spec {
                MoveSpec::Translate {
                    molecule,
                    dp,
                    weight,
                    dir,
                    runfraction,
                } => {
                    let group = first_group_of(&space, self.molid(molecule)?)?;
                    let mut mv = ParticleTranslation::for_group(group, *dp);
                    if let Some(dir) = dir {
                        mv.dir = Vector3::from(*dir);
                    }
                    mv.runfraction = *runfraction;
                    moves.push((Box::new(mv), *weight));
                }
                MoveSpec::Transrot {
                    molecule,
                    dp,
                    dp_rot,
                    weight,
                    runfraction,
                } => {
                    let group = first_group_of(&space, self.molid(molecule)?)?;
                    let mut mv = MoleculeTransRot::new(group, *dp, *dp_rot);
                    mv.runfraction = *runfraction;
                    moves.push((Box::new(mv), *weight));
                }
                MoveSpec::Isobaric {
                    dv,
                    pressure_millimolar,
                    weight,
                } => {
                    if !has_pressure_term {
                        info!("isobaric move adds an external pressure term to the Hamiltonian");
                        hamiltonian.add(ExternalPressure::new(millimolar_to_inv_cubic_angstrom(
                            *pressure_millimolar,
                        )));
                        has_pressure_term = true;
                    }
                    moves.push((
                        Box::new(Isobaric::new(*dv, ScalePolicy::Isotropic)),
                        *weight,
                    ));
                }
                MoveSpec::Saltbath { molecule, weight } => {
                    let group = first_group_of(&space, self.molid(molecule)?)?;
                    let handle = rest_for(&mut hamiltonian);
                    let mv = SaltBath::new(&space, group, handle)?;
                    moves.push((Box::new(mv), *weight));
                }
                MoveSpec::Titrate {
                    ph,
                    counter_molecule,
                    counter_ion,
                    weight,
                } => {
                    let group = first_group_of(&space, self.molid(counter_molecule)?)?;
                    let counter_id = table
                        .find(counter_ion)
                        .ok_or_else(|| CoreError::UnknownAtom(counter_ion.clone()))?;
                    let handle = rest_for(&mut hamiltonian);
                    let mv = Titration::new(&space, *ph, group, counter_id, handle)?;
                    moves.push((Box::new(mv), *weight));
                }
            }
        }

        space.check_invariants()?;
        Ok(System {
            space,
            hamiltonian,
            moves,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    // all tests share one atomlist so the process-wide table stays consistent
    const INPUT: &str = r#"{
        "geometry": { "type": "cuboid", "length": [20.0, 20.0, 20.0] },
        "atomlist": [
            { "name": "Na", "charge": 1.0, "radius": 1.0, "activity": 1.0, "dp": 0.5 },
            { "name": "Cl", "charge": -1.0, "radius": 1.5, "activity": 1.0 }
        ],
        "moleculelist": [
            { "name": "salt", "atoms": ["Na", "Cl", "Na", "Cl"], "atomic": true, "reserve": 8 }
        ],
        "energy": [
            { "type": "nonbonded", "potential": { "type": "hardsphere" } }
        ],
        "moves": [
            { "type": "translate", "molecule": "salt", "dp": 1.0, "weight": 2.0 },
            { "type": "saltbath", "molecule": "salt" }
        ]
    }"#;

    #[test]
    fn full_input_round_trip_builds_a_runnable_system() {
        let config = SimulationConfig::from_json(INPUT).unwrap();
        let mut rng = StdRng::seed_from_u64(5);
        let system = config.build(&mut rng).unwrap();

        assert_eq!(system.space.groups.len(), 1);
        assert_eq!(system.space.active_count(), 4);
        assert_eq!(system.space.groups[0].capacity(), 12);
        assert_eq!(system.moves.len(), 2);
        // saltbath pulls in the rest term next to the nonbonded one
        let names: Vec<_> = system.hamiltonian.term_names().collect();
        assert!(names.contains(&"hardsphere"));
        assert!(names.contains(&"energy-rest"));
        // hard-sphere placement produced a finite starting energy
        let u = system_energy(&system.space.committed(), &system.hamiltonian);
        assert!(u.is_finite());
    }

    #[test]
    fn unknown_fields_are_configuration_errors() {
        let bad = INPUT.replace("\"moves\"", "\"movez\"");
        assert!(matches!(
            SimulationConfig::from_json(&bad),
            Err(CoreError::Config(_))
        ));
    }

    #[test]
    fn unknown_atom_names_are_reported() {
        let bad = INPUT.replace("[\"Na\", \"Cl\", \"Na\", \"Cl\"]", "[\"K\"]");
        let config = SimulationConfig::from_json(&bad).unwrap();
        let mut rng = StdRng::seed_from_u64(5);
        assert!(matches!(
            config.build(&mut rng),
            Err(CoreError::UnknownAtom(_))
        ));
    }

    #[test]
    fn moves_referencing_missing_molecules_fail() {
        let bad = INPUT.replace("\"molecule\": \"salt\", \"dp\"", "\"molecule\": \"oil\", \"dp\"");
        let config = SimulationConfig::from_json(&bad).unwrap();
        let mut rng = StdRng::seed_from_u64(5);
        assert!(matches!(config.build(&mut rng), Err(CoreError::Config(_))));
    }
}
