use super::{Move, MoveStatistics};
use crate::core::average::Average;
use crate::core::space::{Change, Space};
use crate::energy::Hamiltonian;
use nalgebra::{Unit, UnitQuaternion, Vector3};
use rand::rngs::StdRng;
use rand::Rng;

/// Combined rigid-body translation and rotation of one group.
///
/// A random unit axis and a half-open angle build the trial quaternion; the
/// group rotates about its mass center with boundary-aware displacements and
/// may additionally translate. The energy change is the group's interaction
/// with the rest of the system plus external terms; internal energy is
/// untouched by a rigid transformation.
pub struct MoleculeTransRot {
    pub group: usize,
    pub dp_trans: f64,
    pub dp_rot: f64,
    pub dir: Vector3<f64>,
    pub runfraction: f64,
    stats: MoveStatistics,
    msd_trans: Average,
    msd_rot: Average,
    last: Option<Attempt>,
}

struct Attempt {
    sq_translation: f64,
    angle: f64,
}

fn random_unit_vector(rng: &mut StdRng) -> Unit<Vector3<f64>> {
    // Marsaglia rejection from the unit ball
    loop {
        let v = Vector3::new(
            2.0 * rng.gen::<f64>() - 1.0,
            2.0 * rng.gen::<f64>() - 1.0,
            2.0 * rng.gen::<f64>() - 1.0,
        );
        let norm_sq = v.norm_squared();
        if norm_sq > 1e-6 && norm_sq <= 1.0 {
            return Unit::new_normalize(v);
        }
    }
}

impl MoleculeTransRot {
    pub fn new(group: usize, dp_trans: f64, dp_rot: f64) -> Self {
        Self {
            group,
            dp_trans,
            dp_rot,
            dir: Vector3::new(1.0, 1.0, 1.0),
            runfraction: 1.0,
            stats: MoveStatistics::default(),
            msd_trans: Average::default(),
            msd_rot: Average::default(),
            last: None,
        }
    }
}

impl Move for MoleculeTransRot {
    fn name(&self) -> &'static str {
        "transrot"
    }

    fn runfraction(&self) -> f64 {
        self.runfraction
    }

    fn trial_move(&mut self, space: &mut Space, rng: &mut StdRng) -> Change {
        self.last = None;
        let Some(group) = space.trial_groups.get(self.group) else {
            return Change::default();
        };
        if group.is_empty() {
            return Change::default();
        }

        let angle = self.dp_rot * (rng.gen::<f64>() - 0.5);
        let axis = random_unit_vector(rng);
        let quaternion = UnitQuaternion::from_axis_angle(&axis, angle);

        let mut delta = Vector3::zeros();
        for k in 0..3 {
            delta[k] = self.dp_trans * (rng.gen::<f64>() - 0.5) * self.dir[k];
        }

        let geo = space.trial_geo.clone();
        let group = &mut space.trial_groups[self.group];
        group.rotate(&quaternion, &geo, &mut space.trial_p);
        group.translate(&delta, &geo, &mut space.trial_p);

        self.last = Some(Attempt {
            sq_translation: delta.norm_squared(),
            angle,
        });
        Change::whole_group(self.group)
    }

    fn energy_change(&self, space: &Space, pot: &Hamiltonian, _change: &Change) -> f64 {
        let trial = space.trial();
        let committed = space.committed();
        pot.g2all(&trial, self.group) + pot.g_external(&trial, self.group)
            - pot.g2all(&committed, self.group)
            - pot.g_external(&committed, self.group)
    }

    fn on_accept(&mut self, _space: &Space, _change: &Change) {
        if let Some(attempt) = &self.last {
            self.msd_trans += attempt.sq_translation;
            self.msd_rot += attempt.angle * attempt.angle;
            self.stats.msd += attempt.sq_translation;
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
            "{:<16} trials {:>9}  accepted {:>6.1}%  msd(t) {:>8.4}  msd(r) {:>8.4}",
            self.name(),
            self.stats.trials,
            100.0 * self.stats.acceptance(),
            self.msd_trans.mean(),
            self.msd_rot.mean()
        )
    }
}
