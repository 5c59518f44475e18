use crate::core::geometry::Geometry;
use crate::core::group::Group;
use crate::core::particle::Particle;
use crate::core::space::Space;
use crate::error::{CoreError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::info;

/// Bump when the binary layout changes; the loader refuses mismatches.
pub const STATE_VERSION: u32 = 3;

/// Binary checkpoint of the committed state.
///
/// The version stamp is the first field and bincode keeps field order, so it
/// sits at offset 0 of the file and can be checked before decoding the rest.
#[derive(Debug, Serialize, Deserialize)]
pub struct StateFile {
    pub version: u32,
    pub particles: Vec<Particle>,
    pub groups: Vec<Group>,
    pub geometry: Geometry,
    /// Accumulated energy change of the run so far.
    pub dusum: f64,
}

impl StateFile {
    pub fn capture(space: &Space, dusum: f64) -> Self {
        Self {
            version: STATE_VERSION,
            particles: space.p.clone(),
            groups: space.groups.clone(),
            geometry: space.geo.clone(),
            dusum,
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let bytes =
            bincode::serialize(self).map_err(|e| CoreError::StateEncoding(e.to_string()))?;
        fs::write(path, bytes)?;
        info!(path = %path.display(), "checkpoint written");
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let bytes = fs::read(path)?;
        if bytes.len() < 4 {
            return Err(CoreError::StateEncoding("checkpoint truncated".into()));
        }
        let found = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        if found != STATE_VERSION {
            return Err(CoreError::StateVersion {
                found,
                expected: STATE_VERSION,
            });
        }
        bincode::deserialize(&bytes).map_err(|e| CoreError::StateEncoding(e.to_string()))
    }

    /// Replace the particle, group and geometry state of `space`, mirroring
    /// committed and trial copies.
    pub fn restore(self, space: &mut Space) -> Result<f64> {
        space.p = self.particles;
        space.groups = self.groups;
        space.geo = self.geometry;
        space.trial_p = space.p.clone();
        space.trial_groups = space.groups.clone();
        space.trial_geo = space.geo.clone();
        space.check_invariants()?;
        Ok(self.dusum)
    }
}
