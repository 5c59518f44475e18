use nalgebra::{Point3, Vector3};
use serde::{Deserialize, Serialize};

/// Extended particle record: dipole and orientation data.
///
/// Most atomic species never need this block, so it lives behind an
/// `Option<Box<_>>` on [`Particle`] and is materialized on first write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Extended {
    /// Unit dipole direction.
    pub mu: Vector3<f64>,
    /// Dipole moment scalar (eÅ).
    pub mulen: f64,
    /// Orientation direction, e.g. for patchy or sphero-cylindrical particles.
    pub scdir: Vector3<f64>,
}

impl Default for Extended {
    fn default() -> Self {
        Self {
            mu: Vector3::zeros(),
            mulen: 0.0,
            scdir: Vector3::x(),
        }
    }
}

/// A single simulation particle.
///
/// `id` indexes the process-wide atom table; `charge` is in units of the
/// elementary charge and `pos` in Å.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Particle {
    pub id: usize,
    pub charge: f64,
    pub pos: Point3<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    ext: Option<Box<Extended>>,
}

impl Default for Particle {
    fn default() -> Self {
        Self {
            id: 0,
            charge: 0.0,
            pos: Point3::origin(),
            ext: None,
        }
    }
}

impl Particle {
    pub fn new(id: usize, charge: f64, pos: Point3<f64>) -> Self {
        Self {
            id,
            charge,
            pos,
            ext: None,
        }
    }

    pub fn has_ext(&self) -> bool {
        self.ext.is_some()
    }

    pub fn ext(&self) -> Option<&Extended> {
        self.ext.as_deref()
    }

    /// Mutable access to the extended block, allocating it on first use.
    pub fn ext_mut(&mut self) -> &mut Extended {
        self.ext.get_or_insert_with(Default::default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extended_block_is_absent_until_first_write() {
        let mut p = Particle::default();
        assert!(!p.has_ext());
        assert!(p.ext().is_none());
        p.ext_mut().mulen = 1.8;
        assert!(p.has_ext());
        assert_eq!(p.ext().unwrap().mulen, 1.8);
    }

    #[test]
    fn serialization_round_trips_presence_and_absence_of_ext() {
        let plain = Particle::new(2, -1.0, Point3::new(1.0, 2.0, 3.0));
        let mut dipolar = Particle::new(3, 0.0, Point3::origin());
        dipolar.ext_mut().mu = Vector3::y();
        dipolar.ext_mut().mulen = 2.3;

        for p in [&plain, &dipolar] {
            let bytes = bincode::serialize(p).unwrap();
            let back: Particle = bincode::deserialize(&bytes).unwrap();
            assert_eq!(&back, p);
            assert_eq!(back.has_ext(), p.has_ext());
        }
    }
}
