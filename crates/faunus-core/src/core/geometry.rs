use crate::error::{CoreError, Result};
use nalgebra::{Point3, Vector3};
use rand::rngs::StdRng;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// How a volume change is distributed over the box axes.
///
/// `Isotropic` scales all three axes equally; `XY` keeps the z-axis fixed
/// (slab systems under lateral pressure); `Z` scales only the z-axis.
/// Containers without independent axes accept `Isotropic` only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalePolicy {
    Isotropic,
    Xy,
    Z,
}

/// Simulation container.
///
/// A closed set of container shapes. The cuboid is periodic in all three
/// directions and the slit in x and y only; the remaining shapes are bounded
/// by their collision surface and have no periodic images. All containers are
/// centered on the origin. Lengths in Å, volumes in Å³.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Geometry {
    Cuboid { length: Vector3<f64> },
    Slit { length: Vector3<f64> },
    Sphere { radius: f64 },
    Cylinder { radius: f64, length: f64 },
    HexagonalPrism { side: f64, height: f64 },
    TruncatedOctahedron { side: f64 },
}

impl Geometry {
    pub fn cube(side: f64) -> Self {
        Geometry::Cuboid {
            length: Vector3::new(side, side, side),
        }
    }

    pub fn volume(&self) -> f64 {
        match self {
            Geometry::Cuboid { length } | Geometry::Slit { length } => {
                length.x * length.y * length.z
            }
            Geometry::Sphere { radius } => 4.0 / 3.0 * PI * radius.powi(3),
            Geometry::Cylinder { radius, length } => PI * radius * radius * length,
            Geometry::HexagonalPrism { side, height } => {
                1.5 * 3.0_f64.sqrt() * side * side * height
            }
            Geometry::TruncatedOctahedron { side } => 8.0 * 2.0_f64.sqrt() * side.powi(3),
        }
    }

    /// Number of periodic directions (x, y, z).
    fn periodicity(&self) -> [bool; 3] {
        match self {
            Geometry::Cuboid { .. } => [true, true, true],
            Geometry::Slit { .. } => [true, true, false],
            _ => [false, false, false],
        }
    }

    fn side_lengths(&self) -> Vector3<f64> {
        match self {
            Geometry::Cuboid { length } | Geometry::Slit { length } => *length,
            Geometry::Sphere { radius } => Vector3::repeat(2.0 * radius),
            Geometry::Cylinder { radius, length } => {
                Vector3::new(2.0 * radius, 2.0 * radius, *length)
            }
            Geometry::HexagonalPrism { side, height } => {
                Vector3::new(2.0 * side, 2.0 * side, *height)
            }
            Geometry::TruncatedOctahedron { side } => {
                Vector3::repeat(2.0 * 2.0_f64.sqrt() * side)
            }
        }
    }

    /// Minimum-image displacement `a - b`.
    ///
    /// Periodic directions use round-to-nearest, never truncation.
    pub fn vdist(&self, a: &Point3<f64>, b: &Point3<f64>) -> Vector3<f64> {
        let mut d = a - b;
        let periodic = self.periodicity();
        if periodic.contains(&true) {
            let len = self.side_lengths();
            for k in 0..3 {
                if periodic[k] {
                    d[k] -= len[k] * (d[k] / len[k]).round();
                }
            }
        }
        d
    }

    /// Squared minimum-image distance between two points.
    pub fn sqdist(&self, a: &Point3<f64>, b: &Point3<f64>) -> f64 {
        self.vdist(a, b).norm_squared()
    }

    /// Wrap a point back into the primary cell along periodic directions.
    pub fn boundary(&self, p: &mut Point3<f64>) {
        let periodic = self.periodicity();
        if periodic.contains(&true) {
            let len = self.side_lengths();
            for k in 0..3 {
                if periodic[k] {
                    p[k] -= len[k] * (p[k] / len[k]).round();
                }
            }
        }
    }

    /// True if the point lies outside the container walls.
    pub fn collision(&self, p: &Point3<f64>) -> bool {
        match self {
            Geometry::Cuboid { .. } => false,
            Geometry::Slit { length } => p.z.abs() > 0.5 * length.z,
            Geometry::Sphere { radius } => p.coords.norm_squared() > radius * radius,
            Geometry::Cylinder { radius, length } => {
                p.x * p.x + p.y * p.y > radius * radius || p.z.abs() > 0.5 * length
            }
            Geometry::HexagonalPrism { side, height } => {
                if p.z.abs() > 0.5 * height {
                    return true;
                }
                // point-in-hexagon: project onto the three in-plane face normals
                let apothem = 0.5 * 3.0_f64.sqrt() * side;
                let c30 = 0.5 * 3.0_f64.sqrt();
                let axes = [(1.0, 0.0), (0.5, c30), (-0.5, c30)];
                axes.iter()
                    .any(|(ux, uy)| (p.x * ux + p.y * uy).abs() > apothem)
            }
            Geometry::TruncatedOctahedron { side } => {
                let c = 2.0_f64.sqrt() * side;
                p.x.abs() > c
                    || p.y.abs() > c
                    || p.z.abs() > c
                    || p.x.abs() + p.y.abs() + p.z.abs() > 1.5 * c
            }
        }
    }

    /// Uniform random point inside the container.
    ///
    /// Separable shapes sample each coordinate directly; the faceted shapes
    /// use rejection sampling in their bounding box.
    pub fn random_inside(&self, rng: &mut StdRng) -> Point3<f64> {
        match self {
            Geometry::Cuboid { length } | Geometry::Slit { length } => Point3::new(
                length.x * (rng.gen::<f64>() - 0.5),
                length.y * (rng.gen::<f64>() - 0.5),
                length.z * (rng.gen::<f64>() - 0.5),
            ),
            _ => {
                let len = self.side_lengths();
                loop {
                    let p = Point3::new(
                        len.x * (rng.gen::<f64>() - 0.5),
                        len.y * (rng.gen::<f64>() - 0.5),
                        len.z * (rng.gen::<f64>() - 0.5),
                    );
                    if !self.collision(&p) {
                        return p;
                    }
                }
            }
        }
    }

    /// Per-axis factors taking the current volume to `new_volume`.
    pub fn scale_factors(&self, new_volume: f64, policy: ScalePolicy) -> Result<Vector3<f64>> {
        if new_volume <= 0.0 || !new_volume.is_finite() {
            return Err(CoreError::NonPositiveVolume(new_volume));
        }
        let ratio = new_volume / self.volume();
        match (self, policy) {
            (Geometry::Cuboid { .. } | Geometry::Slit { .. }, ScalePolicy::Isotropic) => {
                Ok(Vector3::repeat(ratio.cbrt()))
            }
            (Geometry::Cuboid { .. } | Geometry::Slit { .. }, ScalePolicy::Xy) => {
                let f = ratio.sqrt();
                Ok(Vector3::new(f, f, 1.0))
            }
            (Geometry::Cuboid { .. } | Geometry::Slit { .. }, ScalePolicy::Z) => {
                Ok(Vector3::new(1.0, 1.0, ratio))
            }
            (_, ScalePolicy::Isotropic) => Ok(Vector3::repeat(ratio.cbrt())),
            _ => Err(CoreError::UnsupportedScaling),
        }
    }

    /// Resize the container by per-axis factors from [`Self::scale_factors`].
    pub fn apply_scale(&mut self, f: &Vector3<f64>) {
        match self {
            Geometry::Cuboid { length } | Geometry::Slit { length } => {
                length.component_mul_assign(f);
            }
            Geometry::Sphere { radius } => *radius *= f.x,
            Geometry::Cylinder { radius, length } => {
                *radius *= f.x;
                *length *= f.x;
            }
            Geometry::HexagonalPrism { side, height } => {
                *side *= f.x;
                *height *= f.x;
            }
            Geometry::TruncatedOctahedron { side } => *side *= f.x,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    const TOLERANCE: f64 = 1e-9;

    #[test]
    fn cuboid_minimum_image_uses_round_to_nearest() {
        let geo = Geometry::cube(10.0);
        let a = Point3::new(4.9, 0.0, 0.0);
        let b = Point3::new(-4.9, 0.0, 0.0);
        // direct separation 9.8, nearest image 0.2
        let d = geo.vdist(&a, &b);
        assert!((d.x - (-0.2)).abs() < TOLERANCE);
        assert!((geo.sqdist(&a, &b) - 0.04).abs() < TOLERANCE);
    }

    #[test]
    fn sqdist_is_symmetric_and_bounded_for_cube() {
        let side = 8.0;
        let geo = Geometry::cube(side);
        let mut rng = StdRng::seed_from_u64(7);
        let bound = 3.0 * (side / 2.0) * (side / 2.0);
        for _ in 0..200 {
            let a = geo.random_inside(&mut rng);
            let b = geo.random_inside(&mut rng);
            let ab = geo.sqdist(&a, &b);
            let ba = geo.sqdist(&b, &a);
            assert!((ab - ba).abs() < TOLERANCE);
            assert!(ab <= bound + TOLERANCE);
        }
    }

    #[test]
    fn slit_is_periodic_in_plane_only() {
        let geo = Geometry::Slit {
            length: Vector3::new(10.0, 10.0, 20.0),
        };
        let a = Point3::new(4.9, 0.0, 9.0);
        let b = Point3::new(-4.9, 0.0, -9.0);
        let d = geo.vdist(&a, &b);
        assert!((d.x.abs() - 0.2).abs() < TOLERANCE);
        assert!((d.z - 18.0).abs() < TOLERANCE);
        assert!(geo.collision(&Point3::new(0.0, 0.0, 10.5)));
        assert!(!geo.collision(&Point3::new(0.0, 0.0, 9.5)));
    }

    #[test]
    fn boundary_wraps_into_primary_cell() {
        let geo = Geometry::cube(10.0);
        let mut p = Point3::new(7.0, -12.0, 4.0);
        geo.boundary(&mut p);
        assert!((p.x - (-3.0)).abs() < TOLERANCE);
        assert!((p.y - (-2.0)).abs() < TOLERANCE);
        assert!((p.z - 4.0).abs() < TOLERANCE);
    }

    #[test]
    fn sphere_collision_and_random_points() {
        let geo = Geometry::Sphere { radius: 5.0 };
        assert!(geo.collision(&Point3::new(5.1, 0.0, 0.0)));
        assert!(!geo.collision(&Point3::new(4.9, 0.0, 0.0)));
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..100 {
            assert!(!geo.collision(&geo.random_inside(&mut rng)));
        }
    }

    #[test]
    fn hexagonal_prism_and_octahedron_volumes() {
        let hex = Geometry::HexagonalPrism {
            side: 2.0,
            height: 3.0,
        };
        assert!((hex.volume() - 1.5 * 3.0_f64.sqrt() * 4.0 * 3.0).abs() < TOLERANCE);
        let to = Geometry::TruncatedOctahedron { side: 1.5 };
        assert!((to.volume() - 8.0 * 2.0_f64.sqrt() * 1.5_f64.powi(3)).abs() < TOLERANCE);
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..50 {
            assert!(!hex.collision(&hex.random_inside(&mut rng)));
            assert!(!to.collision(&to.random_inside(&mut rng)));
        }
    }

    #[test]
    fn isotropic_scale_reaches_target_volume() {
        let mut geo = Geometry::cube(10.0);
        let f = geo.scale_factors(1331.0, ScalePolicy::Isotropic).unwrap();
        geo.apply_scale(&f);
        assert!((geo.volume() - 1331.0).abs() < 1e-6);
    }

    #[test]
    fn anisotropic_scale_keeps_fixed_axis() {
        let mut geo = Geometry::cube(10.0);
        let f = geo.scale_factors(2000.0, ScalePolicy::Xy).unwrap();
        geo.apply_scale(&f);
        match geo {
            Geometry::Cuboid { length } => {
                assert!((length.z - 10.0).abs() < TOLERANCE);
                assert!((length.x * length.y * length.z - 2000.0).abs() < 1e-6);
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn scaling_sphere_anisotropically_is_rejected() {
        let geo = Geometry::Sphere { radius: 5.0 };
        assert!(matches!(
            geo.scale_factors(100.0, ScalePolicy::Xy),
            Err(CoreError::UnsupportedScaling)
        ));
    }

    #[test]
    fn scaling_to_non_positive_volume_is_rejected() {
        let geo = Geometry::cube(10.0);
        assert!(matches!(
            geo.scale_factors(-1.0, ScalePolicy::Isotropic),
            Err(CoreError::NonPositiveVolume(_))
        ));
    }
}
