use crate::core::atom::AtomTable;
use crate::core::geometry::Geometry;
use crate::core::particle::Particle;
use crate::error::{CoreError, Result};
use bitflags::bitflags;
use nalgebra::{Point3, UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};
use std::ops::Range;

bitflags! {
    /// Tag set for selecting groups by state and kind.
    #[derive(Default, Clone, Copy, Debug, PartialEq, Eq)]
    pub struct Selectors: u8 {
        const ACTIVE    = 0b0000_0001; // at least one active particle
        const INACTIVE  = 0b0000_0010; // all particles deactivated
        const FULL      = 0b0000_0100; // size equals capacity
        const NEUTRAL   = 0b0000_1000; // active range carries no net charge
        const MOLECULAR = 0b0001_0000;
        const ATOMIC    = 0b0010_0000;
    }
}

/// A contiguous window `[begin, end)` into the particle arena, with
/// deactivated particles parked in `[end, cap)`.
///
/// The window never moves or changes capacity during a run; activation and
/// deactivation only slide `end`. For molecular (rigid) groups `cm` caches
/// the mass center of the active range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Group {
    begin: usize,
    end: usize,
    cap: usize,
    /// Molecule type id.
    pub id: usize,
    /// Unstructured collection (salt) rather than a rigid molecule.
    pub atomic: bool,
    /// Molecular group whose internal coordinates follow volume scaling.
    pub compressible: bool,
    /// Cached mass center of the active range (molecular groups).
    pub cm: Point3<f64>,
    /// Conformation id.
    pub confid: usize,
}

impl Group {
    pub fn new(begin: usize, end: usize) -> Self {
        Self {
            begin,
            end,
            cap: end,
            id: 0,
            atomic: false,
            compressible: false,
            cm: Point3::origin(),
            confid: 0,
        }
    }

    pub fn with_capacity(begin: usize, end: usize, cap: usize) -> Self {
        let mut g = Self::new(begin, end);
        g.cap = cap;
        g
    }

    pub fn begin(&self) -> usize {
        self.begin
    }

    pub fn end(&self) -> usize {
        self.end
    }

    pub fn cap_end(&self) -> usize {
        self.cap
    }

    pub fn size(&self) -> usize {
        self.end - self.begin
    }

    pub fn capacity(&self) -> usize {
        self.cap - self.begin
    }

    pub fn is_empty(&self) -> bool {
        self.end == self.begin
    }

    pub fn is_full(&self) -> bool {
        self.end == self.cap
    }

    /// Arena indices of the active range.
    pub fn range(&self) -> Range<usize> {
        self.begin..self.end
    }

    /// Arena indices of the inactive tail.
    pub fn inactive_range(&self) -> Range<usize> {
        self.end..self.cap
    }

    /// Arena indices of the full window, active or not.
    pub fn full_range(&self) -> Range<usize> {
        self.begin..self.cap
    }

    pub fn active<'a>(&self, p: &'a [Particle]) -> &'a [Particle] {
        &p[self.begin..self.end]
    }

    pub fn contains(&self, index: usize, include_inactive: bool) -> bool {
        if include_inactive {
            self.full_range().contains(&index)
        } else {
            self.range().contains(&index)
        }
    }

    /// Net charge of the active range.
    pub fn charge(&self, p: &[Particle]) -> f64 {
        self.active(p).iter().map(|i| i.charge).sum()
    }

    /// Arena indices of active particles with the given atom type.
    pub fn find_id<'a>(&self, p: &'a [Particle], id: usize) -> impl Iterator<Item = usize> + 'a {
        let begin = self.begin;
        p[self.begin..self.end]
            .iter()
            .enumerate()
            .filter(move |(_, particle)| particle.id == id)
            .map(move |(offset, _)| begin + offset)
    }

    /// Deactivate `[first, last)`, offsets relative to the active window.
    ///
    /// The sub-slice is rotated to the tail of the active range before `end`
    /// is pulled back, so survivors keep their relative order and the
    /// deactivated particles stay readable just past `end`.
    pub fn deactivate(&mut self, first: usize, last: usize, p: &mut [Particle]) -> Result<()> {
        if first > last || last > self.size() {
            return Err(CoreError::Window(format!(
                "deactivate [{first}, {last}) exceeds active size {}",
                self.size()
            )));
        }
        let count = last - first;
        if count == 0 {
            return Ok(());
        }
        p[self.begin + first..self.end].rotate_left(count);
        self.end -= count;
        Ok(())
    }

    /// Re-activate `count` particles from the head of the inactive tail.
    pub fn activate(&mut self, count: usize) -> Result<()> {
        if self.end + count > self.cap {
            return Err(CoreError::Window(format!(
                "activate {} exceeds capacity {} (size {})",
                count,
                self.capacity(),
                self.size()
            )));
        }
        self.end += count;
        Ok(())
    }

    /// Mass center of the active range under minimum-image convention.
    ///
    /// Offsets are measured from the first active particle so that molecules
    /// straddling a periodic boundary average correctly; the result is
    /// wrapped back into the cell.
    pub fn mass_center(
        &self,
        geo: &Geometry,
        p: &[Particle],
        table: &AtomTable,
    ) -> Option<Point3<f64>> {
        let active = self.active(p);
        let origin = active.first()?.pos;
        let mut weighted = Vector3::zeros();
        let mut total_mass = 0.0;
        for particle in active {
            let mass = table.get(particle.id).map_or(1.0, |k| k.mass);
            weighted += mass * geo.vdist(&particle.pos, &origin);
            total_mass += mass;
        }
        let mut cm = origin + weighted / total_mass;
        geo.boundary(&mut cm);
        Some(cm)
    }

    pub fn update_mass_center(&mut self, geo: &Geometry, p: &[Particle], table: &AtomTable) {
        if let Some(cm) = self.mass_center(geo, p, table) {
            self.cm = cm;
        }
    }

    /// Add `delta` to every active position and to the mass center, wrapping
    /// each through the container boundary.
    pub fn translate(&mut self, delta: &Vector3<f64>, geo: &Geometry, p: &mut [Particle]) {
        for particle in &mut p[self.begin..self.end] {
            particle.pos += delta;
            geo.boundary(&mut particle.pos);
        }
        self.cm += delta;
        geo.boundary(&mut self.cm);
    }

    /// Rotate active positions about the mass center and spin any extended
    /// dipole/orientation vectors by the same quaternion.
    pub fn rotate(&mut self, q: &UnitQuaternion<f64>, geo: &Geometry, p: &mut [Particle]) {
        for particle in &mut p[self.begin..self.end] {
            let shifted = geo.vdist(&particle.pos, &self.cm);
            particle.pos = self.cm + q.transform_vector(&shifted);
            geo.boundary(&mut particle.pos);
            if particle.has_ext() {
                let ext = particle.ext_mut();
                ext.mu = q.transform_vector(&ext.mu);
                ext.scdir = q.transform_vector(&ext.scdir);
            }
        }
    }

    /// Shift the whole window right after an arena insertion upstream.
    pub(crate) fn shift_right(&mut self, delta: usize) {
        self.begin += delta;
        self.end += delta;
        self.cap += delta;
    }

    /// Extend active range and capacity by `n` slots spliced in at `end`.
    /// Only valid when the window has no inactive tail.
    pub(crate) fn grow_active(&mut self, n: usize) {
        debug_assert_eq!(self.end, self.cap);
        self.end += n;
        self.cap += n;
    }

    /// Deep copy into a window of a different arena: particle contents are
    /// written through `dst`'s window, metadata and active size are taken
    /// from `self`. Window positions of `dst` are untouched.
    pub fn clone_into(
        &self,
        src: &[Particle],
        dst: &mut Group,
        dst_arena: &mut [Particle],
    ) -> Result<()> {
        if self.capacity() != dst.capacity() {
            return Err(CoreError::Window(format!(
                "deep copy between capacities {} and {}",
                self.capacity(),
                dst.capacity()
            )));
        }
        for offset in 0..self.capacity() {
            dst_arena[dst.begin + offset] = src[self.begin + offset].clone();
        }
        dst.end = dst.begin + self.size();
        dst.id = self.id;
        dst.atomic = self.atomic;
        dst.compressible = self.compressible;
        dst.cm = self.cm;
        dst.confid = self.confid;
        Ok(())
    }
}

/// Predicate accepting a group only if every tag in `sel` holds.
pub fn group_filter(sel: Selectors) -> impl Fn(&Group, &[Particle]) -> bool {
    const CHARGE_EPSILON: f64 = 1e-9;
    move |g, p| {
        if sel.contains(Selectors::ACTIVE) && g.is_empty() {
            return false;
        }
        if sel.contains(Selectors::INACTIVE) && !g.is_empty() {
            return false;
        }
        if sel.contains(Selectors::FULL) && !g.is_full() {
            return false;
        }
        if sel.contains(Selectors::NEUTRAL) && g.charge(p).abs() > CHARGE_EPSILON {
            return false;
        }
        if sel.contains(Selectors::MOLECULAR) && g.atomic {
            return false;
        }
        if sel.contains(Selectors::ATOMIC) && !g.atomic {
            return false;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::atom::AtomKind;

    const TOLERANCE: f64 = 1e-9;

    fn arena_with_ids(ids: &[usize]) -> Vec<Particle> {
        ids.iter().map(|&id| Particle::new(id, 0.0, Point3::origin())).collect()
    }

    #[test]
    fn deactivation_parks_particles_past_end() {
        let mut p = arena_with_ids(&[10, 20, 30, 40, 50, 60]);
        let mut g = Group::new(0, 6);
        assert_eq!(g.size(), 6);
        assert_eq!(g.size(), g.capacity());
        assert!(!g.is_empty());

        // remove the two particles at offsets 1 and 2 (ids 20 and 30)
        g.deactivate(1, 3, &mut p).unwrap();
        assert_eq!(g.size(), 4);
        assert!(g.active(&p).iter().all(|i| i.id != 20 && i.id != 30));
        assert_eq!(p[g.end()].id, 20);
        assert_eq!(p[g.end() + 1].id, 30);

        g.activate(2).unwrap();
        assert_eq!(g.size(), 6);
        let mut ids: Vec<_> = g.active(&p).iter().map(|i| i.id).collect();
        ids.sort_unstable();
        assert_eq!(ids, vec![10, 20, 30, 40, 50, 60]);
    }

    #[test]
    fn full_deactivation_and_reactivation() {
        let mut p = arena_with_ids(&[1, 2, 3]);
        let mut g = Group::new(0, 3);
        g.deactivate(0, 3, &mut p).unwrap();
        assert!(g.is_empty());
        assert_eq!(g.capacity(), 3);
        assert_eq!(g.inactive_range().len(), 3);
        g.activate(3).unwrap();
        assert_eq!(g.size(), 3);
    }

    #[test]
    fn empty_deactivation_is_a_noop() {
        let mut p = arena_with_ids(&[1, 2, 3]);
        let mut g = Group::new(0, 3);
        g.deactivate(1, 1, &mut p).unwrap();
        assert_eq!(g.size(), 3);
        assert_eq!(p[1].id, 2);
    }

    #[test]
    fn activation_beyond_capacity_fails() {
        let mut g = Group::new(0, 2);
        assert!(matches!(g.activate(1), Err(CoreError::Window(_))));
        let mut p = arena_with_ids(&[1, 2]);
        assert!(g.deactivate(0, 3, &mut p).is_err());
    }

    #[test]
    fn contains_distinguishes_active_and_inactive() {
        let mut p = arena_with_ids(&[0, 1, 1]);
        let mut g = Group::new(0, 3);
        assert!(g.contains(2, false));
        g.deactivate(2, 3, &mut p).unwrap();
        assert!(!g.contains(2, false));
        assert!(g.contains(2, true));
    }

    #[test]
    fn find_id_yields_matching_active_indices() {
        let p = arena_with_ids(&[0, 1, 1]);
        let g = Group::new(0, 3);
        let found: Vec<_> = g.find_id(&p, 1).collect();
        assert_eq!(found, vec![1, 2]);
    }

    #[test]
    fn rotation_turns_positions_and_dipoles() {
        let mut p = vec![Particle::new(0, 0.0, Point3::new(0.0, 1.0, 0.0))];
        p[0].ext_mut().mu = Vector3::y();
        p[0].ext_mut().scdir = Vector3::y();
        let mut g = Group::new(0, 1);
        let geo = Geometry::cube(2.0);

        let q = UnitQuaternion::from_axis_angle(&Vector3::x_axis(), std::f64::consts::FRAC_PI_2);
        g.rotate(&q, &geo, &mut p);

        assert!(p[0].pos.y.abs() < TOLERANCE);
        assert!((p[0].pos.z - 1.0).abs() < TOLERANCE);
        assert!(p[0].ext().unwrap().mu.y.abs() < TOLERANCE);
        assert!((p[0].ext().unwrap().mu.z - 1.0).abs() < TOLERANCE);
        assert!(p[0].ext().unwrap().scdir.y.abs() < TOLERANCE);
        assert!((p[0].ext().unwrap().scdir.z - 1.0).abs() < TOLERANCE);
    }

    #[test]
    fn rotation_preserves_pairwise_distances() {
        let mut p = vec![
            Particle::new(0, 0.0, Point3::new(1.0, 0.0, 0.0)),
            Particle::new(0, 0.0, Point3::new(0.0, 2.0, 0.0)),
            Particle::new(0, 0.0, Point3::new(0.0, 0.0, 3.0)),
        ];
        let mut g = Group::new(0, 3);
        let geo = Geometry::cube(1e6); // effectively open boundaries
        let table = AtomTable::new(vec![AtomKind::new("X")]).unwrap();
        g.update_mass_center(&geo, &p, &table);

        let before: Vec<f64> = [(0, 1), (0, 2), (1, 2)]
            .iter()
            .map(|&(i, j)| geo.sqdist(&p[i].pos, &p[j].pos))
            .collect();

        let axis = nalgebra::Unit::new_normalize(Vector3::new(1.0, 1.0, -0.5));
        let q = UnitQuaternion::from_axis_angle(&axis, 1.1);
        g.rotate(&q, &geo, &mut p);

        for (&(i, j), &d0) in [(0, 1), (0, 2), (1, 2)].iter().zip(&before) {
            assert!((geo.sqdist(&p[i].pos, &p[j].pos) - d0).abs() < 1e-9);
        }
    }

    #[test]
    fn rotating_an_empty_group_is_a_noop() {
        let mut p = arena_with_ids(&[7]);
        let mut g = Group::new(0, 1);
        g.deactivate(0, 1, &mut p).unwrap();
        let geo = Geometry::cube(10.0);
        let q = UnitQuaternion::from_axis_angle(&Vector3::x_axis(), 1.0);
        g.rotate(&q, &geo, &mut p);
        assert_eq!(p[0].id, 7);
        assert_eq!(p[0].pos, Point3::origin());
    }

    #[test]
    fn translate_moves_positions_and_mass_center() {
        let mut p = vec![Particle::new(0, 0.0, Point3::new(1.0, 0.0, 0.0))];
        let mut g = Group::new(0, 1);
        g.cm = Point3::new(1.0, 0.0, 0.0);
        let geo = Geometry::cube(10.0);
        g.translate(&Vector3::new(0.5, -1.0, 0.0), &geo, &mut p);
        assert!((p[0].pos.x - 1.5).abs() < TOLERANCE);
        assert!((g.cm.x - 1.5).abs() < TOLERANCE);
        assert!((g.cm.y + 1.0).abs() < TOLERANCE);
    }

    #[test]
    fn mass_center_respects_periodic_images() {
        // two equal-mass particles straddling the boundary of a 10 Å box
        let p = vec![
            Particle::new(0, 0.0, Point3::new(4.8, 0.0, 0.0)),
            Particle::new(0, 0.0, Point3::new(-4.8, 0.0, 0.0)),
        ];
        let g = Group::new(0, 2);
        let geo = Geometry::cube(10.0);
        let table = AtomTable::new(vec![AtomKind::new("X")]).unwrap();
        let cm = g.mass_center(&geo, &p, &table).unwrap();
        // midpoint through the wall, not through the box center
        assert!((cm.x.abs() - 5.0).abs() < 0.2 + TOLERANCE);
        assert!(cm.x.abs() > 4.0);
    }

    #[test]
    fn deep_copy_overwrites_destination_contents() {
        let mut src_arena = arena_with_ids(&[1, 0, 0, 0, 0]);
        let mut dst_arena = arena_with_ids(&[9, 9, 9, 9, 9]);
        src_arena[0].id = 10;

        let mut src = Group::new(0, 5);
        src.id = 100;
        src.atomic = true;
        src.cm = Point3::new(1.0, 0.0, 0.0);
        src.confid = 20;
        src.deactivate(4, 5, &mut src_arena).unwrap();

        let mut dst = Group::new(0, 5);
        src.clone_into(&src_arena, &mut dst, &mut dst_arena).unwrap();

        assert_eq!(dst.id, 100);
        assert!(dst.atomic);
        assert_eq!(dst.cm.x, 1.0);
        assert_eq!(dst.confid, 20);
        assert_eq!(dst.size(), 4);
        assert_eq!(dst.capacity(), 5);
        assert_eq!(dst_arena[0].id, 10);
        assert_eq!(dst.begin(), 0);
    }

    #[test]
    fn filters_evaluate_all_requested_tags() {
        let mut p = arena_with_ids(&[0, 1, 1]);
        let mut g = Group::new(0, 3);

        let filter = group_filter(Selectors::ACTIVE);
        assert!(filter(&g, &p));
        assert!(group_filter(Selectors::FULL)(&g, &p));
        assert!(!group_filter(Selectors::INACTIVE)(&g, &p));
        assert!(group_filter(Selectors::ACTIVE | Selectors::NEUTRAL)(&g, &p));
        assert!(group_filter(Selectors::ACTIVE | Selectors::MOLECULAR)(&g, &p));
        assert!(!group_filter(Selectors::ACTIVE | Selectors::ATOMIC)(&g, &p));

        p[0].charge = 0.1;
        assert!(!group_filter(Selectors::ACTIVE | Selectors::NEUTRAL)(&g, &p));
        p[0].charge = 0.0;

        g.deactivate(2, 3, &mut p).unwrap();
        assert!(!group_filter(Selectors::FULL)(&g, &p));
        assert!(group_filter(Selectors::ACTIVE)(&g, &p));
        assert!(!group_filter(Selectors::INACTIVE)(&g, &p));
    }
}
