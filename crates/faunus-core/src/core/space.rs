use crate::core::atom::AtomTable;
use crate::core::geometry::{Geometry, ScalePolicy};
use crate::core::group::Group;
use crate::core::particle::Particle;
use crate::error::{CoreError, Result};

/// Read-only snapshot of one state (trial or committed) handed to energy
/// terms. A term always evaluates against the state it is given; it has no
/// other way to reach particle data.
#[derive(Clone, Copy)]
pub struct SpaceView<'a> {
    pub geo: &'a Geometry,
    pub particles: &'a [Particle],
    pub groups: &'a [Group],
}

impl<'a> SpaceView<'a> {
    /// Arena indices of all active particles, in group order.
    pub fn active_indices(&self) -> impl Iterator<Item = usize> + 'a {
        self.groups.iter().flat_map(|g| g.range())
    }

    /// Index of the group whose window holds the arena index, if any.
    pub fn group_of(&self, index: usize) -> Option<usize> {
        self.groups.iter().position(|g| g.contains(index, true))
    }
}

/// Which part of the trial state a move touched.
#[derive(Debug, Clone, Default)]
pub struct Change {
    /// The trial geometry was scaled.
    pub volume: bool,
    /// Give up on minimal copying and mirror the whole state.
    pub everything: bool,
    /// Group windows moved or changed size (insertion/deletion).
    pub resized: bool,
    pub groups: Vec<GroupChange>,
}

/// One touched group; an empty `atoms` list means the whole window.
#[derive(Debug, Clone)]
pub struct GroupChange {
    pub index: usize,
    pub atoms: Vec<usize>,
}

impl Change {
    pub fn single_particle(group: usize, index: usize) -> Self {
        Change {
            groups: vec![GroupChange {
                index: group,
                atoms: vec![index],
            }],
            ..Default::default()
        }
    }

    pub fn whole_group(group: usize) -> Self {
        Change {
            groups: vec![GroupChange {
                index: group,
                atoms: Vec::new(),
            }],
            ..Default::default()
        }
    }

    pub fn all() -> Self {
        Change {
            everything: true,
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        !self.volume && !self.everything && !self.resized && self.groups.is_empty()
    }
}

/// Owner of the particle arena, its group partition and the container.
///
/// Two full copies of the state are kept: moves mutate the trial copy, and
/// the Metropolis outcome decides whether [`Space::sync`] advances the
/// committed copy or [`Space::revert`] restores the trial one. Outside a
/// move the two copies are identical.
#[derive(Debug, Clone)]
pub struct Space {
    pub geo: Geometry,
    pub trial_geo: Geometry,
    pub p: Vec<Particle>,
    pub groups: Vec<Group>,
    pub trial_p: Vec<Particle>,
    pub trial_groups: Vec<Group>,
    table: AtomTable,
}

impl Space {
    pub fn new(geo: Geometry, table: AtomTable) -> Self {
        Self {
            trial_geo: geo.clone(),
            geo,
            p: Vec::new(),
            groups: Vec::new(),
            trial_p: Vec::new(),
            trial_groups: Vec::new(),
            table,
        }
    }

    pub fn table(&self) -> &AtomTable {
        &self.table
    }

    pub fn committed(&self) -> SpaceView<'_> {
        SpaceView {
            geo: &self.geo,
            particles: &self.p,
            groups: &self.groups,
        }
    }

    pub fn trial(&self) -> SpaceView<'_> {
        SpaceView {
            geo: &self.trial_geo,
            particles: &self.trial_p,
            groups: &self.trial_groups,
        }
    }

    /// Append a group owning `particles`, mirrored into the trial state.
    /// `reserve` extra inactive slots are allocated past the active range.
    pub fn push_group(
        &mut self,
        molid: usize,
        atomic: bool,
        particles: Vec<Particle>,
        reserve: usize,
    ) -> usize {
        let begin = self.p.len();
        let end = begin + particles.len();
        self.p.extend(particles);
        // inactive slots are real particles so reactivation never allocates
        self.p
            .extend(std::iter::repeat(Particle::default()).take(reserve));
        let mut group = Group::with_capacity(begin, end, end + reserve);
        group.id = molid;
        group.atomic = atomic;
        if !atomic {
            group.update_mass_center(&self.geo, &self.p, &self.table);
        }
        self.groups.push(group);
        self.trial_p = self.p.clone();
        self.trial_groups = self.groups.clone();
        self.groups.len() - 1
    }

    /// Copy trial changes into the committed state.
    pub fn sync(&mut self, change: &Change) {
        if change.everything || change.resized {
            self.p = self.trial_p.clone();
            self.groups = self.trial_groups.clone();
            self.geo = self.trial_geo.clone();
            return;
        }
        if change.volume {
            self.geo = self.trial_geo.clone();
        }
        for gc in &change.groups {
            Self::copy_group(
                &self.trial_groups,
                &self.trial_p,
                &mut self.groups,
                &mut self.p,
                gc,
            );
        }
    }

    /// Drop trial changes, restoring the committed state.
    pub fn revert(&mut self, change: &Change) {
        if change.everything || change.resized {
            self.trial_p = self.p.clone();
            self.trial_groups = self.groups.clone();
            self.trial_geo = self.geo.clone();
            return;
        }
        if change.volume {
            self.trial_geo = self.geo.clone();
        }
        for gc in &change.groups {
            Self::copy_group(
                &self.groups,
                &self.p,
                &mut self.trial_groups,
                &mut self.trial_p,
                gc,
            );
        }
    }

    fn copy_group(
        src_groups: &[Group],
        src_p: &[Particle],
        dst_groups: &mut [Group],
        dst_p: &mut [Particle],
        gc: &GroupChange,
    ) {
        let src = &src_groups[gc.index];
        dst_groups[gc.index] = src.clone();
        if gc.atoms.is_empty() {
            for i in src.full_range() {
                dst_p[i] = src_p[i].clone();
            }
        } else {
            for &i in &gc.atoms {
                dst_p[i] = src_p[i].clone();
            }
        }
    }

    /// Scale the trial state to `new_volume` and return the previous volume.
    ///
    /// Atomic and compressible groups scale every position; rigid molecular
    /// groups scale the mass center and translate their members with it.
    pub fn scale_volume(&mut self, new_volume: f64, policy: ScalePolicy) -> Result<f64> {
        let old_volume = self.trial_geo.volume();
        let factors = self.trial_geo.scale_factors(new_volume, policy)?;
        self.trial_geo.apply_scale(&factors);
        for group in &mut self.trial_groups {
            if group.atomic || group.compressible {
                for i in group.range() {
                    let pos = &mut self.trial_p[i].pos;
                    pos.coords.component_mul_assign(&factors);
                }
                group.update_mass_center(&self.trial_geo, &self.trial_p, &self.table);
            } else {
                let old_cm = group.cm;
                let new_cm = old_cm.coords.component_mul(&factors);
                let shift = new_cm - old_cm.coords;
                for i in group.range() {
                    self.trial_p[i].pos += shift;
                    self.trial_geo.boundary(&mut self.trial_p[i].pos);
                }
                group.cm = new_cm.into();
                self.trial_geo.boundary(&mut group.cm);
            }
        }
        Ok(old_volume)
    }

    /// Insert particles at the end of a group's active range, in the trial
    /// state only. Free inactive slots are consumed first; beyond capacity
    /// the arena grows and every later group window is shifted.
    pub fn insert_particles(
        &mut self,
        group_index: usize,
        particles: &[Particle],
    ) -> Result<Vec<usize>> {
        let n = particles.len();
        let group = self
            .trial_groups
            .get(group_index)
            .ok_or_else(|| CoreError::Window(format!("no group {group_index}")))?;
        let free = group.cap_end() - group.end();
        let mut inserted = Vec::with_capacity(n);

        let from_slots = free.min(n);
        let slot_start = group.end();
        for (offset, particle) in particles.iter().take(from_slots).enumerate() {
            self.trial_p[slot_start + offset] = particle.clone();
            inserted.push(slot_start + offset);
        }
        self.trial_groups[group_index].activate(from_slots)?;

        let remaining = &particles[from_slots..];
        if !remaining.is_empty() {
            // free slots are exhausted here, so the window has no inactive tail
            let insert_at = self.trial_groups[group_index].cap_end();
            self.trial_p
                .splice(insert_at..insert_at, remaining.iter().cloned());
            self.trial_groups[group_index].grow_active(remaining.len());
            inserted.extend(insert_at..insert_at + remaining.len());
            for later in &mut self.trial_groups[group_index + 1..] {
                later.shift_right(remaining.len());
            }
        }
        Ok(inserted)
    }

    /// Remove one active particle from a group in the trial state by swapping
    /// it to the end of the active range and deactivating it. The arena never
    /// shrinks.
    pub fn erase_particle(&mut self, group_index: usize, arena_index: usize) -> Result<()> {
        let group = self
            .trial_groups
            .get_mut(group_index)
            .ok_or_else(|| CoreError::Window(format!("no group {group_index}")))?;
        if !group.contains(arena_index, false) {
            return Err(CoreError::Window(format!(
                "arena index {arena_index} is not active in group {group_index}"
            )));
        }
        let offset = arena_index - group.begin();
        group.deactivate(offset, offset + 1, &mut self.trial_p)
    }

    /// Structural invariants: group windows must tile the arena in order.
    pub fn check_invariants(&self) -> Result<()> {
        let mut cursor = 0;
        for g in &self.groups {
            if g.begin() != cursor || g.cap_end() > self.p.len() {
                return Err(CoreError::InvalidGroupRange {
                    begin: g.begin(),
                    cap: g.cap_end(),
                    len: self.p.len(),
                });
            }
            cursor = g.cap_end();
        }
        if cursor != self.p.len() {
            return Err(CoreError::InvalidGroupRange {
                begin: cursor,
                cap: cursor,
                len: self.p.len(),
            });
        }
        Ok(())
    }

    /// Total number of active particles.
    pub fn active_count(&self) -> usize {
        self.groups.iter().map(|g| g.size()).sum()
    }
}
