/*
    prodigy
    https://github.com/prodigy-rs/prodigy

    --------------------------------------------------------------------------

    src/volume_usage/mod.rs

    L2' of the layered stack: a fixed-size, per-allocation-chunk owner-and-
    in-use map. Filesystem scans populate this independently of whatever
    directory structure they parse, so cross-file conflicts (two entries
    claiming the same chunk) are detected generically rather than by each
    filesystem module re-implementing the same bookkeeping.
*/
use bitflags::bitflags;

use crate::errors::VolumeUsageError;

bitflags! {
    /// Per-chunk diagnostic flags. A mismatch between [`UsageFlags::MARKED_IN_USE`]
    /// and a non-[`Owner::None`] owner is diagnostic only, never structural;
    /// see [`VolumeUsage::analyze`].
    #[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
    pub struct UsageFlags: u8 {
        const MARKED_IN_USE = 0b001;
        const UNREADABLE    = 0b010;
        const CONFLICT      = 0b100;
    }
}

/// A capability a chunk's owner may implement to be notified when another
/// owner claims the same chunk. Mirrors the "capability interface, not class
/// hierarchy" guidance for polymorphism over the closed set of owner kinds.
pub trait ConflictObserver {
    /// Called on both the existing and incoming owner when `set_usage` finds
    /// the slot already owned by someone else. `other` identifies the other
    /// claimant for diagnostic/logging purposes.
    fn on_conflict(&mut self, chunk: usize, other: &Owner);
}

/// The owner of an allocation chunk, as recorded in the volume-usage map.
///
/// `SystemSentinel` is a first-class variant (not a null pointer in owner
/// position) so the conflict-notification path stays total: every owner
/// slot is either genuinely free or names someone, and "someone" always
/// includes the degenerate "the filesystem's own bookkeeping" case (e.g. a
/// boot block, or the VTOC/catalog itself).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Owner {
    None,
    /// Chunk is claimed by filesystem-internal bookkeeping (boot blocks,
    /// volume directory, bitmap) rather than by any user file.
    SystemSentinel,
    /// Chunk is claimed by a user file, identified by an implementation-defined
    /// reference (a path, an inode-like index, whatever the filesystem module uses).
    FileRef(String),
}

impl Owner {
    pub fn is_none(&self) -> bool {
        matches!(self, Owner::None)
    }
}

#[derive(Clone, Debug, Default)]
struct Slot {
    flags: UsageFlags,
    owner: Owner,
}

/// Counters returned by [`VolumeUsage::analyze`].
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct UsageAnalysis {
    /// Chunks with [`UsageFlags::MARKED_IN_USE`] set.
    pub marked_used: usize,
    /// Chunks marked in use but with no owner recorded.
    pub marked_no_owner: usize,
    /// Chunks with an owner but not marked in use.
    pub owned_not_marked: usize,
    /// Chunks where [`UsageFlags::CONFLICT`] is set.
    pub conflicts: usize,
}

/// A fixed-size, one-entry-per-allocation-chunk usage map. Sized at
/// construction to the volume's allocation count and never resized.
#[derive(Clone, Debug)]
pub struct VolumeUsage {
    slots: Vec<Slot>,
}

impl VolumeUsage {
    /// Creates a map with `chunk_count` entries, all unmarked and unowned.
    pub fn new(chunk_count: usize) -> Self {
        Self {
            slots: vec![Slot::default(); chunk_count],
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    fn check(&self, chunk: usize) -> Result<(), VolumeUsageError> {
        if chunk >= self.slots.len() {
            Err(VolumeUsageError::OutOfRange(chunk))
        } else {
            Ok(())
        }
    }

    pub fn flags(&self, chunk: usize) -> Result<UsageFlags, VolumeUsageError> {
        self.check(chunk)?;
        Ok(self.slots[chunk].flags)
    }

    pub fn owner(&self, chunk: usize) -> Result<&Owner, VolumeUsageError> {
        self.check(chunk)?;
        Ok(&self.slots[chunk].owner)
    }

    pub fn is_conflicted(&self, chunk: usize) -> Result<bool, VolumeUsageError> {
        Ok(self.flags(chunk)?.contains(UsageFlags::CONFLICT))
    }

    /// Sets [`UsageFlags::MARKED_IN_USE`] without touching ownership.
    pub fn mark_in_use(&mut self, chunk: usize) -> Result<(), VolumeUsageError> {
        self.check(chunk)?;
        self.slots[chunk].flags.insert(UsageFlags::MARKED_IN_USE);
        Ok(())
    }

    /// Records `owner` as claiming `chunk`. If the slot already has a
    /// different non-`None` owner, both are flagged [`UsageFlags::CONFLICT`]
    /// and, if `observer` is supplied, notified via [`ConflictObserver`].
    /// Setting the same owner again, or setting `Owner::None` (a no-op,
    /// use [`Self::free_chunk`] instead), never raises a conflict.
    pub fn set_usage(
        &mut self,
        chunk: usize,
        owner: Owner,
        mut observer: Option<&mut dyn ConflictObserver>,
    ) -> Result<(), VolumeUsageError> {
        self.check(chunk)?;
        if owner.is_none() {
            return Ok(());
        }
        let existing = self.slots[chunk].owner.clone();
        if !existing.is_none() && existing != owner {
            self.slots[chunk].flags.insert(UsageFlags::CONFLICT);
            if let Some(obs) = observer.as_deref_mut() {
                obs.on_conflict(chunk, &owner);
                obs.on_conflict(chunk, &existing);
            }
        }
        self.slots[chunk].owner = owner;
        Ok(())
    }

    /// Combined mark-in-use-and-own. Asserts the slot is currently unowned;
    /// use [`Self::set_usage`] directly if reassignment/conflict detection
    /// is the intent.
    pub fn alloc_chunk(&mut self, chunk: usize, owner: Owner) -> Result<(), VolumeUsageError> {
        self.check(chunk)?;
        if !self.slots[chunk].owner.is_none() {
            return Err(VolumeUsageError::AlreadyOwned);
        }
        self.slots[chunk].flags.insert(UsageFlags::MARKED_IN_USE);
        self.slots[chunk].owner = owner;
        Ok(())
    }

    /// Clears both the in-use flag and ownership (conflict flag included).
    pub fn free_chunk(&mut self, chunk: usize) -> Result<(), VolumeUsageError> {
        self.check(chunk)?;
        self.slots[chunk].flags = UsageFlags::empty();
        self.slots[chunk].owner = Owner::None;
        Ok(())
    }

    /// Returns the four summary counters: marked-used, marked-with-no-owner,
    /// owned-but-not-marked, and conflicting slots.
    pub fn analyze(&self) -> UsageAnalysis {
        let mut a = UsageAnalysis::default();
        for slot in &self.slots {
            let marked = slot.flags.contains(UsageFlags::MARKED_IN_USE);
            let owned = !slot.owner.is_none();
            if marked {
                a.marked_used += 1;
            }
            if marked && !owned {
                a.marked_no_owner += 1;
            }
            if owned && !marked {
                a.owned_not_marked += 1;
            }
            if slot.flags.contains(UsageFlags::CONFLICT) {
                a.conflicts += 1;
            }
        }
        a
    }

    /// The maximal sorted set of chunk indexes that are marked in use but
    /// have no owner — the "lost" blocks a filesystem repair tool would
    /// want to surface.
    pub fn generate_no_usage_set(&self) -> Vec<usize> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.flags.contains(UsageFlags::MARKED_IN_USE) && slot.owner.is_none())
            .map(|(i, _)| i)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Log(Vec<(usize, Owner)>);
    impl ConflictObserver for Log {
        fn on_conflict(&mut self, chunk: usize, other: &Owner) {
            self.0.push((chunk, other.clone()));
        }
    }

    #[test]
    fn set_usage_conflict_is_idempotent_on_first_collision_only() {
        let mut usage = VolumeUsage::new(16);
        let mut log = Log(Vec::new());
        usage
            .set_usage(5, Owner::FileRef("A".into()), Some(&mut log))
            .unwrap();
        assert!(!usage.is_conflicted(5).unwrap());

        usage
            .set_usage(5, Owner::FileRef("B".into()), Some(&mut log))
            .unwrap();
        assert!(usage.is_conflicted(5).unwrap());
        assert_eq!(log.0.len(), 2);

        assert_eq!(*usage.owner(5).unwrap(), Owner::FileRef("B".into()));
    }

    #[test]
    fn alloc_chunk_rejects_already_owned() {
        let mut usage = VolumeUsage::new(4);
        usage.alloc_chunk(0, Owner::SystemSentinel).unwrap();
        assert!(matches!(
            usage.alloc_chunk(0, Owner::FileRef("x".into())),
            Err(VolumeUsageError::AlreadyOwned)
        ));
    }

    #[test]
    fn free_chunk_clears_flags_and_owner() {
        let mut usage = VolumeUsage::new(4);
        usage.alloc_chunk(2, Owner::SystemSentinel).unwrap();
        usage.free_chunk(2).unwrap();
        assert_eq!(usage.flags(2).unwrap(), UsageFlags::empty());
        assert!(usage.owner(2).unwrap().is_none());
    }

    #[test]
    fn analyze_counts_mismatches() {
        let mut usage = VolumeUsage::new(4);
        usage.mark_in_use(0).unwrap(); // marked, no owner
        usage.set_usage(1, Owner::SystemSentinel, None).unwrap(); // owned, not marked
        usage.alloc_chunk(2, Owner::SystemSentinel).unwrap(); // consistent
        let a = usage.analyze();
        assert_eq!(a.marked_used, 2);
        assert_eq!(a.marked_no_owner, 1);
        assert_eq!(a.owned_not_marked, 1);
        assert_eq!(a.conflicts, 0);
        assert_eq!(usage.generate_no_usage_set(), vec![0]);
    }

    #[test]
    fn out_of_range_is_rejected() {
        let usage = VolumeUsage::new(4);
        assert!(matches!(usage.flags(4), Err(VolumeUsageError::OutOfRange(4))));
    }
}
