/*
    prodigy
    https://github.com/prodigy-rs/prodigy

    --------------------------------------------------------------------------

    src/chunk/gate.rs

    L2 of the layered stack: wrap a [`ChunkSource`] behind an
    explicit capability gate so a filesystem host can be handed exactly the
    access level it's entitled to, without the chunk source itself knowing
    anything about why.
*/
use super::{ChunkSource, Geometry};
use crate::errors::ChunkError;
use crate::skew::FileOrder;

/// The capability a [`GatedChunkAccess`] currently grants.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub enum AccessLevel {
    /// No decision has been made yet; behaves as [`AccessLevel::Closed`].
    #[default]
    Unknown,
    /// Reads and writes both pass through.
    Open,
    /// Reads pass through; writes are denied.
    ReadOnly,
    /// Neither reads nor writes pass through.
    Closed,
}

/// A [`ChunkSource`] wrapped with a mutable capability gate.
/// Closing or downgrading the gate takes effect immediately for every
/// subsequent call; it never rewrites or inspects bytes already read.
pub struct GatedChunkAccess<S> {
    source: S,
    level: AccessLevel,
}

impl<S: ChunkSource> GatedChunkAccess<S> {
    pub fn new(source: S, level: AccessLevel) -> Self {
        Self { source, level }
    }

    pub fn level(&self) -> AccessLevel {
        self.level
    }

    pub fn set_level(&mut self, level: AccessLevel) {
        self.level = level;
    }

    pub fn into_inner(self) -> S {
        self.source
    }

    pub fn inner(&self) -> &S {
        &self.source
    }

    fn check(&self, write: bool) -> Result<(), ChunkError> {
        match self.level {
            AccessLevel::Open => Ok(()),
            AccessLevel::ReadOnly if !write => Ok(()),
            AccessLevel::ReadOnly => Err(ChunkError::AccessDenied("gate is read-only")),
            AccessLevel::Closed => Err(ChunkError::AccessDenied("gate is closed")),
            AccessLevel::Unknown => Err(ChunkError::AccessDenied("gate access level was never set")),
        }
    }
}

impl<S: ChunkSource> ChunkSource for GatedChunkAccess<S> {
    fn formatted_length(&self) -> usize {
        self.source.formatted_length()
    }

    fn geometry(&self) -> Option<Geometry> {
        self.source.geometry()
    }

    fn file_order(&self) -> FileOrder {
        self.source.file_order()
    }

    fn set_file_order(&mut self, order: FileOrder) {
        self.source.set_file_order(order);
    }

    fn read_only(&self) -> bool {
        self.source.read_only() || !matches!(self.level, AccessLevel::Open)
    }

    fn read_count(&self) -> u64 {
        self.source.read_count()
    }

    fn write_count(&self) -> u64 {
        self.source.write_count()
    }

    fn dirty(&self) -> bool {
        self.source.dirty()
    }

    fn set_dirty(&mut self, dirty: bool) {
        self.source.set_dirty(dirty);
    }

    fn read_sector(&mut self, track: usize, sector: usize, out: &mut [u8]) -> Result<(), ChunkError> {
        self.check(false)?;
        self.source.read_sector(track, sector, out)
    }

    fn write_sector(&mut self, track: usize, sector: usize, data: &[u8]) -> Result<(), ChunkError> {
        self.check(true)?;
        self.source.write_sector(track, sector, data)
    }

    fn test_sector(&mut self, track: usize, sector: usize) -> Result<bool, ChunkError> {
        self.check(false)?;
        self.source.test_sector(track, sector)
    }

    fn read_block(&mut self, block: usize, out: &mut [u8]) -> Result<(), ChunkError> {
        self.check(false)?;
        self.source.read_block(block, out)
    }

    fn write_block(&mut self, block: usize, data: &[u8]) -> Result<(), ChunkError> {
        self.check(true)?;
        self.source.write_block(block, data)
    }

    fn test_block(&mut self, block: usize) -> Result<bool, ChunkError> {
        self.check(false)?;
        self.source.test_block(block)
    }

    fn read_block_cpm(&mut self, block: usize, out: &mut [u8]) -> Result<(), ChunkError> {
        self.check(false)?;
        self.source.read_block_cpm(block, out)
    }

    fn write_block_cpm(&mut self, block: usize, data: &[u8]) -> Result<(), ChunkError> {
        self.check(true)?;
        self.source.write_block_cpm(block, data)
    }

    fn initialize(&mut self) -> Result<(), ChunkError> {
        self.check(true)?;
        self.source.initialize()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::chunk::{Geometry, UnadornedSectorSource};

    fn new_source() -> UnadornedSectorSource<Cursor<Vec<u8>>> {
        let buf = vec![0u8; 35 * 16 * 256];
        UnadornedSectorSource::new(
            Cursor::new(buf),
            35 * 16 * 256,
            Some(Geometry {
                tracks: 35,
                sectors_per_track: 16,
            }),
            FileOrder::Dos,
            false,
        )
    }

    #[test]
    fn closed_gate_denies_reads_and_writes() {
        let mut gate = GatedChunkAccess::new(new_source(), AccessLevel::Closed);
        let mut buf = vec![0u8; 256];
        assert!(matches!(gate.read_sector(0, 0, &mut buf), Err(ChunkError::AccessDenied(_))));
        assert!(matches!(gate.write_sector(0, 0, &buf), Err(ChunkError::AccessDenied(_))));
    }

    #[test]
    fn read_only_gate_allows_reads_denies_writes() {
        let mut gate = GatedChunkAccess::new(new_source(), AccessLevel::ReadOnly);
        let mut buf = vec![0u8; 256];
        assert!(gate.read_sector(0, 0, &mut buf).is_ok());
        assert!(matches!(gate.write_sector(0, 0, &buf), Err(ChunkError::AccessDenied(_))));
    }

    #[test]
    fn open_gate_allows_both() {
        let mut gate = GatedChunkAccess::new(new_source(), AccessLevel::Open);
        let pattern = vec![0x42u8; 256];
        gate.write_sector(0, 0, &pattern).unwrap();
        let mut buf = vec![0u8; 256];
        gate.read_sector(0, 0, &mut buf).unwrap();
        assert_eq!(buf, pattern);
    }

    #[test]
    fn unknown_level_behaves_as_closed() {
        let mut gate = GatedChunkAccess::new(new_source(), AccessLevel::Unknown);
        let mut buf = vec![0u8; 256];
        assert!(matches!(gate.read_sector(0, 0, &mut buf), Err(ChunkError::AccessDenied(_))));
    }

    #[test]
    fn downgrading_takes_effect_immediately() {
        let mut gate = GatedChunkAccess::new(new_source(), AccessLevel::Open);
        let pattern = vec![0x11u8; 256];
        gate.write_sector(1, 0, &pattern).unwrap();
        gate.set_level(AccessLevel::ReadOnly);
        assert!(matches!(gate.write_sector(1, 0, &pattern), Err(ChunkError::AccessDenied(_))));
        let mut buf = vec![0u8; 256];
        gate.read_sector(1, 0, &mut buf).unwrap();
        assert_eq!(buf, pattern);
    }
}
