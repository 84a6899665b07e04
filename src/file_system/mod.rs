/*
    prodigy
    https://github.com/prodigy-rs/prodigy

    --------------------------------------------------------------------------

    src/file_system/mod.rs

    L4 of the layered stack: the Raw/Cooked filesystem lifecycle
    state machine, generic over any [`ChunkSource`] and any
    [`FilesystemParser`] (ProDOS, DOS 3.x, HFS, Pascal, and CP/M parsers
    would each implement it).
*/
pub mod entry;
pub mod raw;

use std::collections::HashMap;

pub use entry::{FileEntry, ForkKind, Timestamp};

use crate::chunk::{AccessLevel, ChunkSource, GatedChunkAccess};
use crate::container::Partition;
use crate::errors::FilesystemError;
use crate::notes::Notes;
use crate::stream::{FileStream, ForkBackend};
use crate::volume_usage::VolumeUsage;

/// The result of probing a chunk source for a particular filesystem.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum TestResult {
    No,
    Barely,
    Maybe,
    Good,
    Yes,
}

/// The two-mode filesystem state. `Raw` permits direct chunk
/// I/O and holds no cached metadata; `Cooked` exposes the file API and
/// forbids raw writes via the gate.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Mode {
    Raw,
    Cooked,
}

/// The seam at which a concrete historical filesystem plugs in. Every method
/// receives the gated chunk source it must route all medium I/O through.
pub trait FilesystemParser {
    fn test_image(&self, chunks: &mut dyn ChunkSource) -> TestResult;

    /// Populates `self`'s directory/entry cache from the medium. `quick`
    /// requests a directory-only scan; a full scan additionally verifies
    /// every file's allocation chain and may mark entries dubious/damaged.
    /// Recoverable per-sector errors are recorded in `notes` rather than
    /// raised; only a wholesale scan failure
    /// returns `Err`.
    fn scan(&mut self, chunks: &mut dyn ChunkSource, quick: bool, notes: &mut Notes) -> Result<(), FilesystemError>;

    /// Number of allocation units on the volume, for sizing a fresh [`VolumeUsage`].
    fn allocation_count(&self) -> usize;

    /// Marks every chunk this parser currently considers owned, in the
    /// supplied map.
    fn record_usage(&self, usage: &mut VolumeUsage);

    fn entries(&self) -> &[FileEntry];

    fn create_file(
        &mut self,
        chunks: &mut dyn ChunkSource,
        name: &str,
        prodos_type: u8,
        prodos_aux: u16,
    ) -> Result<FileEntry, FilesystemError>;

    fn delete_file(&mut self, chunks: &mut dyn ChunkSource, name: &str) -> Result<(), FilesystemError>;

    fn read_fork(&mut self, chunks: &mut dyn ChunkSource, name: &str, fork: ForkKind) -> Result<Vec<u8>, FilesystemError>;

    fn write_fork(
        &mut self,
        chunks: &mut dyn ChunkSource,
        name: &str,
        fork: ForkKind,
        data: &[u8],
    ) -> Result<(), FilesystemError>;

    /// Embedded partition maps found during the scan; empty unless the concrete filesystem supports them.
    fn find_embedded_volumes(&self) -> Vec<Partition> {
        Vec::new()
    }
}

/// An in-memory, fully-materialized fork backend, handed out by
/// [`FilesystemHost::open_fork`] and written back through
/// [`FilesystemHost::commit_fork`]. Every offset is "data"; there is no
/// sparse region to report, since forks here round-trip through a parser's
/// whole-buffer `read_fork`/`write_fork`.
pub struct VecForkBackend(Vec<u8>);

impl VecForkBackend {
    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }
}

impl ForkBackend for VecForkBackend {
    fn len(&self) -> u64 {
        self.0.len() as u64
    }

    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> std::io::Result<usize> {
        let offset = offset as usize;
        if offset >= self.0.len() {
            return Ok(0);
        }
        let n = buf.len().min(self.0.len() - offset);
        buf[..n].copy_from_slice(&self.0[offset..offset + n]);
        Ok(n)
    }

    fn write_at(&mut self, offset: u64, buf: &[u8]) -> std::io::Result<()> {
        let offset = offset as usize;
        if offset + buf.len() > self.0.len() {
            self.0.resize(offset + buf.len(), 0);
        }
        self.0[offset..offset + buf.len()].copy_from_slice(buf);
        Ok(())
    }

    fn set_len(&mut self, len: u64) -> std::io::Result<()> {
        self.0.resize(len as usize, 0);
        Ok(())
    }

    fn next_data(&self, from: u64) -> u64 {
        from.min(self.len())
    }

    fn next_hole(&self, _from: u64) -> u64 {
        self.len()
    }
}

/// A handle for an open fork stream, tracking which file/fork it backs so
/// [`FilesystemHost::commit_fork`] knows where to write it back.
pub struct OpenFork {
    name: String,
    fork: ForkKind,
    stream: FileStream<VecForkBackend>,
}

impl std::ops::Deref for OpenFork {
    type Target = FileStream<VecForkBackend>;
    fn deref(&self) -> &Self::Target {
        &self.stream
    }
}

impl std::ops::DerefMut for OpenFork {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.stream
    }
}

/// Drives one [`FilesystemParser`] through the Raw/Cooked lifecycle over a
/// gated chunk source.
pub struct FilesystemHost<S> {
    gate: GatedChunkAccess<S>,
    mode: Mode,
    parser: Box<dyn FilesystemParser>,
    usage: Option<VolumeUsage>,
    notes: Notes,
    open_forks: usize,
    dubious: bool,
}

impl<S: ChunkSource> FilesystemHost<S> {
    pub fn new(source: S, parser: Box<dyn FilesystemParser>) -> Self {
        Self {
            gate: GatedChunkAccess::new(source, AccessLevel::Open),
            mode: Mode::Raw,
            parser,
            usage: None,
            notes: Notes::new(),
            open_forks: 0,
            dubious: false,
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn notes(&self) -> &Notes {
        &self.notes
    }

    pub fn volume_usage(&self) -> Option<&VolumeUsage> {
        self.usage.as_ref()
    }

    /// A dubious volume is effectively read-only in Cooked mode.
    pub fn dubious(&self) -> bool {
        self.dubious
    }

    /// Gives raw, ungated access to the chunk source. Only meaningful in
    /// `Raw` mode; the gate itself enforces the Cooked-mode write ban, so
    /// this is safe to expose unconditionally.
    pub fn chunk_source(&mut self) -> &mut GatedChunkAccess<S> {
        &mut self.gate
    }

    fn require_cooked(&self) -> Result<(), FilesystemError> {
        if self.mode != Mode::Cooked {
            return Err(FilesystemError::InvalidOperation("filesystem is not in Cooked mode"));
        }
        Ok(())
    }

    /// Runs `f` with the gate briefly raised to `Open` so the parser can
    /// persist directory/allocation metadata through `chunks.write_*`, then
    /// restores `ReadOnly` before returning. Only the parser's own writes
    /// pass through this window — [`Self::chunk_source`] keeps handing out
    /// the `ReadOnly`-gated view to callers, so invariant 7 (application raw
    /// writes denied in Cooked mode) still holds.
    fn with_privileged_write<R>(&mut self, f: impl FnOnce(&mut Self) -> R) -> R {
        self.gate.set_level(AccessLevel::Open);
        let result = f(self);
        self.gate.set_level(AccessLevel::ReadOnly);
        result
    }

    /// Raw -> Cooked: requires `test_image` to pass at least
    /// `Barely`; scans, builds the volume-usage map, closes the gate to
    /// read-only. A no-op if already Cooked.
    pub fn cook(&mut self, quick: bool) -> Result<(), FilesystemError> {
        if self.mode == Mode::Cooked {
            return Ok(());
        }
        let result = self.parser.test_image(&mut self.gate);
        if result < TestResult::Barely {
            return Err(FilesystemError::InvalidOperation("volume failed test_image during Raw->Cooked transition"));
        }
        self.notes.clear();
        self.parser.scan(&mut self.gate, quick, &mut self.notes)?;

        let mut usage = VolumeUsage::new(self.parser.allocation_count());
        self.parser.record_usage(&mut usage);
        self.usage = Some(usage);
        self.dubious = self.notes.dubious();

        self.gate.set_level(AccessLevel::ReadOnly);
        self.mode = Mode::Cooked;
        Ok(())
    }

    /// Cooked -> Raw: forbidden while any fork is open; purges
    /// cached metadata and reopens the gate. A no-op if already Raw.
    pub fn uncook(&mut self) -> Result<(), FilesystemError> {
        if self.mode == Mode::Raw {
            return Ok(());
        }
        if self.open_forks > 0 {
            return Err(FilesystemError::InvalidOperation("cannot leave Cooked mode while a fork stream is open"));
        }
        self.usage = None;
        self.notes.clear();
        self.dubious = false;
        self.gate.set_level(AccessLevel::Open);
        self.mode = Mode::Raw;
        Ok(())
    }

    pub fn entries(&self) -> &[FileEntry] {
        self.parser.entries()
    }

    pub fn create_file(&mut self, name: &str, prodos_type: u8, prodos_aux: u16) -> Result<FileEntry, FilesystemError> {
        self.require_cooked()?;
        if self.dubious {
            return Err(FilesystemError::ReadOnly);
        }
        self.with_privileged_write(|host| host.parser.create_file(&mut host.gate, name, prodos_type, prodos_aux))
    }

    pub fn delete_file(&mut self, name: &str) -> Result<(), FilesystemError> {
        self.require_cooked()?;
        if self.dubious {
            return Err(FilesystemError::ReadOnly);
        }
        self.with_privileged_write(|host| host.parser.delete_file(&mut host.gate, name))
    }

    /// Reads an entire fork in one call, without going through a [`FileStream`].
    pub fn read_fork(&mut self, name: &str, fork: ForkKind) -> Result<Vec<u8>, FilesystemError> {
        self.require_cooked()?;
        self.parser.read_fork(&mut self.gate, name, fork)
    }

    /// Writes an entire fork in one call, without going through a [`FileStream`].
    pub fn write_fork(&mut self, name: &str, fork: ForkKind, data: &[u8]) -> Result<(), FilesystemError> {
        self.require_cooked()?;
        if self.dubious {
            return Err(FilesystemError::ReadOnly);
        }
        self.with_privileged_write(|host| host.parser.write_fork(&mut host.gate, name, fork, data))
    }

    /// Opens a fork as a random-access stream. The parser's
    /// current bytes are materialized into the stream up front; call
    /// [`Self::commit_fork`] to write any changes back, or [`Self::close_fork`]
    /// to discard a read-only stream. Either call releases the open-fork
    /// count that blocks Cooked -> Raw.
    pub fn open_fork(&mut self, name: &str, fork: ForkKind) -> Result<OpenFork, FilesystemError> {
        self.require_cooked()?;
        let data = self.parser.read_fork(&mut self.gate, name, fork)?;
        self.open_forks += 1;
        Ok(OpenFork {
            name: name.to_string(),
            fork,
            stream: FileStream::new(VecForkBackend(data)),
        })
    }

    pub fn commit_fork(&mut self, handle: OpenFork) -> Result<(), FilesystemError> {
        self.open_forks = self.open_forks.saturating_sub(1);
        if self.dubious {
            return Err(FilesystemError::ReadOnly);
        }
        let data = handle.stream.into_inner().into_bytes();
        self.with_privileged_write(|host| host.parser.write_fork(&mut host.gate, &handle.name, handle.fork, &data))
    }

    pub fn close_fork(&mut self, _handle: OpenFork) {
        self.open_forks = self.open_forks.saturating_sub(1);
    }

    pub fn open_fork_count(&self) -> usize {
        self.open_forks
    }

    /// Embedded partition maps the scan found; their backing
    /// blocks are already marked dubious on the host volume-usage map by
    /// the parser's `record_usage`.
    pub fn find_embedded_volumes(&self) -> Vec<Partition> {
        self.parser.find_embedded_volumes()
    }
}

/// Name-keyed allocation table shared by [`raw::RawVolume`] tests and any
/// other minimal parser that just needs "name -> (start block, block count)".
pub(crate) type AllocationTable = HashMap<String, (u32, u32)>;

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::raw::RawVolume;
    use super::*;
    use crate::chunk::{Geometry, UnadornedSectorSource};
    use crate::skew::FileOrder;

    fn new_host() -> FilesystemHost<UnadornedSectorSource<Cursor<Vec<u8>>>> {
        let buf = vec![0u8; 560 * 512];
        let source = UnadornedSectorSource::new(
            Cursor::new(buf),
            560 * 512,
            Some(Geometry {
                tracks: 35,
                sectors_per_track: 16,
            }),
            FileOrder::ProDos,
            false,
        );
        let mut host = FilesystemHost::new(source, Box::new(RawVolume::new()));
        RawVolume::format(host.chunk_source()).unwrap();
        host
    }

    #[test]
    fn raw_to_cooked_to_raw_round_trip() {
        let mut host = new_host();
        assert_eq!(host.mode(), Mode::Raw);
        host.cook(false).unwrap();
        assert_eq!(host.mode(), Mode::Cooked);
        host.uncook().unwrap();
        assert_eq!(host.mode(), Mode::Raw);
    }

    #[test]
    fn cooked_mode_blocks_raw_chunk_writes() {
        let mut host = new_host();
        host.cook(false).unwrap();
        let data = vec![0u8; 512];
        assert!(matches!(
            host.chunk_source().write_block(10, &data),
            Err(crate::errors::ChunkError::AccessDenied(_))
        ));
    }

    #[test]
    fn create_write_read_round_trips_through_mode_transitions() {
        let mut host = new_host();
        host.cook(false).unwrap();
        host.create_file("HELLO", 0x06, 0x2000).unwrap();
        let payload: Vec<u8> = (0..16).collect();
        host.write_fork("HELLO", ForkKind::Data, &payload).unwrap();

        host.uncook().unwrap();
        host.cook(false).unwrap();

        let entries = host.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].display_name, "HELLO");
        assert_eq!(entries[0].prodos_type, 0x06);
        assert_eq!(entries[0].prodos_aux, 0x2000);
        assert_eq!(entries[0].data_length, 16);

        let read_back = host.read_fork("HELLO", ForkKind::Data).unwrap();
        assert_eq!(read_back, payload);
    }

    #[test]
    fn cannot_uncook_while_fork_open() {
        let mut host = new_host();
        host.cook(false).unwrap();
        host.create_file("A", 0, 0).unwrap();
        host.write_fork("A", ForkKind::Data, b"x").unwrap();
        let handle = host.open_fork("A", ForkKind::Data).unwrap();
        assert!(matches!(host.uncook(), Err(FilesystemError::InvalidOperation(_))));
        host.close_fork(handle);
        host.uncook().unwrap();
    }
}
