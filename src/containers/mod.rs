/*
    prodigy
    https://github.com/prodigy-rs/prodigy

    --------------------------------------------------------------------------

    src/containers/mod.rs

    L4' of the layered stack: the file-archive transaction model. Edits are
    recorded against an open [`ArchiveTransaction`] and only take effect on
    [`ArchiveHost::commit`], which writes a complete new archive to a
    caller-supplied output stream.
*/
pub mod gzip_backend;
pub mod zip_backend;

use std::io::{Seek, SeekFrom};

use crate::errors::ArchiveError;
use crate::file_system::entry::AccessFlags;
use crate::io::ByteSource;

/// Which part of an archive record an operation or read stream addresses.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum PartKind {
    Data,
    Resource,
    /// The record itself carries a disk image payload rather than a forked file.
    DiskImage,
}

/// Compression tags, numbered the way NuFX numbers them. Only [`Uncompressed`](Self::Uncompressed)
/// and [`Deflate`](Self::Deflate) have a working codec in this crate; every other tag
/// round-trips as data and yields [`ArchiveError::Unsupported`] if an `AddPart` op asks for it.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CompressionFormat {
    Uncompressed = 0,
    Squeeze = 1,
    NuLzw1 = 2,
    NuLzw2 = 3,
    Lzc12 = 4,
    Lzc16 = 5,
    Deflate = 6,
    Bzip2 = 7,
    Shrink = 21,
    Implode = 26,
    Default = 127,
}

/// A deferred byte producer for one part being added during a transaction.
/// `read_all` may be called more than once in a single commit: a compression
/// attempt that fails to shrink the part rewinds and re-opens the source to
/// write it uncompressed. Implementors should treat each call as an
/// independent open-read-close cycle; nothing about this crate calls it
/// outside of a commit.
pub trait PartSource {
    fn read_all(&mut self) -> std::io::Result<Vec<u8>>;
}

/// The simplest possible [`PartSource`]: the bytes are already in memory.
impl PartSource for Vec<u8> {
    fn read_all(&mut self) -> std::io::Result<Vec<u8>> {
        Ok(self.clone())
    }
}

/// A [`PartSource`] backed by a closure, useful for tests that need to
/// observe or fail a particular open (e.g. a source that succeeds once and
/// fails the second time commit retries it, simulating the disk fault in
/// scenario S3).
pub struct FnPartSource<F>(pub F);

impl<F: FnMut() -> std::io::Result<Vec<u8>>> PartSource for FnPartSource<F> {
    fn read_all(&mut self) -> std::io::Result<Vec<u8>> {
        (self.0)()
    }
}

/// One queued edit. Nothing here touches the archive stream; [`ArchiveHost::commit`]
/// is the only place these are interpreted.
pub enum ArchiveOp {
    CreateRecord {
        name: String,
    },
    DeleteRecord {
        name: String,
    },
    AddPart {
        name: String,
        kind: PartKind,
        source: Box<dyn PartSource>,
        compression: CompressionFormat,
    },
    DeletePart {
        name: String,
        kind: PartKind,
    },
    SetAccess {
        name: String,
        access: AccessFlags,
    },
}

/// An in-memory queue of edits against one [`ArchiveHost`]. At most one may
/// be open per host at a time; committing or cancelling closes it.
#[derive(Default)]
pub struct ArchiveTransaction {
    ops: Vec<ArchiveOp>,
}

impl ArchiveTransaction {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_record(&mut self, name: impl Into<String>) -> &mut Self {
        self.ops.push(ArchiveOp::CreateRecord { name: name.into() });
        self
    }

    pub fn delete_record(&mut self, name: impl Into<String>) -> &mut Self {
        self.ops.push(ArchiveOp::DeleteRecord { name: name.into() });
        self
    }

    pub fn add_part(
        &mut self,
        name: impl Into<String>,
        kind: PartKind,
        source: Box<dyn PartSource>,
        compression: CompressionFormat,
    ) -> &mut Self {
        self.ops.push(ArchiveOp::AddPart {
            name: name.into(),
            kind,
            source,
            compression,
        });
        self
    }

    pub fn delete_part(&mut self, name: impl Into<String>, kind: PartKind) -> &mut Self {
        self.ops.push(ArchiveOp::DeletePart { name: name.into(), kind });
        self
    }

    pub fn set_access(&mut self, name: impl Into<String>, access: AccessFlags) -> &mut Self {
        self.ops.push(ArchiveOp::SetAccess { name: name.into(), access });
        self
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn ops(&self) -> &[ArchiveOp] {
        &self.ops
    }
}

/// One listed record in an archive, independent of backend.
#[derive(Clone, Debug)]
pub struct ArchiveEntryInfo {
    pub name: String,
    pub has_data: bool,
    pub data_len: u64,
    pub has_resource: bool,
    pub resource_len: u64,
    pub access: AccessFlags,
    pub checksum: Option<u16>,
}

/// The closed set of archive wire formats this crate can actually commit to.
/// (Other container kinds recognized by [`crate::detect`] are read-only here;
/// see the per-kind commentary in that module.)
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ArchiveKind {
    Zip,
    GZip,
}

/// Hosts one archive's transaction lifecycle over an owned byte source.
/// Reads use an in-memory snapshot of the directory; writes only ever touch
/// the stream through [`Self::commit`].
pub struct ArchiveHost<B> {
    stream: B,
    kind: ArchiveKind,
    transaction: Option<ArchiveTransaction>,
    open_reads: usize,
}

impl<B: ByteSource> ArchiveHost<B> {
    pub fn open(stream: B, kind: ArchiveKind) -> Self {
        Self {
            stream,
            kind,
            transaction: None,
            open_reads: 0,
        }
    }

    pub fn kind(&self) -> ArchiveKind {
        self.kind
    }

    pub fn into_inner(self) -> B {
        self.stream
    }

    /// Snapshots the current record listing.
    pub fn list(&mut self) -> Result<Vec<ArchiveEntryInfo>, ArchiveError> {
        match self.kind {
            ArchiveKind::Zip => zip_backend::list(&mut self.stream),
            ArchiveKind::GZip => gzip_backend::list(&mut self.stream),
        }
    }

    /// Reads one part's bytes in full, verifying its checksum if the backend
    /// carries one. Archive parts are read forward-only and materialized up
    /// front, consistent with how [`crate::container::DiskImage::analyze`]
    /// treats its own host stream.
    pub fn read_part(&mut self, name: &str, kind: PartKind) -> Result<Vec<u8>, ArchiveError> {
        self.open_reads += 1;
        let result = match self.kind {
            ArchiveKind::Zip => zip_backend::read_part(&mut self.stream, name, kind),
            ArchiveKind::GZip => gzip_backend::read_part(&mut self.stream, name, kind),
        };
        self.open_reads -= 1;
        result
    }

    /// Opens a new transaction. Fails if one is already open, or if a read is
    /// in progress (reads are synchronous and brief in this crate, so this
    /// only ever trips if a caller nests calls incorrectly).
    pub fn begin_transaction(&mut self) -> Result<&mut ArchiveTransaction, ArchiveError> {
        if self.transaction.is_some() {
            return Err(ArchiveError::InvalidOperation("a transaction is already open"));
        }
        if self.open_reads > 0 {
            return Err(ArchiveError::InvalidOperation("cannot begin a transaction while a read is in progress"));
        }
        self.transaction = Some(ArchiveTransaction::new());
        Ok(self.transaction.as_mut().unwrap())
    }

    pub fn transaction_mut(&mut self) -> Option<&mut ArchiveTransaction> {
        self.transaction.as_mut()
    }

    pub fn has_transaction(&self) -> bool {
        self.transaction.is_some()
    }

    /// Discards the open transaction without touching the archive stream.
    pub fn cancel_transaction(&mut self) {
        self.transaction = None;
    }

    /// Applies the open transaction, reconstructing the whole archive into
    /// `output` (every [`ArchiveKind`] this crate supports needs a full
    /// rewrite even for an attribute-only edit, since neither ZIP's central
    /// directory nor a gzip member header is patched in place here). On
    /// success the host adopts `output` as its new archive stream and the
    /// old one is dropped. On failure `output` is rewound to its start and
    /// the transaction remains open for retry or cancellation; this crate's
    /// generic [`ByteSource`] has no portable truncate primitive, so a
    /// caller reusing a file-backed stream across a failed attempt is
    /// responsible for discarding anything left past the rewound position.
    pub fn commit(&mut self, output: B) -> Result<(), ArchiveError> {
        let txn = self
            .transaction
            .take()
            .ok_or(ArchiveError::InvalidOperation("no open transaction to commit"))?;

        if self.open_reads > 0 {
            self.transaction = Some(txn);
            return Err(ArchiveError::InvalidOperation("cannot commit while a read is in progress"));
        }

        let mut output = output;
        let result = match self.kind {
            ArchiveKind::Zip => zip_backend::commit(&mut self.stream, &mut output, &txn),
            ArchiveKind::GZip => gzip_backend::commit(&mut self.stream, &mut output, &txn),
        };

        match result {
            Ok(()) => {
                self.stream = output;
                Ok(())
            }
            Err(e) => {
                let _ = output.seek(SeekFrom::Start(0));
                self.transaction = Some(txn);
                Err(e)
            }
        }
    }
}
