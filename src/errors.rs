/*
    prodigy
    https://github.com/prodigy-rs/prodigy

    --------------------------------------------------------------------------

    src/errors.rs

    The error taxonomy: one thiserror enum per layer, plus a crate-wide
    CoreError that wraps each of them with #[from] so callers can propagate
    with a single `?` regardless of which layer raised it.
*/
use std::io;

use thiserror::Error;

/// Errors raised by the chunk-access layer.
#[derive(Debug, Error)]
pub enum ChunkError {
    #[error("track/sector or block address is out of range for this chunk source")]
    OutOfRange,
    #[error("write attempted on a read-only chunk source")]
    ReadOnly,
    #[error("this chunk source has no sector addressing")]
    NoSectors,
    #[error("this chunk source has no block addressing")]
    NoBlocks,
    #[error("unreadable physical sector at track {track}, sector {sector}")]
    BadBlockTs { track: usize, sector: usize },
    #[error("unreadable physical block {0}")]
    BadBlockNum(usize),
    #[error("short read: expected {expected} bytes, got {got}")]
    ShortRead { expected: usize, got: usize },
    #[error("gated chunk access denied: {0}")]
    AccessDenied(&'static str),
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Errors raised by the nibble codec.
#[derive(Debug, Error)]
pub enum NibbleError {
    #[error("address prolog not found on track within the search window")]
    AddressPrologNotFound,
    #[error("data prolog not found on track within the search window")]
    DataPrologNotFound,
    #[error("byte outside the configured disk-byte alphabet encountered while decoding")]
    InvalidAlphabetByte,
    #[error("address or data checksum did not validate")]
    ChecksumMismatch,
    #[error("track number encoded in the address field did not match the expected track")]
    TrackMismatch,
    #[error("sector requested was not found on this track")]
    SectorNotFound,
    #[error("codec is configured read-only")]
    ReadOnly,
}

/// Errors raised by volume-usage bookkeeping.
#[derive(Debug, Error)]
pub enum VolumeUsageError {
    #[error("chunk index {0} is out of range for this volume-usage map")]
    OutOfRange(usize),
    #[error("alloc_chunk called on a chunk that already has an owner")]
    AlreadyOwned,
}

/// Errors raised by the disk-image analyzer.
#[derive(Debug, Error)]
pub enum AnalyzerError {
    #[error("container format could not be identified")]
    FormatUnknown,
    #[error("filesystem could not be identified")]
    FilesystemUnknown,
    #[error("container kind {0} was recognized but this build carries no decoder for it")]
    Unsupported(&'static str),
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Errors raised by the filesystem lifecycle and file API.
#[derive(Debug, Error)]
pub enum FilesystemError {
    #[error("no free allocation unit or directory slot for this write")]
    DiskFull,
    #[error("named entry not found: {0}")]
    NotFound(String),
    #[error("name already in use: {0}")]
    Duplicate(String),
    #[error("name violates filesystem syntax: {0}")]
    InvalidName(String),
    #[error("write attempted on a read-only filesystem, gate, or dubious volume")]
    ReadOnly,
    #[error("API misuse: {0}")]
    InvalidOperation(&'static str),
    #[error("physical sector/block unreadable")]
    BadBlock,
    #[error("gated chunk access denied")]
    AccessDenied,
    #[error(transparent)]
    Chunk(#[from] ChunkError),
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Errors raised by the file-archive transaction model.
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("checksum mismatch reading an archive fork")]
    CorruptedData,
    #[error("named entry not found: {0}")]
    NotFound(String),
    #[error("name already in use: {0}")]
    Duplicate(String),
    #[error("operation unsupported by this archive variant: {0}")]
    Unsupported(&'static str),
    #[error("API misuse: {0}")]
    InvalidOperation(&'static str),
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Crate-wide error type. Most public APIs return `Result<T, CoreError>`;
/// layer-specific call sites can still match on the narrower enums via `From`.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Chunk(#[from] ChunkError),
    #[error(transparent)]
    Nibble(#[from] NibbleError),
    #[error(transparent)]
    VolumeUsage(#[from] VolumeUsageError),
    #[error(transparent)]
    Analyzer(#[from] AnalyzerError),
    #[error(transparent)]
    Filesystem(#[from] FilesystemError),
    #[error(transparent)]
    Archive(#[from] ArchiveError),
    #[error(transparent)]
    Io(#[from] io::Error),
}
