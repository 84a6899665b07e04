/*
    prodigy
    https://github.com/prodigy-rs/prodigy

    Copyright 2026 Prodigy Contributors

    Permission is hereby granted, free of charge, to any person obtaining a
    copy of this software and associated documentation files (the “Software”),
    to deal in the Software without restriction, including without limitation
    the rights to use, copy, modify, merge, publish, distribute, sublicense,
    and/or sell copies of the Software, and to permit persons to whom the
    Software is furnished to do so, subject to the following conditions:

    The above copyright notice and this permission notice shall be included in
    all copies or substantial portions of the Software.

    THE SOFTWARE IS PROVIDED “AS IS”, WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
    IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
    FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
    AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
    LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING
    FROM, OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER
    DEALINGS IN THE SOFTWARE.

    --------------------------------------------------------------------------
*/

//! # prodigy
//!
//! prodigy is a Rust library for reading, writing, and analyzing disk images and
//! file archives of the kind used by 8- and 16-bit Apple systems: 5.25" and 3.5"
//! floppies, ProDOS hard-drive images, and the `.shk`/`.zip`/`.gz` archives that
//! carry their files across the modern internet.
//!
//! The crate is organized as a stack of layers, each one built on the layer below:
//!
//! - [`chunk`] addresses a disk image as fixed-size sectors or blocks, independent
//!   of whatever physical encoding or file ordering produced those bytes.
//! - [`nibble`] encodes and decodes the GCR bitstreams actually written to 5.25"
//!   floppy tracks, feeding [`chunk::NibbleTrackSource`].
//! - [`chunk::gate`] wraps a chunk source with a capability gate (open, read-only,
//!   closed) so higher layers can be handed exactly the access they're entitled to.
//! - [`volume_usage`] tracks which chunks are free, in use, or in conflict, without
//!   understanding any particular filesystem's allocation format.
//! - [`container`] recognizes disk image container formats and holds the gated
//!   chunk source plus whatever a [`detect`] pass concluded about its contents.
//! - [`file_system`] hosts a pluggable [`file_system::FilesystemParser`] through a
//!   raw/cooked lifecycle and exposes files as [`stream::FileStream`]s.
//! - [`containers`] (the file-archive side) hosts append-only archive backends
//!   through a transaction model with deferred part sources and atomic commit.
//!
//! None of the concrete historical filesystems (ProDOS, DOS 3.3, HFS, Pascal,
//! CP/M) are implemented here; [`file_system::FilesystemParser`] is the seam at
//! which they would plug in. One minimal implementation, [`file_system::raw::RawVolume`],
//! ships so the lifecycle and test suite have something real to drive.

pub mod chunk;
mod detect;
mod errors;
pub mod containers;
pub mod file_system;
pub mod geometry;
mod io;
pub mod nibble;
pub mod notes;
pub mod skew;
pub mod stream;
pub mod volume_usage;

pub mod container;

/// The logical sector size used by 13- and 16-sector 5.25" DOS-family disks.
pub const SECTOR_SIZE: usize = 256;
/// The logical block size used by ProDOS and hard-drive images.
pub const BLOCK_SIZE: usize = 512;
/// The logical block size used by Apple CP/M volumes.
pub const KBLOCK_SIZE: usize = 1024;
/// A 5.25" DOS 3.3 volume's track count times sectors-per-track times [`SECTOR_SIZE`].
pub const STANDARD_DISK_BYTES: usize = 143_360;
/// The default volume number ProDOS and DOS formatters stamp on a 5.25" disk address field
/// when the caller does not specify one.
pub const DEFAULT_525_VOLUME_NUM: u8 = 254;

pub use crate::errors::{
    AnalyzerError, ArchiveError, ChunkError, CoreError, FilesystemError, NibbleError, VolumeUsageError,
};
pub use crate::io::ByteSource;

pub use crate::container::{DiskImage, DiskImageContainer};
pub use crate::detect::{detect_container, supported_extensions};
