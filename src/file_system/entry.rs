/*
    prodigy
    https://github.com/prodigy-rs/prodigy

    --------------------------------------------------------------------------

    src/file_system/entry.rs

    The file-entry handle: identity, type tags across the Apple II/Mac OS
    historical filesystems, timestamps, and fork sizes. One shape serves
    every filesystem variant; a concrete [`crate::file_system::FilesystemParser`]
    only ever populates the subset relevant to itself.
*/
use bitflags::bitflags;

/// Directory-path separator used to join [`FileEntry::parent`] components.
/// ProDOS, DOS 3.3, and Apple CP/M all use `/` for this; HFS's on-disk `:`
/// is purely a Mac OS Finder display convention and is not carried through.
pub const PATH_SEPARATOR: char = '/';

bitflags! {
    /// File access bits, values mirroring ProDOS/GS-OS (also used by archive
    /// entries that carry the same semantics, e.g. NuFX's `access` field).
    #[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
    pub struct AccessFlags: u8 {
        const READ    = 0x01;
        const WRITE   = 0x02;
        const INVISIBLE = 0x04;
        const BACKUP  = 0x20;
        const RENAME  = 0x40;
        const DESTROY = 0x80;
    }
}

/// A calendar timestamp with no timezone, matching the precision every
/// Apple II/Mac OS era filesystem actually stores.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Timestamp {
    pub year: u16,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
}

/// Which fork a stream or read/write call addresses.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ForkKind {
    Data,
    Resource,
}

/// One file or directory entry. A directory has no meaningful fork sizes but
/// carries its `children` by name; a plain file has `children: None` and its
/// fork sizes are meaningful instead. `parent` is `None` only for the volume
/// root. An entry returned from an operation (e.g. `create_file`) must be
/// treated as owned by the caller; one returned from `entries()` belongs to
/// the filesystem and is invalidated by the next scan or mode transition.
#[derive(Clone, Debug, Default)]
pub struct FileEntry {
    pub raw_name: Vec<u8>,
    pub display_name: String,
    pub is_directory: bool,
    /// Path of the containing directory, components joined with [`PATH_SEPARATOR`].
    /// `None` for entries that live directly under the volume root.
    pub parent: Option<String>,
    /// Names of the directory's immediate children. `None` for a plain file;
    /// `Some` (possibly empty) for a directory, set once a scan has visited it.
    pub children: Option<Vec<String>>,
    pub prodos_type: u8,
    pub prodos_aux: u16,
    pub hfs_type: u32,
    pub hfs_creator: u32,
    pub access: AccessFlags,
    pub created: Option<Timestamp>,
    pub modified: Option<Timestamp>,
    pub data_length: u64,
    pub resource_length: u64,
    /// Set during a scan when the entry could be read but the volume
    /// structure around it was irregular; read allowed, write/delete denied.
    pub dubious: bool,
    /// Set during a scan when the entry's data cannot be reached at all;
    /// open is denied outright.
    pub damaged: bool,
}

impl FileEntry {
    pub fn storage_size(&self) -> u64 {
        self.data_length + self.resource_length
    }
}
