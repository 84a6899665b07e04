/*
    prodigy
    https://github.com/prodigy-rs/prodigy

    --------------------------------------------------------------------------

    src/io.rs

    The host byte source abstraction (L0 of the layered stack). Every disk
    image, filesystem, and archive instance is constructed from one of these;
    none of them is ever closed by the library, and none of them outlives
    the caller's own handle.
*/

/// Re-export of the standard IO primitives so the rest of the crate has one
/// place to swap them out rather than scattering `std::io` imports everywhere.
pub use std::io::{Error, ErrorKind, Read, Result, Seek, SeekFrom, Write};

/// A seekable, length-known, optionally writable byte source.
///
/// Hosts supply an implementor at construction time for every
/// [`crate::container::DiskImage`], [`crate::filesystem::FilesystemHost`], and
/// [`crate::archive::ArchiveHost`]; the library never takes ownership of it
/// for the purpose of closing it.
pub trait ByteSource: Read + Write + Seek {
    /// Total length of the underlying medium in bytes.
    fn length(&mut self) -> Result<u64> {
        let cur = self.stream_position()?;
        let end = self.seek(SeekFrom::End(0))?;
        self.seek(SeekFrom::Start(cur))?;
        Ok(end)
    }

    /// Whether the source supports reads. Always `true` in this crate's model;
    /// provided for hosts that wrap write-only or read-only handles.
    fn can_read(&self) -> bool {
        true
    }

    /// Whether the source supports writes. A host wrapping a read-only file
    /// descriptor should override this to `false`; [`crate::chunk::gate`] and
    /// the filesystem lifecycle consult it when deciding whether raw writes
    /// are even plausible, independent of the gate's own access level.
    fn can_write(&self) -> bool {
        true
    }

    /// Whether the source supports seeking. Every source in this crate must
    /// support it; declared here only to document the contract.
    fn can_seek(&self) -> bool {
        true
    }
}

impl<T: Read + Write + Seek> ByteSource for T {}

/// Convenience alias for code that only needs to read and seek (analyzer
/// probes, archive read streams).
pub trait ReadSeek: Read + Seek {}
impl<T: Read + Seek> ReadSeek for T {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn length_restores_position() {
        let mut cursor = Cursor::new(vec![0u8; 100]);
        cursor.seek(SeekFrom::Start(40)).unwrap();
        let len = cursor.length().unwrap();
        assert_eq!(len, 100);
        assert_eq!(cursor.stream_position().unwrap(), 40);
    }
}
