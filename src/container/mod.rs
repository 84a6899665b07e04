/*
    prodigy
    https://github.com/prodigy-rs/prodigy

    --------------------------------------------------------------------------

    src/container/mod.rs

    L3 of the layered stack: the tag set
    of container kinds this crate recognizes, and the `DiskImage` type that
    owns a host byte source, runs it through [`crate::detect`], and exposes
    whatever chunk source and contents analysis concluded.
*/
use std::io::Read;

use crate::chunk::ChunkSource;
use crate::detect;
use crate::errors::AnalyzerError;
use crate::io::ByteSource;
use crate::notes::Notes;

mod apm;

/// The closed set of disk-image container kinds this crate recognizes,
/// modeled as a tagged enum rather than a class hierarchy.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum DiskImageContainer {
    UnadornedSector,
    UnadornedNibble525,
    Woz,
    TwoImg,
    DiskCopy,
    Trackstar,
    Zip,
    NuFx,
    Binary2,
    Acu,
    GZip,
    AppleSingle,
    Ddd,
}

/// One partition in a multi-part container.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Partition {
    pub start_block: usize,
    pub length_blocks: usize,
    /// Best-effort filesystem tag, when the partition map or probe identifies one.
    pub filesystem_hint: Option<&'static str>,
}

/// What a [`DiskImage`] was found to contain after analysis.
#[derive(Debug, Default)]
pub enum Contents {
    /// A single filesystem occupies the whole chunk source.
    Filesystem,
    /// A partition map was found; each entry addresses a sub-range of blocks.
    MultiPart(Vec<Partition>),
    /// Nothing beyond the chunk source itself was identified.
    #[default]
    None,
}

/// Owns a raw byte source and, once analyzed, the chunk source and contents
/// classification that followed from it. Re-analysis
/// disposes the prior chunk source and contents before installing new ones.
pub struct DiskImage {
    kind: Option<DiskImageContainer>,
    chunk_source: Option<Box<dyn ChunkSource>>,
    contents: Contents,
    notes: Notes,
}

impl DiskImage {
    /// Reads the entirety of `source` into memory and runs container
    /// detection against it with `extension_hint` (e.g. `".dsk"`, already
    /// lower-cased and dot-prefixed, or `""`). The host's own handle is left
    /// exactly where the caller's seek position was; this crate never
    /// closes it.
    pub fn analyze<B: ByteSource>(source: &mut B, extension_hint: &str) -> Result<Self, AnalyzerError> {
        let restore_pos = source.stream_position()?;
        source.seek(std::io::SeekFrom::Start(0))?;
        let mut bytes = Vec::new();
        source.read_to_end(&mut bytes)?;
        source.seek(std::io::SeekFrom::Start(restore_pos))?;

        let detection = detect::detect_container(bytes, extension_hint)?;
        let contents = if detection.chunk_source.is_some() {
            Contents::Filesystem
        } else {
            Contents::None
        };
        Ok(Self {
            kind: Some(detection.kind),
            chunk_source: detection.chunk_source,
            contents,
            notes: detection.notes,
        })
    }

    pub fn kind(&self) -> Option<DiskImageContainer> {
        self.kind
    }

    pub fn chunk_source(&self) -> Option<&dyn ChunkSource> {
        self.chunk_source.as_deref()
    }

    pub fn chunk_source_mut(&mut self) -> Option<&mut (dyn ChunkSource + 'static)> {
        self.chunk_source.as_deref_mut()
    }

    pub fn contents(&self) -> &Contents {
        &self.contents
    }

    /// Installs a multi-part partition listing found by a higher layer
    /// (e.g. an APM scan performed by a filesystem host), replacing
    /// whatever contents classification analysis produced.
    pub fn set_contents(&mut self, contents: Contents) {
        self.contents = contents;
    }

    /// Scans the image's chunk source for an Apple Partition Map and, if one
    /// is found, installs the resulting listing as [`Contents::MultiPart`].
    /// A block-addressable chunk source with no partition map at block 1 is
    /// left as [`Contents::Filesystem`]; this is not an error.
    pub fn scan_partitions(&mut self) -> Result<(), AnalyzerError> {
        let chunks = self.chunk_source.as_deref_mut().ok_or(AnalyzerError::FormatUnknown)?;
        match apm::scan(chunks) {
            Ok(partitions) => {
                self.contents = Contents::MultiPart(partitions);
                Ok(())
            }
            Err(AnalyzerError::FormatUnknown) => Ok(()),
            Err(e) => Err(e),
        }
    }

    pub fn notes(&self) -> &Notes {
        &self.notes
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::SECTOR_SIZE;

    #[test]
    fn analyze_recognizes_unadorned_sector_image_and_preserves_seek_position() {
        let mut source = Cursor::new(vec![0u8; 35 * 16 * SECTOR_SIZE]);
        source.set_position(100);
        let image = DiskImage::analyze(&mut source, ".dsk").unwrap();
        assert_eq!(image.kind(), Some(DiskImageContainer::UnadornedSector));
        assert!(image.chunk_source().is_some());
        assert_eq!(source.position(), 100);
    }

    #[test]
    fn unrecognized_image_reports_format_unknown() {
        let mut source = Cursor::new(vec![1, 2, 3]);
        assert!(matches!(DiskImage::analyze(&mut source, ""), Err(AnalyzerError::FormatUnknown)));
    }
}
