/*
    prodigy
    https://github.com/prodigy-rs/prodigy

    --------------------------------------------------------------------------

    src/container/apm.rs

    Apple Partition Map scanning: the multi-part half of the disk-image
    container layer. A hard-drive-class medium starts with a partition map
    occupying one block per entry, beginning at block 1; each entry names its
    own length, so the map is self-describing and is read one block at a
    time rather than all at once.
*/
use std::io::Cursor;

use binrw::BinRead;

use crate::chunk::ChunkSource;
use crate::container::Partition;
use crate::errors::AnalyzerError;
use crate::BLOCK_SIZE;

/// One 512-byte Apple Partition Map entry (`pmSig == "PM"`). Only the fields
/// needed to enumerate partitions are parsed; boot code and the driver
/// descriptor table that follow are of no interest at this layer.
#[derive(BinRead, Clone)]
#[br(big, magic = b"PM")]
struct ApmEntry {
    _sig_pad: u16,
    map_entry_count: u32,
    start_block: u32,
    block_count: u32,
    _name: [u8; 32],
    kind: [u8; 32],
}

fn cstr(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

fn filesystem_hint_for(kind: &str) -> Option<&'static str> {
    match kind {
        "Apple_PRODOS" => Some("ProDOS"),
        "Apple_HFS" => Some("HFS"),
        "Apple_UNIX_SVR2" | "Apple_UFS" => Some("UNIX"),
        _ => None,
    }
}

fn read_entry(chunks: &mut dyn ChunkSource, block: usize) -> Result<ApmEntry, AnalyzerError> {
    let mut buf = [0u8; BLOCK_SIZE];
    chunks
        .read_block(block, &mut buf)
        .map_err(|_| AnalyzerError::FormatUnknown)?;
    ApmEntry::read(&mut Cursor::new(&buf[..])).map_err(|_| AnalyzerError::FormatUnknown)
}

/// Scans a block-addressable chunk source for an Apple Partition Map
/// starting at block 1, returning every entry the map lists (the map's own
/// entry for itself included, at index 0) in on-disk order.
pub fn scan(chunks: &mut dyn ChunkSource) -> Result<Vec<Partition>, AnalyzerError> {
    if !chunks.has_blocks() {
        return Err(AnalyzerError::FormatUnknown);
    }
    let first = read_entry(chunks, 1)?;
    let map_entry_count = first.map_entry_count as usize;
    if map_entry_count == 0 {
        return Err(AnalyzerError::FormatUnknown);
    }

    let mut partitions = Vec::with_capacity(map_entry_count);
    for block in 1..=map_entry_count {
        let entry = if block == 1 { first.clone() } else { read_entry(chunks, block)? };
        let kind = cstr(&entry.kind);
        partitions.push(Partition {
            start_block: entry.start_block as usize,
            length_blocks: entry.block_count as usize,
            filesystem_hint: filesystem_hint_for(&kind),
        });
    }
    Ok(partitions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::{Geometry, UnadornedSectorSource};
    use crate::skew::FileOrder;
    use std::io::Cursor as IoCursor;

    fn write_entry(buf: &mut [u8], count: u32, start: u32, len: u32, name: &str, kind: &str) {
        buf[0..2].copy_from_slice(b"PM");
        buf[2..4].copy_from_slice(&0u16.to_be_bytes());
        buf[4..8].copy_from_slice(&count.to_be_bytes());
        buf[8..12].copy_from_slice(&start.to_be_bytes());
        buf[12..16].copy_from_slice(&len.to_be_bytes());
        let name_bytes = name.as_bytes();
        buf[16..16 + name_bytes.len()].copy_from_slice(name_bytes);
        let kind_bytes = kind.as_bytes();
        buf[48..48 + kind_bytes.len()].copy_from_slice(kind_bytes);
    }

    fn build_apm_image(total_blocks: usize) -> UnadornedSectorSource<IoCursor<Vec<u8>>> {
        let mut bytes = vec![0u8; total_blocks * BLOCK_SIZE];

        // Block 0: driver descriptor record, irrelevant to partition scanning.
        bytes[0..2].copy_from_slice(b"ER");

        write_entry(&mut bytes[BLOCK_SIZE..2 * BLOCK_SIZE], 3, 1, 63, "Apple", "Apple_partition_map");
        write_entry(
            &mut bytes[2 * BLOCK_SIZE..3 * BLOCK_SIZE],
            3,
            64,
            (total_blocks - 64 - 1) as u32,
            "ProDOS",
            "Apple_PRODOS",
        );
        write_entry(
            &mut bytes[3 * BLOCK_SIZE..4 * BLOCK_SIZE],
            3,
            (total_blocks - 1) as u32,
            1,
            "Extra",
            "Apple_Free",
        );

        let source = IoCursor::new(bytes);
        UnadornedSectorSource::new(source, total_blocks * BLOCK_SIZE, None, FileOrder::ProDos, false)
    }

    #[test]
    fn scans_three_partitions_with_prodos_selectable() {
        let total_blocks = 32 * 1024 * 1024 / BLOCK_SIZE;
        let mut chunk = build_apm_image(total_blocks);
        let partitions = scan(&mut chunk).unwrap();
        assert_eq!(partitions.len(), 3);
        assert_eq!(partitions[0].start_block, 1);
        assert_eq!(partitions[0].length_blocks, 63);
        assert_eq!(partitions[1].start_block, 64);
        assert_eq!(partitions[1].filesystem_hint, Some("ProDOS"));
        assert_eq!(partitions[2].start_block, total_blocks - 1);
        assert_eq!(partitions[2].length_blocks, 1);
    }

    #[test]
    fn non_block_source_is_rejected() {
        let bytes = vec![0u8; 35 * 16 * crate::SECTOR_SIZE];
        let mut chunk = UnadornedSectorSource::new(
            IoCursor::new(bytes),
            35 * 16 * crate::SECTOR_SIZE,
            Some(Geometry { tracks: 35, sectors_per_track: 13 }),
            FileOrder::Dos,
            false,
        );
        assert!(matches!(scan(&mut chunk), Err(AnalyzerError::FormatUnknown)));
    }
}
