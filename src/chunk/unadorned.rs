/*
    prodigy
    https://github.com/prodigy-rs/prodigy

    --------------------------------------------------------------------------

    src/chunk/unadorned.rs

    The flat, byte-addressed chunk source: `.dsk`/`.do`
    (DOS order), `.po`/`.hdv`/`.2mg` payload (ProDOS order), and Apple
    CP/M sector images all land here, differing only in `file_order` and
    whether a 5.25" track/sector geometry applies at all.
*/
use std::io::SeekFrom;

use super::{ChunkSource, Geometry};
use crate::errors::ChunkError;
use crate::io::ByteSource;
use crate::skew::{translate_sector, FileOrder};
use crate::{BLOCK_SIZE, KBLOCK_SIZE, SECTOR_SIZE};

/// A raw sector/block image backed by any seekable byte source.
pub struct UnadornedSectorSource<B> {
    source: B,
    formatted_length: usize,
    geometry: Option<Geometry>,
    file_order: FileOrder,
    read_only: bool,
    read_count: u64,
    write_count: u64,
    dirty: bool,
}

impl<B: ByteSource> UnadornedSectorSource<B> {
    pub fn new(source: B, formatted_length: usize, geometry: Option<Geometry>, file_order: FileOrder, read_only: bool) -> Self {
        Self {
            source,
            formatted_length,
            geometry,
            file_order,
            read_only,
            read_count: 0,
            write_count: 0,
            dirty: false,
        }
    }

    pub fn into_inner(self) -> B {
        self.source
    }

    fn skewed_sector(&self, sector: usize) -> usize {
        match self.geometry {
            Some(g) if g.sectors_per_track == 16 => translate_sector(sector, FileOrder::Dos, self.file_order),
            // 13- and 32-sector disks are always DOS order; no translation applies.
            _ => sector,
        }
    }

    fn sector_offset(&self, track: usize, sector: usize) -> Result<u64, ChunkError> {
        let geometry = self.geometry.ok_or(ChunkError::NoSectors)?;
        if track >= geometry.tracks || sector >= geometry.sectors_per_track {
            return Err(ChunkError::OutOfRange);
        }
        let file_sector = self.skewed_sector(sector);
        Ok(((track * geometry.sectors_per_track + file_sector) * SECTOR_SIZE) as u64)
    }

    fn read_sector_raw(&mut self, track: usize, sector: usize, out: &mut [u8]) -> Result<(), ChunkError> {
        let offset = self.sector_offset(track, sector)?;
        self.source.seek(SeekFrom::Start(offset))?;
        let got = self.source.read(out)?;
        self.read_count += 1;
        if got != out.len() {
            return Err(ChunkError::ShortRead {
                expected: out.len(),
                got,
            });
        }
        Ok(())
    }

    fn write_sector_raw(&mut self, track: usize, sector: usize, data: &[u8]) -> Result<(), ChunkError> {
        if self.read_only {
            return Err(ChunkError::ReadOnly);
        }
        let offset = self.sector_offset(track, sector)?;
        self.source.seek(SeekFrom::Start(offset))?;
        self.source.write_all(data)?;
        self.write_count += 1;
        self.dirty = true;
        Ok(())
    }

    fn block_offset(&self, block: usize) -> Result<u64, ChunkError> {
        if !self.has_blocks() {
            return Err(ChunkError::NoBlocks);
        }
        let offset = block.checked_mul(BLOCK_SIZE).ok_or(ChunkError::OutOfRange)? as u64;
        if offset + BLOCK_SIZE as u64 > self.formatted_length as u64 {
            return Err(ChunkError::OutOfRange);
        }
        Ok(offset)
    }
}

impl<B: ByteSource> ChunkSource for UnadornedSectorSource<B> {
    fn formatted_length(&self) -> usize {
        self.formatted_length
    }

    fn geometry(&self) -> Option<Geometry> {
        self.geometry
    }

    fn file_order(&self) -> FileOrder {
        self.file_order
    }

    fn set_file_order(&mut self, order: FileOrder) {
        self.file_order = order;
    }

    fn read_only(&self) -> bool {
        self.read_only
    }

    fn read_count(&self) -> u64 {
        self.read_count
    }

    fn write_count(&self) -> u64 {
        self.write_count
    }

    fn dirty(&self) -> bool {
        self.dirty
    }

    fn set_dirty(&mut self, dirty: bool) {
        self.dirty = dirty;
    }

    fn read_sector(&mut self, track: usize, sector: usize, out: &mut [u8]) -> Result<(), ChunkError> {
        self.read_sector_raw(track, sector, out)
    }

    fn write_sector(&mut self, track: usize, sector: usize, data: &[u8]) -> Result<(), ChunkError> {
        self.write_sector_raw(track, sector, data)
    }

    fn test_sector(&mut self, track: usize, sector: usize) -> Result<bool, ChunkError> {
        self.sector_offset(track, sector)?;
        Ok(!self.read_only)
    }

    fn read_block(&mut self, block: usize, out: &mut [u8]) -> Result<(), ChunkError> {
        if out.len() != BLOCK_SIZE {
            return Err(ChunkError::ShortRead {
                expected: BLOCK_SIZE,
                got: out.len(),
            });
        }
        match self.geometry {
            Some(g) if g.sectors_per_track == 16 => {
                let track = block / 8;
                let pair = (block % 8) * 2;
                self.read_sector_raw(track, pair, &mut out[..SECTOR_SIZE])?;
                self.read_sector_raw(track, pair + 1, &mut out[SECTOR_SIZE..])?;
                Ok(())
            }
            _ => {
                let offset = self.block_offset(block)?;
                self.source.seek(SeekFrom::Start(offset))?;
                let got = self.source.read(out)?;
                self.read_count += 1;
                if got != out.len() {
                    return Err(ChunkError::ShortRead {
                        expected: out.len(),
                        got,
                    });
                }
                Ok(())
            }
        }
    }

    fn write_block(&mut self, block: usize, data: &[u8]) -> Result<(), ChunkError> {
        if data.len() != BLOCK_SIZE {
            return Err(ChunkError::ShortRead {
                expected: BLOCK_SIZE,
                got: data.len(),
            });
        }
        if self.read_only {
            return Err(ChunkError::ReadOnly);
        }
        match self.geometry {
            Some(g) if g.sectors_per_track == 16 => {
                let track = block / 8;
                let pair = (block % 8) * 2;
                self.write_sector_raw(track, pair, &data[..SECTOR_SIZE])?;
                self.write_sector_raw(track, pair + 1, &data[SECTOR_SIZE..])?;
                Ok(())
            }
            _ => {
                let offset = self.block_offset(block)?;
                self.source.seek(SeekFrom::Start(offset))?;
                self.source.write_all(data)?;
                self.write_count += 1;
                self.dirty = true;
                Ok(())
            }
        }
    }

    fn test_block(&mut self, block: usize) -> Result<bool, ChunkError> {
        match self.geometry {
            Some(g) if g.sectors_per_track == 16 => {
                let track = block / 8;
                let pair = (block % 8) * 2;
                self.sector_offset(track, pair)?;
                self.sector_offset(track, pair + 1)?;
            }
            _ => {
                self.block_offset(block)?;
            }
        }
        Ok(!self.read_only)
    }

    fn read_block_cpm(&mut self, block: usize, out: &mut [u8]) -> Result<(), ChunkError> {
        if out.len() != KBLOCK_SIZE {
            return Err(ChunkError::ShortRead {
                expected: KBLOCK_SIZE,
                got: out.len(),
            });
        }
        match self.geometry {
            // 5.25" CP/M: a 1 KB block is 4 sectors addressed in CP/M order.
            Some(g) if g.sectors_per_track == 16 && g.tracks <= 50 => {
                let track = block / 4;
                let group = (block % 4) * 4;
                for i in 0..4 {
                    let cpm_sector = group + i;
                    let file_sector = translate_sector(cpm_sector, FileOrder::Cpm, self.file_order);
                    self.read_sector_raw(track, file_sector, &mut out[i * SECTOR_SIZE..(i + 1) * SECTOR_SIZE])?;
                }
                Ok(())
            }
            _ => {
                let mut half = [0u8; BLOCK_SIZE];
                self.read_block(block * 2, &mut half)?;
                out[..BLOCK_SIZE].copy_from_slice(&half);
                self.read_block(block * 2 + 1, &mut half)?;
                out[BLOCK_SIZE..].copy_from_slice(&half);
                Ok(())
            }
        }
    }

    fn write_block_cpm(&mut self, block: usize, data: &[u8]) -> Result<(), ChunkError> {
        if data.len() != KBLOCK_SIZE {
            return Err(ChunkError::ShortRead {
                expected: KBLOCK_SIZE,
                got: data.len(),
            });
        }
        match self.geometry {
            Some(g) if g.sectors_per_track == 16 && g.tracks <= 50 => {
                let track = block / 4;
                let group = (block % 4) * 4;
                for i in 0..4 {
                    let cpm_sector = group + i;
                    let file_sector = translate_sector(cpm_sector, FileOrder::Cpm, self.file_order);
                    self.write_sector_raw(track, file_sector, &data[i * SECTOR_SIZE..(i + 1) * SECTOR_SIZE])?;
                }
                Ok(())
            }
            _ => {
                self.write_block(block * 2, &data[..BLOCK_SIZE])?;
                self.write_block(block * 2 + 1, &data[BLOCK_SIZE..])?;
                Ok(())
            }
        }
    }

    fn initialize(&mut self) -> Result<(), ChunkError> {
        if self.read_only {
            return Err(ChunkError::ReadOnly);
        }
        self.source.seek(SeekFrom::Start(0))?;
        let zeros = vec![0u8; self.formatted_length];
        self.source.write_all(&zeros)?;
        self.write_count += 1;
        self.dirty = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    fn new_dos_140k() -> UnadornedSectorSource<Cursor<Vec<u8>>> {
        let buf = vec![0u8; 35 * 16 * SECTOR_SIZE];
        UnadornedSectorSource::new(
            Cursor::new(buf),
            35 * 16 * SECTOR_SIZE,
            Some(Geometry {
                tracks: 35,
                sectors_per_track: 16,
            }),
            FileOrder::Dos,
            false,
        )
    }

    #[test]
    fn sector_write_read_round_trips_regardless_of_file_order() {
        for order in [FileOrder::Dos, FileOrder::ProDos, FileOrder::Physical] {
            let mut src = new_dos_140k();
            src.set_file_order(order);
            let pattern: Vec<u8> = (0..SECTOR_SIZE as u8).collect();
            src.write_sector(17, 3, &pattern).unwrap();
            let mut out = vec![0u8; SECTOR_SIZE];
            src.read_sector(17, 3, &mut out).unwrap();
            assert_eq!(out, pattern);
        }
    }

    #[test]
    fn block_is_two_skewed_sectors() {
        let mut src = new_dos_140k();
        let lo: Vec<u8> = vec![0xAA; SECTOR_SIZE];
        let hi: Vec<u8> = vec![0xBB; SECTOR_SIZE];
        // Block 8 on track 1 maps to DOS-logical sectors 0 and 1.
        src.write_sector(1, 0, &lo).unwrap();
        src.write_sector(1, 1, &hi).unwrap();
        let mut block_buf = vec![0u8; BLOCK_SIZE];
        src.read_block(8, &mut block_buf).unwrap();
        assert_eq!(&block_buf[..SECTOR_SIZE], lo.as_slice());
        assert_eq!(&block_buf[SECTOR_SIZE..], hi.as_slice());
    }

    #[test]
    fn out_of_range_sector_is_rejected() {
        let mut src = new_dos_140k();
        let mut out = vec![0u8; SECTOR_SIZE];
        assert!(matches!(src.read_sector(35, 0, &mut out), Err(ChunkError::OutOfRange)));
        assert!(matches!(src.read_sector(0, 16, &mut out), Err(ChunkError::OutOfRange)));
    }

    #[test]
    fn writes_to_read_only_source_are_rejected() {
        let buf = vec![0u8; 35 * 16 * SECTOR_SIZE];
        let mut src = UnadornedSectorSource::new(
            Cursor::new(buf),
            35 * 16 * SECTOR_SIZE,
            Some(Geometry {
                tracks: 35,
                sectors_per_track: 16,
            }),
            FileOrder::Dos,
            true,
        );
        let data = vec![0u8; SECTOR_SIZE];
        assert!(matches!(src.write_sector(0, 0, &data), Err(ChunkError::ReadOnly)));
    }

    #[test]
    fn thirteen_sector_disk_has_no_blocks() {
        let buf = vec![0u8; 35 * 13 * SECTOR_SIZE];
        let src = UnadornedSectorSource::new(
            Cursor::new(buf),
            35 * 13 * SECTOR_SIZE,
            Some(Geometry {
                tracks: 35,
                sectors_per_track: 13,
            }),
            FileOrder::Dos,
            false,
        );
        assert!(!src.has_blocks());
    }

    #[test]
    fn dirty_flag_transitions_on_write() {
        let mut src = new_dos_140k();
        assert!(!src.dirty());
        let data = vec![0u8; SECTOR_SIZE];
        src.write_sector(0, 0, &data).unwrap();
        assert!(src.dirty());
    }
}
