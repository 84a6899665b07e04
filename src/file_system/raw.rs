/*
    prodigy
    https://github.com/prodigy-rs/prodigy

    --------------------------------------------------------------------------

    src/file_system/raw.rs

    RawVolume: a minimal, fully-working [`FilesystemParser`] used to exercise the Raw/Cooked lifecycle end to end
    without depending on any particular historical filesystem. One flat
    directory, data forks only, a bump allocator with no reclaim. Not meant
    to read any real-world disk image.
*/
use std::collections::HashMap;

use super::{AllocationTable, FileEntry, ForkKind};
use crate::chunk::{ChunkSource, BLOCK_BYTES};
use crate::errors::FilesystemError;
use crate::file_system::{FilesystemParser, TestResult};
use crate::notes::Notes;
use crate::volume_usage::{Owner, VolumeUsage};

const MAGIC: &[u8; 4] = b"RAWV";
const HEADER_BLOCK: usize = 0;
const DIRECTORY_BLOCK: usize = 1;
const FIRST_DATA_BLOCK: u32 = 2;
const RECORD_SIZE: usize = 48;
const NAME_FIELD: usize = 32;
const MAX_ENTRIES: usize = BLOCK_BYTES / RECORD_SIZE;

/// A single flat-directory filesystem with data forks only, backed by a
/// bump allocator. See module docs.
#[derive(Default)]
pub struct RawVolume {
    entries: Vec<FileEntry>,
    allocation: AllocationTable,
    next_free_block: u32,
    total_blocks: usize,
}

impl RawVolume {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            allocation: HashMap::new(),
            next_free_block: FIRST_DATA_BLOCK,
            total_blocks: 0,
        }
    }

    /// Writes a fresh, empty volume header and directory. Call once on an
    /// unformatted chunk source before handing it to a [`super::FilesystemHost`].
    pub fn format(chunks: &mut dyn ChunkSource) -> Result<(), FilesystemError> {
        let mut header = vec![0u8; BLOCK_BYTES];
        header[0..4].copy_from_slice(MAGIC);
        header[4..6].copy_from_slice(&0u16.to_le_bytes());
        chunks.write_block(HEADER_BLOCK, &header)?;
        chunks.write_block(DIRECTORY_BLOCK, &vec![0u8; BLOCK_BYTES])?;
        Ok(())
    }

    fn name_to_field(name: &str) -> [u8; NAME_FIELD] {
        let mut field = [0u8; NAME_FIELD];
        let bytes = name.as_bytes();
        let n = bytes.len().min(NAME_FIELD);
        field[..n].copy_from_slice(&bytes[..n]);
        field
    }

    fn field_to_name(field: &[u8]) -> String {
        let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
        String::from_utf8_lossy(&field[..end]).into_owned()
    }

    fn persist_directory(&self, chunks: &mut dyn ChunkSource) -> Result<(), FilesystemError> {
        let mut buf = vec![0u8; BLOCK_BYTES];
        for (i, entry) in self.entries.iter().enumerate() {
            let (start, count) = self.allocation.get(&entry.display_name).copied().unwrap_or((0, 0));
            let offset = i * RECORD_SIZE;
            buf[offset..offset + NAME_FIELD].copy_from_slice(&Self::name_to_field(&entry.display_name));
            buf[offset + 32] = entry.prodos_type;
            buf[offset + 33..offset + 35].copy_from_slice(&entry.prodos_aux.to_le_bytes());
            buf[offset + 35..offset + 39].copy_from_slice(&(entry.data_length as u32).to_le_bytes());
            buf[offset + 39..offset + 43].copy_from_slice(&start.to_le_bytes());
            buf[offset + 43..offset + 47].copy_from_slice(&count.to_le_bytes());
        }
        chunks.write_block(DIRECTORY_BLOCK, &buf)?;

        let mut header = vec![0u8; BLOCK_BYTES];
        header[0..4].copy_from_slice(MAGIC);
        header[4..6].copy_from_slice(&(self.entries.len() as u16).to_le_bytes());
        chunks.write_block(HEADER_BLOCK, &header)?;
        Ok(())
    }

    fn find(&self, name: &str) -> Result<usize, FilesystemError> {
        self.entries
            .iter()
            .position(|e| e.display_name == name)
            .ok_or_else(|| FilesystemError::NotFound(name.to_string()))
    }
}

impl FilesystemParser for RawVolume {
    fn test_image(&self, chunks: &mut dyn ChunkSource) -> TestResult {
        let mut header = vec![0u8; BLOCK_BYTES];
        if chunks.read_block(HEADER_BLOCK, &mut header).is_err() {
            return TestResult::No;
        }
        if &header[0..4] == MAGIC {
            TestResult::Yes
        } else {
            TestResult::No
        }
    }

    fn scan(&mut self, chunks: &mut dyn ChunkSource, quick: bool, notes: &mut Notes) -> Result<(), FilesystemError> {
        let mut header = vec![0u8; BLOCK_BYTES];
        chunks.read_block(HEADER_BLOCK, &mut header)?;
        if &header[0..4] != MAGIC {
            return Err(FilesystemError::InvalidOperation("raw volume header magic missing"));
        }
        let entry_count = u16::from_le_bytes([header[4], header[5]]) as usize;

        let mut directory = vec![0u8; BLOCK_BYTES];
        chunks.read_block(DIRECTORY_BLOCK, &mut directory)?;

        self.entries.clear();
        self.allocation.clear();
        let mut high_water = FIRST_DATA_BLOCK;

        for i in 0..entry_count.min(MAX_ENTRIES) {
            let offset = i * RECORD_SIZE;
            let record = &directory[offset..offset + RECORD_SIZE];
            let name = Self::field_to_name(&record[0..NAME_FIELD]);
            if name.is_empty() {
                continue;
            }
            let prodos_type = record[32];
            let prodos_aux = u16::from_le_bytes([record[33], record[34]]);
            let data_length = u32::from_le_bytes([record[35], record[36], record[37], record[38]]) as u64;
            let start_block = u32::from_le_bytes([record[39], record[40], record[41], record[42]]);
            let block_count = u32::from_le_bytes([record[43], record[44], record[45], record[46]]);

            let mut entry = FileEntry {
                raw_name: name.as_bytes().to_vec(),
                display_name: name.clone(),
                prodos_type,
                prodos_aux,
                data_length,
                ..Default::default()
            };

            if !quick {
                let end = start_block as u64 + block_count as u64;
                if (end * BLOCK_BYTES as u64) as usize > chunks.formatted_length() {
                    notes.warn(format!("entry '{name}' claims blocks beyond the end of the medium"));
                    entry.dubious = true;
                }
            }

            high_water = high_water.max(start_block + block_count);
            self.allocation.insert(name.clone(), (start_block, block_count));
            self.entries.push(entry);
        }
        self.next_free_block = high_water.max(FIRST_DATA_BLOCK);
        self.total_blocks = chunks.formatted_length() / BLOCK_BYTES;
        Ok(())
    }

    fn allocation_count(&self) -> usize {
        self.total_blocks
    }

    fn record_usage(&self, usage: &mut VolumeUsage) {
        let _ = usage.set_usage(HEADER_BLOCK, Owner::SystemSentinel, None);
        let _ = usage.set_usage(DIRECTORY_BLOCK, Owner::SystemSentinel, None);
        for entry in &self.entries {
            if let Some(&(start, count)) = self.allocation.get(&entry.display_name) {
                for block in start..start + count {
                    let _ = usage.set_usage(block as usize, Owner::FileRef(entry.display_name.clone()), None);
                }
            }
        }
    }

    fn entries(&self) -> &[FileEntry] {
        &self.entries
    }

    fn create_file(
        &mut self,
        chunks: &mut dyn ChunkSource,
        name: &str,
        prodos_type: u8,
        prodos_aux: u16,
    ) -> Result<FileEntry, FilesystemError> {
        if name.is_empty() || name.len() > NAME_FIELD {
            return Err(FilesystemError::InvalidName(name.to_string()));
        }
        if self.entries.iter().any(|e| e.display_name == name) {
            return Err(FilesystemError::Duplicate(name.to_string()));
        }
        if self.entries.len() >= MAX_ENTRIES {
            return Err(FilesystemError::DiskFull);
        }
        let entry = FileEntry {
            raw_name: name.as_bytes().to_vec(),
            display_name: name.to_string(),
            prodos_type,
            prodos_aux,
            ..Default::default()
        };
        self.entries.push(entry.clone());
        self.allocation.insert(name.to_string(), (0, 0));
        self.persist_directory(chunks)?;
        Ok(entry)
    }

    fn delete_file(&mut self, chunks: &mut dyn ChunkSource, name: &str) -> Result<(), FilesystemError> {
        let idx = self.find(name)?;
        self.entries.remove(idx);
        self.allocation.remove(name);
        self.persist_directory(chunks)
    }

    fn read_fork(&mut self, chunks: &mut dyn ChunkSource, name: &str, fork: ForkKind) -> Result<Vec<u8>, FilesystemError> {
        if fork == ForkKind::Resource {
            return Err(FilesystemError::InvalidOperation("raw volumes have no resource fork"));
        }
        let idx = self.find(name)?;
        let (start, count) = self.allocation.get(name).copied().unwrap_or((0, 0));
        let mut buf = vec![0u8; count as usize * BLOCK_BYTES];
        for i in 0..count {
            let mut block = vec![0u8; BLOCK_BYTES];
            chunks.read_block((start + i) as usize, &mut block)?;
            let off = i as usize * BLOCK_BYTES;
            buf[off..off + BLOCK_BYTES].copy_from_slice(&block);
        }
        buf.truncate(self.entries[idx].data_length as usize);
        Ok(buf)
    }

    fn write_fork(
        &mut self,
        chunks: &mut dyn ChunkSource,
        name: &str,
        fork: ForkKind,
        data: &[u8],
    ) -> Result<(), FilesystemError> {
        if fork == ForkKind::Resource {
            return Err(FilesystemError::InvalidOperation("raw volumes have no resource fork"));
        }
        let idx = self.find(name)?;
        let block_count = data.len().div_ceil(BLOCK_BYTES) as u32;
        let start = self.next_free_block;
        self.next_free_block += block_count;

        for (i, chunk) in data.chunks(BLOCK_BYTES).enumerate() {
            let mut block = vec![0u8; BLOCK_BYTES];
            block[..chunk.len()].copy_from_slice(chunk);
            chunks.write_block(start as usize + i, &block)?;
        }

        self.allocation.insert(name.to_string(), (start, block_count));
        self.entries[idx].data_length = data.len() as u64;
        self.persist_directory(chunks)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::chunk::{Geometry, UnadornedSectorSource};
    use crate::skew::FileOrder;

    fn source() -> UnadornedSectorSource<Cursor<Vec<u8>>> {
        let buf = vec![0u8; 40 * BLOCK_BYTES];
        UnadornedSectorSource::new(Cursor::new(buf), 40 * BLOCK_BYTES, None, FileOrder::Physical, false)
    }

    #[test]
    fn unformatted_medium_fails_test_image() {
        let mut src = source();
        let volume = RawVolume::new();
        assert_eq!(volume.test_image(&mut src), TestResult::No);
    }

    #[test]
    fn format_scan_create_write_read_delete_round_trips() {
        let mut src = source();
        RawVolume::format(&mut src).unwrap();

        let mut volume = RawVolume::new();
        assert_eq!(volume.test_image(&mut src), TestResult::Yes);

        let mut notes = Notes::new();
        volume.scan(&mut src, false, &mut notes).unwrap();
        assert!(volume.entries().is_empty());

        volume.create_file(&mut src, "GREETING", 0x04, 0).unwrap();
        volume.write_fork(&mut src, "GREETING", ForkKind::Data, b"hello, raw volume").unwrap();

        let mut reloaded = RawVolume::new();
        let mut notes = Notes::new();
        reloaded.scan(&mut src, false, &mut notes).unwrap();
        assert_eq!(reloaded.entries().len(), 1);
        assert_eq!(reloaded.entries()[0].display_name, "GREETING");

        let data = reloaded.read_fork(&mut src, "GREETING", ForkKind::Data).unwrap();
        assert_eq!(data, b"hello, raw volume");

        reloaded.delete_file(&mut src, "GREETING").unwrap();
        assert!(reloaded.entries().is_empty());
    }

    #[test]
    fn duplicate_name_is_rejected() {
        let mut src = source();
        RawVolume::format(&mut src).unwrap();
        let mut volume = RawVolume::new();
        volume.create_file(&mut src, "A", 0, 0).unwrap();
        assert!(matches!(volume.create_file(&mut src, "A", 0, 0), Err(FilesystemError::Duplicate(_))));
    }
}
