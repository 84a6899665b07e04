/*
    prodigy
    https://github.com/prodigy-rs/prodigy

    --------------------------------------------------------------------------

    src/containers/zip_backend.rs

    ZIP as an [`super::ArchiveKind`] backend. A ZIP member carries exactly one
    fork; this backend stores a record's resource fork, when present, as a
    sibling member named `<name>.rsrc` (a convention of this crate, not an
    interchange format other tools understand) and its access bits in the
    member's Unix permission field, which the `zip` crate already exposes as
    plain metadata.
*/
use std::collections::BTreeMap;
use std::io::{Cursor, Read, Seek, Write};

use flate2::write::DeflateEncoder;
use flate2::Compression;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::errors::ArchiveError;
use crate::file_system::entry::AccessFlags;
use crate::io::ByteSource;

use super::{ArchiveEntryInfo, ArchiveOp, ArchiveTransaction, CompressionFormat, PartKind};

const RESOURCE_SUFFIX: &str = ".rsrc";

fn resource_member_name(name: &str) -> String {
    format!("{name}{RESOURCE_SUFFIX}")
}

#[derive(Default, Clone)]
struct Record {
    data: Option<Vec<u8>>,
    resource: Option<Vec<u8>>,
    access: AccessFlags,
    /// The compression the transaction asked for the most recent `AddPart`
    /// on each fork; `None` (members read back unchanged from `old`, or
    /// never given an explicit request) falls back to [`pick_format`].
    data_compression: Option<CompressionFormat>,
    resource_compression: Option<CompressionFormat>,
}

fn read_archive<R: Read + Seek>(stream: R) -> Result<BTreeMap<String, Record>, ArchiveError> {
    let mut archive = ZipArchive::new(stream).map_err(|_| ArchiveError::CorruptedData)?;
    let mut records: BTreeMap<String, Record> = BTreeMap::new();
    for i in 0..archive.len() {
        let mut file = archive.by_index(i).map_err(|_| ArchiveError::CorruptedData)?;
        if file.is_dir() {
            continue;
        }
        let raw_name = file.name().to_string();
        let access = AccessFlags::from_bits_truncate(file.unix_mode().unwrap_or(0) as u8);
        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes).map_err(|_| ArchiveError::CorruptedData)?;

        if let Some(base) = raw_name.strip_suffix(RESOURCE_SUFFIX) {
            let entry = records.entry(base.to_string()).or_default();
            entry.resource = Some(bytes);
            if entry.access.is_empty() {
                entry.access = access;
            }
        } else {
            let entry = records.entry(raw_name).or_default();
            entry.data = Some(bytes);
            entry.access = access;
        }
    }
    Ok(records)
}

pub(super) fn list<S: Read + Write + Seek>(stream: &mut S) -> Result<Vec<ArchiveEntryInfo>, ArchiveError> {
    let start = stream.stream_position()?;
    let records = read_archive(&mut *stream);
    stream.seek(std::io::SeekFrom::Start(start))?;
    let records = records?;

    Ok(records
        .into_iter()
        .map(|(name, record)| ArchiveEntryInfo {
            name,
            has_data: record.data.is_some(),
            data_len: record.data.as_ref().map(|d| d.len() as u64).unwrap_or(0),
            has_resource: record.resource.is_some(),
            resource_len: record.resource.as_ref().map(|d| d.len() as u64).unwrap_or(0),
            access: record.access,
            checksum: None,
        })
        .collect())
}

pub(super) fn read_part<S: Read + Write + Seek>(
    stream: &mut S,
    name: &str,
    kind: PartKind,
) -> Result<Vec<u8>, ArchiveError> {
    let start = stream.stream_position()?;
    let records = read_archive(&mut *stream);
    stream.seek(std::io::SeekFrom::Start(start))?;
    let records = records?;

    let record = records.get(name).ok_or_else(|| ArchiveError::NotFound(name.to_string()))?;
    match kind {
        PartKind::Data | PartKind::DiskImage => {
            record.data.clone().ok_or_else(|| ArchiveError::NotFound(name.to_string()))
        }
        PartKind::Resource => record.resource.clone().ok_or_else(|| ArchiveError::NotFound(name.to_string())),
    }
}

/// Compresses with deflate and reports whether it actually shrank the data;
/// if not, the caller falls back to storing it uncompressed.
fn try_deflate(data: &[u8]) -> Option<Vec<u8>> {
    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).ok()?;
    let compressed = encoder.finish().ok()?;
    if compressed.len() < data.len() {
        Some(compressed)
    } else {
        None
    }
}

fn write_member<W: Write + Seek>(
    writer: &mut ZipWriter<W>,
    name: &str,
    data: &[u8],
    access: AccessFlags,
    requested: CompressionFormat,
) -> Result<(), ArchiveError> {
    let method = match requested {
        CompressionFormat::Uncompressed => CompressionMethod::Stored,
        CompressionFormat::Deflate => CompressionMethod::Deflated,
        CompressionFormat::Bzip2 => CompressionMethod::Bzip2,
        other => return Err(ArchiveError::Unsupported(compression_name(other))),
    };

    let options = SimpleFileOptions::default().compression_method(method).unix_permissions(access.bits() as u32);
    writer.start_file(name, options).map_err(|_| ArchiveError::CorruptedData)?;
    writer.write_all(data)?;
    Ok(())
}

fn compression_name(format: CompressionFormat) -> &'static str {
    match format {
        CompressionFormat::Squeeze => "squeeze",
        CompressionFormat::NuLzw1 => "nufx-lzw/1",
        CompressionFormat::NuLzw2 => "nufx-lzw/2",
        CompressionFormat::Lzc12 => "lzc-12",
        CompressionFormat::Lzc16 => "lzc-16",
        CompressionFormat::Shrink => "shrink",
        CompressionFormat::Implode => "implode",
        CompressionFormat::Default => "implementation default",
        CompressionFormat::Uncompressed | CompressionFormat::Deflate | CompressionFormat::Bzip2 => unreachable!(),
    }
}

/// Rebuilds the full archive from `old` plus the queued ops, writing it to
/// `output`. Callers always pass a distinct scratch stream for `output`;
/// [`super::ArchiveHost::commit`] only adopts it as the new backing stream
/// after this returns successfully.
pub(super) fn commit<S: Read + Write + Seek>(
    old: &mut S,
    output: &mut S,
    txn: &ArchiveTransaction,
) -> Result<(), ArchiveError> {
    let start = old.stream_position()?;
    let len = old.length()?;
    let mut records = if len == 0 { BTreeMap::new() } else { read_archive(&mut *old)? };
    old.seek(std::io::SeekFrom::Start(start))?;

    for op in txn.ops() {
        match op {
            ArchiveOp::CreateRecord { name } => {
                if records.contains_key(name) {
                    return Err(ArchiveError::Duplicate(name.clone()));
                }
                records.insert(name.clone(), Record::default());
            }
            ArchiveOp::DeleteRecord { name } => {
                records.remove(name).ok_or_else(|| ArchiveError::NotFound(name.clone()))?;
            }
            ArchiveOp::AddPart { name, kind, source, compression } => {
                let record = records.get_mut(name).ok_or_else(|| ArchiveError::NotFound(name.clone()))?;
                let bytes = source.read_all()?;
                match kind {
                    PartKind::Data | PartKind::DiskImage => {
                        record.data = Some(bytes);
                        record.data_compression = Some(*compression);
                    }
                    PartKind::Resource => {
                        record.resource = Some(bytes);
                        record.resource_compression = Some(*compression);
                    }
                }
            }
            ArchiveOp::DeletePart { name, kind } => {
                let record = records.get_mut(name).ok_or_else(|| ArchiveError::NotFound(name.clone()))?;
                match kind {
                    PartKind::Data | PartKind::DiskImage => record.data = None,
                    PartKind::Resource => record.resource = None,
                }
            }
            ArchiveOp::SetAccess { name, access } => {
                let record = records.get_mut(name).ok_or_else(|| ArchiveError::NotFound(name.clone()))?;
                record.access = *access;
            }
        }
    }

    let mut writer = ZipWriter::new(&mut *output);
    for (name, record) in &records {
        if let Some(data) = &record.data {
            let requested = resolve_format(record.data_compression, data);
            write_member(&mut writer, name, data, record.access, requested)?;
        }
        if let Some(data) = &record.resource {
            let requested = resolve_format(record.resource_compression, data);
            write_member(&mut writer, &resource_member_name(name), data, record.access, requested)?;
        }
    }
    writer.finish().map_err(|_| ArchiveError::CorruptedData)?;
    Ok(())
}

/// `None` (a member carried over unchanged from `old`) or an explicit
/// request for `Default` both mean "let this backend choose"; anything
/// else is passed straight to [`write_member`], which rejects codecs this
/// backend cannot encode.
fn resolve_format(requested: Option<CompressionFormat>, data: &[u8]) -> CompressionFormat {
    match requested {
        None | Some(CompressionFormat::Default) => pick_format(data),
        Some(format) => format,
    }
}

fn pick_format(data: &[u8]) -> CompressionFormat {
    if try_deflate(data).is_some() {
        CompressionFormat::Deflate
    } else {
        CompressionFormat::Uncompressed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::containers::{ArchiveOp, PartSource};

    fn empty_zip() -> Vec<u8> {
        let mut buf = Vec::new();
        ZipWriter::new(Cursor::new(&mut buf)).finish().unwrap();
        buf
    }

    #[test]
    fn create_record_then_add_part_round_trips() {
        let mut old = Cursor::new(empty_zip());
        let mut output = Cursor::new(Vec::new());
        let mut txn = ArchiveTransaction::new();
        txn.create_record("FILE");
        txn.add_part(
            "FILE",
            PartKind::Data,
            Box::new(b"some bytes".to_vec()) as Box<dyn PartSource>,
            CompressionFormat::Deflate,
        );
        commit(&mut old, &mut output, &txn).unwrap();

        let records = read_archive(&mut output).unwrap();
        assert_eq!(records.get("FILE").unwrap().data.as_deref(), Some(&b"some bytes"[..]));
    }

    #[test]
    fn delete_record_on_unknown_name_fails() {
        let mut old = Cursor::new(empty_zip());
        let mut output = Cursor::new(Vec::new());
        let mut txn = ArchiveTransaction::new();
        txn.delete_record("NOPE");
        assert!(matches!(commit(&mut old, &mut output, &txn), Err(ArchiveError::NotFound(_))));
    }

    #[test]
    fn unsupported_compression_request_is_not_silently_downgraded() {
        let mut old = Cursor::new(empty_zip());
        let mut output = Cursor::new(Vec::new());
        let mut txn = ArchiveTransaction::new();
        txn.create_record("FILE");
        txn.add_part(
            "FILE",
            PartKind::Data,
            Box::new(b"some bytes".to_vec()) as Box<dyn PartSource>,
            CompressionFormat::Shrink,
        );
        assert!(matches!(commit(&mut old, &mut output, &txn), Err(ArchiveError::Unsupported(_))));
    }

    #[test]
    fn access_bits_round_trip_through_unix_mode() {
        let mut old = Cursor::new(empty_zip());
        let mut output = Cursor::new(Vec::new());
        let mut txn = ArchiveTransaction::new();
        txn.create_record("FILE");
        txn.add_part(
            "FILE",
            PartKind::Data,
            Box::new(b"data".to_vec()) as Box<dyn PartSource>,
            CompressionFormat::Uncompressed,
        );
        txn.set_access("FILE", AccessFlags::READ | AccessFlags::WRITE);
        commit(&mut old, &mut output, &txn).unwrap();

        let records = read_archive(&mut output).unwrap();
        assert_eq!(records.get("FILE").unwrap().access, AccessFlags::READ | AccessFlags::WRITE);
    }
}
