/*
    prodigy
    https://github.com/prodigy-rs/prodigy

    --------------------------------------------------------------------------

    src/containers/gzip_backend.rs

    GZip as an [`super::ArchiveKind`] backend. A gzip stream carries exactly
    one anonymous member with no directory, so this backend exposes it as a
    single fixed record named `"data"`: `CreateRecord`/`DeleteRecord` against
    an already-populated stream are rejected, and the only supported edit is
    replacing that one record's data part.
*/
use std::io::{Read, Seek, Write};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;

use crate::errors::ArchiveError;
use crate::file_system::entry::AccessFlags;
use crate::io::ByteSource;

use super::{ArchiveEntryInfo, ArchiveOp, ArchiveTransaction, PartKind};

const RECORD_NAME: &str = "data";

fn decode_all<S: Read + Seek>(stream: &mut S) -> Result<Vec<u8>, ArchiveError> {
    let start = stream.stream_position()?;
    let mut decoder = GzDecoder::new(&mut *stream);
    let mut out = Vec::new();
    let result = decoder.read_to_end(&mut out);
    stream.seek(std::io::SeekFrom::Start(start))?;
    result.map_err(|_| ArchiveError::CorruptedData)?;
    Ok(out)
}

fn original_filename<S: Read + Seek>(stream: &mut S) -> Result<Option<String>, ArchiveError> {
    let start = stream.stream_position()?;
    let decoder = GzDecoder::new(&mut *stream);
    let name = decoder.header().and_then(|h| h.filename()).map(|b| String::from_utf8_lossy(b).into_owned());
    stream.seek(std::io::SeekFrom::Start(start))?;
    Ok(name)
}

pub(super) fn list<S: Read + Write + Seek>(stream: &mut S) -> Result<Vec<ArchiveEntryInfo>, ArchiveError> {
    let len = stream.length()?;
    if len == 0 {
        return Ok(Vec::new());
    }
    let data = decode_all(stream)?;
    Ok(vec![ArchiveEntryInfo {
        name: RECORD_NAME.to_string(),
        has_data: true,
        data_len: data.len() as u64,
        has_resource: false,
        resource_len: 0,
        access: AccessFlags::empty(),
        checksum: None,
    }])
}

pub(super) fn read_part<S: Read + Write + Seek>(
    stream: &mut S,
    name: &str,
    kind: PartKind,
) -> Result<Vec<u8>, ArchiveError> {
    if name != RECORD_NAME {
        return Err(ArchiveError::NotFound(name.to_string()));
    }
    if kind == PartKind::Resource {
        return Err(ArchiveError::Unsupported("gzip streams carry no resource fork"));
    }
    decode_all(stream)
}

pub(super) fn commit<S: Read + Write + Seek>(
    old: &mut S,
    output: &mut S,
    txn: &ArchiveTransaction,
) -> Result<(), ArchiveError> {
    let len = old.length()?;
    let existing = if len == 0 { None } else { Some(decode_all(old)?) };
    let filename = if len == 0 { None } else { original_filename(old)? };

    let mut data = existing;
    let mut created = false;

    for op in txn.ops() {
        match op {
            ArchiveOp::CreateRecord { name } => {
                if name != RECORD_NAME {
                    return Err(ArchiveError::Unsupported("gzip archives hold a single unnamed record"));
                }
                if data.is_some() {
                    return Err(ArchiveError::Duplicate(name.clone()));
                }
                data = Some(Vec::new());
                created = true;
            }
            ArchiveOp::DeleteRecord { name } => {
                if name != RECORD_NAME || data.is_none() {
                    return Err(ArchiveError::NotFound(name.clone()));
                }
                data = None;
            }
            ArchiveOp::AddPart { name, kind, source, .. } => {
                if name != RECORD_NAME {
                    return Err(ArchiveError::NotFound(name.clone()));
                }
                if *kind == PartKind::Resource {
                    return Err(ArchiveError::Unsupported("gzip streams carry no resource fork"));
                }
                if data.is_none() && !created {
                    return Err(ArchiveError::NotFound(name.clone()));
                }
                data = Some(source.read_all()?);
            }
            ArchiveOp::DeletePart { name, kind } => {
                if name != RECORD_NAME || *kind == PartKind::Resource {
                    return Err(ArchiveError::NotFound(name.clone()));
                }
                data = Some(Vec::new());
            }
            ArchiveOp::SetAccess { .. } => {
                return Err(ArchiveError::Unsupported("gzip records carry no access bits"));
            }
        }
    }

    let data = data.ok_or(ArchiveError::InvalidOperation("no record left to write"))?;
    let mut builder = flate2::GzBuilder::new();
    if let Some(name) = filename {
        builder = builder.filename(name);
    }
    let mut encoder = builder.write(&mut *output, Compression::default());
    encoder.write_all(&data)?;
    encoder.finish()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::containers::PartSource;

    fn gzip_of(data: &[u8]) -> Vec<u8> {
        let mut buf = Vec::new();
        let mut encoder = GzEncoder::new(&mut buf, Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap();
        buf
    }

    #[test]
    fn replaces_single_record_data() {
        let mut old = Cursor::new(gzip_of(b"original"));
        let mut output = Cursor::new(Vec::new());
        let mut txn = ArchiveTransaction::new();
        txn.add_part(
            "data",
            PartKind::Data,
            Box::new(b"replaced".to_vec()) as Box<dyn PartSource>,
            crate::containers::CompressionFormat::Deflate,
        );
        commit(&mut old, &mut output, &txn).unwrap();

        let result = decode_all(&mut output).unwrap();
        assert_eq!(result, b"replaced");
    }

    #[test]
    fn create_record_on_populated_stream_rejected() {
        let mut old = Cursor::new(gzip_of(b"original"));
        let mut output = Cursor::new(Vec::new());
        let mut txn = ArchiveTransaction::new();
        txn.create_record("data");
        assert!(matches!(commit(&mut old, &mut output, &txn), Err(ArchiveError::Duplicate(_))));
    }

    #[test]
    fn list_reports_single_record() {
        let mut stream = Cursor::new(gzip_of(b"hello"));
        let entries = list(&mut stream).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].data_len, 5);
    }
}
