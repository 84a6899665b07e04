/*
    prodigy
    https://github.com/prodigy-rs/prodigy

    --------------------------------------------------------------------------

    src/stream/mod.rs

    L5 of the layered stack: per-file byte streams. Two
    shapes share this module because they have almost nothing else in
    common: a sparse-aware, random-access [`FileStream`] for filesystem
    forks, and a forward-only [`ArchiveReadStream`] for archive forks with
    an optional decompression filter and trailing checksum.
*/
use std::io::{self, Read, Seek, SeekFrom, Write};

use crc::{Crc, Digest, CRC_16_XMODEM};

use crate::errors::ArchiveError;

/// Backing storage a [`FileStream`] reads/writes through. A filesystem's
/// concrete fork implementation provides this; it is the seam at which
/// sparse allocation policy lives.
pub trait ForkBackend {
    fn len(&self) -> u64;
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<usize>;
    fn write_at(&mut self, offset: u64, buf: &[u8]) -> io::Result<()>;
    fn set_len(&mut self, len: u64) -> io::Result<()>;
    /// The first offset at or after `from` that holds real (non-sparse)
    /// data, or `len()` if none remains.
    fn next_data(&self, from: u64) -> u64;
    /// The first offset at or after `from` that is a hole (sparse region
    /// or past a real region), or `len()` if none remains.
    fn next_hole(&self, from: u64) -> u64;
}

/// Two extra seek origins beyond `Start`/`End`/`Current`, used to walk
/// sparse regions without reading every byte.
#[derive(Copy, Clone, Debug)]
pub enum ForkSeekFrom {
    Start(u64),
    End(i64),
    Current(i64),
    /// Seek to the first non-sparse byte at or after the given offset.
    Data(u64),
    /// Seek to the first sparse byte (or end) at or after the given offset.
    Hole(u64),
}

/// A random-access, seekable stream over one fork of one file.
/// Multiple read-only streams over the same fork may coexist; the
/// filesystem host is responsible for enforcing the "one read-write stream
/// per fork" rule before handing one out.
pub struct FileStream<B> {
    backend: B,
    pos: u64,
}

impl<B: ForkBackend> FileStream<B> {
    pub fn new(backend: B) -> Self {
        Self { backend, pos: 0 }
    }

    pub fn into_inner(self) -> B {
        self.backend
    }

    pub fn len(&self) -> u64 {
        self.backend.len()
    }

    pub fn is_empty(&self) -> bool {
        self.backend.is_empty()
    }

    /// Extends or truncates the fork. Extension may allocate sparse space;
    /// truncation defers actual block release to the filesystem host
    ///.
    pub fn set_len(&mut self, len: u64) -> io::Result<()> {
        self.backend.set_len(len)?;
        if self.pos > len {
            self.pos = len;
        }
        Ok(())
    }

    pub fn fork_seek(&mut self, from: ForkSeekFrom) -> io::Result<u64> {
        let len = self.backend.len();
        self.pos = match from {
            ForkSeekFrom::Start(p) => p,
            ForkSeekFrom::End(delta) => offset_from(len, delta)?,
            ForkSeekFrom::Current(delta) => offset_from(self.pos, delta)?,
            ForkSeekFrom::Data(from) => self.backend.next_data(from).min(len),
            ForkSeekFrom::Hole(from) => self.backend.next_hole(from).min(len),
        };
        Ok(self.pos)
    }
}

fn offset_from(base: u64, delta: i64) -> io::Result<u64> {
    let result = base as i64 + delta;
    if result < 0 {
        return Err(io::Error::new(io::ErrorKind::InvalidInput, "seek to a negative position"));
    }
    Ok(result as u64)
}

impl<B: ForkBackend> Read for FileStream<B> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let got = self.backend.read_at(self.pos, buf)?;
        self.pos += got as u64;
        Ok(got)
    }
}

impl<B: ForkBackend> Write for FileStream<B> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.backend.write_at(self.pos, buf)?;
        self.pos += buf.len() as u64;
        if self.pos > self.backend.len() {
            self.backend.set_len(self.pos)?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<B: ForkBackend> Seek for FileStream<B> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        match pos {
            SeekFrom::Start(p) => self.fork_seek(ForkSeekFrom::Start(p)),
            SeekFrom::End(d) => self.fork_seek(ForkSeekFrom::End(d)),
            SeekFrom::Current(d) => self.fork_seek(ForkSeekFrom::Current(d)),
        }
    }
}

/// A forward-only stream over one archive fork's uncompressed bytes (spec
/// §4.9), optionally chained to a decompression filter. Holds its own
/// position so several entries may be "open" concurrently over one shared
/// archive byte source (each wrapping a fresh, independently-seeked
/// decompressor).
pub struct ArchiveReadStream<R> {
    inner: R,
    position: u64,
    uncompressed_length: Option<u64>,
    expected_checksum: Option<u16>,
    digest: Option<Digest<'static, u16>>,
    finished: bool,
}

static XMODEM: Crc<u16> = Crc::<u16>::new(&CRC_16_XMODEM);

impl<R: Read> ArchiveReadStream<R> {
    pub fn new(inner: R, uncompressed_length: Option<u64>, expected_checksum: Option<u16>) -> Self {
        Self {
            inner,
            position: 0,
            uncompressed_length,
            expected_checksum,
            digest: expected_checksum.map(|_| XMODEM.digest()),
            finished: false,
        }
    }

    pub fn position(&self) -> u64 {
        self.position
    }

    /// Reads the entire remaining stream, finalizing and verifying the
    /// checksum if one was configured.
    pub fn read_to_end_checked(&mut self) -> Result<Vec<u8>, ArchiveError> {
        let mut out = Vec::new();
        let mut buf = [0u8; 4096];
        loop {
            let got = self.read_checked(&mut buf)?;
            if got == 0 {
                break;
            }
            out.extend_from_slice(&buf[..got]);
        }
        Ok(out)
    }

    /// Reads into `buf`, advancing position and the running checksum.
    /// Finalizes and verifies the checksum on reaching end-of-stream,
    /// either because `read` returned 0 or because the known uncompressed
    /// length was reached. If no checksum was configured, the end-of-stream
    /// check is skipped.
    pub fn read_checked(&mut self, buf: &mut [u8]) -> Result<usize, ArchiveError> {
        if self.finished {
            return Ok(0);
        }
        let got = self.inner.read(buf)?;
        if got > 0 {
            self.position += got as u64;
            if let Some(digest) = self.digest.as_mut() {
                digest.update(&buf[..got]);
            }
        }
        let at_known_end = self.uncompressed_length.map(|len| self.position >= len).unwrap_or(false);
        if got == 0 || at_known_end {
            self.finished = true;
            if let (Some(expected), Some(digest)) = (self.expected_checksum, self.digest.take()) {
                if digest.finalize() != expected {
                    return Err(ArchiveError::CorruptedData);
                }
            }
        }
        Ok(got)
    }
}

/// Verifies a complete fork's bytes against an expected CRC-16/XMODEM
/// checksum. Used by [`ArchiveReadStream`]
/// callers and by archive backends validating a part after extraction.
pub fn verify_checksum(data: &[u8], expected: u16) -> Result<(), ArchiveError> {
    let actual = XMODEM.checksum(data);
    if actual == expected {
        Ok(())
    } else {
        Err(ArchiveError::CorruptedData)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct VecBackend(Vec<u8>);
    impl ForkBackend for VecBackend {
        fn len(&self) -> u64 {
            self.0.len() as u64
        }
        fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
            let offset = offset as usize;
            if offset >= self.0.len() {
                return Ok(0);
            }
            let n = buf.len().min(self.0.len() - offset);
            buf[..n].copy_from_slice(&self.0[offset..offset + n]);
            Ok(n)
        }
        fn write_at(&mut self, offset: u64, buf: &[u8]) -> io::Result<()> {
            let offset = offset as usize;
            if offset + buf.len() > self.0.len() {
                self.0.resize(offset + buf.len(), 0);
            }
            self.0[offset..offset + buf.len()].copy_from_slice(buf);
            Ok(())
        }
        fn set_len(&mut self, len: u64) -> io::Result<()> {
            self.0.resize(len as usize, 0);
            Ok(())
        }
        fn next_data(&self, from: u64) -> u64 {
            from.min(self.len())
        }
        fn next_hole(&self, _from: u64) -> u64 {
            self.len()
        }
    }

    #[test]
    fn write_then_read_round_trips_through_seek() {
        let mut stream = FileStream::new(VecBackend(Vec::new()));
        stream.write_all(b"hello world").unwrap();
        stream.seek(SeekFrom::Start(0)).unwrap();
        let mut out = String::new();
        stream.read_to_string(&mut out).unwrap();
        assert_eq!(out, "hello world");
    }

    #[test]
    fn set_len_truncates_and_clamps_position() {
        let mut stream = FileStream::new(VecBackend(vec![1, 2, 3, 4, 5]));
        stream.seek(SeekFrom::Start(5)).unwrap();
        stream.set_len(2).unwrap();
        assert_eq!(stream.len(), 2);
        assert_eq!(stream.seek(SeekFrom::Current(0)).unwrap(), 2);
    }

    #[test]
    fn checksum_mismatch_is_reported() {
        let data = b"the quick brown fox".to_vec();
        let good = XMODEM.checksum(&data);
        assert!(verify_checksum(&data, good).is_ok());
        assert!(matches!(verify_checksum(&data, good.wrapping_add(1)), Err(ArchiveError::CorruptedData)));
    }

    #[test]
    fn archive_stream_reads_to_end() {
        let data = b"payload bytes".to_vec();
        let mut stream = ArchiveReadStream::new(&data[..], Some(data.len() as u64), None);
        let out = stream.read_to_end_checked().unwrap();
        assert_eq!(out, data);
    }
}
