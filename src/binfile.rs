//! Framed binary section files (`ptau`, `zkey`, `wtns`, `r1cs`)
//!
//! Layout (all integers little-endian):
//!
//! ```text
//! magic[4] | u32 version | u32 nSections | { u32 id | u64 size | data[size] }*
//! ```
//!
//! Both sides work on any `Read + Seek` / `Write + Seek` stream, so the same
//! code drives an in-memory `Cursor<Vec<u8>>` and a file on disk. File outputs
//! go through [`PendingFile`], which writes to a temporary sibling and only
//! renames it over the destination once the caller calls
//! [`PendingFile::persist`]; a failed operation therefore never leaves a
//! half-written file behind.

#![forbid(unsafe_code)]

use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use num_bigint::BigUint;
use tempfile::NamedTempFile;

/// Errors produced by the section reader/writer.
#[derive(Debug, thiserror::Error)]
pub enum BinError {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("invalid file type: expected `{expected}`, found `{found}`")]
    BadMagic { expected: String, found: String },
    #[error("unsupported version {found} (max {max})")]
    UnsupportedVersion { found: u32, max: u32 },
    #[error("missing section {0}")]
    MissingSection(u32),
    #[error("section {0} appears more than once")]
    DuplicateSection(u32),
    #[error("section {id}: expected {expected} bytes, found {found}")]
    SectionSize { id: u32, expected: u64, found: u64 },
    #[error("section {id}: range {offset}+{len} exceeds size {size}")]
    OutOfRange { id: u32, offset: u64, len: u64, size: u64 },
    #[error("section state error: {0}")]
    State(&'static str),
    #[error("big integer does not fit in {0} bytes")]
    BigIntTooLarge(usize),
}

/// Location of one section's payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SectionInfo {
    /// Absolute offset of the first payload byte.
    pub start: u64,
    /// Payload length.
    pub size: u64,
}

// ============================================================================
// Reader
// ============================================================================

/// Section-indexed reader.
pub struct BinReader<R: Read + Seek> {
    inner: R,
    version: u32,
    sections: HashMap<u32, Vec<SectionInfo>>,
    current: Option<(u32, SectionInfo)>,
}

impl<R: Read + Seek> BinReader<R> {
    /// Parse the header and index every section.
    pub fn new(mut inner: R, magic: &[u8; 4], max_version: u32) -> Result<Self, BinError> {
        inner.seek(SeekFrom::Start(0))?;
        let mut m = [0u8; 4];
        inner.read_exact(&mut m)?;
        if &m != magic {
            return Err(BinError::BadMagic {
                expected: String::from_utf8_lossy(magic).into_owned(),
                found: String::from_utf8_lossy(&m).into_owned(),
            });
        }
        let version = read_u32_from(&mut inner)?;
        if version > max_version {
            return Err(BinError::UnsupportedVersion { found: version, max: max_version });
        }
        let n_sections = read_u32_from(&mut inner)?;
        let end = inner.seek(SeekFrom::End(0))?;
        inner.seek(SeekFrom::Start(12))?;

        let mut sections: HashMap<u32, Vec<SectionInfo>> = HashMap::new();
        for _ in 0..n_sections {
            let id = read_u32_from(&mut inner)?;
            let size = read_u64_from(&mut inner)?;
            let start = inner.stream_position()?;
            if start + size > end {
                return Err(BinError::Io(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!("section {id} runs past end of file"),
                )));
            }
            sections.entry(id).or_default().push(SectionInfo { start, size });
            inner.seek(SeekFrom::Start(start + size))?;
        }
        Ok(Self { inner, version, sections, current: None })
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn has_section(&self, id: u32) -> bool {
        self.sections.contains_key(&id)
    }

    /// Location of a section that must appear exactly once.
    pub fn section(&self, id: u32) -> Result<SectionInfo, BinError> {
        match self.sections.get(&id).map(Vec::as_slice) {
            None | Some([]) => Err(BinError::MissingSection(id)),
            Some([one]) => Ok(*one),
            Some(_) => Err(BinError::DuplicateSection(id)),
        }
    }

    pub fn section_size(&self, id: u32) -> Result<u64, BinError> {
        Ok(self.section(id)?.size)
    }

    /// Position the stream at the start of a unique section.
    pub fn start_read_section(&mut self, id: u32) -> Result<u64, BinError> {
        if self.current.is_some() {
            return Err(BinError::State("a section is already being read"));
        }
        let info = self.section(id)?;
        self.inner.seek(SeekFrom::Start(info.start))?;
        self.current = Some((id, info));
        Ok(info.size)
    }

    /// Finish reading; unless `no_check`, the whole payload must have been consumed.
    pub fn end_read_section(&mut self, no_check: bool) -> Result<(), BinError> {
        let (id, info) = self.current.take().ok_or(BinError::State("no section is being read"))?;
        if !no_check {
            let pos = self.inner.stream_position()?;
            if pos != info.start + info.size {
                return Err(BinError::SectionSize { id, expected: info.size, found: pos - info.start });
            }
        }
        Ok(())
    }

    /// Whole payload of a unique section.
    pub fn read_section(&mut self, id: u32) -> Result<Vec<u8>, BinError> {
        let size = self.section_size(id)?;
        self.read_section_range(id, 0, size)
    }

    /// `len` bytes at `offset` inside a unique section.
    pub fn read_section_range(&mut self, id: u32, offset: u64, len: u64) -> Result<Vec<u8>, BinError> {
        if self.current.is_some() {
            return Err(BinError::State("range read while a section is open"));
        }
        let info = self.section(id)?;
        if offset + len > info.size {
            return Err(BinError::OutOfRange { id, offset, len, size: info.size });
        }
        self.inner.seek(SeekFrom::Start(info.start + offset))?;
        let mut buf = vec![0u8; len as usize];
        self.inner.read_exact(&mut buf)?;
        Ok(buf)
    }

    pub fn read_u32(&mut self) -> Result<u32, BinError> {
        Ok(read_u32_from(&mut self.inner)?)
    }

    pub fn read_u64(&mut self) -> Result<u64, BinError> {
        Ok(read_u64_from(&mut self.inner)?)
    }

    pub fn read_bytes(&mut self, n: usize) -> Result<Vec<u8>, BinError> {
        let mut buf = vec![0u8; n];
        self.inner.read_exact(&mut buf)?;
        Ok(buf)
    }

    /// Little-endian unsigned integer of `n8` bytes.
    pub fn read_bigint(&mut self, n8: usize) -> Result<BigUint, BinError> {
        Ok(BigUint::from_bytes_le(&self.read_bytes(n8)?))
    }

    /// Give the underlying stream back.
    pub fn into_inner(self) -> R {
        self.inner
    }
}

// ============================================================================
// Writer
// ============================================================================

/// Section writer; sizes and the section count are patched in place.
pub struct BinWriter<W: Write + Seek> {
    inner: W,
    open: Option<(u32, u64)>,
    written: Vec<(u32, SectionInfo)>,
}

impl<W: Write + Seek> BinWriter<W> {
    pub fn new(mut inner: W, magic: &[u8; 4], version: u32) -> Result<Self, BinError> {
        inner.write_all(magic)?;
        inner.write_all(&version.to_le_bytes())?;
        inner.write_all(&0u32.to_le_bytes())?;
        Ok(Self { inner, open: None, written: Vec::new() })
    }

    pub fn start_section(&mut self, id: u32) -> Result<(), BinError> {
        if self.open.is_some() {
            return Err(BinError::State("previous section not closed"));
        }
        self.inner.write_all(&id.to_le_bytes())?;
        let size_pos = self.inner.stream_position()?;
        self.inner.write_all(&0u64.to_le_bytes())?;
        self.open = Some((id, size_pos));
        Ok(())
    }

    pub fn end_section(&mut self) -> Result<(), BinError> {
        let (id, size_pos) = self.open.take().ok_or(BinError::State("no open section"))?;
        let end = self.inner.stream_position()?;
        let start = size_pos + 8;
        let size = end - start;
        self.inner.seek(SeekFrom::Start(size_pos))?;
        self.inner.write_all(&size.to_le_bytes())?;
        self.inner.seek(SeekFrom::Start(end))?;
        self.written.push((id, SectionInfo { start, size }));
        Ok(())
    }

    pub fn write_u32(&mut self, v: u32) -> Result<(), BinError> {
        self.inner.write_all(&v.to_le_bytes())?;
        Ok(())
    }

    pub fn write_u64(&mut self, v: u64) -> Result<(), BinError> {
        self.inner.write_all(&v.to_le_bytes())?;
        Ok(())
    }

    pub fn write_bytes(&mut self, b: &[u8]) -> Result<(), BinError> {
        self.inner.write_all(b)?;
        Ok(())
    }

    /// Write `v` as `n8` little-endian bytes.
    pub fn write_bigint(&mut self, v: &BigUint, n8: usize) -> Result<(), BinError> {
        let mut b = v.to_bytes_le();
        if b.len() > n8 {
            return Err(BinError::BigIntTooLarge(n8));
        }
        b.resize(n8, 0);
        self.write_bytes(&b)
    }

    /// Convenience: one section holding `data`.
    pub fn write_section(&mut self, id: u32, data: &[u8]) -> Result<(), BinError> {
        self.start_section(id)?;
        self.write_bytes(data)?;
        self.end_section()
    }

    /// Location of an already closed section.
    pub fn written_section(&self, id: u32) -> Result<SectionInfo, BinError> {
        self.written
            .iter()
            .find(|(i, _)| *i == id)
            .map(|(_, s)| *s)
            .ok_or(BinError::MissingSection(id))
    }

    /// Patch the section count and hand the stream back.
    pub fn finish(mut self) -> Result<W, BinError> {
        if self.open.is_some() {
            return Err(BinError::State("section left open"));
        }
        let end = self.inner.stream_position()?;
        self.inner.seek(SeekFrom::Start(8))?;
        self.inner.write_all(&(self.written.len() as u32).to_le_bytes())?;
        self.inner.seek(SeekFrom::Start(end))?;
        self.inner.flush()?;
        Ok(self.inner)
    }
}

impl<W: Read + Write + Seek> BinWriter<W> {
    /// Re-read part of a section that was already written.
    pub fn read_back(&mut self, id: u32, offset: u64, len: u64) -> Result<Vec<u8>, BinError> {
        if self.open.is_some() {
            return Err(BinError::State("cannot read back while a section is open"));
        }
        let info = self.written_section(id)?;
        if offset + len > info.size {
            return Err(BinError::OutOfRange { id, offset, len, size: info.size });
        }
        let end = self.inner.seek(SeekFrom::End(0))?;
        self.inner.seek(SeekFrom::Start(info.start + offset))?;
        let mut buf = vec![0u8; len as usize];
        self.inner.read_exact(&mut buf)?;
        self.inner.seek(SeekFrom::Start(end))?;
        Ok(buf)
    }
}

// ============================================================================
// Section helpers
// ============================================================================

const COPY_CHUNK: u64 = 1 << 20;

/// Copy a unique section verbatim from `r` into `w`.
pub fn copy_section<R: Read + Seek, W: Write + Seek>(
    r: &mut BinReader<R>,
    w: &mut BinWriter<W>,
    id: u32,
) -> Result<(), BinError> {
    let size = r.section_size(id)?;
    w.start_section(id)?;
    let mut off = 0;
    while off < size {
        let len = COPY_CHUNK.min(size - off);
        let chunk = r.read_section_range(id, off, len)?;
        w.write_bytes(&chunk)?;
        off += len;
    }
    w.end_section()
}

/// Compare one section byte for byte across two files.
pub fn section_is_equal<R1: Read + Seek, R2: Read + Seek>(
    a: &mut BinReader<R1>,
    b: &mut BinReader<R2>,
    id: u32,
) -> Result<bool, BinError> {
    let size = a.section_size(id)?;
    if size != b.section_size(id)? {
        return Ok(false);
    }
    let mut off = 0;
    while off < size {
        let len = COPY_CHUNK.min(size - off);
        if a.read_section_range(id, off, len)? != b.read_section_range(id, off, len)? {
            return Ok(false);
        }
        off += len;
    }
    Ok(true)
}

fn read_u32_from<R: Read>(r: &mut R) -> io::Result<u32> {
    let mut b = [0u8; 4];
    r.read_exact(&mut b)?;
    Ok(u32::from_le_bytes(b))
}

fn read_u64_from<R: Read>(r: &mut R) -> io::Result<u64> {
    let mut b = [0u8; 8];
    r.read_exact(&mut b)?;
    Ok(u64::from_le_bytes(b))
}

// ============================================================================
// File-backed streams
// ============================================================================

/// Open `path` as a section file.
pub fn open_file(
    path: impl AsRef<Path>,
    magic: &[u8; 4],
    max_version: u32,
) -> Result<BinReader<BufReader<File>>, BinError> {
    BinReader::new(BufReader::new(File::open(path)?), magic, max_version)
}

/// Output that becomes visible at `path` only after [`persist`](Self::persist).
pub struct PendingFile {
    tmp: NamedTempFile,
    path: PathBuf,
}

impl PendingFile {
    pub fn create(path: impl AsRef<Path>) -> Result<Self, BinError> {
        let path = path.as_ref().to_path_buf();
        let dir = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        Ok(Self { tmp: NamedTempFile::new_in(dir)?, path })
    }

    /// Atomically move the finished output into place.
    pub fn persist(self) -> Result<(), BinError> {
        self.tmp.persist(&self.path).map_err(|e| BinError::Io(e.error))?;
        Ok(())
    }
}

impl Read for PendingFile {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.tmp.read(buf)
    }
}

impl Write for PendingFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.tmp.write(buf)
    }
    fn flush(&mut self) -> io::Result<()> {
        self.tmp.flush()
    }
}

impl Seek for PendingFile {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.tmp.seek(pos)
    }
}
