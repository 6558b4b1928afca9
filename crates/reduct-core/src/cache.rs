//! Binary example cache
//!
//! Layout: `b"RDCC"`, u32 version, then one record per example:
//!
//! ```text
//! label record (8 bytes) | kind u8 | tag_len u16 | tag | n u32 | n x (index u64, value f32)
//! ```
//!
//! All integers are little-endian. A short label record is the normal end of
//! the stream; a record cut off after its label is reported and also ends it.

use std::io::{self, Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::driver::{ExampleSource, SourcePoll};
use crate::example::{ControlRecord, Example, Feature, Payload};
use crate::label::{self, LABEL_RECORD_SIZE};

pub const MAGIC: &[u8; 4] = b"RDCC";
pub const CACHE_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    Instance = 0,
    EndOfPass = 1,
    Save = 2,
}

impl RecordKind {
    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(b: u8) -> Option<Self> {
        match b {
            0 => Some(RecordKind::Instance),
            1 => Some(RecordKind::EndOfPass),
            2 => Some(RecordKind::Save),
            _ => None,
        }
    }

    fn of(ex: &Example) -> Self {
        match &ex.payload {
            Payload::Instance => RecordKind::Instance,
            Payload::Control(ControlRecord::EndOfPass) => RecordKind::EndOfPass,
            Payload::Control(ControlRecord::Save { .. }) => RecordKind::Save,
        }
    }
}

pub struct CacheWriter<W: Write> {
    inner: W,
    records: u64,
}

impl<W: Write> CacheWriter<W> {
    pub fn new(mut inner: W) -> io::Result<Self> {
        inner.write_all(MAGIC)?;
        inner.write_u32::<LittleEndian>(CACHE_VERSION)?;
        Ok(Self { inner, records: 0 })
    }

    pub fn write(&mut self, ex: &Example) -> io::Result<()> {
        let tag = match (&ex.payload, ex.tag.as_deref()) {
            (Payload::Control(ControlRecord::Save { path: Some(p) }), _) => format!("save_{p}"),
            (Payload::Control(ControlRecord::Save { path: None }), _) => "save".to_string(),
            (_, tag) => tag.unwrap_or_default().to_string(),
        };
        let tag_len = u16::try_from(tag.len())
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, format!("tag too long: {} bytes", tag.len())))?;
        let count = u32::try_from(ex.features.len()).map_err(|_| {
            io::Error::new(io::ErrorKind::InvalidInput, format!("too many features: {}", ex.features.len()))
        })?;

        self.inner.write_all(&label::encode(&ex.label))?;
        self.inner.write_u8(RecordKind::of(ex).code())?;
        self.inner.write_u16::<LittleEndian>(tag_len)?;
        self.inner.write_all(tag.as_bytes())?;
        self.inner.write_u32::<LittleEndian>(count)?;
        for f in &ex.features {
            self.inner.write_u64::<LittleEndian>(f.index)?;
            self.inner.write_f32::<LittleEndian>(f.value)?;
        }
        self.records += 1;
        Ok(())
    }

    pub fn records(&self) -> u64 {
        self.records
    }

    /// Flush and hand back the underlying writer.
    pub fn finish(mut self) -> io::Result<W> {
        self.inner.flush()?;
        Ok(self.inner)
    }
}

pub struct CacheReader<R: Read> {
    inner: R,
    done: bool,
    records: u64,
}

impl<R: Read> CacheReader<R> {
    pub fn new(mut inner: R) -> io::Result<Self> {
        let mut magic = [0u8; 4];
        inner.read_exact(&mut magic)?;
        if &magic != MAGIC {
            return Err(io::Error::new(io::ErrorKind::InvalidData, "Invalid cache file: bad magic"));
        }
        let version = inner.read_u32::<LittleEndian>()?;
        if version != CACHE_VERSION {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Unsupported cache version: {version} (v{CACHE_VERSION} required)"),
            ));
        }
        Ok(Self {
            inner,
            done: false,
            records: 0,
        })
    }

    pub fn records(&self) -> u64 {
        self.records
    }

    /// Next record, `Ok(None)` at a clean end of input.
    pub fn read_example(&mut self) -> io::Result<Option<Example>> {
        let mut buf = [0u8; LABEL_RECORD_SIZE];
        let n = read_up_to(&mut self.inner, &mut buf)?;
        let label = match label::decode(&buf[..n]) {
            Ok(label) => label,
            Err(e) => {
                log::debug!("cache: end of input after {} records ({e})", self.records);
                return Ok(None);
            }
        };

        let kind_code = self.inner.read_u8()?;
        let kind = RecordKind::from_code(kind_code)
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, format!("Unknown record kind: {kind_code}")))?;
        let tag_len = self.inner.read_u16::<LittleEndian>()? as usize;
        let mut tag = vec![0u8; tag_len];
        self.inner.read_exact(&mut tag)?;
        let tag = String::from_utf8_lossy(&tag).into_owned();
        let count = self.inner.read_u32::<LittleEndian>()? as usize;
        let mut features = Vec::with_capacity(count.min(1 << 16));
        for _ in 0..count {
            let index = self.inner.read_u64::<LittleEndian>()?;
            let value = self.inner.read_f32::<LittleEndian>()?;
            features.push(Feature::new(index, value));
        }

        let mut ex = match kind {
            RecordKind::Instance => Example::new(label, features),
            RecordKind::EndOfPass => Example::control(ControlRecord::EndOfPass),
            RecordKind::Save => Example::control(
                ControlRecord::from_save_tag(&tag).unwrap_or(ControlRecord::Save { path: None }),
            ),
        };
        ex.label = label;
        if !tag.is_empty() {
            ex.tag = Some(tag);
        }
        self.records += 1;
        Ok(Some(ex))
    }
}

impl<R: Read> ExampleSource for CacheReader<R> {
    fn poll_next(&mut self) -> SourcePoll {
        if self.done {
            return SourcePoll::Exhausted;
        }
        match self.read_example() {
            Ok(Some(ex)) => SourcePoll::Ready(ex),
            Ok(None) => {
                self.done = true;
                SourcePoll::Exhausted
            }
            Err(e) => {
                log::warn!("cache: truncated or corrupt record after {} records: {e}", self.records);
                self.done = true;
                SourcePoll::Exhausted
            }
        }
    }
}

/// Fill `buf` as far as the reader allows; returns the byte count.
fn read_up_to<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
