use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::TransferError;

/// A pull-based byte producer.
///
/// `open`/`close` bracket any underlying handle. `read` fills at most
/// `buf.len()` bytes and returns 0 once the source is exhausted.
pub trait ByteSource: Send {
    /// Acquires the underlying handle. Opening an open source is a no-op.
    fn open(&mut self) -> io::Result<()>;

    /// Reads the next bytes into `buf`.
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Releases the underlying handle. Safe to call more than once.
    fn close(&mut self);

    /// Total number of bytes a full drain yields, known before any read.
    fn content_length(&self) -> u64;
}

/// A [`ByteSource`] that can reposition, used to resume transfers.
pub trait SeekableSource: ByteSource {
    /// Moves the read cursor to `offset` bytes from the start.
    fn seek_to(&mut self, offset: u64) -> io::Result<()>;

    /// Current read cursor.
    fn position(&self) -> u64;
}

// ---------------------------------------------------------------------------
// ChunkSource
// ---------------------------------------------------------------------------

/// Sequential, seekable reader over a local file.
///
/// The size is taken from `stat` at construction; reads are bounded by it,
/// so a drain yields exactly `total_size` bytes or fails.
pub struct ChunkSource {
    path: PathBuf,
    total_size: u64,
    cursor: u64,
    file: Option<File>,
}

impl ChunkSource {
    /// Stats `path` without opening it.
    pub fn new(path: &Path) -> Result<Self, TransferError> {
        let metadata = std::fs::metadata(path)?;
        if !metadata.is_file() {
            return Err(TransferError::NotAFile(path.display().to_string()));
        }
        Ok(Self {
            path: path.to_path_buf(),
            total_size: metadata.len(),
            cursor: 0,
            file: None,
        })
    }

    /// Path of the underlying file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Final path component, used as the uploaded file name.
    pub fn file_name(&self) -> Option<&str> {
        self.path.file_name().and_then(|n| n.to_str())
    }

    /// Total file size in bytes.
    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    /// Bytes remaining to read.
    pub fn remaining(&self) -> u64 {
        self.total_size - self.cursor
    }

    /// Whether a file handle is currently held.
    pub fn is_open(&self) -> bool {
        self.file.is_some()
    }
}

impl ByteSource for ChunkSource {
    fn open(&mut self) -> io::Result<()> {
        if self.file.is_none() {
            let mut file = File::open(&self.path)?;
            if self.cursor > 0 {
                file.seek(SeekFrom::Start(self.cursor))?;
            }
            debug!(path = %self.path.display(), offset = self.cursor, "chunk source opened");
            self.file = Some(file);
        }
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let remaining = self.remaining();
        if remaining == 0 || buf.is_empty() {
            return Ok(0);
        }
        let file = self
            .file
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "source is not open"))?;

        let want = (remaining.min(buf.len() as u64)) as usize;
        let n = file.read(&mut buf[..want])?;
        if n == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!(
                    "{} ended at {} of {} bytes",
                    self.path.display(),
                    self.cursor,
                    self.total_size
                ),
            ));
        }
        self.cursor += n as u64;
        Ok(n)
    }

    fn close(&mut self) {
        if self.file.take().is_some() {
            debug!(path = %self.path.display(), offset = self.cursor, "chunk source closed");
        }
    }

    fn content_length(&self) -> u64 {
        self.total_size
    }
}

impl SeekableSource for ChunkSource {
    fn seek_to(&mut self, offset: u64) -> io::Result<()> {
        if offset > self.total_size {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("offset {offset} beyond end of {}-byte file", self.total_size),
            ));
        }
        if let Some(file) = self.file.as_mut() {
            file.seek(SeekFrom::Start(offset))?;
        }
        self.cursor = offset;
        Ok(())
    }

    fn position(&self) -> u64 {
        self.cursor
    }
}

// ---------------------------------------------------------------------------
// BytesSource
// ---------------------------------------------------------------------------

/// Pass-through source over bytes already in memory.
#[derive(Debug, Clone)]
pub struct BytesSource {
    data: Vec<u8>,
    cursor: usize,
}

impl BytesSource {
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        Self {
            data: data.into(),
            cursor: 0,
        }
    }
}

impl ByteSource for BytesSource {
    fn open(&mut self) -> io::Result<()> {
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let rest = &self.data[self.cursor..];
        let n = rest.len().min(buf.len());
        buf[..n].copy_from_slice(&rest[..n]);
        self.cursor += n;
        Ok(n)
    }

    fn close(&mut self) {}

    fn content_length(&self) -> u64 {
        self.data.len() as u64
    }
}

impl SeekableSource for BytesSource {
    fn seek_to(&mut self, offset: u64) -> io::Result<()> {
        if offset > self.data.len() as u64 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("offset {offset} beyond end of {}-byte buffer", self.data.len()),
            ));
        }
        self.cursor = offset as usize;
        Ok(())
    }

    fn position(&self) -> u64 {
        self.cursor as u64
    }
}

/// Reads up to `max` bytes, looping over short reads. Returns an empty
/// buffer at end of source.
pub fn read_chunk<S: ByteSource + ?Sized>(source: &mut S, max: usize) -> io::Result<Vec<u8>> {
    let mut buf = vec![0u8; max];
    let mut filled = 0;
    while filled < max {
        let n = source.read(&mut buf[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    buf.truncate(filled);
    Ok(buf)
}
