use std::fs::File;
use std::io;
use std::num::NonZeroU64;
use std::path::Path;
use std::sync::Arc;

use crate::TransferError;
use crate::types::Chunk;

// ---------------------------------------------------------------------------
// Planning
// ---------------------------------------------------------------------------

/// Number of chunks needed to cover `file_size` bytes.
pub fn chunk_count(file_size: u64, chunk_size: NonZeroU64) -> u64 {
    file_size.div_ceil(chunk_size.get())
}

/// Splits `file_size` bytes into ordered chunks of `chunk_size`.
///
/// Every chunk but the last is exactly `chunk_size` long; the last one holds
/// the remainder. A zero-byte file yields no chunks. No I/O happens here.
pub fn plan_chunks(file_size: u64, chunk_size: NonZeroU64) -> ChunkPlan {
    ChunkPlan {
        file_size,
        chunk_size,
        next_offset: 0,
    }
}

/// Lazy chunk sequence returned by [`plan_chunks`].
#[derive(Debug, Clone)]
pub struct ChunkPlan {
    file_size: u64,
    chunk_size: NonZeroU64,
    next_offset: u64,
}

impl ChunkPlan {
    /// Total size the plan covers.
    pub fn file_size(&self) -> u64 {
        self.file_size
    }
}

impl Iterator for ChunkPlan {
    type Item = Chunk;

    fn next(&mut self) -> Option<Chunk> {
        if self.next_offset >= self.file_size {
            return None;
        }
        let length = self.chunk_size.get().min(self.file_size - self.next_offset);
        let chunk = Chunk {
            offset: self.next_offset,
            length,
        };
        self.next_offset += length;
        Some(chunk)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = chunk_count(self.file_size - self.next_offset, self.chunk_size);
        match usize::try_from(remaining) {
            Ok(n) => (n, Some(n)),
            Err(_) => (usize::MAX, None),
        }
    }
}

impl ExactSizeIterator for ChunkPlan {}

// ---------------------------------------------------------------------------
// ChunkSource
// ---------------------------------------------------------------------------

/// Read-only handle on a local file that serves chunks by position.
///
/// Reads never touch a shared cursor, so the handle can be cloned and read
/// from several tasks without locking.
#[derive(Debug, Clone)]
pub struct ChunkSource {
    file: Arc<File>,
    size: u64,
}

impl ChunkSource {
    /// Opens `path` and records its size.
    pub fn open(path: &Path) -> Result<Self, TransferError> {
        let file = File::open(path)?;
        let metadata = file.metadata()?;
        if !metadata.is_file() {
            return Err(TransferError::InvalidPath(format!(
                "not a regular file: {}",
                path.display()
            )));
        }
        Ok(Self {
            file: Arc::new(file),
            size: metadata.len(),
        })
    }

    /// Opens `path` on the blocking pool.
    pub async fn open_async(path: &Path) -> Result<Self, TransferError> {
        let path = path.to_path_buf();
        tokio::task::spawn_blocking(move || Self::open(&path))
            .await
            .map_err(|e| TransferError::Io(io::Error::other(e)))?
    }

    /// File size captured at open time.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Reads exactly `chunk.length` bytes starting at `chunk.offset`.
    ///
    /// Fails with [`TransferError::ShortRead`] if the file ends early.
    pub fn read_chunk(&self, chunk: &Chunk) -> Result<Vec<u8>, TransferError> {
        let len = usize::try_from(chunk.length)
            .map_err(|_| TransferError::ChunkTooLarge(chunk.length))?;
        let mut buf = vec![0u8; len];
        let mut filled = 0usize;

        while filled < len {
            match read_at(&self.file, &mut buf[filled..], chunk.offset + filled as u64) {
                Ok(0) => {
                    return Err(TransferError::ShortRead {
                        offset: chunk.offset,
                        expected: chunk.length,
                        actual: filled as u64,
                    });
                }
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
        }

        Ok(buf)
    }

    /// [`read_chunk`](Self::read_chunk) on the blocking pool.
    pub async fn read_chunk_async(&self, chunk: Chunk) -> Result<Vec<u8>, TransferError> {
        let source = self.clone();
        tokio::task::spawn_blocking(move || source.read_chunk(&chunk))
            .await
            .map_err(|e| TransferError::Io(io::Error::other(e)))?
    }

    /// Reads the whole file (used by the direct-upload path).
    pub async fn read_all(&self) -> Result<Vec<u8>, TransferError> {
        if self.size == 0 {
            return Ok(Vec::new());
        }
        self.read_chunk_async(Chunk {
            offset: 0,
            length: self.size,
        })
        .await
    }
}

#[cfg(unix)]
fn read_at(file: &File, buf: &mut [u8], offset: u64) -> io::Result<usize> {
    use std::os::unix::fs::FileExt;
    file.read_at(buf, offset)
}

#[cfg(windows)]
fn read_at(file: &File, buf: &mut [u8], offset: u64) -> io::Result<usize> {
    use std::os::windows::fs::FileExt;
    file.seek_read(buf, offset)
}
