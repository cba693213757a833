//! Byte sources that back region contents.
//!
//! A [`ByteSource`] is the read-only program image a load session copies
//! from. Unlike a streaming reader, sources promise exact reads: backfill
//! asks for precisely the bytes a region spans, and a truncated answer is
//! an error, not a shorter buffer. [`FileSource`] memory-maps an on-disk
//! image; [`SliceSource`] wraps bytes already in memory.

pub mod error;

use crate::source::error::{Result, SourceError};
use bytes::Bytes;
use memmap2::Mmap;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::{debug, trace, warn};

/// Read-only random access to program-image bytes.
pub trait ByteSource {
    /// Total number of bytes in the source.
    fn len(&self) -> u64;

    /// Read exactly `len` bytes starting at `offset`.
    ///
    /// Fails with [`SourceError::ShortRead`] when any part of the range
    /// lies past the end of the source. A zero-length read at any offset
    /// up to `len()` succeeds with an empty buffer.
    fn read_at(&self, offset: u64, len: u64) -> Result<Bytes>;

    /// Whether the source holds no bytes at all.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Slice out `[offset, offset + len)` from a shared buffer, enforcing the
/// exact-read contract.
fn slice_exact(data: &Bytes, offset: u64, len: u64) -> Result<Bytes> {
    let total = data.len() as u64;
    let end = offset
        .checked_add(len)
        .filter(|end| *end <= total)
        .ok_or(SourceError::ShortRead {
            offset,
            requested: len,
            available: total.saturating_sub(offset.min(total)),
        })?;
    Ok(data.slice(offset as usize..end as usize))
}

/// An in-memory byte source.
///
/// Cheap to clone; slices returned by [`ByteSource::read_at`] share the
/// underlying buffer.
#[derive(Debug, Clone, Default)]
pub struct SliceSource {
    data: Bytes,
}

impl SliceSource {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self { data: data.into() }
    }
}

impl From<Vec<u8>> for SliceSource {
    fn from(data: Vec<u8>) -> Self {
        Self::new(data)
    }
}

impl From<&[u8]> for SliceSource {
    fn from(data: &[u8]) -> Self {
        Self::new(Bytes::copy_from_slice(data))
    }
}

impl ByteSource for SliceSource {
    fn len(&self) -> u64 {
        self.data.len() as u64
    }

    fn read_at(&self, offset: u64, len: u64) -> Result<Bytes> {
        slice_exact(&self.data, offset, len)
    }
}

/// Resource limits applied when opening a [`FileSource`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLimits {
    /// The absolute maximum file size that can be opened.
    pub max_file_size: u64,
}

impl Default for SourceLimits {
    fn default() -> Self {
        Self {
            max_file_size: 1024 * 1024 * 1024, // 1 GiB
        }
    }
}

/// A memory-mapped file source.
///
/// The map is read-only and shared; reads copy the requested range out so
/// returned buffers stay valid past the source's lifetime.
pub struct FileSource {
    path: PathBuf,
    // None when the file size is zero; memmap cannot map empty files.
    mmap: Option<Mmap>,
    file_size: u64,
}

impl FileSource {
    /// Opens a file, memory-maps it, and wraps it as a byte source.
    ///
    /// This function will fail if the file size exceeds `limits.max_file_size`.
    pub fn open<P: AsRef<Path>>(path: P, limits: SourceLimits) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let metadata = file.metadata()?;
        let file_size = metadata.len();

        debug!(
            path = %path.display(),
            size = file_size,
            limits.max_file_size = limits.max_file_size,
            "Opening program image"
        );

        if file_size > limits.max_file_size {
            warn!(
                path = %path.display(),
                size = file_size,
                limit = limits.max_file_size,
                "File is too large"
            );
            return Err(SourceError::FileTooLarge {
                limit: limits.max_file_size,
                found: file_size,
            });
        }

        // For zero-length files, do not attempt to mmap (unsupported); keep None.
        // For non-empty files, map read-only.
        let mmap = if file_size == 0 {
            None
        } else {
            // Safety: The file is backed by a real file on disk and we only request a read-only map.
            Some(unsafe { Mmap::map(&file)? })
        };

        Ok(Self {
            path: path.to_path_buf(),
            mmap,
            file_size,
        })
    }

    /// The path this source was opened from.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ByteSource for FileSource {
    fn len(&self) -> u64 {
        self.file_size
    }

    fn read_at(&self, offset: u64, len: u64) -> Result<Bytes> {
        let map = match &self.mmap {
            Some(m) => m,
            None => {
                // Empty file: only a zero-length read at offset zero is exact.
                if offset == 0 && len == 0 {
                    return Ok(Bytes::new());
                }
                return Err(SourceError::ShortRead {
                    offset,
                    requested: len,
                    available: 0,
                });
            }
        };

        let end = offset
            .checked_add(len)
            .filter(|end| *end <= self.file_size)
            .ok_or(SourceError::ShortRead {
                offset,
                requested: len,
                available: self.file_size.saturating_sub(offset.min(self.file_size)),
            })?;

        trace!(
            path = %self.path.display(),
            offset = offset,
            len = len,
            "Performed read"
        );

        Ok(Bytes::copy_from_slice(&map[offset as usize..end as usize]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_temp_file(content: &[u8]) -> NamedTempFile {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(content).unwrap();
        temp_file
    }

    #[test]
    fn open_file_successfully() {
        let file = create_temp_file(b"hello world");
        let source = FileSource::open(file.path(), SourceLimits::default()).unwrap();
        assert_eq!(source.len(), 11);
        assert!(!source.is_empty());
    }

    #[test]
    fn open_file_too_large() {
        let file = create_temp_file(&[0; 100]);
        let limits = SourceLimits { max_file_size: 50 };
        let result = FileSource::open(file.path(), limits);
        assert!(matches!(result, Err(SourceError::FileTooLarge { .. })));
    }

    #[test]
    fn source_limits_serde_round_trip() {
        let limits = SourceLimits {
            max_file_size: 0x1000,
        };
        let json = serde_json::to_string(&limits).unwrap();
        let back: SourceLimits = serde_json::from_str(&json).unwrap();
        assert_eq!(back, limits);
    }

    #[test]
    fn read_at_offset_correctly() {
        let file = create_temp_file(b"hello world");
        let source = FileSource::open(file.path(), SourceLimits::default()).unwrap();
        let data = source.read_at(6, 5).unwrap();
        assert_eq!(data, &b"world"[..]);
    }

    #[test]
    fn read_past_eof_is_short() {
        let file = create_temp_file(b"hello");
        let source = FileSource::open(file.path(), SourceLimits::default()).unwrap();
        let err = source.read_at(3, 10).unwrap_err();
        assert!(matches!(
            err,
            SourceError::ShortRead {
                offset: 3,
                requested: 10,
                available: 2,
            }
        ));
    }

    #[test]
    fn read_fully_past_eof_is_short() {
        let file = create_temp_file(b"hello");
        let source = FileSource::open(file.path(), SourceLimits::default()).unwrap();
        let err = source.read_at(100, 1).unwrap_err();
        assert!(matches!(err, SourceError::ShortRead { available: 0, .. }));
    }

    #[test]
    fn zero_length_read_at_end_is_ok() {
        let file = create_temp_file(b"hello");
        let source = FileSource::open(file.path(), SourceLimits::default()).unwrap();
        assert!(source.read_at(5, 0).unwrap().is_empty());
    }

    #[test]
    fn open_empty_file() {
        let file = create_temp_file(b"");
        let source = FileSource::open(file.path(), SourceLimits::default()).unwrap();
        assert_eq!(source.len(), 0);
        assert!(source.is_empty());
        assert!(source.read_at(0, 0).unwrap().is_empty());
        assert!(matches!(
            source.read_at(0, 1),
            Err(SourceError::ShortRead { .. })
        ));
    }

    #[test]
    fn slice_source_reads() {
        let source = SliceSource::from(vec![1u8, 2, 3, 4, 5]);
        assert_eq!(source.len(), 5);
        assert_eq!(source.read_at(1, 3).unwrap(), &[2, 3, 4][..]);
        assert!(matches!(
            source.read_at(4, 2),
            Err(SourceError::ShortRead { .. })
        ));
    }

    #[test]
    fn slice_source_wrapping_offset_is_short() {
        let source = SliceSource::from(&b"abc"[..]);
        assert!(matches!(
            source.read_at(u64::MAX, 2),
            Err(SourceError::ShortRead { .. })
        ));
    }
}
