//! Fixed-size chunk planning and streaming for downloads.
//!
//! Downloads carry no server-side state: the plan is recomputed from the
//! file's current size on every request.

use std::io::{ErrorKind, SeekFrom};
use std::ops::Range;
use std::path::Path;

use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt, Take};
use tokio_util::io::ReaderStream;

use crate::{HoardError, Result};

/// How a file of a given size splits into chunks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkPlan {
    /// File size in bytes.
    pub size: u64,
    /// Chunk size in bytes.
    pub chunk_size: u64,
    /// `ceil(size / chunk_size)`; zero for an empty file.
    pub total_chunks: u64,
}

impl ChunkPlan {
    /// Plan a file of `size` bytes. `chunk_size` must be positive.
    pub fn new(size: u64, chunk_size: u64) -> Self {
        Self {
            size,
            chunk_size,
            total_chunks: size.div_ceil(chunk_size),
        }
    }

    /// Byte range `[start, end)` of chunk `index`.
    pub fn range(&self, index: u64) -> Result<Range<u64>> {
        let start = index
            .checked_mul(self.chunk_size)
            .filter(|start| *start < self.size)
            .ok_or(HoardError::OutOfRange {
                index,
                total: self.total_chunks,
            })?;
        let end = start.saturating_add(self.chunk_size).min(self.size);
        Ok(start..end)
    }
}

/// Body stream of one slice.
pub type SliceStream = ReaderStream<Take<File>>;

/// One slice of a file, ready to stream.
pub struct ChunkSlice {
    /// Requested chunk index.
    pub index: u64,
    /// Byte range served.
    pub range: Range<u64>,
    /// Plan the slice was cut from.
    pub plan: ChunkPlan,
    /// Bytes of the slice.
    pub stream: SliceStream,
}

impl ChunkSlice {
    /// Number of bytes in the slice.
    pub fn len(&self) -> u64 {
        self.range.end - self.range.start
    }

    /// Whether the slice is empty. Never true for a slice that was served.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Computes chunk plans and serves slices of existing files.
#[derive(Debug, Clone, Copy)]
pub struct DownloadSlicer {
    chunk_size: u64,
}

impl DownloadSlicer {
    /// Create a slicer. A zero chunk size is rejected.
    pub fn new(chunk_size: u64) -> Result<Self> {
        if chunk_size == 0 {
            return Err(HoardError::Validation(
                "chunk size must be positive".to_string(),
            ));
        }
        Ok(Self { chunk_size })
    }

    /// Configured chunk size.
    pub fn chunk_size(&self) -> u64 {
        self.chunk_size
    }

    /// Chunk plan for the file at `path`.
    pub async fn plan_info(&self, path: &Path) -> Result<ChunkPlan> {
        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|e| not_found_or_io(e, path))?;
        if metadata.is_dir() {
            return Err(HoardError::IsDirectory(display_name(path)));
        }
        Ok(ChunkPlan::new(metadata.len(), self.chunk_size))
    }

    /// Open chunk `index` of the file at `path` for streaming.
    ///
    /// Only the requested range is read; the rest of the file is never
    /// loaded.
    pub async fn read_chunk(&self, path: &Path, index: u64) -> Result<ChunkSlice> {
        let plan = self.plan_info(path).await?;
        let range = plan.range(index)?;

        let mut file = File::open(path)
            .await
            .map_err(|e| not_found_or_io(e, path))?;
        file.seek(SeekFrom::Start(range.start)).await?;

        Ok(ChunkSlice {
            index,
            stream: ReaderStream::new(file.take(range.end - range.start)),
            range,
            plan,
        })
    }

    /// Open the whole file for streaming, returning its size.
    pub async fn open_whole(&self, path: &Path) -> Result<(u64, SliceStream)> {
        let plan = self.plan_info(path).await?;
        let file = File::open(path)
            .await
            .map_err(|e| not_found_or_io(e, path))?;
        Ok((plan.size, ReaderStream::new(file.take(plan.size))))
    }
}

fn not_found_or_io(e: std::io::Error, path: &Path) -> HoardError {
    if e.kind() == ErrorKind::NotFound {
        HoardError::NotFound(format!("file {}", display_name(path)))
    } else {
        e.into()
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use tempfile::TempDir;

    async fn collect(stream: SliceStream) -> Vec<u8> {
        let mut out = Vec::new();
        let mut stream = stream;
        while let Some(bytes) = stream.next().await {
            out.extend_from_slice(&bytes.unwrap());
        }
        out
    }

    #[test]
    fn test_seven_bytes_in_threes() {
        let plan = ChunkPlan::new(7, 3);
        assert_eq!(plan.total_chunks, 3);
        assert_eq!(plan.range(0).unwrap(), 0..3);
        assert_eq!(plan.range(1).unwrap(), 3..6);
        assert_eq!(plan.range(2).unwrap(), 6..7);
        assert!(matches!(
            plan.range(3),
            Err(HoardError::OutOfRange { index: 3, total: 3 })
        ));
    }

    #[test]
    fn test_ranges_cover_file_exactly() {
        for size in [1u64, 2, 5, 9, 10, 11, 64, 100, 1000] {
            for chunk_size in [1u64, 2, 3, 7, 10, 64, 4096] {
                let plan = ChunkPlan::new(size, chunk_size);
                let mut next = 0;
                for index in 0..plan.total_chunks {
                    let range = plan.range(index).unwrap();
                    assert_eq!(range.start, next, "gap or overlap at {index}");
                    assert!(range.end > range.start);
                    next = range.end;
                }
                assert_eq!(next, size);

                let last = plan.range(plan.total_chunks - 1).unwrap();
                let expected = if size % chunk_size == 0 {
                    chunk_size
                } else {
                    size % chunk_size
                };
                assert_eq!(last.end - last.start, expected);
                assert!(plan.range(plan.total_chunks).is_err());
            }
        }
    }

    #[test]
    fn test_empty_file_has_no_chunks() {
        let plan = ChunkPlan::new(0, 10);
        assert_eq!(plan.total_chunks, 0);
        assert!(plan.range(0).is_err());
    }

    #[test]
    fn test_huge_index_does_not_overflow() {
        let plan = ChunkPlan::new(100, 10);
        assert!(plan.range(u64::MAX).is_err());
    }

    #[test]
    fn test_zero_chunk_size_rejected() {
        assert!(DownloadSlicer::new(0).is_err());
    }

    #[tokio::test]
    async fn test_read_chunk_streams_range() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("seven.bin");
        std::fs::write(&path, b"abcdefg").unwrap();
        let slicer = DownloadSlicer::new(3).unwrap();

        let slice = slicer.read_chunk(&path, 1).await.unwrap();
        assert_eq!(slice.range, 3..6);
        assert_eq!(slice.plan.total_chunks, 3);
        assert_eq!(collect(slice.stream).await, b"def");

        let slice = slicer.read_chunk(&path, 2).await.unwrap();
        assert_eq!(slice.len(), 1);
        assert_eq!(collect(slice.stream).await, b"g");

        assert!(matches!(
            slicer.read_chunk(&path, 3).await,
            Err(HoardError::OutOfRange { .. })
        ));
    }

    #[tokio::test]
    async fn test_plan_info_errors() {
        let temp = TempDir::new().unwrap();
        let slicer = DownloadSlicer::new(3).unwrap();

        assert!(matches!(
            slicer.plan_info(&temp.path().join("missing")).await,
            Err(HoardError::NotFound(_))
        ));
        assert!(matches!(
            slicer.plan_info(temp.path()).await,
            Err(HoardError::IsDirectory(_))
        ));
    }

    #[tokio::test]
    async fn test_open_whole() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("small.txt");
        std::fs::write(&path, b"hello").unwrap();

        let (size, stream) = DownloadSlicer::new(64).unwrap().open_whole(&path).await.unwrap();
        assert_eq!(size, 5);
        assert_eq!(collect(stream).await, b"hello");
    }
}
