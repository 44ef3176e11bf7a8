//! Byte sources the driver slices chunks from.

use std::future::Future;
use std::io::{self, SeekFrom};
use std::path::{Path, PathBuf};
use std::pin::Pin;

use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::sync::Mutex;

/// An immutable payload of known size that can be read by offset.
///
/// The driver never mutates a source and only asks for ranges within
/// `[0, size())`.
pub trait ByteSource: Send + Sync {
    /// Total payload size in bytes.
    fn size(&self) -> u64;

    /// Reads bytes `[start, end)`.
    fn slice(
        &self,
        start: u64,
        end: u64,
    ) -> Pin<Box<dyn Future<Output = io::Result<Vec<u8>>> + Send + '_>>;
}

fn check_bounds(start: u64, end: u64, size: u64) -> io::Result<()> {
    if start > end || end > size {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("slice {start}..{end} outside payload of {size} bytes"),
        ));
    }
    Ok(())
}

fn slice_memory(data: &[u8], start: u64, end: u64) -> io::Result<Vec<u8>> {
    check_bounds(start, end, data.len() as u64)?;
    Ok(data[start as usize..end as usize].to_vec())
}

impl ByteSource for Vec<u8> {
    fn size(&self) -> u64 {
        self.len() as u64
    }

    fn slice(
        &self,
        start: u64,
        end: u64,
    ) -> Pin<Box<dyn Future<Output = io::Result<Vec<u8>>> + Send + '_>> {
        let result = slice_memory(self, start, end);
        Box::pin(async move { result })
    }
}

impl ByteSource for &[u8] {
    fn size(&self) -> u64 {
        self.len() as u64
    }

    fn slice(
        &self,
        start: u64,
        end: u64,
    ) -> Pin<Box<dyn Future<Output = io::Result<Vec<u8>>> + Send + '_>> {
        let result = slice_memory(self, start, end);
        Box::pin(async move { result })
    }
}

/// A file on disk, read one slice at a time.
///
/// The size is captured when the file is opened; the file must not change
/// while a transfer is running.
pub struct FileSource {
    file: Mutex<tokio::fs::File>,
    size: u64,
    path: PathBuf,
}

impl FileSource {
    /// Opens `path` for slicing.
    pub async fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = tokio::fs::File::open(&path).await?;
        let metadata = file.metadata().await?;
        if !metadata.is_file() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} is not a regular file", path.display()),
            ));
        }
        Ok(Self {
            file: Mutex::new(file),
            size: metadata.len(),
            path,
        })
    }

    /// Path the source was opened from.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ByteSource for FileSource {
    fn size(&self) -> u64 {
        self.size
    }

    fn slice(
        &self,
        start: u64,
        end: u64,
    ) -> Pin<Box<dyn Future<Output = io::Result<Vec<u8>>> + Send + '_>> {
        Box::pin(async move {
            check_bounds(start, end, self.size)?;
            let mut buf = vec![0u8; (end - start) as usize];
            let mut file = self.file.lock().await;
            file.seek(SeekFrom::Start(start)).await?;
            file.read_exact(&mut buf).await?;
            Ok(buf)
        })
    }
}
