use std::path::{Path, PathBuf};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use super::errors::{Result, UploadError};

#[derive(Debug, Clone)]
enum FileBody {
    Memory(Bytes),
    Disk(PathBuf),
}

/// 待上传的本地文件
#[derive(Debug, Clone)]
pub struct SourceFile {
    name: String,
    mime_type: Option<String>,
    last_modified: DateTime<Utc>,
    size_bytes: u64,
    body: FileBody,
}

impl SourceFile {
    pub fn from_bytes(
        name: impl Into<String>,
        mime_type: Option<&str>,
        data: impl Into<Bytes>,
    ) -> Self {
        let data = data.into();
        Self {
            name: name.into(),
            mime_type: mime_type.map(str::to_string),
            last_modified: Utc::now(),
            size_bytes: data.len() as u64,
            body: FileBody::Memory(data),
        }
    }

    /// Opens a file on disk. Bytes are read lazily, one range at a time.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let metadata = tokio::fs::metadata(path).await?;
        if !metadata.is_file() {
            return Err(UploadError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("{} is not a regular file", path.display()),
            )));
        }

        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| UploadError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "file name is not valid UTF-8",
            )))?
            .to_string();

        let last_modified = metadata
            .modified()
            .map(DateTime::<Utc>::from)
            .unwrap_or_else(|_| Utc::now());

        Ok(Self {
            name,
            mime_type: None,
            last_modified,
            size_bytes: metadata.len(),
            body: FileBody::Disk(path.to_path_buf()),
        })
    }

    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }

    pub fn with_last_modified(mut self, last_modified: DateTime<Utc>) -> Self {
        self.last_modified = last_modified;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mime_type(&self) -> Option<&str> {
        self.mime_type.as_deref()
    }

    pub fn last_modified(&self) -> DateTime<Utc> {
        self.last_modified
    }

    pub fn size_bytes(&self) -> u64 {
        self.size_bytes
    }

    /// 小写扩展名，没有则为空串
    pub fn extension(&self) -> String {
        Path::new(&self.name)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase())
            .unwrap_or_default()
    }

    /// 读取 `[start, end)`
    pub async fn read_range(&self, start: u64, end: u64) -> Result<Bytes> {
        let end = end.min(self.size_bytes);
        if start >= end {
            return Ok(Bytes::new());
        }

        match &self.body {
            FileBody::Memory(data) => Ok(data.slice(start as usize..end as usize)),
            FileBody::Disk(path) => {
                let mut file = File::open(path).await?;
                file.seek(std::io::SeekFrom::Start(start)).await?;

                let mut buffer = vec![0u8; (end - start) as usize];
                file.read_exact(&mut buffer).await?;
                Ok(Bytes::from(buffer))
            }
        }
    }

    pub async fn read_all(&self) -> Result<Bytes> {
        self.read_range(0, self.size_bytes).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_ranges() {
        let file = SourceFile::from_bytes("Clip.MP4", None, vec![1u8, 2, 3, 4, 5]);

        assert_eq!(file.extension(), "mp4");
        assert_eq!(file.size_bytes(), 5);
        assert_eq!(file.read_range(1, 3).await.unwrap().as_ref(), &[2, 3]);
        assert_eq!(file.read_range(3, 100).await.unwrap().as_ref(), &[4, 5]);
        assert!(file.read_range(5, 9).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_disk_ranges() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        tokio::fs::write(&path, b"hello chunked world").await.unwrap();

        let file = SourceFile::open(&path).await.unwrap();
        assert_eq!(file.name(), "notes.txt");
        assert_eq!(file.size_bytes(), 19);
        assert_eq!(file.mime_type(), None);
        assert_eq!(file.read_range(6, 13).await.unwrap().as_ref(), b"chunked");
        assert_eq!(file.read_all().await.unwrap().len(), 19);
    }

    #[tokio::test]
    async fn test_open_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(SourceFile::open(dir.path()).await.is_err());
    }
}
