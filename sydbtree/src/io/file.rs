//! FileID files
//!
//! The file has the following structure
//!
//! Header
//! Body
//!
//! The Header occupies one block and holds the format version and the length of the Body.
//! The Body is the bincode encoded FileID store.

use std::io::{ErrorKind, SeekFrom};
use std::path::Path;

use anyhow::Result;
use bincode::Options;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};

use crate::parameter::FileId;
use crate::BINCODER;

const BLOCK_SIZE: u64 = 512;

const FORMAT_VERSION_1: u8 = 1;

const SUPPORTED_VERSIONS: &[u8] = &[FORMAT_VERSION_1];

/// A persisted FileID.
#[derive(Debug)]
pub struct FileIdFile {
    file: File,
    header: FileIdFileHeader,
}

#[derive(Debug, Serialize, Deserialize)]
struct FileIdFileHeader {
    version: u8,
    body_size: u64,
}

/// FileID file format errors.
#[derive(Error, Debug)]
pub enum FileIdFileError {
    /// Written by a format this crate doesn't read
    #[error("file version not supported: {0}")]
    InvalidFileVersion(u8),
    /// Shorter than its header claims
    #[error("file truncated: expected {expected} bytes, found {found}")]
    Truncated {
        /// Bytes required
        expected: u64,
        /// Bytes present
        found: u64,
    },
}

impl FileIdFile {
    /// Open an existing file.
    pub async fn try_open(path: &Path) -> Result<Self> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(false)
            .open(path)
            .await?;

        let header = FileIdFile::read_header(&mut file).await?;

        if !SUPPORTED_VERSIONS.contains(&header.version) {
            return Err(FileIdFileError::InvalidFileVersion(header.version).into());
        }

        let found = file.metadata().await?.len();
        let expected = BLOCK_SIZE.saturating_add(header.body_size);
        if found < expected {
            return Err(FileIdFileError::Truncated { expected, found }.into());
        }

        Ok(Self { file, header })
    }

    /// Create (or replace) the file at `path` holding `file_id`.
    pub async fn try_new(path: &Path, file_id: &FileId) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
            .await?;

        let mut id_file = Self {
            file,
            header: FileIdFileHeader {
                version: FORMAT_VERSION_1,
                body_size: 0,
            },
        };
        id_file.write(file_id).await?;
        tracing::info!(
            "created FileID file {} ({} body bytes)",
            path.display(),
            id_file.header.body_size
        );
        Ok(id_file)
    }

    /// The stored FileID.
    pub async fn read(&mut self) -> Result<FileId> {
        let mut buf = vec![0; self.header.body_size as usize];
        self.file.seek(SeekFrom::Start(BLOCK_SIZE)).await?;
        self.file.read_exact(&mut buf).await?;
        BINCODER.deserialize(&buf).map_err(|e| e.into())
    }

    /// Replace the stored FileID.
    pub async fn write(&mut self, file_id: &FileId) -> Result<()> {
        let body = BINCODER.serialize(file_id)?;
        self.header.body_size = body.len() as u64;

        let s_header = BINCODER.serialize(&self.header)?;
        let mut block = vec![0; BLOCK_SIZE as usize];
        block[..s_header.len()].copy_from_slice(&s_header);

        self.file.set_len(BLOCK_SIZE + self.header.body_size).await?;
        self.file.seek(SeekFrom::Start(0)).await?;
        self.file.write_all(&block).await?;
        self.file.write_all(&body).await?;
        Ok(())
    }

    /// Sync contents to disk.
    pub async fn flush(&self) -> Result<()> {
        self.file.sync_all().await.map_err(|e| e.into())
    }

    /// Format version of the file.
    pub fn version(&self) -> u8 {
        self.header.version
    }

    async fn read_header(file: &mut File) -> Result<FileIdFileHeader> {
        let mut buf = vec![0; BLOCK_SIZE as usize];

        file.seek(SeekFrom::Start(0)).await?;
        if let Err(err) = file.read_exact(&mut buf).await {
            if err.kind() == ErrorKind::UnexpectedEof {
                let found = file.metadata().await?.len();
                return Err(FileIdFileError::Truncated {
                    expected: BLOCK_SIZE,
                    found,
                }
                .into());
            }
            return Err(err.into());
        }

        BINCODER.deserialize(&buf).map_err(|e| e.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parameter::ParameterKey;

    fn file_id() -> FileId {
        let mut file_id = FileId::new();
        file_id
            .set_string(ParameterKey::Area(0), "/var/sydney/t1")
            .set_boolean(ParameterKey::Mounted, true)
            .set_integer(ParameterKey::FieldNumber, 2)
            .set_integer(ParameterKey::FieldType(0), 10)
            .set_integer(ParameterKey::FieldType(1), 0);
        file_id
    }

    #[test_log::test(tokio::test)]
    async fn it_creates_file_id_file() {
        let path = Path::new("fileid_create.sid");
        let id_file = FileIdFile::try_new(path, &file_id())
            .await
            .expect("creates FileID file");
        assert_eq!(id_file.version(), FORMAT_VERSION_1);
        std::fs::remove_file(path).expect("cleanup");
    }

    #[test_log::test(tokio::test)]
    async fn it_reopens_file_id_file() {
        let path = Path::new("fileid_reopen.sid");
        let id_file = FileIdFile::try_new(path, &file_id())
            .await
            .expect("creates FileID file");
        id_file.flush().await.expect("flushed away");
        drop(id_file);

        let mut id_file = FileIdFile::try_open(path)
            .await
            .expect("opens FileID file");
        assert_eq!(id_file.read().await.expect("reads FileID"), file_id());

        let mut changed = file_id();
        changed.set_integer(ParameterKey::PageSize, 8);
        id_file.write(&changed).await.expect("rewrites FileID");
        assert_eq!(id_file.read().await.expect("reads FileID"), changed);
        std::fs::remove_file(path).expect("cleanup");
    }

    #[test_log::test(tokio::test)]
    async fn it_rejects_unknown_versions() {
        let path = Path::new("fileid_version.sid");
        FileIdFile::try_new(path, &file_id())
            .await
            .expect("creates FileID file");
        let mut bytes = std::fs::read(path).expect("reads bytes");
        bytes[0] = 9;
        std::fs::write(path, &bytes).expect("writes bytes");

        let err = FileIdFile::try_open(path).await.expect_err("bad version");
        assert!(matches!(
            err.downcast_ref::<FileIdFileError>(),
            Some(FileIdFileError::InvalidFileVersion(9))
        ));
        std::fs::remove_file(path).expect("cleanup");
    }

    #[test_log::test(tokio::test)]
    async fn it_rejects_truncated_files() {
        let path = Path::new("fileid_truncated.sid");
        FileIdFile::try_new(path, &file_id())
            .await
            .expect("creates FileID file");
        let bytes = std::fs::read(path).expect("reads bytes");
        std::fs::write(path, &bytes[..bytes.len() - 1]).expect("writes bytes");
        let err = FileIdFile::try_open(path).await.expect_err("truncated body");
        assert!(matches!(
            err.downcast_ref::<FileIdFileError>(),
            Some(FileIdFileError::Truncated { .. })
        ));

        std::fs::write(path, &bytes[..100]).expect("writes bytes");
        let err = FileIdFile::try_open(path).await.expect_err("truncated header");
        assert!(matches!(
            err.downcast_ref::<FileIdFileError>(),
            Some(FileIdFileError::Truncated {
                expected: BLOCK_SIZE,
                found: 100
            })
        ));
        std::fs::remove_file(path).expect("cleanup");
    }

    #[test_log::test(tokio::test)]
    async fn it_rejects_corrupt_body_sizes() {
        let path = Path::new("fileid_body_size.sid");
        FileIdFile::try_new(path, &file_id())
            .await
            .expect("creates FileID file");
        let mut bytes = std::fs::read(path).expect("reads bytes");
        let header = FileIdFileHeader {
            version: FORMAT_VERSION_1,
            body_size: u64::MAX,
        };
        let s_header = BINCODER.serialize(&header).expect("serializes header");
        bytes[..s_header.len()].copy_from_slice(&s_header);
        std::fs::write(path, &bytes).expect("writes bytes");

        let err = FileIdFile::try_open(path).await.expect_err("corrupt header");
        assert!(matches!(
            err.downcast_ref::<FileIdFileError>(),
            Some(FileIdFileError::Truncated {
                expected: u64::MAX,
                ..
            })
        ));
        std::fs::remove_file(path).expect("cleanup");
    }
}
