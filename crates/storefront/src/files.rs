//! On-disk storage for product archives.
//!
//! Files live flat inside one directory. Stored names are plain file names;
//! anything that could escape the directory is refused.

use std::path::{Path, PathBuf};

use rand::Rng;
use thiserror::Error;
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;

/// Errors from the file store.
#[derive(Debug, Error)]
pub enum FileStoreError {
    /// The stored name is not a plain file name.
    #[error("invalid stored file name: {0}")]
    InvalidName(String),

    /// No file with that name exists.
    #[error("file not found: {0}")]
    Missing(String),

    /// Filesystem error.
    #[error("file store I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Directory of uploaded product archives.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the directory if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns `FileStoreError::Io` if the directory cannot be created.
    pub async fn ensure_root(&self) -> Result<(), FileStoreError> {
        fs::create_dir_all(&self.root).await?;
        Ok(())
    }

    fn resolve(&self, name: &str) -> Result<PathBuf, FileStoreError> {
        let valid = !name.is_empty()
            && name != "."
            && !name.contains("..")
            && !name.contains(['/', '\\', '\0']);
        if !valid {
            return Err(FileStoreError::InvalidName(name.to_owned()));
        }
        Ok(self.root.join(name))
    }

    /// Open a stored file for reading, returning it with its length.
    ///
    /// # Errors
    ///
    /// Returns `FileStoreError::InvalidName` for unsafe names and
    /// `FileStoreError::Missing` when nothing regular exists under the name.
    pub async fn open(&self, name: &str) -> Result<(File, u64), FileStoreError> {
        let path = self.resolve(name)?;
        let file = match File::open(&path).await {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(FileStoreError::Missing(name.to_owned()));
            }
            Err(e) => return Err(e.into()),
        };
        let metadata = file.metadata().await?;
        if !metadata.is_file() {
            return Err(FileStoreError::Missing(name.to_owned()));
        }
        Ok((file, metadata.len()))
    }

    /// Create a new file for writing. Fails if the name is taken.
    ///
    /// # Errors
    ///
    /// Returns `FileStoreError::InvalidName` for unsafe names and
    /// `FileStoreError::Io` if the file cannot be created.
    pub async fn create(&self, name: &str) -> Result<File, FileStoreError> {
        let path = self.resolve(name)?;
        let file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .await?;
        Ok(file)
    }

    /// Write a whole file in one go.
    ///
    /// # Errors
    ///
    /// Same as [`FileStore::create`].
    pub async fn write(&self, name: &str, contents: &[u8]) -> Result<(), FileStoreError> {
        let mut file = self.create(name).await?;
        file.write_all(contents).await?;
        file.flush().await?;
        Ok(())
    }

    /// Delete a stored file. Missing files are not an error.
    ///
    /// # Errors
    ///
    /// Returns `FileStoreError::Io` if removal fails for another reason.
    pub async fn remove(&self, name: &str) -> Result<(), FileStoreError> {
        let path = self.resolve(name)?;
        match fs::remove_file(path).await {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }
}

/// Fresh stored name for an uploaded archive: `<unix-millis>-<random>.zip`.
#[must_use]
pub fn generate_archive_name() -> String {
    let millis = chrono::Utc::now().timestamp_millis();
    let suffix: u32 = rand::rng().random_range(100_000_000..1_000_000_000);
    format!("{millis}-{suffix}.zip")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use tokio::io::AsyncReadExt;

    use super::*;

    #[tokio::test]
    async fn test_write_then_open() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());
        store.write("a.zip", b"PK\x03\x04data").await.unwrap();

        let (mut file, len) = store.open("a.zip").await.unwrap();
        assert_eq!(len, 8);
        let mut contents = Vec::new();
        file.read_to_end(&mut contents).await.unwrap();
        assert_eq!(contents, b"PK\x03\x04data");
    }

    #[tokio::test]
    async fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());
        assert!(matches!(
            store.open("absent.zip").await,
            Err(FileStoreError::Missing(_))
        ));
    }

    #[tokio::test]
    async fn test_rejects_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("uploads"));
        store.ensure_root().await.unwrap();
        tokio::fs::write(dir.path().join("secret.zip"), b"x")
            .await
            .unwrap();

        for name in ["../secret.zip", "sub/secret.zip", "..", "", "a\\b.zip"] {
            assert!(
                matches!(store.open(name).await, Err(FileStoreError::InvalidName(_))),
                "{name:?} should be rejected"
            );
        }
    }

    #[tokio::test]
    async fn test_directory_is_not_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());
        tokio::fs::create_dir(dir.path().join("nested.zip"))
            .await
            .unwrap();
        assert!(matches!(
            store.open("nested.zip").await,
            Err(FileStoreError::Missing(_))
        ));
    }

    #[tokio::test]
    async fn test_create_refuses_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());
        store.write("a.zip", b"one").await.unwrap();
        assert!(store.write("a.zip", b"two").await.is_err());
        store.remove("a.zip").await.unwrap();
        store.remove("a.zip").await.unwrap();
    }

    #[test]
    fn test_generated_names() {
        let name = generate_archive_name();
        let (millis, rest) = name.split_once('-').unwrap();
        assert!(millis.parse::<u128>().is_ok());
        assert!(rest.ends_with(".zip"));
        assert_ne!(generate_archive_name(), generate_archive_name());
    }
}
