// src/artifacts.rs

use regex::Regex;
use std::io;
use std::path::PathBuf;
use std::sync::LazyLock;
use thiserror::Error;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

/// Suffixed names tried before giving up on a taken artifact name.
const MAX_NAME_ATTEMPTS: usize = 100;

static SAFE_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_\-]+(\.[A-Za-z0-9]+)?$").expect("valid regex"));

#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("File not found")]
    NotFound,

    #[error("Invalid file name")]
    InvalidName,

    #[error("no free artifact name for {0}")]
    NameTaken(String),

    #[error("artifact I/O failed: {0}")]
    Io(#[from] io::Error),
}

/// Directory of generated workbooks served by `GET /download/{filename}`.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    dir: PathBuf,
}

impl ArtifactStore {
    pub async fn open(dir: PathBuf) -> Result<Self, ArtifactError> {
        tokio::fs::create_dir_all(&dir).await?;
        info!(dir = %dir.display(), "Artifact directory ready");
        Ok(Self { dir })
    }

    fn path_for(&self, name: &str) -> Result<PathBuf, ArtifactError> {
        if !SAFE_NAME.is_match(name) {
            return Err(ArtifactError::InvalidName);
        }
        Ok(self.dir.join(name))
    }

    /// Write `bytes` under `name`, never replacing an existing artifact.
    /// A taken name gets a `_1`, `_2`, ... suffix before the extension.
    /// Returns the name actually used.
    pub async fn save(&self, name: &str, bytes: &[u8]) -> Result<String, ArtifactError> {
        let (stem, ext) = match name.rsplit_once('.') {
            Some((stem, ext)) => (stem, Some(ext)),
            None => (name, None),
        };

        for attempt in 0..MAX_NAME_ATTEMPTS {
            let candidate = match (attempt, ext) {
                (0, _) => name.to_string(),
                (n, Some(ext)) => format!("{stem}_{n}.{ext}"),
                (n, None) => format!("{stem}_{n}"),
            };
            let path = self.path_for(&candidate)?;

            let mut file = match OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await
            {
                Ok(file) => file,
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    debug!(name = %candidate, "Artifact name taken");
                    continue;
                }
                Err(e) => return Err(e.into()),
            };
            file.write_all(bytes).await?;
            file.flush().await?;

            info!(path = %path.display(), bytes = bytes.len(), "Artifact written");
            return Ok(candidate);
        }

        Err(ArtifactError::NameTaken(name.to_string()))
    }

    pub async fn load(&self, name: &str) -> Result<Vec<u8>, ArtifactError> {
        let path = self.path_for(name)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(ArtifactError::NotFound),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::open(dir.path().join("outputs")).await.unwrap();
        let name = store
            .save("invoice_data_20250101_120000.xlsx", b"PK")
            .await
            .unwrap();
        assert_eq!(name, "invoice_data_20250101_120000.xlsx");
        assert_eq!(
            store.load("invoice_data_20250101_120000.xlsx").await.unwrap(),
            b"PK"
        );
    }

    #[tokio::test]
    async fn test_taken_name_is_never_overwritten() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::open(dir.path().to_path_buf()).await.unwrap();
        let name = "invoice_data_20250101_120000.xlsx";

        let first = store.save(name, b"first").await.unwrap();
        let second = store.save(name, b"second").await.unwrap();
        let third = store.save(name, b"third").await.unwrap();

        assert_eq!(first, name);
        assert_eq!(second, "invoice_data_20250101_120000_1.xlsx");
        assert_eq!(third, "invoice_data_20250101_120000_2.xlsx");
        assert_eq!(store.load(&first).await.unwrap(), b"first");
        assert_eq!(store.load(&second).await.unwrap(), b"second");
        assert_eq!(store.load(&third).await.unwrap(), b"third");
    }

    #[tokio::test]
    async fn test_unknown_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::open(dir.path().to_path_buf()).await.unwrap();
        assert!(matches!(
            store.load("missing.xlsx").await,
            Err(ArtifactError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_traversal_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::open(dir.path().to_path_buf()).await.unwrap();
        for name in ["../secret.xlsx", "a/b.xlsx", "..", ""] {
            assert!(matches!(
                store.load(name).await,
                Err(ArtifactError::InvalidName)
            ));
        }
    }
}
