//! Durable record of generated keys
//!
//! Every launch writes its generated secrets before anything that could
//! strand funds is submitted. Each file is a JSON array of strings; saving
//! appends, so the last element is always the newest entry. A file is
//! replaced by writing a synced temporary next to it and renaming it over
//! the original, so an interrupted write never loses earlier entries.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::errors::{LaunchError, LaunchResult};

/// The files a launch persists
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyFile {
    /// Intermediary and buyer secrets
    Wallets,
    /// Asset keypair secret
    MintSecret,
    /// Asset address
    MintAddress,
    /// Lookup registry address
    Registry,
}

impl KeyFile {
    pub fn file_name(&self) -> &'static str {
        match self {
            KeyFile::Wallets => "data.json",
            KeyFile::MintSecret => "mint.json",
            KeyFile::MintAddress => "pub_mint.json",
            KeyFile::Registry => "lut.json",
        }
    }
}

/// Storage for persisted keys and addresses
#[async_trait]
pub trait KeyStore: Send + Sync {
    /// Append entries to the end of `file`
    async fn append(&self, file: KeyFile, entries: &[&str]) -> LaunchResult<()>;

    /// All entries of `file`, oldest first; empty when the file is missing
    async fn load(&self, file: KeyFile) -> LaunchResult<Vec<String>>;

    /// Newest entry of `file`
    async fn latest(&self, file: KeyFile) -> LaunchResult<Option<String>> {
        Ok(self.load(file).await?.pop())
    }
}

/// JSON files under a data directory
#[derive(Debug, Clone)]
pub struct JsonKeyStore {
    dir: PathBuf,
}

impl JsonKeyStore {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self, file: KeyFile) -> PathBuf {
        self.dir.join(file.file_name())
    }

    fn temp_path(&self, file: KeyFile) -> PathBuf {
        self.dir.join(format!("{}.tmp", file.file_name()))
    }
}

/// Write `contents` to `temp`, sync it, then rename it over `path`
async fn replace_file(temp: &Path, path: &Path, contents: &[u8]) -> LaunchResult<()> {
    let mut out = tokio::fs::File::create(temp)
        .await
        .map_err(|e| persistence_err(temp, e))?;
    out.write_all(contents)
        .await
        .map_err(|e| persistence_err(temp, e))?;
    out.sync_all().await.map_err(|e| persistence_err(temp, e))?;
    drop(out);

    tokio::fs::rename(temp, path)
        .await
        .map_err(|e| persistence_err(path, e))
}

#[async_trait]
impl KeyStore for JsonKeyStore {
    async fn append(&self, file: KeyFile, entries: &[&str]) -> LaunchResult<()> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| persistence_err(&self.dir, e))?;

        let mut all = self.load(file).await?;
        all.extend(entries.iter().map(|s| s.to_string()));

        let json = serde_json::to_string_pretty(&all)
            .map_err(|e| LaunchError::Persistence(e.to_string()))?;
        let path = self.path(file);
        replace_file(&self.temp_path(file), &path, json.as_bytes()).await?;

        debug!(file = %path.display(), appended = entries.len(), total = all.len(), "Persisted entries");
        Ok(())
    }

    async fn load(&self, file: KeyFile) -> LaunchResult<Vec<String>> {
        let path = self.path(file);
        match tokio::fs::read_to_string(&path).await {
            Ok(content) if content.trim().is_empty() => Ok(Vec::new()),
            Ok(content) => serde_json::from_str(&content).map_err(|e| {
                LaunchError::Persistence(format!("{}: {}", path.display(), e))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(persistence_err(&path, e)),
        }
    }
}

fn persistence_err(path: &Path, e: std::io::Error) -> LaunchError {
    LaunchError::Persistence(format!("{}: {}", path.display(), e))
}
