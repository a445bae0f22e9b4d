use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{RepoError, RepoResult};

/// Version field of every commit object.
pub const COMMIT_VERSION: u64 = 3;

/// Schema version stamped into the `config` table.
pub const DB_VERSION: i64 = 1;

/// Repository engine configuration.
///
/// Every field has a default, so a TOML file only needs the keys it changes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepoConfig {
    pub data_dir: PathBuf,
    pub db_path: PathBuf,
    /// Capacity of the in-process replication broadcast channel.
    pub firehose_queue_size: usize,
    /// Size of each stored blob chunk, in bytes.
    pub blob_part_size: usize,
}

impl Default for RepoConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            db_path: PathBuf::from("./data/quire.sqlite3"),
            firehose_queue_size: 100,
            blob_part_size: 64 * 1024,
        }
    }
}

impl RepoConfig {
    /// Read and validate a TOML configuration file.
    pub fn load(path: &Path) -> RepoResult<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| RepoError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    /// Parse and validate TOML text.
    pub fn from_toml_str(text: &str) -> RepoResult<Self> {
        let config: Self = toml::from_str(text).map_err(|e| RepoError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> RepoResult<()> {
        if self.firehose_queue_size == 0 {
            return Err(RepoError::Config("firehose_queue_size must be positive".into()));
        }
        if self.blob_part_size == 0 {
            return Err(RepoError::Config("blob_part_size must be positive".into()));
        }
        Ok(())
    }
}
