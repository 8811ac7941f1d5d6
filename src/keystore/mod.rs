//! Local persistence for minted credential keys.
//!
//! Keys land in a directory readable only by the owning user; a manifest in
//! the same directory records one JSON line per artifact, appended under an
//! exclusive lock.

pub mod lock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::Result;

use lock::ManifestLock;

const MANIFEST_FILE: &str = "manifest.jsonl";
const MANIFEST_LOCK_FILE: &str = "manifest.lock";

/// A credential key persisted for one successfully provisioned unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialArtifact {
    pub owner_unit_id: String,
    pub file_path: PathBuf,
    pub created_at: DateTime<Utc>,
}

pub struct KeyStore {
    dir: PathBuf,
}

impl KeyStore {
    /// Open the store, creating the directory owner-only if absent.
    pub fn open(dir: &Path) -> Result<Self> {
        if !dir.exists() {
            create_private_dir(dir)?;
        }
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write `key_bytes` for `unit_id` and record it in the manifest.
    ///
    /// The file is named from the unit id plus a timestamp and restricted to
    /// owner read/write before the artifact is returned.
    pub fn save(&self, unit_id: &str, key_bytes: &[u8]) -> Result<CredentialArtifact> {
        let created_at = Utc::now();
        let file_name = format!("{}-{}.json", unit_id, created_at.format("%Y%m%d%H%M%S"));
        let file_path = self.dir.join(file_name);

        let mut file = create_private_file(&file_path)?;
        file.write_all(key_bytes)?;
        file.sync_all()?;
        drop(file);

        let artifact = CredentialArtifact {
            owner_unit_id: unit_id.to_string(),
            file_path,
            created_at,
        };
        self.append_manifest(&artifact)?;

        tracing::info!(
            "stored key for {} at {}",
            unit_id,
            artifact.file_path.display()
        );
        Ok(artifact)
    }

    fn append_manifest(&self, artifact: &CredentialArtifact) -> Result<()> {
        let _guard = ManifestLock::acquire(self.dir.join(MANIFEST_LOCK_FILE))?;
        let mut manifest = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.dir.join(MANIFEST_FILE))?;
        let line = serde_json::to_string(artifact)?;
        writeln!(manifest, "{line}")?;
        Ok(())
    }
}

#[cfg(unix)]
fn create_private_dir(dir: &Path) -> Result<()> {
    use std::os::unix::fs::DirBuilderExt;
    fs::DirBuilder::new().recursive(true).mode(0o700).create(dir)?;
    Ok(())
}

#[cfg(not(unix))]
fn create_private_dir(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir)?;
    Ok(())
}

/// Create the key file owner-read/write from the first byte; never widen
/// permissions after the fact.
#[cfg(unix)]
fn create_private_file(path: &Path) -> Result<fs::File> {
    use std::os::unix::fs::OpenOptionsExt;
    let file = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .mode(0o600)
        .open(path)?;
    Ok(file)
}

#[cfg(not(unix))]
fn create_private_file(path: &Path) -> Result<fs::File> {
    let file = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)?;
    Ok(file)
}
