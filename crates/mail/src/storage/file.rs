//! Token file storage
//!
//! The credential is kept as a single JSON object. Writes go to a sibling
//! temp file which is then renamed over the target, so a crash never leaves
//! a half-written token behind. On Unix the file is owner read/write only.

use log::{debug, warn};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use super::CredentialStore;
use crate::error::{DigestError, Result};
use crate::models::Credential;

pub struct FileCredentialStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileCredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl CredentialStore for FileCredentialStore {
    fn load(&self) -> Result<Option<Credential>> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(DigestError::Configuration(format!(
                    "failed to read token file {}: {}",
                    self.path.display(),
                    e
                )));
            }
        };

        match serde_json::from_str::<Credential>(&content) {
            Ok(credential) => {
                debug!(
                    "Loaded credential from {} (expires_at={:?})",
                    self.path.display(),
                    credential.expires_at
                );
                Ok(Some(credential))
            }
            Err(e) => {
                // An unreadable token is as good as none; consent will replace it
                warn!("Ignoring unreadable token file {}: {}", self.path.display(), e);
                Ok(None)
            }
        }
    }

    fn save(&self, credential: &Credential) -> Result<()> {
        let _guard = self.write_lock.lock().map_err(|_| {
            DigestError::Configuration("token file lock poisoned".to_string())
        })?;

        config::ensure_parent_dir(&self.path)?;

        let content = serde_json::to_string_pretty(credential).map_err(|e| {
            DigestError::Configuration(format!("failed to serialize credential: {}", e))
        })?;

        let temp = self.temp_path();
        let write_err = |e: std::io::Error| {
            DigestError::Configuration(format!(
                "failed to write token file {}: {}",
                self.path.display(),
                e
            ))
        };

        fs::write(&temp, content).map_err(write_err)?;
        restrict_permissions(&temp).map_err(write_err)?;
        fs::rename(&temp, &self.path).map_err(write_err)?;

        debug!("Saved credential to {}", self.path.display());
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        let _guard = self.write_lock.lock().map_err(|_| {
            DigestError::Configuration("token file lock poisoned".to_string())
        })?;

        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(DigestError::Configuration(format!(
                "failed to delete token file {}: {}",
                self.path.display(),
                e
            ))),
        }
    }
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600))
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> std::io::Result<()> {
    Ok(())
}
