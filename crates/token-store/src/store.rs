//! Configuration file storage
//!
//! A single JSON object holding client credentials, endpoints and the current
//! token. Every save is a full overwrite through temp file + rename, so the
//! file on disk is always the last complete write. The file is created 0600
//! (owner read/write only) since it contains a client secret and tokens.
//!
//! Single process, single user: there is no file locking, and two concurrent
//! invocations saving at once lose one of the updates.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use common::Secret;
use oauth_flow::{Endpoints, OAuthClientConfig, Token};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::error::{Error, Result};

/// Everything needed to rebuild a token source on a later run.
///
/// Scopes and the redirect URL are not persisted; they only matter while
/// authorizing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedConfiguration {
    pub client_id: String,
    pub client_secret: Secret<String>,
    pub endpoints: Endpoints,
    pub token: Token,
}

impl PersistedConfiguration {
    pub fn new(config: &OAuthClientConfig, token: Token) -> Self {
        Self {
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            endpoints: config.endpoints.clone(),
            token,
        }
    }

    /// Client configuration for refresh-token exchanges.
    pub fn oauth_config(&self) -> OAuthClientConfig {
        OAuthClientConfig::new(
            self.client_id.clone(),
            self.client_secret.clone(),
            self.endpoints.clone(),
        )
    }
}

/// Destination for the configuration at the end of a run.
///
/// Uses `Pin<Box<dyn Future>>` return types for dyn-compatibility.
pub trait ConfigSink: Send + Sync {
    fn persist<'a>(
        &'a self,
        config: &'a PersistedConfiguration,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;
}

/// The configuration dotfile.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the configuration file.
    ///
    /// A missing file is `Ok(None)`: nobody has authenticated yet. A file
    /// that exists but cannot be read or parsed is `Error::ConfigCorrupt`.
    pub async fn load(&self) -> Result<Option<PersistedConfiguration>> {
        let metadata = match tokio::fs::metadata(&self.path).await {
            Ok(m) => m,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %self.path.display(), "configuration file not found");
                return Ok(None);
            }
            Err(e) => {
                return Err(Error::ConfigCorrupt(format!(
                    "reading {}: {e}",
                    self.path.display()
                )));
            }
        };
        if metadata.is_dir() {
            return Err(Error::ConfigCorrupt(format!(
                "{} is a directory",
                self.path.display()
            )));
        }

        let contents = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| Error::ConfigCorrupt(format!("reading {}: {e}", self.path.display())))?;
        let config: PersistedConfiguration = serde_json::from_str(&contents)
            .map_err(|e| Error::ConfigCorrupt(format!("parsing {}: {e}", self.path.display())))?;

        info!(path = %self.path.display(), client_id = %config.client_id, "loaded configuration");
        Ok(Some(config))
    }

    /// Overwrite the configuration file with `config`.
    pub async fn save(&self, config: &PersistedConfiguration) -> Result<()> {
        write_atomic(&self.path, config).await
    }
}

impl ConfigSink for ConfigStore {
    fn persist<'a>(
        &'a self,
        config: &'a PersistedConfiguration,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(self.save(config))
    }
}

/// Write the configuration atomically.
///
/// Writes a temporary file next to the target, then renames it over the
/// target. On any failure the temporary file is removed and the previous
/// configuration is left as it was.
async fn write_atomic(path: &Path, config: &PersistedConfiguration) -> Result<()> {
    let json = serde_json::to_string_pretty(config)
        .map_err(|e| Error::Save(format!("serializing configuration: {e}")))?;

    let file_name = path
        .file_name()
        .ok_or_else(|| Error::Save(format!("{} has no file name", path.display())))?;
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let tmp_path = dir.join(format!(
        "{}.tmp.{}",
        file_name.to_string_lossy(),
        std::process::id()
    ));

    if let Err(e) = write_private(&tmp_path, json.as_bytes()).await {
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(e);
    }

    if let Err(e) = tokio::fs::rename(&tmp_path, path).await {
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(Error::Save(format!(
            "replacing {}: {e}",
            path.display()
        )));
    }

    debug!(path = %path.display(), "persisted configuration");
    Ok(())
}

/// Create `path` readable by the owner only and flush `bytes` to disk.
async fn write_private(path: &Path, bytes: &[u8]) -> Result<()> {
    let mut options = tokio::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    options.mode(0o600);

    let mut file = options
        .open(path)
        .await
        .map_err(|e| Error::Save(format!("creating {}: {e}", path.display())))?;

    // mode() only applies on creation; a stale temp file keeps its old mode
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        tokio::fs::set_permissions(path, perms)
            .await
            .map_err(|e| Error::Save(format!("setting permissions on {}: {e}", path.display())))?;
    }

    file.write_all(bytes)
        .await
        .map_err(|e| Error::Save(format!("writing {}: {e}", path.display())))?;
    file.sync_all()
        .await
        .map_err(|e| Error::Save(format!("syncing {}: {e}", path.display())))?;
    Ok(())
}
