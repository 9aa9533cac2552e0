//! Local storage for the client identity and the cached user token.
//!
//! Both are small JSON files in the user's home directory. The token file is
//! written through a temp file + rename with owner-only permissions.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, instrument};

use crate::error::{AuthError, AuthResult};
use crate::{ClientIdentity, Credential};

/// Client identity file name under the home directory
pub const CLIENT_FILE: &str = ".twitch-search-client.json";

/// Cached token file name under the home directory
pub const TOKEN_FILE: &str = ".twitch-search.json";

/// File permissions for the token file (Unix only): owner read/write.
#[cfg(unix)]
const FILE_MODE: u32 = 0o600;

/// Locations of the client identity file and the cached token file
#[derive(Debug, Clone)]
pub struct CredentialStore {
    identity_path: PathBuf,
    credential_path: PathBuf,
}

impl CredentialStore {
    /// Create new store over explicit file paths
    pub fn new(identity_path: impl Into<PathBuf>, credential_path: impl Into<PathBuf>) -> Self {
        Self {
            identity_path: identity_path.into(),
            credential_path: credential_path.into(),
        }
    }

    /// Store using `~/.twitch-search-client.json` and `~/.twitch-search.json`
    pub fn in_home_dir() -> AuthResult<Self> {
        let home = dirs::home_dir().ok_or(AuthError::HomeDirUnavailable)?;
        Ok(Self::new(home.join(CLIENT_FILE), home.join(TOKEN_FILE)))
    }

    /// Store over the given files, taking missing ones from the home directory.
    ///
    /// The home directory is only looked up when a path is missing.
    pub fn resolve(
        identity_path: Option<PathBuf>,
        credential_path: Option<PathBuf>,
    ) -> AuthResult<Self> {
        if let (Some(identity), Some(credential)) = (&identity_path, &credential_path) {
            return Ok(Self::new(identity, credential));
        }

        let defaults = Self::in_home_dir()?;
        Ok(Self::new(
            identity_path.unwrap_or(defaults.identity_path),
            credential_path.unwrap_or(defaults.credential_path),
        ))
    }

    /// Path of the client identity file
    pub fn identity_path(&self) -> &Path {
        &self.identity_path
    }

    /// Path of the cached token file
    pub fn credential_path(&self) -> &Path {
        &self.credential_path
    }

    /// Load the provisioned client identity
    #[instrument(skip(self), fields(path = %self.identity_path.display()))]
    pub fn load_client_identity(&self) -> AuthResult<ClientIdentity> {
        let path = &self.identity_path;
        let content = fs::read_to_string(path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => AuthError::ConfigMissing { path: path.clone() },
            _ => AuthError::ConfigUnreadable {
                path: path.clone(),
                source: e,
            },
        })?;
        let identity: ClientIdentity =
            serde_json::from_str(&content).map_err(|e| AuthError::ConfigMalformed {
                path: path.clone(),
                source: e,
            })?;
        debug!(client_id = %identity.id, "Loaded client identity");
        Ok(identity)
    }

    /// Load the cached token, `None` if no token has been stored yet
    #[instrument(skip(self), fields(path = %self.credential_path.display()))]
    pub fn load_credential(&self) -> AuthResult<Option<Credential>> {
        let path = &self.credential_path;
        let content = match fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("No cached token");
                return Ok(None);
            }
            Err(e) => {
                return Err(AuthError::StorageCorrupt {
                    path: path.clone(),
                    reason: e.to_string(),
                });
            }
        };
        let credential = serde_json::from_str(&content).map_err(|e| AuthError::StorageCorrupt {
            path: path.clone(),
            reason: e.to_string(),
        })?;
        debug!("Loaded cached token");
        Ok(Some(credential))
    }

    /// Persist the token, replacing any previous one
    #[instrument(skip(self, credential), fields(path = %self.credential_path.display()))]
    pub fn save_credential(&self, credential: &Credential) -> AuthResult<()> {
        let content = serde_json::to_string_pretty(credential).map_err(|e| {
            AuthError::StorageWriteError {
                path: self.credential_path.clone(),
                source: io::Error::other(e),
            }
        })?;

        let temp_path = self.temp_path();
        if let Err(e) = write_private(&temp_path, content.as_bytes()) {
            let _ = fs::remove_file(&temp_path);
            return Err(AuthError::StorageWriteError {
                path: temp_path,
                source: e,
            });
        }

        if let Err(e) = fs::rename(&temp_path, &self.credential_path) {
            let _ = fs::remove_file(&temp_path);
            return Err(AuthError::StorageWriteError {
                path: self.credential_path.clone(),
                source: e,
            });
        }

        debug!("Stored token");
        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .credential_path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.credential_path.with_file_name(name)
    }
}

/// Create `path` readable only by its owner and fill it with `content`.
fn write_private(path: &Path, content: &[u8]) -> io::Result<()> {
    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);

    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(FILE_MODE);
    }

    let mut file = options.open(path)?;

    // The mode above only applies to newly created files
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(fs::Permissions::from_mode(FILE_MODE))?;
    }

    file.write_all(content)?;
    file.sync_all()
}
