//! Credential persistence.
//!
//! The store is plain key-value storage: the access credential, the
//! refresh credential, cached session metadata and the organization
//! context. It holds the only copy of each value; readers receive owned
//! clones.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use strum::IntoEnumIterator;
use tracing::debug;

use crate::error::SessionError;

/// Logical keys of the credential store.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    strum::Display,
    strum::AsRefStr,
    strum::EnumIter,
    strum::EnumString,
)]
#[strum(serialize_all = "kebab-case")]
pub enum StoreKey {
    AccessToken,
    RefreshToken,
    UserData,
    OrganizationContext,
}

/// Access and refresh credential issued together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialPair {
    pub access_token: String,
    pub refresh_token: Option<String>,
}

/// Key-value credential storage.
pub trait CredentialStore: Send + Sync + std::fmt::Debug {
    fn get(&self, key: StoreKey) -> Result<Option<String>, SessionError>;

    fn set(&self, key: StoreKey, value: &str) -> Result<(), SessionError>;

    fn clear(&self, key: StoreKey) -> Result<(), SessionError>;

    /// Clear every key. Continues past individual failures and reports the
    /// first one.
    fn clear_all(&self) -> Result<(), SessionError> {
        let mut first_err = None;
        for key in StoreKey::iter() {
            if let Err(e) = self.clear(key) {
                first_err.get_or_insert(e);
            }
        }
        first_err.map_or(Ok(()), Err)
    }

    /// Store a credential pair. A pair without a refresh token leaves the
    /// stored refresh token untouched.
    fn store_pair(&self, pair: &CredentialPair) -> Result<(), SessionError> {
        self.set(StoreKey::AccessToken, &pair.access_token)?;
        if let Some(refresh) = &pair.refresh_token {
            self.set(StoreKey::RefreshToken, refresh)?;
        }
        Ok(())
    }

    /// Load the current pair, if an access token is stored.
    fn load_pair(&self) -> Result<Option<CredentialPair>, SessionError> {
        let Some(access_token) = self.get(StoreKey::AccessToken)? else {
            return Ok(None);
        };
        Ok(Some(CredentialPair {
            access_token,
            refresh_token: self.get(StoreKey::RefreshToken)?,
        }))
    }
}

/// In-memory store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: RwLock<BTreeMap<StoreKey, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether no key holds a value.
    pub fn is_empty(&self) -> bool {
        self.values.read().is_empty()
    }
}

impl CredentialStore for MemoryStore {
    fn get(&self, key: StoreKey) -> Result<Option<String>, SessionError> {
        Ok(self.values.read().get(&key).cloned())
    }

    fn set(&self, key: StoreKey, value: &str) -> Result<(), SessionError> {
        self.values.write().insert(key, value.to_owned());
        Ok(())
    }

    fn clear(&self, key: StoreKey) -> Result<(), SessionError> {
        self.values.write().remove(&key);
        Ok(())
    }
}

/// Store backed by a JSON document on disk.
///
/// Values survive process restarts. Every write rewrites the whole
/// document through a temporary file and a rename.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    values: RwLock<BTreeMap<String, String>>,
}

impl FileStore {
    /// Open the store at `path`. A missing file is an empty store.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, SessionError> {
        let path = path.into();
        let values = match fs::read(&path) {
            Ok(bytes) if bytes.is_empty() => BTreeMap::new(),
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| {
                SessionError::Storage(format!("corrupt store {}: {e}", path.display()))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => {
                return Err(SessionError::Storage(format!(
                    "failed to read {}: {e}",
                    path.display()
                )));
            }
        };
        debug!(path = %path.display(), entries = values.len(), "Opened credential store");
        Ok(Self {
            path,
            values: RwLock::new(values),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, values: &BTreeMap<String, String>) -> Result<(), SessionError> {
        let storage_err =
            |e: std::io::Error| SessionError::Storage(format!("{}: {e}", self.path.display()));

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(storage_err)?;
        }
        let bytes = serde_json::to_vec_pretty(values)
            .map_err(|e| SessionError::Storage(e.to_string()))?;
        let tmp = self.path.with_extension("tmp");
        write_private(&tmp, &bytes).map_err(storage_err)?;
        fs::rename(&tmp, &self.path).map_err(storage_err)
    }
}

/// Write `bytes` to `path`, readable by the owner only on Unix.
fn write_private(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    std::os::unix::fs::OpenOptionsExt::mode(&mut options, 0o600);

    let mut file = options.open(path)?;
    // `mode` only applies on creation; tighten a leftover file too.
    #[cfg(unix)]
    file.set_permissions(<fs::Permissions as std::os::unix::fs::PermissionsExt>::from_mode(0o600))?;
    file.write_all(bytes)?;
    file.sync_all()
}

impl CredentialStore for FileStore {
    fn get(&self, key: StoreKey) -> Result<Option<String>, SessionError> {
        Ok(self.values.read().get(key.as_ref()).cloned())
    }

    fn set(&self, key: StoreKey, value: &str) -> Result<(), SessionError> {
        let mut values = self.values.write();
        values.insert(key.to_string(), value.to_owned());
        self.persist(&values)
    }

    fn clear(&self, key: StoreKey) -> Result<(), SessionError> {
        let mut values = self.values.write();
        if values.remove(key.as_ref()).is_some() {
            self.persist(&values)?;
        }
        Ok(())
    }
}
