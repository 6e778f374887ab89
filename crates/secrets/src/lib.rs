use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

const SCHEMA_VERSION: u32 = 1;

pub const SESSION_NAMESPACE: &str = "session";
pub const DEFAULT_TOKEN_KEY: &str = "authToken";

#[derive(Debug, Error)]
pub enum SecretError {
    #[error("secrets file schema {found} is newer than supported schema {supported}")]
    UnsupportedSchema { found: u32, supported: u32 },
    #[error("failed to parse {path}")]
    Corrupt {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Flat `namespace:key -> value` document persisted as JSON.
#[derive(Debug, Clone)]
pub struct SecretStore {
    root: PathBuf,
}

#[derive(Debug, Serialize, Deserialize)]
struct SecretsFile {
    schema_version: u32,
    values: BTreeMap<String, String>,
}

impl SecretStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn put(
        &self,
        namespace: impl AsRef<str>,
        key: impl AsRef<str>,
        value: impl Into<String>,
    ) -> Result<()> {
        let (mut values, _) = self.load_values_for_write()?;
        values.insert(slot(namespace.as_ref(), key.as_ref()), value.into());
        self.save_values(&values)
    }

    pub fn get(&self, namespace: impl AsRef<str>, key: impl AsRef<str>) -> Result<Option<String>> {
        let values = self.load_values()?;
        Ok(values
            .get(&slot(namespace.as_ref(), key.as_ref()))
            .cloned())
    }

    /// Removing a missing slot is a no-op and never touches the disk.
    pub fn remove(&self, namespace: impl AsRef<str>, key: impl AsRef<str>) -> Result<()> {
        if !self.path().exists() {
            return Ok(());
        }
        let (mut values, reset) = self.load_values_for_write()?;
        if values
            .remove(&slot(namespace.as_ref(), key.as_ref()))
            .is_none()
            && !reset
        {
            return Ok(());
        }
        self.save_values(&values)
    }

    pub fn path(&self) -> PathBuf {
        self.root.join("session.json")
    }

    fn load_values(&self) -> Result<BTreeMap<String, String>> {
        let path = self.path();
        if !path.exists() {
            return Ok(BTreeMap::new());
        }

        let text = fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let doc: SecretsFile =
            serde_json::from_str(&text).map_err(|source| SecretError::Corrupt {
                path: path.display().to_string(),
                source,
            })?;
        if doc.schema_version > SCHEMA_VERSION {
            return Err(SecretError::UnsupportedSchema {
                found: doc.schema_version,
                supported: SCHEMA_VERSION,
            }
            .into());
        }
        Ok(doc.values)
    }

    /// A document that no longer parses is replaced on the next write. A
    /// newer schema is still refused.
    fn load_values_for_write(&self) -> Result<(BTreeMap<String, String>, bool)> {
        match self.load_values() {
            Ok(values) => Ok((values, false)),
            Err(err)
                if matches!(
                    err.downcast_ref::<SecretError>(),
                    Some(SecretError::Corrupt { .. })
                ) =>
            {
                warn!(error = %err, "discarding unreadable secrets file");
                Ok((BTreeMap::new(), true))
            }
            Err(err) => Err(err),
        }
    }

    fn save_values(&self, values: &BTreeMap<String, String>) -> Result<()> {
        fs::create_dir_all(&self.root)
            .with_context(|| format!("failed to create {}", self.root.display()))?;

        let doc = SecretsFile {
            schema_version: SCHEMA_VERSION,
            values: values.clone(),
        };
        let text = serde_json::to_string_pretty(&doc)?;
        fs::write(self.path(), text)
            .with_context(|| format!("failed to write {}", self.path().display()))?;
        debug!(slots = values.len(), "secrets persisted");
        Ok(())
    }
}

fn slot(namespace: &str, key: &str) -> String {
    format!("{namespace}:{key}")
}

/// The single persisted bearer-token slot.
#[derive(Debug, Clone)]
pub struct SessionTokenStore {
    secrets: SecretStore,
    key: String,
}

impl SessionTokenStore {
    pub fn new(secrets: SecretStore, key: impl Into<String>) -> Self {
        Self {
            secrets,
            key: key.into(),
        }
    }

    pub fn with_default_key(secrets: SecretStore) -> Self {
        Self::new(secrets, DEFAULT_TOKEN_KEY)
    }

    /// Blank values are reported as absent.
    pub fn get(&self) -> Result<Option<String>> {
        let token = self.secrets.get(SESSION_NAMESPACE, &self.key)?;
        Ok(token.filter(|value| !value.trim().is_empty()))
    }

    pub fn set(&self, token: &str) -> Result<()> {
        if token.trim().is_empty() {
            bail!("refusing to persist an empty session token");
        }
        self.secrets.put(SESSION_NAMESPACE, &self.key, token)?;
        info!(key = %self.key, "session token stored");
        Ok(())
    }

    pub fn clear(&self) -> Result<()> {
        self.secrets.remove(SESSION_NAMESPACE, &self.key)?;
        info!(key = %self.key, "session token cleared");
        Ok(())
    }
}

pub fn default_secret_dir_from(base_dir: &Path) -> PathBuf {
    base_dir.join("secrets")
}
