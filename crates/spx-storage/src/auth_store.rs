//! File-based persistence for credential records: one `<id>.json` file per
//! credential under a configured directory. This is the on-disk contract the
//! Hot-Reload Watcher diffs against and the Credential Manager loads at
//! startup; it does not touch the sea-orm tables, which remain scoped to
//! the Usage Reporter's aggregation data.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use spx_provider_core::{Auth, AuthStatus, Credential, CredentialId};
use thiserror::Error;
use time::OffsetDateTime;

#[derive(Debug, Error)]
pub enum AuthStoreError {
    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed credential file {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

pub type AuthStoreResult<T> = Result<T, AuthStoreError>;

/// On-disk shape of a single `<id>.json` credential file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthFileRecord {
    pub id: CredentialId,
    pub provider: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
    #[serde(default)]
    pub disabled: bool,
    #[serde(default)]
    pub attributes: HashMap<String, String>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy_url: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
    pub credential: Credential,
}

impl From<AuthFileRecord> for Auth {
    fn from(record: AuthFileRecord) -> Self {
        let mut auth = Auth::new(record.id, record.provider, record.credential);
        auth.label = record.label;
        auth.prefix = record.prefix;
        auth.disabled = record.disabled;
        auth.status = if record.disabled {
            AuthStatus::Disabled
        } else {
            AuthStatus::Active
        };
        auth.attributes = record.attributes;
        auth.metadata = record.metadata;
        auth.proxy_url = record.proxy_url;
        auth.created_at = record.created_at;
        auth.updated_at = record.updated_at;
        auth
    }
}

/// Thin file-system layer over the credential directory. Every operation
/// reads or writes exactly one `<id>.json` file; there is no in-memory
/// cache here, that lives in the Credential Manager.
pub struct AuthFileStore {
    dir: PathBuf,
}

impl AuthFileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, id: CredentialId) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }

    pub async fn ensure_dir(&self) -> AuthStoreResult<()> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|source| AuthStoreError::Io {
                path: self.dir.clone(),
                source,
            })
    }

    pub async fn list(&self) -> AuthStoreResult<Vec<AuthFileRecord>> {
        self.ensure_dir().await?;
        let mut entries = tokio::fs::read_dir(&self.dir)
            .await
            .map_err(|source| AuthStoreError::Io {
                path: self.dir.clone(),
                source,
            })?;
        let mut records = Vec::new();
        loop {
            let entry = entries.next_entry().await.map_err(|source| AuthStoreError::Io {
                path: self.dir.clone(),
                source,
            })?;
            let Some(entry) = entry else { break };
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            records.push(self.read_path(&path).await?);
        }
        records.sort_by_key(|r| r.id);
        Ok(records)
    }

    pub async fn read(&self, id: CredentialId) -> AuthStoreResult<Option<AuthFileRecord>> {
        let path = self.path_for(id);
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(self.read_path(&path).await?))
    }

    async fn read_path(&self, path: &Path) -> AuthStoreResult<AuthFileRecord> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|source| AuthStoreError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        serde_json::from_slice(&bytes).map_err(|source| AuthStoreError::Decode {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Writes a record, preserving the existing file's `created_at` if one
    /// is already on disk under the same id (in-place Modify contract).
    pub async fn write(&self, mut record: AuthFileRecord) -> AuthStoreResult<()> {
        self.ensure_dir().await?;
        let path = self.path_for(record.id);
        if let Some(existing) = self.read(record.id).await? {
            record.created_at = existing.created_at;
        }
        record.updated_at = OffsetDateTime::now_utc();
        let bytes = serde_json::to_vec_pretty(&record).map_err(|source| AuthStoreError::Decode {
            path: path.clone(),
            source,
        })?;
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|source| AuthStoreError::Io { path, source })
    }

    pub async fn delete(&self, id: CredentialId) -> AuthStoreResult<()> {
        let path = self.path_for(id);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(source) if source.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(AuthStoreError::Io { path, source }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spx_provider_core::credential::ApiKeyCredential;

    fn sample(id: CredentialId) -> AuthFileRecord {
        let now = OffsetDateTime::now_utc();
        AuthFileRecord {
            id,
            provider: "openai".to_string(),
            label: Some("primary".to_string()),
            prefix: None,
            disabled: false,
            attributes: HashMap::new(),
            metadata: HashMap::new(),
            proxy_url: None,
            created_at: now,
            updated_at: now,
            credential: Credential::OpenAI(ApiKeyCredential {
                api_key: "sk-test".to_string(),
            }),
        }
    }

    #[tokio::test]
    async fn write_then_read_round_trips() {
        let tmp = tempfile::tempdir().unwrap();
        let store = AuthFileStore::new(tmp.path());
        store.write(sample(1)).await.unwrap();
        let loaded = store.read(1).await.unwrap().unwrap();
        assert_eq!(loaded.provider, "openai");
        assert_eq!(loaded.label.as_deref(), Some("primary"));
    }

    #[tokio::test]
    async fn modify_preserves_created_at() {
        let tmp = tempfile::tempdir().unwrap();
        let store = AuthFileStore::new(tmp.path());
        let mut record = sample(2);
        store.write(record.clone()).await.unwrap();
        let first = store.read(2).await.unwrap().unwrap();

        record.label = Some("renamed".to_string());
        record.created_at = OffsetDateTime::now_utc() + time::Duration::days(1);
        store.write(record).await.unwrap();
        let second = store.read(2).await.unwrap().unwrap();

        assert_eq!(first.created_at, second.created_at);
        assert_eq!(second.label.as_deref(), Some("renamed"));
    }

    #[tokio::test]
    async fn delete_missing_file_is_ok() {
        let tmp = tempfile::tempdir().unwrap();
        let store = AuthFileStore::new(tmp.path());
        store.delete(999).await.unwrap();
    }

    #[tokio::test]
    async fn list_sorts_by_id() {
        let tmp = tempfile::tempdir().unwrap();
        let store = AuthFileStore::new(tmp.path());
        store.write(sample(5)).await.unwrap();
        store.write(sample(1)).await.unwrap();
        let all = store.list().await.unwrap();
        assert_eq!(all.iter().map(|r| r.id).collect::<Vec<_>>(), vec![1, 5]);
    }
}
