//! Token Store
//!
//! Per-API token record persistence.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::{MtdError, StorageError};
use crate::types::{ApiId, TokenPatch, TokenRecord};

/// Token store interface.
///
/// At most one record exists per API; `upsert` creates it on first use and
/// patches it in place afterwards.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Retrieve the record for an API.
    async fn get(&self, api_id: &ApiId) -> Result<Option<TokenRecord>, MtdError>;

    /// Create or patch the record for an API and return the stored result.
    async fn upsert(&self, api_id: &ApiId, patch: TokenPatch) -> Result<TokenRecord, MtdError>;

    /// Both access and refresh tokens are stored for the API.
    async fn has_usable_tokens(&self, api_id: &ApiId) -> Result<bool, MtdError> {
        Ok(self
            .get(api_id)
            .await?
            .is_some_and(|record| record.has_usable_tokens()))
    }
}

/// In-memory token store implementation.
#[derive(Default)]
pub struct InMemoryTokenStore {
    records: Mutex<HashMap<ApiId, TokenRecord>>,
}

impl InMemoryTokenStore {
    /// Create new in-memory token store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populate a record.
    pub fn insert(&self, record: TokenRecord) -> &Self {
        self.records
            .lock()
            .unwrap()
            .insert(record.api_id.clone(), record);
        self
    }
}

#[async_trait]
impl TokenStore for InMemoryTokenStore {
    async fn get(&self, api_id: &ApiId) -> Result<Option<TokenRecord>, MtdError> {
        Ok(self.records.lock().unwrap().get(api_id).cloned())
    }

    async fn upsert(&self, api_id: &ApiId, patch: TokenPatch) -> Result<TokenRecord, MtdError> {
        let mut records = self.records.lock().unwrap();
        let record = records
            .entry(api_id.clone())
            .or_insert_with(|| TokenRecord::new(api_id.clone()));
        record.apply(patch);
        Ok(record.clone())
    }
}

/// Token store persisting every record to a single JSON file.
pub struct JsonFileTokenStore {
    path: PathBuf,
    lock: tokio::sync::Mutex<()>,
}

impl JsonFileTokenStore {
    /// Store backed by `path`; the file is created on first write.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<BTreeMap<ApiId, TokenRecord>, MtdError> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(e) => {
                return Err(StorageError::ReadFailed {
                    message: format!("{}: {}", self.path.display(), e),
                }
                .into())
            }
        };

        serde_json::from_str(&contents).map_err(|e| {
            StorageError::CorruptedData {
                message: format!("{}: {}", self.path.display(), e),
            }
            .into()
        })
    }

    async fn save(&self, records: &BTreeMap<ApiId, TokenRecord>) -> Result<(), MtdError> {
        let contents = serde_json::to_string_pretty(records).map_err(|e| {
            StorageError::WriteFailed {
                message: e.to_string(),
            }
        })?;

        let tmp = self.path.with_extension("tmp");
        let write_failed = |e: std::io::Error| StorageError::WriteFailed {
            message: format!("{}: {}", self.path.display(), e),
        };
        tokio::fs::write(&tmp, contents).await.map_err(write_failed)?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(write_failed)?;
        Ok(())
    }
}

#[async_trait]
impl TokenStore for JsonFileTokenStore {
    async fn get(&self, api_id: &ApiId) -> Result<Option<TokenRecord>, MtdError> {
        let _guard = self.lock.lock().await;
        Ok(self.load().await?.remove(api_id))
    }

    async fn upsert(&self, api_id: &ApiId, patch: TokenPatch) -> Result<TokenRecord, MtdError> {
        let _guard = self.lock.lock().await;
        let mut records = self.load().await?;
        let record = records
            .entry(api_id.clone())
            .or_insert_with(|| TokenRecord::new(api_id.clone()));
        record.apply(patch);
        let updated = record.clone();
        self.save(&records).await?;
        Ok(updated)
    }
}
