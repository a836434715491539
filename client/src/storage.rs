use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::{collections::HashMap, path::PathBuf};
use tokio::{fs, sync::Mutex};

use crate::error::ClientResult;

pub const KEY_THEME: &str = "theme";
pub const KEY_NOTIFICATIONS_ENABLED: &str = "notifications_enabled";
pub const KEY_REFRESH_TOKEN: &str = "refresh_token";

/// JSON key-value file holding the few values that survive a restart.
pub struct Storage {
    file: PathBuf,
    data: Mutex<HashMap<String, Value>>,
}

impl Storage {
    /// Open (or create) `state.json` under `dir`. A corrupt file reads as empty.
    pub async fn open(dir: impl Into<PathBuf>) -> ClientResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).await?;
        let file = dir.join("state.json");
        let data = if let Ok(bytes) = fs::read(&file).await {
            serde_json::from_slice(&bytes).unwrap_or_else(|e| {
                tracing::warn!(error = %e, path = %file.display(), "discarding unreadable client state");
                HashMap::new()
            })
        } else {
            HashMap::new()
        };
        Ok(Self {
            file,
            data: Mutex::new(data),
        })
    }

    /// Retrieve a value by key.
    pub async fn get(&self, key: &str) -> Option<Value> {
        self.data.lock().await.get(key).cloned()
    }

    /// Retrieve and decode a value; mismatched types read as absent.
    pub async fn get_as<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.get(key)
            .await
            .and_then(|v| serde_json::from_value(v).ok())
    }

    /// Store a value under a key and flush to disk.
    pub async fn put(&self, key: &str, value: impl Serialize) -> ClientResult<()> {
        let value = serde_json::to_value(value)?;
        let mut data = self.data.lock().await;
        data.insert(key.to_string(), value);
        let bytes = serde_json::to_vec(&*data)?;
        fs::write(&self.file, bytes).await?;
        Ok(())
    }

    pub async fn remove(&self, key: &str) -> ClientResult<()> {
        let mut data = self.data.lock().await;
        if data.remove(key).is_some() {
            let bytes = serde_json::to_vec(&*data)?;
            fs::write(&self.file, bytes).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn values_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::open(dir.path()).await.unwrap();
        storage.put(KEY_THEME, "dark").await.unwrap();
        storage.put(KEY_NOTIFICATIONS_ENABLED, false).await.unwrap();
        drop(storage);

        let storage = Storage::open(dir.path()).await.unwrap();
        assert_eq!(storage.get_as::<String>(KEY_THEME).await.as_deref(), Some("dark"));
        assert_eq!(storage.get_as::<bool>(KEY_NOTIFICATIONS_ENABLED).await, Some(false));
    }

    #[tokio::test]
    async fn remove_and_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::open(dir.path()).await.unwrap();
        storage.put(KEY_REFRESH_TOKEN, "r1").await.unwrap();
        storage.remove(KEY_REFRESH_TOKEN).await.unwrap();
        assert!(storage.get(KEY_REFRESH_TOKEN).await.is_none());

        std::fs::write(dir.path().join("state.json"), b"{not json").unwrap();
        let storage = Storage::open(dir.path()).await.unwrap();
        assert!(storage.get(KEY_THEME).await.is_none());
    }
}
