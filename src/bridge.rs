use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::error::Result;

/// Storage key of the cached user profile
pub const USER_INFO_KEY: &str = "userInfo";

/// Storage key of the access token
pub const ACCESS_TOKEN_KEY: &str = "access_token";

/// Transport to the cloud-function backend
#[async_trait]
pub trait RpcBridge: Send + Sync {
    /// Invoke the cloud function `name` with `payload` and return its raw result
    ///
    /// # Errors
    ///
    /// Returns [`crate::TaillightError::Transport`] if the call could not be
    /// delivered or answered.
    async fn call_function(&self, name: &str, payload: Value) -> Result<Value>;
}

/// Source of one-time login codes
#[async_trait]
pub trait LoginProvider: Send + Sync {
    /// Obtain a fresh login code, `None` if the host handed out none
    ///
    /// # Errors
    ///
    /// Returns [`crate::TaillightError::Transport`] if the host login call failed.
    async fn login_code(&self) -> Result<Option<String>>;
}

/// Persistent key/value storage
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Read an entry
    ///
    /// # Errors
    ///
    /// Returns [`crate::TaillightError::Storage`] if the storage is unreadable.
    async fn get(&self, key: &str) -> Result<Option<Value>>;

    /// Write an entry
    ///
    /// # Errors
    ///
    /// Returns [`crate::TaillightError::Storage`] if the storage is unwritable.
    async fn set(&self, key: &str, value: Value) -> Result<()>;

    /// Delete an entry
    ///
    /// # Errors
    ///
    /// Returns [`crate::TaillightError::Storage`] if the storage is unwritable.
    async fn remove(&self, key: &str) -> Result<()>;
}

/// In-memory [`KeyValueStore`]
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, Value>>,
}

impl MemoryStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store holding `entries`
    #[must_use]
    pub fn with_entries<I, K>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        Self {
            entries: RwLock::new(entries.into_iter().map(|(k, v)| (k.into(), v)).collect()),
        }
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> Result<()> {
        self.entries.write().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.entries.write().await.remove(key);
        Ok(())
    }
}

/// [`LoginProvider`] that always returns the same code
#[derive(Debug, Clone)]
pub struct FixedLoginCode(pub Option<String>);

impl FixedLoginCode {
    /// Provider handing out `code`
    pub fn new(code: impl Into<String>) -> Self {
        Self(Some(code.into()))
    }
}

#[async_trait]
impl LoginProvider for FixedLoginCode {
    async fn login_code(&self) -> Result<Option<String>> {
        Ok(self.0.clone())
    }
}
