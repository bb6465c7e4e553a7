// Named cache generations
// Author: kelexine (https://github.com/kelexine)

use super::network::FetchResponse;
use axum::http::{HeaderMap, Method, StatusCode};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Entry for {url} is {size} bytes, limit is {limit}")]
    EntryTooLarge { url: String, size: usize, limit: usize },

    #[error("Cache generation {0} does not exist")]
    UnknownGeneration(String),
}

/// Cache key: upper-cased method plus path and query, scoped to a
/// partition. Entries in a user's partition are never served to anyone
/// else; `None` is the shared partition.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestKey {
    pub method: String,
    pub url: String,
    pub partition: Option<String>,
}

impl RequestKey {
    pub fn new(method: &Method, url: &str) -> Self {
        Self {
            method: method.as_str().to_ascii_uppercase(),
            url: url.to_string(),
            partition: None,
        }
    }

    pub fn get(url: &str) -> Self {
        Self::new(&Method::GET, url)
    }

    pub fn in_partition(mut self, partition: Option<String>) -> Self {
        self.partition = partition;
        self
    }

    /// The same request in the shared partition.
    pub fn shared(&self) -> Self {
        self.clone().in_partition(None)
    }
}

/// Snapshot of a stored response.
#[derive(Debug, Clone)]
pub struct CachedResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub stored_at: DateTime<Utc>,
    /// SHA-256 of `body`, hex encoded.
    pub digest: String,
}

impl CachedResponse {
    pub fn from_response(response: &FetchResponse) -> Self {
        Self {
            status: response.status,
            headers: response.headers.clone(),
            body: response.body.clone(),
            stored_at: Utc::now(),
            digest: hex::encode(Sha256::digest(&response.body)),
        }
    }

    pub fn to_response(&self) -> FetchResponse {
        FetchResponse {
            status: self.status,
            headers: self.headers.clone(),
            body: self.body.clone(),
            same_origin: true,
        }
    }
}

type Generation = HashMap<RequestKey, CachedResponse>;

/// Shared cache storage holding every named generation.
///
/// Cloning is cheap and every clone sees the same generations. Writes to a
/// single key are atomic; there is no per-entry expiry.
#[derive(Clone)]
pub struct CacheStorage {
    generations: Arc<RwLock<HashMap<String, Generation>>>,
    max_entry_bytes: usize,
}

impl CacheStorage {
    pub fn new(max_entry_bytes: usize) -> Self {
        Self {
            generations: Arc::new(RwLock::new(HashMap::new())),
            max_entry_bytes,
        }
    }

    /// Open a generation, creating it empty if needed.
    pub fn open(&self, name: &str) {
        self.generations
            .write()
            .entry(name.to_string())
            .or_default();
    }

    pub fn has(&self, name: &str) -> bool {
        self.generations.read().contains_key(name)
    }

    /// Names of all generations, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut names: Vec<String> = self.generations.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Drop a whole generation. Returns whether it existed.
    pub fn delete(&self, name: &str) -> bool {
        self.generations.write().remove(name).is_some()
    }

    pub fn match_in(&self, name: &str, key: &RequestKey) -> Option<CachedResponse> {
        self.generations
            .read()
            .get(name)
            .and_then(|generation| generation.get(key))
            .cloned()
    }

    pub fn put(
        &self,
        name: &str,
        key: RequestKey,
        response: &FetchResponse,
    ) -> Result<(), CacheError> {
        self.check_size(&key, response)?;
        let entry = CachedResponse::from_response(response);

        let mut generations = self.generations.write();
        let generation = generations
            .get_mut(name)
            .ok_or_else(|| CacheError::UnknownGeneration(name.to_string()))?;
        generation.insert(key, entry);
        Ok(())
    }

    /// Store every entry or none of them.
    pub fn put_all(
        &self,
        name: &str,
        entries: Vec<(RequestKey, FetchResponse)>,
    ) -> Result<(), CacheError> {
        for (key, response) in &entries {
            self.check_size(key, response)?;
        }

        let mut generations = self.generations.write();
        let generation = generations
            .get_mut(name)
            .ok_or_else(|| CacheError::UnknownGeneration(name.to_string()))?;
        for (key, response) in entries {
            generation.insert(key, CachedResponse::from_response(&response));
        }
        Ok(())
    }

    /// Number of entries in a generation (0 if absent).
    pub fn len(&self, name: &str) -> usize {
        self.generations
            .read()
            .get(name)
            .map(|generation| generation.len())
            .unwrap_or(0)
    }

    pub fn is_empty(&self, name: &str) -> bool {
        self.len(name) == 0
    }

    fn check_size(&self, key: &RequestKey, response: &FetchResponse) -> Result<(), CacheError> {
        let size = response.body.len();
        if size > self.max_entry_bytes {
            return Err(CacheError::EntryTooLarge {
                url: key.url.clone(),
                size,
                limit: self.max_entry_bytes,
            });
        }
        Ok(())
    }
}
