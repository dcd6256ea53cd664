//! Request-scoped session read cache
//!
//! The session store can live behind the host's serialization layer, so a
//! single decision should read each key at most once. The cache memoizes
//! reads for the lifetime of one request and suppresses writes that would
//! not change the stored value.

use std::collections::HashMap;

use agegate_core::{Result, SessionStore, SessionValue};

/// Read-through cache over a [`SessionStore`], scoped to one request.
///
/// Never held across requests: a new cache is built per decision, so stale
/// entries cannot outlive the request that produced them.
pub struct SessionCache<'a> {
    store: &'a dyn SessionStore,
    cache: HashMap<String, Option<SessionValue>>,
}

impl<'a> SessionCache<'a> {
    pub fn new(store: &'a dyn SessionStore) -> Self {
        Self {
            store,
            cache: HashMap::new(),
        }
    }

    /// Read a key, hitting the backing store at most once per request.
    pub fn get(&mut self, key: &str) -> Result<Option<SessionValue>> {
        if let Some(cached) = self.cache.get(key) {
            return Ok(cached.clone());
        }
        let value = self.store.get(key)?;
        self.cache.insert(key.to_owned(), value.clone());
        Ok(value)
    }

    /// Write a key, skipping the store when the value is already current.
    ///
    /// Returns whether the store was actually touched.
    pub fn set(&mut self, key: &str, value: SessionValue) -> Result<bool> {
        if self.get(key)?.as_ref() == Some(&value) {
            return Ok(false);
        }
        self.store.set(key, value.clone())?;
        self.cache.insert(key.to_owned(), Some(value));
        Ok(true)
    }

    /// Remove a key, skipping the store when it is already absent.
    pub fn remove(&mut self, key: &str) -> Result<bool> {
        if self.get(key)?.is_none() {
            return Ok(false);
        }
        self.store.remove(key)?;
        self.cache.insert(key.to_owned(), None);
        Ok(true)
    }

    pub fn store(&self) -> &'a dyn SessionStore {
        self.store
    }
}
