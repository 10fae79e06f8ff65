// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Singleton metadata slots.
//!
//! A slot is a read-mostly cache addressed by key. Writes replace the whole
//! value; there is no merging.

use std::marker::PhantomData;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::RwLock;

use crate::error::Result;
use crate::store::LocalStore;

/// A typed, persisted singleton with an in-memory read cache.
pub struct MetaSlot<T> {
    key: &'static str,
    store: Arc<LocalStore>,
    cached: RwLock<Option<T>>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> MetaSlot<T>
where
    T: Clone + Serialize + DeserializeOwned + Send + Sync,
{
    pub fn new(store: Arc<LocalStore>, key: &'static str) -> Self {
        MetaSlot {
            key,
            store,
            cached: RwLock::new(None),
            _marker: PhantomData,
        }
    }

    /// Load the persisted value into the cache, writing `default` if the slot is empty.
    pub async fn init(&self, default: T) -> Result<T> {
        let value = match self.store.get_meta::<T>(self.key).await? {
            Some(value) => value,
            None => {
                self.store.put_meta(self.key, &default).await?;
                default
            }
        };
        *self.cached.write().await = Some(value.clone());
        Ok(value)
    }

    /// Read the current value, hitting the store only on a cold cache.
    pub async fn get(&self) -> Result<Option<T>> {
        if let Some(value) = self.cached.read().await.clone() {
            return Ok(Some(value));
        }
        let value = self.store.get_meta::<T>(self.key).await?;
        if let Some(value) = &value {
            *self.cached.write().await = Some(value.clone());
        }
        Ok(value)
    }

    /// Overwrite the slot.
    pub async fn replace(&self, value: T) -> Result<()> {
        self.store.put_meta(self.key, &value).await?;
        *self.cached.write().await = Some(value);
        Ok(())
    }
}

#[cfg(test)]
#[path = "meta_tests.rs"]
mod tests;
