//! # Selection Store
//!
//! The user's working list: item key → selected quantity. Quantities are
//! always positive; an entry that would reach zero is removed instead of
//! stored as 0. The store deliberately outlives catalog reloads, so a key
//! whose item vanished from the catalog stays here until the user removes
//! it (it simply stops rendering).
use std::collections::HashMap;

use thiserror::Error;

use crate::key::ItemKey;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SelectionError {
    #[error("quantity must be a positive integer")]
    InvalidQuantity,
}

#[derive(Debug, Default, Clone)]
pub struct SelectionStore {
    quantities: HashMap<ItemKey, u32>,
}

impl SelectionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `delta` to the key's quantity, creating the entry if absent.
    /// A zero delta is rejected and the store is left unchanged.
    pub fn add(&mut self, key: &ItemKey, delta: u32) -> Result<u32, SelectionError> {
        if delta == 0 {
            return Err(SelectionError::InvalidQuantity);
        }
        let qty = self.quantities.entry(key.clone()).or_insert(0);
        *qty = qty.saturating_add(delta);
        Ok(*qty)
    }

    /// Remove the key entirely, whatever its quantity. Removing an absent
    /// key is a no-op.
    pub fn remove(&mut self, key: &ItemKey) -> u32 {
        self.quantities.remove(key);
        0
    }

    /// Remove `qty` units. Removing at least the current quantity behaves
    /// exactly like [`remove`]. Returns the new quantity.
    ///
    /// [`remove`]: SelectionStore::remove
    pub fn remove_partial(&mut self, key: &ItemKey, qty: u32) -> Result<u32, SelectionError> {
        if qty == 0 {
            return Err(SelectionError::InvalidQuantity);
        }
        let current = self.get(key);
        if qty >= current {
            return Ok(self.remove(key));
        }
        let remaining = current - qty;
        self.quantities.insert(key.clone(), remaining);
        Ok(remaining)
    }

    /// Clear everything. Confirming with the user first is the caller's
    /// job.
    pub fn remove_all(&mut self) {
        self.quantities.clear();
    }

    pub fn get(&self, key: &ItemKey) -> u32 {
        self.quantities.get(key).copied().unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.quantities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.quantities.is_empty()
    }

    /// Every (key, quantity) pair, in no particular order. Display order
    /// is the renderer's concern, since it needs the catalog to sort by
    /// display name.
    pub fn snapshot(&self) -> Vec<(ItemKey, u32)> {
        self.quantities
            .iter()
            .map(|(k, q)| (k.clone(), *q))
            .collect()
    }
}
