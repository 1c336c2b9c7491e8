//! # Badge Synchronizer
//!
//! Incremental per-item counters shown next to catalog entries. Updating
//! one counter after a mutation is an optimization over re-rendering the
//! whole list; the counters must always agree with what a full render
//! would show for that key.
use std::collections::HashMap;

use crate::{catalog::Catalog, key::ItemKey, render, selection::SelectionStore};

#[derive(Debug, Default, Clone)]
pub struct BadgeSet {
    counters: HashMap<ItemKey, u32>,
}

impl BadgeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create, update, or (at zero) remove the counter for one key.
    pub fn sync_one(&mut self, key: &ItemKey, qty: u32) {
        if qty == 0 {
            self.counters.remove(key);
        } else {
            self.counters.insert(key.clone(), qty);
        }
    }

    pub fn get(&self, key: &ItemKey) -> Option<u32> {
        self.counters.get(key).copied()
    }

    pub fn clear(&mut self) {
        self.counters.clear();
    }

    /// What the counters would be after a full render pass. The
    /// incremental path is checked against this in tests.
    pub fn rebuild(catalog: &Catalog, store: &SelectionStore) -> Self {
        let counters = render::render(catalog, store)
            .into_iter()
            .map(|line| (line.key, line.quantity))
            .collect();
        Self { counters }
    }
}
