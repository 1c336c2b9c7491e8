//! # Session Context
//!
//! One object owning everything a browsing session mutates: the current
//! catalog, the selection, its badge counters, and the one-shot pending
//! delivery import. No free-floating globals.
//!
//! The catalog reference is swapped atomically after a reload completes;
//! readers always see either the old catalog or the new one in full. A
//! failed reload installs nothing, so already-rendered state survives.
//! Selection mutations are synchronous and atomic with respect to each
//! other.
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use arc_swap::ArcSwapOption;
use parking_lot::Mutex;

use crate::{
    badge::BadgeSet,
    catalog::Catalog,
    delivery::DeliveryPair,
    key::ItemKey,
    render::{self, SelectedLine},
    selection::{SelectionError, SelectionStore},
};

#[derive(Default)]
pub struct SessionContext {
    catalog: ArcSwapOption<Catalog>,
    selection: Mutex<SelectionStore>,
    badges: Mutex<BadgeSet>,
    pending_import: Mutex<Option<Vec<DeliveryPair>>>,
    authenticated: AtomicBool,
}

impl SessionContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Swap in a freshly built catalog. Selections survive; keys whose
    /// item vanished simply stop rendering.
    pub fn install_catalog(&self, catalog: Catalog) {
        self.catalog.store(Some(Arc::new(catalog)));
    }

    /// Whichever catalog reference is current right now.
    pub fn catalog(&self) -> Option<Arc<Catalog>> {
        self.catalog.load_full()
    }

    pub fn mark_authenticated(&self) {
        self.authenticated.store(true, Ordering::Release);
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated.load(Ordering::Acquire)
    }

    /// Stash the page-load delivery pairs until the import gate opens.
    pub fn stash_import(&self, pairs: Vec<DeliveryPair>) {
        if !pairs.is_empty() {
            *self.pending_import.lock() = Some(pairs);
        }
    }

    /// The one-shot import gate: hands out the pending pairs only once,
    /// and only after authentication has succeeded and a catalog has been
    /// installed. Returns `None` until both hold, without consuming the
    /// stash.
    pub fn take_pending_import(&self) -> Option<Vec<DeliveryPair>> {
        if !self.is_authenticated() || self.catalog.load().is_none() {
            return None;
        }
        self.pending_import.lock().take()
    }

    pub fn add(&self, key: &ItemKey, delta: u32) -> Result<u32, SelectionError> {
        let mut selection = self.selection.lock();
        let qty = selection.add(key, delta)?;
        self.badges.lock().sync_one(key, qty);
        Ok(qty)
    }

    pub fn remove(&self, key: &ItemKey) {
        let mut selection = self.selection.lock();
        let qty = selection.remove(key);
        self.badges.lock().sync_one(key, qty);
    }

    pub fn remove_partial(&self, key: &ItemKey, qty: u32) -> Result<u32, SelectionError> {
        let mut selection = self.selection.lock();
        let remaining = selection.remove_partial(key, qty)?;
        self.badges.lock().sync_one(key, remaining);
        Ok(remaining)
    }

    pub fn remove_all(&self) {
        let mut selection = self.selection.lock();
        selection.remove_all();
        self.badges.lock().clear();
    }

    pub fn badge(&self, key: &ItemKey) -> Option<u32> {
        self.badges.lock().get(key)
    }

    pub fn snapshot(&self) -> Vec<(ItemKey, u32)> {
        self.selection.lock().snapshot()
    }

    /// Render against whichever catalog is current; empty before the
    /// first load.
    pub fn render(&self) -> Vec<SelectedLine> {
        match self.catalog.load_full() {
            Some(catalog) => render::render(&catalog, &self.selection.lock()),
            None => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{RawRow, Strictness};

    fn catalog(items: &[(&str, &str, &str)]) -> Catalog {
        let rows: Vec<RawRow> = items
            .iter()
            .map(|(c, i, id)| RawRow {
                collection: c.to_string(),
                item: i.to_string(),
                id: id.to_string(),
                box_count: "2".into(),
                box_description: "pack".into(),
            })
            .collect();
        Catalog::load(&rows, Strictness::Strict).unwrap()
    }

    #[test]
    fn selections_survive_catalog_reload() {
        let ctx = SessionContext::new();
        ctx.install_catalog(catalog(&[("A", "x", "1"), ("B", "y", "2")]));

        let key = ItemKey::encode("B", "y");
        ctx.add(&key, 2).unwrap();
        assert_eq!(ctx.render().len(), 1);

        // reload without item y
        ctx.install_catalog(catalog(&[("A", "x", "1")]));
        assert!(ctx.render().is_empty());
        assert_eq!(ctx.snapshot(), vec![(key.clone(), 2)]);

        // a later reload restores it
        ctx.install_catalog(catalog(&[("B", "y", "2")]));
        assert_eq!(ctx.render()[0].quantity, 2);
    }

    #[test]
    fn import_gate_needs_auth_and_catalog_and_fires_once() {
        let ctx = SessionContext::new();
        ctx.stash_import(vec![DeliveryPair {
            id: "1".into(),
            qty: 3,
        }]);

        assert!(ctx.take_pending_import().is_none());

        ctx.mark_authenticated();
        assert!(ctx.take_pending_import().is_none());

        ctx.install_catalog(catalog(&[("A", "x", "1")]));
        let pending = ctx.take_pending_import().unwrap();
        assert_eq!(pending.len(), 1);

        // one-shot
        assert!(ctx.take_pending_import().is_none());
    }

    #[test]
    fn empty_import_is_never_stashed() {
        let ctx = SessionContext::new();
        ctx.mark_authenticated();
        ctx.install_catalog(catalog(&[("A", "x", "1")]));
        ctx.stash_import(Vec::new());
        assert!(ctx.take_pending_import().is_none());
    }

    #[test]
    fn badges_follow_mutations() {
        let ctx = SessionContext::new();
        ctx.install_catalog(catalog(&[("A", "x", "1")]));
        let key = ItemKey::encode("A", "x");

        ctx.add(&key, 3).unwrap();
        assert_eq!(ctx.badge(&key), Some(3));

        ctx.remove_partial(&key, 1).unwrap();
        assert_eq!(ctx.badge(&key), Some(2));

        ctx.remove(&key);
        assert_eq!(ctx.badge(&key), None);

        ctx.add(&key, 1).unwrap();
        ctx.remove_all();
        assert_eq!(ctx.badge(&key), None);
        assert!(ctx.snapshot().is_empty());
    }
}
