//! # Selection Renderer
//!
//! Pure projection of (catalog, selection) into the drawable list. Owns no
//! state. Keys that no longer resolve in the current catalog are skipped,
//! not deleted; a later reload may bring their item back.
use crate::{catalog::Catalog, key::ItemKey, selection::SelectionStore};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedBox {
    /// `count_per_unit * quantity`, integer multiplication.
    pub quantity: u64,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedLine {
    pub key: ItemKey,
    pub collection: String,
    pub item: String,
    pub quantity: u32,
    pub boxes: Vec<RenderedBox>,
}

/// Every selected key that still resolves in `catalog`, expanded to its
/// boxes, sorted by (collection, item) case-insensitively.
pub fn render(catalog: &Catalog, store: &SelectionStore) -> Vec<SelectedLine> {
    let mut lines: Vec<SelectedLine> = store
        .snapshot()
        .into_iter()
        .filter_map(|(key, quantity)| {
            let (collection, item_name) = key.decode().ok()?;
            let item = catalog.item_by_names(&collection, &item_name)?;

            let boxes = item
                .boxes
                .iter()
                .map(|b| RenderedBox {
                    quantity: u64::from(b.count_per_unit) * u64::from(quantity),
                    description: b.description.clone(),
                })
                .collect();

            Some(SelectedLine {
                key,
                collection,
                item: item_name,
                quantity,
                boxes,
            })
        })
        .collect();

    lines.sort_by(|a, b| {
        (a.collection.to_lowercase(), a.item.to_lowercase())
            .cmp(&(b.collection.to_lowercase(), b.item.to_lowercase()))
    });
    lines
}

/// The quantity a full render would show for one key, if any. Used to
/// cross-check the incremental badge counters.
pub fn rendered_quantity(catalog: &Catalog, store: &SelectionStore, key: &ItemKey) -> Option<u32> {
    render(catalog, store)
        .into_iter()
        .find(|line| line.key == *key)
        .map(|line| line.quantity)
}
