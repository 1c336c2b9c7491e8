//! # Inventory Catalog
//!
//! Read-only grouping of flattened inventory rows into
//! collection → item → boxes, plus an item-id index for import resolution.
//!
//! A catalog is built fresh from whatever data arrives (CSV file or the
//! `/api/data` payload) and replaced wholesale on reload. Collections and
//! items iterate in case-insensitive lexicographic order of display name.
use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One flattened input row, one box per row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRow {
    pub collection: String,
    pub item: String,
    pub id: String,
    pub box_count: String,
    pub box_description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoxSpec {
    pub count_per_unit: u32,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
    pub name: String,
    pub id: String,
    pub boxes: Vec<BoxSpec>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Collection {
    pub name: String,
    pub items: Vec<Item>,
}

/// Whether rows missing required fields poison the whole load or are
/// quietly skipped. `Permissive` matches how CSV ingestion has always
/// behaved here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Strictness {
    #[default]
    Permissive,
    Strict,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CatalogError {
    #[error("row {index} is missing a required field or has a bad box count")]
    BadRow { index: usize },
}

#[derive(Debug, Default, Clone)]
pub struct Catalog {
    collections: Vec<Collection>,
    /// item id -> (collection index, item index)
    id_index: HashMap<String, (usize, usize)>,
    /// exact (collection name, item name) -> (collection index, item index)
    name_index: HashMap<(String, String), (usize, usize)>,
}

impl Catalog {
    /// Group flattened rows into the catalog structure. Rows sharing a
    /// (collection, item) pair merge their boxes, in input order. The item
    /// id is taken from the first row of the pair.
    pub fn load(rows: &[RawRow], strictness: Strictness) -> Result<Self, CatalogError> {
        let mut grouped: Vec<(String, Vec<Item>)> = Vec::new();

        for (index, row) in rows.iter().enumerate() {
            let Some((count, row)) = validate(row) else {
                match strictness {
                    Strictness::Permissive => continue,
                    Strictness::Strict => return Err(CatalogError::BadRow { index }),
                }
            };

            let spec = BoxSpec {
                count_per_unit: count,
                description: row.box_description.trim().to_string(),
            };

            let ci = match grouped.iter().position(|(name, _)| *name == row.collection) {
                Some(ci) => ci,
                None => {
                    grouped.push((row.collection.clone(), Vec::new()));
                    grouped.len() - 1
                }
            };
            let items = &mut grouped[ci].1;

            match items.iter_mut().find(|item| item.name == row.item) {
                Some(item) => item.boxes.push(spec),
                None => items.push(Item {
                    name: row.item.clone(),
                    id: row.id.clone(),
                    boxes: vec![spec],
                }),
            }
        }

        let mut collections: Vec<Collection> = grouped
            .into_iter()
            .map(|(name, mut items)| {
                items.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));
                Collection { name, items }
            })
            .collect();
        collections.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));

        let mut id_index = HashMap::new();
        let mut name_index = HashMap::new();
        for (ci, collection) in collections.iter().enumerate() {
            for (ii, item) in collection.items.iter().enumerate() {
                id_index.entry(item.id.clone()).or_insert((ci, ii));
                name_index.insert((collection.name.clone(), item.name.clone()), (ci, ii));
            }
        }

        Ok(Self {
            collections,
            id_index,
            name_index,
        })
    }

    /// Collections in display order.
    pub fn collections(&self) -> &[Collection] {
        &self.collections
    }

    /// O(1) lookup of an item by its externally meaningful id.
    pub fn item_by_id(&self, id: &str) -> Option<(&Collection, &Item)> {
        let &(ci, ii) = self.id_index.get(id)?;
        let collection = &self.collections[ci];
        Some((collection, &collection.items[ii]))
    }

    /// Exact-name lookup, used when resolving a selection key.
    pub fn item_by_names(&self, collection: &str, item: &str) -> Option<&Item> {
        let &(ci, ii) = self
            .name_index
            .get(&(collection.to_string(), item.to_string()))?;
        Some(&self.collections[ci].items[ii])
    }

    pub fn is_empty(&self) -> bool {
        self.collections.is_empty()
    }

    /// Project into the `/api/data` wire shape, optionally filtered to a
    /// set of item ids. An empty filter means everything. Collections left
    /// with no matching items are omitted.
    pub fn to_wire(&self, target_ids: &[String]) -> Vec<WireCollection> {
        self.collections
            .iter()
            .filter_map(|collection| {
                let items: Vec<WireItem> = collection
                    .items
                    .iter()
                    .filter(|item| target_ids.is_empty() || target_ids.contains(&item.id))
                    .map(|item| WireItem {
                        item: item.name.clone(),
                        id: item.id.clone(),
                        boxes: item
                            .boxes
                            .iter()
                            .map(|b| WireBox {
                                qty: b.count_per_unit,
                                description: b.description.clone(),
                            })
                            .collect(),
                    })
                    .collect();

                (!items.is_empty()).then(|| WireCollection {
                    collection: collection.name.clone(),
                    items,
                })
            })
            .collect()
    }

    /// Flatten a wire payload back into rows, the inverse of [`to_wire`].
    /// This is how a fetched payload becomes a fresh catalog on the client
    /// side.
    ///
    /// [`to_wire`]: Catalog::to_wire
    pub fn flatten_wire(payload: &[WireCollection]) -> Vec<RawRow> {
        let mut rows = Vec::new();
        for collection in payload {
            for item in &collection.items {
                for spec in &item.boxes {
                    rows.push(RawRow {
                        collection: collection.collection.clone(),
                        item: item.item.clone(),
                        id: item.id.clone(),
                        box_count: spec.qty.to_string(),
                        box_description: spec.description.clone(),
                    });
                }
            }
        }
        rows
    }
}

fn validate(row: &RawRow) -> Option<(u32, &RawRow)> {
    if row.collection.trim().is_empty() || row.item.trim().is_empty() || row.id.trim().is_empty() {
        return None;
    }
    let count: u32 = row.box_count.trim().parse().ok()?;
    Some((count, row))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireCollection {
    pub collection: String,
    pub items: Vec<WireItem>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireItem {
    pub item: String,
    pub id: String,
    pub boxes: Vec<WireBox>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireBox {
    pub qty: u32,
    pub description: String,
}
