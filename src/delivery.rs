//! # Delivery Import
//!
//! A delivery hand-off arrives as a one-shot `?items=` query parameter at
//! page load: a JSON array of `{id, qty}` pairs. Each pair is resolved
//! against the catalog; matches gain their display names, misses are kept
//! verbatim so the user sees what could not be found. Nothing is dropped
//! silently. Committing a user-chosen subset is strictly additive.
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

use crate::{
    catalog::Catalog,
    key::ItemKey,
    selection::{SelectionError, SelectionStore},
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryPair {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    pub qty: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchedPair {
    pub id: String,
    pub qty: u32,
    pub collection: String,
    pub item: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Resolution {
    pub matched: Vec<MatchedPair>,
    pub unmatched: Vec<DeliveryPair>,
}

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("delivery items parameter is not a JSON array of {{id, qty}}: {0}")]
    MalformedItems(#[from] serde_json::Error),

    #[error("delivery quantity must be a positive integer")]
    InvalidQuantity,
}

/// Parse the raw (already url-decoded) `items` parameter. An empty array
/// parses to an empty list, which callers treat as "nothing pending".
/// Quantities must be positive; a zero anywhere rejects the whole
/// parameter.
pub fn parse_query(raw: &str) -> Result<Vec<DeliveryPair>, DeliveryError> {
    let pairs: Vec<DeliveryPair> = serde_json::from_str(raw)?;
    if pairs.iter().any(|pair| pair.qty == 0) {
        return Err(DeliveryError::InvalidQuantity);
    }
    Ok(pairs)
}

/// Partition pairs into matched/unmatched against the catalog. Input
/// order is preserved within each bucket; every pair lands in exactly one.
pub fn resolve(pairs: &[DeliveryPair], catalog: &Catalog) -> Resolution {
    let mut resolution = Resolution::default();
    for pair in pairs {
        match catalog.item_by_id(&pair.id) {
            Some((collection, item)) => resolution.matched.push(MatchedPair {
                id: pair.id.clone(),
                qty: pair.qty,
                collection: collection.name.clone(),
                item: item.name.clone(),
            }),
            None => resolution.unmatched.push(pair.clone()),
        }
    }
    resolution
}

/// Add each chosen pair to the selection. Additive: importing the same
/// pair twice accumulates its quantity. All-or-nothing: every pair is
/// validated before the first add, so a rejected pair leaves the store
/// untouched.
pub fn commit(chosen: &[MatchedPair], store: &mut SelectionStore) -> Result<(), SelectionError> {
    if chosen.iter().any(|pair| pair.qty == 0) {
        return Err(SelectionError::InvalidQuantity);
    }
    for pair in chosen {
        let key = ItemKey::encode(&pair.collection, &pair.item);
        store.add(&key, pair.qty)?;
    }
    Ok(())
}

// Item ids arrive as strings or bare numbers depending on who built the
// link; accept both.
pub(crate) fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Number(i64),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Text(s) => s,
        Raw::Number(n) => n.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{RawRow, Strictness};

    fn catalog() -> Catalog {
        let rows = vec![
            RawRow {
                collection: "Box A".into(),
                item: "Widget".into(),
                id: "w-1".into(),
                box_count: "2".into(),
                box_description: "pack of 2".into(),
            },
            RawRow {
                collection: "Box B".into(),
                item: "Gadget".into(),
                id: "7".into(),
                box_count: "1".into(),
                box_description: "single".into(),
            },
        ];
        Catalog::load(&rows, Strictness::Strict).unwrap()
    }

    #[test]
    fn parses_string_and_numeric_ids() {
        let pairs = parse_query(r#"[{"id": "w-1", "qty": 2}, {"id": 7, "qty": 1}]"#).unwrap();
        assert_eq!(pairs[0].id, "w-1");
        assert_eq!(pairs[1].id, "7");
    }

    #[test]
    fn rejects_malformed_payloads() {
        assert!(parse_query("not json").is_err());
        assert!(parse_query(r#"{"id": "w-1"}"#).is_err());
    }

    #[test]
    fn rejects_zero_quantities_at_parse_time() {
        let err = parse_query(r#"[{"id": "w-1", "qty": 3}, {"id": "g-1", "qty": 0}]"#).unwrap_err();
        assert!(matches!(err, DeliveryError::InvalidQuantity));
    }

    #[test]
    fn commit_with_a_zero_quantity_pair_changes_nothing() {
        let mut chosen = vec![
            MatchedPair {
                id: "w-1".into(),
                qty: 3,
                collection: "Box A".into(),
                item: "Widget".into(),
            },
            MatchedPair {
                id: "7".into(),
                qty: 0,
                collection: "Box B".into(),
                item: "Gadget".into(),
            },
        ];

        let mut store = SelectionStore::new();
        assert_eq!(
            commit(&chosen, &mut store),
            Err(SelectionError::InvalidQuantity)
        );
        // the valid first pair was not half-applied
        assert!(store.is_empty());

        // with the bad pair repaired, the same batch commits in full
        chosen[1].qty = 1;
        commit(&chosen, &mut store).unwrap();
        assert_eq!(store.get(&ItemKey::encode("Box A", "Widget")), 3);
        assert_eq!(store.get(&ItemKey::encode("Box B", "Gadget")), 1);
    }

    #[test]
    fn resolve_partitions_without_loss_or_duplication() {
        let pairs = vec![
            DeliveryPair { id: "w-1".into(), qty: 3 },
            DeliveryPair { id: "missing".into(), qty: 1 },
            DeliveryPair { id: "7".into(), qty: 2 },
        ];
        let resolution = resolve(&pairs, &catalog());

        assert_eq!(resolution.matched.len() + resolution.unmatched.len(), pairs.len());
        assert_eq!(resolution.matched[0].item, "Widget");
        assert_eq!(resolution.matched[0].collection, "Box A");
        assert_eq!(resolution.matched[1].item, "Gadget");
        // the miss is reported verbatim
        assert_eq!(resolution.unmatched, vec![pairs[1].clone()]);
    }

    #[test]
    fn commit_is_additive() {
        let catalog = catalog();
        let pairs = vec![DeliveryPair { id: "w-1".into(), qty: 3 }];
        let resolution = resolve(&pairs, &catalog);

        let mut store = SelectionStore::new();
        commit(&resolution.matched, &mut store).unwrap();
        commit(&resolution.matched, &mut store).unwrap();

        let key = ItemKey::encode("Box A", "Widget");
        assert_eq!(store.get(&key), 6);
    }
}
