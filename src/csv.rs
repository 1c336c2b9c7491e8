//! # CSV Import
//!
//! File-based alternative to the API: `collection,item,id,boxCount,
//! boxDescription` with a header row that is ignored. Quoted fields keep
//! their commas; rows with fewer than five fields are dropped.
use ::csv::{ReaderBuilder, StringRecord};

use crate::catalog::RawRow;

/// Parse CSV text into catalog rows. Short rows and unreadable records
/// are skipped; row-level strictness is applied later by
/// [`Catalog::load`].
///
/// [`Catalog::load`]: crate::catalog::Catalog::load
pub fn parse_rows(text: &str) -> Vec<RawRow> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(text.as_bytes());

    let mut rows = Vec::new();
    for record in reader.records() {
        let Ok(record) = record else { continue };
        if record.len() < 5 {
            continue;
        }
        rows.push(RawRow {
            collection: field(&record, 0),
            item: field(&record, 1),
            id: field(&record, 2),
            box_count: field(&record, 3),
            box_description: field(&record, 4),
        });
    }
    rows
}

fn field(record: &StringRecord, index: usize) -> String {
    record.get(index).unwrap_or("").trim().to_string()
}
