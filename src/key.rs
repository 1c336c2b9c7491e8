//! # Item Keys
//!
//! A selection is keyed by the (collection, item) name pair. The key is a
//! single opaque string so it can live in maps, query params, and DOM ids.
//!
//! The pair is joined with `|||` and base64-encoded. Names may themselves
//! contain `|`, so every `|` is escaped as `\p` and every `\` as `\\` before
//! joining. The separator can therefore never be produced by name content
//! and `decode(encode(c, i)) == (c, i)` holds for all names.
use base64::{Engine as _, engine::general_purpose::STANDARD};
use thiserror::Error;

const SEPARATOR: &str = "|||";

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ItemKey(String);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum KeyError {
    #[error("key is not valid base64")]
    NotBase64,

    #[error("key is not valid utf-8")]
    NotUtf8,

    #[error("key has no separator")]
    MissingSeparator,

    #[error("key ends mid-escape")]
    DanglingEscape,
}

impl ItemKey {
    pub fn encode(collection: &str, item: &str) -> Self {
        let joined = format!("{}{SEPARATOR}{}", escape(collection), escape(item));
        Self(STANDARD.encode(joined.as_bytes()))
    }

    pub fn decode(&self) -> Result<(String, String), KeyError> {
        let bytes = STANDARD.decode(&self.0).map_err(|_| KeyError::NotBase64)?;
        let joined = String::from_utf8(bytes).map_err(|_| KeyError::NotUtf8)?;

        let (collection, item) = joined
            .split_once(SEPARATOR)
            .ok_or(KeyError::MissingSeparator)?;

        Ok((unescape(collection)?, unescape(item)?))
    }

    /// Reconstruct a key from its encoded form, e.g. one carried in a
    /// query parameter. Validated by a full decode.
    pub fn from_encoded(raw: &str) -> Result<Self, KeyError> {
        let key = Self(raw.to_string());
        key.decode()?;
        Ok(key)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn escape(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for ch in name.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '|' => out.push_str("\\p"),
            other => out.push(other),
        }
    }
    out
}

fn unescape(escaped: &str) -> Result<String, KeyError> {
    let mut out = String::with_capacity(escaped.len());
    let mut chars = escaped.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('p') => out.push('|'),
            Some(other) => out.push(other),
            None => return Err(KeyError::DanglingEscape),
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn round_trips_plain_names() {
        let key = ItemKey::encode("Box A", "Widget");
        assert_eq!(key.decode().unwrap(), ("Box A".into(), "Widget".into()));
    }

    #[test]
    fn round_trips_names_containing_the_separator() {
        let key = ItemKey::encode("a|||b", "c|d\\e");
        assert_eq!(key.decode().unwrap(), ("a|||b".into(), "c|d\\e".into()));
    }

    #[test]
    fn distinct_pairs_get_distinct_keys() {
        // Without escaping, ("a|", "|b") and ("a", "||b")
        // would collide on "a|||||b".
        let left = ItemKey::encode("a|", "|b");
        let right = ItemKey::encode("a", "||b");
        assert_ne!(left, right);
    }

    #[test]
    fn garbage_fails_to_decode() {
        assert_eq!(
            ItemKey::from_encoded("not base64!!!"),
            Err(KeyError::NotBase64)
        );
        let no_sep = ItemKey(STANDARD.encode("just one name"));
        assert_eq!(no_sep.decode(), Err(KeyError::MissingSeparator));
    }

    proptest! {
        #[test]
        fn round_trips_arbitrary_names(collection in ".*", item in ".*") {
            let key = ItemKey::encode(&collection, &item);
            prop_assert_eq!(key.decode().unwrap(), (collection, item));
        }
    }
}
