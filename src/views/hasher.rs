//! Events hash for cache staleness checks

use crate::store::Item;
use crate::types::Hash;

/// Digest over the id and last-modified marker of each item.
///
/// Order-independent: pairs are sorted before hashing.
pub fn compute_events_hash<'a>(items: impl IntoIterator<Item = &'a Item>) -> Hash {
    let mut pairs: Vec<(&str, String)> = items
        .into_iter()
        .map(|item| {
            let marker = item
                .updated_at
                .map(|t| t.to_rfc3339())
                .unwrap_or_default();
            (item.id.as_str(), marker)
        })
        .collect();
    pairs.sort();

    let mut hasher = blake3::Hasher::new();
    hasher.update(&(pairs.len() as u64).to_le_bytes());
    for (id, marker) in pairs {
        hasher.update(id.as_bytes());
        hasher.update(&[0]);
        hasher.update(marker.as_bytes());
        hasher.update(&[0]);
    }
    *hasher.finalize().as_bytes()
}

/// Short hex prefix for log fields
pub fn short_hex(hash: &Hash) -> String {
    hex::encode(&hash[..8])
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_order_independent() {
        let a = Item::new("a");
        let b = Item::new("b");
        assert_eq!(compute_events_hash([&a, &b]), compute_events_hash([&b, &a]));
    }

    #[test]
    fn test_marker_change_changes_hash() {
        let before = Item::new("a").with_updated_at(Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap());
        let after = Item::new("a").with_updated_at(Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 1).unwrap());
        assert_ne!(compute_events_hash([&before]), compute_events_hash([&after]));
    }

    #[test]
    fn test_id_set_change_changes_hash() {
        let a = Item::new("a");
        let b = Item::new("b");
        assert_ne!(compute_events_hash([&a]), compute_events_hash([&a, &b]));
        // Separators keep "ab" distinct from "a" + "b"
        let ab = Item::new("ab");
        assert_ne!(compute_events_hash([&ab]), compute_events_hash([&a, &b]));
    }

    #[test]
    fn test_short_hex() {
        let hash = compute_events_hash(std::iter::empty::<&Item>());
        assert_eq!(short_hex(&hash).len(), 16);
    }
}
