//! Layered merging of named configuration objects.

use std::collections::BTreeMap;

/// Merge two lists of named objects. Entries from `overrides` replace entries
/// from `defaults` that carry the same name; everything else is kept.
/// The result is ordered by name so downstream output stays deterministic.
pub fn merge_named<T, F>(defaults: &[T], overrides: &[T], name_of: F) -> Vec<T>
where
    T: Clone,
    F: Fn(&T) -> &str,
{
    let mut merged: BTreeMap<String, T> = BTreeMap::new();

    for item in defaults {
        merged.insert(name_of(item).to_string(), item.clone());
    }

    for item in overrides {
        merged.insert(name_of(item).to_string(), item.clone());
    }

    merged.into_values().collect()
}
