//! Selection of the data columns a reader materializes.

use std::collections::BTreeSet;

/// The set of columns to read.
///
/// `read_all` selects everything available. Otherwise the requested names
/// present in `available` are kept; an empty request reads no columns.
/// Requested names that are not available are dropped.
pub fn effective_read_set(
    requested: &BTreeSet<String>,
    read_all: bool,
    available: &BTreeSet<String>,
) -> BTreeSet<String> {
    if read_all {
        return available.clone();
    }

    for name in requested.difference(available) {
        log::debug!("requested column '{name}' is not present; skipping");
    }

    requested.intersection(available).cloned().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_empty_request_reads_nothing() {
        assert!(effective_read_set(&set(&[]), false, &set(&["CI", "Fit"])).is_empty());
    }

    #[test]
    fn test_read_all_overrides_request() {
        assert_eq!(
            effective_read_set(&set(&[]), true, &set(&["CI", "Fit"])),
            set(&["CI", "Fit"])
        );
        assert_eq!(
            effective_read_set(&set(&["X"]), true, &set(&["CI", "Fit"])),
            set(&["CI", "Fit"])
        );
    }

    #[test]
    fn test_intersection_drops_missing() {
        assert_eq!(
            effective_read_set(&set(&["CI", "X"]), false, &set(&["CI", "Fit"])),
            set(&["CI"])
        );
    }

    #[test]
    fn test_empty_available() {
        assert!(effective_read_set(&set(&["CI"]), false, &set(&[])).is_empty());
        assert!(effective_read_set(&set(&[]), true, &set(&[])).is_empty());
    }
}
