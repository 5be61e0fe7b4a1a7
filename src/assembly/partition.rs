//! Grouping records into partitions

use std::collections::BTreeMap;

use crate::dgc::BusinessRule;

/// Group items by key, keys ascending, each group in input order
pub fn partition_by<T, K, F>(items: impl IntoIterator<Item = T>, key: F) -> BTreeMap<K, Vec<T>>
where
    K: Ord,
    F: Fn(&T) -> K,
{
    let mut groups: BTreeMap<K, Vec<T>> = BTreeMap::new();
    for item in items {
        groups.entry(key(&item)).or_default().push(item);
    }
    groups
}

/// Group rules by version
pub fn partition_by_version(rules: Vec<BusinessRule>) -> BTreeMap<u32, Vec<BusinessRule>> {
    partition_by(rules, |rule| rule.version)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rule(hash: &str, version: u32) -> BusinessRule {
        BusinessRule::new("CCL-DE-0001", "Acceptance", "DE", version, hash, json!({}))
    }

    #[test]
    fn test_versions_grouped_completely() {
        let rules = vec![rule("a", 1), rule("b", 1), rule("c", 2), rule("d", 3), rule("e", 2)];
        let groups = partition_by_version(rules);

        let sizes: Vec<_> = groups.iter().map(|(v, rs)| (*v, rs.len())).collect();
        assert_eq!(sizes, vec![(1, 2), (2, 2), (3, 1)]);
        let second: Vec<_> = groups[&2].iter().map(|r| r.hash.as_str()).collect();
        assert_eq!(second, vec!["c", "e"]);
    }

    #[test]
    fn test_empty_input() {
        assert!(partition_by_version(Vec::new()).is_empty());
    }
}
