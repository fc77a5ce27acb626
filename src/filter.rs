//! Scope filter — which activity types get renamed.
//!
//! Allow-all needs no catalog; allow-list resolves the type key to its
//! label and checks membership, treating unknown keys as out of scope.

use std::collections::HashSet;

use crate::catalog::TypeCatalog;
use crate::config::RenamePolicyConfig;

#[derive(Debug, Clone)]
pub enum ChangeFilter {
    AllowAll,
    AllowList(HashSet<String>),
}

impl ChangeFilter {
    pub fn from_config(policy: &RenamePolicyConfig) -> Self {
        match policy {
            RenamePolicyConfig::Labels { labels } => {
                ChangeFilter::AllowList(labels.iter().cloned().collect())
            }
            RenamePolicyConfig::Mode(_) => ChangeFilter::AllowAll,
        }
    }

    /// Whether an activity with this type key is in scope for renaming.
    pub fn in_scope(&self, type_key: &str, catalog: &TypeCatalog) -> bool {
        match self {
            ChangeFilter::AllowAll => true,
            ChangeFilter::AllowList(labels) => labels.contains(&catalog.label_of(type_key)),
        }
    }

    pub fn requires_catalog(&self) -> bool {
        matches!(self, ChangeFilter::AllowList(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::ActivityTypeEntry;

    fn catalog() -> TypeCatalog {
        TypeCatalog::with_entries(vec![ActivityTypeEntry {
            label: "Demo".to_string(),
            key: "demo".to_string(),
        }])
    }

    #[test]
    fn allow_all_matches_anything() {
        let filter = ChangeFilter::AllowAll;
        assert!(filter.in_scope("demo", &catalog()));
        assert!(filter.in_scope("unknown_key", &catalog()));
    }

    #[test]
    fn allow_list_checks_resolved_label() {
        let filter = ChangeFilter::AllowList(["Demo".to_string()].into_iter().collect());
        assert!(filter.in_scope("demo", &catalog()));
        assert!(!filter.in_scope("call", &catalog()));
    }

    #[test]
    fn unknown_key_under_allow_list_is_out_of_scope() {
        // "mystery" resolves to itself, which is not in the label set.
        let filter = ChangeFilter::AllowList(["Demo".to_string()].into_iter().collect());
        assert!(!filter.in_scope("mystery", &catalog()));
    }

    #[test]
    fn built_from_config_forms() {
        let all = ChangeFilter::from_config(&RenamePolicyConfig::Mode("all".into()));
        assert!(matches!(all, ChangeFilter::AllowAll));
        assert!(!all.requires_catalog());

        let list = ChangeFilter::from_config(&RenamePolicyConfig::Labels {
            labels: vec!["Demo".into()],
        });
        assert!(list.requires_catalog());
    }
}
