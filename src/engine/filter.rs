//! Filter-to-dataset reconciliation
//!
//! Turns a filter event into a reduced dataset with the same shape as the
//! original, ready to rebuild the map from.

use crate::model::{CategoryData, Dataset, EntryRecord, FilterEvent};
use log::debug;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

/// Rewrites an entry's popup HTML for the sub-items that survived
pub type PopupCleaner = dyn Fn(&str, &HashSet<String>) -> String + Send + Sync;

/// Allow-lists of one filter event
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterState {
    pub allowed_entry_ids: HashSet<String>,
    pub per_group_allowed_ids: BTreeMap<String, HashSet<String>>,
}

impl FilterState {
    pub fn from_event(event: &FilterEvent) -> Self {
        Self::new(&event.filtered_ids, &event.current_filter_post_ids)
    }

    pub fn new(allowed_ids: &[String], per_group: &BTreeMap<String, Vec<String>>) -> Self {
        Self {
            allowed_entry_ids: allowed_ids.iter().cloned().collect(),
            per_group_allowed_ids: per_group
                .iter()
                .map(|(group, ids)| (group.clone(), ids.iter().cloned().collect()))
                .collect(),
        }
    }

    /// Every list empty means no filter is active, not "exclude everything"
    pub fn is_inactive(&self) -> bool {
        self.allowed_entry_ids.is_empty()
            && self.per_group_allowed_ids.values().all(HashSet::is_empty)
    }
}

/// Result of one reconciliation
#[derive(Debug, Clone, PartialEq)]
pub struct FilterOutcome {
    pub dataset: Dataset,
    /// Entries left across all categories
    pub surviving_entries: usize,
    /// False when the filter was inactive and the original came back unchanged
    pub applied: bool,
}

#[derive(Clone)]
pub struct FilterReconciler {
    cleaner: Arc<PopupCleaner>,
}

impl FilterReconciler {
    /// Reconciler whose popup cleanup leaves popups untouched
    pub fn new() -> Self {
        Self {
            cleaner: Arc::new(|popup: &str, _allowed: &HashSet<String>| popup.to_string()),
        }
    }

    pub fn with_popup_cleaner<F>(cleaner: F) -> Self
    where
        F: Fn(&str, &HashSet<String>) -> String + Send + Sync + 'static,
    {
        Self {
            cleaner: Arc::new(cleaner),
        }
    }

    pub fn apply(&self, original: &Dataset, event: &FilterEvent) -> FilterOutcome {
        self.filter(original, &event.filtered_ids, &event.current_filter_post_ids)
    }

    pub fn filter(
        &self,
        original: &Dataset,
        allowed_ids: &[String],
        per_group: &BTreeMap<String, Vec<String>>,
    ) -> FilterOutcome {
        let state = FilterState::new(allowed_ids, per_group);
        if state.is_inactive() {
            return FilterOutcome {
                dataset: original.clone(),
                surviving_entries: original.entry_count(),
                applied: false,
            };
        }

        let allowed = &state.allowed_entry_ids;
        let mut filtered = Dataset::new();

        for (key, category) in original.iter() {
            let entries: Vec<EntryRecord> = category
                .data
                .iter()
                .filter_map(|entry| self.filter_entry(entry, allowed))
                .collect();

            if entries.is_empty() {
                debug!("Filter dropped category '{}'", key);
                continue;
            }

            filtered.insert(
                key,
                CategoryData {
                    title: category.title.clone(),
                    data: entries,
                    extra: category.extra.clone(),
                },
            );
        }

        let surviving_entries = filtered.entry_count();
        debug!(
            "Filter kept {} of {} entries in {} categories",
            surviving_entries,
            original.entry_count(),
            filtered.len()
        );

        FilterOutcome {
            dataset: filtered,
            surviving_entries,
            applied: true,
        }
    }

    // Entries without sub-items have nothing to match and are dropped.
    fn filter_entry(&self, entry: &EntryRecord, allowed: &HashSet<String>) -> Option<EntryRecord> {
        let items = entry.sub_items.as_ref()?;
        let surviving: Vec<_> = items
            .iter()
            .filter(|item| allowed.contains(&item.id))
            .cloned()
            .collect();
        if surviving.is_empty() {
            return None;
        }

        Some(EntryRecord {
            popup_text: (self.cleaner)(&entry.popup_text, allowed),
            sub_items: Some(surviving),
            ..entry.clone()
        })
    }
}

impl Default for FilterReconciler {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for FilterReconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilterReconciler").finish_non_exhaustive()
    }
}
