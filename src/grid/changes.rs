// SPDX-License-Identifier: GPL-3.0-only

//! Difference between two fetch results
//!
//! Indexes follow the batch-update convention: removals refer to the old
//! result, insertions and reloads to the new one, moves go from old to new.

use crate::library::AssetFetchResult;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeDetails {
    pub fetch_result_before_changes: AssetFetchResult,
    pub fetch_result_after_changes: AssetFetchResult,
    /// False when the change cannot be animated and needs a full reload
    pub has_incremental_changes: bool,
    pub removed_indexes: Vec<usize>,
    pub inserted_indexes: Vec<usize>,
    pub changed_indexes: Vec<usize>,
    pub moves: Vec<(usize, usize)>,
}

impl ChangeDetails {
    /// A change that can only be shown by reloading everything
    pub fn full_reload(before: AssetFetchResult, after: AssetFetchResult) -> Self {
        Self {
            fetch_result_before_changes: before,
            fetch_result_after_changes: after,
            has_incremental_changes: false,
            removed_indexes: Vec::new(),
            inserted_indexes: Vec::new(),
            changed_indexes: Vec::new(),
            moves: Vec::new(),
        }
    }

    /// An incremental change with explicit index sets
    pub fn incremental(
        before: AssetFetchResult,
        after: AssetFetchResult,
        removed: Vec<usize>,
        inserted: Vec<usize>,
        changed: Vec<usize>,
        moves: Vec<(usize, usize)>,
    ) -> Self {
        Self {
            fetch_result_before_changes: before,
            fetch_result_after_changes: after,
            has_incremental_changes: true,
            removed_indexes: removed,
            inserted_indexes: inserted,
            changed_indexes: changed,
            moves,
        }
    }

    /// Diff two results by asset identifier
    ///
    /// Assets present in both results must keep their relative order; a
    /// reordering is reported as a full reload.
    pub fn between(before: AssetFetchResult, after: AssetFetchResult) -> Self {
        let old_positions: HashMap<&str, usize> = before
            .iter()
            .enumerate()
            .map(|(i, asset)| (asset.local_identifier.as_str(), i))
            .collect();
        let new_positions: HashMap<&str, usize> = after
            .iter()
            .enumerate()
            .map(|(i, asset)| (asset.local_identifier.as_str(), i))
            .collect();

        let removed: Vec<usize> = before
            .iter()
            .enumerate()
            .filter(|(_, asset)| !new_positions.contains_key(asset.local_identifier.as_str()))
            .map(|(i, _)| i)
            .collect();

        let mut inserted = Vec::new();
        let mut changed = Vec::new();
        let mut last_old_index = None;
        let mut reordered = false;
        for (new_index, asset) in after.iter().enumerate() {
            let Some(&old_index) = old_positions.get(asset.local_identifier.as_str()) else {
                inserted.push(new_index);
                continue;
            };
            if last_old_index.is_some_and(|last| old_index < last) {
                reordered = true;
                break;
            }
            last_old_index = Some(old_index);
            if before.get(old_index) != Some(asset) {
                changed.push(new_index);
            }
        }
        if reordered {
            return Self::full_reload(before, after);
        }

        Self::incremental(before, after, removed, inserted, changed, Vec::new())
    }

    pub fn has_moves(&self) -> bool {
        !self.moves.is_empty()
    }

    pub fn is_empty(&self) -> bool {
        self.has_incremental_changes
            && self.removed_indexes.is_empty()
            && self.inserted_indexes.is_empty()
            && self.changed_indexes.is_empty()
            && self.moves.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::{Asset, MediaType};

    fn asset(id: &str, width: u32) -> Asset {
        Asset {
            local_identifier: id.to_string(),
            media_type: MediaType::Image,
            pixel_width: width,
            pixel_height: width,
            creation_date: None,
            is_live_photo: false,
        }
    }

    fn result(assets: &[Asset]) -> AssetFetchResult {
        AssetFetchResult::new(assets.to_vec())
    }

    #[test]
    fn test_between_detects_insert_remove_change() {
        let before = result(&[asset("a", 1), asset("b", 1), asset("c", 1)]);
        let after = result(&[asset("new", 1), asset("a", 1), asset("c", 2)]);

        let changes = ChangeDetails::between(before, after);
        assert!(changes.has_incremental_changes);
        assert_eq!(changes.removed_indexes, vec![1]);
        assert_eq!(changes.inserted_indexes, vec![0]);
        assert_eq!(changes.changed_indexes, vec![2]);
        assert!(!changes.has_moves());
    }

    #[test]
    fn test_reorder_forces_full_reload() {
        let before = result(&[asset("a", 1), asset("b", 1)]);
        let after = result(&[asset("b", 1), asset("a", 1)]);

        let changes = ChangeDetails::between(before, after);
        assert!(!changes.has_incremental_changes);
        assert!(!changes.is_empty());
    }

    #[test]
    fn test_identical_results_are_empty() {
        let assets = [asset("a", 1)];
        assert!(ChangeDetails::between(result(&assets), result(&assets)).is_empty());
    }
}
