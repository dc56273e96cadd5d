//! Selection differencing
//!
//! Turns a requested multi-select state into the minimal set of per-source
//! visibility commands against the last-known server state.

use std::collections::BTreeSet;

use crate::error::ReconcileError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VisibilityChange {
    pub source: String,
    pub visible: bool,
}

/// Compute the visibility changes that move `previous` to `requested`
///
/// `names` must be the displayed source list read at the same time as
/// `previous`; indices are only meaningful against that list. Disables come
/// first, then enables, each in index order. Every index in the symmetric
/// difference yields exactly one change.
pub fn diff_selection(
    names: &[String],
    previous: &BTreeSet<usize>,
    requested: &BTreeSet<usize>,
) -> Result<Vec<VisibilityChange>, ReconcileError> {
    let name_at = |index: usize| {
        names
            .get(index)
            .cloned()
            .ok_or(ReconcileError::SelectionOutOfRange {
                index,
                len: names.len(),
            })
    };

    let mut changes = Vec::new();
    for &index in previous.difference(requested) {
        changes.push(VisibilityChange {
            source: name_at(index)?,
            visible: false,
        });
    }
    for &index in requested.difference(previous) {
        changes.push(VisibilityChange {
            source: name_at(index)?,
            visible: true,
        });
    }
    Ok(changes)
}
