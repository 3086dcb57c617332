//! Filter engine: a pure predicate deciding whether an entry is packed.

use crate::model::{Entry, EntryKind, Filter};

/// Returns true if `entry` satisfies every active constraint in `filter`.
///
/// Size bounds only apply to files. The owner constraint passes when the
/// platform reported no owner for the entry.
pub fn matches(entry: &Entry, filter: &Filter) -> bool {
    if let Some(needle) = &filter.name_contains {
        if !entry.name().contains(needle.as_str()) {
            return false;
        }
    }

    if let Some(needle) = &filter.path_contains {
        if !entry.relative_path.contains(needle.as_str()) {
            return false;
        }
    }

    if let Some(kind) = filter.kind {
        if entry.kind != kind {
            return false;
        }
    }

    if entry.kind == EntryKind::File {
        if filter.min_size > 0 && entry.size_bytes < filter.min_size {
            return false;
        }
        if filter.max_size > 0 && entry.size_bytes > filter.max_size {
            return false;
        }
    }

    if filter.not_before != 0 && entry.modified_time < filter.not_before {
        return false;
    }

    match (filter.owner_id, entry.owner_id) {
        (Some(wanted), Some(owner)) => wanted == owner,
        _ => true,
    }
}
