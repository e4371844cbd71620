//! Program fragment store.
//!
//! Each channel owns two ordered lists: title fragments by start time and
//! summary fragments by event id. Carousels repeat the same records many
//! times and deliver them out of order, so every insert is a merge: a
//! fragment whose key is already present is dropped, otherwise it goes in
//! front of the first fragment with a greater key.
//!
//! `add_title` and `add_summary` are the only mutation entry points. The
//! title and summary halves are separate types so the two acquisition loops
//! can own them independently.

mod fragment;
mod summaries;
mod titles;

pub use fragment::{SummaryFragment, TitleFragment};
pub use summaries::SummaryStore;
pub use titles::TitleStore;

/// What an insert did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    /// A fragment with the same key is already stored; the new one was dropped.
    Duplicate,
    /// The fragment went to the suspect list.
    Suspect,
}

/// Merge `item` into `list`, which is ascending by `key`.
fn merge_ordered<T, K: Ord>(list: &mut Vec<T>, item: T, key: impl Fn(&T) -> K) -> bool {
    let new_key = key(&item);
    match list.iter().position(|existing| key(existing) >= new_key) {
        Some(index) if key(&list[index]) == new_key => false,
        Some(index) => {
            list.insert(index, item);
            true
        }
        None => {
            list.push(item);
            true
        }
    }
}

/// Per-channel lists indexed by [`ChannelRef`](crate::channel::ChannelRef).
fn slot<T>(lists: &mut Vec<Vec<T>>, index: usize) -> &mut Vec<T> {
    if lists.len() <= index {
        lists.resize_with(index + 1, Vec::new);
    }
    &mut lists[index]
}

/// Both halves of a frequency's fragments, handed to synthesis.
#[derive(Debug, Default)]
pub struct FragmentStore {
    pub titles: TitleStore,
    pub summaries: SummaryStore,
}

impl FragmentStore {
    pub fn new(route_suspect_start_times: bool) -> Self {
        Self {
            titles: TitleStore::new(route_suspect_start_times),
            summaries: SummaryStore::new(),
        }
    }

    pub fn from_parts(titles: TitleStore, summaries: SummaryStore) -> Self {
        Self { titles, summaries }
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_ordered() {
        let mut list = Vec::new();
        for v in [5, 1, 3, 5, 9, 1, 4] {
            merge_ordered(&mut list, v, |v| *v);
        }
        assert_eq!(list, vec![1, 3, 4, 5, 9]);
    }

    #[test]
    fn test_merge_keeps_first_of_equal_keys() {
        let mut list: Vec<(u8, &str)> = Vec::new();
        assert!(merge_ordered(&mut list, (2, "first"), |v| v.0));
        assert!(!merge_ordered(&mut list, (2, "second"), |v| v.0));
        assert_eq!(list, vec![(2, "first")]);
    }
}
