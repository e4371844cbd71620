use crate::channel::ChannelRef;

use super::{merge_ordered, slot, InsertOutcome, SummaryFragment};

/// Summary fragments per channel, ascending by event id.
#[derive(Debug, Default)]
pub struct SummaryStore {
    channels: Vec<Vec<SummaryFragment>>,
}

impl SummaryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge a summary fragment into the channel's list; a repeated event id
    /// is dropped.
    pub fn add_summary(&mut self, channel: ChannelRef, fragment: SummaryFragment) -> InsertOutcome {
        let list = slot(&mut self.channels, channel.index());
        if merge_ordered(list, fragment, |f| f.event_id) {
            InsertOutcome::Inserted
        } else {
            InsertOutcome::Duplicate
        }
    }

    pub fn summaries(&self, channel: ChannelRef) -> &[SummaryFragment] {
        self.channels
            .get(channel.index())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Summary for `event_id` on `channel`.
    pub fn find(&self, channel: ChannelRef, event_id: u16) -> Option<&SummaryFragment> {
        let list = self.summaries(channel);
        list.binary_search_by_key(&event_id, |f| f.event_id)
            .ok()
            .map(|index| &list[index])
    }

    pub fn fragment_count(&self) -> usize {
        self.channels.iter().map(Vec::len).sum()
    }
}
