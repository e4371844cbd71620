use crate::channel::ChannelRef;

use super::{merge_ordered, slot, InsertOutcome, TitleFragment};

/// Title fragments per channel, ascending by start time.
#[derive(Debug, Default)]
pub struct TitleStore {
    route_suspect: bool,
    channels: Vec<Vec<TitleFragment>>,
    suspect: Vec<Vec<TitleFragment>>,
}

impl TitleStore {
    /// With `route_suspect` set, fragments whose start time is not on a
    /// whole minute go to a separate suspect list instead of the main one.
    pub fn new(route_suspect: bool) -> Self {
        Self {
            route_suspect,
            ..Default::default()
        }
    }

    /// Merge a title fragment into the channel's list. A fragment with the
    /// same start time as a stored one is dropped, whatever its event id.
    pub fn add_title(&mut self, channel: ChannelRef, fragment: TitleFragment) -> InsertOutcome {
        if self.route_suspect && fragment.has_suspect_start() {
            let list = slot(&mut self.suspect, channel.index());
            return if merge_ordered(list, fragment, |f| f.start_time) {
                InsertOutcome::Suspect
            } else {
                InsertOutcome::Duplicate
            };
        }

        let list = slot(&mut self.channels, channel.index());
        if merge_ordered(list, fragment, |f| f.start_time) {
            InsertOutcome::Inserted
        } else {
            InsertOutcome::Duplicate
        }
    }

    pub fn titles(&self, channel: ChannelRef) -> &[TitleFragment] {
        self.channels
            .get(channel.index())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn suspect(&self, channel: ChannelRef) -> &[TitleFragment] {
        self.suspect
            .get(channel.index())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Every suspect fragment with its channel.
    pub fn iter_suspect(&self) -> impl Iterator<Item = (ChannelRef, &TitleFragment)> {
        self.suspect
            .iter()
            .enumerate()
            .flat_map(|(i, list)| list.iter().map(move |f| (ChannelRef(i), f)))
    }

    /// Main-list fragments across all channels.
    pub fn title_count(&self) -> usize {
        self.channels.iter().map(Vec::len).sum()
    }

    pub fn suspect_count(&self) -> usize {
        self.suspect.iter().map(Vec::len).sum()
    }

    /// All stored fragments, suspect ones included.
    pub fn fragment_count(&self) -> usize {
        self.title_count() + self.suspect_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::testutil::{at, title};

    const CH: ChannelRef = ChannelRef(0);

    #[test]
    fn test_titles_ascending_without_duplicates_for_any_order() {
        let starts = [(20, 0), (18, 30), (21, 0), (18, 30), (19, 0), (20, 0), (6, 0)];

        // Every rotation of the arrival order gives the same list
        for rotation in 0..starts.len() {
            let mut store = TitleStore::new(false);
            for i in 0..starts.len() {
                let (h, m) = starts[(i + rotation) % starts.len()];
                store.add_title(CH, title(i as u16, at(h, m, 0), 30));
            }

            let list = store.titles(CH);
            assert_eq!(list.len(), 5);
            assert!(list.windows(2).all(|w| w[0].start_time < w[1].start_time));
        }
    }

    #[test]
    fn test_same_start_different_event_is_dropped() {
        let mut store = TitleStore::new(false);
        assert_eq!(store.add_title(CH, title(1, at(20, 0, 0), 30)), InsertOutcome::Inserted);
        assert_eq!(store.add_title(CH, title(2, at(20, 0, 0), 60)), InsertOutcome::Duplicate);

        let list = store.titles(CH);
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].event_id, 1);
    }

    #[test]
    fn test_suspect_routing() {
        let mut store = TitleStore::new(true);
        assert_eq!(store.add_title(CH, title(1, at(20, 0, 0), 30)), InsertOutcome::Inserted);
        assert_eq!(store.add_title(CH, title(2, at(20, 30, 14), 30)), InsertOutcome::Suspect);
        assert_eq!(store.add_title(CH, title(3, at(20, 30, 14), 30)), InsertOutcome::Duplicate);

        assert_eq!(store.titles(CH).len(), 1);
        assert_eq!(store.suspect(CH).len(), 1);
        assert_eq!(store.fragment_count(), 2);
        assert_eq!(store.iter_suspect().next().unwrap().1.event_id, 2);
    }

    #[test]
    fn test_suspect_kept_in_main_list_without_routing() {
        let mut store = TitleStore::new(false);
        store.add_title(CH, title(2, at(20, 30, 14), 30));
        assert_eq!(store.titles(CH).len(), 1);
        assert_eq!(store.suspect_count(), 0);
    }

    #[test]
    fn test_channels_are_independent() {
        let mut store = TitleStore::new(false);
        store.add_title(ChannelRef(3), title(1, at(20, 0, 0), 30));
        store.add_title(CH, title(1, at(20, 0, 0), 30));
        assert_eq!(store.titles(ChannelRef(3)).len(), 1);
        assert_eq!(store.titles(CH).len(), 1);
        assert!(store.titles(ChannelRef(9)).is_empty());
    }
}
