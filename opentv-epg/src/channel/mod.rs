//! Channel identity model.
//!
//! Channels are announced by OpenTV channel descriptors in the bouquet
//! association table. The registry keeps them in an arena (`Vec<Channel>`),
//! and everything else refers to a channel by its [`ChannelRef`] index.
//!
//! The registry is filled by the bouquet acquisition phase and then frozen
//! behind an `Arc` for the title and summary loops, which only look channels
//! up.

mod key;

use std::collections::HashMap;

use log::{debug, trace};
use serde::Serialize;

use crate::section::BatTable;
use crate::store::FragmentStore;

pub use key::{ChannelKey, ChannelRef};

/// A registered channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Channel {
    pub key: ChannelKey,
    pub channel_type: u8,
    /// User-facing channel number.
    pub user_number: u16,
    pub bouquet_id: u16,
    pub region_code: u16,
    /// Raw flag bytes from the channel descriptor.
    pub flags: u16,
}

/// Per-entry attributes carried by the channel descriptor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChannelAttributes {
    pub channel_type: u8,
    pub user_number: u16,
    pub flags: u16,
}

/// A bouquet region and its member channels, in registration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Region {
    pub code: u16,
    pub channels: Vec<ChannelRef>,
}

/// A bouquet and its regions, in order of first appearance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bouquet {
    pub id: u16,
    pub name: Option<String>,
    pub regions: Vec<Region>,
}

impl Bouquet {
    fn region_mut(&mut self, code: u16) -> &mut Region {
        let index = match self.regions.iter().position(|r| r.code == code) {
            Some(index) => index,
            None => {
                self.regions.push(Region {
                    code,
                    channels: Vec::new(),
                });
                self.regions.len() - 1
            }
        };
        &mut self.regions[index]
    }
}

/// Restricts registration to one bouquet and optionally one region.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChannelFilter {
    pub bouquet_id: Option<u16>,
    /// `None` accepts any region.
    pub region: Option<u16>,
}

impl ChannelFilter {
    pub fn accepts_bouquet(&self, bouquet_id: u16) -> bool {
        self.bouquet_id.map_or(true, |id| id == bouquet_id)
    }

    pub fn accepts(&self, bouquet_id: u16, region_code: u16) -> bool {
        self.accepts_bouquet(bouquet_id) && self.region.map_or(true, |r| r == region_code)
    }
}

/// Result of [`ChannelRegistry::register`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    /// A new channel was created.
    Added(ChannelRef),
    /// The key was already registered; nothing changed.
    Existing(ChannelRef),
    /// The channel is outside the configured bouquet/region filter.
    Filtered,
}

impl Registration {
    pub fn channel(&self) -> Option<ChannelRef> {
        match self {
            Registration::Added(r) | Registration::Existing(r) => Some(*r),
            Registration::Filtered => None,
        }
    }
}

/// Registration counters for session statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RegistryCounters {
    pub registered: u64,
    pub filtered: u64,
    pub duplicates: u64,
}

/// One line of the channel-map report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChannelReport {
    pub key: ChannelKey,
    pub bouquet_id: u16,
    pub bouquet_name: Option<String>,
    pub region_code: u16,
    pub user_number: u16,
    pub channel_type: u8,
    pub titles: usize,
    pub suspect_titles: usize,
    pub summaries: usize,
}

/// Ordered registry of channels.
#[derive(Debug, Default)]
pub struct ChannelRegistry {
    filter: ChannelFilter,
    channels: Vec<Channel>,
    by_key: HashMap<ChannelKey, ChannelRef>,
    by_channel_id: HashMap<u16, ChannelRef>,
    bouquets: Vec<Bouquet>,
    counters: RegistryCounters,
}

impl ChannelRegistry {
    pub fn new(filter: ChannelFilter) -> Self {
        Self {
            filter,
            ..Default::default()
        }
    }

    pub fn filter(&self) -> ChannelFilter {
        self.filter
    }

    /// Register a channel.
    ///
    /// Registering a key twice is a no-op that returns the existing channel;
    /// the first (bouquet, region) membership is kept. Channels outside the
    /// filter are dropped here and never stored.
    pub fn register(
        &mut self,
        key: ChannelKey,
        bouquet_id: u16,
        region_code: u16,
        attributes: ChannelAttributes,
    ) -> Registration {
        if !self.filter.accepts(bouquet_id, region_code) {
            self.counters.filtered += 1;
            return Registration::Filtered;
        }

        if let Some(&existing) = self.by_key.get(&key) {
            self.counters.duplicates += 1;
            trace!(
                "[Channel] {} already registered (bouquet {}, region {})",
                key,
                bouquet_id,
                region_code
            );
            return Registration::Existing(existing);
        }

        let channel = ChannelRef(self.channels.len());
        self.channels.push(Channel {
            key,
            channel_type: attributes.channel_type,
            user_number: attributes.user_number,
            bouquet_id,
            region_code,
            flags: attributes.flags,
        });
        self.by_key.insert(key, channel);
        if let Some(previous) = self.by_channel_id.get(&key.channel_id) {
            debug!(
                "[Channel] Channel id {} already maps to {}, keeping it over {}",
                key.channel_id, self.channels[previous.0].key, key
            );
        } else {
            self.by_channel_id.insert(key.channel_id, channel);
        }
        self.bouquet_mut(bouquet_id)
            .region_mut(region_code)
            .channels
            .push(channel);
        self.counters.registered += 1;

        Registration::Added(channel)
    }

    fn bouquet_mut(&mut self, id: u16) -> &mut Bouquet {
        let index = match self.bouquets.iter().position(|b| b.id == id) {
            Some(index) => index,
            None => {
                self.bouquets.push(Bouquet {
                    id,
                    name: None,
                    regions: Vec::new(),
                });
                self.bouquets.len() - 1
            }
        };
        &mut self.bouquets[index]
    }

    /// Register every channel entry of a BAT section. Returns the number of
    /// new channels.
    pub fn ingest_bat(&mut self, bat: &BatTable) -> usize {
        if !self.filter.accepts_bouquet(bat.bouquet_id) {
            let entries = bat.channel_entry_count() as u64;
            self.counters.filtered += entries;
            return 0;
        }

        if let Some(name) = &bat.bouquet_name {
            let bouquet = self.bouquet_mut(bat.bouquet_id);
            if bouquet.name.is_none() {
                debug!("[Channel] Bouquet {} is \"{}\"", bat.bouquet_id, name);
                bouquet.name = Some(name.clone());
            }
        }

        let mut added = 0;
        for ts in &bat.transport_streams {
            for descriptor in &ts.channel_descriptors {
                for entry in &descriptor.channels {
                    let key = ChannelKey::new(
                        ts.original_network_id,
                        ts.transport_stream_id,
                        entry.service_id,
                        entry.channel_id,
                    );
                    let attributes = ChannelAttributes {
                        channel_type: entry.channel_type,
                        user_number: entry.user_number,
                        flags: entry.flags,
                    };
                    let registration =
                        self.register(key, bat.bouquet_id, descriptor.region_code, attributes);
                    if let Registration::Added(_) = registration {
                        added += 1;
                    }
                }
            }
        }
        added
    }

    pub fn get(&self, channel: ChannelRef) -> Option<&Channel> {
        self.channels.get(channel.0)
    }

    pub fn find(&self, key: &ChannelKey) -> Option<ChannelRef> {
        self.by_key.get(key).copied()
    }

    /// Look a channel up by the OpenTV channel id that keys title and
    /// summary sections.
    pub fn find_by_channel_table_id(&self, channel_id: u16) -> Option<ChannelRef> {
        self.by_channel_id.get(&channel_id).copied()
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Channels in registration order.
    pub fn iter(&self) -> impl Iterator<Item = (ChannelRef, &Channel)> {
        self.channels
            .iter()
            .enumerate()
            .map(|(i, c)| (ChannelRef(i), c))
    }

    /// Channel refs sorted by (onid, tsid, sid, channel id).
    pub fn sorted_by_key(&self) -> Vec<ChannelRef> {
        let mut refs: Vec<ChannelRef> = (0..self.channels.len()).map(ChannelRef).collect();
        refs.sort_by_key(|r| self.channels[r.0].key);
        refs
    }

    pub fn bouquets(&self) -> &[Bouquet] {
        &self.bouquets
    }

    pub fn bouquet(&self, id: u16) -> Option<&Bouquet> {
        self.bouquets.iter().find(|b| b.id == id)
    }

    pub fn counters(&self) -> RegistryCounters {
        self.counters
    }

    /// Channel-map report, sorted by key.
    pub fn report(&self, store: &FragmentStore) -> Vec<ChannelReport> {
        self.sorted_by_key()
            .into_iter()
            .map(|r| {
                let channel = &self.channels[r.0];
                ChannelReport {
                    key: channel.key,
                    bouquet_id: channel.bouquet_id,
                    bouquet_name: self.bouquet(channel.bouquet_id).and_then(|b| b.name.clone()),
                    region_code: channel.region_code,
                    user_number: channel.user_number,
                    channel_type: channel.channel_type,
                    titles: store.titles.titles(r).len(),
                    suspect_titles: store.titles.suspect(r).len(),
                    summaries: store.summaries.summaries(r).len(),
                }
            })
            .collect()
    }
}
