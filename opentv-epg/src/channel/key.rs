//! Channel identification key.

use std::fmt;

use serde::Serialize;

/// The identity of a broadcast channel.
///
/// The broadcast triple alone is not unique in an OpenTV line-up: the same
/// service can be announced under several OpenTV channel ids, so the channel
/// id is part of the key. Field order is the reporting sort order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct ChannelKey {
    pub original_network_id: u16,
    pub transport_stream_id: u16,
    pub service_id: u16,
    /// OpenTV channel id, the table id extension of title/summary sections.
    pub channel_id: u16,
}

impl ChannelKey {
    pub fn new(original_network_id: u16, transport_stream_id: u16, service_id: u16, channel_id: u16) -> Self {
        Self {
            original_network_id,
            transport_stream_id,
            service_id,
            channel_id,
        }
    }
}

impl fmt::Display for ChannelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}.{}/{}",
            self.original_network_id, self.transport_stream_id, self.service_id, self.channel_id
        )
    }
}

/// Index of a channel in its [`ChannelRegistry`](super::ChannelRegistry).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ChannelRef(pub(crate) usize);

impl ChannelRef {
    pub fn index(self) -> usize {
        self.0
    }
}
