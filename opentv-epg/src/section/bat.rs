//! BAT (Bouquet Association Table) parsing.
//!
//! OpenTV broadcasters carry their channel line-up in the BAT: each transport
//! stream entry holds one or more OpenTV channel descriptors, one per region.

use super::descriptors::{
    parse_descriptor_loop, BouquetNameDescriptor, ChannelGroupDescriptor, OpenTvChannelDescriptor,
};
use super::psi::PsiSection;
use super::{be_u16, descriptor_tag, length12, table_id};
use crate::error::RecordError;

/// Transport stream entry in the BAT.
#[derive(Debug, Clone, Default)]
pub struct BatTransportStream {
    /// Transport stream ID.
    pub transport_stream_id: u16,
    /// Original network ID.
    pub original_network_id: u16,
    /// OpenTV channel descriptors (one per region).
    pub channel_descriptors: Vec<OpenTvChannelDescriptor>,
    /// Channel-group descriptors.
    pub channel_groups: Vec<ChannelGroupDescriptor>,
}

/// Parsed BAT section.
#[derive(Debug, Clone, Default)]
pub struct BatTable {
    /// Bouquet ID.
    pub bouquet_id: u16,
    /// Version number.
    pub version_number: u8,
    /// Bouquet name (from descriptor).
    pub bouquet_name: Option<String>,
    /// Transport stream loop.
    pub transport_streams: Vec<BatTransportStream>,
    /// Descriptors that failed to decode. The rest of the table is still usable.
    pub errors: Vec<RecordError>,
}

impl BatTable {
    /// Parse a BAT from a section.
    pub fn parse(section: &PsiSection) -> Result<Self, RecordError> {
        if section.header.table_id != table_id::BAT {
            return Err(RecordError::malformed(0, "not a BAT section"));
        }

        let data = section.data;
        let bouquet_descriptors_length = length12(data, 0)?;
        let ts_loop_offset = 2 + bouquet_descriptors_length;
        if ts_loop_offset > data.len() {
            return Err(RecordError::malformed(0, "bouquet descriptors past section end"));
        }

        let mut bat = BatTable {
            bouquet_id: section.header.table_id_extension,
            version_number: section.header.version_number,
            ..Default::default()
        };

        for (tag, body, _) in parse_descriptor_loop(&data[2..ts_loop_offset])? {
            if tag == descriptor_tag::BOUQUET_NAME {
                bat.bouquet_name = Some(BouquetNameDescriptor::parse(body).name);
            }
        }

        let ts_loop_length = length12(data, ts_loop_offset)?;
        let mut offset = ts_loop_offset + 2;
        let ts_loop_end = offset + ts_loop_length;
        if ts_loop_end > data.len() {
            return Err(RecordError::malformed(
                ts_loop_offset,
                "transport stream loop past section end",
            ));
        }

        while offset < ts_loop_end {
            if offset + 6 > ts_loop_end {
                bat.errors
                    .push(RecordError::malformed(offset, "truncated transport stream entry"));
                break;
            }
            let transport_stream_id = be_u16(data, offset)?;
            let original_network_id = be_u16(data, offset + 2)?;
            let descriptors_length = length12(data, offset + 4)?;
            let descriptors_start = offset + 6;
            let next = descriptors_start + descriptors_length;
            if next > ts_loop_end {
                bat.errors.push(RecordError::malformed(
                    offset + 4,
                    "transport descriptors past loop end",
                ));
                break;
            }

            let mut ts = BatTransportStream {
                transport_stream_id,
                original_network_id,
                ..Default::default()
            };
            bat.parse_transport_descriptors(&mut ts, &data[descriptors_start..next], descriptors_start);
            bat.transport_streams.push(ts);

            offset = next;
        }

        Ok(bat)
    }

    fn parse_transport_descriptors(&mut self, ts: &mut BatTransportStream, data: &[u8], base: usize) {
        let descriptors = match parse_descriptor_loop(data) {
            Ok(d) => d,
            Err(RecordError::Malformed { offset, reason }) => {
                self.errors.push(RecordError::malformed(base + offset, reason));
                return;
            }
        };

        for (tag, body, offset) in descriptors {
            let body_offset = base + offset + 2;
            match tag {
                descriptor_tag::OPENTV_CHANNEL => {
                    match OpenTvChannelDescriptor::parse(body, body_offset) {
                        Ok(desc) => ts.channel_descriptors.push(desc),
                        Err(e) => self.errors.push(e),
                    }
                }
                descriptor_tag::CHANNEL_GROUP => match ChannelGroupDescriptor::parse(body, body_offset) {
                    Ok(desc) => ts.channel_groups.push(desc),
                    Err(e) => self.errors.push(e),
                },
                _ => {}
            }
        }
    }

    /// Total number of channel entries across all regions.
    pub fn channel_entry_count(&self) -> usize {
        self.transport_streams
            .iter()
            .flat_map(|ts| ts.channel_descriptors.iter())
            .map(|d| d.channels.len())
            .sum()
    }
}
