//! Descriptor parsing for the bouquet association table.

use encoding_rs::{UTF_8, WINDOWS_1252};

use super::{be_u16, tagged_records};
use crate::error::RecordError;

/// Parse a descriptor loop into `(tag, body, offset)` items.
///
/// Offsets are relative to `data`.
pub fn parse_descriptor_loop(data: &[u8]) -> Result<Vec<(u8, &[u8], usize)>, RecordError> {
    tagged_records(data, 0, data.len())
}

/// Bouquet name descriptor (0x47).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BouquetNameDescriptor {
    pub name: String,
}

impl BouquetNameDescriptor {
    pub fn parse(data: &[u8]) -> Self {
        Self {
            name: decode_dvb_text(data),
        }
    }
}

/// One channel entry of an OpenTV channel descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenTvChannelEntry {
    pub service_id: u16,
    pub channel_type: u8,
    pub channel_id: u16,
    pub user_number: u16,
    pub flags: u16,
}

/// OpenTV channel descriptor (0xB1): the channels of one region.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OpenTvChannelDescriptor {
    pub region_code: u16,
    pub channels: Vec<OpenTvChannelEntry>,
}

impl OpenTvChannelDescriptor {
    const ENTRY_SIZE: usize = 9;

    /// Parse the descriptor body. `base` is its offset inside the section body.
    pub fn parse(data: &[u8], base: usize) -> Result<Self, RecordError> {
        let region_code =
            be_u16(data, 0).map_err(|_| RecordError::malformed(base, "channel descriptor too short"))?;

        let entries = &data[2..];
        if entries.len() % Self::ENTRY_SIZE != 0 {
            return Err(RecordError::malformed(
                base + 2,
                "channel descriptor has a partial entry",
            ));
        }

        let channels = entries
            .chunks_exact(Self::ENTRY_SIZE)
            .map(|e| OpenTvChannelEntry {
                service_id: ((e[0] as u16) << 8) | e[1] as u16,
                channel_type: e[2],
                channel_id: ((e[3] as u16) << 8) | e[4] as u16,
                user_number: ((e[5] as u16) << 8) | e[6] as u16,
                flags: ((e[7] as u16) << 8) | e[8] as u16,
            })
            .collect();

        Ok(Self {
            region_code,
            channels,
        })
    }
}

/// OpenTV channel-group descriptor (0xB2).
///
/// ```text
/// type(8) flags(8) length(4) reserved(4) [group_id(8) ...] description...
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelGroupDescriptor {
    pub group_type: u8,
    pub flags: u8,
    pub group_id: Option<u8>,
    /// Compressed description, only expanded for diagnostics.
    pub description: Vec<u8>,
}

impl ChannelGroupDescriptor {
    /// Parse the descriptor body. `base` is its offset inside the section body.
    pub fn parse(data: &[u8], base: usize) -> Result<Self, RecordError> {
        if data.len() < 3 {
            return Err(RecordError::malformed(base, "channel group descriptor too short"));
        }

        let group_type = data[0];
        let flags = data[1];
        let length = (data[2] >> 4) as usize;

        let (group_id, cursor) = if length > 0 {
            if data.len() < 3 + length {
                return Err(RecordError::malformed(
                    base + 2,
                    "channel group length past descriptor end",
                ));
            }
            (Some(data[3]), 3 + length)
        } else {
            (None, 3)
        };

        Ok(Self {
            group_type,
            flags,
            group_id,
            description: data[cursor..].to_vec(),
        })
    }
}

/// Decode DVB text: a leading 0x15 selects UTF-8, other selector bytes are
/// skipped and the rest is read as Latin-1.
fn decode_dvb_text(data: &[u8]) -> String {
    match data.first() {
        None => String::new(),
        Some(0x15) => UTF_8.decode_without_bom_handling(&data[1..]).0.into_owned(),
        Some(&b) if b < 0x20 => WINDOWS_1252
            .decode_without_bom_handling(&data[1..])
            .0
            .into_owned(),
        Some(_) => WINDOWS_1252.decode_without_bom_handling(data).0.into_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bouquet_name() {
        assert_eq!(BouquetNameDescriptor::parse(b"Sky UK").name, "Sky UK");
        assert_eq!(
            BouquetNameDescriptor::parse(&[0x15, 0xC3, 0xA9, b'!']).name,
            "\u{e9}!"
        );
        assert_eq!(BouquetNameDescriptor::parse(&[b'T', 0xE9]).name, "T\u{e9}");
    }

    #[test]
    fn test_parse_channel_descriptor() {
        let data = [
            0x00, 0x32, // region 50
            0x0F, 0x3C, 0x01, 0x07, 0xD1, 0x00, 0x65, 0x00, 0x00, // sid 3900, ch 2001, #101
            0x0F, 0x3D, 0x19, 0x07, 0xD2, 0x00, 0x66, 0x80, 0x01,
        ];
        let desc = OpenTvChannelDescriptor::parse(&data, 0).unwrap();
        assert_eq!(desc.region_code, 50);
        assert_eq!(desc.channels.len(), 2);
        assert_eq!(desc.channels[0].service_id, 3900);
        assert_eq!(desc.channels[0].channel_id, 2001);
        assert_eq!(desc.channels[0].user_number, 101);
        assert_eq!(desc.channels[1].channel_type, 0x19);
        assert_eq!(desc.channels[1].flags, 0x8001);
    }

    #[test]
    fn test_channel_descriptor_partial_entry() {
        let data = [0x00, 0x32, 0x0F, 0x3C, 0x01];
        let err = OpenTvChannelDescriptor::parse(&data, 10).unwrap_err();
        assert_eq!(
            err,
            RecordError::malformed(12, "channel descriptor has a partial entry")
        );
    }

    #[test]
    fn test_parse_channel_group() {
        let data = [0x02, 0x80, 0x20, 0x07, 0xEE, 0xAB, 0xCD];
        let desc = ChannelGroupDescriptor::parse(&data, 0).unwrap();
        assert_eq!(desc.group_type, 0x02);
        assert_eq!(desc.flags, 0x80);
        assert_eq!(desc.group_id, Some(0x07));
        assert_eq!(desc.description, vec![0xAB, 0xCD]);

        let data = [0x01, 0x00, 0x00, 0x55];
        let desc = ChannelGroupDescriptor::parse(&data, 0).unwrap();
        assert_eq!(desc.group_id, None);
        assert_eq!(desc.description, vec![0x55]);
    }

    #[test]
    fn test_channel_group_length_overrun() {
        let data = [0x01, 0x00, 0x50, 0x01];
        assert!(ChannelGroupDescriptor::parse(&data, 0).is_err());
    }
}
