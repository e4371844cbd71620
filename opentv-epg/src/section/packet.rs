//! MPEG-TS packet parsing, enough to pull private sections out of a capture.

/// TS packet size in bytes.
pub const TS_PACKET_SIZE: usize = 188;

/// TS sync byte (0x47).
pub const SYNC_BYTE: u8 = 0x47;

/// A parsed TS packet.
#[derive(Debug, Clone)]
pub struct TsPacket<'a> {
    /// Transport error indicator.
    pub transport_error: bool,
    /// Payload unit start indicator.
    pub payload_unit_start: bool,
    /// Packet Identifier (13 bits).
    pub pid: u16,
    /// Transport scrambling control (2 bits).
    pub scrambling_control: u8,
    /// Continuity counter (4 bits).
    pub continuity_counter: u8,
    /// Payload data (empty when the packet carries none).
    pub payload: &'a [u8],
}

impl<'a> TsPacket<'a> {
    /// Parse a TS packet from at least 188 bytes.
    pub fn parse(data: &'a [u8]) -> Result<Self, &'static str> {
        if data.len() < TS_PACKET_SIZE {
            return Err("Packet too short");
        }

        if data[0] != SYNC_BYTE {
            return Err("Invalid sync byte");
        }

        let adaptation_field_control = (data[3] >> 4) & 0x03;

        let offset = if adaptation_field_control & 0x02 != 0 {
            5 + data[4] as usize
        } else {
            4
        };

        let payload = if adaptation_field_control & 0x01 != 0 && offset < TS_PACKET_SIZE {
            &data[offset..TS_PACKET_SIZE]
        } else {
            &[]
        };

        Ok(TsPacket {
            transport_error: data[1] & 0x80 != 0,
            payload_unit_start: data[1] & 0x40 != 0,
            pid: ((data[1] as u16 & 0x1F) << 8) | data[2] as u16,
            scrambling_control: (data[3] >> 6) & 0x03,
            continuity_counter: data[3] & 0x0F,
            payload,
        })
    }

    /// True when the packet can contribute section bytes.
    pub fn carries_sections(&self) -> bool {
        !self.transport_error && self.scrambling_control == 0 && !self.payload.is_empty()
    }
}

/// Iterator over TS packets in a byte stream, resyncing on bad sync bytes.
pub struct TsPacketIterator<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> TsPacketIterator<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        let offset = data
            .iter()
            .position(|&b| b == SYNC_BYTE)
            .unwrap_or(data.len());
        Self { data, offset }
    }

    /// Bytes not yet consumed (an incomplete trailing packet).
    pub fn remainder(&self) -> &'a [u8] {
        &self.data[self.offset.min(self.data.len())..]
    }

    fn resync(&mut self) {
        self.offset += 1;
        while self.offset < self.data.len() && self.data[self.offset] != SYNC_BYTE {
            self.offset += 1;
        }
    }
}

impl<'a> Iterator for TsPacketIterator<'a> {
    type Item = TsPacket<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        while self.offset + TS_PACKET_SIZE <= self.data.len() {
            match TsPacket::parse(&self.data[self.offset..]) {
                Ok(packet) => {
                    self.offset += TS_PACKET_SIZE;
                    return Some(packet);
                }
                Err(_) => self.resync(),
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn packet(pid: u16, pusi: bool, cc: u8) -> [u8; TS_PACKET_SIZE] {
        let mut p = [0xFFu8; TS_PACKET_SIZE];
        p[0] = SYNC_BYTE;
        p[1] = ((pid >> 8) as u8 & 0x1F) | if pusi { 0x40 } else { 0 };
        p[2] = pid as u8;
        p[3] = 0x10 | (cc & 0x0F);
        p
    }

    #[test]
    fn test_parse_payload_packet() {
        let raw = packet(0x0030, true, 5);
        let parsed = TsPacket::parse(&raw).unwrap();
        assert_eq!(parsed.pid, 0x0030);
        assert!(parsed.payload_unit_start);
        assert_eq!(parsed.continuity_counter, 5);
        assert_eq!(parsed.payload.len(), 184);
        assert!(parsed.carries_sections());
    }

    #[test]
    fn test_adaptation_only_packet_has_no_payload() {
        let mut raw = packet(0x0030, false, 0);
        raw[3] = 0x20;
        raw[4] = 183;
        let parsed = TsPacket::parse(&raw).unwrap();
        assert!(parsed.payload.is_empty());
        assert!(!parsed.carries_sections());
    }

    #[test]
    fn test_invalid_sync_byte() {
        let mut raw = packet(0x0030, false, 0);
        raw[0] = 0x00;
        assert!(TsPacket::parse(&raw).is_err());
    }

    #[test]
    fn test_iterator_resyncs() {
        let mut stream = vec![0x00, 0x12];
        stream.extend_from_slice(&packet(0x0040, true, 0));
        stream.extend_from_slice(&packet(0x0041, false, 1));
        stream.extend_from_slice(&[SYNC_BYTE, 0x00]);

        let mut iter = TsPacketIterator::new(&stream);
        let pids: Vec<u16> = iter.by_ref().map(|p| p.pid).collect();
        assert_eq!(pids, vec![0x0040, 0x0041]);
        assert_eq!(iter.remainder(), &[SYNC_BYTE, 0x00]);
    }
}
