use std::io::Read;

use crc::{Crc, CRC_32_MPEG_2};

/// One packet on the serial link. Carries either an uplink frame to the OBC or a downlink
/// frame from it.
///
/// ```text
/// +------+--------+--------+----------------+-----------+
/// | 0x8B | len_lo | len_hi | data[0..len]   | crc32 LE  |
/// +------+--------+--------+----------------+-----------+
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkPacket(pub Vec<u8>);

impl LinkPacket {
    pub const HEADER: u8 = 0x8b;
    pub const MAXIMUM_DATA_LENGTH: usize = 2048;
    pub const MAXIMUM_PACKET_LENGTH: usize = 7 + Self::MAXIMUM_DATA_LENGTH;

    const CRC: Crc<u32> = Crc::<u32>::new(&CRC_32_MPEG_2);

    /// Calculates the CRC32 MPEG-2 checksum for the contained data
    pub fn checksum(&self) -> u32 {
        Self::CRC.checksum(&self.0)
    }

    pub fn crc_is_valid(data: &[u8], checksum: u32) -> bool {
        LinkPacket::CRC.checksum(data) == checksum
    }

    pub fn data(&self) -> &[u8] {
        &self.0
    }

    pub fn into_data(self) -> Vec<u8> {
        self.0
    }

    pub fn serialize(&self) -> Vec<u8> {
        let mut v = Vec::with_capacity(7 + self.0.len());
        v.push(Self::HEADER);
        v.extend((self.0.len() as u16).to_le_bytes());
        v.extend(&self.0);
        v.extend(self.checksum().to_le_bytes());
        v
    }

    /// Reads exactly one packet. A first byte that is not the packet header is consumed and
    /// reported as [`LinkParseError::InvalidHeader`], so calling again resynchronizes on the
    /// next header.
    pub fn try_from_read(reader: &mut (impl Read + ?Sized)) -> Result<Self, LinkParseError> {
        let mut header_buffer = [0; 1];
        reader.read_exact(&mut header_buffer)?;
        if header_buffer[0] != Self::HEADER {
            return Err(LinkParseError::InvalidHeader(header_buffer[0]));
        }

        let mut length_buffer = [0; 2];
        reader.read_exact(&mut length_buffer)?;
        let length = u16::from_le_bytes(length_buffer) as usize;
        if length > Self::MAXIMUM_DATA_LENGTH {
            return Err(LinkParseError::InvalidLength(length));
        }

        let mut data_buffer = vec![0; length];
        reader.read_exact(&mut data_buffer)?;

        let mut crc_buffer = [0; 4];
        reader.read_exact(&mut crc_buffer)?;
        if !LinkPacket::crc_is_valid(&data_buffer, u32::from_le_bytes(crc_buffer)) {
            return Err(LinkParseError::InvalidCRC);
        }

        Ok(LinkPacket(data_buffer))
    }
}

/// Collects bytes as they arrive and cuts complete packets out of them. Bytes of a packet
/// that is not complete yet stay buffered across reads, so a source that pauses or times out
/// in the middle of a packet loses nothing.
#[derive(Debug, Default)]
pub struct PacketAssembler {
    buffer: Vec<u8>,
}

impl PacketAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn extend(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Number of bytes waiting for the rest of their packet
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Takes the next packet out of the buffer. `None` means more bytes are needed.
    ///
    /// A stray byte in front of a header and a header announcing an impossible length each
    /// consume one byte. A packet with a bad checksum is consumed whole.
    pub fn next_packet(&mut self) -> Option<Result<LinkPacket, LinkParseError>> {
        let &first = self.buffer.first()?;
        if first != LinkPacket::HEADER {
            self.buffer.remove(0);
            return Some(Err(LinkParseError::InvalidHeader(first)));
        }

        let length = u16::from_le_bytes([*self.buffer.get(1)?, *self.buffer.get(2)?]) as usize;
        if length > LinkPacket::MAXIMUM_DATA_LENGTH {
            self.buffer.remove(0);
            return Some(Err(LinkParseError::InvalidLength(length)));
        }

        let packet_length = 7 + length;
        if self.buffer.len() < packet_length {
            return None;
        }

        let packet: Vec<u8> = self.buffer.drain(..packet_length).collect();
        let data = &packet[3..3 + length];
        let mut crc_buffer = [0; 4];
        crc_buffer.copy_from_slice(&packet[3 + length..]);
        if !LinkPacket::crc_is_valid(data, u32::from_le_bytes(crc_buffer)) {
            return Some(Err(LinkParseError::InvalidCRC));
        }

        Some(Ok(LinkPacket(data.to_vec())))
    }
}

impl From<&LinkPacket> for Vec<u8> {
    fn from(value: &LinkPacket) -> Self {
        value.serialize()
    }
}

impl TryFrom<Vec<u8>> for LinkPacket {
    type Error = LinkParseError;

    fn try_from(value: Vec<u8>) -> Result<Self, Self::Error> {
        Self::try_from_read(&mut std::io::Cursor::new(value))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LinkParseError {
    #[error("byte {0:#04x} is not a packet header")]
    InvalidHeader(u8),
    #[error("packet announces {0} data bytes")]
    InvalidLength(usize),
    #[error("packet checksum mismatch")]
    InvalidCRC,
    #[error("link I/O failed: {0}")]
    Io(#[from] std::io::Error),
}
