use crate::telemetry::{BitCursor, BitWriter};
use strum::{Display, FromRepr};

/// Identifies the originating request of a response. Wraps around modulo 256.
pub type CorrelationId = u8;

/// Application process id: the kind discriminator of a downlink frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, FromRepr, Display)]
#[repr(u8)]
pub enum Apid {
    Pong = 0x01,
    Operation = 0x02,
    Terminal = 0x03,
    FileSend = 0x04,
    FileRemove = 0x05,
    FileList = 0x06,
    Photo = 0x07,
    Beacon = 0x3F,
}

impl Apid {
    pub const BITS: usize = 6;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    Success,
    Error(u8),
}

impl Status {
    pub fn from_code(code: u8) -> Self {
        match code {
            0 => Status::Success,
            c => Status::Error(c),
        }
    }

    pub fn code(self) -> u8 {
        match self {
            Status::Success => 0,
            Status::Error(c) => c,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResponseKind {
    pub apid: Apid,
    pub status: Status,
}

/// One decoded downlink frame
///
/// ```text
/// bit  0..6   APID
/// bit  6..24  sequence number
/// byte 3..    payload
/// ```
/// Response payloads start with `[correlation id][status]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Response { kind: ResponseKind, correlation_id: CorrelationId, payload: Vec<u8> },
    Beacon(Vec<u8>),
    Unknown(Vec<u8>),
}

impl Frame {
    pub const HEADER_LENGTH: usize = 3;
    pub const SEQUENCE_BITS: usize = 18;

    /// Classifies raw link data. Anything that is not a well formed response or beacon ends
    /// up as [`Frame::Unknown`] with the raw bytes preserved.
    pub fn decode(raw: &[u8]) -> Frame {
        if raw.len() < Self::HEADER_LENGTH {
            return Frame::Unknown(raw.to_vec());
        }

        let mut cursor = BitCursor::new(&raw[..Self::HEADER_LENGTH]);
        let Ok(apid) = cursor.read_bits(Apid::BITS) else {
            return Frame::Unknown(raw.to_vec());
        };
        let payload = &raw[Self::HEADER_LENGTH..];

        match Apid::from_repr(apid as u8) {
            Some(Apid::Beacon) => Frame::Beacon(payload.to_vec()),
            Some(apid) if payload.len() >= 2 => Frame::Response {
                kind: ResponseKind { apid, status: Status::from_code(payload[1]) },
                correlation_id: payload[0],
                payload: payload[2..].to_vec(),
            },
            _ => Frame::Unknown(raw.to_vec()),
        }
    }

    /// Serializes the frame the way the OBC sends it
    pub fn encode(&self, sequence: u32) -> Vec<u8> {
        let (apid, body) = match self {
            Frame::Response { kind, correlation_id, payload } => {
                let mut body = vec![*correlation_id, kind.status.code()];
                body.extend(payload);
                (kind.apid, body)
            }
            Frame::Beacon(payload) => (Apid::Beacon, payload.clone()),
            Frame::Unknown(raw) => return raw.clone(),
        };

        let mut writer = BitWriter::new();
        writer.write_bits(apid as u64, Apid::BITS);
        writer.write_bits(u64::from(sequence), Self::SEQUENCE_BITS);
        let mut bytes = writer.into_bytes();
        bytes.extend(body);
        bytes
    }

    pub fn correlation_id(&self) -> Option<CorrelationId> {
        match self {
            Frame::Response { correlation_id, .. } => Some(*correlation_id),
            _ => None,
        }
    }

    pub fn kind(&self) -> Option<ResponseKind> {
        match self {
            Frame::Response { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}

/// Decides which response kinds a pending request is interested in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FrameFilter {
    #[default]
    Any,
    Apid(Apid),
    Success(Apid),
    Error(Apid),
}

impl FrameFilter {
    pub fn accepts(&self, kind: &ResponseKind) -> bool {
        match *self {
            FrameFilter::Any => true,
            FrameFilter::Apid(apid) => kind.apid == apid,
            FrameFilter::Success(apid) => kind.apid == apid && kind.status == Status::Success,
            FrameFilter::Error(apid) => {
                kind.apid == apid && matches!(kind.status, Status::Error(_))
            }
        }
    }
}

/// Command code of textual harness commands inside an [`Uplink`] frame
pub const TERMINAL_COMMAND: u8 = 0x30;

/// Uplink frame: `security code (u32 BE) | command code | parameters`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Uplink {
    pub security_code: u32,
    pub command: u8,
    pub parameters: Vec<u8>,
}

impl Uplink {
    const HEADER_LENGTH: usize = 5;

    pub fn encode(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(Self::HEADER_LENGTH + self.parameters.len());
        bytes.extend(self.security_code.to_be_bytes());
        bytes.push(self.command);
        bytes.extend(&self.parameters);
        bytes
    }

    pub fn decode(raw: &[u8]) -> Result<Self, FrameError> {
        if raw.len() < Self::HEADER_LENGTH {
            return Err(FrameError::TooShort { expected: Self::HEADER_LENGTH, actual: raw.len() });
        }

        Ok(Uplink {
            security_code: u32::from_be_bytes([raw[0], raw[1], raw[2], raw[3]]),
            command: raw[4],
            parameters: raw[Self::HEADER_LENGTH..].to_vec(),
        })
    }
}

/// A formatted command line, optionally followed by a bulk data block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TerminalRequest {
    pub correlation_id: CorrelationId,
    pub command_line: String,
    pub data: Option<Vec<u8>>,
}

impl TerminalRequest {
    pub fn into_uplink(self, security_code: u32) -> Uplink {
        let mut parameters = Vec::with_capacity(2 + self.command_line.len());
        parameters.push(self.correlation_id);
        parameters.extend(self.command_line.into_bytes());
        if let Some(data) = self.data {
            parameters.push(0x00);
            parameters.extend(data);
        }

        Uplink { security_code, command: TERMINAL_COMMAND, parameters }
    }

    pub fn from_uplink(uplink: &Uplink) -> Result<Self, FrameError> {
        if uplink.command != TERMINAL_COMMAND {
            return Err(FrameError::UnexpectedCommand(uplink.command));
        }
        let Some((&correlation_id, rest)) = uplink.parameters.split_first() else {
            return Err(FrameError::TooShort { expected: 1, actual: 0 });
        };

        let (line, data) = match rest.iter().position(|&b| b == 0x00) {
            Some(split) => (&rest[..split], Some(rest[split + 1..].to_vec())),
            None => (rest, None),
        };

        Ok(TerminalRequest {
            correlation_id,
            command_line: std::str::from_utf8(line)?.to_string(),
            data,
        })
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("frame is {actual} bytes long, expected at least {expected}")]
    TooShort { expected: usize, actual: usize },
    #[error("unexpected command code {0:#04x}")]
    UnexpectedCommand(u8),
    #[error("command line is not valid UTF-8: {0}")]
    InvalidText(#[from] std::str::Utf8Error),
}
