//! ZCL frame header codec.
//!
//! ```text
//! | frame control (1) | manufacturer code (0/2) | sequence (1) | command id (1) | payload |
//! ```

use crate::error::{ControllerError, Result};

/// Global (profile-wide) command ids.
pub mod global_cmd {
    pub const READ_ATTRIBUTES: u8 = 0x00;
    pub const READ_ATTRIBUTES_RESPONSE: u8 = 0x01;
    pub const DEFAULT_RESPONSE: u8 = 0x0B;
}

const FRAME_TYPE_MASK: u8 = 0b0000_0011;
const MANUFACTURER_SPECIFIC: u8 = 0b0000_0100;
const DIRECTION_SERVER_TO_CLIENT: u8 = 0b0000_1000;
const DISABLE_DEFAULT_RESPONSE: u8 = 0b0001_0000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameType {
    /// Command acts across the entire profile.
    Global,
    /// Command is specific to the addressed cluster.
    ClusterSpecific,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    ClientToServer,
    ServerToClient,
}

/// ZCL status codes seen in default and read-attribute responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZclStatus {
    Success,
    Failure,
    UnsupportedClusterCommand,
    UnsupportedAttribute,
    InvalidValue,
    Other(u8),
}

impl ZclStatus {
    pub fn is_success(self) -> bool {
        self == Self::Success
    }

    pub fn code(self) -> u8 {
        match self {
            Self::Success => 0x00,
            Self::Failure => 0x01,
            Self::UnsupportedClusterCommand => 0x81,
            Self::UnsupportedAttribute => 0x86,
            Self::InvalidValue => 0x87,
            Self::Other(code) => code,
        }
    }
}

impl From<u8> for ZclStatus {
    fn from(code: u8) -> Self {
        match code {
            0x00 => Self::Success,
            0x01 => Self::Failure,
            0x81 => Self::UnsupportedClusterCommand,
            0x86 => Self::UnsupportedAttribute,
            0x87 => Self::InvalidValue,
            other => Self::Other(other),
        }
    }
}

impl std::fmt::Display for ZclStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?} (0x{:02X})", self, self.code())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZclHeader {
    pub frame_type: FrameType,
    pub manufacturer_code: Option<u16>,
    pub direction: Direction,
    pub disable_default_response: bool,
    pub sequence: u8,
    pub command_id: u8,
}

impl ZclHeader {
    fn frame_control(&self) -> u8 {
        let mut fc = match self.frame_type {
            FrameType::Global => 0x00,
            FrameType::ClusterSpecific => 0x01,
        };
        if self.manufacturer_code.is_some() {
            fc |= MANUFACTURER_SPECIFIC;
        }
        if self.direction == Direction::ServerToClient {
            fc |= DIRECTION_SERVER_TO_CLIENT;
        }
        if self.disable_default_response {
            fc |= DISABLE_DEFAULT_RESPONSE;
        }
        fc
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZclFrame {
    pub header: ZclHeader,
    pub payload: Vec<u8>,
}

impl ZclFrame {
    /// Client-to-server request frame.
    pub fn request(frame_type: FrameType, sequence: u8, command_id: u8, payload: Vec<u8>) -> Self {
        Self {
            header: ZclHeader {
                frame_type,
                manufacturer_code: None,
                direction: Direction::ClientToServer,
                disable_default_response: false,
                sequence,
                command_id,
            },
            payload,
        }
    }

    /// Server-to-client response answering `request`.
    pub fn response_to(request: &ZclHeader, frame_type: FrameType, command_id: u8, payload: Vec<u8>) -> Self {
        Self {
            header: ZclHeader {
                frame_type,
                manufacturer_code: request.manufacturer_code,
                direction: Direction::ServerToClient,
                disable_default_response: true,
                sequence: request.sequence,
                command_id,
            },
            payload,
        }
    }

    /// Default Response (0x0B) carrying `status` for the command in `request`.
    pub fn default_response(request: &ZclHeader, status: ZclStatus) -> Self {
        Self::response_to(
            request,
            FrameType::Global,
            global_cmd::DEFAULT_RESPONSE,
            vec![request.command_id, status.code()],
        )
    }

    pub fn sequence(&self) -> u8 {
        self.header.sequence
    }

    pub fn is_default_response(&self) -> bool {
        self.header.frame_type == FrameType::Global
            && self.header.command_id == global_cmd::DEFAULT_RESPONSE
    }

    pub fn is_read_attributes_response(&self) -> bool {
        self.header.frame_type == FrameType::Global
            && self.header.command_id == global_cmd::READ_ATTRIBUTES_RESPONSE
    }

    /// Status carried by a Default Response frame.
    pub fn default_response_status(&self) -> Result<ZclStatus> {
        if !self.is_default_response() {
            return Err(ControllerError::Frame(format!(
                "expected default response, got command 0x{:02X}",
                self.header.command_id
            )));
        }
        let mut reader = ByteReader::new(&self.payload);
        let _command = reader.u8()?;
        Ok(ZclStatus::from(reader.u8()?))
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(5 + self.payload.len());
        buf.push(self.header.frame_control());
        if let Some(code) = self.header.manufacturer_code {
            buf.extend_from_slice(&code.to_le_bytes());
        }
        buf.push(self.header.sequence);
        buf.push(self.header.command_id);
        buf.extend_from_slice(&self.payload);
        buf
    }

    pub fn decode(data: &[u8]) -> Result<Self> {
        let mut reader = ByteReader::new(data);
        let fc = reader.u8()?;

        let frame_type = match fc & FRAME_TYPE_MASK {
            0x00 => FrameType::Global,
            0x01 => FrameType::ClusterSpecific,
            other => {
                return Err(ControllerError::Frame(format!(
                    "reserved frame type {}",
                    other
                )));
            }
        };
        let manufacturer_code = if fc & MANUFACTURER_SPECIFIC != 0 {
            Some(reader.u16()?)
        } else {
            None
        };
        let direction = if fc & DIRECTION_SERVER_TO_CLIENT != 0 {
            Direction::ServerToClient
        } else {
            Direction::ClientToServer
        };

        let sequence = reader.u8()?;
        let command_id = reader.u8()?;

        Ok(Self {
            header: ZclHeader {
                frame_type,
                manufacturer_code,
                direction,
                disable_default_response: fc & DISABLE_DEFAULT_RESPONSE != 0,
                sequence,
                command_id,
            },
            payload: reader.rest().to_vec(),
        })
    }
}

/// Little-endian cursor over a frame payload.
pub(crate) struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub(crate) fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.pos >= self.data.len()
    }

    pub(crate) fn u8(&mut self) -> Result<u8> {
        let byte = *self
            .data
            .get(self.pos)
            .ok_or_else(|| ControllerError::Frame(format!("truncated at byte {}", self.pos)))?;
        self.pos += 1;
        Ok(byte)
    }

    pub(crate) fn u16(&mut self) -> Result<u16> {
        let lo = self.u8()?;
        let hi = self.u8()?;
        Ok(u16::from_le_bytes([lo, hi]))
    }

    pub(crate) fn rest(&self) -> &'a [u8] {
        &self.data[self.pos.min(self.data.len())..]
    }
}
