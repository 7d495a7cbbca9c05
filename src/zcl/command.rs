//! Cluster commands and their APDU encoding.

use super::ClusterId;
use super::attribute::{decode_read_request, encode_read_request};
use super::frame::{ByteReader, FrameType, ZclFrame, global_cmd};
use crate::error::{ControllerError, Result};
use std::fmt;

/// Highest level a Level Control cluster accepts.
pub const MAX_LEVEL: u8 = 0xFE;

/// On/Off cluster command opcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OnOffCommand {
    Off = 0x00,
    On = 0x01,
    Toggle = 0x02,
}

impl OnOffCommand {
    fn from_opcode(opcode: u8) -> Option<Self> {
        match opcode {
            0x00 => Some(Self::Off),
            0x01 => Some(Self::On),
            0x02 => Some(Self::Toggle),
            _ => None,
        }
    }
}

mod level_cmd {
    pub const MOVE_TO_LEVEL: u8 = 0x00;
}

mod identify_cmd {
    pub const IDENTIFY: u8 = 0x00;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClusterCommand {
    OnOff(OnOffCommand),
    MoveToLevel { level: u8, transition_time: u16 },
    /// Identify with effect 0: blink for `identify_time` seconds.
    Identify { identify_time: u16 },
    /// Global Read Attributes for the listed ids.
    ReadAttributes(Vec<u16>),
}

impl ClusterCommand {
    fn accepted_by(&self, cluster: ClusterId) -> bool {
        match self {
            Self::OnOff(_) => cluster == ClusterId::OnOff,
            Self::MoveToLevel { .. } => cluster == ClusterId::LevelControl,
            Self::Identify { .. } => cluster == ClusterId::Identify,
            Self::ReadAttributes(_) => true,
        }
    }

    /// State-changing commands, as opposed to reads.
    pub fn is_state_changing(&self) -> bool {
        !matches!(self, Self::ReadAttributes(_))
    }
}

/// A command addressed to one cluster, ready to be framed and sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Apdu {
    pub cluster: ClusterId,
    pub command: ClusterCommand,
}

impl Apdu {
    pub fn new(cluster: ClusterId, command: ClusterCommand) -> Result<Self> {
        if !command.accepted_by(cluster) {
            return Err(ControllerError::Frame(format!(
                "{:?} is not a {} command",
                command, cluster
            )));
        }
        Ok(Self { cluster, command })
    }

    pub fn on_off(command: OnOffCommand) -> Self {
        Self {
            cluster: ClusterId::OnOff,
            command: ClusterCommand::OnOff(command),
        }
    }

    pub fn toggle() -> Self {
        Self::on_off(OnOffCommand::Toggle)
    }

    /// Move to Level. `level` saturates at [`MAX_LEVEL`].
    pub fn move_to_level(level: u16, transition_time: u16) -> Self {
        let level = u8::try_from(level).unwrap_or(MAX_LEVEL).min(MAX_LEVEL);
        Self {
            cluster: ClusterId::LevelControl,
            command: ClusterCommand::MoveToLevel {
                level,
                transition_time,
            },
        }
    }

    pub fn identify(identify_time: u16) -> Self {
        Self {
            cluster: ClusterId::Identify,
            command: ClusterCommand::Identify { identify_time },
        }
    }

    /// Read every attribute the cluster table knows about.
    pub fn read_all(cluster: ClusterId) -> Self {
        Self {
            cluster,
            command: ClusterCommand::ReadAttributes(
                cluster.attributes().iter().map(|def| def.id).collect(),
            ),
        }
    }

    pub fn to_frame(&self, sequence: u8) -> ZclFrame {
        match &self.command {
            ClusterCommand::OnOff(cmd) => {
                ZclFrame::request(FrameType::ClusterSpecific, sequence, *cmd as u8, Vec::new())
            }
            ClusterCommand::MoveToLevel {
                level,
                transition_time,
            } => {
                let mut payload = vec![*level];
                payload.extend_from_slice(&transition_time.to_le_bytes());
                ZclFrame::request(
                    FrameType::ClusterSpecific,
                    sequence,
                    level_cmd::MOVE_TO_LEVEL,
                    payload,
                )
            }
            ClusterCommand::Identify { identify_time } => ZclFrame::request(
                FrameType::ClusterSpecific,
                sequence,
                identify_cmd::IDENTIFY,
                identify_time.to_le_bytes().to_vec(),
            ),
            ClusterCommand::ReadAttributes(ids) => ZclFrame::request(
                FrameType::Global,
                sequence,
                global_cmd::READ_ATTRIBUTES,
                encode_read_request(ids),
            ),
        }
    }

    /// Decode a client-to-server frame received on `cluster`.
    pub fn from_frame(cluster: ClusterId, frame: &ZclFrame) -> Result<Self> {
        let opcode = frame.header.command_id;
        let unsupported = || {
            ControllerError::Frame(format!(
                "unsupported {} command 0x{:02X}",
                cluster, opcode
            ))
        };

        let command = match frame.header.frame_type {
            FrameType::Global if opcode == global_cmd::READ_ATTRIBUTES => {
                ClusterCommand::ReadAttributes(decode_read_request(&frame.payload)?)
            }
            FrameType::Global => return Err(unsupported()),
            FrameType::ClusterSpecific => {
                let mut reader = ByteReader::new(&frame.payload);
                match cluster {
                    ClusterId::OnOff => {
                        ClusterCommand::OnOff(OnOffCommand::from_opcode(opcode).ok_or_else(unsupported)?)
                    }
                    ClusterId::LevelControl if opcode == level_cmd::MOVE_TO_LEVEL => {
                        ClusterCommand::MoveToLevel {
                            level: reader.u8()?,
                            transition_time: reader.u16()?,
                        }
                    }
                    ClusterId::Identify if opcode == identify_cmd::IDENTIFY => {
                        ClusterCommand::Identify {
                            identify_time: reader.u16()?,
                        }
                    }
                    _ => return Err(unsupported()),
                }
            }
        };

        Ok(Self { cluster, command })
    }
}

impl fmt::Display for Apdu {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.command {
            ClusterCommand::OnOff(cmd) => write!(f, "{}:{:?}", self.cluster, cmd),
            ClusterCommand::MoveToLevel {
                level,
                transition_time,
            } => write!(
                f,
                "{}:MoveToLevel(level={}, transition={})",
                self.cluster, level, transition_time
            ),
            ClusterCommand::Identify { identify_time } => {
                write!(f, "{}:Identify({}s)", self.cluster, identify_time)
            }
            ClusterCommand::ReadAttributes(ids) => {
                write!(f, "{}:ReadAttributes({:04X?})", self.cluster, ids)
            }
        }
    }
}
