//! ZigBee Cluster Library support.
//!
//! Only the pieces a dimmable-light controller needs:
//! - `frame`: ZCL frame header codec and status codes
//! - `command`: cluster commands for On/Off, Level Control and Identify
//! - `attribute`: attribute data types, values and read-response records

pub mod attribute;
pub mod command;
pub mod frame;

pub use attribute::{AttributeRecord, AttributeValue, DataType};
pub use command::{Apdu, ClusterCommand, OnOffCommand};
pub use frame::{Direction, FrameType, ZclFrame, ZclHeader, ZclStatus};

use serde::{Deserialize, Serialize};

/// ZigBee Home Automation profile id.
pub const HA_PROFILE_ID: u16 = 0x0104;
/// HA device id for a dimmable light.
pub const DIMMABLE_LIGHT_DEVICE_ID: u16 = 0x0101;
/// HA device id for a dimmer switch.
pub const DIMMER_SWITCH_DEVICE_ID: u16 = 0x0104;
/// Device version advertised by the local endpoint.
pub const DIMMABLE_LIGHT_DEVICE_VERSION: u8 = 0x02;

/// Clusters this controller knows how to drive.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    strum::Display,
    strum::IntoStaticStr,
    strum::EnumIter,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
#[repr(u16)]
pub enum ClusterId {
    Identify = 0x0003,
    OnOff = 0x0006,
    LevelControl = 0x0008,
}

impl ClusterId {
    pub fn id(self) -> u16 {
        self as u16
    }

    pub fn from_id(id: u16) -> Option<Self> {
        match id {
            0x0003 => Some(Self::Identify),
            0x0006 => Some(Self::OnOff),
            0x0008 => Some(Self::LevelControl),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        self.into()
    }

    /// Attribute table used for "read all attributes" requests.
    pub fn attributes(self) -> &'static [AttributeDef] {
        match self {
            Self::OnOff => ON_OFF_ATTRIBUTES,
            Self::LevelControl => LEVEL_ATTRIBUTES,
            Self::Identify => IDENTIFY_ATTRIBUTES,
        }
    }

    pub fn attribute(self, id: u16) -> Option<&'static AttributeDef> {
        self.attributes().iter().find(|def| def.id == id)
    }
}

/// Static description of a cluster attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttributeDef {
    pub id: u16,
    pub name: &'static str,
    pub data_type: DataType,
}

/// On/Off cluster attribute ids.
pub mod on_off_attrs {
    pub const ON_OFF: u16 = 0x0000;
    pub const ON_TIME: u16 = 0x4001;
    pub const OFF_WAIT_TIME: u16 = 0x4002;
}

/// Level Control cluster attribute ids.
pub mod level_attrs {
    pub const CURRENT_LEVEL: u16 = 0x0000;
    pub const REMAINING_TIME: u16 = 0x0001;
    pub const ON_OFF_TRANSITION_TIME: u16 = 0x0010;
    pub const ON_LEVEL: u16 = 0x0011;
}

/// Identify cluster attribute ids.
pub mod identify_attrs {
    pub const IDENTIFY_TIME: u16 = 0x0000;
}

const ON_OFF_ATTRIBUTES: &[AttributeDef] = &[
    AttributeDef {
        id: on_off_attrs::ON_OFF,
        name: "on_off",
        data_type: DataType::Boolean,
    },
    AttributeDef {
        id: on_off_attrs::ON_TIME,
        name: "on_time",
        data_type: DataType::Uint16,
    },
    AttributeDef {
        id: on_off_attrs::OFF_WAIT_TIME,
        name: "off_wait_time",
        data_type: DataType::Uint16,
    },
];

const LEVEL_ATTRIBUTES: &[AttributeDef] = &[
    AttributeDef {
        id: level_attrs::CURRENT_LEVEL,
        name: "current_level",
        data_type: DataType::Uint8,
    },
    AttributeDef {
        id: level_attrs::REMAINING_TIME,
        name: "remaining_time",
        data_type: DataType::Uint16,
    },
    AttributeDef {
        id: level_attrs::ON_OFF_TRANSITION_TIME,
        name: "on_off_transition_time",
        data_type: DataType::Uint16,
    },
    AttributeDef {
        id: level_attrs::ON_LEVEL,
        name: "on_level",
        data_type: DataType::Uint8,
    },
];

const IDENTIFY_ATTRIBUTES: &[AttributeDef] = &[AttributeDef {
    id: identify_attrs::IDENTIFY_TIME,
    name: "identify_time",
    data_type: DataType::Uint16,
}];
