//! Attribute data types, values and Read Attributes Response records.

use super::frame::{ByteReader, ZclStatus};
use crate::error::{ControllerError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// ZCL data types carried by the supported clusters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    Boolean,
    Uint8,
    Uint16,
    Enum8,
}

impl DataType {
    pub fn code(self) -> u8 {
        match self {
            Self::Boolean => 0x10,
            Self::Uint8 => 0x20,
            Self::Uint16 => 0x21,
            Self::Enum8 => 0x30,
        }
    }

    pub fn from_code(code: u8) -> Result<Self> {
        match code {
            0x10 => Ok(Self::Boolean),
            0x20 => Ok(Self::Uint8),
            0x21 => Ok(Self::Uint16),
            0x30 => Ok(Self::Enum8),
            other => Err(ControllerError::Frame(format!(
                "unsupported data type 0x{:02X}",
                other
            ))),
        }
    }
}

/// Last-known value of a cluster attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeValue {
    Bool(bool),
    U8(u8),
    U16(u16),
    Enum8(u8),
}

impl AttributeValue {
    pub fn data_type(&self) -> DataType {
        match self {
            Self::Bool(_) => DataType::Boolean,
            Self::U8(_) => DataType::Uint8,
            Self::U16(_) => DataType::Uint16,
            Self::Enum8(_) => DataType::Enum8,
        }
    }

    pub fn encode(&self, buf: &mut Vec<u8>) {
        match self {
            Self::Bool(b) => buf.push(u8::from(*b)),
            Self::U8(v) | Self::Enum8(v) => buf.push(*v),
            Self::U16(v) => buf.extend_from_slice(&v.to_le_bytes()),
        }
    }

    fn decode(data_type: DataType, reader: &mut ByteReader<'_>) -> Result<Self> {
        Ok(match data_type {
            DataType::Boolean => Self::Bool(reader.u8()? != 0),
            DataType::Uint8 => Self::U8(reader.u8()?),
            DataType::Uint16 => Self::U16(reader.u16()?),
            DataType::Enum8 => Self::Enum8(reader.u8()?),
        })
    }

    pub fn to_json(&self) -> Value {
        match self {
            Self::Bool(b) => Value::Bool(*b),
            Self::U8(v) | Self::Enum8(v) => Value::from(*v),
            Self::U16(v) => Value::from(*v),
        }
    }

    /// Rebuild a value from its serialized `type` and `value` fields.
    pub fn from_json(data_type: DataType, value: &Value) -> Result<Self> {
        let invalid = || {
            ControllerError::Frame(format!("value {} does not fit {:?}", value, data_type))
        };
        match data_type {
            DataType::Boolean => value.as_bool().map(Self::Bool).ok_or_else(invalid),
            DataType::Uint8 => value
                .as_u64()
                .and_then(|v| u8::try_from(v).ok())
                .map(Self::U8)
                .ok_or_else(invalid),
            DataType::Uint16 => value
                .as_u64()
                .and_then(|v| u16::try_from(v).ok())
                .map(Self::U16)
                .ok_or_else(invalid),
            DataType::Enum8 => value
                .as_u64()
                .and_then(|v| u8::try_from(v).ok())
                .map(Self::Enum8)
                .ok_or_else(invalid),
        }
    }
}

/// One record of a Read Attributes Response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeRecord {
    pub id: u16,
    pub status: ZclStatus,
    /// Present only when `status` is success.
    pub value: Option<AttributeValue>,
}

impl AttributeRecord {
    pub fn success(id: u16, value: AttributeValue) -> Self {
        Self {
            id,
            status: ZclStatus::Success,
            value: Some(value),
        }
    }

    pub fn unsupported(id: u16) -> Self {
        Self {
            id,
            status: ZclStatus::UnsupportedAttribute,
            value: None,
        }
    }
}

/// Payload of a Read Attributes request: attribute ids, little-endian.
pub fn encode_read_request(ids: &[u16]) -> Vec<u8> {
    ids.iter().flat_map(|id| id.to_le_bytes()).collect()
}

pub fn decode_read_request(payload: &[u8]) -> Result<Vec<u16>> {
    if payload.len() % 2 != 0 {
        return Err(ControllerError::Frame(
            "read attributes payload has odd length".to_string(),
        ));
    }
    let mut reader = ByteReader::new(payload);
    let mut ids = Vec::with_capacity(payload.len() / 2);
    while !reader.is_empty() {
        ids.push(reader.u16()?);
    }
    Ok(ids)
}

pub fn encode_read_response(records: &[AttributeRecord]) -> Vec<u8> {
    let mut buf = Vec::new();
    for record in records {
        buf.extend_from_slice(&record.id.to_le_bytes());
        buf.push(record.status.code());
        if let (true, Some(value)) = (record.status.is_success(), record.value) {
            buf.push(value.data_type().code());
            value.encode(&mut buf);
        }
    }
    buf
}

pub fn decode_read_response(payload: &[u8]) -> Result<Vec<AttributeRecord>> {
    let mut reader = ByteReader::new(payload);
    let mut records = Vec::new();
    while !reader.is_empty() {
        let id = reader.u16()?;
        let status = ZclStatus::from(reader.u8()?);
        let value = if status.is_success() {
            let data_type = DataType::from_code(reader.u8()?)?;
            Some(AttributeValue::decode(data_type, &mut reader)?)
        } else {
            None
        };
        records.push(AttributeRecord { id, status, value });
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_request_payload() {
        assert_eq!(
            encode_read_request(&[0x0000, 0x4001]),
            vec![0x00, 0x00, 0x01, 0x40]
        );
        assert_eq!(
            decode_read_request(&[0x00, 0x00, 0x01, 0x40]).unwrap(),
            vec![0x0000, 0x4001]
        );
        assert!(decode_read_request(&[0x00]).is_err());
    }

    #[test]
    fn test_decode_read_response_with_unsupported_attribute() {
        // current_level = 250, remaining_time unsupported, on_off_transition_time = 0x0102
        let payload = [
            0x00, 0x00, 0x00, 0x20, 0xFA, //
            0x01, 0x00, 0x86, //
            0x10, 0x00, 0x00, 0x21, 0x02, 0x01,
        ];
        let records = decode_read_response(&payload).unwrap();
        assert_eq!(
            records,
            vec![
                AttributeRecord::success(0x0000, AttributeValue::U8(250)),
                AttributeRecord::unsupported(0x0001),
                AttributeRecord::success(0x0010, AttributeValue::U16(0x0102)),
            ]
        );
        assert_eq!(encode_read_response(&records), payload.to_vec());
    }

    #[test]
    fn test_decode_read_response_rejects_unknown_type() {
        let payload = [0x00, 0x00, 0x00, 0x42, 0x03, b'a', b'b', b'c'];
        assert!(matches!(
            decode_read_response(&payload),
            Err(ControllerError::Frame(_))
        ));
    }

    #[test]
    fn test_json_conversion_keeps_sixteen_bit_values() {
        for value in [
            AttributeValue::Bool(true),
            AttributeValue::U8(0xFE),
            AttributeValue::U16(u16::MAX),
            AttributeValue::Enum8(3),
        ] {
            let json = value.to_json();
            assert_eq!(
                AttributeValue::from_json(value.data_type(), &json).unwrap(),
                value
            );
        }
        assert!(AttributeValue::from_json(DataType::Uint8, &Value::from(300)).is_err());
        assert!(AttributeValue::from_json(DataType::Boolean, &Value::from(1)).is_err());
    }
}
