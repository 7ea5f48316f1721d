//! MiJia service-data frame decoding.
//!
//! The sensor broadcasts a fixed 16 byte header followed by a short payload:
//!
//! ```text
//! offset  size  field
//!      0     2  service UUID
//!      2     2  frame control
//!      4     2  sensor id
//!      6     1  frame index
//!      7     6  device MAC (reversed octets)
//!     13     2  data type code
//!     15     1  payload length
//!     16     n  payload
//! ```
//!
//! Decoding is split in two steps so callers can resolve the device from the
//! header before the payload is interpreted: frames from unregistered sensors
//! are ignored without ever touching their payload.

use crate::mac_address::MacAddress;
use crate::reading::Reading;
use std::fmt;
use thiserror::Error;

/// Size of the fixed frame header, in bytes.
pub const HEADER_LEN: usize = 16;

const MAC_OFFSET: usize = 7;
const DATA_TYPE_OFFSET: usize = 13;
const LENGTH_OFFSET: usize = 15;

/// Errors for frames that cannot be decoded. None of these are fatal; the
/// advertisement is dropped and the loop carries on.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecodeError {
    #[error("frame too short: {0} bytes, header needs 16")]
    TooShort(usize),
    #[error("length field {0:#04x} is not a decimal digit pair")]
    InvalidLength(u8),
    #[error("payload truncated: declared {declared} bytes, got {available}")]
    Truncated { declared: usize, available: usize },
    #[error("{data_type} payload needs {needed} bytes, got {got}")]
    PayloadTooShort {
        data_type: DataType,
        needed: usize,
        got: usize,
    },
}

/// Payload kind, from the two byte data type code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    /// `0a10`: one byte battery level.
    Battery,
    /// `0d10`: temperature and humidity, two little-endian u16.
    TemperatureHumidity,
    /// `0610`: humidity, one little-endian u16.
    Humidity,
    /// `0410`: temperature, one little-endian u16.
    Temperature,
    Unknown([u8; 2]),
}

impl DataType {
    pub fn from_code(code: [u8; 2]) -> Self {
        match code {
            [0x0a, 0x10] => DataType::Battery,
            [0x0d, 0x10] => DataType::TemperatureHumidity,
            [0x06, 0x10] => DataType::Humidity,
            [0x04, 0x10] => DataType::Temperature,
            other => DataType::Unknown(other),
        }
    }

    pub fn code(&self) -> [u8; 2] {
        match self {
            DataType::Battery => [0x0a, 0x10],
            DataType::TemperatureHumidity => [0x0d, 0x10],
            DataType::Humidity => [0x06, 0x10],
            DataType::Temperature => [0x04, 0x10],
            DataType::Unknown(code) => *code,
        }
    }

    /// Minimum payload size needed to decode this data type.
    fn payload_size(&self) -> usize {
        match self {
            DataType::Battery => 1,
            DataType::TemperatureHumidity => 4,
            DataType::Humidity | DataType::Temperature => 2,
            DataType::Unknown(_) => 0,
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.code()))
    }
}

/// A parsed frame header borrowing the remaining payload bytes.
#[derive(Debug, Clone, PartialEq)]
pub struct AdvertisementFrame<'a> {
    pub service_uuid: [u8; 2],
    pub frame_control: [u8; 2],
    pub sensor_id: [u8; 2],
    pub frame_index: u8,
    /// Sender address, already converted back to human octet order.
    pub mac: MacAddress,
    pub data_type: DataType,
    pub length_field: u8,
    rest: &'a [u8],
}

impl<'a> AdvertisementFrame<'a> {
    /// Parse the fixed header. The payload is not inspected.
    pub fn parse(data: &'a [u8]) -> Result<Self, DecodeError> {
        if data.len() < HEADER_LEN {
            return Err(DecodeError::TooShort(data.len()));
        }

        let mut mac = [0u8; 6];
        mac.copy_from_slice(&data[MAC_OFFSET..MAC_OFFSET + 6]);

        Ok(Self {
            service_uuid: [data[0], data[1]],
            frame_control: [data[2], data[3]],
            sensor_id: [data[4], data[5]],
            frame_index: data[6],
            mac: MacAddress::from_reversed(mac),
            data_type: DataType::from_code([data[DATA_TYPE_OFFSET], data[DATA_TYPE_OFFSET + 1]]),
            length_field: data[LENGTH_OFFSET],
            rest: &data[HEADER_LEN..],
        })
    }

    /// Declared payload length.
    ///
    /// The sensor firmware this bridge was built against is read with the two
    /// hex digits of the length byte taken as a decimal number, so `0x04`
    /// means 4 and `0x10` means 10. A byte containing `a`-`f` digits is
    /// rejected. Real frames never exceed 4 payload bytes, where both
    /// readings agree.
    pub fn declared_len(&self) -> Result<usize, DecodeError> {
        let high = self.length_field >> 4;
        let low = self.length_field & 0x0f;
        if high > 9 || low > 9 {
            return Err(DecodeError::InvalidLength(self.length_field));
        }
        Ok(usize::from(high) * 10 + usize::from(low))
    }

    /// The payload bytes covered by the declared length.
    pub fn payload(&self) -> Result<&'a [u8], DecodeError> {
        let declared = self.declared_len()?;
        self.rest.get(..declared).ok_or(DecodeError::Truncated {
            declared,
            available: self.rest.len(),
        })
    }

    /// Decode the payload into readings. Unknown data types yield no readings.
    pub fn readings(&self) -> Result<Vec<Reading>, DecodeError> {
        let declared = self.declared_len()?;
        if let DataType::Unknown(_) = self.data_type {
            return Ok(Vec::new());
        }

        let payload = self.payload()?;
        let needed = self.data_type.payload_size();
        if payload.len() < needed {
            return Err(DecodeError::PayloadTooShort {
                data_type: self.data_type,
                needed,
                got: declared,
            });
        }

        let readings = match self.data_type {
            DataType::Battery => vec![Reading::Battery(scale(u32::from(payload[0])))],
            DataType::TemperatureHumidity => vec![
                Reading::Temperature(scale(le16(&payload[0..2]))),
                Reading::Humidity(scale(le16(&payload[2..4]))),
            ],
            DataType::Humidity => vec![Reading::Humidity(scale(le16(&payload[0..2])))],
            DataType::Temperature => vec![Reading::Temperature(scale(le16(&payload[0..2])))],
            DataType::Unknown(_) => Vec::new(),
        };

        Ok(readings)
    }
}

/// Decode a complete frame into its sender and readings.
pub fn decode_service_data(data: &[u8]) -> Result<(MacAddress, Vec<Reading>), DecodeError> {
    let frame = AdvertisementFrame::parse(data)?;
    Ok((frame.mac, frame.readings()?))
}

fn le16(bytes: &[u8]) -> u32 {
    u32::from(u16::from_le_bytes([bytes[0], bytes[1]]))
}

/// Recover a decimal value from the sensor's implicit fixed-point integer.
///
/// Four or more digits are hundredths, three digits are tenths, anything
/// shorter is taken as-is.
pub fn scale(raw: u32) -> f64 {
    let value = f64::from(raw);
    match raw {
        1000.. => value / 100.0,
        100..=999 => value / 10.0,
        _ => value,
    }
}
