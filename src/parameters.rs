// SPDX-License-Identifier: GPL-3.0-only

//! Typed camera parameter table
//!
//! Values are kept in string form and interpreted through the type declared
//! for their key. Wire access encodes values little-endian.

use std::collections::BTreeMap;
use std::fmt;

use crate::errors::ParamError;

/// Well-known parameter keys
pub mod keys {
    pub const CAMERA_MODE: &str = "camera-mode";
    pub const BRIGHTNESS: &str = "brightness";
    pub const CONTRAST: &str = "contrast";
    pub const SATURATION: &str = "saturation";
    pub const HUE: &str = "hue";
    pub const WHITE_BALANCE_MODE: &str = "wb-mode";
    pub const GAMMA: &str = "gamma";
    pub const GAIN: &str = "gain";
    pub const POWER_LINE_FREQ_MODE: &str = "power-mode";
    pub const WHITE_BALANCE_TEMPERATURE: &str = "wb-temp";
    pub const SHARPNESS: &str = "sharpness";
    pub const BACKLIGHT_COMPENSATION: &str = "backlight";
    pub const EXPOSURE_MODE: &str = "exp-mode";
    pub const EXPOSURE_ABSOLUTE: &str = "exp-absolute";
    pub const IMAGE_SIZE: &str = "image-size";
    pub const IMAGE_FORMAT: &str = "image-format";
    pub const PIXEL_FORMAT: &str = "pixel-format";
    pub const SCENE_MODE: &str = "scene-mode";
    pub const VIDEO_SIZE: &str = "video-size";
    pub const VIDEO_FORMAT: &str = "video-format";
    pub const IMAGE_CAPTURE: &str = "image-capture";
    pub const VIDEO_CAPTURE: &str = "video-capture";
    pub const VIDEO_SNAPSHOT: &str = "video-snapshot";
    pub const IMAGE_VIDEOSHOT: &str = "image-videoshot";
    pub const EXPOSURE_PRIORITY: &str = "exp-priority";
    pub const EXPOSURE: &str = "exposure";
}

/// Wire type tag of a parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ParamType {
    Uint8 = 1,
    Int8 = 2,
    Uint16 = 3,
    Int16 = 4,
    Uint32 = 5,
    Int32 = 6,
    Uint64 = 7,
    Int64 = 8,
    Real32 = 9,
    Real64 = 10,
}

impl ParamType {
    pub fn from_tag(tag: u8) -> Result<Self, ParamError> {
        Ok(match tag {
            1 => ParamType::Uint8,
            2 => ParamType::Int8,
            3 => ParamType::Uint16,
            4 => ParamType::Int16,
            5 => ParamType::Uint32,
            6 => ParamType::Int32,
            7 => ParamType::Uint64,
            8 => ParamType::Int64,
            9 => ParamType::Real32,
            10 => ParamType::Real64,
            other => return Err(ParamError::UnsupportedType(other)),
        })
    }

    pub fn tag(&self) -> u8 {
        *self as u8
    }

    /// Encoded width in bytes
    pub fn size(&self) -> usize {
        match self {
            ParamType::Uint8 | ParamType::Int8 => 1,
            ParamType::Uint16 | ParamType::Int16 => 2,
            ParamType::Uint32 | ParamType::Int32 | ParamType::Real32 => 4,
            ParamType::Uint64 | ParamType::Int64 | ParamType::Real64 => 8,
        }
    }
}

/// A decoded parameter value
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParamValue {
    U8(u8),
    I8(i8),
    U16(u16),
    I16(i16),
    U32(u32),
    I32(i32),
    U64(u64),
    I64(i64),
    F32(f32),
    F64(f64),
}

impl ParamValue {
    pub fn param_type(&self) -> ParamType {
        match self {
            ParamValue::U8(_) => ParamType::Uint8,
            ParamValue::I8(_) => ParamType::Int8,
            ParamValue::U16(_) => ParamType::Uint16,
            ParamValue::I16(_) => ParamType::Int16,
            ParamValue::U32(_) => ParamType::Uint32,
            ParamValue::I32(_) => ParamType::Int32,
            ParamValue::U64(_) => ParamType::Uint64,
            ParamValue::I64(_) => ParamType::Int64,
            ParamValue::F32(_) => ParamType::Real32,
            ParamValue::F64(_) => ParamType::Real64,
        }
    }

    pub fn to_le_bytes(&self) -> Vec<u8> {
        match self {
            ParamValue::U8(v) => v.to_le_bytes().to_vec(),
            ParamValue::I8(v) => v.to_le_bytes().to_vec(),
            ParamValue::U16(v) => v.to_le_bytes().to_vec(),
            ParamValue::I16(v) => v.to_le_bytes().to_vec(),
            ParamValue::U32(v) => v.to_le_bytes().to_vec(),
            ParamValue::I32(v) => v.to_le_bytes().to_vec(),
            ParamValue::U64(v) => v.to_le_bytes().to_vec(),
            ParamValue::I64(v) => v.to_le_bytes().to_vec(),
            ParamValue::F32(v) => v.to_le_bytes().to_vec(),
            ParamValue::F64(v) => v.to_le_bytes().to_vec(),
        }
    }

    /// Decode the leading `ty.size()` bytes of `bytes`
    pub fn from_le_bytes(ty: ParamType, bytes: &[u8]) -> Result<Self, ParamError> {
        let needed = ty.size();
        if bytes.len() < needed {
            return Err(ParamError::BufferTooSmall {
                needed,
                available: bytes.len(),
            });
        }

        let mut raw = [0u8; 8];
        raw[..needed].copy_from_slice(&bytes[..needed]);
        let value = match ty {
            ParamType::Uint8 => ParamValue::U8(raw[0]),
            ParamType::Int8 => ParamValue::I8(raw[0] as i8),
            ParamType::Uint16 => ParamValue::U16(u16::from_le_bytes([raw[0], raw[1]])),
            ParamType::Int16 => ParamValue::I16(i16::from_le_bytes([raw[0], raw[1]])),
            ParamType::Uint32 => ParamValue::U32(u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]])),
            ParamType::Int32 => ParamValue::I32(i32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]])),
            ParamType::Real32 => ParamValue::F32(f32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]])),
            ParamType::Uint64 => ParamValue::U64(u64::from_le_bytes(raw)),
            ParamType::Int64 => ParamValue::I64(i64::from_le_bytes(raw)),
            ParamType::Real64 => ParamValue::F64(f64::from_le_bytes(raw)),
        };
        Ok(value)
    }

    /// Parse the string form of a value of type `ty`
    pub fn parse(ty: ParamType, text: &str) -> Option<Self> {
        let text = text.trim();
        Some(match ty {
            ParamType::Uint8 => ParamValue::U8(text.parse().ok()?),
            ParamType::Int8 => ParamValue::I8(text.parse().ok()?),
            ParamType::Uint16 => ParamValue::U16(text.parse().ok()?),
            ParamType::Int16 => ParamValue::I16(text.parse().ok()?),
            ParamType::Uint32 => ParamValue::U32(text.parse().ok()?),
            ParamType::Int32 => ParamValue::I32(text.parse().ok()?),
            ParamType::Uint64 => ParamValue::U64(text.parse().ok()?),
            ParamType::Int64 => ParamValue::I64(text.parse().ok()?),
            ParamType::Real32 => ParamValue::F32(text.parse().ok()?),
            ParamType::Real64 => ParamValue::F64(text.parse().ok()?),
        })
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::U8(v) => write!(f, "{}", v),
            ParamValue::I8(v) => write!(f, "{}", v),
            ParamValue::U16(v) => write!(f, "{}", v),
            ParamValue::I16(v) => write!(f, "{}", v),
            ParamValue::U32(v) => write!(f, "{}", v),
            ParamValue::I32(v) => write!(f, "{}", v),
            ParamValue::U64(v) => write!(f, "{}", v),
            ParamValue::I64(v) => write!(f, "{}", v),
            ParamValue::F32(v) => write!(f, "{}", v),
            ParamValue::F64(v) => write!(f, "{}", v),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct ParamEntry {
    id: u32,
    ty: ParamType,
    value: Option<String>,
    supported: Vec<String>,
}

/// Declared parameters with their current values
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterTable {
    entries: BTreeMap<String, ParamEntry>,
}

const DEFAULT_DECLARATIONS: &[(&str, u32, ParamType)] = &[
    (keys::CAMERA_MODE, 1, ParamType::Uint32),
    (keys::BRIGHTNESS, 2, ParamType::Uint32),
    (keys::CONTRAST, 3, ParamType::Uint32),
    (keys::SATURATION, 4, ParamType::Uint32),
    (keys::HUE, 5, ParamType::Int32),
    (keys::WHITE_BALANCE_MODE, 6, ParamType::Uint32),
    (keys::GAMMA, 7, ParamType::Uint32),
    (keys::GAIN, 8, ParamType::Uint32),
    (keys::POWER_LINE_FREQ_MODE, 9, ParamType::Uint32),
    (keys::WHITE_BALANCE_TEMPERATURE, 10, ParamType::Uint32),
    (keys::SHARPNESS, 11, ParamType::Uint32),
    (keys::BACKLIGHT_COMPENSATION, 12, ParamType::Uint32),
    (keys::EXPOSURE_MODE, 13, ParamType::Uint32),
    (keys::EXPOSURE_ABSOLUTE, 14, ParamType::Uint32),
    (keys::IMAGE_SIZE, 15, ParamType::Uint32),
    (keys::IMAGE_FORMAT, 16, ParamType::Uint32),
    (keys::PIXEL_FORMAT, 17, ParamType::Uint32),
    (keys::SCENE_MODE, 18, ParamType::Uint32),
    (keys::VIDEO_SIZE, 19, ParamType::Uint32),
    (keys::VIDEO_FORMAT, 20, ParamType::Uint32),
    (keys::IMAGE_CAPTURE, 21, ParamType::Uint8),
    (keys::VIDEO_CAPTURE, 22, ParamType::Uint8),
    (keys::VIDEO_SNAPSHOT, 23, ParamType::Uint8),
    (keys::IMAGE_VIDEOSHOT, 24, ParamType::Uint8),
    (keys::EXPOSURE_PRIORITY, 25, ParamType::Uint8),
    (keys::EXPOSURE, 26, ParamType::Real32),
];

impl Default for ParameterTable {
    fn default() -> Self {
        Self::new()
    }
}

impl ParameterTable {
    /// Table with the standard keys declared and no values
    pub fn new() -> Self {
        let mut table = Self {
            entries: BTreeMap::new(),
        };
        for (key, id, ty) in DEFAULT_DECLARATIONS {
            table.declare(key, *id, *ty);
        }
        table
    }

    /// Declare (or redeclare) a key; an existing value is kept
    pub fn declare(&mut self, key: &str, id: u32, ty: ParamType) {
        let entry = self.entries.entry(key.to_string()).or_insert(ParamEntry {
            id,
            ty,
            value: None,
            supported: Vec::new(),
        });
        entry.id = id;
        entry.ty = ty;
    }

    pub fn param_type(&self, key: &str) -> Result<ParamType, ParamError> {
        self.entry(key).map(|e| e.ty)
    }

    pub fn param_id(&self, key: &str) -> Result<u32, ParamError> {
        self.entry(key).map(|e| e.id)
    }

    pub fn set_supported_values(&mut self, key: &str, values: Vec<String>) -> Result<(), ParamError> {
        self.entry_mut(key)?.supported = values;
        Ok(())
    }

    pub fn supported_values(&self, key: &str) -> Result<&[String], ParamError> {
        self.entry(key).map(|e| e.supported.as_slice())
    }

    /// Store `value`, converting it to the key's declared type
    pub fn set(&mut self, key: &str, value: ParamValue) -> Result<(), ParamError> {
        let entry = self.entry_mut(key)?;
        let converted = convert(value, entry.ty).ok_or_else(|| ParamError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
        })?;
        entry.value = Some(converted.to_string());
        Ok(())
    }

    /// Store a value given in string form after validating it against the type
    pub fn set_str(&mut self, key: &str, text: &str) -> Result<(), ParamError> {
        let ty = self.param_type(key)?;
        let value = ParamValue::parse(ty, text).ok_or_else(|| ParamError::InvalidValue {
            key: key.to_string(),
            value: text.to_string(),
        })?;
        self.set(key, value)
    }

    /// Decode `bytes` as `type_tag` and store it
    pub fn set_from_bytes(&mut self, key: &str, bytes: &[u8], type_tag: u8) -> Result<ParamValue, ParamError> {
        let ty = ParamType::from_tag(type_tag)?;
        let value = ParamValue::from_le_bytes(ty, bytes)?;
        self.set(key, value)?;
        Ok(value)
    }

    /// Current value in string form
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key)?.value.as_deref()
    }

    pub fn get_value(&self, key: &str) -> Result<ParamValue, ParamError> {
        let entry = self.entry(key)?;
        let text = entry
            .value
            .as_deref()
            .ok_or_else(|| ParamError::KeyNotFound(key.to_string()))?;
        ParamValue::parse(entry.ty, text).ok_or_else(|| ParamError::InvalidValue {
            key: key.to_string(),
            value: text.to_string(),
        })
    }

    /// Encode the current value into `out`, returning the bytes written
    pub fn get_into(&self, key: &str, out: &mut [u8]) -> Result<usize, ParamError> {
        let bytes = self.get_value(key)?.to_le_bytes();
        if out.len() < bytes.len() {
            return Err(ParamError::BufferTooSmall {
                needed: bytes.len(),
                available: out.len(),
            });
        }
        out[..bytes.len()].copy_from_slice(&bytes);
        Ok(bytes.len())
    }

    /// Keys that currently hold a value, with the value in string form
    pub fn values(&self) -> BTreeMap<String, String> {
        self.entries
            .iter()
            .filter_map(|(k, e)| e.value.clone().map(|v| (k.clone(), v)))
            .collect()
    }

    pub fn clear_values(&mut self) {
        for entry in self.entries.values_mut() {
            entry.value = None;
        }
    }

    fn entry(&self, key: &str) -> Result<&ParamEntry, ParamError> {
        self.entries
            .get(key)
            .ok_or_else(|| ParamError::KeyNotFound(key.to_string()))
    }

    fn entry_mut(&mut self, key: &str) -> Result<&mut ParamEntry, ParamError> {
        self.entries
            .get_mut(key)
            .ok_or_else(|| ParamError::KeyNotFound(key.to_string()))
    }
}

/// Re-express `value` as `ty` when it fits
fn convert(value: ParamValue, ty: ParamType) -> Option<ParamValue> {
    if value.param_type() == ty {
        return Some(value);
    }
    ParamValue::parse(ty, &value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_keys_are_declared() {
        let table = ParameterTable::new();
        assert_eq!(table.param_id(keys::CAMERA_MODE), Ok(1));
        assert_eq!(table.param_id(keys::EXPOSURE), Ok(26));
        assert_eq!(table.param_type(keys::IMAGE_CAPTURE), Ok(ParamType::Uint8));
        assert!(table.values().is_empty());
    }

    #[test]
    fn get_into_encodes_little_endian() {
        let mut table = ParameterTable::new();
        table.set(keys::BRIGHTNESS, ParamValue::U32(0x0102_0304)).unwrap();

        let mut out = [0u8; 8];
        assert_eq!(table.get_into(keys::BRIGHTNESS, &mut out), Ok(4));
        assert_eq!(&out[..4], &[0x04, 0x03, 0x02, 0x01]);
    }

    #[test]
    fn failure_modes_are_distinguishable() {
        let mut table = ParameterTable::new();
        table.set_str(keys::GAIN, "12").unwrap();

        let mut small = [0u8; 2];
        assert_eq!(
            table.get_into(keys::GAIN, &mut small),
            Err(ParamError::BufferTooSmall {
                needed: 4,
                available: 2
            })
        );
        assert_eq!(
            table.get_into("no-such-key", &mut [0u8; 8]),
            Err(ParamError::KeyNotFound("no-such-key".into()))
        );
        assert_eq!(
            table.set_from_bytes(keys::GAIN, &[1, 0, 0, 0], 42),
            Err(ParamError::UnsupportedType(42))
        );
    }

    #[test]
    fn declared_key_without_value_is_not_found() {
        let table = ParameterTable::new();
        assert!(matches!(
            table.get_into(keys::HUE, &mut [0u8; 4]),
            Err(ParamError::KeyNotFound(_))
        ));
    }

    #[test]
    fn values_are_converted_to_declared_type() {
        let mut table = ParameterTable::new();
        table.set_from_bytes(keys::CONTRAST, &[7], ParamType::Uint8.tag()).unwrap();
        assert_eq!(table.get_value(keys::CONTRAST), Ok(ParamValue::U32(7)));

        assert!(matches!(
            table.set(keys::CONTRAST, ParamValue::I32(-1)),
            Err(ParamError::InvalidValue { .. })
        ));
    }

    #[test]
    fn real_values_round_trip_through_string_form() {
        let mut table = ParameterTable::new();
        table.set(keys::EXPOSURE, ParamValue::F32(0.5)).unwrap();
        assert_eq!(table.get(keys::EXPOSURE), Some("0.5"));

        let mut out = [0u8; 4];
        table.get_into(keys::EXPOSURE, &mut out).unwrap();
        assert_eq!(f32::from_le_bytes(out), 0.5);
    }
}
