//! Registered parameter type tags.

use serde::{Deserialize, Serialize};

use crate::error::GatewayError;

/// Type tag attached to every named parameter.
///
/// Wire values follow the MAV_PARAM_TYPE enum. Parameter values always travel
/// as an f32 on the wire; the tag tells the vehicle how to reinterpret them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ParamType {
    Uint8,
    Int8,
    Uint16,
    Int16,
    Uint32,
    Int32,
    Float32,
}

impl ParamType {
    const NAMES: [(&'static str, ParamType); 7] = [
        ("UINT8", ParamType::Uint8),
        ("INT8", ParamType::Int8),
        ("UINT16", ParamType::Uint16),
        ("INT16", ParamType::Int16),
        ("UINT32", ParamType::Uint32),
        ("INT32", ParamType::Int32),
        ("FLOAT32", ParamType::Float32),
    ];

    pub fn to_wire(self) -> u8 {
        match self {
            ParamType::Uint8 => 1,
            ParamType::Int8 => 2,
            ParamType::Uint16 => 3,
            ParamType::Int16 => 4,
            ParamType::Uint32 => 5,
            ParamType::Int32 => 6,
            ParamType::Float32 => 9,
        }
    }

    pub fn from_wire(raw: u8) -> Option<Self> {
        match raw {
            1 => Some(ParamType::Uint8),
            2 => Some(ParamType::Int8),
            3 => Some(ParamType::Uint16),
            4 => Some(ParamType::Int16),
            5 => Some(ParamType::Uint32),
            6 => Some(ParamType::Int32),
            9 => Some(ParamType::Float32),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        Self::NAMES
            .iter()
            .find(|(_, ty)| *ty == self)
            .map(|(name, _)| *name)
            .unwrap_or("FLOAT32")
    }
}

impl std::str::FromStr for ParamType {
    type Err = GatewayError;

    /// Parse a caller-supplied type name; unknown tags are rejected before
    /// any message is sent.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::NAMES
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(s))
            .map(|(_, ty)| *ty)
            .ok_or_else(|| GatewayError::UnknownParamType { name: s.to_string() })
    }
}
