//! Typed message payloads and their wire layouts.
//!
//! Each payload struct declares its fields in wire order and owns its
//! `decode` / `encode_into` pair; the registry holds the decode entry points.
//! All multi-byte fields are little-endian. Payload lengths are fixed per
//! type and validated by the codec before a decoder runs, so the per-field
//! readers below can index unconditionally.

use bytes::BufMut;
use serde::{Deserialize, Serialize};

use super::frame::DecodeError;
use crate::types::{
    AckResult, AutopilotType, CommandId, MessageId, ModeFlags, ParamType, SystemStatus, VehicleType,
};

/// Byte length of the parameter name field. Names shorter than this are
/// NUL-padded; a name of exactly 16 bytes has no terminator.
pub const PARAM_NAME_LEN: usize = 16;

fn u16_at(b: &[u8], o: usize) -> u16 {
    u16::from_le_bytes([b[o], b[o + 1]])
}

fn i16_at(b: &[u8], o: usize) -> i16 {
    i16::from_le_bytes([b[o], b[o + 1]])
}

fn u32_at(b: &[u8], o: usize) -> u32 {
    u32::from_le_bytes([b[o], b[o + 1], b[o + 2], b[o + 3]])
}

fn i32_at(b: &[u8], o: usize) -> i32 {
    i32::from_le_bytes([b[o], b[o + 1], b[o + 2], b[o + 3]])
}

fn f32_at(b: &[u8], o: usize) -> f32 {
    f32::from_le_bytes([b[o], b[o + 1], b[o + 2], b[o + 3]])
}

fn name_at(b: &[u8], o: usize) -> String {
    let raw = &b[o..o + PARAM_NAME_LEN];
    let end = raw.iter().position(|&c| c == 0).unwrap_or(PARAM_NAME_LEN);
    String::from_utf8_lossy(&raw[..end]).into_owned()
}

fn put_name(out: &mut Vec<u8>, name: &str) {
    let bytes = name.as_bytes();
    let take = bytes.len().min(PARAM_NAME_LEN);
    out.extend_from_slice(&bytes[..take]);
    out.resize(out.len() + (PARAM_NAME_LEN - take), 0);
}

/// Periodic liveness assertion from a vehicle, carrying its airframe class,
/// autopilot family, mode bitfield and system status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Heartbeat {
    pub custom_mode: u32,
    pub vehicle_type: VehicleType,
    pub autopilot: AutopilotType,
    pub base_mode: ModeFlags,
    pub system_status: SystemStatus,
    pub protocol_version: u8,
}

impl Heartbeat {
    pub const WIRE_LEN: usize = 9;

    /// Heartbeat the gateway itself emits toward vehicles.
    pub fn ground_station() -> Self {
        Self {
            custom_mode: 0,
            vehicle_type: VehicleType::GroundStation,
            autopilot: AutopilotType::Invalid,
            base_mode: ModeFlags::new(ModeFlags::CUSTOM_MODE_ENABLED),
            system_status: SystemStatus::Active,
            protocol_version: 3,
        }
    }

    fn decode(b: &[u8]) -> Result<Self, DecodeError> {
        Ok(Self {
            custom_mode: u32_at(b, 0),
            vehicle_type: VehicleType::from_wire(b[4]),
            autopilot: AutopilotType::from_wire(b[5]),
            base_mode: ModeFlags::new(b[6]),
            system_status: SystemStatus::from_wire(b[7]),
            protocol_version: b[8],
        })
    }

    fn encode_into(&self, out: &mut Vec<u8>) {
        out.put_u32_le(self.custom_mode);
        out.put_u8(self.vehicle_type.to_wire());
        out.put_u8(self.autopilot.to_wire());
        out.put_u8(self.base_mode.value());
        out.put_u8(self.system_status.to_wire());
        out.put_u8(self.protocol_version);
    }
}

/// Coarse health report: CPU load and battery figures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SysStatus {
    /// Load in 0.1% units.
    pub load: u16,
    /// Battery voltage in millivolts; `u16::MAX` means unreported.
    pub voltage_battery: u16,
    /// Battery current in centiamps; -1 means unreported.
    pub current_battery: i16,
    /// Remaining battery in percent; -1 means unreported.
    pub battery_remaining: i8,
}

impl SysStatus {
    pub const WIRE_LEN: usize = 7;

    pub fn voltage(&self) -> Option<f32> {
        (self.voltage_battery != u16::MAX).then(|| self.voltage_battery as f32 / 1000.0)
    }

    pub fn current(&self) -> Option<f32> {
        (self.current_battery != -1).then(|| self.current_battery as f32 / 100.0)
    }

    pub fn remaining_percent(&self) -> Option<u8> {
        (0..=100)
            .contains(&self.battery_remaining)
            .then_some(self.battery_remaining as u8)
    }

    fn decode(b: &[u8]) -> Result<Self, DecodeError> {
        Ok(Self {
            load: u16_at(b, 0),
            voltage_battery: u16_at(b, 2),
            current_battery: i16_at(b, 4),
            battery_remaining: b[6] as i8,
        })
    }

    fn encode_into(&self, out: &mut Vec<u8>) {
        out.put_u16_le(self.load);
        out.put_u16_le(self.voltage_battery);
        out.put_i16_le(self.current_battery);
        out.put_i8(self.battery_remaining);
    }
}

/// Request that the vehicle stream its full parameter list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamRequestList {
    pub target_system: u8,
    pub target_component: u8,
}

impl ParamRequestList {
    pub const WIRE_LEN: usize = 2;

    fn decode(b: &[u8]) -> Result<Self, DecodeError> {
        Ok(Self { target_system: b[0], target_component: b[1] })
    }

    fn encode_into(&self, out: &mut Vec<u8>) {
        out.put_u8(self.target_system);
        out.put_u8(self.target_component);
    }
}

/// One named parameter reported by the vehicle, either in response to a list
/// request or as the echo confirming a set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamValue {
    pub value: f32,
    /// Total number of onboard parameters.
    pub total_count: u16,
    /// Index of this parameter within the onboard list.
    pub index: u16,
    pub name: String,
    pub param_type: ParamType,
}

impl ParamValue {
    pub const WIRE_LEN: usize = 25;

    fn decode(b: &[u8]) -> Result<Self, DecodeError> {
        let param_type = ParamType::from_wire(b[24]).ok_or(DecodeError::InvalidField {
            name: "PARAM_VALUE",
            field: "param_type",
        })?;
        Ok(Self {
            value: f32_at(b, 0),
            total_count: u16_at(b, 4),
            index: u16_at(b, 6),
            name: name_at(b, 8),
            param_type,
        })
    }

    fn encode_into(&self, out: &mut Vec<u8>) {
        out.put_f32_le(self.value);
        out.put_u16_le(self.total_count);
        out.put_u16_le(self.index);
        put_name(out, &self.name);
        out.put_u8(self.param_type.to_wire());
    }
}

/// Write one named parameter on the vehicle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamSet {
    pub value: f32,
    pub target_system: u8,
    pub target_component: u8,
    pub name: String,
    pub param_type: ParamType,
}

impl ParamSet {
    pub const WIRE_LEN: usize = 23;

    fn decode(b: &[u8]) -> Result<Self, DecodeError> {
        let param_type = ParamType::from_wire(b[22]).ok_or(DecodeError::InvalidField {
            name: "PARAM_SET",
            field: "param_type",
        })?;
        Ok(Self {
            value: f32_at(b, 0),
            target_system: b[4],
            target_component: b[5],
            name: name_at(b, 6),
            param_type,
        })
    }

    fn encode_into(&self, out: &mut Vec<u8>) {
        out.put_f32_le(self.value);
        out.put_u8(self.target_system);
        out.put_u8(self.target_component);
        put_name(out, &self.name);
        out.put_u8(self.param_type.to_wire());
    }
}

/// Attitude in radians and radians/second.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attitude {
    pub time_boot_ms: u32,
    pub roll: f32,
    pub pitch: f32,
    pub yaw: f32,
    pub rollspeed: f32,
    pub pitchspeed: f32,
    pub yawspeed: f32,
}

impl Attitude {
    pub const WIRE_LEN: usize = 28;

    fn decode(b: &[u8]) -> Result<Self, DecodeError> {
        Ok(Self {
            time_boot_ms: u32_at(b, 0),
            roll: f32_at(b, 4),
            pitch: f32_at(b, 8),
            yaw: f32_at(b, 12),
            rollspeed: f32_at(b, 16),
            pitchspeed: f32_at(b, 20),
            yawspeed: f32_at(b, 24),
        })
    }

    fn encode_into(&self, out: &mut Vec<u8>) {
        out.put_u32_le(self.time_boot_ms);
        out.put_f32_le(self.roll);
        out.put_f32_le(self.pitch);
        out.put_f32_le(self.yaw);
        out.put_f32_le(self.rollspeed);
        out.put_f32_le(self.pitchspeed);
        out.put_f32_le(self.yawspeed);
    }
}

/// Fused global position. Latitude/longitude in degrees * 1e7, altitudes in
/// millimeters, velocities in cm/s, heading in centidegrees.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalPositionInt {
    pub time_boot_ms: u32,
    pub lat: i32,
    pub lon: i32,
    pub alt: i32,
    pub relative_alt: i32,
    pub vx: i16,
    pub vy: i16,
    pub vz: i16,
    pub hdg: u16,
}

impl GlobalPositionInt {
    pub const WIRE_LEN: usize = 28;

    fn decode(b: &[u8]) -> Result<Self, DecodeError> {
        Ok(Self {
            time_boot_ms: u32_at(b, 0),
            lat: i32_at(b, 4),
            lon: i32_at(b, 8),
            alt: i32_at(b, 12),
            relative_alt: i32_at(b, 16),
            vx: i16_at(b, 20),
            vy: i16_at(b, 22),
            vz: i16_at(b, 24),
            hdg: u16_at(b, 26),
        })
    }

    fn encode_into(&self, out: &mut Vec<u8>) {
        out.put_u32_le(self.time_boot_ms);
        out.put_i32_le(self.lat);
        out.put_i32_le(self.lon);
        out.put_i32_le(self.alt);
        out.put_i32_le(self.relative_alt);
        out.put_i16_le(self.vx);
        out.put_i16_le(self.vy);
        out.put_i16_le(self.vz);
        out.put_u16_le(self.hdg);
    }
}

/// Raw RC channel override. A channel value of 0 releases the channel back
/// to the radio; `u16::MAX` leaves it untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RcChannelsOverride {
    pub channels: [u16; 8],
    pub target_system: u8,
    pub target_component: u8,
}

impl RcChannelsOverride {
    pub const WIRE_LEN: usize = 18;

    /// Neutral sticks on all eight channels.
    pub fn neutral(target_system: u8, target_component: u8) -> Self {
        Self { channels: [1500; 8], target_system, target_component }
    }

    /// Release all channels back to the radio.
    pub fn release(target_system: u8, target_component: u8) -> Self {
        Self { channels: [0; 8], target_system, target_component }
    }

    fn decode(b: &[u8]) -> Result<Self, DecodeError> {
        let mut channels = [0u16; 8];
        for (i, chan) in channels.iter_mut().enumerate() {
            *chan = u16_at(b, i * 2);
        }
        Ok(Self { channels, target_system: b[16], target_component: b[17] })
    }

    fn encode_into(&self, out: &mut Vec<u8>) {
        for chan in self.channels {
            out.put_u16_le(chan);
        }
        out.put_u8(self.target_system);
        out.put_u8(self.target_component);
    }
}

/// A long-form command with up to seven float parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandLong {
    pub param1: f32,
    pub param2: f32,
    pub param3: f32,
    pub param4: f32,
    pub param5: f32,
    pub param6: f32,
    pub param7: f32,
    pub command: CommandId,
    pub target_system: u8,
    pub target_component: u8,
    pub confirmation: u8,
}

impl CommandLong {
    pub const WIRE_LEN: usize = 33;

    /// A command with every parameter zeroed.
    pub fn new(command: CommandId, target_system: u8, target_component: u8) -> Self {
        Self {
            param1: 0.0,
            param2: 0.0,
            param3: 0.0,
            param4: 0.0,
            param5: 0.0,
            param6: 0.0,
            param7: 0.0,
            command,
            target_system,
            target_component,
            confirmation: 0,
        }
    }

    fn decode(b: &[u8]) -> Result<Self, DecodeError> {
        Ok(Self {
            param1: f32_at(b, 0),
            param2: f32_at(b, 4),
            param3: f32_at(b, 8),
            param4: f32_at(b, 12),
            param5: f32_at(b, 16),
            param6: f32_at(b, 20),
            param7: f32_at(b, 24),
            command: CommandId(u16_at(b, 28)),
            target_system: b[30],
            target_component: b[31],
            confirmation: b[32],
        })
    }

    fn encode_into(&self, out: &mut Vec<u8>) {
        out.put_f32_le(self.param1);
        out.put_f32_le(self.param2);
        out.put_f32_le(self.param3);
        out.put_f32_le(self.param4);
        out.put_f32_le(self.param5);
        out.put_f32_le(self.param6);
        out.put_f32_le(self.param7);
        out.put_u16_le(self.command.0);
        out.put_u8(self.target_system);
        out.put_u8(self.target_component);
        out.put_u8(self.confirmation);
    }
}

/// Asynchronous acknowledgment of a previously issued command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandAck {
    pub command: CommandId,
    pub result: AckResult,
}

impl CommandAck {
    pub const WIRE_LEN: usize = 3;

    fn decode(b: &[u8]) -> Result<Self, DecodeError> {
        Ok(Self {
            command: CommandId(u16_at(b, 0)),
            result: AckResult::from_wire(b[2]),
        })
    }

    fn encode_into(&self, out: &mut Vec<u8>) {
        out.put_u16_le(self.command.0);
        out.put_u8(self.result.to_wire());
    }
}

macro_rules! payloads {
    ($($variant:ident),+ $(,)?) => {
        /// The decoded content of one frame.
        #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
        pub enum MessagePayload {
            $($variant($variant),)+
        }

        impl MessagePayload {
            /// The registered message type id of this payload.
            pub fn message_id(&self) -> MessageId {
                match self {
                    MessagePayload::Heartbeat(_) => MessageId::HEARTBEAT,
                    MessagePayload::SysStatus(_) => MessageId::SYS_STATUS,
                    MessagePayload::ParamRequestList(_) => MessageId::PARAM_REQUEST_LIST,
                    MessagePayload::ParamValue(_) => MessageId::PARAM_VALUE,
                    MessagePayload::ParamSet(_) => MessageId::PARAM_SET,
                    MessagePayload::Attitude(_) => MessageId::ATTITUDE,
                    MessagePayload::GlobalPositionInt(_) => MessageId::GLOBAL_POSITION_INT,
                    MessagePayload::RcChannelsOverride(_) => MessageId::RC_CHANNELS_OVERRIDE,
                    MessagePayload::CommandLong(_) => MessageId::COMMAND_LONG,
                    MessagePayload::CommandAck(_) => MessageId::COMMAND_ACK,
                }
            }

            /// Serialize the payload body in wire order.
            pub fn encode(&self) -> Vec<u8> {
                let mut out = Vec::with_capacity(CommandLong::WIRE_LEN);
                match self {
                    $(MessagePayload::$variant(inner) => inner.encode_into(&mut out),)+
                }
                out
            }
        }

        $(
            impl From<$variant> for MessagePayload {
                fn from(inner: $variant) -> Self {
                    MessagePayload::$variant(inner)
                }
            }
        )+
    };
}

payloads!(
    Heartbeat,
    SysStatus,
    ParamRequestList,
    ParamValue,
    ParamSet,
    Attitude,
    GlobalPositionInt,
    RcChannelsOverride,
    CommandLong,
    CommandAck,
);

macro_rules! decoders {
    ($($fn_name:ident => $variant:ident),+ $(,)?) => {
        $(
            pub(super) fn $fn_name(b: &[u8]) -> Result<MessagePayload, DecodeError> {
                $variant::decode(b).map(MessagePayload::$variant)
            }
        )+
    };
}

decoders!(
    decode_heartbeat => Heartbeat,
    decode_sys_status => SysStatus,
    decode_param_request_list => ParamRequestList,
    decode_param_value => ParamValue,
    decode_param_set => ParamSet,
    decode_attitude => Attitude,
    decode_global_position_int => GlobalPositionInt,
    decode_rc_channels_override => RcChannelsOverride,
    decode_command_long => CommandLong,
    decode_command_ack => CommandAck,
);

/// A decoded, typed message tagged with its frame header fields.
/// Immutable once decoded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub sequence: u8,
    pub system_id: u8,
    pub component_id: u8,
    pub payload: MessagePayload,
}
