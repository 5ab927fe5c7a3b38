//! Numeric identifiers for message types and commands.

use serde::{Deserialize, Serialize};

/// Message type identifier carried in byte 5 of every frame.
///
/// Ids follow common MAVLink numbering so that captures from real autopilots
/// line up with the registry table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(pub u8);

impl MessageId {
    pub const HEARTBEAT: MessageId = MessageId(0);
    pub const SYS_STATUS: MessageId = MessageId(1);
    pub const PARAM_REQUEST_LIST: MessageId = MessageId(21);
    pub const PARAM_VALUE: MessageId = MessageId(22);
    pub const PARAM_SET: MessageId = MessageId(23);
    pub const ATTITUDE: MessageId = MessageId(30);
    pub const GLOBAL_POSITION_INT: MessageId = MessageId(33);
    pub const RC_CHANNELS_OVERRIDE: MessageId = MessageId(70);
    pub const COMMAND_LONG: MessageId = MessageId(76);
    pub const COMMAND_ACK: MessageId = MessageId(77);
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Command identifier carried in `CommandLong` and echoed back in
/// `CommandAck`. The `(vehicle, command)` pair is the ack correlation key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CommandId(pub u16);

impl CommandId {
    pub const NAV_WAYPOINT: CommandId = CommandId(16);
    pub const NAV_LOITER_UNLIMITED: CommandId = CommandId(17);
    pub const NAV_LOITER_TURNS: CommandId = CommandId(18);
    pub const NAV_LOITER_TIME: CommandId = CommandId(19);
    pub const NAV_RETURN_TO_LAUNCH: CommandId = CommandId(20);
    pub const NAV_LAND: CommandId = CommandId(21);
    pub const NAV_TAKEOFF: CommandId = CommandId(22);
    pub const DO_SET_MODE: CommandId = CommandId(176);
    pub const COMPONENT_ARM_DISARM: CommandId = CommandId(400);
}

impl std::fmt::Display for CommandId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
