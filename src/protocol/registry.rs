//! Message registry: the fixed table mapping message type ids to payload
//! layouts.
//!
//! Built once at first use and read-only afterwards. Adding a message type
//! is one [`MessageEntry`] plus a payload struct in `messages`; the codec
//! itself never changes. Unregistered ids are a decode error, never a crash.

use std::sync::OnceLock;

use super::frame::DecodeError;
use super::messages::{
    self, Attitude, CommandAck, CommandLong, GlobalPositionInt, Heartbeat, MessagePayload,
    ParamRequestList, ParamSet, ParamValue, RcChannelsOverride, SysStatus,
};
use crate::types::MessageId;

/// One registered message type: its id, wire name, fixed payload length and
/// payload decoder.
pub struct MessageEntry {
    pub id: MessageId,
    pub name: &'static str,
    pub payload_len: usize,
    pub decode: fn(&[u8]) -> Result<MessagePayload, DecodeError>,
}

static ENTRIES: [MessageEntry; 10] = [
    MessageEntry {
        id: MessageId::HEARTBEAT,
        name: "HEARTBEAT",
        payload_len: Heartbeat::WIRE_LEN,
        decode: messages::decode_heartbeat,
    },
    MessageEntry {
        id: MessageId::SYS_STATUS,
        name: "SYS_STATUS",
        payload_len: SysStatus::WIRE_LEN,
        decode: messages::decode_sys_status,
    },
    MessageEntry {
        id: MessageId::PARAM_REQUEST_LIST,
        name: "PARAM_REQUEST_LIST",
        payload_len: ParamRequestList::WIRE_LEN,
        decode: messages::decode_param_request_list,
    },
    MessageEntry {
        id: MessageId::PARAM_VALUE,
        name: "PARAM_VALUE",
        payload_len: ParamValue::WIRE_LEN,
        decode: messages::decode_param_value,
    },
    MessageEntry {
        id: MessageId::PARAM_SET,
        name: "PARAM_SET",
        payload_len: ParamSet::WIRE_LEN,
        decode: messages::decode_param_set,
    },
    MessageEntry {
        id: MessageId::ATTITUDE,
        name: "ATTITUDE",
        payload_len: Attitude::WIRE_LEN,
        decode: messages::decode_attitude,
    },
    MessageEntry {
        id: MessageId::GLOBAL_POSITION_INT,
        name: "GLOBAL_POSITION_INT",
        payload_len: GlobalPositionInt::WIRE_LEN,
        decode: messages::decode_global_position_int,
    },
    MessageEntry {
        id: MessageId::RC_CHANNELS_OVERRIDE,
        name: "RC_CHANNELS_OVERRIDE",
        payload_len: RcChannelsOverride::WIRE_LEN,
        decode: messages::decode_rc_channels_override,
    },
    MessageEntry {
        id: MessageId::COMMAND_LONG,
        name: "COMMAND_LONG",
        payload_len: CommandLong::WIRE_LEN,
        decode: messages::decode_command_long,
    },
    MessageEntry {
        id: MessageId::COMMAND_ACK,
        name: "COMMAND_ACK",
        payload_len: CommandAck::WIRE_LEN,
        decode: messages::decode_command_ack,
    },
];

/// O(1) lookup table over the 256 possible message type ids.
pub struct MessageRegistry {
    slots: [Option<&'static MessageEntry>; 256],
}

impl MessageRegistry {
    fn build() -> Self {
        let mut slots: [Option<&'static MessageEntry>; 256] = [None; 256];
        for entry in &ENTRIES {
            slots[entry.id.0 as usize] = Some(entry);
        }
        Self { slots }
    }

    /// Look up the entry for a raw message type id.
    pub fn get(&self, id: u8) -> Option<&'static MessageEntry> {
        self.slots[id as usize]
    }

    /// Iterate over every registered entry.
    pub fn entries(&self) -> impl Iterator<Item = &'static MessageEntry> {
        ENTRIES.iter()
    }
}

/// The process-wide registry, built on first use.
pub fn registry() -> &'static MessageRegistry {
    static REGISTRY: OnceLock<MessageRegistry> = OnceLock::new();
    REGISTRY.get_or_init(MessageRegistry::build)
}
