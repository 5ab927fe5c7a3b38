//! Binary wire protocol: frame codec, message registry, typed payloads.
//!
//! The codec is stateless and safe to invoke independently for every frame;
//! the only shared structure is the registry table, which is read-only after
//! initialization.

mod frame;
mod messages;
mod registry;

pub use frame::{
    CHECKSUM_SIZE, DecodeError, FRAME_HEADER, HEADER_SIZE, MAX_FRAME_SIZE, crc_x25, decode, encode,
};
pub use messages::{
    Attitude, CommandAck, CommandLong, GlobalPositionInt, Heartbeat, Message, MessagePayload,
    PARAM_NAME_LEN, ParamRequestList, ParamSet, ParamValue, RcChannelsOverride, SysStatus,
};
pub use registry::{MessageEntry, MessageRegistry, registry};
