//! Core protocol types shared across the gateway.
//!
//! This module provides the vocabulary of the wire protocol:
//! - [`MessageId`] / [`CommandId`] numeric identifiers used by the codec and
//!   the command dispatcher
//! - [`ModeFlags`] bitfield decomposition for heartbeat mode reporting
//! - [`VehicleType`], [`AutopilotType`], [`SystemStatus`], [`AckResult`]
//!   wire enums, kept total (unknown wire values round-trip as `Other`)
//! - [`FlightMode`] named modes parsed from caller-supplied strings
//! - [`ParamType`] the registered parameter type tags
//!
//! Enums that appear inside message payloads never fail to decode; only an
//! unregistered *message type id* is a decode error. Caller-facing inputs
//! (mode names, parameter type names) are validated before anything is sent.

mod enums;
mod ids;
mod mode_flags;
mod param_type;

pub use enums::{AckResult, AutopilotType, FlightMode, SystemStatus, VehicleType};
pub use ids::{CommandId, MessageId};
pub use mode_flags::ModeFlags;
pub use param_type::ParamType;
