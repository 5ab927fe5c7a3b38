//! Wire enums for heartbeat and acknowledgment fields.
//!
//! All of these are total over `u8`: a value this build does not know about
//! decodes as `Other(raw)` and encodes back to the same byte, so newer
//! autopilot firmware never causes a decode failure.

use serde::{Deserialize, Serialize};

use crate::error::GatewayError;

macro_rules! wire_enum {
    (
        $(#[$meta:meta])*
        $name:ident { $($variant:ident = $value:literal),+ $(,)? }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
        pub enum $name {
            $($variant,)+
            /// Wire value not known to this build.
            Other(u8),
        }

        impl $name {
            pub fn from_wire(raw: u8) -> Self {
                match raw {
                    $($value => Self::$variant,)+
                    other => Self::Other(other),
                }
            }

            pub fn to_wire(self) -> u8 {
                match self {
                    $(Self::$variant => $value,)+
                    Self::Other(raw) => raw,
                }
            }
        }
    };
}

wire_enum! {
    /// Airframe class reported in the heartbeat.
    VehicleType {
        Generic = 0,
        FixedWing = 1,
        Quadrotor = 2,
        Coaxial = 3,
        Helicopter = 4,
        GroundStation = 6,
        Airship = 7,
        GroundRover = 10,
        Submarine = 12,
        Hexarotor = 13,
        Octorotor = 14,
    }
}

wire_enum! {
    /// Autopilot firmware family reported in the heartbeat.
    AutopilotType {
        Generic = 0,
        Slugs = 2,
        ArduPilot = 3,
        OpenPilot = 4,
        Invalid = 8,
        Px4 = 12,
    }
}

wire_enum! {
    /// Overall system status reported in the heartbeat.
    SystemStatus {
        Uninit = 0,
        Boot = 1,
        Calibrating = 2,
        Standby = 3,
        Active = 4,
        Critical = 5,
        Emergency = 6,
        Poweroff = 7,
    }
}

wire_enum! {
    /// Result code carried in a command acknowledgment.
    AckResult {
        Accepted = 0,
        TemporarilyRejected = 1,
        Denied = 2,
        Unsupported = 3,
        Failed = 4,
        InProgress = 5,
    }
}

/// Named flight modes accepted by the set-mode operation.
///
/// The armed/disarmed pairs mirror the MAV_MODE values; callers address them
/// by name and unknown names are rejected before any message is sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlightMode {
    Preflight,
    StabilizeDisarmed,
    StabilizeArmed,
    ManualDisarmed,
    ManualArmed,
    GuidedDisarmed,
    GuidedArmed,
    AutoDisarmed,
    AutoArmed,
    TestDisarmed,
    TestArmed,
}

impl FlightMode {
    const NAMES: [(&'static str, FlightMode); 11] = [
        ("PREFLIGHT", FlightMode::Preflight),
        ("STABILIZE_DISARMED", FlightMode::StabilizeDisarmed),
        ("STABILIZE_ARMED", FlightMode::StabilizeArmed),
        ("MANUAL_DISARMED", FlightMode::ManualDisarmed),
        ("MANUAL_ARMED", FlightMode::ManualArmed),
        ("GUIDED_DISARMED", FlightMode::GuidedDisarmed),
        ("GUIDED_ARMED", FlightMode::GuidedArmed),
        ("AUTO_DISARMED", FlightMode::AutoDisarmed),
        ("AUTO_ARMED", FlightMode::AutoArmed),
        ("TEST_DISARMED", FlightMode::TestDisarmed),
        ("TEST_ARMED", FlightMode::TestArmed),
    ];

    /// The MAV_MODE byte sent as `param1` of the set-mode command.
    pub fn to_wire(self) -> u8 {
        match self {
            FlightMode::Preflight => 0,
            FlightMode::StabilizeDisarmed => 80,
            FlightMode::StabilizeArmed => 208,
            FlightMode::ManualDisarmed => 64,
            FlightMode::ManualArmed => 192,
            FlightMode::GuidedDisarmed => 88,
            FlightMode::GuidedArmed => 216,
            FlightMode::AutoDisarmed => 92,
            FlightMode::AutoArmed => 220,
            FlightMode::TestDisarmed => 66,
            FlightMode::TestArmed => 194,
        }
    }

    pub fn name(self) -> &'static str {
        Self::NAMES
            .iter()
            .find(|(_, mode)| *mode == self)
            .map(|(name, _)| *name)
            .unwrap_or("PREFLIGHT")
    }
}

impl std::str::FromStr for FlightMode {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::NAMES
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(s))
            .map(|(_, mode)| *mode)
            .ok_or_else(|| GatewayError::UnknownMode { name: s.to_string() })
    }
}
