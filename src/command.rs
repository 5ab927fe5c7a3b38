//! Command dispatch with acknowledgment correlation.
//!
//! Every control action is a fire-and-wait exchange: encode a COMMAND_LONG,
//! transmit it, then wait for the matching COMMAND_ACK. Acks carry no
//! per-request token, only the command id, so correlation is by command id
//! within the session. Concurrent waits on the *same* command id share the
//! first ack that arrives; waits on different ids never interfere.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, instrument};

use crate::config::GatewayConfig;
use crate::error::{GatewayError, Result};
use crate::protocol::{CommandAck, CommandLong, MessagePayload, RcChannelsOverride};
use crate::session::ConnectionSession;
use crate::types::{CommandId, FlightMode};

/// Per-session table of commands awaiting acknowledgment.
///
/// The receive loop calls [`AckRouter::resolve`] for every inbound
/// COMMAND_ACK; waiters park on a watch channel keyed by command id.
#[derive(Debug, Default)]
pub struct AckRouter {
    pending: Mutex<HashMap<CommandId, watch::Sender<Option<CommandAck>>>>,
}

impl AckRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register interest in the next ack for `command`. Must be called
    /// before the command is transmitted, otherwise a fast ack could slip
    /// through unobserved.
    pub fn register(&self, command: CommandId) -> watch::Receiver<Option<CommandAck>> {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        pending
            .entry(command)
            .or_insert_with(|| watch::channel(None).0)
            .subscribe()
    }

    /// Deliver an inbound ack to whoever is waiting on its command id.
    /// An ack nobody asked for is logged and dropped.
    pub fn resolve(&self, ack: CommandAck) {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        match pending.remove(&ack.command) {
            Some(waiter) => {
                let _ = waiter.send(Some(ack));
            }
            None => debug!(command = %ack.command, result = ?ack.result, "unsolicited ack"),
        }
    }

    /// Forget a registration whose waiter gave up. Callers drop their
    /// receiver first; while any other waiter is still subscribed the
    /// registration stays, so one timed-out send cannot starve a
    /// concurrent wait on the same command id. With no waiters left a
    /// later ack for this id becomes unsolicited.
    pub fn discard(&self, command: CommandId) {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        if pending
            .get(&command)
            .is_some_and(|waiter| waiter.receiver_count() == 0)
        {
            pending.remove(&command);
        }
    }
}

/// A control action expressed in domain terms. Conversion to the wire
/// COMMAND_LONG (command id plus the positional param1..param7 packing)
/// happens in [`CommandRequest::into_command_long`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CommandRequest {
    Arm,
    Disarm,
    ReturnToLaunch,
    Takeoff { height: f32 },
    NavigateWaypoint { latitude: f32, longitude: f32, altitude: f32 },
    LandAtLocation { latitude: f32, longitude: f32, altitude: f32 },
    LoiterTime { seconds: f32, radius: f32, latitude: f32, longitude: f32, altitude: f32 },
    LoiterTurns { turns: f32, radius: f32, latitude: f32, longitude: f32, altitude: f32 },
    LoiterUnlimited { radius: f32, latitude: f32, longitude: f32, altitude: f32 },
    SetMode { mode: FlightMode },
}

impl CommandRequest {
    /// Wire command id this request maps to.
    pub fn command_id(&self) -> CommandId {
        match self {
            Self::Arm | Self::Disarm => CommandId::COMPONENT_ARM_DISARM,
            Self::ReturnToLaunch => CommandId::NAV_RETURN_TO_LAUNCH,
            Self::Takeoff { .. } => CommandId::NAV_TAKEOFF,
            Self::NavigateWaypoint { .. } => CommandId::NAV_WAYPOINT,
            Self::LandAtLocation { .. } => CommandId::NAV_LAND,
            Self::LoiterTime { .. } => CommandId::NAV_LOITER_TIME,
            Self::LoiterTurns { .. } => CommandId::NAV_LOITER_TURNS,
            Self::LoiterUnlimited { .. } => CommandId::NAV_LOITER_UNLIMITED,
            Self::SetMode { .. } => CommandId::DO_SET_MODE,
        }
    }

    /// Pack into a COMMAND_LONG addressed to `(target_system,
    /// target_component)`. Unused positional params stay zero.
    pub fn into_command_long(self, target_system: u8, target_component: u8) -> CommandLong {
        let mut cmd = CommandLong::new(self.command_id(), target_system, target_component);
        match self {
            Self::Arm => cmd.param1 = 1.0,
            Self::Disarm => cmd.param1 = 0.0,
            Self::ReturnToLaunch => {}
            Self::Takeoff { height } => cmd.param7 = height,
            Self::NavigateWaypoint { latitude, longitude, altitude }
            | Self::LandAtLocation { latitude, longitude, altitude } => {
                cmd.param5 = latitude;
                cmd.param6 = longitude;
                cmd.param7 = altitude;
            }
            Self::LoiterTime { seconds, radius, latitude, longitude, altitude } => {
                cmd.param1 = seconds;
                cmd.param3 = radius;
                cmd.param5 = latitude;
                cmd.param6 = longitude;
                cmd.param7 = altitude;
            }
            Self::LoiterTurns { turns, radius, latitude, longitude, altitude } => {
                cmd.param1 = turns;
                cmd.param3 = radius;
                cmd.param5 = latitude;
                cmd.param6 = longitude;
                cmd.param7 = altitude;
            }
            Self::LoiterUnlimited { radius, latitude, longitude, altitude } => {
                cmd.param3 = radius;
                cmd.param5 = latitude;
                cmd.param6 = longitude;
                cmd.param7 = altitude;
            }
            Self::SetMode { mode } => cmd.param1 = f32::from(mode.to_wire()),
        }
        cmd
    }
}

/// Sends commands over a session and waits for their acks.
#[derive(Debug, Clone)]
pub struct CommandDispatcher {
    timeout: Duration,
}

impl CommandDispatcher {
    pub fn new(config: &GatewayConfig) -> Self {
        Self { timeout: config.command_timeout() }
    }

    /// Transmit `request` and wait for the vehicle's acknowledgment.
    ///
    /// The ack is returned whatever its result code; interpreting a
    /// rejection is the caller's business. An absent ack after the wait
    /// window is [`GatewayError::CommandTimeout`].
    #[instrument(skip(self, session), fields(link = %session.link_id()))]
    pub async fn send(
        &self,
        session: &ConnectionSession,
        request: CommandRequest,
    ) -> Result<CommandAck> {
        let command = request.command_id();
        let mut waiter = session.acks().register(command);

        let (target_system, target_component) = session.target();
        let cmd = request.into_command_long(target_system, target_component);
        if let Err(err) = session.send(MessagePayload::CommandLong(cmd)).await {
            drop(waiter);
            session.acks().discard(command);
            return Err(err);
        }

        let wait = async {
            loop {
                if let Some(ack) = waiter.borrow_and_update().clone() {
                    return ack;
                }
                if waiter.changed().await.is_err() {
                    // Router dropped the sender without resolving; only the
                    // timeout can end the wait now.
                    std::future::pending::<()>().await;
                }
            }
        };
        let outcome = tokio::time::timeout(self.timeout, wait).await;
        drop(waiter);
        match outcome {
            Ok(ack) => {
                debug!(command = %command, result = ?ack.result, "command acknowledged");
                Ok(ack)
            }
            Err(_) => {
                session.acks().discard(command);
                Err(GatewayError::CommandTimeout { command, elapsed: self.timeout })
            }
        }
    }

    /// Engage or release the RC override channel block. RC_CHANNELS_OVERRIDE
    /// is unacknowledged, so success means only that the frame was written.
    pub async fn rc_override(&self, session: &ConnectionSession, enable: bool) -> Result<()> {
        let (target_system, target_component) = session.target();
        let payload = if enable {
            RcChannelsOverride::neutral(target_system, target_component)
        } else {
            RcChannelsOverride::release(target_system, target_component)
        };
        session.send(MessagePayload::RcChannelsOverride(payload)).await
    }
}
