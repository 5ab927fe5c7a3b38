//! In-memory links and a scripted vehicle for exercising the gateway
//! without hardware.
//!
//! Everything here rides on channels, so tests run under a paused tokio
//! clock and stay deterministic. The module is public: downstream crates
//! embedding the gateway use the same pieces for their own tests.

use std::sync::{Mutex as StdMutex, PoisonError};
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::link::{Link, LinkReader, LinkScanner, LinkWriter};
use crate::protocol::{
    self, CommandAck, DecodeError, FRAME_HEADER, Heartbeat, MessagePayload, ParamValue,
};
use crate::types::{
    AckResult, AutopilotType, CommandId, ModeFlags, ParamType, SystemStatus, VehicleType,
};

const CHANNEL_DEPTH: usize = 1024;

/// One side of an in-memory byte pipe, usable wherever a physical link is
/// expected.
pub struct MemoryLink {
    identity: String,
    rx: mpsc::Receiver<Bytes>,
    tx: mpsc::Sender<Bytes>,
}

struct MemoryReader {
    rx: mpsc::Receiver<Bytes>,
}

struct MemoryWriter {
    tx: mpsc::Sender<Bytes>,
}

#[async_trait::async_trait]
impl LinkReader for MemoryReader {
    async fn recv(&mut self) -> std::io::Result<Bytes> {
        // Channel closed reads as a clean EOF.
        Ok(self.rx.recv().await.unwrap_or_default())
    }
}

#[async_trait::async_trait]
impl LinkWriter for MemoryWriter {
    async fn send(&mut self, frame: &[u8]) -> std::io::Result<()> {
        self.tx
            .send(Bytes::copy_from_slice(frame))
            .await
            .map_err(|_| std::io::Error::new(std::io::ErrorKind::BrokenPipe, "peer gone"))
    }
}

impl Link for MemoryLink {
    fn identity(&self) -> String {
        self.identity.clone()
    }

    fn split(self: Box<Self>) -> (Box<dyn LinkReader>, Box<dyn LinkWriter>) {
        (Box::new(MemoryReader { rx: self.rx }), Box::new(MemoryWriter { tx: self.tx }))
    }
}

/// Test-side handle to the far end of a [`MemoryLink`].
pub struct MemoryPeer {
    to_gateway: mpsc::Sender<Bytes>,
    from_gateway: Mutex<Option<mpsc::Receiver<Bytes>>>,
}

impl MemoryPeer {
    /// Push raw bytes toward the gateway, chunked exactly as given.
    pub async fn inject(&self, bytes: Bytes) {
        let _ = self.to_gateway.send(bytes).await;
    }

    /// Take every frame the gateway has written so far.
    pub async fn drain_frames(&self) -> Vec<Bytes> {
        let mut guard = self.from_gateway.lock().await;
        let mut frames = Vec::new();
        if let Some(rx) = guard.as_mut() {
            while let Ok(frame) = rx.try_recv() {
                frames.push(frame);
            }
        }
        frames
    }

    /// Wait for the next frame from the gateway.
    pub async fn recv_frame(&self) -> Option<Bytes> {
        let mut guard = self.from_gateway.lock().await;
        guard.as_mut()?.recv().await
    }

    /// Close the gateway's write path while leaving its read path open, so
    /// the next write fails deterministically.
    pub async fn sever(&self) {
        let mut guard = self.from_gateway.lock().await;
        *guard = None;
    }
}

/// A connected `(link, peer)` pair sharing two in-memory byte pipes.
pub fn memory_link_pair(identity: &str) -> (MemoryLink, MemoryPeer) {
    let (to_gateway, gateway_rx) = mpsc::channel(CHANNEL_DEPTH);
    let (gateway_tx, from_gateway) = mpsc::channel(CHANNEL_DEPTH);
    let link = MemoryLink {
        identity: identity.to_string(),
        rx: gateway_rx,
        tx: gateway_tx,
    };
    let peer = MemoryPeer { to_gateway, from_gateway: Mutex::new(Some(from_gateway)) };
    (link, peer)
}

/// Scanner backed by a hand-fed queue of links. Each [`LinkScanner::scan`]
/// drains whatever has been added since the last call.
#[derive(Default)]
pub struct MemoryLinkScanner {
    pending: StdMutex<Vec<Box<dyn Link>>>,
}

impl MemoryLinkScanner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, link: impl Link) {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        pending.push(Box::new(link));
    }
}

#[async_trait::async_trait]
impl LinkScanner for MemoryLinkScanner {
    async fn scan(&self) -> Vec<Box<dyn Link>> {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        std::mem::take(&mut *pending)
    }
}

/// Behavior script for a [`SimVehicle`].
#[derive(Debug, Clone)]
pub struct SimVehicleConfig {
    pub identity: String,
    pub system_id: u8,
    pub component_id: u8,
    /// `None` silences the vehicle, which then never becomes live.
    pub heartbeat_period: Option<Duration>,
    /// Result code stamped on every command ack.
    pub ack_result: AckResult,
    /// Acknowledge with this command id instead of the one received.
    /// Simulates a vehicle acking something the gateway never sent.
    pub ack_with: Option<CommandId>,
    /// Onboard parameter table.
    pub params: Vec<(String, f32, ParamType)>,
    /// Echo this value instead of the requested one when the named
    /// parameter is written. Simulates onboard clamping.
    pub misreport: Option<(String, f32)>,
    /// Apply parameter writes but never echo them back. Simulates an
    /// autopilot that drops the confirming PARAM_VALUE.
    pub suppress_echo: bool,
    /// Extra entries counted in `total_count` but never reported, forcing
    /// an incomplete read.
    pub phantom_params: u16,
}

impl SimVehicleConfig {
    pub fn new(identity: &str) -> Self {
        Self {
            identity: identity.to_string(),
            system_id: 1,
            component_id: 1,
            heartbeat_period: Some(Duration::from_secs(1)),
            ack_result: AckResult::Accepted,
            ack_with: None,
            params: Vec::new(),
            misreport: None,
            suppress_echo: false,
            phantom_params: 0,
        }
    }
}

/// Running scripted vehicle. Dropping the handle stops it.
pub struct SimVehicle {
    cancel: CancellationToken,
}

impl SimVehicle {
    /// Start a vehicle task and return the gateway-side link to it.
    pub fn spawn(config: SimVehicleConfig) -> (MemoryLink, SimVehicle) {
        let (to_gateway, gateway_rx) = mpsc::channel(CHANNEL_DEPTH);
        let (gateway_tx, from_gateway) = mpsc::channel(CHANNEL_DEPTH);
        let link = MemoryLink {
            identity: config.identity.clone(),
            rx: gateway_rx,
            tx: gateway_tx,
        };
        let cancel = CancellationToken::new();
        tokio::spawn(run_vehicle(config, from_gateway, to_gateway, cancel.clone()));
        (link, SimVehicle { cancel })
    }

    /// Stop the vehicle task. Heartbeats cease; the link stays open.
    pub fn stop(&self) {
        self.cancel.cancel();
    }
}

impl Drop for SimVehicle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

struct VehicleTask {
    config: SimVehicleConfig,
    tx: mpsc::Sender<Bytes>,
    sequence: u8,
}

impl VehicleTask {
    async fn send(&mut self, payload: MessagePayload) -> bool {
        let frame = protocol::encode(
            &payload,
            self.sequence,
            self.config.system_id,
            self.config.component_id,
        );
        self.sequence = self.sequence.wrapping_add(1);
        self.tx.send(frame).await.is_ok()
    }

    async fn heartbeat(&mut self) -> bool {
        self.send(MessagePayload::Heartbeat(Heartbeat {
            custom_mode: 0,
            vehicle_type: VehicleType::Quadrotor,
            autopilot: AutopilotType::ArduPilot,
            base_mode: ModeFlags::new(ModeFlags::CUSTOM_MODE_ENABLED),
            system_status: SystemStatus::Active,
            protocol_version: 3,
        }))
        .await
    }

    fn total_count(&self) -> u16 {
        self.config.params.len() as u16 + self.config.phantom_params
    }

    async fn handle(&mut self, payload: MessagePayload) -> bool {
        match payload {
            MessagePayload::CommandLong(cmd) => {
                let command = self.config.ack_with.unwrap_or(cmd.command);
                trace!(received = %cmd.command, acked = %command, "sim vehicle acking");
                self.send(MessagePayload::CommandAck(CommandAck {
                    command,
                    result: self.config.ack_result,
                }))
                .await
            }
            MessagePayload::ParamRequestList(_) => {
                let total = self.total_count();
                let reports: Vec<ParamValue> = self
                    .config
                    .params
                    .iter()
                    .enumerate()
                    .map(|(index, (name, value, param_type))| ParamValue {
                        value: *value,
                        total_count: total,
                        index: index as u16,
                        name: name.clone(),
                        param_type: *param_type,
                    })
                    .collect();
                for report in reports {
                    if !self.send(MessagePayload::ParamValue(report)).await {
                        return false;
                    }
                }
                true
            }
            MessagePayload::ParamSet(set) => {
                let stored = match &self.config.misreport {
                    Some((name, clamped)) if *name == set.name => *clamped,
                    _ => set.value,
                };
                let index = self
                    .config
                    .params
                    .iter()
                    .position(|(name, _, _)| *name == set.name)
                    .unwrap_or_else(|| {
                        self.config.params.push((set.name.clone(), stored, set.param_type));
                        self.config.params.len() - 1
                    });
                self.config.params[index].1 = stored;
                if self.config.suppress_echo {
                    return true;
                }
                let total = self.total_count();
                self.send(MessagePayload::ParamValue(ParamValue {
                    value: stored,
                    total_count: total,
                    index: index as u16,
                    name: set.name,
                    param_type: set.param_type,
                }))
                .await
            }
            _ => true,
        }
    }
}

async fn run_vehicle(
    config: SimVehicleConfig,
    mut rx: mpsc::Receiver<Bytes>,
    tx: mpsc::Sender<Bytes>,
    cancel: CancellationToken,
) {
    let mut ticker = config.heartbeat_period.map(tokio::time::interval);
    let mut task = VehicleTask { config, tx, sequence: 0 };
    let mut buf = BytesMut::new();

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = async {
                match ticker.as_mut() {
                    Some(ticker) => { ticker.tick().await; }
                    None => std::future::pending().await,
                }
            } => {
                if !task.heartbeat().await {
                    break;
                }
            }
            chunk = rx.recv() => {
                let Some(chunk) = chunk else { break };
                buf.extend_from_slice(&chunk);
                if !drain(&mut task, &mut buf).await {
                    break;
                }
            }
        }
    }
}

async fn drain(task: &mut VehicleTask, buf: &mut BytesMut) -> bool {
    loop {
        while !buf.is_empty() && buf[0] != FRAME_HEADER {
            let _ = buf.split_to(1);
        }
        if buf.is_empty() {
            return true;
        }
        match protocol::decode(buf) {
            Ok((message, consumed)) => {
                let _ = buf.split_to(consumed);
                if !task.handle(message.payload).await {
                    return false;
                }
            }
            Err(DecodeError::Truncated { .. }) => return true,
            Err(_) => {
                let _ = buf.split_to(1);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{CommandLong, ParamRequestList};

    async fn decode_one(frame: &Bytes) -> MessagePayload {
        let (message, consumed) = protocol::decode(frame).unwrap();
        assert_eq!(consumed, frame.len());
        message.payload
    }

    #[tokio::test(start_paused = true)]
    async fn sim_vehicle_acks_commands() {
        let (link, _vehicle) = SimVehicle::spawn(SimVehicleConfig {
            heartbeat_period: None,
            ..SimVehicleConfig::new("sim0")
        });
        let (mut reader, mut writer) = Box::new(link).split();

        let cmd = CommandLong::new(CommandId::NAV_TAKEOFF, 1, 1);
        let frame = protocol::encode(&MessagePayload::CommandLong(cmd), 0, 255, 190);
        writer.send(&frame).await.unwrap();

        let reply = reader.recv().await.unwrap();
        match decode_one(&reply).await {
            MessagePayload::CommandAck(ack) => {
                assert_eq!(ack.command, CommandId::NAV_TAKEOFF);
                assert_eq!(ack.result, AckResult::Accepted);
            }
            other => panic!("unexpected reply: {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn sim_vehicle_streams_its_parameter_table() {
        let mut config = SimVehicleConfig::new("sim0");
        config.heartbeat_period = None;
        config.params = vec![
            ("THR_MAX".into(), 0.9, ParamType::Float32),
            ("THR_MIN".into(), 0.1, ParamType::Float32),
        ];
        let (link, _vehicle) = SimVehicle::spawn(config);
        let (mut reader, mut writer) = Box::new(link).split();

        let req = ParamRequestList { target_system: 1, target_component: 1 };
        let frame = protocol::encode(&MessagePayload::ParamRequestList(req), 0, 255, 190);
        writer.send(&frame).await.unwrap();

        for expected in ["THR_MAX", "THR_MIN"] {
            let reply = reader.recv().await.unwrap();
            match decode_one(&reply).await {
                MessagePayload::ParamValue(report) => {
                    assert_eq!(report.name, expected);
                    assert_eq!(report.total_count, 2);
                }
                other => panic!("unexpected reply: {other:?}"),
            }
        }
    }
}
