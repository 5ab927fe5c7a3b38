//! Per-vehicle connection session.
//!
//! A session owns one physical link, the vehicle's state cache, the
//! outbound sequence counter and the ack correlation table. Its receive
//! task runs independently of every caller-invoked operation: it keeps
//! decoding and publishing even while a command wait is pending, so
//! unrelated traffic is never blocked.
//!
//! State machine: `Opening → Live → Stale → Closed`. Heartbeat absence past
//! the liveness window is advisory only (`is_live()` turns false); the link
//! is released exclusively by an explicit [`ConnectionSession::close`] or a
//! link I/O failure.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use bytes::BytesMut;
use serde::Serialize;
use tokio::sync::{Mutex, broadcast, watch};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::command::AckRouter;
use crate::config::GatewayConfig;
use crate::error::{GatewayError, Result};
use crate::link::{Link, LinkReader, LinkWriter};
use crate::protocol::{self, DecodeError, FRAME_HEADER, Heartbeat, MAX_FRAME_SIZE, Message, MessagePayload};
use crate::state::VehicleStateCache;

/// Connection lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionState {
    /// Link established, no heartbeat observed yet.
    Opening,
    /// Heartbeat observed within the liveness window.
    Live,
    /// No heartbeat for longer than the liveness window; the link is still
    /// held but the vehicle is reported as disconnected.
    Stale,
    /// Link released. Terminal.
    Closed,
}

struct Writer {
    sink: Box<dyn LinkWriter>,
    /// Outbound sequence counter, exclusively owned by this session.
    /// Wraps 0→255→0 without gaps.
    sequence: u8,
    system_id: u8,
    component_id: u8,
}

/// Live binding between the gateway and one vehicle's physical link.
pub struct ConnectionSession {
    link_id: String,
    cache: VehicleStateCache,
    publisher: RwLock<broadcast::Sender<Arc<Message>>>,
    acks: AckRouter,
    last_heartbeat: watch::Sender<Option<Instant>>,
    /// Source (system_id, component_id) learned from the first inbound frame.
    origin: watch::Sender<Option<(u8, u8)>>,
    closed: AtomicBool,
    cancel: CancellationToken,
    writer: Mutex<Writer>,
    liveness_window: Duration,
}

impl ConnectionSession {
    /// Take ownership of a link and start the receive task (plus the
    /// periodic gateway heartbeat, when configured).
    ///
    /// `publisher` is the bus channel for this link's topic; every decoded
    /// message is published there after the state cache update.
    pub fn open(
        link: Box<dyn Link>,
        publisher: broadcast::Sender<Arc<Message>>,
        config: &GatewayConfig,
    ) -> Arc<Self> {
        let link_id = link.identity();
        let (reader, sink) = link.split();

        let session = Arc::new(Self {
            link_id,
            cache: VehicleStateCache::new(),
            publisher: RwLock::new(publisher),
            acks: AckRouter::new(),
            last_heartbeat: watch::channel(None).0,
            origin: watch::channel(None).0,
            closed: AtomicBool::new(false),
            cancel: CancellationToken::new(),
            writer: Mutex::new(Writer {
                sink,
                sequence: 0,
                system_id: config.system_id,
                component_id: config.component_id,
            }),
            liveness_window: config.liveness_window(),
        });

        tokio::spawn(Self::receive_loop(Arc::clone(&session), reader));
        if let Some(hz) = config.heartbeat_send_hz {
            tokio::spawn(Self::heartbeat_loop(Arc::clone(&session), hz));
        }
        session
    }

    /// Identity of the underlying link.
    pub fn link_id(&self) -> &str {
        &self.link_id
    }

    /// The vehicle's latest-value message cache.
    pub fn cache(&self) -> &VehicleStateCache {
        &self.cache
    }

    /// The ack correlation table for this session.
    pub fn acks(&self) -> &AckRouter {
        &self.acks
    }

    /// Subscribe to every decoded message from this vehicle, in receive
    /// order.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<Message>> {
        self.publisher().subscribe()
    }

    pub(crate) fn publisher(&self) -> broadcast::Sender<Arc<Message>> {
        self.publisher
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Re-point delivery at another bus channel. Used at promotion so the
    /// vehicle topic's channel carries this session's traffic; any earlier
    /// subscribers of the old channel simply observe no further messages
    /// from this session.
    pub(crate) fn set_publisher(&self, publisher: broadcast::Sender<Arc<Message>>) {
        *self
            .publisher
            .write()
            .unwrap_or_else(PoisonError::into_inner) = publisher;
    }

    /// Source ids of the vehicle, once any frame has been received.
    pub fn origin(&self) -> Option<(u8, u8)> {
        *self.origin.borrow()
    }

    /// Target (system, component) for outbound messages: the vehicle's own
    /// ids when known, the conventional 1/1 autopilot address otherwise.
    pub fn target(&self) -> (u8, u8) {
        self.origin().unwrap_or((1, 1))
    }

    /// Current lifecycle state, derived from the closed flag and heartbeat
    /// age.
    pub fn state(&self) -> SessionState {
        if self.closed.load(Ordering::Acquire) {
            return SessionState::Closed;
        }
        match *self.last_heartbeat.borrow() {
            None => SessionState::Opening,
            Some(at) if at.elapsed() <= self.liveness_window => SessionState::Live,
            Some(_) => SessionState::Stale,
        }
    }

    /// True only in [`SessionState::Live`].
    pub fn is_live(&self) -> bool {
        self.state() == SessionState::Live
    }

    /// Wait until the first heartbeat arrives, bounded by `timeout`.
    /// Returns false on timeout or if the session closes first.
    pub async fn wait_for_heartbeat(&self, timeout: Duration) -> bool {
        let mut rx = self.last_heartbeat.subscribe();
        if rx.borrow().is_some() {
            return true;
        }
        tokio::time::timeout(timeout, async {
            while rx.changed().await.is_ok() {
                if rx.borrow().is_some() {
                    return true;
                }
            }
            false
        })
        .await
        .unwrap_or(false)
    }

    /// Encode and transmit one message, assigning the next outbound
    /// sequence number. A write failure closes the session.
    pub async fn send(&self, payload: MessagePayload) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(GatewayError::SessionClosed);
        }
        let mut writer = self.writer.lock().await;
        let sequence = writer.sequence;
        writer.sequence = writer.sequence.wrapping_add(1);
        let frame = protocol::encode(&payload, sequence, writer.system_id, writer.component_id);
        trace!(
            link = %self.link_id,
            id = %payload.message_id(),
            sequence,
            "sending frame"
        );
        if let Err(source) = writer.sink.send(&frame).await {
            warn!(link = %self.link_id, error = %source, "link write failed, closing session");
            self.mark_closed();
            return Err(GatewayError::Link { link: self.link_id.clone(), source });
        }
        Ok(())
    }

    /// Release the link. Terminal; idempotent.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            info!(link = %self.link_id, "session closed");
        }
        self.cancel.cancel();
    }

    fn mark_closed(&self) {
        self.closed.store(true, Ordering::Release);
        self.cancel.cancel();
    }

    async fn receive_loop(session: Arc<Self>, mut reader: Box<dyn LinkReader>) {
        debug!(link = %session.link_id, "receive loop started");
        let mut buf = BytesMut::with_capacity(2 * MAX_FRAME_SIZE);
        let mut last_seq: HashMap<u8, u8> = HashMap::new();

        loop {
            let chunk = tokio::select! {
                _ = session.cancel.cancelled() => break,
                chunk = reader.recv() => chunk,
            };
            match chunk {
                Ok(bytes) if bytes.is_empty() => {
                    info!(link = %session.link_id, "link closed by peer");
                    session.mark_closed();
                    break;
                }
                Ok(bytes) => {
                    buf.extend_from_slice(&bytes);
                    session.drain_frames(&mut buf, &mut last_seq);
                }
                Err(error) => {
                    warn!(link = %session.link_id, %error, "link read failed, closing session");
                    session.mark_closed();
                    break;
                }
            }
        }
        debug!(link = %session.link_id, "receive loop ended");
    }

    /// Decode every complete frame at the front of the buffer, skipping
    /// garbage until the next start byte. Decode errors are absorbed here;
    /// they never close the session.
    fn drain_frames(&self, buf: &mut BytesMut, last_seq: &mut HashMap<u8, u8>) {
        loop {
            let mut skipped = 0usize;
            while !buf.is_empty() && buf[0] != FRAME_HEADER {
                let _ = buf.split_to(1);
                skipped += 1;
            }
            if skipped > 0 {
                trace!(link = %self.link_id, skipped, "skipped bytes resynchronizing");
            }
            if buf.is_empty() {
                return;
            }

            match protocol::decode(buf) {
                Ok((message, consumed)) => {
                    let _ = buf.split_to(consumed);
                    self.deliver(message, last_seq);
                }
                Err(DecodeError::Truncated { .. }) => return,
                Err(error) => {
                    debug!(link = %self.link_id, %error, "dropping undecodable frame");
                    let _ = buf.split_to(1);
                }
            }
        }
    }

    /// Cache update, then heartbeat bookkeeping, then ack resolution, then
    /// the bus publish, preserving per-vehicle delivery order.
    fn deliver(&self, message: Message, last_seq: &mut HashMap<u8, u8>) {
        if let Some(previous) = last_seq.insert(message.system_id, message.sequence) {
            let expected = previous.wrapping_add(1);
            if message.sequence != expected {
                debug!(
                    link = %self.link_id,
                    system_id = message.system_id,
                    lost = message.sequence.wrapping_sub(expected),
                    "inbound sequence gap"
                );
            }
        }

        let message = Arc::new(message);
        self.cache.update(Arc::clone(&message));

        if self.origin.borrow().is_none() {
            let _ = self
                .origin
                .send(Some((message.system_id, message.component_id)));
        }

        match &message.payload {
            MessagePayload::Heartbeat(hb) => {
                trace!(
                    link = %self.link_id,
                    system_id = message.system_id,
                    status = ?hb.system_status,
                    "heartbeat"
                );
                let _ = self.last_heartbeat.send(Some(Instant::now()));
            }
            MessagePayload::CommandAck(ack) => self.acks.resolve(ack.clone()),
            _ => {}
        }

        // No subscribers is fine; the cache already holds the value.
        let _ = self.publisher().send(message);
    }

    async fn heartbeat_loop(session: Arc<Self>, hz: f32) {
        let period = Duration::from_secs_f32(1.0 / hz.max(0.1));
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = session.cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }
            let payload = MessagePayload::Heartbeat(Heartbeat::ground_station());
            if session.send(payload).await.is_err() {
                break;
            }
        }
    }
}

impl Drop for ConnectionSession {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl std::fmt::Debug for ConnectionSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionSession")
            .field("link_id", &self.link_id)
            .field("state", &self.state())
            .finish()
    }
}
