//! Fleet registry: discovery, vehicle identity and the operation surface.
//!
//! The registry is the single owner of every session. Discovery promotes a
//! candidate link into a tracked vehicle only after a heartbeat proves
//! something is alive on the other end; a vehicle that reappears on a new
//! link keeps its identifier, matched by source system id.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Mutex;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::bus::LocalBus;
use crate::command::{CommandDispatcher, CommandRequest};
use crate::config::GatewayConfig;
use crate::error::{GatewayError, Result};
use crate::link::LinkScanner;
use crate::metadata::{NullMetadata, ParamMetadataSource};
use crate::params::{ParameterSet, ParameterSynchronizer, SetManyOutcome};
use crate::protocol::{CommandAck, Heartbeat, Message};
use crate::session::{ConnectionSession, SessionState};
use crate::types::{FlightMode, ParamType};

/// Snapshot of one tracked vehicle.
#[derive(Debug, Clone, Serialize)]
pub struct VehicleInfo {
    pub id: Uuid,
    pub system_id: u8,
    pub component_id: u8,
    /// Identity of the link currently carrying the vehicle.
    pub link: String,
    pub state: SessionState,
    /// Most recent heartbeat, when one has been received.
    pub heartbeat: Option<Heartbeat>,
}

#[derive(Default)]
struct FleetInner {
    vehicles: HashMap<Uuid, Arc<ConnectionSession>>,
    /// Stable identifier per source system id, surviving disconnects so a
    /// returning vehicle is recognized rather than re-registered.
    known: HashMap<u8, Uuid>,
    owned_links: HashSet<String>,
}

/// Owner of all vehicle sessions and entry point for every operation.
pub struct FleetRegistry {
    config: GatewayConfig,
    scanner: Box<dyn LinkScanner>,
    bus: Arc<LocalBus>,
    metadata: Arc<dyn ParamMetadataSource>,
    dispatcher: CommandDispatcher,
    params: ParameterSynchronizer,
    inner: Mutex<FleetInner>,
}

impl FleetRegistry {
    pub fn new(scanner: impl LinkScanner, config: GatewayConfig) -> Self {
        Self {
            dispatcher: CommandDispatcher::new(&config),
            params: ParameterSynchronizer::new(&config),
            config,
            scanner: Box::new(scanner),
            bus: Arc::new(LocalBus::new()),
            metadata: Arc::new(NullMetadata),
            inner: Mutex::new(FleetInner::default()),
        }
    }

    /// Attach a parameter metadata catalog.
    pub fn with_metadata(mut self, source: impl ParamMetadataSource + 'static) -> Self {
        self.metadata = Arc::new(source);
        self
    }

    /// The registry's message bus, for topic-level subscriptions.
    pub fn bus(&self) -> &Arc<LocalBus> {
        &self.bus
    }

    /// Scan for links and promote every candidate that proves alive.
    ///
    /// Idempotent: links already owned are skipped, and a vehicle already
    /// known by system id keeps its identifier. Returns the ids of
    /// vehicles promoted by this pass.
    #[instrument(skip(self))]
    pub async fn discover(&self) -> Vec<Uuid> {
        let candidates = self.scanner.scan().await;
        debug!(candidates = candidates.len(), "scan complete");
        let mut promoted = Vec::new();

        for link in candidates {
            let identity = link.identity();
            {
                let mut inner = self.inner.lock().await;
                let FleetInner { vehicles, owned_links, .. } = &mut *inner;
                // A session that died on its own releases its link here.
                for session in vehicles.values() {
                    if session.state() == SessionState::Closed {
                        owned_links.remove(session.link_id());
                    }
                }
                if !owned_links.insert(identity.clone()) {
                    debug!(link = %identity, "already owned, skipping");
                    continue;
                }
            }

            let publisher = self.bus.bind(&format!("links/{identity}"));
            let session = ConnectionSession::open(link, publisher, &self.config);
            if !session.wait_for_heartbeat(self.config.discover_timeout()).await {
                debug!(link = %identity, "no heartbeat, abandoning candidate");
                session.close();
                let mut inner = self.inner.lock().await;
                inner.owned_links.remove(&identity);
                continue;
            }

            let (system_id, _) = session.target();
            let id = {
                let mut inner = self.inner.lock().await;
                let id = *inner.known.entry(system_id).or_insert_with(Uuid::new_v4);
                if let Some(old) = inner.vehicles.insert(id, Arc::clone(&session)) {
                    // Same vehicle on a fresh link; retire the old session.
                    warn!(vehicle = %id, old_link = %old.link_id(), "replacing session");
                    let old_link = old.link_id().to_string();
                    inner.owned_links.remove(&old_link);
                    old.close();
                }
                id
            };
            // Publish into the vehicle topic's channel from here on, so
            // subscribers that arrived before this promotion (or before a
            // session replacement) keep receiving. The link topic becomes
            // an alias of the same channel.
            let vehicle_channel = self.bus.bind(&LocalBus::topic_for(id));
            session.set_publisher(vehicle_channel.clone());
            self.bus.attach(&format!("links/{identity}"), vehicle_channel);
            info!(vehicle = %id, system_id, link = %identity, "vehicle promoted");
            promoted.push(id);
        }
        promoted
    }

    /// Every tracked vehicle currently in the `Live` state.
    pub async fn list_active(&self) -> Vec<VehicleInfo> {
        let inner = self.inner.lock().await;
        inner
            .vehicles
            .iter()
            .filter(|(_, session)| session.is_live())
            .map(|(id, session)| Self::info(*id, session))
            .collect()
    }

    /// Snapshot of one vehicle, whatever its state.
    pub async fn get_by_id(&self, id: Uuid) -> Option<VehicleInfo> {
        let inner = self.inner.lock().await;
        inner.vehicles.get(&id).map(|session| Self::info(id, session))
    }

    /// Release the vehicle's link and stop tracking its session. The
    /// vehicle's identifier survives for a future rediscovery.
    pub async fn disconnect(&self, id: Uuid) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let session = inner
            .vehicles
            .remove(&id)
            .ok_or(GatewayError::NotFound { vehicle: id })?;
        let link = session.link_id().to_string();
        inner.owned_links.remove(&link);
        session.close();
        info!(vehicle = %id, %link, "vehicle disconnected");
        Ok(())
    }

    /// Subscribe to the vehicle's decoded message stream.
    pub async fn subscribe(&self, id: Uuid) -> Result<BroadcastStream<Arc<Message>>> {
        let inner = self.inner.lock().await;
        if !inner.vehicles.contains_key(&id) {
            return Err(GatewayError::NotFound { vehicle: id });
        }
        Ok(self.bus.subscribe(&LocalBus::topic_for(id)))
    }

    /// Direct handle to the vehicle's session, for cache reads and raw
    /// sends the operation surface does not cover.
    pub async fn session(&self, id: Uuid) -> Result<Arc<ConnectionSession>> {
        self.tracked_session(id).await
    }

    /// Send a command and wait for its acknowledgment.
    pub async fn command(&self, id: Uuid, request: CommandRequest) -> Result<CommandAck> {
        let session = self.live_session(id).await?;
        self.dispatcher.send(&session, request).await
    }

    /// Parse a mode name and command the vehicle into it.
    pub async fn set_mode(&self, id: Uuid, mode: &str) -> Result<CommandAck> {
        let mode: FlightMode = mode.parse()?;
        self.command(id, CommandRequest::SetMode { mode }).await
    }

    /// Engage or release the RC override block.
    pub async fn rc_override(&self, id: Uuid, enable: bool) -> Result<()> {
        let session = self.live_session(id).await?;
        self.dispatcher.rc_override(&session, enable).await
    }

    /// Read the vehicle's full parameter table, enriched with catalog
    /// metadata where available.
    pub async fn parameters(&self, id: Uuid) -> Result<ParameterSet> {
        let session = self.live_session(id).await?;
        let mut params = self.params.read_all(&session).await?;
        self.enrich(&mut params);
        Ok(params)
    }

    /// Apply a batch of parameter writes, then re-read the table so the
    /// caller sees the post-write truth rather than the requested values.
    pub async fn set_parameters(
        &self,
        id: Uuid,
        requests: &[(String, f32, ParamType)],
    ) -> Result<(SetManyOutcome, ParameterSet)> {
        let session = self.live_session(id).await?;
        let outcome = self.params.set_many(&session, requests).await;
        let mut params = match self.params.read_all(&session).await {
            Ok(params) => params,
            // A partial re-read is still the best available truth.
            Err(GatewayError::PartialParameterSet { partial, .. }) => partial,
            Err(err) => return Err(err),
        };
        self.enrich(&mut params);
        Ok((outcome, params))
    }

    fn enrich(&self, params: &mut ParameterSet) {
        for param in params.values_mut() {
            param.metadata = self.metadata.lookup(&param.name);
        }
    }

    fn info(id: Uuid, session: &ConnectionSession) -> VehicleInfo {
        let (system_id, component_id) = session.target();
        VehicleInfo {
            id,
            system_id,
            component_id,
            link: session.link_id().to_string(),
            state: session.state(),
            heartbeat: session.cache().heartbeat(),
        }
    }

    async fn tracked_session(&self, id: Uuid) -> Result<Arc<ConnectionSession>> {
        let inner = self.inner.lock().await;
        inner
            .vehicles
            .get(&id)
            .cloned()
            .ok_or(GatewayError::NotFound { vehicle: id })
    }

    async fn live_session(&self, id: Uuid) -> Result<Arc<ConnectionSession>> {
        let session = self.tracked_session(id).await?;
        if !session.is_live() {
            return Err(GatewayError::NotConnected { vehicle: id });
        }
        Ok(session)
    }
}

impl std::fmt::Debug for FleetRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FleetRegistry").finish_non_exhaustive()
    }
}
