//! Ground-station gateway for a fleet of drones speaking a compact binary
//! telemetry protocol.
//!
//! The crate sits between physical vehicle links (serial radios, network
//! tunnels) and an embedding application. It discovers vehicles, keeps one
//! supervised session per link, caches each vehicle's latest telemetry,
//! dispatches acknowledged commands and synchronizes onboard parameter
//! tables.
//!
//! # Quick start
//!
//! ```no_run
//! use fleetlink::{CommandRequest, FleetRegistry, GatewayConfig};
//! use fleetlink::testkit::{MemoryLinkScanner, SimVehicle, SimVehicleConfig};
//! use std::sync::Arc;
//!
//! # async fn demo() -> fleetlink::Result<()> {
//! let scanner = Arc::new(MemoryLinkScanner::new());
//! let (link, _vehicle) = SimVehicle::spawn(SimVehicleConfig::new("sim0"));
//! scanner.add(link);
//!
//! let fleet = FleetRegistry::new(Arc::clone(&scanner), GatewayConfig::default());
//! let promoted = fleet.discover().await;
//!
//! for id in promoted {
//!     let ack = fleet.command(id, CommandRequest::Arm).await?;
//!     println!("armed: {:?}", ack.result);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Architecture
//!
//! - [`protocol`] is the wire layer: framing, checksums and typed payloads.
//! - [`session`] owns one link, its receive loop and liveness tracking.
//! - [`command`] and [`params`] implement the request/response flows that
//!   ride on a session.
//! - [`fleet`] ties it together: discovery, identity and the operation
//!   surface the embedding application calls.
//! - [`testkit`] provides in-memory links and a scripted vehicle so all of
//!   the above is testable without hardware.

pub mod bus;
pub mod command;
pub mod config;
mod error;
pub mod fleet;
pub mod link;
pub mod metadata;
pub mod params;
pub mod protocol;
pub mod session;
pub mod state;
pub mod testkit;
pub mod types;

pub use command::CommandRequest;
pub use config::GatewayConfig;
pub use error::{GatewayError, Result};
pub use fleet::{FleetRegistry, VehicleInfo};
pub use params::{Parameter, ParameterSet, SetManyOutcome};
pub use session::{ConnectionSession, SessionState};
