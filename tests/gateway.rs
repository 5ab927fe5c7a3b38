//! End-to-end exercises of the fleet registry against scripted vehicles.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use uuid::Uuid;

use fleetlink::command::CommandRequest;
use fleetlink::fleet::FleetRegistry;
use fleetlink::metadata::{ParamMetadata, ParamMetadataSource};
use fleetlink::protocol::MessagePayload;
use fleetlink::session::SessionState;
use fleetlink::testkit::{MemoryLinkScanner, SimVehicle, SimVehicleConfig};
use fleetlink::types::{AckResult, CommandId, FlightMode, ParamType};
use fleetlink::{GatewayConfig, GatewayError};

struct MapCatalog(HashMap<String, ParamMetadata>);

impl ParamMetadataSource for MapCatalog {
    fn lookup(&self, name: &str) -> Option<ParamMetadata> {
        self.0.get(name).cloned()
    }
}

fn fleet_with(scanner: &Arc<MemoryLinkScanner>) -> FleetRegistry {
    init_tracing();
    FleetRegistry::new(Arc::clone(scanner), GatewayConfig::default())
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

async fn promote_one(
    fleet: &FleetRegistry,
    scanner: &Arc<MemoryLinkScanner>,
    config: SimVehicleConfig,
) -> (Uuid, SimVehicle) {
    let (link, vehicle) = SimVehicle::spawn(config);
    scanner.add(link);
    let promoted = fleet.discover().await;
    assert_eq!(promoted.len(), 1);
    (promoted[0], vehicle)
}

#[tokio::test(start_paused = true)]
async fn discovery_promotes_a_heartbeating_vehicle() {
    let scanner = Arc::new(MemoryLinkScanner::new());
    let fleet = fleet_with(&scanner);

    let (id, _vehicle) = promote_one(&fleet, &scanner, SimVehicleConfig::new("sim0")).await;

    let info = fleet.get_by_id(id).await.unwrap();
    assert_eq!(info.state, SessionState::Live);
    assert_eq!(info.system_id, 1);
    assert_eq!(info.link, "sim0");
    assert!(info.heartbeat.is_some());
}

#[tokio::test(start_paused = true)]
async fn silent_candidate_is_abandoned() {
    let scanner = Arc::new(MemoryLinkScanner::new());
    let fleet = fleet_with(&scanner);

    let (link, _vehicle) = SimVehicle::spawn(SimVehicleConfig {
        heartbeat_period: None,
        ..SimVehicleConfig::new("dead0")
    });
    scanner.add(link);

    assert!(fleet.discover().await.is_empty());
    assert!(fleet.list_active().await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn discovery_is_idempotent_per_link() {
    let scanner = Arc::new(MemoryLinkScanner::new());
    let fleet = fleet_with(&scanner);
    let (_id, _vehicle) = promote_one(&fleet, &scanner, SimVehicleConfig::new("sim0")).await;

    // A second candidate claiming the same link identity must be skipped
    // while the first session owns it.
    let (link, _other) = SimVehicle::spawn(SimVehicleConfig::new("sim0"));
    scanner.add(link);
    assert!(fleet.discover().await.is_empty());
    assert_eq!(fleet.list_active().await.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn returning_vehicle_keeps_its_identifier() {
    let scanner = Arc::new(MemoryLinkScanner::new());
    let fleet = fleet_with(&scanner);
    let (id, vehicle) = promote_one(&fleet, &scanner, SimVehicleConfig::new("sim0")).await;

    fleet.disconnect(id).await.unwrap();
    drop(vehicle);
    assert!(fleet.get_by_id(id).await.is_none());

    // Same source system id on a fresh link.
    let (id_again, _vehicle) =
        promote_one(&fleet, &scanner, SimVehicleConfig::new("sim1")).await;
    assert_eq!(id_again, id);
    assert_eq!(fleet.get_by_id(id).await.unwrap().link, "sim1");
}

#[tokio::test(start_paused = true)]
async fn rediscovery_on_a_new_link_replaces_the_old_session() {
    let scanner = Arc::new(MemoryLinkScanner::new());
    let fleet = fleet_with(&scanner);
    let (id, _old) = promote_one(&fleet, &scanner, SimVehicleConfig::new("sim0")).await;

    let (id_again, _new) = promote_one(&fleet, &scanner, SimVehicleConfig::new("sim1")).await;
    assert_eq!(id_again, id);
    assert_eq!(fleet.get_by_id(id).await.unwrap().link, "sim1");
    assert_eq!(fleet.list_active().await.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn stale_vehicle_drops_out_of_the_active_list() {
    let scanner = Arc::new(MemoryLinkScanner::new());
    let fleet = fleet_with(&scanner);

    let (live_id, _live) = promote_one(&fleet, &scanner, SimVehicleConfig::new("sim0")).await;
    let (slow_id, _slow) = promote_one(&fleet, &scanner, SimVehicleConfig {
        system_id: 2,
        heartbeat_period: Some(Duration::from_secs(30)),
        ..SimVehicleConfig::new("sim1")
    })
    .await;

    tokio::time::advance(Duration::from_secs(6)).await;
    tokio::task::yield_now().await;

    let active = fleet.list_active().await;
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].id, live_id);

    // Stale, not gone: the link is still held.
    let info = fleet.get_by_id(slow_id).await.unwrap();
    assert_eq!(info.state, SessionState::Stale);
}

#[tokio::test(start_paused = true)]
async fn disconnect_is_not_repeatable() {
    let scanner = Arc::new(MemoryLinkScanner::new());
    let fleet = fleet_with(&scanner);
    let (id, _vehicle) = promote_one(&fleet, &scanner, SimVehicleConfig::new("sim0")).await;

    fleet.disconnect(id).await.unwrap();
    assert!(fleet.list_active().await.is_empty());
    assert!(matches!(
        fleet.disconnect(id).await,
        Err(GatewayError::NotFound { .. })
    ));
    assert!(matches!(
        fleet.command(id, CommandRequest::Arm).await,
        Err(GatewayError::NotFound { .. })
    ));
}

#[tokio::test(start_paused = true)]
async fn command_round_trip_returns_the_ack() {
    let scanner = Arc::new(MemoryLinkScanner::new());
    let fleet = fleet_with(&scanner);
    let (id, _vehicle) = promote_one(&fleet, &scanner, SimVehicleConfig::new("sim0")).await;

    let ack = fleet.command(id, CommandRequest::Arm).await.unwrap();
    assert_eq!(ack.command, CommandId::COMPONENT_ARM_DISARM);
    assert_eq!(ack.result, AckResult::Accepted);

    let ack = fleet
        .command(id, CommandRequest::Takeoff { height: 20.0 })
        .await
        .unwrap();
    assert_eq!(ack.command, CommandId::NAV_TAKEOFF);
}

#[tokio::test(start_paused = true)]
async fn rejected_commands_still_return_their_ack() {
    let scanner = Arc::new(MemoryLinkScanner::new());
    let fleet = fleet_with(&scanner);
    let (id, _vehicle) = promote_one(&fleet, &scanner, SimVehicleConfig {
        ack_result: AckResult::Denied,
        ..SimVehicleConfig::new("sim0")
    })
    .await;

    let ack = fleet.command(id, CommandRequest::ReturnToLaunch).await.unwrap();
    assert_eq!(ack.result, AckResult::Denied);
}

#[tokio::test(start_paused = true)]
async fn ack_for_a_different_command_never_resolves_the_wait() {
    let scanner = Arc::new(MemoryLinkScanner::new());
    let fleet = fleet_with(&scanner);
    let (id, _vehicle) = promote_one(&fleet, &scanner, SimVehicleConfig {
        ack_with: Some(CommandId::NAV_LAND),
        ..SimVehicleConfig::new("sim0")
    })
    .await;

    let err = fleet.command(id, CommandRequest::Arm).await.unwrap_err();
    match err {
        GatewayError::CommandTimeout { command, .. } => {
            assert_eq!(command, CommandId::COMPONENT_ARM_DISARM);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(fleet
        .command(id, CommandRequest::Arm)
        .await
        .unwrap_err()
        .is_retryable());
}

#[tokio::test(start_paused = true)]
async fn commands_to_a_stale_vehicle_are_refused() {
    let scanner = Arc::new(MemoryLinkScanner::new());
    let fleet = fleet_with(&scanner);
    let (id, _vehicle) = promote_one(&fleet, &scanner, SimVehicleConfig {
        heartbeat_period: Some(Duration::from_secs(30)),
        ..SimVehicleConfig::new("sim0")
    })
    .await;

    tokio::time::advance(Duration::from_secs(6)).await;
    assert!(matches!(
        fleet.command(id, CommandRequest::Arm).await,
        Err(GatewayError::NotConnected { .. })
    ));
}

#[tokio::test(start_paused = true)]
async fn set_mode_parses_names_case_insensitively() {
    let scanner = Arc::new(MemoryLinkScanner::new());
    let fleet = fleet_with(&scanner);
    let (id, _vehicle) = promote_one(&fleet, &scanner, SimVehicleConfig::new("sim0")).await;

    let ack = fleet.set_mode(id, "guided_armed").await.unwrap();
    assert_eq!(ack.command, CommandId::DO_SET_MODE);

    match fleet.set_mode(id, "WARP_SPEED").await.unwrap_err() {
        GatewayError::UnknownMode { name } => assert_eq!(name, "WARP_SPEED"),
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test(start_paused = true)]
async fn rc_override_writes_through_on_a_live_session() {
    let scanner = Arc::new(MemoryLinkScanner::new());
    let fleet = fleet_with(&scanner);
    let (id, _vehicle) = promote_one(&fleet, &scanner, SimVehicleConfig::new("sim0")).await;

    fleet.rc_override(id, true).await.unwrap();
    fleet.rc_override(id, false).await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn parameters_read_is_enriched_from_the_catalog() {
    let scanner = Arc::new(MemoryLinkScanner::new());
    let mut catalog = HashMap::new();
    catalog.insert(
        "THR_MAX".to_string(),
        ParamMetadata {
            display_name: "Throttle maximum".into(),
            description: "Upper throttle bound".into(),
            units: Some("%".into()),
            lower: Some(0.0),
            upper: Some(100.0),
        },
    );
    let fleet = FleetRegistry::new(Arc::clone(&scanner), GatewayConfig::default())
        .with_metadata(MapCatalog(catalog));

    let mut config = SimVehicleConfig::new("sim0");
    config.params = vec![
        ("THR_MAX".into(), 80.0, ParamType::Float32),
        ("RTL_ALT".into(), 100.0, ParamType::Uint16),
    ];
    let (id, _vehicle) = promote_one(&fleet, &scanner, config).await;

    let params = fleet.parameters(id).await.unwrap();
    assert_eq!(params.len(), 2);
    assert_eq!(params["THR_MAX"].value, 80.0);
    assert_eq!(
        params["THR_MAX"].metadata.as_ref().unwrap().units.as_deref(),
        Some("%")
    );
    assert!(params["RTL_ALT"].metadata.is_none());
}

#[tokio::test(start_paused = true)]
async fn incomplete_parameter_read_reports_the_partial_set() {
    let scanner = Arc::new(MemoryLinkScanner::new());
    let fleet = fleet_with(&scanner);

    let mut config = SimVehicleConfig::new("sim0");
    config.params = vec![("THR_MAX".into(), 80.0, ParamType::Float32)];
    config.phantom_params = 2;
    let (id, _vehicle) = promote_one(&fleet, &scanner, config).await;

    match fleet.parameters(id).await.unwrap_err() {
        GatewayError::PartialParameterSet { got, expected, partial } => {
            assert_eq!(got, 1);
            assert_eq!(expected, 3);
            assert!(partial.contains_key("THR_MAX"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test(start_paused = true)]
async fn set_parameters_confirms_writes_and_reports_clamps() {
    let scanner = Arc::new(MemoryLinkScanner::new());
    let fleet = fleet_with(&scanner);

    let mut config = SimVehicleConfig::new("sim0");
    config.params = vec![
        ("THR_MAX".into(), 50.0, ParamType::Float32),
        ("RTL_ALT".into(), 100.0, ParamType::Float32),
    ];
    // The vehicle clamps RTL_ALT writes to 15.
    config.misreport = Some(("RTL_ALT".into(), 15.0));
    let (id, _vehicle) = promote_one(&fleet, &scanner, config).await;

    let requests = vec![
        ("THR_MAX".to_string(), 80.0, ParamType::Float32),
        ("RTL_ALT".to_string(), 30.0, ParamType::Float32),
    ];
    let (outcome, params) = fleet.set_parameters(id, &requests).await.unwrap();

    assert!(!outcome.ok());
    assert_eq!(outcome.total, 2);
    assert_eq!(outcome.applied["THR_MAX"].value, 80.0);
    assert_eq!(outcome.failures.len(), 1);
    match &outcome.failures[0] {
        (name, GatewayError::ParameterMismatch { requested, confirmed, .. }) => {
            assert_eq!(name, "RTL_ALT");
            assert_eq!(*requested, 30.0);
            assert_eq!(*confirmed, 15.0);
        }
        (name, other) => panic!("unexpected failure for {name}: {other}"),
    }

    // The re-read reflects what the vehicle actually stored.
    assert_eq!(params["THR_MAX"].value, 80.0);
    assert_eq!(params["RTL_ALT"].value, 15.0);
}

#[tokio::test(start_paused = true)]
async fn unconfirmed_parameter_write_is_reported_as_retryable() {
    let scanner = Arc::new(MemoryLinkScanner::new());
    let fleet = fleet_with(&scanner);

    let mut config = SimVehicleConfig::new("sim0");
    config.params = vec![("THR_MAX".into(), 50.0, ParamType::Float32)];
    config.suppress_echo = true;
    let (id, _vehicle) = promote_one(&fleet, &scanner, config).await;

    let requests = vec![("THR_MAX".to_string(), 80.0, ParamType::Float32)];
    let (outcome, params) = fleet.set_parameters(id, &requests).await.unwrap();

    assert!(!outcome.ok());
    match &outcome.failures[0] {
        (name, err @ GatewayError::ParameterUnconfirmed { .. }) => {
            assert_eq!(name, "THR_MAX");
            assert!(err.is_retryable());
        }
        (name, other) => panic!("unexpected failure for {name}: {other}"),
    }

    // The vehicle applied the write even though the echo never came; the
    // re-read shows the stored value.
    assert_eq!(params["THR_MAX"].value, 80.0);
}

#[tokio::test(start_paused = true)]
async fn invalid_parameter_names_never_reach_the_wire() {
    let scanner = Arc::new(MemoryLinkScanner::new());
    let fleet = fleet_with(&scanner);
    let (id, _vehicle) = promote_one(&fleet, &scanner, SimVehicleConfig::new("sim0")).await;

    let requests = vec![(
        "THIS_NAME_IS_FAR_TOO_LONG".to_string(),
        1.0,
        ParamType::Float32,
    )];
    let (outcome, _) = fleet.set_parameters(id, &requests).await.unwrap();
    assert!(matches!(
        outcome.failures[0].1,
        GatewayError::InvalidParamName { .. }
    ));
}

#[tokio::test(start_paused = true)]
async fn subscribers_see_the_vehicle_message_stream() {
    let scanner = Arc::new(MemoryLinkScanner::new());
    let fleet = fleet_with(&scanner);
    let (id, _vehicle) = promote_one(&fleet, &scanner, SimVehicleConfig::new("sim0")).await;

    let mut stream = fleet.subscribe(id).await.unwrap();
    let message = stream.next().await.unwrap().unwrap();
    assert!(matches!(message.payload, MessagePayload::Heartbeat(_)));
    assert_eq!(message.system_id, 1);

    assert!(matches!(
        fleet.subscribe(Uuid::new_v4()).await,
        Err(GatewayError::NotFound { .. })
    ));
}

#[tokio::test(start_paused = true)]
async fn subscription_survives_session_replacement() {
    let scanner = Arc::new(MemoryLinkScanner::new());
    let fleet = fleet_with(&scanner);
    let (id, old) = promote_one(&fleet, &scanner, SimVehicleConfig::new("sim0")).await;

    let mut stream = fleet.subscribe(id).await.unwrap();
    assert!(stream.next().await.unwrap().is_ok());

    // The vehicle goes quiet and reappears on a fresh link, tagged with a
    // distinct component id so its traffic is recognizable.
    old.stop();
    let (id_again, _new) = promote_one(&fleet, &scanner, SimVehicleConfig {
        component_id: 7,
        ..SimVehicleConfig::new("sim1")
    })
    .await;
    assert_eq!(id_again, id);

    // The subscription taken before the replacement keeps receiving; the
    // new session's messages eventually flow through it.
    loop {
        let message = stream.next().await.unwrap().unwrap();
        if message.component_id == 7 {
            break;
        }
    }
}

#[tokio::test(start_paused = true)]
async fn loiter_and_navigation_commands_are_acknowledged() {
    let scanner = Arc::new(MemoryLinkScanner::new());
    let fleet = fleet_with(&scanner);
    let (id, _vehicle) = promote_one(&fleet, &scanner, SimVehicleConfig::new("sim0")).await;

    let cases = [
        (
            CommandRequest::NavigateWaypoint { latitude: 55.5, longitude: 12.2, altitude: 40.0 },
            CommandId::NAV_WAYPOINT,
        ),
        (
            CommandRequest::LandAtLocation { latitude: 55.5, longitude: 12.2, altitude: 0.0 },
            CommandId::NAV_LAND,
        ),
        (
            CommandRequest::LoiterUnlimited {
                radius: 25.0,
                latitude: 55.5,
                longitude: 12.2,
                altitude: 40.0,
            },
            CommandId::NAV_LOITER_UNLIMITED,
        ),
        (
            CommandRequest::LoiterTime {
                seconds: 30.0,
                radius: 25.0,
                latitude: 55.5,
                longitude: 12.2,
                altitude: 40.0,
            },
            CommandId::NAV_LOITER_TIME,
        ),
        (
            CommandRequest::LoiterTurns {
                turns: 2.0,
                radius: 25.0,
                latitude: 55.5,
                longitude: 12.2,
                altitude: 40.0,
            },
            CommandId::NAV_LOITER_TURNS,
        ),
        (
            CommandRequest::SetMode { mode: FlightMode::AutoArmed },
            CommandId::DO_SET_MODE,
        ),
    ];
    for (request, expected) in cases {
        let ack = fleet.command(id, request).await.unwrap();
        assert_eq!(ack.command, expected);
        assert_eq!(ack.result, AckResult::Accepted);
    }
}
