use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use zigbee_dimmable_light::config::{Config, RefreshPolicy};
use zigbee_dimmable_light::controller::{LightController, Response};
use zigbee_dimmable_light::device::{PairingState, RemoteAddress, RemoteDescriptor};
use zigbee_dimmable_light::error::ControllerError;
use zigbee_dimmable_light::registry::EndpointRegistry;
use zigbee_dimmable_light::reporter::StateDocument;
use zigbee_dimmable_light::request::RequestParams;
use zigbee_dimmable_light::routes::RouteTable;
use zigbee_dimmable_light::stack::SimulatedStack;
use zigbee_dimmable_light::stack::simulated::dimmable_light;
use zigbee_dimmable_light::zcl::{AttributeValue, ClusterCommand, ClusterId};

const IEEE: u64 = 0x0017_8801_0A0B_0C0D;
const BULB: &str = "/devices/1A2B/endpoints/0B";

struct Harness {
    stack: Arc<SimulatedStack>,
    controller: Arc<LightController>,
    shutdown: CancellationToken,
}

impl Harness {
    async fn new(config: Config) -> Self {
        let stack = Arc::new(SimulatedStack::new());
        let controller = Arc::new(LightController::start(stack.clone(), &config).await.unwrap());
        let shutdown = CancellationToken::new();
        controller.spawn_pairing(shutdown.clone());
        Self {
            stack,
            controller,
            shutdown,
        }
    }

    async fn with_bulb(config: Config) -> Self {
        let harness = Self::new(config).await;
        harness.join(dimmable_light(IEEE, 0x1A2B, 0x0B)).await;
        harness
    }

    /// Announce a join and wait until the pairing task has processed it.
    async fn join(&self, descriptor: RemoteDescriptor) {
        let before = self.controller.routes().len();
        let expect_routes = descriptor.profile_id == 0x0104 && descriptor.device_id == 0x0101;
        self.stack.join(descriptor);
        if expect_routes {
            self.wait_for(|c| c.routes().len() > before).await;
        } else {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }

    async fn wait_for(&self, done: impl Fn(&LightController) -> bool) {
        tokio::time::timeout(Duration::from_secs(2), async {
            while !done(&self.controller) {
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
        })
        .await
        .expect("pairing task did not catch up");
    }

    async fn state(&self, path: &str, params: RequestParams) -> StateDocument {
        self.controller
            .handle_request(path, &params)
            .await
            .unwrap()
            .into_state()
            .unwrap()
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

fn level_of(doc: &StateDocument) -> Option<AttributeValue> {
    doc.attribute(ClusterId::LevelControl, "current_level")
}

fn on_off_of(doc: &StateDocument) -> Option<AttributeValue> {
    doc.attribute(ClusterId::OnOff, "on_off")
}

#[tokio::test]
async fn matching_join_exposes_state_route() {
    let harness = Harness::with_bulb(Config::default()).await;
    assert_eq!(harness.controller.matcher().paired_count(), 1);

    let doc = harness
        .state(&format!("{}/states", BULB), RequestParams::new())
        .await;
    assert_eq!(doc.uri, BULB);
    assert_eq!(doc.state, PairingState::Active);
    assert!(doc.warnings.is_empty());
    assert_eq!(on_off_of(&doc), Some(AttributeValue::Bool(false)));
    assert_eq!(level_of(&doc), Some(AttributeValue::U8(0x80)));
}

#[tokio::test]
async fn mismatched_join_installs_nothing() {
    let harness = Harness::new(Config::default()).await;
    let routes_before = harness.controller.routes().uris();
    harness
        .join(RemoteDescriptor {
            device_id: 0x0102,
            ..dimmable_light(IEEE, 0x1A2B, 0x0B)
        })
        .await;

    assert_eq!(harness.controller.matcher().paired_count(), 0);
    assert_eq!(harness.controller.routes().uris(), routes_before);
    let err = harness
        .controller
        .handle_request(&format!("{}/states", BULB), &RequestParams::new())
        .await
        .unwrap_err();
    assert!(matches!(err, ControllerError::UnknownEndpoint(_)));
}

#[tokio::test]
async fn level_in_hex_reaches_bulb_and_cache() {
    let harness = Harness::with_bulb(Config::default()).await;
    let params = RequestParams::new()
        .with("val", "0x00FA")
        .with("rate", "0x0005");
    harness.state(&format!("{}/level", BULB), params).await;

    let address = RemoteAddress::new(0x1A2B, 0x0B);
    assert_eq!(
        harness.stack.commands_sent_to(address)[0].command,
        ClusterCommand::MoveToLevel {
            level: 250,
            transition_time: 5
        }
    );

    let doc = harness
        .state(&format!("{}/states", BULB), RequestParams::new())
        .await;
    assert_eq!(level_of(&doc), Some(AttributeValue::U8(250)));
}

#[tokio::test]
async fn toggle_is_an_involution() {
    let harness = Harness::with_bulb(Config {
        dispatch: zigbee_dimmable_light::config::DispatchConfig {
            refresh: RefreshPolicy::Sequenced,
            ..Default::default()
        },
        ..Config::default()
    })
    .await;
    let toggle = format!("{}/toggle", BULB);

    let initial = harness
        .state(&format!("{}/states", BULB), RequestParams::new())
        .await;
    let once = harness.state(&toggle, RequestParams::new()).await;
    let twice = harness.state(&toggle, RequestParams::new()).await;

    assert_ne!(on_off_of(&once), on_off_of(&initial));
    assert_eq!(on_off_of(&twice), on_off_of(&initial));
}

#[tokio::test]
async fn invalid_parameters_send_nothing() {
    let harness = Harness::with_bulb(Config::default()).await;
    let address = RemoteAddress::new(0x1A2B, 0x0B);

    let cases = [
        ("level", RequestParams::new().with("val", 65536).with("rate", 1)),
        ("level", RequestParams::new().with("val", 1).with("rate", -1)),
        ("level", RequestParams::new().with("val", "bright").with("rate", 1)),
        ("level", RequestParams::new().with("val", 10)),
        ("identify", RequestParams::new().with("identifytime", 70000)),
        ("identify", RequestParams::new()),
    ];
    for (action, params) in cases {
        let err = harness
            .controller
            .handle_request(&format!("{}/{}", BULB, action), &params)
            .await
            .unwrap_err();
        assert!(
            matches!(err, ControllerError::Validation { .. }),
            "{} {:?} gave {:?}",
            action,
            params,
            err
        );
        assert_eq!(err.status_code(), 400);
    }
    assert!(harness.stack.sent_to(address).is_empty());
}

#[tokio::test]
async fn identify_accepts_full_range() {
    let harness = Harness::with_bulb(Config::default()).await;
    let address = RemoteAddress::new(0x1A2B, 0x0B);
    let doc = harness
        .state(
            &format!("{}/identify", BULB),
            RequestParams::new().with("identifytime", "65535"),
        )
        .await;
    assert!(doc.warnings.is_empty());
    assert_eq!(harness.stack.light(address).unwrap().identify_time, 65535);
}

#[tokio::test]
async fn unresponsive_bulb_yields_warnings_not_errors() {
    let mut config = Config::default();
    config.dispatch.command_timeout_ms = 30;
    let harness = Harness::with_bulb(config).await;
    let address = RemoteAddress::new(0x1A2B, 0x0B);

    harness
        .state(&format!("{}/states", BULB), RequestParams::new())
        .await;
    harness.stack.set_responsive(address, false);

    let doc = harness
        .state(&format!("{}/toggle", BULB), RequestParams::new())
        .await;
    assert_eq!(doc.warnings.len(), 3);
    // Cache keeps its last-known values.
    assert_eq!(on_off_of(&doc), Some(AttributeValue::Bool(false)));
    assert_eq!(level_of(&doc), Some(AttributeValue::U8(0x80)));
}

#[tokio::test]
async fn external_change_shows_up_after_refresh() {
    let harness = Harness::with_bulb(Config::default()).await;
    let address = RemoteAddress::new(0x1A2B, 0x0B);
    harness.stack.update_light(address, |light| {
        light.on = true;
        light.level = 10;
    });

    let doc = harness
        .state(&format!("{}/states", BULB), RequestParams::new())
        .await;
    assert_eq!(on_off_of(&doc), Some(AttributeValue::Bool(true)));
    assert_eq!(level_of(&doc), Some(AttributeValue::U8(10)));
}

#[tokio::test]
async fn leave_removes_routes() {
    let harness = Harness::with_bulb(Config::default()).await;
    harness.stack.leave(IEEE);
    harness
        .wait_for(|c| c.matcher().paired_count() == 0)
        .await;

    let err = harness
        .controller
        .handle_request(&format!("{}/toggle", BULB), &RequestParams::new())
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), 404);
    // The local endpoint route is unaffected.
    assert_eq!(harness.controller.routes().uris(), vec!["/devices/0000/endpoints/01"]);
}

#[tokio::test]
async fn rejoin_moves_routes_to_new_address() {
    let harness = Harness::with_bulb(Config::default()).await;
    harness
        .stack
        .join(dimmable_light(IEEE, 0x3C4D, 0x0B));
    harness
        .wait_for(|c| {
            c.routes()
                .resolve("/devices/3C4D/endpoints/0B/states")
                .is_some()
        })
        .await;

    assert_eq!(harness.controller.matcher().paired_count(), 1);
    assert!(
        harness
            .controller
            .routes()
            .resolve(&format!("{}/states", BULB))
            .is_none()
    );
    let doc = harness
        .state("/devices/3C4D/endpoints/0B/toggle", RequestParams::new())
        .await;
    assert_eq!(on_off_of(&doc), Some(AttributeValue::Bool(true)));
}

#[tokio::test]
async fn requested_endpoint_conflict_is_resolved() {
    let stack = Arc::new(SimulatedStack::new());
    let registry =
        EndpointRegistry::new(stack.clone(), Arc::new(RouteTable::new())).with_claimed([1]);
    let controller = LightController::with_registry(stack.clone(), registry, &Config::default())
        .await
        .unwrap();

    assert_eq!(controller.local().id(), 2);
    assert_eq!(stack.registered_endpoints(), vec![2]);
    let response = controller
        .handle_request("/devices/0000/endpoints/02", &RequestParams::new())
        .await
        .unwrap();
    assert!(matches!(response, Response::Local(doc) if doc.endpoint == 2));
}

#[tokio::test]
async fn unavailable_stack_fails_startup() {
    let stack = Arc::new(SimulatedStack::new());
    stack.set_available(false);
    let err = LightController::start(stack, &Config::default())
        .await
        .err()
        .unwrap();
    assert!(matches!(err, ControllerError::Registration(_)));
}
