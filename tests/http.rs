use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;
use zigbee_dimmable_light::config::Config;
use zigbee_dimmable_light::controller::LightController;
use zigbee_dimmable_light::device::RemoteAddress;
use zigbee_dimmable_light::http::router;
use zigbee_dimmable_light::stack::SimulatedStack;
use zigbee_dimmable_light::stack::simulated::dimmable_light;

async fn setup() -> (Arc<SimulatedStack>, Arc<LightController>, CancellationToken) {
    let stack = Arc::new(SimulatedStack::new());
    let controller = Arc::new(
        LightController::start(stack.clone(), &Config::default())
            .await
            .unwrap(),
    );
    let shutdown = CancellationToken::new();
    controller.spawn_pairing(shutdown.clone());
    stack.join(dimmable_light(0x0017_8801_0A0B_0C0D, 0x1A2B, 0x0B));

    tokio::time::timeout(Duration::from_secs(2), async {
        while controller.matcher().paired_count() == 0 {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    })
    .await
    .unwrap();
    (stack, controller, shutdown)
}

async fn call(controller: &Arc<LightController>, request: Request<Body>) -> (StatusCode, Value) {
    let response = router(controller.clone()).oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, serde_json::from_slice(&bytes).unwrap())
}

fn get(uri: &str) -> Request<Body> {
    Request::get(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn get_states_returns_document() {
    let (_stack, controller, shutdown) = setup().await;
    let (status, body) = call(&controller, get("/devices/1A2B/endpoints/0B/states")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["uri"], "/devices/1A2B/endpoints/0B");
    assert_eq!(body["ieee_address"], "0x001788010A0B0C0D");
    assert_eq!(body["state"], "active");
    let on_off = &body["clusters"][1];
    assert_eq!(on_off["name"], "on_off");
    assert_eq!(on_off["attributes"]["on_off"]["value"], json!(false));
    assert_eq!(on_off["attributes"]["on_off"]["type"], "boolean");
    shutdown.cancel();
}

#[tokio::test]
async fn query_string_level() {
    let (stack, controller, shutdown) = setup().await;
    let (status, body) = call(
        &controller,
        get("/devices/1A2B/endpoints/0B/level?val=0x00FA&rate=0x0005"),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body["clusters"][2]["attributes"]["current_level"]["value"],
        json!(250)
    );
    assert_eq!(
        stack.light(RemoteAddress::new(0x1A2B, 0x0B)).unwrap().level,
        250
    );
    shutdown.cancel();
}

#[tokio::test]
async fn post_json_body() {
    let (stack, controller, shutdown) = setup().await;
    let request = Request::post("/devices/1A2B/endpoints/0B/identify")
        .header("content-type", "application/json")
        .body(Body::from(r#"{"identifytime": 30}"#))
        .unwrap();
    let (status, _) = call(&controller, request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        stack
            .light(RemoteAddress::new(0x1A2B, 0x0B))
            .unwrap()
            .identify_time,
        30
    );
    shutdown.cancel();
}

#[tokio::test]
async fn error_statuses() {
    let (stack, controller, shutdown) = setup().await;

    let (status, body) = call(
        &controller,
        get("/devices/1A2B/endpoints/0B/level?val=65536&rate=1"),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("'val'"));

    let request = Request::post("/devices/1A2B/endpoints/0B/level")
        .body(Body::from("not json"))
        .unwrap();
    let (status, _) = call(&controller, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = call(&controller, get("/devices/FFFF/endpoints/01/toggle")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    assert!(stack.sent_to(RemoteAddress::new(0x1A2B, 0x0B)).is_empty());
    shutdown.cancel();
}

#[tokio::test]
async fn local_endpoint_descriptor() {
    let (_stack, controller, shutdown) = setup().await;
    let (status, body) = call(&controller, get("/devices/0000/endpoints/01")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["profile_id"], json!(0x0104));
    assert_eq!(body["device_id"], json!(0x0101));
    shutdown.cancel();
}
