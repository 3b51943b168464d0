//! Integration tests for the diagnostic HTTP surface.
//!
//! The frontend only reads the snapshot the device published and pushes
//! signals into the shared inbox; these tests drive both sides.

use pinglink::app::commands::ControlSignal;
use pinglink::web::{HttpMethod, WebFrontend};

use crate::mocks::{MemStorage, MockMqtt, Rig, config};

fn running_rig() -> (Rig, WebFrontend) {
    let mut rig = Rig::new(config(60, 100), MockMqtt::up(), MemStorage::default());
    rig.start();
    rig.tick();
    let web = WebFrontend::new(rig.inbox.clone());
    (rig, web)
}

#[test]
fn status_page_shows_published_snapshot() {
    let (_rig, web) = running_rig();
    let page = web.handle(HttpMethod::Get, "/");
    assert_eq!(page.status, 200);
    assert!(page.content_type.starts_with("text/html"));
    assert!(page.body.contains("content='5'"));
    assert!(page.body.contains("192.168.1.10"));
    assert!(page.body.contains("test/node/ping"));
    assert!(page.body.contains("/config.html"));
}

#[test]
fn status_json_matches_the_device() {
    let (rig, web) = running_rig();
    let response = web.handle(HttpMethod::Get, "/status.json");
    assert_eq!(response.content_type, "application/json");
    let v: serde_json::Value = serde_json::from_str(&response.body).unwrap();
    assert_eq!(v["connected"], true);
    assert_eq!(v["ticks"], 1);
    assert_eq!(v["link"], "connected");
    assert_eq!(v["client_id"], rig.device.session().client_id());
}

#[test]
fn config_request_lands_in_the_inbox() {
    let (rig, web) = running_rig();
    web.handle(HttpMethod::Post, "/config.html");
    assert_eq!(rig.inbox.try_take(), Some(ControlSignal::ForceConfig));
    assert_eq!(rig.inbox.try_take(), None);
}

#[test]
fn unknown_path_dumps_the_request() {
    let (_rig, web) = running_rig();
    let response = web.handle(HttpMethod::Get, "/nope?a=1&b=two");
    assert_eq!(response.status, 404);
    assert_eq!(
        response.body,
        "File Not Found\n\nURI: /nope\nMethod: GET\nArguments: 2\n a: 1\n b: two\n"
    );
}
