#![allow(clippy::unwrap_used)]

// Integration tests for the mirror against a wiremock openHAB.

use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use pretty_assertions::assert_eq;
use rust_decimal::Decimal;
use serde_json::{Value as Json, json};
use url::Url;
use wiremock::matchers::{body_string, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use ohmirror_core::{
    CoreError, ItemKind, ProxySetting, RecordingObserver, Server, ServerConfig, Value,
};

// ── Fixtures ────────────────────────────────────────────────────────

fn config(uri: &str, poll_pages: bool) -> ServerConfig {
    let mut config = ServerConfig::new(Url::parse(uri).unwrap());
    config.proxy = ProxySetting::NoProxy;
    config.timeout = Duration::from_secs(5);
    config.long_poll_timeout = Duration::from_secs(5);
    config.poll_pages = poll_pages;
    config
}

fn homepage(base: &str, title: &str) -> Json {
    json!({
        "id": "demo",
        "title": title,
        "link": format!("{base}/rest/sitemaps/demo/demo"),
        "leaf": false,
        "widgets": [{
            "widgetId": "demo_0",
            "type": "Switch",
            "label": "Light",
            "icon": "light",
            "item": {
                "name": "Light",
                "type": "Switch",
                "state": "ON",
                "link": format!("{base}/rest/items/Light")
            }
        }, {
            "widgetId": "demo_1",
            "type": "Text",
            "label": "Temperature [22.5 °C]",
            "item": {
                "name": "Temp",
                "type": "Number",
                "state": "22.5",
                "link": format!("{base}/rest/items/Temp")
            }
        }]
    })
}

async fn mount_discovery(mock: &MockServer, page_base: &str) {
    let base = mock.uri();
    Mock::given(method("GET"))
        .and(path("/rest"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "version": "4",
            "links": [
                {"type": "items", "url": format!("{base}/rest/items")},
                {"type": "sitemaps", "url": format!("{base}/rest/sitemaps")}
            ]
        })))
        .mount(mock)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/sitemaps"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
            "name": "demo",
            "label": "Demo House",
            "link": format!("{base}/rest/sitemaps/demo")
        }])))
        .mount(mock)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/sitemaps/demo"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "name": "demo",
            "homepage": homepage(page_base, "Demo House")
        })))
        .mount(mock)
        .await;
}

async fn open_demo(mock: &MockServer, poll_pages: bool) -> (Server, Arc<ohmirror_core::Page>) {
    mount_discovery(mock, &mock.uri()).await;
    let server = Server::connect(config(&mock.uri(), poll_pages)).await.unwrap();
    let page = server.open_sitemap("demo").await.unwrap();
    (server, page)
}

async fn wait_for(mut cond: impl FnMut() -> bool) {
    for _ in 0..200 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    panic!("condition not reached within 5s");
}

// ── Loading & observers ─────────────────────────────────────────────

#[tokio::test]
async fn subscribe_delivers_snapshot_to_every_observer() {
    let mock = MockServer::start().await;
    let (_server, page) = open_demo(&mock, false).await;

    let first = RecordingObserver::new();
    page.subscribe(&first);
    let second = RecordingObserver::new();
    page.subscribe(&second);

    let snapshot = &first.updates()[0];
    assert_eq!(snapshot.0.get("page_title"), Some(&Value::from("Demo House")));
    assert_eq!(
        snapshot.0.get("page_widgets"),
        Some(&Value::List(vec!["demo_0".into(), "demo_1".into()]))
    );
    assert!(snapshot.1.is_empty());
    assert_eq!(second.updates(), first.updates());
}

#[tokio::test]
async fn reloading_sitemap_reuses_instances() {
    let mock = MockServer::start().await;
    let (server, page) = open_demo(&mock, false).await;
    let again = server.open_sitemap("demo").await.unwrap();

    assert!(Arc::ptr_eq(&page, &again));
    assert!(Arc::ptr_eq(
        &page.widgets()[0].item().unwrap(),
        &server.item("Light").unwrap()
    ));
    assert_eq!(server.sitemap("demo").unwrap().label(), "Demo House");
}

#[tokio::test]
async fn number_state_is_exact() {
    let mock = MockServer::start().await;
    let (server, _page) = open_demo(&mock, false).await;

    let temp = server.item("Temp").unwrap();
    assert_eq!(temp.kind(), ItemKind::Number);
    assert_eq!(
        temp.state(),
        Some(Value::Decimal(Decimal::from_str("22.5").unwrap()))
    );
    assert_eq!(temp.encoded_state(), "22.5");
}

#[tokio::test]
async fn unknown_sitemap_is_an_error() {
    let mock = MockServer::start().await;
    mount_discovery(&mock, &mock.uri()).await;
    let server = Server::connect(config(&mock.uri(), false)).await.unwrap();

    let err = server.open_sitemap("nope").await.unwrap_err();
    assert!(matches!(err, CoreError::SitemapNotFound { .. }));
}

// ── Commands ────────────────────────────────────────────────────────

#[tokio::test]
async fn switch_off_sends_command_and_updates_locally() {
    let mock = MockServer::start().await;
    let (server, page) = open_demo(&mock, false).await;

    Mock::given(method("POST"))
        .and(path("/rest/items/Light"))
        .and(body_string("OFF"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&mock)
        .await;

    let observer = RecordingObserver::new();
    page.widgets()[0].subscribe(&observer);

    let light = server.item("Light").unwrap();
    assert_eq!(light.state(), Some(Value::Bool(true)));
    light.cmd_off().await.unwrap();

    assert_eq!(light.state(), Some(Value::Bool(false)));
    assert_eq!(
        observer.merged().get("item_state"),
        Some(&Value::Bool(false))
    );
}

#[tokio::test]
async fn set_state_puts_to_state_endpoint() {
    let mock = MockServer::start().await;
    let (server, _page) = open_demo(&mock, false).await;

    Mock::given(method("PUT"))
        .and(path("/rest/items/Temp/state"))
        .and(body_string("23"))
        .respond_with(ResponseTemplate::new(202))
        .expect(1)
        .mount(&mock)
        .await;

    let temp = server.item("Temp").unwrap();
    temp.set_state(Value::Int(23)).await.unwrap();
    // unchanged value: no second request
    temp.set_state(Value::Int(23)).await.unwrap();
}

#[tokio::test]
async fn invalid_command_issues_no_request() {
    let mock = MockServer::start().await;
    let (server, _page) = open_demo(&mock, false).await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&mock)
        .await;

    let light = server.item("Light").unwrap();
    let err = light.cmd_set("dim").await.unwrap_err();
    assert!(matches!(err, CoreError::TypeMismatch { .. }));
    assert!(matches!(
        light.cmd_up().await,
        Err(CoreError::Unsupported { .. })
    ));
    assert_eq!(light.state(), Some(Value::Bool(true)));
}

#[tokio::test]
async fn fetch_item_maps_404() {
    let mock = MockServer::start().await;
    mount_discovery(&mock, &mock.uri()).await;
    Mock::given(method("GET"))
        .and(path("/rest/items/Ghost"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&mock)
        .await;

    let server = Server::connect(config(&mock.uri(), false)).await.unwrap();
    let err = server.fetch_item("Ghost").await.unwrap_err();
    assert!(matches!(err, CoreError::ItemNotFound { .. }));
}

// ── Long polling ────────────────────────────────────────────────────

#[tokio::test]
async fn empty_long_poll_leaves_page_untouched() {
    let mock = MockServer::start().await;
    let (server, page) = open_demo(&mock, false).await;

    Mock::given(method("GET"))
        .and(path("/rest/sitemaps/demo/demo"))
        .and(header("x-atmosphere-transport", "long-polling"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&mock)
        .await;

    let observer = RecordingObserver::new();
    page.subscribe(&observer);

    let err = page.refresh(&server, true).await.unwrap_err();
    assert!(matches!(
        err.as_api(),
        Some(ohmirror_api::Error::EmptyResponse)
    ));
    assert_eq!(observer.count(), 1);
    assert_eq!(page.title().as_deref(), Some("Demo House"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn page_worker_applies_update_after_empty_response() {
    let mock = MockServer::start().await;
    let base = mock.uri();
    let (server, page) = open_demo(&mock, true).await;
    assert_eq!(server.worker_count(), 1);

    Mock::given(method("GET"))
        .and(path("/rest/sitemaps/demo/demo"))
        .respond_with(ResponseTemplate::new(200))
        .up_to_n_times(1)
        .mount(&mock)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/sitemaps/demo/demo"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("x-atmosphere-tracking-id", "track-1")
                .set_body_json(homepage(&base, "Demo House [Away]")),
        )
        .up_to_n_times(1)
        .mount(&mock)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/sitemaps/demo/demo"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(200)))
        .mount(&mock)
        .await;

    let observer = RecordingObserver::new();
    page.subscribe(&observer);

    wait_for(|| page.value().as_deref() == Some("Away")).await;
    assert_eq!(page.title().as_deref(), Some("Demo House"));
    assert_eq!(page.tracking_id().as_deref(), Some("track-1"));
    assert_eq!(
        observer.merged().get("page_value"),
        Some(&Value::from("Away"))
    );

    server.close().await;
    assert!(!server.is_alive());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn page_worker_survives_server_error() {
    let mock = MockServer::start().await;
    let base = mock.uri();
    let (server, page) = open_demo(&mock, true).await;

    Mock::given(method("GET"))
        .and(path("/rest/sitemaps/demo/demo"))
        .and(header("x-atmosphere-transport", "long-polling"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(1)
        .mount(&mock)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/sitemaps/demo/demo"))
        .and(header("x-atmosphere-transport", "long-polling"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("x-atmosphere-tracking-id", "track-1")
                .set_body_json(homepage(&base, "Demo House [Away]")),
        )
        .up_to_n_times(1)
        .mount(&mock)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/sitemaps/demo/demo"))
        .and(header("x-atmosphere-tracking-id", "track-1"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("x-atmosphere-tracking-id", "track-2")
                .set_body_json(homepage(&base, "Demo House [Home]")),
        )
        .up_to_n_times(1)
        .mount(&mock)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/sitemaps/demo/demo"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(200)))
        .mount(&mock)
        .await;

    let observer = RecordingObserver::new();
    page.subscribe(&observer);

    wait_for(|| page.value().as_deref() == Some("Home")).await;
    assert!(server.is_alive());
    assert_eq!(page.tracking_id().as_deref(), Some("track-2"));
    let values: Vec<_> = observer
        .updates()
        .iter()
        .filter_map(|(changed, _)| changed.get("page_value").cloned())
        .collect();
    assert_eq!(values, [Value::from("Away"), Value::from("Home")]);

    server.close().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn page_worker_retries_after_read_timeout() {
    let mock = MockServer::start().await;
    let base = mock.uri();
    mount_discovery(&mock, &base).await;
    let mut config = config(&base, true);
    config.long_poll_timeout = Duration::from_millis(300);
    let server = Server::connect(config).await.unwrap();
    let page = server.open_sitemap("demo").await.unwrap();

    Mock::given(method("GET"))
        .and(path("/rest/sitemaps/demo/demo"))
        .and(header("x-atmosphere-transport", "long-polling"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(homepage(&base, "Demo House [Late]"))
                .set_delay(Duration::from_secs(2)),
        )
        .up_to_n_times(1)
        .mount(&mock)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/sitemaps/demo/demo"))
        .and(header("x-atmosphere-transport", "long-polling"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(homepage(&base, "Demo House [Back]")),
        )
        .up_to_n_times(1)
        .mount(&mock)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/sitemaps/demo/demo"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(100)))
        .mount(&mock)
        .await;

    wait_for(|| page.value().as_deref() == Some("Back")).await;
    assert!(server.is_alive());
    assert_ne!(page.value().as_deref(), Some("Late"));

    server.close().await;
}

#[tokio::test]
async fn widget_observer_follows_rebound_item() {
    let mock = MockServer::start().await;
    let base = mock.uri();
    let (server, page) = open_demo(&mock, false).await;
    let light = server
        .create_or_update_item(&json!({
            "name": "Light",
            "type": "Switch",
            "state": "ON",
            "label": "Hall light",
            "link": format!("{base}/rest/items/Light")
        }))
        .unwrap()
        .unwrap();

    let widget = server.widget("demo_0").unwrap();
    let observer = RecordingObserver::new();
    widget.subscribe(&observer);
    assert_eq!(
        observer.merged().get("item_label"),
        Some(&Value::from("Hall light"))
    );

    let mut home = homepage(&base, "Demo House");
    home["widgets"][0]["item"] = json!({
        "name": "Porch",
        "type": "Switch",
        "state": "OFF",
        "link": format!("{base}/rest/items/Porch")
    });
    page.init(&server, &home).unwrap();

    let porch = server.item("Porch").unwrap();
    let view = observer.merged();
    assert_eq!(view.get("widget_item"), Some(&Value::from("Porch")));
    assert_eq!(view.get("item_state"), porch.state().as_ref());
    assert!(!view.contains_key("item_label"));

    // The old item no longer reaches this observer; the new one does.
    let seen = observer.count();
    light
        .init(&json!({ "name": "Light", "type": "Switch", "state": "OFF" }))
        .unwrap();
    assert_eq!(observer.count(), seen);
    porch
        .init(&json!({ "name": "Porch", "type": "Switch", "state": "ON" }))
        .unwrap();
    assert_eq!(observer.count(), seen + 1);
    assert_eq!(observer.merged().get("item_state"), porch.state().as_ref());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn connection_loss_terminates_session_once() {
    let mock = MockServer::start().await;
    // Both pages live on a port nobody listens on.
    let dead = "http://127.0.0.1:1";
    let mut home = homepage(dead, "Demo House");
    home["widgets"] = json!([{
        "widgetId": "demo_2",
        "type": "Group",
        "label": "Cellar",
        "linkedPage": {
            "id": "demo_2",
            "title": "Cellar",
            "link": format!("{dead}/rest/sitemaps/demo/demo_2"),
            "leaf": true
        }
    }]);
    mount_discovery(&mock, dead).await;
    Mock::given(method("GET"))
        .and(path("/rest/sitemaps/demo"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "homepage": home })))
        .with_priority(1)
        .mount(&mock)
        .await;

    let server = Server::new(config(&mock.uri(), true)).unwrap();
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    server.on_terminate(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    server.load_resources().await.unwrap();
    server.open_sitemap("demo").await.unwrap();
    assert_eq!(server.worker_count(), 2);

    wait_for(|| !server.is_alive()).await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    server.close().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn item_worker_follows_state() {
    let mock = MockServer::start().await;
    let base = mock.uri();
    let (server, _page) = open_demo(&mock, false).await;

    Mock::given(method("GET"))
        .and(path("/rest/items/Temp"))
        .and(header("x-atmosphere-transport", "long-polling"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "name": "Temp",
            "type": "Number",
            "state": "19.0",
            "link": format!("{base}/rest/items/Temp")
        })))
        .up_to_n_times(1)
        .mount(&mock)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/items/Temp"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(200)))
        .mount(&mock)
        .await;

    let temp = server.item("Temp").unwrap();
    server.watch_item(&temp);

    wait_for(|| temp.encoded_state() == "19.0").await;
    server.close().await;
}
