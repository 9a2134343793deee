use super::*;
use crate::bus::listener;
use crate::event::{Event, EVENT_TIME_CHANGED};
use mockito::{Matcher, Server, ServerGuard};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};

fn endpoint_for(server: &ServerGuard) -> Endpoint {
    let addr = server.socket_address();
    Endpoint::new(addr.ip().to_string(), "upstream", Some(addr.port()))
}

fn local_endpoint() -> Endpoint {
    Endpoint::new("10.0.0.3", "downstream", Some(8124))
}

fn settings_for(server: &ServerGuard) -> BridgeSettings {
    let mut settings = BridgeSettings::new(endpoint_for(server));
    settings.local = Some(local_endpoint());
    settings
}

async fn mock_remote(server: &mut ServerGuard) {
    server
        .mock("GET", "/api")
        .with_status(200)
        .with_body(r#"{"message": "API running."}"#)
        .create_async()
        .await;
    server
        .mock("GET", "/api/states")
        .with_status(200)
        .with_body(
            r#"[{"entity_id": "light.kitchen", "state": "on", "attributes": {},
                 "last_changed": "12:00:00 01-01-2024", "last_updated": "12:00:00 01-01-2024"}]"#,
        )
        .expect_at_least(1)
        .create_async()
        .await;
}

#[tokio::test]
async fn test_new_rejects_wrong_password() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/api")
        .with_status(401)
        .create_async()
        .await;

    match Bridge::new(settings_for(&server)).await {
        Err(BridgeError::InvalidRemote { status, .. }) => {
            assert_eq!(status, ApiStatus::InvalidPassword)
        }
        other => panic!("expected InvalidRemote, got {:?}", other.err()),
    }
}

#[tokio::test]
async fn test_new_rejects_unreachable_remote() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let settings = BridgeSettings::new(Endpoint::new("127.0.0.1", "pw", Some(port)));
    match Bridge::new(settings).await {
        Err(BridgeError::InvalidRemote { status, .. }) => {
            assert_eq!(status, ApiStatus::CannotConnect)
        }
        other => panic!("expected InvalidRemote, got {:?}", other.err()),
    }
}

#[tokio::test]
async fn test_new_mirrors_remote_states() {
    let mut server = Server::new_async().await;
    mock_remote(&mut server).await;

    let bridge = Bridge::new(settings_for(&server)).await.unwrap();

    assert_eq!(bridge.state(), BridgeState::Unstarted);
    assert!(bridge.states().is_state("light.kitchen", "on"));
    assert_eq!(bridge.states().entity_ids(), vec!["light.kitchen".to_string()]);
}

#[tokio::test]
async fn test_start_registers_and_stop_unregisters() {
    let mut server = Server::new_async().await;
    mock_remote(&mut server).await;
    let register = server
        .mock("POST", "/api/event_forwarding")
        .match_body(Matcher::Json(json!({
            "host": "10.0.0.3",
            "api_password": "downstream",
            "port": 8124
        })))
        .with_status(200)
        .expect(1)
        .create_async()
        .await;
    let unregister = server
        .mock("DELETE", "/api/event_forwarding")
        .match_body(Matcher::Json(json!({"host": "10.0.0.3", "port": 8124})))
        .with_status(200)
        .expect(1)
        .create_async()
        .await;

    let bridge = Bridge::new(settings_for(&server)).await.unwrap();
    bridge.start().await.unwrap();

    assert_eq!(bridge.state(), BridgeState::Running);
    assert_eq!(bridge.local_endpoint(), Some(local_endpoint()));
    register.assert_async().await;

    // Second start is refused
    assert!(matches!(
        bridge.start().await,
        Err(BridgeError::Lifecycle { state: BridgeState::Running, .. })
    ));

    bridge.stop().await;
    assert_eq!(bridge.state(), BridgeState::Stopped);
    assert!(bridge.pool().is_stopped());
    unregister.assert_async().await;
}

#[tokio::test]
async fn test_failed_handshake_is_setup_error_and_stop_is_safe() {
    let mut server = Server::new_async().await;
    mock_remote(&mut server).await;
    server
        .mock("POST", "/api/event_forwarding")
        .with_status(500)
        .create_async()
        .await;
    server
        .mock("DELETE", "/api/event_forwarding")
        .with_status(200)
        .create_async()
        .await;

    let bridge = Bridge::new(settings_for(&server)).await.unwrap();

    assert!(matches!(bridge.start().await, Err(BridgeError::BridgeSetup(_))));
    assert_eq!(bridge.state(), BridgeState::Starting);

    bridge.stop().await;
    assert_eq!(bridge.state(), BridgeState::Stopped);

    // Idempotent
    bridge.stop().await;
    assert_eq!(bridge.state(), BridgeState::Stopped);
}

#[tokio::test]
async fn test_start_without_local_api_fails() {
    let mut server = Server::new_async().await;
    mock_remote(&mut server).await;

    let bridge = Bridge::new(BridgeSettings::new(endpoint_for(&server)))
        .await
        .unwrap();

    assert!(matches!(bridge.start().await, Err(BridgeError::BridgeSetup(_))));
    bridge.stop().await;
}

struct FixedProvider(Endpoint);

#[async_trait]
impl LocalApiProvider for FixedProvider {
    async fn provision(&self, _bridge: &Bridge) -> BridgeResult<Endpoint> {
        Ok(self.0.clone())
    }
}

#[tokio::test]
async fn test_start_uses_local_api_provider() {
    let mut server = Server::new_async().await;
    mock_remote(&mut server).await;
    let register = server
        .mock("POST", "/api/event_forwarding")
        .match_body(Matcher::PartialJson(json!({"host": "192.168.1.20"})))
        .with_status(200)
        .expect(1)
        .create_async()
        .await;
    server
        .mock("DELETE", "/api/event_forwarding")
        .with_status(200)
        .create_async()
        .await;

    let provided = Endpoint::new("192.168.1.20", "pw", None);
    let bridge = Bridge::new(BridgeSettings::new(endpoint_for(&server)))
        .await
        .unwrap()
        .with_local_provider(FixedProvider(provided.clone()));

    bridge.start().await.unwrap();
    assert_eq!(bridge.local_endpoint(), Some(provided));
    register.assert_async().await;

    bridge.stop().await;
}

#[tokio::test]
async fn test_local_events_go_upstream_lifecycle_events_do_not() {
    let mut server = Server::new_async().await;
    mock_remote(&mut server).await;
    server
        .mock("POST", "/api/event_forwarding")
        .with_status(200)
        .create_async()
        .await;
    server
        .mock("DELETE", "/api/event_forwarding")
        .with_status(200)
        .create_async()
        .await;
    let doorbell = server
        .mock("POST", "/api/events/doorbell")
        .match_body(Matcher::Json(json!({"floor": 1})))
        .with_status(200)
        .expect(1)
        .create_async()
        .await;
    let lifecycle = server
        .mock("POST", Matcher::Regex("^/api/events/homeassistant_".to_string()))
        .expect(0)
        .create_async()
        .await;

    let bridge = Bridge::new(settings_for(&server)).await.unwrap();

    let seen = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&seen);
    bridge.bus().listen(
        EVENT_HUB_START,
        listener(move |_event: Event| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        }),
    );

    bridge.start().await.unwrap();
    let data = json!({"floor": 1}).as_object().cloned().unwrap();
    bridge.bus().fire("doorbell", data, EventOrigin::Local);
    bridge.stop().await;

    doorbell.assert_async().await;
    lifecycle.assert_async().await;
    assert_eq!(seen.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_timer_fires_time_changed_locally() {
    let mut server = Server::new_async().await;
    mock_remote(&mut server).await;
    server
        .mock("POST", "/api/event_forwarding")
        .with_status(200)
        .create_async()
        .await;
    server
        .mock("DELETE", "/api/event_forwarding")
        .with_status(200)
        .create_async()
        .await;
    let upstream = server
        .mock("POST", "/api/events/time_changed")
        .expect(0)
        .create_async()
        .await;

    let mut settings = settings_for(&server);
    settings.timer_interval = Duration::from_millis(20);
    let bridge = Bridge::new(settings).await.unwrap();

    let ticks = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&ticks);
    bridge.bus().listen(
        EVENT_TIME_CHANGED,
        listener(move |event: Event| {
            let counter = Arc::clone(&counter);
            async move {
                assert!(event.data().get("now").and_then(|v| v.as_str()).is_some());
                counter.fetch_add(1, Ordering::SeqCst);
            }
        }),
    );

    bridge.start().await.unwrap();
    tokio::time::sleep(Duration::from_millis(120)).await;
    bridge.stop().await;

    assert!(ticks.load(Ordering::SeqCst) >= 1);
    upstream.assert_async().await;
}

#[test]
fn test_settings_from_config() {
    let config = crate::config::parse_config(
        r#"
        [remote]
        host = "hub.lan"
        api_password = "pw"

        [pool]
        workers = 2

        [timer]
        interval_seconds = 5
    "#,
    )
    .unwrap();

    let settings = BridgeSettings::from_config(&config).unwrap();
    assert_eq!(settings.remote.to_string(), "hub.lan:8123");
    assert_eq!(settings.workers, 2);
    assert_eq!(settings.timer_interval, Duration::from_secs(5));
    assert!(settings.local.is_none());

    assert!(matches!(
        BridgeSettings::from_config(&BridgeConfig::default()),
        Err(BridgeError::Config(_))
    ));
}

fn count_ticks(bridge: &Bridge) -> Arc<AtomicUsize> {
    let ticks = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&ticks);
    bridge.bus().listen(
        EVENT_TIME_CHANGED,
        listener(move |_event: Event| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        }),
    );
    ticks
}

#[tokio::test]
async fn test_failed_handshake_starts_no_timer() {
    let mut server = Server::new_async().await;
    mock_remote(&mut server).await;
    server
        .mock("POST", "/api/event_forwarding")
        .with_status(500)
        .create_async()
        .await;

    let mut settings = settings_for(&server);
    settings.timer_interval = Duration::from_millis(10);
    let bridge = Bridge::new(settings).await.unwrap();
    let ticks = count_ticks(&bridge);

    assert!(bridge.start().await.is_err());
    tokio::time::sleep(Duration::from_millis(60)).await;
    bridge.pool().block_till_done().await;

    assert!(bridge.timer.lock().unwrap().is_none());
    assert_eq!(ticks.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_zero_timer_interval_is_clamped() {
    let mut server = Server::new_async().await;
    mock_remote(&mut server).await;
    server
        .mock("POST", "/api/event_forwarding")
        .with_status(200)
        .create_async()
        .await;
    server
        .mock("DELETE", "/api/event_forwarding")
        .with_status(200)
        .create_async()
        .await;

    let mut settings = settings_for(&server);
    settings.timer_interval = Duration::ZERO;
    let bridge = Bridge::new(settings).await.unwrap();
    let ticks = count_ticks(&bridge);

    bridge.start().await.unwrap();
    tokio::time::sleep(Duration::from_millis(30)).await;

    // Timer task is still alive, not panicked
    let alive = bridge
        .timer
        .lock()
        .unwrap()
        .as_ref()
        .is_some_and(|timer| !timer.is_finished());
    assert!(alive);

    bridge.stop().await;
    assert!(ticks.load(Ordering::SeqCst) >= 1);
}

#[tokio::test]
async fn test_run_timer_with_zero_period_keeps_ticking() {
    let pool = WorkerPool::new(1);
    let bus: Arc<dyn EventBus> = Arc::new(crate::bus::LocalEventBus::new(pool.clone()));
    let ticks = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&ticks);
    bus.listen(
        EVENT_TIME_CHANGED,
        listener(move |_event: Event| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        }),
    );

    let timer = tokio::spawn(run_timer(bus, Duration::ZERO));
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert!(!timer.is_finished());
    timer.abort();
    pool.block_till_done().await;
    assert!(ticks.load(Ordering::SeqCst) >= 1);
}
