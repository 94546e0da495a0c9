//! Tests for the connectivity monitor and HTTP probe.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use pretty_assertions::assert_eq;
use subtrack::connectivity::{ConnectivityMonitor, ConnectivityProbe, HttpProbe, ManualSignal};
use subtrack::error::SubtrackError;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn recorder(monitor: &ConnectivityMonitor) -> Arc<Mutex<Vec<bool>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    monitor.add_listener(move |online| sink.lock().unwrap().push(online));
    seen
}

fn probe_for(url: impl Into<String>, timeout: Duration) -> HttpProbe {
    HttpProbe::with_client(reqwest::Client::new(), url, timeout)
}

/// Wait until the monitor's published state equals `online`.
async fn settle(monitor: &ConnectivityMonitor, online: bool) {
    let mut rx = monitor.watch();
    tokio::time::timeout(Duration::from_secs(1), rx.wait_for(|state| *state == online))
        .await
        .expect("state settles")
        .expect("monitor alive");
}

#[tokio::test]
async fn one_notification_per_genuine_transition() {
    let signal = Arc::new(ManualSignal::new(true));
    let monitor = ConnectivityMonitor::new(signal.clone());
    monitor.init();
    let seen = recorder(&monitor);

    signal.set_online(true);
    signal.set_online(false);
    signal.set_online(false);
    settle(&monitor, false).await;
    signal.set_online(true);
    signal.set_online(true);
    settle(&monitor, true).await;
    // A final marker transition flushes any queued duplicates.
    signal.set_online(false);
    settle(&monitor, false).await;

    assert_eq!(*seen.lock().unwrap(), vec![false, true, false]);
}

#[tokio::test]
async fn listeners_run_in_registration_order() {
    let signal = Arc::new(ManualSignal::new(true));
    let monitor = ConnectivityMonitor::new(signal.clone());
    monitor.init();

    let order = Arc::new(Mutex::new(Vec::new()));
    for name in ["first", "second", "third"] {
        let order = order.clone();
        monitor.add_listener(move |_| order.lock().unwrap().push(name));
    }

    signal.set_online(false);
    settle(&monitor, false).await;

    assert_eq!(*order.lock().unwrap(), vec!["first", "second", "third"]);
}

#[tokio::test]
async fn removed_listener_is_not_notified() {
    let signal = Arc::new(ManualSignal::new(true));
    let monitor = ConnectivityMonitor::new(signal.clone());
    monitor.init();

    let removed = Arc::new(Mutex::new(Vec::new()));
    let sink = removed.clone();
    let id = monitor.add_listener(move |online| sink.lock().unwrap().push(online));
    let kept = recorder(&monitor);
    assert!(monitor.remove_listener(id));

    signal.set_online(false);
    settle(&monitor, false).await;

    assert!(removed.lock().unwrap().is_empty());
    assert_eq!(*kept.lock().unwrap(), vec![false]);
}

#[tokio::test]
async fn init_picks_up_current_platform_state() {
    let signal = Arc::new(ManualSignal::new(true));
    let monitor = ConnectivityMonitor::new(signal.clone());
    signal.set_online(false);
    assert!(monitor.is_online());

    monitor.init();

    assert!(!monitor.is_online());
}

#[tokio::test]
async fn disposed_monitor_ignores_platform_events() {
    let signal = Arc::new(ManualSignal::new(true));
    let monitor = ConnectivityMonitor::new(signal.clone());
    monitor.init();
    monitor.dispose();

    signal.set_online(false);
    tokio::task::yield_now().await;

    assert!(monitor.is_online());
    assert!(!monitor.is_initialized());
}

struct StubProbe(bool);

#[async_trait]
impl ConnectivityProbe for StubProbe {
    async fn probe(&self) -> Result<(), SubtrackError> {
        if self.0 {
            Ok(())
        } else {
            Err(SubtrackError::Offline)
        }
    }
}

#[tokio::test]
async fn active_probe_overrides_optimistic_flag() {
    let monitor =
        ConnectivityMonitor::with_probe(Arc::new(ManualSignal::new(true)), Arc::new(StubProbe(false)));
    assert!(monitor.is_online());
    assert!(!monitor.test_connectivity().await);

    let monitor =
        ConnectivityMonitor::with_probe(Arc::new(ManualSignal::new(false)), Arc::new(StubProbe(true)));
    assert!(monitor.test_connectivity().await);
}

#[tokio::test]
async fn without_probe_test_falls_back_to_passive_state() {
    let monitor = ConnectivityMonitor::new(Arc::new(ManualSignal::new(false)));
    assert!(!monitor.test_connectivity().await);
}

#[tokio::test]
async fn http_probe_accepts_no_content() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/generate_204"))
        .and(header("cache-control", "no-cache"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let probe = probe_for(format!("{}/generate_204", server.uri()), Duration::from_secs(2));

    assert!(probe.probe().await.is_ok());
}

#[tokio::test]
async fn http_probe_reports_server_errors() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let probe = probe_for(server.uri(), Duration::from_secs(2));

    match probe.probe().await {
        Err(SubtrackError::Api { status, .. }) => assert_eq!(status, 503),
        other => panic!("expected status error, got {other:?}"),
    }
}

#[tokio::test]
async fn http_probe_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(204).set_delay(Duration::from_millis(500)))
        .mount(&server)
        .await;

    let probe = probe_for(server.uri(), Duration::from_millis(50));

    assert!(matches!(probe.probe().await, Err(SubtrackError::Timeout(50))));
}
