//! End-to-end driver runs against a fake master.


use std::time::Duration;

use harness::{launched_tasks, offer, status, FakeMaster};
use mesos_id::FrameworkId;
use mesos_proto::recordio;
use mesos_proto::{CallType, Event, FrameworkInfo, TaskState};
use mesos_scheduler::{
    Driver, DriverError, DriverOptions, DriverState, ReconnectPolicy, ResourcePolicy, StopReason,
};
use tokio::net::TcpListener;
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(5);

fn framework() -> FrameworkInfo {
    FrameworkInfo::new("root", "lifecycle-test")
}

fn options() -> DriverOptions {
    DriverOptions {
        reconnect: ReconnectPolicy::disabled(),
        ..DriverOptions::default()
    }
}

async fn wait_for_state(driver: &Driver, state: DriverState) {
    let mut rx = driver.watch_state();
    timeout(WAIT, rx.wait_for(|s| *s == state))
        .await
        .expect("timed out waiting for driver state")
        .expect("driver state channel closed");
}

#[tokio::test]
async fn test_runs_two_tasks_to_completion() {
    let master = FakeMaster::spawn().await;
    let driver = Driver::with_options(
        &master.endpoint(),
        framework(),
        ResourcePolicy::new(1.0, 128.0, 2),
        options(),
    )
    .unwrap();

    let completion = driver.start().await.unwrap();
    assert_eq!(driver.state(), DriverState::Subscribing);

    master.send_event(&Event::subscribed(FrameworkId::new("fw-1"), Some(15.0)));
    wait_for_state(&driver, DriverState::Subscribed).await;
    assert_eq!(driver.framework_id(), Some(FrameworkId::new("fw-1")));

    master.send_event(&Event::offers(vec![offer("offer-1", 2.0, 256.0)]));
    let accepts = master.wait_for_calls(CallType::Accept, 1).await;
    let tasks = launched_tasks(&accepts[0].call);
    assert_eq!(tasks.len(), 2);
    assert_ne!(tasks[0], tasks[1]);
    assert_eq!(accepts[0].call.framework_id, Some(FrameworkId::new("fw-1")));

    master.send_event(&Event::update(status(&tasks[0], TaskState::Running, Some("u-0"))));
    master.send_event(&Event::update(status(&tasks[0], TaskState::Finished, Some("u-1"))));
    master.send_event(&Event::update(status(&tasks[1], TaskState::Finished, Some("u-2"))));

    let reason = timeout(WAIT, completion).await.unwrap();
    assert_eq!(reason, StopReason::AllTasksFinished);
    assert_eq!(driver.state(), DriverState::Stopped);

    let counters = driver.counters();
    assert_eq!((counters.launched, counters.finished, counters.failed), (2, 2, 0));

    let acks = master.calls_of(CallType::Acknowledge);
    assert_eq!(acks.len(), 3);
    let mut uuids: Vec<String> = acks
        .iter()
        .map(|a| a.call.acknowledge.as_ref().unwrap().uuid.clone())
        .collect();
    uuids.sort();
    assert_eq!(uuids, vec!["u-0", "u-1", "u-2"]);

    for recorded in master.calls() {
        if recorded.call.kind == CallType::Subscribe {
            assert_eq!(recorded.stream_id, None);
        } else {
            assert_eq!(recorded.stream_id.as_deref(), Some("stream-1"));
        }
    }
}

#[tokio::test]
async fn test_insufficient_offer_gets_empty_accept() {
    let master = FakeMaster::spawn().await;
    let driver = Driver::with_options(
        &master.endpoint(),
        framework(),
        ResourcePolicy::default(),
        options(),
    )
    .unwrap();
    let _completion = driver.start().await.unwrap();

    master.send_event(&Event::subscribed(FrameworkId::new("fw-1"), None));
    master.send_event(&Event::offers(vec![offer("small", 0.5, 64.0)]));

    let accepts = master.wait_for_calls(CallType::Accept, 1).await;
    assert_eq!(accepts.len(), 1);
    assert!(launched_tasks(&accepts[0].call).is_empty());
    let accept = accepts[0].call.accept.as_ref().unwrap();
    assert_eq!(accept.offer_ids[0].as_str(), "small");
    assert_eq!(accept.filters.unwrap().refuse_seconds, Some(1.0));
    assert_eq!(driver.counters().launched, 0);

    driver.stop();
}

#[tokio::test]
async fn test_subscribe_rejected() {
    let master = FakeMaster::spawn().await;
    master.set_subscribe_status(503);
    let driver = Driver::new(&master.endpoint(), framework(), ResourcePolicy::default()).unwrap();

    let err = driver.start().await.unwrap_err();
    match err {
        DriverError::Protocol { status, body } => {
            assert_eq!(status, 503);
            assert!(body.contains("unavailable"));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(driver.state(), DriverState::Stopped);
}

#[tokio::test]
async fn test_master_unreachable() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let endpoint = listener.local_addr().unwrap().to_string();
    drop(listener);

    let driver = Driver::new(&endpoint, framework(), ResourcePolicy::default()).unwrap();
    assert!(matches!(
        driver.start().await,
        Err(DriverError::Transport(_))
    ));
    assert_eq!(driver.state(), DriverState::Stopped);
}

#[tokio::test]
async fn test_stop_is_idempotent() {
    let master = FakeMaster::spawn().await;
    let driver = Driver::with_options(
        &master.endpoint(),
        framework(),
        ResourcePolicy::default(),
        options(),
    )
    .unwrap();
    let completion = driver.start().await.unwrap();

    master.send_event(&Event::subscribed(FrameworkId::new("fw-1"), None));
    wait_for_state(&driver, DriverState::Subscribed).await;

    driver.stop();
    driver.stop();
    let reason = timeout(WAIT, completion).await.unwrap();
    assert_eq!(reason, StopReason::Requested);
    assert_eq!(driver.state(), DriverState::Stopped);

    driver.stop();
    assert_eq!(driver.state(), DriverState::Stopped);
    assert!(matches!(
        driver.start().await,
        Err(DriverError::AlreadyStarted)
    ));
}

#[tokio::test]
async fn test_stream_close_stops_without_reconnect() {
    let master = FakeMaster::spawn().await;
    let driver = Driver::with_options(
        &master.endpoint(),
        framework(),
        ResourcePolicy::default(),
        options(),
    )
    .unwrap();
    let completion = driver.start().await.unwrap();

    master.send_event(&Event::subscribed(FrameworkId::new("fw-1"), None));
    wait_for_state(&driver, DriverState::Subscribed).await;
    master.close_streams();

    let reason = timeout(WAIT, completion).await.unwrap();
    assert_eq!(reason, StopReason::StreamClosed);
    assert_eq!(driver.state(), DriverState::Stopped);
    assert_eq!(master.subscriptions(), 1);
}

#[tokio::test]
async fn test_error_and_heartbeat_events_keep_running() {
    let master = FakeMaster::spawn().await;
    let driver = Driver::with_options(
        &master.endpoint(),
        framework(),
        ResourcePolicy::default(),
        options(),
    )
    .unwrap();
    let completion = driver.start().await.unwrap();

    master.send_event(&Event::subscribed(FrameworkId::new("fw-1"), None));
    master.send_event(&Event::error("framework failed over"));
    master.send_event(&Event::heartbeat());
    master.send_raw(recordio::encode(
        br#"{"type":"INVERSE_OFFERS","inverse_offers":{}}"#,
    ));
    master.send_event(&Event::offers(vec![offer("offer-1", 1.0, 128.0)]));

    master.wait_for_calls(CallType::Accept, 1).await;
    assert_eq!(driver.state(), DriverState::Subscribed);

    driver.stop();
    assert_eq!(timeout(WAIT, completion.wait()).await.unwrap(), StopReason::Requested);
}
