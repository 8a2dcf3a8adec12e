//! Session protocol tests against the mock transport
//!
//! All tests run on a paused clock, so retry backoffs and sampling periods
//! elapse instantly and deterministically.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use obd_core::{CommandListRequest, ObdTransport, StopReason};
use obd_session::config::MockConfig;
use obd_session::transport::mock::MockTransport;
use obd_session::{GatewayConfig, QueueFullPolicy, ReadState, Session, SupervisorPhase};
use pretty_assertions::assert_eq;

const DEVICE: &str = "00:1D:A5:68:98:8B";

fn config() -> GatewayConfig {
    GatewayConfig {
        retry_limit: 3,
        sample_period_ms: 1000,
        idle_period_ms: 1000,
        retry_backoff_ms: 5000,
        put_timeout_ms: 1000,
        queue_capacity: 10,
        ..Default::default()
    }
}

fn session_with(mock: MockConfig, config: GatewayConfig) -> (Arc<MockTransport>, Session) {
    let mock = Arc::new(MockTransport::new(mock));
    let session = Session::new(mock.clone(), config).unwrap();
    (mock, session)
}

fn session() -> (Arc<MockTransport>, Session) {
    session_with(MockConfig::default(), config())
}

// =============================================================================
// Connect
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_connect_reports_link_up() {
    let (mock, session) = session();

    let reply = session.connect(DEVICE).await;
    assert!(reply.connected);
    assert!(reply.engine_on);
    assert!(reply.error.is_empty());
    assert_eq!(mock.connect_calls(), 1);

    let status = session.status(None);
    assert_eq!(status.state, ReadState::Idle);
    assert_eq!(status.device_id.as_deref(), Some(DEVICE));
    assert_eq!(status.protocol.as_deref(), Some("ISO 15765-4 (CAN 11/500)"));
}

#[tokio::test(start_paused = true)]
async fn test_retry_limit_stops_supervisor() {
    let (mock, session) = session_with(
        MockConfig {
            connect_failures: u32::MAX,
            ..Default::default()
        },
        config(),
    );

    let reply = session.connect(DEVICE).await;
    assert!(!reply.connected);
    assert!(reply.error.starts_with("Cannot connect to OBD"));

    // Between attempts the supervisor is still live
    let status = session.status(None);
    assert_eq!(status.state, ReadState::Idle);
    assert_eq!(status.connect_attempts, 1);
    assert!(!status.connected);

    tokio::time::sleep(Duration::from_secs(20)).await;
    let status = session.status(None);
    assert_eq!(status.state, ReadState::Inactive);
    assert_eq!(
        status.phase,
        Some(SupervisorPhase::Stopped(StopReason::RetryExhausted))
    );
    assert_eq!(status.error, "Cannot connect to OBD after 3 attempts");
    assert_eq!(mock.connect_calls(), 3);
    assert_eq!(session.active_supervisors(), 0);

    // No further attempts once stopped
    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(mock.connect_calls(), 3);
    assert_eq!(session.status(None).state, ReadState::Inactive);
}

#[tokio::test(start_paused = true)]
async fn test_unbindable_device_is_fatal() {
    let (mock, session) = session_with(
        MockConfig {
            bindable: false,
            ..Default::default()
        },
        config(),
    );

    let reply = session.connect(DEVICE).await;
    assert_eq!(reply.error, format!("Cannot bind to address: {}", DEVICE));

    tokio::time::sleep(Duration::from_millis(10)).await;
    let status = session.status(None);
    assert_eq!(status.state, ReadState::Inactive);
    assert_eq!(
        status.phase,
        Some(SupervisorPhase::Stopped(StopReason::BindUnavailable))
    );
    assert_eq!(mock.connect_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_connect_after_stopped_supervisor_starts_new_one() {
    let (mock, session) = session_with(
        MockConfig {
            bindable: false,
            ..Default::default()
        },
        config(),
    );
    session.connect(DEVICE).await;
    tokio::time::sleep(Duration::from_millis(10)).await;

    mock.set_bindable(true);
    let reply = session.connect(DEVICE).await;
    assert!(reply.connected);
    assert_eq!(session.status(None).state, ReadState::Idle);
    assert_eq!(session.active_supervisors(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_second_connect_is_rejected() {
    let (mock, session) = session();
    session.connect(DEVICE).await;

    let second = session.connect(DEVICE).await;
    assert_eq!(second.error, "Attempt to connect while connected");
    assert!(second.connected);
    assert_eq!(session.active_supervisors(), 1);
    assert_eq!(mock.connect_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_racing_connects_spawn_one_supervisor() {
    let (_mock, session) = session();

    let (a, b) = tokio::join!(session.connect(DEVICE), session.connect(DEVICE));
    let rejected = [&a, &b]
        .iter()
        .filter(|reply| reply.error == "Attempt to connect while connected")
        .count();
    assert_eq!(rejected, 1);
    assert_eq!(session.active_supervisors(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_connect_without_device_is_rejected() {
    let (mock, session) = session();

    let reply = session.connect("").await;
    assert_eq!(reply.error, "Cannot connect to OBD: no device identifier given");
    assert_eq!(session.active_supervisors(), 0);
    assert_eq!(mock.connect_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_connect_with_empty_id_uses_default_device() {
    let (_mock, session) = session_with(
        MockConfig::default(),
        GatewayConfig {
            device_id: Some(DEVICE.to_string()),
            ..config()
        },
    );

    let reply = session.connect("").await;
    assert!(reply.connected);
}

// =============================================================================
// Status
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_status_never_starts_supervisor() {
    let (mock, session) = session();

    let status = session.status(Some(CommandListRequest::Vehicle));
    assert_eq!(status.state, ReadState::Inactive);
    assert_eq!(status.phase, None);
    assert_eq!(status.commands, None);
    assert_eq!(status.protocol, None);
    assert_eq!(session.active_supervisors(), 0);
    assert_eq!(mock.connect_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_status_command_lists() {
    let (_mock, session) = session();
    session.connect(DEVICE).await;

    let vehicle = session.status(Some(CommandListRequest::Vehicle));
    assert_eq!(vehicle.commands.map(|c| c.len()), Some(5));

    let _stream = session.read(Some(vec!["RPM".to_string()])).await;
    let actual = session.status(Some(CommandListRequest::Actual));
    assert_eq!(actual.commands, Some(vec!["RPM".to_string()]));
}

// =============================================================================
// Read / Stop
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_read_without_supervisor_yields_one_error() {
    let (_mock, session) = session();

    let replies: Vec<_> = session.read(None).await.collect().await;
    assert_eq!(replies.len(), 1);
    assert_eq!(replies[0].error, "Attempt to read an unactivated connection");
    assert!(!replies[0].connected);
}

#[tokio::test(start_paused = true)]
async fn test_stop_without_supervisor_is_unactivated() {
    let (_mock, session) = session();
    let reply = session.stop();
    assert_eq!(reply.error, "Attempt to read an unactivated connection");
}

#[tokio::test(start_paused = true)]
async fn test_read_streams_in_production_order() {
    let (_mock, session) = session();
    session.connect(DEVICE).await;

    let mut stream = session.read(None).await;
    let mut seqs = Vec::new();
    for _ in 0..4 {
        let envelope = stream.next().await.unwrap();
        assert!(envelope.connected);
        assert_eq!(envelope.values.len(), 5);
        seqs.push(envelope.seq);
    }
    assert_eq!(seqs, vec![1, 2, 3, 4]);
    assert_eq!(session.status(None).state, ReadState::Run);
}

#[tokio::test(start_paused = true)]
async fn test_stop_drains_buffered_envelopes() {
    let (_mock, session) = session();
    session.connect(DEVICE).await;

    let stream = session.read(None).await;
    tokio::time::sleep(Duration::from_millis(2500)).await;

    let reply = session.stop();
    assert!(reply.connected);
    assert!(reply.error.is_empty());

    let drained: Vec<u64> = stream.map(|e| e.seq).collect().await;
    assert_eq!(drained, vec![1, 2, 3]);

    // The supervisor survives Stop with reading disabled
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(session.status(None).state, ReadState::Idle);
    assert_eq!(session.active_supervisors(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_read_is_restartable() {
    let (_mock, session) = session();
    session.connect(DEVICE).await;

    let stream = session.read(None).await;
    tokio::time::sleep(Duration::from_millis(2500)).await;
    session.stop();
    let first: Vec<u64> = stream.map(|e| e.seq).collect().await;
    assert_eq!(first, vec![1, 2, 3]);

    let stream = session.read(None).await;
    tokio::time::sleep(Duration::from_millis(1500)).await;
    session.stop();
    let second: Vec<u64> = stream.map(|e| e.seq).collect().await;
    assert_eq!(second, vec![4, 5]);
}

#[tokio::test(start_paused = true)]
async fn test_new_read_after_stop_ends_previous_stream() {
    let (_mock, session) = session();
    session.connect(DEVICE).await;

    let mut first = session.read(None).await;
    assert_eq!(first.next().await.unwrap().seq, 1);

    // The earlier stream is not polled between Stop and the next Read
    session.stop();
    let mut second = session.read(None).await;

    let ended = tokio::time::timeout(Duration::from_secs(1), first.next()).await;
    assert!(matches!(ended, Ok(None)), "earlier stream kept running");

    let mut seqs = Vec::new();
    for _ in 0..3 {
        seqs.push(second.next().await.unwrap().seq);
    }
    assert_eq!(seqs, vec![2, 3, 4]);
    assert_eq!(session.status(None).state, ReadState::Run);

    session.stop();
    let rest: Vec<u64> = second.map(|e| e.seq).collect().await;
    assert!(rest.iter().all(|seq| *seq > 4));
    assert!(first.next().await.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_full_queue_disables_reading() {
    let (_mock, session) = session_with(
        MockConfig::default(),
        GatewayConfig {
            queue_capacity: 2,
            ..config()
        },
    );
    session.connect(DEVICE).await;

    // Nobody polls: e1 and e2 fill the queue, e3 times out
    let mut stream = session.read(None).await;
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(session.status(None).state, ReadState::Idle);

    assert_eq!(stream.next().await.unwrap().seq, 1);
    assert_eq!(stream.next().await.unwrap().seq, 2);

    // Reading stays disabled, so the stream blocks
    let blocked = tokio::time::timeout(Duration::from_secs(30), stream.next()).await;
    assert!(blocked.is_err());

    session.stop();
    assert!(stream.next().await.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_skip_cycle_policy_keeps_reading() {
    let (_mock, session) = session_with(
        MockConfig::default(),
        GatewayConfig {
            queue_capacity: 1,
            queue_full_policy: QueueFullPolicy::SkipCycle,
            ..config()
        },
    );
    session.connect(DEVICE).await;

    let mut stream = session.read(None).await;
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(session.status(None).state, ReadState::Run);

    let first = stream.next().await.unwrap();
    let second = stream.next().await.unwrap();
    assert_eq!(first.seq, 1);
    assert!(second.seq > 2, "dropped cycles leave a gap, got {}", second.seq);
}

#[tokio::test(start_paused = true)]
async fn test_read_error_is_reported_in_envelope() {
    let (mock, session) = session();
    session.connect(DEVICE).await;
    mock.fail_next_reads(1);

    let mut stream = session.read(None).await;
    let failed = stream.next().await.unwrap();
    assert!(failed.error.starts_with("OBD communication error"));
    assert!(failed.values.is_empty());
    assert!(failed.connected);

    let recovered = stream.next().await.unwrap();
    assert_eq!(recovered.seq, 2);
    assert!(recovered.error.is_empty());
    assert!(!recovered.values.is_empty());
    assert_eq!(session.active_supervisors(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_engine_off_omits_values() {
    let (_mock, session) = session_with(
        MockConfig {
            engine_on: false,
            ..Default::default()
        },
        config(),
    );
    session.connect(DEVICE).await;

    let envelope = session.read(None).await.next().await.unwrap();
    assert!(envelope.connected);
    assert!(!envelope.engine_on);
    assert!(envelope.values.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_engine_start_during_read_adds_values() {
    let (mock, session) = session_with(
        MockConfig {
            engine_on: false,
            ..Default::default()
        },
        config(),
    );
    session.connect(DEVICE).await;

    let mut stream = session.read(None).await;
    assert!(stream.next().await.unwrap().values.is_empty());

    mock.set_engine_on(true);
    let envelope = stream.next().await.unwrap();
    assert!(envelope.engine_on);
    assert_eq!(envelope.values.len(), 5);
}

#[tokio::test(start_paused = true)]
async fn test_read_narrows_commands() {
    let (_mock, session) = session();
    session.connect(DEVICE).await;

    let mut stream = session
        .read(Some(vec!["RPM".to_string(), "SPEED".to_string()]))
        .await;
    let envelope = stream.next().await.unwrap();
    let commands: Vec<&str> = envelope.values.iter().map(|v| v.command.as_str()).collect();
    assert_eq!(commands, vec!["RPM", "SPEED"]);
}

// =============================================================================
// Autoconnect / shutdown
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_autoconnect_on_read() {
    let (mock, session) = session_with(
        MockConfig::default(),
        GatewayConfig {
            autoconnect: true,
            device_id: Some(DEVICE.to_string()),
            ..config()
        },
    );

    let mut stream = session.read(None).await;
    let envelope = stream.next().await.unwrap();
    assert_eq!(envelope.seq, 1);
    assert!(envelope.connected);
    assert_eq!(mock.connect_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_autoconnect_without_device_is_unactivated() {
    let (mock, session) = session_with(
        MockConfig::default(),
        GatewayConfig {
            autoconnect: true,
            ..config()
        },
    );

    let replies: Vec<_> = session.read(None).await.collect().await;
    assert_eq!(replies.len(), 1);
    assert_eq!(replies[0].error, "Attempt to read an unactivated connection");
    assert_eq!(mock.connect_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_stops_supervisor_and_releases() {
    let (mock, session) = session();
    session.connect(DEVICE).await;

    session.shutdown().await;
    assert_eq!(session.active_supervisors(), 0);
    assert_eq!(session.status(None).state, ReadState::Inactive);
    assert!(!mock.bound());
}
