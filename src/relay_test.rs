use super::*;
use crate::test_support;
use tokio::time::timeout;

fn fast_retry(max_attempts: u32) -> ReconnectPolicy {
    ReconnectPolicy {
        enabled: true,
        max_attempts,
        initial_backoff: Duration::from_millis(5),
        max_backoff: Duration::from_millis(20),
    }
}

#[test]
fn default_policy_is_disabled() {
    let policy = ReconnectPolicy::default();
    assert!(!policy.enabled);
    assert_eq!(policy.max_attempts, 0);
}

#[test]
fn retrying_with_zero_attempts_stays_disabled() {
    assert!(!ReconnectPolicy::retrying(0).enabled);
    assert!(ReconnectPolicy::retrying(3).enabled);
}

#[test]
fn backoff_doubles_and_caps() {
    let policy = ReconnectPolicy::retrying(DEFAULT_RECONNECT_ATTEMPTS);
    let delays: Vec<u64> = (1..=6)
        .map(|attempt| u64::try_from(policy.backoff(attempt).as_millis()).expect("fits"))
        .collect();
    assert_eq!(delays, vec![1000, 2000, 4000, 8000, 10_000, 10_000]);
    assert_eq!(policy.backoff(u32::MAX), Duration::from_millis(10_000));
}

#[tokio::test]
async fn submit_writes_one_talk_frame() {
    let (listener, base) = test_support::bind().await;
    let server = tokio::spawn(async move {
        let mut socket = test_support::accept(&listener).await;
        test_support::recv_text(&mut socket).await
    });

    let mut relay = RelayClient::connect(&format!("{base}/TalkAPI/"), ReconnectPolicy::disabled())
        .await
        .expect("connect");
    relay.submit(&SynthesisCommand::talk("hello")).await.expect("submit");

    let raw = timeout(test_support::WAIT, server).await.expect("server").expect("join");
    let command: SynthesisCommand = serde_json::from_str(&raw).expect("json");
    assert_eq!(command, SynthesisCommand::talk("hello"));
}

#[tokio::test]
async fn connect_to_dead_port_is_a_connect_error() {
    let (listener, base) = test_support::bind().await;
    drop(listener);

    let err = RelayClient::connect(&base, ReconnectPolicy::disabled())
        .await
        .err()
        .expect("connect should fail");
    assert!(matches!(err, RelayError::Connect(_)));
}

#[tokio::test]
async fn submit_without_connection_fails_when_reconnect_disabled() {
    let mut relay = RelayClient::disconnected("ws://127.0.0.1:9/TalkAPI/", ReconnectPolicy::disabled());
    let err = relay.submit(&SynthesisCommand::talk("lost")).await.expect_err("no socket");
    assert!(matches!(err, RelayError::Closed));
    assert!(!relay.is_connected());
}

#[tokio::test]
async fn submit_redials_and_resends_when_reconnect_enabled() {
    let (listener, base) = test_support::bind().await;
    let server = tokio::spawn(async move {
        let mut socket = test_support::accept(&listener).await;
        test_support::recv_text(&mut socket).await
    });

    let mut relay = RelayClient::disconnected(&base, fast_retry(3));
    relay.submit(&SynthesisCommand::talk("again")).await.expect("resend after redial");
    assert!(relay.is_connected());

    let raw = timeout(test_support::WAIT, server).await.expect("server").expect("join");
    let command: SynthesisCommand = serde_json::from_str(&raw).expect("json");
    assert_eq!(command.text, "again");
}

#[tokio::test]
async fn submit_gives_up_after_max_attempts() {
    let (listener, base) = test_support::bind().await;
    drop(listener);

    let mut relay = RelayClient::disconnected(&base, fast_retry(2));
    let err = relay.submit(&SynthesisCommand::talk("gone")).await.expect_err("relay down");
    assert!(matches!(err, RelayError::Connect(_)));
    assert!(!relay.is_connected());
}

#[tokio::test]
async fn close_is_idempotent() {
    let (listener, base) = test_support::bind().await;
    let server = tokio::spawn(async move {
        let mut socket = test_support::accept(&listener).await;
        test_support::wait_closed(&mut socket).await;
    });

    let mut relay = RelayClient::connect(&base, ReconnectPolicy::disabled()).await.expect("connect");
    relay.close().await;
    relay.close().await;
    assert!(!relay.is_connected());

    timeout(test_support::WAIT, server).await.expect("server").expect("join");
}
