// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

use super::*;
use crate::transport::testing::{ConnectScript, MockConnector};

fn config() -> Config {
    Config::parse(
        r#"
[connections.kds]
url = "ws://pos.test/kds"
heartbeat_interval_ms = 0
reconnect_base_delay_ms = 100
reconnect_max_delay_ms = 100
replay_pause_ms = 0
"#,
    )
    .unwrap()
}

#[tokio::test(start_paused = true)]
async fn sends_on_open_connection() {
    let connector = MockConnector::new();
    deliver(
        Arc::new(connector.clone()),
        &config(),
        "kds",
        "ticket 7 ready".to_string(),
        Duration::from_secs(1),
    )
    .await
    .unwrap();

    assert_eq!(connector.all_sent(), vec!["ticket 7 ready".to_string()]);
    assert!(connector.latest().is_closed());
}

#[tokio::test(start_paused = true)]
async fn queued_message_flushes_after_reconnect() {
    let connector = MockConnector::new();
    connector.script([ConnectScript::Fail("connection refused".into())]);

    deliver(
        Arc::new(connector.clone()),
        &config(),
        "kds",
        "ticket 8 ready".to_string(),
        Duration::from_secs(5),
    )
    .await
    .unwrap();

    assert_eq!(connector.attempts(), 2);
    assert_eq!(connector.all_sent(), vec!["ticket 8 ready".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn times_out_when_unreachable() {
    let connector = MockConnector::unreachable();
    let err = deliver(
        Arc::new(connector),
        &config(),
        "kds",
        "ticket 9 ready".to_string(),
        Duration::from_millis(500),
    )
    .await
    .unwrap_err();

    assert!(matches!(
        err,
        Error::ConnectionTimeout {
            timeout_ms: 500,
            ..
        }
    ));
}
