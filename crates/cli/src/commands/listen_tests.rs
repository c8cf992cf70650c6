// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

use std::sync::Mutex;
use std::time::Duration;

use tokio::sync::oneshot;

use super::*;
use crate::transport::testing::MockConnector;

fn config(max_reconnect_attempts: u32) -> Config {
    Config::parse(&format!(
        r#"
[connections.tables]
url = "ws://pos.test/tables"
heartbeat_interval_ms = 0
reconnect_base_delay_ms = 100
reconnect_max_delay_ms = 1000
max_reconnect_attempts = {max_reconnect_attempts}
"#
    ))
    .unwrap()
}

async fn idle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}

#[tokio::test(start_paused = true)]
async fn prints_pushed_messages_until_shutdown() {
    let connector = MockConnector::new();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let (stop, stopped) = oneshot::channel::<()>();

    let task = tokio::spawn({
        let connector = Arc::new(connector.clone());
        let seen = Arc::clone(&seen);
        async move {
            let config = config(3);
            follow(
                connector,
                &config,
                "tables",
                move |text| seen.lock().unwrap().push(text.to_string()),
                async {
                    let _ = stopped.await;
                },
            )
            .await
        }
    });

    idle().await;
    connector.latest().push(r#"{"table":4,"status":"seated"}"#).await;
    connector.latest().push(r#"{"type":"pong","timestamp":1}"#).await;
    idle().await;
    stop.send(()).unwrap();

    task.await.unwrap().unwrap();
    assert_eq!(
        *seen.lock().unwrap(),
        vec![r#"{"table":4,"status":"seated"}"#.to_string()]
    );
    assert!(connector.latest().is_closed());
}

#[tokio::test(start_paused = true)]
async fn gives_up_after_max_attempts() {
    let connector = Arc::new(MockConnector::unreachable());
    let config = config(2);

    let err = follow(
        connector.clone(),
        &config,
        "tables",
        |_| {},
        std::future::pending(),
    )
    .await
    .unwrap_err();

    assert!(matches!(
        err,
        Error::MaxReconnectAttemptsReached { attempts: 2, .. }
    ));
    assert_eq!(connector.attempts(), 3);
}

#[tokio::test]
async fn unknown_connection_is_rejected() {
    let err = follow(
        Arc::new(MockConnector::new()),
        &config(1),
        "kds",
        |_| {},
        std::future::pending(),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, Error::ConnectionNotFound(name) if name == "kds"));
}
