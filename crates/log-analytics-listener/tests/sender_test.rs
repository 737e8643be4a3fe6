// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

mod common;

use common::{delivery_config, event, fast_retry, mock_token, UPLOAD_PATH};
use core::time::Duration;
use log_analytics_listener::credential::ManagedIdentityCredential;
use log_analytics_listener::runtime::IngestionRuntime;
use log_analytics_listener::IngestionSender;
use mockito::{Matcher, Server, ServerGuard};
use std::sync::Arc;
use trace_event_store::{LogSender, SendError};

const TIMEOUT: Duration = Duration::from_secs(5);

fn sender(server: &ServerGuard, identity_endpoint: &str, max_retries: u32) -> IngestionSender {
    let credential = Arc::new(
        ManagedIdentityCredential::new(identity_endpoint, "mi-client", TIMEOUT)
            .expect("failed to build credential"),
    );
    IngestionSender::new(
        &delivery_config(&server.url()),
        credential,
        fast_retry(max_retries),
        TIMEOUT,
        Arc::new(IngestionRuntime::new().expect("failed to build runtime")),
    )
    .expect("failed to build sender")
}

#[test]
fn uploads_batch_as_json_array() {
    let mut server = Server::new();
    let token = mock_token(&mut server);
    let upload = server
        .mock("POST", UPLOAD_PATH)
        .match_query(Matcher::UrlEncoded(
            "api-version".into(),
            "2023-01-01".into(),
        ))
        .match_header("Authorization", "Bearer test-token")
        .match_header("Content-Type", "application/json")
        .match_body(Matcher::Regex(
            r#"^\[\{.*"Content":"first".*\},\{.*"Content":"second".*\}\]$"#.to_string(),
        ))
        .with_status(204)
        .create();

    let token_url = format!("{}/token", server.url());
    let sender = sender(&server, &token_url, 0);
    let result = sender.send(&[event("first"), event("second")]);

    assert_eq!(result, Ok(()));
    token.assert();
    upload.assert();
}

#[test]
fn token_is_reused_across_batches() {
    let mut server = Server::new();
    let token = server
        .mock("GET", "/token")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(r#"{"access_token":"test-token","expires_in":3599}"#)
        .expect(1)
        .create();
    let upload = server
        .mock("POST", UPLOAD_PATH)
        .match_query(Matcher::Any)
        .with_status(204)
        .expect(3)
        .create();

    let token_url = format!("{}/token", server.url());
    let sender = sender(&server, &token_url, 0);
    for i in 0..3 {
        assert_eq!(sender.send(&[event(&format!("batch {i}"))]), Ok(()));
    }

    token.assert();
    upload.assert();
}

#[test]
fn server_errors_are_retried() {
    let mut server = Server::new();
    mock_token(&mut server);
    let upload = server
        .mock("POST", UPLOAD_PATH)
        .match_query(Matcher::Any)
        .with_status(503)
        .with_body("Service Unavailable")
        .expect(3)
        .create();

    let token_url = format!("{}/token", server.url());
    let sender = sender(&server, &token_url, 2);
    let result = sender.send(&[event("retried")]);

    upload.assert();
    assert_eq!(
        result,
        Err(SendError::Destination {
            status: Some(503),
            message: "Service Unavailable".to_string(),
        })
    );
}

#[test]
fn throttling_is_retried() {
    let mut server = Server::new();
    mock_token(&mut server);
    let upload = server
        .mock("POST", UPLOAD_PATH)
        .match_query(Matcher::Any)
        .with_status(429)
        .expect(2)
        .create();

    let token_url = format!("{}/token", server.url());
    let sender = sender(&server, &token_url, 1);
    let result = sender.send(&[event("throttled")]);

    upload.assert();
    assert!(matches!(
        result,
        Err(SendError::Destination {
            status: Some(429),
            ..
        })
    ));
}

#[test]
fn client_errors_are_not_retried() {
    let mut server = Server::new();
    mock_token(&mut server);
    let upload = server
        .mock("POST", UPLOAD_PATH)
        .match_query(Matcher::Any)
        .with_status(400)
        .with_body(r#"{"error":{"code":"InvalidStream"}}"#)
        .expect(1)
        .create();

    let token_url = format!("{}/token", server.url());
    let sender = sender(&server, &token_url, 5);
    let result = sender.send(&[event("rejected")]);

    upload.assert();
    assert!(matches!(
        result,
        Err(SendError::Destination {
            status: Some(400),
            ..
        })
    ));
}

#[test]
fn credential_failure_makes_sender_unavailable() {
    let mut server = Server::new();
    let upload = server
        .mock("POST", UPLOAD_PATH)
        .match_query(Matcher::Any)
        .expect(0)
        .create();

    let sender = sender(&server, "http://127.0.0.1:1/token", 0);
    let result = sender.send(&[event("no token")]);

    upload.assert();
    assert!(matches!(result, Err(SendError::Unavailable(_))));
}

#[test]
fn empty_batch_is_not_uploaded() {
    let mut server = Server::new();
    let token = server
        .mock("GET", "/token")
        .match_query(Matcher::Any)
        .expect(0)
        .create();

    let token_url = format!("{}/token", server.url());
    let sender = sender(&server, &token_url, 0);
    assert_eq!(sender.send(&[]), Ok(()));
    token.assert();
}

#[tokio::test(flavor = "multi_thread")]
async fn send_works_inside_a_tokio_runtime() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/token")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(r#"{"access_token":"test-token","expires_in":"3599"}"#)
        .create_async()
        .await;
    let upload = server
        .mock("POST", UPLOAD_PATH)
        .match_query(Matcher::Any)
        .with_status(204)
        .create_async()
        .await;

    let token_url = format!("{}/token", server.url());
    let sender = sender(&server, &token_url, 0);
    let result = tokio::task::spawn_blocking(move || sender.send(&[event("from async")]))
        .await
        .expect("send panicked");

    assert_eq!(result, Ok(()));
    upload.assert_async().await;
}
