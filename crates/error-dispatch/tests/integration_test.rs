// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

mod common;

use common::helpers::{application_error, config, data_message, deliver, DISPATCH_PATH};
use error_dispatch::decoder::{CompressedBatch, SubscriptionEvent};
use error_dispatch::{Completion, DecodeError, DispatchFailure, Pipeline, PipelineError};
use mockito::{Matcher, Server};
use reqwest::StatusCode;
use serde_json::json;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;

#[tokio::test]
async fn test_end_to_end_single_dispatch() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", DISPATCH_PATH)
        .match_header("authorization", "Bearer mock-token")
        .match_body(Matcher::Json(json!({
            "event_type": "error-detected",
            "client_payload": {
                "error_message": "x is not a function",
                "error_stack": "No stack trace available",
                "error_type": "TypeError",
                "timestamp": "2025-01-01T00:00:00Z",
                "log_group": "g1",
                "log_stream": "s1",
                "context": "Unknown context",
            }
        })))
        .with_status(204)
        .expect(1)
        .create_async()
        .await;

    let pipeline = Pipeline::from_config(&config(server.url()));
    let batch = data_message(&[
        r#"{"severity":"ERROR","error":{"kind":"TypeError","message":"x is not a function"},"timestamp":"2025-01-01T00:00:00Z"}"#,
        "not json",
    ]);

    let report = pipeline
        .run(&batch, None)
        .await
        .expect("pipeline should not fail");

    mock.assert_async().await;
    assert_eq!(report.completion, Completion::Success);
    assert_eq!(report.succeeded(), 1);
    assert!(report.into_result().is_ok());
}

#[tokio::test]
async fn test_application_errors_are_dispatched_in_order() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", DISPATCH_PATH)
        .with_status(204)
        .expect(2)
        .create_async()
        .await;

    let info = json!({"timestamp": "2025-01-01T00:00:00.000Z", "severity": "INFO", "message": "ok"})
        .to_string();
    let null_pointer = application_error("TypeError", "Cannot read properties of null");
    let custom = application_error("Error", "custom failure");
    let pipeline = Pipeline::from_config(&config(server.url()));
    let batch = data_message(&[
        info.as_str(),
        null_pointer.as_str(),
        "END RequestId: 1",
        custom.as_str(),
    ]);

    let report = pipeline.run(&batch, None).await.expect("pipeline should not fail");

    mock.assert_async().await;
    assert_eq!(report.records, 4);
    assert_eq!(report.parsed, 3);
    assert_eq!(report.eligible, 2);
    let messages: Vec<_> = report
        .results
        .iter()
        .map(|r| r.payload.error_message.as_str())
        .collect();
    assert_eq!(
        messages,
        vec!["Cannot read properties of null", "custom failure"]
    );
    assert_eq!(report.results[0].payload.context_label, "GET /error");
}

#[tokio::test]
async fn test_failed_dispatch_does_not_cancel_others() {
    let mut server = Server::new_async().await;
    let failing = server
        .mock("POST", DISPATCH_PATH)
        .match_body(Matcher::PartialJson(
            json!({"client_payload": {"error_message": "first"}}),
        ))
        .with_status(500)
        .with_body("Internal Server Error")
        .expect(1)
        .create_async()
        .await;
    let succeeding = server
        .mock("POST", DISPATCH_PATH)
        .match_body(Matcher::PartialJson(
            json!({"client_payload": {"error_message": "second"}}),
        ))
        .with_status(204)
        .expect(1)
        .create_async()
        .await;

    let first = application_error("Error", "first");
    let second = application_error("Error", "second");
    let pipeline = Pipeline::from_config(&config(server.url()));
    let event = SubscriptionEvent {
        aws_logs: data_message(&[first.as_str(), second.as_str()]),
    };

    let result = pipeline.handle(&event, None).await;

    failing.assert_async().await;
    succeeding.assert_async().await;
    match result {
        Err(PipelineError::Dispatch {
            failed,
            not_attempted,
            first,
        }) => {
            assert_eq!(failed, 1);
            assert_eq!(not_attempted, 0);
            assert_eq!(
                first,
                DispatchFailure::Status(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal Server Error".to_string()
                )
            );
        }
        other => panic!("expected dispatch failure, got {other:?}"),
    }
}

#[tokio::test]
async fn test_batch_without_errors_makes_no_calls() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", DISPATCH_PATH)
        .expect(0)
        .create_async()
        .await;

    let info = json!({"severity": "INFO", "message": "healthy"}).to_string();
    let no_detail = json!({"severity": "ERROR", "error": null, "timestamp": "2025-01-01T00:00:00Z"})
        .to_string();
    let pipeline = Pipeline::from_config(&config(server.url()));
    let event = SubscriptionEvent {
        aws_logs: data_message(&[info.as_str(), no_detail.as_str()]),
    };

    let report = pipeline
        .handle(&event, None)
        .await
        .expect("batch without errors should succeed");

    mock.assert_async().await;
    assert_eq!(report.completion, Completion::Success);
    assert!(report.results.is_empty());
}

#[tokio::test]
async fn test_control_message_makes_no_calls() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", DISPATCH_PATH)
        .expect(0)
        .create_async()
        .await;

    let batch = deliver(&json!({
        "messageType": "CONTROL_MESSAGE",
        "owner": "CloudwatchLogs",
        "logGroup": "",
        "logStream": "",
        "subscriptionFilters": [],
        "logEvents": [{
            "id": "",
            "timestamp": 1_735_689_600_000_i64,
            "message": "CWL CONTROL MESSAGE: Checking health of destination Lambda function.",
        }],
    }));
    let pipeline = Pipeline::from_config(&config(server.url()));

    let report = pipeline.run(&batch, None).await.expect("control message should succeed");

    mock.assert_async().await;
    assert_eq!(report.completion, Completion::Success);
    assert_eq!(report.parsed, 0);
}

#[tokio::test]
async fn test_corrupt_batch_is_fatal() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", DISPATCH_PATH)
        .expect(0)
        .create_async()
        .await;
    let pipeline = Pipeline::from_config(&config(server.url()));

    let result = pipeline
        .run(&CompressedBatch::new("aGVsbG8gd29ybGQ="), None)
        .await;

    mock.assert_async().await;
    assert!(matches!(
        result,
        Err(PipelineError::Decode(DecodeError::Decompress(_)))
    ));
}

#[tokio::test]
async fn test_unresponsive_endpoint_does_not_outlive_deadline() {
    // Accepts connections but never answers.
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("failed to bind listener");
    let addr = listener.local_addr().expect("listener has no address");
    let server = tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });

    let config = error_dispatch::DispatchConfig {
        dispatch_timeout: Duration::from_secs(4),
        ..config(format!("http://{addr}"))
    };
    let pipeline = Pipeline::from_config(&config);
    let error = application_error("TypeError", "hangs");
    let batch = data_message(&[error.as_str()]);

    let started = Instant::now();
    let deadline = tokio::time::Instant::now() + Duration::from_secs(3);
    let report = pipeline
        .run(&batch, Some(deadline))
        .await
        .expect("pipeline should not fail");

    assert!(started.elapsed() < Duration::from_secs(3));
    assert_eq!(report.completion, Completion::Failed);
    assert_eq!(
        report.results[0].failure_reason(),
        Some(&DispatchFailure::Timeout)
    );
    server.abort();
}
