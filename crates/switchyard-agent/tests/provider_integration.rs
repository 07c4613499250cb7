//! Integration tests for the provider adapter: HTTP and process contracts and
//! failover across real transports.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use serde_json::json;
use std::time::Duration;
use switchyard_agent::{
    build_backend, FailoverPolicy, Handoff, InvokeRequest, ProviderConfig, ProviderError,
    ProviderPool, StreamEvent,
};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn provider_answering(status: u16, body: serde_json::Value) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/run"))
        .respond_with(ResponseTemplate::new(status).set_body_json(body))
        .mount(&server)
        .await;
    server
}

// --- HTTP failover ---

#[tokio::test]
async fn test_http_503_fails_over_to_second_provider() {
    let p1 = provider_answering(503, json!({"error": "overloaded"})).await;
    let p2 = provider_answering(200, json!({"summary": "ok", "output": "from p2"})).await;

    let pool = ProviderPool::from_configs(
        vec![
            ProviderConfig::http("p1", p1.uri()),
            ProviderConfig::http("p2", p2.uri()),
        ],
        FailoverPolicy::immediate(),
    )
    .unwrap();

    let inv = pool
        .invoke(
            &InvokeRequest::new("backend", "Build the API"),
            &["p1".to_string(), "p2".to_string()],
            Duration::from_secs(5),
        )
        .await
        .unwrap();

    assert_eq!(inv.provider, "p2");
    assert_eq!(inv.reply.text(), "from p2");
    assert_eq!(inv.failed_attempts.len(), 1);
    assert!(inv.failed_attempts[0].error.contains("503"));
}

#[tokio::test]
async fn test_slow_http_provider_times_out() {
    let slow = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/run"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"summary": "late", "output": null}))
                .set_delay(Duration::from_secs(2)),
        )
        .mount(&slow)
        .await;
    let fast = provider_answering(200, json!({"summary": "fast", "output": null})).await;

    let pool = ProviderPool::from_configs(
        vec![
            ProviderConfig::http("slow", slow.uri()),
            ProviderConfig::http("fast", fast.uri()),
        ],
        FailoverPolicy::immediate(),
    )
    .unwrap();

    let inv = pool
        .invoke(
            &InvokeRequest::new("writer", "draft"),
            &[],
            Duration::from_millis(200),
        )
        .await
        .unwrap();
    assert_eq!(inv.provider, "fast");
    assert!(inv.failed_attempts[0].error.contains("timed out"));
}

#[tokio::test]
async fn test_error_status_counts_as_failure() {
    let bad = provider_answering(200, json!({"summary": "x", "status": "error"})).await;
    let pool = ProviderPool::from_configs(
        vec![ProviderConfig::http("bad", bad.uri())],
        FailoverPolicy::immediate(),
    )
    .unwrap();

    let err = pool
        .invoke(&InvokeRequest::new("w", "t"), &[], Duration::from_secs(1))
        .await
        .unwrap_err();
    assert!(matches!(err, ProviderError::Exhausted { .. }));
    assert_eq!(err.attempts().len(), 1);
}

// --- Handoff context on the wire ---

#[tokio::test]
async fn test_context_is_sent_with_request() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/run"))
        .and(wiremock::matchers::body_partial_json(json!({
            "context": [{"task_id": "T1", "worker_id": "architect", "summary": "design done"}]
        })))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"summary": "ok", "output": null})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let backend = build_backend(ProviderConfig::http("p1", server.uri())).unwrap();
    let request = InvokeRequest::new("backend", "implement").with_context(vec![Handoff {
        task_id: "T1".into(),
        worker_id: "architect".into(),
        summary: "design done".into(),
    }]);
    let reply = backend.run(&request).await.unwrap();
    assert_eq!(reply.summary, "ok");
}

// --- Streaming through the pool ---

#[tokio::test]
async fn test_stream_through_pool() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/run"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            "event: chunk\ndata: {\"text\":\"a\"}\n\nevent: chunk\ndata: {\"text\":\"b\"}\n\nevent: complete\ndata: {\"summary\":\"ab\",\"output\":\"ab\"}\n\n",
        ))
        .mount(&server)
        .await;

    let pool = ProviderPool::from_configs(
        vec![ProviderConfig::http("s", server.uri()).with_streaming(true)],
        FailoverPolicy::immediate(),
    )
    .unwrap();

    let inv = pool
        .invoke_stream(&InvokeRequest::new("w", "t"), &[], Duration::from_secs(5))
        .await
        .unwrap();
    let (mut rx, handle) = inv.stream;
    let mut text = String::new();
    let mut terminal = 0;
    while let Some(event) = rx.recv().await {
        match event {
            StreamEvent::Chunk { text: t } => text.push_str(&t),
            StreamEvent::Complete { .. } | StreamEvent::Error { .. } => terminal += 1,
        }
    }
    assert_eq!(text, "ab");
    assert_eq!(terminal, 1);
    assert_eq!(handle.await.unwrap().unwrap().summary, "ab");
}

// --- Process provider ---

#[cfg(unix)]
#[tokio::test]
async fn test_process_provider_reads_stdin() {
    let dir = tempfile::tempdir().unwrap();
    let script = dir.path().join("worker.sh");
    std::fs::write(
        &script,
        "#!/bin/sh\nread -r line\necho \"received: $line\" >&2\necho 'log line'\necho '{\"summary\":\"processed\",\"output\":{\"ok\":true}}'\n",
    )
    .unwrap();

    let config = ProviderConfig::process("local", "sh", [script.to_string_lossy().to_string()]);
    let pool = ProviderPool::from_configs(vec![config], FailoverPolicy::immediate()).unwrap();

    let inv = pool
        .invoke(&InvokeRequest::new("tester", "run tests"), &[], Duration::from_secs(10))
        .await
        .unwrap();
    assert_eq!(inv.provider, "local");
    assert_eq!(inv.reply.summary, "processed");
    assert_eq!(inv.reply.output["ok"], true);
}

#[cfg(unix)]
#[tokio::test]
async fn test_failing_process_falls_back_to_http() {
    let http = provider_answering(200, json!({"summary": "http ok", "output": null})).await;

    let pool = ProviderPool::new(FailoverPolicy::immediate())
        .with_backend(
            build_backend(ProviderConfig::process("local", "sh", ["-c", "exit 1"])).unwrap(),
        )
        .unwrap()
        .with_backend(build_backend(ProviderConfig::http("remote", http.uri())).unwrap())
        .unwrap();

    let inv = pool
        .invoke(&InvokeRequest::new("w", "t"), &[], Duration::from_secs(10))
        .await
        .unwrap();
    assert_eq!(inv.provider, "remote");
    assert!(inv.failed_attempts[0].error.contains("process error"));
}

// --- Config files ---

#[test]
fn test_providers_from_toml_file() {
    #[derive(serde::Deserialize)]
    struct File {
        providers: Vec<ProviderConfig>,
    }

    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("providers.toml");
    std::fs::write(
        &file,
        r#"
[[providers]]
name = "primary"
kind = "http"
base_url = "http://127.0.0.1:9000"

[[providers]]
name = "local"
kind = "process"
command = "python3"
args = ["worker.py"]
"#,
    )
    .unwrap();

    let parsed: File = toml::from_str(&std::fs::read_to_string(&file).unwrap()).unwrap();
    let pool = ProviderPool::from_configs(parsed.providers, FailoverPolicy::default()).unwrap();
    assert_eq!(pool.names(), vec!["primary", "local"]);
}
