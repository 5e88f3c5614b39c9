//! End-to-end tests of the chat streaming endpoint over real TCP.

mod common;

use std::time::{Duration, Instant};

use serde_json::{json, Value};

use common::{
    delta_contents, fast_defaults, sse_payloads, start_server, RecordingTool, ToolBehavior,
    ToolTarget,
};
use synthetic_llm_server::binding::Binding;
use synthetic_llm_server::config::SimulationDefaults;

const BINDINGS: [Binding; 2] = [Binding::Cooperative, Binding::Threaded];

async fn chat(url: &str, body: Value) -> (reqwest::StatusCode, String, Option<String>) {
    let response = reqwest::Client::new()
        .post(url)
        .json(&body)
        .send()
        .await
        .unwrap();
    let status = response.status();
    let content_type = response
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    (status, response.text().await.unwrap(), content_type)
}

#[tokio::test(flavor = "multi_thread")]
async fn test_three_small_frames_then_done() {
    for binding in BINDINGS {
        let server = start_server(binding, fast_defaults(), ToolTarget::Unreachable, false).await;

        let (status, body, content_type) = chat(
            &server.url("/api/chat/completions"),
            json!({"frames": 3, "delay_ms": 0, "bytes_per_frame": 2}),
        )
        .await;

        assert_eq!(status, 200);
        assert_eq!(content_type.as_deref(), Some("text/event-stream"));
        assert_eq!(
            body,
            "data: {\"choices\": [{\"delta\": {\"content\": \"x \"}}]}\n\n".repeat(3)
                + "data: [DONE]\n\n",
            "binding {:?}",
            binding
        );
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_zero_frames_is_only_done() {
    for binding in BINDINGS {
        let server = start_server(binding, fast_defaults(), ToolTarget::Unreachable, false).await;
        let (status, body, _) =
            chat(&server.url("/api/chat/completions"), json!({"frames": 0})).await;
        assert_eq!(status, 200);
        assert_eq!(body, "data: [DONE]\n\n");
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_frame_count_and_size_are_reproducible() {
    for binding in BINDINGS {
        let server = start_server(binding, fast_defaults(), ToolTarget::Unreachable, false).await;
        let request = json!({"frames": 25, "delay_ms": 0, "bytes_per_frame": 64});

        let (_, first, _) = chat(&server.url("/api/chat/completions"), request.clone()).await;
        let (_, second, _) = chat(&server.url("/api/chat/completions"), request).await;

        let payloads = sse_payloads(&first);
        assert_eq!(payloads.len(), 26);
        assert_eq!(payloads.last().map(String::as_str), Some("[DONE]"));

        let contents = delta_contents(&payloads);
        assert_eq!(contents.len(), 25);
        assert!(contents.iter().all(|c| c.len() == 64));
        assert_eq!(first, second);
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_empty_body_uses_process_defaults() {
    let defaults = SimulationDefaults {
        frames: 4,
        delay_ms: 0,
        bytes_per_frame: 8,
        ..SimulationDefaults::default()
    };
    let server = start_server(Binding::Cooperative, defaults, ToolTarget::Unreachable, false).await;

    let response = reqwest::Client::new()
        .post(server.url("/api/chat/completions"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body = response.text().await.unwrap();

    let contents = delta_contents(&sse_payloads(&body));
    assert_eq!(contents, vec!["x x x x ".to_string(); 4]);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_elapsed_time_covers_delays_and_spins() {
    for binding in BINDINGS {
        let server = start_server(binding, fast_defaults(), ToolTarget::Unreachable, false).await;

        let start = Instant::now();
        let (_, body, _) = chat(
            &server.url("/api/chat/completions"),
            json!({"frames": 4, "delay_ms": 15, "cpu_spin_ms": 10}),
        )
        .await;
        let elapsed = start.elapsed();

        assert_eq!(delta_contents(&sse_payloads(&body)).len(), 4);
        assert!(
            elapsed >= Duration::from_millis(4 * (15 + 10)),
            "{:?} finished in {:?}",
            binding,
            elapsed
        );
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_delays_are_kept_under_concurrent_load() {
    for binding in BINDINGS {
        let server = start_server(binding, fast_defaults(), ToolTarget::Unreachable, false).await;
        let url = server.url("/api/chat/completions");

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let url = url.clone();
                tokio::spawn(async move {
                    let start = Instant::now();
                    let (_, body, _) = chat(&url, json!({"frames": 5, "delay_ms": 20})).await;
                    (start.elapsed(), body)
                })
            })
            .collect();

        for task in tasks {
            let (elapsed, body) = task.await.unwrap();
            assert_eq!(delta_contents(&sse_payloads(&body)).len(), 5);
            assert!(elapsed >= Duration::from_millis(100), "{:?}: {:?}", binding, elapsed);
        }
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_unreachable_fanout_target_does_not_fail_request() {
    let defaults = SimulationDefaults {
        fanout_http: true,
        ..fast_defaults()
    };
    for binding in BINDINGS {
        let server = start_server(binding, defaults.clone(), ToolTarget::Unreachable, false).await;

        let (status, body, _) = chat(
            &server.url("/api/chat/completions"),
            json!({"frames": 4, "fanout": 2, "bytes_per_frame": 2}),
        )
        .await;

        assert_eq!(status, 200);
        let payloads = sse_payloads(&body);
        assert_eq!(delta_contents(&payloads).len(), 4);
        assert_eq!(payloads.last().map(String::as_str), Some("[DONE]"));
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_remote_fanout_hits_own_tool_endpoint() {
    let defaults = SimulationDefaults {
        fanout_http: true,
        ..fast_defaults()
    };
    for binding in BINDINGS {
        let server = start_server(binding, defaults.clone(), ToolTarget::SelfTool, false).await;

        let start = Instant::now();
        let (status, body, _) = chat(
            &server.url("/api/chat/completions"),
            json!({"frames": 1, "fanout": 2, "cpu_spin_ms": 10}),
        )
        .await;

        assert_eq!(status, 200);
        assert_eq!(delta_contents(&sse_payloads(&body)).len(), 1);
        // Two tool spins plus the frame's own spin
        assert!(start.elapsed() >= Duration::from_millis(30));
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_failing_fanout_calls_are_all_attempted() {
    let defaults = SimulationDefaults {
        fanout_http: true,
        ..fast_defaults()
    };
    let tool = RecordingTool::new(ToolBehavior::Fail);
    let server = start_server(
        Binding::Threaded,
        defaults,
        ToolTarget::Custom(tool.clone()),
        false,
    )
    .await;

    let (status, body, _) = chat(
        &server.url("/api/chat/completions"),
        json!({"frames": 2, "fanout": 3}),
    )
    .await;

    assert_eq!(status, 200);
    assert_eq!(delta_contents(&sse_payloads(&body)).len(), 2);
    assert_eq!(tool.calls(), 3);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_fault_mid_stream_ends_with_error_and_done() {
    let defaults = SimulationDefaults {
        fanout_http: true,
        ..fast_defaults()
    };
    for binding in BINDINGS {
        let tool = RecordingTool::new(ToolBehavior::Panic);
        let server = start_server(binding, defaults.clone(), ToolTarget::Custom(tool), false).await;

        let (status, body, _) = chat(
            &server.url("/api/chat/completions"),
            json!({"frames": 3, "fanout": 1}),
        )
        .await;

        assert_eq!(status, 200);
        let payloads = sse_payloads(&body);
        assert_eq!(payloads.len(), 2, "{:?}: {:?}", binding, payloads);
        let error: Value = serde_json::from_str(&payloads[0]).unwrap();
        assert_eq!(error, json!({"error": "tool exploded"}));
        assert_eq!(payloads[1], "[DONE]");
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_unallocatable_frame_ends_with_error_and_done() {
    let server = start_server(
        Binding::Cooperative,
        fast_defaults(),
        ToolTarget::Unreachable,
        false,
    )
    .await;

    let (status, body, _) = chat(
        &server.url("/api/chat/completions"),
        json!({"frames": 2, "bytes_per_frame": i64::MAX}),
    )
    .await;

    assert_eq!(status, 200);
    let payloads = sse_payloads(&body);
    assert_eq!(payloads.len(), 2);
    assert!(payloads[0].starts_with("{\"error\":"));
    assert_eq!(payloads[1], "[DONE]");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_malformed_body_is_rejected_before_streaming() {
    let server = start_server(
        Binding::Cooperative,
        fast_defaults(),
        ToolTarget::Unreachable,
        false,
    )
    .await;
    let client = reqwest::Client::new();

    let response = client
        .post(server.url("/api/chat/completions"))
        .header("content-type", "application/json")
        .body("{frames: 3")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
    let body: Value = response.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("Malformed request body"));

    let (status, body, content_type) = chat(
        &server.url("/api/chat/completions"),
        json!({"frames": "three"}),
    )
    .await;
    assert_eq!(status, 400);
    assert_eq!(content_type.as_deref(), Some("application/json"));
    assert!(body.contains("frames"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_string_and_float_fields_are_coerced() {
    let server = start_server(
        Binding::Cooperative,
        fast_defaults(),
        ToolTarget::Unreachable,
        false,
    )
    .await;

    let (status, body, _) = chat(
        &server.url("/api/chat/completions"),
        json!({"frames": "2", "bytes_per_frame": 4.9}),
    )
    .await;

    assert_eq!(status, 200);
    assert_eq!(delta_contents(&sse_payloads(&body)), vec!["x x ", "x x "]);
}
