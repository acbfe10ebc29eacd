//! Streaming relay behavior under arbitrary chunking
//!
//! The transport may split an SSE body anywhere, including inside a `data:`
//! line, and servers may or may not put blank lines between fragments.
//! Whatever the split and framing, deltas must reach the callback in order
//! and concatenate to the returned response.

use futures::StreamExt;
use futures::stream;
use hybridroute::error::{CompletionError, TransportError};
use hybridroute::shared::completions::relay_stream;
use hybridroute::shared::{ChunkStream, DeltaCallback};
use proptest::prelude::*;
use proptest::sample::Index;
use proptest::test_runner::Config;
use serde_json::json;
use std::sync::{Arc, Mutex};

fn fragment(content: &str) -> String {
    json!({"choices": [{"delta": {"content": content}}]}).to_string()
}

fn sse_body(deltas: &[String]) -> String {
    let mut body = String::new();
    for delta in deltas {
        body.push_str(&format!("data: {}\n\n", fragment(delta)));
    }
    body.push_str("data: [DONE]\n\n");
    body
}

/// One `data:` line per fragment with no blank-line separators
fn line_framed_body(deltas: &[String]) -> String {
    let mut body = String::new();
    for delta in deltas {
        body.push_str(&format!("data: {}\n", fragment(delta)));
    }
    body.push_str("data: [DONE]\n");
    body
}

/// Split `body` at the given cut points
fn chunked(body: &str, cuts: &[Index]) -> ChunkStream {
    let bytes = body.as_bytes();
    let mut positions: Vec<usize> = cuts.iter().map(|i| i.index(bytes.len())).collect();
    positions.push(bytes.len());
    positions.sort_unstable();
    positions.dedup();

    let mut chunks: Vec<Result<Vec<u8>, TransportError>> = Vec::with_capacity(positions.len());
    let mut start = 0;
    for end in positions {
        if end > start {
            chunks.push(Ok(bytes[start..end].to_vec()));
            start = end;
        }
    }
    stream::iter(chunks).boxed()
}

fn collector() -> (Arc<Mutex<Vec<String>>>, Box<DeltaCallback>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let on_delta: Box<DeltaCallback> =
        Box::new(move |d: &str| sink.lock().unwrap().push(d.to_string()));
    (seen, on_delta)
}

proptest! {
    #![proptest_config(Config::with_cases(128))]

    #[test]
    fn deltas_survive_arbitrary_chunking(
        deltas in prop::collection::vec("[a-zA-Z0-9 .,!?:]{1,12}", 0..16),
        cuts in prop::collection::vec(any::<Index>(), 0..24),
    ) {
        let body = sse_body(&deltas);
        let (seen, on_delta) = collector();

        let response = tokio_test::block_on(relay_stream(
            chunked(&body, &cuts),
            Some(on_delta.as_ref()),
        ))
        .expect("relay should succeed");

        prop_assert_eq!(&response, &deltas.concat());
        prop_assert_eq!(&*seen.lock().unwrap(), &deltas);
    }

    #[test]
    fn line_framed_deltas_survive_arbitrary_chunking(
        deltas in prop::collection::vec("[a-zA-Z0-9 .,!?:]{1,12}", 0..16),
        cuts in prop::collection::vec(any::<Index>(), 0..24),
    ) {
        let body = line_framed_body(&deltas);
        let (seen, on_delta) = collector();

        let response = tokio_test::block_on(relay_stream(
            chunked(&body, &cuts),
            Some(on_delta.as_ref()),
        ))
        .expect("relay should succeed");

        prop_assert_eq!(&response, &deltas.concat());
        prop_assert_eq!(&*seen.lock().unwrap(), &deltas);
    }

    #[test]
    fn nothing_after_done_is_relayed(
        before in prop::collection::vec("[a-z]{1,6}", 1..6),
        after in "[a-z]{1,6}",
    ) {
        let mut body = sse_body(&before);
        body.push_str(&format!("data: {}\n\n", fragment(&after)));

        let response = tokio_test::block_on(relay_stream(chunked(&body, &[]), None))
            .expect("relay should succeed");

        prop_assert_eq!(response, before.concat());
    }
}

#[tokio::test]
async fn test_transport_error_mid_stream_is_interruption() {
    let first = format!(
        "data: {}\n\n",
        json!({"choices": [{"delta": {"content": "partial"}}]})
    );
    let chunks: ChunkStream = stream::iter(vec![
        Ok(first.into_bytes()),
        Err(TransportError::Stream {
            url: "http://tier/v1/chat/completions".to_string(),
            reason: "connection reset".to_string(),
        }),
    ])
    .boxed();
    let (seen, on_delta) = collector();

    let err = relay_stream(chunks, Some(on_delta.as_ref()))
        .await
        .unwrap_err();

    match err {
        CompletionError::StreamInterrupted {
            bytes_received,
            deltas_received,
            source,
        } => {
            assert_eq!(bytes_received, "partial".len());
            assert_eq!(deltas_received, 1);
            assert!(matches!(source, TransportError::Stream { .. }));
        }
        other => panic!("expected interruption, got {other:?}"),
    }
    assert_eq!(*seen.lock().unwrap(), vec!["partial"]);
}

#[tokio::test]
async fn test_stream_without_done_returns_accumulated_text() {
    let body = format!(
        "data: {}\n\ndata: {}\n\n",
        json!({"choices": [{"delta": {"content": "no "}}]}),
        json!({"choices": [{"delta": {"role": "assistant", "content": "sentinel"}}]})
    );

    let response = relay_stream(chunked(&body, &[]), None).await.unwrap();

    assert_eq!(response, "no sentinel");
}

#[tokio::test]
async fn test_empty_and_missing_deltas_are_skipped() {
    let body = format!(
        "data: {}\n\ndata: {}\n\ndata: {}\n\ndata: [DONE]\n\n",
        json!({"choices": [{"delta": {"role": "assistant"}}]}),
        json!({"choices": [{"delta": {"content": ""}}]}),
        json!({"choices": [{"delta": {"content": "only"}}]})
    );
    let (seen, on_delta) = collector();

    let response = relay_stream(chunked(&body, &[]), Some(on_delta.as_ref()))
        .await
        .unwrap();

    assert_eq!(response, "only");
    assert_eq!(*seen.lock().unwrap(), vec!["only"]);
}

#[tokio::test]
async fn test_malformed_line_does_not_hide_its_neighbours() {
    let body = format!(
        "data: {}\ndata: {{oops\ndata: {}\n\ndata: [DONE]\n\n",
        fragment("a"),
        fragment("b")
    );
    let (seen, on_delta) = collector();

    let response = relay_stream(chunked(&body, &[]), Some(on_delta.as_ref()))
        .await
        .unwrap();

    assert_eq!(response, "ab");
    assert_eq!(*seen.lock().unwrap(), vec!["a", "b"]);
}

#[tokio::test]
async fn test_final_event_without_blank_line_is_relayed() {
    let body = format!("data: {}\n\ndata: {}\n", fragment("a"), fragment("b"));

    let response = relay_stream(chunked(&body, &[]), None).await.unwrap();

    assert_eq!(response, "ab");
}

#[tokio::test]
async fn test_final_line_without_newline_is_relayed() {
    let body = format!("data: {}\n\ndata: {}", fragment("a"), fragment("b"));

    let response = relay_stream(chunked(&body, &[]), None).await.unwrap();

    assert_eq!(response, "ab");
}
