//! Integration tests for the async reconstruction pipeline.
//!
//! Drives `reconstruct` over in-memory and channel-backed chunk streams:
//! windowing, error termination, cancellation and independent completions.

#![cfg(feature = "streaming")]


use std::io;
use std::time::Duration;

use completion_stream::{
    collect_units, reconstruct, reconstruct_with_cancel, FinishReason, RawChunk,
    ReconstructedUnit, ReconstructionConfig, StreamError, ToolCallFragment,
};
use futures_util::stream::{self, BoxStream, FusedStream};
use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

type Upstream = BoxStream<'static, Result<RawChunk, io::Error>>;

fn ok_stream(chunks: Vec<RawChunk>) -> Upstream {
    stream::iter(chunks.into_iter().map(Ok)).boxed()
}

/// Upstream fed by a channel; the sender sees `is_closed()` once it is dropped.
fn channel_stream() -> (mpsc::Sender<Result<RawChunk, io::Error>>, Upstream) {
    let (tx, rx) = mpsc::channel(8);
    let upstream = stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|item| (item, rx))
    })
    .boxed();
    (tx, upstream)
}

fn open_call(id: &str, name: &str, args: &str) -> RawChunk {
    RawChunk::default().with_tool_call(
        ToolCallFragment::new(0)
            .with_id(id)
            .with_type("function")
            .with_function_name(name)
            .with_arguments(args),
    )
}

fn args(fragment: &str) -> RawChunk {
    RawChunk::default().with_tool_call(ToolCallFragment::new(0).with_arguments(fragment))
}

#[tokio::test]
async fn text_chunks_are_emitted_one_unit_each() {
    let units = collect_units(
        ok_stream(vec![
            RawChunk::text("Hel").with_role("assistant").with_id("cmpl-1"),
            RawChunk::text("lo"),
            RawChunk::text(" world"),
            RawChunk::text("").with_finish_reason("stop"),
        ]),
        ReconstructionConfig::default(),
    )
    .await
    .unwrap();

    assert_eq!(units.len(), 4);
    assert_eq!(units[0].content, "Hel");
    assert_eq!(units[0].id.as_deref(), Some("cmpl-1"));
    assert_eq!(units[3].content, "");
    assert_eq!(units[3].finish_reason, Some(FinishReason::Stop));
}

#[tokio::test]
async fn tool_call_window_is_emitted_once_complete() {
    let units = collect_units(
        ok_stream(vec![
            RawChunk::text("Checking").with_role("assistant"),
            open_call("call_1", "getWeather", "{\"ci"),
            args("ty\":\"Pa"),
            args("ris\""),
            args("}").with_finish_reason("tool_calls"),
        ]),
        ReconstructionConfig::default(),
    )
    .await
    .unwrap();

    assert_eq!(units.len(), 2);
    let call = &units[1].tool_calls[0];
    assert_eq!(call.id, "call_1");
    assert_eq!(call.function.name, "getWeather");
    assert_eq!(call.function.arguments, "{\"city\":\"Paris\"}");
    assert_eq!(call.parse_arguments().unwrap()["city"], "Paris");
}

#[tokio::test]
async fn tool_call_is_not_emitted_before_window_closes() {
    let (tx, upstream) = channel_stream();
    let mut units = reconstruct(upstream, ReconstructionConfig::default());

    tx.send(Ok(open_call("call_1", "f", "{\"x\":"))).await.unwrap();
    tx.send(Ok(args("1"))).await.unwrap();

    let early = tokio::time::timeout(Duration::from_millis(50), units.next()).await;
    assert!(early.is_err(), "no unit may be emitted while the window is open");

    tx.send(Ok(args("}").with_finish_reason("tool_calls"))).await.unwrap();
    let unit = units.next().await.expect("unit").unwrap();
    assert_eq!(unit.tool_calls[0].function.arguments, "{\"x\":1}");

    drop(tx);
    assert!(units.next().await.is_none());
}

#[tokio::test]
async fn open_window_at_end_of_stream_is_an_error() {
    let mut units = reconstruct(
        ok_stream(vec![open_call("call_1", "f", "{"), args("\"a\":")]),
        ReconstructionConfig::default(),
    );

    match units.next().await {
        Some(Err(StreamError::IncompleteStream { open_indices })) => {
            assert_eq!(open_indices, vec![0]);
        }
        other => panic!("expected IncompleteStream, got {other:?}"),
    }
    assert!(units.next().await.is_none());
}

#[tokio::test]
async fn malformed_fragment_terminates_stream() {
    let mut units = reconstruct(
        ok_stream(vec![
            open_call("call_1", "f", "{"),
            RawChunk::default().with_tool_call(ToolCallFragment::new(4).with_arguments("}")),
            RawChunk::text("never seen"),
        ]),
        ReconstructionConfig::default(),
    );

    let err = units.next().await.unwrap().unwrap_err();
    assert!(matches!(err, StreamError::MalformedFragment { index: 4, .. }));
    assert!(units.next().await.is_none());
}

#[tokio::test]
async fn transport_error_is_surfaced_as_is() {
    let upstream = stream::iter(vec![
        Ok(RawChunk::text("partial")),
        Err(io::Error::new(io::ErrorKind::ConnectionReset, "reset by peer")),
        Ok(RawChunk::text("never seen")),
    ])
    .boxed();
    let mut units = reconstruct(upstream, ReconstructionConfig::default());

    assert_eq!(units.next().await.unwrap().unwrap().content, "partial");

    let err = units.next().await.unwrap().unwrap_err();
    assert!(err.is_transport());
    match err {
        StreamError::Transport(source) => {
            let io = source.downcast_ref::<io::Error>().expect("io error kept");
            assert_eq!(io.kind(), io::ErrorKind::ConnectionReset);
        }
        other => panic!("expected Transport, got {other:?}"),
    }
    assert!(units.next().await.is_none());
}

#[tokio::test]
async fn cancellation_does_not_wait_for_stalled_upstream() {
    let upstream = stream::iter(vec![Ok::<_, io::Error>(RawChunk::text("first"))])
        .chain(stream::pending())
        .boxed();
    let mut units = reconstruct(upstream, ReconstructionConfig::default());
    let handle = units.cancel_handle();

    assert_eq!(units.next().await.unwrap().unwrap().content, "first");

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        handle.cancel();
    });

    let next = tokio::time::timeout(Duration::from_secs(2), units.next())
        .await
        .expect("cancellation must not hang on a stalled upstream");
    assert!(next.is_none());
    assert!(units.is_cancelled());
}

#[tokio::test]
async fn cancellation_mid_window_releases_upstream_without_error() {
    let (tx, upstream) = channel_stream();
    let mut units = reconstruct(upstream, ReconstructionConfig::default());

    tx.send(Ok(open_call("call_1", "f", "{"))).await.unwrap();
    tx.send(Ok(args("\"partial"))).await.unwrap();
    units.cancel();

    assert!(tx.is_closed(), "upstream must be dropped on cancellation");
    assert!(units.next().await.is_none());
    assert!(tx.send(Ok(args("\"}"))).await.is_err());
}

#[tokio::test]
async fn cancel_releases_upstream_without_another_poll() {
    let (tx, upstream) = channel_stream();
    let mut units = reconstruct(upstream, ReconstructionConfig::default());

    tx.send(Ok(RawChunk::text("a"))).await.unwrap();
    assert_eq!(units.next().await.unwrap().unwrap().content, "a");
    tx.send(Ok(open_call("call_1", "f", "{"))).await.unwrap();
    assert!(!tx.is_closed());

    units.cancel();
    assert!(tx.is_closed());
    assert!(units.is_cancelled());
}

#[tokio::test]
async fn polling_after_normal_end_keeps_returning_none() {
    let mut units = reconstruct(
        ok_stream(vec![RawChunk::text("only").with_finish_reason("stop")]),
        ReconstructionConfig::default(),
    );

    assert_eq!(units.next().await.unwrap().unwrap().content, "only");
    assert!(units.next().await.is_none());
    assert!(units.is_terminated());
    assert!(units.next().await.is_none());
    assert!(units.next().await.is_none());
}

#[tokio::test]
async fn polling_after_error_keeps_returning_none() {
    let mut units = reconstruct(
        ok_stream(vec![open_call("call_1", "f", "{")]),
        ReconstructionConfig::default(),
    );

    assert!(units.next().await.unwrap().is_err());
    assert!(units.next().await.is_none());
    assert!(units.next().await.is_none());
    assert!(units.is_terminated());
}

#[tokio::test]
async fn polling_after_cancel_keeps_returning_none() {
    let (tx, upstream) = channel_stream();
    let mut units = reconstruct(upstream, ReconstructionConfig::default());
    let handle = units.cancel_handle();

    tx.send(Ok(RawChunk::text("a"))).await.unwrap();
    handle.cancel();

    assert!(units.next().await.is_none());
    assert!(tx.is_closed());
    assert!(units.next().await.is_none());
    assert!(units.is_terminated());
}

#[tokio::test]
async fn shared_token_cancels_from_transport_side() {
    let token = CancellationToken::new();
    let (tx, upstream) = channel_stream();
    let mut units =
        reconstruct_with_cancel(upstream, ReconstructionConfig::default(), token.child_token());

    tx.send(Ok(RawChunk::text("a"))).await.unwrap();
    assert_eq!(units.next().await.unwrap().unwrap().content, "a");

    token.cancel();
    assert!(units.next().await.is_none());
    assert!(units.is_cancelled());
}

#[tokio::test]
async fn dropping_the_stream_drops_the_upstream() {
    let (tx, upstream) = channel_stream();
    let units = reconstruct(upstream, ReconstructionConfig::default());
    assert!(!tx.is_closed());

    drop(units);
    assert!(tx.is_closed());
}

#[tokio::test]
async fn concurrent_completions_are_independent() {
    async fn completion(id: &'static str, fragments: Vec<&'static str>) -> Vec<ReconstructedUnit> {
        let mut chunks = vec![open_call(id, "f", fragments[0])];
        for (i, fragment) in fragments.iter().enumerate().skip(1) {
            let chunk = args(fragment);
            chunks.push(if i == fragments.len() - 1 {
                chunk.with_finish_reason("tool_calls")
            } else {
                chunk
            });
        }
        collect_units(ok_stream(chunks), ReconstructionConfig::default())
            .await
            .unwrap()
    }

    let a = tokio::spawn(completion("call_a", vec!["{\"a\":", "1", "}"]));
    let b = tokio::spawn(completion("call_b", vec!["{\"b\":", "\"two\"", "}"]));
    let (a, b) = (a.await.unwrap(), b.await.unwrap());

    assert_eq!(a[0].tool_calls[0].id, "call_a");
    assert_eq!(a[0].tool_calls[0].function.arguments, "{\"a\":1}");
    assert_eq!(b[0].tool_calls[0].id, "call_b");
    assert_eq!(b[0].tool_calls[0].function.arguments, "{\"b\":\"two\"}");
}

#[tokio::test]
async fn argument_cap_from_config_terminates_stream() {
    let config = ReconstructionConfig::default().with_max_argument_bytes(6);
    let err = collect_units(
        ok_stream(vec![
            open_call("call_1", "f", "{\"a\":"),
            args("\"too long\"}").with_finish_reason("tool_calls"),
        ]),
        config,
    )
    .await
    .unwrap_err();
    assert!(matches!(err, StreamError::ArgumentsTooLarge { index: 0, limit: 6 }));
}
