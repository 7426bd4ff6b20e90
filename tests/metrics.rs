#![cfg(feature = "metrics")]
//! Tests for `grpcwire` metrics helpers.
//!
//! These tests verify that counters and gauges update as expected using
//! `metrics_util::debugging::DebuggingRecorder`.
use bytes::Bytes;
use grpcwire::{
    deframer::{Deframer, DeframerConfig, EventQueue},
    dispatcher::Dispatcher,
    metrics,
    registry::MethodRegistry,
};
use grpcwire_testing::{TestRequest, frame};
use metrics_util::debugging::{DebugValue, DebuggingRecorder, Snapshotter};
use rstest::rstest;

/// Creates a debugging recorder and snapshotter for metrics testing.
fn debugging_recorder_setup() -> (Snapshotter, DebuggingRecorder) {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    (snapshotter, recorder)
}

fn counter_with_label(snapshotter: &Snapshotter, name: &str, label: (&str, &str)) -> Option<u64> {
    snapshotter
        .snapshot()
        .into_vec()
        .into_iter()
        .find_map(|(key, _, _, value)| {
            let key = key.key();
            let labelled = key
                .labels()
                .any(|l| l.key() == label.0 && l.value() == label.1);
            match value {
                DebugValue::Counter(count) if key.name() == name && labelled => Some(count),
                _ => None,
            }
        })
}

#[rstest]
#[case(metrics::Direction::Inbound, "inbound")]
#[case(metrics::Direction::Outbound, "outbound")]
fn message_metric_is_labelled_by_direction(
    #[case] direction: metrics::Direction,
    #[case] label: &str,
) {
    let (snapshotter, recorder) = debugging_recorder_setup();
    ::metrics::with_local_recorder(&recorder, || metrics::inc_messages(direction));

    assert_eq!(
        counter_with_label(&snapshotter, metrics::MESSAGES_TOTAL, ("direction", label)),
        Some(1)
    );
}

#[test]
fn deframing_counts_messages_and_failures() {
    let (snapshotter, recorder) = debugging_recorder_setup();
    ::metrics::with_local_recorder(&recorder, || {
        let config = DeframerConfig {
            max_inbound_message_size: 4,
            ..DeframerConfig::default()
        };
        let mut deframer = Deframer::new(EventQueue::new(), None, config);
        deframer.deframe(frame(b"ok"));
        deframer.deframe(frame(b"far too long"));
    });

    assert_eq!(
        counter_with_label(&snapshotter, metrics::MESSAGES_TOTAL, ("direction", "inbound")),
        Some(1)
    );
    assert_eq!(
        counter_with_label(
            &snapshotter,
            metrics::DEFRAME_ERRORS,
            ("code", "RESOURCE_EXHAUSTED")
        ),
        Some(1)
    );
}

#[tokio::test]
async fn rejected_request_is_counted_by_reason() {
    let (snapshotter, recorder) = debugging_recorder_setup();
    let dispatcher = Dispatcher::new(MethodRegistry::new());
    let (request, _responses) = TestRequest::grpc("/missing.Service/Call")
        .last(Bytes::new())
        .build();

    let result = ::metrics::with_local_recorder(&recorder, || dispatcher.dispatch(request));

    assert!(result.is_err());
    assert_eq!(
        counter_with_label(
            &snapshotter,
            metrics::REQUESTS_REJECTED,
            ("reason", "method_not_found")
        ),
        Some(1)
    );
}

#[rstest]
#[case(1)]
#[case(2)]
fn inc_call_panics_counts(#[case] expected: u64) {
    // Arrange
    let (snapshotter, recorder) = debugging_recorder_setup();

    // Act
    ::metrics::with_local_recorder(&recorder, || {
        (0..expected).for_each(|_| metrics::inc_call_panics());
    });

    // Assert
    assert_counter_eq(&snapshotter, metrics::CALL_PANICS, expected);
}

#[test]
fn call_gauge_rises_and_falls() {
    let (snapshotter, recorder) = debugging_recorder_setup();
    ::metrics::with_local_recorder(&recorder, || {
        metrics::inc_calls();
        metrics::inc_calls();
        metrics::dec_calls();
    });

    assert_counter_eq(&snapshotter, metrics::CALLS_STARTED, 2);
    let snapshot = snapshotter.snapshot().into_vec();
    assert!(
        snapshot.iter().any(|(key, _, _, value)| {
            key.key().name() == metrics::CALLS_ACTIVE
                && matches!(value, DebugValue::Gauge(g) if (g.into_inner() - 1.0).abs() < f64::EPSILON)
        }),
        "expected {} == 1, got {snapshot:#?}",
        metrics::CALLS_ACTIVE
    );
}

fn assert_counter_eq(snapshotter: &Snapshotter, name: &str, expected: u64) {
    let snapshot = snapshotter.snapshot().into_vec();
    assert!(
        snapshot.iter().any(|(key, _, _, value)| {
            key.key().name() == name && matches!(value, DebugValue::Counter(c) if *c == expected)
        }),
        "expected {name} == {expected}, got {snapshot:#?}"
    );
}
