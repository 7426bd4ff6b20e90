//! Property tests: how a body is chunked never changes what is deframed.

use bytes::{Bytes, BytesMut};
use grpcwire::deframer::{Deframer, DeframerConfig, DeframerEvent, EventQueue, HEADER_LENGTH};
use grpcwire_testing::{chunk_at, frame};
use proptest::{
    collection::vec,
    prelude::*,
    test_runner::{Config as ProptestConfig, RngAlgorithm, TestRng, TestRunner},
};

fn deterministic_runner(cases: u32) -> TestRunner {
    let config = ProptestConfig {
        cases,
        ..ProptestConfig::default()
    };
    let rng = TestRng::deterministic_rng(RngAlgorithm::ChaCha);
    TestRunner::new_with_rng(config, rng)
}

fn payloads_strategy() -> impl Strategy<Value = Vec<Vec<u8>>> {
    vec(vec(any::<u8>(), 0..64), 0..8)
}

fn encode(payloads: &[Vec<u8>]) -> Bytes {
    let mut wire = BytesMut::new();
    for payload in payloads {
        wire.extend_from_slice(&frame(payload));
    }
    wire.freeze()
}

fn deframe_chunks(chunks: Vec<Bytes>) -> Vec<DeframerEvent> {
    let mut deframer = Deframer::new(EventQueue::new(), None, DeframerConfig::default());
    for chunk in chunks {
        deframer.deframe(chunk);
    }
    deframer.close_when_complete();
    deframer.listener_mut().drain().collect()
}

fn expected_events(payloads: &[Vec<u8>]) -> Vec<DeframerEvent> {
    payloads
        .iter()
        .map(|payload| DeframerEvent::Message(Bytes::copy_from_slice(payload)))
        .chain(std::iter::once(DeframerEvent::Closed {
            has_partial_message: false,
        }))
        .collect()
}

#[test]
fn any_chunking_yields_the_same_messages() {
    let mut runner = deterministic_runner(256);
    let strategy = (payloads_strategy(), vec(any::<prop::sample::Index>(), 0..16));
    runner
        .run(&strategy, |(payloads, cut_indices)| {
            let wire = encode(&payloads);
            let mut cuts: Vec<usize> = cut_indices
                .iter()
                .map(|index| index.index(wire.len() + 1))
                .collect();
            cuts.sort_unstable();

            let events = deframe_chunks(chunk_at(&wire, &cuts));
            prop_assert_eq!(events, expected_events(&payloads));
            Ok(())
        })
        .expect("chunking must not change deframed messages");
}

#[test]
fn byte_at_a_time_matches_single_chunk() {
    let mut runner = deterministic_runner(64);
    runner
        .run(&payloads_strategy(), |payloads| {
            let wire = encode(&payloads);
            let single = deframe_chunks(vec![wire.clone()]);
            let bytewise = deframe_chunks((0..wire.len()).map(|i| wire.slice(i..=i)).collect());
            prop_assert_eq!(&single, &bytewise);
            prop_assert_eq!(single, expected_events(&payloads));
            Ok(())
        })
        .expect("byte-wise delivery must match");
}

#[test]
fn truncation_inside_a_frame_is_reported() {
    let mut runner = deterministic_runner(128);
    let strategy = (vec(any::<u8>(), 0..32), any::<prop::sample::Index>());
    runner
        .run(&strategy, |(payload, cut)| {
            let wire = frame(&payload);
            let end = 1 + cut.index(wire.len() - 1);
            let events = deframe_chunks(vec![wire.slice(..end)]);
            // A cut right after the header leaves nothing in the accumulator.
            prop_assert_eq!(
                events,
                vec![DeframerEvent::Closed {
                    has_partial_message: end != HEADER_LENGTH
                }]
            );
            Ok(())
        })
        .expect("truncation must be detected");
}
