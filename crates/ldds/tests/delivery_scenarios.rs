// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 ldds.dev

//! End-to-end delivery scenarios over the in-memory transport.
//!
//! These drive the whole stack the way an embedding layer would: writers are
//! created through the participant, inbound ACKNACK/NACKFRAG/WLP traffic is
//! injected as serialized RTPS messages through `handle_message`, and the
//! async sender workers run for real.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use ldds::core::types::{
    Guid, GuidPrefix, Locator, SequenceNumber, ENTITYID_PARTICIPANT_MESSAGE_WRITER,
};
use ldds::liveliness::ParticipantMessageData;
use ldds::protocol::rtps::{
    parse_message, AckNackSubmessage, FragmentNumberSet, NackFragSubmessage, SequenceNumberSet,
    Submessage, RTPS_PROTOCOL_VERSION, VENDOR_ID,
};
use ldds::qos::{Durability, LivelinessKind, QosProfile};
use ldds::transport::mem::MemTransport;
use ldds::writer::{MatchResult, PublishMode, ReaderProxyData};
use ldds::{ChangeInput, Error, Participant, ProtocolConfig, WriterListener, WriterOptions};

// ----------------------------------------------------------------------
// Helpers
// ----------------------------------------------------------------------

fn fast_config() -> ProtocolConfig {
    ProtocolConfig::default()
        .with_heartbeat_period(Duration::from_millis(30))
        .with_heartbeat_jitter_pct(0)
        .with_nack_response_delay(Duration::ZERO)
        .with_nack_supression_duration(Duration::ZERO)
}

fn participant(config: ProtocolConfig) -> (Arc<MemTransport>, Arc<Participant>) {
    let transport = Arc::new(MemTransport::new());
    let participant = Participant::new([0xAA; 12], transport.clone(), config);
    (transport, participant)
}

fn reader_guid(id: u8) -> Guid {
    Guid::new([id; 12], [0, 0, 0, 0x07])
}

fn reader_locator(id: u8) -> Locator {
    Locator::udpv4(10, 0, 0, id, 7400)
}

fn reliable_reader(id: u8) -> ReaderProxyData {
    ReaderProxyData::new(reader_guid(id))
        .with_unicast(reader_locator(id))
        .reliable()
}

/// Wrap submessage bytes in an RTPS message header from `prefix`.
fn rtps_message(prefix: GuidPrefix, submessages: &[Vec<u8>]) -> Vec<u8> {
    let mut buf = Vec::new();
    buf.extend_from_slice(b"RTPS");
    buf.extend_from_slice(&RTPS_PROTOCOL_VERSION);
    buf.extend_from_slice(&VENDOR_ID);
    buf.extend_from_slice(&prefix);
    for submessage in submessages {
        buf.extend_from_slice(submessage);
    }
    buf
}

fn data_sns_to(transport: &MemTransport, locator: &Locator) -> Vec<SequenceNumber> {
    transport
        .sent_to(locator)
        .iter()
        .flat_map(|m| parse_message(m).expect("well-formed message").1)
        .filter_map(|s| match s {
            Submessage::Data(d) => Some(d.writer_sn),
            _ => None,
        })
        .collect()
}

fn frag_numbers_to(transport: &MemTransport, locator: &Locator) -> Vec<u32> {
    transport
        .sent_to(locator)
        .iter()
        .flat_map(|m| parse_message(m).expect("well-formed message").1)
        .filter_map(|s| match s {
            Submessage::DataFrag(f) => Some(f.fragment_starting_num),
            _ => None,
        })
        .collect()
}

fn wait_until(pred: impl Fn() -> bool, timeout: Duration) -> bool {
    let start = Instant::now();
    while start.elapsed() < timeout {
        if pred() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(3));
    }
    pred()
}

struct RecordingListener {
    delivered: Mutex<Vec<SequenceNumber>>,
}

impl RecordingListener {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            delivered: Mutex::new(Vec::new()),
        })
    }

    fn delivered(&self) -> Vec<SequenceNumber> {
        self.delivered.lock().expect("listener lock").clone()
    }
}

struct ListenerHandle(Arc<RecordingListener>);

impl WriterListener for ListenerHandle {
    fn on_writer_change_received_by_all(&self, _writer: Guid, sn: SequenceNumber) {
        self.0.delivered.lock().expect("listener lock").push(sn);
    }
}

// ----------------------------------------------------------------------
// S1: best-effort fan-out
// ----------------------------------------------------------------------

#[test]
fn s1_best_effort_fanout_combined() {
    let (transport, participant) = participant(fast_config());
    let writer = participant
        .create_stateless_writer(&QosProfile::best_effort(), WriterOptions::default())
        .expect("writer creation");

    let unicast = Locator::udpv4(10, 0, 0, 1, 7400);
    let multicast = Locator::udpv4(239, 255, 0, 1, 7401);
    writer.matched_reader_add(&ReaderProxyData::new(reader_guid(1)).with_unicast(unicast));
    writer.matched_reader_add(
        &ReaderProxyData::new(reader_guid(2))
            .with_multicast(multicast)
            .with_expects_inline_qos(true),
    );

    for i in 0..3u8 {
        writer
            .write(ChangeInput::data(vec![i; 100]))
            .expect("write");
    }

    // Three DATA submessages, each hitting the deduplicated locator set once
    assert_eq!(data_sns_to(&transport, &unicast), vec![1, 2, 3]);
    assert_eq!(data_sns_to(&transport, &multicast), vec![1, 2, 3]);

    // Combined mode: the shared submessage carries inline QoS because one
    // reader expects it
    let (_, submessages) =
        parse_message(&transport.sent_to(&unicast)[0]).expect("well-formed message");
    let data = submessages
        .iter()
        .find_map(|s| match s {
            Submessage::Data(d) => Some(d),
            _ => None,
        })
        .expect("DATA present");
    assert!(data.inline_qos.is_some());
    participant.shutdown();
}

#[test]
fn s1_best_effort_separate_sending() {
    let (transport, participant) = participant(fast_config());
    let writer = participant
        .create_stateless_writer(
            &QosProfile::best_effort(),
            WriterOptions {
                separate_sending: true,
                ..Default::default()
            },
        )
        .expect("writer creation");

    let plain = reader_locator(1);
    let qosful = reader_locator(2);
    writer.matched_reader_add(&ReaderProxyData::new(reader_guid(1)).with_unicast(plain));
    writer.matched_reader_add(
        &ReaderProxyData::new(reader_guid(2))
            .with_unicast(qosful)
            .with_expects_inline_qos(true),
    );

    writer
        .write(ChangeInput::data(vec![5; 100]))
        .expect("write");

    let inline_of = |locator: &Locator| {
        let (_, submessages) =
            parse_message(&transport.sent_to(locator)[0]).expect("well-formed message");
        submessages.iter().find_map(|s| match s {
            Submessage::Data(d) => Some(d.inline_qos.is_some()),
            _ => None,
        })
    };
    assert_eq!(inline_of(&plain), Some(false));
    assert_eq!(inline_of(&qosful), Some(true));
    participant.shutdown();
}

// ----------------------------------------------------------------------
// S2: reliable recovery
// ----------------------------------------------------------------------

#[test]
fn s2_reliable_recovery() {
    let (transport, participant) = participant(fast_config());
    let writer = participant
        .create_stateful_writer(
            &QosProfile::reliable(),
            WriterOptions {
                publish_mode: PublishMode::Asynchronous,
                ..Default::default()
            },
        )
        .expect("writer creation");
    let listener = RecordingListener::new();
    writer.set_listener(Some(Box::new(ListenerHandle(Arc::clone(&listener)))));
    writer.matched_reader_add(&reliable_reader(1));

    for i in 1..=5u8 {
        writer
            .write(ChangeInput::data(vec![i; 32]))
            .expect("write");
    }
    assert!(wait_until(
        || data_sns_to(&transport, &reader_locator(1)) == vec![1, 2, 3, 4, 5],
        Duration::from_secs(2),
    ));
    transport.take_sent();

    // Reader requests 3 (has 1,2,4,5)
    let nack = AckNackSubmessage {
        reader_id: reader_guid(1).entity_id,
        writer_id: writer.guid().entity_id,
        reader_sn_state: SequenceNumberSet::from_sequences(3, &[3]).expect("within window"),
        count: 1,
        final_flag: false,
    };
    participant
        .handle_message(&rtps_message(reader_guid(1).prefix, &[nack.encode()]))
        .expect("handle ACKNACK");

    assert!(wait_until(
        || data_sns_to(&transport, &reader_locator(1)).contains(&3),
        Duration::from_secs(2),
    ));
    let resent = data_sns_to(&transport, &reader_locator(1));
    assert_eq!(resent, vec![3], "only the requested change travels again");

    // Full acknowledgment: listener fires exactly once per change
    let ack = AckNackSubmessage::ack_up_to(
        reader_guid(1).entity_id,
        writer.guid().entity_id,
        6,
        2,
    );
    participant
        .handle_message(&rtps_message(reader_guid(1).prefix, &[ack.encode()]))
        .expect("handle ACK");

    assert_eq!(listener.delivered(), vec![1, 2, 3, 4, 5]);
    assert!(writer.is_acked_by_all(5));
    participant.shutdown();
}

// ----------------------------------------------------------------------
// S3: fragmentation
// ----------------------------------------------------------------------

#[test]
fn s3_fragment_nack_resends_named_fragments() {
    let (transport, participant) = participant(fast_config());
    let writer = participant
        .create_stateful_writer(
            &QosProfile::reliable(),
            WriterOptions {
                publish_mode: PublishMode::Asynchronous,
                ..Default::default()
            },
        )
        .expect("writer creation");
    writer.matched_reader_add(&reliable_reader(1));

    // 10 KB sample in 1 KB fragments
    writer
        .write(ChangeInput::data(vec![0xAB; 10_240]).with_fragment_size(1024))
        .expect("write");
    assert!(wait_until(
        || frag_numbers_to(&transport, &reader_locator(1)).len() == 10,
        Duration::from_secs(2),
    ));
    assert_eq!(
        frag_numbers_to(&transport, &reader_locator(1)),
        (1..=10).collect::<Vec<u32>>()
    );
    transport.take_sent();

    let nackfrag = NackFragSubmessage {
        reader_id: reader_guid(1).entity_id,
        writer_id: writer.guid().entity_id,
        writer_sn: 1,
        fragment_number_state: FragmentNumberSet::from_fragments(4, &[4, 7])
            .expect("within window"),
        count: 1,
    };
    participant
        .handle_message(&rtps_message(reader_guid(1).prefix, &[nackfrag.encode()]))
        .expect("handle NACKFRAG");

    assert!(wait_until(
        || frag_numbers_to(&transport, &reader_locator(1)).len() >= 2,
        Duration::from_secs(2),
    ));
    assert_eq!(
        frag_numbers_to(&transport, &reader_locator(1)),
        vec![4, 7],
        "fragments other than the requested two must not travel again"
    );
    participant.shutdown();
}

// ----------------------------------------------------------------------
// S4: late joiner with TRANSIENT_LOCAL
// ----------------------------------------------------------------------

#[test]
fn s4_transient_local_late_joiner() {
    let (transport, participant) = participant(fast_config());
    let writer = participant
        .create_stateful_writer(
            &QosProfile::transient_local(),
            WriterOptions {
                publish_mode: PublishMode::Asynchronous,
                ..Default::default()
            },
        )
        .expect("writer creation");

    for i in 1..=10u8 {
        writer
            .write(ChangeInput::data(vec![i; 16]))
            .expect("write");
    }

    let late = ReaderProxyData::new(reader_guid(2))
        .with_unicast(reader_locator(2))
        .reliable()
        .with_durability(Durability::TransientLocal);
    assert_eq!(writer.matched_reader_add(&late), MatchResult::Added);

    // The new proxy is seeded with SN 1..=10 and drained before new data
    writer
        .write(ChangeInput::data(vec![99; 16]))
        .expect("write");
    assert!(wait_until(
        || data_sns_to(&transport, &reader_locator(2)).len() >= 11,
        Duration::from_secs(2),
    ));
    assert_eq!(
        data_sns_to(&transport, &reader_locator(2)),
        (1..=11).collect::<Vec<SequenceNumber>>()
    );
    participant.shutdown();
}

// ----------------------------------------------------------------------
// S5: liveliness loss and recovery
// ----------------------------------------------------------------------

#[test]
fn s5_liveliness_lost_and_recovered() {
    let (_, participant) = participant(fast_config());
    let events: Arc<Mutex<Vec<(Guid, bool)>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    participant.set_remote_liveliness_handler(Box::new(move |guid, alive| {
        sink.lock().expect("event lock").push((guid, alive));
    }));

    let remote = Guid::new([0x44; 12], [0, 0, 0, 0x02]);
    participant.wlp().matched_remote_writer_add(
        remote,
        LivelinessKind::Automatic,
        Duration::from_millis(100),
    );

    // No assertion for 1.5 leases: lost fires
    assert!(wait_until(
        || events.lock().expect("event lock").iter().any(|(_, alive)| !alive),
        Duration::from_secs(2),
    ));

    // A fresh assertion sample restores liveliness
    let sample = ParticipantMessageData::assertion(remote.prefix, LivelinessKind::Automatic)
        .expect("wire kind");
    let data = ldds::protocol::rtps::DataSubmessage {
        reader_id: [0, 0, 0, 0],
        writer_id: ENTITYID_PARTICIPANT_MESSAGE_WRITER,
        writer_sn: 1,
        inline_qos: None,
        payload: sample.encode(),
    };
    participant
        .handle_message(&rtps_message(remote.prefix, &[data.encode()]))
        .expect("handle WLP sample");

    assert_eq!(participant.wlp().remote_writer_alive(remote), Some(true));
    let log = events.lock().expect("event lock").clone();
    let transitions: Vec<bool> = log.iter().map(|(_, alive)| *alive).collect();
    assert_eq!(
        transitions,
        vec![false, true],
        "lost and recovered must alternate strictly"
    );
    participant.shutdown();
}

// ----------------------------------------------------------------------
// S6: blocking timeout
// ----------------------------------------------------------------------

#[test]
fn s6_blocking_timeout_and_heartbeat_repair() {
    let config = fast_config().with_max_blocking_time(Duration::from_millis(50));
    let (transport, participant) = participant(config);
    let writer = participant
        .create_stateful_writer(
            &QosProfile::reliable(),
            WriterOptions {
                publish_mode: PublishMode::Synchronous,
                ..Default::default()
            },
        )
        .expect("writer creation");
    writer.matched_reader_add(&reliable_reader(1));

    transport.stall(Duration::from_secs(10));
    let start = Instant::now();
    let err = writer
        .write(ChangeInput::data(vec![1; 8]))
        .expect_err("stalled transport must time out");
    assert!(matches!(err, Error::WriteTimeout));
    assert!(
        start.elapsed() <= Duration::from_millis(300),
        "call must return promptly after max_blocking_time"
    );

    // Transport recovers; the heartbeat-armed async pass repairs the send
    transport.unstall();
    assert!(wait_until(
        || data_sns_to(&transport, &reader_locator(1)) == vec![1],
        Duration::from_secs(2),
    ));
    participant.shutdown();
}

// ----------------------------------------------------------------------
// Participant plumbing
// ----------------------------------------------------------------------

#[test]
fn qos_engine_mismatch_is_rejected() {
    let (_, participant) = participant(fast_config());
    assert!(matches!(
        participant.create_stateless_writer(&QosProfile::reliable(), WriterOptions::default()),
        Err(Error::InvalidQos(_))
    ));
    assert!(matches!(
        participant.create_stateful_writer(&QosProfile::best_effort(), WriterOptions::default()),
        Err(Error::InvalidQos(_))
    ));
    participant.shutdown();
}

#[test]
fn delete_writer_stops_callbacks() {
    let (_, participant) = participant(fast_config());
    let writer = participant
        .create_stateful_writer(
            &QosProfile::reliable(),
            WriterOptions {
                publish_mode: PublishMode::Asynchronous,
                ..Default::default()
            },
        )
        .expect("writer creation");
    let guid = writer.guid();

    assert!(participant.delete_writer(guid));
    assert!(!participant.delete_writer(guid));
    participant.shutdown();
}

#[test]
fn acknack_for_unknown_writer_is_ignored() {
    let (_, participant) = participant(fast_config());
    let nack = AckNackSubmessage::ack_up_to([0, 0, 0, 0x07], [9, 9, 9, 0x02], 1, 1);
    participant
        .handle_message(&rtps_message([7; 12], &[nack.encode()]))
        .expect("unknown writers are skipped, not errors");
    participant.shutdown();
}

#[test]
fn writes_spread_across_many_writers_keep_per_writer_order() {
    // A few asynchronous writers sharing one worker: per-writer SN order
    // must hold even under interleaved wakes.
    let (transport, participant) = participant(fast_config());
    let mut writers = Vec::new();
    for w in 0..3u8 {
        let writer = participant
            .create_stateful_writer(
                &QosProfile::reliable(),
                WriterOptions {
                    publish_mode: PublishMode::Asynchronous,
                    ..Default::default()
                },
            )
            .expect("writer creation");
        writer.matched_reader_add(
            &ReaderProxyData::new(reader_guid(w + 1))
                .with_unicast(reader_locator(w + 1))
                .reliable(),
        );
        writers.push(writer);
    }

    let payload_sizes = [64usize, 128, 256];
    for round in 0..5u8 {
        for (idx, writer) in writers.iter().enumerate() {
            let size = payload_sizes[usize::from(round) % payload_sizes.len()] + idx;
            writer
                .write(ChangeInput::data(vec![round; size]))
                .expect("write");
        }
    }

    for w in 0..3u8 {
        let locator = reader_locator(w + 1);
        assert!(wait_until(
            || data_sns_to(&transport, &locator).len() >= 5,
            Duration::from_secs(2),
        ));
        let sns = data_sns_to(&transport, &locator);
        assert_eq!(sns, (1..=5).collect::<Vec<SequenceNumber>>());
    }
    participant.shutdown();
}
