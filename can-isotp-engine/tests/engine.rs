use std::time::Duration;

use can_frame_io::{BusFrame, Direction};
use can_frame_mock::{MockBus, MockClock};
use can_isotp_engine::{
    AddressingMode, EngineConfig, EngineError, IsoTpEngine, IsoTpMessage, TxPhase,
};
use embedded_can::Frame as _;

fn engine_with(
    channels: usize,
    cfg: EngineConfig,
) -> (IsoTpEngine<MockBus, MockClock>, MockClock) {
    let clock = MockClock::new();
    let mut engine = IsoTpEngine::new(MockBus::new(channels), cfg, clock.clone());
    engine.set_accept_all(true);
    (engine, clock)
}

fn engine(channels: usize) -> (IsoTpEngine<MockBus, MockClock>, MockClock) {
    engine_with(channels, EngineConfig::default())
}

fn rx(channel: u8, id: u32, data: &[u8]) -> BusFrame {
    BusFrame::received(channel, id, false, data, 0).unwrap()
}

fn deliver_all(
    engine: &mut IsoTpEngine<MockBus, MockClock>,
    frames: &[BusFrame],
) -> Vec<IsoTpMessage> {
    let mut out = Vec::new();
    engine
        .process_frames(frames, &mut |msg| out.push(msg))
        .unwrap();
    out
}

#[test]
fn short_payload_goes_out_as_padded_single_frame() {
    let (mut engine, _clock) = engine(1);
    engine.send_message(0, 0x7E0, &[0xAA, 0xBB, 0xCC]).unwrap();

    let sent = engine.link_mut().take_sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].channel(), 0);
    assert_eq!(sent[0].raw_id(), 0x7E0);
    assert_eq!(sent[0].data(), &[0x03, 0xAA, 0xBB, 0xCC, 0, 0, 0, 0]);
    assert_eq!(engine.channel(0).unwrap().phase(), TxPhase::Idle);
}

#[test]
fn twenty_byte_send_produces_first_frame_and_two_continuations() {
    let (mut engine, clock) = engine(1);
    let payload: Vec<u8> = (0..20u8).collect();
    engine.send_message(0, 0x200, &payload).unwrap();

    // First Frame goes out immediately: 0x11 = FF | (20 >> 8), 0x14 = 20.
    let sent = engine.link_mut().take_sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].data(), &[0x11, 0x14, 0, 1, 2, 3, 4, 5]);
    assert_eq!(engine.channel(0).unwrap().phase(), TxPhase::WaitingForFlow);
    assert_eq!(engine.channel(0).unwrap().queued(), 2);

    // Idealized immediate ClearToSend with no block limit and no gap.
    deliver_all(&mut engine, &[rx(0, 0x7E8, &[0x30, 0x00, 0x00, 0, 0, 0, 0, 0])]);
    assert_eq!(engine.channel(0).unwrap().phase(), TxPhase::Draining);

    engine.tick().unwrap();
    engine.tick().unwrap();
    let cfs = engine.link_mut().take_sent();
    assert_eq!(cfs.len(), 2);
    assert_eq!(cfs[0].data(), &[0x21, 6, 7, 8, 9, 10, 11, 12]);
    assert_eq!(cfs[1].data(), &[0x22, 13, 14, 15, 16, 17, 18, 19]);

    // One more tick notices the drained queue and idles the channel.
    clock.advance(Duration::from_millis(1));
    engine.tick().unwrap();
    assert_eq!(engine.channel(0).unwrap().phase(), TxPhase::Idle);
    assert_eq!(engine.link_mut().take_sent(), vec![]);
}

#[test]
fn single_frames_are_stateless_and_never_deduplicated() {
    let (mut engine, _clock) = engine(1);
    let frame = rx(0, 0x7E8, &[0x02, 0x10, 0x03, 0, 0, 0, 0, 0]);
    let msgs = deliver_all(&mut engine, &[frame, frame]);
    assert_eq!(msgs.len(), 2);
    assert_eq!(msgs[0], msgs[1]);
    assert_eq!(msgs[0].data, vec![0x10, 0x03]);
    assert_eq!(msgs[0].declared_len, 2);
    assert_eq!(msgs[0].direction, Direction::Received);
}

#[test]
fn multi_frame_reassembly_completes_in_arrival_order() {
    let (mut engine, _clock) = engine(1);
    let payload: Vec<u8> = (100..120u8).collect();

    let mut frames = Vec::new();
    frames.push(rx(0, 0x7E8, &[0x10, 20, payload[0], payload[1], payload[2], payload[3], payload[4], payload[5]]));
    let mut cf1 = vec![0x21];
    cf1.extend_from_slice(&payload[6..13]);
    frames.push(rx(0, 0x7E8, &cf1));
    let mut cf2 = vec![0x22];
    cf2.extend_from_slice(&payload[13..20]);
    frames.push(rx(0, 0x7E8, &cf2));

    let msgs = deliver_all(&mut engine, &frames);
    assert_eq!(msgs.len(), 1);
    assert_eq!(msgs[0].id, 0x7E8);
    assert_eq!(msgs[0].declared_len, 20);
    assert_eq!(msgs[0].data, payload);
    assert_eq!(engine.pending_reassemblies(), 0);
}

#[test]
fn first_frame_collision_discards_stale_partial_without_event() {
    let (mut engine, _clock) = engine(1);
    // Declares the maximum length but only ever delivers 6 bytes.
    let ff = rx(0, 0x7E8, &[0x1F, 0xFF, 1, 2, 3, 4, 5, 6]);
    assert!(deliver_all(&mut engine, &[ff]).is_empty());
    assert_eq!(engine.pending_reassemblies(), 1);

    // A second First Frame under the same key silently replaces it.
    let msgs = deliver_all(&mut engine, &[rx(0, 0x7E8, &[0x10, 20, 9, 9, 9, 9, 9, 9])]);
    assert!(msgs.is_empty());
    assert_eq!(engine.pending_reassemblies(), 1);
}

#[test]
fn orphan_consecutive_frames_are_dropped() {
    let (mut engine, _clock) = engine(1);
    let msgs = deliver_all(&mut engine, &[rx(0, 0x7E8, &[0x21, 1, 2, 3, 4, 5, 6, 7])]);
    assert!(msgs.is_empty());
    assert_eq!(engine.pending_reassemblies(), 0);
}

#[test]
fn filter_table_gates_inbound_frames() {
    let (mut engine, _clock) = engine(2);
    engine.set_accept_all(false);
    engine.add_filter(0, 0x7E8, 0x7FF);

    let hit = rx(0, 0x7E8, &[0x01, 0x55, 0, 0, 0, 0, 0, 0]);
    let wrong_id = rx(0, 0x7E9, &[0x01, 0x55, 0, 0, 0, 0, 0, 0]);
    let wrong_channel = rx(1, 0x7E8, &[0x01, 0x55, 0, 0, 0, 0, 0, 0]);
    assert_eq!(deliver_all(&mut engine, &[hit, wrong_id, wrong_channel]).len(), 1);

    engine.remove_filter(0, 0x7E8, 0x7FF);
    assert!(deliver_all(&mut engine, &[hit]).is_empty());

    engine.add_filter(0, 0, 0); // mask 0 matches any id on channel 0
    assert_eq!(deliver_all(&mut engine, &[hit, wrong_id]).len(), 2);
    engine.clear_filters();
    assert!(deliver_all(&mut engine, &[hit]).is_empty());
}

#[test]
fn auto_flow_control_replies_to_last_originator() {
    let (mut engine, _clock) = engine(2);
    engine.set_flow_control_issuance(true);

    // No originator recorded yet: a First Frame produces no reply.
    deliver_all(&mut engine, &[rx(0, 0x7E8, &[0x10, 20, 1, 2, 3, 4, 5, 6])]);
    assert_eq!(engine.link_mut().take_sent(), vec![]);

    // Sending establishes the originator (channel 1, id 0x7E0).
    engine.send_message(1, 0x7E0, &[0x22]).unwrap();
    engine.link_mut().take_sent();

    deliver_all(&mut engine, &[rx(0, 0x7E8, &[0x10, 20, 1, 2, 3, 4, 5, 6])]);
    let sent = engine.link_mut().take_sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].channel(), 1);
    assert_eq!(sent[0].raw_id(), 0x7E0);
    // ClearToSend, no block limit, 3 ms separation.
    assert_eq!(sent[0].data(), &[0x30, 0x00, 0x03, 0, 0, 0, 0, 0]);
}

#[test]
fn outbound_errors_are_explicit() {
    let (mut engine, _clock) = engine(2);
    assert!(matches!(
        engine.send_message(2, 0x100, &[0]),
        Err(EngineError::UnknownChannel)
    ));
    assert!(matches!(
        engine.send_message(0, 0x100, &vec![0u8; 4096]),
        Err(EngineError::PayloadTooLarge)
    ));

    let payload: Vec<u8> = (0..20u8).collect();
    engine.send_message(0, 0x100, &payload).unwrap();
    assert!(matches!(
        engine.send_message(0, 0x101, &payload),
        Err(EngineError::ChannelBusy)
    ));
    // Other channels are independent.
    engine.send_message(1, 0x100, &payload).unwrap();
}

#[test]
fn extended_addressing_folds_address_byte_into_key() {
    let (mut engine, _clock) = engine(1);
    engine.set_addressing(AddressingMode::Extended);

    // Single Frame: byte 0 is the target address, PCI moves to byte 1.
    let msgs = deliver_all(&mut engine, &[rx(0, 0x7E8, &[0xA1, 0x02, 0x55, 0x66, 0, 0, 0, 0])]);
    assert_eq!(msgs.len(), 1);
    assert_eq!(msgs[0].id, (0x7E8u64 << 8) | 0xA1);
    assert_eq!(msgs[0].data, vec![0x55, 0x66]);

    // Segmented: 5 initial bytes, then up to 6 per continuation.
    let ff = rx(0, 0x7E8, &[0xA1, 0x10, 10, 1, 2, 3, 4, 5]);
    let cf = rx(0, 0x7E8, &[0xA1, 0x21, 6, 7, 8, 9, 10, 0xFF]);
    let msgs = deliver_all(&mut engine, &[ff, cf]);
    assert_eq!(msgs.len(), 1);
    assert_eq!(msgs[0].declared_len, 10);
    assert_eq!(msgs[0].data, vec![1, 2, 3, 4, 5, 6, 7, 8, 9, 10]);

    // A Single Frame declaring 7 bytes is impossible in this mode.
    let msgs = deliver_all(&mut engine, &[rx(0, 0x7E8, &[0xA1, 0x07, 1, 2, 3, 4, 5, 6])]);
    assert!(msgs.is_empty());
}

#[test]
fn strict_sequence_mode_discards_out_of_order_transfer() {
    let cfg = EngineConfig {
        strict_sequence: true,
        ..EngineConfig::default()
    };
    let (mut engine, _clock) = engine_with(1, cfg);

    let ff = rx(0, 0x7E8, &[0x10, 20, 1, 2, 3, 4, 5, 6]);
    let bad_cf = rx(0, 0x7E8, &[0x22, 7, 8, 9, 10, 11, 12, 13]); // expected sn 1
    let msgs = deliver_all(&mut engine, &[ff, bad_cf]);
    assert!(msgs.is_empty());
    assert_eq!(engine.pending_reassemblies(), 0);
}

#[test]
fn transmitted_frames_can_be_ignored() {
    let cfg = EngineConfig {
        ignore_transmitted: true,
        ..EngineConfig::default()
    };
    let (mut engine, _clock) = engine_with(1, cfg);

    let echo =
        BusFrame::from_parts(0, 0x7E0, false, Direction::Transmitted, &[0x01, 0xAA, 0, 0, 0, 0, 0, 0], 0)
            .unwrap();
    assert!(deliver_all(&mut engine, &[echo]).is_empty());
    assert_eq!(deliver_all(&mut engine, &[rx(0, 0x7E0, &[0x01, 0xAA, 0, 0, 0, 0, 0, 0])]).len(), 1);
}

#[test]
fn reception_toggle_suspends_processing() {
    let (mut engine, _clock) = engine(1);
    engine.set_reception(false);
    assert!(deliver_all(&mut engine, &[rx(0, 0x7E8, &[0x01, 0x55, 0, 0, 0, 0, 0, 0])]).is_empty());
    engine.set_reception(true);
    assert_eq!(deliver_all(&mut engine, &[rx(0, 0x7E8, &[0x01, 0x55, 0, 0, 0, 0, 0, 0])]).len(), 1);
}

#[test]
fn encoded_transfer_round_trips_through_second_engine() {
    let (mut sender, clock) = engine(1);
    let (mut receiver, _rx_clock) = engine(1);
    let payload: Vec<u8> = (0..100u16).map(|i| (i % 251) as u8).collect();

    sender.send_message(0, 0x600, &payload).unwrap();
    // Idealized peer: immediate ClearToSend, 1 ms separation.
    sender
        .process_frames(&[rx(0, 0x601, &[0x30, 0x00, 0x01, 0, 0, 0, 0, 0])], &mut |_| {})
        .unwrap();

    let mut wire = sender.link_mut().take_sent();
    while sender.channel(0).unwrap().phase() != TxPhase::Idle {
        clock.advance(Duration::from_millis(1));
        sender.tick().unwrap();
        wire.extend(sender.link_mut().take_sent());
    }
    // FF + ceil(94 / 7) continuation frames.
    assert_eq!(wire.len(), 1 + 14);

    let msgs = deliver_all(&mut receiver, &wire);
    assert_eq!(msgs.len(), 1);
    assert_eq!(msgs[0].id, 0x600);
    assert_eq!(msgs[0].declared_len, payload.len());
    assert_eq!(msgs[0].data, payload);
}
