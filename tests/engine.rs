//! Integration tests for the Go-Back-N engines.
//!
//! Sender and receiver run as separate tasks connected by an in-memory
//! datagram pair.  Time is paused, so every timeout fires deterministically
//! the moment both sides go idle.

mod common;

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;

use gbn_transfer::channel::Channel;
use gbn_transfer::client;
use gbn_transfer::config::{TransferConfig, RETRANSMIT_TIMEOUT, TIME_WAIT_DURATION};
use gbn_transfer::error::TransferError;
use gbn_transfer::gbn_sender::prepare_bytes;
use gbn_transfer::packet::{Packet, PacketKind, FRAME_LEN, HEADER_LEN};
use gbn_transfer::receiver::{self, ReceiveReport, ReceiverOptions};
use gbn_transfer::sender::{self, SendReport, SenderOptions};
use gbn_transfer::simulator::{Simulator, SimulatorConfig};
use gbn_transfer::socket::{memory_pair, MemorySocket, Transport};

use common::{addr, pattern, DropPolicy, Faulty, SendLog};

const SENDER: u16 = 1;
const RECEIVER: u16 = 2;

fn sender_opts(window_size: usize) -> SenderOptions {
    SenderOptions {
        window_size,
        timeout: RETRANSMIT_TIMEOUT,
        max_retries: None,
    }
}

fn keep_all() -> DropPolicy {
    Box::new(|_: &Packet, _: usize| false)
}

/// Spawn a receiver on `transport` that writes into a fresh buffer.
fn spawn_receiver<T: Transport + 'static>(
    transport: T,
    simulator: Simulator,
) -> JoinHandle<(Result<ReceiveReport, TransferError>, Vec<u8>)> {
    tokio::spawn(async move {
        let mut channel = Channel::new(transport, simulator);
        let mut sink = Vec::new();
        let result = receiver::receive(
            &mut channel,
            addr(SENDER),
            &mut sink,
            ReceiverOptions::new(TIME_WAIT_DURATION),
        )
        .await;
        (result, sink)
    })
}

struct Outcome {
    send: SendReport,
    recv: ReceiveReport,
    output: Vec<u8>,
    data_log: SendLog,
    ack_log: SendLog,
}

/// Transfer `data` with the given window, dropping outgoing data and ACK
/// frames according to the two policies.
async fn transfer(data: &[u8], window: usize, drop_data: DropPolicy, drop_acks: DropPolicy) -> Outcome {
    let (a, b) = memory_pair(addr(SENDER), addr(RECEIVER));
    let (a, data_log) = Faulty::new(a, drop_data);
    let (b, ack_log) = Faulty::new(b, drop_acks);

    let receiver = spawn_receiver(b, Simulator::passthrough());

    let mut channel = Channel::reliable(a);
    let packets = prepare_bytes(data, 100).unwrap();
    let send = sender::run(&mut channel, addr(RECEIVER), packets, sender_opts(window))
        .await
        .expect("sender");

    let (recv, output) = receiver.await.unwrap();
    Outcome {
        send,
        recv: recv.expect("receiver"),
        output,
        data_log,
        ack_log,
    }
}

// ---------------------------------------------------------------------------
// Clean and lossy transfers
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn three_packets_stop_and_wait() {
    let data = pattern(250);
    let out = transfer(&data, 1, keep_all(), keep_all()).await;

    assert_eq!(out.output, data);
    assert_eq!(
        out.data_log.frames(),
        [
            (PacketKind::Data, 0),
            (PacketKind::Data, 1),
            (PacketKind::FinalData, 2)
        ]
    );
    assert_eq!(out.ack_log.acks(), [0, 1, 2]);
    assert_eq!(out.send.data_sends, 3);
    assert_eq!(out.send.timeouts, 0);
    assert_eq!(out.recv.packets_accepted, 3);
    assert_eq!(out.recv.bytes_delivered, 250);
}

#[tokio::test(start_paused = true)]
async fn lost_first_packet_is_retransmitted_after_timeout() {
    let data = pattern(250);
    let out = transfer(
        &data,
        1,
        Box::new(|p: &Packet, attempt: usize| p.seq == 0 && attempt == 0),
        keep_all(),
    )
    .await;

    assert_eq!(out.output, data);
    assert_eq!(out.data_log.data_seqs(), [0, 0, 1, 2]);
    assert_eq!(out.send.data_sends, 4);
    assert_eq!(out.send.timeouts, 1);

    let sends = out.data_log.entries();
    let gap = sends[1].at - sends[0].at;
    assert!(
        gap >= RETRANSMIT_TIMEOUT && gap < RETRANSMIT_TIMEOUT + Duration::from_millis(50),
        "retransmitted after {gap:?}"
    );
}

#[tokio::test(start_paused = true)]
async fn every_nth_packet_lost_once() {
    let data = pattern(1_234);
    for n in 2..=5 {
        let out = transfer(
            &data,
            4,
            Box::new(move |p: &Packet, attempt: usize| attempt == 0 && (p.seq + 1) % n == 0),
            keep_all(),
        )
        .await;
        assert_eq!(out.output, data, "n = {n}");
        assert!(out.send.timeouts > 0, "n = {n}");
    }
}

#[tokio::test(start_paused = true)]
async fn in_flight_never_exceeds_window() {
    let data = pattern(2_000);
    for window in [1, 3, 8] {
        let out = transfer(
            &data,
            window,
            Box::new(|p: &Packet, attempt: usize| attempt == 0 && p.seq % 7 == 3),
            Box::new(|p: &Packet, attempt: usize| attempt == 0 && p.seq % 5 == 1),
        )
        .await;
        assert_eq!(out.output, data);
        assert!(out.send.max_in_flight <= window, "window {window}");
        assert_eq!(out.send.max_in_flight, window.min(out.send.packets));
    }
}

#[tokio::test(start_paused = true)]
async fn later_cumulative_ack_covers_lost_ones() {
    let data = pattern(350);
    // ACKs 0..=2 vanish; ACK 3 alone retires the whole window.
    let out = transfer(
        &data,
        4,
        keep_all(),
        Box::new(|p: &Packet, attempt: usize| attempt == 0 && p.seq < 3),
    )
    .await;

    assert_eq!(out.output, data);
    assert_eq!(out.send.data_sends, 4);
    assert_eq!(out.send.timeouts, 0);
    assert_eq!(out.send.acks_advanced, 1);
}

#[tokio::test(start_paused = true)]
async fn lost_final_ack_is_answered_during_time_wait() {
    let data = pattern(250);
    let out = transfer(
        &data,
        1,
        keep_all(),
        Box::new(|p: &Packet, attempt: usize| attempt == 0 && p.seq == 2),
    )
    .await;

    assert_eq!(out.output, data);
    assert_eq!(out.data_log.data_seqs(), [0, 1, 2, 2]);
    assert_eq!(out.ack_log.acks(), [0, 1, 2, 2]);
    assert_eq!(out.send.timeouts, 1);
    assert_eq!(out.recv.out_of_order, 1);
}

#[tokio::test(start_paused = true)]
async fn empty_source_is_one_final_packet() {
    let out = transfer(&[], 4, keep_all(), keep_all()).await;
    assert!(out.output.is_empty());
    assert_eq!(out.data_log.frames(), [(PacketKind::FinalData, 0)]);
    assert_eq!(out.recv.packets_accepted, 1);
    assert_eq!(out.recv.bytes_delivered, 0);
}

#[tokio::test(start_paused = true)]
async fn seeded_noisy_channel_still_delivers_exactly() {
    let data = pattern(5_000);
    let (a, b) = memory_pair(addr(SENDER), addr(RECEIVER));
    let noisy = Simulator::new(SimulatorConfig {
        loss_rate: 0.2,
        corrupt_rate: 0.1,
        seed: Some(7),
    })
    .unwrap();
    let receiver = spawn_receiver(b, noisy);

    let mut channel = Channel::reliable(a);
    let packets = prepare_bytes(&data, 100).unwrap();
    let send = sender::run(&mut channel, addr(RECEIVER), packets, sender_opts(5))
        .await
        .unwrap();

    let (recv, output) = receiver.await.unwrap();
    let recv = recv.unwrap();
    assert_eq!(output, data);
    assert_eq!(send.packets, 50);
    assert!(send.data_sends > 50);
    assert!(recv.lost + recv.corrupt > 0);
}

// ---------------------------------------------------------------------------
// Receiver driven by a scripted sender
// ---------------------------------------------------------------------------

async fn send_raw(raw: &MemorySocket, packet: &Packet) {
    raw.send_to(&packet.encode(), addr(RECEIVER)).await.unwrap();
}

async fn next_ack(raw: &mut MemorySocket) -> i32 {
    let (frame, _) = raw.recv_from().await.unwrap();
    let ack = Packet::decode(&frame).unwrap();
    assert!(ack.verify());
    assert_eq!(ack.kind, PacketKind::Ack);
    ack.seq
}

fn data(seq: i32, bytes: &[u8]) -> Packet {
    Packet::new(seq, PacketKind::Data, bytes.to_vec()).unwrap()
}

fn final_data(seq: i32, bytes: &[u8]) -> Packet {
    Packet::new(seq, PacketKind::FinalData, bytes.to_vec()).unwrap()
}

#[tokio::test(start_paused = true)]
async fn receiver_delivers_in_order_only() {
    let (mut raw, b) = memory_pair(addr(SENDER), addr(RECEIVER));
    let receiver = spawn_receiver(b, Simulator::passthrough());

    // Nothing accepted yet: every rejection re-ACKs -1.
    send_raw(&raw, &data(1, b"BB")).await;
    assert_eq!(next_ack(&mut raw).await, -1);

    let mut damaged = data(0, b"AA").encode();
    damaged[HEADER_LEN] ^= 0x01;
    raw.send_to(&damaged, addr(RECEIVER)).await.unwrap();
    assert_eq!(next_ack(&mut raw).await, -1);

    send_raw(&raw, &data(0, b"AA")).await;
    assert_eq!(next_ack(&mut raw).await, 0);

    // Duplicate and gap both re-ACK the last in-order packet.
    send_raw(&raw, &data(0, b"AA")).await;
    assert_eq!(next_ack(&mut raw).await, 0);
    send_raw(&raw, &final_data(2, b"CC")).await;
    assert_eq!(next_ack(&mut raw).await, 0);

    send_raw(&raw, &data(1, b"BB")).await;
    assert_eq!(next_ack(&mut raw).await, 1);
    send_raw(&raw, &final_data(2, b"CC")).await;
    assert_eq!(next_ack(&mut raw).await, 2);

    let (report, output) = receiver.await.unwrap();
    let report = report.unwrap();
    assert_eq!(output, b"AABBCC");
    assert_eq!(report.packets_accepted, 3);
    assert_eq!(report.corrupt, 1);
    assert_eq!(report.out_of_order, 3);
    assert_eq!(report.acks_sent, 7);
}

#[tokio::test(start_paused = true)]
async fn receiver_ignores_non_data_frames() {
    let (mut raw, b) = memory_pair(addr(SENDER), addr(RECEIVER));
    let receiver = spawn_receiver(b, Simulator::passthrough());

    send_raw(&raw, &Packet::ack(5)).await;
    send_raw(&raw, &Packet::request("x").unwrap()).await;
    send_raw(&raw, &final_data(0, b"only")).await;
    // The first answer is the ACK for the final packet.
    assert_eq!(next_ack(&mut raw).await, 0);

    let (report, output) = receiver.await.unwrap();
    assert_eq!(output, b"only");
    assert_eq!(report.unwrap().acks_sent, 1);
}

#[tokio::test(start_paused = true)]
async fn time_wait_lasts_its_full_period() {
    let (mut raw, b) = memory_pair(addr(SENDER), addr(RECEIVER));
    let receiver = spawn_receiver(b, Simulator::passthrough());

    let start = Instant::now();
    send_raw(&raw, &final_data(0, b"end")).await;
    assert_eq!(next_ack(&mut raw).await, 0);

    // A retransmission mid time-wait is re-ACKed without extending it.
    tokio::time::sleep(Duration::from_secs(1)).await;
    send_raw(&raw, &final_data(0, b"end")).await;
    assert_eq!(next_ack(&mut raw).await, 0);

    let (report, output) = receiver.await.unwrap();
    let waited = start.elapsed();
    assert_eq!(output, b"end");
    assert_eq!(report.unwrap().acks_sent, 2);
    assert!(
        waited >= TIME_WAIT_DURATION && waited < TIME_WAIT_DURATION + Duration::from_millis(50),
        "time-wait lasted {waited:?}"
    );
}

#[tokio::test(start_paused = true)]
async fn time_wait_runs_from_the_final_ack_with_a_slow_sink() {
    use tokio::io::AsyncReadExt;

    let (mut raw, b) = memory_pair(addr(SENDER), addr(RECEIVER));
    // One byte of buffer: the receiver stalls on its write until drained.
    let (mut sink, mut drain) = tokio::io::duplex(1);
    let reader = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(1)).await;
        let mut out = Vec::new();
        drain.read_to_end(&mut out).await.unwrap();
        out
    });
    let receiver = tokio::spawn(async move {
        let mut channel = Channel::reliable(b);
        receiver::receive(
            &mut channel,
            addr(SENDER),
            &mut sink,
            ReceiverOptions::new(TIME_WAIT_DURATION),
        )
        .await
    });

    let start = Instant::now();
    send_raw(&raw, &final_data(0, b"end")).await;
    assert_eq!(next_ack(&mut raw).await, 0);
    let acked_at = Instant::now();
    assert!(acked_at - start >= Duration::from_secs(1), "ACK sent before the write finished");

    receiver.await.unwrap().unwrap();
    let lingered = acked_at.elapsed();
    assert!(
        lingered >= TIME_WAIT_DURATION && lingered < TIME_WAIT_DURATION + Duration::from_millis(50),
        "receiver finished {lingered:?} after the final ACK"
    );
    assert_eq!(reader.await.unwrap(), b"end");
}

#[tokio::test(start_paused = true)]
async fn undecodable_frame_counts_as_corrupt() {
    let (mut raw, b) = memory_pair(addr(SENDER), addr(RECEIVER));
    let receiver = spawn_receiver(b, Simulator::passthrough());

    raw.send_to(&[0u8; FRAME_LEN - 1], addr(RECEIVER)).await.unwrap();
    assert_eq!(next_ack(&mut raw).await, -1);
    send_raw(&raw, &final_data(0, b"")).await;
    assert_eq!(next_ack(&mut raw).await, 0);

    let (report, _) = receiver.await.unwrap();
    assert_eq!(report.unwrap().corrupt, 1);
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn unanswered_request_is_retried_then_abandoned() {
    let (a, mut silent) = memory_pair(addr(RECEIVER), addr(SENDER));
    let mut channel = Channel::reliable(a);
    let config = TransferConfig {
        max_retries: Some(2),
        ..TransferConfig::default()
    };

    let mut sink = Vec::new();
    let err = client::request_file(&mut channel, addr(SENDER), "notes.txt", &mut sink, &config)
        .await
        .unwrap_err();
    assert!(matches!(err, TransferError::PeerUnresponsive(2)));

    let mut requests = 0;
    while let Ok(Ok((frame, _))) =
        tokio::time::timeout(Duration::from_millis(1), silent.recv_from()).await
    {
        let packet = Packet::decode(&frame).unwrap();
        assert_eq!(packet.kind, PacketKind::Request);
        assert_eq!(packet.payload(), b"notes.txt");
        requests += 1;
    }
    assert_eq!(requests, 3);
}

#[tokio::test(start_paused = true)]
async fn request_then_transfer() {
    let (client_end, server_end) = memory_pair(addr(RECEIVER), addr(SENDER));
    let data = pattern(420);
    let served = data.clone();

    let server = tokio::spawn(async move {
        let mut channel = Channel::reliable(server_end);
        // Swallow the first request so the client has to retry.
        let mut requests = 0;
        loop {
            if let Ok(gbn_transfer::channel::Inbound::Packet { packet, .. }) = channel.recv().await {
                assert_eq!(packet.kind, PacketKind::Request);
                requests += 1;
                if requests == 2 {
                    break;
                }
            }
        }
        let packets = prepare_bytes(&served, 100).unwrap();
        sender::run(&mut channel, addr(RECEIVER), packets, sender_opts(3)).await
    });

    let mut channel = Channel::reliable(client_end);
    let mut sink = Vec::new();
    let report = client::request_file(
        &mut channel,
        addr(SENDER),
        "data.bin",
        &mut sink,
        &TransferConfig::default(),
    )
    .await
    .unwrap();

    assert_eq!(sink, data);
    assert_eq!(report.request_retries, 1);
    assert_eq!(server.await.unwrap().unwrap().packets, 5);
}

#[tokio::test]
async fn empty_file_name_is_rejected() {
    let (a, _b) = memory_pair(addr(RECEIVER), addr(SENDER));
    let mut channel = Channel::reliable(a);
    let mut sink = Vec::new();
    let err = client::request_file(&mut channel, addr(SENDER), "", &mut sink, &TransferConfig::default())
        .await
        .unwrap_err();
    assert!(matches!(err, TransferError::InvalidFileName(_)));
}
