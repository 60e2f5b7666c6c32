//! Wire-level behavior of the XMODEM receiver, with a scripted sender
//! on the far end of a simulated line.

use boot::sink::{PartitionSink, SliceSink};
use boot::xmodem;
use boot::Error;
use simserial::frames::{self, ACK, CAN, CRC_REQ, EOT, NAK, SOH};
use simserial::SimSerial;
use storage::{Partition, PartitionTable};

fn bytes(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 7 + 3) as u8).collect()
}

#[test]
fn ordered_payloads_fill_the_sink() {
    let data = bytes(3 * 128);
    let mut wire = SimSerial::new();
    wire.feed(&frames::session(&data, 128));
    let mut buf = [0u8; 3 * 128 + 128];
    let total = xmodem::receive(&mut wire, &mut SliceSink::new(&mut buf)).unwrap();
    assert_eq!(total, 3 * 128);
    assert_eq!(&buf[..total], &data[..]);
    assert_eq!(wire.sent(), &[CRC_REQ, ACK, ACK, ACK, ACK]);
}

#[test]
fn every_read_uses_the_packet_timeout() {
    let data = bytes(128);
    let mut wire = SimSerial::new();
    wire.feed(&frames::session(&data, 128));
    let mut buf = [0u8; 256];
    xmodem::receive(&mut wire, &mut SliceSink::new(&mut buf)).unwrap();
    assert!(!wire.requested_timeouts().is_empty());
    assert!(wire.requested_timeouts().iter().all(|&t| t == 1000));
}

#[test]
fn kilobyte_and_short_packets_mix() {
    let data = bytes(1024 + 128);
    let mut wire = SimSerial::new();
    wire.feed(&frames::data_packet(1, &data[..1024]));
    wire.feed(&frames::data_packet(2, &data[1024..]));
    wire.feed(&[EOT]);
    let mut buf = [0u8; 1024 + 2 * 128];
    let total = xmodem::receive(&mut wire, &mut SliceSink::new(&mut buf)).unwrap();
    assert_eq!(total, 1152);
    assert_eq!(&buf[..total], &data[..]);
    assert_eq!(wire.sent(), &[CRC_REQ, ACK, ACK, ACK]);
}

#[test]
fn corrupted_packet_is_nacked_and_resent() {
    let data = bytes(2 * 128);
    let mut first = frames::data_packet(1, &data[..128]);
    frames::corrupt(&mut first, 40);
    let mut wire = SimSerial::new();
    wire.feed(&first).feed(&frames::session(&data, 128));
    let mut buf = [0u8; 2 * 128 + 128];
    let total = xmodem::receive(&mut wire, &mut SliceSink::new(&mut buf)).unwrap();
    assert_eq!(total, 256);
    assert_eq!(&buf[..total], &data[..]);
    // Exactly one NAK for the bad copy, and nothing landed twice.
    assert_eq!(wire.sent(), &[CRC_REQ, NAK, ACK, ACK, ACK]);
}

#[test]
fn retransmitted_packet_is_absorbed() {
    let data = bytes(2 * 128);
    let first = frames::data_packet(1, &data[..128]);
    let mut wire = SimSerial::new();
    wire.feed(&first)
        .feed(&first)
        .feed(&frames::data_packet(2, &data[128..]))
        .feed(&[EOT]);
    let mut buf = [0u8; 2 * 128 + 128];
    let total = xmodem::receive(&mut wire, &mut SliceSink::new(&mut buf)).unwrap();
    assert_eq!(total, 256);
    assert_eq!(&buf[..total], &data[..]);
    // The duplicate is drained and acknowledged but never stored.
    assert_eq!(wire.sent(), &[CRC_REQ, ACK, ACK, ACK, ACK]);
}

#[test]
fn out_of_order_sequence_is_rejected() {
    let data = bytes(2 * 128);
    let mut wire = SimSerial::new();
    // Line noise that happens to look like a header for packet five.
    wire.feed(&[SOH, 5, !5]);
    wire.feed(&frames::session(&data, 128));
    let mut buf = [0u8; 2 * 128 + 128];
    let total = xmodem::receive(&mut wire, &mut SliceSink::new(&mut buf)).unwrap();
    assert_eq!(total, 256);
    assert_eq!(&buf[..total], &data[..]);
    assert_eq!(wire.sent(), &[CRC_REQ, NAK, ACK, ACK, ACK]);
}

#[test]
fn mismatched_complement_is_rejected() {
    let data = bytes(128);
    let mut wire = SimSerial::new();
    wire.feed(&[SOH, 1, 1]);
    wire.feed(&frames::session(&data, 128));
    let mut buf = [0u8; 256];
    let total = xmodem::receive(&mut wire, &mut SliceSink::new(&mut buf)).unwrap();
    assert_eq!(total, 128);
    assert_eq!(wire.sent(), &[CRC_REQ, NAK, ACK, ACK]);
}

#[test]
fn garbage_headers_count_toward_cancellation() {
    let data = bytes(128);
    let mut wire = SimSerial::new();
    // Nine junk bytes leave one retry in hand; the transfer still lands.
    wire.feed(&[0x77; 9]).feed(&frames::session(&data, 128));
    let mut buf = [0u8; 256];
    let total = xmodem::receive(&mut wire, &mut SliceSink::new(&mut buf)).unwrap();
    assert_eq!(total, 128);
    let mut expected = vec![CRC_REQ];
    expected.extend([NAK; 9]);
    expected.extend([ACK, ACK]);
    assert_eq!(wire.sent(), &expected[..]);
}

#[test]
fn ten_silent_reads_cancel_the_transfer() {
    let mut wire = SimSerial::new();
    wire.silence(10);
    let mut buf = [0u8; 128];
    let err = xmodem::receive(&mut wire, &mut SliceSink::new(&mut buf)).unwrap_err();
    assert_eq!(err, Error::Cancelled);
    let mut expected = vec![CRC_REQ];
    expected.extend([NAK; 10]);
    expected.extend([CAN, CAN]);
    assert_eq!(wire.sent(), &expected[..]);
}

#[test]
fn cancellation_keeps_earlier_packets() {
    let data = bytes(128);
    let mut wire = SimSerial::new();
    wire.feed(&frames::data_packet(1, &data)).silence(10);
    let mut buf = [0u8; 3 * 128];
    let err = xmodem::receive(&mut wire, &mut SliceSink::new(&mut buf)).unwrap_err();
    assert_eq!(err, Error::Cancelled);
    // The packet accepted before the line died is still in the sink.
    assert_eq!(&buf[..128], &data[..]);
}

#[test]
fn a_good_packet_resets_the_retry_budget() {
    let data = bytes(2 * 128);
    let mut wire = SimSerial::new();
    // Nine failures, one good packet, nine more failures: never cancelled.
    wire.silence(9);
    wire.feed(&frames::data_packet(1, &data[..128]));
    wire.silence(9);
    wire.feed(&frames::data_packet(2, &data[128..]));
    wire.feed(&[EOT]);
    let mut buf = [0u8; 2 * 128 + 128];
    let total = xmodem::receive(&mut wire, &mut SliceSink::new(&mut buf)).unwrap();
    assert_eq!(total, 256);
    assert_eq!(&buf[..total], &data[..]);
}

#[test]
fn full_sink_truncates_and_reports_what_fit() {
    let data = bytes(3 * 128);
    let mut wire = SimSerial::new();
    wire.feed(&frames::session(&data, 128));
    let mut buf = [0u8; 200];
    let total = xmodem::receive(&mut wire, &mut SliceSink::new(&mut buf)).unwrap();
    assert_eq!(total, 200);
    assert_eq!(&buf[..], &data[..200]);
    // The second packet only partly fit; nothing further was read.
    assert_eq!(wire.sent(), &[CRC_REQ, ACK, ACK]);
}

#[test]
fn sequence_wraps_past_255() {
    let data = bytes(300 * 128);
    let mut wire = SimSerial::new();
    wire.feed(&frames::session(&data, 128));
    let mut buf = vec![0u8; 300 * 128 + 128];
    let total = xmodem::receive(&mut wire, &mut SliceSink::new(&mut buf)).unwrap();
    assert_eq!(total, 300 * 128);
    assert_eq!(&buf[..total], &data[..]);
}

#[test]
fn device_fault_cancels_and_surfaces_the_error() {
    let data = bytes(3 * 128);
    let mut flash = simflash::layouts::TINY.build().unwrap();
    flash.fail_after_writes(1);
    let parts = PartitionTable::new(flash, &[Partition::new("download", 0, 2048)]).unwrap();
    let download = parts.find("download").unwrap();
    let mut wire = SimSerial::new();
    wire.feed(&frames::session(&data, 128));
    let mut sink = PartitionSink::new(&parts, download);
    let err = xmodem::receive(&mut wire, &mut sink).unwrap_err();
    assert_eq!(err, Error::Storage(storage::Error::Device));
    assert_eq!(wire.sent(), &[CRC_REQ, ACK, CAN, CAN]);
}
