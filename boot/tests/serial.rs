//! Console output and operator line input over a scripted wire.

use core::fmt::Write;

use boot::serial::{read_line, Console, Serial};
use simserial::SimSerial;

#[test]
fn console_expands_line_endings() {
    let mut wire = SimSerial::new();
    write!(Console::new(&mut wire), "a\nb\n").unwrap();
    assert_eq!(wire.sent(), b"a\r\nb\r\n");
}

#[test]
fn read_line_strips_cr_and_stops_at_lf() {
    let mut wire = SimSerial::new();
    wire.feed(b"0x12AB\r\nrest");
    let mut line = [0u8; 32];
    let len = read_line(&mut wire, &mut line, 1000);
    assert_eq!(&line[..len], b"0x12AB");
    // The trailing bytes are still queued.
    assert_eq!(wire.receive_byte(10), Ok(b'r'));
}

#[test]
fn read_line_gives_up_at_the_deadline() {
    let mut wire = SimSerial::new();
    wire.feed(b"12");
    let mut line = [0u8; 32];
    let len = read_line(&mut wire, &mut line, 50);
    assert_eq!(&line[..len], b"12");
}

#[test]
fn read_line_stops_at_a_full_buffer() {
    let mut wire = SimSerial::new();
    wire.feed(b"123456\n");
    let mut line = [0u8; 4];
    let len = read_line(&mut wire, &mut line, 1000);
    assert_eq!(&line[..len], b"1234");
}
