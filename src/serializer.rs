//! TX serialization: turning a [`Record`] back into wire bytes, and
//! rendering a received record as the textual line the host side prints.

use core::fmt::Write;

use crate::message::{fields, header_from_fields, Record, RecordState};

/// Binary TX byte generator. Call repeatedly until it returns `None`; each
/// `Some(byte)` is one wire byte in emission order
/// (`HDR [A0]* [A1]* [A2]* [P0]? [P1]? OP OP LEN PAY* CSUM`).
///
/// `rec.state` must be `Start` on the first call (the framer/serializer sets
/// this up, along with `rec.csum`, before starting transmission).
pub fn tx_byte(rec: &mut Record) -> Option<u8> {
    let mut state = if rec.state == RecordState::Start { RecordState::Header } else { rec.state };

    loop {
        let (byte, done) = match state {
            RecordState::Header => tx_header(rec),
            RecordState::Addr0 => tx_addr(rec, 0),
            RecordState::Addr1 => tx_addr(rec, 1),
            RecordState::Addr2 => tx_addr(rec, 2),
            RecordState::Param0 => tx_param(rec, 0),
            RecordState::Param1 => tx_param(rec, 1),
            RecordState::Opcode => tx_opcode(rec),
            RecordState::Len => tx_len(rec),
            RecordState::Payload => tx_payload(rec),
            RecordState::Checksum => tx_checksum(rec),
            _ => {
                rec.state = RecordState::Complete;
                return None;
            }
        };

        if !done {
            rec.state = state;
            return byte;
        }

        state = match state {
            RecordState::Header => RecordState::Addr0,
            RecordState::Addr0 => RecordState::Addr1,
            RecordState::Addr1 => RecordState::Addr2,
            RecordState::Addr2 => RecordState::Param0,
            RecordState::Param0 => RecordState::Param1,
            RecordState::Param1 => RecordState::Opcode,
            RecordState::Opcode => RecordState::Len,
            RecordState::Len => RecordState::Payload,
            RecordState::Payload => RecordState::Checksum,
            RecordState::Checksum => {
                rec.state = RecordState::Complete;
                return None;
            }
            other => other,
        };
    }
}

fn tx_header(rec: &mut Record) -> (Option<u8>, bool) {
    if rec.count < 1 {
        let byte = header_from_fields(rec.rx_declared);
        rec.count += 1;
        (Some(byte), false)
    } else {
        rec.count = 0;
        (None, true)
    }
}

fn tx_addr(rec: &mut Record, addr: usize) -> (Option<u8>, bool) {
    if rec.rx_declared & (fields::ADDR0 << addr) == 0 {
        return (None, true);
    }
    if (rec.count as usize) < 3 {
        let byte = rec.addr[addr][rec.count as usize];
        rec.count += 1;
        (Some(byte), false)
    } else {
        rec.count = 0;
        (None, true)
    }
}

fn tx_param(rec: &mut Record, param: usize) -> (Option<u8>, bool) {
    if rec.rx_declared & (fields::PARAM0 << param) == 0 {
        return (None, true);
    }
    if rec.count < 1 {
        let byte = rec.param[param];
        rec.count += 1;
        (Some(byte), false)
    } else {
        rec.count = 0;
        (None, true)
    }
}

fn tx_opcode(rec: &mut Record) -> (Option<u8>, bool) {
    if (rec.count as usize) < rec.opcode.len() {
        let byte = rec.opcode[rec.count as usize];
        rec.count += 1;
        (Some(byte), false)
    } else {
        rec.count = 0;
        (None, true)
    }
}

fn tx_len(rec: &mut Record) -> (Option<u8>, bool) {
    if rec.count < 1 {
        rec.count += 1;
        (Some(rec.len), false)
    } else {
        rec.count = 0;
        (None, true)
    }
}

fn tx_payload(rec: &mut Record) -> (Option<u8>, bool) {
    if rec.count < rec.len {
        let byte = rec.payload[rec.count as usize];
        rec.count += 1;
        (Some(byte), false)
    } else {
        rec.count = 0;
        (None, true)
    }
}

fn tx_checksum(rec: &mut Record) -> (Option<u8>, bool) {
    if rec.count < 1 {
        rec.count += 1;
        (Some(rec.csum), false)
    } else {
        rec.count = 0;
        (None, true)
    }
}

/// Fixed-capacity `core::fmt::Write` sink used to render the textual line
/// without an allocator.
struct Cursor<'a> {
    buf: &'a mut [u8],
    len: usize,
}

impl<'a> Write for Cursor<'a> {
    fn write_str(&mut self, s: &str) -> core::fmt::Result {
        let bytes = s.as_bytes();
        if self.len + bytes.len() > self.buf.len() {
            return Err(core::fmt::Error);
        }
        self.buf[self.len..self.len + bytes.len()].copy_from_slice(bytes);
        self.len += bytes.len();
        Ok(())
    }
}

/// Render `rec` as the textual line the host side prints/publishes, e.g.
/// `045 I --- 18:000730 -- 18:000730 1FC9 006 0010E0001FC9`.
///
/// `msg_print_error`/`msg_print_raw`/`msg_print_bytes` in the source have no
/// defined output format (empty bodies); this omits the equivalent steps
/// rather than emitting placeholder text.
pub fn print_record(rec: &Record, out: &mut [u8]) -> usize {
    let mut c = Cursor { buf: out, len: 0 };

    if rec.rx_seen & fields::RSSI != 0 {
        let _ = write!(c, "{:03} ", rec.rssi);
    } else {
        let _ = write!(c, "--- ");
    }

    let type_str = crate::message::MsgType::from_fields(rec.rx_declared).as_str();
    let _ = write!(c, "{type_str:>2} ");

    if rec.rx_seen & fields::PARAM0 != 0 {
        let _ = write!(c, "{:03} ", rec.param[0]);
    } else {
        let _ = write!(c, "--- ");
    }

    for slot in 0..3 {
        let bit = fields::ADDR0 << slot;
        if rec.rx_seen & bit != 0 {
            let a = crate::message::Address::decode(rec.addr[slot]);
            let _ = write!(c, "{:02}:{:06} ", a.class, a.id);
        } else {
            let _ = write!(c, "--:------ ");
        }
    }

    let _ = write!(c, "{:02X}{:02X} ", rec.opcode[0], rec.opcode[1]);
    let _ = write!(c, "{:03} ", rec.len);

    for i in 0..rec.n_payload as usize {
        let _ = write!(c, "{:02X}", rec.payload[i]);
    }

    c.len
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Address;

    fn build_record() -> Record {
        let mut rec = Record::default();
        rec.rx_declared = fields::I | fields::ADDR0 | fields::ADDR2;
        rec.addr[0] = Address { class: 18, id: 730 }.encode();
        rec.addr[2] = Address { class: 18, id: 730 }.encode();
        rec.opcode = [0x1F, 0xC9];
        rec.len = 6;
        rec.n_payload = 6;
        rec.payload[..6].copy_from_slice(&[0x00, 0x10, 0xE0, 0x00, 0x1F, 0xC9]);
        rec.rx_seen = rec.rx_declared;
        rec.csum = rec.checksum();
        rec
    }

    #[test]
    fn tx_byte_emits_full_frame_then_stops() {
        let mut rec = build_record();
        let mut out = Vec::new();
        while let Some(b) = tx_byte(&mut rec) {
            out.push(b);
        }
        // header + addr0(3) + addr2(3) + opcode(2) + len(1) + payload(6) + csum(1)
        assert_eq!(out.len(), 1 + 3 + 3 + 2 + 1 + 6 + 1);
        let sum: u8 = out.iter().fold(0u8, |a, &b| a.wrapping_add(b));
        assert_eq!(sum, 0);
    }

    #[test]
    fn print_record_renders_known_line() {
        let rec = build_record();
        let mut buf = [0u8; 128];
        let n = print_record(&rec, &mut buf);
        let line = core::str::from_utf8(&buf[..n]).unwrap();
        assert!(line.starts_with("--- "));
        assert!(line.contains("18:000730"));
        assert!(line.contains("1FC9"));
        assert!(line.ends_with("0010E0001FC9"));
    }
}
