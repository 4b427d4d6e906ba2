//! RX message parser: consumes record bytes already recovered by the framer
//! (one Manchester-decoded nibble pair per call) and assembles a [`Record`].

use crate::error::RamsesError;
use crate::message::{fields, fields_from_header, Record, RecordState};

/// Feed one assembled record byte into `rec`, advancing its parser state.
///
/// Returns the record's error after this byte, matching the source's
/// `msg_rx_byte`, which reports `msgRx->error` after every byte so the
/// framer can abort as soon as the first error appears.
pub fn rx_byte(rec: &mut Record, byte: u8) -> Option<RamsesError> {
    rec.csum = rec.csum.wrapping_add(byte);

    match rec.state {
        RecordState::Start | RecordState::Header => {
            rx_header(rec, byte);
            return rec.error;
        }
        RecordState::Opcode => {
            rx_opcode(rec, byte);
            return rec.error;
        }
        RecordState::Len => {
            rx_len(rec, byte);
            return rec.error;
        }
        RecordState::Payload => {
            rx_payload(rec, byte);
            return rec.error;
        }
        RecordState::Checksum => {
            rx_checksum(rec);
            return rec.error;
        }
        _ => {}
    }

    // Addr0/Addr1/Addr2/Param0/Param1: each is only present on the wire if
    // the header said so. The first absent field in the chain falls through
    // to the next, exactly as `msg_rx_process`'s switch fallthrough does;
    // whichever field is present first consumes this byte, and if none of
    // them are, it belongs to the opcode.
    let start = match rec.state {
        RecordState::Addr0 => 0,
        RecordState::Addr1 => 1,
        RecordState::Addr2 => 2,
        RecordState::Param0 => 3,
        RecordState::Param1 => 4,
        _ => return rec.error,
    };

    for step in start..5 {
        let present = match step {
            0 => rec.rx_declared & fields::ADDR0 != 0,
            1 => rec.rx_declared & fields::ADDR1 != 0,
            2 => rec.rx_declared & fields::ADDR2 != 0,
            3 => rec.rx_declared & fields::PARAM0 != 0,
            _ => rec.rx_declared & fields::PARAM1 != 0,
        };
        if !present {
            continue;
        }
        match step {
            0 => rx_addr(rec, 0, byte),
            1 => rx_addr(rec, 1, byte),
            2 => rx_addr(rec, 2, byte),
            3 => rx_param(rec, 0, byte),
            _ => rx_param(rec, 1, byte),
        }
        return rec.error;
    }

    rx_opcode(rec, byte);
    rec.error
}

fn rx_header(rec: &mut Record, byte: u8) {
    rec.rx_declared = fields_from_header(byte);
    rec.state = RecordState::Addr0;
}

fn rx_addr(rec: &mut Record, addr: usize, byte: u8) {
    rec.addr[addr][rec.count as usize] = byte;
    rec.count += 1;
    if rec.count as usize == rec.addr[addr].len() {
        rec.count = 0;
        rec.rx_seen |= fields::ADDR0 << addr;
        rec.state = match addr {
            0 => RecordState::Addr1,
            1 => RecordState::Addr2,
            _ => RecordState::Param0,
        };
    } else {
        rec.state = match addr {
            0 => RecordState::Addr0,
            1 => RecordState::Addr1,
            _ => RecordState::Addr2,
        };
    }
}

fn rx_param(rec: &mut Record, param: usize, byte: u8) {
    rec.param[param] = byte;
    rec.rx_seen |= fields::PARAM0 << param;
    rec.state = if param == 0 { RecordState::Param1 } else { RecordState::Opcode };
}

fn rx_opcode(rec: &mut Record, byte: u8) {
    rec.opcode[rec.count as usize] = byte;
    rec.count += 1;
    if rec.count as usize == rec.opcode.len() {
        rec.count = 0;
        rec.rx_seen |= fields::OPCODE;
        rec.state = RecordState::Len;
    } else {
        rec.state = RecordState::Opcode;
    }
}

fn rx_len(rec: &mut Record, byte: u8) {
    rec.len = byte;
    rec.rx_seen |= fields::LEN;
    rec.state = RecordState::Payload;
}

fn rx_payload(rec: &mut Record, byte: u8) {
    if (rec.n_payload as usize) < rec.payload.len() {
        rec.payload[rec.n_payload as usize] = byte;
        rec.n_payload += 1;
    }

    rec.count += 1;
    if rec.count == rec.len {
        rec.count = 0;
        rec.state = RecordState::Checksum;
    } else {
        rec.state = RecordState::Payload;
    }
}

fn rx_checksum(rec: &mut Record) {
    if rec.csum != 0 && rec.error.is_none() {
        #[cfg(feature = "defmt")]
        defmt::warn!("(CSUM) checksum error");
        rec.error = Some(RamsesError::ChecksumErr);
    }
    rec.state = RecordState::Complete;
}

/// Called once the framer has hit the trailer byte (or aborted). Validates
/// that every field the header promised actually arrived, and that the
/// payload length matched the declared `len`.
pub fn rx_end(rec: &mut Record, n_bytes: u8, error: Option<RamsesError>) {
    rec.n_bytes = n_bytes;

    let mut error = error;
    if error.is_none() {
        let option_mismatch = (rec.rx_seen & fields::OPTION) != (rec.rx_declared & fields::OPTION);
        let mandatory_missing = (rec.rx_seen & fields::MAND) != fields::MAND;
        let len_mismatch = rec.len != rec.n_payload;
        if option_mismatch || mandatory_missing || len_mismatch {
            #[cfg(feature = "defmt")]
            defmt::warn!("(END) message truncated: missing fields or length mismatch");
            error = Some(RamsesError::TruncatedErr);
        }
    }

    rec.error = error;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{header_from_fields, Record};

    fn feed(rec: &mut Record, bytes: &[u8]) {
        for &b in bytes {
            rx_byte(rec, b);
        }
    }

    #[test]
    fn minimal_frame_with_no_optional_fields() {
        let mut rec = Record::default();
        let header = header_from_fields(fields::RQ); // no addresses, no params

        feed(&mut rec, &[header]);
        feed(&mut rec, &[0x12, 0x34]); // opcode
        feed(&mut rec, &[0x02]); // len
        feed(&mut rec, &[0xAA, 0xBB]); // payload

        let csum = rec.csum.wrapping_neg();
        feed(&mut rec, &[csum]);

        rx_end(&mut rec, 8, None);
        assert!(rec.is_valid(), "{:?}", rec.error);
        assert_eq!(rec.opcode, [0x12, 0x34]);
        assert_eq!(rec.len, 2);
        assert_eq!(&rec.payload[..2], &[0xAA, 0xBB]);
    }

    #[test]
    fn frame_with_all_addresses_and_params() {
        let mut rec = Record::default();
        let flags = fields::I | fields::ADDR0 | fields::ADDR1 | fields::ADDR2 | fields::PARAM0;
        let header = header_from_fields(flags);

        feed(&mut rec, &[header]);
        feed(&mut rec, &[0x12, 0x00, 0x02]); // addr0
        feed(&mut rec, &[0x12, 0x00, 0x03]); // addr1
        feed(&mut rec, &[0x18, 0x00, 0x04]); // addr2
        feed(&mut rec, &[0x05]); // param0
        feed(&mut rec, &[0x1F, 0xC9]); // opcode
        feed(&mut rec, &[0x01]); // len
        feed(&mut rec, &[0x42]); // payload

        let csum = rec.csum.wrapping_neg();
        feed(&mut rec, &[csum]);

        rx_end(&mut rec, 20, None);
        assert!(rec.is_valid(), "{:?}", rec.error);
        assert_eq!(rec.param[0], 0x05);
        assert_eq!(rec.addr[2], [0x18, 0x00, 0x04]);
    }

    #[test]
    fn checksum_error_is_sticky() {
        let mut rec = Record::default();
        let header = header_from_fields(fields::RQ);
        feed(&mut rec, &[header, 0x00, 0x00, 0x00, 0xFF]); // wrong checksum byte
        rx_end(&mut rec, 5, None);
        assert_eq!(rec.error, Some(RamsesError::ChecksumErr));
    }

    #[test]
    fn truncated_payload_detected_at_end() {
        let mut rec = Record::default();
        let header = header_from_fields(fields::RQ);
        feed(&mut rec, &[header, 0x10, 0x00, 0x08]); // declares len=8
        feed(&mut rec, &[0x01, 0x02]); // only two payload bytes arrive
        // framer aborts early (trailer seen before len satisfied)
        rx_end(&mut rec, 6, None);
        assert_eq!(rec.error, Some(RamsesError::TruncatedErr));
    }
}
