//! The RAMSES message record: the structured form a frame decodes into, or
//! that a textual TX line is scanned into before re-encoding for the air.

use crate::error::RamsesError;

/// Raw on-air body capacity (Manchester-encoded bytes, two per record byte).
pub const MAX_RAW: usize = 162;
/// Payload capacity in record bytes.
pub const MAX_PAYLOAD: usize = 64;
/// Capacity of the stamped ISO-8601 timestamp text.
pub const TIMESTAMP_LEN: usize = 36;

pub mod fields {
    pub const MASK: u8 = 0x03;
    pub const RQ: u8 = 0x00;
    pub const I: u8 = 0x01;
    pub const W: u8 = 0x02;
    pub const RP: u8 = 0x03;

    pub const ADDR0: u8 = 0x10;
    pub const ADDR1: u8 = 0x20;
    pub const ADDR2: u8 = 0x40;

    pub const PARAM0: u8 = 0x04;
    pub const PARAM1: u8 = 0x08;
    pub const RSSI: u8 = 0x80;

    // Only meaningful among "received" fields.
    pub const OPCODE: u8 = 0x01;
    pub const LEN: u8 = 0x02;

    pub const OPTION: u8 = ADDR0 | ADDR1 | ADDR2 | PARAM0 | PARAM1;
    pub const MAND: u8 = OPCODE | LEN;
}

const HDR_T_MASK: u8 = 0x30;
const HDR_T_SHIFT: u8 = 4;
const HDR_A_MASK: u8 = 0x0C;
const HDR_A_SHIFT: u8 = 2;
const HDR_PARAM0: u8 = 0x02;
const HDR_PARAM1: u8 = 0x01;

const ADDRESS_PATTERNS: [u8; 4] = [
    fields::ADDR0 | fields::ADDR1 | fields::ADDR2,
    fields::ADDR2,
    fields::ADDR0 | fields::ADDR2,
    fields::ADDR0 | fields::ADDR1,
];

/// Decode a wire header byte into the `fields` bitmask it specifies.
pub fn fields_from_header(header: u8) -> u8 {
    let mut flags = (header & HDR_T_MASK) >> HDR_T_SHIFT;
    flags |= ADDRESS_PATTERNS[((header & HDR_A_MASK) >> HDR_A_SHIFT) as usize];
    if header & HDR_PARAM0 != 0 {
        flags |= fields::PARAM0;
    }
    if header & HDR_PARAM1 != 0 {
        flags |= fields::PARAM1;
    }
    flags
}

/// Encode a `fields` bitmask into the wire header byte. Returns `0xFF` if the
/// address-presence combination has no valid header pattern.
pub fn header_from_fields(flags: u8) -> u8 {
    let addresses = flags & (fields::ADDR0 | fields::ADDR1 | fields::ADDR2);

    for (i, pattern) in ADDRESS_PATTERNS.iter().enumerate() {
        if addresses == *pattern {
            let mut header = (i as u8) << HDR_A_SHIFT;
            header |= (flags & fields::MASK) << HDR_T_SHIFT;
            if flags & fields::PARAM0 != 0 {
                header |= HDR_PARAM0;
            }
            if flags & fields::PARAM1 != 0 {
                header |= HDR_PARAM1;
            }
            return header;
        }
    }
    0xFF
}

/// A decoded RAMSES address: a 6-bit device class and an 18-bit id.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Address {
    pub class: u8,
    pub id: u32,
}

impl Address {
    pub fn encode(&self) -> [u8; 3] {
        [
            ((self.class << 2) & 0xFC) | (((self.id >> 16) & 0x03) as u8),
            ((self.id >> 8) & 0xFF) as u8,
            (self.id & 0xFF) as u8,
        ]
    }

    pub fn decode(bytes: [u8; 3]) -> Self {
        let class = (bytes[0] & 0xFC) >> 2;
        let id = ((bytes[0] & 0x03) as u32) << 16 | (bytes[1] as u32) << 8 | bytes[2] as u32;
        Address { class, id }
    }
}

/// Parser/scanner/serializer cursor, shared across the RX, scan and TX state
/// machines (each only visits the states relevant to its own direction).
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RecordState {
    Start,
    Header,
    Addr0,
    Addr1,
    Addr2,
    Param0,
    Param1,
    Opcode,
    Len,
    Payload,
    Checksum,
    Trailer,
    Complete,
    Error,
}

/// A message record: the host-visible structured form of a RAMSES frame.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Record {
    pub state: RecordState,
    pub count: u8,

    /// Fields declared present by the header (RX) or requested by the caller (TX).
    pub rx_declared: u8,
    /// Fields actually seen so far.
    pub rx_seen: u8,

    pub error: Option<RamsesError>,

    pub addr: [[u8; 3]; 3],
    pub param: [u8; 2],

    pub opcode: [u8; 2],
    pub len: u8,

    pub csum: u8,
    pub rssi: u8,
    /// Set when this record is the gateway's own TX being echoed back as an
    /// RX confirmation, rather than a genuine reception.
    pub echoed: bool,

    pub n_payload: u8,
    pub payload: [u8; MAX_PAYLOAD],

    pub n_bytes: u8,
    pub raw: [u8; MAX_RAW],
    /// Raw-buffer capacity. Kept separate from `raw[0]`, unlike the source,
    /// which overloads the first body byte with this before any byte arrives.
    pub cap: u8,

    pub timestamp: [u8; TIMESTAMP_LEN],
    pub timestamp_len: u8,
}

impl Default for Record {
    fn default() -> Self {
        Record {
            state: RecordState::Start,
            count: 0,
            rx_declared: 0,
            rx_seen: 0,
            error: None,
            addr: [[0; 3]; 3],
            param: [0; 2],
            opcode: [0; 2],
            len: 0,
            csum: 0,
            rssi: 0,
            echoed: false,
            n_payload: 0,
            payload: [0; MAX_PAYLOAD],
            n_bytes: 0,
            raw: [0; MAX_RAW],
            cap: MAX_RAW as u8,
            timestamp: [0; TIMESTAMP_LEN],
            timestamp_len: 0,
        }
    }
}

impl Record {
    /// Reset all fields to their pool-fresh state, as if freshly allocated.
    pub fn reset(&mut self) {
        *self = Record::default();
    }

    /// Running checksum over header, addresses, params, opcode, len, payload,
    /// negated so a valid TX frame sums to zero once the checksum byte itself
    /// is added on RX.
    pub fn checksum(&self) -> u8 {
        let mut csum: u8 = header_from_fields(self.rx_declared);
        for slot in &self.addr {
            for byte in slot {
                csum = csum.wrapping_add(*byte);
            }
        }
        for byte in &self.param {
            csum = csum.wrapping_add(*byte);
        }
        for byte in &self.opcode {
            csum = csum.wrapping_add(*byte);
        }
        csum = csum.wrapping_add(self.len);
        for i in 0..self.n_payload as usize {
            csum = csum.wrapping_add(self.payload[i]);
        }
        csum.wrapping_neg()
    }

    /// True if this record carries no recorded error.
    pub fn is_valid(&self) -> bool {
        self.error.is_none()
    }

    /// True if this record is a TX-echo pushed to the RX-ready queue as a
    /// send confirmation, rather than a genuine reception.
    pub fn is_tx_echo(&self) -> bool {
        self.is_valid() && self.echoed
    }

    /// Stamp an externally-produced ISO-8601 timestamp onto the record,
    /// truncating to the buffer's capacity.
    pub fn stamp(&mut self, text: &str) {
        let bytes = text.as_bytes();
        let n = bytes.len().min(TIMESTAMP_LEN);
        self.timestamp[..n].copy_from_slice(&bytes[..n]);
        self.timestamp_len = n as u8;
    }

    /// Rewrite `slot`'s address in place if it matches `from`, to `to`. Used
    /// to make an operator-authored TX line address-compatible with this
    /// gateway's own device address.
    pub fn rewrite_gateway_address(&mut self, slot: usize, from: Address, to: Address) {
        let bit = fields::ADDR0 << slot;
        if self.rx_declared & bit == 0 {
            return;
        }
        let current = Address::decode(self.addr[slot]);
        if current == from {
            self.addr[slot] = to.encode();
        }
    }
}

/// The four RAMSES message types.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MsgType {
    Rq,
    I,
    W,
    Rp,
}

impl MsgType {
    pub fn from_fields(flags: u8) -> Self {
        match flags & fields::MASK {
            fields::RQ => MsgType::Rq,
            fields::I => MsgType::I,
            fields::W => MsgType::W,
            _ => MsgType::Rp,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MsgType::Rq => "RQ",
            MsgType::I => "I",
            MsgType::W => "W",
            MsgType::Rp => "RP",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_round_trips() {
        let a = Address { class: 0x12, id: 0x02_DA12 };
        let bytes = a.encode();
        assert_eq!(Address::decode(bytes), a);
    }

    #[test]
    fn header_round_trips_for_every_pattern() {
        for pattern in ADDRESS_PATTERNS {
            for msg_type in [fields::RQ, fields::I, fields::W, fields::RP] {
                for params in [0u8, fields::PARAM0, fields::PARAM1, fields::PARAM0 | fields::PARAM1] {
                    let flags = pattern | msg_type | params;
                    let header = header_from_fields(flags);
                    assert_ne!(header, 0xFF);
                    assert_eq!(fields_from_header(header), flags);
                }
            }
        }
    }

    #[test]
    fn checksum_of_empty_record_is_header_negated() {
        let mut r = Record::default();
        r.rx_declared = fields::I | fields::ADDR2;
        let expected = header_from_fields(r.rx_declared).wrapping_neg();
        assert_eq!(r.checksum(), expected);
    }

    #[test]
    fn tx_echo_is_distinguished_from_zero_rssi_reception() {
        let mut r = Record::default();
        r.rssi = 0;
        assert!(!r.is_tx_echo());
        r.echoed = true;
        assert!(r.is_tx_echo());
    }
}
