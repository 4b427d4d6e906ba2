//! Full-duplex framer: RX sync detection and record assembly from raw on-air
//! bytes, and TX record-to-FIFO pacing through the CC1101's shift-register
//! framing.
//!
//! The RX and TX sides are independent state machines driven by the caller
//! once per on-air byte (RX) or once per FIFO-threshold event (TX), per
//! `frame_rx_byte`/`tx_fifo_send_block` in the source. Neither owns the SPI
//! bus directly; [`RadioFifo`] is the narrow trait contract the caller's
//! CC1101 driver implements. [`Framer::service_tx`] itself withholds a new
//! frame while [`Framer::rx_busy`] is true, the way `frame_work` guards
//! `frame_tx_enable` on `rxFrm.state < FRM_RX_MESSAGE` — the radio is
//! half-duplex, so TX can't preempt a reception already in progress.

use crate::config::RamsesConfig;
use crate::manchester;
use crate::message::{fields, Record};
use crate::parser;
use crate::pool::{Handle, Pool};
use crate::serializer;

const TX_PREFIX: [u8; 10] = [0x55, 0x55, 0x55, 0x55, 0x55, 0xFF, 0x00, 0x33, 0x55, 0x53];
const TX_SUFFIX: [u8; 2] = [0x35, 0x55];

/// Caller-supplied access to the CC1101's TX FIFO and fill-level signal.
pub trait RadioFifo {
    /// Write one on-air byte to the TX FIFO, returning the FIFO's remaining
    /// free space (the status byte's low nibble, per `cc_write_fifo`).
    fn write_fifo(&mut self, byte: u8) -> u8;
}

/// Result of one [`Framer::service_tx`] call.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum TxProgress {
    /// More bytes remain; call again on the next threshold event.
    Filling,
    /// The frame (including trailer and training) has been written.
    Done,
}

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
enum RxState {
    Idle,
    Message,
    Abort,
}

struct RxFrame {
    state: RxState,
    sync_buf: u32,
    handle: Option<Handle>,
    n_bytes: u8,
    msg_count: u8,
    msg_byte: u8,
    msg_err: Option<crate::error::RamsesError>,
}

impl RxFrame {
    const fn new() -> Self {
        RxFrame {
            state: RxState::Idle,
            sync_buf: 0,
            handle: None,
            n_bytes: 0,
            msg_count: 0,
            msg_byte: 0,
            msg_err: None,
        }
    }
}

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
enum TxFrameState {
    Idle,
    Prefix,
    Message,
    Suffix,
    Done,
}

struct TxFrame {
    state: TxFrameState,
    count: u8,
}

impl TxFrame {
    const fn new() -> Self {
        TxFrame { state: TxFrameState::Idle, count: 0 }
    }
}

fn swap4(in_: u8) -> u8 {
    const OUT: [u8; 16] =
        [0x0, 0x8, 0x4, 0xC, 0x2, 0xA, 0x6, 0xE, 0x1, 0x9, 0x5, 0xD, 0x3, 0xB, 0x7, 0xF];
    OUT[(in_ & 0xF) as usize]
}

fn swap8(in_: u8) -> u8 {
    (swap4(in_) << 4) | swap4(in_ >> 4)
}

/// Bit-accumulating register that repacks raw on-air bytes into the
/// start/stop-bit-framed octets the CC1101 FIFO expects. Every 4 input bytes
/// produce 5 output octets, since each input byte grows by a start and stop
/// bit before being folded into the stream.
struct ShiftRegister {
    bits: u8,
    data: u8,
    tx_bits: u8,
}

impl ShiftRegister {
    const fn new() -> Self {
        ShiftRegister { bits: 0, data: 0, tx_bits: 0 }
    }

    fn reg(&self) -> u16 {
        ((self.data as u16) << 8) | self.bits as u16
    }

    fn set_reg(&mut self, v: u16) {
        self.bits = (v & 0xFF) as u8;
        self.data = (v >> 8) as u8;
    }

    fn insert_p(&mut self) {
        self.data = (self.data << 1) | 0x01;
    }

    fn insert_s(&mut self) {
        self.data <<= 1;
    }

    fn insert_ps(&mut self) {
        self.insert_p();
        self.insert_s();
    }

    fn send(&mut self, n: u32) {
        self.set_reg(self.reg() << n);
    }

    fn tx_data(&self, fifo: &mut impl RadioFifo) -> u8 {
        fifo.write_fifo(self.data)
    }

    /// Fold one on-air byte into the shift register, writing whichever FIFO
    /// octets it completes. Returns the FIFO's remaining free space after the
    /// last write this call made.
    fn push(&mut self, byte: u8, fifo: &mut impl RadioFifo) -> u8 {
        self.bits = swap8(byte);

        match self.tx_bits {
            0 => {
                self.insert_ps();
                self.send(6);
                let space = self.tx_data(fifo);
                self.send(2);
                self.tx_bits = 2;
                space
            }
            2 => {
                self.insert_ps();
                self.send(4);
                let space = self.tx_data(fifo);
                self.send(4);
                self.tx_bits = 4;
                space
            }
            4 => {
                // Folding a 4th byte completes two octets in one call.
                self.insert_ps();
                self.send(2);
                let _ = self.tx_data(fifo);
                self.send(6);
                self.insert_ps();
                let space = self.tx_data(fifo);
                self.tx_bits = 8;
                space
            }
            _ => {
                self.send(8);
                let space = self.tx_data(fifo);
                self.tx_bits = 0;
                space
            }
        }
    }

    /// Flush any partial octet still held in the register, then leave the
    /// line in the all-ones SPACE condition.
    fn flush(&mut self, fifo: &mut impl RadioFifo) {
        if self.tx_bits != 0 {
            self.send((8 - self.tx_bits) as u32);
            self.tx_data(fifo);
        }
        self.data = 0xFF;
        self.tx_data(fifo);
    }
}

/// Owns the RX and TX framing state machines. One instance serves both
/// directions; RX and TX never run concurrently on a half-duplex radio.
pub struct Framer {
    rx: RxFrame,
    tx: TxFrame,
    shift: ShiftRegister,
    sync_word: u32,
    trailer: u8,
}

impl Default for Framer {
    fn default() -> Self {
        Self::with_config(&RamsesConfig::default())
    }
}

impl Framer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a framer using `cfg`'s sync word and trailer byte, in place of
    /// the protocol defaults.
    pub fn with_config(cfg: &RamsesConfig) -> Self {
        Framer {
            rx: RxFrame::new(),
            tx: TxFrame::new(),
            shift: ShiftRegister::new(),
            sync_word: cfg.sync_word,
            trailer: cfg.trailer,
        }
    }

    /// Feed one raw on-air byte (pre-Manchester-decode). `rssi` is called at
    /// most once, only once a frame has actually completed, matching
    /// `frame_rx_done`'s single `cc_read_rssi()` call.
    ///
    /// Returns the handle of a record just pushed to the RX-ready queue,
    /// valid or not (its `error` field distinguishes the two).
    pub fn poll_rx<const N: usize>(
        &mut self,
        pool: &mut Pool<N>,
        byte: u8,
        rssi: impl FnOnce() -> u8,
    ) -> Option<Handle> {
        match self.rx.state {
            RxState::Idle => {
                self.rx.sync_buf = (self.rx.sync_buf << 8) | byte as u32;
                if self.rx.sync_buf == self.sync_word {
                    if let Some(handle) = pool.alloc() {
                        self.rx.handle = Some(handle);
                        self.rx.n_bytes = 0;
                        self.rx.msg_count = 0;
                        self.rx.msg_byte = 0;
                        self.rx.msg_err = None;
                        self.rx.state = RxState::Message;
                        #[cfg(feature = "defmt")]
                        defmt::println!("SYNCH");
                    }
                }
                None
            }
            RxState::Message => {
                let handle = self.rx.handle.expect("message state implies an allocated handle");

                if byte == self.trailer {
                    let err = self.rx.msg_err;
                    return Some(self.finish_rx(pool, handle, err, rssi()));
                }

                {
                    let rec = pool.get_mut(handle);
                    if (self.rx.n_bytes as usize) < rec.raw.len() {
                        rec.raw[self.rx.n_bytes as usize] = byte;
                    }
                    self.rx.n_bytes += 1;

                    if !manchester::code_valid(byte) {
                        self.rx.state = RxState::Abort;
                        self.rx.msg_err = Some(crate::error::RamsesError::ManchesterErr);
                        #[cfg(feature = "defmt")]
                        defmt::warn!("(MC) bad manchester byte {}", byte);
                    } else {
                        self.rx.msg_byte = (self.rx.msg_byte << 4) | manchester::decode(byte);
                        self.rx.msg_count = 1 - self.rx.msg_count;
                        if self.rx.msg_count == 0 {
                            if let Some(err) = parser::rx_byte(rec, self.rx.msg_byte) {
                                self.rx.msg_err = Some(err);
                                self.rx.state = RxState::Abort;
                            }
                        }
                    }

                    // Checked unconditionally, same as the source: an overrun
                    // on the byte that also failed Manchester/parser checks
                    // overwrites that earlier error.
                    if self.rx.n_bytes >= rec.cap {
                        self.rx.state = RxState::Abort;
                        self.rx.msg_err = Some(crate::error::RamsesError::OverrunErr);
                        #[cfg(feature = "defmt")]
                        defmt::warn!("(OVERRUN) frame exceeded buffer capacity");
                    }
                }

                if self.rx.state == RxState::Abort {
                    let err = self.rx.msg_err;
                    return Some(self.finish_rx(pool, handle, err, rssi()));
                }
                None
            }
            RxState::Abort => None,
        }
    }

    fn finish_rx<const N: usize>(
        &mut self,
        pool: &mut Pool<N>,
        handle: Handle,
        error: Option<crate::error::RamsesError>,
        rssi: u8,
    ) -> Handle {
        let n_bytes = self.rx.n_bytes;
        let rec = pool.get_mut(handle);
        rec.rssi = rssi;
        rec.rx_seen |= fields::RSSI;
        parser::rx_end(rec, n_bytes, error);

        #[cfg(feature = "defmt")]
        defmt::println!("DONE rssi={} err={}", rssi, rec.error.is_some());

        pool.push_rx_ready(handle);

        self.rx.state = RxState::Idle;
        self.rx.sync_buf = 0;
        self.rx.handle = None;
        handle
    }

    /// True while RX is mid-message (sync matched, record not yet
    /// complete/aborted). Mirrors `frame_work`'s guard on `rxFrm.state <
    /// FRM_RX_MESSAGE`: TX must not start while this is true, since the
    /// CC1101 is half-duplex and a TX FIFO write would corrupt the frame
    /// being received.
    pub fn rx_busy(&self) -> bool {
        self.rx.state != RxState::Idle
    }

    /// Stage `rec` for transmission: Manchester-encode its body into
    /// `rec.raw` and reset the TX frame state. Call once per outgoing record,
    /// before the first [`Framer::service_tx`].
    pub fn start_tx(&mut self, rec: &mut Record) {
        rec.csum = rec.checksum();
        rec.state = crate::message::RecordState::Start;
        rec.count = 0;

        let mut n = 0usize;
        while n + 1 < rec.raw.len() {
            let Some(byte) = serializer::tx_byte(rec) else { break };
            rec.raw[n] = manchester::encode(byte >> 4);
            rec.raw[n + 1] = manchester::encode(byte);
            n += 2;
        }
        rec.n_bytes = n as u8;

        self.tx = TxFrame::new();
    }

    /// Pull the next prefix/message/suffix byte for transmission, feeding it
    /// through the shift register and into the FIFO. Drives up to 4 record
    /// bytes per call, mirroring `tx_fifo_send_block`'s `block` budget, so a
    /// single FIFO-threshold event can't starve other duties indefinitely.
    ///
    /// Defers starting a new frame while RX is mid-message (`frame_work`'s
    /// arbitration): if TX hasn't started yet and RX is busy, this returns
    /// `Filling` without touching the FIFO, so the caller just tries again
    /// on the next threshold event. A frame already in progress is allowed
    /// to finish once started.
    pub fn service_tx(&mut self, rec: &Record, fifo: &mut impl RadioFifo) -> TxProgress {
        if self.tx.state == TxFrameState::Idle && self.rx_busy() {
            return TxProgress::Filling;
        }

        const BLOCK: u8 = 4;
        let mut remaining = BLOCK;

        loop {
            match self.tx_byte(rec) {
                Some(byte) => {
                    let space = self.shift.push(byte, fifo);
                    remaining -= 1;
                    if remaining == 0 || space <= 4 {
                        return TxProgress::Filling;
                    }
                }
                None => {
                    self.shift.flush(fifo);
                    return TxProgress::Done;
                }
            }
        }
    }

    fn tx_byte(&mut self, rec: &Record) -> Option<u8> {
        let mut state = if self.tx.state == TxFrameState::Idle {
            TxFrameState::Prefix
        } else {
            self.tx.state
        };

        loop {
            match state {
                TxFrameState::Prefix => {
                    if (self.tx.count as usize) < TX_PREFIX.len() {
                        let b = TX_PREFIX[self.tx.count as usize];
                        self.tx.count += 1;
                        self.tx.state = state;
                        return Some(b);
                    }
                    self.tx.count = 0;
                    state = TxFrameState::Message;
                }
                TxFrameState::Message => {
                    if (self.tx.count as usize) < rec.n_bytes as usize {
                        let b = rec.raw[self.tx.count as usize];
                        self.tx.count += 1;
                        self.tx.state = state;
                        return Some(b);
                    }
                    self.tx.count = 0;
                    state = TxFrameState::Suffix;
                }
                TxFrameState::Suffix => {
                    if (self.tx.count as usize) < TX_SUFFIX.len() {
                        let b = TX_SUFFIX[self.tx.count as usize];
                        self.tx.count += 1;
                        self.tx.state = state;
                        return Some(b);
                    }
                    self.tx.count = 0;
                    self.tx.state = TxFrameState::Done;
                    return None;
                }
                TxFrameState::Idle | TxFrameState::Done => return None,
            }
        }
    }

    /// Mark `rec` as transmitted: record its on-air length and echo it back
    /// as an RX-ready confirmation, per `msg_tx_end`/`msg_tx_done`.
    pub fn finish_tx<const N: usize>(&mut self, pool: &mut Pool<N>, handle: Handle) {
        let rec = pool.get_mut(handle);
        rec.rssi = 0;
        rec.rx_seen |= fields::RSSI;
        rec.echoed = true;
        pool.push_rx_ready(handle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{fields, header_from_fields, Record};
    use crate::pool::Pool;

    struct FakeFifo {
        written: std::vec::Vec<u8>,
        space: u8,
    }

    impl RadioFifo for FakeFifo {
        fn write_fifo(&mut self, byte: u8) -> u8 {
            self.written.push(byte);
            self.space
        }
    }

    #[test]
    fn rx_assembles_minimal_frame_and_pushes_ready() {
        let mut pool: Pool<4> = Pool::new();
        let mut framer = Framer::new();

        let mut staged = Record::default();
        staged.rx_declared = fields::RQ;
        staged.opcode = [0x10, 0x00];
        staged.len = 1;
        staged.n_payload = 1;
        staged.payload[0] = 0x42;
        staged.csum = staged.checksum();

        let header = header_from_fields(staged.rx_declared);
        let csum = staged.csum;
        let mut raw = std::vec::Vec::new();
        raw.push(manchester::encode(header >> 4));
        raw.push(manchester::encode(header));
        raw.push(manchester::encode(0x1));
        raw.push(manchester::encode(0x0));
        raw.push(manchester::encode(0x0));
        raw.push(manchester::encode(0x0));
        raw.push(manchester::encode(0x1));
        raw.push(manchester::encode(0x0));
        raw.push(manchester::encode(0x4));
        raw.push(manchester::encode(0x2));
        raw.push(manchester::encode(csum >> 4));
        raw.push(manchester::encode(csum));

        let mut on_air = std::vec::Vec::new();
        on_air.extend_from_slice(&[0xFF, 0x00, 0x33, 0x55, 0x53]);
        on_air.extend_from_slice(&raw);
        on_air.push(crate::config::TRAILER);

        let mut done_handle = None;
        for &b in &on_air {
            if let Some(h) = framer.poll_rx(&mut pool, b, || 123) {
                done_handle = Some(h);
            }
        }

        let handle = done_handle.expect("frame should complete");
        let rec = pool.get(handle);
        assert!(rec.is_valid(), "{:?}", rec.error);
        assert_eq!(rec.opcode, [0x10, 0x00]);
        assert_eq!(rec.rssi, 123);
        assert_eq!(pool.pop_rx_ready(), Some(handle));
    }

    #[test]
    fn rx_aborts_on_invalid_manchester_byte() {
        let mut pool: Pool<4> = Pool::new();
        let mut framer = Framer::new();

        let mut on_air = std::vec::Vec::new();
        on_air.extend_from_slice(&[0xFF, 0x00, 0x33, 0x55, 0x53]);
        on_air.push(0x00); // never produced by encode()
        on_air.push(crate::config::TRAILER);

        let mut done_handle = None;
        for &b in &on_air {
            if let Some(h) = framer.poll_rx(&mut pool, b, || 0) {
                done_handle = Some(h);
            }
        }

        let rec = pool.get(done_handle.unwrap());
        assert_eq!(rec.error, Some(crate::error::RamsesError::ManchesterErr));
    }

    #[test]
    fn tx_frame_emits_prefix_message_suffix_in_order() {
        let mut rec = Record::default();
        rec.rx_declared = fields::RQ;
        rec.opcode = [0x12, 0x34];
        rec.len = 1;
        rec.n_payload = 1;
        rec.payload[0] = 0x99;

        let mut framer = Framer::new();
        framer.start_tx(&mut rec);
        assert!(rec.n_bytes > 0);

        let mut fifo = FakeFifo { written: std::vec::Vec::new(), space: 15 };
        loop {
            if framer.service_tx(&rec, &mut fifo) == TxProgress::Done {
                break;
            }
        }

        assert!(!fifo.written.is_empty());
    }

    #[test]
    fn tx_defers_while_rx_is_mid_message() {
        let mut pool: Pool<4> = Pool::new();
        let mut framer = Framer::new();

        for &b in &[0xFFu8, 0x00, 0x33, 0x55, 0x53] {
            framer.poll_rx(&mut pool, b, || 0);
        }
        assert!(framer.rx_busy());

        let mut rec = Record::default();
        rec.rx_declared = fields::RQ;
        rec.opcode = [0x12, 0x34];
        rec.len = 1;
        rec.n_payload = 1;
        rec.payload[0] = 0x99;
        framer.start_tx(&mut rec);

        let mut fifo = FakeFifo { written: std::vec::Vec::new(), space: 15 };
        let progress = framer.service_tx(&rec, &mut fifo);

        assert_eq!(progress, TxProgress::Filling);
        assert!(fifo.written.is_empty());
    }

    #[test]
    fn finish_tx_echoes_record_as_rx_ready() {
        let mut pool: Pool<4> = Pool::new();
        let mut framer = Framer::new();
        let handle = pool.alloc().unwrap();

        framer.finish_tx(&mut pool, handle);

        let rec = pool.get(handle);
        assert!(rec.is_tx_echo());
        assert_eq!(rec.rssi, 0);
        assert_eq!(pool.pop_rx_ready(), Some(handle));
    }
}
