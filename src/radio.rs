//! CC1101 radio driver facade: register bank upload, RX/TX mode transitions,
//! FIFO access and RSSI readback.
//!
//! Unlike the SX126x/SX128x parts this pack's driver crates target, the
//! CC1101 has no BUSY pin. Every SPI transaction instead returns a status
//! byte whose top nibble reports the chip's current state, so readiness is
//! polled by re-issuing the strobe and inspecting that status rather than
//! waiting on a GPIO.

use embedded_hal::digital::OutputPin;
use embedded_hal::spi::SpiDevice;

use crate::error::RadioError;

const READ: u8 = 0x80;
const BURST: u8 = 0x40;

mod reg {
    pub const IOCFG2: u8 = 0x00;
    pub const IOCFG0: u8 = 0x02;
    pub const FIFOTHR: u8 = 0x03;
    pub const PKTCTRL0: u8 = 0x08;
    pub const PATABLE: u8 = 0x3E;
    pub const FIFO: u8 = 0x3F;
    pub const RSSI: u8 = 0x34;
}

mod strobe {
    pub const SRES: u8 = 0x30;
    pub const SFRX: u8 = 0x3A;
    pub const SFTX: u8 = 0x3B;
    pub const SIDLE: u8 = 0x36;
    pub const SRX: u8 = 0x34;
    pub const STX: u8 = 0x35;
}

/// Chip state as reported in the top nibble of every status byte.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
enum ChipState {
    Idle,
    Rx,
    Tx,
    Other,
}

fn chip_state(status: u8) -> ChipState {
    match (status >> 4) & 0x7 {
        0 => ChipState::Idle,
        1 => ChipState::Rx,
        2 => ChipState::Tx,
        _ => ChipState::Other,
    }
}

/// 47-byte register bank, 868.3 MHz / 38.4 kbit/s GFSK, asynchronous serial
/// mode with no hardware sync word (RAMSES supplies its own training,
/// sync word and header in the bitstream).
const DEFAULT_CFG: [u8; 47] = [
    0x0D, // IOCFG2: GDO2 = RX data
    0x2E, // IOCFG1: unused
    0x2E, // IOCFG0: TX data
    0x07, // FIFOTHR
    0xD3, // SYNC1
    0x91, // SYNC0
    0xFF, // PKTLEN
    0x04, // PKTCTRL1
    0x31, // PKTCTRL0: asynchronous serial, TX on GDO0, RX on GDOx
    0x00, // ADDR
    0x00, // CHANNR
    0x0F, // FSCTRL1
    0x00, // FSCTRL0
    0x21, // FREQ2 \
    0x65, // FREQ1  | 868.3 MHz
    0x6A, // FREQ0 /
    0x6A, // MDMCFG4
    0x83, // MDMCFG3: 38.4 kbit/s
    0x10, // MDMCFG2: GFSK, no sync word
    0x22, // MDMCFG1
    0xF8, // MDMCFG0
    0x50, // DEVIATN
    0x07, // MCSM2
    0x30, // MCSM1
    0x18, // MCSM0
    0x16, // FOCCFG
    0x6C, // BSCFG
    0x43, // AGCCTRL2
    0x40, // AGCCTRL1
    0x91, // AGCCTRL0
    0x87, // WOREVT1
    0x6B, // WOREVT0
    0xF8, // WORCTRL
    0x56, // FREND1
    0x10, // FREND0
    0xE9, // FSCAL3
    0x21, // FSCAL2
    0x00, // FSCAL1
    0x1F, // FSCAL0
    0x41, // RCCTRL1
    0x00, // RCCTRL0
    0x59, // FSTEST
    0x7F, // PTEST
    0x3F, // AGCTEST
    0x81, // TEST2
    0x35, // TEST1
    0x09, // TEST0
];

const DEFAULT_PA: [u8; 8] = [0xC3, 0, 0, 0, 0, 0, 0, 0];

const FIFOTHR_IDX: usize = 3;

/// CC1101 driver, generic over its SPI device and reset line.
pub struct Cc1101<BUS, RESET> {
    bus: BUS,
    reset: RESET,
}

impl<BUS, RESET> Cc1101<BUS, RESET>
where
    BUS: SpiDevice,
    RESET: OutputPin,
{
    pub fn new(bus: BUS, reset: RESET) -> Self {
        Cc1101 { bus, reset }
    }

    fn transfer(&mut self, write: &[u8], read: &mut [u8]) -> Result<(), RadioError> {
        self.bus.transfer(read, write).map_err(|_| RadioError::Spi)
    }

    fn write_reg(&mut self, addr: u8, value: u8) -> Result<u8, RadioError> {
        let mut status = [0u8; 2];
        self.transfer(&[addr, value], &mut status)?;
        Ok(status[0])
    }

    fn read_reg(&mut self, addr: u8) -> Result<u8, RadioError> {
        let mut buf = [0u8; 2];
        self.transfer(&[addr | READ, 0], &mut buf)?;
        Ok(buf[1])
    }

    fn strobe(&mut self, cmd: u8) -> Result<u8, RadioError> {
        let mut buf = [0u8; 1];
        self.transfer(&[cmd], &mut buf)?;
        Ok(buf[0])
    }

    fn wait_for_state(
        &mut self,
        cmd: u8,
        want: ChipState,
        max_iters: u32,
    ) -> Result<(), RadioError> {
        for _ in 0..max_iters {
            let status = self.strobe(cmd)?;
            if chip_state(status) == want {
                return Ok(());
            }
        }
        #[cfg(feature = "defmt")]
        defmt::error!("Exceeded max iters on wait for state.");
        Err(RadioError::ModeTimeout)
    }

    /// Reset pulse, register bank + PA table upload, FIFO threshold tweak,
    /// then straight into RX. Timing mirrors `cc_init`'s assert/deassert
    /// pulse widths; `delay` is the caller's microsecond timer.
    pub fn init(&mut self, delay: &mut impl embedded_hal::delay::DelayNs) -> Result<(), RadioError> {
        self.reset.set_high().map_err(|_| RadioError::Spi)?;
        delay.delay_us(1);
        self.reset.set_low().map_err(|_| RadioError::Spi)?;
        delay.delay_us(10);
        self.reset.set_high().map_err(|_| RadioError::Spi)?;
        delay.delay_us(41);

        self.strobe(strobe::SRES)?;

        for (addr, &value) in DEFAULT_CFG.iter().enumerate() {
            self.write_reg(addr as u8, value)?;
        }
        for &value in DEFAULT_PA.iter() {
            self.write_reg(reg::PATABLE, value)?;
        }

        let fifothr = (DEFAULT_CFG[FIFOTHR_IDX] & 0xF0) + 14;
        self.write_reg(reg::FIFOTHR, fifothr)?;

        self.enter_rx()
    }

    pub fn enter_idle(&mut self) -> Result<(), RadioError> {
        self.wait_for_state(strobe::SIDLE, ChipState::Idle, 1000)
    }

    pub fn enter_rx(&mut self) -> Result<(), RadioError> {
        self.enter_idle()?;
        self.write_reg(reg::IOCFG0, 0x2E)?;
        self.write_reg(reg::PKTCTRL0, 0x32)?;
        self.strobe(strobe::SFRX)?;
        self.wait_for_state(strobe::SRX, ChipState::Rx, 1000)
    }

    pub fn enter_tx(&mut self) -> Result<(), RadioError> {
        self.enter_idle()?;
        self.write_reg(reg::PKTCTRL0, 0x02)?;
        self.write_reg(reg::IOCFG0, 0x02)?;
        self.strobe(strobe::SFTX)?;
        self.wait_for_state(strobe::STX, ChipState::Tx, 1000)
    }

    /// Switch GDO0 to rising-edge-on-empty once the TX FIFO has been fully
    /// drained, per `cc_fifo_end`.
    pub fn fifo_end(&mut self) -> Result<(), RadioError> {
        self.write_reg(reg::IOCFG0, 0x05)?;
        Ok(())
    }

    /// Read the RSSI status register and remap it into the 10..=138 range
    /// used throughout the message/frame layers (CC1101 datasheet §17.3).
    pub fn read_rssi(&mut self) -> Result<u8, RadioError> {
        let raw = self.read_reg(reg::RSSI | BURST)? as i8;
        let dbm = (raw as i32) / 2 - 74;
        let rssi = (-dbm) as u8;
        #[cfg(feature = "defmt")]
        defmt::debug!("rssi={}", rssi);
        Ok(rssi)
    }
}

impl<BUS, RESET> crate::framer::RadioFifo for Cc1101<BUS, RESET>
where
    BUS: SpiDevice,
    RESET: OutputPin,
{
    fn write_fifo(&mut self, byte: u8) -> u8 {
        self.write_reg(reg::FIFO, byte).unwrap_or(0) & 0x0F
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_38_4_kbit_mdmcfg3() {
        assert_eq!(DEFAULT_CFG[17], 0x83);
    }

    #[test]
    fn default_frequency_targets_868_3_mhz() {
        assert_eq!(&DEFAULT_CFG[13..16], &[0x21, 0x65, 0x6A]);
    }

    #[test]
    fn chip_state_decodes_status_nibble() {
        assert_eq!(chip_state(0x00), ChipState::Idle);
        assert_eq!(chip_state(0x10), ChipState::Rx);
        assert_eq!(chip_state(0x20), ChipState::Tx);
        assert_eq!(chip_state(0x60), ChipState::Other);
    }

    #[test]
    fn fifo_threshold_keeps_high_nibble_and_sets_low() {
        let thr = (DEFAULT_CFG[FIFOTHR_IDX] & 0xF0) + 14;
        assert_eq!(thr, 0x0E);
    }
}
