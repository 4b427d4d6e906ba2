//! Runtime stand-ins for the source's Kconfig options.
//!
//! The source picks `N_MSG`, the CC1101 SPI clock divider and the sync/
//! trailer bytes at compile time through `menuconfig`/`sdkconfig`. A Rust
//! crate meant to be vendored into different firmware is better served by a
//! small `Default`-able struct a caller can override at runtime than by a
//! preprocessor knob, so the Kconfig values below are exposed as `pub const`
//! defaults plus a [`RamsesConfig`] a caller can adjust before constructing
//! a [`crate::framer::Framer`].

use crate::message::Address;

/// Default message pool depth (`CONFIG_RAMSES_N_MSG` in the source).
pub const N_MSG: usize = 8;

/// Last 32 bits of `<training><sync word><header>` on the air.
pub const SYNC_WORD: u32 = 0x0033_5553;

/// End-of-frame marker byte.
pub const TRAILER: u8 = 0x35;

/// SPI clock divider the source applies via `cc_devcfg.clock_speed_hz`.
/// This crate never touches bus timing directly — `embedded_hal::spi::SpiDevice`
/// is already configured by the caller — so this constant exists purely to
/// carry the source's known-good value forward for callers setting up their
/// own bus.
pub const SPI_CLOCK_DIVIDER: u8 = 4;

/// Runtime configuration for a [`crate::framer::Framer`]. `Default` matches
/// the source's Kconfig defaults exactly.
#[derive(Copy, Clone, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RamsesConfig {
    pub sync_word: u32,
    pub trailer: u8,
    /// This gateway's own device address, used to rewrite operator-authored
    /// TX lines that address "this gateway" onto its real address (see
    /// [`crate::message::Record::rewrite_gateway_address`]).
    pub gateway_address: Address,
}

impl Default for RamsesConfig {
    fn default() -> Self {
        RamsesConfig {
            sync_word: SYNC_WORD,
            trailer: TRAILER,
            gateway_address: Address { class: 18, id: 0 },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_protocol_constants() {
        let cfg = RamsesConfig::default();
        assert_eq!(cfg.sync_word, SYNC_WORD);
        assert_eq!(cfg.trailer, TRAILER);
    }
}
