//! Error kinds for the message codec and the radio facade.

/// A fault detected while assembling or validating a RAMSES message record.
///
/// The source treats `0` as "no error"; here absence of an error is
/// `Option<RamsesError>` on the record rather than a dedicated `Ok` variant.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RamsesError {
    /// A body octet did not decode to a valid Manchester symbol.
    ManchesterErr,
    /// The running checksum over the record did not sum to zero.
    ChecksumErr,
    /// More body bytes arrived than the raw buffer has capacity for.
    OverrunErr,
    /// A promised optional field, or the declared payload length, was short.
    TruncatedErr,
    /// Legacy pre-synch-loss condition: a second sync word arrived mid-frame.
    CollisionErr,
    /// Legacy pre-synch-loss condition: sync tracking was lost mid-frame.
    SyncErr,
    /// The textual scanner rejected operator-supplied TX input.
    BadTx,
}

impl core::fmt::Display for RamsesError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let s = match self {
            RamsesError::ManchesterErr => "manchester error",
            RamsesError::ChecksumErr => "checksum error",
            RamsesError::OverrunErr => "overrun error",
            RamsesError::TruncatedErr => "truncated",
            RamsesError::CollisionErr => "collision",
            RamsesError::SyncErr => "sync lost",
            RamsesError::BadTx => "bad tx input",
        };
        f.write_str(s)
    }
}

/// A fault talking to the CC1101 over SPI.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RadioError {
    /// The SPI transaction itself failed.
    Spi,
    /// The chip never reached the requested state.
    ModeTimeout,
}

impl core::fmt::Display for RadioError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let s = match self {
            RadioError::Spi => "spi error",
            RadioError::ModeTimeout => "mode transition timed out",
        };
        f.write_str(s)
    }
}
