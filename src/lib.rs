//! RAMSES radio framing and message codec core.
//!
//! Bridges a CC1101 sub-GHz FSK transceiver's raw on-air bytes to structured
//! [`message::Record`]s, and back. Host transport (MQTT, console, NVS,
//! Wi-Fi bring-up) is out of scope; this crate only owns the framing,
//! Manchester codec, message parse/scan/serialize state machines, the
//! CC1101 driver facade, and the fixed-size record pool that hands completed
//! records between the two directions.

#![cfg_attr(not(test), no_std)]

pub mod config;
pub mod error;
pub mod framer;
pub mod manchester;
pub mod message;
pub mod parser;
pub mod pool;
pub mod radio;
pub mod scanner;
pub mod serializer;

pub use config::RamsesConfig;
pub use error::{RadioError, RamsesError};
pub use framer::{Framer, RadioFifo, TxProgress};
pub use message::{Address, MsgType, Record};
pub use pool::{Handle, Pool};
pub use radio::Cc1101;
pub use scanner::Scanner;
