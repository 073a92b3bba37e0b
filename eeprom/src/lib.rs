// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

//! Read and write access to the paged memory of pluggable transceiver
//! modules.
//!
//! A [`Device`] wraps one module's bus endpoints and presents its memory as a
//! single linear address space, as laid out by a
//! [`transceiver_map::Profile`]. Each logical access is checked against what
//! the module currently supports, split into window-bounded chunks, and
//! carried out through a [`Transport`], selecting pages as needed and putting
//! the module back on its default page afterwards.

pub mod clock;
pub mod config;
mod device;
#[cfg(target_os = "linux")]
pub mod i2c;
pub mod results;
pub mod retry;
pub mod sim;
mod transfer;
pub mod transport;

pub use clock::Clock;
pub use clock::ManualClock;
pub use clock::SystemClock;
pub use config::Config;
pub use config::ConfigBuilder;
pub use device::Device;
pub use results::ReadResult;
pub use results::TransferResult;
pub use results::WriteResult;
pub use transceiver_map::Profile;
pub use transport::BusError;
pub use transport::Endpoint;
pub use transport::Transport;

use thiserror::Error;
use transceiver_map::Error as MapError;

#[usdt::provider(provider = "xcvr__eeprom")]
mod probes {
    fn transfer__start(offset: u64, len: u64, write: u8) {}
    fn transfer__done(offset: u64, n_bytes: u64) {}
    fn page__select(address: u8, page: u8) {}
}

/// An error accessing a transceiver module's memory.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Access of {len} bytes at offset {offset} is out of range")]
    OutOfRange { offset: usize, len: usize },

    #[error("No module responded at address {endpoint}")]
    DeviceAbsent { endpoint: Endpoint },

    #[error("Timed out accessing {len} bytes at register 0x{register:02x} of {endpoint}")]
    Timeout {
        endpoint: Endpoint,
        register: u8,
        len: usize,
    },

    #[error("Transfer failed after {transferred} bytes")]
    PartialTransfer {
        transferred: usize,
        #[source]
        source: Box<Error>,
    },

    #[error("Failed to restore the page-select register from page {page}")]
    PageRestoreFailed {
        page: u8,
        #[source]
        source: Box<Error>,
    },

    #[error("Device is busy with another transfer")]
    Busy,

    #[error("Invalid device profile: {0}")]
    InvalidProfile(&'static str),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("I/O error")]
    Io(#[from] std::io::Error),
}

impl From<MapError> for Error {
    fn from(e: MapError) -> Self {
        match e {
            MapError::OutOfRange { offset, len } => Error::OutOfRange { offset, len },
            MapError::InvalidProfile(why) => Error::InvalidProfile(why),
        }
    }
}
