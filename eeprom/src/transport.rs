// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

//! The byte-level bus underneath a device.

use std::fmt;
use thiserror::Error;
use transceiver_map::Profile;

/// A two-wire bus address at which one window of module memory is exposed.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Endpoint(pub u8);

impl Endpoint {
    /// The primary module address, `A0h` in 8-bit notation.
    pub const A0: Self = Self(0x50);

    /// The diagnostic address of SFF-8472 modules, `A2h` in 8-bit notation.
    pub const A2: Self = Self(0x51);

    /// Return the 7-bit bus address.
    pub const fn address(&self) -> u8 {
        self.0
    }

    /// Return the conventional endpoints for a profile, starting at `A0h`.
    pub fn defaults_for(profile: &Profile) -> Vec<Self> {
        (0..profile.endpoint_count)
            .map(|i| Self(Self::A0.0 + i))
            .collect()
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:02x}", self.0)
    }
}

/// A failed physical operation, as reported by a [`Transport`].
#[derive(Clone, Copy, Debug, Eq, Error, PartialEq)]
pub enum BusError {
    /// Nothing acknowledged the address. Retrying will not help.
    #[error("No device responded")]
    Absent,

    /// The device is busy or the bus hiccuped. A later attempt may succeed.
    #[error("Transient bus failure")]
    Transient,
}

/// A primitive for single physical transfers on a two-wire bus.
///
/// Implementations perform one transaction per call and report how many bytes
/// moved. A short count is legal, and is treated like a transient failure by
/// the caller. Whether the transaction is a native block transfer or a
/// byte-wise fallback is up to the implementation, which can advertise its
/// limits through [`Transport::max_read_len`] and
/// [`Transport::max_write_len`].
pub trait Transport: Send {
    /// Read `buf.len()` bytes starting at `register` of `endpoint`.
    fn read(&mut self, endpoint: Endpoint, register: u8, buf: &mut [u8]) -> Result<usize, BusError>;

    /// Write `data` starting at `register` of `endpoint`.
    fn write(&mut self, endpoint: Endpoint, register: u8, data: &[u8]) -> Result<usize, BusError>;

    /// The largest read this transport can perform in one transaction.
    fn max_read_len(&self) -> usize {
        usize::MAX
    }

    /// The largest write this transport can perform in one transaction.
    fn max_write_len(&self) -> usize {
        usize::MAX
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn read(&mut self, endpoint: Endpoint, register: u8, buf: &mut [u8]) -> Result<usize, BusError> {
        (**self).read(endpoint, register, buf)
    }

    fn write(&mut self, endpoint: Endpoint, register: u8, data: &[u8]) -> Result<usize, BusError> {
        (**self).write(endpoint, register, data)
    }

    fn max_read_len(&self) -> usize {
        (**self).max_read_len()
    }

    fn max_write_len(&self) -> usize {
        (**self).max_write_len()
    }
}
