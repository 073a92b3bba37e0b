// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

#![cfg_attr(all(not(test), not(feature = "std")), no_std)]

//! Addressing of paged transceiver module memory maps.
//!
//! Pluggable modules expose their memory through one or two 256-byte windows,
//! each reachable at a fixed two-wire bus address. The lower half of a window
//! is fixed; on the paging endpoint the upper half is re-mapped to whichever
//! page was last written to the page-select byte, the last byte of the lower
//! half (`0x7F` for 256-byte windows).
//!
//! This crate flattens that arrangement into one linear, page-transparent
//! address space. A [`Profile`] describes a module family, and provides the
//! mapping from a logical offset to a concrete [`Location`] as well as the
//! decomposition of a logical range into window-bounded [`Chunk`]s. Nothing
//! here performs any I/O.

pub mod chunk;
pub mod profile;
pub mod translate;

pub use chunk::Chunk;
pub use chunk::Chunks;
pub use profile::CapabilityMeaning;
pub use profile::Legality;
pub use profile::Profile;
pub use profile::Variant;
pub use translate::Location;

/// The page selected when a module is in its default state.
pub const DEFAULT_PAGE: u8 = 0;

/// An error related to the layout of a module memory map.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "std", derive(thiserror::Error))]
pub enum Error {
    /// An access starting outside of the addressable range of a profile, or
    /// outside of what the module currently supports.
    #[cfg_attr(
        feature = "std",
        error("Access of {len} bytes at offset {offset} is out of range")
    )]
    OutOfRange { offset: usize, len: usize },

    /// A profile whose geometry is inconsistent.
    #[cfg_attr(feature = "std", error("Invalid device profile: {0}"))]
    InvalidProfile(&'static str),
}
