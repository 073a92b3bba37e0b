// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

//! Static descriptions of module memory-map families.

use crate::Error;
use serde::Deserialize;
use serde::Serialize;
use static_assertions::const_assert;

/// How a module's memory is laid out across its endpoints.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Variant {
    /// Every endpoint exposes one fixed window. The page-select register is
    /// never used and the capability register is never consulted.
    Flat,
    /// All endpoints but the last expose one fixed window. The last endpoint
    /// has a fixed lower half, and an upper half mapped to the selected page.
    LowerUpperPaged,
}

/// The sense of the capability bit describing whether a module pages.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CapabilityMeaning {
    /// The module supports paging when the bit is set (SFF-8472).
    BitSetMeansPageable,
    /// The module has flat memory when the bit is set (SFF-8436 / SFF-8636).
    BitSetMeansNotPageable,
}

/// The outcome of checking an access against the part of the map that needs
/// no knowledge of the module's capabilities.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Legality {
    /// The access is legal with the contained length.
    Fits(usize),
    /// The access extends into paged memory, and its legal length depends on
    /// whether the module supports paging.
    NeedsCapability,
}

/// Description of the addressing scheme of a family of modules.
///
/// A profile lays out the linear address space a caller sees. For a
/// [`Variant::LowerUpperPaged`] profile, that space is every fixed window in
/// turn, then the paging endpoint's lower half, then each page's upper half in
/// page order. For example, the QSFP layout is:
///
/// ```text
/// logical     0..128   endpoint 0, lower half
/// logical   128..256   endpoint 0, page 0 (upper half)
/// logical   256..384   endpoint 0, page 1 (upper half)
/// ...
/// ```
///
/// The "unpaged" region is everything legal to access without first asking
/// the module whether it supports paging.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Profile {
    /// The size of the window exposed at each endpoint.
    pub window_size: usize,
    /// The number of bus endpoints, 1 or 2.
    pub endpoint_count: u8,
    /// The size of the address space reachable without consulting the
    /// capability register.
    pub unpaged_size: usize,
    /// The size of the full address space, including all supported pages.
    pub paged_total_size: usize,
    /// The offset of the capability register, on endpoint 0.
    pub capability_register: u8,
    /// The bit within the capability register describing paging support.
    pub capability_mask: u8,
    /// The sense of `capability_mask`.
    pub capability_meaning: CapabilityMeaning,
    /// The overall layout of the map.
    pub variant: Variant,
}

// Fundamental unit of addressing in SFF-8436 and SFF-8472.
const HALF: usize = 128;

// SFF-8436 specifies upper pages 0 through 3.
const SFF_8436_PAGES: usize = 4;

// SFF-8472 leaves room for many more pages on A2h than it defines.
const SFF_8472_PAGES: usize = 128;

impl Profile {
    /// QSFP-style modules conforming to SFF-8436 or SFF-8636.
    ///
    /// A single endpoint (A0h), with byte 2 bit 2 ("flat memory") set when the
    /// module does not support paging.
    pub const SFF_8436: Self = Self {
        window_size: 2 * HALF,
        endpoint_count: 1,
        unpaged_size: 2 * HALF,
        paged_total_size: (1 + SFF_8436_PAGES) * HALF,
        capability_register: 0x02,
        capability_mask: 1 << 2,
        capability_meaning: CapabilityMeaning::BitSetMeansNotPageable,
        variant: Variant::LowerUpperPaged,
    };

    /// SFP-style modules conforming to SFF-8472.
    ///
    /// A fixed 256-byte window at A0h, followed by A2h whose upper half is
    /// paged. Byte 64 bit 4 of A0h is set when paging is implemented.
    pub const SFF_8472: Self = Self {
        window_size: 2 * HALF,
        endpoint_count: 2,
        unpaged_size: 4 * HALF,
        paged_total_size: (3 + SFF_8472_PAGES) * HALF,
        capability_register: 0x40,
        capability_mask: 1 << 4,
        capability_meaning: CapabilityMeaning::BitSetMeansPageable,
        variant: Variant::LowerUpperPaged,
    };

    /// A plain 256-byte EEPROM behind a single endpoint.
    pub const FLAT_256: Self = Self {
        window_size: 2 * HALF,
        endpoint_count: 1,
        unpaged_size: 2 * HALF,
        paged_total_size: 2 * HALF,
        capability_register: 0,
        capability_mask: 0,
        capability_meaning: CapabilityMeaning::BitSetMeansPageable,
        variant: Variant::Flat,
    };

    /// Check that the geometry of the profile is self-consistent.
    pub fn validate(&self) -> Result<(), Error> {
        if self.window_size != 128 && self.window_size != 256 {
            return Err(Error::InvalidProfile("window size must be 128 or 256"));
        }
        if !matches!(self.endpoint_count, 1 | 2) {
            return Err(Error::InvalidProfile("endpoint count must be 1 or 2"));
        }
        if self.unpaged_size == 0 || self.unpaged_size > self.paged_total_size {
            return Err(Error::InvalidProfile(
                "unpaged size must be nonzero and no larger than the total size",
            ));
        }
        let windows = usize::from(self.endpoint_count) * self.window_size;
        match self.variant {
            Variant::Flat => {
                if self.paged_total_size != windows || self.unpaged_size != windows {
                    return Err(Error::InvalidProfile(
                        "flat profiles must cover exactly their windows",
                    ));
                }
            }
            Variant::LowerUpperPaged => {
                let half = self.page_size();
                let fixed = self.fixed_size();
                let paged = self.paged_total_size.saturating_sub(fixed);
                if paged < self.window_size || paged % half != 0 {
                    return Err(Error::InvalidProfile(
                        "paged size must be whole pages beyond the lower half",
                    ));
                }
                if self.page_count() > usize::from(u8::MAX) + 1 {
                    return Err(Error::InvalidProfile(
                        "pages must be selectable with one byte",
                    ));
                }
                if self.unpaged_size < fixed + half {
                    return Err(Error::InvalidProfile(
                        "unpaged size must cover the paging endpoint's lower half",
                    ));
                }
                if self.capability_mask == 0 {
                    return Err(Error::InvalidProfile("capability mask is empty"));
                }
                // The capability register must not move with the page.
                let limit = if self.endpoint_count == 1 {
                    half
                } else {
                    self.window_size
                };
                if usize::from(self.capability_register) >= limit {
                    return Err(Error::InvalidProfile(
                        "capability register must be in fixed memory",
                    ));
                }
            }
        }
        Ok(())
    }

    /// The size of one page, which is half a window.
    pub const fn page_size(&self) -> usize {
        self.window_size / 2
    }

    /// The offset of the page-select byte, the last byte of the paging
    /// endpoint's lower half.
    pub const fn page_select_register(&self) -> u8 {
        (self.page_size() - 1) as u8
    }

    /// The index of the endpoint carrying the page-select register.
    pub const fn paging_endpoint(&self) -> usize {
        self.endpoint_count as usize - 1
    }

    /// The size of the address space served by endpoints that never page.
    pub const fn fixed_size(&self) -> usize {
        match self.variant {
            Variant::Flat => self.paged_total_size,
            Variant::LowerUpperPaged => self.paging_endpoint() * self.window_size,
        }
    }

    /// The number of upper pages the profile can address.
    pub const fn page_count(&self) -> usize {
        match self.variant {
            Variant::Flat => 0,
            Variant::LowerUpperPaged => {
                let half = self.page_size();
                (self.paged_total_size - self.fixed_size() - half) / half
            }
        }
    }

    /// Interpret a value read from the capability register.
    pub const fn is_pageable(&self, capability: u8) -> bool {
        let set = capability & self.capability_mask != 0;
        match self.capability_meaning {
            CapabilityMeaning::BitSetMeansPageable => set,
            CapabilityMeaning::BitSetMeansNotPageable => !set,
        }
    }

    /// Check an access against the region legal for every module of this
    /// family.
    ///
    /// If the whole access fits in unpaged memory, it's returned as-is. An
    /// access starting beyond the whole address space is rejected. Otherwise,
    /// the caller needs to consult the module's capability register and then
    /// call [`Profile::clamp`].
    pub fn check_unpaged(&self, offset: usize, len: usize) -> Result<Legality, Error> {
        if offset.saturating_add(len) <= self.unpaged_size {
            return Ok(Legality::Fits(len));
        }
        if offset >= self.paged_total_size {
            return Err(Error::OutOfRange { offset, len });
        }
        match self.variant {
            Variant::Flat => self.clamp(offset, len, false).map(Legality::Fits),
            Variant::LowerUpperPaged => Ok(Legality::NeedsCapability),
        }
    }

    /// Truncate an access to what a module with the given paging support can
    /// serve.
    ///
    /// The access is rejected if it starts beyond that limit, and silently
    /// shortened if it only ends beyond it.
    pub fn clamp(&self, offset: usize, len: usize, pageable: bool) -> Result<usize, Error> {
        let limit = if pageable {
            self.paged_total_size
        } else {
            self.unpaged_size
        };
        if offset >= limit {
            return Err(Error::OutOfRange { offset, len });
        }
        Ok(len.min(limit - offset))
    }
}

const_assert!(Profile::SFF_8436.unpaged_size <= Profile::SFF_8436.paged_total_size);
const_assert!(Profile::SFF_8472.unpaged_size <= Profile::SFF_8472.paged_total_size);
const_assert!(Profile::SFF_8472.page_count() == SFF_8472_PAGES);
const_assert!(Profile::SFF_8436.page_count() == SFF_8436_PAGES);

#[cfg(test)]
mod tests {
    use super::CapabilityMeaning;
    use super::Legality;
    use super::Profile;
    use super::Variant;
    use crate::Error;

    #[test]
    fn test_builtin_profiles_are_valid() {
        Profile::SFF_8436.validate().unwrap();
        Profile::SFF_8472.validate().unwrap();
        Profile::FLAT_256.validate().unwrap();
    }

    #[test]
    fn test_geometry() {
        let qsfp = Profile::SFF_8436;
        assert_eq!(qsfp.page_size(), 128);
        assert_eq!(qsfp.paging_endpoint(), 0);
        assert_eq!(qsfp.fixed_size(), 0);
        assert_eq!(qsfp.page_count(), 4);
        assert_eq!(qsfp.page_select_register(), 0x7f);

        let sfp = Profile::SFF_8472;
        assert_eq!(sfp.paging_endpoint(), 1);
        assert_eq!(sfp.fixed_size(), 256);
        assert_eq!(sfp.page_count(), 128);
    }

    #[test]
    fn test_validate_rejects_bad_geometry() {
        let mut p = Profile::SFF_8436;
        p.window_size = 200;
        assert!(matches!(p.validate(), Err(Error::InvalidProfile(_))));

        let mut p = Profile::SFF_8436;
        p.endpoint_count = 3;
        assert!(matches!(p.validate(), Err(Error::InvalidProfile(_))));

        let mut p = Profile::SFF_8436;
        p.paged_total_size = 700;
        assert!(matches!(p.validate(), Err(Error::InvalidProfile(_))));

        let mut p = Profile::SFF_8436;
        p.unpaged_size = 1024;
        assert!(matches!(p.validate(), Err(Error::InvalidProfile(_))));

        let mut p = Profile::SFF_8436;
        p.capability_register = 0x90;
        assert!(matches!(p.validate(), Err(Error::InvalidProfile(_))));

        let mut p = Profile::SFF_8436;
        p.paged_total_size = 128 + 300 * 128;
        assert!(matches!(p.validate(), Err(Error::InvalidProfile(_))));

        let mut p = Profile::FLAT_256;
        p.paged_total_size = 512;
        assert!(matches!(p.validate(), Err(Error::InvalidProfile(_))));
    }

    #[test]
    fn test_capability_meaning() {
        let qsfp = Profile::SFF_8436;
        assert!(qsfp.is_pageable(0x00));
        assert!(!qsfp.is_pageable(0x04));
        assert!(qsfp.is_pageable(0xfb));

        let sfp = Profile::SFF_8472;
        assert!(!sfp.is_pageable(0x00));
        assert!(sfp.is_pageable(0x10));
    }

    #[test]
    fn test_check_unpaged() {
        let qsfp = Profile::SFF_8436;
        assert_eq!(qsfp.check_unpaged(0, 256), Ok(Legality::Fits(256)));
        assert_eq!(qsfp.check_unpaged(100, 50), Ok(Legality::Fits(50)));
        assert_eq!(qsfp.check_unpaged(200, 100), Ok(Legality::NeedsCapability));
        assert_eq!(
            qsfp.check_unpaged(640, 1),
            Err(Error::OutOfRange {
                offset: 640,
                len: 1
            })
        );
        assert_eq!(qsfp.check_unpaged(0, usize::MAX), Ok(Legality::NeedsCapability));
    }

    #[test]
    fn test_check_unpaged_flat_truncates_without_capability() {
        let flat = Profile::FLAT_256;
        assert_eq!(flat.check_unpaged(250, 10), Ok(Legality::Fits(6)));
        assert!(flat.check_unpaged(256, 1).is_err());
    }

    #[test]
    fn test_clamp() {
        let qsfp = Profile::SFF_8436;
        assert_eq!(qsfp.clamp(200, 1000, true), Ok(440));
        assert_eq!(qsfp.clamp(200, 10, true), Ok(10));
        assert_eq!(qsfp.clamp(200, 1000, false), Ok(56));
        assert_eq!(
            qsfp.clamp(256, 10, false),
            Err(Error::OutOfRange {
                offset: 256,
                len: 10
            })
        );
    }

    #[test]
    fn test_profile_from_json() {
        let json = r#"{
            "window_size": 256,
            "endpoint_count": 1,
            "unpaged_size": 256,
            "paged_total_size": 384,
            "capability_register": 2,
            "capability_mask": 4,
            "capability_meaning": "bit_set_means_not_pageable",
            "variant": "lower_upper_paged"
        }"#;
        let p: Profile = serde_json::from_str(json).unwrap();
        assert_eq!(p.capability_meaning, CapabilityMeaning::BitSetMeansNotPageable);
        assert_eq!(p.variant, Variant::LowerUpperPaged);
        assert_eq!(p.page_count(), 2);
        p.validate().unwrap();
    }
}
