// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

//! Translation of logical offsets into physical locations.

use crate::Error;
use crate::Profile;
use crate::Variant;
use crate::DEFAULT_PAGE;

/// The physical location of one logical byte.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct Location {
    /// The index of the endpoint serving the byte.
    pub endpoint: usize,
    /// The upper page that must be selected to reach the byte, or `None` if
    /// the byte does not depend on the page-select register.
    pub page: Option<u8>,
    /// The offset of the byte within the endpoint's window.
    pub offset: usize,
}

impl Location {
    /// Return the page number of this location.
    ///
    /// Locations that don't depend on the page-select register report the
    /// default page.
    pub fn page(&self) -> u8 {
        self.page.unwrap_or(DEFAULT_PAGE)
    }

    /// Return `true` if reaching this location requires the page-select
    /// register to hold [`Location::page`].
    pub fn is_paged(&self) -> bool {
        self.page.is_some()
    }
}

impl Profile {
    /// Map a logical offset onto the endpoint, page and physical offset that
    /// serve it.
    ///
    /// This is pure: it consults nothing but the profile, and in particular
    /// does not check whether a given module actually supports the page. An
    /// offset beyond the profile's address space is an error.
    pub fn translate(&self, offset: usize) -> Result<Location, Error> {
        if offset >= self.paged_total_size {
            return Err(Error::OutOfRange { offset, len: 1 });
        }
        Ok(self.locate(offset))
    }

    // Translate an offset known to be inside the address space.
    pub(crate) fn locate(&self, offset: usize) -> Location {
        let fixed = self.fixed_size();
        if matches!(self.variant, Variant::Flat) || offset < fixed {
            return Location {
                endpoint: offset / self.window_size,
                page: None,
                offset: offset % self.window_size,
            };
        }

        let endpoint = self.paging_endpoint();
        let half = self.page_size();
        let remaining = offset - fixed;
        if remaining < half {
            return Location {
                endpoint,
                page: None,
                offset: remaining,
            };
        }

        // Since `remaining >= half`, the page is never negative. Profile
        // validation bounds the page count to what fits in the select byte.
        let page = (remaining / half - 1) as u8;
        Location {
            endpoint,
            page: Some(page),
            offset: half + remaining % half,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Location;
    use crate::Error;
    use crate::Profile;

    #[test]
    fn test_translate_qsfp_lower() {
        let loc = Profile::SFF_8436.translate(0x7f).unwrap();
        assert_eq!(
            loc,
            Location {
                endpoint: 0,
                page: None,
                offset: 0x7f
            }
        );
        assert_eq!(loc.page(), 0);
        assert!(!loc.is_paged());
    }

    #[test]
    fn test_translate_qsfp_upper_pages() {
        let qsfp = Profile::SFF_8436;
        for (offset, page, phys) in [
            (128, 0, 128),
            (255, 0, 255),
            (256, 1, 128),
            (300, 1, 172),
            (639, 3, 255),
        ] {
            let loc = qsfp.translate(offset).unwrap();
            assert_eq!(loc.endpoint, 0);
            assert_eq!(loc.page, Some(page), "offset {offset}");
            assert_eq!(loc.offset, phys, "offset {offset}");
        }
    }

    #[test]
    fn test_translate_sfp() {
        let sfp = Profile::SFF_8472;

        // A0h is flat, including its upper half.
        let loc = sfp.translate(200).unwrap();
        assert_eq!(loc.endpoint, 0);
        assert_eq!(loc.offset, 200);
        assert!(!loc.is_paged());

        // The lower half of A2h.
        let loc = sfp.translate(300).unwrap();
        assert_eq!(
            loc,
            Location {
                endpoint: 1,
                page: None,
                offset: 44
            }
        );

        let loc = sfp.translate(384).unwrap();
        assert_eq!(loc.endpoint, 1);
        assert_eq!(loc.page, Some(0));
        assert_eq!(loc.offset, 128);

        let loc = sfp.translate(sfp.paged_total_size - 1).unwrap();
        assert_eq!(loc.page, Some(127));
        assert_eq!(loc.offset, 255);
    }

    #[test]
    fn test_translate_flat() {
        let loc = Profile::FLAT_256.translate(200).unwrap();
        assert_eq!(loc.endpoint, 0);
        assert_eq!(loc.offset, 200);
        assert!(!loc.is_paged());
    }

    #[test]
    fn test_translate_out_of_range() {
        assert_eq!(
            Profile::SFF_8436.translate(640),
            Err(Error::OutOfRange {
                offset: 640,
                len: 1
            })
        );
    }

    #[test]
    fn test_translate_is_deterministic() {
        let sfp = Profile::SFF_8472;
        for offset in (0..sfp.paged_total_size).step_by(37) {
            assert_eq!(sfp.translate(offset), sfp.translate(offset));
        }
    }
}
