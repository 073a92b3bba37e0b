// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

//! Splitting logical accesses into window-bounded chunks.
//!
//! Once a logical range is translated, no single physical operation may cross
//! from one half-window into the next: the next half may live on another
//! endpoint, or behind another page. Every access is therefore cut at each
//! multiple of the page size. The first chunk may start mid-page and the last
//! may end mid-page, while all others cover exactly one page.

use crate::Error;
use crate::Location;
use crate::Profile;

/// A piece of a logical access served by a single page of a single endpoint.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Chunk {
    /// The logical offset of the first byte of the chunk.
    pub start: usize,
    /// The number of bytes in the chunk.
    pub len: usize,
    /// The physical location of the first byte of the chunk.
    pub location: Location,
}

impl Chunk {
    /// The logical offset one past the last byte of the chunk.
    pub fn end(&self) -> usize {
        self.start + self.len
    }
}

/// An iterator over the chunks of a logical access.
///
/// See [`Profile::chunks`].
#[derive(Clone, Debug)]
pub struct Chunks<'a> {
    profile: &'a Profile,
    next: usize,
    end: usize,
}

impl Iterator for Chunks<'_> {
    type Item = Chunk;

    fn next(&mut self) -> Option<Chunk> {
        if self.next >= self.end {
            return None;
        }
        let half = self.profile.page_size();
        let boundary = (self.next / half + 1) * half;
        let stop = self.end.min(boundary);
        let chunk = Chunk {
            start: self.next,
            len: stop - self.next,
            location: self.profile.locate(self.next),
        };
        self.next = stop;
        Some(chunk)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        if self.next >= self.end {
            return (0, Some(0));
        }
        let half = self.profile.page_size();
        let n = (self.end - 1) / half - self.next / half + 1;
        (n, Some(n))
    }
}

impl ExactSizeIterator for Chunks<'_> {}

impl Profile {
    /// Split the logical range `[offset, offset + len)` into chunks.
    ///
    /// The whole range must lie within the profile's address space. Whether
    /// the module in hand supports that range is a separate question, see
    /// [`Profile::check_unpaged`].
    pub fn chunks(&self, offset: usize, len: usize) -> Result<Chunks<'_>, Error> {
        match offset.checked_add(len) {
            Some(end) if end <= self.paged_total_size => Ok(Chunks {
                profile: self,
                next: offset,
                end,
            }),
            _ => Err(Error::OutOfRange { offset, len }),
        }
    }
}
