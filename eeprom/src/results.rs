// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

//! Types for handling the outcome of a completed transfer.
//!
//! After a paged access, the device writes the page-select register back to
//! the default page. That write can fail even though all of the requested
//! data moved correctly. Discarding good data over it would be wrong, and so
//! would hiding the failure: the module is now sitting on a non-default page.
//!
//! This is different from Rust's common `Result`, which is either a successful
//! value _or_ an error. We need both, so a successful transfer returns a
//! [`TransferResult`], holding the data and, separately, any failure to
//! restore the page.

use crate::Error;

/// The result of a transfer whose data moved successfully.
#[derive(Debug)]
pub struct TransferResult<P> {
    /// The data produced by the transfer.
    pub data: P,
    /// The failure to restore the default page afterwards, if any. This is
    /// always [`Error::PageRestoreFailed`].
    pub page_restore: Option<Error>,
}

/// The result of reading module memory.
pub type ReadResult = TransferResult<Vec<u8>>;

impl ReadResult {
    /// Return the data read from the module.
    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

/// The result of writing module memory: the number of bytes written.
pub type WriteResult = TransferResult<usize>;

impl WriteResult {
    /// Return the number of bytes written to the module.
    pub fn count(&self) -> usize {
        self.data
    }
}

impl<P> TransferResult<P> {
    /// Return a result with no restore failure.
    pub fn clean(data: P) -> Self {
        Self {
            data,
            page_restore: None,
        }
    }

    /// Return `true` if the device was left on its default page.
    pub fn is_clean(&self) -> bool {
        self.page_restore.is_none()
    }

    /// Return the data, discarding any restore failure.
    pub fn into_data(self) -> P {
        self.data
    }

    /// Convert into a plain `Result`, treating a restore failure as fatal.
    pub fn into_result(self) -> Result<P, Error> {
        match self.page_restore {
            None => Ok(self.data),
            Some(e) => Err(e),
        }
    }

    /// Transform the data, keeping any restore failure.
    pub fn map<Q>(self, f: impl FnOnce(P) -> Q) -> TransferResult<Q> {
        TransferResult {
            data: f(self.data),
            page_restore: self.page_restore,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::ReadResult;
    use super::WriteResult;
    use crate::Error;

    #[test]
    fn test_clean_result() {
        let result = ReadResult::clean(vec![1, 2, 3]);
        assert!(result.is_clean());
        assert_eq!(result.data(), &[1, 2, 3]);
        assert_eq!(result.into_result().unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn test_restore_failure_keeps_data() {
        let result = WriteResult {
            data: 8,
            page_restore: Some(Error::PageRestoreFailed {
                page: 2,
                source: Box::new(Error::Busy),
            }),
        };
        assert!(!result.is_clean());
        assert_eq!(result.count(), 8);
        assert!(matches!(
            result.into_result(),
            Err(Error::PageRestoreFailed { page: 2, .. })
        ));
    }
}
