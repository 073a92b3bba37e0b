// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

//! An in-memory transceiver module, for testing and for running the tools
//! without hardware.

use crate::BusError;
use crate::Endpoint;
use crate::Error;
use crate::Transport;
use transceiver_map::Profile;
use transceiver_map::Variant;
use transceiver_map::DEFAULT_PAGE;

/// A failure to inject into the operations of a [`SimulatedModule`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Fault {
    /// The module does not acknowledge its address.
    Absent,
    /// The module NAKs, as it does during an internal write.
    Transient,
    /// The transaction ends early, moving fewer bytes than asked.
    Short,
}

/// A physical operation issued to a [`SimulatedModule`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Op {
    Read {
        endpoint: Endpoint,
        register: u8,
        len: usize,
    },
    Write {
        endpoint: Endpoint,
        register: u8,
        data: Vec<u8>,
    },
}

// What happens to an operation the module acknowledged.
enum Admission {
    Proceed(usize),
    Short,
}

#[derive(Clone, Copy, Debug)]
struct FaultPlan {
    // Operations to let through before failing.
    skip: usize,
    // Operations to fail after that.
    count: usize,
    fault: Fault,
}

/// A module whose memory lives in RAM.
///
/// Each endpoint exposes one window. On a paged profile, the upper half of the
/// paging endpoint shows whichever page the page-select register holds, and
/// the register itself reads back the selected page. Selecting a page the
/// module doesn't have leaves it on the default page.
///
/// Every physical operation, including failed ones, is recorded.
#[derive(Clone, Debug)]
pub struct SimulatedModule {
    profile: Profile,
    endpoints: Vec<Endpoint>,
    windows: Vec<Vec<u8>>,
    pages: Vec<Vec<u8>>,
    page: u8,
    present: bool,
    fault: Option<FaultPlan>,
    page_select_budget: usize,
    max_transfer: usize,
    ops: Vec<Op>,
    selects: Vec<u8>,
}

impl SimulatedModule {
    /// Create a module with zeroed memory, on the conventional endpoints for
    /// `profile`.
    ///
    /// A module with zeroed memory supports paging under SFF-8436, and does not
    /// under SFF-8472. See [`SimulatedModule::set_pageable`].
    pub fn new(profile: Profile) -> Result<Self, Error> {
        profile.validate()?;
        let endpoints = Endpoint::defaults_for(&profile);
        let windows = vec![vec![0; profile.window_size]; endpoints.len()];
        let pages = vec![vec![0; profile.page_size()]; profile.page_count()];
        Ok(Self {
            profile,
            endpoints,
            windows,
            pages,
            page: DEFAULT_PAGE,
            present: true,
            fault: None,
            page_select_budget: usize::MAX,
            max_transfer: usize::MAX,
            ops: Vec::new(),
            selects: Vec::new(),
        })
    }

    /// Create a module holding `image` at the start of its logical address
    /// space.
    ///
    /// The page-select register is not part of the module's storage, and
    /// reads back as the default page regardless of the image.
    pub fn from_linear(profile: Profile, image: &[u8]) -> Result<Self, Error> {
        let mut module = Self::new(profile)?;
        if image.len() > profile.paged_total_size {
            return Err(Error::OutOfRange {
                offset: 0,
                len: image.len(),
            });
        }
        for (offset, byte) in image.iter().enumerate() {
            *module.storage_mut(offset)? = *byte;
        }
        Ok(module)
    }

    /// Return the module's logical address space as one image.
    pub fn linear(&self) -> Vec<u8> {
        (0..self.profile.paged_total_size)
            .filter_map(|offset| self.profile.translate(offset).ok())
            .map(|location| match location.page {
                Some(page) => self.pages[usize::from(page)][location.offset - self.profile.page_size()],
                None => self.read_byte(location.endpoint, location.offset, self.page),
            })
            .collect()
    }

    pub fn profile(&self) -> &Profile {
        &self.profile
    }

    pub fn endpoints(&self) -> &[Endpoint] {
        &self.endpoints
    }

    /// Return the page currently held by the page-select register.
    pub fn page(&self) -> u8 {
        self.page
    }

    /// Set the module's capability bit to advertise paging, or not.
    pub fn set_pageable(&mut self, pageable: bool) {
        if matches!(self.profile.variant, Variant::Flat) {
            return;
        }
        let mask = self.profile.capability_mask;
        let set = pageable == self.profile.is_pageable(mask);
        let byte = &mut self.windows[0][usize::from(self.profile.capability_register)];
        if set {
            *byte |= mask;
        } else {
            *byte &= !mask;
        }
    }

    /// Insert or remove the module. An absent module acknowledges nothing.
    pub fn set_present(&mut self, present: bool) {
        self.present = present;
    }

    /// Fail the next `n` operations with `fault`.
    pub fn fail_next(&mut self, n: usize, fault: Fault) {
        self.fault = Some(FaultPlan {
            skip: 0,
            count: n,
            fault,
        });
    }

    /// Let the next `n` operations through, then fail every later one with
    /// `fault`.
    pub fn fail_after(&mut self, n: usize, fault: Fault) {
        self.fault = Some(FaultPlan {
            skip: n,
            count: usize::MAX,
            fault,
        });
    }

    /// Stop injecting faults.
    pub fn clear_faults(&mut self) {
        self.fault = None;
    }

    /// Accept only `n` more page-select writes, failing any after that
    /// transiently. `usize::MAX` removes the limit.
    pub fn limit_page_selects(&mut self, n: usize) {
        self.page_select_budget = n;
    }

    /// Fail any single operation larger than `n` bytes.
    pub fn set_max_transfer(&mut self, n: usize) {
        self.max_transfer = n;
    }

    /// Return every operation issued so far.
    pub fn ops(&self) -> &[Op] {
        &self.ops
    }

    /// Return and forget every operation issued so far.
    pub fn take_ops(&mut self) -> Vec<Op> {
        std::mem::take(&mut self.ops)
    }

    /// Return the pages selected by every successful page-select write.
    pub fn page_selects(&self) -> Vec<u8> {
        self.selects.clone()
    }

    fn is_paged(&self) -> bool {
        matches!(self.profile.variant, Variant::LowerUpperPaged)
    }

    fn is_page_select(&self, endpoint: usize, register: usize) -> bool {
        self.is_paged()
            && endpoint == self.profile.paging_endpoint()
            && register == usize::from(self.profile.page_select_register())
    }

    fn storage_mut(&mut self, offset: usize) -> Result<&mut u8, Error> {
        let location = self.profile.translate(offset)?;
        let half = self.profile.page_size();
        Ok(match location.page {
            Some(page) => &mut self.pages[usize::from(page)][location.offset - half],
            None => &mut self.windows[location.endpoint][location.offset],
        })
    }

    fn read_byte(&self, endpoint: usize, register: usize, page: u8) -> u8 {
        let half = self.profile.page_size();
        if self.is_page_select(endpoint, register) {
            self.page
        } else if self.is_paged() && endpoint == self.profile.paging_endpoint() && register >= half {
            self.pages[usize::from(page)][register - half]
        } else {
            self.windows[endpoint][register]
        }
    }

    fn write_byte(&mut self, endpoint: usize, register: usize, byte: u8) {
        let half = self.profile.page_size();
        if self.is_page_select(endpoint, register) {
            self.page = if usize::from(byte) < self.pages.len() {
                byte
            } else {
                DEFAULT_PAGE
            };
            self.selects.push(byte);
        } else if self.is_paged() && endpoint == self.profile.paging_endpoint() && register >= half {
            self.pages[usize::from(self.page)][register - half] = byte;
        } else {
            self.windows[endpoint][register] = byte;
        }
    }

    // Decide whether an operation proceeds, and on which endpoint.
    fn admit(&mut self, endpoint: Endpoint, register: u8, len: usize) -> Result<Admission, BusError> {
        if !self.present {
            return Err(BusError::Absent);
        }
        let index = self
            .endpoints
            .iter()
            .position(|e| *e == endpoint)
            .ok_or(BusError::Absent)?;
        if let Some(plan) = self.fault.as_mut() {
            if plan.skip > 0 {
                plan.skip -= 1;
            } else if plan.count > 0 {
                plan.count -= 1;
                let fault = plan.fault;
                return match fault {
                    Fault::Absent => Err(BusError::Absent),
                    Fault::Transient => Err(BusError::Transient),
                    Fault::Short => Ok(Admission::Short),
                };
            } else {
                self.fault = None;
            }
        }
        if len > self.max_transfer || usize::from(register) + len > self.profile.window_size {
            return Err(BusError::Transient);
        }
        Ok(Admission::Proceed(index))
    }
}

impl Transport for SimulatedModule {
    fn read(&mut self, endpoint: Endpoint, register: u8, buf: &mut [u8]) -> Result<usize, BusError> {
        self.ops.push(Op::Read {
            endpoint,
            register,
            len: buf.len(),
        });
        let index = match self.admit(endpoint, register, buf.len())? {
            Admission::Proceed(index) => index,
            Admission::Short => return Ok(buf.len() / 2),
        };
        let page = self.page;
        for (i, byte) in buf.iter_mut().enumerate() {
            *byte = self.read_byte(index, usize::from(register) + i, page);
        }
        Ok(buf.len())
    }

    fn write(&mut self, endpoint: Endpoint, register: u8, data: &[u8]) -> Result<usize, BusError> {
        self.ops.push(Op::Write {
            endpoint,
            register,
            data: data.to_vec(),
        });
        let index = match self.admit(endpoint, register, data.len())? {
            Admission::Proceed(index) => index,
            Admission::Short => return Ok(data.len() / 2),
        };
        let start = usize::from(register);
        let selects_page = (start..start + data.len()).any(|r| self.is_page_select(index, r));
        if selects_page {
            if self.page_select_budget == 0 {
                return Err(BusError::Transient);
            }
            if self.page_select_budget != usize::MAX {
                self.page_select_budget -= 1;
            }
        }
        for (i, byte) in data.iter().enumerate() {
            self.write_byte(index, start + i, *byte);
        }
        Ok(data.len())
    }

    fn max_read_len(&self) -> usize {
        self.max_transfer
    }

    fn max_write_len(&self) -> usize {
        self.max_transfer
    }
}

#[cfg(test)]
mod tests {
    use super::Fault;
    use super::Op;
    use super::SimulatedModule;
    use crate::BusError;
    use crate::Endpoint;
    use crate::Error;
    use crate::Transport;
    use transceiver_map::Profile;

    #[test]
    fn test_upper_half_follows_page_select() {
        let mut module = SimulatedModule::new(Profile::SFF_8436).unwrap();
        module.write(Endpoint::A0, 0x7f, &[2]).unwrap();
        module.write(Endpoint::A0, 0x80, &[0xab]).unwrap();
        module.write(Endpoint::A0, 0x7f, &[0]).unwrap();
        let mut buf = [0xff; 1];
        module.read(Endpoint::A0, 0x80, &mut buf).unwrap();
        assert_eq!(buf, [0]);
        assert_eq!(module.linear()[128 + 2 * 128], 0xab);
        assert_eq!(module.page_selects(), vec![2, 0]);
    }

    #[test]
    fn test_unsupported_page_reverts_to_default() {
        let mut module = SimulatedModule::new(Profile::SFF_8436).unwrap();
        module.write(Endpoint::A0, 0x7f, &[9]).unwrap();
        assert_eq!(module.page(), 0);
        let mut buf = [0xff; 1];
        module.read(Endpoint::A0, 0x7f, &mut buf).unwrap();
        assert_eq!(buf, [0]);
    }

    #[test]
    fn test_from_linear_round_trip() {
        let profile = Profile::SFF_8472;
        let image = (0..profile.paged_total_size).map(|i| (i % 253) as u8).collect::<Vec<_>>();
        let module = SimulatedModule::from_linear(profile, &image).unwrap();
        let linear = module.linear();
        // The page-select byte of A2h is the only one not backed by storage.
        let psr = 256 + 0x7f;
        assert_eq!(linear[psr], 0);
        assert_eq!(linear[..psr], image[..psr]);
        assert_eq!(linear[psr + 1..], image[psr + 1..]);
        assert!(SimulatedModule::from_linear(profile, &vec![0; profile.paged_total_size + 1]).is_err());
    }

    #[test]
    fn test_capability_bit() {
        let mut sfp = SimulatedModule::new(Profile::SFF_8472).unwrap();
        sfp.set_pageable(true);
        assert_eq!(sfp.linear()[0x40], 0x10);

        let mut qsfp = SimulatedModule::new(Profile::SFF_8436).unwrap();
        qsfp.set_pageable(false);
        assert_eq!(qsfp.linear()[0x02], 0x04);
        qsfp.set_pageable(true);
        assert_eq!(qsfp.linear()[0x02], 0x00);
    }

    #[test]
    fn test_invalid_profile_is_rejected() {
        let mut profile = Profile::SFF_8472;
        profile.paged_total_size = 300;
        assert!(matches!(
            SimulatedModule::new(profile),
            Err(Error::InvalidProfile(_))
        ));
    }

    #[test]
    fn test_faults() {
        let mut module = SimulatedModule::new(Profile::SFF_8436).unwrap();
        let mut buf = [0; 4];
        module.fail_next(1, Fault::Transient);
        assert_eq!(module.read(Endpoint::A0, 0, &mut buf), Err(BusError::Transient));
        module.fail_next(1, Fault::Short);
        assert_eq!(module.read(Endpoint::A0, 0, &mut buf), Ok(2));
        assert_eq!(module.read(Endpoint::A0, 0, &mut buf), Ok(4));
        assert_eq!(module.read(Endpoint::A2, 0, &mut buf), Err(BusError::Absent));
        module.set_present(false);
        assert_eq!(module.read(Endpoint::A0, 0, &mut buf), Err(BusError::Absent));
        assert_eq!(module.ops().len(), 5);
        assert_eq!(
            module.take_ops()[0],
            Op::Read {
                endpoint: Endpoint::A0,
                register: 0,
                len: 4
            }
        );
        assert!(module.ops().is_empty());
    }

    #[test]
    fn test_page_select_limit() {
        let mut module = SimulatedModule::new(Profile::SFF_8436).unwrap();
        module.limit_page_selects(1);
        assert_eq!(module.write(Endpoint::A0, 0x7f, &[1]), Ok(1));
        assert_eq!(module.write(Endpoint::A0, 0x7f, &[0]), Err(BusError::Transient));
        assert_eq!(module.write(Endpoint::A0, 0x10, &[0]), Ok(1));
        assert_eq!(module.page(), 1);
    }

    #[test]
    fn test_transfer_limits() {
        let mut module = SimulatedModule::new(Profile::SFF_8436).unwrap();
        module.set_max_transfer(8);
        let mut buf = [0; 16];
        assert_eq!(module.read(Endpoint::A0, 0, &mut buf), Err(BusError::Transient));
        assert_eq!(module.read(Endpoint::A0, 0, &mut buf[..8]), Ok(8));
        assert_eq!(module.read(Endpoint::A0, 252, &mut buf[..8]), Err(BusError::Transient));
    }
}
