// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

//! A single transceiver module and its exclusive-access lock.

use crate::retry::Retrier;
use crate::transfer::Access;
use crate::Clock;
use crate::Config;
use crate::Endpoint;
use crate::Error;
use crate::ReadResult;
use crate::SystemClock;
use crate::TransferResult;
use crate::Transport;
use crate::WriteResult;
use slog::debug;
use slog::warn;
use slog::Logger;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::TryLockError;
use transceiver_map::Legality;
use transceiver_map::Profile;
use transceiver_map::DEFAULT_PAGE;

// The legal extent of an access, and whether the module was found to support
// paging while working it out. Accesses within unpaged memory don't ask.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Legal {
    pub(crate) len: usize,
    pub(crate) pageable: Option<bool>,
}

// The part of a device that is only touched with the lock held.
#[derive(Debug)]
pub(crate) struct State<T> {
    pub(crate) transport: T,
    // The page last written to the page-select register, as far as we know.
    pub(crate) current_page: u8,
}

/// One transceiver module, presented as a linear address space.
///
/// The device owns the transport to its endpoints. All accesses take an
/// exclusive lock for their whole duration, covering the capability query,
/// every chunk, and the page select and restore, since the module's
/// page-select register is shared state. Accesses to different devices are
/// entirely independent.
///
/// Note that the lock only protects against other users of this `Device`. Any
/// other bus master driving the same module can still move its page.
#[derive(Debug)]
pub struct Device<T, C = SystemClock> {
    pub(crate) profile: Profile,
    pub(crate) endpoints: Vec<Endpoint>,
    pub(crate) config: Config,
    pub(crate) clock: C,
    pub(crate) log: Logger,
    state: Mutex<State<T>>,
}

impl<T: Transport> Device<T, SystemClock> {
    /// Create a device for a module with the given profile.
    ///
    /// `endpoints` lists the bus addresses of the module, one per endpoint of
    /// the profile, in order.
    pub fn new(
        profile: Profile,
        endpoints: Vec<Endpoint>,
        transport: T,
        config: Config,
        log: Logger,
    ) -> Result<Self, Error> {
        Self::with_clock(profile, endpoints, transport, config, SystemClock, log)
    }
}

impl<T: Transport, C: Clock> Device<T, C> {
    /// Create a device which measures retry budgets against `clock`.
    pub fn with_clock(
        profile: Profile,
        endpoints: Vec<Endpoint>,
        transport: T,
        config: Config,
        clock: C,
        log: Logger,
    ) -> Result<Self, Error> {
        profile.validate()?;
        if endpoints.len() != usize::from(profile.endpoint_count) {
            return Err(Error::Config(format!(
                "profile needs {} endpoints, but {} were provided",
                profile.endpoint_count,
                endpoints.len(),
            )));
        }
        if let Err(e) = usdt::register_probes() {
            warn!(log, "failed to register DTrace probes"; "reason" => ?e);
        }
        let log = log.new(slog::o!(
            "endpoints" => format!("{endpoints:?}"),
            "size" => profile.paged_total_size,
        ));
        debug!(log, "created device"; "profile" => ?profile);
        Ok(Self {
            profile,
            endpoints,
            config,
            clock,
            log,
            state: Mutex::new(State {
                transport,
                current_page: DEFAULT_PAGE,
            }),
        })
    }

    /// Return the profile describing this device's address space.
    pub fn profile(&self) -> &Profile {
        &self.profile
    }

    /// Return the bus endpoints of this device.
    pub fn endpoints(&self) -> &[Endpoint] {
        &self.endpoints
    }

    /// Return the configuration of this device.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Return the page this device last selected.
    ///
    /// This is only a cache. It is stale if the module was replaced, or if
    /// another bus master moved the page.
    pub fn current_page(&self) -> u8 {
        self.lock().current_page
    }

    /// Run `f` with exclusive access to the transport.
    pub fn with_transport<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        f(&mut self.lock().transport)
    }

    /// Consume the device, returning its transport.
    pub fn into_transport(self) -> T {
        self.state
            .into_inner()
            .unwrap_or_else(|e| e.into_inner())
            .transport
    }

    /// Return how many bytes of an access of `len` bytes at `offset` the
    /// module currently supports.
    ///
    /// Accesses entirely within unpaged memory are returned unchanged without
    /// touching the bus. Otherwise the module's capability register is read,
    /// and the access is truncated to what it supports, or rejected if it
    /// starts beyond that.
    pub fn legal_length(&self, offset: usize, len: usize) -> Result<usize, Error> {
        let mut state = self.lock();
        self.legal_length_locked(&mut state, offset, len).map(|legal| legal.len)
    }

    /// Read up to `len` bytes starting at `offset`.
    ///
    /// The read is silently shortened if it extends past what the module
    /// supports.
    pub fn read(&self, offset: usize, len: usize) -> Result<ReadResult, Error> {
        if len == 0 {
            return Ok(ReadResult::clean(vec![]));
        }
        let mut state = self.lock();
        self.read_locked(&mut state, offset, len)
    }

    /// Like [`Device::read`], but fail with [`Error::Busy`] rather than wait
    /// for another transfer to finish.
    pub fn try_read(&self, offset: usize, len: usize) -> Result<ReadResult, Error> {
        if len == 0 {
            return Ok(ReadResult::clean(vec![]));
        }
        let mut state = self.try_lock()?;
        self.read_locked(&mut state, offset, len)
    }

    /// Read into `buf`, starting at `offset`, returning the number of bytes
    /// read.
    ///
    /// If the transfer fails part way, the bytes before the failure are
    /// already in `buf` and [`Error::PartialTransfer`] reports how many there
    /// are.
    pub fn read_into(&self, offset: usize, buf: &mut [u8]) -> Result<TransferResult<usize>, Error> {
        if buf.is_empty() {
            return Ok(TransferResult::clean(0));
        }
        let mut state = self.lock();
        let legal = self.legal_length_locked(&mut state, offset, buf.len())?;
        self.transfer_locked(&mut state, offset, legal, Access::Read(&mut buf[..legal.len]))
    }

    /// Write `data` starting at `offset`, returning the number of bytes
    /// written.
    ///
    /// The write is silently shortened if it extends past what the module
    /// supports.
    pub fn write(&self, offset: usize, data: &[u8]) -> Result<WriteResult, Error> {
        if data.is_empty() {
            return Ok(WriteResult::clean(0));
        }
        let mut state = self.lock();
        self.write_locked(&mut state, offset, data)
    }

    /// Like [`Device::write`], but fail with [`Error::Busy`] rather than wait
    /// for another transfer to finish.
    pub fn try_write(&self, offset: usize, data: &[u8]) -> Result<WriteResult, Error> {
        if data.is_empty() {
            return Ok(WriteResult::clean(0));
        }
        let mut state = self.try_lock()?;
        self.write_locked(&mut state, offset, data)
    }

    fn read_locked(&self, state: &mut State<T>, offset: usize, len: usize) -> Result<ReadResult, Error> {
        let legal = self.legal_length_locked(state, offset, len)?;
        let mut data = vec![0; legal.len];
        let result = self.transfer_locked(state, offset, legal, Access::Read(&mut data[..]))?;
        Ok(result.map(|_| data))
    }

    fn write_locked(&self, state: &mut State<T>, offset: usize, data: &[u8]) -> Result<WriteResult, Error> {
        let legal = self.legal_length_locked(state, offset, data.len())?;
        self.transfer_locked(state, offset, legal, Access::Write(&data[..legal.len]))
    }

    // The capability is queried anew on every access, since the module may
    // have been swapped for another since the last one.
    pub(crate) fn legal_length_locked(
        &self,
        state: &mut State<T>,
        offset: usize,
        len: usize,
    ) -> Result<Legal, Error> {
        match self.profile.check_unpaged(offset, len)? {
            Legality::Fits(len) => Ok(Legal {
                len,
                pageable: None,
            }),
            Legality::NeedsCapability => {
                let endpoint = self.endpoints[0];
                let register = self.profile.capability_register;
                let mut capability = [0u8];
                let transport = &mut state.transport;
                self.retrier().run(endpoint, register, 1, || {
                    transport.read(endpoint, register, &mut capability)
                })?;
                let pageable = self.profile.is_pageable(capability[0]);
                let legal = self.profile.clamp(offset, len, pageable)?;
                debug!(
                    self.log,
                    "checked module capability";
                    "capability" => capability[0],
                    "pageable" => pageable,
                    "offset" => offset,
                    "requested" => len,
                    "legal" => legal,
                );
                Ok(Legal {
                    len: legal,
                    pageable: Some(pageable),
                })
            }
        }
    }

    pub(crate) fn retrier(&self) -> Retrier<'_, C> {
        Retrier::new(
            &self.clock,
            &self.log,
            self.config.write_timeout,
            self.config.retry_interval,
        )
    }

    // A panic while holding the lock can leave `current_page` wrong, which is
    // harmless: the first paged chunk of every access selects its page.
    fn lock(&self) -> MutexGuard<'_, State<T>> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn try_lock(&self) -> Result<MutexGuard<'_, State<T>>, Error> {
        match self.state.try_lock() {
            Ok(guard) => Ok(guard),
            Err(TryLockError::Poisoned(e)) => Ok(e.into_inner()),
            Err(TryLockError::WouldBlock) => Err(Error::Busy),
        }
    }
}
