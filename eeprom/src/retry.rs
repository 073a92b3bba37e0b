// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

//! Bounded retries of single physical operations.
//!
//! Modules NAK their address while an internal write is completing, which can
//! take several milliseconds after any write, including the page-select byte.
//! Any physical operation may therefore fail transiently. We retry on a fixed
//! interval until the operation moves all of its bytes or a time budget runs
//! out. A module that is not there at all never gets retried.

use crate::transport::BusError;
use crate::transport::Endpoint;
use crate::Clock;
use crate::Error;
use slog::debug;
use slog::trace;
use slog::warn;
use slog::Logger;
use std::time::Duration;

/// Performs physical operations with retry-on-transient-failure semantics.
#[derive(Debug)]
pub struct Retrier<'a, C> {
    clock: &'a C,
    log: &'a Logger,
    timeout: Duration,
    interval: Duration,
}

impl<'a, C: Clock> Retrier<'a, C> {
    pub fn new(clock: &'a C, log: &'a Logger, timeout: Duration, interval: Duration) -> Self {
        Self {
            clock,
            log,
            timeout,
            interval,
        }
    }

    /// Run `attempt` until it reports moving exactly `len` bytes.
    ///
    /// Each attempt is one physical operation of `len` bytes at `register` of
    /// `endpoint`. The attempt is always made at least once. Another is made
    /// after each short or transient failure, so long as the previous one
    /// started before the time budget elapsed.
    pub fn run<F>(&self, endpoint: Endpoint, register: u8, len: usize, mut attempt: F) -> Result<usize, Error>
    where
        F: FnMut() -> Result<usize, BusError>,
    {
        let deadline = self.clock.now() + self.timeout;
        let mut n_attempts = 0usize;
        loop {
            let started = self.clock.now();
            n_attempts += 1;
            match attempt() {
                Ok(n) if n == len => {
                    trace!(
                        self.log,
                        "physical operation complete";
                        "endpoint" => %endpoint,
                        "register" => register,
                        "len" => len,
                        "attempts" => n_attempts,
                    );
                    return Ok(n);
                }
                Ok(n) => {
                    trace!(
                        self.log,
                        "short transfer";
                        "endpoint" => %endpoint,
                        "register" => register,
                        "expected" => len,
                        "actual" => n,
                    );
                }
                Err(BusError::Absent) => {
                    debug!(
                        self.log,
                        "no module present";
                        "endpoint" => %endpoint,
                        "register" => register,
                    );
                    return Err(Error::DeviceAbsent { endpoint });
                }
                Err(BusError::Transient) => {
                    trace!(
                        self.log,
                        "transient bus failure";
                        "endpoint" => %endpoint,
                        "register" => register,
                    );
                }
            }
            if started >= deadline {
                break;
            }
            self.clock.sleep(self.interval);
        }
        warn!(
            self.log,
            "physical operation timed out";
            "endpoint" => %endpoint,
            "register" => register,
            "len" => len,
            "attempts" => n_attempts,
        );
        Err(Error::Timeout {
            endpoint,
            register,
            len,
        })
    }
}
