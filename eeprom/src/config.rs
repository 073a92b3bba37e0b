// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

//! Configuration of module memory access.

use crate::Error;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::time::Duration;
use transceiver_map::Profile;

/// Return the default time budget for retrying one physical operation.
///
/// Module specifications commonly allow 5 ms, and sometimes 20 ms, for an
/// internal write to complete, during which the module does not respond.
pub const fn default_write_timeout() -> Duration {
    Duration::from_millis(25)
}

/// Return the default interval between attempts of a physical operation.
pub const fn default_retry_interval() -> Duration {
    Duration::from_millis(1)
}

/// Return the default largest read, in bytes, issued in one transaction.
pub const fn default_io_limit() -> usize {
    128
}

/// Return the default largest write, in bytes, issued in one transaction.
///
/// Some modules only accept writes within small internal pages, so vendors
/// recommend the host write a single byte at a time.
pub const fn default_write_max() -> usize {
    1
}

/// Configuration for a [`crate::Device`].
#[derive(Clone, Debug, PartialEq)]
pub struct Config {
    /// The budget for retrying a single physical operation that fails
    /// transiently.
    pub write_timeout: Duration,

    /// The time to wait between attempts of a physical operation.
    pub retry_interval: Duration,

    /// The largest read issued in one transaction. Always a power of two.
    pub io_limit: usize,

    /// The largest write issued in one transaction. Never more than
    /// `io_limit`.
    pub write_max: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            write_timeout: default_write_timeout(),
            retry_interval: default_retry_interval(),
            io_limit: default_io_limit(),
            write_max: default_write_max(),
        }
    }
}

/// A builder interface for generating device configuration.
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    write_timeout: Option<Duration>,
    retry_interval: Option<Duration>,
    io_limit: Option<usize>,
    write_max: Option<usize>,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the time budget for retrying one physical operation.
    pub fn write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = Some(timeout);
        self
    }

    /// Set the interval between attempts of a physical operation.
    pub fn retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval = Some(interval);
        self
    }

    /// Set the largest read issued in one transaction.
    ///
    /// This is rounded down to a power of two, so that reads stay aligned.
    pub fn io_limit(mut self, limit: usize) -> Self {
        self.io_limit = Some(limit);
        self
    }

    /// Set the largest write issued in one transaction.
    pub fn write_max(mut self, max: usize) -> Self {
        self.write_max = Some(max);
        self
    }

    /// Build a `Config` from `self`.
    pub fn build(self) -> Result<Config, Error> {
        let io_limit = self.io_limit.unwrap_or_else(default_io_limit);
        if io_limit == 0 {
            return Err(Error::Config(String::from("io_limit must not be 0")));
        }
        let io_limit = 1usize << io_limit.ilog2();
        let write_max = self.write_max.unwrap_or_else(default_write_max);
        if write_max == 0 {
            return Err(Error::Config(String::from("write_max must not be 0")));
        }
        let retry_interval = self.retry_interval.unwrap_or_else(default_retry_interval);
        if retry_interval.is_zero() {
            return Err(Error::Config(String::from(
                "retry_interval must not be 0",
            )));
        }
        Ok(Config {
            write_timeout: self.write_timeout.unwrap_or_else(default_write_timeout),
            retry_interval,
            io_limit,
            write_max: write_max.min(io_limit),
        })
    }
}

/// Load and validate a device profile from a JSON file.
pub fn load_profile(path: impl AsRef<Path>) -> Result<Profile, Error> {
    let path = path.as_ref();
    let file = File::open(path)?;
    let profile: Profile = serde_json::from_reader(BufReader::new(file))
        .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;
    profile.validate()?;
    Ok(profile)
}
