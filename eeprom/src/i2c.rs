// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

//! A transport over a Linux `i2c-dev` character device.

use crate::BusError;
use crate::Endpoint;
use crate::Error;
use crate::Transport;
use nix::errno::Errno;
use std::fs::File;
use std::fs::OpenOptions;
use std::os::fd::AsRawFd;
use std::path::Path;

// From `linux/i2c.h` and `linux/i2c-dev.h`.
const I2C_RDWR: u16 = 0x0707;
const I2C_M_RD: u16 = 0x0001;

#[repr(C)]
struct I2cMsg {
    addr: u16,
    flags: u16,
    len: u16,
    buf: *mut u8,
}

#[repr(C)]
struct I2cRdwrData {
    msgs: *mut I2cMsg,
    nmsgs: u32,
}

nix::ioctl_write_ptr_bad!(i2c_rdwr, I2C_RDWR, I2cRdwrData);

/// The default largest transfer, matching the size of a page.
pub const DEFAULT_MAX_TRANSFER: usize = 128;

/// A two-wire bus exposed as `/dev/i2c-N`.
///
/// Reads are a single combined transaction: a write of the register offset,
/// a repeated start, then the read. Writes send the register offset followed
/// by the data.
#[derive(Debug)]
pub struct I2cDev {
    file: File,
    max_transfer: usize,
}

impl I2cDev {
    /// Open the bus device at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, Error> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        Ok(Self {
            file,
            max_transfer: DEFAULT_MAX_TRANSFER,
        })
    }

    /// Limit single transactions to `n` bytes, for adapters that can't move
    /// a full page at once.
    pub fn with_max_transfer(mut self, n: usize) -> Self {
        self.max_transfer = n.clamp(1, usize::from(u16::MAX));
        self
    }

    fn transact(&self, msgs: &mut [I2cMsg]) -> Result<(), BusError> {
        let mut data = I2cRdwrData {
            msgs: msgs.as_mut_ptr(),
            nmsgs: msgs.len() as u32,
        };
        // SAFETY: `data` points at `msgs`, each of which points at a buffer
        // of at least `len` bytes that outlives this call. Only buffers
        // flagged `I2C_M_RD` are written by the kernel, and those come from
        // exclusive borrows.
        match unsafe { i2c_rdwr(self.file.as_raw_fd(), &mut data) } {
            Ok(_) => Ok(()),
            Err(e) => Err(bus_error(e)),
        }
    }
}

// The adapter reports a missing device as an unacknowledged address.
fn bus_error(errno: Errno) -> BusError {
    match errno {
        Errno::ENXIO => BusError::Absent,
        _ => BusError::Transient,
    }
}

impl Transport for I2cDev {
    fn read(&mut self, endpoint: Endpoint, register: u8, buf: &mut [u8]) -> Result<usize, BusError> {
        let len = u16::try_from(buf.len()).map_err(|_| BusError::Transient)?;
        let mut register = [register];
        let mut msgs = [
            I2cMsg {
                addr: u16::from(endpoint.address()),
                flags: 0,
                len: 1,
                buf: register.as_mut_ptr(),
            },
            I2cMsg {
                addr: u16::from(endpoint.address()),
                flags: I2C_M_RD,
                len,
                buf: buf.as_mut_ptr(),
            },
        ];
        self.transact(&mut msgs)?;
        Ok(buf.len())
    }

    fn write(&mut self, endpoint: Endpoint, register: u8, data: &[u8]) -> Result<usize, BusError> {
        let mut bytes = Vec::with_capacity(data.len() + 1);
        bytes.push(register);
        bytes.extend_from_slice(data);
        let len = u16::try_from(bytes.len()).map_err(|_| BusError::Transient)?;
        let mut msgs = [I2cMsg {
            addr: u16::from(endpoint.address()),
            flags: 0,
            len,
            buf: bytes.as_mut_ptr(),
        }];
        self.transact(&mut msgs)?;
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
    use super::bus_error;
    use super::I2cDev;
    use super::I2cMsg;
    use crate::BusError;
    use crate::Error;
    use crate::Transport;
    use nix::errno::Errno;

    #[test]
    fn test_errno_mapping() {
        assert_eq!(bus_error(Errno::ENXIO), BusError::Absent);
        assert_eq!(bus_error(Errno::EREMOTEIO), BusError::Transient);
        assert_eq!(bus_error(Errno::ETIMEDOUT), BusError::Transient);
    }

    #[test]
    fn test_message_layout() {
        assert_eq!(
            std::mem::size_of::<I2cMsg>(),
            8 + std::mem::size_of::<*mut u8>()
        );
    }

    #[test]
    fn test_open_missing_device() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            I2cDev::open(dir.path().join("i2c-99")),
            Err(Error::Io(_))
        ));
    }

    #[test]
    fn test_max_transfer_is_bounded() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let dev = I2cDev::open(file.path()).unwrap().with_max_transfer(0);
        assert_eq!(dev.max_read_len(), 1);
        let dev = dev.with_max_transfer(1 << 20);
        assert_eq!(dev.max_write_len(), usize::from(u16::MAX));
    }
}
