// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

//! The chunked transfer engine.
//!
//! A logical access runs as three steps, all under the device lock:
//!
//! 1. For each chunk in an upper half, make sure its page is selected. The
//!    first such chunk always writes the page-select register, since the
//!    device's idea of the current page may be stale, unless the module has
//!    just reported that it doesn't page at all.
//! 2. Move the chunk's bytes, in as many physical operations as the transport
//!    and configuration allow.
//! 3. If the page-select register was written at all, either to select a page
//!    or as part of the caller's data, write the default page back.
//!
//! A failed page select ends the access on the spot. A failed chunk still gets
//! a best-effort restore before its error is returned.

use crate::device::Device;
use crate::device::Legal;
use crate::device::State;
use crate::probes;
use crate::Clock;
use crate::Error;
use crate::TransferResult;
use crate::Transport;
use slog::debug;
use slog::warn;
use transceiver_map::Chunk;
use transceiver_map::Variant;
use transceiver_map::DEFAULT_PAGE;

/// The direction and caller buffer of a logical access.
#[derive(Debug)]
pub(crate) enum Access<'a> {
    Read(&'a mut [u8]),
    Write(&'a [u8]),
}

impl Access<'_> {
    fn len(&self) -> usize {
        match self {
            Access::Read(buf) => buf.len(),
            Access::Write(data) => data.len(),
        }
    }

    fn is_write(&self) -> bool {
        matches!(self, Access::Write(_))
    }
}

// Why an access stopped before moving all of its chunks.
enum Abort {
    PageSelect(Error),
    Chunk(Error),
}

impl<T: Transport, C: Clock> Device<T, C> {
    /// Move every byte of `access`, starting at logical `offset`.
    ///
    /// The access must already have been checked against the module's
    /// capabilities, with the outcome in `legal`.
    pub(crate) fn transfer_locked(
        &self,
        state: &mut State<T>,
        offset: usize,
        legal: Legal,
        mut access: Access<'_>,
    ) -> Result<TransferResult<usize>, Error> {
        let len = access.len();
        let chunks = self.profile.chunks(offset, len)?;
        debug!(
            self.log,
            "starting transfer";
            "offset" => offset,
            "len" => len,
            "write" => access.is_write(),
            "n_chunks" => chunks.len(),
        );
        probes::transfer__start!(|| (offset as u64, len as u64, u8::from(access.is_write())));

        let mut transferred = 0;
        let mut page_written = false;
        // A module that doesn't page only ever sees page 0 here, and its
        // page-select byte is left alone unless the cache says otherwise.
        let mut page_confirmed = legal.pageable == Some(false);
        let mut abort = None;
        for chunk in chunks {
            if let Some(page) = chunk.location.page {
                if !page_confirmed || page != state.current_page {
                    page_confirmed = true;
                    page_written = true;
                    if let Err(e) = self.select_page(state, page) {
                        abort = Some(Abort::PageSelect(e));
                        break;
                    }
                }
            }
            let stored_page = self.stored_page(offset, &chunk, &access);
            if let Some(page) = stored_page {
                debug!(self.log, "write covers the page-select register"; "page" => page);
                page_written = true;
            }
            if let Err(e) = self.transfer_chunk(state, offset, &chunk, &mut access, &mut transferred) {
                abort = Some(Abort::Chunk(e));
                break;
            }
            if let Some(page) = stored_page {
                state.current_page = page;
            }
        }

        match abort {
            None => {
                let page_restore = if page_written {
                    self.restore_page(state).err()
                } else {
                    None
                };
                probes::transfer__done!(|| (offset as u64, transferred as u64));
                Ok(TransferResult {
                    data: transferred,
                    page_restore,
                })
            }
            Some(Abort::PageSelect(e)) => Err(self.failed(offset, transferred, e)),
            Some(Abort::Chunk(e)) => {
                if page_written {
                    // The chunk's error is what the caller needs to see.
                    let _ = self.restore_page(state);
                }
                Err(self.failed(offset, transferred, e))
            }
        }
    }

    fn failed(&self, offset: usize, transferred: usize, error: Error) -> Error {
        debug!(
            self.log,
            "transfer failed";
            "offset" => offset,
            "transferred" => transferred,
            "reason" => %error,
        );
        if transferred == 0 {
            error
        } else {
            Error::PartialTransfer {
                transferred,
                source: Box::new(error),
            }
        }
    }

    // Return the byte a write chunk stores into the page-select register, if
    // it covers it.
    fn stored_page(&self, offset: usize, chunk: &Chunk, access: &Access<'_>) -> Option<u8> {
        let Access::Write(data) = access else {
            return None;
        };
        let location = &chunk.location;
        if !matches!(self.profile.variant, Variant::LowerUpperPaged)
            || location.endpoint != self.profile.paging_endpoint()
            || location.is_paged()
        {
            return None;
        }
        let register = usize::from(self.profile.page_select_register());
        if register < location.offset || register >= location.offset + chunk.len {
            return None;
        }
        Some(data[chunk.start - offset + register - location.offset])
    }

    // Write `page` to the page-select register of the paging endpoint.
    fn select_page(&self, state: &mut State<T>, page: u8) -> Result<(), Error> {
        let endpoint = self.endpoints[self.profile.paging_endpoint()];
        let register = self.profile.page_select_register();
        debug!(
            self.log,
            "selecting page";
            "endpoint" => %endpoint,
            "page" => page,
            "previous" => state.current_page,
        );
        probes::page__select!(|| (endpoint.address(), page));
        let transport = &mut state.transport;
        self.retrier()
            .run(endpoint, register, 1, || transport.write(endpoint, register, &[page]))?;
        state.current_page = page;
        Ok(())
    }

    fn restore_page(&self, state: &mut State<T>) -> Result<(), Error> {
        let page = state.current_page;
        self.select_page(state, DEFAULT_PAGE).map_err(|e| {
            warn!(
                self.log,
                "failed to restore default page";
                "page" => page,
                "reason" => %e,
            );
            Error::PageRestoreFailed {
                page,
                source: Box::new(e),
            }
        })
    }

    // Move one chunk, in physical operations no larger than the transport and
    // configuration allow. `transferred` counts every byte that has moved.
    fn transfer_chunk(
        &self,
        state: &mut State<T>,
        offset: usize,
        chunk: &Chunk,
        access: &mut Access<'_>,
        transferred: &mut usize,
    ) -> Result<(), Error> {
        let endpoint = self.endpoints[chunk.location.endpoint];
        let base = chunk.start - offset;
        let step = match access {
            Access::Read(_) => self.config.io_limit.min(state.transport.max_read_len()),
            Access::Write(_) => self.config.write_max.min(state.transport.max_write_len()),
        }
        .max(1);

        let mut done = 0;
        while done < chunk.len {
            let n = step.min(chunk.len - done);
            // Chunks never cross the window, so physical offsets fit in a byte.
            let register = (chunk.location.offset + done) as u8;
            let range = base + done..base + done + n;
            let transport = &mut state.transport;
            match access {
                Access::Read(buf) => {
                    let buf = &mut buf[range];
                    self.retrier()
                        .run(endpoint, register, n, || transport.read(endpoint, register, buf))?;
                }
                Access::Write(data) => {
                    let data = &data[range];
                    self.retrier()
                        .run(endpoint, register, n, || transport.write(endpoint, register, data))?;
                }
            }
            done += n;
            *transferred += n;
        }
        Ok(())
    }
}
