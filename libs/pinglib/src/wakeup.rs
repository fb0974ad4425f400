// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Self-pipe wakeup channel
//!
//! Writing one byte to the pipe makes its read end pollable, letting any
//! thread interrupt the reactor's readiness wait. An atomic flag
//! coalesces producer signals so a burst of submissions writes at most
//! one byte between reactor wake-ups.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::PingError;
use crate::socket::set_nonblocking;

pub(crate) struct WakeupChannel {
    read_fd: libc::c_int,
    write_fd: libc::c_int,
    awoken: AtomicBool,
}

impl WakeupChannel {
    pub fn new() -> Result<Self, PingError> {
        let mut fds = [-1 as libc::c_int; 2];
        if unsafe { libc::pipe(fds.as_mut_ptr()) } < 0 {
            return Err(PingError::Pipe(io::Error::last_os_error()));
        }
        let channel = Self {
            read_fd: fds[0],
            write_fd: fds[1],
            awoken: AtomicBool::new(false),
        };
        set_nonblocking(channel.read_fd).map_err(PingError::Pipe)?;
        set_nonblocking(channel.write_fd).map_err(PingError::Pipe)?;
        Ok(channel)
    }

    pub fn read_fd(&self) -> libc::c_int {
        self.read_fd
    }

    /// Signals the reactor unless a signal is already outstanding.
    pub fn notify(&self) {
        if self
            .awoken
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            self.signal();
        }
    }

    /// Unconditional signal, used by `stop()`.
    pub fn signal(&self) {
        let byte = [1u8];
        // A full pipe already guarantees a wakeup; the result is moot.
        unsafe {
            libc::write(self.write_fd, byte.as_ptr() as *const libc::c_void, 1);
        }
    }

    /// Re-arms the coalescing flag; called by the reactor on wake.
    pub fn clear_awoken(&self) {
        let _ = self
            .awoken
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire);
    }

    /// Drains all buffered wakeup bytes, returning how many were read.
    pub fn drain(&self) -> usize {
        let mut buf = [0u8; 64];
        let mut total = 0;
        loop {
            let rc = unsafe {
                libc::read(self.read_fd, buf.as_mut_ptr() as *mut libc::c_void, buf.len())
            };
            if rc <= 0 {
                return total;
            }
            total += rc as usize;
        }
    }
}

impl Drop for WakeupChannel {
    fn drop(&mut self) {
        unsafe {
            libc::close(self.read_fd);
            libc::close(self.write_fd);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notify_coalesces_until_cleared() {
        let channel = WakeupChannel::new().unwrap();

        channel.notify();
        channel.notify();
        channel.notify();
        assert_eq!(1, channel.drain());

        // Until the reactor re-arms the flag, further notifies are
        // swallowed.
        channel.notify();
        assert_eq!(0, channel.drain());

        channel.clear_awoken();
        channel.notify();
        assert_eq!(1, channel.drain());
    }

    #[test]
    fn signal_is_unconditional() {
        let channel = WakeupChannel::new().unwrap();
        channel.signal();
        channel.signal();
        assert_eq!(2, channel.drain());
    }

    #[test]
    fn drain_on_empty_pipe_does_not_block() {
        let channel = WakeupChannel::new().unwrap();
        assert_eq!(0, channel.drain());
    }
}
