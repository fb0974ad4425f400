// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! pinglib - Non-blocking ICMP echo engine for Rustica
//!
//! Sends ICMP echo requests to many destinations concurrently from a
//! single reactor thread and reports round-trip time, send failure, or
//! timeout through a caller-supplied handler. Probes may be submitted
//! from any thread; the reactor is woken through a self-pipe.
//!
//! Uses unprivileged `SOCK_DGRAM` ICMP sockets, which on Linux require
//! `net.ipv4.ping_group_range` to cover the process group id.

pub mod error;
pub mod packet;
pub mod pinger;
pub mod target;

mod pending;
mod registry;
mod sockaddr;
mod socket;
mod wakeup;

pub use error::PingError;
pub use pinger::IcmpPinger;
pub use target::{FailureReason, PingHandler, PingTarget, DEFAULT_TIMEOUT};
