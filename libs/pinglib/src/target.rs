// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Ping target and response handler contract

use std::any::Any;
use std::fmt;
use std::net::IpAddr;
use std::time::{Duration, Instant};

use crate::sockaddr::SockAddr;

/// Default per-probe timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(1000);

/// One probe: built by the caller, submitted once, handed back through a
/// terminal [`PingHandler`] callback and then discarded. After
/// submission only the reactor thread touches it.
pub struct PingTarget {
    address: IpAddr,
    user_data: Option<Box<dyn Any + Send>>,
    timeout: Duration,

    pub(crate) sock_addr: SockAddr,
    pub(crate) id: u16,
    pub(crate) sequence: u16,
    // Placeholders until stamped at transmit time.
    pub(crate) sent_at: Instant,
    pub(crate) deadline: Instant,
    pub(crate) complete: bool,
}

impl PingTarget {
    pub fn new(address: IpAddr) -> Self {
        let now = Instant::now();
        Self {
            address,
            user_data: None,
            timeout: DEFAULT_TIMEOUT,
            sock_addr: SockAddr::new(address),
            id: 0,
            sequence: 0,
            sent_at: now,
            deadline: now,
            complete: false,
        }
    }

    /// Attaches an opaque payload passed back unchanged in callbacks.
    pub fn with_user_data(mut self, user_data: Box<dyn Any + Send>) -> Self {
        self.user_data = Some(user_data);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn address(&self) -> IpAddr {
        self.address
    }

    pub fn user_data(&self) -> Option<&(dyn Any + Send)> {
        self.user_data.as_deref()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// ICMP identifier, assigned at submission.
    pub fn id(&self) -> u16 {
        self.id
    }

    /// Sequence number, assigned at transmit time.
    pub fn sequence(&self) -> u16 {
        self.sequence
    }

    pub(crate) fn is_ipv4(&self) -> bool {
        self.address.is_ipv4()
    }

    /// Records the transmit instant and derives the deadline.
    pub(crate) fn stamp(&mut self, now: Instant) {
        self.sent_at = now;
        self.deadline = now + self.timeout;
        self.complete = false;
    }
}

impl fmt::Debug for PingTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PingTarget")
            .field("address", &self.address)
            .field("timeout", &self.timeout)
            .field("id", &self.id)
            .field("sequence", &self.sequence)
            .finish()
    }
}

impl fmt::Display for PingTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.address)
    }
}

/// Why a probe terminated without a reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureReason {
    /// The deadline elapsed with no matching echo reply.
    TimedOut,
    /// `sendto` failed; the probe never went out.
    SendError,
}

/// Terminal callbacks, invoked synchronously on the reactor thread.
/// Exactly one fires per submitted target. Implementations should not
/// block; the reactor cannot make progress while a handler runs.
pub trait PingHandler: Send + Sync {
    fn on_response(&self, target: &PingTarget, rtt_secs: f64, byte_count: i32, sequence: i32);

    fn on_failure(&self, target: &PingTarget, reason: FailureReason);
}
