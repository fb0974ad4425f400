// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Engine error types

use std::io;

use thiserror::Error;

/// Errors surfaced through the public API.
///
/// Per-probe outcomes (timeouts, send failures) are reported through
/// [`PingHandler::on_failure`](crate::PingHandler::on_failure), not here.
/// Transient `EAGAIN`/`EINTR` conditions are retried internally and
/// never surface at all.
#[derive(Debug, Error)]
pub enum PingError {
    /// The pending queue for the target's address family is at capacity.
    /// The probe was not accepted; the caller may retry later.
    #[error("pending ping queue is full")]
    QueueFull,

    /// The engine has been stopped (or its reactor has terminated) and
    /// accepts no further probes.
    #[error("pinger is stopped")]
    Stopped,

    /// Creating the wakeup pipe failed.
    #[error("failed to create wakeup pipe: {0}")]
    Pipe(#[source] io::Error),

    /// Creating or configuring an ICMP socket failed.
    #[error("{context}: {source}")]
    Socket {
        context: &'static str,
        #[source]
        source: io::Error,
    },

    /// The readiness wait itself failed; the reactor has terminated and
    /// no further callbacks will fire.
    #[error("poll() failed: {0}")]
    Poll(#[source] io::Error),
}
