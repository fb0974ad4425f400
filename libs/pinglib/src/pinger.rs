// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Single-threaded ping reactor and its thread-safe submission surface
//!
//! One thread calls [`IcmpPinger::run`] and becomes the reactor: it owns
//! the sockets, the in-flight registries, and the packet buffers, so
//! none of those need locks. Any other thread may submit probes; the
//! only shared state is the pending queues and the wakeup channel.

use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU16, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, error, warn};

use crate::error::PingError;
use crate::packet::{
    decode_echo_reply, encode_echo_request_v4, encode_echo_request_v6, BUFFER_SIZE,
    SEND_PACKET_SIZE,
};
use crate::pending::{PendingQueue, PENDING_QUEUE_SIZE};
use crate::registry::WaitingTargets;
use crate::socket::{IcmpSocket, SocketPair};
use crate::target::{FailureReason, PingHandler, PingTarget};
use crate::wakeup::WakeupChannel;

const POLLIN_OR_PRI: libc::c_short = libc::POLLIN | libc::POLLPRI;

/// Consecutive iterations with nothing pending before sockets close.
const IDLE_LOOPS_BEFORE_CLOSE: u32 = 10;

/// Re-poll interval while idle but not yet debounced into socket close.
const IDLE_POLL_MS: libc::c_int = 1000;

/// Wait bound when a registry is empty and imposes no deadline.
const DEFAULT_NEXT_TIMEOUT: Duration = Duration::from_secs(1);

struct Shared<H> {
    handler: H,
    pending_v4: PendingQueue,
    pending_v6: PendingQueue,
    wakeup: WakeupChannel,
    running: AtomicBool,
    in_flight: AtomicUsize,
    id_counter: AtomicU16,
    seq_counter: AtomicU16,
}

/// The engine handle. Cheap to clone; all clones drive the same engine.
pub struct IcmpPinger<H: PingHandler> {
    shared: Arc<Shared<H>>,
}

impl<H: PingHandler> Clone for IcmpPinger<H> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<H: PingHandler> IcmpPinger<H> {
    pub fn new(handler: H) -> Result<Self, PingError> {
        Ok(Self {
            shared: Arc::new(Shared {
                handler,
                pending_v4: PendingQueue::new(PENDING_QUEUE_SIZE),
                pending_v6: PendingQueue::new(PENDING_QUEUE_SIZE),
                wakeup: WakeupChannel::new()?,
                running: AtomicBool::new(true),
                in_flight: AtomicUsize::new(0),
                id_counter: AtomicU16::new(0xCAFE),
                seq_counter: AtomicU16::new(0xBABE),
            }),
        })
    }

    /// Queues a probe and wakes the reactor. Never blocks: a queue at
    /// capacity rejects with [`PingError::QueueFull`]. Exactly one
    /// terminal callback fires per accepted probe while the reactor
    /// keeps running.
    pub fn submit(&self, mut target: PingTarget) -> Result<(), PingError> {
        let shared = &self.shared;
        if !shared.running.load(Ordering::Acquire) {
            return Err(PingError::Stopped);
        }

        target.id = shared.id_counter.fetch_add(1, Ordering::Relaxed);
        let queue = if target.is_ipv4() {
            &shared.pending_v4
        } else {
            &shared.pending_v6
        };
        queue.push(target)?;

        shared.in_flight.fetch_add(1, Ordering::AcqRel);
        shared.wakeup.notify();
        Ok(())
    }

    /// Drives the reactor until [`stop`](Self::stop) or a fatal error.
    /// Blocks the calling thread. After it returns no further callbacks
    /// fire; probes still in flight are dropped without one.
    pub fn run(&self) -> Result<(), PingError> {
        let result = self.run_loop();
        self.shared.running.store(false, Ordering::Release);
        result
    }

    /// Stops the reactor. Idempotent; safe from any thread, including a
    /// callback.
    pub fn stop(&self) {
        if self.shared.running.swap(false, Ordering::AcqRel) {
            self.shared.wakeup.signal();
        }
    }

    /// True while any submitted probe has not yet reached its terminal
    /// callback.
    pub fn has_pending_work(&self) -> bool {
        self.shared.in_flight.load(Ordering::Acquire) > 0
    }

    /// False once the engine is stopped or its reactor has terminated.
    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    fn run_loop(&self) -> Result<(), PingError> {
        let shared = &*self.shared;

        let mut sockets: Option<SocketPair> = None;
        let mut registry_v4 = WaitingTargets::new();
        let mut registry_v6 = WaitingTargets::new();
        let mut recv_buf = [0u8; BUFFER_SIZE];
        let mut send_buf = [0u8; SEND_PACKET_SIZE];

        let mut poll_timeout: libc::c_int = -1;
        let mut events_v4: libc::c_short = 0;
        let mut events_v6: libc::c_short = 0;
        let mut noop_loops = 0u32;

        while shared.running.load(Ordering::Acquire) {
            let mut fds = [
                libc::pollfd {
                    fd: shared.wakeup.read_fd(),
                    events: POLLIN_OR_PRI,
                    revents: 0,
                },
                libc::pollfd { fd: -1, events: events_v4, revents: 0 },
                libc::pollfd { fd: -1, events: events_v6, revents: 0 },
            ];
            let nfds: libc::nfds_t = match &sockets {
                Some(pair) => {
                    fds[1].fd = pair.v4.fd();
                    fds[2].fd = pair.v6.fd();
                    3
                }
                None => 1,
            };

            let rc = unsafe { libc::poll(fds.as_mut_ptr(), nfds, poll_timeout) };
            if rc < 0 {
                let err = io::Error::last_os_error();
                if err.raw_os_error() == Some(libc::EINTR) {
                    continue;
                }
                error!("poll() failed: {}", err);
                return Err(PingError::Poll(err));
            }

            shared.wakeup.clear_awoken();

            if fds[0].revents & POLLIN_OR_PRI != 0 {
                shared.wakeup.drain();
                if sockets.is_none() {
                    match SocketPair::open() {
                        Ok(pair) => sockets = Some(pair),
                        Err(err) => {
                            error!("{}", err);
                            return Err(err);
                        }
                    }
                }
            }

            if rc > 0 {
                if let Some(pair) = &sockets {
                    if fds[1].revents & libc::POLLERR != 0 || fds[2].revents & libc::POLLERR != 0 {
                        error!("poll() reported POLLERR on an ICMP socket");
                        return Err(PingError::Poll(io::Error::new(
                            io::ErrorKind::Other,
                            "POLLERR on ICMP socket",
                        )));
                    }

                    if fds[1].revents & POLLIN_OR_PRI != 0 {
                        process_receives(shared, &pair.v4, &mut registry_v4, false, &mut recv_buf);
                    }
                    if fds[2].revents & POLLIN_OR_PRI != 0 {
                        process_receives(shared, &pair.v6, &mut registry_v6, true, &mut recv_buf);
                    }

                    if fds[1].revents & libc::POLLOUT != 0 {
                        process_sends(shared, &shared.pending_v4, &pair.v4, &mut registry_v4, &mut send_buf);
                    }
                    if fds[2].revents & libc::POLLOUT != 0 {
                        process_sends(shared, &shared.pending_v6, &pair.v6, &mut registry_v6, &mut send_buf);
                    }
                }
            }

            let next_v4 = process_timeouts(shared, &mut registry_v4);
            let next_v6 = process_timeouts(shared, &mut registry_v6);
            let next = next_v4.min(next_v6);
            poll_timeout = next.as_millis().clamp(1, libc::c_int::MAX as u128) as libc::c_int;

            let pending_v4_reads = !registry_v4.is_empty();
            let pending_v6_reads = !registry_v6.is_empty();
            let pending_v4_writes = !shared.pending_v4.is_empty();
            let pending_v6_writes = !shared.pending_v6.is_empty();

            events_v4 = 0;
            events_v6 = 0;
            if pending_v4_reads {
                events_v4 |= POLLIN_OR_PRI;
            }
            if pending_v6_reads {
                events_v6 |= POLLIN_OR_PRI;
            }
            if pending_v4_writes {
                events_v4 |= libc::POLLOUT;
            }
            if pending_v6_writes {
                events_v6 |= libc::POLLOUT;
            }

            if pending_v4_reads || pending_v6_reads || pending_v4_writes || pending_v6_writes {
                noop_loops = 0;
            } else {
                let idle_for = noop_loops;
                noop_loops += 1;
                if idle_for > IDLE_LOOPS_BEFORE_CLOSE {
                    // Debounced idle: drop the sockets and sleep until
                    // the next submission wakes us.
                    sockets = None;
                    poll_timeout = -1;
                } else {
                    poll_timeout = IDLE_POLL_MS;
                }
            }
        }

        Ok(())
    }
}

/// Drains one pending queue onto the wire. A transient `sendto` error
/// requeues the target for the next iteration; a real failure reports
/// `SendError` and stops draining.
fn process_sends<H: PingHandler>(
    shared: &Shared<H>,
    queue: &PendingQueue,
    socket: &IcmpSocket,
    registry: &mut WaitingTargets,
    send_buf: &mut [u8],
) {
    while let Some(mut target) = queue.pop() {
        target.sequence = shared.seq_counter.fetch_add(1, Ordering::Relaxed);
        if target.is_ipv4() {
            encode_echo_request_v4(send_buf, target.id, target.sequence);
        } else {
            encode_echo_request_v6(send_buf, target.sequence);
        }
        target.stamp(Instant::now());

        match socket.send_to(&send_buf[..SEND_PACKET_SIZE], &target.sock_addr) {
            Ok(SEND_PACKET_SIZE) => {
                debug!("sent echo request seq={} to {}", target.sequence, target);
                registry.add(target);
            }
            Ok(n) => {
                debug!("short send ({} of {} bytes) to {}", n, SEND_PACKET_SIZE, target);
                dispatch_failure(shared, &target, FailureReason::SendError);
                break;
            }
            Err(err) if is_transient(&err) => {
                queue.push_front(target);
                break;
            }
            Err(err) => {
                debug!("sendto {} failed: {}", target, err);
                dispatch_failure(shared, &target, FailureReason::SendError);
                break;
            }
        }
    }
}

/// Receives until the socket runs dry, matching replies to in-flight
/// targets by sequence number. Packets that fail to decode or match
/// nothing are alien traffic and are dropped without a callback.
fn process_receives<H: PingHandler>(
    shared: &Shared<H>,
    socket: &IcmpSocket,
    registry: &mut WaitingTargets,
    v6: bool,
    recv_buf: &mut [u8],
) {
    loop {
        let count = match socket.recv(recv_buf) {
            Ok(0) => return,
            Ok(count) => count,
            Err(err) => {
                if !is_transient(&err) {
                    debug!("recv on ICMP socket failed: {}", err);
                }
                return;
            }
        };

        let reply = match decode_echo_reply(&recv_buf[..count]) {
            Some(reply) if reply.v6 == v6 => reply,
            _ => {
                debug!("discarding {} bytes that are not our echo reply", count);
                continue;
            }
        };

        match registry.remove(reply.sequence) {
            Some(target) => {
                let rtt = Instant::now().duration_since(target.sent_at).as_secs_f64();
                dispatch_response(shared, &target, rtt, count as i32, reply.sequence as i32);
            }
            None => {
                debug!("no waiting target for echo reply seq={}", reply.sequence);
            }
        }
    }
}

/// Expires overdue targets in deadline order and returns how long until
/// the next deadline, or a default bound if the registry is empty.
fn process_timeouts<H: PingHandler>(shared: &Shared<H>, registry: &mut WaitingTargets) -> Duration {
    loop {
        let Some(deadline) = registry.peek_next_deadline() else {
            return DEFAULT_NEXT_TIMEOUT;
        };
        let now = Instant::now();
        if now < deadline {
            return deadline - now;
        }
        if let Some(target) = registry.take_expired() {
            dispatch_failure(shared, &target, FailureReason::TimedOut);
        }
    }
}

fn is_transient(err: &io::Error) -> bool {
    // EWOULDBLOCK aliases EAGAIN on Linux but not everywhere.
    match err.raw_os_error() {
        Some(code) => code == libc::EAGAIN || code == libc::EWOULDBLOCK || code == libc::EINTR,
        None => false,
    }
}

// A panicking handler must not take down the reactor; the remaining
// events of this iteration still get delivered.

fn dispatch_response<H: PingHandler>(
    shared: &Shared<H>,
    target: &PingTarget,
    rtt_secs: f64,
    byte_count: i32,
    sequence: i32,
) {
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        shared
            .handler
            .on_response(target, rtt_secs, byte_count, sequence)
    }));
    if outcome.is_err() {
        warn!("ping response handler panicked for {}", target);
    }
    shared.in_flight.fetch_sub(1, Ordering::AcqRel);
}

fn dispatch_failure<H: PingHandler>(shared: &Shared<H>, target: &PingTarget, reason: FailureReason) {
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        shared.handler.on_failure(target, reason)
    }));
    if outcome.is_err() {
        warn!("ping failure handler panicked for {}", target);
    }
    shared.in_flight.fetch_sub(1, Ordering::AcqRel);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    struct NullHandler;

    impl PingHandler for NullHandler {
        fn on_response(&self, _: &PingTarget, _: f64, _: i32, _: i32) {}

        fn on_failure(&self, _: &PingTarget, _: FailureReason) {}
    }

    fn target() -> PingTarget {
        PingTarget::new(IpAddr::V4(Ipv4Addr::new(240, 0, 0, 1)))
    }

    #[test]
    fn submit_tracks_pending_work() {
        let pinger = IcmpPinger::new(NullHandler).unwrap();
        assert!(!pinger.has_pending_work());

        pinger.submit(target()).unwrap();
        assert!(pinger.has_pending_work());
    }

    #[test]
    fn stop_is_idempotent_and_rejects_submissions() {
        let pinger = IcmpPinger::new(NullHandler).unwrap();
        assert!(pinger.is_running());

        pinger.stop();
        pinger.stop();
        assert!(!pinger.is_running());
        assert!(matches!(pinger.submit(target()), Err(PingError::Stopped)));
    }

    #[test]
    fn run_after_stop_returns_without_opening_sockets() {
        let pinger = IcmpPinger::new(NullHandler).unwrap();
        pinger.stop();
        pinger.run().unwrap();
    }

    #[test]
    fn full_queue_rejects_submission() {
        let pinger = IcmpPinger::new(NullHandler).unwrap();
        for _ in 0..PENDING_QUEUE_SIZE {
            pinger.submit(target()).unwrap();
        }
        assert!(matches!(pinger.submit(target()), Err(PingError::QueueFull)));
    }

    #[test]
    fn identifiers_are_assigned_per_submission() {
        let pinger = IcmpPinger::new(NullHandler).unwrap();
        let queue = &pinger.shared.pending_v4;

        pinger.submit(target()).unwrap();
        pinger.submit(target()).unwrap();

        let first = queue.pop().unwrap();
        let second = queue.pop().unwrap();
        assert_eq!(0xCAFE, first.id);
        assert_eq!(0xCAFF, second.id);
    }
}
