// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Raw ICMP datagram sockets
//!
//! Unprivileged "ping sockets": `SOCK_DGRAM` with `IPPROTO_ICMP[V6]`.
//! The kernel owns the ICMP identifier on Linux and filters replies to
//! our own echoes, but other ICMP traffic can still be visible.

use std::io;
use std::mem::size_of;

use crate::error::PingError;
use crate::sockaddr::SockAddr;

pub(crate) struct IcmpSocket {
    fd: libc::c_int,
}

impl IcmpSocket {
    pub fn open_v4() -> Result<Self, PingError> {
        Self::open(
            libc::AF_INET,
            libc::IPPROTO_ICMP,
            "failed to create IPv4 ICMP socket (on Linux, check sysctl net.ipv4.ping_group_range)",
        )
    }

    pub fn open_v6() -> Result<Self, PingError> {
        Self::open(
            libc::AF_INET6,
            libc::IPPROTO_ICMPV6,
            "failed to create IPv6 ICMP socket (on Linux, check sysctl net.ipv6.ping_group_range)",
        )
    }

    fn open(family: libc::c_int, protocol: libc::c_int, context: &'static str) -> Result<Self, PingError> {
        let fd = unsafe { libc::socket(family, libc::SOCK_DGRAM, protocol) };
        if fd < 0 {
            return Err(PingError::Socket {
                context,
                source: io::Error::last_os_error(),
            });
        }

        // Drop owns the fd from here on, so option failures close it.
        let socket = Self { fd };
        socket.set_option(libc::SO_TIMESTAMP, 1, "failed to set SO_TIMESTAMP")?;
        socket.set_option(libc::SO_REUSEPORT, 1, "failed to set SO_REUSEPORT")?;
        set_nonblocking(fd).map_err(|source| PingError::Socket {
            context: "failed to set O_NONBLOCK on ICMP socket",
            source,
        })?;
        Ok(socket)
    }

    fn set_option(
        &self,
        option: libc::c_int,
        value: libc::c_int,
        context: &'static str,
    ) -> Result<(), PingError> {
        let rc = unsafe {
            libc::setsockopt(
                self.fd,
                libc::SOL_SOCKET,
                option,
                &value as *const libc::c_int as *const libc::c_void,
                size_of::<libc::c_int>() as libc::socklen_t,
            )
        };
        if rc < 0 {
            return Err(PingError::Socket {
                context,
                source: io::Error::last_os_error(),
            });
        }
        Ok(())
    }

    pub fn fd(&self) -> libc::c_int {
        self.fd
    }

    pub fn send_to(&self, buf: &[u8], addr: &SockAddr) -> io::Result<usize> {
        let (sa, sa_len) = addr.as_raw();
        let rc = unsafe {
            libc::sendto(
                self.fd,
                buf.as_ptr() as *const libc::c_void,
                buf.len(),
                0,
                sa,
                sa_len,
            )
        };
        if rc < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(rc as usize)
    }

    pub fn recv(&self, buf: &mut [u8]) -> io::Result<usize> {
        let rc = unsafe { libc::recv(self.fd, buf.as_mut_ptr() as *mut libc::c_void, buf.len(), 0) };
        if rc < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(rc as usize)
    }
}

impl Drop for IcmpSocket {
    fn drop(&mut self) {
        unsafe {
            libc::close(self.fd);
        }
    }
}

/// The v4/v6 socket pair. Opened lazily on the first wakeup after the
/// reactor starts and dropped again after sustained idleness, so
/// start/stop cycles and quiet engines hold no descriptors.
pub(crate) struct SocketPair {
    pub v4: IcmpSocket,
    pub v6: IcmpSocket,
}

impl SocketPair {
    pub fn open() -> Result<Self, PingError> {
        Ok(Self {
            v4: IcmpSocket::open_v4()?,
            v6: IcmpSocket::open_v6()?,
        })
    }
}

pub(crate) fn set_nonblocking(fd: libc::c_int) -> io::Result<()> {
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFL, 0) };
    if flags < 0 {
        return Err(io::Error::last_os_error());
    }
    if unsafe { libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) } < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}
