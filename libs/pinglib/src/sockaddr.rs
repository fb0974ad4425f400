// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Socket address encoding for sendto

use std::mem::size_of;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

/// A destination address pre-encoded into the platform `sockaddr` shape,
/// built once per target. The `libc` definitions carry the BSD/Linux
/// layout difference (`sin_len` byte vs wider family field).
pub(crate) enum SockAddr {
    V4(libc::sockaddr_in),
    V6(libc::sockaddr_in6),
}

impl SockAddr {
    pub fn new(address: IpAddr) -> Self {
        match address {
            IpAddr::V4(addr) => Self::v4(addr),
            IpAddr::V6(addr) => Self::v6(addr),
        }
    }

    fn v4(addr: Ipv4Addr) -> Self {
        let mut sa: libc::sockaddr_in = unsafe { std::mem::zeroed() };
        #[cfg(any(
            target_os = "macos",
            target_os = "ios",
            target_os = "freebsd",
            target_os = "netbsd",
            target_os = "openbsd",
            target_os = "dragonfly",
        ))]
        {
            sa.sin_len = size_of::<libc::sockaddr_in>() as u8;
        }
        sa.sin_family = libc::AF_INET as libc::sa_family_t;
        sa.sin_port = 0;
        sa.sin_addr = libc::in_addr {
            s_addr: u32::from_ne_bytes(addr.octets()),
        };
        SockAddr::V4(sa)
    }

    fn v6(addr: Ipv6Addr) -> Self {
        let mut sa: libc::sockaddr_in6 = unsafe { std::mem::zeroed() };
        #[cfg(any(
            target_os = "macos",
            target_os = "ios",
            target_os = "freebsd",
            target_os = "netbsd",
            target_os = "openbsd",
            target_os = "dragonfly",
        ))]
        {
            sa.sin6_len = size_of::<libc::sockaddr_in6>() as u8;
        }
        sa.sin6_family = libc::AF_INET6 as libc::sa_family_t;
        sa.sin6_port = 0;
        sa.sin6_addr = libc::in6_addr {
            s6_addr: addr.octets(),
        };
        SockAddr::V6(sa)
    }

    /// Pointer and length for passing to `sendto`.
    pub fn as_raw(&self) -> (*const libc::sockaddr, libc::socklen_t) {
        match self {
            SockAddr::V4(sa) => (
                sa as *const libc::sockaddr_in as *const libc::sockaddr,
                size_of::<libc::sockaddr_in>() as libc::socklen_t,
            ),
            SockAddr::V6(sa) => (
                sa as *const libc::sockaddr_in6 as *const libc::sockaddr,
                size_of::<libc::sockaddr_in6>() as libc::socklen_t,
            ),
        }
    }
}
