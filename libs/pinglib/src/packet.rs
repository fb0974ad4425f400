// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! ICMP echo packet encoding and decoding
//!
//! All wire structures are read and written through explicit big-endian
//! byte offsets into plain buffers; there is no struct overlay.

/// Minimum ICMP message length: type, code, checksum, and the 4-byte
/// type-specific field (identifier + sequence for echo messages).
pub const ICMP_MINLEN: usize = 8;

/// Default echo payload length, matching classic `ping`.
pub const DEFAULT_DATALEN: usize = 56;

/// Bytes transmitted per echo request.
pub const SEND_PACKET_SIZE: usize = ICMP_MINLEN + DEFAULT_DATALEN;

/// Size of `struct ip` without options. BSD-family kernels deliver this
/// header ahead of ICMP replies on v4 sockets; Linux does not.
pub const IP_HEADER_SIZE: usize = 20;

/// Size of the classic BSD `struct icmp`, including the encoded union
/// region that follows the 8-byte echo header.
pub const ICMP_STRUCT_SIZE: usize = 28;

/// Receive/transmit scratch buffer size: the largest reply we care about
/// is an echo reply with IP header, 20 + 64 bytes.
pub const BUFFER_SIZE: usize = 128;

pub const ICMP_ECHO: u8 = 8;
pub const ICMP_ECHOREPLY: u8 = 0;
pub const ICMPV6_ECHO_REQUEST: u8 = 128;
pub const ICMPV6_ECHO_REPLY: u8 = 129;

/// Field offsets within the ICMP echo header.
pub const CKSUM_OFFSET: usize = 2;
pub const ID_OFFSET: usize = 4;
pub const SEQ_OFFSET: usize = 6;
pub const DATA_OFFSET: usize = 8;

/// ICMPv6 echo carries the sequence in the first two bytes of its 32-bit
/// type-specific field; the identifier half is owned by the kernel for
/// DGRAM ping sockets, so correlation is by sequence alone.
pub const V6_SEQ_OFFSET: usize = 4;

/// BSD-family stacks deliver the IPv4 header with replies and leave the
/// outgoing checksum to us; Linux-family stacks do neither for DGRAM
/// ping sockets.
pub(crate) const BSD_STACK: bool = cfg!(any(
    target_os = "macos",
    target_os = "ios",
    target_os = "freebsd",
    target_os = "netbsd",
    target_os = "openbsd",
    target_os = "dragonfly",
));

/// A validated echo reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EchoReply {
    pub v6: bool,
    pub sequence: u16,
}

/// Writes an ICMPv4 echo request into `buf[..SEND_PACKET_SIZE]`.
pub fn encode_echo_request_v4(buf: &mut [u8], id: u16, sequence: u16) {
    buf[0] = ICMP_ECHO;
    buf[1] = 0;
    buf[CKSUM_OFFSET..CKSUM_OFFSET + 2].fill(0);
    buf[ID_OFFSET..ID_OFFSET + 2].copy_from_slice(&id.to_be_bytes());
    buf[SEQ_OFFSET..SEQ_OFFSET + 2].copy_from_slice(&sequence.to_be_bytes());
    fill_payload(&mut buf[DATA_OFFSET..SEND_PACKET_SIZE]);

    // On BSD the caller owns the checksum. The Linux kernel rewrites the
    // identifier on DGRAM ping sockets and recomputes the checksum, so
    // computing one there would be wasted work.
    if BSD_STACK {
        store_checksum(buf);
    }
}

/// Writes an ICMPv6 echo request into `buf[..SEND_PACKET_SIZE]`.
pub fn encode_echo_request_v6(buf: &mut [u8], sequence: u16) {
    buf[0] = ICMPV6_ECHO_REQUEST;
    buf[1] = 0;
    buf[CKSUM_OFFSET..CKSUM_OFFSET + 2].fill(0);
    buf[V6_SEQ_OFFSET..V6_SEQ_OFFSET + 2].copy_from_slice(&sequence.to_be_bytes());
    buf[SEQ_OFFSET..SEQ_OFFSET + 2].fill(0);
    fill_payload(&mut buf[DATA_OFFSET..SEND_PACKET_SIZE]);

    if BSD_STACK {
        store_checksum(buf);
    }
}

fn fill_payload(payload: &mut [u8]) {
    for (i, byte) in payload.iter_mut().enumerate() {
        *byte = i as u8;
    }
}

fn store_checksum(buf: &mut [u8]) {
    let sum = checksum(&buf[..SEND_PACKET_SIZE]);
    // The sum was accumulated from low-byte-first words, so it goes back
    // into the buffer in that same order.
    buf[CKSUM_OFFSET..CKSUM_OFFSET + 2].copy_from_slice(&sum.to_le_bytes());
}

/// Internet checksum over `buf`: one's complement of the one's-complement
/// sum of 16-bit words, trailing odd byte included, carries folded back
/// twice.
pub fn checksum(buf: &[u8]) -> u16 {
    let mut sum: u32 = 0;

    let mut words = buf.chunks_exact(2);
    for word in &mut words {
        sum += u32::from(word[0]) | (u32::from(word[1]) << 8);
    }
    if let Some(&odd) = words.remainder().first() {
        sum += u32::from(odd);
    }

    sum = (sum >> 16) + (sum & 0xffff);
    sum += sum >> 16;
    !sum as u16
}

/// Decodes a received datagram as an echo reply. Returns `None` for
/// anything else; raw ICMP sockets observe traffic that is not ours.
pub fn decode_echo_reply(buf: &[u8]) -> Option<EchoReply> {
    decode_echo_reply_at(buf, BSD_STACK)
}

fn decode_echo_reply_at(buf: &[u8], bsd: bool) -> Option<EchoReply> {
    let first = *buf.first()?;

    // BSD v4 sockets deliver the IP header; its length field is the low
    // nibble in 32-bit words.
    let is_v4_header = (first & 0xf0) >> 4 == 4;
    let skip = if bsd && is_v4_header {
        usize::from((first & 0x0f) << 2)
    } else {
        0
    };

    let icmp = buf.get(skip..)?;
    if icmp.len() < ICMP_MINLEN {
        return None;
    }

    match icmp[0] {
        ICMP_ECHOREPLY if icmp[1] == 0 => Some(EchoReply {
            v6: false,
            sequence: u16::from_be_bytes([icmp[SEQ_OFFSET], icmp[SEQ_OFFSET + 1]]),
        }),
        ICMPV6_ECHO_REPLY if icmp[1] == 0 => Some(EchoReply {
            v6: true,
            sequence: u16::from_be_bytes([icmp[V6_SEQ_OFFSET], icmp[V6_SEQ_OFFSET + 1]]),
        }),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checksum_ascending_bytes() {
        let buf: Vec<u8> = (0..64).map(|i| i as u8).collect();
        assert_eq!(64539, checksum(&buf));
    }

    #[test]
    fn checksum_descending_bytes() {
        let buf: Vec<u8> = (0..64).map(|i| 255 - i as u8).collect();
        assert_eq!(996, checksum(&buf));
    }

    #[test]
    fn checksum_odd_length() {
        // Trailing odd byte is added as-is.
        assert_eq!(checksum(&[0x01, 0x02, 0x03]), !0x0204u16);
    }

    #[test]
    fn header_offsets() {
        assert_eq!(2, CKSUM_OFFSET);
        assert_eq!(4, ID_OFFSET);
        assert_eq!(6, SEQ_OFFSET);
        assert_eq!(8, DATA_OFFSET);
        assert_eq!(20, IP_HEADER_SIZE);
        assert_eq!(28, ICMP_STRUCT_SIZE);
        assert_eq!(64, SEND_PACKET_SIZE);
    }

    #[test]
    fn encode_v4_layout() {
        let mut buf = [0u8; SEND_PACKET_SIZE];
        encode_echo_request_v4(&mut buf, 0xCAFE, 0xBABE);

        assert_eq!(ICMP_ECHO, buf[0]);
        assert_eq!(0, buf[1]);
        assert_eq!([0xCA, 0xFE], buf[ID_OFFSET..ID_OFFSET + 2]);
        assert_eq!([0xBA, 0xBE], buf[SEQ_OFFSET..SEQ_OFFSET + 2]);
        for (i, &byte) in buf[DATA_OFFSET..].iter().enumerate() {
            assert_eq!(i as u8, byte);
        }
    }

    #[test]
    fn encode_v6_layout() {
        let mut buf = [0u8; SEND_PACKET_SIZE];
        encode_echo_request_v6(&mut buf, 0x1234);

        assert_eq!(ICMPV6_ECHO_REQUEST, buf[0]);
        assert_eq!(0, buf[1]);
        assert_eq!([0x12, 0x34], buf[V6_SEQ_OFFSET..V6_SEQ_OFFSET + 2]);
        assert_eq!([0, 0], buf[SEQ_OFFSET..SEQ_OFFSET + 2]);
    }

    #[test]
    fn decode_bare_v4_reply() {
        let mut buf = [0u8; SEND_PACKET_SIZE];
        buf[0] = ICMP_ECHOREPLY;
        buf[SEQ_OFFSET..SEQ_OFFSET + 2].copy_from_slice(&0xBEEFu16.to_be_bytes());

        let reply = decode_echo_reply_at(&buf, false).unwrap();
        assert!(!reply.v6);
        assert_eq!(0xBEEF, reply.sequence);
    }

    #[test]
    fn decode_v4_reply_with_ip_header() {
        let mut buf = [0u8; IP_HEADER_SIZE + SEND_PACKET_SIZE];
        buf[0] = 0x45; // version 4, 5-word header
        buf[IP_HEADER_SIZE] = ICMP_ECHOREPLY;
        buf[IP_HEADER_SIZE + SEQ_OFFSET..IP_HEADER_SIZE + SEQ_OFFSET + 2]
            .copy_from_slice(&7u16.to_be_bytes());

        let reply = decode_echo_reply_at(&buf, true).unwrap();
        assert!(!reply.v6);
        assert_eq!(7, reply.sequence);
    }

    #[test]
    fn decode_v6_reply() {
        let mut buf = [0u8; SEND_PACKET_SIZE];
        buf[0] = ICMPV6_ECHO_REPLY;
        buf[V6_SEQ_OFFSET..V6_SEQ_OFFSET + 2].copy_from_slice(&0x0102u16.to_be_bytes());

        let reply = decode_echo_reply_at(&buf, false).unwrap();
        assert!(reply.v6);
        assert_eq!(0x0102, reply.sequence);
    }

    #[test]
    fn decode_rejects_foreign_traffic() {
        // Echo request (our own loopback echo), destination unreachable,
        // and a truncated fragment are all "not ours".
        let mut buf = [0u8; SEND_PACKET_SIZE];
        buf[0] = ICMP_ECHO;
        assert_eq!(None, decode_echo_reply_at(&buf, false));

        buf[0] = 3;
        assert_eq!(None, decode_echo_reply_at(&buf, false));

        assert_eq!(None, decode_echo_reply_at(&[ICMP_ECHOREPLY, 0, 0], false));
        assert_eq!(None, decode_echo_reply_at(&[], false));
    }
}
