use anyhow::{Result, bail};
use std::net::Ipv4Addr;

/// ICMP type of an Echo Request.
pub const ECHO_REQUEST: u8 = 8;
/// ICMP type of an Echo Reply.
pub const ECHO_REPLY: u8 = 0;

/// Length of the ICMP echo header (type, code, checksum, identifier, sequence).
pub const HEADER_LEN: usize = 8;

/// IPv4 header plus ICMP header, assumed fixed when reporting sizes.
pub const OVERHEAD: usize = 28;

// Layout of the IPv4 header that precedes the ICMP message on a raw socket.
const IPV4_HEADER_LEN: usize = 20;
const IPV4_TTL_OFFSET: usize = 8;
const IPV4_SOURCE_OFFSET: usize = 12;

/// Largest Echo payload that fits a single IPv4 datagram.
pub const MAX_PAYLOAD: usize = 65507;

/// Internet checksum (RFC 1071).
pub fn checksum(data: &[u8]) -> u16 {
    let words = data.chunks_exact(2);
    // Odd trailing byte is the high byte of a zero-padded word.
    let tail = match words.remainder() {
        [last] => (*last as u64) << 8,
        _ => 0,
    };
    let mut sum = words
        .map(|w| u16::from_be_bytes([w[0], w[1]]) as u64)
        .fold(tail, u64::wrapping_add);
    while sum > 0xFFFF {
        sum = (sum & 0xFFFF) + (sum >> 16);
    }
    !(sum as u16)
}

/// One ICMP echo message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EchoPacket {
    pub icmp_type: u8,
    pub code: u8,
    pub checksum: u16,
    pub identifier: u16,
    pub sequence: u16,
    pub payload_len: usize,
}

impl EchoPacket {
    /// An Echo Request using `counter` as both identifier and sequence.
    pub fn request(counter: u16, payload_len: usize) -> Self {
        Self {
            icmp_type: ECHO_REQUEST,
            code: 0,
            checksum: 0,
            identifier: counter,
            sequence: counter,
            payload_len,
        }
    }

    /// Serializes the packet with a zero-filled payload and patches the
    /// checksum into bytes 2 and 3.
    pub fn encode(&mut self) -> Vec<u8> {
        let mut pkt = Vec::with_capacity(HEADER_LEN + self.payload_len);

        // Checksum placeholder stays zero while summing.
        pkt.extend_from_slice(&[self.icmp_type, self.code, 0, 0]);
        pkt.extend_from_slice(&self.identifier.to_be_bytes());
        pkt.extend_from_slice(&self.sequence.to_be_bytes());
        pkt.resize(HEADER_LEN + self.payload_len, 0);

        self.checksum = checksum(&pkt);
        pkt[2..4].copy_from_slice(&self.checksum.to_be_bytes());
        pkt
    }
}

/// Fields pulled out of a datagram read from the raw socket.
///
/// The buffer starts with the IPv4 header, so the TTL and source address sit
/// at fixed offsets 8 and 12..16. The ICMP message follows the header at the
/// offset given by the IHL nibble.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EchoReply {
    pub ttl: u8,
    pub source: Ipv4Addr,
    pub icmp_type: u8,
    pub identifier: u16,
    pub sequence: u16,
}

impl EchoReply {
    pub fn parse(buf: &[u8]) -> Result<Self> {
        if buf.len() < IPV4_HEADER_LEN {
            bail!("datagram too short for an IPv4 header ({} bytes)", buf.len());
        }
        let ttl = buf[IPV4_TTL_OFFSET];
        let source = Ipv4Addr::new(
            buf[IPV4_SOURCE_OFFSET],
            buf[IPV4_SOURCE_OFFSET + 1],
            buf[IPV4_SOURCE_OFFSET + 2],
            buf[IPV4_SOURCE_OFFSET + 3],
        );

        let ihl = (buf[0] & 0x0F) as usize * 4;
        if ihl < IPV4_HEADER_LEN {
            bail!("invalid IPv4 header length {ihl}");
        }
        let Some(icmp) = buf.get(ihl..ihl + HEADER_LEN) else {
            bail!("datagram too short for an ICMP header ({} bytes)", buf.len());
        };

        Ok(Self {
            ttl,
            source,
            icmp_type: icmp[0],
            identifier: u16::from_be_bytes([icmp[4], icmp[5]]),
            sequence: u16::from_be_bytes([icmp[6], icmp[7]]),
        })
    }

    /// Whether this is the Echo Reply to the request sent with `counter`.
    pub fn answers(&self, counter: u16) -> bool {
        self.icmp_type == ECHO_REPLY && self.identifier == counter && self.sequence == counter
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn folded_sum(data: &[u8]) -> u16 {
        !checksum(data)
    }

    #[test]
    fn test_checksum_rfc1071_example() {
        // RFC 1071 section 3: the sum of these words is 0xddf2.
        let data = [0x00, 0x01, 0xf2, 0x03, 0xf4, 0xf5, 0xf6, 0xf7];
        assert_eq!(folded_sum(&data), 0xddf2);
        assert_eq!(checksum(&data), 0x220d);
    }

    #[test]
    fn test_checksum_odd_length_pads_low_byte() {
        assert_eq!(checksum(&[0xab]), checksum(&[0xab, 0x00]));
        assert_eq!(checksum(&[0x12, 0x34, 0x56]), !0x6834u16);
    }

    #[test]
    fn test_checksum_empty() {
        assert_eq!(checksum(&[]), 0xFFFF);
    }

    #[test]
    fn test_encoded_packet_verifies() {
        for len in [0, 1, 7, 56, 64, 1471] {
            let pkt = EchoPacket::request(0x1234, len).encode();
            // Summing a packet that carries its own checksum folds to 0xFFFF.
            assert_eq!(folded_sum(&pkt), 0xFFFF, "payload of {len} bytes");
        }
    }

    #[test]
    fn test_encode_layout() {
        let mut packet = EchoPacket::request(7, 4);
        let pkt = packet.encode();
        assert_eq!(pkt.len(), HEADER_LEN + 4);
        assert_eq!(&pkt[..2], &[ECHO_REQUEST, 0]);
        assert_eq!(&pkt[4..8], &[0, 7, 0, 7]);
        assert_eq!(&pkt[8..], &[0, 0, 0, 0]);
        assert_eq!(u16::from_be_bytes([pkt[2], pkt[3]]), packet.checksum);
    }

    #[test]
    fn test_header_only_is_deterministic() {
        let first = EchoPacket::request(1, 0).encode();
        let second = EchoPacket::request(1, 0).encode();
        assert_eq!(first, second);
        assert_eq!(first, vec![8, 0, 0xf7, 0xfd, 0, 1, 0, 1]);
    }

    #[rustfmt::skip]
    const REPLY: [u8; 28] = [
        0x45, 0x00, 0x00, 0x1c,
        0x00, 0x00, 0x00, 0x00,
        0x37, 0x01, 0x00, 0x00, // ttl 55
        0xc0, 0xa8, 0x01, 0x2a, // 192.168.1.42
        0x0a, 0x00, 0x00, 0x01,
        0x00, 0x00, 0x00, 0x00, // echo reply
        0x00, 0x03, 0x00, 0x03,
    ];

    #[test]
    fn test_parse_reply() {
        let reply = EchoReply::parse(&REPLY).unwrap();
        assert_eq!(reply.ttl, 55);
        assert_eq!(reply.source, Ipv4Addr::new(192, 168, 1, 42));
        assert!(reply.answers(3));
        assert!(!reply.answers(4));
    }

    #[test]
    fn test_parse_rejects_short_buffers() {
        assert!(EchoReply::parse(&REPLY[..19]).is_err());
        assert!(EchoReply::parse(&REPLY[..24]).is_err());

        let mut bad_ihl = REPLY;
        bad_ihl[0] = 0x44;
        assert!(EchoReply::parse(&bad_ihl).is_err());
    }

    #[test]
    fn test_request_is_not_an_answer() {
        let mut own = REPLY;
        own[20] = ECHO_REQUEST;
        assert!(!EchoReply::parse(&own).unwrap().answers(3));
    }
}
