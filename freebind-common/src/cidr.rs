use std::fmt::{Display, Formatter};
use std::net::IpAddr;
use std::str::FromStr;
use ipnet::IpNet;
use crate::AddressFamily;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("{token:?} is not a numeric `address/prefix-length` range")]
    Malformed {
        token: String,
        source: ipnet::AddrParseError,
    },
    #[error("prefix length exceeds the maximum for its address family")]
    PrefixLen(#[from] ipnet::PrefixLenError),
}

/// An address range in `address/prefix-length` form.
///
/// The address is kept exactly as written, bits past `prefix_len` are never honoured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CidrRange {
    net: IpNet,
    /// Network-order bytes of `net.addr()`, only the first `family().byte_len()` are used.
    octets: [u8; 16],
}

impl CidrRange {
    pub fn new(address: IpAddr, prefix_len: u8) -> Result<Self, ParseError> {
        Ok(IpNet::new(address, prefix_len)?.into())
    }

    /// Parse `ADDR/LEN`, with the family inferred from whichever address form parses.
    pub fn parse(text: &str) -> Result<Self, ParseError> {
        let net = IpNet::from_str(text).map_err(|source| ParseError::Malformed {
            token: text.to_string(),
            source,
        })?;

        Ok(net.into())
    }

    pub fn net(&self) -> IpNet {
        self.net
    }

    pub fn family(&self) -> AddressFamily {
        AddressFamily::of(self.net.addr())
    }

    /// Network-order address bytes, `family().byte_len()` long.
    pub fn prefix(&self) -> &[u8] {
        &self.octets[..self.family().byte_len()]
    }

    pub fn prefix_len(&self) -> u8 {
        self.net.prefix_len()
    }

    pub fn address(&self) -> IpAddr {
        self.net.addr()
    }

    /// Whether the first `prefix_len` bits of `ip` match this range.
    pub fn contains(&self, ip: IpAddr) -> bool {
        self.net.contains(&ip)
    }
}

impl From<IpNet> for CidrRange {
    fn from(net: IpNet) -> Self {
        let mut octets = [0; 16];
        match net.addr() {
            IpAddr::V4(ip) => octets[..4].copy_from_slice(&ip.octets()),
            IpAddr::V6(ip) => octets = ip.octets(),
        }

        Self { net, octets }
    }
}

impl FromStr for CidrRange {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Display for CidrRange {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.net)
    }
}
