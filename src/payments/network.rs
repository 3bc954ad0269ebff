//! Gateway source address allow-list

use http::HeaderMap;
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;
use thiserror::Error;

/// Address ranges the gateway sends notifications from
pub const DEFAULT_GATEWAY_NETWORKS: &[&str] = &[
    "91.194.226.0/23",
    "91.218.132.0/22",
    "212.49.24.0/24",
    "212.233.80.0/22",
];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid network range '{0}'")]
pub struct NetworkParseError(pub String);

/// A CIDR block, IPv4 or IPv6
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IpNetwork {
    addr: IpAddr,
    prefix: u8,
}

impl IpNetwork {
    pub fn contains(&self, ip: IpAddr) -> bool {
        match (self.addr, ip.to_canonical()) {
            (IpAddr::V4(net), IpAddr::V4(ip)) => {
                let mask = prefix_mask_u32(self.prefix);
                u32::from(net) & mask == u32::from(ip) & mask
            }
            (IpAddr::V6(net), IpAddr::V6(ip)) => {
                let mask = prefix_mask_u128(self.prefix);
                u128::from(net) & mask == u128::from(ip) & mask
            }
            _ => false,
        }
    }
}

fn prefix_mask_u32(prefix: u8) -> u32 {
    if prefix == 0 {
        0
    } else {
        u32::MAX << (32 - u32::from(prefix))
    }
}

fn prefix_mask_u128(prefix: u8) -> u128 {
    if prefix == 0 {
        0
    } else {
        u128::MAX << (128 - u32::from(prefix))
    }
}

impl FromStr for IpNetwork {
    type Err = NetworkParseError;

    /// Accepts `a.b.c.d/nn`, `v6::/nn`, or a bare address (single host)
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || NetworkParseError(s.to_string());
        let trimmed = s.trim();

        let (addr, prefix) = match trimmed.split_once('/') {
            Some((addr, prefix)) => {
                let addr: IpAddr = addr.parse().map_err(|_| err())?;
                let prefix: u8 = prefix.parse().map_err(|_| err())?;
                (addr, prefix)
            }
            None => {
                let addr: IpAddr = trimmed.parse().map_err(|_| err())?;
                let prefix = if addr.is_ipv4() { 32 } else { 128 };
                (addr, prefix)
            }
        };

        let max = if addr.is_ipv4() { 32 } else { 128 };
        if prefix > max {
            return Err(err());
        }

        Ok(Self { addr, prefix })
    }
}

impl fmt::Display for IpNetwork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.addr, self.prefix)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AllowList {
    networks: Vec<IpNetwork>,
}

impl AllowList {
    pub fn new(networks: Vec<IpNetwork>) -> Self {
        Self { networks }
    }

    pub fn parse<'a, I>(ranges: I) -> Result<Self, NetworkParseError>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let networks = ranges
            .into_iter()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::parse::<IpNetwork>)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { networks })
    }

    pub fn gateway_default() -> Self {
        Self::parse(DEFAULT_GATEWAY_NETWORKS.iter().copied())
            .unwrap_or_else(|_| Self::new(Vec::new()))
    }

    pub fn allows(&self, ip: IpAddr) -> bool {
        self.networks.iter().any(|net| net.contains(ip))
    }

    pub fn networks(&self) -> &[IpNetwork] {
        &self.networks
    }
}

/// Resolve the caller address.
///
/// Forwarding headers (`X-Real-Ip`, then the first `X-Forwarded-For` hop) are
/// honoured only when the socket peer is one of `trusted_proxies`; any other
/// peer is the caller itself.
pub fn resolve_client_ip(
    headers: &HeaderMap,
    peer: Option<IpAddr>,
    trusted_proxies: &AllowList,
) -> Option<IpAddr> {
    let peer = peer?;
    if !trusted_proxies.allows(peer) {
        return Some(peer);
    }

    let from_header = |name: &str| {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.split(',').next())
            .and_then(|value| value.trim().parse::<IpAddr>().ok())
    };

    from_header("x-real-ip")
        .or_else(|| from_header("x-forwarded-for"))
        .or(Some(peer))
}
