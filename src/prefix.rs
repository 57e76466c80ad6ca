//! IP addresses with a prefix length, as assigned to interfaces.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::str::FromStr;
use thiserror::Error;

/// Errors raised when parsing an [`IpPrefix`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PrefixError {
    #[error("prefix `{0}` is missing a `/length` suffix")]
    MissingLength(String),
    #[error("invalid address in prefix `{0}`")]
    Address(String),
    #[error("prefix length {len} is out of range for {addr}")]
    Length { addr: IpAddr, len: u8 },
}

/// An interface address such as `10.0.0.1/24`.
///
/// The host bits are kept; [`IpPrefix::network`] masks them off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct IpPrefix {
    addr: IpAddr,
    len: u8,
}

impl IpPrefix {
    /// Build a prefix, rejecting lengths beyond the address width.
    ///
    /// # Errors
    ///
    /// Returns [`PrefixError::Length`] when `len` exceeds 32 for IPv4 or 128
    /// for IPv6.
    pub fn new(addr: IpAddr, len: u8) -> Result<Self, PrefixError> {
        let max = if addr.is_ipv4() { 32 } else { 128 };
        if len > max {
            return Err(PrefixError::Length { addr, len });
        }
        Ok(Self { addr, len })
    }

    #[must_use]
    pub fn addr(&self) -> IpAddr {
        self.addr
    }

    #[must_use]
    pub fn prefix_len(&self) -> u8 {
        self.len
    }

    #[must_use]
    pub fn is_ipv4(&self) -> bool {
        self.addr.is_ipv4()
    }

    /// The network this address belongs to, host bits cleared.
    #[must_use]
    pub fn network(&self) -> Self {
        let addr = match self.addr {
            IpAddr::V4(v4) => {
                let mask = u32::MAX.checked_shl(32 - u32::from(self.len)).unwrap_or(0);
                IpAddr::V4(Ipv4Addr::from(u32::from(v4) & mask))
            }
            IpAddr::V6(v6) => {
                let mask = u128::MAX.checked_shl(128 - u32::from(self.len)).unwrap_or(0);
                IpAddr::V6(Ipv6Addr::from(u128::from(v6) & mask))
            }
        };
        Self {
            addr,
            len: self.len,
        }
    }
}

impl fmt::Display for IpPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.addr, self.len)
    }
}

impl FromStr for IpPrefix {
    type Err = PrefixError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (addr, len) = s
            .split_once('/')
            .ok_or_else(|| PrefixError::MissingLength(s.to_owned()))?;
        let addr: IpAddr = addr
            .parse()
            .map_err(|_| PrefixError::Address(s.to_owned()))?;
        let len: u8 = len.parse().map_err(|_| PrefixError::Address(s.to_owned()))?;
        Self::new(addr, len)
    }
}

impl TryFrom<String> for IpPrefix {
    type Error = PrefixError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<IpPrefix> for String {
    fn from(value: IpPrefix) -> Self {
        value.to_string()
    }
}
