//! Network Addresses
//!
//! A bot announces where it can be reached as a hostname, an IPv4 address or
//! an IPv6 address. The binary form is a single header byte
//! `type | (length << 2)` followed by the raw address bytes.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize, Serializer};

use super::codec::{BinaryDecode, BinaryEncode, Reader};
use crate::constants::MAX_NAME_LENGTH;
use crate::errors::{RegistryError, RegistryResult};

static HOSTNAME_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(([a-zA-Z])|([a-zA-Z][a-zA-Z])|([a-zA-Z][0-9])|([0-9][a-zA-Z])|([a-zA-Z0-9][a-zA-Z0-9-_]{1,61}[a-zA-Z0-9]))\.([a-zA-Z]{2,6}|[a-zA-Z0-9-]{2,30}\.[a-zA-Z]{2,3})$",
    )
    .expect("hostname pattern is valid")
});

/// Wire tag of each address kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum NetworkAddressType {
    Hostname = 0,
    Ipv4 = 1,
    Ipv6 = 2,
}

/// A validated network address.
///
/// Variant order matches the wire tag order, so the derived ordering
/// compares the type first and the raw bytes second.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum NetworkAddress {
    Hostname(String),
    Ipv4(Ipv4Addr),
    Ipv6(Ipv6Addr),
}

impl NetworkAddress {
    /// Parse an IP address or a fully qualified hostname.
    /// IPv4-mapped IPv6 addresses are stored as IPv4.
    pub fn parse(s: &str) -> RegistryResult<Self> {
        if let Ok(ip) = IpAddr::from_str(s) {
            return Ok(Self::from_ip(ip));
        }
        Self::hostname(s)
    }

    pub fn from_ip(ip: IpAddr) -> Self {
        match ip {
            IpAddr::V4(v4) => NetworkAddress::Ipv4(v4),
            IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
                Some(v4) => NetworkAddress::Ipv4(v4),
                None => NetworkAddress::Ipv6(v6),
            },
        }
    }

    fn hostname(s: &str) -> RegistryResult<Self> {
        if s.len() > MAX_NAME_LENGTH {
            return Err(RegistryError::InvalidAddress(format!(
                "hostname of {} bytes exceeds {} bytes",
                s.len(),
                MAX_NAME_LENGTH
            )));
        }
        if !HOSTNAME_REGEX.is_match(s) {
            return Err(RegistryError::InvalidAddress(format!("{:?} is not a valid hostname", s)));
        }
        Ok(NetworkAddress::Hostname(s.to_string()))
    }

    pub fn address_type(&self) -> NetworkAddressType {
        match self {
            NetworkAddress::Hostname(_) => NetworkAddressType::Hostname,
            NetworkAddress::Ipv4(_) => NetworkAddressType::Ipv4,
            NetworkAddress::Ipv6(_) => NetworkAddressType::Ipv6,
        }
    }

    fn raw_bytes(&self) -> Vec<u8> {
        match self {
            NetworkAddress::Hostname(host) => host.as_bytes().to_vec(),
            NetworkAddress::Ipv4(ip) => ip.octets().to_vec(),
            NetworkAddress::Ipv6(ip) => ip.octets().to_vec(),
        }
    }
}

impl FromStr for NetworkAddress {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for NetworkAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetworkAddress::Hostname(host) => f.write_str(host),
            NetworkAddress::Ipv4(ip) => write!(f, "{}", ip),
            NetworkAddress::Ipv6(ip) => write!(f, "{}", ip),
        }
    }
}

impl fmt::Debug for NetworkAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NetworkAddress({})", self)
    }
}

impl BinaryEncode for NetworkAddress {
    fn encode_to(&self, out: &mut Vec<u8>) -> RegistryResult<()> {
        let raw = self.raw_bytes();
        if raw.len() > MAX_NAME_LENGTH {
            return Err(RegistryError::Encoding(format!("address of {} bytes", raw.len())));
        }
        out.push(self.address_type() as u8 | ((raw.len() as u8) << 2));
        out.extend_from_slice(&raw);
        Ok(())
    }
}

impl BinaryDecode for NetworkAddress {
    fn decode_from(reader: &mut Reader<'_>) -> RegistryResult<Self> {
        let header = reader.read_u8()?;
        let len = (header >> 2) as usize;
        let raw = reader.read_bytes(len)?;
        match header & 0b11 {
            0 => {
                let host = std::str::from_utf8(raw)
                    .map_err(|e| RegistryError::Encoding(format!("hostname: {}", e)))?;
                Self::hostname(host)
            }
            1 => {
                let octets: [u8; 4] = raw.try_into().map_err(|_| {
                    RegistryError::Encoding(format!("IPv4 address of {} bytes", len))
                })?;
                Ok(NetworkAddress::Ipv4(Ipv4Addr::from(octets)))
            }
            2 => {
                let octets: [u8; 16] = raw.try_into().map_err(|_| {
                    RegistryError::Encoding(format!("IPv6 address of {} bytes", len))
                })?;
                let ip = Ipv6Addr::from(octets);
                // mapped addresses are always encoded as IPv4
                if let Some(v4) = ip.to_ipv4_mapped() {
                    return Err(RegistryError::Encoding(format!(
                        "IPv4-mapped address {} must be encoded as IPv4",
                        v4
                    )));
                }
                Ok(NetworkAddress::Ipv6(ip))
            }
            tag => Err(RegistryError::Encoding(format!("unknown address type {}", tag))),
        }
    }
}

impl Serialize for NetworkAddress {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for NetworkAddress {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        NetworkAddress::parse(&s).map_err(de::Error::custom)
    }
}
