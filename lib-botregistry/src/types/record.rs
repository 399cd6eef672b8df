//! Bot Records
//!
//! A record is the registry's view of one bot: who owns it, until when it is
//! paid for, and which addresses and names it currently holds.

use serde::{Deserialize, Serialize};
use lib_types::{PublicKey, Timestamp};

use super::codec::{BinaryDecode, BinaryEncode, Reader};
use super::{BotId, BotName, CompactTimestamp, NetworkAddress, SetError, SortedSet};
use crate::constants::{
    MAX_ADDRESSES_PER_BOT, MAX_NAMES_PER_BOT, MAX_PREPAID_MONTHS, MAX_PREPAID_SECONDS,
};
use crate::errors::{RegistryError, RegistryResult};

/// Persisted state of a single bot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BotRecord {
    pub id: BotId,
    #[serde(default, skip_serializing_if = "SortedSet::is_empty")]
    pub addresses: SortedSet<NetworkAddress>,
    #[serde(default, skip_serializing_if = "SortedSet::is_empty")]
    pub names: SortedSet<BotName>,
    #[serde(rename = "publickey")]
    pub public_key: PublicKey,
    pub expiration: CompactTimestamp,
}

impl BotRecord {
    /// A record without any months paid, expiring at the nullpoint
    pub fn new(id: BotId, public_key: PublicKey) -> Self {
        Self {
            id,
            addresses: SortedSet::new(),
            names: SortedSet::new(),
            public_key,
            expiration: CompactTimestamp::MIN,
        }
    }

    /// A record is active strictly before its expiration
    pub fn is_expired(&self, at: Timestamp) -> bool {
        self.expiration.as_unix() <= at
    }

    // =========================================================================
    // Names
    // =========================================================================

    pub fn add_names<'a>(&mut self, names: impl IntoIterator<Item = &'a BotName>) -> RegistryResult<()> {
        let names: Vec<&BotName> = names.into_iter().collect();
        let count = self.names.len() + names.len();
        if count > MAX_NAMES_PER_BOT {
            return Err(RegistryError::CapacityExceeded {
                kind: "names",
                count,
                limit: MAX_NAMES_PER_BOT,
            });
        }
        for name in names {
            self.names
                .insert(name.clone())
                .map_err(|e| set_error("name", e, name))?;
        }
        Ok(())
    }

    pub fn remove_names<'a>(&mut self, names: impl IntoIterator<Item = &'a BotName>) -> RegistryResult<()> {
        for name in names {
            self.names.remove(name).map_err(|e| set_error("name", e, name))?;
        }
        Ok(())
    }

    /// Drop every name, as happens when an expired bot is touched again
    pub fn reset_names(&mut self) {
        self.names.clear();
    }

    // =========================================================================
    // Addresses
    // =========================================================================

    pub fn add_addresses<'a>(
        &mut self,
        addresses: impl IntoIterator<Item = &'a NetworkAddress>,
    ) -> RegistryResult<()> {
        let addresses: Vec<&NetworkAddress> = addresses.into_iter().collect();
        let count = self.addresses.len() + addresses.len();
        if count > MAX_ADDRESSES_PER_BOT {
            return Err(RegistryError::CapacityExceeded {
                kind: "addresses",
                count,
                limit: MAX_ADDRESSES_PER_BOT,
            });
        }
        for addr in addresses {
            self.addresses
                .insert(addr.clone())
                .map_err(|e| set_error("address", e, addr))?;
        }
        Ok(())
    }

    pub fn remove_addresses<'a>(
        &mut self,
        addresses: impl IntoIterator<Item = &'a NetworkAddress>,
    ) -> RegistryResult<()> {
        for addr in addresses {
            self.addresses
                .remove(addr)
                .map_err(|e| set_error("address", e, addr))?;
        }
        Ok(())
    }

    // =========================================================================
    // Expiration
    // =========================================================================

    /// Extend the paid period by `months`.
    ///
    /// An expired record restarts from the block time. The result may not
    /// reach further than the maximum prepaid period past the block time,
    /// nor past the last encodable timestamp.
    pub fn extend_expiration(&mut self, block_time: Timestamp, months: u8) -> RegistryResult<()> {
        if months == 0 || months > MAX_PREPAID_MONTHS {
            return Err(RegistryError::InvalidMonths(months));
        }
        let base = CompactTimestamp::from_unix(block_time);
        let start = if self.is_expired(block_time) {
            base
        } else {
            self.expiration
        };
        let extended = start
            .add_months(months)
            .filter(|ts| ts.is_representable())
            .ok_or(RegistryError::ExpirationOverflow)?;
        if extended.as_unix() - base.as_unix() > MAX_PREPAID_SECONDS {
            return Err(RegistryError::ExpirationOverflow);
        }
        self.expiration = extended;
        Ok(())
    }
}

fn set_error(kind: &'static str, err: SetError, value: &impl std::fmt::Display) -> RegistryError {
    match err {
        SetError::Duplicate => RegistryError::DuplicateEntry {
            kind,
            value: value.to_string(),
        },
        SetError::Missing => RegistryError::MissingEntry {
            kind,
            value: value.to_string(),
        },
    }
}

// =============================================================================
// ENCODING
// =============================================================================
// Layout: [id: 4][addr_count | name_count << 4: 1][addresses][names]
//         [public_key: 32][expiration: 3]
// =============================================================================

impl BinaryEncode for BotRecord {
    fn encode_to(&self, out: &mut Vec<u8>) -> RegistryResult<()> {
        if self.addresses.len() > 15 || self.names.len() > 15 {
            return Err(RegistryError::Encoding(format!(
                "record {} holds {} addresses and {} names",
                self.id,
                self.addresses.len(),
                self.names.len()
            )));
        }
        self.id.encode_to(out)?;
        out.push(self.addresses.len() as u8 | ((self.names.len() as u8) << 4));
        self.addresses.encode_elements(out)?;
        self.names.encode_elements(out)?;
        out.extend_from_slice(self.public_key.as_bytes());
        self.expiration.encode_to(out)
    }
}

impl BinaryDecode for BotRecord {
    fn decode_from(reader: &mut Reader<'_>) -> RegistryResult<Self> {
        let id = BotId::decode_from(reader)?;
        let counts = reader.read_u8()?;
        let addresses = SortedSet::decode_elements(reader, (counts & 0x0f) as usize)?;
        let names = SortedSet::decode_elements(reader, (counts >> 4) as usize)?;
        let public_key = PublicKey::new(reader.read_array()?);
        let expiration = CompactTimestamp::decode_from(reader)?;
        Ok(Self {
            id,
            addresses,
            names,
            public_key,
            expiration,
        })
    }
}
