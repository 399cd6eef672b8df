//! Undo Ledger
//!
//! Some effects of a transaction are not derivable from the transaction
//! itself, so they are remembered per transaction id until it is reverted:
//!
//! - **Implicit record updates**: touching an expired bot drops all of its
//!   names and restarts its expiration from the block time.
//! - **Name takeovers**: claiming a name that still points at an expired bot
//!   overwrites that bot's index entry.

use crate::errors::{RegistryError, RegistryResult};
use crate::types::{BinaryDecode, BinaryEncode, BotId, BotName, CompactTimestamp, Reader, SortedSet};

// =============================================================================
// IMPLICIT RECORD UPDATES
// =============================================================================

/// Prior state of a record that was reactivated after expiring
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ImplicitBotRecordUpdate {
    pub previous_expiration: Option<CompactTimestamp>,
    pub released_names: SortedSet<BotName>,
}

impl ImplicitBotRecordUpdate {
    pub fn new(previous_expiration: CompactTimestamp, released_names: SortedSet<BotName>) -> Self {
        Self {
            previous_expiration: Some(previous_expiration),
            released_names,
        }
    }
}

// Layout: [has_expiration | name_count << 1: 1][expiration: 3]?[names]
impl BinaryEncode for ImplicitBotRecordUpdate {
    fn encode_to(&self, out: &mut Vec<u8>) -> RegistryResult<()> {
        let count = self.released_names.len();
        if count > 0b111 {
            return Err(RegistryError::Encoding(format!(
                "{} released names do not fit the header",
                count
            )));
        }
        out.push(self.previous_expiration.is_some() as u8 | ((count as u8) << 1));
        if let Some(expiration) = self.previous_expiration {
            expiration.encode_to(out)?;
        }
        self.released_names.encode_elements(out)
    }
}

impl BinaryDecode for ImplicitBotRecordUpdate {
    fn decode_from(reader: &mut Reader<'_>) -> RegistryResult<Self> {
        let header = reader.read_u8()?;
        let previous_expiration = if header & 1 == 1 {
            Some(CompactTimestamp::decode_from(reader)?)
        } else {
            None
        };
        let count = ((header >> 1) & 0b111) as usize;
        let released_names = SortedSet::decode_elements(reader, count)?;
        Ok(Self {
            previous_expiration,
            released_names,
        })
    }
}

// =============================================================================
// NAME TAKEOVERS
// =============================================================================

/// Names a transaction claimed from expired bots, with their previous owner
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NameTakeovers {
    entries: Vec<(BotName, BotId)>,
}

impl NameTakeovers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, name: BotName, previous_owner: BotId) {
        self.entries.push((name, previous_owner));
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Previous owner of `name`, if this transaction took it over
    pub fn previous_owner(&self, name: &BotName) -> Option<BotId> {
        self.entries
            .iter()
            .find(|(taken, _)| taken == name)
            .map(|(_, owner)| *owner)
    }
}

// Layout: [count: 1] then per entry [name][bot_id: 4]
impl BinaryEncode for NameTakeovers {
    fn encode_to(&self, out: &mut Vec<u8>) -> RegistryResult<()> {
        let count = u8::try_from(self.entries.len())
            .map_err(|_| RegistryError::Encoding(format!("{} takeovers", self.entries.len())))?;
        out.push(count);
        for (name, owner) in &self.entries {
            name.encode_to(out)?;
            owner.encode_to(out)?;
        }
        Ok(())
    }
}

impl BinaryDecode for NameTakeovers {
    fn decode_from(reader: &mut Reader<'_>) -> RegistryResult<Self> {
        let count = reader.read_u8()?;
        let mut takeovers = Self::new();
        for _ in 0..count {
            let name = BotName::decode_from(reader)?;
            let owner = BotId::decode_from(reader)?;
            takeovers.push(name, owner);
        }
        Ok(takeovers)
    }
}
