//! Bot Record Update
//!
//! Renews a bot and edits its addresses and names. Updating a bot whose
//! expiration has passed reactivates it: its names are released first and
//! its paid period restarts at the block time. That implicit change is kept
//! in the undo ledger so a revert can put the old names and expiration back.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use lib_types::{Amount, Timestamp};

use super::{
    check_flags, claim_names, expect_name_owner, read_optional_set, read_signature,
    release_claimed_names, signature_message, write_optional_set, BotFees, FeeSchedule,
    SignerRole, TransactionContext, TransactionKind, ValidationContext,
};
use crate::errors::{RegistryError, RegistryResult};
use crate::ledger::ImplicitBotRecordUpdate;
use crate::types::codec::write_short_bytes;
use crate::types::{BinaryDecode, BinaryEncode, BotId, BotName, BotRecord, NetworkAddress, Reader, SortedSet};

const FLAG_ADDRESSES_ADD: u8 = 0b0001;
const FLAG_ADDRESSES_REMOVE: u8 = 0b0010;
const FLAG_NAMES_ADD: u8 = 0b0100;
const FLAG_NAMES_REMOVE: u8 = 0b1000;

/// Renew and edit an existing bot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BotRecordUpdate {
    pub id: BotId,
    #[serde(default)]
    pub months: u8,
    #[serde(default, skip_serializing_if = "SortedSet::is_empty")]
    pub addresses_to_add: SortedSet<NetworkAddress>,
    #[serde(default, skip_serializing_if = "SortedSet::is_empty")]
    pub addresses_to_remove: SortedSet<NetworkAddress>,
    #[serde(default, skip_serializing_if = "SortedSet::is_empty")]
    pub names_to_add: SortedSet<BotName>,
    #[serde(default, skip_serializing_if = "SortedSet::is_empty")]
    pub names_to_remove: SortedSet<BotName>,
    pub fees: BotFees,
    #[serde(with = "super::hex_bytes")]
    pub signature: Vec<u8>,
}

impl BotRecordUpdate {
    /// An update without months or set changes
    pub fn is_noop(&self) -> bool {
        self.months == 0
            && self.addresses_to_add.is_empty()
            && self.addresses_to_remove.is_empty()
            && self.names_to_add.is_empty()
            && self.names_to_remove.is_empty()
    }

    pub fn required_bot_fee(&self, schedule: &FeeSchedule) -> Amount {
        let addresses_changed =
            !self.addresses_to_add.is_empty() || !self.addresses_to_remove.is_empty();
        schedule.update_fee(self.months, addresses_changed, self.names_to_add.len())
    }

    pub fn signature_message(&self, role: SignerRole) -> RegistryResult<[u8; 32]> {
        let mut body = Vec::new();
        self.encode_body(&mut body)?;
        Ok(signature_message(TransactionKind::RecordUpdate, role, &body))
    }

    // =========================================================================
    // Record Mutation
    // =========================================================================

    /// Apply this update to `record` as of `block_time`.
    ///
    /// Returns the prior state when the record was expired and got
    /// reactivated, which drops all of its names.
    pub fn apply_to(
        &self,
        record: &mut BotRecord,
        block_time: Timestamp,
    ) -> RegistryResult<Option<ImplicitBotRecordUpdate>> {
        let mut implicit = None;
        if record.is_expired(block_time) {
            if self.months == 0 {
                return Err(RegistryError::Expired {
                    bot_id: record.id,
                    expiration: record.expiration,
                });
            }
            implicit = Some(ImplicitBotRecordUpdate::new(
                record.expiration,
                record.names.clone(),
            ));
            record.reset_names();
        }

        if self.months > 0 {
            record.extend_expiration(block_time, self.months)?;
        }

        record.remove_addresses(&self.addresses_to_remove)?;
        record.add_addresses(&self.addresses_to_add)?;

        record.remove_names(&self.names_to_remove)?;
        record.add_names(&self.names_to_add)?;

        Ok(implicit)
    }

    /// Undo the explicit part of `apply_to`; the implicit part is restored
    /// from the ledger by the caller.
    pub fn revert_on(&self, record: &mut BotRecord) -> RegistryResult<()> {
        if self.months > 0 {
            record.expiration = record.expiration.sub_months(self.months)?;
        }

        record.remove_addresses(&self.addresses_to_add)?;
        record.add_addresses(&self.addresses_to_remove)?;

        record.remove_names(&self.names_to_add)?;
        record.add_names(&self.names_to_remove)?;
        Ok(())
    }

    // =========================================================================
    // Validation
    // =========================================================================

    pub fn validate(&self, ctx: &ValidationContext<'_>) -> RegistryResult<()> {
        self.fees.ensure_miner_fee(ctx.minimum_miner_fee)?;

        let record = ctx.store.require_record(self.id)?;

        let mut body = Vec::new();
        self.encode_body(&mut body)?;
        ctx.verify_signature(
            TransactionKind::RecordUpdate,
            SignerRole::Sender,
            &body,
            &record.public_key,
            &self.signature,
        )?;

        if self.is_noop() {
            return Err(RegistryError::NoOpUpdateRejected);
        }

        for name in &self.names_to_add {
            if !ctx.store.is_name_available(name, ctx.chain_time)? {
                return Err(RegistryError::NameUnavailable(name.to_string()));
            }
        }

        // dry run on a copy
        let mut record = record;
        self.apply_to(&mut record, ctx.block_time)?;

        self.fees.ensure_bot_fee(self.required_bot_fee(ctx.fees))
    }

    // =========================================================================
    // Apply / Revert
    // =========================================================================

    pub fn apply(&self, ctx: &TransactionContext<'_>) -> RegistryResult<()> {
        if self.is_noop() {
            return Err(RegistryError::NoOpUpdateRejected);
        }

        let mut record = ctx.store.require_record(self.id)?;
        let implicit = self.apply_to(&mut record, ctx.block_time)?;

        match &implicit {
            Some(update) => {
                // names of an expired bot may already belong to someone else
                for name in &update.released_names {
                    ctx.store.unmap_name_if_owned_by(name, self.id)?;
                }
                ctx.store.put_implicit_update(&ctx.tx_id, update)?;
                info!(
                    bot_id = %self.id,
                    height = ctx.height,
                    previous_expiration = ?update.previous_expiration,
                    released_names = update.released_names.len(),
                    "expired bot reactivated"
                );
            }
            None => {
                for name in &self.names_to_remove {
                    expect_name_owner(ctx.store, name, self.id)?;
                    ctx.store.unmap_name(name)?;
                }
            }
        }
        claim_names(ctx, self.id, &self.names_to_add)?;

        ctx.store.put_record(&record)?;
        ctx.store
            .append_history(self.id, ctx.height, ctx.sequence, &ctx.tx_id)?;

        debug!(
            bot_id = %self.id,
            height = ctx.height,
            months = self.months,
            expiration = %record.expiration,
            "bot record updated"
        );
        Ok(())
    }

    pub fn revert(&self, ctx: &TransactionContext<'_>) -> RegistryResult<()> {
        let mut record = ctx.store.require_record(self.id)?;
        self.revert_on(&mut record)?;

        release_claimed_names(ctx, self.id, &self.names_to_add)?;
        for name in &self.names_to_remove {
            ctx.store.map_name(name, self.id)?;
        }

        if record.is_expired(ctx.block_time) {
            if let Some(update) = ctx.store.get_implicit_update(&ctx.tx_id)? {
                if let Some(expiration) = update.previous_expiration {
                    record.expiration = expiration;
                }
                record.add_names(&update.released_names)?;
                for name in &update.released_names {
                    ctx.store.map_name_if_unclaimed(name, self.id)?;
                }
                ctx.store.delete_implicit_update(&ctx.tx_id)?;
                debug!(
                    bot_id = %self.id,
                    restored_names = update.released_names.len(),
                    "implicit bot reactivation reverted"
                );
            }
        }

        ctx.store.put_record(&record)?;
        ctx.store
            .remove_history(self.id, ctx.height, ctx.sequence, &ctx.tx_id)?;

        debug!(bot_id = %self.id, height = ctx.height, "bot record update reverted");
        Ok(())
    }

    // =========================================================================
    // Encoding
    // =========================================================================
    // Body: [bot_id: 4][months: 1][flags: 1][addresses_to_add]?
    //       [addresses_to_remove]?[names_to_add]?[names_to_remove]?[fees: 32]
    // Signatures: [signature]
    // =========================================================================

    fn flags(&self) -> u8 {
        let mut flags = 0;
        if !self.addresses_to_add.is_empty() {
            flags |= FLAG_ADDRESSES_ADD;
        }
        if !self.addresses_to_remove.is_empty() {
            flags |= FLAG_ADDRESSES_REMOVE;
        }
        if !self.names_to_add.is_empty() {
            flags |= FLAG_NAMES_ADD;
        }
        if !self.names_to_remove.is_empty() {
            flags |= FLAG_NAMES_REMOVE;
        }
        flags
    }

    pub(crate) fn encode_body(&self, out: &mut Vec<u8>) -> RegistryResult<()> {
        self.id.encode_to(out)?;
        out.push(self.months);
        out.push(self.flags());
        write_optional_set(out, &self.addresses_to_add)?;
        write_optional_set(out, &self.addresses_to_remove)?;
        write_optional_set(out, &self.names_to_add)?;
        write_optional_set(out, &self.names_to_remove)?;
        self.fees.encode_to(out)
    }

    pub(crate) fn encode_signatures(&self, out: &mut Vec<u8>) -> RegistryResult<()> {
        write_short_bytes(out, &self.signature)
    }

    pub(crate) fn decode(reader: &mut Reader<'_>) -> RegistryResult<Self> {
        let id = BotId::decode_from(reader)?;
        let months = reader.read_u8()?;
        let flags = reader.read_u8()?;
        check_flags(
            flags,
            FLAG_ADDRESSES_ADD | FLAG_ADDRESSES_REMOVE | FLAG_NAMES_ADD | FLAG_NAMES_REMOVE,
        )?;
        Ok(Self {
            id,
            months,
            addresses_to_add: read_optional_set(reader, flags & FLAG_ADDRESSES_ADD != 0)?,
            addresses_to_remove: read_optional_set(reader, flags & FLAG_ADDRESSES_REMOVE != 0)?,
            names_to_add: read_optional_set(reader, flags & FLAG_NAMES_ADD != 0)?,
            names_to_remove: read_optional_set(reader, flags & FLAG_NAMES_REMOVE != 0)?,
            fees: BotFees::decode_from(reader)?,
            signature: read_signature(reader)?,
        })
    }
}
