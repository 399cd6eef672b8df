//! Bot Name Transfer
//!
//! Moves names from a sender bot to a receiver bot. Both bots sign and both
//! must be active: a transfer pays no months, so it can never reactivate an
//! expired bot.

use serde::{Deserialize, Serialize};
use tracing::debug;
use lib_types::{Amount, Timestamp};

use super::{
    expect_name_owner, read_signature, signature_message, BotFees, FeeSchedule, SignerRole,
    TransactionContext, TransactionKind, ValidationContext,
};
use crate::errors::{RegistryError, RegistryResult};
use crate::types::codec::write_short_bytes;
use crate::types::{BinaryDecode, BinaryEncode, BotId, BotName, BotRecord, Reader, SortedSet};

/// Transfer names between two bots
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BotNameTransfer {
    pub sender: BotId,
    pub receiver: BotId,
    pub names: SortedSet<BotName>,
    pub fees: BotFees,
    #[serde(with = "super::hex_bytes")]
    pub sender_signature: Vec<u8>,
    #[serde(with = "super::hex_bytes")]
    pub receiver_signature: Vec<u8>,
}

impl BotNameTransfer {
    pub fn required_bot_fee(&self, schedule: &FeeSchedule) -> Amount {
        schedule.transfer_fee(self.names.len())
    }

    pub fn signature_message(&self, role: SignerRole) -> RegistryResult<[u8; 32]> {
        let mut body = Vec::new();
        self.encode_body(&mut body)?;
        Ok(signature_message(TransactionKind::NameTransfer, role, &body))
    }

    // =========================================================================
    // Record Mutation
    // =========================================================================

    /// Fails without touching `record` unless it is active and owns every name
    pub fn update_sender(&self, record: &mut BotRecord, block_time: Timestamp) -> RegistryResult<()> {
        ensure_active(record, block_time)?;
        if let Some(name) = self.names.difference(&record.names).first() {
            return Err(RegistryError::MissingEntry {
                kind: "name",
                value: name.to_string(),
            });
        }
        record.remove_names(&self.names)
    }

    /// Fails without touching `record` unless it is active and owns none of the names
    pub fn update_receiver(&self, record: &mut BotRecord, block_time: Timestamp) -> RegistryResult<()> {
        ensure_active(record, block_time)?;
        if let Some(name) = self.names.intersection(&record.names).first() {
            return Err(RegistryError::DuplicateEntry {
                kind: "name",
                value: name.to_string(),
            });
        }
        record.add_names(&self.names)
    }

    pub fn revert_sender(&self, record: &mut BotRecord) -> RegistryResult<()> {
        record.add_names(&self.names)
    }

    pub fn revert_receiver(&self, record: &mut BotRecord) -> RegistryResult<()> {
        record.remove_names(&self.names)
    }

    // =========================================================================
    // Validation
    // =========================================================================

    pub fn validate(&self, ctx: &ValidationContext<'_>) -> RegistryResult<()> {
        self.fees.ensure_miner_fee(ctx.minimum_miner_fee)?;

        if self.sender == self.receiver {
            return Err(RegistryError::SelfTransfer(self.sender));
        }

        let mut sender = ctx.store.require_record(self.sender)?;
        let mut receiver = ctx.store.require_record(self.receiver)?;

        let mut body = Vec::new();
        self.encode_body(&mut body)?;
        ctx.verify_signature(
            TransactionKind::NameTransfer,
            SignerRole::Sender,
            &body,
            &sender.public_key,
            &self.sender_signature,
        )?;
        ctx.verify_signature(
            TransactionKind::NameTransfer,
            SignerRole::Receiver,
            &body,
            &receiver.public_key,
            &self.receiver_signature,
        )?;

        if self.names.is_empty() {
            return Err(RegistryError::EmptyTransfer);
        }

        // the sender owns every name, so no availability check is needed
        self.update_sender(&mut sender, ctx.block_time)?;
        self.update_receiver(&mut receiver, ctx.block_time)?;

        self.fees.ensure_bot_fee(self.required_bot_fee(ctx.fees))
    }

    // =========================================================================
    // Apply / Revert
    // =========================================================================

    pub fn apply(&self, ctx: &TransactionContext<'_>) -> RegistryResult<()> {
        if self.sender == self.receiver {
            return Err(RegistryError::SelfTransfer(self.sender));
        }
        if self.names.is_empty() {
            return Err(RegistryError::EmptyTransfer);
        }

        let mut sender = ctx.store.require_record(self.sender)?;
        let mut receiver = ctx.store.require_record(self.receiver)?;
        self.update_sender(&mut sender, ctx.block_time)?;
        self.update_receiver(&mut receiver, ctx.block_time)?;

        ctx.store.put_record(&sender)?;
        ctx.store.put_record(&receiver)?;
        for name in &self.names {
            expect_name_owner(ctx.store, name, self.sender)?;
            ctx.store.map_name(name, self.receiver)?;
        }
        ctx.store
            .append_history(self.sender, ctx.height, ctx.sequence, &ctx.tx_id)?;
        ctx.store
            .append_history(self.receiver, ctx.height, ctx.sequence, &ctx.tx_id)?;

        debug!(
            sender = %self.sender,
            receiver = %self.receiver,
            names = self.names.len(),
            height = ctx.height,
            "bot names transferred"
        );
        Ok(())
    }

    pub fn revert(&self, ctx: &TransactionContext<'_>) -> RegistryResult<()> {
        let mut sender = ctx.store.require_record(self.sender)?;
        let mut receiver = ctx.store.require_record(self.receiver)?;
        self.revert_receiver(&mut receiver)?;
        self.revert_sender(&mut sender)?;

        ctx.store.put_record(&receiver)?;
        ctx.store.put_record(&sender)?;
        for name in &self.names {
            expect_name_owner(ctx.store, name, self.receiver)?;
            ctx.store.map_name(name, self.sender)?;
        }
        ctx.store
            .remove_history(self.receiver, ctx.height, ctx.sequence, &ctx.tx_id)?;
        ctx.store
            .remove_history(self.sender, ctx.height, ctx.sequence, &ctx.tx_id)?;

        debug!(
            sender = %self.sender,
            receiver = %self.receiver,
            height = ctx.height,
            "bot name transfer reverted"
        );
        Ok(())
    }

    // =========================================================================
    // Encoding
    // =========================================================================
    // Body: [sender: 4][receiver: 4][names][fees: 32]
    // Signatures: [sender_signature][receiver_signature]
    // =========================================================================

    pub(crate) fn encode_body(&self, out: &mut Vec<u8>) -> RegistryResult<()> {
        self.sender.encode_to(out)?;
        self.receiver.encode_to(out)?;
        self.names.encode_to(out)?;
        self.fees.encode_to(out)
    }

    pub(crate) fn encode_signatures(&self, out: &mut Vec<u8>) -> RegistryResult<()> {
        write_short_bytes(out, &self.sender_signature)?;
        write_short_bytes(out, &self.receiver_signature)
    }

    pub(crate) fn decode(reader: &mut Reader<'_>) -> RegistryResult<Self> {
        Ok(Self {
            sender: BotId::decode_from(reader)?,
            receiver: BotId::decode_from(reader)?,
            names: SortedSet::decode_from(reader)?,
            fees: BotFees::decode_from(reader)?,
            sender_signature: read_signature(reader)?,
            receiver_signature: read_signature(reader)?,
        })
    }
}

fn ensure_active(record: &BotRecord, block_time: Timestamp) -> RegistryResult<()> {
    if record.is_expired(block_time) {
        return Err(RegistryError::Expired {
            bot_id: record.id,
            expiration: record.expiration,
        });
    }
    Ok(())
}
