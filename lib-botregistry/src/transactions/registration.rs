//! Bot Registration
//!
//! Creates a record for a public key that is not registered yet. The new bot
//! gets the next id of the sequence, so only the most recent registration
//! can be reverted.

use serde::{Deserialize, Serialize};
use tracing::debug;
use lib_types::{Amount, PublicKey, Timestamp};

use super::{
    check_flags, claim_names, read_optional_set, read_signature, release_claimed_names,
    signature_message, write_optional_set, BotFees, FeeSchedule, SignerRole, TransactionContext,
    TransactionKind, ValidationContext,
};
use crate::constants::MIN_BOT_ID;
use crate::errors::{RegistryError, RegistryResult};
use crate::types::codec::write_short_bytes;
use crate::types::{BinaryEncode, BotId, BotName, BotRecord, NetworkAddress, Reader, SortedSet};

const FLAG_ADDRESSES: u8 = 0b01;
const FLAG_NAMES: u8 = 0b10;

/// Register a new bot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BotRegistration {
    #[serde(default, skip_serializing_if = "SortedSet::is_empty")]
    pub addresses: SortedSet<NetworkAddress>,
    #[serde(default, skip_serializing_if = "SortedSet::is_empty")]
    pub names: SortedSet<BotName>,
    pub months: u8,
    pub fees: BotFees,
    #[serde(rename = "publickey")]
    pub public_key: PublicKey,
    #[serde(with = "super::hex_bytes")]
    pub signature: Vec<u8>,
}

impl BotRegistration {
    pub fn required_bot_fee(&self, schedule: &FeeSchedule) -> Amount {
        schedule.registration_fee(self.months, self.names.len())
    }

    pub fn signature_message(&self, role: SignerRole) -> RegistryResult<[u8; 32]> {
        let mut body = Vec::new();
        self.encode_body(&mut body)?;
        Ok(signature_message(TransactionKind::Registration, role, &body))
    }

    /// The record this registration creates under `id`
    pub fn build_record(&self, id: BotId, block_time: Timestamp) -> RegistryResult<BotRecord> {
        if self.addresses.is_empty() && self.names.is_empty() {
            return Err(RegistryError::EmptyRecord);
        }
        let mut record = BotRecord::new(id, self.public_key);
        record.add_addresses(&self.addresses)?;
        record.add_names(&self.names)?;
        record.extend_expiration(block_time, self.months)?;
        Ok(record)
    }

    // =========================================================================
    // Validation
    // =========================================================================

    pub fn validate(&self, ctx: &ValidationContext<'_>) -> RegistryResult<()> {
        self.fees.ensure_miner_fee(ctx.minimum_miner_fee)?;

        if ctx.store.get_bot_id_for_key(&self.public_key)?.is_some() {
            return Err(RegistryError::AlreadyRegistered(self.public_key));
        }

        let mut body = Vec::new();
        self.encode_body(&mut body)?;
        ctx.verify_signature(
            TransactionKind::Registration,
            SignerRole::Sender,
            &body,
            &self.public_key,
            &self.signature,
        )?;

        // months, capacity and emptiness
        self.build_record(BotId::new(MIN_BOT_ID), ctx.block_time)?;

        for name in &self.names {
            if !ctx.store.is_name_available(name, ctx.chain_time)? {
                return Err(RegistryError::NameUnavailable(name.to_string()));
            }
        }

        self.fees.ensure_bot_fee(self.required_bot_fee(ctx.fees))
    }

    // =========================================================================
    // Apply / Revert
    // =========================================================================

    pub fn apply(&self, ctx: &TransactionContext<'_>) -> RegistryResult<()> {
        if ctx.store.get_bot_id_for_key(&self.public_key)?.is_some() {
            return Err(RegistryError::AlreadyRegistered(self.public_key));
        }

        let id = ctx.store.next_bot_id()?;
        let record = self.build_record(id, ctx.block_time)?;

        ctx.store.put_record(&record)?;
        ctx.store.map_key(&self.public_key, id)?;
        claim_names(ctx, id, &self.names)?;
        ctx.store.append_history(id, ctx.height, ctx.sequence, &ctx.tx_id)?;

        debug!(
            bot_id = %id,
            height = ctx.height,
            names = self.names.len(),
            addresses = self.addresses.len(),
            expiration = %record.expiration,
            "bot registered"
        );
        Ok(())
    }

    pub fn revert(&self, ctx: &TransactionContext<'_>) -> RegistryResult<()> {
        let id = ctx.store.get_bot_id_for_key(&self.public_key)?.ok_or_else(|| {
            RegistryError::corruption(format!(
                "public key {} of reverted registration is not indexed",
                self.public_key
            ))
        })?;
        let record = ctx.store.require_record(id)?;
        if record.names != self.names || record.addresses != self.addresses {
            return Err(RegistryError::corruption(format!(
                "bot {} changed after registration {} without that change being reverted",
                id, ctx.tx_id
            )));
        }

        release_claimed_names(ctx, id, &self.names)?;
        ctx.store.unmap_key(&self.public_key)?;
        ctx.store.delete_record(id)?;
        ctx.store.remove_history(id, ctx.height, ctx.sequence, &ctx.tx_id)?;
        ctx.store.release_bot_id(id)?;

        debug!(bot_id = %id, height = ctx.height, "bot registration reverted");
        Ok(())
    }

    // =========================================================================
    // Encoding
    // =========================================================================
    // Body: [months: 1][flags: 1][addresses]?[names]?[fees: 32][public_key: 32]
    // Signatures: [signature]
    // =========================================================================

    pub(crate) fn encode_body(&self, out: &mut Vec<u8>) -> RegistryResult<()> {
        let mut flags = 0;
        if !self.addresses.is_empty() {
            flags |= FLAG_ADDRESSES;
        }
        if !self.names.is_empty() {
            flags |= FLAG_NAMES;
        }
        out.push(self.months);
        out.push(flags);
        write_optional_set(out, &self.addresses)?;
        write_optional_set(out, &self.names)?;
        self.fees.encode_to(out)?;
        out.extend_from_slice(self.public_key.as_bytes());
        Ok(())
    }

    pub(crate) fn encode_signatures(&self, out: &mut Vec<u8>) -> RegistryResult<()> {
        write_short_bytes(out, &self.signature)
    }

    pub(crate) fn decode(reader: &mut Reader<'_>) -> RegistryResult<Self> {
        let months = reader.read_u8()?;
        let flags = reader.read_u8()?;
        check_flags(flags, FLAG_ADDRESSES | FLAG_NAMES)?;
        let addresses = read_optional_set(reader, flags & FLAG_ADDRESSES != 0)?;
        let names = read_optional_set(reader, flags & FLAG_NAMES != 0)?;
        let fees = BotFees::decode_from(reader)?;
        let public_key = PublicKey::new(reader.read_array()?);
        let signature = read_signature(reader)?;
        Ok(Self {
            addresses,
            names,
            months,
            fees,
            public_key,
            signature,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::RegistryStore;
    use crate::transactions::test_support::{addresses, keypair, names, sign};
    use crate::transactions::BotTransaction;
    use crate::types::BinaryDecode;
    use crate::verifier::Ed25519Verifier;
    use lib_types::TxHash;

    const BLOCK_TIME: u64 = 1_700_000_040;

    fn signed_registration(seed: u8, name_list: &[&str], months: u8) -> BotRegistration {
        let (signing, public_key) = keypair(seed);
        let mut tx = BotRegistration {
            addresses: addresses(&["example.org"]),
            names: names(name_list),
            months,
            fees: BotFees::new(1, 1_000),
            public_key,
            signature: Vec::new(),
        };
        let message = tx.signature_message(SignerRole::Sender).unwrap();
        tx.signature = sign(&signing, &message);
        tx
    }

    fn validate(store: &RegistryStore, tx: &BotRegistration) -> RegistryResult<()> {
        let fees = FeeSchedule::new(1);
        let ctx = ValidationContext {
            store,
            verifier: &Ed25519Verifier,
            fees: &fees,
            block_time: BLOCK_TIME,
            chain_time: BLOCK_TIME,
            minimum_miner_fee: 1,
        };
        tx.validate(&ctx)
    }

    fn apply(store: &RegistryStore, tx: &BotRegistration, seq: u16) -> RegistryResult<()> {
        let ctx = TransactionContext {
            store,
            height: 0,
            block_time: BLOCK_TIME,
            sequence: seq,
            tx_id: TxHash::new([seq as u8 + 1; 32]),
        };
        tx.apply(&ctx)
    }

    #[test]
    fn test_valid_registration() {
        let store = RegistryStore::in_memory();
        let tx = signed_registration(1, &["alice.example"], 1);
        assert!(validate(&store, &tx).is_ok());
    }

    #[test]
    fn test_tampered_registration_rejected() {
        let store = RegistryStore::in_memory();
        let mut tx = signed_registration(1, &["alice.example"], 1);
        tx.months = 2;
        assert!(matches!(validate(&store, &tx), Err(RegistryError::InvalidSignature(_))));
    }

    #[test]
    fn test_registration_limits() {
        let store = RegistryStore::in_memory();
        assert!(matches!(
            validate(&store, &signed_registration(1, &["alice.example"], 0)),
            Err(RegistryError::InvalidMonths(0))
        ));
        assert!(matches!(
            validate(&store, &signed_registration(1, &["alice.example"], 25)),
            Err(RegistryError::InvalidMonths(25))
        ));

        let mut empty = signed_registration(1, &[], 1);
        empty.addresses = SortedSet::new();
        let message = empty.signature_message(SignerRole::Sender).unwrap();
        empty.signature = sign(&keypair(1).0, &message);
        assert!(matches!(validate(&store, &empty), Err(RegistryError::EmptyRecord)));

        let mut cheap = signed_registration(1, &["alice.example", "bobby.example"], 1);
        cheap.fees = BotFees::new(1, 149);
        let message = cheap.signature_message(SignerRole::Sender).unwrap();
        cheap.signature = sign(&keypair(1).0, &message);
        assert!(matches!(
            validate(&store, &cheap),
            Err(RegistryError::InsufficientFee { kind: "bot", required: 150, .. })
        ));
    }

    #[test]
    fn test_duplicate_key_and_taken_name() {
        let store = RegistryStore::in_memory();
        store.begin_block().unwrap();
        apply(&store, &signed_registration(1, &["alice.example"], 1), 0).unwrap();
        store.commit_block().unwrap();

        assert!(matches!(
            validate(&store, &signed_registration(1, &["other.example"], 1)),
            Err(RegistryError::AlreadyRegistered(_))
        ));
        assert!(matches!(
            validate(&store, &signed_registration(2, &["alice.example"], 1)),
            Err(RegistryError::NameUnavailable(_))
        ));
    }

    #[test]
    fn test_apply_then_revert_releases_id() {
        let store = RegistryStore::in_memory();
        let tx = signed_registration(1, &["alice.example"], 1);

        store.begin_block().unwrap();
        apply(&store, &tx, 0).unwrap();
        let id = store.get_bot_id_for_key(&tx.public_key).unwrap().unwrap();
        assert_eq!(id, BotId::new(1));
        assert_eq!(store.get_bot_id_for_name(&BotName::new("alice.example").unwrap()).unwrap(), Some(id));

        let ctx = TransactionContext {
            store: &store,
            height: 0,
            block_time: BLOCK_TIME,
            sequence: 0,
            tx_id: TxHash::new([1; 32]),
        };
        tx.revert(&ctx).unwrap();
        store.commit_block().unwrap();

        assert_eq!(store.get_record(id).unwrap(), None);
        assert_eq!(store.get_bot_id_for_key(&tx.public_key).unwrap(), None);
        assert_eq!(store.last_bot_id().unwrap(), None);
    }

    #[test]
    fn test_encoding_round_trip_and_strictness() {
        let tx: BotTransaction = signed_registration(3, &["alice.example"], 12).into();
        let bytes = tx.to_bytes().unwrap();
        assert_eq!(bytes[0], 0x90);
        assert_eq!(bytes[1], 12);
        assert_eq!(bytes[2], FLAG_ADDRESSES | FLAG_NAMES);
        assert_eq!(BotTransaction::from_bytes(&bytes).unwrap(), tx);

        let mut trailing = bytes.clone();
        trailing.push(0);
        assert!(BotTransaction::from_bytes(&trailing).is_err());

        let mut unknown_flag = bytes;
        unknown_flag[2] |= 0b100;
        assert!(BotTransaction::from_bytes(&unknown_flag).is_err());
    }

    #[test]
    fn test_json_form() {
        let tx = signed_registration(3, &["alice.example"], 1);
        let json = serde_json::to_value(BotTransaction::from(tx.clone())).unwrap();
        assert_eq!(json["type"], "registration");
        assert_eq!(json["names"][0], "alice.example");
        assert_eq!(json["signature"], hex::encode(&tx.signature));
        assert_eq!(json["months"], 1);
    }
}
