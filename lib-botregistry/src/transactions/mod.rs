//! Registry Transactions
//!
//! Three transaction kinds act on the registry:
//!
//! - [`BotRegistration`] creates a bot record for a new public key
//! - [`BotRecordUpdate`] renews a bot and changes its addresses and names
//! - [`BotNameTransfer`] moves names from one active bot to another
//!
//! Each kind validates against a read-only view of the registry, applies its
//! effects inside the current block and can undo them exactly.
//!
//! # Wire Format
//!
//! `[kind: 1][body][signatures]`, where each signature is a short byte
//! string. The signing message for a signer is
//! `blake3("botregistry/v1" || kind || role || body)`.

pub mod fees;
pub mod registration;
pub mod transfer;
pub mod update;

pub use fees::{BotFees, FeeSchedule};
pub use registration::BotRegistration;
pub use transfer::BotNameTransfer;
pub use update::BotRecordUpdate;

use serde::{Deserialize, Serialize};
use tracing::{debug, error};
use lib_types::{Amount, BlockHeight, PublicKey, Timestamp, TxHash};

use crate::errors::{RegistryError, RegistryResult};
use crate::ledger::NameTakeovers;
use crate::storage::RegistryStore;
use crate::types::{BinaryDecode, BinaryEncode, BotId, BotName, Reader, SortedSet};
use crate::verifier::SignatureVerifier;

/// Domain separation tag of every signing message
pub const SIGNATURE_DOMAIN: &[u8] = b"botregistry/v1";

// =============================================================================
// KINDS AND ROLES
// =============================================================================

/// Leading byte of an encoded transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TransactionKind {
    Registration = 0x90,
    RecordUpdate = 0x91,
    NameTransfer = 0x92,
}

impl TransactionKind {
    pub fn as_byte(self) -> u8 {
        self as u8
    }

    pub fn from_byte(byte: u8) -> RegistryResult<Self> {
        match byte {
            0x90 => Ok(TransactionKind::Registration),
            0x91 => Ok(TransactionKind::RecordUpdate),
            0x92 => Ok(TransactionKind::NameTransfer),
            other => Err(RegistryError::Encoding(format!(
                "unknown transaction kind 0x{:02x}",
                other
            ))),
        }
    }
}

/// Which party a signature belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SignerRole {
    Sender = 0,
    Receiver = 1,
}

/// Message a signer of `kind` in `role` signs over the signature-less body
pub fn signature_message(kind: TransactionKind, role: SignerRole, body: &[u8]) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new();
    hasher.update(SIGNATURE_DOMAIN);
    hasher.update(&[kind.as_byte(), role as u8]);
    hasher.update(body);
    *hasher.finalize().as_bytes()
}

// =============================================================================
// CONTEXTS
// =============================================================================

/// Position of a transaction being applied or reverted
#[derive(Debug, Clone, Copy)]
pub struct TransactionContext<'a> {
    pub store: &'a RegistryStore,
    pub height: BlockHeight,
    pub block_time: Timestamp,
    /// Index of the transaction within its block
    pub sequence: u16,
    pub tx_id: TxHash,
}

/// Read-only view used to check a transaction before it enters a block
pub struct ValidationContext<'a> {
    pub store: &'a RegistryStore,
    pub verifier: &'a dyn SignatureVerifier,
    pub fees: &'a FeeSchedule,
    /// Time of the block the transaction is meant for
    pub block_time: Timestamp,
    /// Time of the latest applied block, used for name availability
    pub chain_time: Timestamp,
    pub minimum_miner_fee: Amount,
}

impl ValidationContext<'_> {
    pub(crate) fn verify_signature(
        &self,
        kind: TransactionKind,
        role: SignerRole,
        body: &[u8],
        public_key: &PublicKey,
        signature: &[u8],
    ) -> RegistryResult<()> {
        let message = signature_message(kind, role, body);
        self.verifier.verify(public_key, &message, signature)
    }
}

// =============================================================================
// TRANSACTION
// =============================================================================

/// Any registry transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BotTransaction {
    Registration(BotRegistration),
    RecordUpdate(BotRecordUpdate),
    NameTransfer(BotNameTransfer),
}

impl BotTransaction {
    pub fn kind(&self) -> TransactionKind {
        match self {
            BotTransaction::Registration(_) => TransactionKind::Registration,
            BotTransaction::RecordUpdate(_) => TransactionKind::RecordUpdate,
            BotTransaction::NameTransfer(_) => TransactionKind::NameTransfer,
        }
    }

    /// BLAKE3 of the full encoding
    pub fn tx_id(&self) -> RegistryResult<TxHash> {
        let bytes = self.to_bytes()?;
        Ok(TxHash::new(*blake3::hash(&bytes).as_bytes()))
    }

    pub fn fees(&self) -> BotFees {
        match self {
            BotTransaction::Registration(tx) => tx.fees,
            BotTransaction::RecordUpdate(tx) => tx.fees,
            BotTransaction::NameTransfer(tx) => tx.fees,
        }
    }

    pub fn required_bot_fee(&self, schedule: &FeeSchedule) -> Amount {
        match self {
            BotTransaction::Registration(tx) => tx.required_bot_fee(schedule),
            BotTransaction::RecordUpdate(tx) => tx.required_bot_fee(schedule),
            BotTransaction::NameTransfer(tx) => tx.required_bot_fee(schedule),
        }
    }

    pub fn signature_message(&self, role: SignerRole) -> RegistryResult<[u8; 32]> {
        match self {
            BotTransaction::Registration(tx) => tx.signature_message(role),
            BotTransaction::RecordUpdate(tx) => tx.signature_message(role),
            BotTransaction::NameTransfer(tx) => tx.signature_message(role),
        }
    }

    pub fn validate(&self, ctx: &ValidationContext<'_>) -> RegistryResult<()> {
        match self {
            BotTransaction::Registration(tx) => tx.validate(ctx),
            BotTransaction::RecordUpdate(tx) => tx.validate(ctx),
            BotTransaction::NameTransfer(tx) => tx.validate(ctx),
        }
    }

    pub fn apply(&self, ctx: &TransactionContext<'_>) -> RegistryResult<()> {
        match self {
            BotTransaction::Registration(tx) => tx.apply(ctx),
            BotTransaction::RecordUpdate(tx) => tx.apply(ctx),
            BotTransaction::NameTransfer(tx) => tx.apply(ctx),
        }
    }

    pub fn revert(&self, ctx: &TransactionContext<'_>) -> RegistryResult<()> {
        match self {
            BotTransaction::Registration(tx) => tx.revert(ctx),
            BotTransaction::RecordUpdate(tx) => tx.revert(ctx),
            BotTransaction::NameTransfer(tx) => tx.revert(ctx),
        }
    }
}

impl From<BotRegistration> for BotTransaction {
    fn from(tx: BotRegistration) -> Self {
        BotTransaction::Registration(tx)
    }
}

impl From<BotRecordUpdate> for BotTransaction {
    fn from(tx: BotRecordUpdate) -> Self {
        BotTransaction::RecordUpdate(tx)
    }
}

impl From<BotNameTransfer> for BotTransaction {
    fn from(tx: BotNameTransfer) -> Self {
        BotTransaction::NameTransfer(tx)
    }
}

impl BinaryEncode for BotTransaction {
    fn encode_to(&self, out: &mut Vec<u8>) -> RegistryResult<()> {
        out.push(self.kind().as_byte());
        match self {
            BotTransaction::Registration(tx) => {
                tx.encode_body(out)?;
                tx.encode_signatures(out)
            }
            BotTransaction::RecordUpdate(tx) => {
                tx.encode_body(out)?;
                tx.encode_signatures(out)
            }
            BotTransaction::NameTransfer(tx) => {
                tx.encode_body(out)?;
                tx.encode_signatures(out)
            }
        }
    }
}

impl BinaryDecode for BotTransaction {
    fn decode_from(reader: &mut Reader<'_>) -> RegistryResult<Self> {
        match TransactionKind::from_byte(reader.read_u8()?)? {
            TransactionKind::Registration => Ok(BotRegistration::decode(reader)?.into()),
            TransactionKind::RecordUpdate => Ok(BotRecordUpdate::decode(reader)?.into()),
            TransactionKind::NameTransfer => Ok(BotNameTransfer::decode(reader)?.into()),
        }
    }
}

// =============================================================================
// SHARED HELPERS
// =============================================================================

/// Write `set` only when it has elements; presence is flagged by the caller
pub(crate) fn write_optional_set<T: BinaryEncode>(
    out: &mut Vec<u8>,
    set: &SortedSet<T>,
) -> RegistryResult<()> {
    if set.is_empty() {
        return Ok(());
    }
    set.encode_to(out)
}

/// Read a set flagged as present; a flagged set may not be empty
pub(crate) fn read_optional_set<T: BinaryDecode + Ord>(
    reader: &mut Reader<'_>,
    present: bool,
) -> RegistryResult<SortedSet<T>> {
    if !present {
        return Ok(SortedSet::new());
    }
    let set = SortedSet::decode_from(reader)?;
    if set.is_empty() {
        return Err(RegistryError::Encoding("set flagged as present is empty".to_string()));
    }
    Ok(set)
}

/// Reject flag bits outside `known`
pub(crate) fn check_flags(flags: u8, known: u8) -> RegistryResult<()> {
    if flags & !known != 0 {
        return Err(RegistryError::Encoding(format!("unknown flags 0x{:02x}", flags)));
    }
    Ok(())
}

/// Point `names` at bot `id`.
///
/// A name still mapped to an expired bot is taken over and the previous
/// owner remembered under the transaction id; a name held by an active bot
/// fails the transaction.
pub(crate) fn claim_names<'a>(
    ctx: &TransactionContext<'_>,
    id: BotId,
    names: impl IntoIterator<Item = &'a BotName>,
) -> RegistryResult<()> {
    let mut takeovers = NameTakeovers::new();
    for name in names {
        if let Some(owner) = ctx.store.get_bot_id_for_name(name)? {
            let holder = ctx.store.get_record(owner)?.ok_or_else(|| {
                RegistryError::corruption(format!("name {} maps to missing bot {}", name, owner))
            })?;
            if !holder.is_expired(ctx.block_time) {
                return Err(RegistryError::NameUnavailable(name.to_string()));
            }
            debug!(name = %name, previous_owner = %owner, bot_id = %id, "name taken over from expired bot");
            takeovers.push(name.clone(), owner);
        }
        ctx.store.map_name(name, id)?;
    }
    ctx.store.put_name_takeovers(&ctx.tx_id, &takeovers)
}

/// Undo `claim_names`: hand names back to their previous owner or unmap them
pub(crate) fn release_claimed_names<'a>(
    ctx: &TransactionContext<'_>,
    id: BotId,
    names: impl IntoIterator<Item = &'a BotName>,
) -> RegistryResult<()> {
    let takeovers = ctx.store.get_name_takeovers(&ctx.tx_id)?;
    for name in names {
        expect_name_owner(ctx.store, name, id)?;
        match takeovers.previous_owner(name) {
            Some(previous) => ctx.store.map_name(name, previous)?,
            None => ctx.store.unmap_name(name)?,
        }
    }
    ctx.store.delete_name_takeovers(&ctx.tx_id)
}

/// Fail with corruption unless `name` maps to `id`
pub(crate) fn expect_name_owner(store: &RegistryStore, name: &BotName, id: BotId) -> RegistryResult<()> {
    match store.get_bot_id_for_name(name)? {
        Some(owner) if owner == id => Ok(()),
        other => {
            let msg = format!("name {} expected to map to bot {}, found {:?}", name, id, other);
            error!("{}", msg);
            Err(RegistryError::corruption(msg))
        }
    }
}

/// Read a signature written as a short byte string
pub(crate) fn read_signature(reader: &mut Reader<'_>) -> RegistryResult<Vec<u8>> {
    Ok(reader.read_short_bytes()?.to_vec())
}

/// Signatures travel as hex strings in JSON
pub(crate) mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &Vec<u8>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        hex::decode(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use ed25519_dalek::{Signer, SigningKey};
    use lib_types::PublicKey;

    use crate::types::{BotName, NetworkAddress, SortedSet};

    pub fn keypair(seed: u8) -> (SigningKey, PublicKey) {
        let signing = SigningKey::from_bytes(&[seed; 32]);
        let public = PublicKey::new(signing.verifying_key().to_bytes());
        (signing, public)
    }

    pub fn sign(key: &SigningKey, message: &[u8; 32]) -> Vec<u8> {
        key.sign(message).to_bytes().to_vec()
    }

    pub fn names(list: &[&str]) -> SortedSet<BotName> {
        SortedSet::try_from(list.iter().map(|n| BotName::new(n).unwrap()).collect::<Vec<_>>())
            .unwrap()
    }

    pub fn addresses(list: &[&str]) -> SortedSet<NetworkAddress> {
        SortedSet::try_from(
            list.iter()
                .map(|a| NetworkAddress::parse(a).unwrap())
                .collect::<Vec<_>>(),
        )
        .unwrap()
    }
}
