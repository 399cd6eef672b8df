//! Shared helpers for registry integration tests
#![allow(dead_code)]

use ed25519_dalek::{Signer, SigningKey};
use lib_botregistry::{
    Block, BlockTransaction, BotFees, BotId, BotName, BotNameTransfer, BotRecordUpdate,
    BotRegistration, BotRegistry, BotTransaction, NetworkAddress, SignerRole, SortedSet,
};
use lib_types::PublicKey;

/// First block time used by the tests, minute aligned
pub const T0: u64 = 1_700_000_040;

/// Generous fees for the unit-sized test schedule
pub const FEES: BotFees = BotFees {
    miner_fee: 1,
    bot_fee: 10_000,
};

// ============================================================================
// Keys and Values
// ============================================================================

pub struct TestBot {
    pub signing: SigningKey,
    pub public_key: PublicKey,
}

impl TestBot {
    pub fn new(seed: u8) -> Self {
        let signing = SigningKey::from_bytes(&[seed; 32]);
        let public_key = PublicKey::new(signing.verifying_key().to_bytes());
        Self {
            signing,
            public_key,
        }
    }

    pub fn sign(&self, message: &[u8; 32]) -> Vec<u8> {
        self.signing.sign(message).to_bytes().to_vec()
    }
}

pub fn name(s: &str) -> BotName {
    BotName::new(s).expect("valid test name")
}

pub fn names(list: &[&str]) -> SortedSet<BotName> {
    let mut set = SortedSet::new();
    for n in list {
        set.insert(name(n)).expect("unique test name");
    }
    set
}

pub fn addresses(list: &[&str]) -> SortedSet<NetworkAddress> {
    let mut set = SortedSet::new();
    for a in list {
        set.insert(NetworkAddress::parse(a).expect("valid test address"))
            .expect("unique test address");
    }
    set
}

// ============================================================================
// Transaction Builders
// ============================================================================

pub fn registration(
    bot: &TestBot,
    name_list: &[&str],
    address_list: &[&str],
    months: u8,
) -> BotTransaction {
    let mut tx = BotRegistration {
        addresses: addresses(address_list),
        names: names(name_list),
        months,
        fees: FEES,
        public_key: bot.public_key,
        signature: Vec::new(),
    };
    let message = tx.signature_message(SignerRole::Sender).unwrap();
    tx.signature = bot.sign(&message);
    tx.into()
}

/// An unsigned update of `id` with nothing changed
pub fn blank_update(id: BotId) -> BotRecordUpdate {
    BotRecordUpdate {
        id,
        months: 0,
        addresses_to_add: SortedSet::new(),
        addresses_to_remove: SortedSet::new(),
        names_to_add: SortedSet::new(),
        names_to_remove: SortedSet::new(),
        fees: FEES,
        signature: Vec::new(),
    }
}

pub fn signed_update(bot: &TestBot, mut tx: BotRecordUpdate) -> BotTransaction {
    let message = tx.signature_message(SignerRole::Sender).unwrap();
    tx.signature = bot.sign(&message);
    tx.into()
}

pub fn renewal(bot: &TestBot, id: BotId, months: u8) -> BotTransaction {
    let mut tx = blank_update(id);
    tx.months = months;
    signed_update(bot, tx)
}

pub fn transfer(
    sender: (&TestBot, BotId),
    receiver: (&TestBot, BotId),
    name_list: &[&str],
) -> BotTransaction {
    let mut tx = BotNameTransfer {
        sender: sender.1,
        receiver: receiver.1,
        names: names(name_list),
        fees: FEES,
        sender_signature: Vec::new(),
        receiver_signature: Vec::new(),
    };
    let sender_message = tx.signature_message(SignerRole::Sender).unwrap();
    let receiver_message = tx.signature_message(SignerRole::Receiver).unwrap();
    tx.sender_signature = sender.0.sign(&sender_message);
    tx.receiver_signature = receiver.0.sign(&receiver_message);
    tx.into()
}

// ============================================================================
// Chain Driver
// ============================================================================

/// Applies blocks like a host chain would and remembers them for reverts
pub struct TestChain {
    pub registry: BotRegistry,
    pub blocks: Vec<Block>,
}

impl TestChain {
    pub fn new(registry: BotRegistry) -> Self {
        Self {
            registry,
            blocks: Vec::new(),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(BotRegistry::in_memory().expect("in-memory registry"))
    }

    pub fn next_height(&self) -> u64 {
        self.blocks.len() as u64
    }

    /// Validate every transaction against the current state, then apply them as one block
    pub fn push(&mut self, time: u64, txs: Vec<BotTransaction>) -> anyhow::Result<()> {
        for tx in &txs {
            self.registry.validate_transaction(tx, time)?;
        }
        self.push_unchecked(time, txs)
    }

    /// Apply a block without validating it first
    pub fn push_unchecked(&mut self, time: u64, txs: Vec<BotTransaction>) -> anyhow::Result<()> {
        let txs = txs
            .into_iter()
            .map(BlockTransaction::new)
            .collect::<Result<Vec<_>, _>>()?;
        let block = Block::new(self.next_height(), time, txs);
        self.registry.apply_block(&block)?;
        self.blocks.push(block);
        Ok(())
    }

    /// Revert the tip block
    pub fn pop(&mut self) -> anyhow::Result<()> {
        let block = self
            .blocks
            .pop()
            .ok_or_else(|| anyhow::anyhow!("no block to revert"))?;
        self.registry.revert_block(&block)?;
        Ok(())
    }

    pub fn bot_id(&self, bot: &TestBot) -> BotId {
        self.registry
            .get_record_by_key(&bot.public_key)
            .expect("registered bot")
            .id
    }
}
