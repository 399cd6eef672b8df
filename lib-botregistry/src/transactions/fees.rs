//! Bot Fee Schedule
//!
//! Every registry transaction pays two fees: the usual miner fee and a bot
//! fee that funds the registry itself. Bot fees are whole multiples of one
//! coin, so the schedule is expressed in multipliers.

use serde::{Deserialize, Serialize};
use lib_types::Amount;

use crate::errors::{RegistryError, RegistryResult};
use crate::types::{BinaryEncode, Reader};

/// Flat fee for registering a bot
pub const REGISTRATION_FEE_MULTIPLIER: Amount = 90;

/// Fee per prepaid month, before discounts
pub const MONTHLY_FEE_MULTIPLIER: Amount = 10;

/// Fee per name beyond the first at registration, and per name added or transferred later
pub const NAME_FEE_MULTIPLIER: Amount = 50;

/// Fee for any change to the network addresses of an existing bot
pub const ADDRESS_CHANGE_FEE_MULTIPLIER: Amount = 20;

/// Fees declared by a registry transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BotFees {
    pub miner_fee: Amount,
    pub bot_fee: Amount,
}

impl BotFees {
    pub fn new(miner_fee: Amount, bot_fee: Amount) -> Self {
        Self { miner_fee, bot_fee }
    }

    pub fn ensure_miner_fee(&self, minimum: Amount) -> RegistryResult<()> {
        if self.miner_fee < minimum {
            return Err(RegistryError::InsufficientFee {
                kind: "miner",
                paid: self.miner_fee,
                required: minimum,
            });
        }
        Ok(())
    }

    pub fn ensure_bot_fee(&self, required: Amount) -> RegistryResult<()> {
        if self.bot_fee < required {
            return Err(RegistryError::InsufficientFee {
                kind: "bot",
                paid: self.bot_fee,
                required,
            });
        }
        Ok(())
    }

    pub(crate) fn decode_from(reader: &mut Reader<'_>) -> RegistryResult<Self> {
        Ok(Self {
            miner_fee: reader.read_u128()?,
            bot_fee: reader.read_u128()?,
        })
    }
}

// Layout: [miner_fee: 16 LE][bot_fee: 16 LE]
impl BinaryEncode for BotFees {
    fn encode_to(&self, out: &mut Vec<u8>) -> RegistryResult<()> {
        out.extend_from_slice(&self.miner_fee.to_le_bytes());
        out.extend_from_slice(&self.bot_fee.to_le_bytes());
        Ok(())
    }
}

/// Required bot fees, in units of one coin
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeSchedule {
    one_coin: Amount,
}

impl FeeSchedule {
    pub fn new(one_coin: Amount) -> Self {
        Self { one_coin }
    }

    pub fn one_coin(&self) -> Amount {
        self.one_coin
    }

    /// Fee for prepaying `months`: 30% off from a year, 50% off for two years
    pub fn monthly_fee(&self, months: u8) -> Amount {
        let fee = months as Amount * MONTHLY_FEE_MULTIPLIER * self.one_coin;
        match months {
            0..=11 => fee,
            12..=23 => fee * 7 / 10,
            _ => fee / 2,
        }
    }

    /// Registration: flat fee, months, and every name but the first
    pub fn registration_fee(&self, months: u8, name_count: usize) -> Amount {
        let mut fee = REGISTRATION_FEE_MULTIPLIER * self.one_coin + self.monthly_fee(months);
        if name_count > 1 {
            fee += (name_count as Amount - 1) * NAME_FEE_MULTIPLIER * self.one_coin;
        }
        fee
    }

    /// Record update: months, any address change, and every added name
    pub fn update_fee(&self, months: u8, addresses_changed: bool, names_added: usize) -> Amount {
        let mut fee = 0;
        if months > 0 {
            fee += self.monthly_fee(months);
        }
        if addresses_changed {
            fee += ADDRESS_CHANGE_FEE_MULTIPLIER * self.one_coin;
        }
        fee + names_added as Amount * NAME_FEE_MULTIPLIER * self.one_coin
    }

    pub fn transfer_fee(&self, name_count: usize) -> Amount {
        name_count as Amount * NAME_FEE_MULTIPLIER * self.one_coin
    }
}
