//! Bot registry primitives.
//! Stable, protocol-neutral, behavior-free.
//!
//! Rule: No String identifiers in ledger state. Ever.

pub mod primitives;

pub use primitives::{Amount, BlockHeight, PublicKey, Timestamp, TxHash};
