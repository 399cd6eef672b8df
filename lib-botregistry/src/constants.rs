//! Registry Limits and Protocol Constants
//!
//! Changing any of these values changes consensus-relevant behavior.

/// Maximum number of names a single bot can own
pub const MAX_NAMES_PER_BOT: usize = 5;

/// Maximum number of network addresses a single bot can announce
pub const MAX_ADDRESSES_PER_BOT: usize = 10;

/// Length of one prepaid bot month, in seconds (30 days)
pub const BOT_MONTH: u64 = 30 * 24 * 60 * 60;

/// Maximum number of months a bot can be prepaid ahead of the block time
pub const MAX_PREPAID_MONTHS: u8 = 24;

/// Maximum prepaid period, in seconds
pub const MAX_PREPAID_SECONDS: u64 = BOT_MONTH * MAX_PREPAID_MONTHS as u64;

/// Smallest identifier handed out to a bot
pub const MIN_BOT_ID: u32 = 1;

/// Maximum length in bytes of a bot name or hostname address
pub const MAX_NAME_LENGTH: usize = 63;

// =============================================================================
// STORE METADATA
// =============================================================================

/// Schema version written to a fresh store
pub const REGISTRY_VERSION: &str = "1.0.0.0";

/// Header identifying a bot registry store
pub const REGISTRY_HEADER: &str = "botregistry";
