//! Registry data model

pub mod codec;
pub mod name;
pub mod net;
pub mod record;
pub mod set;
pub mod time;

pub use codec::{BinaryDecode, BinaryEncode, Reader};
pub use name::{BotId, BotName};
pub use net::{NetworkAddress, NetworkAddressType};
pub use record::BotRecord;
pub use set::{SetError, SortedSet};
pub use time::{CompactTimestamp, COMPACT_TIMESTAMP_ACCURACY, COMPACT_TIMESTAMP_NULLPOINT};
