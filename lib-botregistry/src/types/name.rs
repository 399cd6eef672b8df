//! Bot Identifiers and Names

use std::fmt;
use std::str::FromStr;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize, Serializer};

use super::codec::{write_short_bytes, BinaryDecode, BinaryEncode, Reader};
use crate::constants::{MAX_NAME_LENGTH, MIN_BOT_ID};
use crate::errors::{RegistryError, RegistryResult};

static BOT_NAME_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^[A-Za-z][A-Za-z\-0-9]{3,61}[A-Za-z0-9](\.[A-Za-z][A-Za-z\-0-9]{3,55}[A-Za-z0-9])*$",
    )
    .expect("bot name pattern is valid")
});

// =============================================================================
// BOT ID
// =============================================================================

/// Sequential identifier of a registered bot, starting at 1
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BotId(u32);

impl BotId {
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    pub const fn value(self) -> u32 {
        self.0
    }
}

impl fmt::Debug for BotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BotId({})", self.0)
    }
}

impl fmt::Display for BotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for BotId {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let id: u32 = s
            .parse()
            .map_err(|e| RegistryError::InvalidBotId(format!("{:?}: {}", s, e)))?;
        if id < MIN_BOT_ID {
            return Err(RegistryError::InvalidBotId(format!(
                "bot ids start at {}",
                MIN_BOT_ID
            )));
        }
        Ok(Self(id))
    }
}

impl BinaryEncode for BotId {
    fn encode_to(&self, out: &mut Vec<u8>) -> RegistryResult<()> {
        out.extend_from_slice(&self.0.to_le_bytes());
        Ok(())
    }
}

impl BinaryDecode for BotId {
    fn decode_from(reader: &mut Reader<'_>) -> RegistryResult<Self> {
        Ok(Self(reader.read_u32()?))
    }
}

// =============================================================================
// BOT NAME
// =============================================================================

/// A hostname-shaped bot name, always lowercase.
///
/// Names compare byte-wise, which is what the name index sorts by.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BotName(String);

impl BotName {
    pub fn new(name: &str) -> RegistryResult<Self> {
        if name.len() > MAX_NAME_LENGTH {
            return Err(RegistryError::InvalidName(format!(
                "{} bytes exceeds {} bytes",
                name.len(),
                MAX_NAME_LENGTH
            )));
        }
        if !BOT_NAME_REGEX.is_match(name) {
            return Err(RegistryError::InvalidName(format!("{:?}", name)));
        }
        Ok(Self(name.to_ascii_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl FromStr for BotName {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl fmt::Display for BotName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for BotName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BotName({})", self.0)
    }
}

impl BinaryEncode for BotName {
    fn encode_to(&self, out: &mut Vec<u8>) -> RegistryResult<()> {
        write_short_bytes(out, self.as_bytes())
    }
}

impl BinaryDecode for BotName {
    fn decode_from(reader: &mut Reader<'_>) -> RegistryResult<Self> {
        let raw = reader.read_short_bytes()?;
        let name = std::str::from_utf8(raw)
            .map_err(|e| RegistryError::Encoding(format!("bot name: {}", e)))?;
        Self::new(name)
    }
}

impl Serialize for BotName {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for BotName {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        BotName::new(&s).map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_names() {
        for name in ["alice.example", "thebot", "my-bot.pages", "mybot.example.sites"] {
            assert!(BotName::new(name).is_ok(), "{} should be valid", name);
        }
    }

    #[test]
    fn test_invalid_names() {
        for name in ["", "abc", "1bot", "bot-", "bot..example", "bot.ex", "bot_name"] {
            assert!(
                matches!(BotName::new(name), Err(RegistryError::InvalidName(_))),
                "{:?} should be rejected",
                name
            );
        }
        let long = format!("a{}", "b".repeat(63));
        assert!(BotName::new(&long).is_err());
    }

    #[test]
    fn test_lowercase_normalization() {
        let name = BotName::new("Alice.Example").unwrap();
        assert_eq!(name.as_str(), "alice.example");
        assert_eq!(name, BotName::new("alice.example").unwrap());
    }

    #[test]
    fn test_binary_form() {
        let name = BotName::new("thebot").unwrap();
        let bytes = name.to_bytes().unwrap();
        assert_eq!(bytes[0], 6);
        assert_eq!(&bytes[1..], b"thebot");
        assert_eq!(BotName::from_bytes(&bytes).unwrap(), name);
    }

    #[test]
    fn test_bot_id_parsing() {
        assert_eq!("42".parse::<BotId>().unwrap(), BotId::new(42));
        assert!("0".parse::<BotId>().is_err());
        assert!("-1".parse::<BotId>().is_err());
        assert!("abc".parse::<BotId>().is_err());
    }

    #[test]
    fn test_bot_id_binary_form() {
        let id = BotId::new(0x01020304);
        assert_eq!(id.to_bytes().unwrap(), vec![4, 3, 2, 1]);
    }
}
