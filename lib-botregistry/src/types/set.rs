//! Sorted Unique Sets
//!
//! Addresses and names are kept in strictly ascending order at all times,
//! so their encodings are canonical and lookups are binary searches.

use std::fmt;

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize, Serializer};
use thiserror::Error;

use super::codec::{BinaryDecode, BinaryEncode, Reader};
use crate::errors::{RegistryError, RegistryResult};

/// Error from a set mutation
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetError {
    #[error("element is already in the set")]
    Duplicate,

    #[error("element is not in the set")]
    Missing,
}

/// Ordered set without duplicates, backed by a vector
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct SortedSet<T> {
    items: Vec<T>,
}

impl<T> SortedSet<T> {
    pub const fn new() -> Self {
        Self { items: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }

    pub fn as_slice(&self) -> &[T] {
        &self.items
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }
}

impl<T: Ord> SortedSet<T> {
    pub fn contains(&self, item: &T) -> bool {
        self.items.binary_search(item).is_ok()
    }

    /// Insert at the sorted position
    pub fn insert(&mut self, item: T) -> Result<(), SetError> {
        match self.items.binary_search(&item) {
            Ok(_) => Err(SetError::Duplicate),
            Err(idx) => {
                self.items.insert(idx, item);
                Ok(())
            }
        }
    }

    pub fn remove(&mut self, item: &T) -> Result<T, SetError> {
        match self.items.binary_search(item) {
            Ok(idx) => Ok(self.items.remove(idx)),
            Err(_) => Err(SetError::Missing),
        }
    }
}

impl<T: Ord + Clone> SortedSet<T> {
    /// Elements of `self` that are not in `other`
    pub fn difference(&self, other: &SortedSet<T>) -> Vec<T> {
        let mut out = Vec::new();
        let mut theirs = other.items.iter().peekable();
        for item in &self.items {
            while theirs.next_if(|o| *o < item).is_some() {}
            if theirs.peek() != Some(&item) {
                out.push(item.clone());
            }
        }
        out
    }

    /// Elements in both `self` and `other`
    pub fn intersection(&self, other: &SortedSet<T>) -> Vec<T> {
        let mut out = Vec::new();
        let mut theirs = other.items.iter().peekable();
        for item in &self.items {
            while theirs.next_if(|o| *o < item).is_some() {}
            if theirs.peek() == Some(&item) {
                out.push(item.clone());
            }
        }
        out
    }
}

impl<T> Default for SortedSet<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: fmt::Debug> fmt::Debug for SortedSet<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.items.iter()).finish()
    }
}

impl<T: Ord> TryFrom<Vec<T>> for SortedSet<T> {
    type Error = SetError;

    fn try_from(items: Vec<T>) -> Result<Self, Self::Error> {
        let mut set = Self::new();
        for item in items {
            set.insert(item)?;
        }
        Ok(set)
    }
}

impl<T> IntoIterator for SortedSet<T> {
    type Item = T;
    type IntoIter = std::vec::IntoIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

impl<'a, T> IntoIterator for &'a SortedSet<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

// =============================================================================
// ENCODING
// =============================================================================

impl<T: BinaryEncode> SortedSet<T> {
    /// Encode the elements without a length prefix
    pub fn encode_elements(&self, out: &mut Vec<u8>) -> RegistryResult<()> {
        for item in &self.items {
            item.encode_to(out)?;
        }
        Ok(())
    }
}

impl<T: BinaryDecode + Ord> SortedSet<T> {
    /// Decode `count` elements, re-inserting each so order and uniqueness hold
    pub fn decode_elements(reader: &mut Reader<'_>, count: usize) -> RegistryResult<Self> {
        let mut set = Self::new();
        for _ in 0..count {
            set.insert(T::decode_from(reader)?)
                .map_err(|e| RegistryError::Encoding(format!("set element: {}", e)))?;
        }
        Ok(set)
    }
}

impl<T: BinaryEncode> BinaryEncode for SortedSet<T> {
    fn encode_to(&self, out: &mut Vec<u8>) -> RegistryResult<()> {
        let len = u8::try_from(self.len())
            .map_err(|_| RegistryError::Encoding(format!("set of {} elements", self.len())))?;
        out.push(len);
        self.encode_elements(out)
    }
}

impl<T: BinaryDecode + Ord> BinaryDecode for SortedSet<T> {
    fn decode_from(reader: &mut Reader<'_>) -> RegistryResult<Self> {
        let count = reader.read_u8()? as usize;
        Self::decode_elements(reader, count)
    }
}

impl<T: Serialize> Serialize for SortedSet<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.items.serialize(serializer)
    }
}

impl<'de, T: Deserialize<'de> + Ord> Deserialize<'de> for SortedSet<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let items = Vec::<T>::deserialize(deserializer)?;
        SortedSet::try_from(items).map_err(de::Error::custom)
    }
}
