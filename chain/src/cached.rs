use crate::{BitcoinDeserialize, BitcoinSerialize, SerializationError};
use serde::{Deserialize, Serialize};

/// A `Cached<T>` is an `Option<T>` that is never serialized.
///
/// It holds a value derived from the rest of the struct (most commonly a
/// hash) so it can be computed once, during parsing, and reused without
/// risking a consensus break: the wire format never carries it.
#[derive(Clone, Copy, Eq, Serialize, Deserialize)]
pub struct Cached<T: Clone + Copy>(Option<T>);

impl<T: Clone + Copy> Cached<T> {
    pub fn new() -> Cached<T> {
        Cached(None)
    }
    pub fn from(val: T) -> Cached<T> {
        Cached(Some(val))
    }
    pub fn value(&self) -> Option<T> {
        self.0
    }
    pub fn mut_value(&mut self) -> &mut Option<T> {
        &mut self.0
    }
    pub fn has_value(&self) -> bool {
        self.0.is_some()
    }
}

impl<T: Clone + Copy> Default for Cached<T> {
    fn default() -> Self {
        Cached::new()
    }
}

/// Returns false only if both sides have a cached value and the values differ.
///
/// This lets freshly-constructed values (empty cache) compare equal to their
/// deserialized counterparts (populated cache) without forcing the cache to
/// be recomputed just for the comparison.
impl<T: PartialEq + Copy> PartialEq for Cached<T> {
    fn eq(&self, other: &Self) -> bool {
        match self.0 {
            None => true,
            Some(val) => match other.0 {
                Some(rhs) => val == rhs,
                None => true,
            },
        }
    }
}

impl<T: Clone + Copy> std::fmt::Debug for Cached<T>
where
    T: std::fmt::Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl<T: Clone + Copy> BitcoinSerialize for Cached<T> {
    fn bitcoin_serialize<W>(&self, _: W) -> Result<(), std::io::Error>
    where
        W: std::io::Write,
    {
        Ok(())
    }
}

impl<T: Clone + Copy> BitcoinDeserialize for Cached<T> {
    fn bitcoin_deserialize<R: std::io::Read>(
        _: R,
    ) -> std::result::Result<Self, SerializationError> {
        Ok(Cached(None))
    }
}
