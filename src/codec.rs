//! MessagePack codec for boundary messages.
//!
//! Uses `rmp_serde::to_vec_named`, so structs travel as maps keyed by field
//! name. Consumers on the other side of a process or isolate boundary can
//! then decode them without knowing the Rust field order.

use crate::error::Result;

/// MessagePack codec for [`DomainEvent`](crate::DomainEvent) and
/// [`ReaderCommand`](crate::ReaderCommand).
pub struct MsgPackCodec;

impl MsgPackCodec {
    /// Encode a value as struct-as-map MessagePack.
    ///
    /// # Errors
    ///
    /// Returns error if the value cannot be serialized.
    #[inline]
    pub fn encode<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
        Ok(rmp_serde::to_vec_named(value)?)
    }

    /// Decode MessagePack bytes.
    ///
    /// # Errors
    ///
    /// Returns error if the bytes cannot be deserialized to type T.
    #[inline]
    pub fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T> {
        Ok(rmp_serde::from_slice(bytes)?)
    }
}
