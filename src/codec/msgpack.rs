//! MsgPack payload codec using `rmp-serde`.
//!
//! Uses `to_vec_named` so structs serialize as maps with field names, the
//! format JavaScript MessagePack implementations expect. `to_vec` would
//! produce positional arrays and break interop.

use serde::de::DeserializeOwned;
use serde::Serialize;

use super::PayloadCodec;
use crate::error::Result;

/// MessagePack codec, for clients that prefer a binary payload format.
pub struct MsgPackCodec;

impl PayloadCodec for MsgPackCodec {
    #[inline]
    fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
        Ok(rmp_serde::to_vec_named(value)?)
    }

    #[inline]
    fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
        Ok(rmp_serde::from_slice(bytes)?)
    }
}
