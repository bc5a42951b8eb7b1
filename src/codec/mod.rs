//! Codec module - serialization for handler payloads.
//!
//! Handler payloads are opaque bytes on the wire; a [`PayloadCodec`] turns
//! them into typed values at the dispatch boundary:
//!
//! - [`JsonCodec`] - JSON via `serde_json` (the default client format)
//! - [`MsgPackCodec`] - MessagePack via `rmp-serde` (`to_vec_named` so
//!   structs serialize as maps, interoperable with JavaScript clients)
//!
//! Codecs are marker structs selected at registration time, which keeps
//! codec choice a compile-time decision per method.
//!
//! # Example
//!
//! ```
//! use meshwire::codec::{JsonCodec, PayloadCodec};
//!
//! let encoded = JsonCodec::encode(&"hello").unwrap();
//! let decoded: String = JsonCodec::decode(&encoded).unwrap();
//! assert_eq!(decoded, "hello");
//! ```

mod json;
mod msgpack;

pub use json::JsonCodec;
pub use msgpack::MsgPackCodec;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::Result;

/// Serialization strategy for handler payloads.
pub trait PayloadCodec {
    /// Encode a value to payload bytes.
    fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>>;

    /// Decode payload bytes to a value.
    fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T>;
}
