//! Application-layer message codec.
//!
//! A message is the payload of a `Data` packet:
//! ```text
//! ┌────────┬─────────────┬───────────────────┬──────────┐
//! │ Flag   │ ID          │ Route             │ Data     │
//! │ 1 byte │ varint      │ see below         │ N bytes  │
//! └────────┴─────────────┴───────────────────┴──────────┘
//! ```
//!
//! Flag layout: bits 1-3 carry the message type (Request=0, Notify=1,
//! Response=2, Push=3), bit 0 is the route-compression flag. The ID is
//! present only for Request/Response; the route only for Request, Notify
//! and Push. Varints use 7 data bits per byte, least-significant group
//! first, with the high bit as the continuation marker.
//!
//! Two route forms coexist on the wire: a verbose form (`u8` length plus
//! UTF-8 bytes) and a compact form (varint code resolved against a
//! [`RouteDictionary`]). Encoding falls back to the verbose form whenever
//! the dictionary does not know the route.

use std::collections::HashMap;

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{MeshwireError, Result};

/// Flag bit marking a compressed (dictionary-coded) route.
const ROUTE_COMPRESSED: u8 = 0x01;

/// Message type, carried in bits 1-3 of the flag byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageType {
    /// Client-to-server call expecting a correlated response.
    Request = 0x00,
    /// Client-to-server call with no response.
    Notify = 0x01,
    /// Server-to-client reply correlated by id.
    Response = 0x02,
    /// Server-to-client message outside any request.
    Push = 0x03,
}

impl MessageType {
    fn from_bits(bits: u8) -> Result<Self> {
        match bits {
            0x00 => Ok(MessageType::Request),
            0x01 => Ok(MessageType::Notify),
            0x02 => Ok(MessageType::Response),
            0x03 => Ok(MessageType::Push),
            other => Err(MeshwireError::BadMessageType(other)),
        }
    }

    /// Whether this type carries a message id on the wire.
    pub fn has_id(self) -> bool {
        matches!(self, MessageType::Request | MessageType::Response)
    }

    /// Whether this type carries a route on the wire.
    pub fn has_route(self) -> bool {
        !matches!(self, MessageType::Response)
    }
}

/// Route field of a message: a plain string or a dictionary code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageRoute {
    /// Verbose form: the route string itself.
    Text(String),
    /// Compact form: a code to resolve against the route dictionary.
    Code(u32),
}

/// Bidirectional mapping between route strings and compact codes.
///
/// Populated at startup (typically from the cluster directory); read-only
/// afterwards. An empty dictionary simply disables route compression.
#[derive(Debug, Clone, Default)]
pub struct RouteDictionary {
    codes: HashMap<String, u32>,
    routes: HashMap<u32, String>,
}

impl RouteDictionary {
    /// Create an empty dictionary.
    pub fn new() -> Self {
        Self::default()
    }

    /// Map a route to a compact code (and back).
    pub fn insert(&mut self, route: impl Into<String>, code: u32) {
        let route = route.into();
        self.codes.insert(route.clone(), code);
        self.routes.insert(code, route);
    }

    /// Compact code for a route, if known.
    pub fn code(&self, route: &str) -> Option<u32> {
        self.codes.get(route).copied()
    }

    /// Route string for a compact code, if known.
    pub fn route(&self, code: u32) -> Option<&str> {
        self.routes.get(&code).map(|s| s.as_str())
    }
}

/// A decoded application-layer message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Message type.
    pub kind: MessageType,
    /// Correlation id; meaningful for Request/Response, 0 otherwise.
    pub id: u64,
    /// Route; `None` for Response.
    pub route: Option<MessageRoute>,
    /// Opaque payload bytes.
    pub data: Bytes,
}

impl Message {
    /// Build a request message.
    pub fn request(id: u64, route: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            kind: MessageType::Request,
            id,
            route: Some(MessageRoute::Text(route.into())),
            data: data.into(),
        }
    }

    /// Build a notify message.
    pub fn notify(route: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            kind: MessageType::Notify,
            id: 0,
            route: Some(MessageRoute::Text(route.into())),
            data: data.into(),
        }
    }

    /// Build a response message correlated to a request id.
    pub fn response(id: u64, data: impl Into<Bytes>) -> Self {
        Self {
            kind: MessageType::Response,
            id,
            route: None,
            data: data.into(),
        }
    }

    /// Build a push message.
    pub fn push(route: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            kind: MessageType::Push,
            id: 0,
            route: Some(MessageRoute::Text(route.into())),
            data: data.into(),
        }
    }

    /// Encode the message, compressing the route when the dictionary
    /// knows it.
    ///
    /// # Errors
    ///
    /// Fails with `Protocol` if a route is missing for a type that
    /// requires one, or if a verbose route exceeds 255 bytes.
    pub fn encode(&self, dict: &RouteDictionary) -> Result<Bytes> {
        let route = if self.kind.has_route() {
            match &self.route {
                Some(r) => Some(r),
                None => {
                    return Err(MeshwireError::Protocol(format!(
                        "{:?} message without a route",
                        self.kind
                    )))
                }
            }
        } else {
            None
        };

        // Resolve the wire form of the route up front so the flag byte can
        // carry the compression bit.
        let wire_route = match route {
            Some(MessageRoute::Code(code)) => Some(WireRoute::Code(*code)),
            Some(MessageRoute::Text(text)) => match dict.code(text) {
                Some(code) => Some(WireRoute::Code(code)),
                None => {
                    if text.len() > u8::MAX as usize {
                        return Err(MeshwireError::Protocol(format!(
                            "route {:?} exceeds 255 bytes",
                            text
                        )));
                    }
                    Some(WireRoute::Text(text.as_str()))
                }
            },
            None => None,
        };

        let mut flag = (self.kind as u8) << 1;
        if matches!(wire_route, Some(WireRoute::Code(_))) {
            flag |= ROUTE_COMPRESSED;
        }

        let mut buf = BytesMut::with_capacity(16 + self.data.len());
        buf.put_u8(flag);

        if self.kind.has_id() {
            write_varint(&mut buf, self.id);
        }

        match wire_route {
            Some(WireRoute::Code(code)) => write_varint(&mut buf, code as u64),
            Some(WireRoute::Text(text)) => {
                buf.put_u8(text.len() as u8);
                buf.extend_from_slice(text.as_bytes());
            }
            None => {}
        }

        buf.extend_from_slice(&self.data);
        Ok(buf.freeze())
    }

    /// Decode a message from the body of a `Data` packet.
    ///
    /// Compressed routes are returned as [`MessageRoute::Code`]; resolving
    /// the code against the dictionary is the dispatcher's job.
    ///
    /// # Errors
    ///
    /// - `Truncated` if the header consumes more bytes than available
    ///   (a zero-length body is rejected here).
    /// - `BadMessageType` on unknown type bits.
    pub fn decode(buf: &[u8]) -> Result<Message> {
        if buf.is_empty() {
            return Err(MeshwireError::Truncated("empty message"));
        }

        let flag = buf[0];
        let kind = MessageType::from_bits((flag >> 1) & 0x07)?;
        let compressed = flag & ROUTE_COMPRESSED != 0;
        let mut pos = 1;

        let id = if kind.has_id() {
            read_varint(buf, &mut pos)?
        } else {
            0
        };

        let route = if kind.has_route() {
            if compressed {
                let code = read_varint(buf, &mut pos)?;
                let code = u32::try_from(code)
                    .map_err(|_| MeshwireError::Protocol(format!("route code {} overflow", code)))?;
                Some(MessageRoute::Code(code))
            } else {
                if pos >= buf.len() {
                    return Err(MeshwireError::Truncated("route length"));
                }
                let len = buf[pos] as usize;
                pos += 1;
                if pos + len > buf.len() {
                    return Err(MeshwireError::Truncated("route string"));
                }
                let text = std::str::from_utf8(&buf[pos..pos + len])
                    .map_err(|_| MeshwireError::BadRoute("non-UTF-8 route".into()))?;
                pos += len;
                Some(MessageRoute::Text(text.to_string()))
            }
        } else {
            None
        };

        Ok(Message {
            kind,
            id,
            route,
            data: Bytes::copy_from_slice(&buf[pos..]),
        })
    }
}

enum WireRoute<'a> {
    Text(&'a str),
    Code(u32),
}

/// Append a varint: 7 data bits per byte, low group first, high bit set on
/// every byte except the last.
fn write_varint(buf: &mut BytesMut, mut value: u64) {
    loop {
        let byte = (value & 0x7F) as u8;
        value >>= 7;
        if value == 0 {
            buf.put_u8(byte);
            return;
        }
        buf.put_u8(byte | 0x80);
    }
}

/// Read a varint, advancing `pos`.
fn read_varint(buf: &[u8], pos: &mut usize) -> Result<u64> {
    let mut value: u64 = 0;
    let mut shift = 0;
    loop {
        if *pos >= buf.len() {
            return Err(MeshwireError::Truncated("varint"));
        }
        if shift >= 64 {
            return Err(MeshwireError::Protocol("varint overflow".into()));
        }
        let byte = buf[*pos];
        *pos += 1;
        value |= u64::from(byte & 0x7F) << shift;
        if byte & 0x80 == 0 {
            return Ok(value);
        }
        shift += 7;
    }
}
