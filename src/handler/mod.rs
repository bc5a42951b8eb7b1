//! Handler module - service registration and method dispatch.
//!
//! User components register as named services whose methods receive the
//! calling session and a payload:
//!
//! ```ignore
//! use meshwire::handler::Service;
//!
//! let echo = Service::new("echo")
//!     .method("say", |session, req: SayReq| async move {
//!         session.response(serde_json::to_vec(&req)?).await
//!     })
//!     .raw_method("blob", |_session, payload| async move {
//!         tracing::debug!("got {} raw bytes", payload.len());
//!         Ok(())
//!     });
//! ```
//!
//! Typed methods deserialize the payload through a
//! [`PayloadCodec`](crate::codec::PayloadCodec) before the handler runs;
//! raw methods receive the bytes untouched. Replies go out through the
//! session (`response`, `push`), never as return values.

mod registry;

use std::future::Future;
use std::pin::Pin;

use bytes::Bytes;

pub use registry::{HandlerMethod, HandlerRegistry, RawHandler, Service, TypedHandler};

use crate::error::Result;
use crate::session::SessionRef;

/// Result type for handler functions.
pub type HandlerResult = Result<()>;

/// Boxed future, the object-safe return type of [`Handler::call`].
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Trait for dispatchable handler methods.
pub trait Handler: Send + Sync + 'static {
    /// Invoke the handler for one message on the given session.
    fn call(&self, session: SessionRef, payload: Bytes) -> BoxFuture<'static, HandlerResult>;
}
