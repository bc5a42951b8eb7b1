//! # meshwire
//!
//! Session-and-dispatch core for clustered, message-oriented application
//! servers (soft-realtime multiplayer and RPC workloads).
//!
//! A client opens a long-lived connection (raw TCP or WebSocket) to a
//! frontend node, performs a handshake, and exchanges framed messages.
//! This crate turns those byte streams into ordered, session-scoped
//! method invocations against locally registered handler services, or
//! forwards them to peer nodes through a cluster collaborator.
//!
//! ## Architecture
//!
//! - **Packet layer**: self-delimiting binary frames
//!   (`type || be24 length || body`) that survive arbitrary TCP splits
//! - **Message layer**: request/notify/response/push envelopes with
//!   varint ids and dictionary-compressible routes
//! - **Session/agent**: per-connection state machine
//!   (`start -> handshake -> working -> closed`) with heartbeat sweeping
//! - **Dispatch**: one reader and one processor task per connection; a
//!   bounded channel between them is the admission-control point, and the
//!   single processor serializes all handler work per session
//!
//! ## Example
//!
//! ```ignore
//! use meshwire::{NodeConfig, Server, Service};
//!
//! #[tokio::main]
//! async fn main() -> meshwire::Result<()> {
//!     let server = Server::builder(NodeConfig::default())
//!         .service(Service::new("echo").raw_method("say", |session, payload| async move {
//!             session.response(payload).await
//!         }))?
//!         .build();
//!
//!     server.startup();
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:3250").await?;
//!     server.serve(listener).await?;
//!     Ok(())
//! }
//! ```

pub mod cluster;
pub mod codec;
pub mod error;
pub mod handler;
pub mod message;
pub mod protocol;
pub mod route;

mod agent;
mod dispatch;
mod server;
mod service;
mod session;

pub use agent::{Agent, AgentStatus, PacketSink, StreamSink, WsSink};
pub use cluster::{Cluster, RemoteHandler, RemoteKind, SessionSnapshot};
pub use error::{MeshwireError, Result};
pub use handler::Service;
pub use message::{Message, MessageRoute, MessageType, RouteDictionary};
pub use protocol::{Packet, PacketBuffer, PacketType};
pub use route::Route;
pub use server::{NodeConfig, Server, ServerBuilder};
pub use service::NetService;
pub use session::{Session, SessionRef};
