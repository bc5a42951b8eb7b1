//! Cluster collaborator contract.
//!
//! The cluster directory and its RPC transport live outside this crate;
//! the dispatcher only consumes the [`Cluster::call`] interface to forward
//! messages whose route targets another server type. A node without a
//! cluster treats every remote route as `RemoteUnavailable`.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio::net::TcpStream;

use crate::error::Result;
use crate::handler::BoxFuture;
use crate::route::Route;

/// Kind of a remote call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteKind {
    /// Framework-originated call (message forwarding).
    Sys,
    /// Application-originated call.
    User,
}

/// Immutable view of a session shipped with a remote call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    /// Session id on the frontend node.
    pub id: u64,
    /// Bound user id; 0 if unbound.
    pub uid: i64,
}

/// External name service and RPC transport.
pub trait Cluster: Send + Sync + 'static {
    /// Forward a call to the node owning `route.server_type` and return
    /// the reply payload.
    fn call(
        &self,
        kind: RemoteKind,
        route: Route,
        session: SessionSnapshot,
        payload: Bytes,
    ) -> BoxFuture<'static, Result<Bytes>>;
}

/// Handler for peer connections on a backend node.
///
/// Backend nodes accept connections from other nodes rather than from
/// clients; the accept loop hands those sockets here. The implementation
/// (the other end of the cluster RPC transport) lives with the cluster
/// collaborator.
pub trait RemoteHandler: Send + Sync + 'static {
    /// Take ownership of an inbound peer connection.
    fn handle(&self, stream: TcpStream);
}
