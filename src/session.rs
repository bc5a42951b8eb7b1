//! Session: the application-visible identity attached to an agent.
//!
//! A session lives exactly as long as its agent. Handler code receives a
//! [`SessionRef`] and talks back to the client through it (`response`,
//! `push`, `kick`). State sits behind an internal lock so that handlers on
//! other connections may read attributes of a foreign session safely; the
//! owning connection's processor is the only writer in practice.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};

use bytes::Bytes;
use serde_json::Value;

use crate::agent::Agent;
use crate::cluster::SessionSnapshot;
use crate::error::{MeshwireError, Result};
use crate::message::{Message, RouteDictionary};
use crate::protocol::{Packet, PacketType};

/// Shared handle to a session.
pub type SessionRef = Arc<Session>;

struct Inner {
    uid: i64,
    last_id: u64,
    attrs: HashMap<String, Value>,
}

/// Per-client logical state.
pub struct Session {
    id: u64,
    agent: Weak<Agent>,
    dict: Arc<RouteDictionary>,
    inner: Mutex<Inner>,
}

impl Session {
    pub(crate) fn new(id: u64, agent: Weak<Agent>, dict: Arc<RouteDictionary>) -> Self {
        Self {
            id,
            agent,
            dict,
            inner: Mutex::new(Inner {
                uid: 0,
                last_id: 0,
                attrs: HashMap::new(),
            }),
        }
    }

    /// Process-unique session id.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Bound user id; 0 until [`Session::bind`] is called.
    pub fn uid(&self) -> i64 {
        self.inner.lock().expect("session lock poisoned").uid
    }

    /// Bind an application user id to the session.
    ///
    /// Idempotent for the same uid.
    ///
    /// # Errors
    ///
    /// Fails with `AlreadyBound` if a different uid is already bound.
    pub fn bind(&self, uid: i64) -> Result<()> {
        let mut inner = self.inner.lock().expect("session lock poisoned");
        if inner.uid != 0 && inner.uid != uid {
            return Err(MeshwireError::AlreadyBound(inner.uid));
        }
        inner.uid = uid;
        Ok(())
    }

    /// Store an attribute on the session.
    pub fn set(&self, key: impl Into<String>, value: Value) {
        self.inner
            .lock()
            .expect("session lock poisoned")
            .attrs
            .insert(key.into(), value);
    }

    /// Read an attribute from the session.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.inner
            .lock()
            .expect("session lock poisoned")
            .attrs
            .get(key)
            .cloned()
    }

    /// Id of the most recent request, used to correlate the reply.
    pub fn last_id(&self) -> u64 {
        self.inner.lock().expect("session lock poisoned").last_id
    }

    pub(crate) fn set_last_id(&self, id: u64) {
        self.inner.lock().expect("session lock poisoned").last_id = id;
    }

    /// Send a push message to the client.
    pub async fn push(&self, route: &str, payload: impl Into<Bytes>) -> Result<()> {
        let body = Message::push(route, payload).encode(&self.dict)?;
        self.agent()?
            .send_packet(&Packet::new(PacketType::Data, body))
            .await
    }

    /// Reply to the request currently being processed.
    ///
    /// # Errors
    ///
    /// Fails with `NoPendingRequest` when no request id is recorded
    /// (e.g. inside a notify handler).
    pub async fn response(&self, payload: impl Into<Bytes>) -> Result<()> {
        let last_id = self.last_id();
        if last_id == 0 {
            return Err(MeshwireError::NoPendingRequest);
        }
        let body = Message::response(last_id, payload).encode(&self.dict)?;
        self.agent()?
            .send_packet(&Packet::new(PacketType::Data, body))
            .await
    }

    /// Disconnect the client: emit a `Kick` packet, then close the agent.
    pub async fn kick(&self) -> Result<()> {
        let agent = self.agent()?;
        let result = agent.send_packet(&Packet::empty(PacketType::Kick)).await;
        agent.close();
        result
    }

    /// Immutable view shipped with remote calls.
    pub(crate) fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            id: self.id,
            uid: self.uid(),
        }
    }

    fn agent(&self) -> Result<Arc<Agent>> {
        self.agent.upgrade().ok_or(MeshwireError::ClosedAgent)
    }
}
