//! Agent: the object owning one client connection and its send path.
//!
//! An agent binds a [`Session`] to a socket. The send path is a boxed
//! [`PacketSink`] behind an async mutex, so outbound packets on one
//! connection are serialized regardless of who sends (processor, sweeper,
//! handler code). Status moves through the connection state machine
//! `Start -> Handshake -> Working -> Closed`; `Closed` is terminal and
//! `close` is idempotent.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex as StdMutex, Weak};
use std::time::{Duration, Instant};

use bytes::Bytes;
use futures_util::stream::SplitSink;
use futures_util::SinkExt;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::{watch, Mutex};
use tokio_tungstenite::tungstenite::{Error as WsError, Message as WsMessage};
use tokio_tungstenite::WebSocketStream;

use crate::error::{MeshwireError, Result};
use crate::handler::BoxFuture;
use crate::message::RouteDictionary;
use crate::protocol::Packet;
use crate::session::Session;

/// Connection state of an agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum AgentStatus {
    /// Created, no handshake seen yet.
    Start = 0,
    /// Handshake received, waiting for the ack.
    Handshake = 1,
    /// Fully established; `Data` packets are processed.
    Working = 2,
    /// Terminal.
    Closed = 3,
}

impl AgentStatus {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => AgentStatus::Start,
            1 => AgentStatus::Handshake,
            2 => AgentStatus::Working,
            _ => AgentStatus::Closed,
        }
    }
}

/// Abstraction over the outbound half of a transport.
///
/// One implementation writes length-delimited frames to a byte stream,
/// the other wraps each frame in a WebSocket binary message.
pub trait PacketSink: Send {
    /// Write one encoded packet.
    fn send(&mut self, frame: Bytes) -> BoxFuture<'_, Result<()>>;
}

/// Packet sink over any `AsyncWrite` (TCP, in-memory duplex, ...).
pub struct StreamSink<W> {
    writer: W,
}

impl<W> StreamSink<W> {
    /// Wrap a write half.
    pub fn new(writer: W) -> Self {
        Self { writer }
    }
}

impl<W: AsyncWrite + Unpin + Send> PacketSink for StreamSink<W> {
    fn send(&mut self, frame: Bytes) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            self.writer.write_all(&frame).await?;
            self.writer.flush().await?;
            Ok(())
        })
    }
}

/// Packet sink over the write half of a WebSocket stream.
pub struct WsSink<S> {
    sink: SplitSink<WebSocketStream<S>, WsMessage>,
}

impl<S> WsSink<S> {
    /// Wrap the sink half of a split WebSocket stream.
    pub fn new(sink: SplitSink<WebSocketStream<S>, WsMessage>) -> Self {
        Self { sink }
    }
}

impl<S: AsyncRead + AsyncWrite + Unpin + Send> PacketSink for WsSink<S> {
    fn send(&mut self, frame: Bytes) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            self.sink
                .send(WsMessage::Binary(frame.to_vec()))
                .await
                .map_err(|e| match e {
                    WsError::ConnectionClosed | WsError::AlreadyClosed => {
                        MeshwireError::ClosedAgent
                    }
                    other => MeshwireError::Protocol(format!("websocket send: {}", other)),
                })
        })
    }
}

/// Per-connection binding of a session to a socket.
pub struct Agent {
    session: Arc<Session>,
    sink: Mutex<Box<dyn PacketSink>>,
    status: AtomicU8,
    last_time: StdMutex<Instant>,
    closed_tx: watch::Sender<bool>,
}

impl Agent {
    /// Create an agent and its session. The session keeps a weak
    /// back-pointer to the agent for its send operations.
    pub(crate) fn new(
        id: u64,
        sink: Box<dyn PacketSink>,
        dict: Arc<RouteDictionary>,
    ) -> Arc<Agent> {
        let (closed_tx, _) = watch::channel(false);
        Arc::new_cyclic(|weak: &Weak<Agent>| Agent {
            session: Arc::new(Session::new(id, weak.clone(), dict)),
            sink: Mutex::new(sink),
            status: AtomicU8::new(AgentStatus::Start as u8),
            last_time: StdMutex::new(Instant::now()),
            closed_tx,
        })
    }

    /// The session bound to this connection.
    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    /// Current connection state.
    pub fn status(&self) -> AgentStatus {
        AgentStatus::from_u8(self.status.load(Ordering::Acquire))
    }

    /// Move to a new state. `Closed` must go through [`Agent::close`].
    pub(crate) fn set_status(&self, status: AgentStatus) {
        self.status.store(status as u8, Ordering::Release);
    }

    /// Check if the agent has been closed.
    pub fn is_closed(&self) -> bool {
        self.status() == AgentStatus::Closed
    }

    /// Write raw frame bytes to the socket under the per-agent write lock.
    ///
    /// # Errors
    ///
    /// Fails with `ClosedAgent` after `close` has been called.
    pub async fn send(&self, frame: Bytes) -> Result<()> {
        if self.is_closed() {
            return Err(MeshwireError::ClosedAgent);
        }
        let mut sink = self.sink.lock().await;
        if self.is_closed() {
            return Err(MeshwireError::ClosedAgent);
        }
        sink.send(frame).await
    }

    /// Encode and send one packet.
    pub async fn send_packet(&self, packet: &Packet) -> Result<()> {
        self.send(packet.pack()?).await
    }

    /// Record inbound activity for the heartbeat sweeper.
    pub fn touch(&self) {
        *self.last_time.lock().expect("last_time lock poisoned") = Instant::now();
    }

    /// Time since the last inbound activity.
    pub fn idle_for(&self) -> Duration {
        self.last_time
            .lock()
            .expect("last_time lock poisoned")
            .elapsed()
    }

    /// Close the agent. Idempotent; returns `true` only for the call that
    /// actually performed the transition. Readers and processors observe
    /// the close through [`Agent::closed_signal`].
    pub fn close(&self) -> bool {
        let prev = self.status.swap(AgentStatus::Closed as u8, Ordering::AcqRel);
        if prev == AgentStatus::Closed as u8 {
            return false;
        }
        let _ = self.closed_tx.send(true);
        true
    }

    /// Watch receiver that flips to `true` when the agent closes.
    pub fn closed_signal(&self) -> watch::Receiver<bool> {
        self.closed_tx.subscribe()
    }
}


#[cfg(test)]
mod tests {
    use super::testing::capture_agent;
    use super::*;
    use crate::protocol::PacketType;

    #[test]
    fn test_new_agent_starts_in_start() {
        let (agent, _) = capture_agent(1);
        assert_eq!(agent.status(), AgentStatus::Start);
        assert!(!agent.is_closed());
        assert_eq!(agent.session().id(), 1);
    }

    #[test]
    fn test_state_transitions() {
        let (agent, _) = capture_agent(1);

        agent.set_status(AgentStatus::Handshake);
        assert_eq!(agent.status(), AgentStatus::Handshake);

        agent.set_status(AgentStatus::Working);
        assert_eq!(agent.status(), AgentStatus::Working);
    }

    #[test]
    fn test_close_is_idempotent() {
        let (agent, _) = capture_agent(1);

        assert!(agent.close());
        assert!(agent.is_closed());
        assert!(!agent.close());
        assert!(!agent.close());
    }

    #[tokio::test]
    async fn test_send_after_close() {
        let (agent, frames) = capture_agent(1);
        agent.close();

        let result = agent.send(Bytes::from_static(b"x")).await;
        assert!(matches!(result, Err(MeshwireError::ClosedAgent)));
        assert!(frames.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_send_packet_writes_frame() {
        let (agent, frames) = capture_agent(1);

        agent
            .send_packet(&Packet::new(PacketType::Data, &b"hi"[..]))
            .await
            .unwrap();

        let frames = frames.lock().unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(&frames[0][..], &[0x04, 0x00, 0x00, 0x02, b'h', b'i']);
    }

    #[tokio::test]
    async fn test_closed_signal_observes_close() {
        let (agent, _) = capture_agent(1);
        let mut signal = agent.closed_signal();

        assert!(!*signal.borrow());
        agent.close();

        signal.changed().await.unwrap();
        assert!(*signal.borrow());
    }

    #[test]
    fn test_touch_resets_idle() {
        let (agent, _) = capture_agent(1);
        std::thread::sleep(Duration::from_millis(15));
        assert!(agent.idle_for() >= Duration::from_millis(10));

        agent.touch();
        assert!(agent.idle_for() < Duration::from_millis(10));
    }
}
