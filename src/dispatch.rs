//! Dispatcher: per-connection read loop and ordered message processing.
//!
//! Every accepted connection gets exactly two cooperating tasks:
//!
//! ```text
//! socket ─► reader ─► bounded channel (256) ─► processor ─► handlers
//!                                                 │
//!                                    agent send path ─► socket
//! ```
//!
//! The reader accumulates socket bytes into a [`PacketBuffer`] and
//! forwards complete packets. The processor consumes them in FIFO order
//! and runs all user logic for the session, which is what serializes
//! handler invocations per connection. A full channel blocks the reader,
//! which stops reading the socket; TCP backpressure is the admission
//! control, and no packet is ever dropped silently.

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::WebSocketStream;

use crate::agent::{Agent, AgentStatus, StreamSink, WsSink};
use crate::cluster::{Cluster, RemoteKind};
use crate::error::MeshwireError;
use crate::handler::HandlerRegistry;
use crate::message::{Message, MessageRoute, MessageType, RouteDictionary};
use crate::protocol::{Packet, PacketBuffer, PacketType};
use crate::route::Route;
use crate::service::NetService;
use crate::session::SessionRef;

/// Unhandled packet buffer depth per connection.
pub(crate) const PACKET_BUFFER_SIZE: usize = 256;

/// Socket read chunk size.
const READ_BUFFER_SIZE: usize = 64 * 1024;

/// Routes packets from connections to handlers and remote nodes.
pub(crate) struct Dispatcher {
    registry: HandlerRegistry,
    net: Arc<NetService>,
    cluster: Option<Arc<dyn Cluster>>,
    dict: Arc<RouteDictionary>,
    server_type: String,
    heartbeat: Duration,
}

impl Dispatcher {
    pub(crate) fn new(
        registry: HandlerRegistry,
        net: Arc<NetService>,
        cluster: Option<Arc<dyn Cluster>>,
        dict: Arc<RouteDictionary>,
        server_type: String,
        heartbeat: Duration,
    ) -> Self {
        Self {
            registry,
            net,
            cluster,
            dict,
            server_type,
            heartbeat,
        }
    }

    pub(crate) fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    /// Run the client pipeline over a byte stream until it closes.
    pub(crate) async fn handle<S>(self: Arc<Self>, stream: S)
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (mut reader, writer) = tokio::io::split(stream);
        let agent = self.net.create_agent(Box::new(StreamSink::new(writer)));
        tracing::debug!(session = agent.session().id(), "new agent");

        let (tx, rx) = mpsc::channel(PACKET_BUFFER_SIZE);
        let processor = self.clone().spawn_processor(agent.clone(), rx);
        let mut closed = agent.closed_signal();
        let mut acc = PacketBuffer::new();
        let mut buf = vec![0u8; READ_BUFFER_SIZE];

        'read: loop {
            tokio::select! {
                _ = closed.changed() => break 'read,
                read = reader.read(&mut buf) => match read {
                    Ok(0) => break 'read,
                    Ok(n) => match acc.push(&buf[..n]) {
                        Ok(packets) => {
                            for packet in packets {
                                if tx.send(packet).await.is_err() {
                                    break 'read;
                                }
                            }
                        }
                        Err(e) => {
                            tracing::warn!(
                                session = agent.session().id(),
                                error = %e,
                                "framing error"
                            );
                            break 'read;
                        }
                    },
                    Err(e) => {
                        tracing::debug!(
                            session = agent.session().id(),
                            error = %e,
                            "socket read failed"
                        );
                        break 'read;
                    }
                },
            }
        }

        // Any buffered partial frame dies with the connection. The
        // processor drains packets already queued, then exits.
        drop(tx);
        let _ = processor.await;
        self.net.close_agent(&agent);
        tracing::debug!(session = agent.session().id(), "session ended");
    }

    /// Run the client pipeline over a WebSocket stream. Each binary frame
    /// feeds the same accumulator as the TCP path, so packets may span or
    /// share WebSocket frames.
    pub(crate) async fn handle_ws<S>(self: Arc<Self>, ws: WebSocketStream<S>)
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (sink, mut stream) = ws.split();
        let agent = self.net.create_agent(Box::new(WsSink::new(sink)));
        tracing::debug!(session = agent.session().id(), "new websocket agent");

        let (tx, rx) = mpsc::channel(PACKET_BUFFER_SIZE);
        let processor = self.clone().spawn_processor(agent.clone(), rx);
        let mut closed = agent.closed_signal();
        let mut acc = PacketBuffer::new();

        'read: loop {
            tokio::select! {
                _ = closed.changed() => break 'read,
                item = stream.next() => match item {
                    None | Some(Ok(WsMessage::Close(_))) => break 'read,
                    Some(Ok(WsMessage::Binary(data))) => match acc.push(&data) {
                        Ok(packets) => {
                            for packet in packets {
                                if tx.send(packet).await.is_err() {
                                    break 'read;
                                }
                            }
                        }
                        Err(e) => {
                            tracing::warn!(
                                session = agent.session().id(),
                                error = %e,
                                "framing error"
                            );
                            break 'read;
                        }
                    },
                    Some(Ok(WsMessage::Ping(_) | WsMessage::Pong(_))) => {}
                    Some(Ok(_)) => {
                        tracing::debug!(
                            session = agent.session().id(),
                            "non-binary websocket frame ignored"
                        );
                    }
                    Some(Err(e)) => {
                        tracing::debug!(
                            session = agent.session().id(),
                            error = %e,
                            "websocket read failed"
                        );
                        break 'read;
                    }
                },
            }
        }

        drop(tx);
        let _ = processor.await;
        self.net.close_agent(&agent);
        tracing::debug!(session = agent.session().id(), "websocket session ended");
    }

    /// Spawn the single processor task for one connection. All user logic
    /// for the session runs here, in arrival order.
    fn spawn_processor(
        self: Arc<Self>,
        agent: Arc<Agent>,
        mut rx: mpsc::Receiver<Packet>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(packet) = rx.recv().await {
                self.process_packet(&agent, packet).await;
            }
        })
    }

    pub(crate) async fn process_packet(&self, agent: &Arc<Agent>, packet: Packet) {
        agent.touch();

        match packet.kind {
            PacketType::Handshake => match agent.status() {
                // Duplicate handshake in the handshake state re-sends the
                // reply; the client may have missed it.
                AgentStatus::Start | AgentStatus::Handshake => {
                    agent.set_status(AgentStatus::Handshake);
                    self.send_handshake_reply(agent).await;
                }
                AgentStatus::Working => {
                    tracing::debug!(
                        session = agent.session().id(),
                        "duplicate handshake ignored"
                    );
                }
                AgentStatus::Closed => {}
            },
            PacketType::HandshakeAck => {
                if agent.status() == AgentStatus::Handshake {
                    agent.set_status(AgentStatus::Working);
                } else {
                    tracing::debug!(
                        session = agent.session().id(),
                        status = ?agent.status(),
                        "unexpected handshake ack"
                    );
                }
            }
            PacketType::Heartbeat => {
                if let Err(e) = agent
                    .send_packet(&Packet::empty(PacketType::Heartbeat))
                    .await
                {
                    tracing::debug!(
                        session = agent.session().id(),
                        error = %e,
                        "heartbeat reply dropped"
                    );
                }
            }
            PacketType::Data => {
                if agent.status() != AgentStatus::Working {
                    tracing::debug!(
                        session = agent.session().id(),
                        status = ?agent.status(),
                        "data packet outside working state dropped"
                    );
                    return;
                }
                match Message::decode(&packet.data) {
                    Ok(msg) => self.process_message(agent, msg).await,
                    Err(e) => {
                        // Desynchronized peer; no recovery possible.
                        tracing::warn!(
                            session = agent.session().id(),
                            error = %e,
                            "message decode failed"
                        );
                        self.net.close_agent(agent);
                    }
                }
            }
            PacketType::Kick => {
                tracing::debug!(session = agent.session().id(), "kick from peer");
                self.net.close_agent(agent);
            }
        }
    }

    async fn process_message(&self, agent: &Arc<Agent>, msg: Message) {
        let session = agent.session().clone();

        match msg.kind {
            MessageType::Request => session.set_last_id(msg.id),
            MessageType::Notify => session.set_last_id(0),
            other => {
                tracing::warn!(
                    session = session.id(),
                    kind = ?other,
                    "unexpected message kind from client"
                );
                return;
            }
        }

        let route_str = match &msg.route {
            Some(MessageRoute::Text(text)) => text.clone(),
            Some(MessageRoute::Code(code)) => match self.dict.route(*code) {
                Some(text) => text.to_string(),
                None => {
                    tracing::warn!(session = session.id(), code, "unknown route code");
                    let err = MeshwireError::BadRoute(format!("#{}", code));
                    self.reply_error(&session, &msg, &err).await;
                    return;
                }
            },
            None => {
                tracing::warn!(session = session.id(), "message without route");
                return;
            }
        };

        let mut route = match Route::parse(&route_str) {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(
                    session = session.id(),
                    route = %route_str,
                    error = %e,
                    "route decode failed"
                );
                self.reply_error(&session, &msg, &e).await;
                return;
            }
        };

        // Current server type is the default.
        if route.server_type.is_empty() {
            route.server_type = self.server_type.clone();
        }

        if route.server_type == self.server_type {
            self.local_process(&session, &route, &msg).await;
        } else {
            self.remote_process(&session, route, &msg).await;
        }
    }

    async fn local_process(&self, session: &SessionRef, route: &Route, msg: &Message) {
        let Some(method) = self.registry.lookup(&route.service, &route.method) else {
            tracing::info!(session = session.id(), route = %route, "handler not found");
            let err = MeshwireError::NotFound(route.to_string());
            self.reply_error(session, msg, &err).await;
            return;
        };

        // Recovery barrier: the invocation runs in its own task and is
        // awaited inline, so ordering holds and a panic terminates this
        // message only, never the connection.
        let invocation = method.call(session.clone(), msg.data.clone());
        match tokio::spawn(invocation).await {
            Ok(Ok(())) => {}
            Ok(Err(e @ MeshwireError::BadRequest(_))) => {
                tracing::error!(
                    session = session.id(),
                    route = %route,
                    error = %e,
                    "payload deserialize failed"
                );
                self.reply_error(session, msg, &e).await;
            }
            Ok(Err(e)) => {
                tracing::error!(session = session.id(), route = %route, error = %e, "handler error");
            }
            Err(e) => {
                tracing::error!(session = session.id(), route = %route, error = %e, "handler panicked");
                let err = MeshwireError::InternalError(e.to_string());
                self.reply_error(session, msg, &err).await;
            }
        }
    }

    async fn remote_process(&self, session: &SessionRef, route: Route, msg: &Message) {
        let Some(cluster) = &self.cluster else {
            tracing::warn!(
                session = session.id(),
                route = %route,
                "remote route without a cluster"
            );
            let err = MeshwireError::RemoteUnavailable("no cluster configured".into());
            self.reply_error(session, msg, &err).await;
            return;
        };

        let call = cluster.call(
            RemoteKind::Sys,
            route.clone(),
            session.snapshot(),
            msg.data.clone(),
        );
        match call.await {
            Ok(reply) => {
                if msg.kind == MessageType::Request {
                    if let Err(e) = session.response(reply).await {
                        tracing::debug!(session = session.id(), error = %e, "remote reply dropped");
                    }
                }
            }
            Err(e) => {
                tracing::error!(session = session.id(), route = %route, error = %e, "remote call failed");
                let err = MeshwireError::RemoteUnavailable(e.to_string());
                self.reply_error(session, msg, &err).await;
            }
        }
    }

    /// Reply with an error-kind response body; a no-op for notifies.
    async fn reply_error(&self, session: &SessionRef, msg: &Message, err: &MeshwireError) {
        if msg.kind != MessageType::Request {
            return;
        }
        let body = serde_json::to_vec(&serde_json::json!({ "code": err.code() }))
            .expect("error body serialization cannot fail");
        if let Err(e) = session.response(body).await {
            tracing::debug!(session = session.id(), error = %e, "error reply dropped");
        }
    }

    async fn send_handshake_reply(&self, agent: &Arc<Agent>) {
        let body = serde_json::json!({
            "code": 200,
            "sys": { "heartbeat": self.heartbeat.as_secs_f64() },
        });
        let data = serde_json::to_vec(&body).expect("handshake body serialization cannot fail");
        if let Err(e) = agent
            .send_packet(&Packet::new(PacketType::Handshake, data))
            .await
        {
            tracing::error!(session = agent.session().id(), error = %e, "handshake reply failed");
            self.net.close_agent(agent);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::testing::capture_agent;
    use crate::cluster::SessionSnapshot;
    use crate::handler::{BoxFuture, HandlerResult, Service};
    use crate::message::RouteDictionary;
    use bytes::Bytes;
    use serde::{Deserialize, Serialize};
    use std::sync::Mutex as StdMutex;

    #[derive(Serialize, Deserialize, Debug, PartialEq)]
    struct SayReq {
        text: String,
    }

    async fn boom(_session: SessionRef, _payload: Bytes) -> HandlerResult {
        panic!("handler exploded")
    }

    fn echo_service() -> Service {
        Service::new("echo")
            .method("say", |session: SessionRef, req: SayReq| async move {
                session.response(serde_json::to_vec(&req)?).await
            })
            .raw_method("boom", boom)
    }

    struct MockCluster {
        calls: Arc<StdMutex<Vec<(RemoteKind, Route, SessionSnapshot, Bytes)>>>,
        fail: bool,
    }

    impl Cluster for MockCluster {
        fn call(
            &self,
            kind: RemoteKind,
            route: Route,
            session: SessionSnapshot,
            payload: Bytes,
        ) -> BoxFuture<'static, crate::error::Result<Bytes>> {
            self.calls
                .lock()
                .unwrap()
                .push((kind, route, session, payload));
            let fail = self.fail;
            Box::pin(async move {
                if fail {
                    Err(MeshwireError::RemoteUnavailable("peer down".into()))
                } else {
                    Ok(Bytes::from_static(b"remote-reply"))
                }
            })
        }
    }

    struct Fixture {
        dispatcher: Arc<Dispatcher>,
        calls: Arc<StdMutex<Vec<(RemoteKind, Route, SessionSnapshot, Bytes)>>>,
    }

    fn fixture(remote_fails: bool) -> Fixture {
        let dict = Arc::new(RouteDictionary::new());
        let net = NetService::new(Duration::from_secs(30), dict.clone());
        let calls = Arc::new(StdMutex::new(Vec::new()));
        let cluster = MockCluster {
            calls: calls.clone(),
            fail: remote_fails,
        };

        let mut registry = HandlerRegistry::new();
        registry.register(echo_service()).unwrap();

        let dispatcher = Arc::new(Dispatcher::new(
            registry,
            net,
            Some(Arc::new(cluster)),
            dict,
            "connector".into(),
            Duration::from_secs(30),
        ));
        Fixture { dispatcher, calls }
    }

    fn working_agent() -> (Arc<Agent>, Arc<StdMutex<Vec<Bytes>>>) {
        let (agent, frames) = capture_agent(1);
        agent.set_status(AgentStatus::Working);
        (agent, frames)
    }

    fn data_packet(msg: &Message) -> Packet {
        Packet::new(
            PacketType::Data,
            msg.encode(&RouteDictionary::new()).unwrap(),
        )
    }

    fn decode_reply(frames: &StdMutex<Vec<Bytes>>, index: usize) -> Message {
        let frames = frames.lock().unwrap();
        let (packet, _) = Packet::unpack(&frames[index]).unwrap().unwrap();
        assert_eq!(packet.kind, PacketType::Data);
        Message::decode(&packet.data).unwrap()
    }

    #[tokio::test]
    async fn test_handshake_moves_to_handshake_and_replies() {
        let fx = fixture(false);
        let (agent, frames) = capture_agent(1);

        fx.dispatcher
            .process_packet(&agent, Packet::new(PacketType::Handshake, &b"{}"[..]))
            .await;

        assert_eq!(agent.status(), AgentStatus::Handshake);

        let frames = frames.lock().unwrap();
        let (packet, _) = Packet::unpack(&frames[0]).unwrap().unwrap();
        assert_eq!(packet.kind, PacketType::Handshake);

        let body: serde_json::Value = serde_json::from_slice(&packet.data).unwrap();
        assert_eq!(body["code"], 200);
        assert_eq!(body["sys"]["heartbeat"], 30.0);
    }

    #[tokio::test]
    async fn test_duplicate_handshake_resends_reply() {
        let fx = fixture(false);
        let (agent, frames) = capture_agent(1);

        let handshake = Packet::new(PacketType::Handshake, &b"{}"[..]);
        fx.dispatcher.process_packet(&agent, handshake.clone()).await;
        fx.dispatcher.process_packet(&agent, handshake).await;

        assert_eq!(agent.status(), AgentStatus::Handshake);
        assert_eq!(frames.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_handshake_in_working_is_ignored() {
        let fx = fixture(false);
        let (agent, frames) = working_agent();

        fx.dispatcher
            .process_packet(&agent, Packet::new(PacketType::Handshake, &b"{}"[..]))
            .await;

        assert_eq!(agent.status(), AgentStatus::Working);
        assert!(frames.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_handshake_ack_completes_handshake() {
        let fx = fixture(false);
        let (agent, _) = capture_agent(1);

        agent.set_status(AgentStatus::Handshake);
        fx.dispatcher
            .process_packet(&agent, Packet::empty(PacketType::HandshakeAck))
            .await;

        assert_eq!(agent.status(), AgentStatus::Working);
    }

    #[tokio::test]
    async fn test_handshake_ack_before_handshake_is_ignored() {
        let fx = fixture(false);
        let (agent, _) = capture_agent(1);

        fx.dispatcher
            .process_packet(&agent, Packet::empty(PacketType::HandshakeAck))
            .await;

        assert_eq!(agent.status(), AgentStatus::Start);
    }

    #[tokio::test]
    async fn test_heartbeat_gets_reply() {
        let fx = fixture(false);
        let (agent, frames) = working_agent();

        fx.dispatcher
            .process_packet(&agent, Packet::empty(PacketType::Heartbeat))
            .await;

        let frames = frames.lock().unwrap();
        let (packet, _) = Packet::unpack(&frames[0]).unwrap().unwrap();
        assert_eq!(packet.kind, PacketType::Heartbeat);
    }

    #[tokio::test]
    async fn test_data_outside_working_is_dropped() {
        let fx = fixture(false);
        let (agent, frames) = capture_agent(1);

        let msg = Message::request(1, "echo.say", &br#"{"text":"hi"}"#[..]);
        fx.dispatcher
            .process_packet(&agent, data_packet(&msg))
            .await;

        assert!(frames.lock().unwrap().is_empty());
        assert_eq!(agent.session().last_id(), 0);
    }

    #[tokio::test]
    async fn test_request_dispatches_and_echoes() {
        let fx = fixture(false);
        let (agent, frames) = working_agent();

        let msg = Message::request(7, "echo.say", &br#"{"text":"hi"}"#[..]);
        fx.dispatcher
            .process_packet(&agent, data_packet(&msg))
            .await;

        assert_eq!(agent.session().last_id(), 7);

        let reply = decode_reply(&frames, 0);
        assert_eq!(reply.kind, MessageType::Response);
        assert_eq!(reply.id, 7);
        let body: SayReq = serde_json::from_slice(&reply.data).unwrap();
        assert_eq!(body.text, "hi");
    }

    #[tokio::test]
    async fn test_unknown_route_replies_not_found() {
        let fx = fixture(false);
        let (agent, frames) = working_agent();

        let msg = Message::request(11, "nope.none", &b"{}"[..]);
        fx.dispatcher
            .process_packet(&agent, data_packet(&msg))
            .await;

        let reply = decode_reply(&frames, 0);
        assert_eq!(reply.id, 11);
        let body: serde_json::Value = serde_json::from_slice(&reply.data).unwrap();
        assert_eq!(body["code"], "NotFound");
    }

    #[tokio::test]
    async fn test_unknown_route_notify_is_dropped() {
        let fx = fixture(false);
        let (agent, frames) = working_agent();

        let msg = Message::notify("nope.none", &b"{}"[..]);
        fx.dispatcher
            .process_packet(&agent, data_packet(&msg))
            .await;

        assert!(frames.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_bad_payload_replies_bad_request() {
        let fx = fixture(false);
        let (agent, frames) = working_agent();

        let msg = Message::request(5, "echo.say", &b"not json"[..]);
        fx.dispatcher
            .process_packet(&agent, data_packet(&msg))
            .await;

        let reply = decode_reply(&frames, 0);
        assert_eq!(reply.id, 5);
        let body: serde_json::Value = serde_json::from_slice(&reply.data).unwrap();
        assert_eq!(body["code"], "BadRequest");
    }

    #[tokio::test]
    async fn test_handler_panic_replies_internal_error() {
        let fx = fixture(false);
        let (agent, frames) = working_agent();

        let msg = Message::request(9, "echo.boom", &b""[..]);
        fx.dispatcher
            .process_packet(&agent, data_packet(&msg))
            .await;

        let reply = decode_reply(&frames, 0);
        assert_eq!(reply.id, 9);
        let body: serde_json::Value = serde_json::from_slice(&reply.data).unwrap();
        assert_eq!(body["code"], "InternalError");
    }

    #[tokio::test]
    async fn test_panic_does_not_poison_later_messages() {
        let fx = fixture(false);
        let (agent, frames) = working_agent();

        fx.dispatcher
            .process_packet(&agent, data_packet(&Message::request(1, "echo.boom", &b""[..])))
            .await;
        fx.dispatcher
            .process_packet(
                &agent,
                data_packet(&Message::request(2, "echo.say", &br#"{"text":"ok"}"#[..])),
            )
            .await;

        let reply = decode_reply(&frames, 1);
        assert_eq!(reply.id, 2);
        let body: SayReq = serde_json::from_slice(&reply.data).unwrap();
        assert_eq!(body.text, "ok");
        assert!(!agent.is_closed());
    }

    #[tokio::test]
    async fn test_remote_route_calls_cluster() {
        let fx = fixture(false);
        let (agent, frames) = working_agent();
        agent.session().bind(77).unwrap();

        let msg = Message::request(3, "chat.room.join", &b"{}"[..]);
        fx.dispatcher
            .process_packet(&agent, data_packet(&msg))
            .await;

        {
            let calls = fx.calls.lock().unwrap();
            assert_eq!(calls.len(), 1);
            let (kind, route, snapshot, payload) = &calls[0];
            assert_eq!(*kind, RemoteKind::Sys);
            assert_eq!(route.to_string(), "chat.room.join");
            assert_eq!(snapshot.id, 1);
            assert_eq!(snapshot.uid, 77);
            assert_eq!(&payload[..], b"{}");
        }

        let reply = decode_reply(&frames, 0);
        assert_eq!(reply.kind, MessageType::Response);
        assert_eq!(reply.id, 3);
        assert_eq!(&reply.data[..], b"remote-reply");
    }

    #[tokio::test]
    async fn test_remote_failure_replies_remote_unavailable() {
        let fx = fixture(true);
        let (agent, frames) = working_agent();

        let msg = Message::request(4, "chat.room.join", &b"{}"[..]);
        fx.dispatcher
            .process_packet(&agent, data_packet(&msg))
            .await;

        let reply = decode_reply(&frames, 0);
        assert_eq!(reply.id, 4);
        let body: serde_json::Value = serde_json::from_slice(&reply.data).unwrap();
        assert_eq!(body["code"], "RemoteUnavailable");
    }

    #[tokio::test]
    async fn test_remote_notify_reply_is_discarded() {
        let fx = fixture(false);
        let (agent, frames) = working_agent();

        let msg = Message::notify("chat.room.leave", &b"{}"[..]);
        fx.dispatcher
            .process_packet(&agent, data_packet(&msg))
            .await;

        assert_eq!(fx.calls.lock().unwrap().len(), 1);
        assert!(frames.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_notify_resets_last_id() {
        let fx = fixture(false);
        let (agent, _) = working_agent();

        fx.dispatcher
            .process_packet(
                &agent,
                data_packet(&Message::request(8, "echo.say", &br#"{"text":"a"}"#[..])),
            )
            .await;
        assert_eq!(agent.session().last_id(), 8);

        fx.dispatcher
            .process_packet(
                &agent,
                data_packet(&Message::notify("echo.say", &br#"{"text":"b"}"#[..])),
            )
            .await;
        assert_eq!(agent.session().last_id(), 0);
    }

    #[tokio::test]
    async fn test_undecodable_message_closes_agent() {
        let fx = fixture(false);
        let (agent, _) = working_agent();

        // Zero-length data body is rejected as truncated.
        fx.dispatcher
            .process_packet(&agent, Packet::empty(PacketType::Data))
            .await;

        assert!(agent.is_closed());
    }

    #[tokio::test]
    async fn test_kick_from_peer_closes_agent() {
        let fx = fixture(false);
        let (agent, _) = working_agent();

        fx.dispatcher
            .process_packet(&agent, Packet::empty(PacketType::Kick))
            .await;

        assert!(agent.is_closed());
    }
}
