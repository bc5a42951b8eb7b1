//! Server: configuration, construction and lifecycle.
//!
//! A [`Server`] threads the node configuration, handler registry, net
//! service and cluster collaborator through the dispatcher; there are no
//! process-wide singletons. Build one with [`ServerBuilder`], call
//! [`Server::startup`], feed it connections (directly via
//! [`Server::handle`] / [`Server::handle_ws`], or with the
//! [`Server::serve`] accept loop), and call [`Server::shutdown`] when the
//! bootstrapper decides to stop.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_tungstenite::WebSocketStream;

use crate::cluster::{Cluster, RemoteHandler};
use crate::dispatch::Dispatcher;
use crate::error::Result;
use crate::handler::{HandlerRegistry, Service};
use crate::message::RouteDictionary;
use crate::service::NetService;

/// Node configuration consumed by the core.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// This node's server type, the default target for two-part routes.
    pub server_type: String,
    /// Expected client heartbeat interval. The sweeper closes agents
    /// silent for more than twice this.
    pub heartbeat: Duration,
    /// Frontend nodes run the client pipeline for inbound connections;
    /// backend nodes hand them to the peer handler.
    pub frontend: bool,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            server_type: "connector".to_string(),
            heartbeat: Duration::from_secs(30),
            frontend: true,
        }
    }
}

/// Builder for configuring and creating a [`Server`].
pub struct ServerBuilder {
    config: NodeConfig,
    registry: HandlerRegistry,
    cluster: Option<Arc<dyn Cluster>>,
    remote: Option<Arc<dyn RemoteHandler>>,
    dict: RouteDictionary,
}

impl ServerBuilder {
    /// Start building a server with the given configuration.
    pub fn new(config: NodeConfig) -> Self {
        Self {
            config,
            registry: HandlerRegistry::new(),
            cluster: None,
            remote: None,
            dict: RouteDictionary::new(),
        }
    }

    /// Register a handler component.
    ///
    /// # Errors
    ///
    /// Registration errors are fatal at startup; a misconfigured handler
    /// set must prevent the node from starting.
    pub fn service(mut self, service: Service) -> Result<Self> {
        self.registry.register(service)?;
        Ok(self)
    }

    /// Attach the cluster collaborator used for remote routes.
    pub fn cluster(mut self, cluster: Arc<dyn Cluster>) -> Self {
        self.cluster = Some(cluster);
        self
    }

    /// Attach the peer-connection handler used by backend nodes.
    pub fn remote_handler(mut self, remote: Arc<dyn RemoteHandler>) -> Self {
        self.remote = Some(remote);
        self
    }

    /// Install the route dictionary for compact route codes.
    pub fn route_dictionary(mut self, dict: RouteDictionary) -> Self {
        self.dict = dict;
        self
    }

    /// Build the server.
    pub fn build(self) -> Server {
        let dict = Arc::new(self.dict);
        let net = NetService::new(self.config.heartbeat, dict.clone());
        let dispatcher = Arc::new(Dispatcher::new(
            self.registry,
            net.clone(),
            self.cluster,
            dict,
            self.config.server_type.clone(),
            self.config.heartbeat,
        ));
        Server {
            dispatcher,
            net,
            config: self.config,
            remote: self.remote,
            sweeper: Mutex::new(None),
        }
    }
}

/// The session-and-dispatch core of one node.
pub struct Server {
    dispatcher: Arc<Dispatcher>,
    net: Arc<NetService>,
    config: NodeConfig,
    remote: Option<Arc<dyn RemoteHandler>>,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl Server {
    /// Start building a server.
    pub fn builder(config: NodeConfig) -> ServerBuilder {
        ServerBuilder::new(config)
    }

    /// Node configuration.
    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    /// The agent registry, exposed for operational tooling.
    pub fn net(&self) -> &Arc<NetService> {
        &self.net
    }

    /// Freeze the registry and spawn the heartbeat sweeper.
    pub fn startup(&self) {
        self.dispatcher.registry().dump();
        let mut sweeper = self.sweeper.lock().expect("sweeper lock poisoned");
        if sweeper.is_none() {
            *sweeper = Some(self.net.spawn_sweeper());
        }
        tracing::info!(
            server_type = %self.config.server_type,
            heartbeat = ?self.config.heartbeat,
            frontend = self.config.frontend,
            "meshwire core started"
        );
    }

    /// Stop the sweeper and close every agent.
    pub fn shutdown(&self) {
        if let Some(sweeper) = self
            .sweeper
            .lock()
            .expect("sweeper lock poisoned")
            .take()
        {
            sweeper.abort();
        }
        self.net.close_all();
        tracing::info!("meshwire core stopped");
    }

    /// Run the client pipeline on one byte stream (TCP or any in-memory
    /// transport). Returns when the connection ends.
    pub async fn handle<S>(&self, stream: S)
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        self.dispatcher.clone().handle(stream).await;
    }

    /// Run the client pipeline on an accepted WebSocket stream.
    pub async fn handle_ws<S>(&self, ws: WebSocketStream<S>)
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        self.dispatcher.clone().handle_ws(ws).await;
    }

    /// Accept loop: run every inbound connection through the client
    /// pipeline (frontend) or the peer handler (backend).
    ///
    /// Returns only when `accept` fails fatally. Shutdown is driven
    /// externally by dropping this future and calling
    /// [`Server::shutdown`].
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        tracing::info!(addr = ?listener.local_addr()?, "listening");
        loop {
            let (stream, peer) = listener.accept().await?;
            tracing::debug!(?peer, "inbound connection");

            if self.config.frontend {
                let dispatcher = self.dispatcher.clone();
                tokio::spawn(dispatcher.handle(stream));
            } else if let Some(remote) = &self.remote {
                remote.handle(stream);
            } else {
                tracing::warn!(?peer, "backend node without a peer handler, dropping");
            }
        }
    }
}
