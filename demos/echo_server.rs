//! Minimal frontend node with an echo service.
//!
//! Run with `cargo run --example echo_server`, then drive it with any
//! client speaking the packet protocol on port 3250.

use serde::{Deserialize, Serialize};

use meshwire::{NodeConfig, Server, Service, SessionRef};

#[derive(Serialize, Deserialize)]
struct SayReq {
    text: String,
}

#[tokio::main]
async fn main() -> meshwire::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "meshwire=debug".into()),
        )
        .init();

    let server = Server::builder(NodeConfig::default())
        .service(
            Service::new("echo")
                .method("say", |session: SessionRef, req: SayReq| async move {
                    session.response(serde_json::to_vec(&req)?).await
                })
                .raw_method("quit", |session: SessionRef, _payload| async move {
                    session.kick().await
                }),
        )?
        .build();

    server.startup();

    let listener = tokio::net::TcpListener::bind("127.0.0.1:3250").await?;
    let result = server.serve(listener).await;
    server.shutdown();
    result
}
