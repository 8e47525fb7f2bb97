//! Shared utilities for integration tests.

use std::net::SocketAddr;
use std::time::Duration;
use tinyrpc::config::ServerConfig;
use tinyrpc::{Procedure, Server, ServiceDescriptor};

/// Start a server on an ephemeral localhost port with the `hi` and `testPost` procedures.
pub async fn start_test_server() -> (Server, SocketAddr) {
    let mut config = ServerConfig::default();
    config.listener.host = "127.0.0.1".into();
    config.shutdown.drain_timeout_secs = 2;

    let server = Server::new(config);
    server.attach("hi", Procedure::sync(|ctx| ctx.response.body = "Hi!".into()));
    server.attach(
        "testPost",
        Procedure::new(|ctx| {
            Box::pin(async move {
                tokio::task::yield_now().await;
                ctx.response.body = ctx.request.body.clone();
            })
        }),
    );

    let addr = server.listen(0).await.expect("server should bind");
    (server, addr)
}

/// Descriptor pointing at `addr`.
pub fn descriptor_for(addr: SocketAddr) -> ServiceDescriptor {
    ServiceDescriptor {
        name: "testService".into(),
        endpoint: "http://127.0.0.1".into(),
        version: "1.0.0".into(),
        port: addr.port().to_string(),
        procedures: vec!["hi".into(), "testPost".into()],
    }
}

/// Poll `check` until it holds or `timeout` passes.
#[allow(dead_code)]
pub async fn eventually<F>(timeout: Duration, mut check: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}
