//! HTTP/2 RPC server.
//!
//! # Responsibilities
//! - Own the procedure registry, middleware chain and shutdown hook slot
//! - Bind the listener and serve each connection with hyper's HTTP/2 builder
//! - Route every stream through an Axum fallback handler into the dispatcher
//! - Stop accepting, drain and run the shutdown hook on close
//! - Treat a panicking call or a failed accept loop as fatal: reply 500 where a
//!   stream is waiting, then take the `close(true)` path
//!
//! # Per-call state machine
//! ```text
//! headers received → body accumulating → end-of-stream (dispatch) → responding
//! ```

use axum::{
    body::Body,
    extract::{Extension, State},
    http::{Request, StatusCode},
    response::{IntoResponse, Response},
    Router,
};
use futures_util::FutureExt;
use hyper::server::conn::http2;
use hyper_util::rt::{TokioExecutor, TokioIo, TokioTimer};
use hyper_util::service::TowerToHyperService;
use std::any::Any;
use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, watch, Mutex};
use tokio::task::JoinHandle;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::Instrument;
use uuid::Uuid;

use crate::config::{Http2Config, ServerConfig};
use crate::context::{Context, StreamHandle};
use crate::error::{Error, Result};
use crate::http::dispatch::Dispatcher;
use crate::http::handler::{Middleware, Procedure};
use crate::http::{request, response};
use crate::lifecycle::{termination_signal, Shutdown, ShutdownHook};
use crate::net::{ConnectionId, ConnectionTracker, Listener};
use crate::observability::metrics::{self, CallOutcome};

struct Running {
    local_addr: SocketAddr,
    accept_task: JoinHandle<()>,
}

struct Inner {
    config: ServerConfig,
    dispatcher: Arc<Dispatcher>,
    shutdown: Shutdown,
    tracker: ConnectionTracker,
    running: Mutex<Option<Running>>,
    signals_installed: AtomicBool,
    closed: watch::Sender<bool>,
}

/// An RPC server. Cheap to clone; clones share registry, chain and lifecycle.
#[derive(Clone)]
pub struct Server {
    inner: Arc<Inner>,
}

impl Default for Server {
    fn default() -> Self {
        Self::new(ServerConfig::default())
    }
}

impl Server {
    /// Create a server. Nothing is bound until [`Server::listen`].
    pub fn new(config: ServerConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                dispatcher: Arc::new(Dispatcher::new()),
                shutdown: Shutdown::new(),
                tracker: ConnectionTracker::new(),
                running: Mutex::new(None),
                signals_installed: AtomicBool::new(false),
                closed: watch::channel(false).0,
            }),
        }
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &ServerConfig {
        &self.inner.config
    }

    /// Register `procedure` under the routing key `/name`, replacing any previous one.
    pub fn attach(&self, name: &str, procedure: Procedure) {
        self.inner.dispatcher.attach(name, procedure);
    }

    /// Append `middleware` to the chain.
    pub fn use_middleware(&self, middleware: Middleware) {
        self.inner.dispatcher.use_middleware(middleware);
    }

    /// Remove every occurrence of `middleware` from the chain; the rest keep their order.
    pub fn unuse_middleware(&self, middleware: &Middleware) {
        self.inner.dispatcher.unuse_middleware(middleware);
    }

    /// Call a registered procedure in-process, bypassing transport and middleware.
    pub async fn procedure(&self, name: &str, ctx: &mut Context) -> bool {
        self.inner.dispatcher.invoke(name, ctx).await
    }

    /// Registered routing keys.
    pub fn routes(&self) -> Vec<String> {
        self.inner.dispatcher.routes()
    }

    /// Install, replace or (with `None`) clear the shutdown hook.
    pub fn graceful(&self, hook: Option<ShutdownHook>) {
        self.inner.shutdown.set_hook(hook);
    }

    /// Address the server is bound to, while listening.
    pub async fn local_addr(&self) -> Option<SocketAddr> {
        self.inner.running.lock().await.as_ref().map(|r| r.local_addr)
    }

    /// Whether the accept loop is running.
    pub async fn is_listening(&self) -> bool {
        self.inner
            .running
            .lock()
            .await
            .as_ref()
            .is_some_and(|r| !r.accept_task.is_finished())
    }

    /// Bind `host:port` from the config's listener section, overriding the port.
    ///
    /// Port 0 binds an ephemeral port. Returns the bound address.
    pub async fn listen(&self, port: u16) -> Result<SocketAddr> {
        let mut running = self.inner.running.lock().await;
        if running.as_ref().is_some_and(|r| !r.accept_task.is_finished()) {
            return Err(Error::Transport("server is already listening".into()));
        }

        let listener = Listener::bind(&self.inner.config.listener, port).await?;
        let local_addr = listener.local_addr()?;

        let app = Router::new()
            .fallback(dispatch_handler)
            .with_state(self.clone());

        let stop = self.inner.shutdown.subscribe();
        let server = self.clone();
        let accept_task = tokio::spawn(async move {
            if let Err(e) = server.accept_loop(listener, app, stop).await {
                server.fail(&format!("accept loop failed: {}", e));
            }
        });

        self.inner.closed.send_replace(false);
        tracing::info!(address = %local_addr, "RPC server listening");
        *running = Some(Running {
            local_addr,
            accept_task,
        });
        Ok(local_addr)
    }

    /// Listen on the configured port.
    pub async fn listen_default(&self) -> Result<SocketAddr> {
        self.listen(self.inner.config.listener.port).await
    }

    async fn accept_loop(
        &self,
        listener: Listener,
        app: Router,
        mut stop: broadcast::Receiver<()>,
    ) -> Result<()> {
        let builder = http2_builder(&self.inner.config.http2);
        loop {
            let accepted = tokio::select! {
                accepted = listener.accept() => accepted,
                _ = stop.recv() => {
                    tracing::info!("Listener closed");
                    return Ok(());
                }
            };
            let (stream, peer, permit) = accepted?;

            let guard = self.inner.tracker.track();
            let connection_id = guard.id();
            let service = TowerToHyperService::new(
                app.clone().layer(
                    ServiceBuilder::new()
                        .layer(TraceLayer::new_for_http())
                        .layer(Extension(connection_id)),
                ),
            );
            let builder = builder.clone();
            let mut conn_stop = self.inner.shutdown.subscribe();

            tokio::spawn(async move {
                let _permit = permit;
                let _guard = guard;
                let conn = builder.serve_connection(TokioIo::new(stream), service);
                tokio::pin!(conn);

                let result = tokio::select! {
                    res = conn.as_mut() => res,
                    _ = conn_stop.recv() => {
                        tracing::debug!(connection_id = %connection_id, "Draining connection");
                        conn.as_mut().graceful_shutdown();
                        conn.as_mut().await
                    }
                };
                if let Err(e) = result {
                    tracing::debug!(connection_id = %connection_id, peer = %peer, error = %e, "Connection ended with error");
                }
            });
        }
    }

    /// Stop accepting, drain open connections and release the port.
    ///
    /// With `run_hook`, the installed shutdown hook runs first; running it empties the slot.
    pub async fn close(&self, run_hook: bool) -> Result<()> {
        if run_hook {
            self.inner.shutdown.run_hook();
        }
        self.inner.shutdown.trigger();

        let running = self.inner.running.lock().await.take();
        if let Some(running) = running {
            if let Err(e) = running.accept_task.await {
                tracing::warn!(error = %e, "Accept task did not exit cleanly");
            }
        }

        let drain = Duration::from_secs(self.inner.config.shutdown.drain_timeout_secs);
        if !self.inner.tracker.wait_idle(drain).await {
            tracing::warn!(
                remaining = self.inner.tracker.active_count(),
                "Drain timeout elapsed with connections still open"
            );
        }
        self.inner.closed.send_replace(true);
        tracing::info!("RPC server closed");
        Ok(())
    }

    /// Uncaught failure: log it and close with the hook, off the failing task.
    ///
    /// `close` joins the accept task, so it must not run on that task.
    fn fail(&self, reason: &str) {
        tracing::error!(reason, "Fatal server failure, shutting down");
        let server = self.clone();
        tokio::spawn(async move {
            if let Err(e) = server.close(true).await {
                tracing::error!(error = %e, "Shutdown failed");
            }
        });
    }

    /// Route termination signals to `close(true)`. Only the first call installs anything.
    pub fn install_signal_handlers(&self) {
        if self.inner.signals_installed.swap(true, Ordering::SeqCst) {
            return;
        }
        let server = self.clone();
        tokio::spawn(async move {
            match termination_signal().await {
                Ok(_) => {
                    if let Err(e) = server.close(true).await {
                        tracing::error!(error = %e, "Shutdown failed");
                    }
                }
                Err(e) => tracing::error!(error = %e, "Failed to install signal handlers"),
            }
        });
    }

    /// Resolve once `close` has finished.
    pub async fn closed(&self) {
        let mut rx = self.inner.closed.subscribe();
        let _ = rx.wait_for(|closed| *closed).await;
    }
}

fn http2_builder(config: &Http2Config) -> http2::Builder<TokioExecutor> {
    let mut builder = http2::Builder::new(TokioExecutor::new());
    builder
        .timer(TokioTimer::new())
        .initial_stream_window_size(config.initial_stream_window_size)
        .initial_connection_window_size(config.initial_connection_window_size);
    if let Some(max) = config.max_concurrent_streams {
        builder.max_concurrent_streams(max);
    }
    if let Some(secs) = config.keep_alive_interval_secs {
        builder.keep_alive_interval(Duration::from_secs(secs));
    }
    builder
}

/// Every stream lands here, whatever its path.
async fn dispatch_handler(
    State(server): State<Server>,
    Extension(connection_id): Extension<ConnectionId>,
    request: Request<Body>,
) -> Response {
    let start = Instant::now();
    let stream = StreamHandle {
        connection: connection_id.as_u64(),
        call: Uuid::new_v4(),
    };
    let span = tracing::debug_span!(
        "rpc_call",
        call_id = %stream.call,
        connection_id = %connection_id,
        method = %request.method(),
        path = %request.uri().path(),
    );

    async move {
        let mut ctx = match request::read_context(request, stream).await {
            Ok(ctx) => ctx,
            Err(e) => {
                tracing::warn!(error = %e, "Request stream failed before end-of-stream");
                return StatusCode::BAD_REQUEST.into_response();
            }
        };

        let dispatched = AssertUnwindSafe(server.inner.dispatcher.dispatch(&mut ctx))
            .catch_unwind()
            .await;
        let outcome = match dispatched {
            Ok(outcome) => outcome,
            Err(panic) => {
                metrics::record_call(ctx.routing_key(), CallOutcome::Failed, start);
                server.fail(&format!("call panicked: {}", panic_message(panic.as_ref())));
                return StatusCode::INTERNAL_SERVER_ERROR.into_response();
            }
        };
        metrics::record_call(ctx.routing_key(), outcome, start);
        tracing::debug!(?outcome, elapsed = ?start.elapsed(), "Call dispatched");

        match response::compose(&ctx) {
            Ok(response) => response,
            Err(e) => {
                tracing::error!(error = %e, "Failed to compose response");
                (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
            }
        }
    }
    .instrument(span)
    .await
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s
    } else {
        "non-string panic payload"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn local_server() -> Server {
        let mut config = ServerConfig::default();
        config.listener.host = "127.0.0.1".into();
        config.shutdown.drain_timeout_secs = 1;
        Server::new(config)
    }

    #[tokio::test]
    async fn fail_runs_hook_and_completes_close() {
        let server = local_server();
        let runs = Arc::new(AtomicUsize::new(0));
        let r = runs.clone();
        server.graceful(Some(Box::new(move || {
            r.fetch_add(1, Ordering::SeqCst);
        })));
        server.listen(0).await.unwrap();

        server.fail("test failure");

        tokio::time::timeout(Duration::from_secs(5), server.closed())
            .await
            .expect("fail should finish closing the server");
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert!(!server.is_listening().await);
        assert!(server.local_addr().await.is_none());
    }

    #[test]
    fn panic_message_reads_str_and_string() {
        let s: Box<dyn Any + Send> = Box::new("static");
        assert_eq!(panic_message(s.as_ref()), "static");
        let owned: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(owned.as_ref()), "owned");
        let other: Box<dyn Any + Send> = Box::new(7u8);
        assert_eq!(panic_message(other.as_ref()), "non-string panic payload");
    }

    #[tokio::test]
    async fn http2_builder_accepts_defaults_and_overrides() {
        let mut config = Http2Config::default();
        let _ = http2_builder(&config);
        config.max_concurrent_streams = Some(8);
        config.keep_alive_interval_secs = Some(10);
        let _ = http2_builder(&config);
    }
}
