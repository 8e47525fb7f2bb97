//! Client side: one persistent HTTP/2 connection to a described service.
//!
//! # Responsibilities
//! - Resolve the service descriptor (file or inline, `{ENV}` placeholders)
//! - Open a single prior-knowledge HTTP/2 connection to `endpoint:port`
//! - Turn `procedure(name, data, headers)` into one stream and aggregate the reply
//!
//! # Design Decisions
//! - Every task hyper spawns for the connection goes through [`ConnectionTasks`],
//!   so `close` can tear the whole connection down, h2 task included
//! - Calls in flight when the connection is closed or dies fail with a transport error
//! - No retries and no timeouts at this layer

use axum::http::{HeaderName, HeaderValue, Method, Request};
use bytes::{Bytes, BytesMut};
use http_body_util::{BodyExt, Full};
use hyper::client::conn::http2::{self, SendRequest};
use hyper::rt::Executor;
use hyper_util::rt::TokioIo;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::net::TcpStream;
use tokio::task::{AbortHandle, JoinHandle};
use url::Url;

use crate::config::{DescriptorSource, ServiceDescriptor};
use crate::context::{Context, HeaderSet, DEFAULT_CONTENT_TYPE};
use crate::error::{Error, Result};
use crate::http::dispatch::route_key;
use crate::observability::metrics;

/// Where to connect, derived from a resolved descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub scheme: String,
    pub host: String,
    pub port: u16,
}

impl Target {
    /// `endpoint` gives scheme and host; a non-empty descriptor `port` wins over the URL's.
    pub fn from_descriptor(descriptor: &ServiceDescriptor) -> Result<Self> {
        let endpoint = if descriptor.endpoint.contains("://") {
            descriptor.endpoint.clone()
        } else {
            format!("http://{}", descriptor.endpoint)
        };
        let url = Url::parse(&endpoint)
            .map_err(|e| Error::InvalidInterface(format!("endpoint '{}': {}", descriptor.endpoint, e)))?;

        if url.scheme() != "http" {
            return Err(Error::InvalidInterface(format!(
                "unsupported scheme '{}'; only plaintext http is spoken",
                url.scheme()
            )));
        }
        let host = url
            .host_str()
            .ok_or_else(|| Error::InvalidInterface(format!("endpoint '{}' has no host", descriptor.endpoint)))?
            .to_string();

        let port = match descriptor.port.trim() {
            "" => url.port_or_known_default().unwrap_or(80),
            p => p
                .parse()
                .map_err(|_| Error::InvalidInterface(format!("invalid port '{}'", descriptor.port)))?,
        };

        Ok(Self {
            scheme: url.scheme().to_string(),
            host,
            port,
        })
    }

    /// `host:port`, bracketing IPv6 literals.
    pub fn authority(&self) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

/// Tokio executor that remembers what it spawned.
///
/// hyper runs the h2 connection and each request on tasks of their own;
/// aborting them all drops the socket and fails every pending stream.
#[derive(Debug, Clone, Default)]
pub struct ConnectionTasks {
    handles: Arc<Mutex<Vec<AbortHandle>>>,
}

impl ConnectionTasks {
    /// Abort every task spawned so far.
    pub fn abort_all(&self) {
        for handle in self.handles.lock().unwrap_or_else(PoisonError::into_inner).iter() {
            handle.abort();
        }
    }

    /// Whether every spawned task has finished.
    pub fn all_finished(&self) -> bool {
        self.handles
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .all(AbortHandle::is_finished)
    }
}

impl<F> Executor<F> for ConnectionTasks
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    fn execute(&self, fut: F) {
        let handle = tokio::spawn(fut).abort_handle();
        let mut handles = self.handles.lock().unwrap_or_else(PoisonError::into_inner);
        handles.retain(|h| !h.is_finished());
        handles.push(handle);
    }
}

/// A connection to one remote service.
pub struct Client {
    descriptor: ServiceDescriptor,
    target: Target,
    sender: Mutex<Option<SendRequest<Full<Bytes>>>>,
    driver: JoinHandle<()>,
    tasks: ConnectionTasks,
    closed: Arc<AtomicBool>,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("service", &self.descriptor.name)
            .field("target", &self.target)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

impl Client {
    /// Resolve `source` and open the connection.
    pub async fn connect(source: impl Into<DescriptorSource>) -> Result<Self> {
        let descriptor = source.into().resolve()?;
        Self::connect_resolved(descriptor).await
    }

    /// Open a connection for an already-resolved descriptor.
    pub async fn connect_resolved(descriptor: ServiceDescriptor) -> Result<Self> {
        let target = Target::from_descriptor(&descriptor)?;
        let authority = target.authority();

        let stream = TcpStream::connect(&authority).await?;
        let tasks = ConnectionTasks::default();
        let (sender, connection) = http2::handshake(tasks.clone(), TokioIo::new(stream)).await?;

        let closed = Arc::new(AtomicBool::new(false));
        let driver_closed = closed.clone();
        let service = descriptor.name.clone();
        let driver = tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::warn!(service = %service, error = %e, "Connection error");
            }
            driver_closed.store(true, Ordering::SeqCst);
            tracing::debug!(service = %service, "Connection torn down");
        });

        tracing::info!(
            service = %descriptor.name,
            version = %descriptor.version,
            address = %authority,
            "Connected"
        );

        Ok(Self {
            descriptor,
            target,
            sender: Mutex::new(Some(sender)),
            driver,
            tasks,
            closed,
        })
    }

    /// The resolved descriptor.
    pub fn service_info(&self) -> &ServiceDescriptor {
        &self.descriptor
    }

    /// Copy of the descriptor's procedure names.
    pub fn available_procedures(&self) -> Vec<String> {
        self.descriptor.procedures.clone()
    }

    fn sender(&self) -> Option<SendRequest<Full<Bytes>>> {
        self.sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Call `name` on the remote service.
    ///
    /// The method is GET, or POST when `data` is given, unless `headers` carries a
    /// `:method`. Other pseudo-headers in `headers` are ignored; the rest are sent as is.
    pub async fn procedure(
        &self,
        name: &str,
        data: Option<&str>,
        headers: &[(&str, &str)],
    ) -> Result<Context> {
        let result = self.call(name, data, headers).await;
        metrics::record_client_call(name, result.is_ok());
        result
    }

    async fn call(&self, name: &str, data: Option<&str>, headers: &[(&str, &str)]) -> Result<Context> {
        let mut sender = self.sender().ok_or(Error::Closed)?;
        let request = self.build_request(name, data, headers)?;

        let mut ctx = Context::default();
        ctx.request.headers = HeaderSet::from_request(
            request.method().as_str(),
            request.uri().path_and_query().map(|pq| pq.as_str()),
            request.headers(),
        );
        ctx.request.body = data.unwrap_or_default().to_string();

        sender.ready().await?;
        let response = sender.send_request(request).await?;

        let (parts, mut body) = response.into_parts();
        ctx.response.headers = HeaderSet::from_response(parts.status, &parts.headers);

        let mut buf = BytesMut::new();
        while let Some(frame) = body.frame().await {
            if let Ok(data) = frame?.into_data() {
                buf.extend_from_slice(&data);
            }
        }
        ctx.response.body = String::from_utf8_lossy(&buf).into_owned();

        tracing::debug!(
            procedure = name,
            status = parts.status.as_u16(),
            len = buf.len(),
            "Call completed"
        );
        Ok(ctx)
    }

    fn build_request(
        &self,
        name: &str,
        data: Option<&str>,
        headers: &[(&str, &str)],
    ) -> Result<Request<Full<Bytes>>> {
        let mut method = if data.is_some() { Method::POST } else { Method::GET };
        let uri = format!("{}://{}{}", self.target.scheme, self.target.authority(), route_key(name));

        let mut builder = Request::builder()
            .uri(uri)
            .header(axum::http::header::CONTENT_TYPE, DEFAULT_CONTENT_TYPE);

        for (key, value) in headers {
            match key.strip_prefix(':') {
                Some("method") => {
                    method = Method::from_bytes(value.as_bytes())
                        .map_err(|e| Error::Transport(format!("invalid method '{}': {}", value, e)))?;
                }
                Some(pseudo) => {
                    tracing::debug!(header = pseudo, "Ignoring pseudo-header override");
                }
                None => {
                    let name = HeaderName::from_bytes(key.to_ascii_lowercase().as_bytes())
                        .map_err(|e| Error::Transport(format!("invalid header '{}': {}", key, e)))?;
                    let value = HeaderValue::from_str(value)
                        .map_err(|e| Error::Transport(format!("invalid value for '{}': {}", key, e)))?;
                    if let Some(map) = builder.headers_mut() {
                        map.insert(name, value);
                    }
                }
            }
        }

        let body = Full::new(Bytes::from(data.unwrap_or_default().to_owned()));
        builder
            .method(method)
            .body(body)
            .map_err(|e| Error::Transport(e.to_string()))
    }

    /// Close and destroy the connection. Does nothing if already closed.
    ///
    /// Calls still in flight fail with [`Error::Transport`].
    pub fn close(&self) {
        let sender = self
            .sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if sender.is_none() {
            return;
        }
        drop(sender);
        self.closed.store(true, Ordering::SeqCst);
        self.tasks.abort_all();
        self.driver.abort();
        tracing::debug!(service = %self.descriptor.name, "Client closed");
    }

    /// Whether the client no longer accepts calls.
    pub fn is_closed(&self) -> bool {
        if self.closed.load(Ordering::SeqCst) {
            return true;
        }
        self.sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map_or(true, |s| s.is_closed())
    }

    /// Whether the underlying connection has been torn down.
    pub fn is_destroyed(&self) -> bool {
        self.driver.is_finished() && self.tasks.all_finished()
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.tasks.abort_all();
        self.driver.abort();
    }
}
