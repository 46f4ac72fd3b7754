//! HTTP retrieval endpoint for reading pastes back.
//!
//! Serves `GET /<key>` with the stored body as plain text, or 404 when
//! the key is unknown. Only the final path segment is consulted, so
//! `/paste/<key>` and `/<key>/` resolve the same way. Every connection
//! carries a header-read timeout, an overall deadline, and a bounded
//! drain once the deadline passes.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::header::{self, HeaderValue};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::{TokioIo, TokioTimer};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, trace};

use crate::store::PasteStore;

/// How long a client may take to send the request head
const HEADER_READ_TIMEOUT: Duration = Duration::from_secs(2);

/// Upper bound on the buffered request head
const MAX_HEAD_BYTES: usize = 1024 * 1024;

/// A connection is shut down once it has been open this long
const CONNECTION_DEADLINE: Duration = Duration::from_secs(120);

/// Extra time granted past the deadline for an in-flight response to flush
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// Retrieval server instance
pub struct HttpServer {
    listener: TcpListener,
    store: Arc<PasteStore>,
}

impl HttpServer {
    /// Bind the retrieval listener
    pub async fn bind(addr: &str, store: Arc<PasteStore>) -> std::io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        info!(address = %listener.local_addr()?, "Paste retrieval listening");

        Ok(Self { listener, store })
    }

    /// Address the listener is bound to
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept and serve connections until the process exits
    pub async fn run(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        loop {
            match self.listener.accept().await {
                Ok((stream, addr)) => {
                    debug!(peer = %addr, "New retrieval connection");

                    let store = Arc::clone(&self.store);
                    tokio::spawn(serve_connection(stream, store));
                }
                Err(e) => {
                    error!(error = %e, "Failed to accept connection");
                }
            }
        }
    }
}

/// Drive one HTTP/1.1 connection to completion under the timeout policy.
async fn serve_connection(stream: TcpStream, store: Arc<PasteStore>) {
    let io = TokioIo::new(stream);
    let service = service_fn(move |req: Request<Incoming>| {
        let store = Arc::clone(&store);
        async move { Ok::<_, Infallible>(respond(&store, req.uri().path())) }
    });

    let conn = http1::Builder::new()
        .timer(TokioTimer::new())
        .header_read_timeout(HEADER_READ_TIMEOUT)
        .max_buf_size(MAX_HEAD_BYTES)
        .serve_connection(io, service);
    tokio::pin!(conn);

    match tokio::time::timeout(CONNECTION_DEADLINE, conn.as_mut()).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => debug!(error = %e, "Connection error"),
        Err(_) => {
            // Deadline reached: take no further requests, let the
            // in-flight response flush
            conn.as_mut().graceful_shutdown();
            match tokio::time::timeout(SHUTDOWN_GRACE, conn.as_mut()).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => debug!(error = %e, "Connection error during drain"),
                Err(_) => debug!("Connection exceeded drain deadline"),
            }
        }
    }
}

/// Produce the response for one request path.
fn respond(store: &PasteStore, path: &str) -> Response<Full<Bytes>> {
    let key = final_segment(path);
    match store.get(key) {
        Some(body) => {
            let mut response = Response::new(Full::new(body));
            response.headers_mut().insert(
                header::CONTENT_TYPE,
                HeaderValue::from_static("text/plain; charset=utf-8"),
            );
            response
        }
        None => {
            trace!(key, "Paste miss");
            let mut response = Response::new(Full::new(Bytes::new()));
            *response.status_mut() = StatusCode::NOT_FOUND;
            response
        }
    }
}

/// Final path segment with trailing slashes removed.
fn final_segment(path: &str) -> &str {
    path.trim_end_matches('/').rsplit('/').next().unwrap_or("")
}
