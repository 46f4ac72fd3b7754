//! TCP ingestion endpoint for submitting pastes.
//!
//! Speaks no framing at all: a client (typically netcat) connects, writes
//! the paste body, and half-closes. Everything received up to EOF is the
//! body. The server writes back a single reply line and closes.

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tracing::{debug, error, info};

use crate::store::PasteStore;

/// Maximum number of concurrent connections
const MAX_CONNECTIONS: usize = 10000;

/// Largest paste body accepted, in bytes
pub const MAX_PASTE_SIZE: usize = 2 * 1024 * 1024;

/// Read chunk size
const READ_CHUNK_SIZE: usize = 1024 * 50;

/// Reply for a body that exceeds [`MAX_PASTE_SIZE`]
const REPLY_TOO_LARGE: &[u8] = b"Input too large\n";

/// Reply for an empty or all-whitespace body. Deliberately has no
/// trailing newline.
const REPLY_BLANK: &[u8] = b"Don't send empty spaces!";

/// Ingestion server instance
pub struct TcpServer {
    listener: TcpListener,
    store: Arc<PasteStore>,
    connection_limit: Arc<Semaphore>,
}

impl TcpServer {
    /// Bind the ingestion listener
    pub async fn bind(addr: &str, store: Arc<PasteStore>) -> std::io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        info!(address = %listener.local_addr()?, "Paste ingestion listening");

        Ok(Self {
            listener,
            store,
            connection_limit: Arc::new(Semaphore::new(MAX_CONNECTIONS)),
        })
    }

    /// Address the listener is bound to
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept and serve connections until the process exits
    pub async fn run(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        loop {
            // Wait for a connection slot
            let permit = self.connection_limit.clone().acquire_owned().await?;

            match self.listener.accept().await {
                Ok((stream, addr)) => {
                    debug!(peer = %addr, "New paste connection");

                    let store = Arc::clone(&self.store);

                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, store).await {
                            debug!(error = %e, "Connection error");
                        }
                        drop(permit);
                    });
                }
                Err(e) => {
                    error!(error = %e, "Failed to accept connection");
                }
            }
        }
    }
}

/// Handle a single paste submission.
///
/// Reads the body in chunks until EOF, then either stores it and replies
/// `key is <key>\n`, or rejects it with one error line. At most one reply
/// is ever written; a failed read abandons the connection with no reply.
async fn handle_connection<S>(
    mut stream: S,
    store: Arc<PasteStore>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut body = BytesMut::new();
    let mut chunk = vec![0u8; READ_CHUNK_SIZE];

    loop {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            // Client finished sending
            break;
        }

        // The chunk that crosses the cap is never buffered
        if body.len() + n > MAX_PASTE_SIZE {
            debug!(limit = MAX_PASTE_SIZE, "Rejecting oversized paste");
            stream.write_all(REPLY_TOO_LARGE).await?;
            return Ok(());
        }
        body.extend_from_slice(&chunk[..n]);
    }

    // Blank check only; the stored body keeps its whitespace
    if is_blank(&body) {
        debug!("Rejecting blank paste");
        stream.write_all(REPLY_BLANK).await?;
        return Ok(());
    }

    let key = store.set(body.freeze());
    stream.write_all(format!("key is {key}\n").as_bytes()).await?;

    Ok(())
}

/// Whether a body is empty or entirely whitespace. Bodies that are not
/// valid UTF-8 always count as content.
fn is_blank(body: &[u8]) -> bool {
    std::str::from_utf8(body)
        .map(|s| s.trim().is_empty())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keygen::KEY_LENGTH;
    use bytes::Bytes;
    use tokio::io::duplex;
    use tokio_test::assert_ok;

    #[tokio::test]
    async fn test_paste_round_trip() {
        let store = PasteStore::new();
        let (mut client, server) = duplex(64 * 1024);
        let handler = tokio::spawn(handle_connection(server, Arc::clone(&store)));

        client.write_all(b"hello world").await.unwrap();
        client.shutdown().await.unwrap();

        let mut reply = Vec::new();
        client.read_to_end(&mut reply).await.unwrap();
        assert_ok!(handler.await.unwrap());

        let reply = String::from_utf8(reply).unwrap();
        let key = reply
            .strip_prefix("key is ")
            .and_then(|rest| rest.strip_suffix('\n'))
            .expect("reply should be a single key line");
        assert_eq!(key.len(), KEY_LENGTH);
        assert_eq!(store.get(key).unwrap(), Bytes::from_static(b"hello world"));
    }

    #[tokio::test]
    async fn test_body_stored_untrimmed() {
        let store = PasteStore::new();
        let (mut client, server) = duplex(64 * 1024);
        let handler = tokio::spawn(handle_connection(server, Arc::clone(&store)));

        client.write_all(b"  padded  \n").await.unwrap();
        client.shutdown().await.unwrap();

        let mut reply = Vec::new();
        client.read_to_end(&mut reply).await.unwrap();
        assert_ok!(handler.await.unwrap());

        let reply = String::from_utf8(reply).unwrap();
        let key = reply
            .strip_prefix("key is ")
            .and_then(|rest| rest.strip_suffix('\n'))
            .unwrap();
        assert_eq!(store.get(key).unwrap(), Bytes::from_static(b"  padded  \n"));
    }

    #[tokio::test]
    async fn test_single_character_accepted() {
        let store = PasteStore::new();
        let (mut client, server) = duplex(64 * 1024);
        let handler = tokio::spawn(handle_connection(server, Arc::clone(&store)));

        client.write_all(b"x").await.unwrap();
        client.shutdown().await.unwrap();

        let mut reply = Vec::new();
        client.read_to_end(&mut reply).await.unwrap();
        assert_ok!(handler.await.unwrap());

        let reply = String::from_utf8(reply).unwrap();
        let key = reply
            .strip_prefix("key is ")
            .and_then(|rest| rest.strip_suffix('\n'))
            .unwrap();
        assert_eq!(store.get(key).unwrap(), Bytes::from_static(b"x"));
    }

    #[tokio::test]
    async fn test_non_utf8_body_accepted() {
        let store = PasteStore::new();
        let (mut client, server) = duplex(64 * 1024);
        let handler = tokio::spawn(handle_connection(server, Arc::clone(&store)));

        client.write_all(b"\xff\xfe\x00binary").await.unwrap();
        client.shutdown().await.unwrap();

        let mut reply = Vec::new();
        client.read_to_end(&mut reply).await.unwrap();
        assert_ok!(handler.await.unwrap());

        assert!(reply.starts_with(b"key is "));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_empty_body_rejected() {
        let store = PasteStore::new();
        let (mut client, server) = duplex(64 * 1024);
        let handler = tokio::spawn(handle_connection(server, Arc::clone(&store)));

        client.shutdown().await.unwrap();

        let mut reply = Vec::new();
        client.read_to_end(&mut reply).await.unwrap();
        assert_ok!(handler.await.unwrap());

        assert_eq!(reply, b"Don't send empty spaces!");
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_whitespace_body_rejected() {
        let store = PasteStore::new();
        let (mut client, server) = duplex(64 * 1024);
        let handler = tokio::spawn(handle_connection(server, Arc::clone(&store)));

        client.write_all(b" \t\r\n  \n").await.unwrap();
        client.shutdown().await.unwrap();

        let mut reply = Vec::new();
        client.read_to_end(&mut reply).await.unwrap();
        assert_ok!(handler.await.unwrap());

        assert_eq!(reply, b"Don't send empty spaces!");
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_oversized_body_rejected() {
        let store = PasteStore::new();
        let (mut client, server) = duplex(64 * 1024);
        let handler = tokio::spawn(handle_connection(server, Arc::clone(&store)));

        // One byte past the limit; the handler replies and hangs up before
        // the client finishes writing, so the tail write may fail
        let body = vec![b'a'; MAX_PASTE_SIZE + 1];
        let _ = client.write_all(&body).await;
        let _ = client.shutdown().await;

        let mut reply = Vec::new();
        client.read_to_end(&mut reply).await.unwrap();
        assert_ok!(handler.await.unwrap());

        assert_eq!(reply, b"Input too large\n");
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_exact_limit_accepted() {
        let store = PasteStore::new();
        let (mut client, server) = duplex(64 * 1024);
        let handler = tokio::spawn(handle_connection(server, Arc::clone(&store)));

        let body = vec![b'a'; MAX_PASTE_SIZE];
        client.write_all(&body).await.unwrap();
        client.shutdown().await.unwrap();

        let mut reply = Vec::new();
        client.read_to_end(&mut reply).await.unwrap();
        assert_ok!(handler.await.unwrap());

        let reply = String::from_utf8(reply).unwrap();
        let key = reply
            .strip_prefix("key is ")
            .and_then(|rest| rest.strip_suffix('\n'))
            .unwrap();
        assert_eq!(store.get(key).unwrap().len(), MAX_PASTE_SIZE);
    }

    #[tokio::test]
    async fn test_read_error_abandons_paste() {
        let store = PasteStore::new();
        let stream = tokio_test::io::Builder::new()
            .read(b"partial paste")
            .read_error(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "peer reset",
            ))
            .build();

        // No reply may be written; the mock panics on an unexpected write
        let result = handle_connection(stream, Arc::clone(&store)).await;
        assert!(result.is_err());
        assert!(store.is_empty());
    }

    #[test]
    fn test_is_blank() {
        assert!(is_blank(b""));
        assert!(is_blank(b"   \t\n\r\n"));
        assert!(!is_blank(b"x"));
        assert!(!is_blank(b"  x  "));
        assert!(!is_blank(b"\xff\xfe"));
    }

    #[tokio::test]
    async fn test_bind_ephemeral_port() {
        let store = PasteStore::new();
        let server = TcpServer::bind("127.0.0.1:0", store).await.unwrap();
        assert_ne!(server.local_addr().unwrap().port(), 0);
    }
}
