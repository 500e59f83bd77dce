//! Sequential control-plane server.
//!
//! One connection at a time: accept, read once, route, write, close.
//! A slow `/screen` therefore delays every other client.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tracing::{debug, info, warn};

use crate::error::BridgeError;
use crate::http::request::{HttpRequest, MAX_REQUEST_SIZE};
use crate::http::response::HttpResponse;
use crate::http::routes::{ENDPOINTS, RetryPolicy, Router};
use crate::rdp::session::Session;

/// Pending-connection backlog.
const LISTEN_BACKLOG: u32 = 10;

/// Listener and per-request settings.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_address: String,
    /// 0 picks an ephemeral port.
    pub port: u16,
    /// Size of the single read buffer.
    pub max_request_size: usize,
    pub read_timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".into(),
            port: 8080,
            max_request_size: MAX_REQUEST_SIZE,
            read_timeout: Duration::from_secs(5),
            retry: RetryPolicy::default(),
        }
    }
}

// ── ControlServer ────────────────────────────────────────────────

pub struct ControlServer {
    listener: TcpListener,
    router: Router,
    max_request_size: usize,
    read_timeout: Duration,
    running: Arc<AtomicBool>,
}

impl ControlServer {
    /// Bind the listener with address reuse enabled.
    pub async fn bind(config: &ServerConfig, session: Arc<Session>) -> Result<Self, BridgeError> {
        let addr: SocketAddr = format!("{}:{}", config.bind_address, config.port)
            .parse()
            .map_err(|e| BridgeError::Config(format!("invalid bind address: {e}")))?;

        let socket = if addr.is_ipv4() {
            TcpSocket::new_v4()?
        } else {
            TcpSocket::new_v6()?
        };
        socket.set_reuseaddr(true)?;
        socket.bind(addr)?;
        let listener = socket.listen(LISTEN_BACKLOG)?;

        Ok(Self {
            listener,
            router: Router::new(session, config.retry.clone()),
            max_request_size: config.max_request_size.max(1),
            read_timeout: config.read_timeout,
            running: Arc::new(AtomicBool::new(true)),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, BridgeError> {
        Ok(self.listener.local_addr()?)
    }

    /// Handle that stops [`run`](Self::run) when cleared.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Serve connections until stopped. Per-connection failures are
    /// logged and never end the loop.
    pub async fn run(&self) -> Result<(), BridgeError> {
        let addr = self.local_addr()?;
        info!("HTTP control server listening on {addr}");
        for (method, path, what) in ENDPOINTS {
            info!("  {method:<4} {path:<11} {what}");
        }

        while self.is_running() {
            let accept = tokio::select! {
                result = self.listener.accept() => result,
                _ = Self::wait_for_stop(&self.running) => break,
            };

            let (stream, peer) = match accept {
                Ok(pair) => pair,
                Err(e) => {
                    warn!("accept error: {e}");
                    continue;
                }
            };

            if let Err(e) = self.serve(stream, peer).await {
                warn!("connection from {peer} failed: {e}");
            }
        }

        self.running.store(false, Ordering::SeqCst);
        info!("HTTP control server stopped");
        Ok(())
    }

    // ── Internal ─────────────────────────────────────────────────

    async fn serve(&self, mut stream: TcpStream, peer: SocketAddr) -> Result<(), BridgeError> {
        let mut buf = vec![0u8; self.max_request_size];
        let n = match tokio::time::timeout(self.read_timeout, stream.read(&mut buf)).await {
            Ok(read) => read?,
            Err(_) => {
                debug!("read from {peer} timed out");
                return Ok(());
            }
        };
        if n == 0 {
            debug!("{peer} closed without sending a request");
            return Ok(());
        }
        if n == buf.len() {
            warn!("request from {peer} filled the {n}-byte buffer; truncated");
        }

        let response = match HttpRequest::parse(&buf[..n]) {
            Ok(request) => {
                debug!("{peer} {} {}", request.method(), request.path());
                if let (Some(declared), Some(body)) = (request.content_length(), request.body())
                    && declared > body.len()
                {
                    warn!(
                        "Content-Length {declared} exceeds received body of {} bytes",
                        body.len()
                    );
                }
                self.router.handle(&request).await
            }
            Err(e) => {
                debug!("malformed request from {peer}: {e}");
                HttpResponse::from(&e)
            }
        };

        debug!(
            "{peer} <- {} {} ({} bytes)",
            response.status(),
            response.content_type(),
            response.body().len()
        );
        response.write_to(&mut stream).await?;
        stream.shutdown().await?;
        Ok(())
    }

    /// Resolves once `running` is cleared.
    async fn wait_for_stop(running: &Arc<AtomicBool>) {
        loop {
            if !running.load(Ordering::SeqCst) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rdp::session::SessionOptions;
    use crate::rdp::synthetic::SyntheticEngine;

    fn local_config() -> ServerConfig {
        ServerConfig {
            bind_address: "127.0.0.1".into(),
            port: 0,
            read_timeout: Duration::from_millis(500),
            ..Default::default()
        }
    }

    async fn roundtrip(addr: SocketAddr, raw: &[u8]) -> String {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(raw).await.unwrap();
        let mut out = Vec::new();
        stream.read_to_end(&mut out).await.unwrap();
        String::from_utf8_lossy(&out).into_owned()
    }

    #[tokio::test]
    async fn rejects_bad_bind_address() {
        let session = Arc::new(Session::new(SyntheticEngine::default(), SessionOptions::default()));
        let config = ServerConfig {
            bind_address: "not-an-ip".into(),
            ..local_config()
        };
        assert!(matches!(
            ControlServer::bind(&config, session).await,
            Err(BridgeError::Config(_))
        ));
    }

    #[tokio::test]
    async fn serves_and_stops() {
        let session = Arc::new(Session::new(SyntheticEngine::default(), SessionOptions::default()));
        let server = Arc::new(ControlServer::bind(&local_config(), session).await.unwrap());
        let addr = server.local_addr().unwrap();
        let task = tokio::spawn({
            let server = Arc::clone(&server);
            async move { server.run().await }
        });

        let reply = roundtrip(addr, b"GET /status HTTP/1.1\r\n\r\n").await;
        assert!(reply.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(reply.contains("Connection: close"));
        assert!(reply.ends_with(r#"{"connected":false,"hostname":"","port":3389,"username":""}"#));

        let reply = roundtrip(addr, b"BREW /pot HTTP/1.1\r\n\r\n").await;
        assert!(reply.starts_with("HTTP/1.1 400 Bad Request\r\n"));

        server.stop();
        task.await.unwrap().unwrap();
        assert!(!server.is_running());
    }

    #[tokio::test]
    async fn silent_client_does_not_block_server() {
        let session = Arc::new(Session::new(SyntheticEngine::default(), SessionOptions::default()));
        let server = Arc::new(ControlServer::bind(&local_config(), session).await.unwrap());
        let addr = server.local_addr().unwrap();
        let stop = server.stop_handle();
        let task = tokio::spawn({
            let server = Arc::clone(&server);
            async move { server.run().await }
        });

        let _idle = TcpStream::connect(addr).await.unwrap();
        let reply = roundtrip(addr, b"GET /missing HTTP/1.1\r\n\r\n").await;
        assert!(reply.starts_with("HTTP/1.1 404 Not Found\r\n"));

        stop.store(false, Ordering::SeqCst);
        task.await.unwrap().unwrap();
    }
}
