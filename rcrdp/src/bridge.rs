//! Bridge lifecycle: one [`Session`] plus the [`ControlServer`] in front
//! of it.

use std::net::SocketAddr;
use std::sync::Arc;

use tracing::info;

use rcrdp_core::{BridgeError, ConnectTarget, ControlServer, SessionEngine, Session};

use crate::config::BridgeConfig;

// ── Bridge ───────────────────────────────────────────────────────

/// Owns the connected session and the control server bound to it.
pub struct Bridge {
    session: Arc<Session>,
    server: ControlServer,
}

impl Bridge {
    /// Connect `engine` to `target`, then bind the control server.
    ///
    /// The engine connect may block on the network, so it runs on the
    /// blocking pool.
    pub async fn start(
        config: &BridgeConfig,
        engine: impl SessionEngine + 'static,
        target: ConnectTarget,
    ) -> Result<Self, BridgeError> {
        let session = Arc::new(Session::new(engine, config.to_session_options()));

        let connecting = Arc::clone(&session);
        tokio::task::spawn_blocking(move || connecting.connect(target)).await??;

        let server =
            match ControlServer::bind(&config.to_server_config(), Arc::clone(&session)).await {
                Ok(server) => server,
                Err(e) => {
                    session.disconnect();
                    return Err(e);
                }
            };

        Ok(Self { session, server })
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    pub fn local_addr(&self) -> Result<SocketAddr, BridgeError> {
        self.server.local_addr()
    }

    /// Serve until [`shutdown`](Self::shutdown) is called.
    pub async fn run(&self) -> Result<(), BridgeError> {
        self.server.run().await
    }

    /// Stop accepting requests and tear the session down. Idempotent.
    pub fn shutdown(&self) {
        if self.server.is_running() {
            info!("shutting down bridge");
        }
        self.server.stop();
        self.session.disconnect();
    }
}

impl Drop for Bridge {
    fn drop(&mut self) {
        self.shutdown();
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use rcrdp_core::rdp::{SyntheticConfig, SyntheticEngine};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;
    use tokio_test::assert_ok;

    fn local_config() -> BridgeConfig {
        let mut config = BridgeConfig::default();
        config.http.bind_address = "127.0.0.1".into();
        config.http.port = 0;
        config.capture.poll_interval_ms = 10;
        config
    }

    fn target() -> ConnectTarget {
        let mut target = ConnectTarget::new("bridge.test");
        target.desktop_width = 32;
        target.desktop_height = 32;
        target
    }

    #[tokio::test]
    async fn start_serve_and_shutdown() {
        let bridge = Arc::new(
            Bridge::start(&local_config(), SyntheticEngine::default(), target())
                .await
                .unwrap(),
        );
        assert!(bridge.session().is_connected());
        let addr = bridge.local_addr().unwrap();

        let task = tokio::spawn({
            let bridge = Arc::clone(&bridge);
            async move { bridge.run().await }
        });

        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(b"GET /status HTTP/1.1\r\n\r\n").await.unwrap();
        let mut reply = String::new();
        stream.read_to_string(&mut reply).await.unwrap();
        assert!(reply.contains(r#""hostname":"bridge.test""#));

        bridge.shutdown();
        let served = tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .unwrap()
            .unwrap();
        assert_ok!(served);
        assert!(!bridge.session().is_connected());
    }

    #[tokio::test]
    async fn refused_connect_is_reported() {
        let engine = SyntheticEngine::new(SyntheticConfig {
            refuse_connect: true,
            ..Default::default()
        });
        let result = Bridge::start(&local_config(), engine, target()).await;
        assert!(matches!(result, Err(BridgeError::Engine(_))));
    }

    #[tokio::test]
    async fn bind_failure_disconnects_session() {
        let mut config = local_config();
        config.http.bind_address = "bogus".into();
        let result = Bridge::start(&config, SyntheticEngine::default(), target()).await;
        assert!(matches!(result, Err(BridgeError::Config(_))));
    }
}
