//! TCP listener serving the router over HTTP/1.1 and h2c.

use std::net::SocketAddr;
use std::time::Duration;

use axum::Router;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto;
use hyper_util::service::TowerToHyperService;
use tokio::net::{TcpListener, TcpStream};

use crate::error::{Result, ServerError};
use crate::metrics;
use crate::shutdown::ShutdownCoordinator;

/// TCP listener that stops accepting once shutdown is signaled.
pub struct HttpListener {
    listener: TcpListener,
    local_addr: SocketAddr,
    shutdown: ShutdownCoordinator,
}

impl HttpListener {
    /// Bind a new listener.
    pub async fn bind(addr: SocketAddr, shutdown: ShutdownCoordinator) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: addr.to_string(),
                source,
            })?;
        let local_addr = listener.local_addr()?;

        tracing::info!(%local_addr, "TCP listener bound");

        Ok(Self {
            listener,
            local_addr,
            shutdown,
        })
    }

    /// Address actually bound (useful with port 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Accept the next client connection.
    ///
    /// Returns None once shutdown has been signaled. Transient accept errors
    /// are logged and retried with a brief backoff.
    pub async fn accept(&self) -> Option<TcpStream> {
        loop {
            let accept_result = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => {
                    return None;
                }
                result = self.listener.accept() => result
            };

            match accept_result {
                Ok((stream, _addr)) => {
                    if let Err(e) = stream.set_nodelay(true) {
                        tracing::debug!(error = %e, "Failed to set TCP_NODELAY");
                    }
                    metrics::record_connection_accepted();
                    return Some(stream);
                }
                Err(e) => {
                    tracing::error!(error = %e, "Accept error");
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    continue;
                }
            }
        }
    }

    /// Serve `app` on every accepted connection until shutdown.
    ///
    /// Connections already being served keep running after this returns.
    pub async fn serve(self, app: Router) {
        while let Some(stream) = self.accept().await {
            let app = app.clone();

            tokio::spawn(async move {
                let io = TokioIo::new(stream);
                let service = TowerToHyperService::new(app);

                let builder = auto::Builder::new(TokioExecutor::new());
                if let Err(e) = builder.serve_connection(io, service).await {
                    tracing::debug!(error = %e, "Connection error");
                }
            });
        }

        tracing::info!("Accept loop terminated");
    }
}
