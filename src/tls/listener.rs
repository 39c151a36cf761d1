use std::{future::Future, io, net::SocketAddr, sync::Arc, time::Duration};

use tokio::net::{TcpListener, TcpStream};

use super::{AdaptedConnection, TlsAdapter};
use crate::{
    config::HTTP_CHALLENGE_PORT,
    error::{Error, Result},
};

/// TCP listener that hands out TLS connections.
///
/// Every accepted connection is handshaked on its own task, so a slow or stalled client never
/// holds up the accept loop.
pub struct TlsListener {
    listener: TcpListener,
    adapter: Arc<TlsAdapter>,
}

impl TlsListener {
    /// Bind `addr`.
    ///
    /// Port 80 is reserved for HTTP-01 challenges and is rejected before any socket is created.
    pub async fn bind(addr: SocketAddr, adapter: TlsAdapter) -> Result<Self> {
        if addr.port() == HTTP_CHALLENGE_PORT {
            return Err(Error::config(format!(
                "port {HTTP_CHALLENGE_PORT} is reserved for ACME challenges and cannot serve TLS"
            )));
        }

        let listener = TcpListener::bind(addr).await?;
        log::info!("TLS listener bound to {}", listener.local_addr()?);

        Ok(Self {
            listener,
            adapter: Arc::new(adapter),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept connections forever, passing each established TLS connection to `handler`.
    ///
    /// Connections whose handshake fails or times out are dropped without reaching the handler.
    pub async fn serve<F, Fut>(self, handler: F)
    where
        F: Fn(AdaptedConnection<TcpStream>, SocketAddr) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let handler = Arc::new(handler);

        loop {
            let (stream, peer) = match self.listener.accept().await {
                Ok(accepted) => accepted,
                Err(err) => {
                    log::warn!("failed to accept connection: {err}");
                    // usually fd exhaustion, give other tasks a chance to release some
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    continue;
                }
            };

            let adapter = Arc::clone(&self.adapter);
            let handler = Arc::clone(&handler);

            tokio::spawn(async move {
                let conn = adapter.adapt(stream).await;

                if conn.is_closed() {
                    log::debug!("dropping connection from {peer} after failed handshake");
                    return;
                }

                handler(conn, peer).await;
            });
        }
    }
}
