//! TCP accept loop.

use crate::config::NodeConfig;
use crate::ledger::Ledger;
use crate::protocol::Dispatcher;
use crate::session;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::Semaphore;

/// Accepts client connections and spawns one session task per connection,
/// all of them sharing a single ledger. A semaphore caps how many sessions
/// run at once; beyond the cap, new connections wait in the accept queue.
pub struct Server {
    listener: TcpListener,
    dispatcher: Arc<Dispatcher>,
    idle_timeout: Duration,
    limit: Arc<Semaphore>,
}

impl Server {
    /// Bind the listening socket on all interfaces. Port 0 binds an
    /// ephemeral port, which [`Server::local_addr`] reports.
    pub async fn bind(config: &NodeConfig, ledger: Arc<Ledger>) -> std::io::Result<Self> {
        let listener = TcpListener::bind((Ipv4Addr::UNSPECIFIED, config.port)).await?;
        let dispatcher = Arc::new(Dispatcher::new(ledger, config.bank_addr));
        Ok(Self {
            listener,
            dispatcher,
            idle_timeout: config.idle_timeout,
            limit: Arc::new(Semaphore::new(config.max_connections)),
        })
    }

    /// The address the listener actually bound.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept connections until the surrounding task is cancelled.
    pub async fn run(self) -> anyhow::Result<()> {
        tracing::info!("bank node listening on {}", self.listener.local_addr()?);

        loop {
            let permit = match self.limit.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => break, // semaphore closed, nothing left to serve
            };

            match self.listener.accept().await {
                Ok((stream, peer)) => {
                    let dispatcher = Arc::clone(&self.dispatcher);
                    let idle_timeout = self.idle_timeout;
                    tokio::spawn(async move {
                        session::run(stream, peer, dispatcher, idle_timeout).await;
                        drop(permit);
                    });
                }
                Err(e) => {
                    tracing::warn!("failed to accept connection: {}", e);
                }
            }
        }

        Ok(())
    }
}
