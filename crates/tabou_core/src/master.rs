use std::{future::Future, sync::Arc, time::Duration};

use tabou_config::ProxyConfig;
use tabou_proxy::RelaySettings;
use tokio::{net::TcpListener, sync::Semaphore};
use tracing::{debug, error, info, instrument, warn, Instrument};

use crate::worker::handle_connection;

/// Pause after a failed `accept()` so a persistent error (e.g. out of file
/// descriptors) does not spin.
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

pub struct Master {
    cfg: Arc<ProxyConfig>,
    settings: Arc<RelaySettings>,
}

impl Master {
    pub fn new(cfg: ProxyConfig) -> anyhow::Result<Self> {
        let settings = RelaySettings::from_config(&cfg)?;
        Ok(Self {
            cfg: Arc::new(cfg),
            settings: Arc::new(settings),
        })
    }

    /// Binds the configured listen address.
    pub async fn bind(&self) -> anyhow::Result<TcpListener> {
        let listen_addr = self.cfg.listen.addr();
        match TcpListener::bind(&listen_addr).await {
            Ok(l) => {
                info!(
                    target: "tabou::master",
                    listen = %listen_addr,
                    "Bind() successful"
                );
                Ok(l)
            }
            Err(e) => {
                error!(
                    target: "tabou::master",
                    listen = %listen_addr,
                    error = ?e,
                    "Failed to bind listener"
                );
                Err(e.into())
            }
        }
    }

    /// Binds and serves until Ctrl+C.
    pub async fn run(self) -> anyhow::Result<()> {
        let listener = self.bind().await?;
        self.serve(listener, async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(target: "tabou::master", error = ?e, "Failed to listen for Ctrl+C");
                std::future::pending::<()>().await;
            }
        })
        .await
    }

    /// Accepts on `listener` until `shutdown` resolves, then drops the
    /// listener. Connections already being served run to completion.
    #[instrument(skip_all, fields(
        max_connections = %self.cfg.global.max_connections,
        parent_proxy = ?self.cfg.upstream.parent_proxy,
    ))]
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> anyhow::Result<()>
    where
        F: Future<Output = ()>,
    {
        info!(target: "tabou::master", "Starting TABOU MASTER");

        // One permit per live connection, shared by every accept
        let max_conns = self.cfg.global.max_connections as usize;
        let semaphore = Arc::new(Semaphore::new(max_conns));

        info!(
            target: "tabou::master",
            max_conns,
            "Connection limit set"
        );

        let local = listener.local_addr()?;
        info!(
            target: "tabou::master",
            listen = %local,
            "Waiting for incoming connections (Ctrl+C to stop)..."
        );

        tokio::select! {
            _ = accept_loop(listener, semaphore, self.settings.clone()) => {}
            _ = shutdown => {
                info!(target: "tabou::master", listen = %local, "Shutdown requested; listener closed");
            }
        }

        Ok(())
    }
}

async fn accept_loop(listener: TcpListener, semaphore: Arc<Semaphore>, settings: Arc<RelaySettings>) {
    loop {
        // Owned so the permit can move into the spawned task
        let permit = match semaphore.clone().acquire_owned().await {
            Ok(p) => p,
            Err(e) => {
                error!(
                    target: "tabou::master",
                    error = ?e,
                    "Connection semaphore closed"
                );
                return;
            }
        };

        let (stream, addr) = match listener.accept().await {
            Ok(pair) => pair,
            Err(e) => {
                warn!(
                    target: "tabou::master",
                    error = ?e,
                    "Failed to accept connection"
                );
                tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                continue;
            }
        };

        debug!(
            target: "tabou::master",
            client_addr = %addr,
            available = semaphore.available_permits(),
            "New connection accepted"
        );

        let settings = settings.clone();
        let span = tracing::info_span!("worker_connection", client_addr = %addr);

        tokio::spawn(
            async move {
                if let Err(e) = handle_connection(stream, addr, &settings).await {
                    warn!(
                        target: "tabou::worker",
                        client_addr = %addr,
                        error = %e,
                        "Connection ended with an error"
                    );
                }
                drop(permit);
            }
            .instrument(span),
        );
    }
}
