//! Gateway server

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info, warn};

use super::pipeline::TrustPipeline;
use super::proxy::RouteTable;
use super::router::{AppState, create_router};
use super::tls::{PeerCertAcceptor, build_server_config};
use crate::config::Config;
use crate::{Error, Result};

/// Time in-flight requests get to finish after a shutdown signal.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

/// API gateway server
pub struct Gateway {
    config: Config,
    state: Arc<AppState>,
}

impl Gateway {
    /// Create a new gateway
    ///
    /// # Errors
    ///
    /// Returns an error if a route is invalid or the HTTP client cannot be
    /// built.
    pub fn new(config: Config) -> Result<Self> {
        let routes = RouteTable::from_config(&config.routes)?;
        for route in &config.routes {
            info!(
                route = %route.id,
                path = %route.path,
                uri = %route.uri,
                strip_parts = route.strip_parts,
                "Registered route"
            );
        }

        let client = reqwest::Client::builder()
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_nodelay(true)
            .redirect(reqwest::redirect::Policy::none())
            .build()?;

        let state = Arc::new(AppState {
            authenticator: Arc::new(TrustPipeline::from_config(Arc::new(config.x509.clone()))),
            routes,
            client,
            public_paths: config.public_paths.clone(),
            request_timeout: config.server.request_timeout,
        });

        Ok(Self { config, state })
    }

    /// The HTTP router, without a listener.
    #[must_use]
    pub fn router(&self) -> Router {
        create_router(Arc::clone(&self.state))
    }

    /// Run the gateway until Ctrl-C or SIGTERM.
    ///
    /// # Errors
    ///
    /// Returns an error if the address is invalid, TLS material cannot be
    /// loaded or the listener fails.
    pub async fn run(self) -> Result<()> {
        let addr = SocketAddr::new(
            self.config
                .server
                .host
                .parse()
                .map_err(|e| Error::Config(format!("Invalid host: {e}")))?,
            self.config.server.port,
        );
        let app = self.router();
        self.log_startup(addr);

        if self.config.server.tls.enabled {
            let acceptor = PeerCertAcceptor::new(build_server_config(&self.config.server.tls)?);
            let handle = axum_server::Handle::new();
            let shutdown = handle.clone();
            tokio::spawn(async move {
                shutdown_signal().await;
                shutdown.graceful_shutdown(Some(SHUTDOWN_GRACE));
            });

            axum_server::bind(addr)
                .acceptor(acceptor)
                .handle(handle)
                .serve(app.into_make_service())
                .await?;
        } else {
            let listener = TcpListener::bind(addr).await?;
            axum::serve(listener, app)
                .with_graceful_shutdown(shutdown_signal())
                .await?;
        }

        info!("Gateway stopped");
        Ok(())
    }

    fn log_startup(&self, addr: SocketAddr) {
        let x509 = &self.config.x509;
        let tls = &self.config.server.tls;

        info!("============================================================");
        info!("API GATEWAY v{}", env!("CARGO_PKG_VERSION"));
        info!("============================================================");
        info!(%addr, tls = tls.enabled, "Listening");
        if tls.enabled {
            info!(require_client_cert = tls.require_client_cert, "Client certificates requested");
        }
        info!(routes = self.state.routes.len(), "Routes registered");

        if x509.forwarding.enabled {
            info!(
                mode = ?x509.forwarding.mode,
                hosts = ?x509.forwarding.hosts,
                "Certificate forwarding enabled"
            );
            if x509.forwarding.hosts.is_empty() {
                warn!("No forwarding hosts configured - every forwarded identity will be rejected");
            }
        } else {
            info!("Certificate forwarding disabled");
        }

        if x509.organisation.mrn.trim().is_empty() {
            warn!("No organisation constraint - any certificate subject is accepted");
        } else {
            info!(organisation = %x509.organisation.mrn, "Organisation constraint");
        }
        info!("============================================================");
    }
}

/// Resolves on Ctrl-C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Shutdown signal received");
}
