//! Host startup and shutdown orchestration.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use fnhost_engine::{BlobStore, DispatchHost, FsBlobStore, FunctionRegistry, ShutdownOutcome};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::config::HostConfig;
use crate::listeners::{HttpListenerState, router, spawn_blob_listener, spawn_timer_listeners};

/// A configured host that has not started listening yet.
#[derive(Debug)]
pub struct HostServer {
    config: HostConfig,
    host: DispatchHost,
}

impl HostServer {
    /// Build a host backed by the filesystem store configured in `config`.
    pub fn new(config: HostConfig, registry: FunctionRegistry) -> Self {
        let store: Arc<dyn BlobStore> = Arc::new(FsBlobStore::new(config.storage.root.clone()));
        Self::with_store(config, registry, store)
    }

    /// Build a host backed by an explicit store.
    pub fn with_store(config: HostConfig, registry: FunctionRegistry, store: Arc<dyn BlobStore>) -> Self {
        Self {
            host: DispatchHost::new(registry, store),
            config,
        }
    }

    pub fn host(&self) -> &DispatchHost {
        &self.host
    }

    /// Bind the HTTP listener and start every trigger listener.
    pub async fn start(self) -> Result<RunningHost> {
        let bind_address = self.config.bind_address()?;
        let cancellation_token = CancellationToken::new();

        let state = Arc::new(HttpListenerState::new(
            self.host.clone(),
            self.config.http.route_prefix.clone(),
            self.config.environment,
            self.config.keys.clone(),
        ));
        let listener = tokio::net::TcpListener::bind(bind_address)
            .await
            .with_context(|| format!("failed to bind HTTP listener to {bind_address}"))?;
        let bound_address = listener.local_addr()?;

        let mut listener_handles = Vec::new();
        listener_handles.push(tokio::spawn({
            let shutdown = cancellation_token.child_token();
            let app = router(state);
            async move {
                if let Err(error) = axum::serve(listener, app)
                    .with_graceful_shutdown(async move {
                        shutdown.cancelled().await;
                    })
                    .await
                {
                    error!(address = %bound_address, error = %error, "http listener stopped with an error");
                }
            }
        }));
        listener_handles.extend(spawn_timer_listeners(&self.host, &cancellation_token));
        listener_handles.extend(spawn_blob_listener(
            &self.host,
            self.config.storage.poll_interval,
            self.config.storage.max_delivery_attempts,
            &cancellation_token,
        ));

        info!(
            address = %bound_address,
            environment = %self.config.environment,
            functions = self.host.registry().len(),
            "host started"
        );

        Ok(RunningHost {
            bind_address: bound_address,
            route_prefix: self.config.http.route_prefix.clone(),
            grace_period: self.config.shutdown_grace_period,
            cancellation_token,
            host: self.host,
            listener_handles,
        })
    }
}

/// Runtime handle for a started host.
#[derive(Debug)]
pub struct RunningHost {
    bind_address: SocketAddr,
    route_prefix: String,
    grace_period: Duration,
    cancellation_token: CancellationToken,
    host: DispatchHost,
    listener_handles: Vec<JoinHandle<()>>,
}

impl RunningHost {
    /// Return the bound socket address of the HTTP listener.
    pub fn bound_address(&self) -> SocketAddr {
        self.bind_address
    }

    /// Base URL under which function routes are served.
    pub fn function_base_url(&self) -> String {
        if self.route_prefix.is_empty() {
            format!("http://{}", self.bind_address)
        } else {
            format!("http://{}/{}", self.bind_address, self.route_prefix)
        }
    }

    pub fn host(&self) -> &DispatchHost {
        &self.host
    }

    /// Stop listeners, drain or abort in-flight invocations, and wait for background tasks.
    pub async fn stop(self) -> Result<ShutdownOutcome> {
        info!("host stopping");
        self.cancellation_token.cancel();
        let outcome = self.host.shutdown(self.grace_period).await;
        for handle in self.listener_handles {
            handle.await.map_err(|error| anyhow!("listener task failed: {error}"))?;
        }
        info!(outcome = ?outcome, "host stopped");
        Ok(outcome)
    }
}
