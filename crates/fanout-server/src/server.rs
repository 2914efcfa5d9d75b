//! Listeners and top-level server wiring.
//!
//! This module:
//! - Binds the WebSocket and notification RPC listeners.
//! - Spawns the single hub task that owns all routing state.
//! - Runs the three components until the shutdown token is cancelled
//!   or one of them exits on its own (which is treated as fatal).
//! - Gives everything a bounded grace period to wind down.
//!
//! The per-connection logic, hub loop and RPC sessions live in
//! `connection`, `hub_task` and `rpc` respectively.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use tokio::net::TcpListener;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::acceptor::{self, WsEndpoint};
use crate::auth::{AllowAll, AuthHook, TokenValidator};
use crate::config::Config;
use crate::connection::ConnectionSettings;
use crate::hub_task::{self, HubHandle};
use crate::notify::Notifier;
use crate::rpc;
use crate::types::TrackedTasks;

/// How long components get to finish after shutdown starts.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// Pluggable admission hooks.
#[derive(Clone)]
pub struct Extensions {
    pub tokens: Arc<dyn TokenValidator>,
    pub auth: Arc<dyn AuthHook>,
}

impl Default for Extensions {
    fn default() -> Self {
        Extensions {
            tokens: Arc::new(AllowAll),
            auth: Arc::new(AllowAll),
        }
    }
}

/// A bound, not yet serving, server.
pub struct Server {
    ws_listener: TcpListener,
    rpc_listener: TcpListener,
    hub: HubHandle,
    hub_task: JoinHandle<()>,
    endpoint: Arc<WsEndpoint>,
    notifier: Notifier,
    shutdown: CancellationToken,
    tasks: TrackedTasks,
    grace: Duration,
}

impl Server {
    /// Bind both listeners and start the hub.
    pub async fn bind(
        config: &Config,
        extensions: Extensions,
        settings: ConnectionSettings,
    ) -> Result<Self> {
        let ws_addr = config.ws_addr_string();
        let ws_listener = TcpListener::bind(&ws_addr)
            .await
            .with_context(|| format!("binding websocket listener on {ws_addr}"))?;

        let rpc_addr = config.rpc_addr_string();
        let rpc_listener = TcpListener::bind(&rpc_addr)
            .await
            .with_context(|| format!("binding rpc listener on {rpc_addr}"))?;

        let shutdown = CancellationToken::new();
        let tasks = TrackedTasks::new();
        let (hub, hub_task) = hub_task::spawn_hub(shutdown.clone());

        let endpoint = Arc::new(WsEndpoint {
            hub: hub.clone(),
            validator: extensions.tokens,
            token_key: config.token_key.clone(),
            settings,
            shutdown: shutdown.clone(),
            tasks: tasks.clone(),
        });
        let notifier = Notifier::new(hub.clone(), extensions.auth);

        Ok(Server {
            ws_listener,
            rpc_listener,
            hub,
            hub_task,
            endpoint,
            notifier,
            shutdown,
            tasks,
            grace: SHUTDOWN_GRACE,
        })
    }

    pub fn ws_addr(&self) -> Result<SocketAddr> {
        Ok(self.ws_listener.local_addr()?)
    }

    pub fn rpc_addr(&self) -> Result<SocketAddr> {
        Ok(self.rpc_listener.local_addr()?)
    }

    pub fn hub(&self) -> HubHandle {
        self.hub.clone()
    }

    /// In-process access to the notification façade.
    pub fn notifier(&self) -> Notifier {
        self.notifier.clone()
    }

    /// Cancelling this token stops the whole server.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    /// Serve until shutdown. Returns an error if a component stopped on
    /// its own before shutdown was requested.
    pub async fn serve(self) -> Result<()> {
        let Server {
            ws_listener,
            rpc_listener,
            hub: _,
            hub_task,
            endpoint,
            notifier,
            shutdown,
            tasks,
            grace,
        } = self;

        let mut components: JoinSet<(&'static str, Result<()>)> = JoinSet::new();
        components.spawn(async move {
            let res = hub_task.await.map_err(|e| anyhow!("hub task failed: {e}"));
            ("hub", res)
        });
        components.spawn(async move { ("websocket", acceptor::serve(ws_listener, endpoint).await) });
        {
            let shutdown = shutdown.clone();
            let tasks = tasks.clone();
            components.spawn(async move {
                ("rpc", rpc::serve(rpc_listener, notifier, shutdown, tasks).await)
            });
        }

        let first = tokio::select! {
            _ = shutdown.cancelled() => None,
            joined = components.join_next() => joined,
        };

        let outcome = match first {
            None => Ok(()),
            Some(joined) if shutdown.is_cancelled() => {
                log_exit(joined);
                Ok(())
            }
            Some(Ok((name, Ok(())))) => Err(anyhow!("{name} exited unexpectedly")),
            Some(Ok((name, Err(e)))) => Err(e.context(format!("{name} failed"))),
            Some(Err(e)) => Err(anyhow!("component panicked: {e}")),
        };

        if let Err(e) = &outcome {
            error!(error = %e, "shutting down after component failure");
        } else {
            info!("shutting down");
        }
        shutdown.cancel();

        tasks.close();
        let drained = timeout(grace, async {
            while let Some(joined) = components.join_next().await {
                log_exit(joined);
            }
            tasks.wait().await;
        })
        .await;

        if drained.is_err() {
            warn!(grace = ?grace, remaining = tasks.len(), "grace period elapsed, aborting remaining tasks");
            components.abort_all();
            tasks.abort_all();
            tasks.wait().await;
        }

        outcome
    }
}

fn log_exit(joined: std::result::Result<(&'static str, Result<()>), tokio::task::JoinError>) {
    match joined {
        Ok((name, Ok(()))) => info!(component = name, "stopped"),
        Ok((name, Err(e))) => warn!(component = name, error = %e, "stopped with error"),
        Err(e) => warn!(error = %e, "component panicked"),
    }
}

/// Bind with the production defaults and serve until Ctrl-C / SIGTERM.
pub async fn run(config: Config) -> Result<()> {
    let server = Server::bind(&config, Extensions::default(), ConnectionSettings::default()).await?;
    info!(
        ws = %server.ws_addr()?,
        rpc = %server.rpc_addr()?,
        token_key = %config.token_key,
        "server bound"
    );

    let token = server.shutdown_token();
    tokio::spawn(async move {
        wait_for_signal().await;
        info!("received shutdown signal");
        token.cancel();
    });

    server.serve().await
}

async fn wait_for_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "cannot listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!(error = %e, "cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
