use super::routes::{create_router, InboundState};
use crate::bridge::{Bridge, LocalApiProvider};
use crate::error::{BridgeError, BridgeResult};
use crate::event::EventOrigin;
use crate::forwarding::EventForwarder;
use crate::remote::Endpoint;
use async_trait::async_trait;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Time allowed for in-flight requests once shutdown is requested.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// A running inbound API.
pub struct ServerHandle {
    address: SocketAddr,
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl ServerHandle {
    /// Bound address; differs from the requested one when that asked for
    /// port 0.
    pub fn address(&self) -> SocketAddr {
        self.address
    }

    /// Stop accepting connections, let in-flight requests finish, and
    /// release the port.
    pub async fn shutdown(self) {
        let ServerHandle {
            address,
            shutdown,
            mut task,
        } = self;

        // Err means the server task already ended
        let _ = shutdown.send(());

        if tokio::time::timeout(SHUTDOWN_GRACE, &mut task).await.is_err() {
            warn!(address = %address, "Inbound API did not drain in time, aborting");
            task.abort();
        }
        info!(address = %address, "Inbound API stopped");
    }
}

/// Bind the inbound API and serve it on a spawned task.
pub async fn serve(bind_address: SocketAddr, state: InboundState) -> BridgeResult<ServerHandle> {
    let listener = TcpListener::bind(bind_address).await.map_err(|e| {
        BridgeError::BridgeSetup(format!("failed to bind {}: {}", bind_address, e))
    })?;
    let address = listener
        .local_addr()
        .map_err(|e| BridgeError::BridgeSetup(format!("no local address: {}", e)))?;

    info!(address = %address, "Inbound API listening");

    let (shutdown, signal) = oneshot::channel::<()>();
    let task = tokio::spawn(async move {
        let server = axum::serve(listener, create_router(state)).with_graceful_shutdown(async {
            let _ = signal.await;
        });
        if let Err(e) = server.await {
            error!(error = %e, "Inbound API failed");
        }
    });

    Ok(ServerHandle {
        address,
        shutdown,
        task,
    })
}

/// Serves the inbound API for a [`Bridge`] while it runs.
pub struct HttpLocalApi {
    bind_address: SocketAddr,
    /// Endpoint advertised to the remote hub
    advertise: Endpoint,
    restrict_origin: Option<EventOrigin>,
    server: Mutex<Option<ServerHandle>>,
}

impl HttpLocalApi {
    pub fn new(bind_address: SocketAddr, advertise: Endpoint) -> Self {
        Self {
            bind_address,
            advertise,
            restrict_origin: None,
            server: Mutex::new(None),
        }
    }

    pub fn with_restrict_origin(mut self, origin: Option<EventOrigin>) -> Self {
        self.restrict_origin = origin;
        self
    }
}

#[async_trait]
impl LocalApiProvider for HttpLocalApi {
    async fn provision(&self, bridge: &Bridge) -> BridgeResult<Endpoint> {
        let state = InboundState {
            bus: bridge.bus(),
            states: bridge.states(),
            forwarder: Arc::new(EventForwarder::new(bridge.bus(), self.restrict_origin)?),
            api_password: self.advertise.api_password.clone(),
        };

        let server = serve(self.bind_address, state).await?;

        let mut advertise = self.advertise.clone();
        if self.bind_address.port() == 0 {
            advertise.port = server.address().port();
        }

        *self.server.lock().unwrap_or_else(|e| e.into_inner()) = Some(server);
        Ok(advertise)
    }

    async fn shutdown(&self) {
        let server = self.server.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(server) = server {
            server.shutdown().await;
        }
    }
}
