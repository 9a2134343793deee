//! Bridge orchestrator: mirrors a remote hub and exchanges events with it.
//!
//! Lifecycle:
//! ```text
//! Unstarted --start()--> Starting --handshake ok--> Running
//!     |                     |                          |
//!     +------stop()---------+---------stop()-----------+--> Stopping --> Stopped
//! ```
//! A failed `start()` leaves the bridge in `Starting`; `stop()` is safe from
//! there and from every other state, and a no-op once stopped.

mod timer;

pub use timer::run_timer;

use crate::bus::{EventBus, ForwardingEventBus};
use crate::config::BridgeConfig;
use crate::error::{BridgeError, BridgeResult};
use crate::event::{EventData, EventOrigin, EVENT_HUB_START, EVENT_HUB_STOP};
use crate::pool::{WorkerPool, DEFAULT_WORKERS};
use crate::remote::{ApiStatus, Endpoint, RemoteApi};
use crate::state::{StateMachine, StateMirror};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

#[cfg(test)]
mod tests;

/// Lifecycle state of a [`Bridge`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BridgeState {
    Unstarted,
    Starting,
    Running,
    Stopping,
    Stopped,
}

/// Provides the inbound API the remote hub forwards events to, when the
/// bridge was not given a local endpoint up front.
#[async_trait]
pub trait LocalApiProvider: Send + Sync {
    /// Make the local API reachable and return its advertised endpoint.
    async fn provision(&self, bridge: &Bridge) -> BridgeResult<Endpoint>;

    /// Stop serving. Called by [`Bridge::stop`] before the pool drains.
    async fn shutdown(&self) {}
}

/// Everything needed to construct a [`Bridge`].
#[derive(Clone, Debug)]
pub struct BridgeSettings {
    pub remote: Endpoint,
    /// Already-running local API; `None` asks the provider at start
    pub local: Option<Endpoint>,
    pub workers: usize,
    /// Period of local `time_changed` events; raised to
    /// [`MIN_TIMER_INTERVAL`] if shorter
    pub timer_interval: Duration,
}

/// Shortest accepted timer period.
pub const MIN_TIMER_INTERVAL: Duration = Duration::from_millis(1);

impl BridgeSettings {
    pub fn new(remote: Endpoint) -> Self {
        Self {
            remote,
            local: None,
            workers: DEFAULT_WORKERS,
            timer_interval: Duration::from_secs(10),
        }
    }

    pub fn from_config(config: &BridgeConfig) -> BridgeResult<Self> {
        let remote = config
            .remote
            .clone()
            .ok_or_else(|| BridgeError::Config("no [remote] section".to_string()))?;

        Ok(Self {
            remote,
            local: None,
            workers: config.pool.workers,
            timer_interval: config.timer.interval(),
        })
    }
}

/// A hub instance that mirrors a remote hub.
///
/// Local events are sent to the remote hub, the remote hub forwards its
/// events back to this instance's local API, and states are read from a
/// local mirror.
pub struct Bridge {
    remote: RemoteApi,
    pool: WorkerPool,
    bus: Arc<ForwardingEventBus>,
    states: Arc<StateMirror>,
    configured_local: Option<Endpoint>,
    timer_interval: Duration,
    provider: Option<Box<dyn LocalApiProvider>>,
    /// Local endpoint registered with the remote hub
    local: Mutex<Option<Endpoint>>,
    state: Mutex<BridgeState>,
    timer: Mutex<Option<JoinHandle<()>>>,
}

impl Bridge {
    /// Validate the remote API and take the first state snapshot.
    ///
    /// Fails with `InvalidRemote` if `GET /api` does not succeed.
    pub async fn new(settings: BridgeSettings) -> BridgeResult<Self> {
        let remote = RemoteApi::new(settings.remote)?;

        if !remote.validate(false).await {
            let status = remote.status().unwrap_or(ApiStatus::Unknown);
            error!(remote = %remote.endpoint(), status = %status, "Remote API not valid");
            return Err(BridgeError::InvalidRemote {
                endpoint: remote.endpoint().to_string(),
                status,
            });
        }

        let pool = WorkerPool::new(settings.workers);
        let bus = Arc::new(ForwardingEventBus::new(remote.clone(), pool.clone()));
        let states = Arc::new(StateMirror::new(bus.as_ref(), remote.clone()).await);

        Ok(Self {
            remote,
            pool,
            bus,
            states,
            configured_local: settings.local,
            timer_interval: settings.timer_interval.max(MIN_TIMER_INTERVAL),
            provider: None,
            local: Mutex::new(None),
            state: Mutex::new(BridgeState::Unstarted),
            timer: Mutex::new(None),
        })
    }

    pub fn with_local_provider(mut self, provider: impl LocalApiProvider + 'static) -> Self {
        self.provider = Some(Box::new(provider));
        self
    }

    pub fn remote(&self) -> &RemoteApi {
        &self.remote
    }

    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    pub fn bus(&self) -> Arc<dyn EventBus> {
        self.bus.clone()
    }

    pub fn mirror(&self) -> &Arc<StateMirror> {
        &self.states
    }

    pub fn states(&self) -> Arc<dyn StateMachine> {
        self.states.clone()
    }

    pub fn state(&self) -> BridgeState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Local endpoint handed to the remote hub, once resolved.
    pub fn local_endpoint(&self) -> Option<Endpoint> {
        self.local.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn set_state(&self, state: BridgeState) {
        *self.state.lock().unwrap_or_else(|e| e.into_inner()) = state;
    }

    /// Start the bridge and register for event forwarding on the remote hub.
    ///
    /// Fails with `BridgeSetup` if no local API is available or the remote
    /// hub rejects the registration.
    pub async fn start(&self) -> BridgeResult<()> {
        {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            if *state != BridgeState::Unstarted {
                return Err(BridgeError::Lifecycle {
                    action: "start",
                    state: *state,
                });
            }
            *state = BridgeState::Starting;
        }

        info!(remote = %self.remote.endpoint(), "Starting bridge");

        let local = self.ensure_local_api().await?;

        // Remote origin: announce locally, do not send upstream
        self.bus
            .fire(EVENT_HUB_START, EventData::new(), EventOrigin::Remote);

        // After START, so the local API is serving when the remote connects
        if !self.remote.connect_remote_events(&local).await {
            return Err(BridgeError::BridgeSetup(format!(
                "could not set up event forwarding from {} to {}",
                self.remote.endpoint(),
                local
            )));
        }

        // Catch changes made between construction and registration
        self.states.mirror().await;

        let timer = tokio::spawn(run_timer(self.bus(), self.timer_interval));
        *self.timer.lock().unwrap_or_else(|e| e.into_inner()) = Some(timer);

        self.set_state(BridgeState::Running);
        info!(remote = %self.remote.endpoint(), local = %local, "Bridge running");
        Ok(())
    }

    async fn ensure_local_api(&self) -> BridgeResult<Endpoint> {
        let local = match (&self.configured_local, &self.provider) {
            (Some(local), _) => local.clone(),
            (None, Some(provider)) => provider.provision(self).await?,
            (None, None) => {
                return Err(BridgeError::BridgeSetup(
                    "no local API to receive forwarded events".to_string(),
                ))
            }
        };

        *self.local.lock().unwrap_or_else(|e| e.into_inner()) = Some(local.clone());
        Ok(local)
    }

    /// Stop the bridge: unregister from the remote hub (best effort), shut
    /// the inbound API down, wait for every in-flight callback, then release
    /// the pool.
    pub async fn stop(&self) {
        {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            match *state {
                BridgeState::Stopping | BridgeState::Stopped => return,
                _ => *state = BridgeState::Stopping,
            }
        }

        info!("Stopping");

        self.bus
            .fire(EVENT_HUB_STOP, EventData::new(), EventOrigin::Remote);

        let local = self.local_endpoint();
        if let Some(local) = local {
            if !self.remote.disconnect_remote_events(&local).await {
                warn!(remote = %self.remote.endpoint(), "Could not unregister event forwarding");
            }
        }

        let timer = self.timer.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(timer) = timer {
            timer.abort();
        }

        // No more forwarded events may arrive once the pool drains
        if let Some(provider) = &self.provider {
            provider.shutdown().await;
        }

        // Wait till all responses to the stop event are done
        self.pool.block_till_done().await;
        self.pool.stop();

        self.set_state(BridgeState::Stopped);
        info!("Bridge stopped");
    }
}
