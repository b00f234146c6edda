//! The reconcile daemon.
//!
//! [`VolumeDaemon`] owns one [`VolumeProxy`] per mount group. Every cycle it
//! refreshes the configuration and then walks all proxies, mounting, failing
//! over or failing back as the state machine in [`reconcile`] decides.
//!
//! The proxy map is never mutated in place: a configuration change builds a
//! complete new map and swaps it in, so readers always see either the old or
//! the new map and never a half built entry.
//!
//! # Example
//! ```ignore
//! let daemon = VolumeDaemon::new(DaemonOptions::default(), source, VolumeContext::default());
//! let handle = daemon.start().await;
//! handle.await?;
//! ```

pub mod reconcile;
pub mod refresh;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use common::Fingerprint;
use libvolume::VolumeContext;
use tokio::sync::{Mutex, MutexGuard, RwLock};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::proxy::{MountStatus, VolumeProxy};
use crate::source::MountSource;

/// Lower bound of the steady-state check interval, to bound probe load on servers.
pub const MIN_CHECK_INTERVAL: Duration = Duration::from_secs(5);
/// Poll interval while waiting for the initial mounts to converge.
pub const STARTUP_POLL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
pub struct DaemonOptions {
    pub check_interval: Duration,
    pub startup_poll_interval: Duration,
}

impl Default for DaemonOptions {
    fn default() -> Self {
        DaemonOptions {
            check_interval: MIN_CHECK_INTERVAL,
            startup_poll_interval: STARTUP_POLL_INTERVAL,
        }
    }
}

impl DaemonOptions {
    pub fn effective_check_interval(&self) -> Duration {
        self.check_interval.max(MIN_CHECK_INTERVAL)
    }
}

/// A proxy plus what was last observed about it.
///
/// The proxy lock serializes every operation on one mount point; the observed
/// status can be read without waiting for a running mount command.
pub struct ProxySlot {
    fingerprint: Fingerprint,
    proxy: Mutex<VolumeProxy>,
    observed: RwLock<MountStatus>,
}

impl ProxySlot {
    pub fn new(proxy: VolumeProxy) -> Self {
        ProxySlot {
            fingerprint: proxy.fingerprint().clone(),
            observed: RwLock::new(proxy.status(false, false)),
            proxy: Mutex::new(proxy),
        }
    }

    pub fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }

    pub async fn lock(&self) -> MutexGuard<'_, VolumeProxy> {
        self.proxy.lock().await
    }

    pub async fn observed(&self) -> MountStatus {
        self.observed.read().await.clone()
    }

    pub(crate) async fn record(&self, status: MountStatus) {
        *self.observed.write().await = status;
    }
}

pub type ProxyMap = HashMap<String, Arc<ProxySlot>>;

struct Inner {
    options: DaemonOptions,
    source: Arc<dyn MountSource>,
    ctx: VolumeContext,
    proxies: RwLock<Arc<ProxyMap>>,
    /// Fingerprint of the last configuration that was applied.
    applied: Mutex<Fingerprint>,
    /// Held for the duration of a cycle so cycles never overlap.
    cycle: Mutex<()>,
    shutdown: CancellationToken,
}

#[derive(Clone)]
pub struct VolumeDaemon {
    inner: Arc<Inner>,
}

impl VolumeDaemon {
    pub fn new(options: DaemonOptions, source: Arc<dyn MountSource>, ctx: VolumeContext) -> Self {
        VolumeDaemon {
            inner: Arc::new(Inner {
                options,
                source,
                ctx,
                proxies: RwLock::new(Arc::new(ProxyMap::new())),
                applied: Mutex::new(Fingerprint::default()),
                cycle: Mutex::new(()),
                shutdown: CancellationToken::new(),
            }),
        }
    }

    pub fn options(&self) -> &DaemonOptions {
        &self.inner.options
    }

    /// Current proxy map. The snapshot stays valid while the daemon swaps in a new one.
    pub async fn proxies(&self) -> Arc<ProxyMap> {
        self.inner.proxies.read().await.clone()
    }

    pub async fn proxy(&self, name: &str) -> Option<Arc<ProxySlot>> {
        self.proxies().await.get(name).cloned()
    }

    /// Last observed status of every mount group, ordered by name.
    pub async fn statuses(&self) -> Vec<MountStatus> {
        let proxies = self.proxies().await;
        let mut statuses = Vec::with_capacity(proxies.len());
        for slot in proxies.values() {
            statuses.push(slot.observed().await);
        }
        statuses.sort_by(|a, b| a.name.cmp(&b.name));
        statuses
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.inner.shutdown.clone()
    }

    /// Stop starting new cycles. A cycle that is already running completes.
    pub fn shutdown(&self) {
        self.inner.shutdown.cancel();
    }

    /// Whether every mount group is healthy and mounted right now.
    pub async fn is_converged(&self) -> bool {
        let proxies = self.proxies().await;
        for slot in proxies.values() {
            let mut proxy = slot.lock().await;
            let healthy = proxy.is_healthy().await;
            let mounted = healthy && proxy.is_mounted_now().await;
            slot.record(proxy.status(healthy, mounted)).await;
            if !mounted {
                return false;
            }
        }
        true
    }

    /// Reconcile until every mount converged, then keep reconciling in the
    /// background every check interval.
    ///
    /// Returns once converged (or once shutdown was requested) with the handle
    /// of the background loop.
    pub async fn start(&self) -> JoinHandle<()> {
        let token = self.shutdown_token();
        loop {
            let daemon = self.clone();
            let step = tokio::spawn(async move {
                daemon.reconcile_once().await;
                daemon.is_converged().await
            });
            match step.await {
                Ok(true) => {
                    info!("All mounts are healthy and mounted");
                    break;
                }
                Ok(false) => {}
                Err(e) => error!("Startup reconcile cycle aborted: {e}"),
            }
            tokio::select! {
                _ = token.cancelled() => break,
                _ = sleep(self.inner.options.startup_poll_interval) => {}
            }
        }

        let daemon = self.clone();
        tokio::spawn(async move { daemon.run().await })
    }

    async fn run(&self) {
        let interval = self.inner.options.effective_check_interval();
        let token = self.shutdown_token();
        info!("Reconciling mounts every {interval:?}");
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = sleep(interval) => {}
            }
            let daemon = self.clone();
            if let Err(e) = tokio::spawn(async move { daemon.reconcile_once().await }).await {
                error!("Reconcile cycle aborted: {e}");
            }
        }
        info!("Reconcile loop stopped");
    }
}
