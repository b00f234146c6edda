//! One reconcile pass over every proxy.

use std::fmt;

use libvolume::{Volume, VolumeError};
use tracing::{debug, error, info};

use super::VolumeDaemon;
use crate::proxy::{MountStatus, VolumeProxy};

/// What a proxy needs to get back to its desired state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Keep,
    Mount,
    FailoverToNext,
    ResumeDefault,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Action::Keep => "keep",
            Action::Mount => "mount",
            Action::FailoverToNext => "failover",
            Action::ResumeDefault => "resume default",
        };
        write!(f, "{s}")
    }
}

/// Inspect a proxy and pick the single action to take this cycle.
///
/// Rules are checked in order and the first match wins:
/// - active server unreachable: fail over
/// - active server reachable but not mounted: mount
/// - away from the default while the default answers: fail back
pub async fn evaluate(proxy: &mut VolumeProxy) -> (Action, MountStatus) {
    if !proxy.is_healthy().await {
        return (Action::FailoverToNext, proxy.status(false, false));
    }
    if !proxy.is_mounted_now().await {
        return (Action::Mount, proxy.status(true, false));
    }
    let status = proxy.status(true, true);
    if !proxy.is_on_default() && proxy.default_volume().is_healthy().await {
        return (Action::ResumeDefault, status);
    }
    (Action::Keep, status)
}

pub async fn apply(proxy: &mut VolumeProxy, action: Action) -> Result<(), VolumeError> {
    match action {
        Action::Keep => Ok(()),
        Action::Mount => proxy.mount().await,
        Action::FailoverToNext => proxy.failover_to_next().await,
        Action::ResumeDefault => proxy.resume_default().await,
    }
}

impl VolumeDaemon {
    /// Refresh the configuration, then bring every proxy one step closer to
    /// its desired state. Proxies are visited in name order.
    pub async fn reconcile_once(&self) {
        let _cycle = self.inner.cycle.lock().await;
        self.refresh().await;

        let proxies = self.proxies().await;
        let mut names: Vec<&String> = proxies.keys().collect();
        names.sort();
        for name in names {
            let slot = &proxies[name];
            let mut proxy = slot.lock().await;
            let (action, status) = evaluate(&mut proxy).await;
            slot.record(status).await;
            if action == Action::Keep {
                debug!("{name}: {} is mounted and healthy", proxy.server());
                continue;
            }
            info!("{name}: {action} on {}", proxy.server());
            if let Err(e) = apply(&mut proxy, action).await {
                error!("{name}: {action} failed: {e}");
            }
        }
    }
}
