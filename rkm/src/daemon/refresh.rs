//! Applying a new set of mount groups to a running daemon.

use std::sync::Arc;

use common::{MountGroup, fingerprint};
use libvolume::VolumeContext;
use tracing::{debug, error, info, warn};

use super::{ProxyMap, ProxySlot, VolumeDaemon};
use crate::proxy::VolumeProxy;

impl VolumeDaemon {
    /// Load the desired groups and swap in a new proxy map if they changed.
    ///
    /// Returns whether a new map was applied. An empty or unreadable
    /// configuration never tears down existing mounts.
    pub async fn refresh(&self) -> bool {
        let groups = match self.inner.source.load().await {
            Ok(groups) => groups,
            Err(e) => {
                warn!("Failed to load mount groups, keeping current mounts: {e:#}");
                return false;
            }
        };
        if groups.is_empty() {
            debug!("No mount groups configured");
            return false;
        }

        let incoming = fingerprint(&groups);
        let mut applied = self.inner.applied.lock().await;
        if incoming.same_as(&applied) {
            return false;
        }

        let current = self.proxies().await;
        let next = merge(&current, &groups, &self.inner.ctx).await;
        info!(
            "Applied {} mount groups (fingerprint {incoming}, was {})",
            next.len(),
            *applied
        );
        *self.inner.proxies.write().await = Arc::new(next);
        *applied = incoming;
        true
    }
}

/// Build the proxy map for `groups`, reusing every unchanged proxy of `current`.
///
/// Groups that disappeared are unmounted. A group whose content changed gets a
/// fresh proxy; the old one is unmounted first if it still holds the target.
pub(crate) async fn merge(
    current: &ProxyMap,
    groups: &[MountGroup],
    ctx: &VolumeContext,
) -> ProxyMap {
    let mut next = ProxyMap::with_capacity(groups.len());
    for group in groups {
        match VolumeProxy::new(group, ctx) {
            Ok(proxy) => {
                let slot = Arc::new(ProxySlot::new(proxy));
                if next.insert(group.name.clone(), slot).is_some() {
                    warn!("Mount group {} is defined twice, using the last one", group.name);
                }
            }
            Err(e) => error!("Skipping mount group: {e}"),
        }
    }

    for (name, old) in current {
        let Some(new) = next.get(name) else {
            info!("Mount group {name} was removed, unmounting");
            if let Err(e) = old.lock().await.unmount().await {
                warn!("{name}: unmount failed: {e}");
            }
            continue;
        };
        if old.fingerprint().same_as(new.fingerprint()) {
            next.insert(name.clone(), old.clone());
            continue;
        }
        let mut proxy = old.lock().await;
        if proxy.claims_mounted() {
            info!("Mount group {name} changed, unmounting {}", proxy.server());
            if let Err(e) = proxy.unmount().await {
                warn!("{name}: unmount failed: {e}");
            }
        }
    }
    next
}
