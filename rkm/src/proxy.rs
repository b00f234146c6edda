//! Failover proxy for one logical mount point.
//!
//! A [`VolumeProxy`] owns the ordered ring of backing volumes of a
//! [`MountGroup`] and knows which of them is active. It never decides on its
//! own to fail over or back; the daemon does that and calls the matching
//! operation.

use common::{Fingerprint, MountGroup, fingerprint, host_number};
use libvolume::{BackingVolume, Volume, VolumeContext, VolumeError, new_volume};
use serde::Serialize;
use tracing::{info, warn};

#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("mount group {0} has no volumes")]
    EmptyGroup(String),
}

/// Which volume of the ring is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection {
    /// Nothing chosen yet, the default volume is used on next access.
    Unresolved,
    /// Offset into the ring, always smaller than the ring length.
    At(usize),
}

/// Point-in-time view of a proxy, as published to status readers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MountStatus {
    pub name: String,
    pub node: String,
    pub server: String,
    pub mount_to: String,
    pub active_index: usize,
    pub default_index: usize,
    pub healthy: bool,
    pub mounted: bool,
}

#[derive(Debug)]
pub struct VolumeProxy {
    name: String,
    node: String,
    fingerprint: Fingerprint,
    volumes: Vec<BackingVolume>,
    selection: Selection,
}

impl VolumeProxy {
    pub fn new(group: &MountGroup, ctx: &VolumeContext) -> Result<Self, ProxyError> {
        if group.volumes.is_empty() {
            return Err(ProxyError::EmptyGroup(group.name.clone()));
        }
        let volumes = group
            .volumes
            .iter()
            .map(|def| new_volume(def, ctx))
            .collect();
        Ok(VolumeProxy {
            name: group.name.clone(),
            node: group.node_ip.clone(),
            fingerprint: fingerprint(group),
            volumes,
            selection: Selection::Unresolved,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn node(&self) -> &str {
        &self.node
    }

    /// Fingerprint of the group this proxy was built from.
    pub fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }

    pub fn volumes(&self) -> &[BackingVolume] {
        &self.volumes
    }

    pub fn selection(&self) -> Selection {
        self.selection
    }

    /// Preferred volume of this host, derived from its node address.
    pub fn default_index(&self) -> usize {
        host_number(&self.node) % self.volumes.len()
    }

    /// Position that is or would be active, without resolving the selection.
    fn position(&self) -> usize {
        match self.selection {
            Selection::Unresolved => self.default_index(),
            Selection::At(i) => i,
        }
    }

    /// Resolve the selection if needed and return the active offset.
    pub fn active_index(&mut self) -> usize {
        let index = self.position();
        self.selection = Selection::At(index);
        index
    }

    pub fn active(&mut self) -> &mut BackingVolume {
        let index = self.active_index();
        &mut self.volumes[index]
    }

    /// Advance to the next volume of the ring and return it.
    ///
    /// From an unresolved selection this resolves to the default volume.
    pub fn select_next(&mut self) -> &mut BackingVolume {
        let next = match self.selection {
            Selection::Unresolved => self.default_index(),
            Selection::At(i) => (i + 1) % self.volumes.len(),
        };
        self.selection = Selection::At(next);
        &mut self.volumes[next]
    }

    pub fn default_volume(&self) -> &BackingVolume {
        &self.volumes[self.default_index()]
    }

    pub fn is_on_default(&self) -> bool {
        self.position() == self.default_index()
    }

    pub fn server(&self) -> &str {
        self.volumes[self.position()].server()
    }

    /// Whether the active volume believes it is mounted.
    pub fn claims_mounted(&self) -> bool {
        self.volumes[self.position()].claims_mounted()
    }

    pub async fn mount(&mut self) -> Result<(), VolumeError> {
        self.active().mount_now().await
    }

    pub async fn unmount(&mut self) -> Result<(), VolumeError> {
        self.active().unmount_now().await
    }

    /// Unmount the active volume and mount the next one of the ring.
    pub async fn failover_to_next(&mut self) -> Result<(), VolumeError> {
        let from = self.server().to_string();
        if let Err(e) = self.unmount().await {
            warn!("{}: unmount of {from} failed, failing over anyway: {e}", self.name);
        }
        let to = self.select_next().server().to_string();
        info!("{}: failing over from {from} to {to}", self.name);
        self.mount().await
    }

    /// Unmount the active volume and go back to the default one.
    pub async fn resume_default(&mut self) -> Result<(), VolumeError> {
        let from = self.server().to_string();
        if let Err(e) = self.unmount().await {
            warn!("{}: unmount of {from} failed before failing back: {e}", self.name);
        }
        self.selection = Selection::Unresolved;
        info!("{}: failing back from {from} to {}", self.name, self.server());
        self.mount().await
    }

    pub async fn is_mounted_now(&mut self) -> bool {
        self.active().is_mounted_now().await
    }

    pub async fn is_healthy(&mut self) -> bool {
        self.active().is_healthy().await
    }

    /// Snapshot of this proxy with the given observations.
    pub fn status(&self, healthy: bool, mounted: bool) -> MountStatus {
        let active = &self.volumes[self.position()];
        MountStatus {
            name: self.name.clone(),
            node: self.node.clone(),
            server: active.server().to_string(),
            mount_to: active.mount_target().to_string(),
            active_index: self.position(),
            default_index: self.default_index(),
            healthy,
            mounted,
        }
    }
}
