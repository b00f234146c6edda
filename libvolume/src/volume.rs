use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use common::{FsType, MountDefinition};

use crate::error::VolumeError;
use crate::exec::{Executor, ShellExecutor};
use crate::platform::Platform;
use crate::probe::{Prober, TcpProber};
use crate::smb::SmbVolume;

pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(3);

/// Capabilities shared by every kind of backing volume.
#[async_trait]
pub trait Volume: Send + Sync {
    /// Unmount whatever sits on the target, then mount this share.
    async fn mount_now(&mut self) -> Result<(), VolumeError>;

    /// Unmount the target. The volume stops claiming the mount even if the
    /// command fails.
    async fn unmount_now(&mut self) -> Result<(), VolumeError>;

    /// Best-effort check that this share is really mounted on its target.
    async fn is_mounted_now(&self) -> bool;

    /// Whether the server answers on its service port.
    async fn is_healthy(&self) -> bool;

    fn server(&self) -> &str;

    fn mount_target(&self) -> &str;

    /// Whether this process believes it has the share mounted.
    fn claims_mounted(&self) -> bool;
}

/// Collaborators and tunables handed to every volume.
#[derive(Clone)]
pub struct VolumeContext {
    pub executor: Arc<dyn Executor>,
    pub prober: Arc<dyn Prober>,
    pub platform: Platform,
    pub command_timeout: Duration,
    pub probe_timeout: Duration,
    /// Require a successful mount check before reporting a mount as done.
    pub verify_mounts: bool,
}

impl Default for VolumeContext {
    fn default() -> Self {
        VolumeContext::new(Arc::new(ShellExecutor), Arc::new(TcpProber))
    }
}

impl VolumeContext {
    pub fn new(executor: Arc<dyn Executor>, prober: Arc<dyn Prober>) -> Self {
        VolumeContext {
            executor,
            prober,
            platform: Platform::current(),
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            verify_mounts: false,
        }
    }

    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = platform;
        self
    }

    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    pub fn with_verify_mounts(mut self, verify: bool) -> Self {
        self.verify_mounts = verify;
        self
    }
}

/// The closed set of supported volume kinds.
#[derive(Debug)]
pub enum BackingVolume {
    Smb(SmbVolume),
}

impl BackingVolume {
    pub fn fs_type(&self) -> FsType {
        match self {
            BackingVolume::Smb(_) => FsType::Smb,
        }
    }
}

#[async_trait]
impl Volume for BackingVolume {
    async fn mount_now(&mut self) -> Result<(), VolumeError> {
        match self {
            BackingVolume::Smb(v) => v.mount_now().await,
        }
    }

    async fn unmount_now(&mut self) -> Result<(), VolumeError> {
        match self {
            BackingVolume::Smb(v) => v.unmount_now().await,
        }
    }

    async fn is_mounted_now(&self) -> bool {
        match self {
            BackingVolume::Smb(v) => v.is_mounted_now().await,
        }
    }

    async fn is_healthy(&self) -> bool {
        match self {
            BackingVolume::Smb(v) => v.is_healthy().await,
        }
    }

    fn server(&self) -> &str {
        match self {
            BackingVolume::Smb(v) => v.server(),
        }
    }

    fn mount_target(&self) -> &str {
        match self {
            BackingVolume::Smb(v) => v.mount_target(),
        }
    }

    fn claims_mounted(&self) -> bool {
        match self {
            BackingVolume::Smb(v) => v.claims_mounted(),
        }
    }
}

/// Build the backing volume matching a definition's protocol.
pub fn new_volume(def: &MountDefinition, ctx: &VolumeContext) -> BackingVolume {
    match def.fs_type {
        FsType::Smb => BackingVolume::Smb(SmbVolume::new(def.clone(), ctx.clone())),
    }
}
