use std::fmt;

use async_trait::async_trait;
use common::MountDefinition;
use tracing::{debug, error, info, warn};

use crate::error::VolumeError;
use crate::platform::Platform;
use crate::probe::reachable_guarded;
use crate::volume::{Volume, VolumeContext};

/// Well-known SMB service port used for health probes.
pub const SMB_PORT: u16 = 445;

/// An SMB/CIFS share mounted with the platform's own tools.
///
/// `mounted` is set as soon as a mount command has been issued, before the
/// result is known. With `verify_mounts` off, a failed mount is therefore only
/// noticed by the next [`Volume::is_mounted_now`] check.
pub struct SmbVolume {
    def: MountDefinition,
    mounted: bool,
    ctx: VolumeContext,
}

impl fmt::Debug for SmbVolume {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SmbVolume")
            .field("server", &self.def.server)
            .field("path", &self.def.path)
            .field("mount_to", &self.def.mount_to)
            .field("mounted", &self.mounted)
            .finish()
    }
}

impl SmbVolume {
    pub fn new(mut def: MountDefinition, ctx: VolumeContext) -> Self {
        if ctx.platform.is_unix_like() {
            def.path = to_unix_absolute(&def.path);
            def.mount_to = to_unix_absolute(&def.mount_to);
        }
        SmbVolume {
            def,
            mounted: false,
            ctx,
        }
    }

    pub fn definition(&self) -> &MountDefinition {
        &self.def
    }

    fn unsupported(&self, operation: &'static str) -> VolumeError {
        VolumeError::UnsupportedPlatform {
            operation,
            platform: self.ctx.platform.to_string(),
        }
    }

    pub(crate) fn mount_command(&self) -> Result<(String, Vec<String>), VolumeError> {
        let d = &self.def;
        match self.ctx.platform {
            Platform::Linux => Ok((
                "mount".to_string(),
                vec![
                    "-t".to_string(),
                    "cifs".to_string(),
                    "-o".to_string(),
                    format!("username={},password={}", d.user, d.password),
                    format!("//{}{}", d.server, d.path),
                    d.mount_to.clone(),
                ],
            )),
            Platform::MacOs => Ok((
                "mount".to_string(),
                vec![
                    "-t".to_string(),
                    "smbfs".to_string(),
                    format!("//{}:{}@{}{}", d.user, d.password, d.server, d.path),
                    d.mount_to.clone(),
                ],
            )),
            Platform::Windows => Ok((
                "cmd.exe".to_string(),
                vec![
                    "/c".to_string(),
                    "net".to_string(),
                    "use".to_string(),
                    d.mount_to.clone(),
                    unc_path(&d.server, &d.path),
                    d.password.clone(),
                    format!("/user:{}", d.user),
                ],
            )),
            Platform::Other(_) => Err(self.unsupported("mount")),
        }
    }

    pub(crate) fn unmount_command(&self) -> Result<(String, Vec<String>), VolumeError> {
        match self.ctx.platform {
            Platform::Linux | Platform::MacOs => {
                Ok(("umount".to_string(), vec![self.def.mount_to.clone()]))
            }
            Platform::Windows => Ok((
                "cmd.exe".to_string(),
                vec![
                    "/c".to_string(),
                    "net".to_string(),
                    "use".to_string(),
                    self.def.mount_to.clone(),
                    "/del".to_string(),
                    "/y".to_string(),
                ],
            )),
            Platform::Other(_) => Err(self.unsupported("unmount")),
        }
    }

    fn listing_command(&self) -> Option<(String, Vec<String>)> {
        match self.ctx.platform {
            Platform::Linux | Platform::MacOs => Some(("df".to_string(), vec!["-P".to_string()])),
            Platform::Windows => Some((
                "cmd.exe".to_string(),
                vec![
                    "/c".to_string(),
                    "net".to_string(),
                    "use".to_string(),
                    self.def.mount_to.clone(),
                ],
            )),
            Platform::Other(_) => None,
        }
    }

    /// Whether a mount listing shows our server on our target.
    fn listing_matches(&self, listing: &str) -> bool {
        let server = self.def.server.as_str();
        let target = self.def.mount_to.as_str();
        match self.ctx.platform {
            // `df -P` prints one filesystem per line, source first and mount point last.
            Platform::Linux | Platform::MacOs => listing.lines().any(|line| {
                let mut fields = line.split_whitespace();
                fields.next().and_then(source_server) == Some(server)
                    && fields.last() == Some(target)
            }),
            Platform::Windows => {
                let remote = unc_path(server, &self.def.path).to_lowercase();
                let listing = listing.to_lowercase();
                listing.contains(&remote)
                    && listing.contains(&target.to_lowercase())
                    && listing.contains("ok")
            }
            Platform::Other(_) => false,
        }
    }

    fn target_dir(&self) -> String {
        match self.ctx.platform {
            // a bare drive letter such as `Y:` needs a separator to be a directory
            Platform::Windows => format!("{}\\", self.def.mount_to),
            _ => self.def.mount_to.clone(),
        }
    }
}

#[async_trait]
impl Volume for SmbVolume {
    async fn mount_now(&mut self) -> Result<(), VolumeError> {
        let (program, args) = self.mount_command()?;
        if let Err(e) = self.unmount_now().await {
            debug!("ignoring unmount error before mounting {}: {e}", self.def.server);
        }

        if self.ctx.platform.is_unix_like() {
            if let Err(e) = tokio::fs::create_dir_all(&self.def.mount_to).await {
                warn!("failed to create mount target {}: {e}", self.def.mount_to);
            }
        }

        info!(
            "mounting //{}{} at {}",
            self.def.server, self.def.path, self.def.mount_to
        );
        let result = self
            .ctx
            .executor
            .exec(&program, &args, self.ctx.command_timeout)
            .await;
        self.mounted = true;
        match result {
            Ok(out) => info!("{} is mounted: {}", self.def.server, out.trim()),
            Err(e) => {
                error!("failed to mount {}: {e}", self.def.server);
                return Err(e);
            }
        }

        if self.ctx.verify_mounts && !self.is_mounted_now().await {
            error!(
                "{} is not visible at {} after mounting",
                self.def.server, self.def.mount_to
            );
            return Err(VolumeError::MountFailed {
                server: self.def.server.clone(),
                target: self.def.mount_to.clone(),
            });
        }
        Ok(())
    }

    async fn unmount_now(&mut self) -> Result<(), VolumeError> {
        let command = self.unmount_command();
        self.mounted = false;
        let (program, args) = command?;
        let result = self
            .ctx
            .executor
            .exec(&program, &args, self.ctx.command_timeout)
            .await;
        match &result {
            Ok(out) => info!("{} is unmounted: {}", self.def.server, out.trim()),
            Err(e) => debug!("unmount of {} reported: {e}", self.def.mount_to),
        }
        result.map(|_| ())
    }

    async fn is_mounted_now(&self) -> bool {
        if !self.mounted || !self.is_healthy().await {
            return false;
        }

        match tokio::fs::metadata(self.target_dir()).await {
            Ok(meta) if meta.is_dir() => {}
            _ => {
                debug!("mount target {} is not a directory", self.def.mount_to);
                return false;
            }
        }

        let Some((program, args)) = self.listing_command() else {
            return false;
        };
        let listing = match self
            .ctx
            .executor
            .exec(&program, &args, self.ctx.command_timeout)
            .await
        {
            Ok(out) => out,
            // df exits non-zero when any filesystem is unreadable but still lists the rest
            Err(e) => match e.output() {
                Some(out) => out.to_string(),
                None => {
                    debug!("mount listing failed: {e}");
                    return false;
                }
            },
        };
        self.listing_matches(&listing)
    }

    async fn is_healthy(&self) -> bool {
        let healthy = reachable_guarded(
            self.ctx.prober.clone(),
            &self.def.server,
            SMB_PORT,
            self.ctx.probe_timeout,
        )
        .await;
        if healthy {
            debug!("{} is healthy", self.def.server);
        } else {
            info!("{} is not healthy", self.def.server);
        }
        healthy
    }

    fn server(&self) -> &str {
        &self.def.server
    }

    fn mount_target(&self) -> &str {
        &self.def.mount_to
    }

    fn claims_mounted(&self) -> bool {
        self.mounted
    }
}

fn to_unix_absolute(p: &str) -> String {
    let p = p.replace('\\', "/");
    if p.starts_with('/') { p } else { format!("/{p}") }
}

/// Server of a `//server/share` or `//user@server/share` listing source.
fn source_server(source: &str) -> Option<&str> {
    let host = source.strip_prefix("//")?.split('/').next()?;
    host.rsplit('@').next()
}

fn unc_path(server: &str, path: &str) -> String {
    let share = path.trim_start_matches(['/', '\\']).replace('/', "\\");
    format!("\\\\{server}\\{share}")
}
