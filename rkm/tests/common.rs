use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use common::{FsType, MountDefinition, MountGroup};
use libvolume::{Executor, Platform, Prober, VolumeContext, VolumeError};

#[derive(Default)]
struct NasState {
    healthy: HashSet<String>,
    // mount target -> mounted source (`//server/path`)
    mounted: HashMap<String, String>,
    calls: Vec<String>,
    broken_mounts: bool,
    // servers whose probe never answers
    silent: HashSet<String>,
}

/// A set of fake SMB servers plus the host's mount table.
///
/// Serves as both the command executor and the reachability prober, so the
/// daemon can be driven end to end without touching the real mount table.
#[derive(Default)]
pub struct FakeNas {
    state: Mutex<NasState>,
}

#[allow(dead_code)]
impl FakeNas {
    pub fn new(healthy: &[&str]) -> Arc<Self> {
        let nas = FakeNas::default();
        {
            let mut state = nas.state.lock().unwrap();
            state.healthy = healthy.iter().map(|s| s.to_string()).collect();
        }
        Arc::new(nas)
    }

    pub fn context(self: &Arc<Self>, verify_mounts: bool) -> VolumeContext {
        VolumeContext::new(self.clone(), self.clone())
            .with_platform(Platform::Linux)
            .with_command_timeout(Duration::from_secs(1))
            .with_probe_timeout(Duration::from_millis(100))
            .with_verify_mounts(verify_mounts)
    }

    pub fn set_healthy(&self, server: &str, healthy: bool) {
        let mut state = self.state.lock().unwrap();
        if healthy {
            state.healthy.insert(server.to_string());
        } else {
            state.healthy.remove(server);
        }
    }

    /// Make probes of `server` hang instead of answering.
    pub fn silence(&self, server: &str) {
        self.state.lock().unwrap().silent.insert(server.to_string());
    }

    /// Make mount commands succeed without anything showing up in the listing.
    pub fn break_mounts(&self, broken: bool) {
        self.state.lock().unwrap().broken_mounts = broken;
    }

    pub fn mounted_source(&self, target: &str) -> Option<String> {
        self.state.lock().unwrap().mounted.get(target).cloned()
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.lock().unwrap().calls.clear();
    }

    /// Number of recorded calls starting with `prefix`.
    pub fn count(&self, prefix: &str) -> usize {
        self.calls()
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }

    /// Number of mount commands issued against `server`.
    pub fn mounts_of(&self, server: &str) -> usize {
        let source = format!("//{server}/");
        self.calls()
            .iter()
            .filter(|c| c.starts_with("mount ") && c.contains(&source))
            .count()
    }
}

fn failed(command: &str, output: &str) -> VolumeError {
    VolumeError::CommandFailed {
        command: command.to_string(),
        status: "exit status: 32".to_string(),
        output: output.to_string(),
    }
}

#[async_trait]
impl Executor for FakeNas {
    async fn exec(
        &self,
        program: &str,
        args: &[String],
        _timeout: Duration,
    ) -> Result<String, VolumeError> {
        let mut state = self.state.lock().unwrap();
        state
            .calls
            .push(format!("{program} {}", args.join(" ")).trim().to_string());
        match program {
            "mount" => {
                // mount -t cifs -o <options> //server/path target
                let source = args[4].clone();
                let target = args[5].clone();
                let server = source
                    .trim_start_matches("//")
                    .split('/')
                    .next()
                    .unwrap_or_default()
                    .to_string();
                if !state.healthy.contains(&server) {
                    return Err(failed(program, "mount error(112): Host is down"));
                }
                if !state.broken_mounts {
                    state.mounted.insert(target, source);
                }
                Ok(String::new())
            }
            "umount" => match state.mounted.remove(&args[0]) {
                Some(_) => Ok(String::new()),
                None => Err(failed(program, "umount: not mounted.")),
            },
            "df" => {
                let mut out =
                    "Filesystem 1024-blocks Used Available Capacity Mounted on\n".to_string();
                out.push_str("/dev/sda1 1000 10 990 1% /\n");
                for (target, source) in &state.mounted {
                    out.push_str(&format!("{source} 1000 10 990 1% {target}\n"));
                }
                Ok(out)
            }
            other => Err(failed(other, "unknown command")),
        }
    }
}

#[async_trait]
impl Prober for FakeNas {
    async fn reachable(&self, host: &str, _port: u16, _timeout: Duration) -> bool {
        let (healthy, silent) = {
            let state = self.state.lock().unwrap();
            (state.healthy.contains(host), state.silent.contains(host))
        };
        if silent {
            tokio::time::sleep(Duration::from_secs(30)).await;
        }
        healthy
    }
}

#[allow(dead_code)]
pub fn mount_group(name: &str, node_ip: &str, servers: &[&str], target: &Path) -> MountGroup {
    let volumes = servers
        .iter()
        .map(|server| MountDefinition {
            fs_type: FsType::Smb,
            server: server.to_string(),
            path: "share".to_string(),
            user: "Administrator".to_string(),
            password: "123456".to_string(),
            mount_to: target.to_string_lossy().to_string(),
        })
        .collect();
    MountGroup::new(name, node_ip, volumes)
}

/// Groups that can be swapped while the daemon is running.
#[allow(dead_code)]
pub type SharedGroups = Arc<Mutex<Vec<MountGroup>>>;

#[allow(dead_code)]
pub fn shared_groups(groups: Vec<MountGroup>) -> SharedGroups {
    Arc::new(Mutex::new(groups))
}
