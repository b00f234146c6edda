use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use libvolume::VolumeContext;
use serde::Deserialize;

use crate::daemon::{DaemonOptions, STARTUP_POLL_INTERVAL};
use crate::source::FileSource;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    // seconds between two steady-state reconcile cycles, raised to at least 5
    #[serde(default = "default_check_interval_secs")]
    pub check_interval_secs: u64,
    // address of this host, used for groups that do not set node_ip
    #[serde(default)]
    pub node_ip: Option<String>,
    // YAML list of mount groups, relative paths resolve against the config file
    pub mounts_file: PathBuf,
    #[serde(default)]
    pub verify_mounts: bool,
    // ip:port of the status endpoint, disabled when unset
    #[serde(default)]
    pub status_addr: Option<String>,
    #[serde(default = "default_command_timeout_secs")]
    pub command_timeout_secs: u64,
    #[serde(default = "default_probe_timeout_secs")]
    pub probe_timeout_secs: u64,
}

fn default_check_interval_secs() -> u64 {
    30
}

fn default_command_timeout_secs() -> u64 {
    10
}

fn default_probe_timeout_secs() -> u64 {
    3
}

impl Config {
    pub fn daemon_options(&self) -> DaemonOptions {
        DaemonOptions {
            check_interval: Duration::from_secs(self.check_interval_secs),
            startup_poll_interval: STARTUP_POLL_INTERVAL,
        }
    }

    pub fn volume_context(&self) -> VolumeContext {
        VolumeContext::default()
            .with_command_timeout(Duration::from_secs(self.command_timeout_secs))
            .with_probe_timeout(Duration::from_secs(self.probe_timeout_secs))
            .with_verify_mounts(self.verify_mounts)
    }

    pub fn mount_source(&self) -> FileSource {
        FileSource::new(&self.mounts_file).with_default_node_ip(self.node_ip.clone())
    }

    fn validate(&self) -> Result<()> {
        if self.command_timeout_secs == 0 {
            bail!("command_timeout_secs must be greater than 0");
        }
        if self.probe_timeout_secs == 0 {
            bail!("probe_timeout_secs must be greater than 0");
        }
        Ok(())
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config from {}", path.display()))?;
    let mut cfg: Config = serde_yaml::from_str(&content).context("Failed to parse YAML config")?;
    if cfg.mounts_file.is_relative() {
        if let Some(dir) = path.parent() {
            cfg.mounts_file = dir.join(&cfg.mounts_file);
        }
    }
    cfg.validate()?;
    Ok(cfg)
}
