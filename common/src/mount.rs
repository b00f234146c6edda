use std::fmt;

use serde::{Deserialize, Serialize};

/// Filesystem protocol of a mountable share.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FsType {
    Smb,
}

impl fmt::Display for FsType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FsType::Smb => write!(f, "smb"),
        }
    }
}

/// One concrete remote share and where to mount it locally.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MountDefinition {
    pub fs_type: FsType,
    pub server: String,
    pub path: String,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub password: String,
    pub mount_to: String,
}

// Hand-written so credentials never end up in logs.
impl fmt::Debug for MountDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MountDefinition")
            .field("fs_type", &self.fs_type)
            .field("server", &self.server)
            .field("path", &self.path)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("mount_to", &self.mount_to)
            .finish()
    }
}

/// A logical mount point: a name plus an ordered ring of interchangeable shares.
///
/// The order of `volumes` is the failover order, and the node address decides
/// which of them this host prefers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MountGroup {
    pub name: String,
    #[serde(default)]
    pub node_ip: String,
    #[serde(alias = "nas")]
    pub volumes: Vec<MountDefinition>,
}

impl MountGroup {
    pub fn new<N, I>(name: N, node_ip: I, volumes: Vec<MountDefinition>) -> Self
    where
        N: Into<String>,
        I: Into<String>,
    {
        MountGroup {
            name: name.into(),
            node_ip: node_ip.into(),
            volumes,
        }
    }

    /// Parse a YAML list of mount groups.
    pub fn list_from_yaml(content: &str) -> Result<Vec<MountGroup>, serde_yaml::Error> {
        serde_yaml::from_str(content)
    }
}
