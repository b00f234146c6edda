//! Where the desired set of mount groups comes from.

use std::path::PathBuf;
use std::time::SystemTime;

use anyhow::{Context, Result};
use async_trait::async_trait;
use common::MountGroup;
use tokio::sync::Mutex;
use tracing::debug;

/// Supplies the full desired set of mount groups.
///
/// Called once per reconcile cycle, so implementations must be cheap or
/// cache internally.
#[async_trait]
pub trait MountSource: Send + Sync {
    async fn load(&self) -> Result<Vec<MountGroup>>;
}

/// A fixed list of groups.
#[derive(Debug, Clone, Default)]
pub struct StaticSource(pub Vec<MountGroup>);

#[async_trait]
impl MountSource for StaticSource {
    async fn load(&self) -> Result<Vec<MountGroup>> {
        Ok(self.0.clone())
    }
}

/// Groups produced by a closure.
pub struct FnSource<F>(pub F);

#[async_trait]
impl<F> MountSource for FnSource<F>
where
    F: Fn() -> Vec<MountGroup> + Send + Sync,
{
    async fn load(&self) -> Result<Vec<MountGroup>> {
        Ok((self.0)())
    }
}

/// Groups read from a YAML file, re-parsed only when the file changes.
pub struct FileSource {
    path: PathBuf,
    default_node_ip: Option<String>,
    cache: Mutex<Option<(SystemTime, Vec<MountGroup>)>>,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        FileSource {
            path: path.into(),
            default_node_ip: None,
            cache: Mutex::new(None),
        }
    }

    /// Node address used for groups that do not name one.
    pub fn with_default_node_ip(mut self, node_ip: Option<String>) -> Self {
        self.default_node_ip = node_ip;
        self
    }

    fn parse(&self, content: &str) -> Result<Vec<MountGroup>> {
        let mut groups = MountGroup::list_from_yaml(content)
            .with_context(|| format!("Failed to parse mount groups in {:?}", self.path))?;
        if let Some(node_ip) = &self.default_node_ip {
            groups
                .iter_mut()
                .filter(|g| g.node_ip.is_empty())
                .for_each(|g| g.node_ip = node_ip.clone());
        }
        Ok(groups)
    }
}

#[async_trait]
impl MountSource for FileSource {
    async fn load(&self) -> Result<Vec<MountGroup>> {
        let modified = tokio::fs::metadata(&self.path)
            .await
            .and_then(|m| m.modified())
            .with_context(|| format!("Failed to stat mounts file {:?}", self.path))?;

        let mut cache = self.cache.lock().await;
        if let Some((seen, groups)) = &*cache {
            if *seen == modified {
                return Ok(groups.clone());
            }
        }

        let content = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("Failed to read mounts file {:?}", self.path))?;
        let groups = self.parse(&content)?;
        debug!("Loaded {} mount groups from {:?}", groups.len(), self.path);
        *cache = Some((modified, groups.clone()));
        Ok(groups)
    }
}
