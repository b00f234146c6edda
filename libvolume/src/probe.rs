use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpStream;
use tracing::{debug, error, warn};

/// Cheap reachability check against a server's service port.
#[async_trait]
pub trait Prober: Send + Sync {
    async fn reachable(&self, host: &str, port: u16, timeout: Duration) -> bool;
}

/// Opens a TCP connection and closes it straight away.
#[derive(Debug, Default, Clone, Copy)]
pub struct TcpProber;

#[async_trait]
impl Prober for TcpProber {
    async fn reachable(&self, host: &str, port: u16, timeout: Duration) -> bool {
        match tokio::time::timeout(timeout, TcpStream::connect((host, port))).await {
            Ok(Ok(stream)) => {
                drop(stream);
                true
            }
            Ok(Err(e)) => {
                debug!("{host}:{port} refused probe: {e}");
                false
            }
            Err(_) => {
                debug!("{host}:{port} probe timed out after {timeout:?}");
                false
            }
        }
    }
}

/// Grace period on top of the probe window before the guard gives up.
pub const PROBE_SLACK: Duration = Duration::from_millis(500);

/// Run a probe in its own task so a panicking or stuck prober reads as
/// unreachable.
pub async fn reachable_guarded(
    prober: Arc<dyn Prober>,
    host: &str,
    port: u16,
    timeout: Duration,
) -> bool {
    let target = host.to_string();
    let mut task = tokio::spawn(async move { prober.reachable(&target, port, timeout).await });
    match tokio::time::timeout(timeout + PROBE_SLACK, &mut task).await {
        Ok(Ok(reachable)) => reachable,
        Ok(Err(e)) => {
            error!("probe of {host}:{port} failed unexpectedly: {e}");
            false
        }
        Err(_) => {
            task.abort();
            warn!("probe of {host}:{port} did not finish within {timeout:?}");
            false
        }
    }
}
