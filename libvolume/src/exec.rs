use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::VolumeError;

/// Runs external commands on behalf of a volume.
#[async_trait]
pub trait Executor: Send + Sync {
    /// Run `program` with `args` until it exits or `timeout` expires and
    /// return its combined stdout and stderr.
    ///
    /// A command that outlives the timeout is killed before this returns.
    async fn exec(
        &self,
        program: &str,
        args: &[String],
        timeout: Duration,
    ) -> Result<String, VolumeError>;
}

/// [`Executor`] backed by real child processes.
#[derive(Debug, Default, Clone, Copy)]
pub struct ShellExecutor;

#[async_trait]
impl Executor for ShellExecutor {
    async fn exec(
        &self,
        program: &str,
        args: &[String],
        timeout: Duration,
    ) -> Result<String, VolumeError> {
        if program.is_empty() {
            return Err(VolumeError::EmptyCommand);
        }
        // Arguments may carry credentials, so only the program name is logged.
        debug!("Executing {program} with {} args", args.len());

        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(windows)]
        {
            const CREATE_NO_WINDOW: u32 = 0x0800_0000;
            cmd.creation_flags(CREATE_NO_WINDOW);
        }

        let child = cmd.spawn().map_err(|source| VolumeError::Spawn {
            command: program.to_string(),
            source,
        })?;

        // Dropping the wait future on timeout drops the child, which kills it.
        let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(res) => res.map_err(|source| VolumeError::Spawn {
                command: program.to_string(),
                source,
            })?,
            Err(_) => {
                warn!("{program} did not finish within {timeout:?}, killed");
                return Err(VolumeError::Timeout {
                    command: program.to_string(),
                    timeout,
                });
            }
        };

        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        text.push_str(&String::from_utf8_lossy(&output.stderr));
        if output.status.success() {
            Ok(text)
        } else {
            Err(VolumeError::CommandFailed {
                command: program.to_string(),
                status: output.status.to_string(),
                output: text,
            })
        }
    }
}
