use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum VolumeError {
    #[error("{operation} is not supported on {platform}")]
    UnsupportedPlatform {
        operation: &'static str,
        platform: String,
    },
    #[error("command is empty")]
    EmptyCommand,
    #[error("`{command}` timed out after {timeout:?}")]
    Timeout { command: String, timeout: Duration },
    #[error("`{command}` exited with {status}: {output}")]
    CommandFailed {
        command: String,
        status: String,
        output: String,
    },
    #[error("failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{server} was not mounted at {target} after mount command")]
    MountFailed { server: String, target: String },
}

impl VolumeError {
    /// Whether retrying on a later cycle can possibly succeed.
    pub fn is_retriable(&self) -> bool {
        !matches!(
            self,
            VolumeError::UnsupportedPlatform { .. } | VolumeError::EmptyCommand
        )
    }

    /// Output captured from the command, if it ran to completion.
    pub fn output(&self) -> Option<&str> {
        match self {
            VolumeError::CommandFailed { output, .. } => Some(output),
            _ => None,
        }
    }
}
