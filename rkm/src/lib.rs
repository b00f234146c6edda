//! rkm keeps network shares mounted on a host.
//!
//! Each mount group lists equivalent shares for one mount point. The daemon
//! mounts the host's preferred share, fails over around the ring when its
//! server stops answering and fails back once the preferred one returns.

pub mod config;
pub mod daemon;
pub mod proxy;
pub mod source;
pub mod status;

pub use daemon::{DaemonOptions, VolumeDaemon};
pub use proxy::{MountStatus, VolumeProxy};
pub use source::{FileSource, MountSource, StaticSource};
