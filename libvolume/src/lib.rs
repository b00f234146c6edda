//! Backing volumes for rkm.
//!
//! A backing volume is one concrete network share that can be mounted,
//! unmounted, health checked and inspected independently. Every protocol is a
//! variant of [`BackingVolume`]; the shell-outs and reachability probes go
//! through the [`Executor`] and [`Prober`] seams so they can be replaced.

pub mod error;
pub mod exec;
pub mod platform;
pub mod probe;
pub mod smb;
pub mod volume;

pub use error::VolumeError;
pub use exec::{Executor, ShellExecutor};
pub use platform::Platform;
pub use probe::{Prober, TcpProber};
pub use smb::SmbVolume;
pub use volume::{BackingVolume, Volume, VolumeContext, new_volume};
