pub mod fingerprint;
pub mod mount;
pub mod node;

pub use fingerprint::{Fingerprint, fingerprint};
pub use mount::{FsType, MountDefinition, MountGroup};
pub use node::host_number;
