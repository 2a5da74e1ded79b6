//! Host filesystem abstraction
//!
//! Mount-point resolution, size measurement and filesystem growing. The
//! monitoring loop only ever talks to a [`HostFilesystem`]; the real
//! implementation shells out to the host tools in [`host`].

mod host;

pub use host::LocalFilesystem;

use anyhow::Result;

pub use async_trait::async_trait;

/// Trait for host filesystem access
#[async_trait]
pub trait HostFilesystem: Send + Sync {
    /// Resolve the mount point of the filesystem backed by a volume
    async fn mount_point(&self, volume_id: &str) -> Result<String>;

    /// Total size of the filesystem at `mount_point` in GiB
    async fn filesystem_size_gib(&self, mount_point: &str) -> Result<f64>;

    /// Used space of the filesystem at `mount_point` in GiB
    async fn used_gib(&self, mount_point: &str) -> Result<f64>;

    /// Grow the filesystem at `mount_point` to consume all available
    /// device capacity
    async fn grow(&self, mount_point: &str) -> Result<()>;
}
