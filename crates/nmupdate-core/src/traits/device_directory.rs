// # Device Directory Trait
//
// Defines the interface to the service that knows which network devices
// exist (NetworkManager on Linux).
//
// ## Implementations
//
// - nmcli-based: `nmupdate-nmcli` crate
//
// ## Usage
//
// ```rust,ignore
// use nmupdate_core::DeviceDirectory;
//
// let directory = /* DeviceDirectory implementation */;
// for device in directory.devices().await? {
//     let name = device.interface().await?;
//     let searches = device.ip4_searches().await?.unwrap_or_default();
//     println!("{name}: {searches:?}");
// }
// ```

use async_trait::async_trait;

/// Handle to one device reported by a [`DeviceDirectory`]
///
/// Properties are resolved lazily so a single failing device does not
/// prevent the rest of the listing from being used.
#[async_trait]
pub trait DirectoryDevice: Send + Sync {
    /// Resolve the interface name
    ///
    /// # Returns
    ///
    /// - `Ok(String)`: The interface name
    /// - `Err(Error)`: The name could not be resolved; the device is skipped
    async fn interface(&self) -> Result<String, crate::Error>;

    /// Resolve the DNS search domains of the device's IPv4 configuration
    ///
    /// # Returns
    ///
    /// - `Ok(Some(domains))`: The device has an IPv4 configuration
    /// - `Ok(None)`: The device has no IPv4 configuration
    /// - `Err(Error)`: The property could not be read
    async fn ip4_searches(&self) -> Result<Option<Vec<String>>, crate::Error>;
}

/// Trait for device directory implementations
///
/// Implementations must be thread-safe; the scanner holds them behind an
/// `Arc` and queries them from its own task.
#[async_trait]
pub trait DeviceDirectory: Send + Sync {
    /// List all devices currently known to the directory
    async fn devices(&self) -> Result<Vec<Box<dyn DirectoryDevice>>, crate::Error>;

    /// Get the directory name (for logging)
    fn directory_name(&self) -> &'static str;
}
