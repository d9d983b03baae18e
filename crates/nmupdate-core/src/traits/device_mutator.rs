// # Device Mutator Trait
//
// Defines the interface for changing a device's DNS search domains.
//
// ## Implementations
//
// - nmcli-based: `nmupdate-nmcli` crate

use async_trait::async_trait;

/// Captured output of a device modification
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MutationOutput {
    /// Text printed by the underlying mechanism, trimmed
    pub output: String,
}

impl MutationOutput {
    pub fn new(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
        }
    }
}

/// Trait for device mutator implementations
///
/// A single call sets the device's DNS search property to `domains`
/// (comma-joined by the implementation). An empty slice clears the property.
///
/// Callers log failures and move on; implementations must not retry.
#[async_trait]
pub trait DeviceMutator: Send + Sync {
    /// Set the DNS search domains of `device`
    async fn set_dns_search(
        &self,
        device: &str,
        domains: &[String],
    ) -> Result<MutationOutput, crate::Error>;

    /// Get the mutator name (for logging)
    fn mutator_name(&self) -> &'static str;
}
