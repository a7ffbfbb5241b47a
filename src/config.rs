use std::time::Duration;

/// Baseline receipt reference number used when the staging area is empty.
pub const REFERENCE_SEED: u32 = 154_687;

/// Tunables for the registry runtime.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Upper bound on any single storage call. An elapsed timeout maps to
    /// `RegistryError::StorageTimeout` and leaves no partial mutation.
    pub storage_timeout: Duration,
    /// Seed for the monotonically increasing transaction reference number.
    pub reference_seed: u32,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            storage_timeout: Duration::from_secs(5),
            reference_seed: REFERENCE_SEED,
        }
    }
}
