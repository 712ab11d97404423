//! Hardware profiling.
//!
//! Detection runs once at startup and yields an immutable [`HardwareProfile`]
//! that is passed by value into the worker pool. Re-detection needs a restart.

pub mod profile;
pub mod query;

pub use profile::{
    AcceleratorInfo, HardwareCapabilities, HardwarePolicy, HardwareProfile, HardwareTier,
    TierParameters,
};
pub use query::{FixedHardwareQuery, HardwareQuery, SystemHardwareQuery, parse_gpu_listing};

/// Detect the host profile, falling back to the CPU-only tier on failure.
pub async fn detect(query: &dyn HardwareQuery, policy: &HardwarePolicy) -> HardwareProfile {
    match query.query().await {
        Ok(caps) => {
            let profile = policy.classify(&caps);
            tracing::info!(
                tier = %profile.tier,
                workers = profile.worker_count,
                batch_size = profile.batch_size,
                accelerator = profile.accelerator.as_deref().unwrap_or("none"),
                "Hardware profile detected"
            );
            profile
        }
        Err(e) => {
            let profile = policy.fallback();
            tracing::warn!(error = %e, tier = %profile.tier, "Hardware detection failed, using fallback profile");
            profile
        }
    }
}
