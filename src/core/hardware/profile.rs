//! Hardware tiers and the policy table mapping capabilities to pool sizing.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Detected compute class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HardwareTier {
    /// Discrete accelerator above the high-end thresholds
    HighEnd,
    /// Accelerator present but below the high-end thresholds
    Standard,
    /// No accelerator
    CpuOnly,
}

impl HardwareTier {
    #[inline]
    pub const fn as_str(&self) -> &'static str {
        match self {
            HardwareTier::HighEnd => "high_end",
            HardwareTier::Standard => "standard",
            HardwareTier::CpuOnly => "cpu_only",
        }
    }
}

impl fmt::Display for HardwareTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Raw accelerator facts reported by a [`HardwareQuery`](super::HardwareQuery)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcceleratorInfo {
    pub name: String,
    /// Device memory in GiB
    pub memory_gb: f64,
    /// Compute capability as major.minor, e.g. 8.6
    pub compute_capability: f64,
}

/// Everything the profiler needs to classify a machine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HardwareCapabilities {
    pub accelerator: Option<AcceleratorInfo>,
    pub cpu_cores: usize,
}

/// Worker pool sizing for one tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierParameters {
    pub workers: usize,
    pub batch_size: usize,
}

/// Classification thresholds and per-tier parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HardwarePolicy {
    pub high_end_min_memory_gb: f64,
    pub high_end_min_compute_capability: f64,
    pub high_end: TierParameters,
    pub standard: TierParameters,
    pub cpu_only: TierParameters,
}

impl Default for HardwarePolicy {
    fn default() -> Self {
        Self {
            high_end_min_memory_gb: 16.0,
            high_end_min_compute_capability: 8.0,
            high_end: TierParameters {
                workers: 4,
                batch_size: 32,
            },
            standard: TierParameters {
                workers: 3,
                batch_size: 24,
            },
            cpu_only: TierParameters {
                workers: 2,
                batch_size: 16,
            },
        }
    }
}

impl HardwarePolicy {
    pub fn tier_for(&self, caps: &HardwareCapabilities) -> HardwareTier {
        match &caps.accelerator {
            None => HardwareTier::CpuOnly,
            Some(gpu)
                if gpu.memory_gb >= self.high_end_min_memory_gb
                    || gpu.compute_capability >= self.high_end_min_compute_capability =>
            {
                HardwareTier::HighEnd
            }
            Some(_) => HardwareTier::Standard,
        }
    }

    pub fn parameters(&self, tier: HardwareTier) -> TierParameters {
        match tier {
            HardwareTier::HighEnd => self.high_end,
            HardwareTier::Standard => self.standard,
            HardwareTier::CpuOnly => self.cpu_only,
        }
    }

    pub fn classify(&self, caps: &HardwareCapabilities) -> HardwareProfile {
        let tier = self.tier_for(caps);
        let params = self.parameters(tier);
        HardwareProfile {
            tier,
            worker_count: params.workers.max(1),
            batch_size: params.batch_size.max(1),
            cpu_cores: caps.cpu_cores,
            accelerator: caps.accelerator.as_ref().map(|gpu| gpu.name.clone()),
        }
    }

    /// Most conservative profile, used when detection fails.
    pub fn fallback(&self) -> HardwareProfile {
        self.classify(&HardwareCapabilities {
            accelerator: None,
            cpu_cores: num_cpus::get(),
        })
    }
}

/// Immutable sizing decision handed to the decoder and worker pool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HardwareProfile {
    pub tier: HardwareTier,
    pub worker_count: usize,
    /// Maximum windows per codec invocation
    pub batch_size: usize,
    pub cpu_cores: usize,
    pub accelerator: Option<String>,
}

impl fmt::Display for HardwareProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({} workers, batch {}, {} cpu cores",
            self.tier, self.worker_count, self.batch_size, self.cpu_cores
        )?;
        if let Some(name) = &self.accelerator {
            write!(f, ", {name}")?;
        }
        write!(f, ")")
    }
}
