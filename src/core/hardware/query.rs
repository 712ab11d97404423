//! Hardware capability queries.

use async_trait::async_trait;
use std::io::ErrorKind;
use tokio::process::Command;

use super::profile::{AcceleratorInfo, HardwareCapabilities};
use crate::errors::{SynthesisError, SynthesisResult};

/// Source of accelerator and CPU facts
#[async_trait]
pub trait HardwareQuery: Send + Sync {
    async fn query(&self) -> SynthesisResult<HardwareCapabilities>;
}

/// Queries the host through `nvidia-smi` and the OS CPU count.
///
/// A missing `nvidia-smi` binary means no accelerator. Any other failure is a
/// [`SynthesisError::HardwareDetectionFailure`].
#[derive(Debug, Clone)]
pub struct SystemHardwareQuery {
    program: String,
}

impl Default for SystemHardwareQuery {
    fn default() -> Self {
        Self {
            program: "nvidia-smi".to_string(),
        }
    }
}

impl SystemHardwareQuery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a different `nvidia-smi` compatible executable.
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

#[async_trait]
impl HardwareQuery for SystemHardwareQuery {
    async fn query(&self) -> SynthesisResult<HardwareCapabilities> {
        let cpu_cores = num_cpus::get();

        let output = match Command::new(&self.program)
            .args([
                "--query-gpu=name,memory.total,compute_cap",
                "--format=csv,noheader,nounits",
            ])
            .output()
            .await
        {
            Ok(output) => output,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::debug!(program = %self.program, "No accelerator tooling found");
                return Ok(HardwareCapabilities {
                    accelerator: None,
                    cpu_cores,
                });
            }
            Err(e) => {
                return Err(SynthesisError::HardwareDetectionFailure(format!(
                    "Failed to run {}: {e}",
                    self.program
                )));
            }
        };

        if !output.status.success() {
            return Err(SynthesisError::HardwareDetectionFailure(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(HardwareCapabilities {
            accelerator: parse_gpu_listing(&stdout)?,
            cpu_cores,
        })
    }
}

/// Parse `name, memory MiB, compute capability` lines and keep the largest device.
pub fn parse_gpu_listing(listing: &str) -> SynthesisResult<Option<AcceleratorInfo>> {
    let mut best: Option<AcceleratorInfo> = None;

    for line in listing.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let fields: Vec<&str> = line.rsplitn(3, ',').map(str::trim).collect();
        let [compute, memory, name] = fields.as_slice() else {
            return Err(SynthesisError::HardwareDetectionFailure(format!(
                "Unexpected GPU listing line: {line}"
            )));
        };

        let memory_mib: f64 = memory.parse().map_err(|e| {
            SynthesisError::HardwareDetectionFailure(format!("Invalid memory value {memory}: {e}"))
        })?;
        let compute_capability: f64 = compute.parse().map_err(|e| {
            SynthesisError::HardwareDetectionFailure(format!(
                "Invalid compute capability {compute}: {e}"
            ))
        })?;

        let device = AcceleratorInfo {
            name: name.to_string(),
            memory_gb: memory_mib / 1024.0,
            compute_capability,
        };
        if best.as_ref().is_none_or(|b| device.memory_gb > b.memory_gb) {
            best = Some(device);
        }
    }

    Ok(best)
}

/// Query returning fixed capabilities, or a fixed failure
#[derive(Debug, Clone)]
pub struct FixedHardwareQuery {
    result: Result<HardwareCapabilities, String>,
}

impl FixedHardwareQuery {
    pub fn new(caps: HardwareCapabilities) -> Self {
        Self { result: Ok(caps) }
    }

    pub fn failing(reason: impl Into<String>) -> Self {
        Self {
            result: Err(reason.into()),
        }
    }
}

#[async_trait]
impl HardwareQuery for FixedHardwareQuery {
    async fn query(&self) -> SynthesisResult<HardwareCapabilities> {
        self.result
            .clone()
            .map_err(SynthesisError::HardwareDetectionFailure)
    }
}
