//! Device telemetry captured once per quantum.
//!
//! The capability of the machine is detected once when the run starts and
//! stored in a [`TelemetryContext`]. Everything after that is a read-only
//! query: a failed query degrades to [`DeviceSnapshot::Empty`] and never
//! stops the run.

pub mod host;
pub mod nvidia;

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{info, warn};

/// What kind of memory the scheduler can observe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceCapability {
    None,
    /// CPU and accelerator share host memory (Apple silicon)
    UnifiedMemoryHost,
    /// `count` discrete accelerators, queried through `nvidia-smi`
    DiscreteAccelerator { count: usize },
}

/// Requested device mode, from config or the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum DeviceSelection {
    #[default]
    Auto,
    None,
    Host,
    Accelerator,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceStats {
    pub mem_used: u64,
    pub mem_total: u64,
    /// Compute utilization in percent
    pub util_compute: u32,
    /// Memory controller utilization in percent
    pub util_mem: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostMemory {
    pub used: u64,
    pub total: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum DeviceSnapshot {
    #[default]
    Empty,
    Host(HostMemory),
    /// One entry per accelerator, in device index order
    Devices(Vec<DeviceStats>),
}

impl DeviceSnapshot {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            DeviceSnapshot::Empty => true,
            DeviceSnapshot::Host(_) => false,
            DeviceSnapshot::Devices(devices) => devices.is_empty(),
        }
    }

    /// Memory in use that can be charged to the job running right now.
    #[must_use]
    pub fn attributable_bytes(&self) -> u64 {
        match self {
            DeviceSnapshot::Empty => 0,
            DeviceSnapshot::Host(host) => host.used,
            DeviceSnapshot::Devices(devices) => devices.iter().map(|d| d.mem_used).sum(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{program} exited with {status}")]
    Command { program: String, status: String },

    #[error("unparseable telemetry output: {0}")]
    Parse(String),

    #[error("no accelerator query tool found on PATH")]
    NoAccelerator,

    #[error("host memory query is not supported on this platform")]
    Unsupported,
}

/// Handle describing the telemetry backend chosen for this run.
#[derive(Debug, Clone)]
pub struct TelemetryContext {
    capability: DeviceCapability,
    nvidia_smi: Option<PathBuf>,
}

impl TelemetryContext {
    /// A context that never reports anything.
    #[must_use]
    pub fn none() -> Self {
        Self {
            capability: DeviceCapability::None,
            nvidia_smi: None,
        }
    }

    /// Resolve `selection` against the machine. Only an explicit
    /// `Accelerator` request can fail.
    pub fn detect(selection: DeviceSelection) -> Result<Self, TelemetryError> {
        let ctx = match selection {
            DeviceSelection::None => Self::none(),
            DeviceSelection::Host => Self {
                capability: DeviceCapability::UnifiedMemoryHost,
                nvidia_smi: None,
            },
            DeviceSelection::Accelerator => Self::detect_accelerator()?,
            DeviceSelection::Auto => match Self::detect_accelerator() {
                Ok(ctx) => ctx,
                Err(e) => {
                    info!("no accelerator telemetry ({e})");
                    if cfg!(all(target_os = "macos", target_arch = "aarch64")) {
                        Self {
                            capability: DeviceCapability::UnifiedMemoryHost,
                            nvidia_smi: None,
                        }
                    } else {
                        Self::none()
                    }
                }
            },
        };
        info!("telemetry capability {:?}", ctx.capability);
        Ok(ctx)
    }

    fn detect_accelerator() -> Result<Self, TelemetryError> {
        let smi = which::which("nvidia-smi").map_err(|_| TelemetryError::NoAccelerator)?;
        let devices = nvidia::query(&smi)?;
        if devices.is_empty() {
            return Err(TelemetryError::NoAccelerator);
        }
        Ok(Self {
            capability: DeviceCapability::DiscreteAccelerator {
                count: devices.len(),
            },
            nvidia_smi: Some(smi),
        })
    }

    #[must_use]
    pub fn capability(&self) -> DeviceCapability {
        self.capability
    }
}

/// Source of one snapshot per quantum.
pub trait TelemetryProbe: Send {
    /// Fixed for the whole run.
    fn capability(&self) -> DeviceCapability;

    fn capture(&mut self) -> DeviceSnapshot;
}

/// Probe backed by the real machine.
pub struct SystemProbe {
    ctx: TelemetryContext,
}

impl SystemProbe {
    pub fn new(ctx: TelemetryContext) -> Self {
        Self { ctx }
    }
}

impl TelemetryProbe for SystemProbe {
    fn capability(&self) -> DeviceCapability {
        self.ctx.capability
    }

    fn capture(&mut self) -> DeviceSnapshot {
        let result = match (self.ctx.capability, &self.ctx.nvidia_smi) {
            (DeviceCapability::None, _) => return DeviceSnapshot::Empty,
            (DeviceCapability::UnifiedMemoryHost, _) => host::read().map(DeviceSnapshot::Host),
            (DeviceCapability::DiscreteAccelerator { .. }, Some(smi)) => {
                nvidia::query(smi).map(DeviceSnapshot::Devices)
            }
            (DeviceCapability::DiscreteAccelerator { .. }, None) => {
                Err(TelemetryError::NoAccelerator)
            }
        };
        result.unwrap_or_else(|e| {
            warn!("telemetry capture failed, recording empty snapshot: {e}");
            DeviceSnapshot::Empty
        })
    }
}
