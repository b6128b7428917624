//! Error types for the simulation core.
//!
//! Runtime simulation failures never surface as errors: structural
//! problems set sticky per-emitter or per-instance flags and suppress
//! ticking (see the emitter state machine). These types cover fallible
//! construction: building a simulation from a system definition and
//! bringing up the GPU batcher.

use std::fmt;

/// Errors that can occur while bringing up the GPU batcher.
#[derive(Debug)]
pub enum GpuError {
    /// No compatible GPU adapter found.
    NoAdapter,
    /// Failed to create GPU device.
    DeviceCreation(wgpu::RequestDeviceError),
    /// Failed to map buffer for reading.
    BufferMapping(String),
    /// Failed to spawn the batcher thread.
    Thread(String),
    /// A GPU-target emitter was queued without compiled shader source.
    MissingShader(String),
}

impl fmt::Display for GpuError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GpuError::NoAdapter => write!(f, "No compatible GPU adapter found. Ensure your system has a GPU with Vulkan/Metal/DX12 support."),
            GpuError::DeviceCreation(e) => write!(f, "Failed to create GPU device: {}", e),
            GpuError::BufferMapping(msg) => write!(f, "Failed to map GPU buffer: {}", msg),
            GpuError::Thread(msg) => write!(f, "Failed to start batcher thread: {}", msg),
            GpuError::MissingShader(emitter) => write!(f, "Emitter '{}' has no compiled GPU shader", emitter),
        }
    }
}

impl std::error::Error for GpuError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            GpuError::DeviceCreation(e) => Some(e),
            _ => None,
        }
    }
}

impl From<wgpu::RequestDeviceError> for GpuError {
    fn from(e: wgpu::RequestDeviceError) -> Self {
        GpuError::DeviceCreation(e)
    }
}

/// Errors that can occur when building a simulation from a system
/// definition.
#[derive(Debug)]
pub enum SimulationError {
    /// The system definition declares no emitters.
    NoEmitters,
    /// Two emitters share a name; event addressing would be ambiguous.
    DuplicateEmitterName(String),
    /// GPU initialization failed.
    Gpu(GpuError),
}

impl fmt::Display for SimulationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SimulationError::NoEmitters => write!(f, "System definition has no emitters"),
            SimulationError::DuplicateEmitterName(name) => {
                write!(f, "Duplicate emitter name '{}' in system definition", name)
            }
            SimulationError::Gpu(e) => write!(f, "GPU error: {}", e),
        }
    }
}

impl std::error::Error for SimulationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SimulationError::Gpu(e) => Some(e),
            _ => None,
        }
    }
}

impl From<GpuError> for SimulationError {
    fn from(e: GpuError) -> Self {
        SimulationError::Gpu(e)
    }
}
