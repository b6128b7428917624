//! Top-level frame driver.
//!
//! Hosts integrate the engine by registering system definitions and calling
//! [`SimulationDriver::tick_all`] once per frame. Each distinct system
//! definition gets its own [`SystemSimulation`]; after all simulations
//! ticked, the GPU batcher (when present) is kicked to drain the frame's
//! queued compute work on its own thread.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::SimulationError;
use crate::gpu::GpuBatcher;
use crate::system::{SystemInstanceId, SystemSpec};
use crate::system_simulation::SystemSimulation;

/// Owns one simulation per registered system definition plus the optional
/// GPU batcher.
#[derive(Default)]
pub struct SimulationDriver {
    simulations: HashMap<String, SystemSimulation>,
    batcher: Option<GpuBatcher>,
}

impl SimulationDriver {
    /// A CPU-only driver. GPU-target emitters will flag themselves as
    /// errored since no batcher queue exists.
    pub fn new() -> Self {
        Self::default()
    }

    /// A driver with a live GPU batcher. Fails when no compatible adapter
    /// is present.
    pub fn with_gpu() -> Result<Self, SimulationError> {
        let batcher = GpuBatcher::new()?;
        Ok(Self { simulations: HashMap::new(), batcher: Some(batcher) })
    }

    /// Register a system definition, creating its batching simulation.
    /// Re-registering a name replaces the previous simulation wholesale.
    pub fn register_system(&mut self, system: Arc<SystemSpec>) -> Result<(), SimulationError> {
        let queue = self.batcher.as_ref().map(|b| b.queue());
        let sim = SystemSimulation::new(system.clone(), queue)?;
        self.simulations.insert(system.name.clone(), sim);
        Ok(())
    }

    /// The simulation for a system name.
    pub fn simulation(&self, system_name: &str) -> Option<&SystemSimulation> {
        self.simulations.get(system_name)
    }

    /// The simulation for a system name, mutably.
    pub fn simulation_mut(&mut self, system_name: &str) -> Option<&mut SystemSimulation> {
        self.simulations.get_mut(system_name)
    }

    /// Spawn a new instance of a registered system.
    pub fn add_instance(&mut self, system_name: &str) -> Option<SystemInstanceId> {
        self.simulations.get_mut(system_name).map(|sim| sim.add_instance())
    }

    /// Tick every simulation once, then kick the GPU batcher so the
    /// frame's queued compute contexts drain on the batcher thread.
    pub fn tick_all(&mut self, dt: f32) {
        for sim in self.simulations.values_mut() {
            sim.tick(dt);
        }
        if let Some(batcher) = &self.batcher {
            batcher.kick_frame();
        }
    }
}
