//! # Scintilla - Scripted Particle Simulation Engine
//!
//! A real-time particle-simulation core driven by pre-compiled scripts
//! operating on columnar buffers. Scintilla allocates, ticks and compacts
//! particle state for thousands of simultaneous emitters while amortizing
//! per-instance overhead by batching many system instances' top-level
//! spawn/update scripts into single vectorized executions.
//!
//! Scintilla does not define a particle-script language: it consumes
//! compiled byte-code (any [`VectorKernel`]) plus a declared attribute
//! layout, and for GPU emitters a compiled WGSL shader.
//!
//! ## Quick Start
//!
//! ```ignore
//! use scintilla::prelude::*;
//!
//! // Scripts come out of your compilation pipeline: declared attributes,
//! // parameters, and an executable kernel.
//! let spawn = Script::new("spawn")
//!     .with_attribute(Variable::vec3("position"))
//!     .with_cpu_kernel(my_spawn_kernel)
//!     .build();
//! let update = Script::new("update")
//!     .with_attribute(Variable::vec3("position"))
//!     .with_cpu_kernel(my_update_kernel)
//!     .build();
//!
//! let system = Arc::new(
//!     SystemSpec::new("fireworks", system_spawn, system_update)
//!         .with_emitter(
//!             EmitterSpec::new("sparks", spawn, update),
//!             vec!["sparks.spawn_info".into()],
//!         ),
//! );
//!
//! let mut driver = SimulationDriver::new();
//! driver.register_system(system).unwrap();
//! driver.add_instance("fireworks");
//!
//! let mut time = Time::new();
//! loop {
//!     let (_, dt) = time.update();
//!     driver.tick_all(dt);
//! }
//! ```
//!
//! ## Core Concepts
//!
//! ### Data sets
//!
//! A [`DataSet`] is a double-buffered columnar store: one component stream
//! per attribute component, two generations swapped by `tick()`. Scripts
//! read the previous generation and write the current one, so a dispatch
//! can never observe its own writes.
//!
//! ### Scripts and execution contexts
//!
//! A [`Script`] is an opaque compiled unit declaring its attributes,
//! parameters, data-interface slots and external functions. A
//! [`ScriptExecutionContext`] binds those declarations to live state and
//! drives one kernel dispatch across N instances.
//!
//! ### Emitters and systems
//!
//! An [`EmitterInstance`] runs the spawn/update/event scripts for one
//! emitter against its own data set. A [`SystemInstance`] owns a set of
//! emitters; a [`SystemSimulation`] batches the system-level scripts of
//! every instance sharing a definition into one execution per frame.
//!
//! ### Events
//!
//! Emitters communicate through event data sets addressed by the triple
//! (system instance, source emitter, event name). Handlers consume the
//! previous generation of those sets in one of three dispatch modes.
//!
//! ### CPU/GPU split
//!
//! Emitters flagged for GPU simulation queue a [`ComputeExecutionContext`]
//! instead of executing on the game thread; a double-buffered queue is
//! drained once per frame by the batcher thread, one frame behind.

pub mod attribute;
pub mod bounds;
pub mod data_interface;
pub mod data_set;
pub mod driver;
pub mod emitter;
pub mod emitter_instance;
pub mod error;
pub mod events;
pub mod exec_context;
pub mod gpu;
pub mod param_store;
pub mod params;
pub mod script;
pub mod state;
pub mod system;
pub mod system_simulation;
pub mod time;
pub mod vm;

pub use attribute::{AttributeType, Variable};
pub use bounds::Bounds;
pub use bytemuck;
pub use data_interface::{DataInterface, ExternalFunctionRequest, InterfaceArena, InterfaceCapabilities};
pub use data_set::{DataSet, DataSetLayout};
pub use driver::SimulationDriver;
pub use emitter::{EmitterSpec, EventExecutionMode, EventGeneratorSpec, EventHandlerSpec};
pub use emitter_instance::EmitterInstance;
pub use error::{GpuError, SimulationError};
pub use events::{EventSetKey, EventSetStore};
pub use exec_context::{DataSetExecInfo, ScriptExecutionContext};
pub use glam::{Mat4, Vec2, Vec3, Vec4};
pub use gpu::{ComputeExecutionContext, GpuBatcher, GpuDispatchQueue};
pub use param_store::{ParameterBinding, ParameterStore, ParameterValue, StoreBinding};
pub use script::{CompileStatus, Script, ScriptBuilder, SimTarget};
pub use state::{ExecutionState, SpawnInfo};
pub use system::{SystemInstance, SystemInstanceId, SystemSpec};
pub use system_simulation::SystemSimulation;
pub use time::Time;
pub use vm::{ExternalFunction, KernelBatch, KernelSet, VectorKernel};

/// Convenience re-exports for host applications.
pub mod prelude {
    pub use crate::attribute::{AttributeType, Variable};
    pub use crate::bounds::Bounds;
    pub use crate::data_interface::{DataInterface, InterfaceCapabilities};
    pub use crate::data_set::DataSet;
    pub use crate::driver::SimulationDriver;
    pub use crate::emitter::{EmitterSpec, EventExecutionMode, EventHandlerSpec};
    pub use crate::param_store::{ParameterStore, ParameterValue};
    pub use crate::params;
    pub use crate::script::{Script, SimTarget};
    pub use crate::state::{ExecutionState, SpawnInfo};
    pub use crate::system::{SystemInstance, SystemInstanceId, SystemSpec};
    pub use crate::system_simulation::SystemSimulation;
    pub use crate::time::Time;
    pub use crate::vm::{KernelBatch, VectorKernel};
    pub use crate::{Mat4, Vec2, Vec3, Vec4};
    pub use std::sync::Arc;
}
