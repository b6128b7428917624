//! Emitter configuration.
//!
//! An [`EmitterSpec`] describes one emitter of a system: its spawn and
//! update scripts, the events it generates and handles, where it simulates
//! (CPU or GPU), and how its bounds are produced. Specs are immutable and
//! shared; the runtime state lives in
//! [`EmitterInstance`](crate::emitter_instance::EmitterInstance).
//!
//! # Event handlers
//!
//! A handler consumes the previous generation of an event data set written
//! by a generator emitter and runs its script in one of three modes:
//!
//! | Mode | Dispatch |
//! |------|----------|
//! | [`EventExecutionMode::SpawnedParticles`] | once per event, over the particles spawned for that event |
//! | [`EventExecutionMode::EveryParticle`] | once per event, over every live particle |
//! | [`EventExecutionMode::SingleParticle`] | once per event, over the one particle named by the event's `particle_index` |
//!
//! # Example
//!
//! ```ignore
//! let emitter = EmitterSpec::new("sparks", spawn_script, update_script)
//!     .with_update_event_generator("collision", vec![Variable::vec3("position")])
//!     .with_event_handler(
//!         EventHandlerSpec::new(handler_script, EventExecutionMode::SpawnedParticles, "collision")
//!             .with_spawn_number(5)
//!             .with_max_events_per_frame(64),
//!     );
//! ```

use std::sync::Arc;

use glam::Vec3;

use crate::attribute::Variable;
use crate::bounds::Bounds;
use crate::script::{Script, SimTarget};

/// How an event handler's script is dispatched against the particle set.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventExecutionMode {
    /// Spawn `spawn_number` particles per event, then run the handler over
    /// the rows just spawned for that event.
    SpawnedParticles,
    /// Run the handler once per event across all live particles.
    EveryParticle,
    /// Run the handler on exactly the particle whose index the event row
    /// carries.
    SingleParticle,
}

/// An event data set a script writes into while spawning or updating.
#[derive(Clone, Debug)]
pub struct EventGeneratorSpec {
    /// Event name; receivers address the set by it.
    pub event_name: String,
    /// The event set's column layout.
    pub variables: Vec<Variable>,
}

impl EventGeneratorSpec {
    pub fn new(event_name: impl Into<String>, variables: Vec<Variable>) -> Self {
        Self { event_name: event_name.into(), variables }
    }
}

/// Configuration of one event handler.
#[derive(Clone)]
pub struct EventHandlerSpec {
    /// The handler script.
    pub script: Arc<Script>,
    /// Dispatch mode.
    pub execution_mode: EventExecutionMode,
    /// Emitter whose events feed this handler; `None` means this emitter's
    /// own events.
    pub source_emitter: Option<String>,
    /// Event name at the source.
    pub source_event: String,
    /// Particles to spawn per event (`SpawnedParticles` mode only).
    pub spawn_number: u32,
    /// Upper bound on events consumed per frame; 0 means unlimited.
    pub max_events_per_frame: u32,
}

impl EventHandlerSpec {
    pub fn new(
        script: Arc<Script>,
        execution_mode: EventExecutionMode,
        source_event: impl Into<String>,
    ) -> Self {
        Self {
            script,
            execution_mode,
            source_emitter: None,
            source_event: source_event.into(),
            spawn_number: 0,
            max_events_per_frame: 0,
        }
    }

    /// Consume events from another emitter instead of this one.
    pub fn with_source_emitter(mut self, emitter: impl Into<String>) -> Self {
        self.source_emitter = Some(emitter.into());
        self
    }

    /// Particles to spawn per event.
    pub fn with_spawn_number(mut self, n: u32) -> Self {
        self.spawn_number = n;
        self
    }

    /// Clamp how many events are consumed in one frame.
    pub fn with_max_events_per_frame(mut self, n: u32) -> Self {
        self.max_events_per_frame = n;
        self
    }
}

/// Immutable description of one emitter.
#[derive(Clone)]
pub struct EmitterSpec {
    /// Unique name within the owning system.
    pub name: String,
    /// Where the emitter simulates.
    pub sim_target: SimTarget,
    /// Whether particle positions are in emitter-local space.
    pub local_space: bool,
    /// Fixed bounds; `None` computes dynamic bounds from particle data.
    pub fixed_bounds: Option<Bounds>,
    /// The spawn script. Must not read attribute data.
    pub spawn_script: Arc<Script>,
    /// The update script. May only shrink the live count.
    pub update_script: Arc<Script>,
    /// Event sets the spawn script writes.
    pub spawn_event_generators: Vec<EventGeneratorSpec>,
    /// Event sets the update script writes.
    pub update_event_generators: Vec<EventGeneratorSpec>,
    /// Event handlers, run in declaration order.
    pub event_handlers: Vec<EventHandlerSpec>,
    /// Base extents of each renderer drawing this emitter; dynamic bounds
    /// are padded by the component-wise maximum.
    pub renderer_base_extents: Vec<Vec3>,
    /// Policy gate (detail level). A disabled emitter sticks to
    /// `ExecutionState::Disabled` no matter what states are requested.
    pub enabled: bool,
}

impl EmitterSpec {
    pub fn new(
        name: impl Into<String>,
        spawn_script: Arc<Script>,
        update_script: Arc<Script>,
    ) -> Self {
        Self {
            name: name.into(),
            sim_target: SimTarget::Cpu,
            local_space: false,
            fixed_bounds: None,
            spawn_script,
            update_script,
            spawn_event_generators: Vec::new(),
            update_event_generators: Vec::new(),
            event_handlers: Vec::new(),
            renderer_base_extents: Vec::new(),
            enabled: true,
        }
    }

    /// Simulate on the GPU through the render-thread batcher.
    pub fn with_sim_target(mut self, target: SimTarget) -> Self {
        self.sim_target = target;
        self
    }

    /// Simulate in emitter-local space.
    pub fn with_local_space(mut self) -> Self {
        self.local_space = true;
        self
    }

    /// Use a fixed bounding box instead of per-frame dynamic bounds.
    pub fn with_fixed_bounds(mut self, bounds: Bounds) -> Self {
        self.fixed_bounds = Some(bounds);
        self
    }

    /// Declare an event set the spawn script writes.
    pub fn with_spawn_event_generator(
        mut self,
        event_name: impl Into<String>,
        variables: Vec<Variable>,
    ) -> Self {
        self.spawn_event_generators.push(EventGeneratorSpec::new(event_name, variables));
        self
    }

    /// Declare an event set the update script writes.
    pub fn with_update_event_generator(
        mut self,
        event_name: impl Into<String>,
        variables: Vec<Variable>,
    ) -> Self {
        self.update_event_generators.push(EventGeneratorSpec::new(event_name, variables));
        self
    }

    /// Add an event handler.
    pub fn with_event_handler(mut self, handler: EventHandlerSpec) -> Self {
        self.event_handlers.push(handler);
        self
    }

    /// Record a renderer's base extents for bounds padding.
    pub fn with_renderer_base_extents(mut self, extents: Vec3) -> Self {
        self.renderer_base_extents.push(extents);
        self
    }

    /// Gate the emitter off by policy.
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}
