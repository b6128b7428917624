//! System definitions and system instances.
//!
//! A [`SystemSpec`] is the immutable description of a full system: the
//! system-level spawn/update scripts that drive per-emitter execution
//! states and spawn infos, the emitters themselves, and the default data
//! interface instances scripts bind against.
//!
//! A [`SystemInstance`] is one live instantiation. It exclusively owns its
//! [`EmitterInstance`]s, the event-set store they communicate through, and
//! the byte arena holding data-interface per-instance state. Instances are
//! registered with a [`SystemSimulation`](crate::system_simulation::SystemSimulation)
//! which batches their system-script execution.

use std::collections::HashMap;
use std::sync::Arc;

use glam::Mat4;
use log::warn;

use crate::attribute::Variable;
use crate::bounds::Bounds;
use crate::data_interface::{DataInterface, InterfaceArena, InterfaceCapabilities};
use crate::emitter::EmitterSpec;
use crate::emitter_instance::EmitterInstance;
use crate::events::EventSetStore;
use crate::gpu::GpuDispatchQueue;
use crate::param_store::ParameterStore;
use crate::script::Script;
use crate::state::ExecutionState;

/// Stable identity of a system instance, valid for its whole lifetime.
/// (The packed row index inside a simulation is not; it changes on
/// swap-removal.)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SystemInstanceId(pub u64);

/// Immutable description of a system: emitters plus the system-level
/// scripts batched across instances.
pub struct SystemSpec {
    /// System name, used in logs.
    pub name: String,
    /// The emitters, in handle order.
    pub emitters: Vec<Arc<EmitterSpec>>,
    /// Per emitter, the names of the spawn-info variables the system
    /// scripts write into the system data set.
    pub emitter_spawn_attributes: Vec<Vec<String>>,
    /// System-level spawn script, run over newly added instances.
    pub system_spawn_script: Arc<Script>,
    /// System-level update script, run over live instances.
    pub system_update_script: Arc<Script>,
    /// Per-instance parameters the system scripts consume; these become the
    /// layout of the batch's instance-parameter data sets.
    pub instance_parameters: Vec<Variable>,
    /// Default data-interface instances, resolved by declared name.
    pub data_interfaces: HashMap<String, Arc<dyn DataInterface>>,
}

impl SystemSpec {
    pub fn new(
        name: impl Into<String>,
        system_spawn_script: Arc<Script>,
        system_update_script: Arc<Script>,
    ) -> Self {
        Self {
            name: name.into(),
            emitters: Vec::new(),
            emitter_spawn_attributes: Vec::new(),
            system_spawn_script,
            system_update_script,
            instance_parameters: Vec::new(),
            data_interfaces: HashMap::new(),
        }
    }

    /// Declare a per-instance parameter the system scripts read.
    pub fn with_instance_parameter(mut self, var: Variable) -> Self {
        if !self.instance_parameters.contains(&var) {
            self.instance_parameters.push(var);
        }
        self
    }

    /// Add an emitter and the names of its spawn-info variables in the
    /// system data set.
    pub fn with_emitter(mut self, emitter: EmitterSpec, spawn_attributes: Vec<String>) -> Self {
        self.emitters.push(Arc::new(emitter));
        self.emitter_spawn_attributes.push(spawn_attributes);
        self
    }

    /// Register a default data-interface instance under its declared name.
    pub fn with_data_interface(
        mut self,
        name: impl Into<String>,
        iface: Arc<dyn DataInterface>,
    ) -> Self {
        self.data_interfaces.insert(name.into(), iface);
        self
    }

    /// Every interface name declared by any script of this system, in a
    /// deterministic order (system scripts first, then emitters in handle
    /// order).
    pub fn declared_interface_names(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        let mut push = |name: &str| {
            if !names.iter().any(|n| n == name) {
                names.push(name.to_string());
            }
        };
        for name in self
            .system_spawn_script
            .data_interfaces()
            .iter()
            .chain(self.system_update_script.data_interfaces())
        {
            push(name);
        }
        for emitter in &self.emitters {
            for name in emitter
                .spawn_script
                .data_interfaces()
                .iter()
                .chain(emitter.update_script.data_interfaces())
            {
                push(name);
            }
            for handler in &emitter.event_handlers {
                for name in handler.script.data_interfaces() {
                    push(name);
                }
            }
        }
        names
    }

    /// Whether the system scripts bind an interface that cannot share a
    /// snapshot across a batch; such instances must run solo.
    pub fn requires_solo(&self) -> bool {
        self.system_spawn_script
            .data_interfaces()
            .iter()
            .chain(self.system_update_script.data_interfaces())
            .filter_map(|name| self.data_interfaces.get(name))
            .any(|iface| iface.capabilities().contains(InterfaceCapabilities::REQUIRES_SOLO))
    }
}

/// One live instantiation of a system.
pub struct SystemInstance {
    id: SystemInstanceId,
    system: Arc<SystemSpec>,
    emitters: Vec<EmitterInstance>,
    events: EventSetStore,
    exec_state: ExecutionState,
    /// Externally set per-instance parameters the system scripts read.
    instance_parameters: ParameterStore,
    /// Resolved interface instances, ordered; position is the arena slot.
    interfaces: Vec<(String, Arc<dyn DataInterface>)>,
    arena: InterfaceArena,
    /// Packed row index while registered with a simulation. Re-stamped on
    /// swap-removal; treat as invalidated by any add/remove.
    pub(crate) instance_index: Option<usize>,
    pub(crate) pending_spawn: bool,
    solo: bool,
    transform: Mat4,
    age: f32,
}

impl SystemInstance {
    /// Create an instance: resolve data interfaces, build the arena, and
    /// initialize every emitter in handle order.
    pub fn new(
        system: Arc<SystemSpec>,
        id: SystemInstanceId,
        gpu_queue: Option<Arc<GpuDispatchQueue>>,
    ) -> Self {
        let mut interfaces: Vec<(String, Arc<dyn DataInterface>)> = Vec::new();
        for name in system.declared_interface_names() {
            match system.data_interfaces.get(&name) {
                Some(iface) => interfaces.push((name, iface.clone())),
                None => warn!(
                    "system '{}': no data interface registered under '{}'",
                    system.name, name
                ),
            }
        }
        let instances: Vec<Arc<dyn DataInterface>> =
            interfaces.iter().map(|(_, i)| i.clone()).collect();
        let arena = InterfaceArena::build(&instances);

        let mut events = EventSetStore::new();
        let mut emitters: Vec<EmitterInstance> = system
            .emitters
            .iter()
            .enumerate()
            .map(|(idx, spec)| {
                EmitterInstance::new(
                    spec.clone(),
                    id,
                    system.emitter_spawn_attributes[idx].len(),
                    &mut events,
                    gpu_queue.clone(),
                )
            })
            .collect();

        for emitter in &mut emitters {
            emitter.bind_data_interfaces(&mut |name| {
                interfaces
                    .iter()
                    .position(|(n, _)| n == name)
                    .map(|slot| (interfaces[slot].1.clone(), slot))
            });
        }

        let solo = system.requires_solo();

        Self {
            id,
            system,
            emitters,
            events,
            exec_state: ExecutionState::Active,
            instance_parameters: ParameterStore::new(),
            interfaces,
            arena,
            instance_index: None,
            pending_spawn: false,
            solo,
            transform: Mat4::IDENTITY,
            age: 0.0,
        }
    }

    // ---- accessors ----

    pub fn id(&self) -> SystemInstanceId {
        self.id
    }

    pub fn system(&self) -> &Arc<SystemSpec> {
        &self.system
    }

    pub fn emitters(&self) -> &[EmitterInstance] {
        &self.emitters
    }

    pub fn emitters_mut(&mut self) -> &mut [EmitterInstance] {
        &mut self.emitters
    }

    /// Externally set parameters the batched system scripts consume.
    pub fn parameters(&self) -> &ParameterStore {
        &self.instance_parameters
    }

    pub fn parameters_mut(&mut self) -> &mut ParameterStore {
        &mut self.instance_parameters
    }

    pub fn execution_state(&self) -> ExecutionState {
        self.exec_state
    }

    /// Externally drive the execution state (activation, deactivation).
    pub fn set_execution_state(&mut self, state: ExecutionState) {
        self.exec_state = state;
    }

    pub fn set_transform(&mut self, transform: Mat4) {
        self.transform = transform;
    }

    pub fn transform(&self) -> &Mat4 {
        &self.transform
    }

    pub fn age(&self) -> f32 {
        self.age
    }

    /// Instances whose system scripts need unique interface state bypass
    /// batching.
    pub fn is_solo(&self) -> bool {
        self.solo
    }

    pub fn is_complete(&self) -> bool {
        self.exec_state.is_complete()
    }

    /// Whether any emitter still advances.
    pub fn has_ticking_emitters(&self) -> bool {
        self.emitters.iter().any(|e| !e.is_complete() && !e.has_error())
    }

    /// Union of all emitter bounds.
    pub fn bounds(&self) -> Bounds {
        self.emitters
            .iter()
            .fold(Bounds::EMPTY, |acc, e| acc.union(&e.bounds()))
    }

    /// The event-set store shared by this instance's emitters.
    pub fn events(&self) -> &EventSetStore {
        &self.events
    }

    // ---- lifecycle ----

    /// A system instance only becomes fully complete when all its emitters
    /// report complete/disabled, or on an explicit force (deactivation).
    /// Returns `true` once complete; emitters are force-completed so their
    /// buffers clear.
    pub fn handle_completion(&mut self) -> bool {
        let all_emitters_done = self.emitters.iter().all(|e| e.is_complete() || e.has_error());
        if self.exec_state.is_complete() || all_emitters_done {
            if !self.exec_state.is_complete() {
                self.exec_state = ExecutionState::Complete;
            }
            for emitter in &mut self.emitters {
                emitter.handle_completion(true);
            }
            return true;
        }
        false
    }

    /// Stop this instance. `immediate` forces out-of-order completion: any
    /// GPU work already queued this frame drains harmlessly (it only
    /// touches this instance's buffers) but nothing further is scheduled.
    /// Without `immediate` the instance goes inactive and dies off.
    pub fn deactivate(&mut self, immediate: bool) {
        if immediate {
            self.exec_state = ExecutionState::Complete;
            self.handle_completion();
        } else {
            self.exec_state = ExecutionState::Inactive;
            for emitter in &mut self.emitters {
                emitter.set_execution_state(ExecutionState::Inactive);
            }
        }
    }

    /// Tear down per-instance interface state and reinitialize everything
    /// for a fresh run. The arena is destroyed explicitly before rebuild;
    /// function tables are marked dirty so nothing stale survives.
    pub fn reinitialize(&mut self) {
        let instances: Vec<Arc<dyn DataInterface>> =
            self.interfaces.iter().map(|(_, i)| i.clone()).collect();
        self.arena.destroy(&instances);
        self.arena = InterfaceArena::build(&instances);
        self.events.reset_all();
        for emitter in &mut self.emitters {
            emitter.dirty_data_interfaces();
            emitter.reset();
        }
        self.exec_state = ExecutionState::Active;
        self.age = 0.0;
    }

    /// Before the batched system scripts run: advance age and give
    /// interfaces their pre-tick hook.
    pub fn pre_simulate_tick(&mut self, dt: f32) {
        self.age += dt;
        let instances: Vec<Arc<dyn DataInterface>> =
            self.interfaces.iter().map(|(_, i)| i.clone()).collect();
        self.arena.tick(&instances, dt);
    }

    /// After the batched system scripts ran and results were scattered:
    /// tick every emitter (pre-tick, then the main tick).
    pub fn post_simulate_tick(&mut self, dt: f32) {
        let Self { emitters, events, arena, transform, .. } = self;
        for emitter in emitters.iter_mut() {
            emitter.pre_tick(events);
        }
        for emitter in emitters.iter_mut() {
            emitter.tick(dt, events, arena, transform);
        }
    }
}

impl Drop for SystemInstance {
    fn drop(&mut self) {
        let instances: Vec<Arc<dyn DataInterface>> =
            self.interfaces.iter().map(|(_, i)| i.clone()).collect();
        self.arena.destroy(&instances);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attribute::Variable;
    use crate::params;
    use crate::vm::KernelBatch;

    fn noop_script(name: &str) -> Arc<Script> {
        Script::new(name)
            .with_attribute(Variable::vec3(params::ATTR_POSITION))
            .with_cpu_kernel(Arc::new(|_b: &mut KernelBatch<'_>| {}))
            .build()
    }

    fn simple_system() -> Arc<SystemSpec> {
        Arc::new(
            SystemSpec::new("fx", noop_script("sys_spawn"), noop_script("sys_update"))
                .with_emitter(
                    EmitterSpec::new("sparks", noop_script("spawn"), noop_script("update")),
                    vec!["sparks.spawn_info".into()],
                ),
        )
    }

    #[test]
    fn test_instance_owns_emitters_in_handle_order() {
        let inst = SystemInstance::new(simple_system(), SystemInstanceId(7), None);
        assert_eq!(inst.emitters().len(), 1);
        assert_eq!(inst.emitters()[0].name(), "sparks");
        assert_eq!(inst.id(), SystemInstanceId(7));
    }

    #[test]
    fn test_completion_requires_all_emitters() {
        let mut inst = SystemInstance::new(simple_system(), SystemInstanceId(1), None);
        assert!(!inst.handle_completion());
        inst.emitters_mut()[0].handle_completion(true);
        assert!(inst.handle_completion());
        assert!(inst.is_complete());
    }

    #[test]
    fn test_immediate_deactivation_forces_completion() {
        let mut inst = SystemInstance::new(simple_system(), SystemInstanceId(1), None);
        inst.deactivate(true);
        assert!(inst.is_complete());
        assert!(inst.emitters()[0].is_complete());
    }

    #[test]
    fn test_reinitialize_reactivates() {
        let mut inst = SystemInstance::new(simple_system(), SystemInstanceId(1), None);
        inst.deactivate(true);
        inst.reinitialize();
        assert_eq!(inst.execution_state(), ExecutionState::Active);
        assert!(!inst.emitters()[0].is_complete());
    }
}
