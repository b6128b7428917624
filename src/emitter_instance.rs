//! Per-emitter runtime state and the tick state machine.
//!
//! An [`EmitterInstance`] owns one particle data set and the execution
//! contexts for its spawn, update and event-handler scripts. Each frame the
//! owning system instance drives it through [`EmitterInstance::pre_tick`]
//! (parameter upkeep and buffer swaps) and [`EmitterInstance::tick`].
//!
//! The tick order is load-bearing: update existing particles, spawn new
//! ones, then event handling, then bounds. Spawned particles must not be
//! updated in the frame they are created, and event handlers must see a
//! stable base.
//!
//! Structural problems (a spawn script that reads attributes, a script with
//! no attributes, an uncompiled target) set a sticky error flag that stops
//! all ticking until an explicit [`EmitterInstance::reset`]. Errors are
//! logged once when detected; they never panic and never touch sibling
//! emitters.

use std::sync::Arc;
use std::time::Instant;

use glam::{Mat4, Vec3};
use log::{error, warn};

use crate::attribute::Variable;
use crate::bounds::Bounds;
use crate::data_interface::{DataInterface, InterfaceArena};
use crate::data_set::{ComponentBase, DataSet};
use crate::emitter::{EmitterSpec, EventExecutionMode};
use crate::events::{EventSetKey, EventSetStore};
use crate::exec_context::{DataSetExecInfo, ScriptExecutionContext};
use crate::gpu::{ComputeExecutionContext, GpuDispatchQueue, GpuEmitterLink};
use crate::param_store::ParameterBinding;
use crate::params;
use crate::script::{CompileStatus, SimTarget};
use crate::state::{ExecutionState, SpawnInfo};
use crate::system::SystemInstanceId;

/// Fixed expansion used for GPU emitters until a bounds readback exists.
const GPU_BOUNDS_EXTENT: f32 = 20.0;

/// Engine-provided parameter bindings for one execution context. Inert for
/// parameters the script does not declare.
#[derive(Clone, Copy, Default)]
struct ContextBindings {
    age: ParameterBinding,
    local_space: ParameterBinding,
    exec_count: ParameterBinding,
    delta_time: ParameterBinding,
    inv_delta_time: ParameterBinding,
}

impl ContextBindings {
    fn new(ctx: &ScriptExecutionContext) -> Self {
        let p = &ctx.parameters;
        Self {
            age: ParameterBinding::new(p, &Variable::float(params::EMITTER_AGE)),
            local_space: ParameterBinding::new(p, &Variable::bool(params::EMITTER_LOCAL_SPACE)),
            exec_count: ParameterBinding::new(p, &Variable::int(params::ENGINE_EXEC_COUNT)),
            delta_time: ParameterBinding::new(p, &Variable::float(params::ENGINE_DELTA_TIME)),
            inv_delta_time: ParameterBinding::new(p, &Variable::float(params::ENGINE_INV_DELTA_TIME)),
        }
    }
}

/// The runtime simulation state for one emitter within one system instance.
pub struct EmitterInstance {
    spec: Arc<EmitterSpec>,
    owner: SystemInstanceId,
    data: DataSet,
    spawn_ctx: ScriptExecutionContext,
    update_ctx: ScriptExecutionContext,
    event_ctxs: Vec<ScriptExecutionContext>,
    /// Indices into the owner's event store for sets our spawn script writes.
    spawn_event_sets: Vec<usize>,
    /// Indices into the owner's event store for sets our update script writes.
    update_event_sets: Vec<usize>,
    spawn_infos: Vec<SpawnInfo>,
    exec_state: ExecutionState,
    age: f32,
    error: bool,
    reset_pending: bool,
    cached_bounds: Bounds,
    cpu_time_ms: f32,
    gpu: Option<GpuEmitterLink>,
    spawn_bindings: ContextBindings,
    update_bindings: ContextBindings,
    event_bindings: Vec<ContextBindings>,
    spawn_interval_binding: ParameterBinding,
    interp_spawn_start_binding: ParameterBinding,
    position_base: Option<ComponentBase>,
    sprite_size_base: Option<ComponentBase>,
    scale_base: Option<ComponentBase>,
}

impl EmitterInstance {
    /// Build the emitter's runtime state: the particle data set from both
    /// scripts' attribute lists, execution contexts, event-generator sets
    /// registered under the three-part key, and parameter bindings.
    pub fn new(
        spec: Arc<EmitterSpec>,
        owner: SystemInstanceId,
        num_spawn_infos: usize,
        events: &mut EventSetStore,
        gpu_queue: Option<Arc<GpuDispatchQueue>>,
    ) -> Self {
        let mut data = DataSet::new();
        data.add_variables(spec.update_script.attributes().iter().cloned());
        data.add_variables(spec.spawn_script.attributes().iter().cloned());
        data.finalize();

        let spawn_event_sets = spec
            .spawn_event_generators
            .iter()
            .map(|g| {
                let key = EventSetKey::new(owner, spec.name.clone(), g.event_name.clone());
                events.create(key, &g.variables)
            })
            .collect();
        let update_event_sets = spec
            .update_event_generators
            .iter()
            .map(|g| {
                let key = EventSetKey::new(owner, spec.name.clone(), g.event_name.clone());
                events.create(key, &g.variables)
            })
            .collect();

        let spawn_ctx = ScriptExecutionContext::new(spec.spawn_script.clone(), spec.sim_target);
        let update_ctx = ScriptExecutionContext::new(spec.update_script.clone(), spec.sim_target);
        let event_ctxs: Vec<ScriptExecutionContext> = spec
            .event_handlers
            .iter()
            .map(|h| ScriptExecutionContext::new(h.script.clone(), SimTarget::Cpu))
            .collect();

        let gpu = match (spec.sim_target, gpu_queue) {
            (SimTarget::Gpu, Some(queue)) => {
                let mut link =
                    GpuEmitterLink::new(queue, &spec.spawn_script, &spec.update_script);
                link.spawn_binding = crate::param_store::StoreBinding::new(
                    &spawn_ctx.parameters,
                    &link.combined_params,
                );
                link.update_binding = crate::param_store::StoreBinding::new(
                    &update_ctx.parameters,
                    &link.combined_params,
                );
                Some(link)
            }
            _ => None,
        };

        let spawn_bindings = ContextBindings::new(&spawn_ctx);
        let update_bindings = ContextBindings::new(&update_ctx);
        let event_bindings = event_ctxs.iter().map(ContextBindings::new).collect();
        let spawn_interval_binding = ParameterBinding::new(
            &spawn_ctx.parameters,
            &Variable::float(params::EMITTER_SPAWN_INTERVAL),
        );
        let interp_spawn_start_binding = ParameterBinding::new(
            &spawn_ctx.parameters,
            &Variable::float(params::EMITTER_INTERP_SPAWN_START_DT),
        );

        let layout = data.layout();
        let position_base = layout.variable_base(&Variable::vec3(params::ATTR_POSITION));
        let sprite_size_base = layout.variable_base(&Variable::vec2(params::ATTR_SPRITE_SIZE));
        let scale_base = layout.variable_base(&Variable::vec3(params::ATTR_SCALE));

        let mut instance = Self {
            spec,
            owner,
            data,
            spawn_ctx,
            update_ctx,
            event_ctxs,
            spawn_event_sets,
            update_event_sets,
            spawn_infos: vec![SpawnInfo::default(); num_spawn_infos],
            exec_state: ExecutionState::Inactive,
            age: 0.0,
            error: false,
            reset_pending: false,
            cached_bounds: Bounds::EMPTY,
            cpu_time_ms: 0.0,
            gpu,
            spawn_bindings,
            update_bindings,
            event_bindings,
            spawn_interval_binding,
            interp_spawn_start_binding,
            position_base,
            sprite_size_base,
            scale_base,
        };
        instance.reset();
        instance
    }

    // ---- accessors (renderer contract and the system simulation) ----

    pub fn spec(&self) -> &Arc<EmitterSpec> {
        &self.spec
    }

    pub fn name(&self) -> &str {
        &self.spec.name
    }

    /// The particle data set, for renderers.
    pub fn data_set(&self) -> &DataSet {
        &self.data
    }

    /// Live particle count of the current generation.
    pub fn num_particles(&self) -> usize {
        self.data.num_instances()
    }

    /// Current world-space bounds.
    pub fn bounds(&self) -> Bounds {
        self.cached_bounds
    }

    pub fn execution_state(&self) -> ExecutionState {
        self.exec_state
    }

    pub fn age(&self) -> f32 {
        self.age
    }

    /// Sticky structural-error flag.
    pub fn has_error(&self) -> bool {
        self.error
    }

    /// Milliseconds the last CPU tick took.
    pub fn cpu_time_ms(&self) -> f32 {
        self.cpu_time_ms
    }

    /// Approximate bytes held by the particle data set.
    pub fn total_bytes_used(&self) -> usize {
        self.data.size_bytes()
    }

    /// The spawn infos the system simulation scatters into each frame.
    pub fn spawn_infos_mut(&mut self) -> &mut [SpawnInfo] {
        &mut self.spawn_infos
    }

    pub fn spawn_context(&self) -> &ScriptExecutionContext {
        &self.spawn_ctx
    }

    pub fn spawn_context_mut(&mut self) -> &mut ScriptExecutionContext {
        &mut self.spawn_ctx
    }

    pub fn update_context(&self) -> &ScriptExecutionContext {
        &self.update_ctx
    }

    pub fn update_context_mut(&mut self) -> &mut ScriptExecutionContext {
        &mut self.update_ctx
    }

    pub fn event_contexts(&self) -> &[ScriptExecutionContext] {
        &self.event_ctxs
    }

    pub fn event_contexts_mut(&mut self) -> &mut [ScriptExecutionContext] {
        &mut self.event_ctxs
    }

    // ---- lifecycle ----

    /// Request execution-state changes through the policy gate: a spec
    /// disabled by detail level pins the state to `Disabled`.
    pub fn set_execution_state(&mut self, state: ExecutionState) {
        if state != ExecutionState::Disabled && self.spec.enabled {
            self.exec_state = state;
        } else {
            self.exec_state = ExecutionState::Disabled;
        }
    }

    /// Complete or disabled.
    pub fn is_complete(&self) -> bool {
        self.exec_state.is_complete()
    }

    /// Force or observe completion. When complete with live particle data
    /// still around, both buffer generations are cleared so stale rows can
    /// neither render nor leak into a later reset.
    pub fn handle_completion(&mut self, force: bool) -> bool {
        if force {
            self.set_execution_state(ExecutionState::Complete);
        }
        if self.is_complete() {
            if self.data.num_instances() > 0 || self.data.prev_num_instances() > 0 {
                self.data.reset_buffers();
            }
            return true;
        }
        false
    }

    /// Full reset: clears the sticky error, zeroes age, re-runs the
    /// structural checks and arms a pending particle-count reset for the
    /// next pre-tick.
    pub fn reset(&mut self) {
        self.reset_pending = true;
        self.age = 0.0;
        self.error = false;
        self.set_execution_state(ExecutionState::Active);
        if self.is_complete() {
            return;
        }
        self.check_for_errors();
    }

    fn check_for_errors(&mut self) {
        let spec = &self.spec;
        if spec.spawn_script.reads_attributes() {
            error!(
                "emitter '{}': script '{}' reads attribute data and cannot be a spawn script; the data read would be invalid",
                spec.name,
                spec.spawn_script.name()
            );
            self.error = true;
            return;
        }
        if spec.spawn_script.attributes().is_empty() || spec.update_script.attributes().is_empty()
        {
            error!(
                "emitter '{}' cannot be enabled because its spawn or update script has no attributes",
                spec.name
            );
            self.error = true;
            return;
        }
        match spec.sim_target {
            SimTarget::Cpu => {
                let mut failed = false;
                if !spec.spawn_script.did_compile_succeed(SimTarget::Cpu) {
                    error!(
                        "emitter '{}' cannot be enabled because its CPU spawn script is not compiled",
                        spec.name
                    );
                    failed = true;
                }
                if !spec.update_script.did_compile_succeed(SimTarget::Cpu) {
                    error!(
                        "emitter '{}' cannot be enabled because its CPU update script is not compiled",
                        spec.name
                    );
                    failed = true;
                }
                for handler in &spec.event_handlers {
                    if !handler.script.did_compile_succeed(SimTarget::Cpu) {
                        error!(
                            "emitter '{}' cannot be enabled because event script '{}' is not compiled",
                            spec.name,
                            handler.script.name()
                        );
                        failed = true;
                    }
                }
                if failed {
                    self.error = true;
                }
            }
            SimTarget::Gpu => {
                if spec.spawn_script.compile_status(SimTarget::Gpu) == CompileStatus::Pending
                    || spec.update_script.compile_status(SimTarget::Gpu) == CompileStatus::Pending
                {
                    error!(
                        "emitter '{}' cannot be enabled because its GPU script has not been compiled yet",
                        spec.name
                    );
                    self.error = true;
                    return;
                }
                if !spec.spawn_script.did_compile_succeed(SimTarget::Gpu)
                    || !spec.update_script.did_compile_succeed(SimTarget::Gpu)
                {
                    error!(
                        "emitter '{}' cannot be enabled because its GPU script failed to compile",
                        spec.name
                    );
                    self.error = true;
                    return;
                }
                if self.gpu.is_none() {
                    error!(
                        "emitter '{}' targets the GPU but no batcher queue is available",
                        spec.name
                    );
                    self.error = true;
                }
            }
        }
    }

    /// Bind data-interface instances into every script context. The
    /// resolver maps a declared interface name to the instance and its slot
    /// in the owner's arena.
    pub fn bind_data_interfaces(
        &mut self,
        resolve: &mut dyn FnMut(&str) -> Option<(Arc<dyn DataInterface>, usize)>,
    ) {
        let mut bind = |ctx: &mut ScriptExecutionContext| {
            let names: Vec<String> = ctx.script().data_interfaces().to_vec();
            for (slot, name) in names.iter().enumerate() {
                if let Some((iface, arena_slot)) = resolve(name) {
                    ctx.set_data_interface(slot, iface, arena_slot);
                }
            }
        };
        bind(&mut self.spawn_ctx);
        bind(&mut self.update_ctx);
        for ctx in &mut self.event_ctxs {
            bind(ctx);
        }
    }

    /// Mark every context's function table for rebuild.
    pub fn dirty_data_interfaces(&mut self) {
        self.spawn_ctx.dirty_data_interfaces();
        self.update_ctx.dirty_data_interfaces();
        for ctx in &mut self.event_ctxs {
            ctx.dirty_data_interfaces();
        }
    }

    // ---- per-frame ----

    /// Parameter upkeep and buffer swaps, before any simulation this frame.
    pub fn pre_tick(&mut self, events: &mut EventSetStore) {
        if self.error || self.is_complete() {
            return;
        }

        self.spawn_ctx.apply_tunables();
        self.update_ctx.apply_tunables();
        for ctx in &mut self.event_ctxs {
            ctx.apply_tunables();
        }

        let mut ok = self.spawn_ctx.tick();
        ok &= self.update_ctx.tick();
        for ctx in &mut self.event_ctxs {
            ok &= ctx.tick();
        }
        if !ok {
            error!(
                "emitter '{}': script context tick failed; disabling until reset",
                self.spec.name
            );
            self.error = true;
            return;
        }

        if self.reset_pending {
            self.data.set_num_instances(0);
            self.reset_pending = false;
        }

        match self.spec.sim_target {
            SimTarget::Cpu => {
                // Swap every owned data set before the main tick so this
                // frame's writes land in a fresh generation while reads see
                // last frame's results.
                self.data.tick();
                for &idx in self.update_event_sets.iter().chain(&self.spawn_event_sets) {
                    if let Some(set) = events.get_mut(idx) {
                        set.tick();
                    }
                }
            }
            SimTarget::Gpu => {
                // The batcher ran one frame behind; fold its count in now.
                if let Some(link) = &self.gpu {
                    if let Some(count) = link.result.take() {
                        self.data.allocate(count as usize);
                        self.data.set_num_instances(count as usize);
                    }
                }
            }
        }
    }

    /// One simulation step. See the module docs for the pass order.
    pub fn tick(
        &mut self,
        dt: f32,
        events: &mut EventSetStore,
        arena: &mut InterfaceArena,
        owner_transform: &Mat4,
    ) {
        if self.error {
            return;
        }
        let tick_start = Instant::now();

        if self.handle_completion(false) {
            return;
        }

        self.age += dt;

        if self.exec_state == ExecutionState::InactiveClear {
            self.data.reset_buffers();
            self.exec_state = ExecutionState::Inactive;
            return;
        }

        let orig_num = self.data.prev_num_instances();
        if orig_num == 0 && self.exec_state != ExecutionState::Active {
            // A starved, non-active emitter stops doing work.
            self.data.allocate(0);
            return;
        }

        self.apply_frame_constants(dt);

        // Regular spawn total across all live spawn infos.
        let mut spawn_total = 0usize;
        if self.exec_state == ExecutionState::Active {
            for info in &self.spawn_infos {
                if info.count > 0 {
                    spawn_total += info.count as usize;
                }
            }
        }

        // Per-handler event spawn counts, one entry per consumed event.
        let num_handlers = self.spec.event_handlers.len();
        let mut handler_sources: Vec<Option<usize>> = vec![None; num_handlers];
        let mut event_spawn_counts: Vec<Vec<usize>> = vec![Vec::new(); num_handlers];
        let mut event_spawn_total = 0usize;
        for h in 0..num_handlers {
            let handler = &self.spec.event_handlers[h];
            let source_emitter =
                handler.source_emitter.clone().unwrap_or_else(|| self.spec.name.clone());
            let key = EventSetKey::new(self.owner, source_emitter, handler.source_event.clone());
            handler_sources[h] = events.index_of(&key);

            let spawning = self.exec_state == ExecutionState::Active
                && handler.execution_mode == EventExecutionMode::SpawnedParticles
                && handler.spawn_number > 0;
            if !spawning {
                continue;
            }
            if let Some(set) = handler_sources[h].and_then(|idx| events.get(idx)) {
                let mut num_events = set.prev_num_instances();
                if handler.max_events_per_frame > 0 {
                    num_events = num_events.min(handler.max_events_per_frame as usize);
                }
                for _ in 0..num_events {
                    event_spawn_counts[h].push(handler.spawn_number as usize);
                    event_spawn_total += handler.spawn_number as usize;
                }
            }
        }

        // GPU emitters queue a compute context and are done; the batcher
        // picks it up on its own thread. Exact bounds would need a readback
        // that does not exist, so a fixed expansion stands in.
        if self.spec.sim_target == SimTarget::Gpu {
            self.queue_gpu_tick(orig_num, spawn_total, event_spawn_total);
            self.cached_bounds = match self.spec.fixed_bounds {
                Some(fixed) if !self.spec.local_space => fixed.transform_by(owner_transform),
                Some(fixed) => fixed,
                None => Bounds::centered(Vec3::ZERO, GPU_BOUNDS_EXTENT),
            };
            return;
        }

        // Room for last frame's particles plus everything spawning now.
        let allocation_size = orig_num + spawn_total + event_spawn_total;
        self.data.allocate(allocation_size);

        // Update pass: simulate existing particles forward. Update scripts
        // may only shrink the live count.
        if orig_num > 0 {
            self.data.set_num_instances(orig_num);
            self.update_bindings
                .exec_count
                .set_i32(&mut self.update_ctx.parameters, orig_num as i32);
            if let Some(gen_sets) = events.disjoint_mut(&self.update_event_sets) {
                let mut infos = Vec::with_capacity(1 + gen_sets.len());
                infos.push(DataSetExecInfo::new(&mut self.data, 0, false, true));
                for set in gen_sets {
                    let start = set.num_instances();
                    infos.push(DataSetExecInfo::new(set, start, true, true));
                }
                self.update_ctx.execute(orig_num, &mut infos, Some(arena));
            }
            // We either lose particles or stay the same; the dispatch layer
            // clamps reported counts so update can never grow the set.
            debug_assert!(self.data.num_instances() <= orig_num);
        }

        // Spawn pass: once per spawn info, each with its own sub-frame
        // timing, then once per event-driven batch.
        let mut event_spawn_start = self.data.num_instances();
        if spawn_total + event_spawn_total > 0 {
            if self.exec_state == ExecutionState::Active {
                for i in 0..self.spawn_infos.len() {
                    let info = self.spawn_infos[i];
                    if info.count <= 0 {
                        continue;
                    }
                    self.spawn_interval_binding
                        .set_f32(&mut self.spawn_ctx.parameters, info.interval_dt);
                    self.interp_spawn_start_binding
                        .set_f32(&mut self.spawn_ctx.parameters, info.interp_start_dt);
                    self.spawn_batch(info.count as usize, events, arena);
                }
            }

            event_spawn_start = self.data.num_instances();

            for h in 0..num_handlers {
                for i in 0..event_spawn_counts[h].len() {
                    let count = event_spawn_counts[h][i];
                    // Event spawns are instantaneous at the middle of the frame.
                    self.spawn_interval_binding.set_f32(&mut self.spawn_ctx.parameters, 0.0);
                    self.interp_spawn_start_binding
                        .set_f32(&mut self.spawn_ctx.parameters, dt * 0.5);
                    self.spawn_batch(count, events, arena);
                }
            }
        }

        self.handle_events(
            events,
            arena,
            &handler_sources,
            &event_spawn_counts,
            event_spawn_start,
        );

        self.post_process_particles(owner_transform);

        self.spawn_ctx.post_tick();
        self.update_ctx.post_tick();
        for ctx in &mut self.event_ctxs {
            ctx.post_tick();
        }

        self.cpu_time_ms = tick_start.elapsed().as_secs_f32() * 1000.0;
    }

    fn apply_frame_constants(&mut self, dt: f32) {
        let inv_dt = if dt > 0.0 { 1.0 / dt } else { 0.0 };
        let age = self.age;
        let local = self.spec.local_space;

        let apply = |b: &ContextBindings, ctx: &mut ScriptExecutionContext| {
            b.age.set_f32(&mut ctx.parameters, age);
            b.local_space.set_bool(&mut ctx.parameters, local);
            b.delta_time.set_f32(&mut ctx.parameters, dt);
            b.inv_delta_time.set_f32(&mut ctx.parameters, inv_dt);
        };
        apply(&self.spawn_bindings, &mut self.spawn_ctx);
        apply(&self.update_bindings, &mut self.update_ctx);
        for (b, ctx) in self.event_bindings.iter().zip(&mut self.event_ctxs) {
            apply(b, ctx);
        }
    }

    /// Run the spawn script once, appending `count` rows at the tail.
    fn spawn_batch(&mut self, count: usize, events: &mut EventSetStore, arena: &mut InterfaceArena) {
        if count == 0 {
            return;
        }
        let start = self.data.num_instances();
        self.data.set_num_instances(start + count);
        self.spawn_bindings
            .exec_count
            .set_i32(&mut self.spawn_ctx.parameters, count as i32);
        if let Some(gen_sets) = events.disjoint_mut(&self.spawn_event_sets) {
            let mut infos = Vec::with_capacity(1 + gen_sets.len());
            infos.push(DataSetExecInfo::new(&mut self.data, start, false, true));
            for set in gen_sets {
                let set_start = set.num_instances();
                infos.push(DataSetExecInfo::new(set, set_start, true, true));
            }
            self.spawn_ctx.execute(count, &mut infos, Some(arena));
        }
    }

    /// Event handling, in this strict order for determinism: spawned-
    /// particle handlers first, then every-particle, then single-particle.
    fn handle_events(
        &mut self,
        events: &mut EventSetStore,
        arena: &mut InterfaceArena,
        handler_sources: &[Option<usize>],
        event_spawn_counts: &[Vec<usize>],
        mut event_spawn_start: usize,
    ) {
        for h in 0..self.spec.event_handlers.len() {
            let handler = self.spec.event_handlers[h].clone();
            let Some(src_idx) = handler_sources[h] else {
                continue;
            };

            // Handlers over the particles just spawned for their events.
            if !event_spawn_counts[h].is_empty() {
                let total = self.data.num_instances();
                // Swap and copy forward so the event script sees a stable
                // base while writing new attributes.
                self.data.tick();
                self.data.copy_prev_to_cur();
                for (event_idx, &count) in event_spawn_counts[h].iter().enumerate() {
                    self.event_bindings[h]
                        .exec_count
                        .set_i32(&mut self.event_ctxs[h].parameters, count as i32);
                    let Some(source) = events.get_mut(src_idx) else {
                        break;
                    };
                    let mut infos = [
                        DataSetExecInfo::new(&mut self.data, event_spawn_start, false, false),
                        DataSetExecInfo::new(source, event_idx, false, false),
                    ];
                    self.event_ctxs[h].execute(count, &mut infos, Some(arena));
                    event_spawn_start += count;
                }
                debug_assert_eq!(self.data.num_instances(), total);
            }

            // One dispatch per event across every live particle.
            if handler.execution_mode == EventExecutionMode::EveryParticle {
                let num_events =
                    events.get(src_idx).map(|s| s.prev_num_instances()).unwrap_or(0);
                for event_idx in 0..num_events {
                    self.data.tick();
                    self.data.copy_prev_to_cur();
                    let num_particles = self.data.prev_num_instances();
                    self.event_bindings[h]
                        .exec_count
                        .set_i32(&mut self.event_ctxs[h].parameters, num_particles as i32);
                    let Some(source) = events.get_mut(src_idx) else {
                        break;
                    };
                    let mut infos = [
                        DataSetExecInfo::new(&mut self.data, 0, false, false),
                        DataSetExecInfo::new(source, event_idx, false, false),
                    ];
                    self.event_ctxs[h].execute(num_particles, &mut infos, Some(arena));
                }
            }

            // One dispatch per event against exactly the indexed particle.
            if handler.execution_mode == EventExecutionMode::SingleParticle {
                let indices: Vec<i32> = match events.get(src_idx) {
                    Some(source) => {
                        let index_var = Variable::int(params::ATTR_PARTICLE_INDEX);
                        match source.layout().variable_base(&index_var) {
                            Some(base) => source.prev_int_column(base.int_base).to_vec(),
                            None => {
                                warn!(
                                    "emitter '{}': single-particle handler '{}' source set lacks '{}'",
                                    self.spec.name,
                                    handler.script.name(),
                                    params::ATTR_PARTICLE_INDEX
                                );
                                Vec::new()
                            }
                        }
                    }
                    None => Vec::new(),
                };
                if indices.is_empty() {
                    continue;
                }
                self.event_bindings[h]
                    .exec_count
                    .set_i32(&mut self.event_ctxs[h].parameters, 1);
                self.data.tick();
                self.data.copy_prev_to_cur();
                let total = self.data.num_instances();
                for (event_idx, &particle) in indices.iter().enumerate() {
                    // An out-of-range index is "no result", not an error.
                    if particle < 0 || particle as usize >= total {
                        continue;
                    }
                    let Some(source) = events.get_mut(src_idx) else {
                        break;
                    };
                    let mut infos = [
                        DataSetExecInfo::new(&mut self.data, particle as usize, false, false),
                        DataSetExecInfo::new(source, event_idx, false, false),
                    ];
                    self.event_ctxs[h].execute(1, &mut infos, Some(arena));
                }
                debug_assert_eq!(self.data.num_instances(), total);
            }
        }
    }

    /// Recompute cached bounds from live particles, or take the fixed box.
    fn post_process_particles(&mut self, owner_transform: &Mat4) {
        self.cached_bounds = Bounds::EMPTY;
        if self.data.num_instances() == 0 {
            return;
        }
        if let Some(fixed) = self.spec.fixed_bounds {
            self.cached_bounds = if !self.spec.local_space {
                fixed.transform_by(owner_transform)
            } else {
                fixed
            };
            return;
        }
        let mut bounds = self.calculate_dynamic_bounds();
        if self.spec.local_space {
            bounds = bounds.transform_by(owner_transform);
        }
        self.cached_bounds = bounds;
    }

    fn calculate_dynamic_bounds(&self) -> Bounds {
        let Some(pos) = self.position_base else {
            return Bounds::EMPTY;
        };
        let num = self.data.num_instances();
        let xs = self.data.float_column(pos.float_base);
        let ys = self.data.float_column(pos.float_base + 1);
        let zs = self.data.float_column(pos.float_base + 2);

        let mut bounds = Bounds::EMPTY;
        let mut max_size = Vec3::ZERO;
        let mut saw_nan = false;
        for i in 0..num {
            let p = Vec3::new(xs[i], ys[i], zs[i]);
            if p.is_nan() {
                saw_nan = true;
                continue;
            }
            bounds.insert(p);

            if let Some(scale) = self.scale_base {
                let s = Vec3::new(
                    self.data.float_column(scale.float_base)[i],
                    self.data.float_column(scale.float_base + 1)[i],
                    self.data.float_column(scale.float_base + 2)[i],
                );
                max_size = max_size.max(s);
            } else if let Some(size) = self.sprite_size_base {
                let s = self.data.float_column(size.float_base)[i]
                    .max(self.data.float_column(size.float_base + 1)[i]);
                max_size = max_size.max(Vec3::splat(s));
            }
        }
        if saw_nan {
            warn!(
                "emitter '{}': particle position data contains NaNs, likely a divide by zero in a module",
                self.spec.name
            );
        }

        let mut max_base = Vec3::splat(0.0001);
        for extents in &self.spec.renderer_base_extents {
            max_base = max_base.max(*extents);
        }
        bounds.expand_by(max_size * max_base)
    }

    fn queue_gpu_tick(&mut self, orig_num: usize, spawn_total: usize, event_spawn_total: usize) {
        let Some(link) = &mut self.gpu else {
            return;
        };
        link.spawn_binding.apply(&self.spawn_ctx.parameters, &mut link.combined_params);
        link.update_binding.apply(&self.update_ctx.parameters, &mut link.combined_params);

        let mut blob = vec![0u8; link.combined_params.padded_size()];
        if link.combined_params.copy_to_padded_buffer(&mut blob).is_err() {
            warn!("emitter '{}': padded parameter export failed; skipping GPU tick", self.spec.name);
            return;
        }

        let layout = self.data.layout();
        let row_words = (layout.num_float_streams() + layout.num_int_streams()) as u32;
        link.queue.enqueue(ComputeExecutionContext {
            emitter_name: self.spec.name.clone(),
            spawn_source: self.spec.spawn_script.gpu_source().unwrap_or_default().to_string(),
            update_source: self.spec.update_script.gpu_source().unwrap_or_default().to_string(),
            param_blob: blob,
            prev_num_instances: orig_num as u32,
            spawn_rate_instances: spawn_total as u32,
            event_spawn_total: event_spawn_total as u32,
            capacity: (orig_num + spawn_total + event_spawn_total) as u32,
            row_words,
            result: link.result.clone(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::param_store::ParameterValue;
    use crate::script::Script;
    use crate::vm::KernelBatch;

    fn position_spawn_script() -> Arc<Script> {
        // Writes lane index into position.x for appended rows.
        let kernel = |batch: &mut KernelBatch<'_>| {
            let n = batch.num_instances();
            let set = batch.set_mut(0);
            for lane in 0..n {
                set.output_f32(0)[lane] = lane as f32;
                set.output_f32(1)[lane] = 0.0;
                set.output_f32(2)[lane] = 0.0;
            }
        };
        Script::new("spawn")
            .with_attribute(Variable::vec3(params::ATTR_POSITION))
            .with_parameter(Variable::int(params::ENGINE_EXEC_COUNT), ParameterValue::Int(0))
            .with_cpu_kernel(Arc::new(kernel))
            .build()
    }

    fn carry_update_script() -> Arc<Script> {
        // Carries every particle forward unchanged.
        let kernel = |batch: &mut KernelBatch<'_>| {
            let n = batch.num_instances();
            let set = batch.set_mut(0);
            for stream in 0..3 {
                for lane in 0..n {
                    let v = set.input_f32(stream)[lane];
                    set.output_f32(stream)[lane] = v;
                }
            }
        };
        Script::new("update")
            .with_attribute(Variable::vec3(params::ATTR_POSITION))
            .with_reads_attributes()
            .with_cpu_kernel(Arc::new(kernel))
            .build()
    }

    fn harness() -> (EmitterInstance, EventSetStore, InterfaceArena) {
        let spec = Arc::new(EmitterSpec::new(
            "sparks",
            position_spawn_script(),
            carry_update_script(),
        ));
        let mut events = EventSetStore::new();
        let inst = EmitterInstance::new(spec, SystemInstanceId(1), 1, &mut events, None);
        (inst, events, InterfaceArena::default())
    }

    fn step(inst: &mut EmitterInstance, events: &mut EventSetStore, arena: &mut InterfaceArena) {
        inst.pre_tick(events);
        inst.tick(0.016, events, arena, &Mat4::IDENTITY);
    }

    #[test]
    fn test_spawn_accumulates_over_frames() {
        let (mut inst, mut events, mut arena) = harness();
        inst.spawn_infos_mut()[0] = SpawnInfo::with_count(10);
        for _ in 0..5 {
            step(&mut inst, &mut events, &mut arena);
        }
        assert_eq!(inst.num_particles(), 50);
    }

    #[test]
    fn test_disabled_clears_both_generations() {
        let (mut inst, mut events, mut arena) = harness();
        inst.spawn_infos_mut()[0] = SpawnInfo::with_count(12);
        step(&mut inst, &mut events, &mut arena);
        assert_eq!(inst.num_particles(), 12);

        inst.set_execution_state(ExecutionState::Disabled);
        inst.spawn_infos_mut()[0] = SpawnInfo::default();
        step(&mut inst, &mut events, &mut arena);
        assert_eq!(inst.data_set().num_instances(), 0);
        assert_eq!(inst.data_set().prev_num_instances(), 0);
    }

    #[test]
    fn test_inactive_emitter_stops_spawning() {
        let (mut inst, mut events, mut arena) = harness();
        inst.spawn_infos_mut()[0] = SpawnInfo::with_count(10);
        step(&mut inst, &mut events, &mut arena);
        inst.set_execution_state(ExecutionState::Inactive);
        step(&mut inst, &mut events, &mut arena);
        // Existing particles carried, no new spawns.
        assert_eq!(inst.num_particles(), 10);
    }

    #[test]
    fn test_spawn_script_reading_attributes_is_sticky_error() {
        let bad_spawn = Script::new("bad_spawn")
            .with_attribute(Variable::vec3(params::ATTR_POSITION))
            .with_reads_attributes()
            .with_cpu_kernel(Arc::new(|_b: &mut KernelBatch<'_>| {}))
            .build();
        let spec = Arc::new(EmitterSpec::new("broken", bad_spawn, carry_update_script()));
        let mut events = EventSetStore::new();
        let mut inst = EmitterInstance::new(spec, SystemInstanceId(1), 1, &mut events, None);
        assert!(inst.has_error());

        let mut arena = InterfaceArena::default();
        inst.spawn_infos_mut()[0] = SpawnInfo::with_count(10);
        step(&mut inst, &mut events, &mut arena);
        assert_eq!(inst.num_particles(), 0);

        inst.reset();
        // Still broken after reset; the check runs again.
        assert!(inst.has_error());
    }

    #[test]
    fn test_update_never_grows_the_live_count() {
        // An update kernel claiming to have produced extra rows is clamped
        // at the dispatch layer; the live count stays monotonic.
        let greedy_update = Script::new("greedy")
            .with_attribute(Variable::vec3(params::ATTR_POSITION))
            .with_cpu_kernel(Arc::new(|batch: &mut KernelBatch<'_>| {
                let n = batch.num_instances();
                batch.report_written(0, n + 5);
            }))
            .build();
        let spec = Arc::new(EmitterSpec::new("grower", position_spawn_script(), greedy_update));
        let mut events = EventSetStore::new();
        let mut inst = EmitterInstance::new(spec, SystemInstanceId(1), 1, &mut events, None);
        let mut arena = InterfaceArena::default();

        inst.spawn_infos_mut()[0] = SpawnInfo::with_count(4);
        step(&mut inst, &mut events, &mut arena);
        assert_eq!(inst.num_particles(), 4);
        inst.spawn_infos_mut()[0] = SpawnInfo::default();
        step(&mut inst, &mut events, &mut arena);
        assert_eq!(inst.num_particles(), 4);
        assert!(!inst.has_error());
    }
}
