//! Batched multi-instance system simulation.
//!
//! A [`SystemSimulation`] runs the system-level spawn and update scripts
//! exactly once per frame for *all* registered instances of one system
//! definition, amortizing fixed dispatch overhead across the batch. Each
//! instance is one row of the batch data set; after execution a scatter
//! pass reads the resulting execution states and spawn infos back out and
//! pushes them into each instance's emitters, the only place flat batch
//! rows map back to objects.
//!
//! Instances whose system scripts bind an interface that cannot share
//! state across a batch run in "solo" mode: a private one-row data set
//! stepped through the same scripts with the same layout metadata.
//!
//! Removal uses swap-removal against the packed arrays. The swapped-in
//! instance's stored row index is re-stamped immediately; a stale index
//! would silently corrupt a different instance's state.

use std::sync::Arc;

use rayon::prelude::*;

use crate::attribute::Variable;
use crate::data_set::{ComponentBase, DataSet};
use crate::error::SimulationError;
use crate::exec_context::{DataSetExecInfo, ScriptExecutionContext};
use crate::gpu::GpuDispatchQueue;
use crate::param_store::{
    DataSetToParameterBinding, ParameterBinding, ParameterToDataSetBinding, StoreBinding,
};
use crate::params;
use crate::script::SimTarget;
use crate::state::{ExecutionState, SpawnInfo};
use crate::system::{SystemInstance, SystemInstanceId, SystemSpec};

/// Scatter bindings from the system data set into one emitter's contexts.
#[derive(Default)]
struct EmitterScatterBindings {
    spawn: DataSetToParameterBinding,
    update: DataSetToParameterBinding,
    events: Vec<DataSetToParameterBinding>,
}

/// Batches the system-level scripts across every instance of one system
/// definition.
pub struct SystemSimulation {
    system: Arc<SystemSpec>,
    data_set: DataSet,
    spawn_param_data: DataSet,
    update_param_data: DataSet,
    spawn_ctx: ScriptExecutionContext,
    update_ctx: ScriptExecutionContext,
    solo_data_set: DataSet,
    solo_spawn_ctx: ScriptExecutionContext,
    solo_update_ctx: ScriptExecutionContext,

    instances: Vec<SystemInstance>,
    pending: Vec<SystemInstance>,
    solo_instances: Vec<SystemInstance>,
    completed: Vec<SystemInstance>,
    next_id: u64,
    gpu_queue: Option<Arc<GpuDispatchQueue>>,

    can_execute: bool,
    parallel: bool,

    system_state_base: Option<ComponentBase>,
    emitter_state_bases: Vec<Option<ComponentBase>>,
    emitter_spawn_bases: Vec<Vec<Option<ComponentBase>>>,

    spawn_instance_binding: Option<ParameterToDataSetBinding>,
    update_instance_binding: Option<ParameterToDataSetBinding>,
    emitter_bindings: Vec<EmitterScatterBindings>,

    spawn_dt: ParameterBinding,
    spawn_inv_dt: ParameterBinding,
    update_dt: ParameterBinding,
    update_inv_dt: ParameterBinding,
    solo_spawn_dt: ParameterBinding,
    solo_spawn_inv_dt: ParameterBinding,
    solo_update_dt: ParameterBinding,
    solo_update_inv_dt: ParameterBinding,
}

impl SystemSimulation {
    /// Build the batching engine for a system definition.
    pub fn new(
        system: Arc<SystemSpec>,
        gpu_queue: Option<Arc<GpuDispatchQueue>>,
    ) -> Result<Self, SimulationError> {
        if system.emitters.is_empty() {
            return Err(SimulationError::NoEmitters);
        }
        for (i, emitter) in system.emitters.iter().enumerate() {
            if system.emitters[..i].iter().any(|e| e.name == emitter.name) {
                return Err(SimulationError::DuplicateEmitterName(emitter.name.clone()));
            }
        }

        let build_system_set = || {
            let mut ds = DataSet::new();
            ds.add_variables(system.system_spawn_script.attributes().iter().cloned());
            ds.add_variables(system.system_update_script.attributes().iter().cloned());
            ds.finalize();
            ds
        };
        let data_set = build_system_set();
        let solo_data_set = build_system_set();

        let build_param_set = || {
            let mut ds = DataSet::new();
            ds.add_variables(system.instance_parameters.iter().cloned());
            ds.finalize();
            ds
        };
        let spawn_param_data = build_param_set();
        let update_param_data = build_param_set();

        let mut spawn_ctx =
            ScriptExecutionContext::new(system.system_spawn_script.clone(), SimTarget::Cpu);
        let mut update_ctx =
            ScriptExecutionContext::new(system.system_update_script.clone(), SimTarget::Cpu);
        let mut solo_spawn_ctx =
            ScriptExecutionContext::new(system.system_spawn_script.clone(), SimTarget::Cpu);
        let mut solo_update_ctx =
            ScriptExecutionContext::new(system.system_update_script.clone(), SimTarget::Cpu);
        for ctx in [&mut spawn_ctx, &mut update_ctx, &mut solo_spawn_ctx, &mut solo_update_ctx] {
            let names: Vec<String> = ctx.script().data_interfaces().to_vec();
            for (slot, name) in names.iter().enumerate() {
                if let Some(iface) = system.data_interfaces.get(name) {
                    ctx.set_data_interface(slot, iface.clone(), slot);
                }
            }
        }

        let can_execute = system.system_spawn_script.did_compile_succeed(SimTarget::Cpu)
            && system.system_update_script.did_compile_succeed(SimTarget::Cpu);

        let layout = data_set.layout();
        let system_state_base =
            layout.variable_base(&Variable::exec_state(params::SYSTEM_EXECUTION_STATE));
        let emitter_state_bases = system
            .emitters
            .iter()
            .map(|e| {
                layout.variable_base(&Variable::exec_state(params::emitter_execution_state(
                    &e.name,
                )))
            })
            .collect();
        let emitter_spawn_bases = system
            .emitter_spawn_attributes
            .iter()
            .map(|attrs| {
                attrs
                    .iter()
                    .map(|name| layout.variable_base(&Variable::spawn_info(name.clone())))
                    .collect()
            })
            .collect();

        let dt_var = Variable::float(params::ENGINE_DELTA_TIME);
        let inv_var = Variable::float(params::ENGINE_INV_DELTA_TIME);
        let spawn_dt = ParameterBinding::new(&spawn_ctx.parameters, &dt_var);
        let spawn_inv_dt = ParameterBinding::new(&spawn_ctx.parameters, &inv_var);
        let update_dt = ParameterBinding::new(&update_ctx.parameters, &dt_var);
        let update_inv_dt = ParameterBinding::new(&update_ctx.parameters, &inv_var);
        let solo_spawn_dt = ParameterBinding::new(&solo_spawn_ctx.parameters, &dt_var);
        let solo_spawn_inv_dt = ParameterBinding::new(&solo_spawn_ctx.parameters, &inv_var);
        let solo_update_dt = ParameterBinding::new(&solo_update_ctx.parameters, &dt_var);
        let solo_update_inv_dt = ParameterBinding::new(&solo_update_ctx.parameters, &inv_var);

        Ok(Self {
            system,
            data_set,
            spawn_param_data,
            update_param_data,
            spawn_ctx,
            update_ctx,
            solo_data_set,
            solo_spawn_ctx,
            solo_update_ctx,
            instances: Vec::new(),
            pending: Vec::new(),
            solo_instances: Vec::new(),
            completed: Vec::new(),
            next_id: 1,
            gpu_queue,
            can_execute,
            parallel: false,
            system_state_base,
            emitter_state_bases,
            emitter_spawn_bases,
            spawn_instance_binding: None,
            update_instance_binding: None,
            emitter_bindings: Vec::new(),
            spawn_dt,
            spawn_inv_dt,
            update_dt,
            update_inv_dt,
            solo_spawn_dt,
            solo_spawn_inv_dt,
            solo_update_dt,
            solo_update_inv_dt,
        })
    }

    /// The system definition this simulation batches.
    pub fn system(&self) -> &Arc<SystemSpec> {
        &self.system
    }

    /// Fan the pre and post passes out across a worker pool. Off by
    /// default; results are identical either way since every instance only
    /// touches its own state.
    pub fn set_parallel(&mut self, parallel: bool) {
        self.parallel = parallel;
    }

    /// Create and register a new instance. It joins the batch on the next
    /// tick (or the solo path when the system requires it).
    pub fn add_instance(&mut self) -> SystemInstanceId {
        let id = SystemInstanceId(self.next_id);
        self.next_id += 1;
        let mut instance = SystemInstance::new(self.system.clone(), id, self.gpu_queue.clone());
        instance.pending_spawn = true;
        if instance.is_solo() {
            instance.instance_index = Some(self.solo_instances.len());
            self.solo_instances.push(instance);
        } else {
            instance.instance_index = Some(self.pending.len());
            self.pending.push(instance);
        }
        id
    }

    /// Find a registered instance.
    pub fn instance(&self, id: SystemInstanceId) -> Option<&SystemInstance> {
        self.instances
            .iter()
            .chain(&self.pending)
            .chain(&self.solo_instances)
            .chain(&self.completed)
            .find(|i| i.id() == id)
    }

    /// Find a registered instance, mutably.
    pub fn instance_mut(&mut self, id: SystemInstanceId) -> Option<&mut SystemInstance> {
        self.instances
            .iter_mut()
            .chain(&mut self.pending)
            .chain(&mut self.solo_instances)
            .chain(&mut self.completed)
            .find(|i| i.id() == id)
    }

    /// Instances currently in the live batch.
    pub fn num_instances(&self) -> usize {
        self.instances.len()
    }

    /// Instances waiting to join the batch.
    pub fn num_pending(&self) -> usize {
        self.pending.len()
    }

    /// Instances running unbatched.
    pub fn num_solo(&self) -> usize {
        self.solo_instances.len()
    }

    /// Remove an instance from the simulation, handing it back to the
    /// caller. Swap-removal re-stamps the swapped-in instance's row index
    /// and compacts the batch data rows to match.
    pub fn remove_instance(&mut self, id: SystemInstanceId) -> Option<SystemInstance> {
        if let Some(pos) = self.pending.iter().position(|i| i.id() == id) {
            let mut inst = self.pending.swap_remove(pos);
            inst.instance_index = None;
            inst.pending_spawn = false;
            if let Some(moved) = self.pending.get_mut(pos) {
                moved.instance_index = Some(pos);
            }
            return Some(inst);
        }
        if let Some(pos) = self.instances.iter().position(|i| i.id() == id) {
            return Some(self.remove_live_at(pos));
        }
        if let Some(pos) = self.solo_instances.iter().position(|i| i.id() == id) {
            if pos < self.solo_data_set.num_instances() {
                self.solo_data_set.kill_instance(pos);
            }
            let mut inst = self.solo_instances.swap_remove(pos);
            inst.instance_index = None;
            if let Some(moved) = self.solo_instances.get_mut(pos) {
                moved.instance_index = Some(pos);
            }
            return Some(inst);
        }
        if let Some(pos) = self.completed.iter().position(|i| i.id() == id) {
            return Some(self.completed.swap_remove(pos));
        }
        None
    }

    /// Deactivate an instance in place. See [`SystemInstance::deactivate`];
    /// an immediate deactivation parks the instance in the completed list
    /// at the next tick's scatter pass.
    pub fn deactivate_instance(&mut self, id: SystemInstanceId, immediate: bool) {
        if let Some(inst) = self.instance_mut(id) {
            inst.deactivate(immediate);
        }
    }

    /// Instances that completed during past ticks, for the host to reclaim.
    pub fn drain_completed(&mut self) -> Vec<SystemInstance> {
        std::mem::take(&mut self.completed)
    }

    fn remove_live_at(&mut self, pos: usize) -> SystemInstance {
        if pos < self.data_set.num_instances() {
            self.data_set.kill_instance(pos);
        }
        if pos < self.spawn_param_data.num_instances() {
            self.spawn_param_data.kill_instance(pos);
        }
        if pos < self.update_param_data.num_instances() {
            self.update_param_data.kill_instance(pos);
        }
        let mut inst = self.instances.swap_remove(pos);
        inst.instance_index = None;
        if let Some(moved) = self.instances.get_mut(pos) {
            moved.instance_index = Some(pos);
        }
        inst
    }

    // ---- the batched tick ----

    /// Run one frame for every registered instance: promote pending
    /// instances, gather per-instance state, execute the system update
    /// pass over previously-live rows and the spawn pass over new rows,
    /// scatter results back into emitters, then tick the instances. Solo
    /// instances are stepped individually afterwards with the same order
    /// guarantees.
    pub fn tick(&mut self, dt: f32) {
        let orig_num = self.instances.len();
        let spawn_num = self.pending.len();
        let new_num = orig_num + spawn_num;

        // Promote pending instances into the live batch; slot indices
        // continue after the existing rows.
        for mut inst in self.pending.drain(..) {
            inst.pending_spawn = false;
            inst.instance_index = Some(self.instances.len());
            inst.parameters_mut().lock_layout();
            self.instances.push(inst);
        }

        self.ensure_bindings();

        // Pre-pass: instance-local work may fan out; the row writes below
        // stay serial so batch state is identical either way.
        if self.parallel {
            self.instances.par_iter_mut().for_each(|inst| inst.pre_simulate_tick(dt));
        } else {
            for inst in &mut self.instances {
                inst.pre_simulate_tick(dt);
            }
        }

        // Feed externally-driven execution state and dirty per-instance
        // parameters into the batch sets. These land in the current
        // generation; the swap below turns them into script inputs.
        self.data_set.allocate(new_num);
        self.data_set.set_num_instances(new_num);
        self.spawn_param_data.allocate(new_num);
        self.spawn_param_data.set_num_instances(new_num);
        self.update_param_data.allocate(new_num);
        self.update_param_data.set_num_instances(new_num);
        for row in 0..self.instances.len() {
            self.write_instance_row(row, row >= orig_num);
        }

        self.data_set.tick();
        self.spawn_param_data.tick();
        self.update_param_data.tick();

        if self.can_execute && new_num > 0 {
            self.data_set.allocate(new_num);
            self.spawn_param_data.allocate(new_num);
            self.update_param_data.allocate(new_num);

            let inv_dt = if dt > 0.0 { 1.0 / dt } else { 0.0 };
            self.spawn_dt.set_f32(&mut self.spawn_ctx.parameters, dt);
            self.spawn_inv_dt.set_f32(&mut self.spawn_ctx.parameters, inv_dt);
            self.update_dt.set_f32(&mut self.update_ctx.parameters, dt);
            self.update_inv_dt.set_f32(&mut self.update_ctx.parameters, inv_dt);

            // Update pass over exactly the previously-live rows.
            self.data_set.set_num_instances(orig_num);
            self.update_param_data.set_num_instances(orig_num);
            if self.update_ctx.tick() {
                let mut infos = [
                    DataSetExecInfo::new(&mut self.data_set, 0, false, true),
                    DataSetExecInfo::new(&mut self.update_param_data, 0, false, false),
                ];
                self.update_ctx.execute(orig_num, &mut infos, None);
            }

            // Spawn pass over the newly added rows only.
            if spawn_num > 0 {
                self.data_set.set_num_instances(new_num);
                self.spawn_param_data.set_num_instances(new_num);
                if self.spawn_ctx.tick() {
                    let mut infos = [
                        DataSetExecInfo::new(&mut self.data_set, orig_num, false, true),
                        DataSetExecInfo::new(&mut self.spawn_param_data, orig_num, false, false),
                    ];
                    self.spawn_ctx.execute(spawn_num, &mut infos, None);
                }
            }

            // Every registered row stays addressable for the scatter pass;
            // instances leave through the Complete state, not by the VM
            // shrinking the batch.
            self.data_set.set_num_instances(new_num);
            self.scatter_results();
        }

        // Post-pass: tick surviving instances' emitters.
        if self.parallel {
            self.instances.par_iter_mut().for_each(|inst| inst.post_simulate_tick(dt));
        } else {
            for inst in &mut self.instances {
                inst.post_simulate_tick(dt);
            }
        }

        self.tick_solo_instances(dt);
    }

    /// Step the whole simulation to a target age in sub-steps. The
    /// requested step count is rounded up to the next odd number, an
    /// encoded constraint of interpolating between two buffer states; keep
    /// the parity, don't re-derive it.
    pub fn seek(&mut self, duration: f32, requested_steps: usize) {
        if duration <= 0.0 {
            return;
        }
        let steps = requested_steps.max(1) | 1;
        let dt = duration / steps as f32;
        for _ in 0..steps {
            self.tick(dt);
        }
    }

    /// Build the transfer bindings lazily from the first live instance;
    /// every instance of a system shares the same layouts. The solo data
    /// set shares the batch layout too, so one binding set serves both.
    fn ensure_bindings(&mut self) {
        if self.spawn_instance_binding.is_none() {
            if let Some(first) = self.instances.first() {
                self.spawn_instance_binding = Some(ParameterToDataSetBinding::new(
                    first.parameters(),
                    &self.spawn_param_data,
                ));
                self.update_instance_binding = Some(ParameterToDataSetBinding::new(
                    first.parameters(),
                    &self.update_param_data,
                ));
            }
        }
        if self.emitter_bindings.is_empty() {
            let Some(first) = self.instances.first().or_else(|| self.solo_instances.first())
            else {
                return;
            };
            self.emitter_bindings = first
                .emitters()
                .iter()
                .map(|emitter| EmitterScatterBindings {
                    spawn: DataSetToParameterBinding::new(
                        &self.data_set,
                        &emitter.spawn_context().parameters,
                    ),
                    update: DataSetToParameterBinding::new(
                        &self.data_set,
                        &emitter.update_context().parameters,
                    ),
                    events: emitter
                        .event_contexts()
                        .iter()
                        .map(|ctx| DataSetToParameterBinding::new(&self.data_set, &ctx.parameters))
                        .collect(),
                })
                .collect();
        }
    }

    /// Write one instance's externally-driven state into the batch row.
    fn write_instance_row(&mut self, row: usize, is_new: bool) {
        let inst = &self.instances[row];
        let system_state = inst.execution_state();
        let emitter_states: Vec<ExecutionState> =
            inst.emitters().iter().map(|e| e.execution_state()).collect();
        let params_dirty = inst.parameters().is_dirty();

        if let Some(base) = self.system_state_base {
            self.data_set.int_column_mut(base.int_base)[row] = system_state.to_i32();
        }
        for (e_idx, state) in emitter_states.iter().enumerate() {
            if let Some(base) = self.emitter_state_bases[e_idx] {
                self.data_set.int_column_mut(base.int_base)[row] = state.to_i32();
            }
        }

        if params_dirty || is_new {
            let inst = &self.instances[row];
            if let Some(binding) = &self.spawn_instance_binding {
                binding.store_to_data_set(inst.parameters(), &mut self.spawn_param_data, row);
            }
            if let Some(binding) = &self.update_instance_binding {
                binding.store_to_data_set(inst.parameters(), &mut self.update_param_data, row);
            }
            self.instances[row].parameters_mut().clear_dirty();
        }
    }

    /// Read back per-row execution states and spawn infos and push them
    /// into each instance's emitters. Instances that complete are parked
    /// and their rows compacted; the loop index intentionally does not
    /// advance past a removal.
    fn scatter_results(&mut self) {
        let mut row = 0;
        while row < self.instances.len() {
            let state = self.read_exec_state(self.system_state_base, row);
            self.instances[row].set_execution_state(state);
            if self.instances[row].handle_completion() {
                let inst = self.remove_live_at(row);
                self.completed.push(inst);
                continue;
            }

            self.scatter_into_instance(row);
            row += 1;
        }
    }

    fn scatter_into_instance(&mut self, row: usize) {
        let num_emitters = self.system.emitters.len();
        for e_idx in 0..num_emitters {
            let emitter_state = self.read_exec_state(self.emitter_state_bases[e_idx], row);
            let spawn_infos: Vec<Option<SpawnInfo>> = self.emitter_spawn_bases[e_idx]
                .iter()
                .map(|base| base.map(|b| self.read_spawn_info(b, row)))
                .collect();

            let data_set = &self.data_set;
            let bindings = self.emitter_bindings.get(e_idx);
            let inst = &mut self.instances[row];
            let emitter = &mut inst.emitters_mut()[e_idx];

            // Never let batch results turn a completed emitter back on; it
            // needs an explicit reset.
            if emitter.is_complete() {
                continue;
            }
            emitter.set_execution_state(emitter_state);
            for (slot, info) in spawn_infos.iter().enumerate() {
                if let (Some(info), Some(target)) =
                    (info, emitter.spawn_infos_mut().get_mut(slot))
                {
                    *target = *info;
                }
            }
            if let Some(bindings) = bindings {
                bindings.spawn.data_set_to_store(
                    data_set,
                    &mut emitter.spawn_context_mut().parameters,
                    row,
                );
                bindings.update.data_set_to_store(
                    data_set,
                    &mut emitter.update_context_mut().parameters,
                    row,
                );
                for (ctx, binding) in
                    emitter.event_contexts_mut().iter_mut().zip(&bindings.events)
                {
                    binding.data_set_to_store(data_set, &mut ctx.parameters, row);
                }
            }
        }
    }

    fn read_exec_state(&self, base: Option<ComponentBase>, row: usize) -> ExecutionState {
        match base {
            Some(b) => ExecutionState::from_i32(self.data_set.int_column(b.int_base)[row]),
            // Missing column reads as disabled, the safe direction.
            None => ExecutionState::Disabled,
        }
    }

    fn read_spawn_info(&self, base: ComponentBase, row: usize) -> SpawnInfo {
        SpawnInfo {
            interval_dt: self.data_set.float_column(base.float_base)[row],
            interp_start_dt: self.data_set.float_column(base.float_base + 1)[row],
            count: self.data_set.int_column(base.int_base)[row],
            spawn_group: self.data_set.int_column(base.int_base + 1)[row],
        }
    }

    // ---- solo path ----

    fn tick_solo_instances(&mut self, dt: f32) {
        if self.solo_instances.is_empty() {
            return;
        }
        self.ensure_bindings();

        // Flip buffers and fit the solo set to the current instance list.
        let count = self.solo_instances.len();
        self.solo_data_set.tick();
        self.solo_data_set.allocate(count);
        self.solo_data_set.set_num_instances(count);

        let inv_dt = if dt > 0.0 { 1.0 / dt } else { 0.0 };
        self.solo_spawn_dt.set_f32(&mut self.solo_spawn_ctx.parameters, dt);
        self.solo_spawn_inv_dt.set_f32(&mut self.solo_spawn_ctx.parameters, inv_dt);
        self.solo_update_dt.set_f32(&mut self.solo_update_ctx.parameters, dt);
        self.solo_update_inv_dt.set_f32(&mut self.solo_update_ctx.parameters, inv_dt);

        let mut row = 0;
        while row < self.solo_instances.len() {
            self.tick_solo_at(row, dt);

            let state = self.read_solo_exec_state(row);
            self.solo_instances[row].set_execution_state(state);
            if self.solo_instances[row].handle_completion() {
                self.solo_data_set.kill_instance(row);
                let mut inst = self.solo_instances.swap_remove(row);
                inst.instance_index = None;
                if let Some(moved) = self.solo_instances.get_mut(row) {
                    moved.instance_index = Some(row);
                }
                self.completed.push(inst);
                continue;
            }

            self.scatter_solo_into_instance(row);
            self.solo_instances[row].post_simulate_tick(dt);
            row += 1;
        }
    }

    fn tick_solo_at(&mut self, row: usize, dt: f32) {
        let pending = self.solo_instances[row].pending_spawn;
        self.solo_instances[row].pre_simulate_tick(dt);
        self.solo_instances[row].parameters_mut().lock_layout();

        // Feed the externally driven states into the row about to execute.
        let system_state = self.solo_instances[row].execution_state();
        if let Some(base) = self.system_state_base {
            self.solo_data_set.int_column_mut(base.int_base)[row] = system_state.to_i32();
        }
        let emitter_states: Vec<ExecutionState> = self.solo_instances[row]
            .emitters()
            .iter()
            .map(|e| e.execution_state())
            .collect();
        for (e_idx, state) in emitter_states.iter().enumerate() {
            if let Some(base) = self.emitter_state_bases[e_idx] {
                self.solo_data_set.int_column_mut(base.int_base)[row] = state.to_i32();
            }
        }

        if pending {
            self.solo_instances[row].pending_spawn = false;
        }
        if !self.can_execute {
            return;
        }
        let ctx = if pending { &mut self.solo_spawn_ctx } else { &mut self.solo_update_ctx };

        // Per-instance parameters feed the context directly in solo mode;
        // a fresh by-name match each tick rather than a cached binding,
        // since solo instances are the rare case.
        let binding = StoreBinding::new(self.solo_instances[row].parameters(), &ctx.parameters);
        binding.apply(self.solo_instances[row].parameters(), &mut ctx.parameters);

        if !ctx.tick() {
            return;
        }
        let mut infos = [DataSetExecInfo::new(&mut self.solo_data_set, row, false, false)];
        ctx.execute(1, &mut infos, None);
    }

    fn read_solo_exec_state(&self, row: usize) -> ExecutionState {
        match self.system_state_base {
            Some(b) => ExecutionState::from_i32(self.solo_data_set.int_column(b.int_base)[row]),
            None => ExecutionState::Disabled,
        }
    }

    fn scatter_solo_into_instance(&mut self, row: usize) {
        // The solo set shares the batch layout, so the batch bindings and
        // component bases apply unchanged.
        let num_emitters = self.system.emitters.len();
        for e_idx in 0..num_emitters {
            let emitter_state = match self.emitter_state_bases[e_idx] {
                Some(b) => {
                    ExecutionState::from_i32(self.solo_data_set.int_column(b.int_base)[row])
                }
                None => ExecutionState::Disabled,
            };
            let spawn_infos: Vec<Option<SpawnInfo>> = self.emitter_spawn_bases[e_idx]
                .iter()
                .map(|base| {
                    base.map(|b| SpawnInfo {
                        interval_dt: self.solo_data_set.float_column(b.float_base)[row],
                        interp_start_dt: self.solo_data_set.float_column(b.float_base + 1)[row],
                        count: self.solo_data_set.int_column(b.int_base)[row],
                        spawn_group: self.solo_data_set.int_column(b.int_base + 1)[row],
                    })
                })
                .collect();

            let data_set = &self.solo_data_set;
            let bindings = self.emitter_bindings.get(e_idx);
            let emitter = &mut self.solo_instances[row].emitters_mut()[e_idx];
            if emitter.is_complete() {
                continue;
            }
            emitter.set_execution_state(emitter_state);
            for (slot, info) in spawn_infos.iter().enumerate() {
                if let (Some(info), Some(target)) =
                    (info, emitter.spawn_infos_mut().get_mut(slot))
                {
                    *target = *info;
                }
            }
            if let Some(bindings) = bindings {
                bindings.spawn.data_set_to_store(
                    data_set,
                    &mut emitter.spawn_context_mut().parameters,
                    row,
                );
                bindings.update.data_set_to_store(
                    data_set,
                    &mut emitter.update_context_mut().parameters,
                    row,
                );
                for (ctx, binding) in
                    emitter.event_contexts_mut().iter_mut().zip(&bindings.events)
                {
                    binding.data_set_to_store(data_set, &mut ctx.parameters, row);
                }
            }
        }
    }
}

