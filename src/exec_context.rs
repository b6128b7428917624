//! Script execution contexts.
//!
//! A [`ScriptExecutionContext`] owns everything one script needs to run:
//! the parameter store built from the script's declarations, the bound
//! data-interface instances, and the external-function dispatch table. One
//! call to [`ScriptExecutionContext::execute`] drives the script's kernel
//! across N instances reading/writing one or more data sets.
//!
//! The function table is rebuilt lazily: binding or rebinding an interface
//! marks the context dirty, and the next [`ScriptExecutionContext::tick`]
//! re-resolves every declared external function against the interfaces
//! bound at that moment. A slot-count mismatch or an unresolvable function
//! is a hard failure for that tick; the caller must not execute.

use std::sync::Arc;

use log::warn;

use crate::data_interface::{DataInterface, InterfaceArena};
use crate::data_set::DataSet;
use crate::param_store::{ParameterStore, StoreBinding};
use crate::script::{Script, SimTarget};
use crate::vm::{ExternalFunction, KernelBatch, KernelSet};

/// One data set bound into a dispatch: where to start, whether to grow the
/// set to fit the batch, and whether to write the VM-reported row count
/// back afterwards.
pub struct DataSetExecInfo<'a> {
    pub data: &'a mut DataSet,
    pub start_instance: usize,
    pub allocate: bool,
    pub update_counts: bool,
}

impl<'a> DataSetExecInfo<'a> {
    pub fn new(
        data: &'a mut DataSet,
        start_instance: usize,
        allocate: bool,
        update_counts: bool,
    ) -> Self {
        Self { data, start_instance, allocate, update_counts }
    }
}

/// Binds a compiled script's parameters and external functions, and drives
/// its kernel over data sets.
pub struct ScriptExecutionContext {
    script: Arc<Script>,
    target: SimTarget,
    /// The context's parameter store. Values are set through bindings each
    /// tick; the layout is locked at construction.
    pub parameters: ParameterStore,
    function_table: Vec<ExternalFunction>,
    arena_slots: Vec<usize>,
    interfaces_dirty: bool,
    tunable_binding: Option<StoreBinding>,
}

impl ScriptExecutionContext {
    /// Build a context for a script, populating the parameter store from
    /// the script's declared parameters and constants. Interpolated spawn
    /// scripts get a previous-value shadow of every parameter.
    pub fn new(script: Arc<Script>, target: SimTarget) -> Self {
        let mut parameters = ParameterStore::new();
        for (var, value) in script.parameters() {
            parameters.add_parameter(var.clone(), *value);
        }
        if script.is_interpolated_spawn() {
            parameters.enable_shadowing();
        }
        parameters.lock_layout();
        Self {
            script,
            target,
            parameters,
            function_table: Vec::new(),
            arena_slots: Vec::new(),
            interfaces_dirty: true,
            tunable_binding: None,
        }
    }

    /// The script this context executes.
    pub fn script(&self) -> &Arc<Script> {
        &self.script
    }

    /// The execution target the context was built for.
    pub fn target(&self) -> SimTarget {
        self.target
    }

    /// Bind a data interface instance at a script slot and mark the
    /// function table for rebuild. `arena_slot` is where the interface's
    /// per-instance data lives in the owning instance's arena; resolved
    /// functions carry it so the VM reaches the right bytes.
    pub fn set_data_interface(
        &mut self,
        slot: usize,
        iface: Arc<dyn DataInterface>,
        arena_slot: usize,
    ) {
        self.parameters.set_interface(slot, iface);
        if self.arena_slots.len() <= slot {
            self.arena_slots.resize(slot + 1, usize::MAX);
        }
        self.arena_slots[slot] = arena_slot;
        self.interfaces_dirty = true;
    }

    /// Force a function-table rebuild on the next tick.
    pub fn dirty_data_interfaces(&mut self) {
        self.interfaces_dirty = true;
    }

    /// Pull the script's externally tunable parameters into this context's
    /// store. The offset pairing is computed once and reused.
    pub fn apply_tunables(&mut self) {
        let tunables = self.script.tunables().read().expect("tunables lock");
        if self.tunable_binding.is_none() {
            self.tunable_binding = Some(StoreBinding::new(&tunables, &self.parameters));
        }
        if let Some(binding) = &self.tunable_binding {
            binding.apply(&tunables, &mut self.parameters);
        }
    }

    /// Per-tick upkeep. Rebuilds the external-function dispatch table when
    /// the bound interface set changed. Returns `false` on a structural
    /// mismatch (wrong interface count, unresolvable function); the caller
    /// must not execute this tick.
    #[must_use]
    pub fn tick(&mut self) -> bool {
        if !self.interfaces_dirty {
            return true;
        }
        let declared = self.script.data_interfaces().len();
        let bound = self.parameters.interfaces().len();
        if bound != declared {
            warn!(
                "script '{}': {} data interfaces bound, {} declared; refusing to execute",
                self.script.name(),
                bound,
                declared
            );
            return false;
        }
        let mut table = Vec::with_capacity(self.script.external_functions().len());
        for request in self.script.external_functions() {
            let Some(iface) = self.parameters.interfaces().get(request.interface_slot) else {
                warn!(
                    "script '{}': external function '{}' names interface slot {} out of range",
                    self.script.name(),
                    request.name,
                    request.interface_slot
                );
                return false;
            };
            let Some(func) = iface.provide_function(request) else {
                warn!(
                    "script '{}': interface at slot {} cannot provide function '{}'",
                    self.script.name(),
                    request.interface_slot,
                    request.name
                );
                return false;
            };
            let arena_slot = self
                .arena_slots
                .get(request.interface_slot)
                .copied()
                .unwrap_or(request.interface_slot);
            table.push(ExternalFunction::new(request.name.clone(), arena_slot, func));
        }
        self.function_table = table;
        self.interfaces_dirty = false;
        true
    }

    /// Run the kernel once for `num_instances` across the bound data sets.
    ///
    /// Zero instances is a successful no-op. A register-table failure
    /// (primary layout missing a script attribute) skips the dispatch but
    /// still returns `true`: degrade, don't crash. `false` means the
    /// context is not in an executable state (no compiled kernel).
    pub fn execute(
        &self,
        num_instances: usize,
        exec_infos: &mut [DataSetExecInfo<'_>],
        mut arena: Option<&mut InterfaceArena>,
    ) -> bool {
        if num_instances == 0 {
            return true;
        }
        debug_assert!(!self.interfaces_dirty, "execute without a successful tick");

        let Some(kernel) = self.script.cpu_kernel() else {
            warn!("script '{}' has no CPU kernel; dispatch refused", self.script.name());
            return false;
        };

        for info in exec_infos.iter_mut() {
            if info.allocate {
                info.data.allocate(info.start_instance + num_instances);
            }
        }

        if let Some(primary) = exec_infos.first() {
            if let Err(missing) = primary.data.check_script_layout(self.script.attributes()) {
                warn!(
                    "script '{}': data set lacks attribute '{}'; skipping dispatch",
                    self.script.name(),
                    missing
                );
                return true;
            }
        }

        let num_sets = exec_infos.len();
        let mut sets = Vec::with_capacity(num_sets);
        for info in exec_infos.iter_mut() {
            let start = info.start_instance;
            let (prev, cur) = info.data.split_prev_cur();
            sets.push(KernelSet::from_buffers(prev, cur, start));
        }

        let mut batch = KernelBatch::new(
            num_instances,
            self.parameters.words(),
            sets,
            &self.function_table,
            arena.as_deref_mut(),
        );
        kernel.execute(&mut batch);

        let written: Vec<usize> = (0..num_sets).map(|i| batch.written(i)).collect();
        drop(batch);

        for (info, rows) in exec_infos.iter_mut().zip(written) {
            if info.update_counts {
                let rows = rows.min(num_instances);
                info.data.set_num_instances(info.start_instance + rows);
            }
        }
        true
    }

    /// For interpolated spawn scripts: shift current parameter values into
    /// the previous-value shadow, ready for next frame's deltas.
    pub fn post_tick(&mut self) {
        if self.script.is_interpolated_spawn() && self.parameters.is_shadowed() {
            self.parameters.copy_curr_to_prev();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attribute::Variable;
    use crate::data_interface::{ExternalFunctionRequest, InterfaceCapabilities};
    use crate::param_store::ParameterValue;
    use crate::vm::ExternalFnImpl;

    fn advance_script() -> Arc<Script> {
        // Moves x forward by the dt parameter, once per lane.
        let kernel = |batch: &mut KernelBatch<'_>| {
            let dt = batch.constant_f32(0);
            let n = batch.num_instances();
            let set = batch.set_mut(0);
            for lane in 0..n {
                let x = set.input_f32(0)[lane];
                set.output_f32(0)[lane] = x + dt;
            }
        };
        Script::new("advance")
            .with_attribute(Variable::float("x"))
            .with_parameter(Variable::float("dt"), ParameterValue::Float(0.25))
            .with_cpu_kernel(Arc::new(kernel))
            .build()
    }

    fn data_set() -> DataSet {
        let mut ds = DataSet::new();
        ds.add_variable(Variable::float("x"));
        ds.finalize();
        ds
    }

    #[test]
    fn test_execute_advances_rows() {
        let mut ctx = ScriptExecutionContext::new(advance_script(), SimTarget::Cpu);
        assert!(ctx.tick());

        let mut ds = data_set();
        ds.allocate(3);
        ds.set_num_instances(3);
        ds.float_column_mut(0).copy_from_slice(&[1.0, 2.0, 3.0]);
        ds.tick();
        ds.allocate(3);
        ds.set_num_instances(3);

        let mut infos = [DataSetExecInfo::new(&mut ds, 0, false, true)];
        assert!(ctx.execute(3, &mut infos, None));
        assert_eq!(ds.num_instances(), 3);
        assert_eq!(ds.float_column(0), &[1.25, 2.25, 3.25]);
    }

    #[test]
    fn test_zero_instances_is_a_noop() {
        let ctx = ScriptExecutionContext::new(advance_script(), SimTarget::Cpu);
        let mut ds = data_set();
        let mut infos = [DataSetExecInfo::new(&mut ds, 0, false, true)];
        assert!(ctx.execute(0, &mut infos, None));
    }

    #[test]
    fn test_layout_mismatch_skips_dispatch() {
        let mut ctx = ScriptExecutionContext::new(advance_script(), SimTarget::Cpu);
        assert!(ctx.tick());
        let mut ds = DataSet::new();
        ds.add_variable(Variable::float("unrelated"));
        ds.finalize();
        ds.tick();
        ds.allocate(2);
        ds.set_num_instances(2);
        let before = ds.float_column(0).to_vec();
        let mut infos = [DataSetExecInfo::new(&mut ds, 0, false, true)];
        // Success with no effect.
        assert!(ctx.execute(2, &mut infos, None));
        assert_eq!(ds.float_column(0), &before[..]);
    }

    #[test]
    fn test_interface_count_mismatch_fails_tick() {
        let script = Script::new("needs_iface")
            .with_data_interface("mesh")
            .with_cpu_kernel(Arc::new(|_b: &mut KernelBatch<'_>| {}))
            .build();
        let mut ctx = ScriptExecutionContext::new(script, SimTarget::Cpu);
        assert!(!ctx.tick());
    }

    struct Doubler;

    impl DataInterface for Doubler {
        fn capabilities(&self) -> InterfaceCapabilities {
            InterfaceCapabilities::empty()
        }

        fn provide_function(
            &self,
            request: &ExternalFunctionRequest,
        ) -> Option<Arc<ExternalFnImpl>> {
            (request.name == "double").then(|| {
                Arc::new(|_data: &mut [u8], inputs: &[f32], outputs: &mut [f32]| {
                    outputs[0] = inputs[0] * 2.0;
                }) as Arc<ExternalFnImpl>
            })
        }
    }

    #[test]
    fn test_function_table_resolution_and_call() {
        let kernel = |batch: &mut KernelBatch<'_>| {
            let n = batch.num_instances();
            for lane in 0..n {
                let x = batch.set(0).input_f32(0)[lane];
                let mut out = [0.0f32];
                assert!(batch.call_external(0, &[x], &mut out));
                batch.set_mut(0).output_f32(0)[lane] = out[0];
            }
        };
        let script = Script::new("doubling")
            .with_attribute(Variable::float("x"))
            .with_data_interface("doubler")
            .with_external_function("double", 0)
            .with_cpu_kernel(Arc::new(kernel))
            .build();

        let mut ctx = ScriptExecutionContext::new(script, SimTarget::Cpu);
        ctx.set_data_interface(0, Arc::new(Doubler), 0);
        assert!(ctx.tick());

        let mut ds = data_set();
        ds.allocate(2);
        ds.set_num_instances(2);
        ds.float_column_mut(0).copy_from_slice(&[3.0, 5.0]);
        ds.tick();
        ds.allocate(2);
        ds.set_num_instances(2);

        let mut infos = [DataSetExecInfo::new(&mut ds, 0, false, true)];
        assert!(ctx.execute(2, &mut infos, None));
        assert_eq!(ds.float_column(0), &[6.0, 10.0]);
    }

    #[test]
    fn test_post_tick_shadows_interpolated_params() {
        let script = Script::new("interp_spawn")
            .with_parameter(Variable::float("age"), ParameterValue::Float(0.0))
            .with_interpolated_spawn()
            .with_cpu_kernel(Arc::new(|_b: &mut KernelBatch<'_>| {}))
            .build();
        let mut ctx = ScriptExecutionContext::new(script, SimTarget::Cpu);
        ctx.parameters
            .set_value(&Variable::float("age"), ParameterValue::Float(1.5));
        ctx.post_tick();
        assert_eq!(
            ctx.parameters.get_value(&Variable::float("prev.age")),
            Some(ParameterValue::Float(1.5))
        );
    }

    #[test]
    fn test_update_counts_respects_kernel_report() {
        // Kernel kills one particle: reports fewer rows than requested.
        let kernel = |batch: &mut KernelBatch<'_>| {
            let n = batch.num_instances();
            let set = batch.set_mut(0);
            let mut written = 0;
            for lane in 0..n {
                let x = set.input_f32(0)[lane];
                if x >= 0.0 {
                    set.output_f32(0)[written] = x;
                    written += 1;
                }
            }
            batch.report_written(0, written);
        };
        let script = Script::new("cull")
            .with_attribute(Variable::float("x"))
            .with_cpu_kernel(Arc::new(kernel))
            .build();
        let mut ctx = ScriptExecutionContext::new(script, SimTarget::Cpu);
        assert!(ctx.tick());

        let mut ds = data_set();
        ds.allocate(3);
        ds.set_num_instances(3);
        ds.float_column_mut(0).copy_from_slice(&[1.0, -2.0, 3.0]);
        ds.tick();
        ds.allocate(3);
        ds.set_num_instances(3);

        let mut infos = [DataSetExecInfo::new(&mut ds, 0, false, true)];
        assert!(ctx.execute(3, &mut infos, None));
        assert_eq!(ds.num_instances(), 2);
        assert_eq!(ds.float_column(0), &[1.0, 3.0]);
    }
}
