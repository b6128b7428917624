//! The boundary to the byte-code virtual machine.
//!
//! The crate never interprets byte-code itself. A compiled script carries an
//! opaque executable (anything implementing [`VectorKernel`]) and the
//! execution context hands it a [`KernelBatch`]: read-only views of the
//! previous buffer generation, mutable views of the current one, the flat
//! constant buffer, and the resolved external-function table. The kernel
//! processes all instances of the batch in one call.
//!
//! Closures implement [`VectorKernel`], which keeps test and host-embedded
//! kernels cheap to write:
//!
//! ```ignore
//! let kernel: Arc<dyn VectorKernel> = Arc::new(|batch: &mut KernelBatch| {
//!     let n = batch.num_instances();
//!     let out = batch.set_mut(0).output_f32(0);
//!     for lane in 0..n {
//!         out[lane] = lane as f32;
//!     }
//! });
//! ```

use std::sync::Arc;

use crate::data_interface::InterfaceArena;
use crate::data_set::DataBuffer;

/// Signature of a resolved external function: per-instance data bytes,
/// input words, output words.
pub type ExternalFnImpl = dyn Fn(&mut [u8], &[f32], &mut [f32]) + Send + Sync;

/// A VM-callable function, resolved from a bound data interface when the
/// execution context's function table is rebuilt.
#[derive(Clone)]
pub struct ExternalFunction {
    /// Name the script requested the binding under.
    pub name: String,
    /// Index of the data interface the function was resolved from.
    pub interface_slot: usize,
    func: Arc<ExternalFnImpl>,
}

impl ExternalFunction {
    /// Wrap a callable for the given binding request.
    pub fn new(
        name: impl Into<String>,
        interface_slot: usize,
        func: Arc<ExternalFnImpl>,
    ) -> Self {
        Self { name: name.into(), interface_slot, func }
    }
}

impl std::fmt::Debug for ExternalFunction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExternalFunction")
            .field("name", &self.name)
            .field("interface_slot", &self.interface_slot)
            .finish()
    }
}

/// The register views for one data set bound into a dispatch.
///
/// Inputs are the previous generation's live rows starting at the bound
/// start instance; outputs are the current generation's allocated rows from
/// the start instance onward.
pub struct KernelSet<'a> {
    in_f: Vec<&'a [f32]>,
    in_i: Vec<&'a [i32]>,
    out_f: Vec<&'a mut [f32]>,
    out_i: Vec<&'a mut [i32]>,
}

impl<'a> KernelSet<'a> {
    pub(crate) fn from_buffers(prev: &'a DataBuffer, cur: &'a mut DataBuffer, start: usize) -> Self {
        let prev_live = prev.num_instances();
        let in_f = prev
            .floats
            .iter()
            .map(|s| &s[start.min(prev_live)..prev_live])
            .collect();
        let in_i = prev
            .ints
            .iter()
            .map(|s| &s[start.min(prev_live)..prev_live])
            .collect();
        let out_f = cur
            .floats
            .iter_mut()
            .map(|s| {
                let lo = start.min(s.len());
                &mut s[lo..]
            })
            .collect();
        let out_i = cur
            .ints
            .iter_mut()
            .map(|s| {
                let lo = start.min(s.len());
                &mut s[lo..]
            })
            .collect();
        Self { in_f, in_i, out_f, out_i }
    }

    /// Read-only float stream from the previous generation.
    pub fn input_f32(&self, stream: usize) -> &[f32] {
        self.in_f[stream]
    }

    /// Read-only int stream from the previous generation.
    pub fn input_i32(&self, stream: usize) -> &[i32] {
        self.in_i[stream]
    }

    /// Writable float stream in the current generation.
    pub fn output_f32(&mut self, stream: usize) -> &mut [f32] {
        self.out_f[stream]
    }

    /// Writable int stream in the current generation.
    pub fn output_i32(&mut self, stream: usize) -> &mut [i32] {
        self.out_i[stream]
    }
}

/// Everything a kernel sees for one vectorized dispatch.
pub struct KernelBatch<'a> {
    num_instances: usize,
    constants: &'a [u32],
    sets: Vec<KernelSet<'a>>,
    externals: &'a [ExternalFunction],
    arena: Option<&'a mut InterfaceArena>,
    written: Vec<Option<usize>>,
}

impl<'a> KernelBatch<'a> {
    pub(crate) fn new(
        num_instances: usize,
        constants: &'a [u32],
        sets: Vec<KernelSet<'a>>,
        externals: &'a [ExternalFunction],
        arena: Option<&'a mut InterfaceArena>,
    ) -> Self {
        let written = vec![None; sets.len()];
        Self { num_instances, constants, sets, externals, arena, written }
    }

    /// Number of instances this dispatch covers.
    pub fn num_instances(&self) -> usize {
        self.num_instances
    }

    /// Number of bound data sets. Set 0 is always the primary set.
    pub fn num_sets(&self) -> usize {
        self.sets.len()
    }

    /// A constant-buffer word reinterpreted as f32.
    pub fn constant_f32(&self, word: usize) -> f32 {
        f32::from_bits(self.constants[word])
    }

    /// A constant-buffer word reinterpreted as i32.
    pub fn constant_i32(&self, word: usize) -> i32 {
        self.constants[word] as i32
    }

    /// Shared view of one bound data set.
    pub fn set(&self, idx: usize) -> &KernelSet<'a> {
        &self.sets[idx]
    }

    /// Mutable view of one bound data set.
    pub fn set_mut(&mut self, idx: usize) -> &mut KernelSet<'a> {
        &mut self.sets[idx]
    }

    /// Mutable views of all bound data sets, for kernels that read one set
    /// while writing another.
    pub fn sets_mut(&mut self) -> &mut [KernelSet<'a>] {
        &mut self.sets
    }

    /// Report how many rows were actually produced for a bound set.
    ///
    /// Without a report the dispatch assumes the primary set wrote the full
    /// batch and appended sets wrote nothing. A report can only shrink the
    /// primary count and only raise an appended set's count up to the batch
    /// size; the execution context clamps.
    pub fn report_written(&mut self, set_idx: usize, rows: usize) {
        self.written[set_idx] = Some(rows);
    }

    pub(crate) fn written(&self, set_idx: usize) -> usize {
        self.written[set_idx].unwrap_or(if set_idx == 0 { self.num_instances } else { 0 })
    }

    /// Invoke a resolved external function. Returns `false` when the index
    /// is out of range or the function's interface has no per-instance data
    /// slot; an invalid handle is "no result", never a panic.
    pub fn call_external(&mut self, fn_idx: usize, inputs: &[f32], outputs: &mut [f32]) -> bool {
        let Some(func) = self.externals.get(fn_idx) else {
            return false;
        };
        let mut empty: [u8; 0] = [];
        let data: &mut [u8] = match self.arena.as_deref_mut() {
            Some(arena) => arena.data_mut(func.interface_slot).unwrap_or(&mut empty),
            None => &mut empty,
        };
        (func.func)(data, inputs, outputs);
        true
    }
}

/// An opaque compiled executable operating over columnar batches.
///
/// Implementations must be deterministic over their inputs: dispatching the
/// same batch twice must produce identical output buffers, which the
/// simulation relies on for replay and seek.
pub trait VectorKernel: Send + Sync {
    /// Process every instance of the batch.
    fn execute(&self, batch: &mut KernelBatch<'_>);
}

impl<F> VectorKernel for F
where
    F: Fn(&mut KernelBatch<'_>) + Send + Sync,
{
    fn execute(&self, batch: &mut KernelBatch<'_>) {
        self(batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attribute::Variable;
    use crate::data_set::DataSet;

    #[test]
    fn test_kernel_views_split_generations() {
        let mut ds = DataSet::new();
        ds.add_variable(Variable::float("x"));
        ds.finalize();
        ds.allocate(3);
        ds.set_num_instances(3);
        ds.float_column_mut(0).copy_from_slice(&[1.0, 2.0, 3.0]);
        ds.tick();
        ds.allocate(3);

        let (prev, cur) = ds.split_prev_cur();
        let mut set = KernelSet::from_buffers(prev, cur, 0);
        assert_eq!(set.input_f32(0), &[1.0, 2.0, 3.0]);
        set.output_f32(0)[0] = 9.0;
        drop(set);

        ds.set_num_instances(3);
        assert_eq!(ds.float_column(0)[0], 9.0);
        assert_eq!(ds.prev_float_column(0), &[1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_written_defaults() {
        let constants: Vec<u32> = Vec::new();
        let batch = KernelBatch::new(7, &constants, Vec::new(), &[], None);
        let mut batch = batch;
        batch.written = vec![None, None];
        assert_eq!(batch.written(0), 7);
        assert_eq!(batch.written(1), 0);
    }

    #[test]
    fn test_closure_is_a_kernel() {
        fn takes_kernel(_k: &dyn VectorKernel) {}
        let k = |_b: &mut KernelBatch<'_>| {};
        takes_kernel(&k);
    }
}
