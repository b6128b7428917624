//! Double-buffered columnar storage for particles and events.
//!
//! A [`DataSet`] owns two generations of the same column layout. Scripts
//! read the previous generation and write the current one; [`DataSet::tick`]
//! swaps which is which. The two generations are always distinct storage;
//! writing to current never mutates what a reader of previous observes.
//!
//! Columns are stored as separate component streams: a `vec3` variable
//! occupies three `f32` streams, a `spawn_info` two `f32` and two `i32`
//! streams. Rows are compacted on kill by swapping the last live row into
//! the hole, so row order is not stable across kills.

use crate::attribute::Variable;

/// Per-variable base indices into the float/int component streams.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ComponentBase {
    /// First float stream used by the variable.
    pub float_base: usize,
    /// First int stream used by the variable.
    pub int_base: usize,
}

/// The finalized column layout shared by both buffer generations.
#[derive(Default, Debug, Clone)]
pub struct DataSetLayout {
    variables: Vec<Variable>,
    bases: Vec<ComponentBase>,
    num_float_streams: usize,
    num_int_streams: usize,
    finalized: bool,
}

impl DataSetLayout {
    /// All declared variables, in layout order.
    pub fn variables(&self) -> &[Variable] {
        &self.variables
    }

    /// Look up the component base of a variable by name and type.
    pub fn variable_base(&self, var: &Variable) -> Option<ComponentBase> {
        self.variables
            .iter()
            .position(|v| v == var)
            .map(|i| self.bases[i])
    }

    /// Whether the layout contains the exact variable (name and type).
    pub fn has_variable(&self, var: &Variable) -> bool {
        self.variables.contains(var)
    }

    /// Total float streams per row.
    pub fn num_float_streams(&self) -> usize {
        self.num_float_streams
    }

    /// Total int streams per row.
    pub fn num_int_streams(&self) -> usize {
        self.num_int_streams
    }
}

/// One generation of column data.
#[derive(Default, Debug, Clone)]
pub struct DataBuffer {
    pub(crate) floats: Vec<Vec<f32>>,
    pub(crate) ints: Vec<Vec<i32>>,
    num_instances: usize,
    /// Tracked explicitly so zero-width layouts (no columns) still hold a
    /// row count.
    capacity: usize,
}

impl DataBuffer {
    fn with_layout(layout: &DataSetLayout) -> Self {
        Self {
            floats: vec![Vec::new(); layout.num_float_streams],
            ints: vec![Vec::new(); layout.num_int_streams],
            num_instances: 0,
            capacity: 0,
        }
    }

    /// Rows currently allocated (not live).
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Live row count.
    pub fn num_instances(&self) -> usize {
        self.num_instances
    }

    fn allocate(&mut self, n: usize) {
        // Grow only; existing rows keep their values.
        for s in &mut self.floats {
            if s.len() < n {
                s.resize(n, 0.0);
            }
        }
        for s in &mut self.ints {
            if s.len() < n {
                s.resize(n, 0);
            }
        }
        self.capacity = self.capacity.max(n);
    }
}

/// Double-buffered columnar store of named, typed attribute streams.
#[derive(Default, Debug, Clone)]
pub struct DataSet {
    layout: DataSetLayout,
    buffers: [DataBuffer; 2],
    current: usize,
}

impl DataSet {
    /// Create an empty, un-finalized data set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare an attribute column. Duplicate declarations (same name and
    /// type) are ignored so spawn and update scripts can both contribute
    /// their attribute lists.
    ///
    /// # Panics
    ///
    /// Panics if called after [`DataSet::finalize`]; the layout is the
    /// contract between producer and consumer scripts and must not change
    /// once buffers exist.
    pub fn add_variable(&mut self, var: Variable) {
        assert!(
            !self.layout.finalized,
            "add_variable after finalize on data set"
        );
        if !self.layout.variables.contains(&var) {
            self.layout.variables.push(var);
        }
    }

    /// Declare several attribute columns at once.
    pub fn add_variables(&mut self, vars: impl IntoIterator<Item = Variable>) {
        for v in vars {
            self.add_variable(v);
        }
    }

    /// Freeze the layout and create the two buffer generations.
    pub fn finalize(&mut self) {
        assert!(!self.layout.finalized, "finalize called twice on data set");
        let mut float_base = 0;
        let mut int_base = 0;
        for var in &self.layout.variables {
            self.layout.bases.push(ComponentBase { float_base, int_base });
            float_base += var.ty.float_components();
            int_base += var.ty.int_components();
        }
        self.layout.num_float_streams = float_base;
        self.layout.num_int_streams = int_base;
        self.layout.finalized = true;
        self.buffers = [
            DataBuffer::with_layout(&self.layout),
            DataBuffer::with_layout(&self.layout),
        ];
    }

    /// The frozen layout.
    pub fn layout(&self) -> &DataSetLayout {
        &self.layout
    }

    /// Number of declared variables.
    pub fn num_variables(&self) -> usize {
        self.layout.variables.len()
    }

    /// Live rows in the current generation.
    pub fn num_instances(&self) -> usize {
        self.buffers[self.current].num_instances
    }

    /// Live rows in the previous generation.
    pub fn prev_num_instances(&self) -> usize {
        self.buffers[self.current ^ 1].num_instances
    }

    /// Ensure the current generation can hold at least `n` rows. Previous
    /// generation contents are untouched.
    pub fn allocate(&mut self, n: usize) {
        debug_assert!(self.layout.finalized, "allocate before finalize");
        self.buffers[self.current].allocate(n);
    }

    /// Set the live count of the current generation.
    ///
    /// # Panics
    ///
    /// Panics in debug builds if `n` exceeds the allocated capacity.
    pub fn set_num_instances(&mut self, n: usize) {
        let buf = &mut self.buffers[self.current];
        debug_assert!(n <= buf.capacity(), "live count {} exceeds capacity {}", n, buf.capacity());
        buf.num_instances = n;
    }

    /// Swap generations. The old current becomes previous; the new current
    /// starts logically empty until spawned into or copied forward.
    pub fn tick(&mut self) {
        self.current ^= 1;
        self.buffers[self.current].num_instances = 0;
    }

    /// Bulk-copy the previous generation's live rows into the current
    /// generation, growing it as needed.
    pub fn copy_prev_to_cur(&mut self) {
        let prev_count = self.prev_num_instances();
        let prev_idx = self.current ^ 1;
        let cur_idx = self.current;
        for s in 0..self.layout.num_float_streams {
            let (src, dst) = Self::two_streams_f32(&mut self.buffers, prev_idx, cur_idx, s);
            if dst.len() < prev_count {
                dst.resize(prev_count, 0.0);
            }
            dst[..prev_count].copy_from_slice(&src[..prev_count]);
        }
        for s in 0..self.layout.num_int_streams {
            let (src, dst) = Self::two_streams_i32(&mut self.buffers, prev_idx, cur_idx, s);
            if dst.len() < prev_count {
                dst.resize(prev_count, 0);
            }
            dst[..prev_count].copy_from_slice(&src[..prev_count]);
        }
        let cur = &mut self.buffers[cur_idx];
        cur.capacity = cur.capacity.max(prev_count);
        cur.num_instances = prev_count;
    }

    /// Remove one live row from the current generation by swapping the last
    /// live row into its place. O(1); invalidates row ordering.
    pub fn kill_instance(&mut self, index: usize) {
        let buf = &mut self.buffers[self.current];
        let count = buf.num_instances;
        assert!(index < count, "kill_instance index {} out of {} live rows", index, count);
        let last = count - 1;
        for s in &mut buf.floats {
            s.swap(index, last);
        }
        for s in &mut buf.ints {
            s.swap(index, last);
        }
        buf.num_instances = last;
    }

    /// Clear the live counts of both generations so no stale rows can be
    /// observed. Allocation is kept.
    pub fn reset_buffers(&mut self) {
        self.buffers[0].num_instances = 0;
        self.buffers[1].num_instances = 0;
    }

    /// Verify that every attribute a script declares exists in this layout.
    /// A missing column is a structural mismatch and the caller must not
    /// dispatch against this set.
    pub fn check_script_layout(&self, attributes: &[Variable]) -> Result<(), Variable> {
        for attr in attributes {
            if !self.layout.has_variable(attr) {
                return Err(attr.clone());
            }
        }
        Ok(())
    }

    /// Split into (previous, current) generations for register-table
    /// construction. The generations are disjoint storage, so the shared
    /// and mutable borrows cannot alias.
    pub(crate) fn split_prev_cur(&mut self) -> (&DataBuffer, &mut DataBuffer) {
        let (a, b) = self.buffers.split_at_mut(1);
        if self.current == 0 {
            (&b[0], &mut a[0])
        } else {
            (&a[0], &mut b[0])
        }
    }

    fn two_streams_f32(
        buffers: &mut [DataBuffer; 2],
        src: usize,
        dst: usize,
        stream: usize,
    ) -> (&mut Vec<f32>, &mut Vec<f32>) {
        debug_assert_ne!(src, dst);
        let (a, b) = buffers.split_at_mut(1);
        if src == 0 {
            (&mut a[0].floats[stream], &mut b[0].floats[stream])
        } else {
            (&mut b[0].floats[stream], &mut a[0].floats[stream])
        }
    }

    fn two_streams_i32(
        buffers: &mut [DataBuffer; 2],
        src: usize,
        dst: usize,
        stream: usize,
    ) -> (&mut Vec<i32>, &mut Vec<i32>) {
        debug_assert_ne!(src, dst);
        let (a, b) = buffers.split_at_mut(1);
        if src == 0 {
            (&mut a[0].ints[stream], &mut b[0].ints[stream])
        } else {
            (&mut b[0].ints[stream], &mut a[0].ints[stream])
        }
    }

    // ---- direct column access (accessors, bounds, tests) ----

    /// Read a float component stream of the current generation, clipped to
    /// the live count.
    pub fn float_column(&self, stream: usize) -> &[f32] {
        let buf = &self.buffers[self.current];
        &buf.floats[stream][..buf.num_instances]
    }

    /// Read an int component stream of the current generation.
    pub fn int_column(&self, stream: usize) -> &[i32] {
        let buf = &self.buffers[self.current];
        &buf.ints[stream][..buf.num_instances]
    }

    /// Read a float component stream of the previous generation.
    pub fn prev_float_column(&self, stream: usize) -> &[f32] {
        let buf = &self.buffers[self.current ^ 1];
        &buf.floats[stream][..buf.num_instances]
    }

    /// Read an int component stream of the previous generation.
    pub fn prev_int_column(&self, stream: usize) -> &[i32] {
        let buf = &self.buffers[self.current ^ 1];
        &buf.ints[stream][..buf.num_instances]
    }

    /// Mutable float component stream of the current generation.
    pub fn float_column_mut(&mut self, stream: usize) -> &mut [f32] {
        let buf = &mut self.buffers[self.current];
        let n = buf.num_instances;
        &mut buf.floats[stream][..n]
    }

    /// Mutable int component stream of the current generation.
    pub fn int_column_mut(&mut self, stream: usize) -> &mut [i32] {
        let buf = &mut self.buffers[self.current];
        let n = buf.num_instances;
        &mut buf.ints[stream][..n]
    }

    /// Approximate memory footprint of both generations, in bytes.
    pub fn size_bytes(&self) -> usize {
        self.buffers
            .iter()
            .map(|b| {
                b.floats.iter().map(|s| s.len() * 4).sum::<usize>()
                    + b.ints.iter().map(|s| s.len() * 4).sum::<usize>()
            })
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attribute::{AttributeType, Variable};

    fn particle_set() -> DataSet {
        let mut ds = DataSet::new();
        ds.add_variable(Variable::vec3("position"));
        ds.add_variable(Variable::float("age"));
        ds.add_variable(Variable::int("id"));
        ds.finalize();
        ds
    }

    #[test]
    fn test_layout_bases() {
        let ds = particle_set();
        let pos = ds.layout().variable_base(&Variable::vec3("position")).unwrap();
        let age = ds.layout().variable_base(&Variable::float("age")).unwrap();
        let id = ds.layout().variable_base(&Variable::int("id")).unwrap();
        assert_eq!(pos.float_base, 0);
        assert_eq!(age.float_base, 3);
        assert_eq!(id.int_base, 0);
        assert_eq!(ds.layout().num_float_streams(), 4);
        assert_eq!(ds.layout().num_int_streams(), 1);
    }

    #[test]
    fn test_duplicate_variable_ignored() {
        let mut ds = DataSet::new();
        ds.add_variable(Variable::vec3("position"));
        ds.add_variable(Variable::vec3("position"));
        assert_eq!(ds.num_variables(), 1);
    }

    #[test]
    #[should_panic]
    fn test_add_after_finalize_panics() {
        let mut ds = particle_set();
        ds.add_variable(Variable::float("late"));
    }

    #[test]
    fn test_double_buffer_is_disjoint() {
        let mut ds = particle_set();
        ds.allocate(4);
        ds.set_num_instances(4);
        for (i, v) in ds.float_column_mut(3).iter_mut().enumerate() {
            *v = i as f32;
        }
        ds.tick();
        ds.allocate(4);
        ds.set_num_instances(4);
        for v in ds.float_column_mut(3).iter_mut() {
            *v = 99.0;
        }
        // Previous generation still sees the original values.
        assert_eq!(ds.prev_float_column(3), &[0.0, 1.0, 2.0, 3.0]);
        assert_eq!(ds.float_column(3), &[99.0; 4]);
    }

    #[test]
    fn test_tick_resets_current_count() {
        let mut ds = particle_set();
        ds.allocate(8);
        ds.set_num_instances(8);
        ds.tick();
        assert_eq!(ds.num_instances(), 0);
        assert_eq!(ds.prev_num_instances(), 8);
    }

    #[test]
    fn test_kill_instance_swaps_last_row() {
        let mut ds = particle_set();
        ds.allocate(5);
        ds.set_num_instances(5);
        for (i, v) in ds.int_column_mut(0).iter_mut().enumerate() {
            *v = i as i32;
        }
        ds.kill_instance(1);
        assert_eq!(ds.num_instances(), 4);
        // Row formerly at the last live index (id 4) moved into slot 1.
        assert_eq!(ds.int_column(0), &[0, 4, 2, 3]);
    }

    #[test]
    fn test_copy_prev_to_cur() {
        let mut ds = particle_set();
        ds.allocate(3);
        ds.set_num_instances(3);
        for (i, v) in ds.float_column_mut(0).iter_mut().enumerate() {
            *v = 10.0 * i as f32;
        }
        ds.tick();
        ds.copy_prev_to_cur();
        assert_eq!(ds.num_instances(), 3);
        assert_eq!(ds.float_column(0), &[0.0, 10.0, 20.0]);
    }

    #[test]
    fn test_reset_buffers_clears_both_generations() {
        let mut ds = particle_set();
        ds.allocate(12);
        ds.set_num_instances(12);
        ds.tick();
        ds.allocate(12);
        ds.set_num_instances(12);
        ds.reset_buffers();
        assert_eq!(ds.num_instances(), 0);
        assert_eq!(ds.prev_num_instances(), 0);
    }

    #[test]
    fn test_layout_mismatch_detected() {
        let ds = particle_set();
        let attrs = [Variable::vec3("position"), Variable::float("mass")];
        assert!(ds.check_script_layout(&attrs).is_err());
        let attrs = [Variable::vec3("position"), Variable::float("age")];
        assert!(ds.check_script_layout(&attrs).is_ok());
    }

    #[test]
    fn test_random_kill_sequence_matches_model() {
        use rand::rngs::StdRng;
        use rand::{Rng, SeedableRng};

        let mut rng = StdRng::seed_from_u64(7);
        let mut ds = particle_set();
        ds.allocate(64);
        ds.set_num_instances(64);
        for (i, v) in ds.int_column_mut(0).iter_mut().enumerate() {
            *v = i as i32;
        }
        let mut model: Vec<i32> = (0..64).collect();
        for _ in 0..40 {
            let i = rng.gen_range(0..model.len());
            ds.kill_instance(i);
            model.swap_remove(i);
            assert_eq!(ds.int_column(0), &model[..]);
        }
    }

    #[test]
    fn test_allocate_preserves_existing_rows() {
        let mut ds = DataSet::new();
        ds.add_variable(Variable::new(AttributeType::Float, "x"));
        ds.finalize();
        ds.allocate(2);
        ds.set_num_instances(2);
        ds.float_column_mut(0).copy_from_slice(&[1.0, 2.0]);
        ds.allocate(6);
        assert_eq!(ds.float_column(0), &[1.0, 2.0]);
    }
}
