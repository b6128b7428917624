//! Parameter stores: flat constant buffers feeding script execution.
//!
//! A [`ParameterStore`] is an ordered list of named parameters over one flat
//! buffer of 32-bit words. Scripts read it as their constant table; the GPU
//! path exports it through a precomputed padding table into a constant-buffer
//! ready byte layout.
//!
//! Once a store has been used for execution its layout is locked: values may
//! be overwritten but parameters may not be added, removed or renamed; the
//! word offsets are baked into bindings and kernels by then.
//!
//! Cross-store plumbing is explicit. A [`StoreBinding`] precomputes offset
//! pairs between two stores and copies matching parameters when applied;
//! [`ParameterToDataSetBinding`] and [`DataSetToParameterBinding`] move rows
//! between a store and a data set. There is no registration or unbinding:
//! dropping a binding is the teardown.

use std::sync::Arc;

use glam::{Mat4, Vec2, Vec3, Vec4};

use crate::attribute::{AttributeType, Variable};
use crate::data_interface::DataInterface;
use crate::data_set::DataSet;
use crate::state::{ExecutionState, SpawnInfo};

/// A typed parameter value.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ParameterValue {
    Float(f32),
    Int(i32),
    Bool(bool),
    Vec2(Vec2),
    Vec3(Vec3),
    Vec4(Vec4),
    Mat4(Mat4),
    SpawnInfo(SpawnInfo),
    ExecState(ExecutionState),
}

impl ParameterValue {
    /// The attribute type this value stores as.
    pub fn ty(&self) -> AttributeType {
        match self {
            ParameterValue::Float(_) => AttributeType::Float,
            ParameterValue::Int(_) => AttributeType::Int,
            ParameterValue::Bool(_) => AttributeType::Bool,
            ParameterValue::Vec2(_) => AttributeType::Vec2,
            ParameterValue::Vec3(_) => AttributeType::Vec3,
            ParameterValue::Vec4(_) => AttributeType::Vec4,
            ParameterValue::Mat4(_) => AttributeType::Mat4,
            ParameterValue::SpawnInfo(_) => AttributeType::SpawnInfo,
            ParameterValue::ExecState(_) => AttributeType::ExecState,
        }
    }

    /// Zero value for a type.
    pub fn zero(ty: AttributeType) -> Self {
        match ty {
            AttributeType::Float => ParameterValue::Float(0.0),
            AttributeType::Int => ParameterValue::Int(0),
            AttributeType::Bool => ParameterValue::Bool(false),
            AttributeType::Vec2 => ParameterValue::Vec2(Vec2::ZERO),
            AttributeType::Vec3 => ParameterValue::Vec3(Vec3::ZERO),
            AttributeType::Vec4 => ParameterValue::Vec4(Vec4::ZERO),
            AttributeType::Mat4 => ParameterValue::Mat4(Mat4::ZERO),
            AttributeType::SpawnInfo => ParameterValue::SpawnInfo(SpawnInfo::default()),
            AttributeType::ExecState => ParameterValue::ExecState(ExecutionState::Inactive),
        }
    }

    /// Encode as 32-bit words: float components first, then int components.
    fn write_words(&self, out: &mut [u32]) {
        match self {
            ParameterValue::Float(v) => out[0] = v.to_bits(),
            ParameterValue::Int(v) => out[0] = *v as u32,
            ParameterValue::Bool(v) => out[0] = *v as u32,
            ParameterValue::Vec2(v) => {
                out[0] = v.x.to_bits();
                out[1] = v.y.to_bits();
            }
            ParameterValue::Vec3(v) => {
                out[0] = v.x.to_bits();
                out[1] = v.y.to_bits();
                out[2] = v.z.to_bits();
            }
            ParameterValue::Vec4(v) => {
                for (o, c) in out.iter_mut().zip(v.to_array()) {
                    *o = c.to_bits();
                }
            }
            ParameterValue::Mat4(v) => {
                for (o, c) in out.iter_mut().zip(v.to_cols_array()) {
                    *o = c.to_bits();
                }
            }
            ParameterValue::SpawnInfo(v) => {
                out[0] = v.interval_dt.to_bits();
                out[1] = v.interp_start_dt.to_bits();
                out[2] = v.count as u32;
                out[3] = v.spawn_group as u32;
            }
            ParameterValue::ExecState(v) => out[0] = v.to_i32() as u32,
        }
    }

    /// Decode from 32-bit words laid out as [`Self::write_words`] produces.
    fn read_words(ty: AttributeType, words: &[u32]) -> Self {
        let f = |i: usize| f32::from_bits(words[i]);
        match ty {
            AttributeType::Float => ParameterValue::Float(f(0)),
            AttributeType::Int => ParameterValue::Int(words[0] as i32),
            AttributeType::Bool => ParameterValue::Bool(words[0] != 0),
            AttributeType::Vec2 => ParameterValue::Vec2(Vec2::new(f(0), f(1))),
            AttributeType::Vec3 => ParameterValue::Vec3(Vec3::new(f(0), f(1), f(2))),
            AttributeType::Vec4 => ParameterValue::Vec4(Vec4::new(f(0), f(1), f(2), f(3))),
            AttributeType::Mat4 => {
                let mut cols = [0.0f32; 16];
                for (c, w) in cols.iter_mut().zip(words) {
                    *c = f32::from_bits(*w);
                }
                ParameterValue::Mat4(Mat4::from_cols_array(&cols))
            }
            AttributeType::SpawnInfo => ParameterValue::SpawnInfo(SpawnInfo {
                interval_dt: f(0),
                interp_start_dt: f(1),
                count: words[2] as i32,
                spawn_group: words[3] as i32,
            }),
            AttributeType::ExecState => {
                ParameterValue::ExecState(ExecutionState::from_i32(words[0] as i32))
            }
        }
    }
}

#[derive(Clone, Copy, Debug)]
struct PaddedField {
    src_word: usize,
    byte_offset: usize,
    size: usize,
}

/// Flat buffer of named parameter values plus bound data-interface slots.
#[derive(Default)]
pub struct ParameterStore {
    params: Vec<Variable>,
    offsets: Vec<usize>,
    words: Vec<u32>,
    interfaces: Vec<Arc<dyn DataInterface>>,
    locked: bool,
    shadowed: bool,
    base_count: usize,
    padding: Option<(Vec<PaddedField>, usize)>,
    dirty: bool,
}

impl ParameterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a parameter with an initial value. Returns its word offset.
    ///
    /// # Panics
    ///
    /// Panics if the layout is locked or the variable's type does not match
    /// the value's type.
    pub fn add_parameter(&mut self, var: Variable, value: ParameterValue) -> usize {
        assert!(!self.locked, "add_parameter on a locked parameter store");
        assert_eq!(var.ty, value.ty(), "parameter type mismatch for {}", var.name);
        if let Some(existing) = self.offset_of(&var) {
            // Re-adding an existing parameter just overwrites its value.
            let words = var.ty.num_words();
            value.write_words(&mut self.words[existing..existing + words]);
            return existing;
        }
        let offset = self.words.len();
        self.params.push(var.clone());
        self.offsets.push(offset);
        self.words.resize(offset + var.ty.num_words(), 0);
        value.write_words(&mut self.words[offset..]);
        self.base_count = self.params.len();
        offset
    }

    /// Remove a parameter. Only legal before the layout is locked.
    ///
    /// # Panics
    ///
    /// Panics if the layout is locked.
    pub fn remove_parameter(&mut self, var: &Variable) {
        assert!(!self.locked, "remove_parameter on a locked parameter store");
        let Some(idx) = self.params.iter().position(|p| p == var) else {
            return;
        };
        let offset = self.offsets[idx];
        let words = var.ty.num_words();
        self.params.remove(idx);
        self.offsets.remove(idx);
        self.words.drain(offset..offset + words);
        for o in &mut self.offsets[idx..] {
            *o -= words;
        }
        self.base_count = self.params.len();
    }

    /// Duplicate every parameter into a "previous value" shadow occupying
    /// the second half of the buffer. Used by interpolated spawn scripts.
    pub fn enable_shadowing(&mut self) {
        assert!(!self.locked && !self.shadowed, "shadowing must be set up before lock");
        let base_params: Vec<Variable> = self.params.clone();
        let base_words = self.words.len();
        for var in base_params {
            let offset = self.words.len();
            let shadow = Variable::new(var.ty, format!("prev.{}", var.name));
            self.params.push(shadow);
            self.offsets.push(offset);
            self.words.resize(offset + var.ty.num_words(), 0);
        }
        // Shadow starts equal to current.
        self.words.copy_within(0..base_words, base_words);
        self.shadowed = true;
        self.base_count = self.params.len() / 2;
    }

    /// Freeze the layout and build the padding table. Values remain
    /// writable; structure does not.
    pub fn lock_layout(&mut self) {
        if self.locked {
            return;
        }
        let mut fields = Vec::with_capacity(self.params.len());
        let mut cursor = 0usize;
        for (var, &offset) in self.params.iter().zip(&self.offsets) {
            let align = var.ty.padded_align();
            cursor = (cursor + align - 1) & !(align - 1);
            fields.push(PaddedField {
                src_word: offset,
                byte_offset: cursor,
                size: var.ty.padded_size(),
            });
            cursor += var.ty.padded_size();
        }
        let padded_size = (cursor + 15) & !15;
        self.padding = Some((fields, padded_size));
        self.locked = true;
    }

    /// Whether [`ParameterStore::lock_layout`] has run.
    pub fn is_locked(&self) -> bool {
        self.locked
    }

    /// Whether a shadow copy of every parameter exists.
    pub fn is_shadowed(&self) -> bool {
        self.shadowed
    }

    /// Parameters in layout order (shadow copies included).
    pub fn parameters(&self) -> &[Variable] {
        &self.params
    }

    /// Word offset of a parameter.
    pub fn offset_of(&self, var: &Variable) -> Option<usize> {
        self.params.iter().position(|p| p == var).map(|i| self.offsets[i])
    }

    /// The flat word buffer, as the VM consumes it.
    pub fn words(&self) -> &[u32] {
        &self.words
    }

    /// Overwrite a parameter value by name.
    pub fn set_value(&mut self, var: &Variable, value: ParameterValue) -> bool {
        debug_assert_eq!(var.ty, value.ty());
        let Some(offset) = self.offset_of(var) else {
            return false;
        };
        value.write_words(&mut self.words[offset..offset + var.ty.num_words()]);
        self.dirty = true;
        true
    }

    /// Read a parameter value by name.
    pub fn get_value(&self, var: &Variable) -> Option<ParameterValue> {
        let offset = self.offset_of(var)?;
        Some(ParameterValue::read_words(var.ty, &self.words[offset..offset + var.ty.num_words()]))
    }

    pub(crate) fn write_words_at(&mut self, offset: usize, value: ParameterValue) {
        value.write_words(&mut self.words[offset..offset + value.ty().num_words()]);
        self.dirty = true;
    }

    /// Externally-set values changed since the last [`Self::clear_dirty`].
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn clear_dirty(&mut self) {
        self.dirty = false;
    }

    // ---- data interface slots ----

    /// Bind a data interface instance at a slot index.
    pub fn set_interface(&mut self, slot: usize, iface: Arc<dyn DataInterface>) {
        if self.interfaces.len() <= slot {
            let filler: Arc<dyn DataInterface> = Arc::new(crate::data_interface::NullInterface);
            self.interfaces.resize_with(slot + 1, || filler.clone());
        }
        self.interfaces[slot] = iface;
    }

    /// Currently bound interface instances.
    pub fn interfaces(&self) -> &[Arc<dyn DataInterface>] {
        &self.interfaces
    }

    // ---- shadow copies ----

    /// Copy the first half of the buffer (current values) into the second
    /// half (previous-value shadow).
    ///
    /// Caller contract: the store must be shadowed, i.e. the parameter count
    /// is exactly double the base count.
    pub fn copy_curr_to_prev(&mut self) {
        debug_assert!(self.shadowed, "copy_curr_to_prev on an unshadowed store");
        debug_assert_eq!(self.params.len(), self.base_count * 2);
        let half = self.words.len() / 2;
        self.words.copy_within(0..half, half);
    }

    // ---- padded GPU export ----

    /// Size of the padded constant-buffer layout in bytes. Only available
    /// once the layout is locked.
    pub fn padded_size(&self) -> usize {
        self.padding.as_ref().map(|(_, size)| *size).unwrap_or(0)
    }

    /// Walk the padding table and write a GPU-ready byte layout into `buf`.
    /// Fails if the destination is smaller than [`Self::padded_size`].
    pub fn copy_to_padded_buffer(&self, buf: &mut [u8]) -> Result<usize, usize> {
        let (fields, padded_size) = self.padding.as_ref().expect("padded export before lock_layout");
        if buf.len() < *padded_size {
            return Err(*padded_size);
        }
        for field in fields {
            let words = &self.words[field.src_word..field.src_word + field.size / 4];
            buf[field.byte_offset..field.byte_offset + field.size]
                .copy_from_slice(bytemuck::cast_slice(words));
        }
        Ok(*padded_size)
    }

    /// Reconstruct every parameter value from a padded byte layout produced
    /// by [`Self::copy_to_padded_buffer`].
    pub fn read_back_padded(&self, buf: &[u8]) -> Vec<(Variable, ParameterValue)> {
        let (fields, _) = self.padding.as_ref().expect("padded read before lock_layout");
        self.params
            .iter()
            .zip(fields)
            .map(|(var, field)| {
                let words: Vec<u32> = (0..field.size / 4)
                    .map(|w| {
                        let at = field.byte_offset + w * 4;
                        bytemuck::pod_read_unaligned(&buf[at..at + 4])
                    })
                    .collect();
                (var.clone(), ParameterValue::read_words(var.ty, &words))
            })
            .collect()
    }
}

/// A precomputed fast-path binding for overwriting a single parameter.
#[derive(Clone, Copy, Debug, Default)]
pub struct ParameterBinding {
    offset: Option<usize>,
}

impl ParameterBinding {
    /// Resolve a binding; an absent parameter yields an inert binding whose
    /// setters do nothing.
    pub fn new(store: &ParameterStore, var: &Variable) -> Self {
        Self { offset: store.offset_of(var) }
    }

    pub fn is_valid(&self) -> bool {
        self.offset.is_some()
    }

    pub fn set_f32(&self, store: &mut ParameterStore, v: f32) {
        if let Some(offset) = self.offset {
            store.write_words_at(offset, ParameterValue::Float(v));
        }
    }

    pub fn set_i32(&self, store: &mut ParameterStore, v: i32) {
        if let Some(offset) = self.offset {
            store.write_words_at(offset, ParameterValue::Int(v));
        }
    }

    pub fn set_bool(&self, store: &mut ParameterStore, v: bool) {
        if let Some(offset) = self.offset {
            store.write_words_at(offset, ParameterValue::Bool(v));
        }
    }
}

/// Copies matching parameters from one store into another.
///
/// Built once against both layouts; applying it is a handful of memcpys.
#[derive(Clone, Debug, Default)]
pub struct StoreBinding {
    pairs: Vec<(usize, usize, usize)>,
}

impl StoreBinding {
    /// Match parameters by name and type between source and destination.
    pub fn new(src: &ParameterStore, dst: &ParameterStore) -> Self {
        let mut pairs = Vec::new();
        for (var, &src_off) in src.params.iter().zip(&src.offsets) {
            if let Some(dst_off) = dst.offset_of(var) {
                pairs.push((src_off, dst_off, var.ty.num_words()));
            }
        }
        Self { pairs }
    }

    /// Copy the bound parameters across.
    pub fn apply(&self, src: &ParameterStore, dst: &mut ParameterStore) {
        for &(src_off, dst_off, words) in &self.pairs {
            dst.words[dst_off..dst_off + words]
                .copy_from_slice(&src.words[src_off..src_off + words]);
        }
        if !self.pairs.is_empty() {
            dst.dirty = true;
        }
    }

    /// Number of parameters the binding moves.
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

#[derive(Clone, Copy, Debug)]
struct RowPair {
    word: usize,
    float_base: usize,
    float_count: usize,
    int_base: usize,
    int_count: usize,
}

/// Writes store parameters into one row of a data set, matching by name
/// and type. The batched system simulation uses this to gather per-instance
/// parameters into its flat instance-parameter sets.
#[derive(Clone, Debug, Default)]
pub struct ParameterToDataSetBinding {
    pairs: Vec<RowPair>,
}

impl ParameterToDataSetBinding {
    pub fn new(store: &ParameterStore, data_set: &DataSet) -> Self {
        Self { pairs: row_pairs(store, data_set) }
    }

    /// Write every bound parameter into `row` of the data set's current
    /// generation.
    pub fn store_to_data_set(&self, store: &ParameterStore, data_set: &mut DataSet, row: usize) {
        for pair in &self.pairs {
            let mut word = pair.word;
            for c in 0..pair.float_count {
                let stream = data_set.float_column_mut(pair.float_base + c);
                stream[row] = f32::from_bits(store.words[word]);
                word += 1;
            }
            for c in 0..pair.int_count {
                let stream = data_set.int_column_mut(pair.int_base + c);
                stream[row] = store.words[word] as i32;
                word += 1;
            }
        }
    }
}

/// Reads one row of a data set back into store parameters, the scatter
/// half of the batched system simulation.
#[derive(Clone, Debug, Default)]
pub struct DataSetToParameterBinding {
    pairs: Vec<RowPair>,
}

impl DataSetToParameterBinding {
    pub fn new(data_set: &DataSet, store: &ParameterStore) -> Self {
        Self { pairs: row_pairs(store, data_set) }
    }

    /// Read every bound parameter out of `row` of the data set's current
    /// generation.
    pub fn data_set_to_store(&self, data_set: &DataSet, store: &mut ParameterStore, row: usize) {
        for pair in &self.pairs {
            let mut word = pair.word;
            for c in 0..pair.float_count {
                store.words[word] = data_set.float_column(pair.float_base + c)[row].to_bits();
                word += 1;
            }
            for c in 0..pair.int_count {
                store.words[word] = data_set.int_column(pair.int_base + c)[row] as u32;
                word += 1;
            }
        }
        if !self.pairs.is_empty() {
            store.dirty = true;
        }
    }
}

fn row_pairs(store: &ParameterStore, data_set: &DataSet) -> Vec<RowPair> {
    let mut pairs = Vec::new();
    for (var, &word) in store.params.iter().zip(&store.offsets) {
        if let Some(base) = data_set.layout().variable_base(var) {
            pairs.push(RowPair {
                word,
                float_base: base.float_base,
                float_count: var.ty.float_components(),
                int_base: base.int_base,
                int_count: var.ty.int_components(),
            });
        }
    }
    pairs
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_store() -> ParameterStore {
        let mut store = ParameterStore::new();
        store.add_parameter(Variable::float("dt"), ParameterValue::Float(0.016));
        store.add_parameter(Variable::vec3("gravity"), ParameterValue::Vec3(Vec3::new(0.0, -9.8, 0.0)));
        store.add_parameter(Variable::int("seed"), ParameterValue::Int(7));
        store.add_parameter(Variable::bool("local_space"), ParameterValue::Bool(true));
        store.add_parameter(
            Variable::mat4("transform"),
            ParameterValue::Mat4(Mat4::from_translation(Vec3::new(1.0, 2.0, 3.0))),
        );
        store.add_parameter(
            Variable::spawn_info("spawn"),
            ParameterValue::SpawnInfo(SpawnInfo {
                count: 12,
                interval_dt: 0.001,
                interp_start_dt: 0.002,
                spawn_group: 1,
            }),
        );
        store
    }

    #[test]
    fn test_set_get_round_trip() {
        let store = sample_store();
        assert_eq!(
            store.get_value(&Variable::vec3("gravity")),
            Some(ParameterValue::Vec3(Vec3::new(0.0, -9.8, 0.0)))
        );
        assert_eq!(store.get_value(&Variable::int("seed")), Some(ParameterValue::Int(7)));
    }

    #[test]
    fn test_padded_round_trip_all_types() {
        let mut store = sample_store();
        store.lock_layout();
        let mut buf = vec![0u8; store.padded_size()];
        let written = store.copy_to_padded_buffer(&mut buf).unwrap();
        assert_eq!(written, store.padded_size());
        for (var, value) in store.read_back_padded(&buf) {
            assert_eq!(store.get_value(&var), Some(value), "mismatch for {}", var);
        }
    }

    #[test]
    fn test_padded_buffer_too_small() {
        let mut store = sample_store();
        store.lock_layout();
        let mut buf = vec![0u8; 4];
        assert!(store.copy_to_padded_buffer(&mut buf).is_err());
    }

    #[test]
    fn test_vec3_padding_is_16_aligned() {
        let mut store = ParameterStore::new();
        store.add_parameter(Variable::float("a"), ParameterValue::Float(1.0));
        store.add_parameter(Variable::vec3("b"), ParameterValue::Vec3(Vec3::ONE));
        store.lock_layout();
        // float at 0..4, vec3 aligned up to 16, total rounded to 32.
        assert_eq!(store.padded_size(), 32);
    }

    #[test]
    #[should_panic]
    fn test_add_after_lock_panics() {
        let mut store = sample_store();
        store.lock_layout();
        store.add_parameter(Variable::float("late"), ParameterValue::Float(0.0));
    }

    #[test]
    fn test_remove_parameter_keeps_offsets_consistent() {
        let mut store = sample_store();
        store.remove_parameter(&Variable::vec3("gravity"));
        assert_eq!(store.get_value(&Variable::int("seed")), Some(ParameterValue::Int(7)));
        assert!(store.get_value(&Variable::vec3("gravity")).is_none());
    }

    #[test]
    fn test_shadow_copy() {
        let mut store = ParameterStore::new();
        store.add_parameter(Variable::float("age"), ParameterValue::Float(1.0));
        store.enable_shadowing();
        store.lock_layout();

        store.set_value(&Variable::float("age"), ParameterValue::Float(2.0));
        assert_eq!(
            store.get_value(&Variable::float("prev.age")),
            Some(ParameterValue::Float(1.0))
        );
        store.copy_curr_to_prev();
        assert_eq!(
            store.get_value(&Variable::float("prev.age")),
            Some(ParameterValue::Float(2.0))
        );
    }

    #[test]
    fn test_store_binding_transfers_matches_only() {
        let mut src = ParameterStore::new();
        src.add_parameter(Variable::float("dt"), ParameterValue::Float(0.5));
        src.add_parameter(Variable::float("only_src"), ParameterValue::Float(9.0));
        let mut dst = ParameterStore::new();
        dst.add_parameter(Variable::float("dt"), ParameterValue::Float(0.0));
        dst.add_parameter(Variable::int("only_dst"), ParameterValue::Int(3));

        let binding = StoreBinding::new(&src, &dst);
        assert_eq!(binding.len(), 1);
        binding.apply(&src, &mut dst);
        assert_eq!(dst.get_value(&Variable::float("dt")), Some(ParameterValue::Float(0.5)));
        assert_eq!(dst.get_value(&Variable::int("only_dst")), Some(ParameterValue::Int(3)));
    }

    #[test]
    fn test_store_data_set_row_round_trip() {
        let mut store = ParameterStore::new();
        store.add_parameter(Variable::vec3("velocity"), ParameterValue::Vec3(Vec3::new(1.0, 2.0, 3.0)));
        store.add_parameter(Variable::int("flags"), ParameterValue::Int(5));

        let mut ds = DataSet::new();
        ds.add_variable(Variable::vec3("velocity"));
        ds.add_variable(Variable::int("flags"));
        ds.finalize();
        ds.allocate(2);
        ds.set_num_instances(2);

        let to_ds = ParameterToDataSetBinding::new(&store, &ds);
        to_ds.store_to_data_set(&store, &mut ds, 1);

        let mut readback = ParameterStore::new();
        readback.add_parameter(Variable::vec3("velocity"), ParameterValue::Vec3(Vec3::ZERO));
        readback.add_parameter(Variable::int("flags"), ParameterValue::Int(0));
        let from_ds = DataSetToParameterBinding::new(&ds, &readback);
        from_ds.data_set_to_store(&ds, &mut readback, 1);

        assert_eq!(
            readback.get_value(&Variable::vec3("velocity")),
            Some(ParameterValue::Vec3(Vec3::new(1.0, 2.0, 3.0)))
        );
        assert_eq!(readback.get_value(&Variable::int("flags")), Some(ParameterValue::Int(5)));
    }

    #[test]
    fn test_dirty_tracking() {
        let mut store = sample_store();
        store.clear_dirty();
        assert!(!store.is_dirty());
        store.set_value(&Variable::float("dt"), ParameterValue::Float(0.033));
        assert!(store.is_dirty());
    }
}
