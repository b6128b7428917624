//! Data interfaces: scripted access to non-particle data sources.
//!
//! A data interface gives scripts access to external state (mesh surfaces,
//! collision queries, curves) through a narrow contract: optional
//! per-instance data, an optional per-tick hook, and named external
//! functions the VM can call. The simulation core never inspects an
//! interface's internals.
//!
//! Per-instance data lives in an [`InterfaceArena`] owned by the system
//! instance: a single byte buffer indexed by interface slot. Scripts and
//! function tables refer to interfaces by slot index, never by pointer, so
//! tearing an arena down before re-initialization cannot leave anything
//! dangling.

use std::sync::Arc;

use bitflags::bitflags;

use crate::vm::ExternalFnImpl;

bitflags! {
    /// What an interface needs from the simulation, determined once at bind
    /// time.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct InterfaceCapabilities: u32 {
        /// The interface keeps per-instance state in the arena.
        const PER_INSTANCE_DATA = 1 << 0;
        /// The interface wants a hook before each simulate tick.
        const PRE_TICK = 1 << 1;
        /// The interface cannot share a snapshot across a batch; instances
        /// bound to it must run in solo mode.
        const REQUIRES_SOLO = 1 << 2;
    }
}

/// A script's request for an external function binding: the function name
/// and the interface slot it must be resolved against.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExternalFunctionRequest {
    /// Function name as declared by the script.
    pub name: String,
    /// Index into the script's declared data-interface slots.
    pub interface_slot: usize,
}

impl ExternalFunctionRequest {
    pub fn new(name: impl Into<String>, interface_slot: usize) -> Self {
        Self { name: name.into(), interface_slot }
    }
}

/// The external-collaborator contract for data interfaces.
pub trait DataInterface: Send + Sync {
    /// Capability flags; queried once when the function table is rebuilt.
    fn capabilities(&self) -> InterfaceCapabilities;

    /// Bytes of per-instance state this interface needs, if any.
    fn per_instance_data_size(&self) -> usize {
        0
    }

    /// Initialize this interface's slice of a freshly allocated arena.
    fn init_per_instance_data(&self, _data: &mut [u8]) {}

    /// Tear down per-instance state. Called exactly once before the arena
    /// is dropped or rebuilt.
    fn destroy_per_instance_data(&self, _data: &mut [u8]) {}

    /// Per-tick hook, called before the owning instance simulates. Only
    /// invoked when [`InterfaceCapabilities::PRE_TICK`] is set.
    fn per_instance_tick(&self, _data: &mut [u8], _dt: f32) {}

    /// Produce a VM-callable function for a binding request, or `None` if
    /// this interface does not provide the named function.
    fn provide_function(&self, request: &ExternalFunctionRequest) -> Option<Arc<ExternalFnImpl>>;
}

/// Placeholder occupying unbound interface slots. Provides nothing.
pub struct NullInterface;

impl DataInterface for NullInterface {
    fn capabilities(&self) -> InterfaceCapabilities {
        InterfaceCapabilities::empty()
    }

    fn provide_function(&self, _request: &ExternalFunctionRequest) -> Option<Arc<ExternalFnImpl>> {
        None
    }
}

/// Byte arena holding the per-instance data of every interface bound to one
/// system instance, indexed by interface slot.
#[derive(Default)]
pub struct InterfaceArena {
    bytes: Vec<u8>,
    slots: Vec<Option<(usize, usize)>>,
    initialized: bool,
}

impl InterfaceArena {
    /// Allocate and initialize storage for the given interface list.
    pub fn build(interfaces: &[Arc<dyn DataInterface>]) -> Self {
        let mut bytes = Vec::new();
        let mut slots = Vec::with_capacity(interfaces.len());
        for iface in interfaces {
            let size = iface.per_instance_data_size();
            if size == 0 || !iface.capabilities().contains(InterfaceCapabilities::PER_INSTANCE_DATA)
            {
                slots.push(None);
                continue;
            }
            let offset = bytes.len();
            bytes.resize(offset + size, 0);
            slots.push(Some((offset, size)));
        }
        let mut arena = Self { bytes, slots, initialized: true };
        for (slot, iface) in interfaces.iter().enumerate() {
            if let Some(data) = arena.data_mut(slot) {
                iface.init_per_instance_data(data);
            }
        }
        arena
    }

    /// This interface slot's state bytes, if it has any.
    pub fn data_mut(&mut self, slot: usize) -> Option<&mut [u8]> {
        let (offset, size) = self.slots.get(slot).copied().flatten()?;
        Some(&mut self.bytes[offset..offset + size])
    }

    /// Run the pre-tick hook of every interface that asked for one.
    pub fn tick(&mut self, interfaces: &[Arc<dyn DataInterface>], dt: f32) {
        for (slot, iface) in interfaces.iter().enumerate() {
            if iface.capabilities().contains(InterfaceCapabilities::PRE_TICK) {
                let mut empty: [u8; 0] = [];
                let data = self.data_mut(slot).unwrap_or(&mut empty);
                iface.per_instance_tick(data, dt);
            }
        }
    }

    /// Explicitly destroy all per-instance data. Must run before the owning
    /// instance re-initializes; drop without destroy is a leak of interface
    /// resources, not memory.
    pub fn destroy(&mut self, interfaces: &[Arc<dyn DataInterface>]) {
        if !self.initialized {
            return;
        }
        for (slot, iface) in interfaces.iter().enumerate() {
            let mut empty: [u8; 0] = [];
            let data = self.data_mut(slot).unwrap_or(&mut empty);
            iface.destroy_per_instance_data(data);
        }
        self.bytes.clear();
        self.slots.clear();
        self.initialized = false;
    }
}

/// Whether any interface in the list forces solo execution.
pub fn any_requires_solo(interfaces: &[Arc<dyn DataInterface>]) -> bool {
    interfaces
        .iter()
        .any(|i| i.capabilities().contains(InterfaceCapabilities::REQUIRES_SOLO))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counter {
        size: usize,
        destroys: Arc<AtomicUsize>,
    }

    impl DataInterface for Counter {
        fn capabilities(&self) -> InterfaceCapabilities {
            InterfaceCapabilities::PER_INSTANCE_DATA
        }

        fn per_instance_data_size(&self) -> usize {
            self.size
        }

        fn init_per_instance_data(&self, data: &mut [u8]) {
            data.fill(0xAB);
        }

        fn destroy_per_instance_data(&self, _data: &mut [u8]) {
            self.destroys.fetch_add(1, Ordering::Relaxed);
        }

        fn provide_function(&self, _request: &ExternalFunctionRequest) -> Option<Arc<ExternalFnImpl>> {
            None
        }
    }

    #[test]
    fn test_arena_layout_and_destroy() {
        let destroys = Arc::new(AtomicUsize::new(0));
        let interfaces: Vec<Arc<dyn DataInterface>> = vec![
            Arc::new(Counter { size: 8, destroys: destroys.clone() }),
            Arc::new(Counter { size: 4, destroys: destroys.clone() }),
        ];
        let mut arena = InterfaceArena::build(&interfaces);
        assert_eq!(arena.data_mut(0).unwrap().len(), 8);
        assert_eq!(arena.data_mut(1).unwrap().len(), 4);
        assert_eq!(arena.data_mut(0).unwrap()[0], 0xAB);
        assert!(arena.data_mut(2).is_none());

        arena.destroy(&interfaces);
        assert_eq!(destroys.load(Ordering::Relaxed), 2);
        assert!(arena.data_mut(0).is_none());
        // Destroy is idempotent.
        arena.destroy(&interfaces);
        assert_eq!(destroys.load(Ordering::Relaxed), 2);
    }
}
