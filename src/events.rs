//! Event data-set addressing and storage.
//!
//! Events travel between emitters through named data sets. A generator
//! emitter's spawn/update script appends event rows; any number of receiver
//! emitters' handlers read them the following generation. Sets are addressed
//! by the three-part key (owning system instance, source emitter, event
//! name), the de facto wire format between generator and receivers.

use std::collections::HashMap;

use crate::attribute::Variable;
use crate::data_set::DataSet;
use crate::system::SystemInstanceId;

/// Three-part address of an event data set.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct EventSetKey {
    /// The owning system instance.
    pub instance: SystemInstanceId,
    /// Name of the emitter that generates the events.
    pub emitter: String,
    /// Event name as declared by the generator.
    pub event: String,
}

impl EventSetKey {
    pub fn new(
        instance: SystemInstanceId,
        emitter: impl Into<String>,
        event: impl Into<String>,
    ) -> Self {
        Self { instance, emitter: emitter.into(), event: event.into() }
    }
}

/// Registry of event data sets for one system instance.
///
/// Sets are owned here rather than by their generator emitter so receivers
/// can reach them without back-references; emitters hold plain indices.
#[derive(Default)]
pub struct EventSetStore {
    sets: Vec<DataSet>,
    index: HashMap<EventSetKey, usize>,
}

impl EventSetStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create (or reset) the event set for a key and declare its layout.
    /// Returns the set's index for direct access.
    pub fn create(&mut self, key: EventSetKey, variables: &[Variable]) -> usize {
        if let Some(&idx) = self.index.get(&key) {
            self.sets[idx].reset_buffers();
            return idx;
        }
        let mut set = DataSet::new();
        set.add_variables(variables.iter().cloned());
        set.finalize();
        let idx = self.sets.len();
        self.sets.push(set);
        self.index.insert(key, idx);
        idx
    }

    /// Index of the set for a key, if registered.
    pub fn index_of(&self, key: &EventSetKey) -> Option<usize> {
        self.index.get(key).copied()
    }

    /// Shared access by index.
    pub fn get(&self, idx: usize) -> Option<&DataSet> {
        self.sets.get(idx)
    }

    /// Mutable access by index.
    pub fn get_mut(&mut self, idx: usize) -> Option<&mut DataSet> {
        self.sets.get_mut(idx)
    }

    /// Mutable access to several distinct sets at once, in the order asked
    /// for. Returns `None` if any index is out of range or repeated.
    pub fn disjoint_mut(&mut self, indices: &[usize]) -> Option<Vec<&mut DataSet>> {
        let mut cells: Vec<Option<&mut DataSet>> = self.sets.iter_mut().map(Some).collect();
        indices
            .iter()
            .map(|&i| cells.get_mut(i).and_then(Option::take))
            .collect()
    }

    /// Clear all sets' live counts (both generations).
    pub fn reset_all(&mut self) {
        for set in &mut self.sets {
            set.reset_buffers();
        }
    }

    /// Number of registered sets.
    pub fn len(&self) -> usize {
        self.sets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(event: &str) -> EventSetKey {
        EventSetKey::new(SystemInstanceId(1), "sparks", event)
    }

    #[test]
    fn test_create_and_lookup() {
        let mut store = EventSetStore::new();
        let idx = store.create(key("collision"), &[Variable::vec3("position")]);
        assert_eq!(store.index_of(&key("collision")), Some(idx));
        assert_eq!(store.index_of(&key("death")), None);
        assert!(store.get(idx).unwrap().layout().has_variable(&Variable::vec3("position")));
    }

    #[test]
    fn test_recreate_resets_counts() {
        let mut store = EventSetStore::new();
        let idx = store.create(key("collision"), &[Variable::float("impulse")]);
        {
            let set = store.get_mut(idx).unwrap();
            set.allocate(4);
            set.set_num_instances(4);
        }
        let again = store.create(key("collision"), &[Variable::float("impulse")]);
        assert_eq!(again, idx);
        assert_eq!(store.get(idx).unwrap().num_instances(), 0);
    }

    #[test]
    fn test_disjoint_mut_rejects_duplicates() {
        let mut store = EventSetStore::new();
        let a = store.create(key("a"), &[Variable::float("x")]);
        let b = store.create(key("b"), &[Variable::float("x")]);
        assert!(store.disjoint_mut(&[a, b]).is_some());
        assert!(store.disjoint_mut(&[a, a]).is_none());
        assert!(store.disjoint_mut(&[a, 99]).is_none());
    }

    #[test]
    fn test_keys_distinguish_instances() {
        let mut store = EventSetStore::new();
        let a = store.create(
            EventSetKey::new(SystemInstanceId(1), "e", "hit"),
            &[Variable::float("x")],
        );
        let b = store.create(
            EventSetKey::new(SystemInstanceId(2), "e", "hit"),
            &[Variable::float("x")],
        );
        assert_ne!(a, b);
    }
}
