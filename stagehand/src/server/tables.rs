//! Resource tables: per-kind handle → resource maps, private to the worker
//! thread. Lookups return a result rather than an unchecked access, so a stale
//! handle degrades into an error message instead of a fault.

use stagehand_core::id::{Handle, HandleAllocator};

use super::message::{ResourceKind, ServerError};

pub(crate) struct Table<M: std::any::Any, V> {
    kind: ResourceKind,
    entries: hashbrown::HashMap<Handle<M>, V>,
}
impl<M: std::any::Any, V> Table<M, V> {
    pub fn new(kind: ResourceKind) -> Self {
        Self {
            kind,
            entries: hashbrown::HashMap::new(),
        }
    }
    /// Allocate a fresh handle for `value` and store it. Handles are never
    /// reused, so insertion cannot collide.
    pub fn insert(&mut self, allocator: &mut HandleAllocator, value: V) -> Handle<M> {
        let handle = allocator.allocate();
        let prior = self.entries.insert(handle, value);
        debug_assert!(prior.is_none(), "allocator issued a duplicate handle");
        handle
    }
    pub fn get(&self, handle: Handle<M>) -> Result<&V, ServerError> {
        self.entries.get(&handle).ok_or(ServerError::InvalidHandle {
            kind: self.kind,
            handle: handle.raw(),
        })
    }
    pub fn get_mut(&mut self, handle: Handle<M>) -> Result<&mut V, ServerError> {
        self.entries
            .get_mut(&handle)
            .ok_or(ServerError::InvalidHandle {
                kind: self.kind,
                handle: handle.raw(),
            })
    }
    /// Erase the entry, ending the resource's lifetime immediately. Unknown
    /// handles are an error so callers can detect double-frees.
    pub fn remove(&mut self, handle: Handle<M>) -> Result<V, ServerError> {
        self.entries
            .remove(&handle)
            .ok_or(ServerError::InvalidHandle {
                kind: self.kind,
                handle: handle.raw(),
            })
    }
    pub fn len(&self) -> usize {
        self.entries.len()
    }
    pub fn clear(&mut self) {
        self.entries.clear();
    }
    pub fn drain(&mut self) -> impl Iterator<Item = (Handle<M>, V)> + '_ {
        self.entries.drain()
    }
}

#[cfg(test)]
mod test {
    use super::Table;
    use crate::server::message::{ResourceKind, ServerError};
    use stagehand_core::id::HandleAllocator;

    struct Namespace;

    #[test]
    fn lifecycle_and_stale_lookups() {
        let mut allocator = HandleAllocator::new();
        let mut table = Table::<Namespace, &'static str>::new(ResourceKind::File);

        let handle = table.insert(&mut allocator, "hello");
        assert_eq!(table.get(handle), Ok(&"hello"));
        *table.get_mut(handle).unwrap() = "world";
        assert_eq!(table.remove(handle), Ok("world"));

        // Double free is reported, not ignored.
        assert_eq!(
            table.remove(handle),
            Err(ServerError::InvalidHandle {
                kind: ResourceKind::File,
                handle: handle.raw(),
            })
        );
        assert!(table.get(handle).is_err());
        assert_eq!(table.len(), 0);
    }
}
