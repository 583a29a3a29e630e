//! # Handles
//! Every resource created by the command server is identified by a `Handle<T>`:
//! an opaque, strictly positive 64-bit value namespaced by the resource type it
//! indexes. Zero is reserved as the "invalid/none" sentinel at the foreign
//! boundary, so the inner value is a `NonZeroU64`.
//!
//! Handles are issued by a [`HandleAllocator`] owned by the worker thread and
//! passed explicitly wherever allocation happens; there is no global ID state.
//! Values increase monotonically and the counter is shared across every
//! resource kind, so any two handles issued within one run differ even when
//! they index different tables. A handle is never reused after its resource is
//! deleted.

/// Identifier for one resource instance within one server's lifetime.
/// Handles with different namespaces may never compare equal, checked at
/// compile time by the marker parameter.
pub struct Handle<T: std::any::Any> {
    id: std::num::NonZeroU64,
    // Namespace marker
    _phantom: std::marker::PhantomData<T>,
}
impl<T: std::any::Any> Clone for Handle<T> {
    fn clone(&self) -> Self {
        *self
    }
}
impl<T: std::any::Any> Copy for Handle<T> {}
impl<T: std::any::Any> std::cmp::PartialEq<Handle<T>> for Handle<T> {
    fn eq(&self, other: &Handle<T>) -> bool {
        // Namespace already checked at compile time - Self::T == Other::T of course!
        self.id == other.id
    }
}
impl<T: std::any::Any> std::cmp::Eq for Handle<T> {}
impl<T: std::any::Any> std::cmp::PartialOrd for Handle<T> {
    fn partial_cmp(&self, other: &Handle<T>) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl<T: std::any::Any> std::cmp::Ord for Handle<T> {
    fn cmp(&self, other: &Handle<T>) -> std::cmp::Ordering {
        self.id.cmp(&other.id)
    }
}

// Safety - it's literally just a u64 lol
// We need these because if T is !Send or !Sync that is carried
// over to the handle, even though we don't actually store a T and thus
// shouldn't be bound by this.
unsafe impl<T: std::any::Any> Send for Handle<T> {}
unsafe impl<T: std::any::Any> Sync for Handle<T> {}

impl<T: std::any::Any> std::hash::Hash for Handle<T> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl<T: std::any::Any> Handle<T> {
    /// Get the raw numeric value of this handle, for the foreign boundary.
    /// Handles from differing namespaces may share the same numeric value only
    /// if they come from different allocators.
    #[must_use]
    pub fn raw(&self) -> u64 {
        self.id.get()
    }
    /// Reconstruct a handle from a raw value received over the foreign
    /// boundary. Zero is the "none" sentinel and yields `None`. The value is
    /// *not* checked for liveness, table lookups do that.
    #[must_use]
    pub fn from_raw(raw: u64) -> Option<Self> {
        Some(Self {
            id: std::num::NonZeroU64::new(raw)?,
            _phantom: std::marker::PhantomData,
        })
    }
}

impl<T: std::any::Any> std::fmt::Display for Handle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        //Unwrap here is safe - the rsplit will always return at least one element, even for empty strings.
        write!(
            f,
            "{}#{}",
            std::any::type_name::<T>().rsplit("::").next().unwrap(),
            self.id
        )
    }
}
impl<T: std::any::Any> std::fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        <Handle<T> as std::fmt::Display>::fmt(self, f)
    }
}

/// Issues handles for every resource kind from one monotonic counter.
///
/// Owned by the worker thread and passed by `&mut` into whichever handler
/// needs to create a resource. Because there is exactly one allocator per
/// server, handle uniqueness holds across kinds without any synchronization.
pub struct HandleAllocator {
    next: u64,
}
impl HandleAllocator {
    #[must_use]
    pub fn new() -> Self {
        // Zero is reserved for "invalid/none", start at one and go up.
        Self { next: 1 }
    }
    /// Issue a fresh handle in the given namespace.
    pub fn allocate<T: std::any::Any>(&mut self) -> Handle<T> {
        let id = self.next;
        let Some(next) = self.next.checked_add(1) else {
            // A server would have to process 2^64 creations to get here. If it
            // somehow does, continuing would hand out duplicate handles and
            // silently corrupt every table.
            #[cfg(not(test))]
            {
                log::error!("handle space exhausted! Aborting!");
                log::logger().flush();
                std::process::abort();
            }
            #[cfg(test)]
            {
                panic!("handle space exhausted")
            }
        };
        self.next = next;
        Handle {
            // Non-zero-ness holds - `next` starts at one and only increments.
            id: std::num::NonZeroU64::new(id).unwrap(),
            _phantom: std::marker::PhantomData,
        }
    }
}
impl Default for HandleAllocator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod test {
    use super::{Handle, HandleAllocator};

    struct NamespaceA;
    struct NamespaceB;

    #[test]
    fn nonzero_and_unique_across_kinds() {
        let mut alloc = HandleAllocator::new();
        let mut raws = Vec::new();
        for _ in 0..512 {
            raws.push(alloc.allocate::<NamespaceA>().raw());
            raws.push(alloc.allocate::<NamespaceB>().raw());
        }
        assert!(raws.iter().all(|&raw| raw != 0));

        let length_before = raws.len();
        raws.sort_unstable();
        raws.dedup();
        assert_eq!(length_before, raws.len(), "had duplicate handles");
    }
    #[test]
    fn raw_round_trip() {
        let mut alloc = HandleAllocator::new();
        let handle = alloc.allocate::<NamespaceA>();
        let same = Handle::<NamespaceA>::from_raw(handle.raw()).unwrap();
        assert_eq!(handle, same);
        assert_eq!(Handle::<NamespaceA>::from_raw(0), None);
    }
    #[test]
    #[should_panic(expected = "handle space exhausted")]
    fn exhaustion() {
        let mut alloc = HandleAllocator { next: u64::MAX };
        // Last valid handle.
        let _ = alloc.allocate::<NamespaceA>();
        // Should panic!
        let _ = alloc.allocate::<NamespaceA>();
    }
}
