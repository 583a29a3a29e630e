//! Property subscription registry.
//!
//! Tracks the (instance, path, type) triples callers want change events for.
//! Subscribing twice to the same triple has the effect of one subscription.

use stagehand_core::value::PropertyType;

use super::InstanceHandle;

pub(crate) struct SubscriptionRegistry {
    // Per-instance lists stay tiny, so membership is a linear scan - avoids
    // allocating a lookup key on the hot mutation path.
    by_instance: hashbrown::HashMap<InstanceHandle, Vec<(String, PropertyType)>>,
}
impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self {
            by_instance: hashbrown::HashMap::new(),
        }
    }
    /// Returns `false` when the triple was already subscribed.
    pub fn subscribe(&mut self, instance: InstanceHandle, path: &str, ty: PropertyType) -> bool {
        let entries = self.by_instance.entry(instance).or_default();
        if entries.iter().any(|(p, t)| p == path && *t == ty) {
            return false;
        }
        entries.push((path.to_owned(), ty));
        true
    }
    /// Returns `false` when no such subscription existed.
    pub fn unsubscribe(&mut self, instance: InstanceHandle, path: &str, ty: PropertyType) -> bool {
        let Some(entries) = self.by_instance.get_mut(&instance) else {
            return false;
        };
        let before = entries.len();
        entries.retain(|(p, t)| !(p == path && *t == ty));
        let removed = entries.len() != before;
        if entries.is_empty() {
            self.by_instance.remove(&instance);
        }
        removed
    }
    pub fn matches(&self, instance: InstanceHandle, path: &str, ty: PropertyType) -> bool {
        self.by_instance
            .get(&instance)
            .is_some_and(|entries| entries.iter().any(|(p, t)| p == path && *t == ty))
    }
    /// Drop every subscription on a deleted instance.
    pub fn remove_instance(&mut self, instance: InstanceHandle) {
        self.by_instance.remove(&instance);
    }
    pub fn clear(&mut self) {
        self.by_instance.clear();
    }
}
