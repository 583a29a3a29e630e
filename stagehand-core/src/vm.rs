//! # View-model instances
//!
//! A view-model instance is a bag of typed properties reachable by path
//! strings. Instances nest by *handle*: a property holding another instance
//! stores its table key, so path traversal happens wherever the tables live
//! (the server's worker thread) and a deleted referent degrades into a failed
//! lookup rather than a dangling pointer.
//!
//! Instantiation is therefore shallow: nested-instance and asset defaults
//! come back as [`PendingDefault`]s for the owner of the tables to resolve.

use crate::id::Handle;
use crate::scene::{DefaultValue, ViewModelDescriptor};
use crate::value::{PropertyType, PropertyValue};

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum VmError {
    #[error("no property named {0:?}")]
    NoSuchProperty(String),
    #[error("property {name:?} is {found}, expected {expected}")]
    TypeMismatch {
        name: String,
        expected: PropertyType,
        found: PropertyType,
    },
    #[error("property {0:?} is not a list")]
    NotAList(String),
    #[error("index {index} out of range for list of length {len}")]
    IndexOutOfRange { index: usize, len: usize },
}

/// A default the instance couldn't apply by itself because it needs a handle
/// that doesn't exist yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingDefault {
    /// Create an instance of the named view model and store it in `property`.
    Instance { property: String, view_model: String },
    /// Resolve the named global asset into `property`.
    Asset { property: String, name: String },
}

pub struct ViewModelInstance {
    type_name: String,
    properties: hashbrown::HashMap<String, PropertyValue>,
}
impl ViewModelInstance {
    /// Build an instance with its scalar defaults applied. Nested instances
    /// and asset references are returned as pending work.
    #[must_use]
    pub fn instantiate(descriptor: &ViewModelDescriptor) -> (Self, Vec<PendingDefault>) {
        let mut pending = Vec::new();
        let mut properties = hashbrown::HashMap::with_capacity(descriptor.properties.len());
        for property in &descriptor.properties {
            let value = match &property.default {
                DefaultValue::Number(v) => PropertyValue::Number(*v),
                DefaultValue::String(v) => PropertyValue::String(v.clone()),
                DefaultValue::Boolean(v) => PropertyValue::Boolean(*v),
                DefaultValue::Enum(v) => PropertyValue::Enum(v.clone()),
                DefaultValue::Color(v) => PropertyValue::Color(*v),
                DefaultValue::Trigger => PropertyValue::Trigger,
                DefaultValue::Instance(view_model) => {
                    pending.push(PendingDefault::Instance {
                        property: property.name.clone(),
                        view_model: view_model.clone(),
                    });
                    PropertyValue::Instance(None)
                }
                // Lists start empty; elements arrive through list commands.
                DefaultValue::List(_) => PropertyValue::List(Vec::new()),
                DefaultValue::Asset(name) => {
                    pending.push(PendingDefault::Asset {
                        property: property.name.clone(),
                        name: name.clone(),
                    });
                    PropertyValue::Asset(None)
                }
            };
            properties.insert(property.name.clone(), value);
        }
        (
            Self {
                type_name: descriptor.name.clone(),
                properties,
            },
            pending,
        )
    }
    #[must_use]
    pub fn type_name(&self) -> &str {
        &self.type_name
    }
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&PropertyValue> {
        self.properties.get(name)
    }
    /// Overwrite the named property. The stored type is fixed at
    /// instantiation; a mismatched write is rejected without mutating.
    /// "Setting" a trigger is a stateless pulse and always succeeds on a
    /// trigger slot.
    pub fn set(&mut self, name: &str, value: PropertyValue) -> Result<(), VmError> {
        let Some(slot) = self.properties.get_mut(name) else {
            return Err(VmError::NoSuchProperty(name.to_owned()));
        };
        if slot.ty() != value.ty() {
            return Err(VmError::TypeMismatch {
                name: name.to_owned(),
                expected: slot.ty(),
                found: value.ty(),
            });
        }
        // A trigger pulse has nothing to store.
        if !matches!(value, PropertyValue::Trigger) {
            *slot = value;
        }
        Ok(())
    }
    /// Fill a pending nested-instance or asset slot. Used only while resolving
    /// [`PendingDefault`]s.
    pub fn fill_default(&mut self, property: &str, value: PropertyValue) -> Result<(), VmError> {
        self.set(property, value)
    }

    fn list_mut(&mut self, name: &str) -> Result<&mut Vec<Handle<Self>>, VmError> {
        match self.properties.get_mut(name) {
            None => Err(VmError::NoSuchProperty(name.to_owned())),
            Some(PropertyValue::List(items)) => Ok(items),
            Some(_) => Err(VmError::NotAList(name.to_owned())),
        }
    }
    pub fn list_len(&self, name: &str) -> Result<usize, VmError> {
        match self.properties.get(name) {
            None => Err(VmError::NoSuchProperty(name.to_owned())),
            Some(PropertyValue::List(items)) => Ok(items.len()),
            Some(_) => Err(VmError::NotAList(name.to_owned())),
        }
    }
    pub fn list_append(&mut self, name: &str, item: Handle<Self>) -> Result<usize, VmError> {
        let items = self.list_mut(name)?;
        items.push(item);
        Ok(items.len())
    }
    pub fn list_insert(
        &mut self,
        name: &str,
        index: usize,
        item: Handle<Self>,
    ) -> Result<usize, VmError> {
        let items = self.list_mut(name)?;
        if index > items.len() {
            return Err(VmError::IndexOutOfRange {
                index,
                len: items.len(),
            });
        }
        items.insert(index, item);
        Ok(items.len())
    }
    pub fn list_remove(&mut self, name: &str, index: usize) -> Result<Handle<Self>, VmError> {
        let items = self.list_mut(name)?;
        if index >= items.len() {
            return Err(VmError::IndexOutOfRange {
                index,
                len: items.len(),
            });
        }
        Ok(items.remove(index))
    }
    pub fn list_swap(&mut self, name: &str, a: usize, b: usize) -> Result<(), VmError> {
        let items = self.list_mut(name)?;
        let len = items.len();
        let out_of_range = |index| VmError::IndexOutOfRange { index, len };
        if a >= len {
            return Err(out_of_range(a));
        }
        if b >= len {
            return Err(out_of_range(b));
        }
        items.swap(a, b);
        Ok(())
    }
}
