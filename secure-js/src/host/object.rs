use crate::error::HostError;
use crate::host::property::{PropertyDescriptor, PropertyDescriptorPatch, PropertyKind};
use crate::host::value::Value;
use crate::host::HostGlobals;
use ahash::AHashMap;
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;

/// A native `[[Call]]` entrypoint implemented in Rust.
///
/// Receives the host it runs in, the `this` value and the arguments.
pub type NativeFn =
  Arc<dyn Fn(&dyn HostGlobals, Value, &[Value]) -> Result<Value, HostError> + Send + Sync>;

/// Wraps a closure as a [`NativeFn`].
pub fn native_fn(
  f: impl Fn(&dyn HostGlobals, Value, &[Value]) -> Result<Value, HostError> + Send + Sync + 'static,
) -> NativeFn {
  Arc::new(f)
}

struct ObjectData {
  name: Option<Arc<str>>,
  prototype: Option<ObjectRef>,
  extensible: bool,
  properties: AHashMap<Arc<str>, PropertyDescriptor>,
  // Insertion order of `properties`.
  order: Vec<Arc<str>>,
  call: Option<NativeFn>,
}

/// A shared handle to an object.
///
/// Handles compare by identity. Every operation takes the object's lock only for the duration of
/// the operation itself, so native functions and getters never run while a lock is held.
#[derive(Clone)]
pub struct ObjectRef(Arc<RwLock<ObjectData>>);

impl PartialEq for ObjectRef {
  fn eq(&self, other: &Self) -> bool {
    Arc::ptr_eq(&self.0, &other.0)
  }
}

impl fmt::Debug for ObjectRef {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let data = self.0.read();
    f.debug_struct("ObjectRef")
      .field("ptr", &Arc::as_ptr(&self.0))
      .field("name", &data.name)
      .field("callable", &data.call.is_some())
      .field("properties", &data.order.len())
      .finish()
  }
}

impl ObjectRef {
  /// Allocates an ordinary, extensible object.
  pub fn new(prototype: Option<ObjectRef>) -> Self {
    Self::with_data(ObjectData {
      name: None,
      prototype,
      extensible: true,
      properties: AHashMap::new(),
      order: Vec::new(),
      call: None,
    })
  }

  /// Allocates a function object backed by `call`.
  pub fn new_function(name: &str, prototype: Option<ObjectRef>, call: NativeFn) -> Self {
    Self::with_data(ObjectData {
      name: Some(name.into()),
      prototype,
      extensible: true,
      properties: AHashMap::new(),
      order: Vec::new(),
      call: Some(call),
    })
  }

  fn with_data(data: ObjectData) -> Self {
    ObjectRef(Arc::new(RwLock::new(data)))
  }

  pub fn name(&self) -> Option<Arc<str>> {
    self.0.read().name.clone()
  }

  pub fn is_callable(&self) -> bool {
    self.0.read().call.is_some()
  }

  /// The `[[Call]]` entrypoint of a function object.
  pub fn native_call(&self) -> Option<NativeFn> {
    self.0.read().call.clone()
  }

  pub fn prototype(&self) -> Option<ObjectRef> {
    self.0.read().prototype.clone()
  }

  pub fn is_extensible(&self) -> bool {
    self.0.read().extensible
  }

  pub fn prevent_extensions(&self) {
    self.0.write().extensible = false;
  }

  /// `[[GetOwnProperty]]`.
  pub fn get_own_property(&self, key: &str) -> Option<PropertyDescriptor> {
    self.0.read().properties.get(key).cloned()
  }

  pub fn has_own_property(&self, key: &str) -> bool {
    self.0.read().properties.contains_key(key)
  }

  /// `[[OwnPropertyKeys]]`: array-index keys in ascending order, then other keys in insertion
  /// order.
  pub fn own_keys(&self) -> Vec<Arc<str>> {
    let data = self.0.read();
    let mut index_keys: Vec<(u32, Arc<str>)> = Vec::new();
    let mut string_keys: Vec<Arc<str>> = Vec::new();
    for key in &data.order {
      match array_index(key) {
        Some(idx) => index_keys.push((idx, key.clone())),
        None => string_keys.push(key.clone()),
      }
    }
    index_keys.sort_by_key(|(idx, _)| *idx);

    let mut out = Vec::with_capacity(index_keys.len() + string_keys.len());
    out.extend(index_keys.into_iter().map(|(_, k)| k));
    out.extend(string_keys);
    out
  }

  /// Own keys whose property is enumerable, in [`ObjectRef::own_keys`] order.
  pub fn own_enumerable_keys(&self) -> Vec<Arc<str>> {
    self
      .own_keys()
      .into_iter()
      .filter(|key| self.get_own_property(key).is_some_and(|desc| desc.enumerable))
      .collect()
  }

  /// Unconditionally installs `desc` under `key`, bypassing descriptor validation.
  ///
  /// Intended for realm construction; script-visible changes go through
  /// [`ObjectRef::define_own_property`].
  pub fn define_property(&self, key: &str, desc: PropertyDescriptor) {
    let mut data = self.0.write();
    if data.properties.insert(key.into(), desc).is_none() {
      data.order.push(key.into());
    }
  }

  /// `[[DefineOwnProperty]]` (ValidateAndApplyPropertyDescriptor).
  ///
  /// Returns `Ok(false)` when the change is rejected by the object's invariants.
  pub fn define_own_property(
    &self,
    key: &str,
    desc: PropertyDescriptorPatch,
  ) -> Result<bool, HostError> {
    desc.validate()?;
    let current = self.get_own_property(key);
    let extensible = self.is_extensible();

    let Some(new_desc) = validate_property_descriptor(extensible, &desc, current)? else {
      return Ok(false);
    };
    self.define_property(key, new_desc);
    Ok(true)
  }

  /// `DefinePropertyOrThrow`: like [`ObjectRef::define_own_property`] but a rejection is a
  /// `TypeError`, as with `Object.defineProperty`.
  pub fn define_property_or_throw(
    &self,
    key: &str,
    desc: PropertyDescriptorPatch,
  ) -> Result<(), HostError> {
    if self.define_own_property(key, desc)? {
      return Ok(());
    }
    if !self.has_own_property(key) {
      return Err(HostError::TypeError(format!(
        "Cannot define property {key}, object is not extensible"
      )));
    }
    Err(HostError::TypeError(format!(
      "Cannot redefine property: {key}"
    )))
  }

  /// `[[Delete]]`. Non-configurable properties are kept and `false` is returned.
  pub fn delete(&self, key: &str) -> bool {
    let mut data = self.0.write();
    let Some(current) = data.properties.get(key) else {
      return true;
    };
    if !current.configurable {
      return false;
    }
    data.properties.remove(key);
    data.order.retain(|k| &**k != key);
    true
  }

  /// `Object.freeze`: every own property becomes non-configurable (and non-writable for data
  /// properties), then the object becomes non-extensible.
  pub fn freeze(&self) {
    let mut data = self.0.write();
    for desc in data.properties.values_mut() {
      desc.configurable = false;
      if let PropertyKind::Data { writable, .. } = &mut desc.kind {
        *writable = false;
      }
    }
    data.extensible = false;
  }

  /// `Object.isFrozen`.
  pub fn is_frozen(&self) -> bool {
    let data = self.0.read();
    !data.extensible
      && data
        .properties
        .values()
        .all(|desc| !desc.configurable && desc.writable() != Some(true))
  }
}

/// Decides the outcome of a define request. `Ok(None)` means the request is rejected.
fn validate_property_descriptor(
  extensible: bool,
  desc: &PropertyDescriptorPatch,
  current: Option<PropertyDescriptor>,
) -> Result<Option<PropertyDescriptor>, HostError> {
  let Some(current) = current else {
    if !extensible {
      return Ok(None);
    }

    // Create new property with default attributes for missing fields.
    let enumerable = desc.enumerable.unwrap_or(false);
    let configurable = desc.configurable.unwrap_or(false);
    let kind = if desc.is_accessor_descriptor() {
      PropertyKind::Accessor {
        get: desc.get.clone().unwrap_or(Value::Undefined),
        set: desc.set.clone().unwrap_or(Value::Undefined),
      }
    } else {
      // Generic descriptors create data properties.
      PropertyKind::Data {
        value: desc.value.clone().unwrap_or(Value::Undefined),
        writable: desc.writable.unwrap_or(false),
      }
    };
    return Ok(Some(PropertyDescriptor {
      enumerable,
      configurable,
      kind,
    }));
  };

  // If `Desc` has no fields, no change is requested.
  if desc.is_empty() {
    return Ok(Some(current));
  }

  // Non-configurable invariants.
  if !current.configurable {
    if desc.configurable == Some(true) {
      return Ok(None);
    }
    if desc.enumerable.is_some_and(|e| e != current.enumerable) {
      return Ok(None);
    }
    if !desc.is_generic_descriptor()
      && desc.is_accessor_descriptor() != current.is_accessor_descriptor()
    {
      return Ok(None);
    }
    match &current.kind {
      PropertyKind::Data { value, writable } if desc.is_data_descriptor() => {
        if !writable {
          if desc.writable == Some(true) {
            return Ok(None);
          }
          if desc.value.as_ref().is_some_and(|v| !v.same_value(value)) {
            return Ok(None);
          }
        }
      }
      PropertyKind::Accessor { get, set } if desc.is_accessor_descriptor() => {
        if desc.get.as_ref().is_some_and(|g| !g.same_value(get)) {
          return Ok(None);
        }
        if desc.set.as_ref().is_some_and(|s| !s.same_value(set)) {
          return Ok(None);
        }
      }
      _ => {}
    }
  }

  Ok(Some(apply_descriptor_patch(current, desc)))
}

fn apply_descriptor_patch(
  current: PropertyDescriptor,
  desc: &PropertyDescriptorPatch,
) -> PropertyDescriptor {
  let enumerable = desc.enumerable.unwrap_or(current.enumerable);
  let configurable = desc.configurable.unwrap_or(current.configurable);

  if desc.is_generic_descriptor() {
    return PropertyDescriptor {
      enumerable,
      configurable,
      kind: current.kind,
    };
  }

  let kind = match (current.kind, desc.is_accessor_descriptor()) {
    (PropertyKind::Data { value, writable }, false) => PropertyKind::Data {
      value: desc.value.clone().unwrap_or(value),
      writable: desc.writable.unwrap_or(writable),
    },
    (PropertyKind::Accessor { get, set }, true) => PropertyKind::Accessor {
      get: desc.get.clone().unwrap_or(get),
      set: desc.set.clone().unwrap_or(set),
    },
    // Kind conversions start from default field values.
    (PropertyKind::Data { .. }, true) => PropertyKind::Accessor {
      get: desc.get.clone().unwrap_or(Value::Undefined),
      set: desc.set.clone().unwrap_or(Value::Undefined),
    },
    (PropertyKind::Accessor { .. }, false) => PropertyKind::Data {
      value: desc.value.clone().unwrap_or(Value::Undefined),
      writable: desc.writable.unwrap_or(false),
    },
  };
  PropertyDescriptor {
    enumerable,
    configurable,
    kind,
  }
}

/// Parses `key` as an array index (`ToString(ToUint32(P)) === P`, excluding 2^32-1).
fn array_index(key: &str) -> Option<u32> {
  if key.is_empty() || (key.len() > 1 && key.starts_with('0')) {
    return None;
  }
  if !key.bytes().all(|b| b.is_ascii_digit()) {
    return None;
  }
  let value: u64 = key.parse().ok()?;
  if value >= u32::MAX as u64 {
    return None;
  }
  Some(value as u32)
}
