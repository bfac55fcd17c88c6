use crate::error::HostError;
use crate::host::value::Value;
use std::fmt;

/// A concrete property descriptor.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyDescriptor {
  pub enumerable: bool,
  pub configurable: bool,
  pub kind: PropertyKind,
}

/// The kind of property described by a [`PropertyDescriptor`].
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyKind {
  Data { value: Value, writable: bool },
  Accessor { get: Value, set: Value },
}

impl PropertyDescriptor {
  /// A data property with the given attributes.
  pub fn data(value: Value, writable: bool, enumerable: bool, configurable: bool) -> Self {
    Self {
      enumerable,
      configurable,
      kind: PropertyKind::Data { value, writable },
    }
  }

  pub fn is_data_descriptor(&self) -> bool {
    matches!(self.kind, PropertyKind::Data { .. })
  }

  pub fn is_accessor_descriptor(&self) -> bool {
    matches!(self.kind, PropertyKind::Accessor { .. })
  }

  /// The stored value of a data property.
  pub fn value(&self) -> Option<&Value> {
    match &self.kind {
      PropertyKind::Data { value, .. } => Some(value),
      PropertyKind::Accessor { .. } => None,
    }
  }

  /// `Some(writable)` for data properties, `None` for accessors (which have no `writable` field).
  pub fn writable(&self) -> Option<bool> {
    match self.kind {
      PropertyKind::Data { writable, .. } => Some(writable),
      PropertyKind::Accessor { .. } => None,
    }
  }

  /// Whether the member can no longer be reassigned or reconfigured: a data property that is
  /// both non-writable and non-configurable.
  pub fn is_locked(&self) -> bool {
    self.writable() == Some(false) && !self.configurable
  }
}

/// A "partial" property descriptor patch used by `DefineProperty`-style operations.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct PropertyDescriptorPatch {
  pub enumerable: Option<bool>,
  pub configurable: Option<bool>,
  pub value: Option<Value>,
  pub writable: Option<bool>,
  pub get: Option<Value>,
  pub set: Option<Value>,
}

impl PropertyDescriptorPatch {
  /// A patch that sets every attribute of a data property to its most restrictive value.
  pub fn frozen_value(value: Value) -> Self {
    Self {
      value: Some(value),
      writable: Some(false),
      enumerable: Some(false),
      configurable: Some(false),
      ..Default::default()
    }
  }

  /// Validates that this patch does not mix data and accessor descriptor fields.
  pub fn validate(&self) -> Result<(), HostError> {
    let has_data = self.value.is_some() || self.writable.is_some();
    let has_accessor = self.get.is_some() || self.set.is_some();
    if has_data && has_accessor {
      return Err(HostError::TypeError(
        "invalid property descriptor: cannot both specify accessors and a value or writable attribute"
          .to_string(),
      ));
    }
    Ok(())
  }

  pub fn is_empty(&self) -> bool {
    self.enumerable.is_none()
      && self.configurable.is_none()
      && self.value.is_none()
      && self.writable.is_none()
      && self.get.is_none()
      && self.set.is_none()
  }

  pub fn is_accessor_descriptor(&self) -> bool {
    self.get.is_some() || self.set.is_some()
  }

  pub fn is_data_descriptor(&self) -> bool {
    self.value.is_some() || self.writable.is_some()
  }

  pub fn is_generic_descriptor(&self) -> bool {
    !self.is_accessor_descriptor() && !self.is_data_descriptor()
  }

  pub fn set_attribute(&mut self, attribute: DescriptorAttribute, value: bool) {
    match attribute {
      DescriptorAttribute::Writable => self.writable = Some(value),
      DescriptorAttribute::Enumerable => self.enumerable = Some(value),
      DescriptorAttribute::Configurable => self.configurable = Some(value),
    }
  }
}

/// One of the three boolean descriptor attributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DescriptorAttribute {
  Writable,
  Enumerable,
  Configurable,
}

impl DescriptorAttribute {
  pub const ALL: [DescriptorAttribute; 3] = [
    DescriptorAttribute::Writable,
    DescriptorAttribute::Enumerable,
    DescriptorAttribute::Configurable,
  ];

  pub fn as_str(self) -> &'static str {
    match self {
      DescriptorAttribute::Writable => "writable",
      DescriptorAttribute::Enumerable => "enumerable",
      DescriptorAttribute::Configurable => "configurable",
    }
  }
}

impl fmt::Display for DescriptorAttribute {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}
