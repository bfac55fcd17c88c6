use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use std::fmt;

/// A flag of the protection status registry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StatusKey {
  Eval,
  UndefinedValue,
  UndefinedProtection,
  NanValue,
  NanProtection,
  InfinityValue,
  InfinityProtection,
  IsNanValue,
  IsNanProtection,
}

impl StatusKey {
  pub const ALL: [StatusKey; 9] = [
    StatusKey::Eval,
    StatusKey::UndefinedValue,
    StatusKey::UndefinedProtection,
    StatusKey::NanValue,
    StatusKey::NanProtection,
    StatusKey::InfinityValue,
    StatusKey::InfinityProtection,
    StatusKey::IsNanValue,
    StatusKey::IsNanProtection,
  ];

  pub fn as_str(self) -> &'static str {
    match self {
      StatusKey::Eval => "EVAL",
      StatusKey::UndefinedValue => "UNDEFINED_VALUE",
      StatusKey::UndefinedProtection => "UNDEFINED_PROTECTION",
      StatusKey::NanValue => "NAN_VALUE",
      StatusKey::NanProtection => "NAN_PROTECTION",
      StatusKey::InfinityValue => "INFINITY_VALUE",
      StatusKey::InfinityProtection => "INFINITY_PROTECTION",
      StatusKey::IsNanValue => "ISNAN_VALUE",
      StatusKey::IsNanProtection => "ISNAN_PROTECTION",
    }
  }

  fn index(self) -> usize {
    self as usize
  }
}

impl fmt::Display for StatusKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl Serialize for StatusKey {
  fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(self.as_str())
  }
}

/// A global binding restored and locked at load time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum GuardedGlobal {
  Undefined,
  NaN,
  Infinity,
  IsNaN,
}

impl GuardedGlobal {
  /// The sentinel values, in restoration order. `isNaN` is handled separately.
  pub const SENTINELS: [GuardedGlobal; 3] = [
    GuardedGlobal::Undefined,
    GuardedGlobal::NaN,
    GuardedGlobal::Infinity,
  ];

  /// The name of the global binding.
  pub fn binding(self) -> &'static str {
    match self {
      GuardedGlobal::Undefined => "undefined",
      GuardedGlobal::NaN => "NaN",
      GuardedGlobal::Infinity => "Infinity",
      GuardedGlobal::IsNaN => "isNaN",
    }
  }

  pub fn value_key(self) -> StatusKey {
    match self {
      GuardedGlobal::Undefined => StatusKey::UndefinedValue,
      GuardedGlobal::NaN => StatusKey::NanValue,
      GuardedGlobal::Infinity => StatusKey::InfinityValue,
      GuardedGlobal::IsNaN => StatusKey::IsNanValue,
    }
  }

  pub fn protection_key(self) -> StatusKey {
    match self {
      GuardedGlobal::Undefined => StatusKey::UndefinedProtection,
      GuardedGlobal::NaN => StatusKey::NanProtection,
      GuardedGlobal::Infinity => StatusKey::InfinityProtection,
      GuardedGlobal::IsNaN => StatusKey::IsNanProtection,
    }
  }
}

/// Collects flags during the load-time pass. Only the restorer and the observer write to it.
#[derive(Debug, Default)]
pub(crate) struct StatusBuilder {
  flags: [bool; StatusKey::ALL.len()],
}

impl StatusBuilder {
  pub(crate) fn new() -> Self {
    Self::default()
  }

  pub(crate) fn set(&mut self, key: StatusKey, value: bool) {
    self.flags[key.index()] = value;
  }

  pub(crate) fn freeze(self) -> ProtectionStatus {
    ProtectionStatus { flags: self.flags }
  }
}

/// The frozen protection status registry: one boolean per [`StatusKey`].
///
/// There is no way to change a flag once the registry has been built.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProtectionStatus {
  flags: [bool; StatusKey::ALL.len()],
}

impl ProtectionStatus {
  pub fn get(&self, key: StatusKey) -> bool {
    self.flags[key.index()]
  }

  /// Every flag in [`StatusKey::ALL`] order.
  pub fn iter(&self) -> impl Iterator<Item = (StatusKey, bool)> + '_ {
    StatusKey::ALL.iter().map(|&key| (key, self.get(key)))
  }

  /// True iff every flag is set.
  pub fn is_secure(&self) -> bool {
    self.flags.iter().all(|&flag| flag)
  }

  /// The keys whose flag is false.
  pub fn failures(&self) -> Vec<StatusKey> {
    self
      .iter()
      .filter(|(_, flag)| !flag)
      .map(|(key, _)| key)
      .collect()
  }
}

impl Serialize for ProtectionStatus {
  fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    let mut map = serializer.serialize_map(Some(self.flags.len()))?;
    for (key, flag) in self.iter() {
      map.serialize_entry(key.as_str(), &flag)?;
    }
    map.end()
  }
}
