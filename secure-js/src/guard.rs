//! The descriptor guard: clears one descriptor attribute on every selected own member of an
//! object, collecting per-member failures instead of stopping at the first one.

use crate::host::property::{DescriptorAttribute, PropertyDescriptor, PropertyDescriptorPatch};
use crate::host::ReflectableObject;
use crate::problem::{Problem, ProblemKind};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, warn};

/// Overrides for the attributes a guard pass does not target.
///
/// Unset fields leave the member's current attribute unchanged. The field for the attribute being
/// cleared is ignored.
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct GuardConfig {
  pub writable: Option<bool>,
  pub enumerable: Option<bool>,
  pub configurable: Option<bool>,
}

impl GuardConfig {
  pub fn with_enumerable(mut self, enumerable: bool) -> Self {
    self.enumerable = Some(enumerable);
    self
  }

  pub fn with_configurable(mut self, configurable: bool) -> Self {
    self.configurable = Some(configurable);
    self
  }

  pub fn with_writable(mut self, writable: bool) -> Self {
    self.writable = Some(writable);
    self
  }

  fn get(&self, attribute: DescriptorAttribute) -> Option<bool> {
    match attribute {
      DescriptorAttribute::Writable => self.writable,
      DescriptorAttribute::Enumerable => self.enumerable,
      DescriptorAttribute::Configurable => self.configurable,
    }
  }

  /// The patch applied to each selected member when clearing `cleared`.
  pub fn patch_clearing(&self, cleared: DescriptorAttribute) -> PropertyDescriptorPatch {
    let mut patch = PropertyDescriptorPatch::default();
    patch.set_attribute(cleared, false);
    for attribute in DescriptorAttribute::ALL {
      if attribute == cleared {
        continue;
      }
      if let Some(value) = self.get(attribute) {
        patch.set_attribute(attribute, value);
      }
    }
    patch
  }
}

/// Result of a guard pass: the object it ran on and what could not be protected.
#[derive(Debug)]
pub struct GuardOutcome<'o, O: ?Sized> {
  pub object: &'o O,
  pub problems: Arc<[Problem]>,
}

impl<'o, O: ?Sized> GuardOutcome<'o, O> {
  pub fn is_clean(&self) -> bool {
    self.problems.is_empty()
  }
}

/// Clears `cleared` on every own member of `object` for which `selector` holds, applying
/// `overrides` to the other attributes.
///
/// Each member is handled on its own: a member the host refuses to reconfigure becomes a
/// [`ProblemKind::ProtectionFailed`] problem and the pass moves on to the next member.
pub fn guard<'o, O, F>(
  object: &'o O,
  selector: F,
  cleared: DescriptorAttribute,
  overrides: &GuardConfig,
) -> GuardOutcome<'o, O>
where
  O: ReflectableObject + ?Sized,
  F: Fn(&str, &PropertyDescriptor) -> bool,
{
  let patch = overrides.patch_clearing(cleared);
  let mut problems = Vec::new();
  for name in object.own_member_names() {
    let Some(desc) = object.get_descriptor(&name) else {
      continue;
    };
    if !selector(&name, &desc) {
      continue;
    }
    match object.set_descriptor(&name, patch.clone()) {
      Ok(()) => debug!(member = &*name, attribute = cleared.as_str(), "cleared attribute"),
      Err(err) => {
        warn!(member = &*name, attribute = cleared.as_str(), %err, "unable to protect member");
        problems.push(Problem::new(&*name, ProblemKind::ProtectionFailed).with_detail(err.to_string()));
      }
    }
  }
  GuardOutcome {
    object,
    problems: problems.into(),
  }
}

/// Makes every own method (callable data member) of `object` non-writable.
pub fn secure_methods<'o, O>(object: &'o O, config: &GuardConfig) -> GuardOutcome<'o, O>
where
  O: ReflectableObject + ?Sized,
{
  guard(
    object,
    |_, desc| desc.value().is_some_and(|v| v.is_callable()),
    DescriptorAttribute::Writable,
    config,
  )
}

/// Hides every own member whose name starts with `_` from enumeration.
pub fn secure_privates<'o, O>(object: &'o O, config: &GuardConfig) -> GuardOutcome<'o, O>
where
  O: ReflectableObject + ?Sized,
{
  guard(
    object,
    |name, _| is_private_name(name),
    DescriptorAttribute::Enumerable,
    config,
  )
}

/// Naming convention for private-by-convention members (`_x`, `__x`).
pub fn is_private_name(name: &str) -> bool {
  name.starts_with('_')
}
