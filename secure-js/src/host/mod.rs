//! The reflective object model the hardening layer operates on.
//!
//! The hardening operations only depend on two seams:
//! - [`ReflectableObject`], the descriptor-level view of a single object used by the descriptor
//!   guard and the standard-library locker.
//! - [`HostGlobals`], the process-wide environment (global object, calling convention, call
//!   stack, scheduler) injected into the restorer, the observer and the locker.
//!
//! [`Realm`] is a complete in-process implementation of both, with the legacy global object
//! layout (writable, configurable sentinels) that the hardening layer is designed to repair.

mod expr;
pub mod object;
pub mod property;
pub mod realm;
pub mod value;

use crate::error::HostError;
use object::{NativeFn, ObjectRef};
use property::{PropertyDescriptor, PropertyDescriptorPatch};
use std::sync::Arc;
use value::Value;

/// A job scheduled for the next tick of the host's scheduler.
pub type DeferredJob = Box<dyn FnOnce(&dyn HostGlobals) + Send>;

/// Descriptor-level reflection over a single object.
pub trait ReflectableObject {
  /// Names of the members the object owns directly (inherited members are not included).
  fn own_member_names(&self) -> Vec<Arc<str>>;

  /// The current descriptor of an own member.
  fn get_descriptor(&self, name: &str) -> Option<PropertyDescriptor>;

  /// Applies `patch` to an own member. A rejected change is an error, as with
  /// `Object.defineProperty`.
  fn set_descriptor(&self, name: &str, patch: PropertyDescriptorPatch) -> Result<(), HostError>;
}

impl ReflectableObject for ObjectRef {
  fn own_member_names(&self) -> Vec<Arc<str>> {
    self.own_keys()
  }

  fn get_descriptor(&self, name: &str) -> Option<PropertyDescriptor> {
    self.get_own_property(name)
  }

  fn set_descriptor(&self, name: &str, patch: PropertyDescriptorPatch) -> Result<(), HostError> {
    self.define_property_or_throw(name, patch)
  }
}

/// The identity of a call frame, as reported to `dynamic-execution` listeners.
#[derive(Debug, Clone, PartialEq)]
pub struct CallerIdentity {
  pub name: Arc<str>,
  /// The function object running in the frame, when the frame belongs to a function call.
  pub function: Option<ObjectRef>,
}

/// The process-wide environment of a script host.
pub trait HostGlobals {
  /// The global object.
  fn global(&self) -> ObjectRef;

  /// `[[Get]]`: follows the prototype chain and invokes getters.
  fn get(&self, object: &ObjectRef, key: &str) -> Result<Value, HostError>;

  /// `[[Call]]`.
  fn call(&self, callee: &Value, this: Value, args: &[Value]) -> Result<Value, HostError>;

  /// The frame that called the currently running native function, if any.
  fn caller(&self) -> Option<CallerIdentity>;

  /// How many times a single call-site reads the dynamic-execution binding.
  fn dynamic_execution_reads(&self) -> u32 {
    1
  }

  /// Schedules `job` to run on the next tick, after the current synchronous work completes.
  fn defer(&self, job: DeferredJob);

  /// Allocates an ordinary object.
  fn alloc_object(&self) -> ObjectRef;

  /// Allocates a native function object.
  fn alloc_function(&self, name: &str, call: NativeFn) -> ObjectRef;
}
