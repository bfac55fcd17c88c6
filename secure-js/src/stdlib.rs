//! The standard-library locker.
//!
//! [`PROTOTYPE_METHODS`] and [`STATIC_METHODS`] name the members that get locked. Every member is
//! classified on its own; nothing a single member does can stop the pass.

use crate::error::SecureError;
use crate::host::object::ObjectRef;
use crate::host::property::PropertyDescriptorPatch;
use crate::host::value::Value;
use crate::host::{HostGlobals, ReflectableObject};
use crate::problem::{Problem, ProblemKind};
use once_cell::sync::Lazy;
use std::fmt;
use tracing::{debug, debug_span, warn};

/// Methods shared by instances, installed on `<Name>.prototype`.
pub const PROTOTYPE_METHODS: &[(&str, &[&str])] = &[
  ("Object", &[
    "hasOwnProperty",
    "isPrototypeOf",
    "propertyIsEnumerable",
    "toLocaleString",
    "toString",
    "valueOf",
  ]),
  ("Array", &[
    "concat",
    "every",
    "filter",
    "forEach",
    "indexOf",
    "join",
    "lastIndexOf",
    "map",
    "pop",
    "push",
    "reduce",
    "reduceRight",
    "reverse",
    "shift",
    "slice",
    "some",
    "sort",
    "splice",
    "toString",
    "unshift",
  ]),
  ("String", &[
    "charAt",
    "charCodeAt",
    "concat",
    "indexOf",
    "lastIndexOf",
    "localeCompare",
    "match",
    "replace",
    "search",
    "slice",
    "split",
    "substring",
    "toLowerCase",
    "toString",
    "toUpperCase",
    "trim",
    "valueOf",
  ]),
  ("Number", &["toExponential", "toFixed", "toPrecision", "toString", "valueOf"]),
  ("Boolean", &["toString", "valueOf"]),
  ("Date", &[
    "getDate",
    "getDay",
    "getFullYear",
    "getHours",
    "getMilliseconds",
    "getMinutes",
    "getMonth",
    "getSeconds",
    "getTime",
    "getTimezoneOffset",
    "setDate",
    "setFullYear",
    "setHours",
    "setMilliseconds",
    "setMinutes",
    "setMonth",
    "setSeconds",
    "setTime",
    "toDateString",
    "toISOString",
    "toJSON",
    "toString",
    "toUTCString",
    "valueOf",
  ]),
  ("Function", &["apply", "bind", "call", "toString"]),
  ("RegExp", &["exec", "test", "toString"]),
  ("Error", &["toString"]),
];

/// Methods of the standard objects themselves.
pub const STATIC_METHODS: &[(&str, &[&str])] = &[
  ("Object", &[
    "create",
    "defineProperties",
    "defineProperty",
    "freeze",
    "getOwnPropertyDescriptor",
    "getOwnPropertyNames",
    "getPrototypeOf",
    "isExtensible",
    "isFrozen",
    "isSealed",
    "keys",
    "preventExtensions",
    "seal",
  ]),
  ("Array", &["isArray"]),
  ("String", &["fromCharCode"]),
  ("Date", &["now", "parse", "UTC"]),
  ("JSON", &["parse", "stringify"]),
  ("Math", &[
    "abs", "acos", "asin", "atan", "atan2", "ceil", "cos", "exp", "floor", "log", "max", "min",
    "pow", "random", "round", "sin", "sqrt", "tan",
  ]),
];

/// One standard object and the members the locker covers.
#[derive(Clone, Copy, Debug)]
pub struct StandardObject {
  pub name: &'static str,
  /// Whether the object is a constructor with a `prototype` (false for namespaces like `Math`).
  pub is_constructor: bool,
  pub prototype_methods: &'static [&'static str],
  pub static_methods: &'static [&'static str],
}

/// [`PROTOTYPE_METHODS`] and [`STATIC_METHODS`] merged per object, in table order.
#[derive(Debug)]
pub struct StandardLibraryTable {
  objects: Vec<StandardObject>,
}

impl StandardLibraryTable {
  fn build() -> Self {
    let mut objects: Vec<StandardObject> = PROTOTYPE_METHODS
      .iter()
      .map(|&(name, prototype_methods)| StandardObject {
        name,
        is_constructor: true,
        prototype_methods,
        static_methods: &[],
      })
      .collect();
    for &(name, static_methods) in STATIC_METHODS {
      match objects.iter_mut().find(|o| o.name == name) {
        Some(object) => object.static_methods = static_methods,
        None => objects.push(StandardObject {
          name,
          is_constructor: false,
          prototype_methods: &[],
          static_methods,
        }),
      }
    }
    Self { objects }
  }

  pub fn objects(&self) -> impl Iterator<Item = &StandardObject> + '_ {
    self.objects.iter()
  }

  pub fn get(&self, name: &str) -> Option<&StandardObject> {
    self.objects.iter().find(|o| o.name == name)
  }

  /// Total number of members covered by a lock pass.
  pub fn member_count(&self) -> usize {
    self
      .objects
      .iter()
      .map(|o| o.prototype_methods.len() + o.static_methods.len())
      .sum()
  }
}

pub static STANDARD_LIBRARY: Lazy<StandardLibraryTable> = Lazy::new(StandardLibraryTable::build);

/// Whether [`crate::Secure::lock_standard_library`] has already run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LockState {
  #[default]
  Armed,
  Fired,
}

/// Where the problems of a lock pass are delivered.
#[derive(Default)]
pub enum ProblemHandler<'a> {
  /// Publish an `insecure` notification.
  #[default]
  Emit,
  /// Fail with [`crate::SecurityError`].
  Fail,
  /// Hand the problems to a Rust callback.
  Callback(Box<dyn FnOnce(&[Problem]) + 'a>),
  /// Call a script function with an array of `{key, reason, message}` objects.
  Script(Value),
}

impl<'a> ProblemHandler<'a> {
  /// Interprets the script-level `handler` argument of `lockStandardLibrary`.
  pub fn from_value(value: &Value) -> Result<Self, SecureError> {
    match value {
      Value::Undefined | Value::Bool(false) => Ok(ProblemHandler::Emit),
      Value::Bool(true) => Ok(ProblemHandler::Fail),
      value if value.is_callable() => Ok(ProblemHandler::Script(value.clone())),
      other => Err(SecureError::invalid_argument(format_args!(
        "handler must be a boolean or a function, got {}",
        other.type_of()
      ))),
    }
  }

  pub fn callback(f: impl FnOnce(&[Problem]) + 'a) -> Self {
    ProblemHandler::Callback(Box::new(f))
  }
}

impl fmt::Debug for ProblemHandler<'_> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      ProblemHandler::Emit => f.write_str("Emit"),
      ProblemHandler::Fail => f.write_str("Fail"),
      ProblemHandler::Callback(_) => f.write_str("Callback(..)"),
      ProblemHandler::Script(func) => f.debug_tuple("Script").field(func).finish(),
    }
  }
}

/// Locks every member of [`STANDARD_LIBRARY`] reachable from the global object of `host`.
pub(crate) fn lock_standard_library(host: &dyn HostGlobals) -> Vec<Problem> {
  let _span = debug_span!("lock_standard_library").entered();
  let global = host.global();
  let mut problems = Vec::new();
  for object in STANDARD_LIBRARY.objects() {
    let target = resolve(host, &global, object.name);
    if object.is_constructor {
      let prototype = target.as_ref().and_then(|t| resolve(host, t, "prototype"));
      let prefix = format!("{}.prototype", object.name);
      problems.extend(lock_members(
        prototype.as_ref(),
        &prefix,
        object.prototype_methods,
      ));
    }
    problems.extend(lock_members(target.as_ref(), object.name, object.static_methods));
  }
  for problem in &problems {
    warn!(member = %problem.key, reason = problem.kind.as_str(), "standard library member not locked");
  }
  debug!(
    members = STANDARD_LIBRARY.member_count(),
    problems = problems.len(),
    "standard library lock pass finished"
  );
  problems
}

fn resolve(host: &dyn HostGlobals, holder: &ObjectRef, key: &str) -> Option<ObjectRef> {
  match host.get(holder, key) {
    Ok(Value::Object(object)) => Some(object),
    Ok(_) => None,
    Err(err) => {
      warn!(key, %err, "unable to read standard object");
      None
    }
  }
}

/// Makes each of `methods` on `object` non-writable and non-configurable.
///
/// Problem keys are qualified with `prefix` (`Date.prototype.getTime`). A missing `object` makes
/// every member [`ProblemKind::Missing`].
pub fn lock_members<O>(object: Option<&O>, prefix: &str, methods: &[&str]) -> Vec<Problem>
where
  O: ReflectableObject + ?Sized,
{
  methods
    .iter()
    .filter_map(|&method| {
      let key = format!("{prefix}.{method}");
      let kind = match object {
        Some(object) => lock_member(object, method),
        None => Err((ProblemKind::Missing, None)),
      };
      kind
        .err()
        .map(|(kind, detail)| match detail {
          Some(detail) => Problem::new(key, kind).with_detail(detail),
          None => Problem::new(key, kind),
        })
    })
    .collect()
}

fn lock_member<O>(object: &O, name: &str) -> Result<(), (ProblemKind, Option<String>)>
where
  O: ReflectableObject + ?Sized,
{
  let Some(desc) = object.get_descriptor(name) else {
    return Err((ProblemKind::Missing, None));
  };
  if desc.writable() == Some(false) || !desc.configurable {
    return Err((ProblemKind::AlreadyProtected, None));
  }
  if !desc.value().is_some_and(Value::is_callable) {
    return Err((ProblemKind::NotCallable, None));
  }

  let patch = PropertyDescriptorPatch {
    writable: Some(false),
    configurable: Some(false),
    ..Default::default()
  };
  if let Err(err) = object.set_descriptor(name, patch) {
    return Err((ProblemKind::ProtectionFailed, Some(err.to_string())));
  }
  match object.get_descriptor(name) {
    Some(desc) if desc.is_locked() => Ok(()),
    _ => Err((ProblemKind::ProtectionFailed, None)),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn table_merges_prototype_and_static_methods() {
    let object = STANDARD_LIBRARY.get("Object").unwrap();
    assert!(object.is_constructor);
    assert!(object.prototype_methods.contains(&"toString"));
    assert!(object.static_methods.contains(&"defineProperty"));

    let math = STANDARD_LIBRARY.get("Math").unwrap();
    assert!(!math.is_constructor);
    assert!(math.prototype_methods.is_empty());

    let expected: usize = PROTOTYPE_METHODS
      .iter()
      .chain(STATIC_METHODS)
      .map(|(_, methods)| methods.len())
      .sum();
    assert_eq!(STANDARD_LIBRARY.member_count(), expected);
  }

  #[test]
  fn handler_from_script_value() {
    assert!(matches!(
      ProblemHandler::from_value(&Value::Undefined),
      Ok(ProblemHandler::Emit)
    ));
    assert!(matches!(
      ProblemHandler::from_value(&Value::Bool(false)),
      Ok(ProblemHandler::Emit)
    ));
    assert!(matches!(
      ProblemHandler::from_value(&Value::Bool(true)),
      Ok(ProblemHandler::Fail)
    ));
    assert!(matches!(
      ProblemHandler::from_value(&Value::Number(42.0)),
      Err(SecureError::InvalidArgument(_))
    ));
    assert!(matches!(
      ProblemHandler::from_value(&Value::string("true")),
      Err(SecureError::InvalidArgument(_))
    ));
  }
}
