use crate::error::HostError;
use crate::host::expr;
use crate::host::object::{native_fn, NativeFn, ObjectRef};
use crate::host::property::{PropertyDescriptor, PropertyDescriptorPatch, PropertyKind};
use crate::host::value::Value;
use crate::host::{CallerIdentity, DeferredJob, HostGlobals};
use crate::stdlib::STANDARD_LIBRARY;
use parking_lot::Mutex;
use serde::Deserialize;
use std::collections::VecDeque;

/// Hard upper bound on prototype chain walks.
const MAX_PROTOTYPE_CHAIN_LENGTH: usize = 10_000;

/// Options for [`Realm::with_options`].
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct RealmOptions {
  /// How many times a call-site `eval(...)` reads the `eval` binding before calling it. Some
  /// engines read the callee twice per call.
  pub dynamic_execution_reads: u32,
}

impl Default for RealmOptions {
  fn default() -> Self {
    Self {
      dynamic_execution_reads: 1,
    }
  }
}

/// A script realm: global object, built-ins, call stack and tick queue.
///
/// The global object has the legacy layout in which `undefined`, `NaN`, `Infinity`, `isNaN` and
/// `eval` are plain writable, configurable bindings. Built-in methods of the standard objects are
/// placeholders returning `undefined`; only their descriptors matter here.
pub struct Realm {
  global: ObjectRef,
  object_prototype: ObjectRef,
  function_prototype: ObjectRef,
  options: RealmOptions,
  frames: Mutex<Vec<CallerIdentity>>,
  ticks: Mutex<VecDeque<DeferredJob>>,
}

fn legacy_global_desc(value: Value) -> PropertyDescriptor {
  PropertyDescriptor::data(value, true, false, true)
}

fn builtin_method_desc(value: Value) -> PropertyDescriptor {
  PropertyDescriptor::data(value, true, false, true)
}

fn builtin_placeholder() -> NativeFn {
  native_fn(|_host, _this, _args| Ok(Value::Undefined))
}

impl Default for Realm {
  fn default() -> Self {
    Self::new()
  }
}

impl Realm {
  pub fn new() -> Self {
    Self::with_options(RealmOptions::default())
  }

  pub fn with_options(options: RealmOptions) -> Self {
    let object_prototype = ObjectRef::new(None);
    let function_prototype = ObjectRef::new_function(
      "",
      Some(object_prototype.clone()),
      builtin_placeholder(),
    );
    let global = ObjectRef::new(Some(object_prototype.clone()));
    let realm = Realm {
      global,
      object_prototype,
      function_prototype,
      options,
      frames: Mutex::new(Vec::new()),
      ticks: Mutex::new(VecDeque::new()),
    };
    realm.install_sentinels();
    realm.install_standard_library();
    realm
  }

  fn install_sentinels(&self) {
    let global = &self.global;
    global.define_property(
      "globalThis",
      legacy_global_desc(Value::Object(global.clone())),
    );
    global.define_property("undefined", legacy_global_desc(Value::Undefined));
    global.define_property("NaN", legacy_global_desc(Value::Number(f64::NAN)));
    global.define_property("Infinity", legacy_global_desc(Value::Number(f64::INFINITY)));

    let is_nan = self.alloc_function(
      "isNaN",
      native_fn(|_host, _this, args| {
        let n = args.first().map_or(f64::NAN, Value::to_number);
        Ok(Value::Bool(n.is_nan()))
      }),
    );
    global.define_property("isNaN", legacy_global_desc(Value::Object(is_nan)));

    let eval = self.alloc_function(
      "eval",
      native_fn(|_host, _this, args| match args.first() {
        Some(Value::String(source)) => {
          Ok(expr::evaluate(source)?.map_or(Value::Undefined, Value::Number))
        }
        Some(other) => Ok(other.clone()),
        None => Ok(Value::Undefined),
      }),
    );
    global.define_property("eval", legacy_global_desc(Value::Object(eval)));
  }

  fn install_standard_library(&self) {
    for object in STANDARD_LIBRARY.objects() {
      let target = if object.is_constructor {
        let ctor = self.alloc_function(object.name, builtin_placeholder());
        let prototype = match object.name {
          "Object" => self.object_prototype.clone(),
          "Function" => self.function_prototype.clone(),
          _ => self.alloc_object(),
        };
        for method in object.prototype_methods {
          let func = self.alloc_function(method, builtin_placeholder());
          prototype.define_property(method, builtin_method_desc(Value::Object(func)));
        }
        prototype.define_property(
          "constructor",
          builtin_method_desc(Value::Object(ctor.clone())),
        );
        ctor.define_property(
          "prototype",
          PropertyDescriptor::data(Value::Object(prototype), false, false, false),
        );
        ctor
      } else {
        self.alloc_object()
      };
      for method in object.static_methods {
        let func = self.alloc_function(method, builtin_placeholder());
        target.define_property(method, builtin_method_desc(Value::Object(func)));
      }
      self
        .global
        .define_property(object.name, legacy_global_desc(Value::Object(target)));
    }
  }

  pub fn options(&self) -> RealmOptions {
    self.options
  }

  pub fn object_prototype(&self) -> &ObjectRef {
    &self.object_prototype
  }

  /// Reads a global binding (`[[Get]]` on the global object).
  pub fn get_global(&self, name: &str) -> Result<Value, HostError> {
    self.get(&self.global, name)
  }

  /// Models the call-site `name(...args)` in global code: the binding is read (twice per call for
  /// `eval` when the realm emulates double reads) and the result is called.
  pub fn call_global(&self, name: &str, args: &[Value]) -> Result<Value, HostError> {
    let reads = if name == "eval" {
      self.options.dynamic_execution_reads.max(1)
    } else {
      1
    };
    let mut callee = Value::Undefined;
    for _ in 0..reads {
      callee = self.get(&self.global, name)?;
    }
    if !callee.is_callable() {
      return Err(HostError::TypeError(format!("{name} is not a function")));
    }
    self.call(&callee, Value::Undefined, args)
  }

  /// Runs `f` inside a call frame named `name`.
  pub fn with_frame<R>(&self, name: &str, f: impl FnOnce(&Realm) -> R) -> R {
    self.frames.lock().push(CallerIdentity {
      name: name.into(),
      function: None,
    });
    let result = f(self);
    self.frames.lock().pop();
    result
  }

  /// Sloppy-mode assignment (`[[Set]]`). Assignments to non-writable members are silently
  /// ignored and return `Ok(false)`.
  pub fn put(&self, object: &ObjectRef, key: &str, value: Value) -> Result<bool, HostError> {
    let mut holder = Some(object.clone());
    let mut depth = 0;
    while let Some(current) = holder {
      depth += 1;
      if depth > MAX_PROTOTYPE_CHAIN_LENGTH {
        return Err(HostError::TypeError("prototype chain too deep".to_string()));
      }
      let Some(desc) = current.get_own_property(key) else {
        holder = current.prototype();
        continue;
      };
      return match desc.kind {
        PropertyKind::Data { writable: false, .. } => Ok(false),
        PropertyKind::Data { .. } if current == *object => object.define_own_property(
          key,
          PropertyDescriptorPatch {
            value: Some(value),
            ..Default::default()
          },
        ),
        PropertyKind::Data { .. } => create_data_property(object, key, value),
        PropertyKind::Accessor { set, .. } => {
          if !set.is_callable() {
            return Ok(false);
          }
          self.call(&set, Value::Object(object.clone()), &[value])?;
          Ok(true)
        }
      };
    }
    create_data_property(object, key, value)
  }

  /// Runs every job queued for the next tick, including jobs queued while running. Returns the
  /// number of jobs run.
  pub fn run_next_tick(&self) -> usize {
    let mut ran = 0;
    loop {
      let job = self.ticks.lock().pop_front();
      let Some(job) = job else {
        return ran;
      };
      job(self);
      ran += 1;
    }
  }

  /// Number of jobs waiting for the next tick.
  pub fn pending_ticks(&self) -> usize {
    self.ticks.lock().len()
  }
}

fn create_data_property(object: &ObjectRef, key: &str, value: Value) -> Result<bool, HostError> {
  object.define_own_property(
    key,
    PropertyDescriptorPatch {
      value: Some(value),
      writable: Some(true),
      enumerable: Some(true),
      configurable: Some(true),
      ..Default::default()
    },
  )
}

impl HostGlobals for Realm {
  fn global(&self) -> ObjectRef {
    self.global.clone()
  }

  fn get(&self, object: &ObjectRef, key: &str) -> Result<Value, HostError> {
    let mut current = object.clone();
    for _ in 0..MAX_PROTOTYPE_CHAIN_LENGTH {
      let Some(desc) = current.get_own_property(key) else {
        match current.prototype() {
          Some(parent) => {
            current = parent;
            continue;
          }
          None => return Ok(Value::Undefined),
        }
      };
      return match desc.kind {
        PropertyKind::Data { value, .. } => Ok(value),
        PropertyKind::Accessor { get, .. } => {
          if get.is_callable() {
            self.call(&get, Value::Object(object.clone()), &[])
          } else {
            Ok(Value::Undefined)
          }
        }
      };
    }
    Err(HostError::TypeError("prototype chain too deep".to_string()))
  }

  fn call(&self, callee: &Value, this: Value, args: &[Value]) -> Result<Value, HostError> {
    let Some(function) = callee.as_object() else {
      return Err(HostError::TypeError(format!(
        "{value} is not a function",
        value = callee.to_js_string()
      )));
    };
    let Some(call) = function.native_call() else {
      return Err(HostError::TypeError("object is not a function".to_string()));
    };
    self.frames.lock().push(CallerIdentity {
      name: function.name().unwrap_or_else(|| "<anonymous>".into()),
      function: Some(function.clone()),
    });
    let result = call(self, this, args);
    self.frames.lock().pop();
    result
  }

  fn caller(&self) -> Option<CallerIdentity> {
    let frames = self.frames.lock();
    let len = frames.len();
    if len < 2 {
      return None;
    }
    frames.get(len - 2).cloned()
  }

  fn dynamic_execution_reads(&self) -> u32 {
    self.options.dynamic_execution_reads.max(1)
  }

  fn defer(&self, job: DeferredJob) {
    self.ticks.lock().push_back(job);
  }

  fn alloc_object(&self) -> ObjectRef {
    ObjectRef::new(Some(self.object_prototype.clone()))
  }

  fn alloc_function(&self, name: &str, call: NativeFn) -> ObjectRef {
    ObjectRef::new_function(name, Some(self.function_prototype.clone()), call)
  }
}
