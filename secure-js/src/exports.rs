//! The script-facing exports object.
//!
//! Scripts see the hardening layer as an object with the methods `secureMethods`,
//! `securePrivates`, `lockStandardLibrary`, `isSecure`, `on`, `once` and `unsubscribe`, plus a
//! frozen `status` object. The exports object protects its own methods the same way
//! `secureMethods` protects a caller's object.

use crate::channel::{EventName, InsecureReport, Listener, ListenerId, Notification};
use crate::error::{HostError, SecureError, SecurityError};
use crate::guard::{self, GuardConfig};
use crate::host::object::{native_fn, NativeFn, ObjectRef};
use crate::host::property::{DescriptorAttribute, PropertyDescriptor};
use crate::host::value::Value;
use crate::host::HostGlobals;
use crate::problem::Problem;
use crate::secure::Secure;
use crate::status::ProtectionStatus;
use crate::stdlib::ProblemHandler;
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, warn};

const MAX_PROTOTYPE_CHAIN_LENGTH: usize = 10_000;

/// A listener registered from script, remembered so `unsubscribe` can find it by function.
struct ScriptListener {
  event: EventName,
  callback: Value,
  id: ListenerId,
}

type ScriptListeners = Arc<Mutex<Vec<ScriptListener>>>;

impl Secure {
  /// Builds the exports object for scripts running in `host`.
  ///
  /// Fails with [`SecureError::Security`] if the object's own methods could not be protected.
  pub fn install_exports(&self, host: &dyn HostGlobals) -> Result<ObjectRef, SecureError> {
    let exports = host.alloc_object();
    let listeners = ScriptListeners::default();

    let export = |name: &str, call: NativeFn| {
      let func = host.alloc_function(name, call);
      exports.define_property(name, PropertyDescriptor::data(Value::Object(func), true, true, true));
    };

    export(
      "secureMethods",
      native_fn(|host, _this, args| {
        script_guard(host, args, |object, config| {
          guard::secure_methods(object, config).problems
        })
      }),
    );
    export(
      "securePrivates",
      native_fn(|host, _this, args| {
        script_guard(host, args, |object, config| {
          guard::secure_privates(object, config).problems
        })
      }),
    );

    let secure = self.clone();
    export(
      "lockStandardLibrary",
      native_fn(move |host, this, args| {
        let handler = ProblemHandler::from_value(&arg(args, 0))?;
        secure.lock_standard_library(host, handler)?;
        Ok(this)
      }),
    );

    let secure = self.clone();
    export(
      "isSecure",
      native_fn(move |_host, _this, _args| Ok(Value::Bool(secure.is_secure()))),
    );

    export("on", subscribe_export(self, &listeners, false));
    export("once", subscribe_export(self, &listeners, true));

    let secure = self.clone();
    let registry = Arc::clone(&listeners);
    export(
      "unsubscribe",
      native_fn(move |_host, _this, args| {
        let event = parse_event(&arg(args, 0))?;
        let target = arg(args, 1);
        // Entries whose listener already left the channel are dropped on the way.
        loop {
          let entry = {
            let mut registry = registry.lock();
            let position = registry.iter().position(|l| {
              l.event == event
                && match &target {
                  Value::Number(id) => l.id.as_u64() as f64 == *id,
                  other => l.callback == *other,
                }
            });
            position.map(|position| registry.remove(position))
          };
          let Some(entry) = entry else {
            return Ok(Value::Bool(false));
          };
          if secure.unsubscribe(event, entry.id) {
            return Ok(Value::Bool(true));
          }
        }
      }),
    );

    exports.define_property(
      "status",
      PropertyDescriptor::data(
        Value::Object(status_to_value(host, self.status())),
        true,
        true,
        true,
      ),
    );

    let problems = guard::secure_methods(
      &exports,
      &GuardConfig::default()
        .with_enumerable(true)
        .with_configurable(false),
    )
    .problems;
    if !problems.is_empty() {
      return Err(SecurityError::new(problems).into());
    }
    debug!("installed script exports");
    Ok(exports)
  }
}

fn arg(args: &[Value], index: usize) -> Value {
  args.get(index).cloned().unwrap_or(Value::Undefined)
}

/// `secureMethods(object, config?, errorCallback?)` and `securePrivates(...)`.
///
/// A function passed as `config` with no `errorCallback` is taken as the callback.
fn script_guard(
  host: &dyn HostGlobals,
  args: &[Value],
  pass: impl Fn(&ObjectRef, &GuardConfig) -> Arc<[Problem]>,
) -> Result<Value, HostError> {
  let Value::Object(object) = arg(args, 0) else {
    return Err(HostError::TypeError("target is not an object".to_string()));
  };
  let mut config = arg(args, 1);
  let mut callback = arg(args, 2);
  if config.is_callable() && !callback.is_truthy() {
    callback = config;
    config = Value::Undefined;
  }

  let config = match &config {
    config if !config.is_truthy() => GuardConfig::default(),
    Value::Object(config) if !config.is_callable() => read_guard_config(host, config)?,
    _ => return Err(HostError::TypeError("config is not an object".to_string())),
  };
  if callback.is_truthy() && !callback.is_callable() {
    return Err(HostError::TypeError(
      "errorCallback is not a function".to_string(),
    ));
  }

  let problems = pass(&object, &config);
  if !problems.is_empty() && callback.is_truthy() {
    host.call(&callback, Value::Undefined, &[problems_to_value(host, &problems)])?;
  }
  Ok(Value::Object(object))
}

/// Reads the `writable`, `enumerable` and `configurable` members present on `config`, coercing
/// each to a boolean.
fn read_guard_config(host: &dyn HostGlobals, config: &ObjectRef) -> Result<GuardConfig, HostError> {
  let mut out = GuardConfig::default();
  for attribute in DescriptorAttribute::ALL {
    let name = attribute.as_str();
    if !has_property(config, name) {
      continue;
    }
    let value = host.get(config, name)?.is_truthy();
    out = match attribute {
      DescriptorAttribute::Writable => out.with_writable(value),
      DescriptorAttribute::Enumerable => out.with_enumerable(value),
      DescriptorAttribute::Configurable => out.with_configurable(value),
    };
  }
  Ok(out)
}

/// `key in object`.
fn has_property(object: &ObjectRef, key: &str) -> bool {
  let mut current = Some(object.clone());
  for _ in 0..MAX_PROTOTYPE_CHAIN_LENGTH {
    let Some(object) = current else {
      return false;
    };
    if object.has_own_property(key) {
      return true;
    }
    current = object.prototype();
  }
  false
}

fn parse_event(value: &Value) -> Result<EventName, HostError> {
  match value {
    Value::String(name) => Ok(name.parse::<EventName>()?),
    other => Err(HostError::TypeError(format!(
      "event name must be a string, got {}",
      other.type_of()
    ))),
  }
}

fn subscribe_export(
  secure: &Secure,
  listeners: &ScriptListeners,
  once: bool,
) -> NativeFn {
  let secure = secure.clone();
  let registry = Arc::clone(listeners);
  native_fn(move |_host, _this, args| {
    let event = parse_event(&arg(args, 0))?;
    let callback = arg(args, 1);
    if !callback.is_callable() {
      return Err(HostError::TypeError("listener is not a function".to_string()));
    }

    let target = callback.clone();
    let own_id = Arc::new(OnceCell::<ListenerId>::new());
    let fired_id = Arc::clone(&own_id);
    let fired_registry = Arc::clone(&registry);
    let listener: Listener = Arc::new(move |host: &dyn HostGlobals, notification: &Notification| {
      if once {
        if let Some(id) = fired_id.get() {
          fired_registry.lock().retain(|l| l.id != *id);
        }
      }
      let payload = notification_to_value(host, notification);
      if let Err(err) = host.call(&target, Value::Undefined, &[payload]) {
        warn!(event = %notification.event_name(), %err, "script listener failed");
      }
    });
    let id = secure.channel().subscribe(event, listener, once);
    registry.lock().push(ScriptListener {
      event,
      callback,
      id,
    });
    let _ = own_id.set(id);
    Ok(Value::Number(id.as_u64() as f64))
  })
}

fn array_to_value(host: &dyn HostGlobals, values: impl IntoIterator<Item = Value>) -> Value {
  let array = host.alloc_object();
  let mut length = 0usize;
  for (index, value) in values.into_iter().enumerate() {
    array.define_property(
      &index.to_string(),
      PropertyDescriptor::data(value, true, true, true),
    );
    length = index + 1;
  }
  array.define_property(
    "length",
    PropertyDescriptor::data(Value::Number(length as f64), true, false, false),
  );
  Value::Object(array)
}

fn problem_to_value(host: &dyn HostGlobals, problem: &Problem) -> Value {
  let object = host.alloc_object();
  let field = |name: &str, value: Value| {
    object.define_property(name, PropertyDescriptor::data(value, true, true, true));
  };
  field("key", Value::string(problem.key.as_str()));
  field("reason", Value::string(problem.kind.as_str()));
  field("message", Value::string(problem.message()));
  if let Some(detail) = &problem.detail {
    field("detail", Value::string(detail.as_str()));
  }
  Value::Object(object)
}

/// An array of `{key, reason, message}` objects.
pub(crate) fn problems_to_value(host: &dyn HostGlobals, problems: &[Problem]) -> Value {
  array_to_value(host, problems.iter().map(|p| problem_to_value(host, p)))
}

/// The argument passed to script listeners.
///
/// `dynamic-execution` passes the calling function, the frame name when the frame has no
/// function, or `null` at top level. `insecure` passes an array of flag names or of problems.
pub(crate) fn notification_to_value(host: &dyn HostGlobals, notification: &Notification) -> Value {
  match notification {
    Notification::DynamicExecution(Some(caller)) => match &caller.function {
      Some(function) => Value::Object(function.clone()),
      None => Value::String(caller.name.clone()),
    },
    Notification::DynamicExecution(None) => Value::Null,
    Notification::Insecure(InsecureReport::FailedFlags(flags)) => {
      array_to_value(host, flags.iter().map(|key| Value::string(key.as_str())))
    }
    Notification::Insecure(InsecureReport::Problems(problems)) => problems_to_value(host, problems),
  }
}

fn status_to_value(host: &dyn HostGlobals, status: &ProtectionStatus) -> ObjectRef {
  let object = host.alloc_object();
  for (key, flag) in status.iter() {
    object.define_property(
      key.as_str(),
      PropertyDescriptor::data(Value::Bool(flag), true, true, true),
    );
  }
  object.freeze();
  object
}
