use crate::host::object::native_fn;
use crate::host::property::{PropertyDescriptor, PropertyDescriptorPatch};
use crate::host::value::Value;
use crate::host::HostGlobals;
use crate::status::{GuardedGlobal, StatusBuilder};
use tracing::{debug, warn};

/// Restores the sentinel globals and `isNaN` to their canonical values and locks them.
///
/// Every step tolerates failure: a binding that cannot be restored or locked only leaves its
/// status flags unset.
pub(crate) struct GlobalRestorer<'h> {
  host: &'h dyn HostGlobals,
}

impl<'h> GlobalRestorer<'h> {
  pub(crate) fn new(host: &'h dyn HostGlobals) -> Self {
    Self { host }
  }

  pub(crate) fn run(&self, status: &mut StatusBuilder) {
    for sentinel in GuardedGlobal::SENTINELS {
      self.restore_sentinel(sentinel, status);
    }
    self.restore_is_nan(status);
  }

  fn restore_sentinel(&self, sentinel: GuardedGlobal, status: &mut StatusBuilder) {
    let global = self.host.global();
    let name = sentinel.binding();
    let Some(canonical) = canonical_value(sentinel) else {
      return;
    };

    let restored = global.define_property_or_throw(
      name,
      PropertyDescriptorPatch::frozen_value(canonical.clone()),
    );
    if let Err(err) = &restored {
      warn!(binding = name, %err, "unable to restore global binding");
    }

    // A binding someone else locked first does not count as protected by us, even though its
    // descriptor is locked.
    let desc = global.get_own_property(name);
    let protected = restored.is_ok() && desc.as_ref().is_some_and(PropertyDescriptor::is_locked);
    let value_ok = desc
      .as_ref()
      .and_then(PropertyDescriptor::value)
      .is_some_and(|value| matches_canonical(sentinel, value, &canonical));
    debug!(binding = name, protected, value_ok, "restored global binding");
    status.set(sentinel.protection_key(), protected);
    status.set(sentinel.value_key(), value_ok);
  }

  fn restore_is_nan(&self, status: &mut StatusBuilder) {
    let global = self.host.global();
    let name = GuardedGlobal::IsNaN.binding();

    if !self.is_nan_classifies_nan() {
      let replacement = self.host.alloc_function(
        name,
        native_fn(|_host, _this, args| {
          let n = args.first().map_or(Value::Undefined, Clone::clone);
          Ok(Value::Bool(
            &*Value::Number(n.to_number()).to_js_string() == "NaN",
          ))
        }),
      );
      let replaced = global.define_property_or_throw(
        name,
        PropertyDescriptorPatch {
          value: Some(Value::Object(replacement)),
          ..Default::default()
        },
      );
      match replaced {
        Ok(()) => debug!(binding = name, "replaced broken isNaN"),
        Err(err) => warn!(binding = name, %err, "unable to replace isNaN"),
      }
    }

    let locked = global.define_property_or_throw(
      name,
      PropertyDescriptorPatch {
        writable: Some(false),
        enumerable: Some(false),
        configurable: Some(false),
        ..Default::default()
      },
    );
    if let Err(err) = &locked {
      warn!(binding = name, %err, "unable to lock global binding");
    }

    let protected = locked.is_ok()
      && global
        .get_own_property(name)
        .as_ref()
        .is_some_and(PropertyDescriptor::is_locked);
    let value_ok = self.is_nan_classifies_nan();
    debug!(binding = name, protected, value_ok, "restored global binding");
    status.set(GuardedGlobal::IsNaN.protection_key(), protected);
    status.set(GuardedGlobal::IsNaN.value_key(), value_ok);
  }

  /// Whether the current `isNaN` is callable and reports the canonical NaN as NaN.
  fn is_nan_classifies_nan(&self) -> bool {
    let Ok(is_nan) = self.host.get(&self.host.global(), GuardedGlobal::IsNaN.binding()) else {
      return false;
    };
    if !is_nan.is_callable() {
      return false;
    }
    self
      .host
      .call(&is_nan, Value::Undefined, &[canonical_nan()])
      .is_ok_and(|result| result.is_truthy())
  }
}

/// The canonical value of a sentinel, derived without reading any global binding.
fn canonical_value(sentinel: GuardedGlobal) -> Option<Value> {
  match sentinel {
    GuardedGlobal::Undefined => Some(Value::Undefined),
    GuardedGlobal::NaN => Some(canonical_nan()),
    GuardedGlobal::Infinity => Some(Value::Number(1.0 / 0.0)),
    GuardedGlobal::IsNaN => None,
  }
}

fn canonical_nan() -> Value {
  Value::Number(Value::string("!").to_number())
}

fn matches_canonical(sentinel: GuardedGlobal, observed: &Value, canonical: &Value) -> bool {
  match sentinel {
    // NaN is never strictly equal to itself.
    GuardedGlobal::NaN => observed.type_of() == "number" && &*observed.to_js_string() == "NaN",
    _ => observed.strict_equals(canonical),
  }
}
