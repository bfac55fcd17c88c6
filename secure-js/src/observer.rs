use crate::channel::{Notification, NotificationChannel};
use crate::host::object::native_fn;
use crate::host::property::PropertyDescriptorPatch;
use crate::host::value::Value;
use crate::host::{HostGlobals, ReflectableObject};
use crate::status::{StatusKey, StatusBuilder};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// The global binding of the dynamic-execution primitive.
pub const DYNAMIC_EXECUTION_BINDING: &str = "eval";

/// Makes invocations of `eval` observable without changing what it does.
///
/// The binding is replaced by a non-configurable accessor returning the original function. Hosts
/// read the callee of a call-site `eval(...)` [`HostGlobals::dynamic_execution_reads`] times, so
/// reads are grouped and only the first read of each group publishes a `dynamic-execution`
/// notification. The result is one notification per logical invocation.
pub(crate) struct DynamicExecutionObserver<'h> {
  host: &'h dyn HostGlobals,
  channel: Arc<NotificationChannel>,
}

impl<'h> DynamicExecutionObserver<'h> {
  pub(crate) fn new(host: &'h dyn HostGlobals, channel: Arc<NotificationChannel>) -> Self {
    Self { host, channel }
  }

  pub(crate) fn install(&self, status: &mut StatusBuilder) {
    let installed = self.try_install();
    status.set(StatusKey::Eval, installed);
  }

  fn try_install(&self) -> bool {
    let global = self.host.global();
    let name = DYNAMIC_EXECUTION_BINDING;
    let Some(desc) = global.get_descriptor(name) else {
      warn!(binding = name, "dynamic-execution primitive is missing");
      return false;
    };
    let (Some(original), Some(true)) = (desc.value().cloned(), desc.writable()) else {
      warn!(binding = name, "dynamic-execution primitive is not a writable data member");
      return false;
    };
    if !desc.configurable {
      warn!(binding = name, "dynamic-execution primitive is already locked");
      return false;
    }

    let reads = self.host.dynamic_execution_reads().max(1);
    let counter = AtomicU64::new(0);
    let channel = Arc::clone(&self.channel);
    let getter = self.host.alloc_function(
      "get eval",
      native_fn(move |host, _this, _args| {
        if counter.fetch_add(1, Ordering::Relaxed) % u64::from(reads) == 0 {
          channel.emit(host, &Notification::DynamicExecution(host.caller()));
        }
        Ok(original.clone())
      }),
    );

    let patch = PropertyDescriptorPatch {
      get: Some(Value::Object(getter)),
      configurable: Some(false),
      ..Default::default()
    };
    match global.set_descriptor(name, patch) {
      Ok(()) => {
        debug!(binding = name, reads, "observing dynamic execution");
        true
      }
      Err(err) => {
        warn!(binding = name, %err, "unable to observe dynamic execution");
        false
      }
    }
  }
}
